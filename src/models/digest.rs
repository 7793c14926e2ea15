use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 摘要的十六进制长度（SHA-256）
pub const DIGEST_HEX_LEN: usize = 64;

/// 数据块摘要 - 64 位小写十六进制字符串，是去重的唯一键
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChunkDigest(String);

/// 摘要格式错误
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("无效的数据块摘要: {0:?}")]
pub struct InvalidDigest(pub String);

impl ChunkDigest {
    /// 解析摘要，接受大写十六进制并统一转换为小写
    pub fn parse(s: &str) -> Result<Self, InvalidDigest> {
        if s.len() != DIGEST_HEX_LEN || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(InvalidDigest(s.to_string()));
        }
        Ok(Self(s.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 摘要的前缀，用作数据块存储的子目录名
    pub fn prefix(&self, len: usize) -> &str {
        &self.0[..len.min(DIGEST_HEX_LEN)]
    }
}

impl fmt::Display for ChunkDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ChunkDigest {
    type Err = InvalidDigest;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ChunkDigest {
    type Error = InvalidDigest;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ChunkDigest> for String {
    fn from(digest: ChunkDigest) -> Self {
        digest.0
    }
}
