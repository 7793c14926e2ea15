use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::models::ChunkDigest;

/// 索引文件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IndexKind {
    /// 固定大小索引（*.fidx，镜像类备份）
    FileIndex,

    /// 动态索引（*.didx，归档类备份）
    DirectoryIndex,
}

impl IndexKind {
    /// 所有被识别的索引文件后缀
    pub const ALL: [IndexKind; 2] = [IndexKind::FileIndex, IndexKind::DirectoryIndex];

    pub fn suffix(&self) -> &'static str {
        match self {
            IndexKind::FileIndex => ".fidx",
            IndexKind::DirectoryIndex => ".didx",
        }
    }

    /// 根据文件名判断索引类型
    pub fn from_file_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| name.ends_with(kind.suffix()))
    }
}

/// 扫描时发现的索引文件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexFile {
    path: PathBuf,
    kind: IndexKind,
}

impl IndexFile {
    pub fn new(path: PathBuf, kind: IndexKind) -> Self {
        Self { path, kind }
    }

    /// 根据路径识别索引文件，后缀不匹配时返回 None
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        IndexKind::from_file_name(name).map(|kind| Self::new(path.to_path_buf(), kind))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> IndexKind {
        self.kind
    }
}

/// 单个索引文件提取失败的原因
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractionError {
    #[error("无法启动检查命令 {command}: {reason}")]
    Spawn { command: String, reason: String },

    #[error("检查命令退出码 {code:?}: {stderr}")]
    ExitStatus { code: Option<i32>, stderr: String },

    #[error("检查命令超时（{0:?}）")]
    Timeout(Duration),

    #[error("检查被取消")]
    Cancelled,

    #[error("输出中没有 chunks 段")]
    MissingChunkSection,

    #[error("无法解析 JSON 输出: {0}")]
    MalformedJson(String),

    #[error("读取命令输出失败: {0}")]
    Io(String),
}

/// 一个索引文件的提取结果
#[derive(Debug, Clone)]
pub struct ReferenceBatch {
    /// 来源索引文件
    pub source: PathBuf,

    /// 按出现顺序排列的摘要（同一摘要可重复出现）
    pub digests: Vec<ChunkDigest>,

    /// 失败原因，成功时为 None
    pub error: Option<ExtractionError>,
}

impl ReferenceBatch {
    pub fn parsed(source: PathBuf, digests: Vec<ChunkDigest>) -> Self {
        Self {
            source,
            digests,
            error: None,
        }
    }

    pub fn failed(source: PathBuf, error: ExtractionError) -> Self {
        Self {
            source,
            digests: Vec::new(),
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.error, Some(ExtractionError::Cancelled))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_kind_from_name() {
        assert_eq!(IndexKind::from_file_name("drive-scsi0.img.fidx"), Some(IndexKind::FileIndex));
        assert_eq!(IndexKind::from_file_name("root.pxar.didx"), Some(IndexKind::DirectoryIndex));
        assert_eq!(IndexKind::from_file_name("index.json.blob"), None);
        assert_eq!(IndexKind::from_file_name("fidx"), None);
    }

    #[test]
    fn test_failed_batch_has_no_digests() {
        let batch = ReferenceBatch::failed(PathBuf::from("/a.fidx"), ExtractionError::Cancelled);
        assert!(!batch.is_success());
        assert!(batch.is_cancelled());
        assert!(batch.digests.is_empty());
    }
}
