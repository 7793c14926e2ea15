use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::models::{ChunkDigest, ChunkSizeResult, ChunkStatus};

/// 数据块大小查询器 - 根据摘要定位 `.chunks/<前缀>/<摘要>` 并读取文件大小
#[derive(Debug, Clone)]
pub struct ChunkSizer {
    chunks_root: PathBuf,
    prefix_len: usize,
}

impl ChunkSizer {
    pub fn new(chunks_root: impl Into<PathBuf>) -> Self {
        Self {
            chunks_root: chunks_root.into(),
            prefix_len: crate::config::DefaultConfig::chunk_prefix_len(),
        }
    }

    pub fn with_prefix_len(mut self, prefix_len: usize) -> Self {
        self.prefix_len = prefix_len;
        self
    }

    pub fn from_config(chunks_root: impl Into<PathBuf>, config: &Config) -> Self {
        Self::new(chunks_root).with_prefix_len(config.scan.chunk_prefix_len)
    }

    pub fn chunks_root(&self) -> &Path {
        &self.chunks_root
    }

    /// 摘要对应的数据块文件路径
    pub fn chunk_path(&self, digest: &ChunkDigest) -> PathBuf {
        self.chunks_root
            .join(digest.prefix(self.prefix_len))
            .join(digest.as_str())
    }

    /// 查询一个数据块的大小；缺失不是错误，也不会重试
    pub fn size_of(&self, digest: &ChunkDigest) -> ChunkSizeResult {
        let path = self.chunk_path(digest);

        let status = match std::fs::metadata(&path) {
            Ok(metadata) => ChunkStatus::Present(metadata.len()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                tracing::warn!("数据块缺失: {}", path.display());
                ChunkStatus::Missing
            }
            Err(err) => {
                tracing::warn!("无法访问数据块 {}: {}", path.display(), err);
                ChunkStatus::Unreadable(err.to_string())
            }
        };

        ChunkSizeResult {
            digest: digest.clone(),
            path,
            status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn digest(c: char) -> ChunkDigest {
        ChunkDigest::parse(&c.to_string().repeat(64)).unwrap()
    }

    #[test]
    fn test_chunk_path_layout() {
        let sizer = ChunkSizer::new("/datastore/.chunks");
        let d = digest('a');
        assert_eq!(
            sizer.chunk_path(&d),
            PathBuf::from(format!("/datastore/.chunks/aaaa/{}", d))
        );
    }

    #[test]
    fn test_size_of_present_chunk() {
        let temp_dir = tempdir().unwrap();
        let sizer = ChunkSizer::new(temp_dir.path());
        let d = digest('b');

        let path = sizer.chunk_path(&d);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, vec![0u8; 4096]).unwrap();

        let result = sizer.size_of(&d);
        assert_eq!(result.status, ChunkStatus::Present(4096));
        assert_eq!(result.size(), Some(4096));
    }

    #[test]
    fn test_size_of_missing_chunk() {
        let temp_dir = tempdir().unwrap();
        let sizer = ChunkSizer::new(temp_dir.path());

        let result = sizer.size_of(&digest('c'));
        assert_eq!(result.status, ChunkStatus::Missing);
        assert_eq!(result.size(), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_size_of_unreachable_chunk() {
        let temp_dir = tempdir().unwrap();
        let sizer = ChunkSizer::new(temp_dir.path());
        let d = digest('e');

        // 前缀位置是普通文件，查询失败但不是"不存在"
        fs::write(temp_dir.path().join("eeee"), b"not a directory").unwrap();

        let result = sizer.size_of(&d);
        assert!(matches!(result.status, ChunkStatus::Unreadable(_)));
        assert_eq!(result.size(), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_size_of_chunk_in_locked_prefix() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = tempdir().unwrap();
        let sizer = ChunkSizer::new(temp_dir.path());
        let d = digest('f');
        let path = sizer.chunk_path(&d);
        let prefix = path.parent().unwrap().to_path_buf();
        fs::create_dir_all(&prefix).unwrap();
        fs::write(&path, vec![0u8; 16]).unwrap();

        fs::set_permissions(&prefix, fs::Permissions::from_mode(0o000)).unwrap();
        let locked = fs::metadata(&path).is_err();
        let result = sizer.size_of(&d);
        fs::set_permissions(&prefix, fs::Permissions::from_mode(0o755)).unwrap();

        if locked {
            assert!(matches!(result.status, ChunkStatus::Unreadable(_)));
        } else {
            // root 不受目录权限限制
            assert_eq!(result.status, ChunkStatus::Present(16));
        }
    }

    #[test]
    fn test_custom_prefix_len() {
        let sizer = ChunkSizer::new("/c").with_prefix_len(2);
        let d = digest('d');
        assert_eq!(sizer.chunk_path(&d), PathBuf::from(format!("/c/dd/{}", d)));
    }
}
