use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::models::IndexFile;
use crate::scanner::error::{ScanError, ScanResult};

/// 一次遍历的结果
#[derive(Debug, Default)]
pub struct LocatedIndexes {
    pub files: Vec<IndexFile>,

    /// 遍历中无法读取的目录或条目数量，其中的索引文件未被统计
    pub walk_errors: usize,
}

/// 索引文件定位器 - 递归查找 *.fidx / *.didx
pub struct IndexLocator {
    root: PathBuf,
}

impl IndexLocator {
    /// 创建定位器，根目录不存在、不是目录或无法读取时返回致命错误
    pub fn new(root: &Path) -> ScanResult<Self> {
        let metadata = std::fs::metadata(root).map_err(|err| match err.kind() {
            std::io::ErrorKind::NotFound => ScanError::PathNotFound(root.to_path_buf()),
            _ => ScanError::Io {
                path: root.to_path_buf(),
                source: err,
            },
        })?;

        if !metadata.is_dir() {
            return Err(ScanError::NotADirectory(root.to_path_buf()));
        }

        std::fs::read_dir(root).map_err(|err| ScanError::Unreadable {
            path: root.to_path_buf(),
            source: err,
        })?;

        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    /// 遍历所有索引文件，顺序取决于目录遍历顺序；不跟随符号链接
    pub fn locate(&self) -> LocatedIndexes {
        let mut located = LocatedIndexes::default();

        for entry in WalkDir::new(&self.root).follow_links(false) {
            match entry {
                Ok(entry) if entry.file_type().is_file() => {
                    if let Some(index) = IndexFile::from_path(entry.path()) {
                        located.files.push(index);
                    }
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!("遍历目录时出错: {}", err);
                    located.walk_errors += 1;
                }
            }
        }

        located
    }
}
