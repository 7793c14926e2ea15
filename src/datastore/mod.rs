pub mod comments;

use regex::Regex;
use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::utils::command::{ensure_program, run_command, CommandError};

pub use comments::GuestComments;

/// 数据存储解析错误
#[derive(Error, Debug)]
pub enum DatastoreError {
    #[error("无效的数据存储名称 '{0}'，只允许字母、数字、'.'、'_' 和 '-'")]
    InvalidName(String),

    #[error("查询数据存储失败: {0}")]
    Command(#[from] CommandError),

    #[error("无法解析数据存储 '{name}' 的路径: {reason}")]
    PathNotResolvable { name: String, reason: String },

    #[error("数据存储路径不是目录: {0}")]
    NotADirectory(PathBuf),

    #[error("搜索路径超出数据存储根目录: {0}")]
    EscapesRoot(String),
}

fn datastore_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_.-]+$").expect("静态正则表达式"))
}

fn text_path_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r#""path"\s*:\s*"([^"]+)""#).expect("静态正则表达式"))
}

/// 已解析的数据存储
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datastore {
    root: PathBuf,
    chunks_root: PathBuf,
}

impl Datastore {
    /// 直接使用文件系统路径
    pub fn from_path(root: &Path, chunk_dir_name: &str) -> Result<Self, DatastoreError> {
        let root = root
            .canonicalize()
            .map_err(|_| DatastoreError::NotADirectory(root.to_path_buf()))?;
        if !root.is_dir() {
            return Err(DatastoreError::NotADirectory(root));
        }

        Ok(Self {
            chunks_root: root.join(chunk_dir_name),
            root,
        })
    }

    /// 通过管理工具按名称解析数据存储，管理工具不存在时直接失败
    pub async fn resolve(name: &str, config: &Config) -> Result<Self, DatastoreError> {
        validate_name(name)?;
        ensure_program(&config.tools.manager_command)?;
        let path = query_datastore_path(name, config).await?;
        Self::from_path(&path, &config.scan.chunk_dir_name)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn chunks_root(&self) -> &Path {
        &self.chunks_root
    }

    /// 将用户给出的搜索路径解析为数据存储内的绝对路径
    ///
    /// 开头的 `/` 被忽略，`..` 按字面规范化，结果不能离开数据存储根目录。
    pub fn resolve_search_path(&self, search_path: &str) -> Result<PathBuf, DatastoreError> {
        let relative = search_path.trim_start_matches('/');
        let mut resolved = self.root.clone();

        for component in Path::new(relative).components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::CurDir => {}
                Component::ParentDir => {
                    if resolved == self.root || !resolved.pop() {
                        return Err(DatastoreError::EscapesRoot(search_path.to_string()));
                    }
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(DatastoreError::EscapesRoot(search_path.to_string()));
                }
            }
        }

        Ok(resolved)
    }
}

/// 校验数据存储名称
pub fn validate_name(name: &str) -> Result<(), DatastoreError> {
    if datastore_name_pattern().is_match(name) {
        Ok(())
    } else {
        Err(DatastoreError::InvalidName(name.to_string()))
    }
}

/// 先尝试 JSON 输出，失败时从文本输出中提取 `"path": "..."`
async fn query_datastore_path(name: &str, config: &Config) -> Result<PathBuf, DatastoreError> {
    let program = &config.tools.manager_command;
    let timeout = config.tools.manager_timeout();
    let cancel = CancellationToken::new();
    let mut last_error = String::new();

    let output = run_command(
        program,
        ["datastore", "show", name, "--output-format", "json"],
        timeout,
        &cancel,
    )
    .await?;
    if output.success() {
        if let Some(path) = parse_json_path(&output.stdout) {
            return Ok(path);
        }
    } else {
        last_error = first_non_empty(&output.stderr, &output.stdout);
    }

    let output = run_command(program, ["datastore", "show", name], timeout, &cancel).await?;
    if let Some(path) = parse_text_path(&output.stdout) {
        return Ok(path);
    }
    if !output.success() {
        last_error = first_non_empty(&output.stderr, &output.stdout);
    }

    if last_error.is_empty() {
        last_error = "数据存储不存在或路径无法解析".to_string();
    }
    Err(DatastoreError::PathNotResolvable {
        name: name.to_string(),
        reason: last_error,
    })
}

fn parse_json_path(output: &str) -> Option<PathBuf> {
    let value: serde_json::Value = serde_json::from_str(output).ok()?;
    value
        .get("path")
        .and_then(|p| p.as_str())
        .filter(|p| !p.is_empty())
        .map(PathBuf::from)
}

fn parse_text_path(output: &str) -> Option<PathBuf> {
    text_path_pattern()
        .captures(output)
        .map(|caps| PathBuf::from(&caps[1]))
}

fn first_non_empty(a: &str, b: &str) -> String {
    let a = a.trim();
    if a.is_empty() {
        b.trim().to_string()
    } else {
        a.to_string()
    }
}
