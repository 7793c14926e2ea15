use std::path::PathBuf;
use thiserror::Error;

/// 使扫描无法继续的致命错误
#[derive(Error, Debug)]
pub enum ScanError {
    /// 扫描根目录不存在
    #[error("路径不存在: {0}")]
    PathNotFound(PathBuf),

    /// 扫描根不是目录
    #[error("不是目录: {0}")]
    NotADirectory(PathBuf),

    /// 无法创建工作线程池
    #[error("无法创建线程池: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// 扫描根目录存在但无法读取
    #[error("无法读取目录 {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 外部检查工具不可用
    #[error("找不到所需的命令: {0}")]
    ToolNotFound(String),

    /// 需要在 tokio 运行时中创建分析器
    #[error("没有可用的 tokio 运行时: {0}")]
    Runtime(#[from] tokio::runtime::TryCurrentError),

    /// 阻塞分析任务异常终止
    #[error("分析任务异常终止: {0}")]
    TaskFailed(String),

    #[error("I/O 错误 {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type ScanResult<T> = std::result::Result<T, ScanError>;
