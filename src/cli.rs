use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use pbs_chunk_checker::config::{InspectFormat, ReportFormat};

#[derive(Parser)]
#[command(name = "pbs-chunk-checker")]
#[command(about = "统计备份数据存储中数据块的去重用量")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// 配置文件路径
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// 详细输出
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// 使用纯文本图标代替 emoji
    #[arg(long, global = true)]
    pub no_emoji: bool,

    /// 输出格式
    #[arg(short, long, global = true, value_enum)]
    pub format: Option<ReportFormat>,

    /// 并发线程数 (1-256)，默认按 CPU 数量自动选择
    #[arg(short, long, global = true, visible_alias = "workers")]
    pub threads: Option<usize>,

    /// 检查命令的输出格式
    #[arg(long, global = true, value_enum)]
    pub inspect_format: Option<InspectFormat>,
}

/// 数据存储选择参数
#[derive(Args, Debug, Clone)]
#[group(required = true, multiple = false)]
pub struct DatastoreArgs {
    /// 通过管理工具按名称解析数据存储
    #[arg(short, long)]
    pub datastore: Option<String>,

    /// 直接指定数据存储的文件系统路径
    #[arg(long)]
    pub datastore_path: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 统计数据存储中某个路径下的数据块用量
    Scan {
        #[command(flatten)]
        datastore: DatastoreArgs,

        /// 数据存储内的搜索路径，例如 /ns/prod/vm/100
        #[arg(short, long, default_value = "/")]
        searchpath: String,
    },

    /// 分别统计每个虚拟机/容器的用量并按大小排序
    Guests {
        #[command(flatten)]
        datastore: DatastoreArgs,

        /// 只在该路径下查找虚拟机/容器
        #[arg(short, long, default_value = "/")]
        searchpath: String,

        /// 在标签后附加最新快照的备注（需要 --datastore）
        #[arg(long)]
        show_comments: bool,
    },

    /// 管理配置
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// 显示当前配置
    Show,

    /// 写入默认配置文件
    Init {
        /// 覆盖已存在的配置文件
        #[arg(long)]
        force: bool,
    },
}
