use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use anyhow::{Context, Result};

use crate::config::defaults::{DefaultConfig, MAX_THREADS};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 外部工具配置
    pub tools: ToolsConfig,

    /// 扫描配置
    pub scan: ScanConfig,

    /// 显示配置
    pub display: DisplayConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// 用于检查索引文件的命令
    pub debug_command: String,

    /// 用于查询数据存储的命令
    pub manager_command: String,

    /// 检查单个索引文件的超时（秒）
    pub inspect_timeout_secs: u64,

    /// 查询数据存储的超时（秒）
    pub manager_timeout_secs: u64,

    /// 查询快照列表（备注标签）的超时（秒）
    pub snapshot_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// 并发线程数，0 表示自动
    pub threads: usize,

    /// 检查命令的输出格式
    pub inspect_format: InspectFormat,

    /// 数据块子目录的摘要前缀长度
    pub chunk_prefix_len: usize,

    /// 数据存储下的数据块目录名
    pub chunk_dir_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// 是否使用 emoji 图标
    pub emoji: bool,

    /// 输出格式
    pub format: ReportFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum InspectFormat {
    Text,
    Json,
}

impl InspectFormat {
    pub fn as_arg(&self) -> &'static str {
        match self {
            InspectFormat::Text => "text",
            InspectFormat::Json => "json",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    /// 表格格式
    Table,
    /// JSON 格式
    Json,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            debug_command: DefaultConfig::debug_command(),
            manager_command: DefaultConfig::manager_command(),
            inspect_timeout_secs: DefaultConfig::inspect_timeout_secs(),
            manager_timeout_secs: DefaultConfig::manager_timeout_secs(),
            snapshot_timeout_secs: DefaultConfig::snapshot_timeout_secs(),
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            threads: 0,
            inspect_format: InspectFormat::Text,
            chunk_prefix_len: DefaultConfig::chunk_prefix_len(),
            chunk_dir_name: DefaultConfig::chunk_dir_name(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            emoji: true,
            format: ReportFormat::Table,
        }
    }
}

impl ToolsConfig {
    pub fn inspect_timeout(&self) -> Duration {
        Duration::from_secs(self.inspect_timeout_secs)
    }

    pub fn manager_timeout(&self) -> Duration {
        Duration::from_secs(self.manager_timeout_secs)
    }

    pub fn snapshot_timeout(&self) -> Duration {
        Duration::from_secs(self.snapshot_timeout_secs)
    }
}

impl ScanConfig {
    /// 实际使用的线程数：0 使用默认值，其余限制在 1..=MAX_THREADS
    pub fn effective_threads(&self) -> usize {
        if self.threads == 0 {
            DefaultConfig::default_threads()
        } else {
            self.threads.clamp(1, MAX_THREADS)
        }
    }
}

impl Config {
    /// 从文件加载配置
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("无法读取配置文件 {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("配置文件格式错误 {}", path.display()))?;
        Ok(config)
    }

    /// 保存配置到文件
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;

        // 确保目录存在
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, content)?;
        Ok(())
    }

    /// 获取默认配置文件路径
    pub fn default_config_path() -> Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("无法找到配置目录"))?;
        path.push("pbs-chunk-checker");
        path.push("config.toml");
        Ok(path)
    }

    /// 加载默认位置的配置，文件不存在时使用默认值
    pub fn load_or_default() -> Result<Self> {
        match Self::default_config_path() {
            Ok(path) if path.exists() => Self::load_from_file(&path),
            _ => Ok(Self::default()),
        }
    }
}
