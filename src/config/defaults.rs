pub struct DefaultConfig;

/// 并发线程数上限
pub const MAX_THREADS: usize = 256;

/// 默认线程数的上限
pub const DEFAULT_THREADS_CAP: usize = 32;

impl DefaultConfig {
    /// 默认并发线程数：CPU 核心数的两倍，最多 32
    pub fn default_threads() -> usize {
        (num_cpus::get().max(1) * 2).min(DEFAULT_THREADS_CAP)
    }

    pub fn debug_command() -> String {
        "proxmox-backup-debug".to_string()
    }

    pub fn manager_command() -> String {
        "proxmox-backup-manager".to_string()
    }

    /// 单个索引文件检查的超时时间（秒）
    pub fn inspect_timeout_secs() -> u64 {
        60
    }

    /// 数据存储查询的超时时间（秒）
    pub fn manager_timeout_secs() -> u64 {
        10
    }

    /// 快照列表查询的超时时间（秒）
    pub fn snapshot_timeout_secs() -> u64 {
        20
    }

    /// 数据块目录名
    pub fn chunk_dir_name() -> String {
        ".chunks".to_string()
    }

    /// 数据块子目录使用的摘要前缀长度
    pub fn chunk_prefix_len() -> usize {
        4
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_threads_is_bounded() {
        let threads = DefaultConfig::default_threads();
        assert!(threads >= 1);
        assert!(threads <= DEFAULT_THREADS_CAP);
    }
}
