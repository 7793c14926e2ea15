pub mod config;
pub mod datastore;
pub mod models;
pub mod report;
pub mod scanner;
pub mod utils;

// 重新导出常用类型
pub use datastore::Datastore;
pub use models::{ScanOutcome, UsageStatistics};
pub use scanner::{ChunkUsageAnalyzer, ScanError};
