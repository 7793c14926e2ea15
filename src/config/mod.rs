pub mod defaults;
pub mod settings;

pub use defaults::{DefaultConfig, MAX_THREADS};
pub use settings::{Config, DisplayConfig, InspectFormat, ReportFormat, ScanConfig, ToolsConfig};
