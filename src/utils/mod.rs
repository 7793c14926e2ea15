pub mod command;
pub mod size_format;
pub mod time_format;

pub use size_format::{human_readable_size, percentage};
pub use time_format::{format_elapsed, format_time};
