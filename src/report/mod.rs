pub mod progress;
pub mod summary;

pub use progress::PhaseProgress;
pub use summary::{render_guest_summary, render_guest_usage, render_usage_summary, Icon, Icons};

use anyhow::Result;
use serde::Serialize;

use crate::models::{ScanOutcome, UsageStatistics};

/// 单个虚拟机/容器的 JSON 报告条目
#[derive(Debug, Serialize)]
pub struct GuestReport<'a> {
    pub guest: &'a str,
    #[serde(flatten)]
    pub outcome: &'a ScanOutcome,
}

/// 全部虚拟机/容器模式的 JSON 报告
#[derive(Debug, Serialize)]
pub struct GuestsReport<'a> {
    pub guests: Vec<GuestReport<'a>>,
    pub total: UsageStatistics,
}

/// 单次扫描结果的 JSON 文本
pub fn outcome_to_json(outcome: &ScanOutcome) -> Result<String> {
    Ok(serde_json::to_string_pretty(outcome)?)
}

/// 多个扫描结果的 JSON 文本，按唯一数据大小降序排列，附带逐项求和的总计
pub fn guests_to_json(results: &[(String, ScanOutcome)]) -> Result<String> {
    let mut guests: Vec<GuestReport<'_>> = results
        .iter()
        .map(|(label, outcome)| GuestReport {
            guest: label,
            outcome,
        })
        .collect();
    guests.sort_by(|a, b| b.outcome.stats.unique_bytes.cmp(&a.outcome.stats.unique_bytes));

    let total = results.iter().fold(UsageStatistics::default(), |mut acc, (_, o)| {
        let s = &o.stats;
        acc.index_files += s.index_files;
        acc.distinct_digests += s.distinct_digests;
        acc.unique_count += s.unique_count;
        acc.unique_bytes += s.unique_bytes;
        acc.duplicate_references += s.duplicate_references;
        acc.duplicate_bytes += s.duplicate_bytes;
        acc.total_references += s.total_references;
        acc.total_logical_bytes += s.total_logical_bytes;
        acc.extraction_failures += s.extraction_failures;
        acc.missing_chunks += s.missing_chunks;
        acc.unreadable_chunks += s.unreadable_chunks;
        acc.walk_errors += s.walk_errors;
        acc
    });

    Ok(serde_json::to_string_pretty(&GuestsReport { guests, total })?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Completion, ReferenceCount};
    use chrono::Utc;
    use std::path::PathBuf;
    use std::time::Duration;

    fn outcome(unique_bytes: u64) -> ScanOutcome {
        ScanOutcome {
            search_path: PathBuf::from("/ds/vm/1"),
            stats: UsageStatistics {
                index_files: 1,
                unique_bytes,
                ..UsageStatistics::default()
            },
            completion: Completion::Complete,
            references: ReferenceCount::new(),
            started_at: Utc::now(),
            elapsed: Duration::from_millis(5),
        }
    }

    #[test]
    fn test_outcome_json_fields() {
        let json = outcome_to_json(&outcome(42)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["stats"]["unique_bytes"], 42);
        assert_eq!(value["completion"]["state"], "complete");
        assert!(value.get("references").is_none());
    }

    #[test]
    fn test_guests_json_sorted_with_total() {
        let results = vec![
            ("/vm/1".to_string(), outcome(1)),
            ("/vm/2".to_string(), outcome(7)),
        ];
        let json = guests_to_json(&results).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["guests"][0]["guest"], "/vm/2");
        assert_eq!(value["guests"][1]["guest"], "/vm/1");
        assert_eq!(value["total"]["unique_bytes"], 8);
        assert_eq!(value["total"]["index_files"], 2);
    }
}
