use crate::models::{ChunkSizeResult, ChunkStatus, ReferenceCount, UsageStatistics};

/// 第一阶段的汇总输入
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractionTally {
    /// 扫描到的索引文件数量
    pub index_files: usize,

    /// 提取失败的索引文件数量
    pub extraction_failures: usize,

    /// 遍历时无法读取的目录或条目数量
    pub walk_errors: usize,
}

/// 将引用计数和数据块大小合并为最终统计
///
/// 每个摘要的第一次引用计为唯一，其余计为重复；缺失或不可读的数据块
/// 不贡献字节数，但其引用仍计入引用总数。
pub fn aggregate(
    references: &ReferenceCount,
    sizes: &[ChunkSizeResult],
    tally: ExtractionTally,
) -> UsageStatistics {
    let mut stats = UsageStatistics {
        index_files: tally.index_files,
        extraction_failures: tally.extraction_failures,
        walk_errors: tally.walk_errors,
        distinct_digests: references.distinct(),
        total_references: references.total_references(),
        ..UsageStatistics::default()
    };

    for result in sizes {
        let count = references.get(&result.digest);
        if count == 0 {
            continue;
        }

        match &result.status {
            ChunkStatus::Present(size) => {
                stats.unique_count += 1;
                stats.unique_bytes += size;
                stats.duplicate_bytes += (count - 1) * size;
            }
            ChunkStatus::Missing => stats.missing_chunks += 1,
            ChunkStatus::Unreadable(_) => stats.unreadable_chunks += 1,
        }
    }

    stats.duplicate_references = stats.total_references.saturating_sub(stats.unique_count);
    stats.total_logical_bytes = stats.unique_bytes + stats.duplicate_bytes;
    stats
}
