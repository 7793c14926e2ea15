use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::models::ChunkDigest;

/// 全局引用计数：摘要 -> 在所有索引文件中出现的次数（恒为正数）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceCount {
    counts: HashMap<ChunkDigest, u64>,
}

impl ReferenceCount {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录一次引用
    pub fn add(&mut self, digest: ChunkDigest) {
        *self.counts.entry(digest).or_insert(0) += 1;
    }

    /// 某个摘要的引用次数，未出现时为 0
    pub fn get(&self, digest: &ChunkDigest) -> u64 {
        self.counts.get(digest).copied().unwrap_or(0)
    }

    /// 不同摘要的数量
    pub fn distinct(&self) -> usize {
        self.counts.len()
    }

    /// 引用总数
    pub fn total_references(&self) -> u64 {
        self.counts.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// 所有不同摘要，用作第二阶段的任务列表
    pub fn digests(&self) -> Vec<ChunkDigest> {
        self.counts.keys().cloned().collect()
    }
}

/// 数据块文件的状态
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkStatus {
    /// 文件存在，记录其逻辑大小
    Present(u64),

    /// 文件不存在（例如已被垃圾回收）
    Missing,

    /// 文件存在但无法读取元数据
    Unreadable(String),
}

/// 单个摘要的大小查询结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkSizeResult {
    pub digest: ChunkDigest,
    pub path: PathBuf,
    pub status: ChunkStatus,
}

impl ChunkSizeResult {
    /// 已解析的大小，缺失或不可读时为 None
    pub fn size(&self) -> Option<u64> {
        match self.status {
            ChunkStatus::Present(size) => Some(size),
            _ => None,
        }
    }
}

/// 最终的用量统计
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageStatistics {
    /// 扫描到的索引文件数量
    pub index_files: usize,

    /// 不同摘要数量（无论数据块是否存在）
    pub distinct_digests: usize,

    /// 大小已解析的唯一数据块数量
    pub unique_count: u64,

    /// 唯一数据块总大小（去重后真实占用）
    pub unique_bytes: u64,

    /// 重复引用数 = total_references - unique_count
    pub duplicate_references: u64,

    /// 重复引用对应的逻辑大小
    pub duplicate_bytes: u64,

    /// 引用总数
    pub total_references: u64,

    /// 逻辑总大小 = unique_bytes + duplicate_bytes
    pub total_logical_bytes: u64,

    /// 提取失败的索引文件数量
    pub extraction_failures: usize,

    /// 数据块文件缺失的摘要数量
    pub missing_chunks: usize,

    /// 数据块文件无法读取的摘要数量
    pub unreadable_chunks: usize,

    /// 遍历时无法读取的目录或条目数量
    pub walk_errors: usize,
}

impl UsageStatistics {
    /// 是否存在任何失败（与字节数无关）
    pub fn has_failures(&self) -> bool {
        self.extraction_failures > 0
            || self.missing_chunks > 0
            || self.unreadable_chunks > 0
            || self.walk_errors > 0
    }
}

/// 扫描阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanPhase {
    /// 提取索引文件中的摘要
    Extraction,

    /// 查询数据块文件大小
    Sizing,
}

/// 扫描是否完整结束
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "phase")]
pub enum Completion {
    Complete,

    /// 在指定阶段被取消，统计不完整
    Cancelled(ScanPhase),
}

/// 一次扫描的完整结果
#[derive(Debug, Clone, Serialize)]
pub struct ScanOutcome {
    /// 扫描的根路径
    pub search_path: PathBuf,

    /// 用量统计
    pub stats: UsageStatistics,

    /// 完成状态
    pub completion: Completion,

    /// 第一阶段得到的引用计数，取消时仍可用于部分报告
    #[serde(skip)]
    pub references: ReferenceCount,

    /// 扫描开始时间
    pub started_at: DateTime<Utc>,

    /// 扫描耗时
    pub elapsed: Duration,
}

impl ScanOutcome {
    pub fn is_complete(&self) -> bool {
        self.completion == Completion::Complete
    }
}
