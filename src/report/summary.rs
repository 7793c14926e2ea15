use std::fmt::Write;

use crate::models::{Completion, ScanOutcome, ScanPhase, UsageStatistics};
use crate::utils::{format_elapsed, format_time, human_readable_size, percentage};

/// 输出中使用的图标
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Icon {
    Error,
    Warning,
    Info,
    Folder,
    Index,
    Chunk,
    Total,
    Timer,
    Puzzle,
    Threads,
}

/// 图标集，可在 emoji 与纯 ASCII 之间切换
#[derive(Debug, Clone, Copy)]
pub struct Icons {
    emoji: bool,
}

impl Icons {
    pub fn new(emoji: bool) -> Self {
        Self { emoji }
    }

    pub fn get(&self, icon: Icon) -> &'static str {
        if self.emoji {
            match icon {
                Icon::Error => "❌",
                Icon::Warning => "⚠️",
                Icon::Info => "ℹ️",
                Icon::Folder => "📁",
                Icon::Index => "📄",
                Icon::Chunk => "📦",
                Icon::Total => "🧮",
                Icon::Timer => "⏱️",
                Icon::Puzzle => "🧩",
                Icon::Threads => "🧵",
            }
        } else {
            match icon {
                Icon::Error => "[ERROR]",
                Icon::Warning => "[WARN]",
                Icon::Info => "[INFO]",
                Icon::Folder => "[DIR]",
                Icon::Index => "[INDEX]",
                Icon::Chunk => "[CHUNK]",
                Icon::Total => "[TOTAL]",
                Icon::Timer => "[TIME]",
                Icon::Puzzle => "[DETAIL]",
                Icon::Threads => "[THREADS]",
            }
        }
    }
}

/// 按显示字符数左对齐
fn pad_right(s: &str, width: usize) -> String {
    let len = s.chars().count();
    format!("{}{}", s, " ".repeat(width.saturating_sub(len)))
}

fn pad_left(s: &str, width: usize) -> String {
    let len = s.chars().count();
    format!("{}{}", " ".repeat(width.saturating_sub(len)), s)
}

/// 渲染单个扫描结果的用量摘要
pub fn render_usage_summary(outcome: &ScanOutcome, icons: Icons) -> String {
    let stats = &outcome.stats;
    let complete = outcome.is_complete();
    let mut out = String::new();

    let _ = writeln!(
        out,
        "{} 总大小: {} 字节 ({}){}",
        icons.get(Icon::Total),
        stats.unique_bytes,
        human_readable_size(stats.unique_bytes),
        if complete { "" } else { "（部分结果）" }
    );
    let _ = writeln!(
        out,
        "{} 开始于 {}，耗时 {}",
        icons.get(Icon::Timer),
        format_time(outcome.started_at),
        format_elapsed(outcome.elapsed)
    );
    let _ = writeln!(out, "{} 数据块用量:", icons.get(Icon::Puzzle));
    out.push_str(&render_usage_table(stats, complete));

    // 不完整的运行中各项不可比，不输出比例
    if complete && stats.total_logical_bytes > 0 {
        let _ = writeln!(
            out,
            "  去重节省空间 : {:.2}%",
            percentage(stats.duplicate_bytes, stats.total_logical_bytes)
        );
    }

    out.push_str(&render_failures(outcome, icons));
    out
}

/// 唯一/重复/总计三行表格，百分比按引用数计算
///
/// 不完整时只输出唯一和总计两行，且不带百分比。
fn render_usage_table(stats: &UsageStatistics, complete: bool) -> String {
    let unique_percent = percentage(stats.unique_count, stats.total_references);
    let duplicate_percent = if stats.total_references > 0 {
        100.0 - unique_percent
    } else {
        0.0
    };
    let shown = |value: f64| {
        if complete {
            format!("{:.2}%", value)
        } else {
            String::new()
        }
    };

    let mut rows = vec![(
        "唯一数据块",
        stats.unique_count.to_string(),
        shown(unique_percent),
        human_readable_size(stats.unique_bytes),
    )];
    if complete {
        rows.push((
            "重复引用数",
            stats.duplicate_references.to_string(),
            shown(duplicate_percent),
            human_readable_size(stats.duplicate_bytes),
        ));
    }
    rows.push((
        "引用总数量",
        stats.total_references.to_string(),
        String::new(),
        human_readable_size(stats.total_logical_bytes),
    ));

    let w_label = rows.iter().map(|r| r.0.chars().count()).max().unwrap_or(0);
    let w_count = rows.iter().map(|r| r.1.len()).max().unwrap_or(0);
    let w_perc = rows.iter().map(|r| r.2.len()).max().unwrap_or(0);
    let w_size = rows.iter().map(|r| r.3.len()).max().unwrap_or(0);

    let mut out = String::new();
    for (label, count, perc, size) in &rows {
        let _ = writeln!(
            out,
            "  {} : {}  {} | {}",
            pad_right(label, w_label),
            pad_left(count, w_count),
            pad_left(perc, w_perc),
            pad_left(size, w_size)
        );
    }
    out
}

/// 失败计数与取消状态，干净的运行不输出任何内容
fn render_failures(outcome: &ScanOutcome, icons: Icons) -> String {
    let stats = &outcome.stats;
    let warn = icons.get(Icon::Warning);
    let mut out = String::new();

    if stats.walk_errors > 0 {
        let _ = writeln!(out, "{} 无法遍历的目录: {}", warn, stats.walk_errors);
    }
    if stats.extraction_failures > 0 {
        let _ = writeln!(out, "{} 解析失败的索引文件: {}", warn, stats.extraction_failures);
    }
    if stats.missing_chunks > 0 {
        let _ = writeln!(out, "{} 缺失的数据块文件: {}", warn, stats.missing_chunks);
    }
    if stats.unreadable_chunks > 0 {
        let _ = writeln!(out, "{} 无法读取的数据块文件: {}", warn, stats.unreadable_chunks);
    }
    if let Completion::Cancelled(phase) = outcome.completion {
        let stage = match phase {
            ScanPhase::Extraction => "提取引用",
            ScanPhase::Sizing => "统计大小",
        };
        let _ = writeln!(out, "{} 扫描在{}阶段被取消，统计不完整", warn, stage);
    }
    out
}

/// 单个虚拟机/容器的结果：没有数据时只给出提示，否则输出完整用量表
pub fn render_guest_usage(label: &str, outcome: &ScanOutcome, icons: Icons) -> String {
    let stats = &outcome.stats;
    if stats.has_failures() || !outcome.is_complete() {
        return render_usage_summary(outcome, icons);
    }

    if stats.index_files == 0 {
        format!("{} {} 下没有索引文件\n", icons.get(Icon::Info), label)
    } else if stats.distinct_digests == 0 {
        format!("{} {} 没有引用任何数据块\n", icons.get(Icon::Info), label)
    } else {
        render_usage_summary(outcome, icons)
    }
}

/// 渲染全部虚拟机/容器的汇总，按唯一数据大小降序排列
pub fn render_guest_summary(results: &[(String, ScanOutcome)], icons: Icons) -> String {
    if results.is_empty() {
        return String::new();
    }

    let mut sorted: Vec<_> = results.iter().collect();
    sorted.sort_by(|a, b| b.1.stats.unique_bytes.cmp(&a.1.stats.unique_bytes));

    let w_label = sorted.iter().map(|(label, _)| label.chars().count()).max().unwrap_or(0);
    let w_size = sorted
        .iter()
        .map(|(_, o)| human_readable_size(o.stats.unique_bytes).len())
        .max()
        .unwrap_or(0);

    let mut out = String::new();
    let _ = writeln!(out, "{} 各虚拟机/容器用量（按大小排序）:", icons.get(Icon::Total));
    for (label, outcome) in sorted {
        let stats = &outcome.stats;
        let mut notes = Vec::new();
        if stats.index_files == 0 {
            notes.push("无索引文件");
        } else if stats.distinct_digests == 0 {
            notes.push("无数据块");
        }
        if stats.has_failures() {
            notes.push("有失败");
        }
        if !outcome.is_complete() {
            notes.push("不完整");
        }

        let mut line = format!(
            "  {} : {}",
            pad_right(label, w_label),
            pad_left(&human_readable_size(stats.unique_bytes), w_size)
        );
        if !notes.is_empty() {
            let _ = write!(line, "  [{}]", notes.join(", "));
        }
        let _ = writeln!(out, "{}", line);
    }
    out
}
