use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::models::{Completion, IndexFile, ScanOutcome, ScanPhase};
use crate::scanner::aggregation::{aggregate, ExtractionTally};
use crate::scanner::chunk_sizer::ChunkSizer;
use crate::scanner::error::{ScanError, ScanResult};
use crate::scanner::index_locator::IndexLocator;
use crate::scanner::reference_extractor::{IndexInspector, ReferenceExtractor};
use crate::scanner::scheduler::Scheduler;
use crate::utils::command::ensure_program;

/// 数据块用量分析器 - 串联定位、提取、计数、大小查询和汇总
pub struct ChunkUsageAnalyzer {
    inspector: Box<dyn IndexInspector>,
    sizer: ChunkSizer,
    scheduler: Scheduler,
}

impl ChunkUsageAnalyzer {
    pub fn new(
        inspector: Box<dyn IndexInspector>,
        sizer: ChunkSizer,
        scheduler: Scheduler,
    ) -> Self {
        Self {
            inspector,
            sizer,
            scheduler,
        }
    }

    /// 根据配置创建分析器，使用外部检查命令提取引用
    ///
    /// 必须在 tokio 运行时中调用；检查命令不存在时直接失败，不会开始扫描。
    pub fn from_config(
        config: &Config,
        chunks_root: &Path,
        cancel: CancellationToken,
    ) -> ScanResult<Self> {
        let runtime = Handle::try_current()?;
        let tool = ensure_program(&config.tools.debug_command)
            .map_err(|_| ScanError::ToolNotFound(config.tools.debug_command.clone()))?;
        tracing::debug!("检查命令: {}", tool.display());

        let scheduler = Scheduler::new(config.scan.effective_threads(), cancel)?;
        Ok(Self::new(
            Box::new(ReferenceExtractor::from_config(config, runtime)),
            ChunkSizer::from_config(chunks_root, config),
            scheduler,
        ))
    }

    pub fn threads(&self) -> usize {
        self.scheduler.threads()
    }

    pub fn chunks_root(&self) -> &Path {
        self.sizer.chunks_root()
    }

    /// 分析一个路径下的所有索引文件
    ///
    /// 只有扫描根无效时返回错误；单个索引或数据块的失败记录在统计中。
    /// 没有找到索引文件时返回全零统计。
    pub fn analyze<F>(&self, search_path: &Path, progress: F) -> ScanResult<ScanOutcome>
    where
        F: Fn(ScanPhase, usize, usize) + Send + Sync,
    {
        let started_at = Utc::now();
        let timer = Instant::now();

        let located = IndexLocator::new(search_path)?.locate();
        let index_files: Vec<IndexFile> = located.files;
        tracing::info!("{} 下发现 {} 个索引文件", search_path.display(), index_files.len());
        if located.walk_errors > 0 {
            tracing::warn!("{} 个目录或条目无法遍历，统计可能偏低", located.walk_errors);
        }

        // 阶段 1 完成（或被取消）后才会开始阶段 2
        let extraction = self
            .scheduler
            .extract_references(&index_files, self.inspector.as_ref(), &progress);
        let folded = extraction.value;
        let tally = ExtractionTally {
            index_files: index_files.len(),
            extraction_failures: folded.failed_batches,
            walk_errors: located.walk_errors,
        };

        let (sizes, completion) = if extraction.cancelled {
            (Vec::new(), Completion::Cancelled(ScanPhase::Extraction))
        } else {
            let digests = folded.counts.digests();
            let sizing = self.scheduler.size_chunks(&digests, &self.sizer, &progress);
            let completion = if sizing.cancelled {
                Completion::Cancelled(ScanPhase::Sizing)
            } else {
                Completion::Complete
            };
            (sizing.value, completion)
        };

        let stats = aggregate(&folded.counts, &sizes, tally);
        tracing::info!(
            "分析完成: {} 个唯一数据块, {} 字节, {} 个引用",
            stats.unique_count,
            stats.unique_bytes,
            stats.total_references
        );

        Ok(ScanOutcome {
            search_path: search_path.to_path_buf(),
            stats,
            completion,
            references: folded.counts,
            started_at,
            elapsed: timer.elapsed(),
        })
    }

    /// 在 tokio 的阻塞线程中运行 [`analyze`](Self::analyze)
    pub async fn analyze_blocking<F>(
        self: Arc<Self>,
        search_path: PathBuf,
        progress: F,
    ) -> ScanResult<ScanOutcome>
    where
        F: Fn(ScanPhase, usize, usize) + Send + Sync + 'static,
    {
        tokio::task::spawn_blocking(move || self.analyze(&search_path, progress))
            .await
            .map_err(|err| ScanError::TaskFailed(err.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChunkDigest, ExtractionError, ReferenceBatch};
    use std::fs;
    use tempfile::{tempdir, TempDir};

    /// 直接读取索引文件内容作为文本输出的检查器
    struct FileContentInspector;

    impl IndexInspector for FileContentInspector {
        fn inspect(&self, index: &IndexFile, _cancel: &CancellationToken) -> ReferenceBatch {
            let path = index.path().to_path_buf();
            match fs::read_to_string(&path) {
                Ok(content) => match crate::scanner::parse_text_output(&content) {
                    Ok(digests) => ReferenceBatch::parsed(path, digests),
                    Err(err) => ReferenceBatch::failed(path, err),
                },
                Err(err) => ReferenceBatch::failed(path, ExtractionError::Io(err.to_string())),
            }
        }
    }

    fn hex(c: char) -> String {
        c.to_string().repeat(64)
    }

    fn write_index(dir: &Path, name: &str, digests: &[String]) {
        fs::create_dir_all(dir).unwrap();
        let mut content = String::from("chunks:\n");
        for d in digests {
            content.push_str(&format!("  \"{}\"\n", d));
        }
        content.push_str("end\n");
        fs::write(dir.join(name), content).unwrap();
    }

    fn write_chunk(chunks: &Path, digest: &str, size: usize) {
        let dir = chunks.join(&digest[..4]);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(digest), vec![1u8; size]).unwrap();
    }

    struct Datastore {
        _dir: TempDir,
        search: std::path::PathBuf,
        chunks: std::path::PathBuf,
    }

    fn datastore() -> Datastore {
        let dir = tempdir().unwrap();
        let search = dir.path().join("ns/test");
        let chunks = dir.path().join(".chunks");
        fs::create_dir_all(&search).unwrap();
        fs::create_dir_all(&chunks).unwrap();
        Datastore {
            _dir: dir,
            search,
            chunks,
        }
    }

    fn analyzer(chunks: &Path, cancel: CancellationToken) -> ChunkUsageAnalyzer {
        ChunkUsageAnalyzer::new(
            Box::new(FileContentInspector),
            ChunkSizer::new(chunks),
            Scheduler::new(4, cancel).unwrap(),
        )
    }

    #[test]
    fn test_analyze_deduplicates_across_indexes() {
        let ds = datastore();
        let snap = ds.search.join("vm/100/snap1");
        write_index(&snap, "drive.fidx", &[hex('a'), hex('b'), hex('a')]);
        write_index(&snap, "root.pxar.didx", &[hex('b'), hex('c')]);
        write_chunk(&ds.chunks, &hex('a'), 100);
        write_chunk(&ds.chunks, &hex('b'), 10);
        write_chunk(&ds.chunks, &hex('c'), 1);

        let outcome = analyzer(&ds.chunks, CancellationToken::new())
            .analyze(&ds.search, |_, _, _| {})
            .unwrap();
        let stats = &outcome.stats;

        assert!(outcome.is_complete());
        assert_eq!(stats.index_files, 2);
        assert_eq!(stats.total_references, 5);
        assert_eq!(stats.unique_count, 3);
        assert_eq!(stats.unique_bytes, 111);
        assert_eq!(stats.duplicate_references, 2);
        assert_eq!(stats.duplicate_bytes, 110);
        assert_eq!(stats.total_logical_bytes, 221);
        assert!(!stats.has_failures());
    }

    #[test]
    fn test_analyze_is_idempotent() {
        let ds = datastore();
        write_index(&ds.search, "a.didx", &[hex('a'), hex('a')]);
        write_chunk(&ds.chunks, &hex('a'), 64);

        let analyzer = analyzer(&ds.chunks, CancellationToken::new());
        let first = analyzer.analyze(&ds.search, |_, _, _| {}).unwrap();
        let second = analyzer.analyze(&ds.search, |_, _, _| {}).unwrap();

        assert_eq!(first.stats, second.stats);
        assert_eq!(first.references, second.references);
    }

    #[test]
    fn test_analyze_records_failures() {
        let ds = datastore();
        write_index(&ds.search, "good.didx", &[hex('a'), hex('d'), hex('d')]);
        fs::write(ds.search.join("broken.fidx"), "no section here\n").unwrap();
        write_chunk(&ds.chunks, &hex('a'), 5);

        let outcome = analyzer(&ds.chunks, CancellationToken::new())
            .analyze(&ds.search, |_, _, _| {})
            .unwrap();

        assert_eq!(outcome.stats.extraction_failures, 1);
        assert_eq!(outcome.stats.missing_chunks, 1);
        assert_eq!(outcome.stats.unique_bytes, 5);
        assert_eq!(outcome.stats.total_references, 3);
        assert!(outcome.stats.has_failures());
    }

    #[test]
    fn test_analyze_empty_tree() {
        let ds = datastore();
        let outcome = analyzer(&ds.chunks, CancellationToken::new())
            .analyze(&ds.search, |_, _, _| {})
            .unwrap();

        assert!(outcome.is_complete());
        assert_eq!(outcome.stats, crate::models::UsageStatistics::default());
    }

    #[test]
    fn test_analyze_missing_root() {
        let ds = datastore();
        let result = analyzer(&ds.chunks, CancellationToken::new())
            .analyze(&ds.search.join("nope"), |_, _, _| {});
        assert!(matches!(result, Err(ScanError::PathNotFound(_))));
    }

    #[test]
    fn test_cancel_between_phases_keeps_references() {
        let ds = datastore();
        write_index(&ds.search, "a.didx", &[hex('a'), hex('b')]);
        write_index(&ds.search, "b.didx", &[hex('a')]);
        write_chunk(&ds.chunks, &hex('a'), 100);
        write_chunk(&ds.chunks, &hex('b'), 100);

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let outcome = analyzer(&ds.chunks, cancel)
            .analyze(&ds.search, move |phase, done, total| {
                if phase == ScanPhase::Extraction && done == total {
                    trigger.cancel();
                }
            })
            .unwrap();

        assert_eq!(outcome.completion, Completion::Cancelled(ScanPhase::Sizing));
        assert_eq!(outcome.stats.unique_bytes, 0);
        assert_eq!(outcome.stats.total_references, 3);
        assert_eq!(outcome.references.get(&ChunkDigest::parse(&hex('a')).unwrap()), 2);
    }

    #[tokio::test]
    async fn test_analyze_blocking_reports_progress() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let ds = datastore();
        write_index(&ds.search, "a.didx", &[hex('a'), hex('b')]);
        write_chunk(&ds.chunks, &hex('a'), 3);
        write_chunk(&ds.chunks, &hex('b'), 4);

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let analyzer = Arc::new(analyzer(&ds.chunks, CancellationToken::new()));
        let outcome = analyzer
            .analyze_blocking(ds.search.clone(), move |_, _, _| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .await
            .unwrap();

        assert_eq!(outcome.stats.unique_bytes, 7);
        // 1 个索引文件 + 2 个数据块
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_missing_inspection_tool_is_fatal() {
        let ds = datastore();
        let mut config = Config::default();
        config.tools.debug_command = "no-such-backup-debug-tool".to_string();

        let result = ChunkUsageAnalyzer::from_config(&config, &ds.chunks, CancellationToken::new());
        match result {
            Err(ScanError::ToolNotFound(tool)) => assert_eq!(tool, "no-such-backup-debug-tool"),
            other => panic!("expected ToolNotFound, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_from_config_requires_runtime() {
        let ds = datastore();
        let mut config = Config::default();
        config.tools.debug_command = "sh".to_string();

        let result = ChunkUsageAnalyzer::from_config(&config, &ds.chunks, CancellationToken::new());
        assert!(matches!(result, Err(ScanError::Runtime(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_directory_is_reported_as_failure() {
        use std::os::unix::fs::PermissionsExt;

        let ds = datastore();
        let guest = ds.search.join("vm/100");
        write_index(&guest, "drive.fidx", &[hex('a')]);
        write_index(&ds.search.join("vm/200"), "drive.fidx", &[hex('b')]);
        write_chunk(&ds.chunks, &hex('b'), 8);

        fs::set_permissions(&guest, fs::Permissions::from_mode(0o000)).unwrap();
        let locked = fs::read_dir(&guest).is_err();
        let outcome =
            analyzer(&ds.chunks, CancellationToken::new()).analyze(&ds.search, |_, _, _| {});
        fs::set_permissions(&guest, fs::Permissions::from_mode(0o755)).unwrap();
        if !locked {
            // root 不受目录权限限制
            return;
        }

        let outcome = outcome.unwrap();
        assert_eq!(outcome.stats.index_files, 1);
        assert_eq!(outcome.stats.walk_errors, 1);
        assert_eq!(outcome.stats.unique_bytes, 8);
        assert!(outcome.stats.has_failures());
    }
}
