use rayon::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio_util::sync::CancellationToken;

use crate::models::{ChunkDigest, ChunkSizeResult, IndexFile, ScanPhase};
use crate::scanner::chunk_sizer::ChunkSizer;
use crate::scanner::error::ScanResult;
use crate::scanner::reference_counter::{FoldedReferences, ReferenceCounter};
use crate::scanner::reference_extractor::IndexInspector;

/// 进度回调：(阶段, 已完成数量, 任务总数)，每完成一个任务调用一次
pub type ProgressCallback<'a> = dyn Fn(ScanPhase, usize, usize) + Send + Sync + 'a;

/// 单个阶段的输出
#[derive(Debug)]
pub struct PhaseOutput<T> {
    pub value: T,

    /// 阶段完成的任务数量
    pub completed: usize,

    /// 阶段任务总数
    pub total: usize,

    /// 是否因取消而有任务未执行
    pub cancelled: bool,
}

/// 任务调度器 - 有界线程池驱动提取和大小查询两个阶段
///
/// 取消只在任务之间生效：已开始的任务会执行完毕，尚未开始的任务被跳过。
pub struct Scheduler {
    pool: rayon::ThreadPool,
    threads: usize,
    cancel: CancellationToken,
}

impl Scheduler {
    /// 创建指定并发宽度的调度器
    pub fn new(threads: usize, cancel: CancellationToken) -> ScanResult<Self> {
        let threads = threads.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("chunk-worker-{}", i))
            .build()?;

        Ok(Self {
            pool,
            threads,
            cancel,
        })
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    /// 第一阶段：并发提取每个索引文件的引用并合并到全局计数
    ///
    /// 返回时所有已分派的任务都已结束并合并，是进入第二阶段前的屏障。
    pub fn extract_references(
        &self,
        index_files: &[IndexFile],
        inspector: &dyn IndexInspector,
        progress: &ProgressCallback<'_>,
    ) -> PhaseOutput<FoldedReferences> {
        let counter = ReferenceCounter::new();

        let output = self.bounded_map(ScanPhase::Extraction, index_files, progress, |index| {
            let batch = inspector.inspect(index, &self.cancel);
            if batch.is_cancelled() {
                tracing::debug!("检查被中断: {}", index.path().display());
                return None;
            }
            counter.fold(batch);
            Some(())
        });

        PhaseOutput {
            value: counter.into_inner(),
            completed: output.completed,
            total: output.total,
            cancelled: output.cancelled,
        }
    }

    /// 第二阶段：并发查询每个不同摘要的数据块大小
    pub fn size_chunks(
        &self,
        digests: &[ChunkDigest],
        sizer: &ChunkSizer,
        progress: &ProgressCallback<'_>,
    ) -> PhaseOutput<Vec<ChunkSizeResult>> {
        self.bounded_map(ScanPhase::Sizing, digests, progress, |digest| {
            Some(sizer.size_of(digest))
        })
    }

    /// 在线程池中并发执行任务；任务返回 None 表示因取消而未完成
    fn bounded_map<T, R, F>(
        &self,
        phase: ScanPhase,
        items: &[T],
        progress: &ProgressCallback<'_>,
        task: F,
    ) -> PhaseOutput<Vec<R>>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> Option<R> + Sync,
    {
        let total = items.len();
        let completed = AtomicUsize::new(0);

        tracing::info!("{:?} 阶段开始: {} 个任务, {} 个线程", phase, total, self.threads);

        let results: Vec<R> = self.pool.install(|| {
            items
                .par_iter()
                .filter_map(|item| {
                    if self.cancel.is_cancelled() {
                        return None;
                    }
                    let result = task(item)?;
                    let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                    progress(phase, done, total);
                    Some(result)
                })
                .collect()
        });

        let completed = completed.into_inner();
        let cancelled = completed < total && self.cancel.is_cancelled();
        if cancelled {
            tracing::warn!("{:?} 阶段被取消: 完成 {}/{}", phase, completed, total);
        }

        PhaseOutput {
            value: results,
            completed,
            total,
            cancelled,
        }
    }
}
