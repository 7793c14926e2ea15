use std::sync::{Mutex, MutexGuard};

use crate::models::{ReferenceBatch, ReferenceCount};

/// 合并结果：全局引用计数加上失败统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FoldedReferences {
    pub counts: ReferenceCount,

    /// 成功解析的索引文件数量
    pub parsed_batches: usize,

    /// 提取失败的索引文件数量
    pub failed_batches: usize,
}

/// 引用计数器 - 多个工作线程并发产出批次，合并步骤串行执行
///
/// 每个批次在工作线程中独立生成，只有 `fold` 需要持有锁；
/// 累加满足交换律和结合律，批次以任意顺序完成都得到相同结果。
#[derive(Debug, Default)]
pub struct ReferenceCounter {
    state: Mutex<FoldedReferences>,
}

impl ReferenceCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// 合并一个批次：成功批次中每个摘要计数加一，失败批次只计入失败数
    pub fn fold(&self, batch: ReferenceBatch) {
        let mut state = self.lock();

        match batch.error {
            None => {
                state.parsed_batches += 1;
                for digest in batch.digests {
                    state.counts.add(digest);
                }
            }
            Some(err) => {
                tracing::warn!("解析索引文件失败 {}: {}", batch.source.display(), err);
                state.failed_batches += 1;
            }
        }
    }

    /// 取出最终结果
    pub fn into_inner(self) -> FoldedReferences {
        self.state
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock(&self) -> MutexGuard<'_, FoldedReferences> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
