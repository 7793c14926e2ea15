use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Mutex;

use crate::models::ScanPhase;

const BAR_TEMPLATE: &str = concat!(
    "{prefix:.bold} [{elapsed_precise}] {bar:40.cyan/blue} ",
    "{pos}/{len} ({percent}%) 剩余 {eta}"
);

/// 按扫描阶段显示进度条，阶段切换时结束旧进度条并创建新的
pub struct PhaseProgress {
    visible: bool,
    current: Mutex<Option<(ScanPhase, ProgressBar)>>,
}

impl PhaseProgress {
    pub fn new(visible: bool) -> Self {
        Self {
            visible,
            current: Mutex::new(None),
        }
    }

    /// 不显示任何内容，用于 JSON 输出和测试
    pub fn hidden() -> Self {
        Self::new(false)
    }

    /// 进度回调，可以从任意工作线程调用
    pub fn update(&self, phase: ScanPhase, done: usize, total: usize) {
        let mut current = match self.current.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let switch = !matches!(current.as_ref(), Some((p, _)) if *p == phase);
        if switch {
            if let Some((_, bar)) = current.take() {
                bar.finish();
            }
            *current = Some((phase, self.create_bar(phase, total)));
        }

        if let Some((_, bar)) = current.as_ref() {
            // 回调可能乱序到达，只向前推进
            let done = done as u64;
            if done > bar.position() {
                bar.set_position(done);
            }
        }
    }

    /// 结束当前进度条
    pub fn finish(&self) {
        let mut current = match self.current.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some((_, bar)) = current.take() {
            bar.finish();
        }
    }

    /// 当前阶段及位置
    pub fn position(&self) -> Option<(ScanPhase, u64)> {
        let current = match self.current.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        current.as_ref().map(|(phase, bar)| (*phase, bar.position()))
    }

    fn create_bar(&self, phase: ScanPhase, total: usize) -> ProgressBar {
        if !self.visible {
            let bar = ProgressBar::hidden();
            bar.set_length(total as u64);
            return bar;
        }

        let bar = ProgressBar::new(total as u64);
        let label = match phase {
            ScanPhase::Extraction => "提取引用",
            ScanPhase::Sizing => "统计大小",
        };
        if let Ok(style) = ProgressStyle::default_bar().template(BAR_TEMPLATE) {
            bar.set_style(style.progress_chars("=> "));
        }
        bar.set_prefix(label);
        bar
    }
}

impl Drop for PhaseProgress {
    fn drop(&mut self) {
        self.finish();
    }
}
