//! # 批量执行器
//!
//! 在显式的执行上下文中并行映射工作项。
//!
//! ## 功能
//! - 每次调用构建独立的 rayon 线程池，不使用全局线程池
//! - 输出顺序与输入顺序一致，与完成顺序无关
//! - 默认 fail-fast：任一工作项失败即停止派发尚未开始的工作项
//! - best-effort 模式：返回逐项成功/失败/取消标记
//! - 协作式取消：取消信号只阻止未开始的工作项，进行中的照常完成
//!
//! ## 依赖关系
//! - 被 `parsers/`, `symmetrize/`, `compare/`, `spectral/` 调用
//! - 使用 `utils/progress.rs` 创建进度条
//! - 使用 `rayon` 进行并行计算

use crate::error::{DockError, Result};
use crate::utils::progress;

use indicatif::ProgressBar;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// 批次级取消信号
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// 失败策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// 任一失败终止整个批次
    #[default]
    FailFast,
    /// 返回逐项结果，不终止批次
    BestEffort,
}

/// 执行上下文，作用域为单次批量调用
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionContext {
    /// 并行作业数（0 = 自动）
    pub workers: usize,
    pub policy: FailurePolicy,
    /// 是否显示进度条
    pub show_progress: bool,
    #[serde(skip)]
    pub cancel: CancelToken,
}

impl ExecutionContext {
    pub fn new(workers: usize) -> Self {
        ExecutionContext {
            workers,
            ..Self::default()
        }
    }

    /// 单线程上下文
    pub fn serial() -> Self {
        Self::new(1)
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// 实际使用的线程数
    pub fn effective_workers(&self) -> usize {
        if self.workers == 0 {
            num_cpus::get()
        } else {
            self.workers
        }
    }

    fn pool(&self) -> Result<rayon::ThreadPool> {
        rayon::ThreadPoolBuilder::new()
            .num_threads(self.effective_workers())
            .build()
            .map_err(|e| DockError::InvalidArgument(format!("cannot build worker pool: {}", e)))
    }

    fn progress_bar(&self, len: usize, message: &str) -> ProgressBar {
        if self.show_progress {
            progress::create_progress_bar(len as u64, message)
        } else {
            ProgressBar::hidden()
        }
    }
}

/// 单个工作项的结果（best-effort 模式）
#[derive(Debug)]
pub enum ItemOutcome<R> {
    /// 完成
    Done(R),
    /// 失败
    Failed(DockError),
    /// 因取消未派发
    Cancelled,
}

impl<R> ItemOutcome<R> {
    pub fn ok(&self) -> Option<&R> {
        match self {
            ItemOutcome::Done(r) => Some(r),
            _ => None,
        }
    }

    pub fn into_result(self, index: usize) -> Result<R> {
        match self {
            ItemOutcome::Done(r) => Ok(r),
            ItemOutcome::Failed(e) => Err(DockError::worker(index, e)),
            ItemOutcome::Cancelled => Err(DockError::Cancelled { index }),
        }
    }
}

/// 批量处理结果统计
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchSummary {
    /// 成功数量
    pub success: usize,
    /// 取消数量
    pub cancelled: usize,
    /// 失败数量
    pub failed: usize,
    /// 失败详情 (序号, 错误信息)
    pub failures: Vec<(usize, String)>,
}

impl BatchSummary {
    /// 汇总逐项结果
    pub fn from_outcomes<R>(outcomes: &[ItemOutcome<R>]) -> Self {
        let mut summary = BatchSummary::default();
        for (index, outcome) in outcomes.iter().enumerate() {
            match outcome {
                ItemOutcome::Done(_) => summary.success += 1,
                ItemOutcome::Cancelled => summary.cancelled += 1,
                ItemOutcome::Failed(e) => {
                    summary.failed += 1;
                    summary.failures.push((index, e.to_string()));
                }
            }
        }
        summary
    }

    /// 总处理数量
    pub fn total(&self) -> usize {
        self.success + self.cancelled + self.failed
    }
}

/// 按上下文的失败策略并行映射，返回与输入同序的结果
///
/// 任何失败都以序号最小者的 `WorkerError` 返回。上下文为 best-effort
/// 时所有工作项仍会执行完毕；需要逐项标记时使用 [`map_over_best_effort`]。
pub fn map_over<T, R, F>(items: &[T], f: F, ctx: &ExecutionContext) -> Result<Vec<R>>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> Result<R> + Sync + Send,
{
    let abort_on_failure = ctx.policy == FailurePolicy::FailFast;
    let outcomes = run(items, f, ctx, abort_on_failure, "Processing")?;

    let mut results = Vec::with_capacity(outcomes.len());
    let mut first_cancelled = None;
    let mut first_error = None;
    for (index, outcome) in outcomes.into_iter().enumerate() {
        match outcome {
            ItemOutcome::Done(r) => results.push(r),
            ItemOutcome::Failed(e) => {
                if first_error.is_none() {
                    first_error = Some(DockError::worker(index, e));
                }
            }
            ItemOutcome::Cancelled => {
                first_cancelled.get_or_insert(index);
            }
        }
    }

    if let Some(err) = first_error {
        return Err(err);
    }
    if let Some(index) = first_cancelled {
        return Err(DockError::Cancelled { index });
    }
    Ok(results)
}

/// best-effort 并行映射：不因单项失败终止，逐项返回结果标记
pub fn map_over_best_effort<T, R, F>(
    items: &[T],
    f: F,
    ctx: &ExecutionContext,
) -> Result<Vec<ItemOutcome<R>>>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> Result<R> + Sync + Send,
{
    run(items, f, ctx, false, "Processing")
}

fn run<T, R, F>(
    items: &[T],
    f: F,
    ctx: &ExecutionContext,
    abort_on_failure: bool,
    message: &str,
) -> Result<Vec<ItemOutcome<R>>>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> Result<R> + Sync + Send,
{
    let pool = ctx.pool()?;
    let pb = ctx.progress_bar(items.len(), message);
    let aborted = AtomicBool::new(false);

    tracing::debug!(
        items = items.len(),
        workers = ctx.effective_workers(),
        policy = ?ctx.policy,
        "dispatching batch"
    );

    let outcomes: Vec<ItemOutcome<R>> = pool.install(|| {
        items
            .par_iter()
            .map(|item| {
                if ctx.cancel.is_cancelled() || aborted.load(Ordering::SeqCst) {
                    return ItemOutcome::Cancelled;
                }

                let outcome = match f(item) {
                    Ok(r) => ItemOutcome::Done(r),
                    Err(e) => {
                        if abort_on_failure {
                            aborted.store(true, Ordering::SeqCst);
                        }
                        ItemOutcome::Failed(e)
                    }
                };

                pb.inc(1);
                outcome
            })
            .collect()
    });

    pb.finish_and_clear();
    Ok(outcomes)
}
