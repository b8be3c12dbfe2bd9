//! # 并行执行层
//!
//! 为转换、对称化、误差评估和谱计算提供粗粒度并行。
//!
//! ## 功能
//! - 显式执行上下文（线程数、失败策略、取消信号）
//! - 结果顺序与输入一致
//! - fail-fast 与 best-effort 两种失败策略
//! - 原生输出目录收集
//!
//! ## 依赖关系
//! - 被各计算模块与命令模块使用
//! - 使用 `rayon` 进行并行处理
//! - 使用 `indicatif` 显示进度

pub mod collector;
pub mod runner;

pub use collector::DatasetCollector;
pub use runner::{
    map_over, map_over_best_effort, BatchSummary, CancelToken, ExecutionContext, FailurePolicy,
    ItemOutcome,
};
