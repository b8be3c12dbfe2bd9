//! # validate 子命令 CLI 定义
//!
//! 对规范容器做一致性校验
//!
//! ## 依赖关系
//! - 被 `cli/mod.rs` 使用
//! - 参数传递给 `commands/validate.rs`

use clap::Args;
use std::path::PathBuf;

/// validate 子命令参数
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Canonical container to check
    pub input: PathBuf,

    /// Hermiticity tolerance (element-wise absolute deviation)
    #[arg(long, default_value_t = 1e-6)]
    pub hermiticity_tol: f64,

    /// Lower bound for overlap diagonal entries (exclusive)
    #[arg(long, default_value_t = 0.0)]
    pub overlap_min: f64,

    /// Distance tolerance for the cutoff check
    #[arg(long, default_value_t = 1e-3)]
    pub distance_tol: f64,

    /// Fail (non-zero exit) when any error-level finding is present
    #[arg(long, default_value_t = false)]
    pub strict: bool,

    /// Maximum number of findings to print
    #[arg(short = 'n', long, default_value_t = 30)]
    pub top_n: usize,

    /// Write all findings to this CSV file
    #[arg(long)]
    pub output_csv: Option<PathBuf>,
}
