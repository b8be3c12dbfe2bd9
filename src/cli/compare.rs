//! # compare 子命令 CLI 定义
//!
//! 预测数据集与参考数据集的误差评估；不给参考时只评估厄米残差
//!
//! ## 依赖关系
//! - 被 `cli/mod.rs` 使用
//! - 参数传递给 `commands/compare.rs`

use super::parse_channel;
use clap::Args;
use hamdock::MatrixChannel;
use std::path::PathBuf;

/// compare 子命令参数
#[derive(Args, Debug)]
pub struct CompareArgs {
    /// Predicted dataset (operand A)
    pub predicted: PathBuf,

    /// Reference dataset (operand B); omit for a self-consistency check
    pub reference: Option<PathBuf>,

    /// Matrix channel to compare
    #[arg(long, default_value = "hamiltonian", value_parser = parse_channel)]
    pub channel: MatrixChannel,

    /// Reference magnitudes below this are excluded from relative errors
    #[arg(long, default_value_t = 1e-8)]
    pub relative_floor: f64,

    /// Number of orbital-pair rows to print (sorted by mean absolute error)
    #[arg(short = 'n', long, default_value_t = 10)]
    pub top_n: usize,

    /// Write the per-orbital-pair breakdown to this CSV file
    #[arg(long)]
    pub output_csv: Option<PathBuf>,

    /// Write the full report as JSON
    #[arg(long)]
    pub output_json: Option<PathBuf>,

    /// Number of parallel jobs (0 = auto)
    #[arg(short, long, default_value_t = 0, env = "HAMDOCK_JOBS")]
    pub jobs: usize,
}
