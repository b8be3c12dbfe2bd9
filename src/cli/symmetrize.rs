//! # symmetrize 子命令 CLI 定义
//!
//! 产生对称化后的新容器，输入文件保持不变
//!
//! ## 依赖关系
//! - 被 `cli/mod.rs` 使用
//! - 参数传递给 `commands/symmetrize.rs`

use super::parse_channel;
use clap::Args;
use hamdock::MatrixChannel;
use std::path::PathBuf;

/// symmetrize 子命令参数
#[derive(Args, Debug)]
pub struct SymmetrizeArgs {
    /// Input canonical container
    pub input: PathBuf,

    /// Output container for the symmetrized dataset
    #[arg(short, long)]
    pub output: PathBuf,

    /// JSON file with the space-group operation table
    /// ([{"rotation": [[..],[..],[..]], "translation": [..]}, ...])
    #[arg(long)]
    pub operations: Option<PathBuf>,

    /// Cartesian tolerance for matching atom images
    #[arg(long, default_value_t = 1e-3)]
    pub position_tol: f64,

    /// Restrict symmetrization to these channels (repeatable)
    #[arg(long = "channel", value_parser = parse_channel)]
    pub channels: Vec<MatrixChannel>,

    /// Number of parallel jobs (0 = auto)
    #[arg(short, long, default_value_t = 0, env = "HAMDOCK_JOBS")]
    pub jobs: usize,

    /// Overwrite an existing output file
    #[arg(long, default_value_t = false)]
    pub overwrite: bool,
}
