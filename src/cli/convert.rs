//! # convert 子命令 CLI 定义
//!
//! 批量把 DFT 原生输出目录转换为规范容器
//!
//! ## 依赖关系
//! - 被 `cli/mod.rs` 使用
//! - 参数传递给 `commands/convert.rs`

use clap::Args;
use hamdock::parsers::DftCode;
use std::path::PathBuf;

/// convert 子命令参数
#[derive(Args, Debug)]
pub struct ConvertArgs {
    /// A native output directory, or a root containing many of them
    #[arg(short, long)]
    pub input: PathBuf,

    /// Output directory for canonical containers
    #[arg(short, long)]
    pub output: PathBuf,

    /// DFT code that produced the native output (openmx, vasp, qe, fhi-aims, siesta, abacus, wannier90)
    #[arg(short, long)]
    pub code: DftCode,

    /// Recurse into subdirectories
    #[arg(short, long, default_value_t = false)]
    pub recursive: bool,

    /// Marker file glob identifying a native output directory (default: the adapter's own)
    #[arg(short, long)]
    pub marker: Option<String>,

    /// Number of parallel jobs (0 = auto)
    #[arg(short, long, default_value_t = 0, env = "HAMDOCK_JOBS")]
    pub jobs: usize,

    /// Overwrite existing containers
    #[arg(long, default_value_t = false)]
    pub overwrite: bool,

    /// Validate each converted dataset and report findings
    #[arg(long, default_value_t = false)]
    pub validate: bool,
}
