//! # export 子命令 CLI 定义
//!
//! 把实空间切片 H(R) 或 Bloch 矩阵 H(k) 导出为 CSC 三元组 CSV
//!
//! ## 依赖关系
//! - 被 `cli/mod.rs` 使用
//! - 参数传递给 `commands/export.rs`

use super::{parse_channel, parse_translation, parse_vec3};
use clap::Args;
use hamdock::MatrixChannel;
use std::path::PathBuf;

/// export 子命令参数
#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Canonical container
    pub input: PathBuf,

    /// Output CSV file (row,col,re,im)
    #[arg(short, long)]
    pub output: PathBuf,

    /// Matrix channel
    #[arg(long, default_value = "hamiltonian", value_parser = parse_channel)]
    pub channel: MatrixChannel,

    /// Lattice translation "R1,R2,R3" of the real-space slice
    #[arg(short = 'R', long, value_parser = parse_translation, allow_hyphen_values = true, conflicts_with = "kpoint")]
    pub translation: Option<[i32; 3]>,

    /// Fractional k-point "kx,ky,kz" of the Bloch matrix
    #[arg(short = 'k', long, value_parser = parse_vec3, allow_hyphen_values = true)]
    pub kpoint: Option<[f64; 3]>,
}
