//! # CLI 模块
//!
//! 使用 `clap` 定义命令行参数和子命令。
//!
//! ## 命令结构
//! - `convert`: DFT 原生输出 -> 规范容器
//! - `validate`: 一致性校验
//! - `symmetrize`: 厄米/空间群对称化
//! - `compare`: 两个数据集的误差评估，或单个数据集的厄米残差
//! - `diagonalize`: KPM / Lanczos / 稠密谱计算
//! - `export`: 导出 CSC 三元组
//!
//! ## 依赖关系
//! - 被 `main.rs` 使用
//! - 子模块: convert, validate, symmetrize, compare, diagonalize, export

pub mod compare;
pub mod convert;
pub mod diagonalize;
pub mod export;
pub mod symmetrize;
pub mod validate;

use clap::{Parser, Subcommand};
use hamdock::MatrixChannel;

/// hamdock - 稀疏哈密顿量交换格式工具
#[derive(Parser)]
#[command(name = "hamdock")]
#[command(author = "Changjiang Wu")]
#[command(version)]
#[command(about = "Canonical sparse Hamiltonian/overlap datasets: convert, validate, symmetrize, compare, diagonalize", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// 可用的子命令
#[derive(Subcommand)]
pub enum Commands {
    /// Convert native DFT output directories into canonical containers
    Convert(convert::ConvertArgs),

    /// Check a canonical container for structural and physical consistency
    Validate(validate::ValidateArgs),

    /// Produce a Hermitian (and optionally space-group) symmetrized copy
    Symmetrize(symmetrize::SymmetrizeArgs),

    /// Compare a prediction against a reference, or check its Hermiticity
    Compare(compare::CompareArgs),

    /// Evaluate spectra (KPM density of states, Lanczos or dense eigenvalues)
    Diagonalize(diagonalize::DiagonalizeArgs),

    /// Export a real-space or Bloch matrix as CSC triplets
    Export(export::ExportArgs),
}

/// 解析矩阵通道名（容器节名，如 `hamiltonian`、`overlap`）
pub fn parse_channel(s: &str) -> Result<MatrixChannel, String> {
    MatrixChannel::from_section_name(&s.trim().to_lowercase()).ok_or_else(|| {
        let names: Vec<&str> = MatrixChannel::ALL.iter().map(|c| c.section_name()).collect();
        format!("unknown channel '{}' (expected one of: {})", s, names.join(", "))
    })
}

/// 解析逗号分隔的三个实数，如 `0.5,0,0`
pub fn parse_vec3(s: &str) -> Result<[f64; 3], String> {
    let parts: Vec<f64> = s
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .map_err(|e| format!("invalid vector '{}': {}", s, e))?;
    match parts.as_slice() {
        [x, y, z] => Ok([*x, *y, *z]),
        _ => Err(format!("expected 3 components in '{}'", s)),
    }
}

/// 解析逗号分隔的三个整数平移，如 `1,0,-1`
pub fn parse_translation(s: &str) -> Result<[i32; 3], String> {
    let parts: Vec<i32> = s
        .split(',')
        .map(|p| p.trim().parse::<i32>())
        .collect::<Result<_, _>>()
        .map_err(|e| format!("invalid translation '{}': {}", s, e))?;
    match parts.as_slice() {
        [a, b, c] => Ok([*a, *b, *c]),
        _ => Err(format!("expected 3 components in '{}'", s)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use std::path::PathBuf;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_helpers() {
        assert_eq!(parse_channel("Overlap").unwrap(), MatrixChannel::Overlap);
        assert!(parse_channel("density").is_err());
        assert_eq!(parse_vec3("0.5, 0,0").unwrap(), [0.5, 0.0, 0.0]);
        assert!(parse_vec3("1,2").is_err());
        assert_eq!(parse_translation("1,0,-1").unwrap(), [1, 0, -1]);
        assert!(parse_translation("1,0,x").is_err());
    }

    #[test]
    fn test_parse_subcommands() {
        let cli = Cli::try_parse_from([
            "hamdock",
            "-vv",
            "diagonalize",
            "run.json",
            "--method",
            "lanczos",
            "-k",
            "0,0,0",
            "-k",
            "0.5,0,0",
            "--eigenvectors",
            "--output-json",
            "spectra.json",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Diagonalize(args) => {
                assert_eq!(args.k_points, vec![[0.0, 0.0, 0.0], [0.5, 0.0, 0.0]]);
                assert_eq!(args.method, hamdock::spectral::SpectralMethod::Lanczos);
                assert!(args.eigenvectors);
                assert_eq!(args.output_json, Some(PathBuf::from("spectra.json")));
            }
            _ => panic!("expected diagonalize"),
        }
    }
}
