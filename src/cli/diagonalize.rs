//! # diagonalize 子命令 CLI 定义
//!
//! 在一组 k 点上计算谱：KPM 态密度、Lanczos 或稠密本征值
//!
//! ## 依赖关系
//! - 被 `cli/mod.rs` 使用
//! - 参数传递给 `commands/diagonalize.rs`

use super::{parse_channel, parse_vec3};
use clap::{Args, ValueEnum};
use hamdock::spectral::SpectralMethod;
use hamdock::MatrixChannel;
use std::path::PathBuf;

/// KPM 阻尼核
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum KernelChoice {
    /// Jackson kernel
    Jackson,
    /// Lorentz kernel (see --lorentz-lambda)
    Lorentz,
}

/// Lanczos 目标
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum TargetChoice {
    /// Lowest eigenvalues
    Lowest,
    /// Highest eigenvalues
    Highest,
    /// Eigenvalues nearest to --energy
    Nearest,
}

/// diagonalize 子命令参数
#[derive(Args, Debug)]
pub struct DiagonalizeArgs {
    /// Canonical container
    pub input: PathBuf,

    /// Spectral method (kpm, lanczos, dense)
    #[arg(short, long, default_value = "kpm")]
    pub method: SpectralMethod,

    /// Fractional k-point "kx,ky,kz" (repeatable)
    #[arg(short = 'k', long = "kpoint", value_parser = parse_vec3, default_value = "0,0,0")]
    pub k_points: Vec<[f64; 3]>,

    /// Hamiltonian channel
    #[arg(long, default_value = "hamiltonian", value_parser = parse_channel)]
    pub channel: MatrixChannel,

    /// JSON file with solver options; command-line flags override it
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Number of Chebyshev moments (KPM)
    #[arg(long)]
    pub moments: Option<usize>,

    /// Damping kernel (KPM)
    #[arg(long, value_enum)]
    pub kernel: Option<KernelChoice>,

    /// Lorentz kernel resolution parameter
    #[arg(long, default_value_t = 4.0)]
    pub lorentz_lambda: f64,

    /// Number of energy points for the density of states (KPM)
    #[arg(long)]
    pub points: Option<usize>,

    /// Random vectors for the stochastic trace; 0 uses the exact trace (KPM)
    #[arg(long)]
    pub random_vectors: Option<usize>,

    /// Random seed (KPM trace vectors, Lanczos start vector)
    #[arg(long)]
    pub seed: Option<u64>,

    /// Number of eigenvalues (Lanczos)
    #[arg(long)]
    pub num_eigenvalues: Option<usize>,

    /// Maximum number of block Krylov steps (Lanczos)
    #[arg(long)]
    pub max_iterations: Option<usize>,

    /// Ritz residual tolerance (Lanczos)
    #[arg(long)]
    pub tolerance: Option<f64>,

    /// Which part of the spectrum to target (Lanczos)
    #[arg(long, value_enum)]
    pub target: Option<TargetChoice>,

    /// Target energy for --target nearest
    #[arg(long, allow_hyphen_values = true)]
    pub energy: Option<f64>,

    /// Ignore the overlap matrix (solve the orthogonal problem)
    #[arg(long, default_value_t = false)]
    pub no_overlap: bool,

    /// Always use the complex Hermitian path
    #[arg(long, default_value_t = false)]
    pub complex: bool,

    /// Also compute eigenvectors (Lanczos, dense)
    #[arg(long, default_value_t = false)]
    pub eigenvectors: bool,

    /// Write eigenvalues or DOS curves to this CSV file
    #[arg(long)]
    pub output_csv: Option<PathBuf>,

    /// Write the full results (including eigenvectors) as JSON
    #[arg(long)]
    pub output_json: Option<PathBuf>,

    /// Number of parallel jobs over k-points (0 = auto)
    #[arg(short, long, default_value_t = 0, env = "HAMDOCK_JOBS")]
    pub jobs: usize,
}
