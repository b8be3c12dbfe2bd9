//! # 稀疏谱求解模块
//!
//! 直接在块稀疏数据上计算单个 k 点的谱信息。
//!
//! ## 方法
//! - `KernelPolynomial`：Chebyshev 矩展开的态密度，不做对角化
//! - `Lanczos`：极值或指定能量附近的本征值
//! - `Dense`：显式稠密对角化（含重叠矩阵的广义问题）
//!
//! k 点为分数坐标，相位 e^{i2πk·R}。矩阵为实且所有相位为 ±1 时
//! 自动走实对称路径。有非单位重叠矩阵时三种方法都求解广义问题
//! H c = E S c：Dense 用 Cholesky 约化，KPM 与 Lanczos 作用于 S⁻¹H，
//! S⁻¹ 由共轭梯度给出，不组装稠密矩阵。
//!
//! ## 依赖关系
//! - 被 `commands/diagonalize.rs` 与集成测试调用
//! - 使用 `batch/` 在 k 点上并行
//! - 子模块: kspace, overlap, kpm, lanczos, dense

pub mod dense;
pub mod kpm;
pub mod kspace;
pub mod lanczos;
pub mod overlap;

pub use kpm::{KpmKernel, KpmOptions, KpmResult, TraceEstimator};
pub use kspace::{bloch_phase, BlochOperator, BlochScalar};
pub use lanczos::{LanczosOptions, LanczosResult, LanczosTarget};
pub use overlap::{CgOptions, Metric};

use crate::batch::{map_over, ExecutionContext};
use crate::error::{DockError, Result};
use crate::models::{CanonicalDataset, MatrixChannel, SparseBlockMatrix};

use nalgebra::DMatrix;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 谱计算方法
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SpectralMethod {
    #[default]
    KernelPolynomial,
    Lanczos,
    Dense,
}

impl fmt::Display for SpectralMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpectralMethod::KernelPolynomial => write!(f, "kpm"),
            SpectralMethod::Lanczos => write!(f, "lanczos"),
            SpectralMethod::Dense => write!(f, "dense"),
        }
    }
}

impl FromStr for SpectralMethod {
    type Err = DockError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "kpm" | "kernel-polynomial" => Ok(SpectralMethod::KernelPolynomial),
            "lanczos" => Ok(SpectralMethod::Lanczos),
            "dense" | "exact" => Ok(SpectralMethod::Dense),
            other => Err(DockError::InvalidArgument(format!(
                "unknown spectral method '{}'",
                other
            ))),
        }
    }
}

/// 谱计算参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectralOptions {
    pub channel: MatrixChannel,
    pub kpm: KpmOptions,
    pub lanczos: LanczosOptions,
    /// 非单位重叠矩阵存在时是否求解广义问题
    pub use_overlap: bool,
    /// 稀疏方法中 S⁻¹ 的共轭梯度参数
    pub overlap_solver: CgOptions,
    /// Lanczos / Dense 是否同时返回本征向量
    pub eigenvectors: bool,
    /// 允许实对称路径
    pub real_fallback: bool,
}

impl Default for SpectralOptions {
    fn default() -> Self {
        SpectralOptions {
            channel: MatrixChannel::Hamiltonian,
            kpm: KpmOptions::default(),
            lanczos: LanczosOptions::default(),
            use_overlap: true,
            overlap_solver: CgOptions::default(),
            eigenvectors: false,
            real_fallback: true,
        }
    }
}

/// 本征值结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EigenResult {
    pub eigenvalues: Vec<f64>,
    /// Lanczos 的 Ritz 残差；Dense 为空
    pub residuals: Vec<f64>,
    pub iterations: usize,
    /// 按列存放的本征向量，仅在请求时给出
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eigenvectors: Option<DMatrix<Complex64>>,
}

/// 谱结果的内容
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Spectrum {
    Density(KpmResult),
    Eigenvalues(EigenResult),
}

/// 单个 k 点的谱结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpectralResult {
    pub k_point: [f64; 3],
    pub method: SpectralMethod,
    /// 是否走了实对称路径
    pub real_path: bool,
    pub spectrum: Spectrum,
}

impl SpectralResult {
    pub fn eigenvalues(&self) -> Option<&[f64]> {
        match &self.spectrum {
            Spectrum::Eigenvalues(e) => Some(&e.eigenvalues),
            Spectrum::Density(_) => None,
        }
    }

    pub fn density(&self) -> Option<&KpmResult> {
        match &self.spectrum {
            Spectrum::Density(d) => Some(d),
            Spectrum::Eigenvalues(_) => None,
        }
    }
}

/// 计算单个 k 点的谱
pub fn compute_spectrum(
    dataset: &CanonicalDataset,
    k_point: [f64; 3],
    method: SpectralMethod,
    options: &SpectralOptions,
) -> Result<SpectralResult> {
    let hamiltonian = dataset.require(options.channel)?;
    let overlap = if options.use_overlap {
        dataset
            .matrix(MatrixChannel::Overlap)
            .filter(|s| !is_identity_overlap(s))
    } else {
        None
    };
    if overlap.is_some() {
        tracing::debug!(%method, "non-orthogonal basis: solving the generalized problem");
    }

    let real_path = options.real_fallback
        && kspace::admits_real_path(hamiltonian, &k_point)
        && overlap.map_or(true, |s| kspace::admits_real_path(s, &k_point));

    let offsets = dataset.offsets();
    let spectrum = if real_path {
        solve::<f64>(hamiltonian, overlap, &offsets, &k_point, method, options)?
    } else {
        solve::<Complex64>(hamiltonian, overlap, &offsets, &k_point, method, options)?
    };

    Ok(SpectralResult {
        k_point,
        method,
        real_path,
        spectrum,
    })
}

/// 在多个 k 点上并行计算，结果与输入同序
pub fn compute_spectra(
    dataset: &CanonicalDataset,
    k_points: &[[f64; 3]],
    method: SpectralMethod,
    options: &SpectralOptions,
    ctx: &ExecutionContext,
) -> Result<Vec<SpectralResult>> {
    map_over(
        k_points,
        |k| compute_spectrum(dataset, *k, method, options),
        ctx,
    )
}

fn solve<T: BlochScalar>(
    hamiltonian: &SparseBlockMatrix,
    overlap: Option<&SparseBlockMatrix>,
    offsets: &[usize],
    k: &[f64; 3],
    method: SpectralMethod,
    options: &SpectralOptions,
) -> Result<Spectrum> {
    let op = BlochOperator::<T>::new(hamiltonian, offsets, k);
    let s_op = overlap.map(|s| BlochOperator::<T>::new(s, offsets, k));
    let metric = match &s_op {
        Some(s) => Metric::overlap(s, options.overlap_solver),
        None => Metric::identity(),
    };

    match method {
        SpectralMethod::KernelPolynomial => Ok(Spectrum::Density(kpm::density_of_states(
            &op,
            &metric,
            &options.kpm,
        )?)),
        SpectralMethod::Lanczos => {
            let result = lanczos::eigenvalues(&op, &metric, &options.lanczos, options.eigenvectors)?;
            Ok(Spectrum::Eigenvalues(EigenResult {
                eigenvalues: result.eigenvalues,
                residuals: result.residuals,
                iterations: result.iterations,
                eigenvectors: result.eigenvectors.map(to_complex),
            }))
        }
        SpectralMethod::Dense => {
            let (eigenvalues, eigenvectors) = if options.eigenvectors {
                let (values, vectors) = dense::eigenpairs(&op, s_op.as_ref())?;
                (values, Some(to_complex(vectors)))
            } else {
                (dense::eigenvalues(&op, s_op.as_ref())?, None)
            };
            Ok(Spectrum::Eigenvalues(EigenResult {
                eigenvalues,
                residuals: Vec::new(),
                iterations: 0,
                eigenvectors,
            }))
        }
    }
}

fn to_complex<T: BlochScalar>(m: DMatrix<T>) -> DMatrix<Complex64> {
    m.map(|z| Complex64::new(z.real(), z.imaginary()))
}

/// 重叠矩阵是否只有零平移上的单位对角块
fn is_identity_overlap(s: &SparseBlockMatrix) -> bool {
    s.iter().all(|(key, block)| {
        if key.i != key.j || key.r != [0, 0, 0] {
            return block.iter().all(|z| z.norm() < 1e-12);
        }
        block.nrows() == block.ncols()
            && block.iter().enumerate().all(|(idx, z)| {
                let (row, col) = (idx % block.nrows(), idx / block.nrows());
                let expected = if row == col { 1.0 } else { 0.0 };
                (z - Complex64::new(expected, 0.0)).norm() < 1e-12
            })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures;

    #[test]
    fn test_method_from_str() {
        assert_eq!("KPM".parse::<SpectralMethod>().unwrap(), SpectralMethod::KernelPolynomial);
        assert_eq!("dense".parse::<SpectralMethod>().unwrap(), SpectralMethod::Dense);
        assert!("qr".parse::<SpectralMethod>().is_err());
    }

    #[test]
    fn test_real_fallback_is_chosen() {
        let ds = fixtures::two_site_chain(0.3, 0.3);
        let result =
            compute_spectrum(&ds, [0.0; 3], SpectralMethod::Dense, &SpectralOptions::default())
                .unwrap();
        assert!(result.real_path);

        let ring = fixtures::complex_ring(4, 1.0, 0.3);
        let result =
            compute_spectrum(&ring, [0.0; 3], SpectralMethod::Dense, &SpectralOptions::default())
                .unwrap();
        assert!(!result.real_path);
    }

    #[test]
    fn test_lanczos_agrees_with_dense() {
        let ds = fixtures::random_chain(6, 4);
        let options = SpectralOptions {
            lanczos: LanczosOptions {
                num_eigenvalues: 2,
                ..LanczosOptions::default()
            },
            ..SpectralOptions::default()
        };
        let k = [0.25, 0.0, 0.0];
        let exact = compute_spectrum(&ds, k, SpectralMethod::Dense, &options).unwrap();
        let lanczos = compute_spectrum(&ds, k, SpectralMethod::Lanczos, &options).unwrap();

        let exact = exact.eigenvalues().unwrap();
        for (a, b) in lanczos.eigenvalues().unwrap().iter().zip(exact) {
            assert!((a - b).abs() < 1e-8);
        }
    }

    #[test]
    fn test_ring_band_structure() {
        // |E| ≤ 2t + 最大在位能
        let ring = fixtures::complex_ring(6, 1.0, 0.0);
        let ks: Vec<[f64; 3]> = (0..5).map(|i| [i as f64 * 0.1, 0.0, 0.0]).collect();
        let options = SpectralOptions::default();

        let serial = compute_spectra(&ring, &ks, SpectralMethod::Dense, &options, &ExecutionContext::serial())
            .unwrap();
        let parallel = compute_spectra(&ring, &ks, SpectralMethod::Dense, &options, &ExecutionContext::new(4))
            .unwrap();
        assert_eq!(serial, parallel);
        assert_eq!(serial.len(), 5);
        for result in &serial {
            let eig = result.eigenvalues().unwrap();
            assert_eq!(eig.len(), 6);
            assert!(eig.iter().all(|e| e.abs() <= 2.0 + 0.5 + 1e-12));
        }
    }

    #[test]
    fn test_parallel_convergence_failure_keeps_exit_code() {
        let ds = fixtures::random_chain(10, 21);
        let options = SpectralOptions {
            lanczos: LanczosOptions {
                num_eigenvalues: 4,
                max_iterations: 2,
                tolerance: 1e-14,
                ..LanczosOptions::default()
            },
            ..SpectralOptions::default()
        };
        let ks = [[0.1, 0.0, 0.0], [0.2, 0.0, 0.0]];
        let err = compute_spectra(&ds, &ks, SpectralMethod::Lanczos, &options, &ExecutionContext::new(2))
            .unwrap_err();
        assert!(matches!(err, DockError::Worker { .. }));
        assert_eq!(err.exit_code(), 15);
    }

    #[test]
    fn test_missing_channel_is_schema_error() {
        let ds = fixtures::two_site_chain(0.3, 0.3);
        let options = SpectralOptions {
            channel: MatrixChannel::HamiltonianSpinUp,
            ..SpectralOptions::default()
        };
        assert!(matches!(
            compute_spectrum(&ds, [0.0; 3], SpectralMethod::Lanczos, &options),
            Err(DockError::Schema { .. })
        ));
    }

    #[test]
    fn test_identity_overlap_detection() {
        let ds = fixtures::random_chain(2, 1);
        assert!(is_identity_overlap(ds.matrix(MatrixChannel::Overlap).unwrap()));
        assert!(!is_identity_overlap(ds.matrix(MatrixChannel::Hamiltonian).unwrap()));
    }

    #[test]
    fn test_sparse_methods_honour_overlap() {
        let ds = fixtures::nonorthogonal_chain(3, 6, 0.2);
        let options = SpectralOptions {
            lanczos: LanczosOptions {
                num_eigenvalues: 2,
                ..LanczosOptions::default()
            },
            kpm: KpmOptions {
                trace: TraceEstimator::Exact,
                ..KpmOptions::default()
            },
            ..SpectralOptions::default()
        };
        let k = [0.0; 3];
        let dense = compute_spectrum(&ds, k, SpectralMethod::Dense, &options).unwrap();
        let lanczos = compute_spectrum(&ds, k, SpectralMethod::Lanczos, &options).unwrap();
        let exact = dense.eigenvalues().unwrap();
        for (a, b) in lanczos.eigenvalues().unwrap().iter().zip(exact) {
            assert!((a - b).abs() < 1e-8);
        }

        let orthogonal = compute_spectrum(&ds, k, SpectralMethod::Lanczos, &SpectralOptions {
            use_overlap: false,
            ..options.clone()
        })
        .unwrap();
        assert!((orthogonal.eigenvalues().unwrap()[0] - exact[0]).abs() > 1e-4);

        let kpm = compute_spectrum(&ds, k, SpectralMethod::KernelPolynomial, &options).unwrap();
        let density = kpm.density().unwrap();
        assert!(density.e_min <= exact[0]);
        assert!(density.e_max >= exact[exact.len() - 1]);
    }

    #[test]
    fn test_eigenvectors_are_opt_in() {
        let ds = fixtures::two_site_chain(0.3, 0.3);
        let plain = compute_spectrum(&ds, [0.0; 3], SpectralMethod::Dense, &SpectralOptions::default())
            .unwrap();
        let Spectrum::Eigenvalues(plain) = plain.spectrum else {
            panic!("expected eigenvalues");
        };
        assert!(plain.eigenvectors.is_none());
        assert!(!serde_json::to_string(&plain).unwrap().contains("eigenvectors"));

        let options = SpectralOptions {
            eigenvectors: true,
            ..SpectralOptions::default()
        };
        for method in [SpectralMethod::Dense, SpectralMethod::Lanczos] {
            let result = compute_spectrum(&ds, [0.0; 3], method, &options).unwrap();
            let Spectrum::Eigenvalues(eigen) = result.spectrum else {
                panic!("expected eigenvalues");
            };
            let vectors = eigen.eigenvectors.unwrap();
            assert_eq!(vectors.ncols(), eigen.eigenvalues.len());
            assert_eq!(vectors.nrows(), 2);
            for c in 0..vectors.ncols() {
                assert!((vectors.column(c).norm() - 1.0).abs() < 1e-10);
            }
        }
    }
}
