//! # k 空间块稀疏算符
//!
//! H(k) = Σ_R H(R) e^{i2πk·R}，k 为分数坐标。
//! 同一原子对的不同平移在构造时合并为一个块，
//! 算符只以块的形式作用于向量，不组装稠密矩阵。
//!
//! 标量类型 `T` 为 `Complex64`（厄米路径）或 `f64`
//! （矩阵为实且所有相位为 ±1 时的实对称路径）。
//!
//! ## 依赖关系
//! - 被 `spectral/kpm.rs`, `spectral/lanczos.rs`, `spectral/dense.rs`, `store/export.rs` 使用
//! - 使用 `nalgebra`, `num-complex`, `rand`

use crate::models::SparseBlockMatrix;

use nalgebra::{ComplexField, DMatrix, DVector};
use num_complex::Complex64;
use rand::rngs::StdRng;
use rand::Rng;
use std::collections::BTreeMap;
use std::f64::consts::PI;

/// 判定相位为实数的阈值
const REAL_PHASE_EPS: f64 = 1e-12;

/// Bloch 相位 e^{i2πk·R}
pub fn bloch_phase(k: &[f64; 3], r: &[i32; 3]) -> Complex64 {
    let arg = 2.0 * PI * (k[0] * r[0] as f64 + k[1] * r[1] as f64 + k[2] * r[2] as f64);
    Complex64::from_polar(1.0, arg)
}

/// 矩阵为实且所有相位为实数时可走实对称路径
pub fn admits_real_path(matrix: &SparseBlockMatrix, k: &[f64; 3]) -> bool {
    matrix.is_real()
        && matrix
            .translations()
            .iter()
            .all(|r| bloch_phase(k, r).im.abs() < REAL_PHASE_EPS)
}

/// 算符的标量类型
pub trait BlochScalar: ComplexField<RealField = f64> + Copy {
    fn from_complex(z: Complex64) -> Self;

    /// 模为 1 的随机相位
    fn random_phase(rng: &mut StdRng) -> Self;

    /// 随机起始向量分量
    fn random_entry(rng: &mut StdRng) -> Self;
}

impl BlochScalar for f64 {
    fn from_complex(z: Complex64) -> Self {
        z.re
    }

    fn random_phase(rng: &mut StdRng) -> Self {
        if rng.gen::<bool>() {
            1.0
        } else {
            -1.0
        }
    }

    fn random_entry(rng: &mut StdRng) -> Self {
        rng.gen_range(-0.5..0.5)
    }
}

impl BlochScalar for Complex64 {
    fn from_complex(z: Complex64) -> Self {
        z
    }

    fn random_phase(rng: &mut StdRng) -> Self {
        Complex64::from_polar(1.0, rng.gen_range(0.0..2.0 * PI))
    }

    fn random_entry(rng: &mut StdRng) -> Self {
        Complex64::new(rng.gen_range(-0.5..0.5), rng.gen_range(-0.5..0.5))
    }
}

/// 单个 k 点上的块稀疏算符
#[derive(Debug, Clone)]
pub struct BlochOperator<T: BlochScalar> {
    dim: usize,
    /// (行偏移, 列偏移, 合并后的块)
    blocks: Vec<(usize, usize, DMatrix<T>)>,
}

impl<T: BlochScalar> BlochOperator<T> {
    /// `offsets` 为原子轨道偏移，末尾为总维度
    pub fn new(matrix: &SparseBlockMatrix, offsets: &[usize], k: &[f64; 3]) -> Self {
        let mut merged: BTreeMap<(usize, usize), DMatrix<T>> = BTreeMap::new();

        for (key, block) in matrix.iter() {
            let phase = bloch_phase(k, &key.r);
            let term = block.map(|z| T::from_complex(z * phase));
            merged
                .entry((key.i, key.j))
                .and_modify(|acc| *acc += &term)
                .or_insert(term);
        }

        let blocks = merged
            .into_iter()
            .map(|((i, j), block)| (offsets[i], offsets[j], block))
            .collect();

        BlochOperator {
            dim: offsets.last().copied().unwrap_or(0),
            blocks,
        }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// 非零块中的矩阵元数
    pub fn nnz(&self) -> usize {
        self.blocks.iter().map(|(_, _, b)| b.len()).sum()
    }

    /// y = H(k) x
    pub fn apply(&self, x: &DVector<T>, y: &mut DVector<T>) {
        y.fill(T::zero());
        for (row, col, block) in &self.blocks {
            let xs = x.rows(*col, block.ncols());
            y.rows_mut(*row, block.nrows())
                .gemv(T::one(), block, &xs, T::one());
        }
    }

    /// y = (H(k) x - shift·x) / scale
    pub fn apply_scaled(&self, x: &DVector<T>, y: &mut DVector<T>, shift: f64, scale: f64) {
        self.apply(x, y);
        y.axpy(T::from_real(-shift / scale), x, T::from_real(1.0 / scale));
    }

    /// Gershgorin 圆盘给出的谱范围 (下界, 上界)
    pub fn gershgorin_bounds(&self) -> (f64, f64) {
        let mut center = vec![0.0; self.dim];
        let mut radius = vec![0.0; self.dim];

        for (row, col, block) in &self.blocks {
            for a in 0..block.nrows() {
                for b in 0..block.ncols() {
                    let z = block[(a, b)];
                    if row + a == col + b {
                        center[row + a] += z.real();
                    } else {
                        radius[row + a] += z.modulus();
                    }
                }
            }
        }

        let lower = center
            .iter()
            .zip(&radius)
            .map(|(c, r)| c - r)
            .fold(f64::INFINITY, f64::min);
        let upper = center
            .iter()
            .zip(&radius)
            .map(|(c, r)| c + r)
            .fold(f64::NEG_INFINITY, f64::max);
        (lower, upper)
    }

    /// 显式组装稠密矩阵（仅在明确要求时使用）
    pub fn to_dense(&self) -> DMatrix<T> {
        let mut dense = DMatrix::zeros(self.dim, self.dim);
        for (row, col, block) in &self.blocks {
            let mut view = dense.view_mut((*row, *col), (block.nrows(), block.ncols()));
            view += block;
        }
        dense
    }
}
