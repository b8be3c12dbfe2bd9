//! # 重叠度量
//!
//! 非正交基下的广义本征问题 H c = E S c 在 S 内积 ⟨x, y⟩_S = x† S y 中
//! 等价于自伴算符 S⁻¹H 的普通本征问题。`Metric` 封装 S 的作用与 S⁻¹ 的求解；
//! S⁻¹ b 用共轭梯度法在块稀疏 S(k) 上求得，不组装稠密矩阵。
//!
//! ## 依赖关系
//! - 被 `spectral/lanczos.rs`, `spectral/kpm.rs`, `spectral/mod.rs` 使用
//! - 使用 `spectral/kspace.rs` 的 `BlochOperator`

use crate::error::{DockError, Result};
use crate::spectral::kspace::{BlochOperator, BlochScalar};

use nalgebra::DVector;
use serde::{Deserialize, Serialize};

/// 共轭梯度参数
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CgOptions {
    /// 相对残差 ‖r‖/‖b‖ 容差
    pub tolerance: f64,
    pub max_iterations: usize,
}

impl Default for CgOptions {
    fn default() -> Self {
        CgOptions {
            tolerance: 1e-12,
            max_iterations: 1000,
        }
    }
}

/// 共轭梯度法求解 S x = b（S 厄米正定）
pub fn conjugate_gradient<T: BlochScalar>(
    s: &BlochOperator<T>,
    b: &DVector<T>,
    options: &CgOptions,
) -> Result<DVector<T>> {
    let n = s.dim();
    let mut x = DVector::zeros(n);
    let b_norm_sq = b.norm_squared();
    if b_norm_sq < 1e-300 {
        return Ok(x);
    }
    let tol_sq = options.tolerance * options.tolerance * b_norm_sq;

    let mut r = b.clone();
    let mut p = r.clone();
    let mut sp = DVector::zeros(n);
    let mut r_norm_sq = b_norm_sq;

    for _ in 0..options.max_iterations {
        s.apply(&p, &mut sp);
        let p_sp = p.dotc(&sp).real();
        if p_sp <= 0.0 {
            return Err(DockError::Schema {
                reason: "overlap matrix is not positive definite".to_string(),
            });
        }
        let alpha = T::from_real(r_norm_sq / p_sp);
        x.axpy(alpha, &p, T::one());
        r.axpy(-alpha, &sp, T::one());

        let r_norm_sq_new = r.norm_squared();
        if r_norm_sq_new < tol_sq {
            return Ok(x);
        }
        let beta = T::from_real(r_norm_sq_new / r_norm_sq);
        r_norm_sq = r_norm_sq_new;
        // p = r + β p
        p.axpy(T::one(), &r, beta);
    }

    Err(DockError::Convergence {
        iterations: options.max_iterations,
        residual: (r_norm_sq / b_norm_sq).sqrt(),
        tolerance: options.tolerance,
    })
}

/// 内积度量：单位矩阵或重叠矩阵 S(k)
#[derive(Debug, Clone, Copy)]
pub struct Metric<'a, T: BlochScalar> {
    overlap: Option<&'a BlochOperator<T>>,
    solver: CgOptions,
}

impl<'a, T: BlochScalar> Metric<'a, T> {
    /// 正交基
    pub fn identity() -> Self {
        Metric {
            overlap: None,
            solver: CgOptions::default(),
        }
    }

    pub fn overlap(s: &'a BlochOperator<T>, solver: CgOptions) -> Self {
        Metric {
            overlap: Some(s),
            solver,
        }
    }

    pub fn is_identity(&self) -> bool {
        self.overlap.is_none()
    }

    /// S x
    pub fn apply(&self, x: &DVector<T>) -> DVector<T> {
        match self.overlap {
            None => x.clone(),
            Some(s) => {
                let mut y = DVector::zeros(x.len());
                s.apply(x, &mut y);
                y
            }
        }
    }

    /// S⁻¹ b
    pub fn solve(&self, b: &DVector<T>) -> Result<DVector<T>> {
        match self.overlap {
            None => Ok(b.clone()),
            Some(s) => conjugate_gradient(s, b, &self.solver),
        }
    }

    /// ‖x‖ 在 S⁻¹ 内积下的范数，用于广义问题的残差界
    pub fn dual_norm(&self, r: &DVector<T>) -> Result<f64> {
        match self.overlap {
            None => Ok(r.norm()),
            Some(_) => Ok(r.dotc(&self.solve(r)?).real().max(0.0).sqrt()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BlockKey, MatrixKind, SparseBlockMatrix};
    use nalgebra::DMatrix;
    use num_complex::Complex64;

    /// 两原子、每原子两轨道的非正交重叠矩阵，跨晶胞耦合
    fn overlap_matrix() -> SparseBlockMatrix {
        let mut s = SparseBlockMatrix::new(MatrixKind::Real);
        let onsite = [1.0, 0.1, 0.1, 1.0];
        s.insert_real(BlockKey::new(0, 0, [0, 0, 0]), 2, 2, &onsite);
        s.insert_real(BlockKey::new(1, 1, [0, 0, 0]), 2, 2, &onsite);
        s.insert_real(BlockKey::new(0, 1, [0, 0, 0]), 2, 2, &[0.2, 0.05, 0.0, 0.15]);
        s.insert_real(BlockKey::new(1, 0, [0, 0, 0]), 2, 2, &[0.2, 0.0, 0.05, 0.15]);
        s.insert_real(BlockKey::new(1, 0, [1, 0, 0]), 2, 2, &[0.1, 0.0, 0.0, 0.1]);
        s.insert_real(BlockKey::new(0, 1, [-1, 0, 0]), 2, 2, &[0.1, 0.0, 0.0, 0.1]);
        s
    }

    #[test]
    fn test_cg_solves_overlap_system() {
        let s = overlap_matrix();
        let op = BlochOperator::<Complex64>::new(&s, &[0, 2, 4], &[0.3, 0.0, 0.0]);
        let b = DVector::from_fn(4, |i, _| Complex64::new(1.0 + i as f64, -0.5 * i as f64));

        let x = conjugate_gradient(&op, &b, &CgOptions::default()).unwrap();
        let mut sx = DVector::zeros(4);
        op.apply(&x, &mut sx);
        assert!((sx - &b).norm() < 1e-10);
    }

    #[test]
    fn test_identity_metric_is_transparent() {
        let metric = Metric::<f64>::identity();
        let v = DVector::from_vec(vec![1.0, -2.0, 3.0]);
        assert!(metric.is_identity());
        assert_eq!(metric.apply(&v), v);
        assert_eq!(metric.solve(&v).unwrap(), v);
        assert!((metric.dual_norm(&v).unwrap() - 14.0f64.sqrt()).abs() < 1e-14);
    }

    #[test]
    fn test_indefinite_overlap_is_rejected() {
        let mut s = SparseBlockMatrix::new(MatrixKind::Real);
        s.insert(BlockKey::new(0, 0, [0, 0, 0]), DMatrix::from_row_slice(2, 2, &[
            Complex64::new(1.0, 0.0),
            Complex64::new(2.0, 0.0),
            Complex64::new(2.0, 0.0),
            Complex64::new(1.0, 0.0),
        ]));
        let op = BlochOperator::<f64>::new(&s, &[0, 2], &[0.0; 3]);
        let b = DVector::from_vec(vec![1.0, -1.0]);
        assert!(matches!(
            conjugate_gradient(&op, &b, &CgOptions::default()),
            Err(DockError::Schema { .. })
        ));
    }
}
