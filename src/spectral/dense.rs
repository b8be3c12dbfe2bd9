//! # 稠密对角化
//!
//! 仅在显式请求 `SpectralMethod::Dense` 时组装稠密 H(k)。
//! 有非单位重叠矩阵时求解广义本征问题 H c = E S c：
//! S = L L†，C = L⁻¹ H L⁻†，再对 C 做厄米本征分解；本征向量回代 c = L⁻† y。
//!
//! ## 依赖关系
//! - 被 `spectral/mod.rs` 调用
//! - 使用 `nalgebra::{Cholesky, SymmetricEigen}`

use crate::error::{DockError, Result};
use crate::spectral::kspace::{BlochOperator, BlochScalar};

use nalgebra::{Cholesky, DMatrix, SymmetricEigen};

/// 普通或广义厄米本征值（升序）
pub fn eigenvalues<T: BlochScalar>(
    hamiltonian: &BlochOperator<T>,
    overlap: Option<&BlochOperator<T>>,
) -> Result<Vec<f64>> {
    let (reduced, _) = reduce(hamiltonian, overlap)?;
    let mut values: Vec<f64> = reduced.symmetric_eigenvalues().iter().copied().collect();
    values.sort_by(|a, b| a.total_cmp(b));
    Ok(values)
}

/// 本征值（升序）与按列存放的本征向量
///
/// 广义问题的本征向量满足 c† S c = 1。
pub fn eigenpairs<T: BlochScalar>(
    hamiltonian: &BlochOperator<T>,
    overlap: Option<&BlochOperator<T>>,
) -> Result<(Vec<f64>, DMatrix<T>)> {
    let (reduced, factor) = reduce(hamiltonian, overlap)?;
    let eigen = SymmetricEigen::new(reduced);
    let mut order: Vec<usize> = (0..eigen.eigenvalues.len()).collect();
    order.sort_by(|&a, &b| eigen.eigenvalues[a].total_cmp(&eigen.eigenvalues[b]));

    let n = order.len();
    let values = order.iter().map(|&c| eigen.eigenvalues[c]).collect();
    let sorted = DMatrix::from_fn(n, n, |r, c| eigen.eigenvectors[(r, order[c])]);
    let vectors = match factor {
        None => sorted,
        // c = L⁻† y
        Some(l) => l
            .adjoint()
            .solve_upper_triangular(&sorted)
            .ok_or_else(singular_factor)?,
    };
    Ok((values, vectors))
}

/// 约化到普通厄米问题，返回约化矩阵与重叠的 Cholesky 因子 L
fn reduce<T: BlochScalar>(
    hamiltonian: &BlochOperator<T>,
    overlap: Option<&BlochOperator<T>>,
) -> Result<(DMatrix<T>, Option<DMatrix<T>>)> {
    let h = hermitize(hamiltonian.to_dense());
    let Some(s) = overlap else {
        return Ok((h, None));
    };
    if s.dim() != hamiltonian.dim() {
        return Err(DockError::Schema {
            reason: format!(
                "overlap dimension {} differs from Hamiltonian dimension {}",
                s.dim(),
                hamiltonian.dim()
            ),
        });
    }
    let chol = Cholesky::new(hermitize(s.to_dense())).ok_or_else(|| DockError::Schema {
        reason: "overlap matrix is not positive definite".to_string(),
    })?;
    let l = chol.l();
    // L⁻¹ H，再 L⁻¹ (L⁻¹ H)† = L⁻¹ H L⁻†
    let half = l.solve_lower_triangular(&h).ok_or_else(singular_factor)?;
    let full = l
        .solve_lower_triangular(&half.adjoint())
        .ok_or_else(singular_factor)?;
    Ok((hermitize(full), Some(l)))
}

fn singular_factor() -> DockError {
    DockError::Schema {
        reason: "overlap Cholesky factor is singular".to_string(),
    }
}

fn hermitize<T: BlochScalar>(m: DMatrix<T>) -> DMatrix<T> {
    let adj = m.adjoint();
    (m + adj).map(|z| z * T::from_real(0.5))
}
