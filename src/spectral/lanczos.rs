//! # 块 Lanczos 迭代
//!
//! 以 `num_eigenvalues` 个随机向量为起始块构造块 Krylov 子空间，
//! 基向量在 S 内积下完全重正交化（两遍），每步对投影矩阵 Q† H Q 做
//! Rayleigh–Ritz，显式残差 ‖H x - θ S x‖ 低于容差即收敛。
//! 正交基时 S 为单位矩阵；非正交基时扩展方向为 S⁻¹ H q。
//!
//! 块大小不小于所求本征值个数，所以简并本征值按重数出现。
//! 新方向线性相关（子空间不变）时用与已有基正交的随机向量补足块；
//! 只有子空间张满全空间时才按精确收敛返回。
//!
//! ## 依赖关系
//! - 被 `spectral/mod.rs` 与 `spectral/kpm.rs`（谱范围估计）调用
//! - 使用 `spectral/kspace.rs` 的 `BlochOperator`, `spectral/overlap.rs` 的 `Metric`
//! - 使用 `nalgebra::SymmetricEigen` 求解投影矩阵

use crate::error::{DockError, Result};
use crate::spectral::kspace::{BlochOperator, BlochScalar};
use crate::spectral::overlap::Metric;

use nalgebra::{DMatrix, DVector, SymmetricEigen};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

/// 正交化后相对范数低于此值的方向视为线性相关
const DEFLATION_EPS: f64 = 1e-10;

/// 目标本征值
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LanczosTarget {
    #[default]
    Lowest,
    Highest,
    /// 最接近给定能量
    Nearest(f64),
}

/// Lanczos 参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LanczosOptions {
    pub num_eigenvalues: usize,
    /// 块迭代步数上限
    pub max_iterations: usize,
    /// Ritz 残差容差（能量单位）
    pub tolerance: f64,
    pub target: LanczosTarget,
    /// 起始向量种子
    pub seed: u64,
}

impl Default for LanczosOptions {
    fn default() -> Self {
        LanczosOptions {
            num_eigenvalues: 6,
            max_iterations: 300,
            tolerance: 1e-8,
            target: LanczosTarget::Lowest,
            seed: 42,
        }
    }
}

/// Lanczos 结果
#[derive(Debug, Clone)]
pub struct LanczosResult<T: BlochScalar> {
    /// 按目标选出的本征值（升序）
    pub eigenvalues: Vec<f64>,
    /// 对应的 Ritz 残差
    pub residuals: Vec<f64>,
    /// 按列存放的 Ritz 向量，S 归一 (c† S c = 1)；仅在请求时给出
    pub eigenvectors: Option<DMatrix<T>>,
    pub iterations: usize,
}

/// S 正交基张成的 Krylov 子空间及其投影
struct KrylovSpace<'a, T: BlochScalar> {
    op: &'a BlochOperator<T>,
    metric: &'a Metric<'a, T>,
    basis: Vec<DVector<T>>,
    /// S q_i
    s_basis: Vec<DVector<T>>,
    /// H q_i
    h_basis: Vec<DVector<T>>,
    /// Q† H Q
    projected: DMatrix<T>,
}

/// 投影矩阵的 Ritz 对（升序）
struct Ritz<T: BlochScalar> {
    values: Vec<f64>,
    vectors: DMatrix<T>,
}

impl<'a, T: BlochScalar> KrylovSpace<'a, T> {
    fn new(op: &'a BlochOperator<T>, metric: &'a Metric<'a, T>) -> Self {
        KrylovSpace {
            op,
            metric,
            basis: Vec::new(),
            s_basis: Vec::new(),
            h_basis: Vec::new(),
            projected: DMatrix::zeros(0, 0),
        }
    }

    fn dim(&self) -> usize {
        self.basis.len()
    }

    fn is_full(&self) -> bool {
        self.basis.len() >= self.op.dim()
    }

    /// 把候选方向 S 正交化后加入基，返回新加入的基向量序号
    fn extend(&mut self, candidates: Vec<DVector<T>>) -> Vec<usize> {
        let mut added = Vec::new();
        for mut v in candidates {
            if self.is_full() {
                break;
            }
            let before = self.metric.apply(&v).dotc(&v).real().max(0.0).sqrt();
            if before == 0.0 {
                continue;
            }
            for _ in 0..2 {
                for (q, sq) in self.basis.iter().zip(&self.s_basis) {
                    let proj = sq.dotc(&v);
                    v.axpy(-proj, q, T::one());
                }
            }
            let sv = self.metric.apply(&v);
            let after = sv.dotc(&v).real().max(0.0).sqrt();
            if after <= DEFLATION_EPS * before {
                continue;
            }
            let scale = T::from_real(1.0 / after);
            let mut hv = DVector::zeros(v.len());
            self.op.apply(&v, &mut hv);

            self.basis.push(v * scale);
            self.s_basis.push(sv * scale);
            self.h_basis.push(hv * scale);
            added.push(self.basis.len() - 1);
        }

        if !added.is_empty() {
            let m = self.basis.len();
            let old = self.projected.nrows();
            self.projected = self.projected.clone().resize(m, m, T::zero());
            for c in old..m {
                for r in 0..m {
                    let value = self.basis[r].dotc(&self.h_basis[c]);
                    self.projected[(r, c)] = value;
                    self.projected[(c, r)] = value.conjugate();
                }
            }
        }
        added
    }

    fn ritz(&self) -> Ritz<T> {
        let t = &self.projected;
        let hermitian = (t + t.adjoint()).map(|z| z * T::from_real(0.5));
        let eigen = SymmetricEigen::new(hermitian);
        let mut order: Vec<usize> = (0..eigen.eigenvalues.len()).collect();
        order.sort_by(|&a, &b| eigen.eigenvalues[a].total_cmp(&eigen.eigenvalues[b]));

        let m = order.len();
        Ritz {
            values: order.iter().map(|&c| eigen.eigenvalues[c]).collect(),
            vectors: DMatrix::from_fn(m, m, |r, c| eigen.eigenvectors[(r, order[c])]),
        }
    }

    /// Ritz 向量 x = Q y 与残差 H x - θ S x
    fn ritz_vector(&self, y: &DVector<T>, theta: f64) -> (DVector<T>, DVector<T>) {
        let n = self.op.dim();
        let mut x = DVector::zeros(n);
        let mut residual = DVector::zeros(n);
        for (c, weight) in y.iter().enumerate() {
            x.axpy(*weight, &self.basis[c], T::one());
            residual.axpy(*weight, &self.h_basis[c], T::one());
            residual.axpy(*weight * T::from_real(-theta), &self.s_basis[c], T::one());
        }
        (x, residual)
    }

    /// 下一块的扩展方向 S⁻¹ H q
    fn next_directions(&self, block: &[usize]) -> Result<Vec<DVector<T>>> {
        block
            .iter()
            .map(|&c| self.metric.solve(&self.h_basis[c]))
            .collect()
    }
}

fn random_block<T: BlochScalar>(n: usize, count: usize, rng: &mut StdRng) -> Vec<DVector<T>> {
    (0..count)
        .map(|_| DVector::from_fn(n, |_, _| T::random_entry(rng)))
        .collect()
}

/// 按目标选出本征值序号（指向升序 Ritz 值）
fn select(values: &[f64], count: usize, target: LanczosTarget) -> Vec<usize> {
    let n = values.len();
    let count = count.min(n);
    let mut picked: Vec<usize> = match target {
        LanczosTarget::Lowest => (0..count).collect(),
        LanczosTarget::Highest => (n - count..n).collect(),
        LanczosTarget::Nearest(e) => {
            let mut idx: Vec<usize> = (0..n).collect();
            idx.sort_by(|&a, &b| (values[a] - e).abs().total_cmp(&(values[b] - e).abs()));
            idx.truncate(count);
            idx
        }
    };
    picked.sort_unstable();
    picked
}

/// 块 Lanczos 求（广义）本征值
///
/// `with_vectors` 为真时同时返回 Ritz 向量。
pub fn eigenvalues<T: BlochScalar>(
    op: &BlochOperator<T>,
    metric: &Metric<'_, T>,
    options: &LanczosOptions,
    with_vectors: bool,
) -> Result<LanczosResult<T>> {
    let n = op.dim();
    if n == 0 || options.num_eigenvalues == 0 {
        return Err(DockError::InvalidArgument(
            "Lanczos needs a non-empty operator and at least one eigenvalue".to_string(),
        ));
    }
    let wanted_count = options.num_eigenvalues.min(n);

    let mut rng = StdRng::seed_from_u64(options.seed);
    let mut space = KrylovSpace::new(op, metric);
    let mut candidates = random_block(n, wanted_count, &mut rng);
    let mut worst = f64::INFINITY;

    for step in 0..options.max_iterations {
        let mut block = space.extend(candidates);
        if block.len() < wanted_count && !space.is_full() {
            // 方向线性相关（不变子空间）：用正交补中的随机向量补足块
            tracing::debug!(
                dim = space.dim(),
                deflated = wanted_count - block.len(),
                "Krylov block deflated, refilling"
            );
            let refill = random_block(n, wanted_count - block.len(), &mut rng);
            block.extend(space.extend(refill));
        }

        let ritz = space.ritz();
        let wanted = select(&ritz.values, wanted_count, options.target);
        let exhausted = space.is_full() || block.is_empty();

        let mut residuals = Vec::with_capacity(wanted.len());
        let mut vectors = Vec::with_capacity(wanted.len());
        for &c in &wanted {
            let y = ritz.vectors.column(c).into_owned();
            let (x, r) = space.ritz_vector(&y, ritz.values[c]);
            residuals.push(r.norm());
            vectors.push(x);
        }
        worst = residuals.iter().copied().fold(0.0, f64::max);

        let enough = wanted.len() >= wanted_count;
        if exhausted || (enough && worst < options.tolerance) {
            tracing::debug!(
                iterations = step + 1,
                dim = space.dim(),
                residual = worst,
                exhausted,
                "Lanczos converged"
            );
            return Ok(LanczosResult {
                eigenvalues: wanted.iter().map(|&c| ritz.values[c]).collect(),
                residuals,
                eigenvectors: with_vectors.then(|| DMatrix::from_columns(&vectors)),
                iterations: step + 1,
            });
        }

        candidates = space.next_directions(&block)?;
    }

    Err(DockError::Convergence {
        iterations: options.max_iterations,
        residual: worst,
        tolerance: options.tolerance,
    })
}

/// 由短 Krylov 展开估计 S⁻¹H 的谱范围
///
/// 端点取极值 Ritz 值外推其残差的 S⁻¹ 范数。
pub fn spectral_bounds<T: BlochScalar>(
    op: &BlochOperator<T>,
    metric: &Metric<'_, T>,
    steps: usize,
    seed: u64,
) -> Result<(f64, f64)> {
    let n = op.dim();
    if n == 0 {
        return Err(DockError::Schema {
            reason: "cannot bound the spectrum of an empty operator".to_string(),
        });
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let mut space = KrylovSpace::new(op, metric);
    let mut block = space.extend(random_block(n, 1, &mut rng));

    for _ in 1..steps.max(2) {
        if space.is_full() {
            break;
        }
        let next = space.next_directions(&block)?;
        block = space.extend(next);
        if block.is_empty() {
            block = space.extend(random_block(n, 1, &mut rng));
        }
        if block.is_empty() {
            break;
        }
    }

    let ritz = space.ritz();
    let last = ritz.values.len() - 1;
    let margin = |c: usize| -> Result<f64> {
        let y = ritz.vectors.column(c).into_owned();
        let (_, r) = space.ritz_vector(&y, ritz.values[c]);
        metric.dual_norm(&r)
    };
    let lower = ritz.values[0] - margin(0)?;
    let upper = ritz.values[last] + margin(last)?;
    Ok((lower, upper))
}
