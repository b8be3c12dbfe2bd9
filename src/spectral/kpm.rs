//! # 核多项式方法 (KPM)
//!
//! 将谱密度展开为 Chebyshev 矩：
//! μ_n = Tr T_n(H̃)，H̃ = (H - b)/a 映射到 [-1, 1]。
//! 非正交基时展开 S⁻¹H（与广义问题同谱），H̃ = (S⁻¹H - b)/a，
//! 谱范围由短 Krylov 展开加残差界估计。
//!
//! 每个矩只需一次块稀疏矩阵向量乘，代价为 (矩阶数 × 非零块数)，
//! 不做稠密对角化。截断振荡由阻尼核 (Jackson / Lorentz) 抑制。
//!
//! ## 依赖关系
//! - 被 `spectral/mod.rs` 调用
//! - 使用 `spectral/kspace.rs` 的 `BlochOperator`, `spectral/overlap.rs` 的 `Metric`
//! - 使用 `spectral/lanczos.rs` 的 `spectral_bounds`（非正交基）
//! - 使用 `rand` 生成随机相位向量（可复现种子）

use crate::error::{DockError, Result};
use crate::spectral::kspace::{BlochOperator, BlochScalar};
use crate::spectral::lanczos;
use crate::spectral::overlap::Metric;

use nalgebra::DVector;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// 阻尼核
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KpmKernel {
    #[default]
    Jackson,
    Lorentz { lambda: f64 },
}

impl KpmKernel {
    /// 阻尼系数 g_n, n = 0..moments
    pub fn coefficients(&self, moments: usize) -> Vec<f64> {
        let m = moments as f64;
        match *self {
            KpmKernel::Jackson => {
                let q = PI / (m + 1.0);
                let cot = q.cos() / q.sin();
                (0..moments)
                    .map(|n| {
                        let n = n as f64;
                        ((m - n + 1.0) * (q * n).cos() + (q * n).sin() * cot) / (m + 1.0)
                    })
                    .collect()
            }
            KpmKernel::Lorentz { lambda } => (0..moments)
                .map(|n| (lambda * (1.0 - n as f64 / m)).sinh() / lambda.sinh())
                .collect(),
        }
    }
}

/// 迹估计方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TraceEstimator {
    /// 对所有单位向量求和（精确，代价乘以维度）
    Exact,
    /// 随机相位向量平均
    Stochastic { vectors: usize, seed: u64 },
}

impl Default for TraceEstimator {
    fn default() -> Self {
        TraceEstimator::Stochastic {
            vectors: 16,
            seed: 42,
        }
    }
}

/// KPM 参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KpmOptions {
    /// Chebyshev 矩阶数
    pub moments: usize,
    pub kernel: KpmKernel,
    pub trace: TraceEstimator,
    /// 输出 DOS 的能量点数（Chebyshev 节点）
    pub points: usize,
    /// 谱范围缩放余量，a = (Emax - Emin) / (2 - padding)
    pub padding: f64,
}

impl Default for KpmOptions {
    fn default() -> Self {
        KpmOptions {
            moments: 256,
            kernel: KpmKernel::Jackson,
            trace: TraceEstimator::default(),
            points: 1024,
            padding: 0.01,
        }
    }
}

/// KPM 结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KpmResult {
    /// 未阻尼的矩 μ_n（已对迹求和）
    pub moments: Vec<f64>,
    /// 阻尼系数 g_n
    pub damping: Vec<f64>,
    /// 谱范围估计
    pub e_min: f64,
    pub e_max: f64,
    /// 态数（矩阵维度）
    pub states: usize,
    /// 升序能量网格
    pub energies: Vec<f64>,
    /// 态密度，∫ρ dE = states
    pub dos: Vec<f64>,
}

impl KpmResult {
    fn center(&self) -> f64 {
        0.5 * (self.e_max + self.e_min)
    }

    /// 积分态密度 N(E)：能量低于 E 的态数
    pub fn integrated_dos(&self, energy: f64) -> f64 {
        let a = self.scale();
        let x = ((energy - self.center()) / a).clamp(-1.0, 1.0);
        let theta = x.acos();

        let mut sum = self.damping[0] * self.moments[0] * (PI - theta) / PI;
        for n in 1..self.moments.len() {
            sum -= 2.0 / PI * self.damping[n] * self.moments[n] * (n as f64 * theta).sin()
                / n as f64;
        }
        sum
    }

    /// 缩放因子 a
    pub fn scale(&self) -> f64 {
        // e_min/e_max 是加过余量后映射到 [-1, 1] 的区间端点
        0.5 * (self.e_max - self.e_min)
    }
}

/// 非正交基谱范围估计用的 Krylov 步数
const BOUND_STEPS: usize = 40;

/// 计算 KPM 态密度
pub fn density_of_states<T: BlochScalar>(
    op: &BlochOperator<T>,
    metric: &Metric<'_, T>,
    options: &KpmOptions,
) -> Result<KpmResult> {
    if options.moments < 2 {
        return Err(DockError::InvalidArgument(
            "KPM needs at least 2 moments".to_string(),
        ));
    }
    if !(0.0..1.0).contains(&options.padding) {
        return Err(DockError::InvalidArgument(format!(
            "KPM padding must lie in [0, 1), got {}",
            options.padding
        )));
    }
    let dim = op.dim();
    if dim == 0 {
        return Err(DockError::Schema {
            reason: "cannot expand the spectrum of an empty operator".to_string(),
        });
    }

    let (lo, hi) = if metric.is_identity() {
        op.gershgorin_bounds()
    } else {
        lanczos::spectral_bounds(op, metric, BOUND_STEPS, 7)?
    };
    let center = 0.5 * (hi + lo);
    // 退化谱（如单个能级）仍需非零宽度
    let width = (hi - lo).max(1e-8);
    let a = width / (2.0 - options.padding);

    let moments = chebyshev_moments(op, metric, options, center, a)?;
    let damping = options.kernel.coefficients(options.moments);

    let mut result = KpmResult {
        moments,
        damping,
        e_min: center - a,
        e_max: center + a,
        states: dim,
        energies: Vec::new(),
        dos: Vec::new(),
    };
    reconstruct(&mut result, options.points);

    tracing::debug!(
        dim,
        moments = options.moments,
        e_min = result.e_min,
        e_max = result.e_max,
        "KPM expansion done"
    );
    Ok(result)
}

/// y = (S⁻¹ H x - center x) / a
fn apply_scaled<T: BlochScalar>(
    op: &BlochOperator<T>,
    metric: &Metric<'_, T>,
    x: &DVector<T>,
    y: &mut DVector<T>,
    center: f64,
    a: f64,
) -> Result<()> {
    if metric.is_identity() {
        op.apply_scaled(x, y, center, a);
        return Ok(());
    }
    op.apply(x, y);
    let mut z = metric.solve(y)?;
    z.axpy(T::from_real(-center / a), x, T::from_real(1.0 / a));
    *y = z;
    Ok(())
}

fn chebyshev_moments<T: BlochScalar>(
    op: &BlochOperator<T>,
    metric: &Metric<'_, T>,
    options: &KpmOptions,
    center: f64,
    a: f64,
) -> Result<Vec<f64>> {
    let dim = op.dim();
    let n_mom = options.moments;
    let mut mu = vec![0.0; n_mom];

    let mut accumulate = |r: &DVector<T>, weight: f64| -> Result<()> {
        let mut prev = r.clone();
        let mut cur = DVector::zeros(dim);
        apply_scaled(op, metric, r, &mut cur, center, a)?;
        let mut next = DVector::zeros(dim);

        mu[0] += weight * r.dotc(&prev).real();
        mu[1] += weight * r.dotc(&cur).real();
        for m in mu.iter_mut().skip(2) {
            // T_{n+1} = 2 H̃ T_n - T_{n-1}
            apply_scaled(op, metric, &cur, &mut next, center, a)?;
            next.axpy(-T::one(), &prev, T::from_real(2.0));
            std::mem::swap(&mut prev, &mut cur);
            std::mem::swap(&mut cur, &mut next);
            *m += weight * r.dotc(&cur).real();
        }
        Ok(())
    };

    match options.trace {
        TraceEstimator::Exact => {
            for i in 0..dim {
                let mut e = DVector::zeros(dim);
                e[i] = T::one();
                accumulate(&e, 1.0)?;
            }
        }
        TraceEstimator::Stochastic { vectors, seed } => {
            if vectors == 0 {
                return Err(DockError::InvalidArgument(
                    "stochastic trace needs at least one random vector".to_string(),
                ));
            }
            let mut rng = StdRng::seed_from_u64(seed);
            let weight = 1.0 / vectors as f64;
            for _ in 0..vectors {
                let r = DVector::from_fn(dim, |_, _| T::random_phase(&mut rng));
                accumulate(&r, weight)?;
            }
        }
    }

    Ok(mu)
}

/// 在 Chebyshev 节点上重建 DOS
fn reconstruct(result: &mut KpmResult, points: usize) {
    let points = points.max(1);
    let a = result.scale();
    let center = result.center();

    let mut energies = Vec::with_capacity(points);
    let mut dos = Vec::with_capacity(points);
    // x_k = cos(π(k + 1/2)/K) 递减，倒序得到升序能量
    for k in (0..points).rev() {
        let theta = PI * (k as f64 + 0.5) / points as f64;
        let x = theta.cos();

        let mut sum = result.damping[0] * result.moments[0];
        for n in 1..result.moments.len() {
            sum += 2.0 * result.damping[n] * result.moments[n] * (n as f64 * theta).cos();
        }
        energies.push(center + a * x);
        dos.push(sum / (PI * theta.sin()) / a);
    }

    result.energies = energies;
    result.dos = dos;
}
