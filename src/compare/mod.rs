//! # 误差评估模块
//!
//! 比较两个共享结构与基组的数据集，或评估单个数据集的厄米自洽性。
//!
//! ## 约定
//! - 缺失的块按零块参与比较
//! - 绝对误差 |a - b| 对 A、B 对称；相对误差 |a - b| / |b| 以 B 为参考，
//!   只在 |b| 超过 `relative_floor` 时计入
//! - 逐块统计在工作线程中完成，按键序合并，结果与线程数无关
//!
//! ## 依赖关系
//! - 被 `commands/compare.rs`、`symmetrize/` 的测试与集成测试调用
//! - 使用 `batch/` 并行处理块
//! - 子模块: report

pub mod report;

pub use report::{
    ElementLocation, ErrorReport, ErrorStats, HermiticityReport, OrbitalPairError,
    SpeciesPairError,
};

use crate::batch::{map_over, ExecutionContext};
use crate::error::{DockError, Result};
use crate::models::{BlockKey, CanonicalDataset, MatrixChannel};
use report::{orbital_label, Accumulator};

use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// 比较参数
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompareOptions {
    pub channel: MatrixChannel,
    /// 参考值模长低于此值的元素不计入相对误差
    pub relative_floor: f64,
}

impl Default for CompareOptions {
    fn default() -> Self {
        CompareOptions {
            channel: MatrixChannel::Hamiltonian,
            relative_floor: 1e-8,
        }
    }
}

/// 单个块的局部统计
struct BlockPartial {
    key: BlockKey,
    total: Accumulator,
    /// 按 (行, 列) 展开的逐元素累加器
    elements: Vec<Accumulator>,
    cols: usize,
    max: Option<(f64, usize, usize)>,
    in_a: bool,
    in_b: bool,
}

/// 比较 A 与 B（默认执行上下文）
pub fn compare(
    a: &CanonicalDataset,
    b: &CanonicalDataset,
    options: &CompareOptions,
) -> Result<ErrorReport> {
    compare_with(a, b, options, &ExecutionContext::default())
}

/// 在给定执行上下文中比较 A 与 B
pub fn compare_with(
    a: &CanonicalDataset,
    b: &CanonicalDataset,
    options: &CompareOptions,
    ctx: &ExecutionContext,
) -> Result<ErrorReport> {
    if !a.shares_layout_with(b) {
        return Err(DockError::StructureMismatch {
            reason: format!(
                "datasets differ in structure or basis ({} vs {})",
                a.structure().formula(),
                b.structure().formula()
            ),
        });
    }
    let ma = a.require(options.channel)?;
    let mb = b.require(options.channel)?;

    let keys: Vec<BlockKey> = ma
        .keys()
        .chain(mb.keys())
        .copied()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let floor = options.relative_floor;

    let partials = map_over(
        &keys,
        |key| {
            let (ba, bb) = (ma.get(key), mb.get(key));
            if let (Some(x), Some(y)) = (ba, bb) {
                if x.shape() != y.shape() {
                    return Err(DockError::StructureMismatch {
                        reason: format!(
                            "block {} has shape {:?} in A and {:?} in B",
                            key,
                            x.shape(),
                            y.shape()
                        ),
                    });
                }
            }
            let (rows, cols) = match (ba, bb) {
                (Some(x), _) | (None, Some(x)) => x.shape(),
                (None, None) => (0, 0),
            };

            let zero = Complex64::new(0.0, 0.0);
            let mut partial = BlockPartial {
                key: *key,
                total: Accumulator::default(),
                elements: vec![Accumulator::default(); rows * cols],
                cols,
                max: None,
                in_a: ba.is_some(),
                in_b: bb.is_some(),
            };
            for row in 0..rows {
                for col in 0..cols {
                    let za = ba.map_or(zero, |m| m[(row, col)]);
                    let zb = bb.map_or(zero, |m| m[(row, col)]);
                    let abs = (za - zb).norm();
                    let reference = zb.norm();
                    let rel = (reference > floor).then(|| abs / reference);

                    partial.total.add(abs, rel);
                    partial.elements[row * cols + col].add(abs, rel);
                    if partial.max.map_or(true, |(m, _, _)| abs > m) {
                        partial.max = Some((abs, row, col));
                    }
                }
            }
            Ok(partial)
        },
        ctx,
    )?;

    let species = &a.structure().species;
    let basis = a.basis();
    let mut total = Accumulator::default();
    let mut max_location: Option<(f64, ElementLocation)> = None;
    let mut by_species: BTreeMap<(String, String), Accumulator> = BTreeMap::new();
    let mut by_orbital: BTreeMap<(String, String, usize, usize), Accumulator> = BTreeMap::new();
    let (mut missing_in_a, mut missing_in_b) = (0, 0);

    for partial in &partials {
        if !partial.in_a {
            missing_in_a += 1;
        }
        if !partial.in_b {
            missing_in_b += 1;
        }
        total.merge(&partial.total);

        if let Some((abs, row, col)) = partial.max {
            if max_location.as_ref().map_or(true, |(m, _)| abs > *m) {
                max_location = Some((
                    abs,
                    ElementLocation {
                        key: partial.key,
                        row,
                        col,
                    },
                ));
            }
        }

        let si = species[partial.key.i].clone();
        let sj = species[partial.key.j].clone();
        by_species
            .entry((si.clone(), sj.clone()))
            .or_default()
            .merge(&partial.total);
        for (index, acc) in partial.elements.iter().enumerate() {
            let (row, col) = (index / partial.cols, index % partial.cols);
            by_orbital
                .entry((si.clone(), sj.clone(), row, col))
                .or_default()
                .merge(acc);
        }
    }

    let per_species_pair = by_species
        .into_iter()
        .map(|((species_i, species_j), acc)| SpeciesPairError {
            species_i,
            species_j,
            stats: acc.finish(),
        })
        .collect();

    let per_orbital_pair = by_orbital
        .into_iter()
        .map(|((species_i, species_j, orbital_i, orbital_j), acc)| {
            let label = |sp: &str, index: usize| {
                basis
                    .orbital_labels(sp)
                    .get(index)
                    .map(|&(shell, l, m)| orbital_label(shell, l, m))
                    .unwrap_or_else(|| index.to_string())
            };
            OrbitalPairError {
                label_i: label(&species_i, orbital_i),
                label_j: label(&species_j, orbital_j),
                species_i,
                species_j,
                orbital_i,
                orbital_j,
                stats: acc.finish(),
            }
        })
        .collect();

    let stats = total.finish();
    tracing::debug!(
        channel = %options.channel,
        blocks = keys.len(),
        elements = stats.count,
        mae = stats.mean_abs,
        "comparison finished"
    );

    Ok(ErrorReport {
        channel: options.channel,
        element_count: stats.count,
        mean_abs: stats.mean_abs,
        max_abs: stats.max_abs,
        rmse: stats.rmse,
        mean_rel: stats.mean_rel,
        max_rel: stats.max_rel,
        max_location: max_location.map(|(_, loc)| loc),
        per_species_pair,
        per_orbital_pair,
        missing_in_a,
        missing_in_b,
    })
}

/// 单个数据集的厄米残差 |H(i,j,R) - H(j,i,-R)†|
///
/// 每对伙伴只比较一次；缺少伙伴的块与零块比较并计入 `unpaired`。
pub fn self_consistency(
    dataset: &CanonicalDataset,
    channel: MatrixChannel,
) -> Result<HermiticityReport> {
    let matrix = dataset.require(channel)?;

    let mut max_residual = 0.0f64;
    let mut sum = 0.0;
    let mut count = 0usize;
    let mut worst_key = None;
    let mut pairs = 0;
    let mut unpaired = 0;

    for (key, block) in matrix.iter() {
        let partner = key.partner();
        let residuals: Vec<f64> = match matrix.get(&partner) {
            Some(other) => {
                if !key.is_canonical() {
                    continue;
                }
                if other.shape() != (block.ncols(), block.nrows()) {
                    return Err(DockError::Schema {
                        reason: format!(
                            "block {} and its partner {} have incompatible shapes",
                            key, partner
                        ),
                    });
                }
                pairs += 1;
                let adjoint = other.adjoint();
                block
                    .iter()
                    .zip(adjoint.iter())
                    .map(|(x, y)| (x - y).norm())
                    .collect()
            }
            None => {
                unpaired += 1;
                block.iter().map(|z| z.norm()).collect()
            }
        };

        for r in residuals {
            sum += r;
            count += 1;
            if r > max_residual {
                max_residual = r;
                worst_key = Some(*key);
            }
        }
    }

    Ok(HermiticityReport {
        channel,
        max_residual,
        mean_residual: if count > 0 { sum / count as f64 } else { 0.0 },
        worst_key,
        pairs,
        unpaired,
    })
}
