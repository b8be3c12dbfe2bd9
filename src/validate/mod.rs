//! # 一致性校验模块
//!
//! 对规范数据集做只读的结构与物理合理性检查。
//!
//! ## 检查项
//! - 晶格右手系
//! - 基组覆盖结构中的每个元素，且不列出多余元素
//! - 厄米性偏差（容差 ε_h）与缺失伙伴
//! - 重叠矩阵对角元为正
//! - 给定截断半径与晶格时的块数合理性
//!
//! 块形状与原子索引在 `CanonicalDataset::new` 构造时已经检查，这里不重复。
//! 所有发现项都在整个数据集上累积后返回，不在第一个问题处中止。
//! 严格模式下存在 error 级发现项时转换为 `SchemaError`。
//!
//! ## 依赖关系
//! - 被 `commands/validate.rs` 与集成测试调用
//! - 使用 `models/`
//! - 子模块: report

pub mod report;

pub use report::{Finding, FindingCode, Location, Severity, ValidationReport};

use crate::error::{DockError, Result};
use crate::models::{
    max_abs_diff, AtomicStructure, BlockKey, CanonicalDataset, MatrixChannel, SparseBlockMatrix,
};
use crate::models::structure::{cross, norm};

use serde::{Deserialize, Serialize};

/// 校验容差
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tolerances {
    /// 厄米性偏差 ε_h（逐元素绝对值）
    pub hermiticity: f64,
    /// 重叠矩阵对角元下限（严格大于）
    pub overlap_diagonal_min: f64,
    /// 距离比较容差（长度单位）
    pub distance: f64,
}

impl Default for Tolerances {
    fn default() -> Self {
        Tolerances {
            hermiticity: 1e-6,
            overlap_diagonal_min: 0.0,
            distance: 1e-3,
        }
    }
}

/// 校验数据集，返回完整报告
pub fn validate(dataset: &CanonicalDataset, tolerances: &Tolerances) -> ValidationReport {
    let mut report = ValidationReport::default();

    check_lattice(dataset.structure(), &mut report);
    check_basis_dimensions(dataset, &mut report);
    for (channel, matrix) in dataset.matrices() {
        check_hermiticity(*channel, matrix, tolerances, &mut report);
    }
    if let Some(overlap) = dataset.matrix(MatrixChannel::Overlap) {
        check_overlap_diagonal(dataset.structure().atom_count(), overlap, tolerances, &mut report);
    }
    match dataset.metadata().cutoff_radius {
        Some(cutoff) => check_block_count(dataset, cutoff, tolerances, &mut report),
        None => tracing::debug!("no cutoff radius declared, block-count check skipped"),
    }

    tracing::debug!(
        errors = report.error_count(),
        warnings = report.warning_count(),
        "validation finished"
    );
    report
}

/// 严格模式：存在 error 级发现项时返回 `SchemaError`
pub fn validate_strict(
    dataset: &CanonicalDataset,
    tolerances: &Tolerances,
) -> Result<ValidationReport> {
    let report = validate(dataset, tolerances);
    if report.has_errors() {
        let first = report
            .errors()
            .next()
            .map(|f| format!("{} at {}: {}", f.code, f.location, f.message))
            .unwrap_or_default();
        return Err(DockError::Schema {
            reason: format!(
                "{} error(s), {} warning(s); first: {}",
                report.error_count(),
                report.warning_count(),
                first
            ),
        });
    }
    Ok(report)
}

fn check_lattice(structure: &AtomicStructure, report: &mut ValidationReport) {
    let volume = structure.lattice.volume();
    if volume.abs() < 1e-10 {
        report.push(
            Severity::Error,
            FindingCode::LatticeHandedness,
            Location::Global,
            None,
            "lattice vectors are linearly dependent",
        );
    } else if volume < 0.0 {
        report.push(
            Severity::Error,
            FindingCode::LatticeHandedness,
            Location::Global,
            None,
            format!("lattice is left-handed (signed volume {:.6})", volume),
        );
    }
}

fn check_basis_dimensions(dataset: &CanonicalDataset, report: &mut ValidationReport) {
    let structure = dataset.structure();
    let basis = dataset.basis();

    for (i, sp) in structure.species.iter().enumerate() {
        match basis.orbital_count(sp) {
            Some(0) | None => report.push(
                Severity::Error,
                FindingCode::BasisDimension,
                Location::Atom { i },
                None,
                format!("species '{}' has no orbitals in the basis", sp),
            ),
            Some(_) => {}
        }
    }

    for sp in basis.shells.keys() {
        if !structure.species.contains(sp) {
            report.push(
                Severity::Warning,
                FindingCode::BasisDimension,
                Location::Global,
                None,
                format!("basis lists species '{}' that does not occur in the structure", sp),
            );
        }
    }
}

fn check_hermiticity(
    channel: MatrixChannel,
    matrix: &SparseBlockMatrix,
    tolerances: &Tolerances,
    report: &mut ValidationReport,
) {
    for (key, block) in matrix.iter() {
        let partner = key.partner();
        match matrix.get(&partner) {
            None => report.push(
                Severity::Warning,
                FindingCode::MissingPartner,
                pair(key),
                Some(channel),
                format!("partner block {} is absent", partner),
            ),
            // 每对只比较一次；形状不符已由基组维度检查报告
            Some(other) if key.is_canonical() && (other.ncols(), other.nrows()) == block.shape() => {
                let deviation = max_abs_diff(block, &other.adjoint());
                if deviation > tolerances.hermiticity {
                    report.push(
                        Severity::Error,
                        FindingCode::Hermiticity,
                        pair(key),
                        Some(channel),
                        format!(
                            "max |H(i,j,R) - H(j,i,-R)†| = {:.3e} exceeds {:.1e}",
                            deviation, tolerances.hermiticity
                        ),
                    );
                }
            }
            Some(_) => {}
        }
    }
}

fn check_overlap_diagonal(
    atoms: usize,
    overlap: &SparseBlockMatrix,
    tolerances: &Tolerances,
    report: &mut ValidationReport,
) {
    for i in 0..atoms {
        let key = BlockKey::new(i, i, [0, 0, 0]);
        let block = match overlap.get(&key) {
            Some(b) => b,
            None => {
                report.push(
                    Severity::Error,
                    FindingCode::OverlapDiagonal,
                    Location::Atom { i },
                    Some(MatrixChannel::Overlap),
                    "onsite overlap block is missing",
                );
                continue;
            }
        };
        for a in 0..block.nrows().min(block.ncols()) {
            let value = block[(a, a)];
            if value.re <= tolerances.overlap_diagonal_min {
                report.push(
                    Severity::Error,
                    FindingCode::OverlapDiagonal,
                    Location::Atom { i },
                    Some(MatrixChannel::Overlap),
                    format!("diagonal element {} is {:.6e}, must be positive", a, value.re),
                );
            }
        }
    }
}

fn check_block_count(
    dataset: &CanonicalDataset,
    cutoff: f64,
    tolerances: &Tolerances,
    report: &mut ValidationReport,
) {
    let structure = dataset.structure();
    let limit = cutoff + tolerances.distance;
    let atoms = structure.atom_count();

    for (channel, matrix) in dataset.matrices() {
        for key in matrix.keys() {
            if key.i >= atoms || key.j >= atoms {
                continue;
            }
            let folded = (0..3).any(|ax| !structure.periodic[ax] && key.r[ax] != 0);
            if folded {
                report.push(
                    Severity::Error,
                    FindingCode::BlockCount,
                    pair(key),
                    Some(*channel),
                    "translation along a non-periodic direction",
                );
                continue;
            }
            let d = structure.pair_distance(key.i, key.j, &key.r);
            if d > limit {
                report.push(
                    Severity::Warning,
                    FindingCode::CutoffExceeded,
                    pair(key),
                    Some(*channel),
                    format!("pair distance {:.4} exceeds cutoff {:.4}", d, cutoff),
                );
            }
        }
    }

    let Some(admissible) = admissible_pairs(structure, limit) else {
        tracing::warn!(
            cutoff,
            "cutoff spans too many lattice translations, block count check skipped"
        );
        return;
    };
    for (channel, matrix) in dataset.matrices() {
        if matrix.len() > admissible {
            report.push(
                Severity::Error,
                FindingCode::BlockCount,
                Location::Global,
                Some(*channel),
                format!(
                    "{} blocks stored, but only {} atom pairs lie within the cutoff",
                    matrix.len(),
                    admissible
                ),
            );
        }
    }
}

/// 枚举原子对时允许检查的 (i, j, R) 候选数上限
const MAX_PAIR_CANDIDATES: f64 = 1e7;

/// 截断半径内的 (i, j, R) 原子对数；候选过多时为 `None`
fn admissible_pairs(structure: &AtomicStructure, limit: f64) -> Option<usize> {
    let [a, b, c] = structure.lattice.matrix;
    let volume = structure.lattice.volume().abs();
    if volume < 1e-10 {
        return Some(0);
    }
    // 沿每个晶格方向的晶面间距
    let spacing = [
        volume / norm(&cross(&b, &c)),
        volume / norm(&cross(&c, &a)),
        volume / norm(&cross(&a, &b)),
    ];
    let atoms = structure.atom_count();
    let mut reach_f = [0.0f64; 3];
    for ax in 0..3 {
        if structure.periodic[ax] {
            reach_f[ax] = (limit / spacing[ax]).ceil() + 1.0;
        }
    }
    let candidates = reach_f.iter().map(|r| 2.0 * r + 1.0).product::<f64>() * (atoms * atoms) as f64;
    if !candidates.is_finite() || candidates > MAX_PAIR_CANDIDATES {
        return None;
    }
    let reach = reach_f.map(|r| r as i32);

    let mut count = 0;
    for r0 in -reach[0]..=reach[0] {
        for r1 in -reach[1]..=reach[1] {
            for r2 in -reach[2]..=reach[2] {
                let r = [r0, r1, r2];
                for i in 0..atoms {
                    for j in 0..atoms {
                        if structure.pair_distance(i, j, &r) <= limit {
                            count += 1;
                        }
                    }
                }
            }
        }
    }
    Some(count)
}

fn pair(key: &BlockKey) -> Location {
    Location::Pair {
        i: key.i,
        j: key.j,
        r: key.r,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{fixtures, Lattice, MatrixKind, Metadata};
    use std::sync::Arc;

    fn with_hamiltonian(ds: &CanonicalDataset, h: SparseBlockMatrix) -> CanonicalDataset {
        let mut matrices = ds.matrices().clone();
        matrices.insert(MatrixChannel::Hamiltonian, h);
        ds.derive(matrices, ds.metadata().clone()).unwrap()
    }

    #[test]
    fn test_clean_dataset() {
        let ds = fixtures::complex_ring(4, 1.0, 0.3);
        let report = validate(&ds, &Tolerances::default());
        assert!(report.is_clean(), "{:?}", report.findings);
        assert!(validate_strict(&ds, &Tolerances::default()).is_ok());
    }

    #[test]
    fn test_basis_coverage_findings() {
        let ds = fixtures::two_site_chain(0.3, 0.3);
        let basis = ds.basis().clone().with_species("O", vec![0, 1]);
        let ds = CanonicalDataset::new(
            Arc::new(ds.structure().clone()),
            Arc::new(basis),
            ds.matrices().clone(),
            ds.metadata().clone(),
        )
        .unwrap();

        let report = validate(&ds, &Tolerances::default());
        let found: Vec<_> = report.with_code(FindingCode::BasisDimension).collect();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].severity, Severity::Warning);
        assert!(found[0].message.contains("'O'"));
    }

    #[test]
    fn test_hermiticity_violation() {
        let ds = fixtures::two_site_chain(0.3, 0.32);
        let report = validate(&ds, &Tolerances::default());
        let found: Vec<_> = report.with_code(FindingCode::Hermiticity).collect();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].severity, Severity::Error);
        assert_eq!(found[0].location, Location::Pair { i: 0, j: 1, r: [0, 0, 0] });

        let loose = Tolerances {
            hermiticity: 0.05,
            ..Tolerances::default()
        };
        assert!(validate(&ds, &loose).with_code(FindingCode::Hermiticity).next().is_none());
    }

    #[test]
    fn test_findings_accumulate() {
        // 非厄米 + 缺伙伴 + 超截断，全部一次报告
        let ds = fixtures::two_site_chain(0.3, 0.32);
        let mut h = ds.matrix(MatrixChannel::Hamiltonian).unwrap().clone();
        h.insert_real(BlockKey::new(0, 1, [1, 0, 0]), 1, 1, &[0.01]);
        let ds = with_hamiltonian(&ds, h);

        let report = validate(&ds, &Tolerances::default());
        assert_eq!(report.with_code(FindingCode::Hermiticity).count(), 1);
        assert_eq!(report.with_code(FindingCode::MissingPartner).count(), 1);
        assert_eq!(report.with_code(FindingCode::CutoffExceeded).count(), 1);

        match validate_strict(&ds, &Tolerances::default()).unwrap_err() {
            DockError::Schema { reason } => assert!(reason.starts_with("1 error(s), 2 warning(s)")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_overlap_diagonal_positivity() {
        let ds = fixtures::two_site_chain(0.3, 0.3);
        let mut s = SparseBlockMatrix::new(MatrixKind::Real);
        s.insert_real(BlockKey::new(0, 0, [0, 0, 0]), 1, 1, &[-0.5]);
        let mut matrices = ds.matrices().clone();
        matrices.insert(MatrixChannel::Overlap, s);
        let ds = ds.derive(matrices, ds.metadata().clone()).unwrap();

        let report = validate(&ds, &Tolerances::default());
        let found: Vec<_> = report.with_code(FindingCode::OverlapDiagonal).collect();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].location, Location::Atom { i: 0 });
        assert_eq!(found[1].location, Location::Atom { i: 1 });
    }

    #[test]
    fn test_left_handed_lattice() {
        let ds = fixtures::two_site_chain(0.3, 0.3);
        let mut structure = ds.structure().clone();
        structure.lattice = Lattice::from_vectors([[0.0, 10.0, 0.0], [10.0, 0.0, 0.0], [0.0, 0.0, 10.0]]);
        let ds = CanonicalDataset::new(
            std::sync::Arc::new(structure),
            ds.basis_arc().clone(),
            ds.matrices().clone(),
            ds.metadata().clone(),
        )
        .unwrap();

        let report = validate(&ds, &Tolerances::default());
        assert_eq!(report.with_code(FindingCode::LatticeHandedness).count(), 1);
    }

    #[test]
    fn test_block_count_exceeds_admissible_pairs() {
        // 截断 1 Å 内只有两个在位对，却存了三个块
        let ds = fixtures::two_site_chain(0.3, 0.3);
        let metadata = Metadata {
            cutoff_radius: Some(1.0),
            ..ds.metadata().clone()
        };
        let ds = ds.derive(ds.matrices().clone(), metadata).unwrap();

        let report = validate(&ds, &Tolerances::default());
        let counts: Vec<_> = report
            .with_code(FindingCode::BlockCount)
            .filter(|f| f.channel == Some(MatrixChannel::Hamiltonian))
            .collect();
        assert_eq!(counts.len(), 1);
        assert_eq!(report.with_code(FindingCode::CutoffExceeded).count(), 2);
    }

    #[test]
    fn test_huge_cutoff_skips_block_count() {
        let ds = fixtures::random_chain(1, 3);
        let metadata = Metadata {
            cutoff_radius: Some(1e4),
            ..ds.metadata().clone()
        };
        let ds = ds.derive(ds.matrices().clone(), metadata).unwrap();

        let report = validate(&ds, &Tolerances::default());
        assert_eq!(report.with_code(FindingCode::BlockCount).count(), 0);
        assert_eq!(report.with_code(FindingCode::CutoffExceeded).count(), 0);
    }

    #[test]
    fn test_non_periodic_translation() {
        let ds = fixtures::complex_ring(3, 1.0, 0.0);
        let mut h = ds.matrix(MatrixChannel::Hamiltonian).unwrap().clone();
        let key = BlockKey::new(0, 0, [0, 1, 0]);
        h.insert_real(key, 1, 1, &[0.01]);
        h.insert_real(key.partner(), 1, 1, &[0.01]);
        let ds = with_hamiltonian(&ds, h);

        let report = validate(&ds, &Tolerances::default());
        let per_pair = report
            .with_code(FindingCode::BlockCount)
            .filter(|f| matches!(f.location, Location::Pair { .. }))
            .count();
        assert_eq!(per_pair, 2);
        // 9 个可容纳原子对，存了 11 个块
        assert_eq!(report.with_code(FindingCode::BlockCount).count(), 3);
    }
}
