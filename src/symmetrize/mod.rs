//! # 对称化模块
//!
//! 从输入数据集产生新的对称化数据集，输入永不修改。
//!
//! ## 步骤
//! 1. 厄米配对平均：(i,j,R) 与 (j,i,-R) 替换为 (H + P†)/2 及其共轭转置。
//!    缺失的伙伴视为零块并记录警告，同时补上伙伴块。
//! 2. 可选的空间群平均：对外部提供的对称操作表，
//!    把每个块映射到其像 (g(i), g(j), R')，乘以轨道旋转矩阵后对群求平均。
//!
//! 两步可交换，结果与操作顺序无关（在数值误差内）。
//!
//! ## 依赖关系
//! - 被 `commands/symmetrize.rs` 与集成测试调用
//! - 使用 `batch/` 并行处理块对与对称操作
//! - 子模块: rotation

pub mod rotation;

pub use rotation::{atom_rotation, map_atoms, orbital_rotation, AtomImage, SymmetryOperation};

use crate::batch::{map_over, ExecutionContext};
use crate::error::{DockError, Result};
use crate::models::{
    AtomicStructure, BasisDescriptor, Block, BlockKey, CanonicalDataset, MatrixChannel,
    SparseBlockMatrix,
};

use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// 对称化参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SymmetrizeOptions {
    /// 空间群操作表；None 时只做厄米平均
    pub operations: Option<Vec<SymmetryOperation>>,
    /// 原子像匹配的笛卡尔容差
    pub position_tolerance: f64,
    /// 处理的通道；None 表示全部
    pub channels: Option<Vec<MatrixChannel>>,
}

impl Default for SymmetrizeOptions {
    fn default() -> Self {
        SymmetrizeOptions {
            operations: None,
            position_tolerance: 1e-3,
            channels: None,
        }
    }
}

/// 对称化结果
#[derive(Debug, Clone)]
pub struct SymmetrizeOutcome {
    pub dataset: CanonicalDataset,
    /// 原数据集中缺失、按零处理的伙伴块（去重、有序）
    pub missing_partners: Vec<BlockKey>,
}

/// 对称化（默认执行上下文）
pub fn symmetrize(
    dataset: &CanonicalDataset,
    options: &SymmetrizeOptions,
) -> Result<SymmetrizeOutcome> {
    symmetrize_with(dataset, options, &ExecutionContext::default())
}

/// 在给定执行上下文中对称化
pub fn symmetrize_with(
    dataset: &CanonicalDataset,
    options: &SymmetrizeOptions,
    ctx: &ExecutionContext,
) -> Result<SymmetrizeOutcome> {
    let group = match &options.operations {
        Some(ops) => Some(GroupTables::build(
            dataset.structure(),
            dataset.basis(),
            ops,
            options.position_tolerance,
        )?),
        None => None,
    };

    let mut matrices = BTreeMap::new();
    let mut missing = BTreeSet::new();

    for (channel, matrix) in dataset.matrices() {
        let selected = options
            .channels
            .as_ref()
            .map_or(true, |chs| chs.contains(channel));
        if !selected {
            matrices.insert(*channel, matrix.clone());
            continue;
        }

        let (averaged, absent) = hermitian_average(matrix, ctx)?;
        if !absent.is_empty() {
            tracing::warn!(
                %channel,
                count = absent.len(),
                "missing Hermitian partners treated as zero blocks"
            );
        }
        missing.extend(absent);

        let result = match &group {
            Some(tables) => tables.average(&averaged, ctx)?,
            None => averaged,
        };
        matrices.insert(*channel, result);
    }

    let mut metadata = dataset.metadata().clone();
    metadata.symmetrized = true;

    Ok(SymmetrizeOutcome {
        dataset: dataset.derive(matrices, metadata)?,
        missing_partners: missing.into_iter().collect(),
    })
}

/// 厄米配对平均，返回新矩阵和缺失的伙伴键
pub fn hermitian_average(
    matrix: &SparseBlockMatrix,
    ctx: &ExecutionContext,
) -> Result<(SparseBlockMatrix, Vec<BlockKey>)> {
    let representatives: Vec<BlockKey> = matrix
        .keys()
        .map(|k| if k.is_canonical() { *k } else { k.partner() })
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let pairs = map_over(
        &representatives,
        |rep| {
            let partner = rep.partner();
            let half = Complex64::new(0.5, 0.0);
            let (avg, absent) = match (matrix.get(rep), matrix.get(&partner)) {
                (Some(a), Some(b)) => ((a + b.adjoint()) * half, None),
                (Some(a), None) => (a * half, Some(partner)),
                (None, Some(b)) => (b.adjoint() * half, Some(*rep)),
                (None, None) => {
                    return Err(DockError::Schema {
                        reason: format!("block {} vanished during symmetrization", rep),
                    })
                }
            };
            Ok((*rep, avg, absent))
        },
        ctx,
    )?;

    let mut out = SparseBlockMatrix::new(matrix.kind);
    let mut missing = Vec::new();
    for (rep, avg, absent) in pairs {
        let partner = rep.partner();
        if partner != rep {
            out.insert(partner, avg.adjoint());
        }
        out.insert(rep, avg);
        missing.extend(absent);
    }
    Ok((out, missing))
}

/// 每个对称操作的原子像与各原子的轨道旋转矩阵
struct GroupTables {
    operations: Vec<OperationTable>,
}

struct OperationTable {
    op: SymmetryOperation,
    images: Vec<AtomImage>,
    /// 每个原子的旋转矩阵（复数形式，便于与块相乘）
    rotations: Vec<Block>,
}

impl GroupTables {
    fn build(
        structure: &AtomicStructure,
        basis: &BasisDescriptor,
        operations: &[SymmetryOperation],
        tolerance: f64,
    ) -> Result<Self> {
        if !operations.iter().any(|op| op.is_identity()) {
            return Err(DockError::Schema {
                reason: "symmetry operation table must contain the identity".to_string(),
            });
        }

        let mut tables = Vec::with_capacity(operations.len());
        for op in operations {
            let rc = op.cartesian_rotation(&structure.lattice)?;
            let images = map_atoms(structure, op, tolerance)?;
            let rotations = structure
                .species
                .iter()
                .map(|sp| {
                    let shells = basis.shells_of(sp).unwrap_or(&[]);
                    atom_rotation(shells, &rc).map(|d| d.map(|x| Complex64::new(x, 0.0)))
                })
                .collect::<Result<Vec<_>>>()?;
            tables.push(OperationTable {
                op: op.clone(),
                images,
                rotations,
            });
        }

        Ok(GroupTables { operations: tables })
    }

    /// 群平均：H'(g k) = (1/|G|) Σ_g D_i H(k) D_jᵀ
    fn average(&self, matrix: &SparseBlockMatrix, ctx: &ExecutionContext) -> Result<SparseBlockMatrix> {
        let per_operation = map_over(
            &self.operations,
            |table| {
                Ok(matrix
                    .iter()
                    .map(|(key, block)| {
                        let (gi, gj) = (table.images[key.i], table.images[key.j]);
                        let wr = table.op.rotate(&key.r);
                        let r = [
                            gj.shift[0] + wr[0] - gi.shift[0],
                            gj.shift[1] + wr[1] - gi.shift[1],
                            gj.shift[2] + wr[2] - gi.shift[2],
                        ];
                        let image =
                            &table.rotations[key.i] * block * table.rotations[key.j].transpose();
                        (BlockKey::new(gi.target, gj.target, r), image)
                    })
                    .collect::<Vec<_>>())
            },
            ctx,
        )?;

        let mut sums: BTreeMap<BlockKey, Block> = BTreeMap::new();
        for images in per_operation {
            for (key, image) in images {
                sums.entry(key)
                    .and_modify(|acc| *acc += &image)
                    .or_insert(image);
            }
        }

        let scale = Complex64::new(1.0 / self.operations.len() as f64, 0.0);
        let mut out = SparseBlockMatrix::new(matrix.kind);
        for (key, sum) in sums {
            out.insert(key, sum * scale);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compare::self_consistency;
    use crate::models::{fixtures, Lattice, MatrixKind, Metadata};
    use nalgebra::DMatrix;
    use std::sync::Arc;

    #[test]
    fn test_two_site_scenario() {
        let ds = fixtures::two_site_chain(0.3, 0.32);
        let out = symmetrize(&ds, &SymmetrizeOptions::default()).unwrap();
        let h = out.dataset.matrix(MatrixChannel::Hamiltonian).unwrap();

        let h01 = h.get(&BlockKey::new(0, 1, [0, 0, 0])).unwrap()[(0, 0)];
        let h10 = h.get(&BlockKey::new(1, 0, [0, 0, 0])).unwrap()[(0, 0)];
        assert!((h01.re - 0.31).abs() < 1e-15);
        assert_eq!(h01, h10);
        assert_eq!(h.get(&BlockKey::new(0, 0, [0, 0, 0])).unwrap()[(0, 0)].re, 1.0);

        let report = self_consistency(&out.dataset, MatrixChannel::Hamiltonian).unwrap();
        assert_eq!(report.max_residual, 0.0);
        assert!(out.missing_partners.is_empty());
        assert!(out.dataset.metadata().symmetrized);
    }

    #[test]
    fn test_input_is_not_mutated() {
        let ds = fixtures::two_site_chain(0.3, 0.32);
        let before = ds.clone();
        let _ = symmetrize(&ds, &SymmetrizeOptions::default()).unwrap();
        assert_eq!(ds, before);
        assert!(!ds.metadata().symmetrized);
    }

    #[test]
    fn test_idempotent() {
        let ds = fixtures::random_chain(3, 17);
        let mut h = ds.matrix(MatrixChannel::Hamiltonian).unwrap().clone();
        // 破坏一个块的厄米性
        let key = BlockKey::new(0, 2, [1, 0, 0]);
        let noisy = h.get(&key).unwrap().map(|z| z * 1.1);
        h.insert(key, noisy);
        let mut matrices = ds.matrices().clone();
        matrices.insert(MatrixChannel::Hamiltonian, h);
        let ds = ds.derive(matrices, ds.metadata().clone()).unwrap();

        let once = symmetrize(&ds, &SymmetrizeOptions::default()).unwrap().dataset;
        let twice = symmetrize(&once, &SymmetrizeOptions::default()).unwrap().dataset;
        let a = once.matrix(MatrixChannel::Hamiltonian).unwrap();
        let b = twice.matrix(MatrixChannel::Hamiltonian).unwrap();
        assert_eq!(a.len(), b.len());
        for (k, block) in a.iter() {
            assert!(crate::models::max_abs_diff(block, b.get(k).unwrap()) < 1e-14);
        }
    }

    #[test]
    fn test_hermiticity_after_symmetrization() {
        let ds = fixtures::random_chain(4, 8);
        let mut h = SparseBlockMatrix::new(MatrixKind::Complex);
        for (key, block) in ds.matrix(MatrixChannel::Hamiltonian).unwrap().iter() {
            // 各块独立扰动，厄米性整体失效
            let shift = (key.i * 7 + key.j * 3) as f64 * 1e-3;
            h.insert(*key, block.map(|z| z + Complex64::new(shift, -shift)));
        }
        let mut matrices = ds.matrices().clone();
        matrices.insert(MatrixChannel::Hamiltonian, h);
        let ds = ds.derive(matrices, ds.metadata().clone()).unwrap();

        let before = self_consistency(&ds, MatrixChannel::Hamiltonian).unwrap();
        assert!(before.max_residual > 1e-3);

        let out = symmetrize(&ds, &SymmetrizeOptions::default()).unwrap();
        let after = self_consistency(&out.dataset, MatrixChannel::Hamiltonian).unwrap();
        assert!(after.max_residual < 1e-14);
    }

    #[test]
    fn test_missing_partner_is_filled_and_recorded() {
        let ds = fixtures::two_site_chain(0.3, 0.3);
        let mut h = ds.matrix(MatrixChannel::Hamiltonian).unwrap().clone();
        h.insert_real(BlockKey::new(0, 1, [1, 0, 0]), 1, 1, &[0.2]);
        let mut matrices = ds.matrices().clone();
        matrices.insert(MatrixChannel::Hamiltonian, h);
        let ds = ds.derive(matrices, ds.metadata().clone()).unwrap();

        let out = symmetrize(&ds, &SymmetrizeOptions::default()).unwrap();
        assert_eq!(out.missing_partners, vec![BlockKey::new(1, 0, [-1, 0, 0])]);

        let h = out.dataset.matrix(MatrixChannel::Hamiltonian).unwrap();
        let fwd = h.get(&BlockKey::new(0, 1, [1, 0, 0])).unwrap()[(0, 0)].re;
        let back = h.get(&BlockKey::new(1, 0, [-1, 0, 0])).unwrap()[(0, 0)].re;
        assert!((fwd - 0.1).abs() < 1e-15);
        assert_eq!(fwd, back);
    }

    #[test]
    fn test_channel_selection() {
        let ds = fixtures::two_site_chain(0.3, 0.32);
        let options = SymmetrizeOptions {
            channels: Some(vec![MatrixChannel::Overlap]),
            ..SymmetrizeOptions::default()
        };
        let out = symmetrize(&ds, &options).unwrap();
        assert_eq!(
            out.dataset.matrix(MatrixChannel::Hamiltonian),
            ds.matrix(MatrixChannel::Hamiltonian)
        );
    }

    /// 单原子 (s, p, d) 位于立方晶胞原点
    fn single_atom(onsite: DMatrix<Complex64>) -> CanonicalDataset {
        let structure = AtomicStructure::new(
            Lattice::from_vectors([[5.0, 0.0, 0.0], [0.0, 5.0, 0.0], [0.0, 0.0, 5.0]]),
            vec!["Fe".into()],
            vec![[0.0, 0.0, 0.0]],
        );
        let basis = BasisDescriptor::new().with_species("Fe", vec![0, 1, 2]);
        let mut h = SparseBlockMatrix::new(MatrixKind::Real);
        h.insert(BlockKey::new(0, 0, [0, 0, 0]), onsite);
        let mut matrices = BTreeMap::new();
        matrices.insert(MatrixChannel::Hamiltonian, h);
        CanonicalDataset::new(Arc::new(structure), Arc::new(basis), matrices, Metadata::default())
            .unwrap()
    }

    fn c4_group() -> Vec<SymmetryOperation> {
        let c4 = [[0, -1, 0], [1, 0, 0], [0, 0, 1]];
        let c2 = [[-1, 0, 0], [0, -1, 0], [0, 0, 1]];
        let c4i = [[0, 1, 0], [-1, 0, 0], [0, 0, 1]];
        vec![
            SymmetryOperation::identity(),
            SymmetryOperation::new(c4, [0.0; 3]),
            SymmetryOperation::new(c2, [0.0; 3]),
            SymmetryOperation::new(c4i, [0.0; 3]),
        ]
    }

    #[test]
    fn test_group_average_restores_tetragonal_degeneracy() {
        // 顺序: s | p(y, z, x) | d(xy, yz, z², xz, x²−y²)
        let levels = [0.0, 1.0, 2.0, 1.4, 3.0, 4.0, 5.0, 4.6, 6.0];
        let mut onsite = DMatrix::from_fn(9, 9, |a, b| {
            Complex64::new(if a == b { levels[a] } else { 0.0 }, 0.0)
        });
        // s-p_x 耦合在 C4 下不变量为零
        onsite[(0, 3)] = Complex64::new(0.25, 0.0);
        onsite[(3, 0)] = Complex64::new(0.25, 0.0);
        let ds = single_atom(onsite);

        let options = SymmetrizeOptions {
            operations: Some(c4_group()),
            ..SymmetrizeOptions::default()
        };
        let out = symmetrize(&ds, &options).unwrap();
        let block = out
            .dataset
            .matrix(MatrixChannel::Hamiltonian)
            .unwrap()
            .get(&BlockKey::new(0, 0, [0, 0, 0]))
            .unwrap()
            .clone();

        // p_y 与 p_x 简并，p_z 不变
        assert!((block[(1, 1)].re - 1.2).abs() < 1e-12);
        assert!((block[(3, 3)].re - 1.2).abs() < 1e-12);
        assert!((block[(2, 2)].re - 2.0).abs() < 1e-12);
        // d_yz 与 d_xz 简并，其余 d 不变
        assert!((block[(5, 5)].re - 4.3).abs() < 1e-12);
        assert!((block[(7, 7)].re - 4.3).abs() < 1e-12);
        assert!((block[(4, 4)].re - 3.0).abs() < 1e-12);
        assert!((block[(6, 6)].re - 5.0).abs() < 1e-12);
        assert!((block[(8, 8)].re - 6.0).abs() < 1e-12);
        assert!(block[(0, 3)].norm() < 1e-12);

        // 群平均幂等
        let again = symmetrize(&out.dataset, &options).unwrap().dataset;
        let block2 = again
            .matrix(MatrixChannel::Hamiltonian)
            .unwrap()
            .get(&BlockKey::new(0, 0, [0, 0, 0]))
            .unwrap();
        assert!(crate::models::max_abs_diff(&block, block2) < 1e-12);
    }

    #[test]
    fn test_group_average_maps_translations() {
        // C4 作用于 R = [1, 0, 0] 的块得到 [0, 1, 0]、[-1, 0, 0]、[0, -1, 0]
        let ds = single_atom(DMatrix::identity(9, 9));
        let mut h = ds.matrix(MatrixChannel::Hamiltonian).unwrap().clone();
        let hop = DMatrix::from_fn(9, 9, |a, b| Complex64::new(if a == b { 0.4 } else { 0.0 }, 0.0));
        h.insert(BlockKey::new(0, 0, [1, 0, 0]), hop.clone());
        h.insert(BlockKey::new(0, 0, [-1, 0, 0]), hop);
        let mut matrices = ds.matrices().clone();
        matrices.insert(MatrixChannel::Hamiltonian, h);
        let ds = ds.derive(matrices, ds.metadata().clone()).unwrap();

        let out = symmetrize(&ds, &SymmetrizeOptions {
            operations: Some(c4_group()),
            ..SymmetrizeOptions::default()
        })
        .unwrap();
        let h = out.dataset.matrix(MatrixChannel::Hamiltonian).unwrap();
        assert_eq!(h.len(), 5);
        for r in [[1, 0, 0], [0, 1, 0], [-1, 0, 0], [0, -1, 0]] {
            let block = h.get(&BlockKey::new(0, 0, r)).unwrap();
            // s 轨道跃迁：两个源块各贡献 1/4
            assert!((block[(0, 0)].re - 0.2).abs() < 1e-12);
        }
    }

    #[test]
    fn test_group_table_requires_identity() {
        let ds = single_atom(DMatrix::identity(9, 9));
        let options = SymmetrizeOptions {
            operations: Some(c4_group()[1..].to_vec()),
            ..SymmetrizeOptions::default()
        };
        assert!(matches!(symmetrize(&ds, &options), Err(DockError::Schema { .. })));
    }

    #[test]
    fn test_group_average_rejects_f_shells() {
        let structure = AtomicStructure::new(
            Lattice::from_vectors([[5.0, 0.0, 0.0], [0.0, 5.0, 0.0], [0.0, 0.0, 5.0]]),
            vec!["Ce".into()],
            vec![[0.0, 0.0, 0.0]],
        );
        let basis = BasisDescriptor::new().with_species("Ce", vec![3]);
        let mut h = SparseBlockMatrix::new(MatrixKind::Real);
        h.insert(BlockKey::new(0, 0, [0, 0, 0]), DMatrix::identity(7, 7));
        let mut matrices = BTreeMap::new();
        matrices.insert(MatrixChannel::Hamiltonian, h);
        let ds = CanonicalDataset::new(Arc::new(structure), Arc::new(basis), matrices, Metadata::default())
            .unwrap();

        // 只做厄米平均时 f 壳层没有限制
        assert!(symmetrize(&ds, &SymmetrizeOptions::default()).is_ok());
        let options = SymmetrizeOptions {
            operations: Some(c4_group()),
            ..SymmetrizeOptions::default()
        };
        assert!(matches!(symmetrize(&ds, &options), Err(DockError::Schema { .. })));
    }
}
