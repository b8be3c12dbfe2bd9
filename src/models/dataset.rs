//! # 规范数据集
//!
//! 聚合结构、基组、若干块稀疏矩阵和元数据。
//! 数据集创建后不可变，所有变换都产生新对象；
//! 结构与基组以 `Arc` 共享，派生数据集指向同一实例。
//!
//! ## 依赖关系
//! - 被 `store/`, `parsers/`, `validate/`, `symmetrize/`, `compare/`, `spectral/` 使用
//! - 使用 `models/structure.rs`, `models/basis.rs`, `models/block.rs`

use crate::error::{DockError, Result};
use crate::models::{AtomicStructure, BasisDescriptor, BlockKey, SparseBlockMatrix};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// 数据集中的矩阵通道
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatrixChannel {
    Hamiltonian,
    Overlap,
    HamiltonianSpinUp,
    HamiltonianSpinDown,
}

impl MatrixChannel {
    pub const ALL: [MatrixChannel; 4] = [
        MatrixChannel::Hamiltonian,
        MatrixChannel::Overlap,
        MatrixChannel::HamiltonianSpinUp,
        MatrixChannel::HamiltonianSpinDown,
    ];

    /// 容器中的节名
    pub fn section_name(&self) -> &'static str {
        match self {
            MatrixChannel::Hamiltonian => "hamiltonian",
            MatrixChannel::Overlap => "overlap",
            MatrixChannel::HamiltonianSpinUp => "hamiltonian_spin_up",
            MatrixChannel::HamiltonianSpinDown => "hamiltonian_spin_down",
        }
    }

    pub fn from_section_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.section_name() == name)
    }
}

impl fmt::Display for MatrixChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.section_name())
    }
}

/// 数据集元数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    /// 能量单位
    pub energy_unit: String,
    /// 长度单位
    pub length_unit: String,
    /// 费米能
    pub fermi_energy: Option<f64>,
    /// 来源标签（如 "wannier90:/path/to/run"）
    pub provenance: String,
    /// 是否已对称化
    pub symmetrized: bool,
    /// 声明的截断半径（长度单位同上）
    pub cutoff_radius: Option<f64>,
}

impl Default for Metadata {
    fn default() -> Self {
        Metadata {
            energy_unit: "eV".to_string(),
            length_unit: "angstrom".to_string(),
            fermi_energy: None,
            provenance: "unknown".to_string(),
            symmetrized: false,
            cutoff_radius: None,
        }
    }
}

/// 规范数据集
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalDataset {
    structure: Arc<AtomicStructure>,
    basis: Arc<BasisDescriptor>,
    matrices: BTreeMap<MatrixChannel, SparseBlockMatrix>,
    metadata: Metadata,
}

impl CanonicalDataset {
    /// 构造并检查所有块形状与基组一致
    pub fn new(
        structure: Arc<AtomicStructure>,
        basis: Arc<BasisDescriptor>,
        matrices: BTreeMap<MatrixChannel, SparseBlockMatrix>,
        metadata: Metadata,
    ) -> Result<Self> {
        let dims = orbital_dims(&structure, &basis)?;
        for (channel, matrix) in &matrices {
            check_shapes(*channel, matrix, &dims)?;
        }
        Ok(CanonicalDataset {
            structure,
            basis,
            matrices,
            metadata,
        })
    }

    /// 共享本数据集的结构与基组，替换矩阵与元数据
    pub fn derive(
        &self,
        matrices: BTreeMap<MatrixChannel, SparseBlockMatrix>,
        metadata: Metadata,
    ) -> Result<Self> {
        Self::new(
            Arc::clone(&self.structure),
            Arc::clone(&self.basis),
            matrices,
            metadata,
        )
    }

    pub fn structure(&self) -> &AtomicStructure {
        &self.structure
    }

    pub fn structure_arc(&self) -> &Arc<AtomicStructure> {
        &self.structure
    }

    pub fn basis(&self) -> &BasisDescriptor {
        &self.basis
    }

    pub fn basis_arc(&self) -> &Arc<BasisDescriptor> {
        &self.basis
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn matrix(&self, channel: MatrixChannel) -> Option<&SparseBlockMatrix> {
        self.matrices.get(&channel)
    }

    /// 取矩阵，不存在时报 SchemaError
    pub fn require(&self, channel: MatrixChannel) -> Result<&SparseBlockMatrix> {
        self.matrix(channel).ok_or_else(|| DockError::Schema {
            reason: format!("dataset has no '{}' matrix", channel),
        })
    }

    pub fn matrices(&self) -> &BTreeMap<MatrixChannel, SparseBlockMatrix> {
        &self.matrices
    }

    pub fn channels(&self) -> impl Iterator<Item = MatrixChannel> + '_ {
        self.matrices.keys().copied()
    }

    /// 每个原子的轨道数
    pub fn orbital_dims(&self) -> Vec<usize> {
        // 构造时已检查，基组必然覆盖所有元素
        self.structure
            .species
            .iter()
            .map(|sp| self.basis.orbital_count(sp).unwrap_or(0))
            .collect()
    }

    /// 原子轨道偏移（末尾为总维度）
    pub fn offsets(&self) -> Vec<usize> {
        let mut offsets = vec![0];
        for d in self.orbital_dims() {
            offsets.push(offsets[offsets.len() - 1] + d);
        }
        offsets
    }

    /// 总轨道数
    pub fn dimension(&self) -> usize {
        self.orbital_dims().iter().sum()
    }

    /// 两个数据集是否共享相同的结构与基组
    pub fn shares_layout_with(&self, other: &CanonicalDataset) -> bool {
        let same_structure = Arc::ptr_eq(&self.structure, &other.structure)
            || *self.structure == *other.structure;
        let same_basis =
            Arc::ptr_eq(&self.basis, &other.basis) || *self.basis == *other.basis;
        same_structure && same_basis
    }
}

fn orbital_dims(structure: &AtomicStructure, basis: &BasisDescriptor) -> Result<Vec<usize>> {
    if structure.species.len() != structure.positions.len() {
        return Err(DockError::Schema {
            reason: format!(
                "{} species labels for {} positions",
                structure.species.len(),
                structure.positions.len()
            ),
        });
    }
    structure
        .species
        .iter()
        .map(|sp| {
            basis.orbital_count(sp).ok_or_else(|| DockError::Schema {
                reason: format!("species '{}' has no basis entry", sp),
            })
        })
        .collect()
}

fn check_shapes(channel: MatrixChannel, matrix: &SparseBlockMatrix, dims: &[usize]) -> Result<()> {
    for (key, block) in matrix.iter() {
        let (ni, nj) = match (dims.get(key.i), dims.get(key.j)) {
            (Some(&ni), Some(&nj)) => (ni, nj),
            _ => {
                return Err(DockError::Schema {
                    reason: format!(
                        "{} block {} references an atom outside 0..{}",
                        channel,
                        key,
                        dims.len()
                    ),
                })
            }
        };
        if block.shape() != (ni, nj) {
            return Err(shape_error(channel, key, block.shape(), (ni, nj)));
        }
    }
    Ok(())
}

fn shape_error(
    channel: MatrixChannel,
    key: &BlockKey,
    found: (usize, usize),
    expected: (usize, usize),
) -> DockError {
    DockError::Schema {
        reason: format!(
            "{} block {} has shape {}x{}, basis implies {}x{}",
            channel, key, found.0, found.1, expected.0, expected.1
        ),
    }
}
