//! # 基组描述
//!
//! 每个元素的轨道排布：按壳层列出角动量 l，
//! 每个壳层贡献 2l+1 个实球谐轨道，顺序为 m = -l..l。
//!
//! ## 依赖关系
//! - 被 `models/dataset.rs`, `symmetrize/`, `compare/`, `spectral/` 使用
//! - 使用 `models/structure.rs`

use crate::models::AtomicStructure;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 每个元素的轨道排布
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BasisDescriptor {
    /// 元素标签 -> 各壳层角动量
    pub shells: BTreeMap<String, Vec<u8>>,
}

impl BasisDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_species(mut self, species: impl Into<String>, shells: Vec<u8>) -> Self {
        self.shells.insert(species.into(), shells);
        self
    }

    pub fn shells_of(&self, species: &str) -> Option<&[u8]> {
        self.shells.get(species).map(|v| v.as_slice())
    }

    /// 某元素的轨道数
    pub fn orbital_count(&self, species: &str) -> Option<usize> {
        self.shells_of(species)
            .map(|ls| ls.iter().map(|&l| 2 * l as usize + 1).sum())
    }

    /// 每个原子轨道块在整体矩阵中的起始偏移，末尾附加总维度
    pub fn atom_offsets(&self, structure: &AtomicStructure) -> Option<Vec<usize>> {
        let mut offsets = Vec::with_capacity(structure.atom_count() + 1);
        let mut acc = 0;
        offsets.push(0);
        for sp in &structure.species {
            acc += self.orbital_count(sp)?;
            offsets.push(acc);
        }
        Some(offsets)
    }

    /// 轨道 (壳层序号, l, m) 标签，用于误差报告
    pub fn orbital_labels(&self, species: &str) -> Vec<(usize, u8, i8)> {
        let mut labels = Vec::new();
        if let Some(ls) = self.shells_of(species) {
            for (shell, &l) in ls.iter().enumerate() {
                for m in -(l as i8)..=(l as i8) {
                    labels.push((shell, l, m));
                }
            }
        }
        labels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Lattice;

    #[test]
    fn test_orbital_count() {
        let basis = BasisDescriptor::new()
            .with_species("Mo", vec![0, 0, 1, 1, 2])
            .with_species("S", vec![0, 1]);
        assert_eq!(basis.orbital_count("Mo"), Some(1 + 1 + 3 + 3 + 5));
        assert_eq!(basis.orbital_count("S"), Some(4));
        assert_eq!(basis.orbital_count("W"), None);
    }

    #[test]
    fn test_atom_offsets() {
        let basis = BasisDescriptor::new()
            .with_species("Mo", vec![0, 2])
            .with_species("S", vec![1]);
        let s = AtomicStructure::new(
            Lattice::from_parameters(3.0, 3.0, 10.0, 90.0, 90.0, 120.0),
            vec!["Mo".into(), "S".into(), "S".into()],
            vec![[0.0; 3], [0.3; 3], [0.6; 3]],
        );
        assert_eq!(basis.atom_offsets(&s), Some(vec![0, 6, 9, 12]));
    }

    #[test]
    fn test_orbital_labels_order() {
        let basis = BasisDescriptor::new().with_species("O", vec![0, 1]);
        let labels = basis.orbital_labels("O");
        assert_eq!(labels, vec![(0, 0, 0), (1, 1, -1), (1, 1, 0), (1, 1, 1)]);
    }
}
