//! # 块稀疏矩阵
//!
//! 以 (i, j, R) 为键存储稠密轨道块；缺失的键即零块。
//! 实矩阵同样以 `Complex64` 存储，虚部恒为零。
//!
//! ## 依赖关系
//! - 被 `models/dataset.rs`, `store/`, 以及所有计算模块使用
//! - 使用 `nalgebra`, `num-complex`

use nalgebra::DMatrix;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// 稠密轨道块
pub type Block = DMatrix<Complex64>;

/// 块键：原子 i（原胞）、原子 j（平移 R 的晶胞）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlockKey {
    pub i: usize,
    pub j: usize,
    pub r: [i32; 3],
}

impl BlockKey {
    pub fn new(i: usize, j: usize, r: [i32; 3]) -> Self {
        BlockKey { i, j, r }
    }

    /// 厄米伙伴 (j, i, -R)
    pub fn partner(&self) -> Self {
        BlockKey {
            i: self.j,
            j: self.i,
            r: [-self.r[0], -self.r[1], -self.r[2]],
        }
    }

    /// 在一对伙伴中是否为代表元（字典序较小者）
    pub fn is_canonical(&self) -> bool {
        *self <= self.partner()
    }
}

impl fmt::Display for BlockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}, [{}, {}, {}])",
            self.i, self.j, self.r[0], self.r[1], self.r[2]
        )
    }
}

/// 矩阵数值类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatrixKind {
    Real,
    Complex,
}

/// 块稀疏矩阵
#[derive(Debug, Clone, PartialEq)]
pub struct SparseBlockMatrix {
    pub kind: MatrixKind,
    blocks: BTreeMap<BlockKey, Block>,
}

impl SparseBlockMatrix {
    pub fn new(kind: MatrixKind) -> Self {
        SparseBlockMatrix {
            kind,
            blocks: BTreeMap::new(),
        }
    }

    /// 插入一个块；实矩阵的虚部被丢弃
    pub fn insert(&mut self, key: BlockKey, mut block: Block) -> Option<Block> {
        if self.kind == MatrixKind::Real {
            block.iter_mut().for_each(|z| z.im = 0.0);
        }
        self.blocks.insert(key, block)
    }

    /// 从实数行主序数据插入块
    pub fn insert_real(&mut self, key: BlockKey, rows: usize, cols: usize, data: &[f64]) {
        let block = DMatrix::from_fn(rows, cols, |a, b| Complex64::new(data[a * cols + b], 0.0));
        self.insert(key, block);
    }

    pub fn get(&self, key: &BlockKey) -> Option<&Block> {
        self.blocks.get(key)
    }

    pub fn contains(&self, key: &BlockKey) -> bool {
        self.blocks.contains_key(key)
    }

    /// 按键序遍历；每次调用都从头开始
    pub fn iter(&self) -> impl Iterator<Item = (&BlockKey, &Block)> + '_ {
        self.blocks.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &BlockKey> + '_ {
        self.blocks.keys()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// 出现过的所有平移向量（去重，有序）
    pub fn translations(&self) -> Vec<[i32; 3]> {
        let mut rs: Vec<[i32; 3]> = self.blocks.keys().map(|k| k.r).collect();
        rs.sort();
        rs.dedup();
        rs
    }

    /// 非零矩阵元总数
    pub fn nnz(&self) -> usize {
        self.blocks.values().map(|b| b.len()).sum()
    }

    pub fn is_real(&self) -> bool {
        self.kind == MatrixKind::Real
    }
}

impl FromIterator<(BlockKey, Block)> for SparseBlockMatrix {
    /// 收集为复矩阵；若所有虚部为零则降为实矩阵
    fn from_iter<I: IntoIterator<Item = (BlockKey, Block)>>(iter: I) -> Self {
        let blocks: BTreeMap<BlockKey, Block> = iter.into_iter().collect();
        let all_real = blocks
            .values()
            .all(|b| b.iter().all(|z| z.im == 0.0));
        SparseBlockMatrix {
            kind: if all_real {
                MatrixKind::Real
            } else {
                MatrixKind::Complex
            },
            blocks,
        }
    }
}

/// 两个块之差的最大模
pub fn max_abs_diff(a: &Block, b: &Block) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).norm())
        .fold(0.0, f64::max)
}
