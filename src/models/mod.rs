//! # 数据模型模块
//!
//! 定义原子结构、基组描述、块稀疏矩阵与规范数据集。
//!
//! ## 依赖关系
//! - 被所有其他模块使用
//! - 子模块: structure, basis, block, dataset

pub mod basis;
pub mod block;
pub mod dataset;
pub mod structure;

pub use basis::BasisDescriptor;
pub use block::{max_abs_diff, Block, BlockKey, MatrixKind, SparseBlockMatrix};
pub use dataset::{CanonicalDataset, MatrixChannel, Metadata};
pub use structure::{AtomicStructure, Lattice};

#[cfg(test)]
pub(crate) mod fixtures;
