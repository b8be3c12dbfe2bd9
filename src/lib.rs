//! # hamdock - 稀疏哈密顿量/重叠矩阵交换格式
//!
//! 规范的块稀疏数据集，以及围绕它的转换、校验、对称化、误差评估与稀疏谱计算。
//!
//! ## 数据流
//! ```text
//! parsers/ (原生输出) ──> CanonicalDataset ──> store/ (容器读写)
//!                               │
//!            ┌──────────────────┼───────────────────┐
//!        validate/         symmetrize/        compare/, spectral/
//!       (只读检查)        (产生新数据集)         (只读消费)
//! ```
//! 所有按块、按 k 点的工作经由 `batch/` 分发到线程池。
//!
//! ## 依赖关系
//! - `error.rs`: 统一错误类型
//! - `models/`: 数据模型
//! - `utils/`: 输出与进度条（仅供命令行使用）

pub mod batch;
pub mod compare;
pub mod error;
pub mod models;
pub mod parsers;
pub mod spectral;
pub mod store;
pub mod symmetrize;
pub mod utils;
pub mod validate;

pub use error::{DockError, Result};
pub use models::{
    AtomicStructure, BasisDescriptor, Block, BlockKey, CanonicalDataset, Lattice, MatrixChannel,
    MatrixKind, Metadata, SparseBlockMatrix,
};
