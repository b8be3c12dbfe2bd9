//! # 统一错误处理模块
//!
//! 定义 hamdock 的所有错误类型，使用 `thiserror` 派生。
//!
//! 错误分类与各组件的失败语义一一对应：容器损坏 (`Format`)、
//! 结构/维度不一致 (`Schema`)、原生输出解析失败 (`Parse`)、
//! 原生输出不完整 (`PartialData`)、比较双方不兼容 (`StructureMismatch`)、
//! 迭代求解器不收敛 (`Convergence`)、并行任务失败 (`Worker`)。
//!
//! ## 依赖关系
//! - 被所有其他模块使用
//! - 使用 `models::BlockKey` 描述缺失的矩阵块

use crate::models::BlockKey;
use thiserror::Error;

/// hamdock 统一错误类型
#[derive(Error, Debug)]
pub enum DockError {
    // ─────────────────────────────────────────────────────────────
    // I/O 错误
    // ─────────────────────────────────────────────────────────────
    #[error("Failed to read file: {path}")]
    FileReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file: {path}")]
    FileWriteError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Directory not found: {path}")]
    DirectoryNotFound { path: String },

    #[error("File not found: {path}")]
    FileNotFound { path: String },

    // ─────────────────────────────────────────────────────────────
    // 规范容器与数据模型
    // ─────────────────────────────────────────────────────────────
    #[error("Malformed container section '{section}': {reason}")]
    Format { section: String, reason: String },

    #[error("Schema violation: {reason}")]
    Schema { reason: String },

    // ─────────────────────────────────────────────────────────────
    // 转换适配器
    // ─────────────────────────────────────────────────────────────
    #[error("Failed to parse {file} (line {line}): {reason}")]
    Parse {
        file: String,
        line: usize,
        reason: String,
    },

    #[error("Incomplete native output in {file}: {} block(s) missing, first {}", .missing.len(), preview_keys(.missing))]
    PartialData { file: String, missing: Vec<BlockKey> },

    #[error("No converter adapter registered for '{0}'")]
    UnsupportedCode(String),

    // ─────────────────────────────────────────────────────────────
    // 比较与求解
    // ─────────────────────────────────────────────────────────────
    #[error("Datasets are not structurally compatible: {reason}")]
    StructureMismatch { reason: String },

    #[error("Solver did not converge after {iterations} iterations (residual {residual:.3e} > {tolerance:.3e})")]
    Convergence {
        iterations: usize,
        residual: f64,
        tolerance: f64,
    },

    // ─────────────────────────────────────────────────────────────
    // 并行执行
    // ─────────────────────────────────────────────────────────────
    #[error("Work item {index} failed: {source}")]
    Worker {
        index: usize,
        #[source]
        source: Box<DockError>,
    },

    #[error("Batch cancelled before item {index} was dispatched")]
    Cancelled { index: usize },

    // ─────────────────────────────────────────────────────────────
    // 参数与导出
    // ─────────────────────────────────────────────────────────────
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
}

impl DockError {
    /// 包装工作项失败；已经是 `Worker` 的错误保持原样
    pub fn worker(index: usize, source: DockError) -> Self {
        match source {
            err @ DockError::Worker { .. } => err,
            other => DockError::Worker {
                index,
                source: Box::new(other),
            },
        }
    }

    /// 命令行边界上的退出码，每个分类对应唯一值
    ///
    /// `Worker` 透传内部错误的分类码，内部错误不在分类中时为 16。
    pub fn exit_code(&self) -> i32 {
        match self {
            DockError::Worker { source, .. } => match source.exit_code() {
                code @ 10..=15 => code,
                _ => 16,
            },
            DockError::Format { .. } => 10,
            DockError::Schema { .. } => 11,
            DockError::Parse { .. } => 12,
            DockError::PartialData { .. } => 13,
            DockError::StructureMismatch { .. } => 14,
            DockError::Convergence { .. } => 15,
            _ => 1,
        }
    }
}

fn preview_keys(keys: &[BlockKey]) -> String {
    keys.iter()
        .take(4)
        .map(|k| k.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result 类型别名
pub type Result<T> = std::result::Result<T, DockError>;
