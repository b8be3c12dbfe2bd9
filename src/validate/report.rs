//! # 校验报告
//!
//! 发现项 (Finding) 带严重度、代码与位置，全部累积后统一返回。
//!
//! ## 依赖关系
//! - 被 `validate/mod.rs` 与 `commands/validate.rs` 使用

use crate::models::MatrixChannel;

use serde::{Deserialize, Serialize};
use std::fmt;

/// 严重度
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// 发现项代码
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FindingCode {
    /// 块数超过截断半径内可容纳的原子对数
    BlockCount,
    /// 块与其伙伴的共轭转置偏差超限
    Hermiticity,
    /// 重叠矩阵对角元非正
    OverlapDiagonal,
    /// 块形状与基组不一致
    BasisDimension,
    /// 晶格非右手系
    LatticeHandedness,
    /// 缺少厄米伙伴块
    MissingPartner,
    /// 原子对距离超出截断半径
    CutoffExceeded,
}

impl fmt::Display for FindingCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FindingCode::BlockCount => "block-count",
            FindingCode::Hermiticity => "hermiticity",
            FindingCode::OverlapDiagonal => "overlap-diagonal",
            FindingCode::BasisDimension => "basis-dimension",
            FindingCode::LatticeHandedness => "lattice-handedness",
            FindingCode::MissingPartner => "missing-partner",
            FindingCode::CutoffExceeded => "cutoff-exceeded",
        };
        f.write_str(name)
    }
}

/// 发现项位置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "lowercase")]
pub enum Location {
    Global,
    Atom { i: usize },
    Pair { i: usize, j: usize, r: [i32; 3] },
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Global => write!(f, "global"),
            Location::Atom { i } => write!(f, "atom {}", i),
            Location::Pair { i, j, r } => {
                write!(f, "({}, {}, [{}, {}, {}])", i, j, r[0], r[1], r[2])
            }
        }
    }
}

/// 单个发现项
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub severity: Severity,
    pub code: FindingCode,
    pub location: Location,
    /// 所属矩阵通道（全局检查为 None）
    pub channel: Option<MatrixChannel>,
    pub message: String,
}

/// 校验报告
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub findings: Vec<Finding>,
}

impl ValidationReport {
    pub(crate) fn push(
        &mut self,
        severity: Severity,
        code: FindingCode,
        location: Location,
        channel: Option<MatrixChannel>,
        message: impl Into<String>,
    ) {
        self.findings.push(Finding {
            severity,
            code,
            location,
            channel,
            message: message.into(),
        });
    }

    pub fn errors(&self) -> impl Iterator<Item = &Finding> + '_ {
        self.findings
            .iter()
            .filter(|f| f.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Finding> + '_ {
        self.findings
            .iter()
            .filter(|f| f.severity == Severity::Warning)
    }

    pub fn error_count(&self) -> usize {
        self.errors().count()
    }

    pub fn warning_count(&self) -> usize {
        self.warnings().count()
    }

    pub fn has_errors(&self) -> bool {
        self.errors().next().is_some()
    }

    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }

    /// 某代码的发现项
    pub fn with_code(&self, code: FindingCode) -> impl Iterator<Item = &Finding> + '_ {
        self.findings.iter().filter(move |f| f.code == code)
    }
}
