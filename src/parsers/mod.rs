//! # 转换适配器模块
//!
//! 定义把 DFT 原生输出转换为规范数据集的适配器接口。
//! 适配器按能力标签 (DFT 程序名) 在注册表中选择，彼此独立。
//!
//! ## 约定
//! - 无法解释的原生文件返回 `Parse`，指明文件与行号
//! - 截断或不完整的输出返回 `PartialData`，列出缺失的块键，绝不静默丢弃矩阵元
//!
//! ## 依赖关系
//! - 被 `commands/convert.rs` 与集成测试使用
//! - 使用 `batch/` 并行转换多个目录
//! - 子模块: poscar, wannier90

pub mod poscar;
pub mod wannier90;

pub use wannier90::Wannier90Adapter;

use crate::batch::{map_over_best_effort, ExecutionContext, ItemOutcome};
use crate::error::{DockError, Result};
use crate::models::CanonicalDataset;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// DFT 程序能力标签
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DftCode {
    OpenMx,
    Vasp,
    #[serde(rename = "qe", alias = "quantumespresso")]
    QuantumEspresso,
    #[serde(rename = "fhi-aims", alias = "fhiaims")]
    FhiAims,
    Siesta,
    Abacus,
    Wannier90,
}

impl DftCode {
    pub const ALL: [DftCode; 7] = [
        DftCode::OpenMx,
        DftCode::Vasp,
        DftCode::QuantumEspresso,
        DftCode::FhiAims,
        DftCode::Siesta,
        DftCode::Abacus,
        DftCode::Wannier90,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            DftCode::OpenMx => "openmx",
            DftCode::Vasp => "vasp",
            DftCode::QuantumEspresso => "qe",
            DftCode::FhiAims => "fhi-aims",
            DftCode::Siesta => "siesta",
            DftCode::Abacus => "abacus",
            DftCode::Wannier90 => "wannier90",
        }
    }
}

impl fmt::Display for DftCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DftCode {
    type Err = DockError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_lowercase().replace('_', "-");
        match normalized.as_str() {
            "openmx" => Ok(DftCode::OpenMx),
            "vasp" => Ok(DftCode::Vasp),
            "qe" | "quantum-espresso" | "quantumespresso" => Ok(DftCode::QuantumEspresso),
            "fhi-aims" | "fhiaims" | "aims" => Ok(DftCode::FhiAims),
            "siesta" => Ok(DftCode::Siesta),
            "abacus" => Ok(DftCode::Abacus),
            "wannier90" | "w90" => Ok(DftCode::Wannier90),
            _ => Err(DockError::UnsupportedCode(s.to_string())),
        }
    }
}

/// 转换适配器接口
pub trait ConverterAdapter: Send + Sync {
    /// 能力标签
    fn code(&self) -> DftCode;

    /// 标识原生输出目录的文件名 glob
    fn marker(&self) -> &'static str;

    /// 把一个原生输出目录转换为规范数据集
    fn parse_native_output(&self, dir: &Path) -> Result<CanonicalDataset>;
}

/// 适配器注册表
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: BTreeMap<DftCode, Box<dyn ConverterAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册内置适配器
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(Wannier90Adapter));
        registry
    }

    /// 注册适配器，同一标签的旧适配器被替换
    pub fn register(&mut self, adapter: Box<dyn ConverterAdapter>) {
        self.adapters.insert(adapter.code(), adapter);
    }

    pub fn get(&self, code: DftCode) -> Result<&dyn ConverterAdapter> {
        self.adapters
            .get(&code)
            .map(|a| a.as_ref())
            .ok_or_else(|| DockError::UnsupportedCode(code.to_string()))
    }

    pub fn codes(&self) -> impl Iterator<Item = DftCode> + '_ {
        self.adapters.keys().copied()
    }
}

/// 用指定适配器转换单个目录
pub fn parse_native_output(
    registry: &AdapterRegistry,
    code: DftCode,
    dir: &Path,
) -> Result<CanonicalDataset> {
    registry.get(code)?.parse_native_output(dir)
}

/// 并行转换一批目录，结果与输入同序
///
/// 采用 best-effort：一个目录失败不影响其他目录，失败项以 `Failed` 返回。
pub fn convert_many(
    registry: &AdapterRegistry,
    code: DftCode,
    dirs: &[PathBuf],
    ctx: &ExecutionContext,
) -> Result<Vec<ItemOutcome<CanonicalDataset>>> {
    let adapter = registry.get(code)?;
    map_over_best_effort(dirs, |dir| adapter.parse_native_output(dir), ctx)
}
