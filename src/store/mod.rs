//! # 规范存储
//!
//! 规范数据集的持久化与访问原语。
//!
//! ## 功能
//! - `load`：读取容器，损坏时报告出错的节
//! - `save`：写出容器，`load(save(D)) == D` 逐位成立
//! - `get_block` / `iterate_blocks`：按键取块与可重复的有序遍历
//! - `export`：导出为 CSC 等通用稀疏格式
//!
//! ## 依赖关系
//! - 被 `commands/` 与集成测试使用
//! - 使用 `models/`, `serde_json`

pub mod container;
pub mod export;

use crate::error::{DockError, Result};
use crate::models::{
    AtomicStructure, BasisDescriptor, Block, BlockKey, CanonicalDataset, MatrixChannel, Metadata,
    SparseBlockMatrix,
};
use container::{MatrixSection, FORMAT_VERSION};

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

/// 读取规范容器
pub fn load(path: &Path) -> Result<CanonicalDataset> {
    let file = File::open(path).map_err(|e| DockError::FileReadError {
        path: path.display().to_string(),
        source: e,
    })?;

    let root: Value =
        serde_json::from_reader(BufReader::new(file)).map_err(|e| DockError::Format {
            section: "/".to_string(),
            reason: e.to_string(),
        })?;
    let mut root = match root {
        Value::Object(map) => map,
        _ => {
            return Err(DockError::Format {
                section: "/".to_string(),
                reason: "container root is not an object".to_string(),
            })
        }
    };

    let version: u32 = section(&mut root, "format_version")?;
    if version != FORMAT_VERSION {
        return Err(DockError::Format {
            section: "format_version".to_string(),
            reason: format!("unsupported version {} (expected {})", version, FORMAT_VERSION),
        });
    }

    let structure: AtomicStructure = section(&mut root, "structure")?;
    let basis: BasisDescriptor = section(&mut root, "basis")?;
    let metadata: Metadata = section(&mut root, "metadata")?;
    let sections: BTreeMap<String, MatrixSection> = section(&mut root, "matrices")?;

    let dims = structure
        .species
        .iter()
        .map(|sp| {
            basis.orbital_count(sp).ok_or_else(|| DockError::Format {
                section: "basis".to_string(),
                reason: format!("no orbital layout for species '{}'", sp),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let mut matrices = BTreeMap::new();
    for (name, body) in sections {
        let path = format!("matrices/{}", name);
        let channel =
            MatrixChannel::from_section_name(&name).ok_or_else(|| DockError::Format {
                section: path.clone(),
                reason: "unknown matrix channel".to_string(),
            })?;
        matrices.insert(channel, body.into_matrix(&path, &dims)?);
    }

    tracing::debug!(
        path = %path.display(),
        atoms = structure.atom_count(),
        channels = matrices.len(),
        "loaded canonical dataset"
    );

    CanonicalDataset::new(Arc::new(structure), Arc::new(basis), matrices, metadata)
}

/// 写出规范容器
pub fn save(dataset: &CanonicalDataset, path: &Path) -> Result<()> {
    let write_err = |e: std::io::Error| DockError::FileWriteError {
        path: path.display().to_string(),
        source: e,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(write_err)?;
    }

    let mut root = Map::new();
    root.insert("format_version".to_string(), Value::from(FORMAT_VERSION));
    root.insert("structure".to_string(), to_value(dataset.structure())?);
    root.insert("basis".to_string(), to_value(dataset.basis())?);

    let mut matrices = Map::new();
    for (channel, matrix) in dataset.matrices() {
        matrices.insert(
            channel.section_name().to_string(),
            to_value(&MatrixSection::from_matrix(matrix))?,
        );
    }
    root.insert("matrices".to_string(), Value::Object(matrices));
    root.insert("metadata".to_string(), to_value(dataset.metadata())?);

    let file = File::create(path).map_err(write_err)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, &Value::Object(root)).map_err(|e| {
        DockError::FileWriteError {
            path: path.display().to_string(),
            source: e.into(),
        }
    })?;
    writer.flush().map_err(write_err)?;
    Ok(())
}

/// 按 (i, j, R) 取块；不存在即隐式零块
pub fn get_block(matrix: &SparseBlockMatrix, i: usize, j: usize, r: [i32; 3]) -> Option<&Block> {
    matrix.get(&BlockKey::new(i, j, r))
}

/// 有序、有限、可重复的块遍历
pub fn iterate_blocks(
    matrix: &SparseBlockMatrix,
) -> impl Iterator<Item = (usize, usize, [i32; 3], &Block)> + '_ {
    matrix.iter().map(|(k, b)| (k.i, k.j, k.r, b))
}

fn section<T: DeserializeOwned>(root: &mut Map<String, Value>, name: &str) -> Result<T> {
    let value = root.remove(name).ok_or_else(|| DockError::Format {
        section: name.to_string(),
        reason: "section missing".to_string(),
    })?;
    serde_json::from_value(value).map_err(|e| DockError::Format {
        section: name.to_string(),
        reason: e.to_string(),
    })
}

fn to_value<T: serde::Serialize + ?Sized>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| DockError::InvalidArgument(e.to_string()))
}
