//! # Wannier90 紧束缚输出转换器
//!
//! 读取一个计算目录中的三个文件：
//! - `POSCAR`: 晶格与原子（原子顺序即 Wannier 轨道的分组顺序）
//! - `orbital_types.dat`: 每个原子一行，列出各壳层的角动量 l
//! - `wannier90_hr.dat`: 实空间哈密顿量 H_mn(R)
//!
//! ## hr.dat 格式
//! ```text
//! header line
//! num_wann
//! nrpts
//! deg_1 ... deg_15       # Wigner-Seitz 简并度，每行 15 个
//! ...
//! R1 R2 R3 m n Re Im     # 每个 R 点 num_wann^2 行
//! ```
//!
//! 跃迁按简并度平均；轨道从 Wannier90 的投影顺序 (m = 0, +1, -1, +2, -2, ...)
//! 重排为实球谐顺序 (m = -l..l)。Wannier 函数正交，重叠矩阵为在位单位块。
//!
//! ## 依赖关系
//! - 被 `parsers/mod.rs` 注册
//! - 使用 `parsers/poscar.rs` 读取结构

use super::poscar::parse_poscar_file;
use super::{ConverterAdapter, DftCode};
use crate::error::{DockError, Result};
use crate::models::{
    AtomicStructure, BasisDescriptor, Block, BlockKey, CanonicalDataset, MatrixChannel,
    MatrixKind, Metadata, SparseBlockMatrix,
};

use nalgebra::DMatrix;
use num_complex::Complex64;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use std::sync::Arc;

pub const POSCAR_FILE: &str = "POSCAR";
pub const ORBITAL_TYPES_FILE: &str = "orbital_types.dat";
pub const HR_FILE: &str = "wannier90_hr.dat";

/// Wannier90 转换器
#[derive(Debug, Clone, Copy, Default)]
pub struct Wannier90Adapter;

impl ConverterAdapter for Wannier90Adapter {
    fn code(&self) -> DftCode {
        DftCode::Wannier90
    }

    fn marker(&self) -> &'static str {
        HR_FILE
    }

    fn parse_native_output(&self, dir: &Path) -> Result<CanonicalDataset> {
        if !dir.is_dir() {
            return Err(DockError::DirectoryNotFound {
                path: dir.display().to_string(),
            });
        }

        let structure = parse_poscar_file(&require_file(dir, POSCAR_FILE)?)?;

        let orbital_path = require_file(dir, ORBITAL_TYPES_FILE)?;
        let shells = parse_orbital_types(&read(&orbital_path)?, &orbital_path.display().to_string())?;
        let basis = build_basis(&structure, &shells, &orbital_path.display().to_string())?;

        let hr_path = require_file(dir, HR_FILE)?;
        let layout = OrbitalLayout::new(&shells);
        let hamiltonian = parse_hr(&read(&hr_path)?, &hr_path.display().to_string(), &layout)?;

        let mut overlap = SparseBlockMatrix::new(MatrixKind::Real);
        for (i, atom_shells) in shells.iter().enumerate() {
            let n = orbital_count(atom_shells);
            overlap.insert(BlockKey::new(i, i, [0, 0, 0]), DMatrix::identity(n, n));
        }

        tracing::debug!(
            dir = %dir.display(),
            atoms = structure.atom_count(),
            orbitals = layout.total(),
            blocks = hamiltonian.len(),
            "parsed wannier90 output"
        );

        let mut matrices = BTreeMap::new();
        matrices.insert(MatrixChannel::Hamiltonian, hamiltonian);
        matrices.insert(MatrixChannel::Overlap, overlap);

        let metadata = Metadata {
            provenance: format!("wannier90:{}", dir.display()),
            ..Metadata::default()
        };
        CanonicalDataset::new(Arc::new(structure), Arc::new(basis), matrices, metadata)
    }
}

fn require_file(dir: &Path, name: &str) -> Result<std::path::PathBuf> {
    let path = dir.join(name);
    if !path.is_file() {
        return Err(DockError::FileNotFound {
            path: path.display().to_string(),
        });
    }
    Ok(path)
}

fn read(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| DockError::FileReadError {
        path: path.display().to_string(),
        source: e,
    })
}

fn orbital_count(shells: &[u8]) -> usize {
    shells.iter().map(|&l| 2 * l as usize + 1).sum()
}

/// 解析 orbital_types.dat：每个非空行是一个原子的壳层 l 列表
pub fn parse_orbital_types(content: &str, file: &str) -> Result<Vec<Vec<u8>>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            line.split_whitespace()
                .map(|tok| {
                    tok.parse::<u8>().map_err(|_| DockError::Parse {
                        file: file.to_string(),
                        line: index + 1,
                        reason: format!("Invalid angular momentum '{}'", tok),
                    })
                })
                .collect::<Result<Vec<u8>>>()
        })
        .collect()
}

/// 由每个原子的壳层建立按元素的基组；同一元素的壳层必须一致
fn build_basis(
    structure: &AtomicStructure,
    shells: &[Vec<u8>],
    file: &str,
) -> Result<BasisDescriptor> {
    if shells.len() != structure.atom_count() {
        return Err(DockError::Parse {
            file: file.to_string(),
            line: shells.len(),
            reason: format!(
                "{} orbital lines for {} atoms",
                shells.len(),
                structure.atom_count()
            ),
        });
    }

    let mut by_species: BTreeMap<&str, &Vec<u8>> = BTreeMap::new();
    for (atom, (species, atom_shells)) in structure.species.iter().zip(shells).enumerate() {
        match by_species.get(species.as_str()) {
            Some(existing) if *existing != atom_shells => {
                return Err(DockError::Parse {
                    file: file.to_string(),
                    line: atom + 1,
                    reason: format!(
                        "atom {} ({}) has shells {:?}, earlier {} atoms have {:?}",
                        atom, species, atom_shells, species, existing
                    ),
                });
            }
            Some(_) => {}
            None => {
                by_species.insert(species.as_str(), atom_shells);
            }
        }
    }

    Ok(by_species
        .into_iter()
        .fold(BasisDescriptor::new(), |basis, (species, ls)| {
            basis.with_species(species, ls.clone())
        }))
}

/// Wannier 轨道序号到 (原子, 原子内规范序号) 的映射
struct OrbitalLayout {
    slots: Vec<(usize, usize)>,
    dims: Vec<usize>,
}

impl OrbitalLayout {
    fn new(shells: &[Vec<u8>]) -> Self {
        let mut slots = Vec::new();
        let mut dims = Vec::with_capacity(shells.len());
        for (atom, atom_shells) in shells.iter().enumerate() {
            let mut offset = 0;
            for &l in atom_shells {
                let l = l as i32;
                // Wannier90 投影顺序 m = 0, +1, -1, +2, -2, ...
                for w in 0..(2 * l + 1) {
                    let m = if w == 0 {
                        0
                    } else if w % 2 == 1 {
                        (w + 1) / 2
                    } else {
                        -(w / 2)
                    };
                    slots.push((atom, offset + (m + l) as usize));
                }
                offset += (2 * l + 1) as usize;
            }
            dims.push(offset);
        }
        OrbitalLayout { slots, dims }
    }

    fn total(&self) -> usize {
        self.slots.len()
    }
}

/// 按块记录已填充的元素数，用于发现截断
struct PendingBlock {
    block: Block,
    filled: usize,
}

/// 解析 wannier90_hr.dat
fn parse_hr(content: &str, file: &str, layout: &OrbitalLayout) -> Result<SparseBlockMatrix> {
    let parse_error = |line: usize, reason: String| DockError::Parse {
        file: file.to_string(),
        line,
        reason,
    };

    let mut lines = content.lines().enumerate().map(|(i, l)| (i + 1, l)).skip(1);
    let mut header_value = |name: &str| -> Result<usize> {
        let (no, line) = lines
            .next()
            .ok_or_else(|| parse_error(0, format!("Missing {}", name)))?;
        line.trim()
            .parse()
            .map_err(|_| parse_error(no, format!("Invalid {} '{}'", name, line.trim())))
    };
    let num_wann = header_value("num_wann")?;
    let nrpts = header_value("nrpts")?;

    if num_wann != layout.total() {
        return Err(parse_error(
            2,
            format!(
                "num_wann = {} but orbital_types.dat describes {} orbitals",
                num_wann,
                layout.total()
            ),
        ));
    }

    let mut degeneracies = Vec::with_capacity(nrpts);
    while degeneracies.len() < nrpts {
        let (no, line) = lines
            .next()
            .ok_or_else(|| parse_error(0, "Truncated degeneracy list".to_string()))?;
        for tok in line.split_whitespace() {
            let deg: usize = tok
                .parse()
                .map_err(|_| parse_error(no, format!("Invalid degeneracy '{}'", tok)))?;
            if deg == 0 {
                return Err(parse_error(no, "Zero degeneracy".to_string()));
            }
            degeneracies.push(deg);
        }
    }

    let per_point = num_wann * num_wann;
    let expected = nrpts * per_point;
    let mut pending: BTreeMap<BlockKey, PendingBlock> = BTreeMap::new();
    let mut seen_r: BTreeSet<[i32; 3]> = BTreeSet::new();
    let mut count = 0;
    let mut truncated = false;

    for (no, line) in lines {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.is_empty() {
            continue;
        }
        if count == expected {
            return Err(parse_error(no, format!("Expected {} matrix elements", expected)));
        }
        if tokens.len() < 7 {
            // 末尾不完整的一行视为截断
            truncated = true;
            break;
        }

        let ints: Vec<i64> = tokens[..5]
            .iter()
            .map(|t| t.parse())
            .collect::<std::result::Result<_, _>>()
            .map_err(|_| parse_error(no, "Invalid R vector or orbital index".to_string()))?;
        let re: f64 = tokens[5]
            .parse()
            .map_err(|_| parse_error(no, format!("Invalid real part '{}'", tokens[5])))?;
        let im: f64 = tokens[6]
            .parse()
            .map_err(|_| parse_error(no, format!("Invalid imaginary part '{}'", tokens[6])))?;

        let r = [ints[0] as i32, ints[1] as i32, ints[2] as i32];
        let orbital = |index: i64| -> Result<(usize, usize)> {
            usize::try_from(index - 1)
                .ok()
                .and_then(|k| layout.slots.get(k).copied())
                .ok_or_else(|| parse_error(no, format!("Orbital index {} out of range", index)))
        };
        let (ai, li) = orbital(ints[3])?;
        let (aj, lj) = orbital(ints[4])?;

        let deg = degeneracies[count / per_point] as f64;
        let key = BlockKey::new(ai, aj, r);
        let entry = pending.entry(key).or_insert_with(|| PendingBlock {
            block: DMatrix::zeros(layout.dims[ai], layout.dims[aj]),
            filled: 0,
        });
        entry.block[(li, lj)] = Complex64::new(re / deg, im / deg);
        entry.filled += 1;
        seen_r.insert(r);
        count += 1;
    }

    if truncated || count < expected {
        let atoms = layout.dims.len();
        let complete = |key: &BlockKey| pending.get(key).is_some_and(|p| p.filled == p.block.len());
        let mut missing: BTreeSet<BlockKey> = BTreeSet::new();
        // 已读到的 R 点上每个原子对都应有完整的块
        for r in &seen_r {
            for i in 0..atoms {
                for j in 0..atoms {
                    let key = BlockKey::new(i, j, *r);
                    if !complete(&key) {
                        missing.insert(key);
                    }
                }
            }
        }
        // 整个 R 点缺失时，由已读到的 -R 推出
        if seen_r.len() < nrpts {
            for r in &seen_r {
                let minus = [-r[0], -r[1], -r[2]];
                if seen_r.contains(&minus) {
                    continue;
                }
                for i in 0..atoms {
                    for j in 0..atoms {
                        missing.insert(BlockKey::new(i, j, minus));
                    }
                }
            }
        }
        if missing.is_empty() {
            return Err(parse_error(
                0,
                format!("Truncated: {} of {} matrix elements", count, expected),
            ));
        }
        return Err(DockError::PartialData {
            file: file.to_string(),
            missing: missing.into_iter().collect(),
        });
    }

    Ok(pending
        .into_iter()
        .map(|(key, p)| (key, p.block))
        .collect())
}
