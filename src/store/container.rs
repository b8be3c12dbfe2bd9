//! # 规范容器的序列化结构
//!
//! 容器是一个分节的 JSON 文档：
//! ```text
//! {
//!   "format_version": 1,
//!   "structure": { lattice, species, positions, periodic },
//!   "basis":     { shells: { species: [l, ...] } },
//!   "matrices": {
//!     "hamiltonian": { kind, index: [[i, j, R0, R1, R2], ...], re: [...], im: [...] },
//!     "overlap":     { ... }
//!   },
//!   "metadata":  { energy_unit, length_unit, fermi_energy, provenance, symmetrized, cutoff_radius }
//! }
//! ```
//! 块数据按索引表顺序依次排列，每块按行主序展开；
//! 每块长度由基组决定，因此索引表不记录偏移。
//!
//! ## 依赖关系
//! - 被 `store/mod.rs` 使用
//! - 使用 `serde`, `serde_json`

use crate::error::{DockError, Result};
use crate::models::{Block, BlockKey, MatrixKind, SparseBlockMatrix};

use nalgebra::DMatrix;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

/// 当前容器版本
pub const FORMAT_VERSION: u32 = 1;

/// 单个矩阵节
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatrixSection {
    pub kind: MatrixKind,
    /// 块索引表 [i, j, R0, R1, R2]
    pub index: Vec<[i64; 5]>,
    /// 实部（按索引表顺序拼接）
    pub re: Vec<f64>,
    /// 虚部，仅复矩阵
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub im: Option<Vec<f64>>,
}

impl MatrixSection {
    /// 从块稀疏矩阵生成矩阵节
    pub fn from_matrix(matrix: &SparseBlockMatrix) -> Self {
        let mut index = Vec::with_capacity(matrix.len());
        let mut re = Vec::with_capacity(matrix.nnz());
        let mut im = Vec::with_capacity(if matrix.is_real() { 0 } else { matrix.nnz() });

        for (key, block) in matrix.iter() {
            index.push([
                key.i as i64,
                key.j as i64,
                key.r[0] as i64,
                key.r[1] as i64,
                key.r[2] as i64,
            ]);
            for a in 0..block.nrows() {
                for b in 0..block.ncols() {
                    let z = block[(a, b)];
                    re.push(z.re);
                    if !matrix.is_real() {
                        im.push(z.im);
                    }
                }
            }
        }

        MatrixSection {
            kind: matrix.kind,
            index,
            re,
            im: if matrix.is_real() { None } else { Some(im) },
        }
    }

    /// 按每个原子的轨道数重建块稀疏矩阵
    pub fn into_matrix(self, section: &str, dims: &[usize]) -> Result<SparseBlockMatrix> {
        let format_err = |reason: String| DockError::Format {
            section: section.to_string(),
            reason,
        };

        let im = match (self.kind, self.im) {
            (MatrixKind::Real, None) => None,
            (MatrixKind::Real, Some(_)) => {
                return Err(format_err("real matrix carries an imaginary payload".into()))
            }
            (MatrixKind::Complex, Some(im)) => {
                if im.len() != self.re.len() {
                    return Err(format_err(format!(
                        "imaginary payload has {} values, real payload has {}",
                        im.len(),
                        self.re.len()
                    )));
                }
                Some(im)
            }
            (MatrixKind::Complex, None) => {
                return Err(format_err("complex matrix lacks an imaginary payload".into()))
            }
        };

        let mut matrix = SparseBlockMatrix::new(self.kind);
        let mut cursor = 0usize;

        for (row, entry) in self.index.iter().enumerate() {
            let key = decode_key(entry)
                .ok_or_else(|| format_err(format!("index row {} is not a valid key", row)))?;
            let (ni, nj) = match (dims.get(key.i), dims.get(key.j)) {
                (Some(&ni), Some(&nj)) => (ni, nj),
                _ => {
                    return Err(format_err(format!(
                        "index row {} references atom outside 0..{}",
                        row,
                        dims.len()
                    )))
                }
            };
            let len = ni * nj;
            if cursor + len > self.re.len() {
                return Err(format_err(format!(
                    "payload truncated at block {} (needs {} values, {} left)",
                    key,
                    len,
                    self.re.len() - cursor
                )));
            }

            let block: Block = DMatrix::from_fn(ni, nj, |a, b| {
                let at = cursor + a * nj + b;
                let imag = im.as_ref().map_or(0.0, |v| v[at]);
                Complex64::new(self.re[at], imag)
            });
            cursor += len;

            if matrix.insert(key, block).is_some() {
                return Err(format_err(format!("duplicate block key {}", key)));
            }
        }

        if cursor != self.re.len() {
            return Err(format_err(format!(
                "{} trailing payload values after the last block",
                self.re.len() - cursor
            )));
        }

        Ok(matrix)
    }
}

fn decode_key(entry: &[i64; 5]) -> Option<BlockKey> {
    let i = usize::try_from(entry[0]).ok()?;
    let j = usize::try_from(entry[1]).ok()?;
    let r = [
        i32::try_from(entry[2]).ok()?,
        i32::try_from(entry[3]).ok()?,
        i32::try_from(entry[4]).ok()?,
    ];
    Some(BlockKey::new(i, j, r))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_section_rejects_truncated_payload() {
        let section = MatrixSection {
            kind: MatrixKind::Real,
            index: vec![[0, 0, 0, 0, 0], [0, 1, 0, 0, 0]],
            re: vec![1.0, 2.0],
            im: None,
        };
        let err = section.into_matrix("matrices/hamiltonian", &[1, 2]).unwrap_err();
        match err {
            DockError::Format { section, reason } => {
                assert_eq!(section, "matrices/hamiltonian");
                assert!(reason.contains("truncated"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_section_rejects_duplicate_key() {
        let section = MatrixSection {
            kind: MatrixKind::Real,
            index: vec![[0, 0, 0, 0, 0], [0, 0, 0, 0, 0]],
            re: vec![1.0, 1.0],
            im: None,
        };
        let err = section.into_matrix("matrices/overlap", &[1]).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_complex_section_roundtrip() {
        let mut m = SparseBlockMatrix::new(MatrixKind::Complex);
        m.insert(
            BlockKey::new(0, 1, [1, 0, 0]),
            DMatrix::from_row_slice(
                1,
                2,
                &[Complex64::new(0.5, -0.25), Complex64::new(-1.0, 3.0)],
            ),
        );
        let section = MatrixSection::from_matrix(&m);
        assert_eq!(section.im.as_ref().map(|v| v.len()), Some(2));
        let back = section.into_matrix("matrices/hamiltonian", &[1, 2]).unwrap();
        assert_eq!(back, m);
    }
}
