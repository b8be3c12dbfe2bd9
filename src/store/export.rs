//! # 通用稀疏格式导出
//!
//! 将块稀疏矩阵展开为压缩稀疏列 (CSC) 格式，供外部线性代数库使用。
//!
//! ## 支持格式
//! - 实空间切片 M(R)
//! - k 空间 Bloch 矩阵 M(k) = Σ_R M(R) e^{i2πk·R}
//! - CSV 三元组 (row, col, re, im)，从 0 开始编号
//!
//! 反方向：由 k 点采样的稠密 M(k) 恢复块稀疏 M(R)，
//! M(R) = Σ_k w_k e^{-i2πk·R} M(k)，默认 w_k = 1/N_k。
//!
//! ## 依赖关系
//! - 被 `commands/export.rs` 调用
//! - 使用 `spectral/kspace.rs` 的 Bloch 相位
//! - 使用 `csv` 库写入 CSV 文件

use crate::error::{DockError, Result};
use crate::models::{BlockKey, CanonicalDataset, MatrixChannel, MatrixKind, SparseBlockMatrix};
use crate::spectral::kspace::bloch_phase;

use nalgebra::DMatrix;
use num_complex::Complex64;
use std::collections::BTreeMap;
use std::path::Path;

/// 压缩稀疏列矩阵
#[derive(Debug, Clone, PartialEq)]
pub struct CscMatrix {
    pub nrows: usize,
    pub ncols: usize,
    /// 每列起始位置，长度 ncols + 1
    pub col_ptr: Vec<usize>,
    pub row_idx: Vec<usize>,
    pub values: Vec<Complex64>,
}

impl CscMatrix {
    /// 从 (列, 行) 有序映射构建
    fn from_entries(n: usize, entries: BTreeMap<(usize, usize), Complex64>) -> Self {
        let mut col_ptr = vec![0usize; n + 1];
        let mut row_idx = Vec::with_capacity(entries.len());
        let mut values = Vec::with_capacity(entries.len());

        for ((col, row), value) in entries {
            col_ptr[col + 1] += 1;
            row_idx.push(row);
            values.push(value);
        }
        for c in 0..n {
            col_ptr[c + 1] += col_ptr[c];
        }

        CscMatrix {
            nrows: n,
            ncols: n,
            col_ptr,
            row_idx,
            values,
        }
    }

    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// 按 (row, col) 取元素
    pub fn get(&self, row: usize, col: usize) -> Complex64 {
        let range = self.col_ptr[col]..self.col_ptr[col + 1];
        self.row_idx[range.clone()]
            .iter()
            .position(|&r| r == row)
            .map(|p| self.values[range.start + p])
            .unwrap_or_default()
    }

    /// 迭代 (row, col, value)
    pub fn triplets(&self) -> impl Iterator<Item = (usize, usize, Complex64)> + '_ {
        (0..self.ncols).flat_map(move |col| {
            (self.col_ptr[col]..self.col_ptr[col + 1])
                .map(move |p| (self.row_idx[p], col, self.values[p]))
        })
    }
}

/// 实空间切片 M(R)
pub fn to_csc(dataset: &CanonicalDataset, channel: MatrixChannel, r: [i32; 3]) -> Result<CscMatrix> {
    let matrix = dataset.require(channel)?;
    let offsets = dataset.offsets();
    let mut entries = BTreeMap::new();

    for (key, block) in matrix.iter().filter(|(k, _)| k.r == r) {
        for a in 0..block.nrows() {
            for b in 0..block.ncols() {
                let z = block[(a, b)];
                if z != Complex64::default() {
                    entries.insert((offsets[key.j] + b, offsets[key.i] + a), z);
                }
            }
        }
    }

    Ok(CscMatrix::from_entries(dataset.dimension(), entries))
}

/// k 空间 Bloch 矩阵 M(k)，k 为分数坐标
pub fn to_csc_k(dataset: &CanonicalDataset, channel: MatrixChannel, k: [f64; 3]) -> Result<CscMatrix> {
    let matrix = dataset.require(channel)?;
    let offsets = dataset.offsets();
    let mut entries: BTreeMap<(usize, usize), Complex64> = BTreeMap::new();

    for (key, block) in matrix.iter() {
        let phase = bloch_phase(&k, &key.r);
        for a in 0..block.nrows() {
            for b in 0..block.ncols() {
                *entries
                    .entry((offsets[key.j] + b, offsets[key.i] + a))
                    .or_default() += block[(a, b)] * phase;
            }
        }
    }
    entries.retain(|_, z| *z != Complex64::default());

    Ok(CscMatrix::from_entries(dataset.dimension(), entries))
}

/// 由 k 点采样的 Bloch 矩阵反变换出 `keys` 指定的实空间块
///
/// `offsets` 为原子轨道偏移（末尾为总维度）。采样网格需覆盖所有 R，
/// 否则结果带有混叠。
pub fn from_bloch_samples(
    ks: &[[f64; 3]],
    matrices: &[DMatrix<Complex64>],
    weights: Option<&[f64]>,
    keys: &[BlockKey],
    offsets: &[usize],
    kind: MatrixKind,
) -> Result<SparseBlockMatrix> {
    if ks.is_empty() || ks.len() != matrices.len() {
        return Err(DockError::InvalidArgument(format!(
            "{} k-points but {} Bloch matrices",
            ks.len(),
            matrices.len()
        )));
    }
    let uniform = vec![1.0 / ks.len() as f64; ks.len()];
    let weights = match weights {
        Some(w) if w.len() != ks.len() => {
            return Err(DockError::InvalidArgument(format!(
                "{} weights for {} k-points",
                w.len(),
                ks.len()
            )))
        }
        Some(w) => w,
        None => uniform.as_slice(),
    };

    let atoms = offsets.len().saturating_sub(1);
    let dim = offsets.last().copied().unwrap_or(0);
    if let Some(m) = matrices.iter().find(|m| m.shape() != (dim, dim)) {
        return Err(DockError::Schema {
            reason: format!("Bloch matrix is {:?}, basis implies {}x{}", m.shape(), dim, dim),
        });
    }
    if let Some(key) = keys.iter().find(|k| k.i >= atoms || k.j >= atoms) {
        return Err(DockError::Schema {
            reason: format!("block {} references an atom outside 0..{}", key, atoms),
        });
    }

    let mut result = SparseBlockMatrix::new(kind);
    for key in keys {
        let (row, col) = (offsets[key.i], offsets[key.j]);
        let shape = (offsets[key.i + 1] - row, offsets[key.j + 1] - col);
        let mut block = DMatrix::<Complex64>::zeros(shape.0, shape.1);
        for ((k, m), w) in ks.iter().zip(matrices).zip(weights) {
            let phase = bloch_phase(k, &key.r).conj() * *w;
            block += m.view((row, col), shape) * phase;
        }
        result.insert(*key, block);
    }
    Ok(result)
}

/// 写出 CSV 三元组
pub fn write_csc_triplets(csc: &CscMatrix, output_path: &Path) -> Result<()> {
    let mut wtr = csv::Writer::from_path(output_path)?;

    wtr.write_record(["row", "col", "re", "im"])?;
    for (row, col, z) in csc.triplets() {
        wtr.write_record(&[
            row.to_string(),
            col.to_string(),
            format!("{:.16e}", z.re),
            format!("{:.16e}", z.im),
        ])?;
    }

    wtr.flush().map_err(|e| DockError::FileWriteError {
        path: output_path.display().to_string(),
        source: e,
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{fixtures, max_abs_diff};
    use crate::spectral::BlochOperator;

    #[test]
    fn test_real_space_slice() {
        let ds = fixtures::two_site_chain(0.3, 0.32);
        let csc = to_csc(&ds, MatrixChannel::Hamiltonian, [0, 0, 0]).unwrap();
        assert_eq!(csc.nnz(), 3);
        assert_eq!(csc.col_ptr, vec![0, 2, 3]);
        assert_eq!(csc.get(0, 1).re, 0.3);
        assert_eq!(csc.get(1, 0).re, 0.32);
        assert_eq!(csc.get(1, 1), Complex64::default());
    }

    #[test]
    fn test_bloch_matrix_is_hermitian() {
        let ds = fixtures::complex_ring(4, 1.0, 0.4);
        let csc = to_csc_k(&ds, MatrixChannel::Hamiltonian, [0.3, 0.0, 0.0]).unwrap();
        for (row, col, z) in csc.triplets() {
            assert!((csc.get(col, row) - z.conj()).norm() < 1e-12);
        }
    }

    #[test]
    fn test_triplet_csv() {
        let ds = fixtures::two_site_chain(0.3, 0.32);
        let csc = to_csc(&ds, MatrixChannel::Hamiltonian, [0, 0, 0]).unwrap();
        let path = std::env::temp_dir().join(format!("hamdock_csc_{}.csv", std::process::id()));
        write_csc_triplets(&csc, &path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 4);
        assert!(text.starts_with("row,col,re,im"));
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_bloch_samples_recover_real_space_blocks() {
        let ds = fixtures::random_chain(2, 11);
        let h = ds.matrix(MatrixChannel::Hamiltonian).unwrap();
        let offsets = ds.offsets();
        // R 只取 0, ±1，4 个 k 点足以无混叠
        let ks: Vec<[f64; 3]> = (0..4).map(|i| [i as f64 / 4.0, 0.0, 0.0]).collect();
        let samples: Vec<_> = ks
            .iter()
            .map(|k| BlochOperator::<Complex64>::new(h, &offsets, k).to_dense())
            .collect();
        let keys: Vec<BlockKey> = h.keys().copied().collect();

        let back = from_bloch_samples(&ks, &samples, None, &keys, &offsets, MatrixKind::Complex).unwrap();
        assert_eq!(back.len(), h.len());
        for (key, block) in h.iter() {
            assert!(max_abs_diff(block, back.get(key).unwrap()) < 1e-12, "{key}");
        }

        // 未存储的平移为零
        let far = BlockKey::new(0, 1, [2, 0, 0]);
        let zero = from_bloch_samples(&ks, &samples, None, &[far], &offsets, MatrixKind::Complex)
            .unwrap();
        assert!(zero.get(&far).unwrap().iter().all(|z| z.norm() < 1e-12));
    }

    #[test]
    fn test_bloch_samples_reject_inconsistent_input() {
        let ds = fixtures::two_site_chain(0.3, 0.3);
        let offsets = ds.offsets();
        let keys = [BlockKey::new(0, 1, [0, 0, 0])];
        let m = DMatrix::<Complex64>::identity(2, 2);

        let err = from_bloch_samples(&[[0.0; 3]], &[m.clone(), m.clone()], None, &keys, &offsets, MatrixKind::Real)
            .unwrap_err();
        assert!(matches!(err, DockError::InvalidArgument(_)));

        let err = from_bloch_samples(&[[0.0; 3]], &[m.clone()], Some(&[0.5, 0.5]), &keys, &offsets, MatrixKind::Real)
            .unwrap_err();
        assert!(matches!(err, DockError::InvalidArgument(_)));

        let wrong = DMatrix::<Complex64>::identity(3, 3);
        let err = from_bloch_samples(&[[0.0; 3]], &[wrong], None, &keys, &offsets, MatrixKind::Real)
            .unwrap_err();
        assert!(matches!(err, DockError::Schema { .. }));

        let err = from_bloch_samples(&[[0.0; 3]], &[m], None, &[BlockKey::new(0, 2, [0, 0, 0])], &offsets, MatrixKind::Real)
            .unwrap_err();
        assert!(matches!(err, DockError::Schema { .. }));
    }
}
