//! # 误差报告
//!
//! 误差统计的累加器与报告结构。
//!
//! ## 依赖关系
//! - 被 `compare/mod.rs` 与 `commands/compare.rs` 使用

use crate::models::{BlockKey, MatrixChannel};

use serde::Serialize;

/// 逐元素误差累加器
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Accumulator {
    count: usize,
    sum_abs: f64,
    sum_sq: f64,
    max_abs: f64,
    rel_count: usize,
    sum_rel: f64,
    max_rel: f64,
}

impl Accumulator {
    pub(crate) fn add(&mut self, abs: f64, rel: Option<f64>) {
        self.count += 1;
        self.sum_abs += abs;
        self.sum_sq += abs * abs;
        self.max_abs = self.max_abs.max(abs);
        if let Some(rel) = rel {
            self.rel_count += 1;
            self.sum_rel += rel;
            self.max_rel = self.max_rel.max(rel);
        }
    }

    pub(crate) fn merge(&mut self, other: &Accumulator) {
        self.count += other.count;
        self.sum_abs += other.sum_abs;
        self.sum_sq += other.sum_sq;
        self.max_abs = self.max_abs.max(other.max_abs);
        self.rel_count += other.rel_count;
        self.sum_rel += other.sum_rel;
        self.max_rel = self.max_rel.max(other.max_rel);
    }

    pub(crate) fn finish(&self) -> ErrorStats {
        let n = self.count.max(1) as f64;
        ErrorStats {
            count: self.count,
            mean_abs: self.sum_abs / n,
            max_abs: self.max_abs,
            rmse: (self.sum_sq / n).sqrt(),
            rel_count: self.rel_count,
            mean_rel: if self.rel_count > 0 {
                self.sum_rel / self.rel_count as f64
            } else {
                0.0
            },
            max_rel: self.max_rel,
        }
    }
}

/// 一组矩阵元的误差统计
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ErrorStats {
    pub count: usize,
    pub mean_abs: f64,
    pub max_abs: f64,
    pub rmse: f64,
    /// 参与相对误差的元素数（|b| 高于下限）
    pub rel_count: usize,
    pub mean_rel: f64,
    pub max_rel: f64,
}

/// 最大绝对误差所在位置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ElementLocation {
    pub key: BlockKey,
    pub row: usize,
    pub col: usize,
}

/// 元素对的误差
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpeciesPairError {
    pub species_i: String,
    pub species_j: String,
    pub stats: ErrorStats,
}

/// 轨道对的误差
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrbitalPairError {
    pub species_i: String,
    pub species_j: String,
    /// 元素内的轨道序号
    pub orbital_i: usize,
    pub orbital_j: usize,
    /// 可读标签，如 `1p-1`
    pub label_i: String,
    pub label_j: String,
    pub stats: ErrorStats,
}

/// 两个数据集之间的误差报告
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorReport {
    pub channel: MatrixChannel,
    pub element_count: usize,
    pub mean_abs: f64,
    pub max_abs: f64,
    pub rmse: f64,
    pub mean_rel: f64,
    pub max_rel: f64,
    pub max_location: Option<ElementLocation>,
    pub per_species_pair: Vec<SpeciesPairError>,
    pub per_orbital_pair: Vec<OrbitalPairError>,
    /// 只在 B 中出现的块数
    pub missing_in_a: usize,
    /// 只在 A 中出现的块数
    pub missing_in_b: usize,
}

/// 单个数据集的厄米自洽性
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HermiticityReport {
    pub channel: MatrixChannel,
    /// max |H(i,j,R) - H(j,i,-R)†|
    pub max_residual: f64,
    pub mean_residual: f64,
    pub worst_key: Option<BlockKey>,
    /// 比较过的块对数
    pub pairs: usize,
    /// 缺少伙伴的块数（按零块比较）
    pub unpaired: usize,
}

/// 轨道标签：壳层序号 + l 字母 + m
pub(crate) fn orbital_label(shell: usize, l: u8, m: i8) -> String {
    const LETTERS: [char; 5] = ['s', 'p', 'd', 'f', 'g'];
    let letter = LETTERS.get(l as usize).copied().unwrap_or('?');
    format!("{}{}{:+}", shell, letter, m)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulator() {
        let mut acc = Accumulator::default();
        acc.add(1.0, Some(0.5));
        acc.add(3.0, None);
        let stats = acc.finish();
        assert_eq!(stats.count, 2);
        assert_eq!(stats.mean_abs, 2.0);
        assert_eq!(stats.max_abs, 3.0);
        assert!((stats.rmse - 5.0f64.sqrt()).abs() < 1e-15);
        assert_eq!(stats.rel_count, 1);
        assert_eq!(stats.mean_rel, 0.5);
    }

    #[test]
    fn test_orbital_label() {
        assert_eq!(orbital_label(0, 0, 0), "0s+0");
        assert_eq!(orbital_label(2, 1, -1), "2p-1");
        assert_eq!(orbital_label(1, 2, 2), "1d+2");
    }
}
