//! # 原子结构数据模型
//!
//! 定义晶格与原子结构。结构在构造后不可变，
//! 由同一数据集中的所有矩阵通过 `Arc` 共享。
//!
//! ## 依赖关系
//! - 被 `models/dataset.rs`, `parsers/`, `validate/`, `symmetrize/` 使用
//! - 无外部模块依赖

use serde::{Deserialize, Serialize};

/// 晶格参数表示
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lattice {
    /// 晶格向量矩阵 (3x3)，行向量表示 a, b, c
    /// [[a1, a2, a3], [b1, b2, b3], [c1, c2, c3]]
    pub matrix: [[f64; 3]; 3],
}

impl Lattice {
    /// 从晶格向量矩阵创建
    pub fn from_vectors(matrix: [[f64; 3]; 3]) -> Self {
        Lattice { matrix }
    }

    /// 从晶格参数 (a, b, c, alpha, beta, gamma) 创建晶格
    /// 角度单位：度
    pub fn from_parameters(a: f64, b: f64, c: f64, alpha: f64, beta: f64, gamma: f64) -> Self {
        let cos_alpha = alpha.to_radians().cos();
        let cos_beta = beta.to_radians().cos();
        let (sin_gamma, cos_gamma) = gamma.to_radians().sin_cos();

        let c1 = c * cos_beta;
        let c2 = c * (cos_alpha - cos_beta * cos_gamma) / sin_gamma;
        let c3 = (c * c - c1 * c1 - c2 * c2).sqrt();

        Lattice {
            matrix: [
                [a, 0.0, 0.0],
                [b * cos_gamma, b * sin_gamma, 0.0],
                [c1, c2, c3],
            ],
        }
    }

    /// 获取晶格参数 (a, b, c, alpha, beta, gamma)
    pub fn parameters(&self) -> (f64, f64, f64, f64, f64, f64) {
        let [a_vec, b_vec, c_vec] = self.matrix;
        let (a, b, c) = (norm(&a_vec), norm(&b_vec), norm(&c_vec));

        let alpha = (dot(&b_vec, &c_vec) / (b * c)).acos().to_degrees();
        let beta = (dot(&a_vec, &c_vec) / (a * c)).acos().to_degrees();
        let gamma = (dot(&a_vec, &b_vec) / (a * b)).acos().to_degrees();

        (a, b, c, alpha, beta, gamma)
    }

    /// 有符号体积 a · (b × c)
    pub fn volume(&self) -> f64 {
        let [a, b, c] = self.matrix;
        dot(&a, &cross(&b, &c))
    }

    /// 右手系判定（有符号体积为正）
    pub fn is_right_handed(&self) -> bool {
        self.volume() > 0.0
    }

    /// 晶格矩阵的逆（列向量为倒格矢除以 2π）
    pub fn inverse(&self) -> Option<[[f64; 3]; 3]> {
        let vol = self.volume();
        if vol.abs() < 1e-12 {
            return None;
        }
        let [a, b, c] = self.matrix;
        let bc = cross(&b, &c);
        let ca = cross(&c, &a);
        let ab = cross(&a, &b);
        // inv[x][k] 满足 Σ_x matrix[i][x] inv[x][k] = δ_ik
        let mut inv = [[0.0; 3]; 3];
        for x in 0..3 {
            inv[x] = [bc[x] / vol, ca[x] / vol, ab[x] / vol];
        }
        Some(inv)
    }

    /// 倒格矢（含 2π 因子，行向量）
    pub fn reciprocal(&self) -> Option<[[f64; 3]; 3]> {
        let inv = self.inverse()?;
        let two_pi = 2.0 * std::f64::consts::PI;
        let mut recip = [[0.0; 3]; 3];
        for (k, row) in recip.iter_mut().enumerate() {
            for x in 0..3 {
                row[x] = two_pi * inv[x][k];
            }
        }
        Some(recip)
    }

    /// 分数坐标转笛卡尔坐标
    pub fn to_cartesian(&self, frac: &[f64; 3]) -> [f64; 3] {
        let m = self.matrix;
        let mut cart = [0.0; 3];
        for (x, value) in cart.iter_mut().enumerate() {
            *value = frac[0] * m[0][x] + frac[1] * m[1][x] + frac[2] * m[2][x];
        }
        cart
    }

    /// 整数平移向量 R 对应的笛卡尔位移
    pub fn translation(&self, r: &[i32; 3]) -> [f64; 3] {
        self.to_cartesian(&[r[0] as f64, r[1] as f64, r[2] as f64])
    }
}

/// 原子结构：晶格、元素、分数坐标与周期性
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtomicStructure {
    pub lattice: Lattice,

    /// 每个原子的元素/基组标签
    pub species: Vec<String>,

    /// 分数坐标 [x, y, z]
    pub positions: Vec<[f64; 3]>,

    /// 沿 a, b, c 的周期性
    pub periodic: [bool; 3],
}

impl AtomicStructure {
    pub fn new(lattice: Lattice, species: Vec<String>, positions: Vec<[f64; 3]>) -> Self {
        AtomicStructure {
            lattice,
            species,
            positions,
            periodic: [true; 3],
        }
    }

    pub fn with_periodicity(mut self, periodic: [bool; 3]) -> Self {
        self.periodic = periodic;
        self
    }

    pub fn atom_count(&self) -> usize {
        self.positions.len()
    }

    /// 笛卡尔坐标
    pub fn cartesian_positions(&self) -> Vec<[f64; 3]> {
        self.positions
            .iter()
            .map(|p| self.lattice.to_cartesian(p))
            .collect()
    }

    /// 原子 i（原胞）与原子 j（平移 R 后的晶胞）之间的距离
    pub fn pair_distance(&self, i: usize, j: usize, r: &[i32; 3]) -> f64 {
        let pi = self.lattice.to_cartesian(&self.positions[i]);
        let pj = self.lattice.to_cartesian(&self.positions[j]);
        let shift = self.lattice.translation(r);
        let d = [
            pj[0] + shift[0] - pi[0],
            pj[1] + shift[1] - pi[1],
            pj[2] + shift[2] - pi[2],
        ];
        norm(&d)
    }

    /// 化学式（按元素字母序）
    pub fn formula(&self) -> String {
        use std::collections::BTreeMap;
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();

        for sp in &self.species {
            *counts.entry(sp.as_str()).or_insert(0) += 1;
        }

        counts
            .into_iter()
            .map(|(el, count)| {
                if count == 1 {
                    el.to_string()
                } else {
                    format!("{}{}", el, count)
                }
            })
            .collect::<Vec<_>>()
            .join("")
    }
}

pub(crate) fn dot(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

pub(crate) fn cross(a: &[f64; 3], b: &[f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

pub(crate) fn norm(a: &[f64; 3]) -> f64 {
    dot(a, a).sqrt()
}
