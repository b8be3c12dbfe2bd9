//! # 对称操作与轨道旋转矩阵
//!
//! 对称操作以分数坐标给出：x' = W x + w，W 为整数矩阵。
//! 笛卡尔旋转 Rc = Lᵀ W L⁻ᵀ（L 的行为晶格矢量）。
//!
//! 实球谐轨道顺序 m = -l..l：
//! - l = 0: s
//! - l = 1: y, z, x
//! - l = 2: xy, yz, z², xz, x²−y²
//!
//! l = 1 的旋转矩阵即 Rc 在 (y, z, x) 基下的分量；l = 2 由
//! Frobenius 正交的对称无迹矩阵 Q_m 给出 D_nm = ⟨Q_n, Rc Q_m Rcᵀ⟩。
//! 非正常操作（含反演）自然得到 p 轨道变号、d 轨道不变。
//!
//! ## 依赖关系
//! - 被 `symmetrize/mod.rs` 使用
//! - 使用 `nalgebra`

use crate::error::{DockError, Result};
use crate::models::{AtomicStructure, Lattice};

use nalgebra::{DMatrix, Matrix3};
use serde::{Deserialize, Serialize};

/// (y, z, x) 在笛卡尔分量中的序号
const P_ORDER: [usize; 3] = [1, 2, 0];

/// 空间群操作（分数坐标）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymmetryOperation {
    pub rotation: [[i32; 3]; 3],
    pub translation: [f64; 3],
}

impl SymmetryOperation {
    pub fn new(rotation: [[i32; 3]; 3], translation: [f64; 3]) -> Self {
        SymmetryOperation {
            rotation,
            translation,
        }
    }

    pub fn identity() -> Self {
        Self::new([[1, 0, 0], [0, 1, 0], [0, 0, 1]], [0.0; 3])
    }

    /// 旋转部分为单位矩阵且平移为晶格矢量
    pub fn is_identity(&self) -> bool {
        self.rotation == Self::identity().rotation
            && self
                .translation
                .iter()
                .all(|t| (t - t.round()).abs() < 1e-8)
    }

    /// 作用于分数坐标
    pub fn apply(&self, frac: &[f64; 3]) -> [f64; 3] {
        let w = &self.rotation;
        let mut out = self.translation;
        for (a, value) in out.iter_mut().enumerate() {
            *value += (0..3).map(|b| w[a][b] as f64 * frac[b]).sum::<f64>();
        }
        out
    }

    /// 旋转整数平移向量
    pub fn rotate(&self, r: &[i32; 3]) -> [i32; 3] {
        let w = &self.rotation;
        let mut out = [0; 3];
        for (a, value) in out.iter_mut().enumerate() {
            *value = (0..3).map(|b| w[a][b] * r[b]).sum();
        }
        out
    }

    /// 笛卡尔旋转矩阵；非晶格等距变换时报 SchemaError
    pub fn cartesian_rotation(&self, lattice: &Lattice) -> Result<Matrix3<f64>> {
        let [a, b, c] = lattice.matrix;
        let l = Matrix3::new(
            a[0], a[1], a[2], //
            b[0], b[1], b[2], //
            c[0], c[1], c[2],
        );
        let l_inv = l.try_inverse().ok_or_else(|| DockError::Schema {
            reason: "lattice is singular".to_string(),
        })?;
        let w = Matrix3::from_fn(|i, j| self.rotation[i][j] as f64);

        let rc = l.transpose() * w * l_inv.transpose();
        let defect = (rc * rc.transpose() - Matrix3::identity()).norm();
        if defect > 1e-6 {
            return Err(DockError::Schema {
                reason: format!(
                    "operation {:?} is not an isometry of the lattice (defect {:.2e})",
                    self.rotation, defect
                ),
            });
        }
        Ok(rc)
    }
}

/// 单个壳层的轨道旋转矩阵
pub fn orbital_rotation(l: u8, rc: &Matrix3<f64>) -> Result<DMatrix<f64>> {
    match l {
        0 => Ok(DMatrix::identity(1, 1)),
        1 => Ok(DMatrix::from_fn(3, 3, |n, m| rc[(P_ORDER[n], P_ORDER[m])])),
        2 => {
            let q = d_basis();
            let rotated: Vec<Matrix3<f64>> = q.iter().map(|qm| rc * qm * rc.transpose()).collect();
            Ok(DMatrix::from_fn(5, 5, |n, m| q[n].dot(&rotated[m])))
        }
        _ => Err(DockError::Schema {
            reason: format!("orbital rotation for l = {} is not supported (l ≤ 2)", l),
        }),
    }
}

/// 一个原子所有壳层的块对角旋转矩阵
pub fn atom_rotation(shells: &[u8], rc: &Matrix3<f64>) -> Result<DMatrix<f64>> {
    let dim: usize = shells.iter().map(|&l| 2 * l as usize + 1).sum();
    let mut d = DMatrix::zeros(dim, dim);
    let mut offset = 0;
    for &l in shells {
        let block = orbital_rotation(l, rc)?;
        let n = block.nrows();
        d.view_mut((offset, offset), (n, n)).copy_from(&block);
        offset += n;
    }
    Ok(d)
}

/// d 轨道对应的对称无迹矩阵 (xy, yz, z², xz, x²−y²)
fn d_basis() -> [Matrix3<f64>; 5] {
    let s2 = std::f64::consts::FRAC_1_SQRT_2;
    let s6 = 1.0 / 6.0f64.sqrt();
    let sym = |i: usize, j: usize| {
        let mut m = Matrix3::zeros();
        m[(i, j)] = s2;
        m[(j, i)] = s2;
        m
    };
    [
        sym(0, 1),
        sym(1, 2),
        Matrix3::new(-s6, 0.0, 0.0, 0.0, -s6, 0.0, 0.0, 0.0, 2.0 * s6),
        sym(0, 2),
        Matrix3::new(s2, 0.0, 0.0, 0.0, -s2, 0.0, 0.0, 0.0, 0.0),
    ]
}

/// 原子 i 在操作下的像：W x_i + w = x_target + shift
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtomImage {
    pub target: usize,
    pub shift: [i32; 3],
}

/// 为每个原子寻找其像原子（同元素、模晶格矢量、笛卡尔距离容差内）
pub fn map_atoms(
    structure: &AtomicStructure,
    op: &SymmetryOperation,
    tolerance: f64,
) -> Result<Vec<AtomImage>> {
    let mut images = Vec::with_capacity(structure.atom_count());

    for (i, pos) in structure.positions.iter().enumerate() {
        let moved = op.apply(pos);
        let found = structure
            .positions
            .iter()
            .enumerate()
            .filter(|(j, _)| structure.species[*j] == structure.species[i])
            .find_map(|(j, target)| {
                let diff = [
                    moved[0] - target[0],
                    moved[1] - target[1],
                    moved[2] - target[2],
                ];
                let shift = diff.map(|d| d.round());
                let residual = [diff[0] - shift[0], diff[1] - shift[1], diff[2] - shift[2]];
                let cart = structure.lattice.to_cartesian(&residual);
                let distance = (cart[0] * cart[0] + cart[1] * cart[1] + cart[2] * cart[2]).sqrt();
                (distance < tolerance).then(|| AtomImage {
                    target: j,
                    shift: shift.map(|s| s as i32),
                })
            });

        match found {
            Some(image) => images.push(image),
            None => {
                return Err(DockError::Schema {
                    reason: format!(
                        "atom {} ({}) has no image under operation {:?} + {:?}",
                        i, structure.species[i], op.rotation, op.translation
                    ),
                })
            }
        }
    }

    Ok(images)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c4z() -> SymmetryOperation {
        SymmetryOperation::new([[0, -1, 0], [1, 0, 0], [0, 0, 1]], [0.0; 3])
    }

    fn cubic() -> Lattice {
        Lattice::from_vectors([[4.0, 0.0, 0.0], [0.0, 4.0, 0.0], [0.0, 0.0, 4.0]])
    }

    fn hexagonal() -> Lattice {
        Lattice::from_parameters(3.0, 3.0, 5.0, 90.0, 90.0, 120.0)
    }

    #[test]
    fn test_rotations_are_orthogonal() {
        let ops = [
            (c4z(), cubic()),
            (SymmetryOperation::new([[-1, 0, 0], [0, -1, 0], [0, 0, -1]], [0.0; 3]), cubic()),
            (SymmetryOperation::new([[0, 0, 1], [1, 0, 0], [0, 1, 0]], [0.0; 3]), cubic()),
            // 六方 C6：a → a+b, b → -a
            (SymmetryOperation::new([[1, -1, 0], [1, 0, 0], [0, 0, 1]], [0.0; 3]), hexagonal()),
        ];
        for (op, lattice) in &ops {
            let rc = op.cartesian_rotation(lattice).unwrap();
            for l in 0..=2u8 {
                let d = orbital_rotation(l, &rc).unwrap();
                let n = d.nrows();
                assert!((&d * d.transpose() - DMatrix::<f64>::identity(n, n)).norm() < 1e-10);
            }
        }
    }

    #[test]
    fn test_d_rotation_is_a_representation() {
        let lattice = cubic();
        let a = c4z();
        let b = SymmetryOperation::new([[0, 0, 1], [1, 0, 0], [0, 1, 0]], [0.0; 3]);
        let ra = a.cartesian_rotation(&lattice).unwrap();
        let rb = b.cartesian_rotation(&lattice).unwrap();

        for l in 1..=2u8 {
            let product = orbital_rotation(l, &(ra * rb)).unwrap();
            let composed = orbital_rotation(l, &ra).unwrap() * orbital_rotation(l, &rb).unwrap();
            assert!((product - composed).norm() < 1e-10);
        }
    }

    #[test]
    fn test_c4_on_p_and_d() {
        let rc = c4z().cartesian_rotation(&cubic()).unwrap();
        // x → y, y → -x：p 顺序 (y, z, x)
        let p = orbital_rotation(1, &rc).unwrap();
        assert!((p[(0, 2)] - 1.0).abs() < 1e-12);
        assert!((p[(2, 0)] + 1.0).abs() < 1e-12);
        assert!((p[(1, 1)] - 1.0).abs() < 1e-12);

        // xy 与 x²−y² 变号，z² 不变
        let d = orbital_rotation(2, &rc).unwrap();
        assert!((d[(0, 0)] + 1.0).abs() < 1e-12);
        assert!((d[(2, 2)] - 1.0).abs() < 1e-12);
        assert!((d[(4, 4)] + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_inversion_parity() {
        let inv = SymmetryOperation::new([[-1, 0, 0], [0, -1, 0], [0, 0, -1]], [0.0; 3]);
        let rc = inv.cartesian_rotation(&cubic()).unwrap();
        let d = atom_rotation(&[0, 1, 2], &rc).unwrap();
        let parity = [1.0, -1.0, -1.0, -1.0, 1.0, 1.0, 1.0, 1.0, 1.0];
        assert!((d - DMatrix::from_diagonal(&nalgebra::DVector::from_row_slice(&parity))).norm() < 1e-12);
    }

    #[test]
    fn test_f_shell_is_rejected() {
        let rc = Matrix3::identity();
        assert!(matches!(orbital_rotation(3, &rc), Err(DockError::Schema { .. })));
    }

    #[test]
    fn test_non_isometry_is_rejected() {
        let shear = SymmetryOperation::new([[1, 1, 0], [0, 1, 0], [0, 0, 1]], [0.0; 3]);
        assert!(shear.cartesian_rotation(&cubic()).is_err());
    }

    #[test]
    fn test_map_atoms_modulo_lattice() {
        let structure = AtomicStructure::new(
            cubic(),
            vec!["Na".into(), "Cl".into()],
            vec![[0.0, 0.0, 0.0], [0.5, 0.5, 0.5]],
        );
        let inv = SymmetryOperation::new([[-1, 0, 0], [0, -1, 0], [0, 0, -1]], [0.0; 3]);
        let images = map_atoms(&structure, &inv, 1e-3).unwrap();
        assert_eq!(images[0], AtomImage { target: 0, shift: [0, 0, 0] });
        assert_eq!(images[1], AtomImage { target: 1, shift: [-1, -1, -1] });

        let shifted = SymmetryOperation::new(SymmetryOperation::identity().rotation, [0.25, 0.0, 0.0]);
        assert!(map_atoms(&structure, &shifted, 1e-3).is_err());
    }
}
