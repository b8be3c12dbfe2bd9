//! # VASP POSCAR 格式解析器
//!
//! 解析 POSCAR/CONTCAR 文件为 `AtomicStructure`，原子按文件顺序排列。
//!
//! ## POSCAR 格式说明
//! ```text
//! Comment line (structure name)
//! 1.0                    # scaling factor
//! a1 a2 a3               # lattice vector a
//! b1 b2 b3               # lattice vector b
//! c1 c2 c3               # lattice vector c
//! Element1 Element2 ...  # element symbols (VASP 5+)
//! n1 n2 ...              # number of atoms per element
//! Selective dynamics     # optional
//! Direct/Cartesian       # coordinate type
//! x1 y1 z1               # atom positions
//! ...
//! ```
//!
//! ## 依赖关系
//! - 被 `parsers/wannier90.rs` 使用
//! - 使用 `models/structure.rs`

use crate::error::{DockError, Result};
use crate::models::{AtomicStructure, Lattice};
use std::fs;
use std::path::Path;

/// 解析 POSCAR/CONTCAR 文件
pub fn parse_poscar_file(path: &Path) -> Result<AtomicStructure> {
    let content = fs::read_to_string(path).map_err(|e| DockError::FileReadError {
        path: path.display().to_string(),
        source: e,
    })?;

    parse_poscar_content(&content, &path.display().to_string())
}

/// 从字符串内容解析 POSCAR 格式，`file` 用于错误信息
pub fn parse_poscar_content(content: &str, file: &str) -> Result<AtomicStructure> {
    let lines: Vec<&str> = content.lines().collect();
    let parse_error = |line: usize, reason: String| DockError::Parse {
        file: file.to_string(),
        line,
        reason,
    };

    if lines.len() < 8 {
        return Err(parse_error(lines.len(), "File too short".to_string()));
    }

    // Line 1: Scaling factor
    let scale: f64 = lines[1]
        .split_whitespace()
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| parse_error(2, format!("Invalid scaling factor '{}'", lines[1].trim())))?;
    if scale <= 0.0 {
        return Err(parse_error(
            2,
            "Negative (volume) scaling factors are not supported".to_string(),
        ));
    }

    // Lines 2-4: Lattice vectors
    let mut matrix = [[0.0; 3]; 3];
    for (i, row) in matrix.iter_mut().enumerate() {
        let parts: Vec<f64> = lines[2 + i]
            .split_whitespace()
            .filter_map(|s| s.parse().ok())
            .collect();
        if parts.len() < 3 {
            return Err(parse_error(3 + i, "Invalid lattice vector".to_string()));
        }
        *row = [parts[0] * scale, parts[1] * scale, parts[2] * scale];
    }
    let lattice = Lattice::from_vectors(matrix);

    // Line 5: Element symbols (VASP 5+); VASP 4 files carry no species labels
    let line5_parts: Vec<&str> = lines[5].split_whitespace().collect();
    if line5_parts.first().map_or(true, |s| s.parse::<i64>().is_ok()) {
        return Err(parse_error(
            6,
            "Element symbol line required (VASP 5 format)".to_string(),
        ));
    }
    let elements: Vec<String> = line5_parts.iter().map(|s| s.to_string()).collect();
    let counts: Vec<usize> = lines[6]
        .split_whitespace()
        .map(|s| s.parse())
        .collect::<std::result::Result<_, _>>()
        .map_err(|_| parse_error(7, format!("Invalid atom counts '{}'", lines[6].trim())))?;
    if counts.len() != elements.len() {
        return Err(parse_error(
            7,
            format!(
                "{} element symbols but {} atom counts",
                elements.len(),
                counts.len()
            ),
        ));
    }

    // Check for "Selective dynamics" line
    let mut coord_line = 7;
    if lines[coord_line]
        .trim()
        .to_lowercase()
        .starts_with('s')
    {
        coord_line += 1;
    }

    // Coordinate type line
    if lines.len() <= coord_line {
        return Err(parse_error(
            coord_line + 1,
            "Missing coordinate type line".to_string(),
        ));
    }

    let coord_type = lines[coord_line].trim().to_lowercase();
    let is_cartesian = coord_type.starts_with('c') || coord_type.starts_with('k');
    let inverse = lattice
        .inverse()
        .ok_or_else(|| parse_error(3, "Singular lattice".to_string()))?;

    // Parse atom positions
    let mut species = Vec::new();
    let mut positions = Vec::new();
    let mut line_idx = coord_line + 1;

    for (elem, &count) in elements.iter().zip(counts.iter()) {
        for _ in 0..count {
            let parts: Vec<f64> = lines
                .get(line_idx)
                .map(|l| {
                    l.split_whitespace()
                        .take(3)
                        .filter_map(|s| s.parse().ok())
                        .collect()
                })
                .unwrap_or_default();
            if parts.len() < 3 {
                return Err(parse_error(line_idx + 1, "Invalid atom position".to_string()));
            }

            let position = if is_cartesian {
                cart_to_frac(
                    [parts[0] * scale, parts[1] * scale, parts[2] * scale],
                    &inverse,
                )
            } else {
                [parts[0], parts[1], parts[2]]
            };
            species.push(elem.clone());
            positions.push(position);
            line_idx += 1;
        }
    }

    Ok(AtomicStructure::new(lattice, species, positions))
}

/// 笛卡尔坐标转分数坐标（`inverse` 为晶格矩阵的逆）
fn cart_to_frac(cart: [f64; 3], inverse: &[[f64; 3]; 3]) -> [f64; 3] {
    let mut frac = [0.0; 3];
    for (k, value) in frac.iter_mut().enumerate() {
        *value = (0..3).map(|x| cart[x] * inverse[x][k]).sum();
    }
    frac
}

/// 将结构转换为 POSCAR 格式字符串（相邻同种原子合并为一组）
pub fn to_poscar_string(structure: &AtomicStructure, comment: &str) -> String {
    // 按出现顺序分组，保持原子顺序不变
    let mut groups: Vec<(&str, usize)> = Vec::new();
    for sp in &structure.species {
        match groups.last_mut() {
            Some((last, count)) if *last == sp.as_str() => *count += 1,
            _ => groups.push((sp.as_str(), 1)),
        }
    }

    let mut result = String::new();

    result.push_str(&format!("{}\n", comment));
    result.push_str("1.0\n");

    for row in &structure.lattice.matrix {
        result.push_str(&format!(
            "  {:20.14}  {:20.14}  {:20.14}\n",
            row[0], row[1], row[2]
        ));
    }

    let names: Vec<&str> = groups.iter().map(|(name, _)| *name).collect();
    result.push_str(&format!("   {}\n", names.join("   ")));
    let counts: Vec<String> = groups.iter().map(|(_, n)| n.to_string()).collect();
    result.push_str(&format!("   {}\n", counts.join("   ")));

    result.push_str("Direct\n");
    for pos in &structure.positions {
        result.push_str(&format!(
            "  {:20.14}  {:20.14}  {:20.14}\n",
            pos[0], pos[1], pos[2]
        ));
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_poscar_vasp5() {
        let content = r#"NaCl
1.0
5.64 0.0 0.0
0.0 5.64 0.0
0.0 0.0 5.64
Na Cl
4 4
Direct
0.0 0.0 0.0
0.5 0.5 0.0
0.5 0.0 0.5
0.0 0.5 0.5
0.5 0.0 0.0
0.0 0.5 0.0
0.0 0.0 0.5
0.5 0.5 0.5
"#;
        let structure = parse_poscar_content(content, "POSCAR").unwrap();
        assert_eq!(structure.atom_count(), 8);
        assert_eq!(structure.species[0], "Na");
        assert_eq!(structure.species[7], "Cl");
        assert_eq!(structure.formula(), "Cl4Na4");
    }

    #[test]
    fn test_parse_poscar_with_scale() {
        let content = r#"Si
2.0
2.0 0.0 0.0
0.0 2.0 0.0
0.0 0.0 2.0
Si
2
Direct
0.0 0.0 0.0
0.5 0.5 0.5
"#;
        let structure = parse_poscar_content(content, "POSCAR").unwrap();
        let (a, _, _, _, _, _) = structure.lattice.parameters();

        // 2.0 * 2.0 = 4.0
        assert!((a - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_parse_poscar_cartesian() {
        let content = r#"Fe
1.0
2.0 0.0 0.0
0.0 4.0 0.0
0.0 0.0 5.0
Fe
1
Cartesian
1.0 1.0 1.0
"#;
        let structure = parse_poscar_content(content, "POSCAR").unwrap();
        let p = structure.positions[0];
        assert!((p[0] - 0.5).abs() < 1e-12);
        assert!((p[1] - 0.25).abs() < 1e-12);
        assert!((p[2] - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_poscar_round_trip() {
        let lattice = Lattice::from_vectors([[4.0, 0.0, 0.0], [0.0, 4.0, 0.0], [0.0, 0.0, 4.0]]);
        let structure = AtomicStructure::new(
            lattice,
            vec!["O".into(), "Ti".into(), "O".into()],
            vec![[0.5, 0.5, 0.0], [0.0, 0.0, 0.0], [0.5, 0.0, 0.5]],
        );

        let text = to_poscar_string(&structure, "TiO2");
        let parsed = parse_poscar_content(&text, "round_trip").unwrap();

        // 非相邻的同种原子分为不同组，原子顺序保持
        assert_eq!(parsed.species, structure.species);
        assert_eq!(parsed.positions, structure.positions);
    }

    #[test]
    fn test_parse_poscar_selective_dynamics() {
        let content = r#"Fe with selective
1.0
2.87 0.0 0.0
0.0 2.87 0.0
0.0 0.0 2.87
Fe
2
Selective dynamics
Direct
0.0 0.0 0.0 T T T
0.5 0.5 0.5 F F F
"#;
        let structure = parse_poscar_content(content, "POSCAR").unwrap();
        assert_eq!(structure.atom_count(), 2);
    }

    #[test]
    fn test_truncated_positions() {
        let content = r#"Si
1.0
5.0 0.0 0.0
0.0 5.0 0.0
0.0 0.0 5.0
Si
3
Direct
0.0 0.0 0.0
0.25 0.25 0.25
"#;
        match parse_poscar_content(content, "POSCAR") {
            Err(DockError::Parse { file, line, .. }) => {
                assert_eq!(file, "POSCAR");
                assert_eq!(line, 11);
            }
            other => panic!("expected parse error, got {:?}", other),
        }
    }
}
