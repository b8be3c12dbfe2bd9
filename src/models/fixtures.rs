//! 测试用的小型数据集

use crate::models::{
    AtomicStructure, BasisDescriptor, Block, BlockKey, CanonicalDataset, Lattice, MatrixChannel,
    MatrixKind, Metadata, SparseBlockMatrix,
};

use nalgebra::DMatrix;
use num_complex::Complex64;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::sync::Arc;

fn identity_overlap(dims: &[usize]) -> SparseBlockMatrix {
    let mut s = SparseBlockMatrix::new(MatrixKind::Real);
    for (i, &n) in dims.iter().enumerate() {
        s.insert(BlockKey::new(i, i, [0, 0, 0]), DMatrix::identity(n, n));
    }
    s
}

fn assemble(
    structure: AtomicStructure,
    basis: BasisDescriptor,
    h: SparseBlockMatrix,
    metadata: Metadata,
) -> CanonicalDataset {
    let dims: Vec<usize> = structure
        .species
        .iter()
        .map(|sp| basis.orbital_count(sp).unwrap())
        .collect();
    let mut matrices = BTreeMap::new();
    matrices.insert(MatrixChannel::Hamiltonian, h);
    matrices.insert(MatrixChannel::Overlap, identity_overlap(&dims));
    CanonicalDataset::new(Arc::new(structure), Arc::new(basis), matrices, metadata).unwrap()
}

/// 两个单轨道原子，只有零平移：H(0,0)=1, H(0,1)=h01, H(1,0)=h10
pub fn two_site_chain(h01: f64, h10: f64) -> CanonicalDataset {
    let structure = AtomicStructure::new(
        Lattice::from_vectors([[10.0, 0.0, 0.0], [0.0, 10.0, 0.0], [0.0, 0.0, 10.0]]),
        vec!["H".into(), "H".into()],
        vec![[0.0, 0.0, 0.0], [0.2, 0.0, 0.0]],
    );
    let basis = BasisDescriptor::new().with_species("H", vec![0]);

    let mut h = SparseBlockMatrix::new(MatrixKind::Real);
    h.insert_real(BlockKey::new(0, 0, [0, 0, 0]), 1, 1, &[1.0]);
    h.insert_real(BlockKey::new(0, 1, [0, 0, 0]), 1, 1, &[h01]);
    h.insert_real(BlockKey::new(1, 0, [0, 0, 0]), 1, 1, &[h10]);

    let metadata = Metadata {
        cutoff_radius: Some(3.0),
        provenance: "fixture:two_site_chain".into(),
        ..Metadata::default()
    };
    assemble(structure, basis, h, metadata)
}

/// n 个单轨道原子组成的周期环，最近邻跃迁 t·e^{iφ}（厄米）
pub fn complex_ring(n: usize, t: f64, phi: f64) -> CanonicalDataset {
    let structure = AtomicStructure::new(
        Lattice::from_vectors([[n as f64 * 2.0, 0.0, 0.0], [0.0, 8.0, 0.0], [0.0, 0.0, 8.0]]),
        vec!["C".into(); n],
        (0..n).map(|i| [i as f64 / n as f64, 0.0, 0.0]).collect(),
    )
    .with_periodicity([true, false, false]);
    let basis = BasisDescriptor::new().with_species("C", vec![0]);

    let hop = Complex64::from_polar(t, phi);
    let mut h = SparseBlockMatrix::new(MatrixKind::Complex);
    for i in 0..n {
        let onsite = DMatrix::from_element(1, 1, Complex64::new(0.1 * i as f64, 0.0));
        h.insert(BlockKey::new(i, i, [0, 0, 0]), onsite);

        let (j, r) = if i + 1 == n { (0, [1, 0, 0]) } else { (i + 1, [0, 0, 0]) };
        let key = BlockKey::new(i, j, r);
        h.insert(key, DMatrix::from_element(1, 1, hop));
        h.insert(key.partner(), DMatrix::from_element(1, 1, hop.conj()));
    }

    let metadata = Metadata {
        cutoff_radius: Some(2.5),
        provenance: "fixture:complex_ring".into(),
        ..Metadata::default()
    };
    assemble(structure, basis, h, metadata)
}

/// 随机厄米周期链：每个晶胞 `atoms` 个原子（s+p 基组），最近晶胞耦合
pub fn random_chain(atoms: usize, seed: u64) -> CanonicalDataset {
    let mut rng = StdRng::seed_from_u64(seed);
    let structure = AtomicStructure::new(
        Lattice::from_vectors([[3.0 * atoms as f64, 0.0, 0.0], [0.0, 12.0, 0.0], [0.0, 0.0, 12.0]]),
        vec!["Si".into(); atoms],
        (0..atoms)
            .map(|i| [(i as f64 + 0.5) / atoms as f64, 0.5, 0.5])
            .collect(),
    );
    let basis = BasisDescriptor::new().with_species("Si", vec![0, 1]);
    let n = 4;

    let random_block = |rng: &mut StdRng| -> Block {
        DMatrix::from_fn(n, n, |_, _| {
            Complex64::new(rng.gen_range(-1.0..1.0), rng.gen_range(-0.5..0.5))
        })
    };

    let mut h = SparseBlockMatrix::new(MatrixKind::Complex);
    for i in 0..atoms {
        for j in 0..atoms {
            for r in [[0, 0, 0], [1, 0, 0]] {
                let key = BlockKey::new(i, j, r);
                if h.contains(&key) || (r == [0, 0, 0] && j < i) {
                    continue;
                }
                let mut block = random_block(&mut rng);
                if key == key.partner() {
                    block = (&block + block.adjoint()).map(|z| z * 0.5);
                }
                h.insert(key.partner(), block.adjoint());
                h.insert(key, block);
            }
        }
    }

    let metadata = Metadata {
        provenance: format!("fixture:random_chain:{}", seed),
        ..Metadata::default()
    };
    assemble(structure, basis, h, metadata)
}

/// `random_chain` 加上非正交重叠：相邻原子同名轨道重叠 `s`
pub fn nonorthogonal_chain(atoms: usize, seed: u64, s: f64) -> CanonicalDataset {
    let chain = random_chain(atoms, seed);
    let mut overlap = identity_overlap(&chain.orbital_dims());
    for i in 0..atoms {
        let (j, r) = if i + 1 < atoms { (i + 1, [0, 0, 0]) } else { (0, [1, 0, 0]) };
        let key = BlockKey::new(i, j, r);
        let block: Block = DMatrix::<Complex64>::identity(4, 4) * Complex64::new(s, 0.0);
        overlap.insert(key.partner(), block.adjoint());
        overlap.insert(key, block);
    }

    let mut matrices = chain.matrices().clone();
    matrices.insert(MatrixChannel::Overlap, overlap);
    let metadata = Metadata {
        provenance: format!("fixture:nonorthogonal_chain:{}", seed),
        ..chain.metadata().clone()
    };
    chain.derive(matrices, metadata).unwrap()
}

/// `n` 个单轨道原子组成的孤立环，在位能为零，近邻跃迁 `t`
pub fn uniform_ring(n: usize, t: f64) -> CanonicalDataset {
    let structure = AtomicStructure::new(
        Lattice::from_vectors([[30.0, 0.0, 0.0], [0.0, 30.0, 0.0], [0.0, 0.0, 30.0]]),
        vec!["H".into(); n],
        (0..n)
            .map(|i| {
                let phi = 2.0 * std::f64::consts::PI * i as f64 / n as f64;
                [0.5 + 0.1 * phi.cos(), 0.5 + 0.1 * phi.sin(), 0.5]
            })
            .collect(),
    )
    .with_periodicity([false; 3]);
    let basis = BasisDescriptor::new().with_species("H", vec![0]);

    let mut h = SparseBlockMatrix::new(MatrixKind::Real);
    for i in 0..n {
        h.insert_real(BlockKey::new(i, i, [0, 0, 0]), 1, 1, &[0.0]);
        let j = (i + 1) % n;
        h.insert_real(BlockKey::new(i, j, [0, 0, 0]), 1, 1, &[t]);
        h.insert_real(BlockKey::new(j, i, [0, 0, 0]), 1, 1, &[t]);
    }

    let metadata = Metadata {
        provenance: "fixture:uniform_ring".into(),
        ..Metadata::default()
    };
    assemble(structure, basis, h, metadata)
}
