//! cargo mpirun --np 2 --test s2_roundtrip
use mpi::topology::Communicator;

use mpi_pencil::{transpose, MpiTopology, Pencil, PencilArray, Permutation, StorageKind, TransposeConfig};

fn fill<'p, 't>(pencil: &'p Pencil<'t>) -> PencilArray<'p, 't, f64> {
    let mut arr = PencilArray::allocate(pencil, []);
    let i_range = pencil.local_range_logical(0);
    let j_range = pencil.local_range_logical(1);
    for (li, i) in i_range.enumerate() {
        for (lj, j) in j_range.clone().enumerate() {
            *arr.get_mut(&[li, lj]) = (i * 100 + j) as f64;
        }
    }
    arr
}

fn assert_matches_formula(arr: &PencilArray<'_, '_, f64>) {
    let pencil = arr.pencil();
    let i_range = pencil.local_range_logical(0);
    let j_range = pencil.local_range_logical(1);
    for (li, i) in i_range.enumerate() {
        for (lj, j) in j_range.clone().enumerate() {
            assert_eq!(*arr.get(&[li, lj]), (i * 100 + j) as f64);
        }
    }
}

#[test]
fn transpose_forward_then_back_recovers_the_original_block() {
    let universe = mpi::initialize().unwrap();
    let world = universe.world();
    assert!(world.size() == 2, "run under mpirun with 2 processes");

    let topology = MpiTopology::new(&universe, &[2], &[false]).unwrap();

    let x_pencil = Pencil::new(StorageKind::HostDense, [20, 16], [0], &topology, Permutation::identity(2)).unwrap();
    let y_pencil = Pencil::new(
        StorageKind::HostDense,
        [20, 16],
        [1],
        &topology,
        Permutation::explicit(vec![1, 0]).unwrap(),
    )
    .unwrap();

    let original = fill(&x_pencil);

    let mut intermediate = PencilArray::allocate(&y_pencil, []);
    transpose(&original, &mut intermediate, &TransposeConfig::default()).unwrap();
    assert_matches_formula(&intermediate);

    let mut back = PencilArray::allocate(&x_pencil, []);
    transpose(&intermediate, &mut back, &TransposeConfig::default()).unwrap();
    assert_matches_formula(&back);
}
