//! cargo mpirun --np 4 --test s4_three_dim_transpose
use mpi::topology::Communicator;

use mpi_pencil::{transpose, MpiTopology, Pencil, PencilArray, Permutation, StorageKind, TransposeConfig};

fn fill<'p, 't>(pencil: &'p Pencil<'t>) -> PencilArray<'p, 't, f64> {
    let mut arr = PencilArray::allocate(pencil, []);
    let i_range = pencil.local_range_logical(0);
    let j_range = pencil.local_range_logical(1);
    let k_range = pencil.local_range_logical(2);
    for (li, i) in i_range.enumerate() {
        for (lj, j) in j_range.clone().enumerate() {
            for (lk, k) in k_range.clone().enumerate() {
                *arr.get_mut(&[li, lj, lk]) = (i * 10_000 + j * 100 + k) as f64;
            }
        }
    }
    arr
}

fn assert_matches_formula(arr: &PencilArray<'_, '_, f64>) {
    let pencil = arr.pencil();
    let i_range = pencil.local_range_logical(0);
    let j_range = pencil.local_range_logical(1);
    let k_range = pencil.local_range_logical(2);
    for (li, i) in i_range.enumerate() {
        for (lj, j) in j_range.clone().enumerate() {
            for (lk, k) in k_range.clone().enumerate() {
                assert_eq!(*arr.get(&[li, lj, lk]), (i * 10_000 + j * 100 + k) as f64);
            }
        }
    }
}

#[test]
fn transpose_over_a_2x2_grid_preserves_global_values_for_a_3d_array() {
    let universe = mpi::initialize().unwrap();
    let world = universe.world();
    assert!(world.size() == 4, "run under mpirun with 4 processes");

    let topology = MpiTopology::new(&universe, &[2, 2], &[false, false]).unwrap();

    // src: grid axis 0 decomposes global axis 1, grid axis 1 decomposes
    // global axis 2 -- global axis 0 stays whole on every rank.
    let src = Pencil::new(
        StorageKind::HostDense,
        [20, 10, 12],
        [1, 2],
        &topology,
        Permutation::identity(3),
    )
    .unwrap();

    // dst: only grid axis 0's assignment changes (axis 1 -> axis 0); grid
    // axis 1 keeps decomposing axis 2. A single differing grid axis, so
    // this is a direct (non-round-trip) transpose.
    let dst = Pencil::new(
        StorageKind::HostDense,
        [20, 10, 12],
        [0, 2],
        &topology,
        Permutation::explicit(vec![1usize, 2, 0]).unwrap(),
    )
    .unwrap();

    let source_array = fill(&src);
    let mut dest_array = PencilArray::allocate(&dst, []);

    transpose(&source_array, &mut dest_array, &TransposeConfig::default()).unwrap();

    assert_matches_formula(&dest_array);
}
