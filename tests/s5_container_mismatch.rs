//! cargo mpirun --np 1 --test s5_container_mismatch
use mpi_pencil::{Error, MpiTopology, Pencil, PencilArray, Permutation, StorageKind};
use ndarray::{ArrayD, IxDyn};

#[test]
fn wrap_with_mismatched_storage_kind_is_rejected() {
    let universe = mpi::initialize().unwrap();

    let topology = MpiTopology::new(&universe, &[1], &[false]).unwrap();
    let pencil = Pencil::new(StorageKind::HostDense, [4, 4], [0], &topology, Permutation::identity(2)).unwrap();

    let data = ArrayD::<f64>::zeros(IxDyn(&pencil.local_size_memory()));
    let err = PencilArray::wrap(&pencil, StorageKind::DeviceDense, data, []).unwrap_err();

    assert!(matches!(
        err,
        Error::ContainerMismatch {
            expected: StorageKind::HostDense,
            got: StorageKind::DeviceDense,
        }
    ));
}
