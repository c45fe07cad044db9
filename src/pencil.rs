//! Pencil decomposition descriptor
use std::ops::Range;

use crate::distribution::AxisPartition;
use crate::error::{Error, Result};
use crate::permutation::Permutation;
use crate::storage::{Scratch, StorageKind};
use crate::topology::MpiTopology;

/// Describes how an N-dimensional global shape is split across an
/// M-dimensional process grid, plus the in-memory axis order used to store
/// the local block.
///
/// `decomp_dims[i]` is the global axis split across grid axis `i`; every
/// other global axis is held in full on every rank. A `Pencil` is
/// immutable after construction and owns the scratch buffers
/// ([`Pencil::send_buf`]/[`Pencil::recv_buf`]) that a transposition reuses
/// across calls.
pub struct Pencil<'t> {
    topology: &'t MpiTopology<'t>,
    global_size: Vec<usize>,
    decomp_dims: Vec<usize>,
    permutation: Permutation,
    storage_kind: StorageKind,
    axis_partitions: Vec<AxisPartition>,
    send_buf: Scratch,
    recv_buf: Scratch,
}

impl<'t> Pencil<'t> {
    /// Construct a Pencil collectively: every rank must call this with the
    /// same `global_size`, `decomp_dims` and `permutation`.
    ///
    /// # Errors
    /// - [`Error::IncompatibleTopology`] if `decomp_dims.len() !=
    ///   topology.ndims()`.
    /// - [`Error::AxisOutOfRange`] if an entry of `decomp_dims` is not a
    ///   valid global axis.
    /// - [`Error::DuplicateDecompAxis`] if `decomp_dims` repeats an axis.
    /// - [`Error::ArityMismatch`] if `permutation`'s arity does not match
    ///   `global_size.len()`.
    pub fn new(
        storage_kind: StorageKind,
        global_size: impl Into<Vec<usize>>,
        decomp_dims: impl Into<Vec<usize>>,
        topology: &'t MpiTopology<'t>,
        permutation: Permutation,
    ) -> Result<Self> {
        let global_size = global_size.into();
        let decomp_dims = decomp_dims.into();
        let n = global_size.len();

        if decomp_dims.len() != topology.ndims() {
            return Err(Error::IncompatibleTopology {
                topology_dims: topology.ndims(),
                decomp_len: decomp_dims.len(),
            });
        }
        let mut seen = vec![false; n];
        for &axis in &decomp_dims {
            if axis >= n {
                return Err(Error::AxisOutOfRange { axis, n });
            }
            if std::mem::replace(&mut seen[axis], true) {
                return Err(Error::DuplicateDecompAxis {
                    axis,
                    decomp_dims: decomp_dims.clone(),
                });
            }
        }
        if permutation.len() != n {
            return Err(Error::ArityMismatch {
                expected: n,
                got: permutation.len(),
            });
        }

        let axis_partitions = Self::build_partitions(&global_size, &decomp_dims, topology);

        Ok(Self {
            topology,
            global_size,
            decomp_dims,
            permutation,
            storage_kind,
            axis_partitions,
            send_buf: Scratch::new(),
            recv_buf: Scratch::new(),
        })
    }

    /// Construct a new Pencil sharing this one's topology and global
    /// shape, with `decomp_dims` and/or `permutation` and/or
    /// `storage_kind` overridden.
    ///
    /// # Errors
    /// Same as [`Pencil::new`].
    pub fn with_overrides(
        &self,
        decomp_dims: Option<Vec<usize>>,
        permutation: Option<Permutation>,
        storage_kind: Option<StorageKind>,
    ) -> Result<Self> {
        Self::new(
            storage_kind.unwrap_or(self.storage_kind),
            self.global_size.clone(),
            decomp_dims.unwrap_or_else(|| self.decomp_dims.clone()),
            self.topology,
            permutation.unwrap_or_else(|| self.permutation.clone()),
        )
    }

    fn build_partitions(
        global_size: &[usize],
        decomp_dims: &[usize],
        topology: &MpiTopology<'_>,
    ) -> Vec<AxisPartition> {
        let grid_dims: Vec<usize> = topology.dims().iter().map(|&d| d as usize).collect();
        let coords: Vec<usize> = topology.coords().iter().map(|&c| c as usize).collect();
        Self::build_partitions_from(global_size, decomp_dims, &grid_dims, &coords)
    }

    /// Pure partition-building logic, factored out of [`Pencil::build_partitions`]
    /// so it can be unit-tested without a live MPI topology.
    fn build_partitions_from(
        global_size: &[usize],
        decomp_dims: &[usize],
        grid_dims: &[usize],
        coords: &[usize],
    ) -> Vec<AxisPartition> {
        let mut partitions: Vec<Option<AxisPartition>> = (0..global_size.len()).map(|_| None).collect();
        for (grid_axis, &global_axis) in decomp_dims.iter().enumerate() {
            let nprocs = grid_dims[grid_axis];
            let coord = coords[grid_axis];
            partitions[global_axis] = Some(AxisPartition::split(global_size[global_axis], nprocs, coord));
        }
        partitions
            .into_iter()
            .enumerate()
            .map(|(axis, p)| p.unwrap_or_else(|| AxisPartition::contiguous(global_size[axis])))
            .collect()
    }

    /// Dimensionality N of the global array.
    #[must_use]
    pub fn ndims(&self) -> usize {
        self.global_size.len()
    }

    /// The global shape.
    #[must_use]
    pub fn global_size(&self) -> &[usize] {
        &self.global_size
    }

    /// The global axes split across the process grid, `decomp_dims[i]`
    /// being split across grid axis `i`.
    #[must_use]
    pub fn decomp_dims(&self) -> &[usize] {
        &self.decomp_dims
    }

    /// Whether `axis` is one of `decomp_dims`.
    #[must_use]
    pub fn is_decomposed(&self, axis: usize) -> bool {
        self.decomp_dims.contains(&axis)
    }

    /// The grid axis that splits `axis`, if any.
    #[must_use]
    pub fn grid_axis_of(&self, axis: usize) -> Option<usize> {
        self.decomp_dims.iter().position(|&a| a == axis)
    }

    /// The in-memory axis permutation.
    #[must_use]
    pub fn permutation(&self) -> &Permutation {
        &self.permutation
    }

    /// The shared topology.
    #[must_use]
    pub fn topology(&self) -> &'t MpiTopology<'t> {
        self.topology
    }

    /// The container family this Pencil's arrays and scratch buffers use.
    #[must_use]
    pub fn storage_kind(&self) -> StorageKind {
        self.storage_kind
    }

    /// This rank's local shape in logical (caller-facing) axis order.
    #[must_use]
    pub fn local_size_logical(&self) -> Vec<usize> {
        self.axis_partitions.iter().map(|p| p.sz).collect()
    }

    /// This rank's local shape in memory axis order:
    /// `apply(permutation, local_size_logical())`.
    ///
    /// # Panics
    /// Never, for a validly-constructed Pencil (arity was checked in
    /// [`Pencil::new`]).
    #[must_use]
    pub fn local_size_memory(&self) -> Vec<usize> {
        self.permutation
            .apply(&self.local_size_logical())
            .expect("permutation arity matches global_size, checked at construction")
    }

    /// This rank's local index range along logical axis `axis`.
    ///
    /// # Panics
    /// If `axis >= self.ndims()`.
    #[must_use]
    pub fn local_range_logical(&self, axis: usize) -> Range<usize> {
        self.axis_partitions[axis].range()
    }

    /// This rank's local index range along *memory* position `mem_pos`
    /// (i.e. reindexed through the permutation) -- the form the I/O
    /// collaborator interface in the spec wants, since it defines
    /// hyperslabs in memory order without interpreting the permutation
    /// itself.
    ///
    /// # Panics
    /// If `mem_pos >= self.ndims()`.
    #[must_use]
    pub fn local_range_memory(&self, mem_pos: usize) -> Range<usize> {
        self.local_range_logical(self.logical_axis_at_memory_pos(mem_pos))
    }

    fn logical_axis_at_memory_pos(&self, mem_pos: usize) -> usize {
        let identity: Vec<usize> = (0..self.ndims()).collect();
        self.permutation
            .apply(&identity)
            .expect("permutation arity matches global_size, checked at construction")[mem_pos]
    }

    /// The index range owned by grid coordinate `coord` along logical axis
    /// `axis`. If `axis` is not decomposed, every coordinate owns the full
    /// axis.
    ///
    /// # Panics
    /// If `axis >= self.ndims()`.
    #[must_use]
    pub fn remote_range(&self, coord: usize, axis: usize) -> Range<usize> {
        self.axis_partitions[axis].remote_range(coord)
    }

    /// Total number of elements in this rank's local block (spatial axes
    /// only, no extra dims).
    #[must_use]
    pub fn local_len(&self) -> usize {
        self.local_size_logical().iter().product()
    }

    /// Borrow the send-scratch buffer reinterpreted as `len` elements of
    /// `T`, growing the backing storage first if needed.
    #[must_use]
    pub fn send_buf<T: Copy>(&self, len: usize) -> std::cell::RefMut<'_, [T]> {
        self.send_buf.borrow_as(len)
    }

    /// Borrow the receive-scratch buffer reinterpreted as `len` elements of
    /// `T`, growing the backing storage first if needed.
    #[must_use]
    pub fn recv_buf<T: Copy>(&self, len: usize) -> std::cell::RefMut<'_, [T]> {
        self.recv_buf.borrow_as(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // `build_partitions_from` is the pure core of Pencil construction; it
    // can be exercised without a live MPI topology, which the rest of
    // Pencil::new requires. Full construction (including the error paths)
    // is covered by the multi-rank integration tests under `tests/`.

    #[test]
    fn decomposed_axis_is_tiled_per_rank() {
        let global_size = [20usize, 16];
        let decomp_dims = [0usize, 1];
        let grid_dims = [2usize, 2];

        let rank00 = Pencil::build_partitions_from(&global_size, &decomp_dims, &grid_dims, &[0, 0]);
        let rank11 = Pencil::build_partitions_from(&global_size, &decomp_dims, &grid_dims, &[1, 1]);

        assert_eq!(rank00[0].range(), 0..10);
        assert_eq!(rank00[1].range(), 0..8);
        assert_eq!(rank11[0].range(), 10..20);
        assert_eq!(rank11[1].range(), 8..16);
    }

    #[test]
    fn non_decomposed_axis_is_kept_whole_on_every_rank() {
        let global_size = [20usize, 16, 12];
        let decomp_dims = [0usize, 1];
        let grid_dims = [2usize, 2];

        for coords in [[0usize, 0], [0, 1], [1, 0], [1, 1]] {
            let partitions =
                Pencil::build_partitions_from(&global_size, &decomp_dims, &grid_dims, &coords);
            assert_eq!(partitions[2].range(), 0..12);
        }
    }
}
