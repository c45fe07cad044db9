//! Cartesian process-grid topology
//!
//! Wraps a communicator as an M-dimensional Cartesian process grid: rank
//! <-> coordinate mapping and one sub-communicator per grid axis, built
//! once at construction and immutable thereafter.
use mpi::environment::Universe;
use mpi::topology::{CartesianCommunicator, CartesianLayout, Communicator};

use crate::error::{Error, Result};

/// An immutable M-dimensional Cartesian process grid over a communicator.
///
/// The i-th sub-communicator (returned by [`MpiTopology::subcomm`]) groups
/// all processes that share every grid coordinate except the i-th --
/// exactly the set of peers a transposition along grid axis `i` needs to
/// talk to.
pub struct MpiTopology<'a> {
    universe: &'a Universe,
    comm: CartesianCommunicator,
    dims: Vec<i32>,
    periods: Vec<bool>,
    coords: Vec<i32>,
    subcomms: Vec<CartesianCommunicator>,
}

impl<'a> MpiTopology<'a> {
    /// Build a Cartesian topology of shape `dims` over `universe`'s world
    /// communicator.
    ///
    /// Coordinates are assigned in row-major (lexicographic) order of grid
    /// coordinates; a sub-communicator is split for every grid axis.
    ///
    /// # Errors
    /// [`Error::GridSizeMismatch`] if `dims.iter().product() != world.size()`.
    pub fn new(universe: &'a Universe, dims: &[i32], periods: &[bool]) -> Result<Self> {
        let world = universe.world();
        let comm_size = world.size();
        let product: i32 = dims.iter().product();
        if product != comm_size {
            return Err(Error::GridSizeMismatch {
                dims: dims.to_vec(),
                product,
                comm_size,
            });
        }

        let comm = world
            .create_cartesian_communicator(dims, periods, false)
            .expect("MPI_Cart_create failed for a validated grid shape");

        let CartesianLayout {
            coords: layout_coords,
            ..
        } = comm.get_layout();

        let m = dims.len();
        let mut subcomms = Vec::with_capacity(m);
        for axis in 0..m {
            let mut retain = vec![false; m];
            retain[axis] = true;
            subcomms.push(comm.subgroup(&retain));
        }

        Ok(Self {
            universe,
            comm,
            dims: dims.to_vec(),
            periods: periods.to_vec(),
            coords: layout_coords,
            subcomms,
        })
    }

    /// The MPI universe this topology was built from.
    #[must_use]
    pub fn universe(&self) -> &'a Universe {
        self.universe
    }

    /// Dimensionality M of the grid.
    #[must_use]
    pub fn ndims(&self) -> usize {
        self.dims.len()
    }

    /// The grid shape `(P_1, .., P_M)`.
    #[must_use]
    pub fn dims(&self) -> &[i32] {
        &self.dims
    }

    /// Whether the grid is periodic along each axis.
    #[must_use]
    pub fn periods(&self) -> &[bool] {
        &self.periods
    }

    /// This rank's coordinate in the grid.
    #[must_use]
    pub fn coords(&self) -> &[i32] {
        &self.coords
    }

    /// Number of processes along `axis`.
    ///
    /// # Panics
    /// If `axis >= self.ndims()`.
    #[must_use]
    pub fn size(&self, axis: usize) -> i32 {
        self.dims[axis]
    }

    /// The sub-communicator for `axis`: all ranks that share every grid
    /// coordinate except the `axis`-th.
    ///
    /// # Panics
    /// If `axis >= self.ndims()`.
    #[must_use]
    pub fn subcomm(&self, axis: usize) -> &CartesianCommunicator {
        &self.subcomms[axis]
    }

    /// The underlying Cartesian communicator.
    #[must_use]
    pub fn comm(&self) -> &CartesianCommunicator {
        &self.comm
    }

    /// Rank of the process at grid coordinate `coord`, in the same
    /// row-major (lexicographic) order used to build the grid.
    ///
    /// # Panics
    /// If `coord.len() != self.ndims()`.
    #[must_use]
    pub fn rank_of(&self, coord: &[i32]) -> i32 {
        assert_eq!(coord.len(), self.ndims());
        let mut rank = 0i32;
        for (&c, &d) in coord.iter().zip(self.dims.iter()) {
            rank = rank * d + c;
        }
        rank
    }

    /// Grid coordinate of `rank`, inverse of [`MpiTopology::rank_of`].
    #[must_use]
    pub fn coord_of(&self, rank: i32) -> Vec<i32> {
        let mut remaining = rank;
        let mut coord = vec![0i32; self.dims.len()];
        for i in (0..self.dims.len()).rev() {
            let d = self.dims[i];
            coord[i] = remaining % d;
            remaining /= d;
        }
        coord
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rank_coord_roundtrip_is_consistent_with_row_major_order() {
        // Pure arithmetic, no MPI needed: verify the row-major mapping
        // used by `rank_of`/`coord_of` is mutually inverse for a 2x3 grid.
        let dims = [2i32, 3];
        let rank_of = |coord: &[i32]| -> i32 {
            let mut rank = 0i32;
            for (&c, &d) in coord.iter().zip(dims.iter()) {
                rank = rank * d + c;
            }
            rank
        };
        let coord_of = |rank: i32| -> Vec<i32> {
            let mut remaining = rank;
            let mut coord = vec![0i32; dims.len()];
            for i in (0..dims.len()).rev() {
                let d = dims[i];
                coord[i] = remaining % d;
                remaining /= d;
            }
            coord
        };
        for r in 0..dims.iter().product() {
            assert_eq!(rank_of(&coord_of(r)), r);
        }
    }
}
