//! Crate-wide error type
use thiserror::Error;

/// Errors raised by this crate.
///
/// All construction-time checks and the transposition engine return
/// `Result<_, Error>` instead of panicking: per the spec's error-handling
/// policy, any condition reachable from caller-supplied arguments must be
/// an error on every rank, never a partial panic on one.
#[derive(Debug, Error)]
pub enum Error {
    /// A permutation was constructed from a tuple that is not a bijection.
    #[error("not a valid permutation of 0..{n}: {values:?}")]
    InvalidPermutation {
        /// Expected arity.
        n: usize,
        /// The offending values.
        values: Vec<usize>,
    },

    /// `apply`/`invapply` called with a tuple whose length does not match
    /// the permutation's arity.
    #[error("arity mismatch: permutation has length {expected}, tuple has length {got}")]
    ArityMismatch {
        /// Permutation arity.
        expected: usize,
        /// Length of the tuple that was passed in.
        got: usize,
    },

    /// The product of the requested grid shape does not equal the
    /// communicator's size.
    #[error("grid shape {dims:?} has product {product}, expected communicator size {comm_size}")]
    GridSizeMismatch {
        /// Requested grid shape.
        dims: Vec<i32>,
        /// Product of `dims`.
        product: i32,
        /// Actual communicator size.
        comm_size: i32,
    },

    /// A `Pencil`'s `decomp_dims` length does not match its topology's
    /// dimensionality.
    #[error(
        "topology has dimensionality {topology_dims}, but decomp_dims has length {decomp_len}"
    )]
    IncompatibleTopology {
        /// `topology.ndims()`.
        topology_dims: usize,
        /// `decomp_dims.len()`.
        decomp_len: usize,
    },

    /// An axis index was out of the `0..n` range.
    #[error("axis {axis} out of range for an {n}-dimensional global shape")]
    AxisOutOfRange {
        /// The offending axis.
        axis: usize,
        /// Number of global dimensions.
        n: usize,
    },

    /// `decomp_dims` named the same global axis twice.
    #[error("axis {axis} appears more than once in decomp_dims {decomp_dims:?}")]
    DuplicateDecompAxis {
        /// The repeated axis.
        axis: usize,
        /// The full `decomp_dims` tuple.
        decomp_dims: Vec<usize>,
    },

    /// `PencilArray::wrap` was given storage whose container family does
    /// not match the owning `Pencil`'s `storage_kind`.
    #[error("container mismatch: pencil expects {expected:?}, storage is {got:?}")]
    ContainerMismatch {
        /// `pencil.storage_kind()`.
        expected: crate::storage::StorageKind,
        /// The container family of the storage that was passed in.
        got: crate::storage::StorageKind,
    },

    /// `PencilArray::wrap` was given storage of the wrong shape.
    #[error("shape mismatch: expected {expected:?}, got {got:?}")]
    DimensionMismatch {
        /// Expected shape (memory order, extra dims appended).
        expected: Vec<usize>,
        /// Shape of the storage that was passed in.
        got: Vec<usize>,
    },

    /// Source and destination Pencils of a transposition are not compatible.
    #[error("incompatible transposition: {reason}")]
    IncompatibleTransposition {
        /// Human-readable explanation of the mismatch.
        reason: String,
    },

    /// An MPI call failed during a transposition.
    #[error("transport failure talking to peer rank {peer}: {source}")]
    TransportFailure {
        /// Rank of the peer the failing exchange was with.
        peer: i32,
        /// Underlying error.
        #[source]
        source: anyhow::Error,
    },
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, Error>;
