//! Transposition engine: redistribute a block between two Pencils that
//! share a topology and differ in exactly one decomposed grid axis.
use std::ops::Range;
use std::ptr;

use mpi::collective::CommunicatorCollectives;
use mpi::datatype::{Partition, PartitionMut};
use mpi::point_to_point::{Destination, Source};
use mpi::request;
use mpi::topology::Communicator;
use mpi::traits::Equivalence;
use mpi::{Count, Tag};
use ndarray::Slice;
use num_traits::Zero;

use crate::array::PencilArray;
use crate::error::{Error, Result};
use crate::pencil::Pencil;
use crate::permutation::Permutation;

fn slice_of(range: &Range<usize>) -> Slice {
    Slice::new(range.start as isize, Some(range.end as isize), 1)
}

/// How the non-self blocks are moved between ranks of the differing grid
/// axis's sub-communicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransposeMethod {
    /// `P-1` rounds of non-blocking send/receive pairs, rank `r`
    /// exchanging with `(r + k) mod P` / `(r - k) mod P` in round `k`.
    PairwiseExchange,
    /// A single `MPI_Alltoallv` over the sub-communicator.
    Alltoallv,
}

impl Default for TransposeMethod {
    fn default() -> Self {
        TransposeMethod::PairwiseExchange
    }
}

/// Whether packing may reorder a block into the destination's memory
/// permutation, or must preserve the source's.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermuteDims {
    /// Pack reorders to destination order; unpack is then a direct copy.
    Auto,
    /// Pack preserves source order; unpack absorbs the permutation change.
    Never,
}

impl Default for PermuteDims {
    fn default() -> Self {
        PermuteDims::Auto
    }
}

/// Whether a transposition reuses its Pencils' scratch buffers or
/// allocates fresh ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferStrategy {
    /// Reuse `src.pencil().send_buf()` / `dst.pencil().recv_buf()`.
    ReusePencil,
    /// Allocate a fresh buffer for this call only.
    PerCall,
}

impl Default for BufferStrategy {
    fn default() -> Self {
        BufferStrategy::ReusePencil
    }
}

/// Bundles the three transposition options, with [`Default`] giving the
/// starred defaults so the common case reads as `transpose(src, dst,
/// &TransposeConfig::default())`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransposeConfig {
    pub method: TransposeMethod,
    pub permute_dims: PermuteDims,
    pub buffer_strategy: BufferStrategy,
}

/// Redistribute `src` into `dst`.
///
/// `src` and `dst` must share a topology, the same global shape and
/// `extra_dims`, and differ in exactly one decomposed grid axis.
/// Permutations may differ arbitrarily.
///
/// # Errors
/// [`Error::IncompatibleTransposition`] if the Pencils don't satisfy the
/// above; [`Error::TransportFailure`] if the underlying MPI exchange
/// fails.
pub fn transpose<T>(
    src: &PencilArray<'_, '_, T>,
    dst: &mut PencilArray<'_, '_, T>,
    cfg: &TransposeConfig,
) -> Result<()>
where
    T: Zero + Copy + Equivalence,
{
    let (g, global_axis_src, global_axis_dst) = validate(src, dst)?;

    let extra_dims = src.extra_dims().to_vec();
    let n = src.pencil().ndims();

    let self_ranges = send_ranges(src.pencil(), dst.pencil(), global_axis_dst, self_coord(src.pencil(), g));
    copy_self_block(src, dst, &self_ranges, &extra_dims);

    let subcomm = src.pencil().topology().subcomm(g);
    let p = subcomm.size() as usize;
    if p <= 1 {
        return Ok(());
    }
    let r = subcomm.rank() as usize;

    let mut send_lens = vec![0usize; p];
    let mut recv_lens = vec![0usize; p];
    for q in 0..p {
        if q == r {
            continue;
        }
        send_lens[q] = range_product(&send_ranges(src.pencil(), dst.pencil(), global_axis_dst, q), &extra_dims);
        recv_lens[q] = range_product(&recv_ranges(src.pencil(), dst.pencil(), global_axis_src, q), &extra_dims);
    }
    let send_displs = prefix_sums(&send_lens);
    let recv_displs = prefix_sums(&recv_lens);
    let send_total: usize = send_lens.iter().sum();
    let recv_total: usize = recv_lens.iter().sum();

    let mut send_buf = acquire_buf::<T>(cfg.buffer_strategy, BufKind::Send(src.pencil()), send_total);
    let mut recv_buf = acquire_buf::<T>(cfg.buffer_strategy, BufKind::Recv(dst.pencil()), recv_total);

    for q in 0..p {
        if q == r || send_lens[q] == 0 {
            continue;
        }
        let ranges = send_ranges(src.pencil(), dst.pencil(), global_axis_dst, q);
        pack_block(
            src,
            &ranges,
            &extra_dims,
            cfg.permute_dims,
            dst.pencil().permutation(),
            &mut send_buf[send_displs[q]..send_displs[q] + send_lens[q]],
        );
    }

    match cfg.method {
        TransposeMethod::Alltoallv => {
            // MPI counts are a fixed-width `i32`; a rank whose local block
            // for some peer exceeds `i32::MAX` elements can't be expressed
            // in the wire protocol's count/displacement fields. Surface
            // that as a transport failure naming the offending peer
            // instead of silently truncating via `as`.
            let send_counts = to_counts(&send_lens)?;
            let send_displs_c = to_counts(&send_displs)?;
            let recv_counts = to_counts(&recv_lens)?;
            let recv_displs_c = to_counts(&recv_displs)?;
            let send_partition = Partition::new(&send_buf[..], &send_counts[..], &send_displs_c[..]);
            let mut recv_partition = PartitionMut::new(&mut recv_buf[..], &recv_counts[..], &recv_displs_c[..]);
            subcomm.all_to_all_varcount_into(&send_partition, &mut recv_partition);
        }
        TransposeMethod::PairwiseExchange => {
            for k in 1..p {
                let send_to = (r + k) % p;
                let recv_from = (r + p - k % p) % p;
                let tag = k as Tag;

                let send_range = send_displs[send_to]..send_displs[send_to] + send_lens[send_to];
                let recv_range = recv_displs[recv_from]..recv_displs[recv_from] + recv_lens[recv_from];

                let send_slice = &send_buf[send_range];
                // Two disjoint mutable/immutable borrows of the same
                // `Vec` at non-overlapping ranges would not satisfy the
                // borrow checker directly; split the receive buffer once
                // per round instead.
                let (recv_before, recv_after) = recv_buf.split_at_mut(recv_range.start);
                let recv_slice = &mut recv_after[..recv_range.len()];
                let _ = recv_before;

                request::scope(|scope| {
                    let recv_req = (!recv_slice.is_empty())
                        .then(|| subcomm.process_at_rank(recv_from as i32).immediate_receive_into_with_tag(scope, recv_slice, tag));
                    let send_req = (!send_slice.is_empty())
                        .then(|| subcomm.process_at_rank(send_to as i32).immediate_send_with_tag(scope, send_slice, tag));
                    if let Some(req) = recv_req {
                        req.wait();
                    }
                    if let Some(req) = send_req {
                        req.wait();
                    }
                });
            }
        }
    }

    for q in 0..p {
        if q == r || recv_lens[q] == 0 {
            continue;
        }
        let ranges = recv_ranges(src.pencil(), dst.pencil(), global_axis_src, q);
        unpack_block(
            dst,
            &ranges,
            &extra_dims,
            cfg.permute_dims,
            src.pencil().permutation(),
            &recv_buf[recv_displs[q]..recv_displs[q] + recv_lens[q]],
        );
    }

    Ok(())
}

fn self_coord(pencil: &Pencil<'_>, grid_axis: usize) -> usize {
    pencil.topology().coords()[grid_axis] as usize
}

fn validate<T>(src: &PencilArray<'_, '_, T>, dst: &PencilArray<'_, '_, T>) -> Result<(usize, usize, usize)> {
    let src_p = src.pencil();
    let dst_p = dst.pencil();

    if !ptr::eq(src_p.topology(), dst_p.topology()) {
        return Err(Error::IncompatibleTransposition {
            reason: "source and destination pencils do not share a topology".to_string(),
        });
    }
    if src_p.global_size() != dst_p.global_size() {
        return Err(Error::IncompatibleTransposition {
            reason: format!(
                "global shape mismatch: {:?} vs {:?}",
                src_p.global_size(),
                dst_p.global_size()
            ),
        });
    }
    if src.extra_dims() != dst.extra_dims() {
        return Err(Error::IncompatibleTransposition {
            reason: format!("extra_dims mismatch: {:?} vs {:?}", src.extra_dims(), dst.extra_dims()),
        });
    }

    let m = src_p.topology().ndims();
    let differing: Vec<usize> = (0..m)
        .filter(|&g| src_p.decomp_dims()[g] != dst_p.decomp_dims()[g])
        .collect();
    if differing.len() != 1 {
        return Err(Error::IncompatibleTransposition {
            reason: format!(
                "expected exactly one differing decomposed grid axis, found {}",
                differing.len()
            ),
        });
    }
    let g = differing[0];
    Ok((g, src_p.decomp_dims()[g], dst_p.decomp_dims()[g]))
}

/// Logical-axis ranges of the block destined for peer `q`, as owned by
/// `src` (before the network hop).
fn send_ranges(src: &Pencil<'_>, dst: &Pencil<'_>, global_axis_dst: usize, q: usize) -> Vec<Range<usize>> {
    (0..src.ndims())
        .map(|axis| {
            if axis == global_axis_dst {
                dst.remote_range(q, axis)
            } else {
                src.local_range_logical(axis)
            }
        })
        .collect()
}

/// Logical-axis ranges of the block expected from peer `q`, as owned by
/// `dst` (after the network hop).
fn recv_ranges(src: &Pencil<'_>, dst: &Pencil<'_>, global_axis_src: usize, q: usize) -> Vec<Range<usize>> {
    (0..dst.ndims())
        .map(|axis| {
            if axis == global_axis_src {
                src.remote_range(q, axis)
            } else {
                dst.local_range_logical(axis)
            }
        })
        .collect()
}

fn range_product(ranges: &[Range<usize>], extra_dims: &[usize]) -> usize {
    ranges.iter().map(std::iter::ExactSizeIterator::len).product::<usize>()
        * extra_dims.iter().product::<usize>()
}

/// Convert per-peer lengths/displacements to the `Count` (`i32`) values
/// `Partition`/`PartitionMut` require, failing with the offending peer's
/// rank attached if a value doesn't fit -- the one place a genuinely
/// underlying-MPI-layer limit (the wire protocol's fixed-width count type)
/// can turn a caller-supplied shape into a runtime transport failure.
fn to_counts(values: &[usize]) -> Result<Vec<Count>> {
    values
        .iter()
        .enumerate()
        .map(|(peer, &v)| {
            Count::try_from(v).map_err(|e| Error::TransportFailure {
                peer: peer as i32,
                source: anyhow::Error::new(e),
            })
        })
        .collect()
}

fn prefix_sums(lens: &[usize]) -> Vec<usize> {
    let mut acc = 0usize;
    lens.iter()
        .map(|&l| {
            let start = acc;
            acc += l;
            start
        })
        .collect()
}

/// Logical ranges translated to `pencil`'s memory axis order, with the
/// trailing (unpermuted) extra-dim ranges appended.
fn mem_block_ranges(pencil: &Pencil<'_>, logical_ranges: &[Range<usize>], extra_dims: &[usize]) -> Vec<Range<usize>> {
    let starts: Vec<usize> = logical_ranges.iter().map(|r| r.start).collect();
    let ends: Vec<usize> = logical_ranges.iter().map(|r| r.end).collect();
    let mem_starts = pencil
        .permutation()
        .apply(&starts)
        .expect("permutation arity matches pencil ndims");
    let mem_ends = pencil
        .permutation()
        .apply(&ends)
        .expect("permutation arity matches pencil ndims");
    let mut ranges: Vec<Range<usize>> = mem_starts.into_iter().zip(mem_ends).map(|(s, e)| s..e).collect();
    ranges.extend(extra_dims.iter().map(|&d| 0..d));
    ranges
}

/// Axis order to apply (via `permuted_axes`) to a view already in
/// `from`'s memory order so iterating it in standard order visits
/// elements in `to`'s memory order. Extra-dims axes are passed through
/// unchanged.
fn reorder_axis_order(from: &Permutation, to: &Permutation, n: usize, extra_len: usize) -> Vec<usize> {
    let identity: Vec<usize> = (0..n).collect();
    let from_logical_at_mem = from.apply(&identity).expect("permutation arity matches ndims");
    let to_logical_at_mem = to.apply(&identity).expect("permutation arity matches ndims");

    let mut mem_pos_of_logical = vec![0usize; n];
    for (i, &logical_axis) in from_logical_at_mem.iter().enumerate() {
        mem_pos_of_logical[logical_axis] = i;
    }

    let mut order: Vec<usize> = to_logical_at_mem
        .iter()
        .map(|&logical_axis| mem_pos_of_logical[logical_axis])
        .collect();
    order.extend(n..n + extra_len);
    order
}

fn identity_order(len: usize) -> Vec<usize> {
    (0..len).collect()
}

#[allow(clippy::too_many_arguments)]
fn pack_block<T: Copy>(
    src: &PencilArray<'_, '_, T>,
    logical_ranges: &[Range<usize>],
    extra_dims: &[usize],
    permute_dims: PermuteDims,
    dst_permutation: &Permutation,
    out: &mut [T],
) {
    let mem_ranges = mem_block_ranges(src.pencil(), logical_ranges, extra_dims);
    let view = src
        .parent()
        .slice_each_axis(|ax| slice_of(&mem_ranges[ax.axis.index()]));

    let n = src.pencil().ndims();
    let axis_order = match permute_dims {
        PermuteDims::Auto => reorder_axis_order(src.pencil().permutation(), dst_permutation, n, extra_dims.len()),
        PermuteDims::Never => identity_order(n + extra_dims.len()),
    };
    let permuted = view.permuted_axes(axis_order);
    for (o, &v) in out.iter_mut().zip(permuted.iter()) {
        *o = v;
    }
}

#[allow(clippy::too_many_arguments)]
fn unpack_block<T: Copy>(
    dst: &mut PencilArray<'_, '_, T>,
    logical_ranges: &[Range<usize>],
    extra_dims: &[usize],
    permute_dims: PermuteDims,
    src_permutation: &Permutation,
    input: &[T],
) {
    let n = dst.pencil().ndims();
    let mem_ranges = mem_block_ranges(dst.pencil(), logical_ranges, extra_dims);
    match permute_dims {
        PermuteDims::Auto => {
            // `pack_block` already reordered the data into our memory
            // order; a direct copy lands it correctly.
            let mut view = dst
                .parent_mut()
                .slice_each_axis_mut(|ax| slice_of(&mem_ranges[ax.axis.index()]));
            for (slot, &v) in view.iter_mut().zip(input.iter()) {
                *slot = v;
            }
        }
        PermuteDims::Never => {
            // `pack_block` preserved the source's order, so `input` is
            // still laid out in `src_permutation`'s memory order; `view`
            // below is sliced in `dst`'s own memory order, so the view
            // must be read as if already in `src_permutation`'s order --
            // i.e. reorder *from* dst's order *to* src's order.
            let axis_order = reorder_axis_order(dst.pencil().permutation(), src_permutation, n, extra_dims.len());
            let view = dst
                .parent_mut()
                .slice_each_axis_mut(|ax| slice_of(&mem_ranges[ax.axis.index()]));
            let mut permuted = view.permuted_axes(axis_order);
            for (slot, &v) in permuted.iter_mut().zip(input.iter()) {
                *slot = v;
            }
        }
    }
}

/// Direct array-to-array copy of the block this rank already owns in
/// both layouts -- no network hop, no intermediate buffer, with the
/// permutation change (if any) folded into the loop nest order. Never
/// needs the `permute_dims` option: that option only governs which side
/// of a wire transfer pays for the reorder, and a self-copy has no wire.
fn copy_self_block<T: Copy>(
    src: &PencilArray<'_, '_, T>,
    dst: &mut PencilArray<'_, '_, T>,
    logical_ranges: &[Range<usize>],
    extra_dims: &[usize],
) {
    let n = src.pencil().ndims();
    let src_mem_ranges = mem_block_ranges(src.pencil(), logical_ranges, extra_dims);
    let src_view = src
        .parent()
        .slice_each_axis(|ax| slice_of(&src_mem_ranges[ax.axis.index()]));
    let axis_order = reorder_axis_order(src.pencil().permutation(), dst.pencil().permutation(), n, extra_dims.len());
    let permuted = src_view.permuted_axes(axis_order);

    let dst_mem_ranges = mem_block_ranges(dst.pencil(), logical_ranges, extra_dims);
    let mut dst_view = dst
        .parent_mut()
        .slice_each_axis_mut(|ax| slice_of(&dst_mem_ranges[ax.axis.index()]));
    for (slot, &v) in dst_view.iter_mut().zip(permuted.iter()) {
        *slot = v;
    }
}

enum ScratchBuf<'a, T> {
    Reused(std::cell::RefMut<'a, [T]>),
    Owned(Vec<T>),
}

impl<'a, T> std::ops::Deref for ScratchBuf<'a, T> {
    type Target = [T];
    fn deref(&self) -> &[T] {
        match self {
            Self::Reused(r) => r,
            Self::Owned(v) => v,
        }
    }
}

impl<'a, T> std::ops::DerefMut for ScratchBuf<'a, T> {
    fn deref_mut(&mut self) -> &mut [T] {
        match self {
            Self::Reused(r) => r,
            Self::Owned(v) => v,
        }
    }
}

enum BufKind<'p, 't> {
    Send(&'p Pencil<'t>),
    Recv(&'p Pencil<'t>),
}

fn acquire_buf<'p, 't, T: Copy + Zero>(strategy: BufferStrategy, side: BufKind<'p, 't>, len: usize) -> ScratchBuf<'p, T> {
    match (strategy, side) {
        (BufferStrategy::ReusePencil, BufKind::Send(p)) => ScratchBuf::Reused(p.send_buf::<T>(len)),
        (BufferStrategy::ReusePencil, BufKind::Recv(p)) => ScratchBuf::Reused(p.recv_buf::<T>(len)),
        (BufferStrategy::PerCall, _) => ScratchBuf::Owned(vec![T::zero(); len]),
    }
}
