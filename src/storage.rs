//! Storage family tag and Pencil-owned scratch buffers
//!
//! The source library this crate is modeled on uses runtime polymorphism
//! over array containers (host dense, device dense, ...). Rather than
//! reproduce that with trait objects, a [`Pencil`](crate::pencil::Pencil)
//! carries a small tag and a [`PencilArray`](crate::array::PencilArray)
//! checks it matches at construction (`Error::ContainerMismatch`).
use std::cell::{RefCell, RefMut};
use std::mem::{align_of, size_of};

/// Concrete container family backing a `Pencil`'s arrays and scratch
/// buffers.
///
/// Only `HostDense` has an allocation path; `DeviceDense` exists purely as
/// a second, distinct tag so `PencilArray::wrap`'s container check has
/// something to be meaningfully wrong against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKind {
    /// A plain host-resident dense `ndarray` block.
    HostDense,
    /// Placeholder for a device-resident dense block; not implemented.
    DeviceDense,
}

/// Pencil-owned scratch buffer, reused across transpositions that use the
/// owning Pencil as source (`send_buf`) or destination (`recv_buf`).
///
/// Backed by `Vec<u64>` rather than `Vec<u8>` so the storage is always at
/// least 8-byte aligned -- sufficient for every scalar element type this
/// crate transposes (`f32`/`f64`/`i32`/`i64` and smaller) -- and reborrowed
/// through [`Scratch::borrow_as`] as `[T]` for the element type a given
/// transposition actually needs.
///
/// Interior mutability (`RefCell`) models the source's "logically immutable
/// object with mutable scratch buffers" shape: a `Pencil` is otherwise
/// freely shareable, and a second concurrent borrow -- which the
/// single-threaded contract in the spec says cannot happen through the
/// public API -- panics via `RefCell`'s own borrow check instead of
/// silently corrupting the buffer.
#[derive(Debug, Default)]
pub struct Scratch {
    words: RefCell<Vec<u64>>,
}

impl Scratch {
    /// An empty scratch buffer.
    #[must_use]
    pub fn new() -> Self {
        Self {
            words: RefCell::new(Vec::new()),
        }
    }

    /// Borrow the buffer reinterpreted as `len` elements of `T`, growing
    /// the backing storage first if needed.
    ///
    /// # Panics
    /// - If a transposition holding the buffer is re-entered concurrently,
    ///   the underlying `RefCell` panics (see the single-threaded contract
    ///   in the module docs).
    /// - In debug builds, if `T`'s alignment exceeds 8 bytes (true of
    ///   every element type this crate is used with).
    pub fn borrow_as<T: Copy>(&self, len: usize) -> RefMut<'_, [T]> {
        debug_assert!(
            align_of::<T>() <= align_of::<u64>(),
            "Scratch only guarantees 8-byte alignment"
        );
        let bytes_needed = len * size_of::<T>();
        let words_needed = bytes_needed.div_ceil(size_of::<u64>());
        {
            let mut words = self.words.borrow_mut();
            if words.len() < words_needed {
                words.resize(words_needed, 0);
            }
        }
        RefMut::map(self.words.borrow_mut(), |words| {
            // SAFETY: `words` is `len * size_of::<T>()` bytes or more,
            // 8-byte aligned, and `T`'s alignment is checked above.
            let ptr = words.as_mut_ptr().cast::<T>();
            unsafe { std::slice::from_raw_parts_mut(ptr, len) }
        })
    }
}
