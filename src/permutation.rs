//! Static index permutations
//!
//! A [`Permutation`] is a bijection on `0..n` used to describe the order in
//! which a [`crate::pencil::Pencil`] lays out its axes in memory relative to
//! the logical order a caller indexes with.
use std::fmt;

use smallvec::SmallVec;

use crate::error::{Error, Result};

/// Inline capacity before `Explicit` spills to the heap.
///
/// Realistic global shapes in this domain are 3- to 6-dimensional, so this
/// covers the overwhelmingly common case without an allocation per
/// `Permutation`.
const INLINE: usize = 6;

/// A static bijection on `{0, .., n-1}`.
///
/// `Identity` is a distinguished variant: it never materializes a `0..n`
/// vector, so composing with or applying the identity permutation is a
/// straight pass-through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Permutation {
    /// The identity permutation of the given arity.
    Identity(usize),
    /// An explicit permutation, `sigma[i]` is the source position for
    /// output position `i`.
    Explicit(SmallVec<[usize; INLINE]>),
}

impl Permutation {
    /// The identity permutation of arity `n`.
    #[must_use]
    pub fn identity(n: usize) -> Self {
        Self::Identity(n)
    }

    /// Construct an explicit permutation from `sigma`.
    ///
    /// # Errors
    /// [`Error::InvalidPermutation`] if `sigma` is not a bijection on
    /// `0..sigma.len()`.
    pub fn explicit(sigma: impl Into<SmallVec<[usize; INLINE]>>) -> Result<Self> {
        let sigma = sigma.into();
        let n = sigma.len();
        let mut seen = vec![false; n];
        for &s in &sigma {
            if s >= n || std::mem::replace(&mut seen[s], true) {
                return Err(Error::InvalidPermutation {
                    n,
                    values: sigma.into_iter().collect(),
                });
            }
        }
        if sigma.iter().enumerate().all(|(i, &s)| i == s) {
            return Ok(Self::Identity(n));
        }
        Ok(Self::Explicit(sigma))
    }

    /// Arity of this permutation.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Identity(n) => *n,
            Self::Explicit(sigma) => sigma.len(),
        }
    }

    /// Whether this permutation has zero arity (vacuously identity).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether this permutation is the identity (either variant, since
    /// `explicit` never returns an `Explicit` that behaves as identity).
    #[must_use]
    pub fn is_identity(&self) -> bool {
        matches!(self, Self::Identity(_))
    }

    fn check_arity<T>(&self, t: &[T]) -> Result<()> {
        if t.len() != self.len() {
            return Err(Error::ArityMismatch {
                expected: self.len(),
                got: t.len(),
            });
        }
        Ok(())
    }

    /// `apply(sigma, t)`: output position `i` holds `t[sigma[i]]`.
    ///
    /// # Errors
    /// [`Error::ArityMismatch`] if `t.len() != self.len()`.
    pub fn apply<T: Clone>(&self, t: &[T]) -> Result<Vec<T>> {
        self.check_arity(t)?;
        match self {
            Self::Identity(_) => Ok(t.to_vec()),
            Self::Explicit(sigma) => Ok(sigma.iter().map(|&s| t[s].clone()).collect()),
        }
    }

    /// `invapply(sigma, t)`: the tuple `u` such that `apply(sigma, u) == t`.
    ///
    /// # Errors
    /// [`Error::ArityMismatch`] if `t.len() != self.len()`.
    pub fn invapply<T: Clone>(&self, t: &[T]) -> Result<Vec<T>> {
        self.check_arity(t)?;
        match self {
            Self::Identity(_) => Ok(t.to_vec()),
            Self::Explicit(sigma) => {
                let mut u: Vec<Option<T>> = vec![None; t.len()];
                for (i, &s) in sigma.iter().enumerate() {
                    u[s] = Some(t[i].clone());
                }
                Ok(u.into_iter().map(|x| x.expect("sigma is a bijection")).collect())
            }
        }
    }

    /// `compose(sigma, tau) = apply(sigma, tau)`, i.e. the permutation that
    /// applies `tau` first and then `sigma`, expressed as a single
    /// `Permutation` of the same arity.
    ///
    /// # Errors
    /// [`Error::ArityMismatch`] if the two permutations have different
    /// arity.
    pub fn compose(&self, tau: &Self) -> Result<Self> {
        if self.len() != tau.len() {
            return Err(Error::ArityMismatch {
                expected: self.len(),
                got: tau.len(),
            });
        }
        if self.is_identity() {
            return Ok(tau.clone());
        }
        if tau.is_identity() {
            return Ok(self.clone());
        }
        let tau_vec: Vec<usize> = (0..tau.len()).collect();
        let composed = self.apply(&tau.apply(&tau_vec)?)?;
        Self::explicit(SmallVec::<[usize; INLINE]>::from_vec(composed))
    }

    /// The inverse permutation.
    #[must_use]
    pub fn inverse(&self) -> Self {
        match self {
            Self::Identity(n) => Self::Identity(*n),
            Self::Explicit(sigma) => {
                let mut inv = vec![0usize; sigma.len()];
                for (i, &s) in sigma.iter().enumerate() {
                    inv[s] = i;
                }
                Self::Explicit(SmallVec::from_vec(inv))
            }
        }
    }

    /// Extend this permutation with `k` trailing identity positions.
    #[must_use]
    pub fn append(&self, k: usize) -> Self {
        if k == 0 {
            return self.clone();
        }
        match self {
            Self::Identity(n) => Self::Identity(n + k),
            Self::Explicit(sigma) => {
                let n = sigma.len();
                let mut extended = sigma.clone();
                extended.extend(n..n + k);
                Self::Explicit(extended)
            }
        }
    }

    /// Extend this permutation with `k` leading identity positions: the
    /// result acts as identity on the first `k` positions and as `self`
    /// (shifted by `k`) on the rest.
    #[must_use]
    pub fn prepend(&self, k: usize) -> Self {
        if k == 0 {
            return self.clone();
        }
        match self {
            Self::Identity(n) => Self::Identity(n + k),
            Self::Explicit(sigma) => {
                let mut shifted: SmallVec<[usize; INLINE]> = (0..k).collect();
                shifted.extend(sigma.iter().map(|&s| s + k));
                Self::Explicit(shifted)
            }
        }
    }
}

impl fmt::Display for Permutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Identity(n) => write!(f, "id({n})"),
            Self::Explicit(sigma) => {
                write!(f, "(")?;
                for (i, s) in sigma.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{s}")?;
                }
                write!(f, ")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_renders_identity_and_explicit() {
        assert_eq!(Permutation::identity(3).to_string(), "id(3)");
        assert_eq!(Permutation::explicit(vec![2usize, 0, 1]).unwrap().to_string(), "(2, 0, 1)");
    }

    #[test]
    fn identity_roundtrip() {
        let p = Permutation::identity(4);
        let t = vec![10, 20, 30, 40];
        assert_eq!(p.apply(&t).unwrap(), t);
        assert_eq!(p.invapply(&t).unwrap(), t);
    }

    #[test]
    fn explicit_rejects_non_bijection() {
        assert!(Permutation::explicit(vec![0usize, 0, 2]).is_err());
        assert!(Permutation::explicit(vec![0usize, 1, 3]).is_err());
    }

    #[test]
    fn explicit_collapses_to_identity() {
        let p = Permutation::explicit(vec![0usize, 1, 2]).unwrap();
        assert!(p.is_identity());
    }

    #[test]
    fn apply_invapply_roundtrip() {
        let p = Permutation::explicit(vec![2usize, 0, 1]).unwrap();
        let t = vec!["a", "b", "c"];
        let applied = p.apply(&t).unwrap();
        assert_eq!(p.invapply(&applied).unwrap(), t);

        let u = vec!["x", "y", "z"];
        let inv = p.invapply(&u).unwrap();
        assert_eq!(p.apply(&inv).unwrap(), u);
    }

    #[test]
    fn arity_mismatch_errors() {
        let p = Permutation::explicit(vec![1usize, 0]).unwrap();
        assert!(matches!(
            p.apply(&[1, 2, 3]),
            Err(Error::ArityMismatch { expected: 2, got: 3 })
        ));
    }

    #[test]
    fn append_extends_identically() {
        let p = Permutation::explicit(vec![1usize, 0]).unwrap().append(2);
        assert_eq!(p.len(), 4);
        let t = vec![10, 20, 30, 40];
        assert_eq!(p.apply(&t).unwrap(), vec![20, 10, 30, 40]);
    }

    #[test]
    fn prepend_extends_identically_on_leading_positions() {
        let p = Permutation::explicit(vec![1usize, 0]).unwrap().prepend(2);
        assert_eq!(p.len(), 4);
        let t = vec![10, 20, 30, 40];
        assert_eq!(p.apply(&t).unwrap(), vec![10, 20, 40, 30]);
    }

    #[test]
    fn compose_matches_sequential_application() {
        let sigma = Permutation::explicit(vec![2usize, 0, 1]).unwrap();
        let tau = Permutation::explicit(vec![1usize, 2, 0]).unwrap();
        let composed = sigma.compose(&tau).unwrap();

        let t = vec!["a", "b", "c"];
        let expected = sigma.apply(&tau.apply(&t).unwrap()).unwrap();
        assert_eq!(composed.apply(&t).unwrap(), expected);
    }

    #[test]
    fn inverse_is_involutive_on_apply() {
        let p = Permutation::explicit(vec![3usize, 1, 0, 2]).unwrap();
        let inv = p.inverse();
        let t = vec![1, 2, 3, 4];
        assert_eq!(inv.apply(&p.apply(&t).unwrap()).unwrap(), t);
    }
}
