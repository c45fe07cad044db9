//! Per-axis data distribution
//!
//! Stores the size and first/last index of the current processor, and of
//! every processor, along a single decomposed axis.
#![allow(clippy::similar_names)]

/// How one global axis of length `L` is tiled across `P` processes along
/// one grid axis.
#[derive(Debug, Clone)]
pub struct AxisPartition {
    /// Size of this rank's range.
    pub sz: usize,
    /// Starting index of this rank's range.
    pub st: usize,
    /// Ending index (inclusive) of this rank's range.
    pub en: usize,
    /// Size of every rank's range, indexed by grid coordinate.
    pub sz_procs: Vec<usize>,
    /// Starting index of every rank's range, indexed by grid coordinate.
    pub st_procs: Vec<usize>,
    /// Ending index (inclusive) of every rank's range, indexed by grid
    /// coordinate.
    pub en_procs: Vec<usize>,
}

impl AxisPartition {
    /// A non-decomposed axis: the whole axis belongs to every rank.
    #[must_use]
    pub fn contiguous(n_global: usize) -> Self {
        let st = 0;
        let en = n_global.saturating_sub(1);
        Self {
            sz: n_global,
            st,
            en,
            sz_procs: vec![n_global],
            st_procs: vec![st],
            en_procs: vec![en],
        }
    }

    /// Tile `n_global` points across `nprocs` processes along one grid
    /// axis, as balanced as possible (any two ranges differ by at most
    /// one element), and record this rank's (`nrank`) own range.
    #[must_use]
    pub fn split(n_global: usize, nprocs: usize, nrank: usize) -> Self {
        let (st_procs, en_procs, sz_procs) = Self::distribute(n_global, nprocs);
        Self {
            sz: sz_procs[nrank],
            st: st_procs[nrank],
            en: en_procs[nrank],
            sz_procs,
            st_procs,
            en_procs,
        }
    }

    /// The partition tables for all `nprocs` ranks: rank `i` owns
    /// `[floor(i*n/nprocs) .. floor((i+1)*n/nprocs) - 1]`, i.e. the last
    /// `n mod nprocs` ranks get one extra element.
    fn distribute(n_global: usize, nprocs: usize) -> (Vec<usize>, Vec<usize>, Vec<usize>) {
        let size = n_global / nprocs;
        let mut st = vec![0; nprocs];
        let mut en = vec![0; nprocs];
        let mut sz = vec![0; nprocs];
        st[0] = 0;
        sz[0] = size;
        en[0] = size.saturating_sub(1);

        let nu = n_global - size * nprocs;
        let nl = nprocs - nu;
        for i in 1..nl {
            st[i] = st[i - 1] + size;
            sz[i] = size;
            en[i] = en[i - 1] + size;
        }
        let size_plus_one = size + 1;
        for i in nl..nprocs {
            st[i] = if i == 0 { 0 } else { en[i - 1] + 1 };
            sz[i] = size_plus_one;
            en[i] = st[i] + size_plus_one - 1;
        }
        if nprocs > 0 {
            en[nprocs - 1] = n_global - 1;
            sz[nprocs - 1] = en[nprocs - 1] + 1 - st[nprocs - 1];
        }
        (st, en, sz)
    }

    /// This rank's range as a half-open `Range<usize>`.
    #[must_use]
    pub fn range(&self) -> std::ops::Range<usize> {
        self.st..self.en + 1
    }

    /// The range owned by grid coordinate `coord`.
    #[must_use]
    pub fn remote_range(&self, coord: usize) -> std::ops::Range<usize> {
        self.st_procs[coord]..self.en_procs[coord] + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranges_for(n: usize, p: usize) -> Vec<std::ops::Range<usize>> {
        (0..p).map(|r| AxisPartition::split(n, p, r).range()).collect()
    }

    #[test]
    fn tiles_exactly_with_no_gap_or_overlap() {
        for (n, p) in [(10, 3), (16, 4), (7, 2), (1, 1), (100, 7)] {
            let ranges = ranges_for(n, p);
            let mut covered = vec![false; n];
            for r in &ranges {
                for i in r.clone() {
                    assert!(!covered[i], "index {i} covered twice for n={n} p={p}");
                    covered[i] = true;
                }
            }
            assert!(covered.iter().all(|&c| c), "gap found for n={n} p={p}");
        }
    }

    #[test]
    fn balance_within_one() {
        for (n, p) in [(10, 3), (16, 4), (7, 2), (101, 10)] {
            let ranges = ranges_for(n, p);
            let lens: Vec<usize> = ranges.iter().map(std::iter::ExactSizeIterator::len).collect();
            let (min, max) = (*lens.iter().min().unwrap(), *lens.iter().max().unwrap());
            assert!(max - min <= 1, "imbalance for n={n} p={p}: {lens:?}");
        }
    }

    #[test]
    fn single_process_owns_everything() {
        let part = AxisPartition::split(42, 1, 0);
        assert_eq!(part.range(), 0..42);
    }

    #[test]
    fn contiguous_axis_is_one_full_range() {
        let part = AxisPartition::contiguous(9);
        assert_eq!(part.range(), 0..9);
        assert_eq!(part.remote_range(0), 0..9);
    }
}
