use num_traits::Float;
use rustc_hash::FxHashSet;

/// Default number of points per leaf
pub const DEFAULT_LEAF_SIZE: usize = 20;

/// Upper bound on the node count of the implicit binary tree
///
/// A complete binary tree whose leaves each hold at most `leaf_size` points
/// under the "bigger half goes left" split rule fits into
/// `2^(1 + ⌈log₂⌈n / leaf_size⌉⌉) − 1` heap slots. Any other split rule
/// needs its own bound.
///
/// ### Params
///
/// * `n` - Number of points
/// * `leaf_size` - Maximum points per leaf
///
/// ### Returns
///
/// The node budget for the index arrays.
pub fn node_count_bound(n: usize, leaf_size: usize) -> usize {
    let n_leaves = n.div_ceil(leaf_size);
    let levels = n_leaves.next_power_of_two().trailing_zeros() as usize;
    (1usize << (levels + 1)) - 1
}

/// Compute the centroid of a set of rows
///
/// ### Params
///
/// * `data` - The flat data vector
/// * `dim` - Dimensionality of the data
/// * `idx` - Row indices belonging to the node
///
/// ### Returns
///
/// The arithmetic mean of the rows.
pub fn node_centroid<T: Float>(data: &[T], dim: usize, idx: &[u32]) -> Vec<T> {
    let mut centroid = vec![T::zero(); dim];
    let n = T::from(idx.len()).unwrap();

    for &i in idx {
        let row = &data[i as usize * dim..(i as usize + 1) * dim];
        for d in 0..dim {
            centroid[d] = centroid[d] + row[d];
        }
    }

    for d in 0..dim {
        centroid[d] = centroid[d] / n;
    }

    centroid
}

/// Find the axis with the widest spread over a set of rows
///
/// Ties break toward the lower-index axis.
///
/// ### Params
///
/// * `data` - The flat data vector
/// * `dim` - Dimensionality of the data
/// * `idx` - Row indices belonging to the node
///
/// ### Returns
///
/// The axis maximising `max - min` over the rows.
pub fn max_spread_axis<T: Float>(data: &[T], dim: usize, idx: &[u32]) -> usize {
    let mut best_axis = 0;
    let mut best_spread = T::neg_infinity();

    for axis in 0..dim {
        let mut lo = T::infinity();
        let mut hi = T::neg_infinity();
        for &i in idx {
            let v = data[i as usize * dim + axis];
            if v < lo {
                lo = v;
            }
            if v > hi {
                hi = v;
            }
        }
        let spread = hi - lo;
        if spread > best_spread {
            best_spread = spread;
            best_axis = axis;
        }
    }

    best_axis
}

/// Partition an index slice around its `mid`-th order statistic
///
/// In-place quickselect along `axis`: afterwards every row in
/// `idx[..mid]` has a split-axis value no larger than every row in
/// `idx[mid..]`. Only the index slice is rearranged; the order within each
/// half is unspecified. Expected O(n).
///
/// ### Params
///
/// * `data` - The flat data vector
/// * `dim` - Dimensionality of the data
/// * `axis` - The split axis
/// * `idx` - Index slice to rearrange; must be non-empty
/// * `mid` - Order statistic to pin, `mid < idx.len()`
pub fn partition_around_median<T: Float>(
    data: &[T],
    dim: usize,
    axis: usize,
    idx: &mut [u32],
    mid: usize,
) {
    debug_assert!(mid < idx.len());
    let key = |i: u32| data[i as usize * dim + axis];

    let (mut first, mut last) = (0usize, idx.len() - 1);
    loop {
        let mut cur = first;
        for i in first..last {
            if key(idx[i]) < key(idx[last]) {
                idx.swap(i, cur);
                cur += 1;
            }
        }
        idx.swap(cur, last);
        if cur == mid {
            return;
        }
        if cur < mid {
            first = cur + 1;
        } else {
            last = cur - 1;
        }
    }
}

/// Check that `idx` is a permutation of `0..n`
///
/// ### Params
///
/// * `idx` - The candidate permutation
/// * `n` - Expected domain size
///
/// ### Returns
///
/// `true` iff every value of `0..n` appears exactly once.
pub fn is_permutation(idx: &[u32], n: usize) -> bool {
    if idx.len() != n {
        return false;
    }
    let seen: FxHashSet<u32> = idx.iter().copied().collect();
    seen.len() == n && idx.iter().all(|&i| (i as usize) < n)
}

///////////
// Tests //
///////////

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_node_count_bound_values() {
        // single leaf
        assert_eq!(node_count_bound(1, 20), 1);
        assert_eq!(node_count_bound(20, 20), 1);
        // one split
        assert_eq!(node_count_bound(21, 20), 3);
        // 100/20 = 5 leaves -> 3 levels of splits
        assert_eq!(node_count_bound(100, 20), 15);
        // leaf_size 1 keeps the bound tight for tiny trees
        assert_eq!(node_count_bound(5, 1), 15);
        assert_eq!(node_count_bound(8, 1), 15);
    }

    #[test]
    fn test_node_centroid() {
        let data = vec![0.0_f64, 1.0, 0.0, 9.0, 0.0, 2.0];
        let centroid = node_centroid(&data, 2, &[0, 1, 2]);
        assert_relative_eq!(centroid[0], 0.0);
        assert_relative_eq!(centroid[1], 4.0);

        let centroid = node_centroid(&data, 2, &[0, 2]);
        assert_relative_eq!(centroid[1], 1.5);
    }

    #[test]
    fn test_max_spread_axis() {
        let data = vec![0.0_f64, 1.0, 0.0, 9.0, 0.0, 2.0];
        assert_eq!(max_spread_axis(&data, 2, &[0, 1, 2]), 1);
    }

    #[test]
    fn test_max_spread_axis_tie_takes_lower() {
        // both axes spread 2
        let data = vec![0.0_f64, 0.0, 2.0, 2.0];
        assert_eq!(max_spread_axis(&data, 2, &[0, 1]), 0);
    }

    #[test]
    fn test_partition_around_median_odd() {
        let data = vec![1.0_f64, 2.0, 3.0, 4.0, 5.0];
        let mut idx = [0u32, 1, 4, 3, 2];
        partition_around_median(&data, 1, 0, &mut idx, 2);

        let pivot = data[idx[2] as usize];
        for &i in &idx[..2] {
            assert!(data[i as usize] <= pivot);
        }
        for &i in &idx[3..] {
            assert!(data[i as usize] >= pivot);
        }
    }

    #[test]
    fn test_partition_around_median_even() {
        let data = vec![4.0_f64, 3.0, 2.0, 1.0];
        let mut idx = [0u32, 1, 2, 3];
        partition_around_median(&data, 1, 0, &mut idx, 2);

        let pivot = data[idx[2] as usize];
        for &i in &idx[..2] {
            assert!(data[i as usize] <= pivot);
        }
        for &i in &idx[2..] {
            assert!(data[i as usize] >= pivot);
        }
    }

    #[test]
    fn test_partition_around_median_duplicates() {
        let data = vec![1.0_f64, 1.0, 1.0, 1.0, 1.0];
        let mut idx = [4u32, 3, 2, 1, 0];
        partition_around_median(&data, 1, 0, &mut idx, 2);

        let mut sorted = idx.to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_partition_around_median_second_axis() {
        // partition on axis 1 of a 2d layout
        let data = vec![0.0_f64, 5.0, 0.0, 1.0, 0.0, 3.0, 0.0, 4.0];
        let mut idx = [0u32, 1, 2, 3];
        partition_around_median(&data, 2, 1, &mut idx, 2);

        let key = |i: u32| data[i as usize * 2 + 1];
        let pivot = key(idx[2]);
        assert!(idx[..2].iter().all(|&i| key(i) <= pivot));
        assert!(idx[2..].iter().all(|&i| key(i) >= pivot));
    }

    #[test]
    fn test_is_permutation() {
        assert!(is_permutation(&[2, 0, 1], 3));
        assert!(!is_permutation(&[0, 0, 1], 3));
        assert!(!is_permutation(&[0, 1], 3));
        assert!(!is_permutation(&[0, 1, 3], 3));
    }
}
