pub mod heap_structs;
pub mod traits;
pub mod tree_utils;

use faer::MatRef;
use std::collections::BinaryHeap;

use crate::dist::*;
use crate::error::*;
use crate::utils::heap_structs::*;
use crate::utils::traits::*;

/// Flatten a faer matrix into a row-major vector
///
/// ### Params
///
/// * `data` - The data matrix (rows = samples, columns = dimensions)
///
/// ### Returns
///
/// A tuple of `(flat data, number of rows, dimensionality)`.
pub fn matrix_to_flat<T: TreeFloat>(data: MatRef<T>) -> (Vec<T>, usize, usize) {
    let n = data.nrows();
    let dim = data.ncols();

    let mut flat = Vec::with_capacity(n * dim);
    for i in 0..n {
        flat.extend(data.row(i).iter().cloned());
    }

    (flat, n, dim)
}

/// Shared shape validation for the brute-force reference scans
fn validate_flat_store<T: TreeFloat>(
    data: &[T],
    dim: usize,
    query: &[T],
) -> Result<(), BallTreeError> {
    if dim == 0 {
        return Err(BallTreeError::InvalidParameter {
            name: "dim",
            value: 0.0,
            reason: "must be at least 1",
        });
    }
    if !data.len().is_multiple_of(dim) {
        return Err(BallTreeError::ShapeMismatch {
            expected: data.len().div_ceil(dim) * dim,
            got: data.len(),
            context: "flat data length",
        });
    }
    if query.len() != dim {
        return Err(BallTreeError::ShapeMismatch {
            expected: dim,
            got: query.len(),
            context: "query vector",
        });
    }
    Ok(())
}

/// Exhaustive k-nearest-neighbour scan, used as ground truth
///
/// O(n·d) over the whole store; the tree queries must return exactly this
/// neighbour set.
///
/// ### Params
///
/// * `data` - The flat data vector, length a multiple of `dim`
/// * `dim` - Dimensionality of the data
/// * `metric` - The distance metric
/// * `query` - The query vector
/// * `k` - Number of neighbours to return, `1 <= k <= n`
///
/// ### Returns
///
/// A tuple of `(indices, true distances)`, ascending by distance.
pub fn exhaustive_knn<T: TreeFloat>(
    data: &[T],
    dim: usize,
    metric: Metric,
    query: &[T],
    k: usize,
) -> Result<(Vec<usize>, Vec<T>), BallTreeError> {
    validate_flat_store(data, dim, query)?;

    let n = data.len() / dim;
    if k == 0 || k > n {
        return Err(BallTreeError::KOutOfRange { k, n });
    }

    let mut heap: BinaryHeap<(OrderedFloat<T>, usize)> = BinaryHeap::with_capacity(k + 1);

    for idx in 0..n {
        let rdist = minkowski_rdist(&data[idx * dim..(idx + 1) * dim], query, metric);

        if heap.len() < k {
            heap.push((OrderedFloat(rdist), idx));
        } else if rdist < heap.peek().unwrap().0 .0 {
            heap.pop();
            heap.push((OrderedFloat(rdist), idx));
        }
    }

    let mut results: Vec<_> = heap.into_iter().collect();
    results.sort_unstable_by_key(|&(rdist, _)| rdist);

    let (distances, indices): (Vec<_>, Vec<_>) = results
        .into_iter()
        .map(|(OrderedFloat(rdist), idx)| (rdist_to_dist(rdist, metric), idx))
        .unzip();

    Ok((indices, distances))
}

/// Exhaustive radius scan, used as ground truth
///
/// ### Params
///
/// * `data` - The flat data vector, length a multiple of `dim`
/// * `dim` - Dimensionality of the data
/// * `metric` - The distance metric
/// * `query` - The query vector
/// * `radius` - Inclusive true-metric radius, non-negative
///
/// ### Returns
///
/// All indices whose true distance to the query is at most `radius`.
pub fn exhaustive_radius<T: TreeFloat>(
    data: &[T],
    dim: usize,
    metric: Metric,
    query: &[T],
    radius: T,
) -> Result<Vec<usize>, BallTreeError> {
    validate_flat_store(data, dim, query)?;
    if radius < T::zero() {
        return Err(BallTreeError::InvalidParameter {
            name: "radius",
            value: radius.to_f64().unwrap_or(f64::NAN),
            reason: "must be non-negative",
        });
    }

    let n = data.len() / dim;
    let reduced_radius = dist_to_rdist(radius, metric);

    Ok((0..n)
        .filter(|&idx| {
            minkowski_rdist(&data[idx * dim..(idx + 1) * dim], query, metric) <= reduced_radius
        })
        .collect())
}

///////////
// Tests //
///////////
