pub mod ball_tree;
pub mod dist;
pub mod error;
pub mod synthetic;
pub mod utils;

use faer::MatRef;
use rayon::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thousands::*;

use crate::ball_tree::*;
use crate::dist::*;
use crate::error::*;
use crate::utils::traits::TreeFloat;
use crate::utils::tree_utils::DEFAULT_LEAF_SIZE;

////////////////
// Parameters //
////////////////

/// Construction parameters for the ball tree
///
/// ### Fields
///
/// * `leaf_size` - Maximum points per leaf. Affects build and query speed
///   only, never the returned neighbour sets.
/// * `p` - Minkowski exponent, `1 <= p <= ∞`.
#[derive(Clone, Copy, Debug)]
pub struct BallTreeParams {
    pub leaf_size: usize,
    pub p: f64,
}

impl BallTreeParams {
    /// Generate new ball tree parameters
    ///
    /// ### Params
    ///
    /// * `leaf_size` - Maximum points per leaf
    /// * `p` - Minkowski exponent
    pub fn new(leaf_size: usize, p: f64) -> Self {
        Self { leaf_size, p }
    }
}

impl Default for BallTreeParams {
    /// Leaf size 20 and the Euclidean metric
    fn default() -> Self {
        Self {
            leaf_size: DEFAULT_LEAF_SIZE,
            p: 2.0,
        }
    }
}

//////////////
// BallTree //
//////////////

/// Build a ball tree index
///
/// ### Params
///
/// * `mat` - The data matrix. Rows represent the samples, columns represent
///   the embedding dimensions
/// * `params` - Optional construction parameters (uses default if None)
///
/// ### Returns
///
/// The `BallTreeIndex`, or the construction error.
pub fn build_ball_tree_index<T>(
    mat: MatRef<T>,
    params: Option<BallTreeParams>,
) -> Result<BallTreeIndex<T>, BallTreeError>
where
    T: TreeFloat,
{
    let params = params.unwrap_or_default();
    let metric = Metric::new(params.p).ok_or(BallTreeError::InvalidParameter {
        name: "p",
        value: params.p,
        reason: "Minkowski exponent must be at least 1",
    })?;

    BallTreeIndex::new(mat, params.leaf_size, metric)
}

/// Helper function to query a ball tree index for k nearest neighbours
///
/// Query rows are independent, so they are fanned out over the thread pool;
/// the index is shared read-only.
///
/// ### Params
///
/// * `query_mat` - The query matrix containing the samples x features
/// * `index` - The BallTreeIndex to query
/// * `k` - Number of neighbours to return
/// * `return_dist` - Shall the distances between the different points be
///   returned
/// * `verbose` - Controls verbosity of the function
///
/// ### Returns
///
/// A tuple of `(knn_indices, optional distances)`
pub fn query_ball_tree_index<T>(
    query_mat: MatRef<T>,
    index: &BallTreeIndex<T>,
    k: usize,
    return_dist: bool,
    verbose: bool,
) -> Result<(Vec<Vec<usize>>, Option<Vec<Vec<T>>>), BallTreeError>
where
    T: TreeFloat,
{
    let n_samples = query_mat.nrows();
    if query_mat.ncols() != index.dim {
        return Err(BallTreeError::ShapeMismatch {
            expected: index.dim,
            got: query_mat.ncols(),
            context: "query matrix columns",
        });
    }
    if k == 0 || k > index.n {
        return Err(BallTreeError::KOutOfRange { k, n: index.n });
    }

    let counter = Arc::new(AtomicUsize::new(0));

    let results: Result<Vec<(Vec<usize>, Vec<T>)>, BallTreeError> = (0..n_samples)
        .into_par_iter()
        .map(|i| {
            let result = index.query_row(query_mat.row(i), k)?;

            if verbose {
                let count = counter.fetch_add(1, Ordering::Relaxed) + 1;
                if count.is_multiple_of(100_000) {
                    println!(
                        "  Processed {} / {} samples.",
                        count.separate_with_underscores(),
                        n_samples.separate_with_underscores()
                    );
                }
            }

            Ok(result)
        })
        .collect();
    let results = results?;

    if return_dist {
        let (indices, distances) = results.into_iter().unzip();
        Ok((indices, Some(distances)))
    } else {
        let indices: Vec<Vec<usize>> = results.into_iter().map(|(idx, _)| idx).collect();
        Ok((indices, None))
    }
}

/// Result of a batch radius query
///
/// One variant per output mode of [`query_ball_tree_radius`].
#[derive(Clone, Debug, PartialEq)]
pub enum RadiusSearchResult<T> {
    /// Neighbour count per query point
    Counts(Vec<usize>),
    /// Neighbour indices per query point (unsorted)
    Indices(Vec<Vec<usize>>),
    /// Neighbour indices and their true distances per query point
    IndicesAndDistances {
        indices: Vec<Vec<usize>>,
        distances: Vec<Vec<T>>,
    },
}

/// Helper function to query a ball tree index for radius neighbours
///
/// ### Params
///
/// * `query_mat` - The query matrix containing the samples x features
/// * `index` - The BallTreeIndex to query
/// * `radii` - One radius per query row, or a single radius applied to all
///   rows
/// * `return_dist` - Shall the distances between the different points be
///   returned
/// * `count_only` - Only return the neighbour counts. Mutually exclusive
///   with `return_dist`.
/// * `verbose` - Controls verbosity of the function
///
/// ### Returns
///
/// The `RadiusSearchResult` matching the requested mode.
pub fn query_ball_tree_radius<T>(
    query_mat: MatRef<T>,
    index: &BallTreeIndex<T>,
    radii: &[T],
    return_dist: bool,
    count_only: bool,
    verbose: bool,
) -> Result<RadiusSearchResult<T>, BallTreeError>
where
    T: TreeFloat,
{
    if count_only && return_dist {
        return Err(BallTreeError::ConflictingOptions);
    }

    let n_samples = query_mat.nrows();
    if query_mat.ncols() != index.dim {
        return Err(BallTreeError::ShapeMismatch {
            expected: index.dim,
            got: query_mat.ncols(),
            context: "query matrix columns",
        });
    }
    if radii.len() != 1 && radii.len() != n_samples {
        return Err(BallTreeError::ShapeMismatch {
            expected: n_samples,
            got: radii.len(),
            context: "radii",
        });
    }

    let radius_for = |i: usize| if radii.len() == 1 { radii[0] } else { radii[i] };
    let counter = Arc::new(AtomicUsize::new(0));

    let progress = |count: usize| {
        if count.is_multiple_of(100_000) {
            println!(
                "  Processed {} / {} samples.",
                count.separate_with_underscores(),
                n_samples.separate_with_underscores()
            );
        }
    };

    if count_only {
        let counts: Result<Vec<usize>, BallTreeError> = (0..n_samples)
            .into_par_iter()
            .map(|i| {
                let query_vec: Vec<T> = query_mat.row(i).iter().cloned().collect();
                let count = index.query_radius_count(&query_vec, radius_for(i))?;

                if verbose {
                    progress(counter.fetch_add(1, Ordering::Relaxed) + 1);
                }

                Ok(count)
            })
            .collect();

        Ok(RadiusSearchResult::Counts(counts?))
    } else if return_dist {
        let results: Result<Vec<(Vec<usize>, Vec<T>)>, BallTreeError> = (0..n_samples)
            .into_par_iter()
            .map(|i| {
                let query_vec: Vec<T> = query_mat.row(i).iter().cloned().collect();
                let result = index.query_radius_with_dist(&query_vec, radius_for(i))?;

                if verbose {
                    progress(counter.fetch_add(1, Ordering::Relaxed) + 1);
                }

                Ok(result)
            })
            .collect();

        let (indices, distances) = results?.into_iter().unzip();
        Ok(RadiusSearchResult::IndicesAndDistances { indices, distances })
    } else {
        let indices: Result<Vec<Vec<usize>>, BallTreeError> = (0..n_samples)
            .into_par_iter()
            .map(|i| {
                let query_vec: Vec<T> = query_mat.row(i).iter().cloned().collect();
                let neighbours = index.query_radius(&query_vec, radius_for(i))?;

                if verbose {
                    progress(counter.fetch_add(1, Ordering::Relaxed) + 1);
                }

                Ok(neighbours)
            })
            .collect();

        Ok(RadiusSearchResult::Indices(indices?))
    }
}

///////////
// Tests //
///////////
