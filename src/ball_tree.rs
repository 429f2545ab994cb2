use faer::{MatRef, RowRef};

use crate::dist::*;
use crate::error::*;
use crate::utils::tree_utils::*;
use crate::utils::*;

use crate::utils::heap_structs::NeighbourBuffer;
use crate::utils::traits::TreeFloat;

/////////////
// Helpers //
/////////////

/// Calculate the radius of a node's ball
///
/// Scans the node's rows in reduced form and converts the maximum once.
///
/// ### Params
///
/// * `centroid` - The centre of the ball
/// * `data` - The flat data vector
/// * `dim` - Dimensionality of the data
/// * `idx` - Row indices belonging to the node
/// * `metric` - The distance metric
///
/// ### Returns
///
/// The true-metric distance from the centroid to the furthest row.
fn node_radius<T>(centroid: &[T], data: &[T], dim: usize, idx: &[u32], metric: Metric) -> T
where
    T: TreeFloat,
{
    let mut max_rdist = T::zero();

    for &i in idx {
        let row = &data[i as usize * dim..(i as usize + 1) * dim];
        let rdist = minkowski_rdist(centroid, row, metric);
        if rdist > max_rdist {
            max_rdist = rdist;
        }
    }

    rdist_to_dist(max_rdist, metric)
}

////////////////
// Main types //
////////////////

/// Per-node record of the flattened tree
///
/// One record per slot of the implicit heap. `[idx_start, idx_end)` is the
/// node's slice of the index permutation; `is_leaf` is 1 for leaves (and for
/// the empty placeholder slots below them), 0 for split nodes. The layout is
/// `#[repr(C)]`, so the record array can be dumped as-is alongside the
/// permutation and centroid blobs.
///
/// ### Fields
///
/// * `idx_start` - First slot of the node's slice in the permutation
/// * `idx_end` - One past the last slot
/// * `is_leaf` - 1 for leaf, 0 for split node
/// * `radius` - True-metric radius of the node's ball
#[derive(Clone, Copy, Debug, PartialEq)]
#[repr(C)]
pub struct NodeInfo<T> {
    pub idx_start: u32,
    pub idx_end: u32,
    pub is_leaf: u32,
    pub radius: T,
}

///////////////////
// BallTreeIndex //
///////////////////

/// Static ball tree for exact neighbour search under a Minkowski metric
///
/// The tree is laid out as an implicit binary heap over three parallel
/// arrays: an index permutation whose contiguous slices are the nodes'
/// point sets, a flat centroid matrix and a node-record array. Children of
/// node `i` sit at `2i + 1` and `2i + 2`; no pointers are stored. The index
/// is immutable after construction, so concurrent queries against a shared
/// reference need no synchronisation; every query owns its scratch.
///
/// ### Fields
///
/// * `vectors_flat` - Original vector data, flattened for cache locality
/// * `dim` - Embedding dimensions
/// * `n` - Number of vectors
/// * `metric` - The Minkowski metric the tree was built for
/// * `leaf_size` - Maximum points per leaf
/// * `idx` - Permutation of `0..n`; nodes own contiguous slices
/// * `centroids_flat` - Node centroids (n_nodes * dim elements)
/// * `node_info` - Per-node slice bounds, leaf flag and radius
pub struct BallTreeIndex<T> {
    // Shared data
    pub vectors_flat: Vec<T>,
    pub dim: usize,
    pub n: usize,
    // Index-specific data
    metric: Metric,
    leaf_size: usize,
    idx: Vec<u32>,
    centroids_flat: Vec<T>,
    node_info: Vec<NodeInfo<T>>,
}

///////////////////////
// MinkowskiDistance //
///////////////////////

impl<T> MinkowskiDistance<T> for BallTreeIndex<T>
where
    T: TreeFloat,
{
    fn vectors_flat(&self) -> &[T] {
        &self.vectors_flat
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn metric(&self) -> Metric {
        self.metric
    }
}

impl<T> BallTreeIndex<T>
where
    T: TreeFloat,
{
    //////////////////////
    // Index generation //
    //////////////////////

    /// Build a new BallTreeIndex
    ///
    /// Single breadth-first sweep over the node slots: each split node finds
    /// its widest-spread axis and median-partitions its slice in place, with
    /// the bigger half going left. That rule keeps every leaf inside the
    /// bottom half of the heap, which the node budget relies on.
    ///
    /// ### Params
    ///
    /// * `data` - Data matrix (rows = samples, columns = dimensions)
    /// * `leaf_size` - Maximum points per leaf; must be at least 1
    /// * `metric` - The Minkowski metric to index for
    ///
    /// ### Returns
    ///
    /// Index ready for querying, or the construction error.
    pub fn new(data: MatRef<T>, leaf_size: usize, metric: Metric) -> Result<Self, BallTreeError> {
        let nrows = data.nrows();
        let ncols = data.ncols();
        if nrows == 0 || ncols == 0 {
            return Err(BallTreeError::InvalidShape { nrows, ncols });
        }
        if leaf_size == 0 {
            return Err(BallTreeError::InvalidParameter {
                name: "leaf_size",
                value: 0.0,
                reason: "must be at least 1",
            });
        }
        if metric.p().is_nan() || metric.p() < 1.0 {
            return Err(BallTreeError::InvalidParameter {
                name: "p",
                value: metric.p(),
                reason: "Minkowski exponent must be at least 1",
            });
        }

        let (vectors_flat, n, dim) = matrix_to_flat(data);
        let n_nodes = node_count_bound(n, leaf_size);

        let mut idx: Vec<u32> = (0..n as u32).collect();
        let mut centroids_flat = vec![T::zero(); n_nodes * dim];
        let mut node_info = vec![
            NodeInfo {
                idx_start: 0,
                idx_end: 0,
                is_leaf: 1,
                radius: T::zero(),
            };
            n_nodes
        ];

        for node in 0..n_nodes {
            let (start, end) = if node == 0 {
                (0u32, n as u32)
            } else {
                let parent = node_info[(node - 1) / 2];
                if parent.is_leaf == 1 {
                    // placeholder slot below a leaf; never traversed
                    node_info[node] = NodeInfo {
                        idx_start: parent.idx_end,
                        idx_end: parent.idx_end,
                        is_leaf: 1,
                        radius: T::zero(),
                    };
                    continue;
                }
                let span = parent.idx_end - parent.idx_start;
                let mid = parent.idx_start + span.div_ceil(2);
                if node % 2 == 1 {
                    (parent.idx_start, mid)
                } else {
                    (mid, parent.idx_end)
                }
            };

            let slice = &idx[start as usize..end as usize];
            let centroid = node_centroid(&vectors_flat, dim, slice);
            let radius = node_radius(&centroid, &vectors_flat, dim, slice, metric);
            centroids_flat[node * dim..(node + 1) * dim].copy_from_slice(&centroid);

            let n_points = (end - start) as usize;
            if n_points <= leaf_size {
                node_info[node] = NodeInfo {
                    idx_start: start,
                    idx_end: end,
                    is_leaf: 1,
                    radius,
                };
            } else {
                let axis = max_spread_axis(&vectors_flat, dim, slice);
                partition_around_median(
                    &vectors_flat,
                    dim,
                    axis,
                    &mut idx[start as usize..end as usize],
                    n_points / 2,
                );
                node_info[node] = NodeInfo {
                    idx_start: start,
                    idx_end: end,
                    is_leaf: 0,
                    radius,
                };
            }
        }

        // every slot past the last splittable level must have come out a
        // leaf; anything else means the node budget was miscomputed
        for (node, info) in node_info.iter().enumerate().skip((n_nodes - 1) / 2) {
            if info.is_leaf == 0 {
                return Err(BallTreeError::InternalOverflow {
                    node,
                    n_points: (info.idx_end - info.idx_start) as usize,
                });
            }
        }

        Ok(BallTreeIndex {
            vectors_flat,
            dim,
            n,
            metric,
            leaf_size,
            idx,
            centroids_flat,
            node_info,
        })
    }

    ///////////////
    // kNN query //
    ///////////////

    /// Query the index for the k nearest neighbours
    ///
    /// Best-first branch-and-bound over an explicit stack: children are
    /// pushed so the one with the smaller lower bound is expanded first, and
    /// a node is skipped once its bound cannot beat the current k-th
    /// distance. All comparisons run on reduced distances; conversion to the
    /// true metric happens once on exit.
    ///
    /// ### Params
    ///
    /// * `query_vec` - The vector to query against
    /// * `k` - Number of neighbours to return, `1 <= k <= n`
    ///
    /// ### Returns
    ///
    /// A tuple of `(indices, true distances)`, ascending by distance.
    pub fn query(&self, query_vec: &[T], k: usize) -> Result<(Vec<usize>, Vec<T>), BallTreeError> {
        if query_vec.len() != self.dim {
            return Err(BallTreeError::ShapeMismatch {
                expected: self.dim,
                got: query_vec.len(),
                context: "query vector",
            });
        }
        if k == 0 || k > self.n {
            return Err(BallTreeError::KOutOfRange { k, n: self.n });
        }

        let mut buffer = NeighbourBuffer::new(k);
        let mut stack: Vec<(u32, T)> = Vec::with_capacity(self.node_info.len());
        stack.push((0, self.reduced_lower_bound(0, query_vec)));

        while let Some((node, lower_bound)) = stack.pop() {
            if lower_bound >= buffer.worst() {
                continue;
            }

            let info = unsafe { *self.node_info.get_unchecked(node as usize) };

            if info.is_leaf == 1 {
                let start = info.idx_start as usize;
                let end = info.idx_end as usize;
                let members = unsafe { self.idx.get_unchecked(start..end) };

                for &point in members {
                    let rdist = self.rdist_to_query(point as usize, query_vec);
                    buffer.insert(rdist, point);
                }
            } else {
                let left = 2 * node + 1;
                let right = left + 1;
                let lb_left = self.reduced_lower_bound(left, query_vec);
                let lb_right = self.reduced_lower_bound(right, query_vec);

                // LIFO: push the farther child first so the nearer one is
                // expanded next; ties go to the left child
                if lb_left <= lb_right {
                    stack.push((right, lb_right));
                    stack.push((left, lb_left));
                } else {
                    stack.push((left, lb_left));
                    stack.push((right, lb_right));
                }
            }
        }

        let (indices, distances) = buffer
            .data()
            .iter()
            .map(|&(rdist, point)| (point as usize, rdist_to_dist(rdist, self.metric)))
            .unzip();

        Ok((indices, distances))
    }

    /// Query the index with row references
    ///
    /// Uses an optimised (unsafe) path if possible; if not, creates deep copy
    ///
    /// ### Params
    ///
    /// * `query_row` - The row to query
    /// * `k` - Number of neighbours to return
    ///
    /// ### Returns
    ///
    /// A tuple of `(indices, true distances)`, ascending by distance.
    #[inline]
    pub fn query_row(
        &self,
        query_row: RowRef<T>,
        k: usize,
    ) -> Result<(Vec<usize>, Vec<T>), BallTreeError> {
        if query_row.col_stride() == 1 {
            let slice =
                unsafe { std::slice::from_raw_parts(query_row.as_ptr(), query_row.ncols()) };
            return self.query(slice, k);
        }

        let query_vec: Vec<T> = query_row.iter().cloned().collect();
        self.query(&query_vec, k)
    }

    ////////////////////
    // Radius queries //
    ////////////////////

    /// All neighbours within a radius
    ///
    /// Triangle-inequality pruning on the centroid distance: a node entirely
    /// outside the radius is skipped, a node entirely inside admits its
    /// whole slice without per-point distance work, and only boundary leaves
    /// are scanned point by point.
    ///
    /// ### Params
    ///
    /// * `query_vec` - The vector to query against
    /// * `radius` - Inclusive true-metric radius, non-negative
    ///
    /// ### Returns
    ///
    /// The indices of all points within `radius` (unsorted).
    pub fn query_radius(&self, query_vec: &[T], radius: T) -> Result<Vec<usize>, BallTreeError> {
        self.validate_radius_query(query_vec, radius)?;
        let reduced_radius = dist_to_rdist(radius, self.metric);

        let mut neighbours = Vec::new();
        let mut stack: Vec<u32> = Vec::with_capacity(self.node_info.len());
        stack.push(0);

        while let Some(node) = stack.pop() {
            let info = unsafe { *self.node_info.get_unchecked(node as usize) };
            let (lower, upper) = self.centroid_bounds(node, query_vec);

            if lower > radius {
                continue;
            }

            let start = info.idx_start as usize;
            let end = info.idx_end as usize;

            if upper < radius {
                neighbours.extend(self.idx[start..end].iter().map(|&point| point as usize));
            } else if info.is_leaf == 1 {
                for &point in &self.idx[start..end] {
                    if self.rdist_to_query(point as usize, query_vec) <= reduced_radius {
                        neighbours.push(point as usize);
                    }
                }
            } else {
                stack.push(2 * node + 1);
                stack.push(2 * node + 2);
            }
        }

        Ok(neighbours)
    }

    /// All neighbours within a radius, with their distances
    ///
    /// Same traversal as [`Self::query_radius`]. Points admitted wholesale
    /// through the containment shortcut still get an individual distance
    /// computation, so the output is uniform across both admission paths.
    ///
    /// ### Params
    ///
    /// * `query_vec` - The vector to query against
    /// * `radius` - Inclusive true-metric radius, non-negative
    ///
    /// ### Returns
    ///
    /// A tuple of `(indices, true distances)`, parallel and unsorted.
    pub fn query_radius_with_dist(
        &self,
        query_vec: &[T],
        radius: T,
    ) -> Result<(Vec<usize>, Vec<T>), BallTreeError> {
        self.validate_radius_query(query_vec, radius)?;
        let reduced_radius = dist_to_rdist(radius, self.metric);

        let mut neighbours = Vec::new();
        let mut distances = Vec::new();
        let mut stack: Vec<u32> = Vec::with_capacity(self.node_info.len());
        stack.push(0);

        while let Some(node) = stack.pop() {
            let info = unsafe { *self.node_info.get_unchecked(node as usize) };
            let (lower, upper) = self.centroid_bounds(node, query_vec);

            if lower > radius {
                continue;
            }

            let start = info.idx_start as usize;
            let end = info.idx_end as usize;

            if upper < radius {
                for &point in &self.idx[start..end] {
                    neighbours.push(point as usize);
                    distances.push(self.dist_to_query(point as usize, query_vec));
                }
            } else if info.is_leaf == 1 {
                for &point in &self.idx[start..end] {
                    let rdist = self.rdist_to_query(point as usize, query_vec);
                    if rdist <= reduced_radius {
                        neighbours.push(point as usize);
                        distances.push(rdist_to_dist(rdist, self.metric));
                    }
                }
            } else {
                stack.push(2 * node + 1);
                stack.push(2 * node + 2);
            }
        }

        Ok((neighbours, distances))
    }

    /// Count the neighbours within a radius
    ///
    /// Same traversal as [`Self::query_radius`]; nodes admitted through the
    /// containment shortcut contribute their slice length without touching
    /// any point.
    ///
    /// ### Params
    ///
    /// * `query_vec` - The vector to query against
    /// * `radius` - Inclusive true-metric radius, non-negative
    ///
    /// ### Returns
    ///
    /// The number of points within `radius`.
    pub fn query_radius_count(&self, query_vec: &[T], radius: T) -> Result<usize, BallTreeError> {
        self.validate_radius_query(query_vec, radius)?;
        let reduced_radius = dist_to_rdist(radius, self.metric);

        let mut count = 0;
        let mut stack: Vec<u32> = Vec::with_capacity(self.node_info.len());
        stack.push(0);

        while let Some(node) = stack.pop() {
            let info = unsafe { *self.node_info.get_unchecked(node as usize) };
            let (lower, upper) = self.centroid_bounds(node, query_vec);

            if lower > radius {
                continue;
            }

            if upper < radius {
                count += (info.idx_end - info.idx_start) as usize;
            } else if info.is_leaf == 1 {
                for &point in &self.idx[info.idx_start as usize..info.idx_end as usize] {
                    if self.rdist_to_query(point as usize, query_vec) <= reduced_radius {
                        count += 1;
                    }
                }
            } else {
                stack.push(2 * node + 1);
                stack.push(2 * node + 2);
            }
        }

        Ok(count)
    }

    /////////////
    // Helpers //
    /////////////

    /// Reduced lower bound on the distance from the query to any point of a
    /// node: `rho(max(0, d(q, centroid) - radius))`
    #[inline(always)]
    fn reduced_lower_bound(&self, node: u32, query_vec: &[T]) -> T {
        let start = node as usize * self.dim;
        let centroid = unsafe { self.centroids_flat.get_unchecked(start..start + self.dim) };
        let info = unsafe { self.node_info.get_unchecked(node as usize) };

        let dist_c = minkowski_dist(query_vec, centroid, self.metric);
        let lower = (dist_c - info.radius).max(T::zero());
        dist_to_rdist(lower, self.metric)
    }

    /// True-metric `(d(q, centroid) - radius, d(q, centroid) + radius)` for
    /// the all-out / all-in radius tests
    #[inline(always)]
    fn centroid_bounds(&self, node: u32, query_vec: &[T]) -> (T, T) {
        let start = node as usize * self.dim;
        let centroid = unsafe { self.centroids_flat.get_unchecked(start..start + self.dim) };
        let info = unsafe { self.node_info.get_unchecked(node as usize) };

        let dist_c = minkowski_dist(query_vec, centroid, self.metric);
        (dist_c - info.radius, dist_c + info.radius)
    }

    /// Shared validation for the radius query family
    fn validate_radius_query(&self, query_vec: &[T], radius: T) -> Result<(), BallTreeError> {
        if query_vec.len() != self.dim {
            return Err(BallTreeError::ShapeMismatch {
                expected: self.dim,
                got: query_vec.len(),
                context: "query vector",
            });
        }
        if radius < T::zero() {
            return Err(BallTreeError::InvalidParameter {
                name: "radius",
                value: radius.to_f64().unwrap_or(f64::NAN),
                reason: "must be non-negative",
            });
        }
        Ok(())
    }

    ///////////////
    // Accessors //
    ///////////////

    /// Number of slots in the implicit heap
    pub fn n_nodes(&self) -> usize {
        self.node_info.len()
    }

    /// Maximum points per leaf the tree was built with
    pub fn leaf_size(&self) -> usize {
        self.leaf_size
    }

    /// The index permutation; nodes own contiguous slices of it
    pub fn index_permutation(&self) -> &[u32] {
        &self.idx
    }

    /// Flat node-centroid matrix (n_nodes * dim elements)
    pub fn node_centroids(&self) -> &[T] {
        &self.centroids_flat
    }

    /// The per-node records
    pub fn node_records(&self) -> &[NodeInfo<T>] {
        &self.node_info
    }

    /// Returns the size of the index in bytes
    ///
    /// ### Returns
    ///
    /// Number of bytes used by the index
    pub fn memory_usage_bytes(&self) -> usize {
        std::mem::size_of_val(self)
            + self.vectors_flat.capacity() * std::mem::size_of::<T>()
            + self.idx.capacity() * std::mem::size_of::<u32>()
            + self.centroids_flat.capacity() * std::mem::size_of::<T>()
            + self.node_info.capacity() * std::mem::size_of::<NodeInfo<T>>()
    }
}

///////////
// Tests //
///////////

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use faer::Mat;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_matrix(n: usize, dim: usize, seed: u64) -> Mat<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut data = Mat::<f64>::zeros(n, dim);
        for i in 0..n {
            for j in 0..dim {
                data[(i, j)] = rng.random_range(-1.0..1.0);
            }
        }
        data
    }

    fn uniform_matrix(n: usize, dim: usize, seed: u64) -> Mat<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut data = Mat::<f64>::zeros(n, dim);
        for i in 0..n {
            for j in 0..dim {
                data[(i, j)] = rng.random_range(0.0..1.0);
            }
        }
        data
    }

    #[test]
    fn test_single_point() {
        let data = Mat::from_fn(1, 2, |_, _| 0.0);
        let index = BallTreeIndex::new(data.as_ref(), 20, Metric::Euclidean).unwrap();

        let (indices, distances) = index.query(&[1.0, 1.0], 1).unwrap();
        assert_eq!(indices, vec![0]);
        assert_relative_eq!(distances[0], 2.0_f64.sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn test_colocated_duplicates() {
        let data = Mat::from_fn(5, 1, |_, _| 0.0);
        let index = BallTreeIndex::new(data.as_ref(), 2, Metric::Euclidean).unwrap();

        let (indices, distances) = index.query(&[0.0], 3).unwrap();
        assert_eq!(indices.len(), 3);
        for &i in &indices {
            assert!(i < 5);
        }
        for &d in &distances {
            assert_relative_eq!(d, 0.0);
        }
    }

    #[test]
    fn test_chebyshev_nearest() {
        let rows = [[0.0, 0.0], [3.0, 0.0], [0.0, 4.0], [3.0, 4.0]];
        let data = Mat::from_fn(4, 2, |i, j| rows[i][j]);
        let index = BallTreeIndex::new(data.as_ref(), 1, Metric::Chebyshev).unwrap();

        let (indices, distances) = index.query(&[1.0, 1.0], 1).unwrap();
        assert_eq!(indices, vec![0]);
        assert_relative_eq!(distances[0], 1.0);
    }

    #[test]
    fn test_manhattan_nearest() {
        let rows = [[0.0, 0.0], [2.0, 0.0], [0.0, 3.0]];
        let data = Mat::from_fn(3, 2, |i, j| rows[i][j]);
        let index = BallTreeIndex::new(data.as_ref(), 1, Metric::Manhattan).unwrap();

        let (indices, distances) = index.query(&[1.0, 0.0], 2).unwrap();
        let mut sorted = indices.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, vec![0, 1]);
        assert_relative_eq!(distances[0], 1.0);
        assert_relative_eq!(distances[1], 1.0);
    }

    #[test]
    fn test_query_finds_self() {
        let data = random_matrix(40, 3, 7);
        let index = BallTreeIndex::new(data.as_ref(), 4, Metric::Euclidean).unwrap();

        for i in [0usize, 13, 39] {
            let query: Vec<f64> = data.row(i).iter().cloned().collect();
            let (indices, distances) = index.query(&query, 1).unwrap();
            assert_eq!(indices[0], i);
            assert_relative_eq!(distances[0], 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_knn_matches_exhaustive() {
        for p in [1.0, 2.0, 3.0, f64::INFINITY] {
            let metric = Metric::new(p).unwrap();
            for seed in 0..3 {
                let n = 30 + 5 * seed as usize;
                let data = random_matrix(n, 3, seed);
                let index = BallTreeIndex::new(data.as_ref(), 4, metric).unwrap();

                for (query_seed, k) in [(100, 1), (101, 5), (102, 9)] {
                    let query_mat = random_matrix(1, 3, query_seed + seed);
                    let query: Vec<f64> = query_mat.row(0).iter().cloned().collect();

                    let (mut indices, mut distances) = index.query(&query, k).unwrap();
                    let (mut expected_idx, mut expected_dist) =
                        exhaustive_knn(&index.vectors_flat, 3, metric, &query, k).unwrap();

                    indices.sort_unstable();
                    expected_idx.sort_unstable();
                    assert_eq!(indices, expected_idx, "p = {p}, seed = {seed}, k = {k}");

                    distances.sort_by(|a, b| a.partial_cmp(b).unwrap());
                    expected_dist.sort_by(|a, b| a.partial_cmp(b).unwrap());
                    for (&d, &e) in distances.iter().zip(expected_dist.iter()) {
                        assert_relative_eq!(d, e, epsilon = 1e-12, max_relative = 1e-9);
                    }
                }
            }
        }
    }

    #[test]
    fn test_knn_distances_are_true_metric() {
        // reduced distances must be converted before they leave the query
        let rows = [[0.0, 0.0], [1.0, 1.0]];
        let data = Mat::from_fn(2, 2, |i, j| rows[i][j]);

        let index = BallTreeIndex::new(data.as_ref(), 1, Metric::Euclidean).unwrap();
        let (_, distances) = index.query(&[1.0, 1.0], 2).unwrap();
        assert_relative_eq!(distances[0], 0.0);
        assert_relative_eq!(distances[1], 2.0_f64.sqrt(), epsilon = 1e-12);

        let index = BallTreeIndex::new(data.as_ref(), 1, Metric::Minkowski(3.0)).unwrap();
        let (_, distances) = index.query(&[0.0, 0.0], 2).unwrap();
        assert_relative_eq!(distances[1], 2.0_f64.powf(1.0 / 3.0), epsilon = 1e-12);
    }

    #[test]
    fn test_knn_k_equals_n() {
        let data = random_matrix(25, 2, 3);
        let index = BallTreeIndex::new(data.as_ref(), 4, Metric::Euclidean).unwrap();

        let (indices, distances) = index.query(&[0.0, 0.0], 25).unwrap();
        assert_eq!(indices.len(), 25);
        let mut sorted = indices.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..25).collect::<Vec<_>>());
        for pair in distances.windows(2) {
            assert!(pair[0] <= pair[1]);
        }
    }

    #[test]
    fn test_leaf_size_invariance() {
        let data = random_matrix(50, 3, 11);
        let query_mat = random_matrix(1, 3, 99);
        let query: Vec<f64> = query_mat.row(0).iter().cloned().collect();

        let mut reference: Option<Vec<usize>> = None;
        for leaf_size in [1, 5, 20, 100] {
            let index = BallTreeIndex::new(data.as_ref(), leaf_size, Metric::Euclidean).unwrap();
            let (mut indices, _) = index.query(&query, 5).unwrap();
            indices.sort_unstable();

            match &reference {
                None => reference = Some(indices),
                Some(expected) => assert_eq!(&indices, expected, "leaf_size = {leaf_size}"),
            }
        }
    }

    #[test]
    fn test_radius_all_in() {
        let data = uniform_matrix(100, 2, 42);
        let index = BallTreeIndex::new(data.as_ref(), 5, Metric::Euclidean).unwrap();

        // radius 10 swallows the unit square: the containment shortcut fires
        // at the root
        let count = index.query_radius_count(&[0.5, 0.5], 10.0).unwrap();
        assert_eq!(count, 100);

        let indices = index.query_radius(&[0.5, 0.5], 10.0).unwrap();
        assert_eq!(indices.len(), 100);
        let mut sorted = indices;
        sorted.sort_unstable();
        assert_eq!(sorted, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_radius_empty_result() {
        let data = uniform_matrix(100, 2, 42);
        let index = BallTreeIndex::new(data.as_ref(), 5, Metric::Euclidean).unwrap();

        let indices = index.query_radius(&[100.0, 100.0], 0.1).unwrap();
        assert!(indices.is_empty());
        assert_eq!(index.query_radius_count(&[100.0, 100.0], 0.1).unwrap(), 0);
    }

    #[test]
    fn test_radius_matches_exhaustive() {
        for p in [1.0, 2.0, f64::INFINITY] {
            let metric = Metric::new(p).unwrap();
            let data = uniform_matrix(60, 2, 5);
            let index = BallTreeIndex::new(data.as_ref(), 4, metric).unwrap();

            for radius in [0.1, 0.3, 0.7] {
                let query = [0.4, 0.6];
                let mut indices = index.query_radius(&query, radius).unwrap();
                indices.sort_unstable();

                let expected =
                    exhaustive_radius(&index.vectors_flat, 2, metric, &query, radius).unwrap();
                assert_eq!(indices, expected, "p = {p}, radius = {radius}");

                let count = index.query_radius_count(&query, radius).unwrap();
                assert_eq!(count, expected.len());
            }
        }
    }

    #[test]
    fn test_radius_with_dist_matches_direct_distances() {
        let data = uniform_matrix(80, 3, 17);
        let index = BallTreeIndex::new(data.as_ref(), 4, Metric::Euclidean).unwrap();

        let query = [0.5, 0.5, 0.5];
        // big enough that whole subtrees fall inside and still get distances
        let (indices, distances) = index.query_radius_with_dist(&query, 2.0).unwrap();
        assert_eq!(indices.len(), 80);
        assert_eq!(distances.len(), 80);

        for (&i, &d) in indices.iter().zip(distances.iter()) {
            let row = &index.vectors_flat[i * 3..(i + 1) * 3];
            assert_relative_eq!(d, minkowski_dist(row, &query, Metric::Euclidean));
        }
    }

    #[test]
    fn test_radius_zero_catches_exact_points() {
        let data = random_matrix(30, 2, 23);
        let index = BallTreeIndex::new(data.as_ref(), 4, Metric::Euclidean).unwrap();

        let query: Vec<f64> = data.row(12).iter().cloned().collect();
        let indices = index.query_radius(&query, 0.0).unwrap();
        assert_eq!(indices, vec![12]);
    }

    #[test]
    fn test_construction_invariants() {
        for leaf_size in [1, 3, 10] {
            let n = 53;
            let data = random_matrix(n, 4, 31);
            let index = BallTreeIndex::new(data.as_ref(), leaf_size, Metric::Euclidean).unwrap();

            assert!(is_permutation(index.index_permutation(), n));

            let n_nodes = index.n_nodes();
            let records = index.node_records();
            let centroids = index.node_centroids();

            // root covers everything
            assert_eq!(records[0].idx_start, 0);
            assert_eq!(records[0].idx_end, n as u32);

            for (node, info) in records.iter().enumerate() {
                // every point sits inside its node's ball
                for &point in
                    &index.index_permutation()[info.idx_start as usize..info.idx_end as usize]
                {
                    let row = &index.vectors_flat[point as usize * 4..(point as usize + 1) * 4];
                    let centroid = &centroids[node * 4..(node + 1) * 4];
                    let dist = minkowski_dist(row, centroid, Metric::Euclidean);
                    assert!(dist <= info.radius * (1.0 + 1e-9) + 1e-12);
                }

                // children halve their parent, bigger half to the left
                if info.is_leaf == 0 {
                    let span = info.idx_end - info.idx_start;
                    let mid = info.idx_start + span.div_ceil(2);
                    let left = &records[2 * node + 1];
                    let right = &records[2 * node + 2];

                    assert_eq!(left.idx_start, info.idx_start);
                    assert_eq!(left.idx_end, mid);
                    assert_eq!(right.idx_start, mid);
                    assert_eq!(right.idx_end, info.idx_end);

                    let left_span = left.idx_end - left.idx_start;
                    let right_span = right.idx_end - right.idx_start;
                    assert!(left_span == right_span || left_span == right_span + 1);
                } else {
                    assert!((info.idx_end - info.idx_start) as usize <= leaf_size);
                }
            }

            // everything past the last splittable level is a leaf
            for info in records.iter().skip((n_nodes - 1) / 2) {
                assert_eq!(info.is_leaf, 1);
            }
        }
    }

    #[test]
    fn test_queries_are_pure() {
        let data = random_matrix(40, 3, 13);
        let index = BallTreeIndex::new(data.as_ref(), 4, Metric::Euclidean).unwrap();

        let idx_before = index.index_permutation().to_vec();
        let centroids_before = index.node_centroids().to_vec();
        let records_before = index.node_records().to_vec();

        let query = [0.1, -0.2, 0.3];
        let first = index.query(&query, 5).unwrap();
        let second = index.query(&query, 5).unwrap();
        assert_eq!(first, second);

        let radius_first = index.query_radius(&query, 0.5).unwrap();
        let radius_second = index.query_radius(&query, 0.5).unwrap();
        assert_eq!(radius_first, radius_second);

        assert_eq!(index.index_permutation(), idx_before.as_slice());
        assert_eq!(index.node_centroids(), centroids_before.as_slice());
        assert_eq!(index.node_records(), records_before.as_slice());
    }

    #[test]
    fn test_query_row() {
        let data = random_matrix(20, 3, 19);
        let index = BallTreeIndex::new(data.as_ref(), 4, Metric::Euclidean).unwrap();

        let (indices, distances) = index.query_row(data.row(7), 1).unwrap();
        assert_eq!(indices[0], 7);
        assert_relative_eq!(distances[0], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_rejects_empty_data() {
        let data = Mat::<f64>::zeros(0, 2);
        let result = BallTreeIndex::new(data.as_ref(), 20, Metric::Euclidean);
        assert_eq!(
            result.err(),
            Some(BallTreeError::InvalidShape { nrows: 0, ncols: 2 })
        );
    }

    #[test]
    fn test_rejects_bad_parameters() {
        let data = Mat::from_fn(3, 2, |i, j| (i + j) as f64);

        let result = BallTreeIndex::new(data.as_ref(), 0, Metric::Euclidean);
        assert!(matches!(
            result.err(),
            Some(BallTreeError::InvalidParameter { name: "leaf_size", .. })
        ));

        // a hand-rolled exponent below 1 must not slip past construction
        let result = BallTreeIndex::new(data.as_ref(), 20, Metric::Minkowski(0.5));
        assert!(matches!(
            result.err(),
            Some(BallTreeError::InvalidParameter { name: "p", .. })
        ));
    }

    #[test]
    fn test_rejects_bad_queries() {
        let data = Mat::from_fn(3, 2, |i, j| (i + j) as f64);
        let index = BallTreeIndex::new(data.as_ref(), 20, Metric::Euclidean).unwrap();

        assert!(matches!(
            index.query(&[0.0, 0.0, 0.0], 1).err(),
            Some(BallTreeError::ShapeMismatch { expected: 2, got: 3, .. })
        ));
        assert_eq!(
            index.query(&[0.0, 0.0], 0).err(),
            Some(BallTreeError::KOutOfRange { k: 0, n: 3 })
        );
        assert_eq!(
            index.query(&[0.0, 0.0], 4).err(),
            Some(BallTreeError::KOutOfRange { k: 4, n: 3 })
        );
        assert!(matches!(
            index.query_radius(&[0.0, 0.0], -1.0).err(),
            Some(BallTreeError::InvalidParameter { name: "radius", .. })
        ));
    }

    #[test]
    fn test_memory_usage_reported() {
        let data = random_matrix(64, 4, 3);
        let index = BallTreeIndex::new(data.as_ref(), 8, Metric::Euclidean).unwrap();

        // at minimum the data and centroid arrays
        assert!(index.memory_usage_bytes() > 64 * 4 * std::mem::size_of::<f64>());
    }
}
