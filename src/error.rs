use thiserror::Error;

/// Errors surfaced at the construction and query boundaries
///
/// All failures are detected before any work on the index itself happens;
/// a query either returns its complete result or fails outright.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BallTreeError {
    /// The data matrix needs at least one sample and one feature
    #[error("invalid data shape ({nrows}, {ncols}): need at least one sample and one feature")]
    InvalidShape { nrows: usize, ncols: usize },

    /// A construction parameter is outside its valid range
    #[error("invalid parameter `{name}` = {value}: {reason}")]
    InvalidParameter {
        name: &'static str,
        value: f64,
        reason: &'static str,
    },

    /// A query-side array has the wrong length for this index
    #[error("{context}: expected length {expected}, got {got}")]
    ShapeMismatch {
        expected: usize,
        got: usize,
        context: &'static str,
    },

    /// `k` must satisfy `1 <= k <= n`
    #[error("k = {k} out of range for an index holding {n} samples")]
    KOutOfRange { k: usize, n: usize },

    /// `count_only` and `return_dist` cannot be combined
    #[error("`count_only` and `return_dist` are mutually exclusive")]
    ConflictingOptions,

    /// The node budget was insufficient; indicates a bug, not a user error
    #[error("node {node} holds {n_points} points past the last splittable level")]
    InternalOverflow { node: usize, n_points: usize },
}
