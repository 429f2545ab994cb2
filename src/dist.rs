use num_traits::Float;

////////////
// Metric //
////////////

/// The Minkowski metric family
///
/// `p = 1`, `p = 2` and `p = ∞` get dedicated variants so their kernels
/// avoid the generic `powf` path. `Metric::new` normalises those exponents,
/// so a `Minkowski(p)` produced through it always carries `1 < p < ∞`,
/// `p ≠ 2`.
#[derive(Clone, Debug, Copy, PartialEq, Default)]
pub enum Metric {
    /// p = 1, sum of absolute differences
    Manhattan,
    /// p = 2, the usual L2 distance
    #[default]
    Euclidean,
    /// p = ∞, maximum absolute difference
    Chebyshev,
    /// General exponent p
    Minkowski(f64),
}

impl Metric {
    /// Metric for a given Minkowski exponent
    ///
    /// ### Params
    ///
    /// * `p` - The exponent. Must be at least 1 (NaN is rejected);
    ///   `f64::INFINITY` selects the Chebyshev metric.
    ///
    /// ### Returns
    ///
    /// The metric, or `None` for an exponent outside `[1, ∞]`.
    pub fn new(p: f64) -> Option<Self> {
        if p.is_nan() || p < 1.0 {
            return None;
        }
        Some(if p == 1.0 {
            Metric::Manhattan
        } else if p == 2.0 {
            Metric::Euclidean
        } else if p.is_infinite() {
            Metric::Chebyshev
        } else {
            Metric::Minkowski(p)
        })
    }

    /// The Minkowski exponent of this metric
    pub fn p(&self) -> f64 {
        match self {
            Metric::Manhattan => 1.0,
            Metric::Euclidean => 2.0,
            Metric::Chebyshev => f64::INFINITY,
            Metric::Minkowski(p) => *p,
        }
    }
}

/// Parsing the distance metric
///
/// ### Params
///
/// * `s` - Metric name (`"manhattan"`/`"l1"`/`"cityblock"`,
///   `"euclidean"`/`"l2"`, `"chebyshev"`/`"linf"`/`"inf"`/`"infinity"`) or a
///   numeric Minkowski exponent such as `"3.5"`.
///
/// ### Returns
///
/// The `Metric`, or `None` if the name is unknown or the exponent invalid.
pub fn parse_metric(s: &str) -> Option<Metric> {
    match s.to_lowercase().as_str() {
        "manhattan" | "l1" | "cityblock" => Some(Metric::Manhattan),
        "euclidean" | "l2" => Some(Metric::Euclidean),
        "chebyshev" | "linf" | "inf" | "infinity" => Some(Metric::Chebyshev),
        other => other.parse::<f64>().ok().and_then(Metric::new),
    }
}

/////////////
// Kernels //
/////////////

/// Reduced Minkowski distance between two vectors
///
/// The reduced form is a monotone, cheaper surrogate of the true distance:
/// the squared distance for p = 2 and the sum before the outer root for
/// general p. For p = 1 and p = ∞ it coincides with the true distance.
/// All traversal comparisons run on reduced values; conversion to the true
/// metric happens once at the result boundary.
///
/// ### Implementation note
///
/// Uses iterator folds which LLVM auto-vectorises for the target CPU.
///
/// ### Params
///
/// * `a` - First vector
/// * `b` - Second vector
/// * `metric` - The distance metric
///
/// ### Returns
///
/// The reduced distance.
#[inline(always)]
pub fn minkowski_rdist<T: Float>(a: &[T], b: &[T], metric: Metric) -> T {
    match metric {
        Metric::Manhattan => a
            .iter()
            .zip(b.iter())
            .map(|(&x, &y)| (x - y).abs())
            .fold(T::zero(), |acc, v| acc + v),
        Metric::Euclidean => a
            .iter()
            .zip(b.iter())
            .map(|(&x, &y)| {
                let diff = x - y;
                diff * diff
            })
            .fold(T::zero(), |acc, v| acc + v),
        Metric::Chebyshev => a
            .iter()
            .zip(b.iter())
            .map(|(&x, &y)| (x - y).abs())
            .fold(T::zero(), |acc, v| if v > acc { v } else { acc }),
        Metric::Minkowski(p) => {
            let p = T::from(p).unwrap();
            a.iter()
                .zip(b.iter())
                .map(|(&x, &y)| (x - y).abs().powf(p))
                .fold(T::zero(), |acc, v| acc + v)
        }
    }
}

/// True Minkowski distance between two vectors
///
/// ### Params
///
/// * `a` - First vector
/// * `b` - Second vector
/// * `metric` - The distance metric
///
/// ### Returns
///
/// The true p-metric distance.
#[inline(always)]
pub fn minkowski_dist<T: Float>(a: &[T], b: &[T], metric: Metric) -> T {
    rdist_to_dist(minkowski_rdist(a, b, metric), metric)
}

/// Convert a reduced distance to the true distance
///
/// Inverse of [`dist_to_rdist`]; for any fixed metric both maps are
/// monotone over the non-negative reals, so reduced comparisons agree with
/// true-metric comparisons.
#[inline(always)]
pub fn rdist_to_dist<T: Float>(rdist: T, metric: Metric) -> T {
    match metric {
        Metric::Euclidean => rdist.sqrt(),
        Metric::Minkowski(p) => rdist.powf(T::one() / T::from(p).unwrap()),
        Metric::Manhattan | Metric::Chebyshev => rdist,
    }
}

/// Convert a true distance to the reduced distance
#[inline(always)]
pub fn dist_to_rdist<T: Float>(dist: T, metric: Metric) -> T {
    match metric {
        Metric::Euclidean => dist * dist,
        Metric::Minkowski(p) => dist.powf(T::from(p).unwrap()),
        Metric::Manhattan | Metric::Chebyshev => dist,
    }
}

///////////////////////
// MinkowskiDistance //
///////////////////////

/// Trait for types holding a flat row-major vector store with a fixed metric
pub trait MinkowskiDistance<T: Float> {
    /// Get the internal flat vector representation
    fn vectors_flat(&self) -> &[T];

    /// Get the internal dimensions
    fn dim(&self) -> usize;

    /// Get the metric the store was built for
    fn metric(&self) -> Metric;

    /// Reduced distance between an internal vector and a query vector
    ///
    /// ### Params
    ///
    /// * `internal_idx` - Row index of the internal vector
    /// * `query` - Query vector slice
    ///
    /// ### Safety
    ///
    /// Uses unchecked slicing of the internal store; `internal_idx` must be
    /// a valid row.
    ///
    /// ### Returns
    ///
    /// The reduced distance.
    #[inline(always)]
    fn rdist_to_query(&self, internal_idx: usize, query: &[T]) -> T {
        let start = internal_idx * self.dim();
        let vec = unsafe { self.vectors_flat().get_unchecked(start..start + self.dim()) };
        minkowski_rdist(vec, query, self.metric())
    }

    /// True distance between an internal vector and a query vector
    ///
    /// ### Params
    ///
    /// * `internal_idx` - Row index of the internal vector
    /// * `query` - Query vector slice
    ///
    /// ### Returns
    ///
    /// The true p-metric distance.
    #[inline(always)]
    fn dist_to_query(&self, internal_idx: usize, query: &[T]) -> T {
        rdist_to_dist(self.rdist_to_query(internal_idx, query), self.metric())
    }
}

///////////
// Tests //
///////////
