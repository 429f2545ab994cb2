use num_traits::{Float, FromPrimitive, ToPrimitive};
use std::iter::Sum;

/// Trait alias for the floating-point types the index works with. Bundles
/// the arithmetic, conversion and threading bounds needed throughout.
pub trait TreeFloat: Float + FromPrimitive + ToPrimitive + Send + Sync + Sum {}

impl<T> TreeFloat for T where T: Float + FromPrimitive + ToPrimitive + Send + Sync + Sum {}
