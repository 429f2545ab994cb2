use faer::traits::ComplexField;
use faer::Mat;
use num_traits::{Float, FromPrimitive};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

/// Generate synthetic data with cluster structure
///
/// Draws points around well-separated Gaussian centres, which gives a ball
/// tree realistic, unevenly filled nodes.
///
/// ### Params
///
/// * `n_samples` - Number of points
/// * `dim` - Dimensionality
/// * `n_clusters` - Number of distinct clusters
/// * `cluster_std` - Standard deviation within clusters
/// * `seed` - Random seed for reproducibility
///
/// ### Returns
///
/// Matrix of shape (n_samples, dim)
pub fn generate_clustered_data<T>(
    n_samples: usize,
    dim: usize,
    n_clusters: usize,
    cluster_std: f64,
    seed: u64,
) -> Mat<T>
where
    T: Float + FromPrimitive + ComplexField,
{
    let mut rng = StdRng::seed_from_u64(seed);
    let mut data = Mat::<T>::zeros(n_samples, dim);

    let mut centres = Vec::with_capacity(n_clusters);
    for _ in 0..n_clusters {
        let centre: Vec<f64> = (0..dim).map(|_| rng.random_range(-5.0..5.0)).collect();
        centres.push(centre);
    }

    // spread the cluster labels evenly, then shuffle so the row order does
    // not encode the cluster structure
    let base_size = n_samples / n_clusters;
    let remainder = n_samples % n_clusters;

    let mut assignments = Vec::with_capacity(n_samples);
    for cluster in 0..n_clusters {
        let n_in_cluster = base_size + if cluster < remainder { 1 } else { 0 };
        assignments.extend(vec![cluster; n_in_cluster]);
    }
    assignments.shuffle(&mut rng);

    for (i, &cluster) in assignments.iter().enumerate() {
        let centre = &centres[cluster];

        for j in 0..dim {
            // Box-Muller for Gaussian noise
            let u1: f64 = rng.random();
            let u2: f64 = rng.random();
            let noise = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();

            data[(i, j)] = T::from_f64(centre[j] + noise * cluster_std).unwrap();
        }
    }

    data
}

/// Generate points uniformly over a hypercube
///
/// ### Params
///
/// * `n_samples` - Number of points
/// * `dim` - Dimensionality
/// * `lower` - Lower bound of every coordinate
/// * `upper` - Upper bound of every coordinate
/// * `seed` - Random seed for reproducibility
///
/// ### Returns
///
/// Matrix of shape (n_samples, dim)
pub fn generate_uniform_data<T>(
    n_samples: usize,
    dim: usize,
    lower: f64,
    upper: f64,
    seed: u64,
) -> Mat<T>
where
    T: Float + FromPrimitive + ComplexField,
{
    let mut rng = StdRng::seed_from_u64(seed);
    let mut data = Mat::<T>::zeros(n_samples, dim);

    for i in 0..n_samples {
        for j in 0..dim {
            data[(i, j)] = T::from_f64(rng.random_range(lower..upper)).unwrap();
        }
    }

    data
}

///////////
// Tests //
///////////
