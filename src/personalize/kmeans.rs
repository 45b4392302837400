//! Seeded k-means over behavioral feature vectors.
//!
//! k-means++ initialization followed by Lloyd iteration to a fixed point,
//! with a hard iteration bound. Non-convergence within the bound is
//! best-effort, never an error.

use rand::rngs::StdRng;
use rand::Rng;

pub const FEATURE_DIMS: usize = 4;

pub type FeatureVector = [f64; FEATURE_DIMS];

#[derive(Debug, Clone)]
pub struct KmeansOutcome {
    /// Cluster index per input row, parallel to the feature slice.
    pub assignments: Vec<usize>,
    pub centroids: Vec<FeatureVector>,
    pub iterations: usize,
    pub converged: bool,
}

pub fn cluster(
    features: &[FeatureVector],
    k: usize,
    max_iterations: usize,
    rng: &mut StdRng,
) -> KmeansOutcome {
    if features.is_empty() || k == 0 {
        return KmeansOutcome {
            assignments: Vec::new(),
            centroids: Vec::new(),
            iterations: 0,
            converged: true,
        };
    }

    let k = k.min(features.len());
    let mut centroids = seed_centroids(features, k, rng);
    let mut assignments = vec![0usize; features.len()];
    let mut iterations = 0;
    let mut converged = false;

    for _ in 0..max_iterations.max(1) {
        iterations += 1;

        let mut changed = false;
        for (row, feature) in features.iter().enumerate() {
            let nearest = nearest_centroid(feature, &centroids);
            if assignments[row] != nearest {
                assignments[row] = nearest;
                changed = true;
            }
        }

        let mut sums = vec![[0.0; FEATURE_DIMS]; centroids.len()];
        let mut counts = vec![0usize; centroids.len()];
        for (row, feature) in features.iter().enumerate() {
            let cluster = assignments[row];
            counts[cluster] += 1;
            for (dim, value) in feature.iter().enumerate() {
                sums[cluster][dim] += value;
            }
        }
        for (cluster, centroid) in centroids.iter_mut().enumerate() {
            // An emptied centroid stays where it was.
            if counts[cluster] > 0 {
                for dim in 0..FEATURE_DIMS {
                    centroid[dim] = sums[cluster][dim] / counts[cluster] as f64;
                }
            }
        }

        if !changed {
            converged = true;
            break;
        }
    }

    KmeansOutcome {
        assignments,
        centroids,
        iterations,
        converged,
    }
}

/// k-means++: the first centroid is uniform, each further centroid is drawn
/// with probability proportional to squared distance from the chosen set.
fn seed_centroids(features: &[FeatureVector], k: usize, rng: &mut StdRng) -> Vec<FeatureVector> {
    let mut centroids = Vec::with_capacity(k);
    centroids.push(features[rng.random_range(0..features.len())]);

    while centroids.len() < k {
        let weights: Vec<f64> = features
            .iter()
            .map(|f| nearest_distance_squared(f, &centroids))
            .collect();
        let total: f64 = weights.iter().sum();

        if total <= f64::EPSILON {
            // Every remaining point coincides with a centroid; any pick is
            // as good as any other.
            centroids.push(features[rng.random_range(0..features.len())]);
            continue;
        }

        let mut target = rng.random_range(0.0..total);
        let mut chosen = features.len() - 1;
        for (row, weight) in weights.iter().enumerate() {
            if target < *weight {
                chosen = row;
                break;
            }
            target -= weight;
        }
        centroids.push(features[chosen]);
    }

    centroids
}

fn nearest_centroid(feature: &FeatureVector, centroids: &[FeatureVector]) -> usize {
    let mut best = 0;
    let mut best_distance = f64::INFINITY;
    for (idx, centroid) in centroids.iter().enumerate() {
        let distance = distance_squared(feature, centroid);
        if distance < best_distance {
            best_distance = distance;
            best = idx;
        }
    }
    best
}

fn nearest_distance_squared(feature: &FeatureVector, centroids: &[FeatureVector]) -> f64 {
    centroids
        .iter()
        .map(|c| distance_squared(feature, c))
        .fold(f64::INFINITY, f64::min)
}

fn distance_squared(a: &FeatureVector, b: &FeatureVector) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn blob(center: f64, count: usize) -> Vec<FeatureVector> {
        (0..count)
            .map(|i| {
                let jitter = i as f64 * 0.001;
                [center + jitter, center, center - jitter, center]
            })
            .collect()
    }

    #[test]
    fn separates_two_obvious_blobs() {
        let mut features = blob(0.1, 8);
        features.extend(blob(1.5, 8));

        let mut rng = StdRng::seed_from_u64(7);
        let outcome = cluster(&features, 2, 100, &mut rng);

        assert!(outcome.converged);
        let first = outcome.assignments[0];
        assert!(outcome.assignments[..8].iter().all(|&a| a == first));
        assert!(outcome.assignments[8..].iter().all(|&a| a != first));
    }

    #[test]
    fn identical_seed_reproduces_assignments() {
        let mut features = blob(0.2, 10);
        features.extend(blob(0.9, 10));
        features.extend(blob(1.7, 10));

        let run = |seed: u64| {
            let mut rng = StdRng::seed_from_u64(seed);
            cluster(&features, 3, 100, &mut rng).assignments
        };

        assert_eq!(run(42), run(42));
    }

    #[test]
    fn degenerate_inputs_do_not_panic() {
        let mut rng = StdRng::seed_from_u64(1);

        let empty = cluster(&[], 3, 100, &mut rng);
        assert!(empty.assignments.is_empty());

        let single = cluster(&[[0.5; FEATURE_DIMS]], 5, 100, &mut rng);
        assert_eq!(single.assignments, vec![0]);
        assert_eq!(single.centroids.len(), 1);

        // All points coincide: weights collapse to zero during seeding.
        let flat = vec![[1.0; FEATURE_DIMS]; 6];
        let outcome = cluster(&flat, 3, 100, &mut rng);
        assert_eq!(outcome.assignments.len(), 6);
        assert!(outcome.assignments.iter().all(|&a| a < 3));
    }
}
