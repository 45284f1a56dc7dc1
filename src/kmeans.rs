//! Lloyd's-algorithm k-means over d-dimensional points, used to cluster a
//! sample of an image's colors down to a target palette size.
//!
//! Ported from a C++ `KMeans`/`KMeansPoint`/`KMeansCluster` trio that seeds
//! with a max-separation heuristic instead of k-means++ (simpler,
//! deterministic given a seeded RNG) and runs assignment/recentroiding in
//! parallel per iteration.

use rand::Rng;
use rayon::prelude::*;

use crate::error::{Error, Result};

/// A point in d-dimensional real space, carrying an immutable input id and
/// a mutable cluster assignment (`0` means unassigned).
#[derive(Debug, Clone)]
pub struct KMeansPoint {
    id: usize,
    cluster_id: usize,
    values: Vec<f64>,
}

impl KMeansPoint {
    #[must_use]
    pub fn new(id: usize, values: Vec<f64>) -> Self {
        KMeansPoint {
            id,
            cluster_id: 0,
            values,
        }
    }

    #[must_use]
    pub fn id(&self) -> usize {
        self.id
    }

    #[must_use]
    pub fn cluster_id(&self) -> usize {
        self.cluster_id
    }

    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    #[must_use]
    pub fn dims(&self) -> usize {
        self.values.len()
    }
}

fn distance_sq(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// A cluster: its centroid and the (non-owning) ids of its member points.
#[derive(Debug, Clone)]
pub struct KMeansCluster {
    id: usize,
    centroid: Vec<f64>,
    members: Vec<usize>,
}

impl KMeansCluster {
    #[must_use]
    pub fn id(&self) -> usize {
        self.id
    }

    #[must_use]
    pub fn centroid(&self) -> &[f64] {
        &self.centroid
    }

    /// Indices into the `points` slice passed to [`run`], not point ids.
    #[must_use]
    pub fn members(&self) -> &[usize] {
        &self.members
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.members.len()
    }
}

/// Pick `k` distinct indices in `0..n` uniformly at random using a partial
/// Fisher-Yates shuffle, consuming exactly `k` draws from `rng` regardless
/// of collisions — unlike rejection sampling, this makes the RNG's draw
/// count per seeding attempt a fixed, reproducible quantity.
fn pick_k_distinct(n: usize, k: usize, rng: &mut impl Rng) -> Vec<usize> {
    let mut pool: Vec<usize> = (0..n).collect();
    for i in 0..k {
        let j = rng.gen_range(i..n);
        pool.swap(i, j);
    }
    pool.truncate(k);
    pool
}

/// Run Lloyd's algorithm over `points`, partitioning them into `k` clusters.
///
/// - `n < k` is a caller error.
/// - `n == k` skips clustering entirely; each point becomes its own cluster.
/// - `seed_attempts` is clamped to at least 1; each attempt draws `k`
///   distinct points uniformly at random and scores the configuration by
///   the sum of pairwise distances between the chosen points, keeping the
///   highest-scoring set as the initial centroids.
/// - Ties during assignment go to the lower-indexed centroid (first-win).
/// - A cluster left empty after assignment keeps its previous centroid.
///
/// Returns clusters in `1..=k` id order (not sorted by size — see
/// [`sort_by_size_desc`]).
pub fn run(
    points: &mut [KMeansPoint],
    k: usize,
    max_iters: usize,
    seed_attempts: usize,
    rng: &mut impl Rng,
) -> Result<Vec<KMeansCluster>> {
    if k == 0 {
        return Err(Error::InvalidArgument("K must be nonzero".to_string()));
    }
    let n = points.len();
    if n < k {
        return Err(Error::InvalidArgument(format!(
            "need at least K={k} points, got {n}"
        )));
    }

    let dims = points[0].dims();

    if n == k {
        let mut clusters = Vec::with_capacity(k);
        for (i, p) in points.iter_mut().enumerate() {
            p.cluster_id = i + 1;
            clusters.push(KMeansCluster {
                id: i + 1,
                centroid: p.values.clone(),
                members: vec![i],
            });
        }
        return Ok(clusters);
    }

    let seed_attempts = seed_attempts.max(1);

    let mut best_indices = Vec::new();
    let mut best_score = -1.0f64;
    for _ in 0..seed_attempts {
        let candidate = pick_k_distinct(n, k, rng);
        let mut score = 0.0;
        for i in 0..k {
            for j in (i + 1)..k {
                score += distance_sq(&points[candidate[i]].values, &points[candidate[j]].values);
            }
        }
        if score > best_score {
            best_score = score;
            best_indices = candidate;
        }
    }

    let mut centroids: Vec<Vec<f64>> = best_indices
        .iter()
        .map(|&i| points[i].values.clone())
        .collect();

    for (cluster_id, &pi) in best_indices.iter().enumerate() {
        points[pi].cluster_id = cluster_id + 1;
    }

    for _ in 0..max_iters.max(1) {
        let assignments: Vec<usize> = points
            .par_iter()
            .map(|p| {
                let mut best = 1usize;
                let mut best_dist = f64::MAX;
                for (ci, centroid) in centroids.iter().enumerate() {
                    let d = distance_sq(&p.values, centroid);
                    if d < best_dist {
                        best_dist = d;
                        best = ci + 1;
                    }
                }
                best
            })
            .collect();

        let mut changed = false;
        for (p, &a) in points.iter_mut().zip(assignments.iter()) {
            if p.cluster_id != a {
                p.cluster_id = a;
                changed = true;
            }
        }

        let new_centroids: Vec<Vec<f64>> = (0..k)
            .into_par_iter()
            .map(|ci| {
                let cluster_id = ci + 1;
                let mut sum = vec![0.0f64; dims];
                let mut count = 0usize;
                for p in points.iter() {
                    if p.cluster_id == cluster_id {
                        for d in 0..dims {
                            sum[d] += p.values[d];
                        }
                        count += 1;
                    }
                }
                if count > 0 {
                    for v in &mut sum {
                        *v /= count as f64;
                    }
                    sum
                } else {
                    centroids[ci].clone()
                }
            })
            .collect();
        centroids = new_centroids;

        if !changed {
            break;
        }
    }

    let mut clusters: Vec<KMeansCluster> = (0..k)
        .map(|ci| KMeansCluster {
            id: ci + 1,
            centroid: centroids[ci].clone(),
            members: Vec::new(),
        })
        .collect();

    for (i, p) in points.iter().enumerate() {
        clusters[p.cluster_id - 1].members.push(i);
    }

    Ok(clusters)
}

/// Sort clusters by descending membership size (stable, so ties keep their
/// relative `1..=k` id order).
pub fn sort_by_size_desc(clusters: &mut [KMeansCluster]) {
    clusters.sort_by(|a, b| b.size().cmp(&a.size()));
}

/// For each cluster, the member point closest to its centroid — `None` for
/// an empty cluster (possible when `k` exceeds the number of unique
/// points).
#[must_use]
pub fn closest_points(clusters: &[KMeansCluster], points: &[KMeansPoint]) -> Vec<Option<usize>> {
    clusters
        .iter()
        .map(|c| {
            c.members
                .iter()
                .copied()
                .min_by(|&a, &b| {
                    let da = distance_sq(&points[a].values, &c.centroid);
                    let db = distance_sq(&points[b].values, &c.centroid);
                    da.total_cmp(&db)
                })
        })
        .collect()
}

/// Mean, over non-empty clusters, of the average member-to-centroid squared
/// distance within each cluster. This is a relative quality score, not a
/// standard deviation — useful for comparing different `K` choices, not for
/// absolute interpretation.
#[must_use]
pub fn mean_intra_cluster_distance(clusters: &[KMeansCluster], points: &[KMeansPoint]) -> f64 {
    let mut total = 0.0;
    let mut nonempty = 0usize;
    for c in clusters {
        if c.members.is_empty() {
            continue;
        }
        let sum: f64 = c
            .members
            .iter()
            .map(|&m| distance_sq(&points[m].values, &c.centroid))
            .sum();
        total += sum / c.members.len() as f64;
        nonempty += 1;
    }
    if nonempty == 0 {
        0.0
    } else {
        total / nonempty as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn n_less_than_k_is_an_error() {
        let mut points = vec![KMeansPoint::new(0, vec![0.0, 0.0, 0.0])];
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert!(run(&mut points, 2, 10, 5, &mut rng).is_err());
    }

    #[test]
    fn n_equals_k_skips_clustering() {
        let mut points = vec![
            KMeansPoint::new(0, vec![0.0, 0.0, 0.0]),
            KMeansPoint::new(1, vec![1.0, 1.0, 1.0]),
        ];
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let clusters = run(&mut points, 2, 10, 5, &mut rng).unwrap();
        assert_eq!(clusters.len(), 2);
        for c in &clusters {
            assert_eq!(c.size(), 1);
        }
    }

    #[test]
    fn closest_points_are_from_the_input_set() {
        let mut points = Vec::new();
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for i in 0..200usize {
            let cluster_center = (i % 4) as f64 * 10.0;
            points.push(KMeansPoint::new(
                i,
                vec![
                    cluster_center + rng.gen_range(-1.0..1.0),
                    cluster_center + rng.gen_range(-1.0..1.0),
                    cluster_center + rng.gen_range(-1.0..1.0),
                ],
            ));
        }

        let clusters = run(&mut points, 4, 100, 40, &mut rng).unwrap();
        let closest = closest_points(&clusters, &points);
        for (cluster, best) in clusters.iter().zip(closest.iter()) {
            if !cluster.members().is_empty() {
                let best = best.expect("non-empty cluster has a closest point");
                assert!(cluster.members().contains(&best));
            }
        }
    }

    #[test]
    fn sort_by_size_desc_orders_clusters() {
        let mut points = Vec::new();
        for i in 0..10usize {
            let v = if i < 8 { 0.0 } else { 5.0 };
            points.push(KMeansPoint::new(i, vec![v, v, v]));
        }
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut clusters = run(&mut points, 2, 50, 40, &mut rng).unwrap();
        sort_by_size_desc(&mut clusters);
        assert!(clusters[0].size() >= clusters[1].size());
    }

    #[test]
    fn duplicate_points_pile_into_one_cluster() {
        let mut points = vec![KMeansPoint::new(0, vec![1.0, 1.0, 1.0]); 5];
        for (i, p) in points.iter_mut().enumerate() {
            p.id = i;
        }
        points.push(KMeansPoint::new(5, vec![9.0, 9.0, 9.0]));
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let clusters = run(&mut points, 2, 50, 40, &mut rng).unwrap();
        let sizes: Vec<usize> = clusters.iter().map(KMeansCluster::size).collect();
        assert!(sizes.contains(&5));
    }
}
