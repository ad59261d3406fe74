//! Parallel DBSCAN clustering for single-frame point clouds.
//!
//! This module implements DBSCAN using:
//! - `kiddo` KD-tree for O(log n) spatial neighbor queries
//! - `rayon` for parallel neighbor finding and core point identification
//! - Atomic union-find for lock-free cluster merging
//!
//! # Example
//!
//! ```
//! use spin_pipeline::processors::clustering::dbscan;
//!
//! let coords = vec![[0.0f32, 0.0, 0.0], [0.1, 0.0, 0.0], [100.0, 100.0, 100.0]];
//! let labels = dbscan(&coords, 0.5, 2);
//! assert_eq!(labels, vec![0, 0, -1]);
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use kiddo::{ImmutableKdTree, SquaredEuclidean};
use rayon::prelude::*;

use crate::config::ClusterSelection;

/// Label assigned to points that belong to no cluster.
pub const NOISE: i32 = -1;

/// Atomic Union-Find data structure for lock-free parallel cluster merging.
///
/// Uses path compression with atomic compare-and-swap operations to safely
/// merge clusters from multiple threads without locks.
pub struct AtomicUnionFind {
    parent: Vec<AtomicUsize>,
}

impl AtomicUnionFind {
    /// Create a new union-find structure where each element is its own parent.
    #[inline]
    pub fn new(size: usize) -> Self {
        let parent = (0..size).map(AtomicUsize::new).collect();
        Self { parent }
    }

    /// Find the root of the set containing `x` with path compression.
    ///
    /// Relaxed ordering suffices: union-find only needs eventual consistency
    /// and always converges to the correct root.
    #[inline]
    pub fn find(&self, mut x: usize) -> usize {
        loop {
            let p = self.parent[x].load(Ordering::Relaxed);
            if p == x {
                return x;
            }
            let gp = self.parent[p].load(Ordering::Relaxed);
            if gp != p {
                // Failure here just means another thread compressed first
                let _ = self.parent[x].compare_exchange_weak(
                    p,
                    gp,
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                );
            }
            x = p;
        }
    }

    /// Union the sets containing `x` and `y`.
    ///
    /// Returns true if a merge occurred, false if they already shared a set.
    #[inline]
    pub fn union(&self, x: usize, y: usize) -> bool {
        loop {
            let root_x = self.find(x);
            let root_y = self.find(y);

            if root_x == root_y {
                return false;
            }

            // Smaller root points to the larger one
            let (small, large) = if root_x < root_y {
                (root_x, root_y)
            } else {
                (root_y, root_x)
            };

            match self.parent[small].compare_exchange_weak(
                small,
                large,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(_) => continue,
            }
        }
    }
}

/// DBSCAN clustering.
///
/// A core point has at least `min_points` points (itself included) within
/// `eps`. Core points that are neighbors share a cluster; non-core points
/// join the cluster of their nearest core neighbor, or become noise.
///
/// # Algorithm (Parallelized)
///
/// 1. **Build KD-tree**: O(n log n) construction using kiddo
/// 2. **Parallel neighbor finding**: rayon queries within `eps`
/// 3. **Parallel core point identification**
/// 4. **Lock-free cluster formation**: atomic union-find over core neighbors
/// 5. **Label assignment**: cluster ids are numbered in order of each
///    cluster's lowest-index core point, so labels are deterministic
///    regardless of thread scheduling
///
/// # Returns
///
/// Vector of cluster labels ([`NOISE`] for noise points).
pub fn dbscan(coords: &[[f32; 3]], eps: f32, min_points: usize) -> Vec<i32> {
    let n = coords.len();
    if n == 0 {
        return Vec::new();
    }

    // A point always counts itself as a neighbor
    let min_points = min_points.max(1);

    let tree: ImmutableKdTree<f32, 3> = ImmutableKdTree::new_from_slice(coords);
    let eps_sq = eps * eps;

    // `within` results are sorted by distance, so the first core neighbor
    // found for a border point is its nearest one
    let neighbors: Vec<Vec<usize>> = coords
        .par_iter()
        .map(|coord| {
            tree.within::<SquaredEuclidean>(coord, eps_sq)
                .iter()
                .map(|nn| nn.item as usize)
                .collect()
        })
        .collect();

    let is_core: Vec<bool> = neighbors
        .par_iter()
        .map(|neigh| neigh.len() >= min_points)
        .collect();

    let uf = AtomicUnionFind::new(n);

    (0..n).into_par_iter().for_each(|i| {
        if is_core[i] {
            for &j in &neighbors[i] {
                if is_core[j] {
                    uf.union(i, j);
                }
            }
        }
    });

    let mut root_to_cluster: HashMap<usize, i32> = HashMap::new();
    let mut next_cluster_id: i32 = 0;

    for i in (0..n).filter(|&i| is_core[i]) {
        let root = uf.find(i);
        root_to_cluster.entry(root).or_insert_with(|| {
            let id = next_cluster_id;
            next_cluster_id += 1;
            id
        });
    }

    let mut labels = vec![NOISE; n];

    for i in 0..n {
        if is_core[i] {
            labels[i] = root_to_cluster[&uf.find(i)];
        } else if let Some(&j) = neighbors[i].iter().find(|&&j| is_core[j]) {
            labels[i] = root_to_cluster[&uf.find(j)];
        }
    }

    labels
}

/// Point count per cluster id (noise excluded).
pub fn cluster_sizes(labels: &[i32]) -> Vec<usize> {
    let num_clusters = labels.iter().copied().max().map_or(0, |m| (m + 1).max(0) as usize);
    let mut sizes = vec![0usize; num_clusters];
    for &label in labels.iter().filter(|&&l| l >= 0) {
        sizes[label as usize] += 1;
    }
    sizes
}

/// Indices of the points that make up the object.
///
/// Clusters smaller than `min_cluster_size` are discarded. `MergeAll` keeps
/// every remaining cluster; `Largest` keeps the one with the most points,
/// ties broken by the lowest cluster id.
pub fn select_clusters(
    labels: &[i32],
    min_cluster_size: usize,
    selection: ClusterSelection,
) -> Vec<usize> {
    let sizes = cluster_sizes(labels);
    let kept: Vec<bool> = match selection {
        ClusterSelection::MergeAll => sizes.iter().map(|&s| s >= min_cluster_size).collect(),
        ClusterSelection::Largest => {
            let mut best: Option<usize> = None;
            for (id, &size) in sizes.iter().enumerate() {
                if size < min_cluster_size {
                    continue;
                }
                if best.map_or(true, |b| size > sizes[b]) {
                    best = Some(id);
                }
            }
            (0..sizes.len()).map(|id| Some(id) == best).collect()
        }
    };

    labels
        .iter()
        .enumerate()
        .filter(|(_, &l)| l >= 0 && kept[l as usize])
        .map(|(i, _)| i)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atomic_union_find_basic() {
        let uf = AtomicUnionFind::new(5);

        assert_eq!(uf.find(0), 0);
        assert_eq!(uf.find(4), 4);

        assert!(uf.union(0, 1));
        assert_eq!(uf.find(0), uf.find(1));

        assert!(uf.union(2, 3));
        assert_ne!(uf.find(0), uf.find(2));

        assert!(uf.union(1, 2));
        assert_eq!(uf.find(0), uf.find(3));

        assert!(!uf.union(0, 3));
    }

    #[test]
    fn test_dbscan_simple_clusters() {
        let coords: Vec<[f32; 3]> = vec![
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [1.0, 1.0, 0.0],
            [100.0, 100.0, 0.0],
            [101.0, 100.0, 0.0],
            [100.0, 101.0, 0.0],
            [101.0, 101.0, 0.0],
        ];

        let labels = dbscan(&coords, 5.0, 2);

        assert_eq!(labels, vec![0, 0, 0, 0, 1, 1, 1, 1]);
    }

    #[test]
    fn test_dbscan_noise_points() {
        let coords: Vec<[f32; 3]> = vec![
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [100.0, 100.0, 100.0],
        ];

        let labels = dbscan(&coords, 5.0, 3);

        assert!(labels[0] >= 0);
        assert_eq!(labels[0], labels[1]);
        assert_eq!(labels[0], labels[2]);
        assert_eq!(labels[3], NOISE);
    }

    #[test]
    fn test_dbscan_border_point_joins_cluster() {
        // Chain: 0..3 dense, point 4 reaches only point 3
        let coords: Vec<[f32; 3]> = vec![
            [0.0, 0.0, 0.0],
            [0.5, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [1.5, 0.0, 0.0],
            [2.4, 0.0, 0.0],
        ];

        let labels = dbscan(&coords, 1.1, 3);

        assert_eq!(labels, vec![0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_dbscan_empty_and_single() {
        assert!(dbscan(&[], 1.0, 3).is_empty());
        assert_eq!(dbscan(&[[0.0, 0.0, 0.0]], 1.0, 2), vec![NOISE]);
    }

    #[test]
    fn test_cluster_sizes() {
        assert_eq!(cluster_sizes(&[0, 0, 1, NOISE, 1, 1]), vec![2, 3]);
        assert!(cluster_sizes(&[NOISE, NOISE]).is_empty());
    }

    #[test]
    fn test_select_clusters_merge_all() {
        let labels = vec![0, 0, 0, 1, 1, 2, NOISE];
        assert_eq!(
            select_clusters(&labels, 2, ClusterSelection::MergeAll),
            vec![0, 1, 2, 3, 4]
        );
    }

    #[test]
    fn test_select_largest_tie_goes_to_lowest_id() {
        let labels = vec![1, 1, 0, 0, 2];
        assert_eq!(
            select_clusters(&labels, 1, ClusterSelection::Largest),
            vec![2, 3]
        );
    }

    #[test]
    fn test_select_clusters_nothing_large_enough() {
        let labels = vec![0, 1, NOISE];
        assert!(select_clusters(&labels, 5, ClusterSelection::Largest).is_empty());
        assert!(select_clusters(&labels, 5, ClusterSelection::MergeAll).is_empty());
    }

    #[test]
    fn test_dbscan_min_points_one_merges_neighbors() {
        let coords = vec![[0.0, 0.0, 0.0], [0.1, 0.0, 0.0], [0.2, 0.0, 0.0], [5.0, 0.0, 0.0]];

        assert_eq!(dbscan(&coords, 0.5, 1), vec![0, 0, 0, 1]);
        assert_eq!(dbscan(&coords, 0.5, 0), vec![0, 0, 0, 1]);
    }
}
