use crate::cluster::ClusterResult;
use crate::knn::KnnGraph;

use log::info;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Parameters for modularity-based community detection
#[derive(Debug, Clone)]
pub struct LouvainArgs {
    /// Granularity knob: higher resolution gives more, smaller clusters
    pub resolution: f32,
    /// Maximum aggregation levels
    pub max_levels: usize,
    /// Maximum local-moving sweeps per level
    pub max_sweeps: usize,
    /// Seed for the node-visit shuffle
    pub seed: u64,
}

impl Default for LouvainArgs {
    fn default() -> Self {
        Self {
            resolution: 1.0,
            max_levels: 10,
            max_sweeps: 50,
            seed: 42,
        }
    }
}

/// Community detection output
pub struct LouvainOut {
    pub clusters: ClusterResult,
    /// Modularity of the final partition at the given resolution
    pub modularity: f32,
}

/// Weighted adjacency lists for one aggregation level
struct Level {
    adj: Vec<Vec<(usize, f64)>>,
    /// Self-loop weight per node (collapsed intra-community edges)
    self_loops: Vec<f64>,
}

impl Level {
    fn num_nodes(&self) -> usize {
        self.adj.len()
    }

    /// Weighted degree including self-loops
    fn degree(&self, i: usize) -> f64 {
        self.self_loops[i] + self.adj[i].iter().map(|&(_, w)| w).sum::<f64>()
    }

    fn total_weight(&self) -> f64 {
        let edge_sum: f64 = self
            .adj
            .iter()
            .map(|nbrs| nbrs.iter().map(|&(_, w)| w).sum::<f64>())
            .sum();
        // each undirected edge appears twice in the lists
        edge_sum / 2.0 + self.self_loops.iter().sum::<f64>()
    }
}

/// Louvain community detection on the kNN graph with exponential
/// kernel edge weights
///
/// Seeded-shuffle local moving until no gain, then graph aggregation,
/// repeated until the partition stops changing. Deterministic for a
/// fixed seed; resolution is monotone in cluster granularity.
pub fn louvain(graph: &KnnGraph, args: &LouvainArgs) -> anyhow::Result<LouvainOut> {
    if args.resolution <= 0.0 {
        return Err(anyhow::anyhow!(
            "resolution ({}) must be positive",
            args.resolution
        ));
    }
    if graph.n_nodes == 0 {
        return Err(anyhow::anyhow!("empty graph"));
    }

    let weights = graph.exp_kernel_weights();

    let mut adj = vec![Vec::new(); graph.n_nodes];
    for (&(i, j), &w) in graph.edges.iter().zip(&weights) {
        adj[i].push((j, w as f64));
        adj[j].push((i, w as f64));
    }

    let mut level = Level {
        adj,
        self_loops: vec![0.0; graph.n_nodes],
    };

    let mut rng = SmallRng::seed_from_u64(args.seed);
    let gamma = args.resolution as f64;

    // node -> community, composed across levels
    let mut membership: Vec<usize> = (0..graph.n_nodes).collect();

    for level_idx in 0..args.max_levels {
        let assignment = local_moving(&level, gamma, args.max_sweeps, &mut rng);
        let flat = ClusterResult::from_labels(assignment);

        if flat.n_clusters == level.num_nodes() {
            break; // nothing merged at this level
        }

        for m in membership.iter_mut() {
            *m = flat.labels[*m];
        }

        info!(
            "louvain level {}: {} -> {} communities",
            level_idx,
            level.num_nodes(),
            flat.n_clusters
        );

        level = aggregate(&level, &flat);
    }

    let clusters = ClusterResult::from_labels(membership);
    let modularity = partition_modularity(graph, &weights, &clusters.labels, gamma);

    info!(
        "louvain: {} clusters, modularity {:.4}",
        clusters.n_clusters, modularity
    );

    Ok(LouvainOut {
        clusters,
        modularity,
    })
}

/// One level of local moving: repeatedly offer each node its best
/// neighbouring community until a full sweep moves nothing
fn local_moving(level: &Level, gamma: f64, max_sweeps: usize, rng: &mut SmallRng) -> Vec<usize> {
    let n = level.num_nodes();
    let two_m = (2.0 * level.total_weight()).max(f64::MIN_POSITIVE);

    let mut assignment: Vec<usize> = (0..n).collect();
    let mut sigma_tot: Vec<f64> = (0..n).map(|i| level.degree(i)).collect();

    let mut order: Vec<usize> = (0..n).collect();

    for _sweep in 0..max_sweeps {
        order.shuffle(rng);
        let mut moved = false;

        for &i in &order {
            let current = assignment[i];
            let k_i = level.degree(i);

            // links from i into each adjacent community
            let mut comm_weights: Vec<(usize, f64)> = Vec::with_capacity(level.adj[i].len());
            for &(j, w) in &level.adj[i] {
                let c = assignment[j];
                match comm_weights.iter_mut().find(|(cc, _)| *cc == c) {
                    Some((_, total)) => *total += w,
                    None => comm_weights.push((c, w)),
                }
            }

            // take i out of its community first
            sigma_tot[current] -= k_i;
            let k_i_to_current = comm_weights
                .iter()
                .find(|&&(c, _)| c == current)
                .map(|&(_, w)| w)
                .unwrap_or(0.0);

            let mut best = current;
            let mut best_gain = k_i_to_current - gamma * k_i * sigma_tot[current] / two_m;

            for &(c, k_i_to_c) in &comm_weights {
                if c == current {
                    continue;
                }
                let gain = k_i_to_c - gamma * k_i * sigma_tot[c] / two_m;
                if gain > best_gain + 1e-12 {
                    best_gain = gain;
                    best = c;
                }
            }

            sigma_tot[best] += k_i;
            if best != current {
                assignment[i] = best;
                moved = true;
            }
        }

        if !moved {
            break;
        }
    }

    assignment
}

/// Contract each community into one node, keeping merged edge weights
/// and intra-community weight as self-loops
fn aggregate(level: &Level, flat: &ClusterResult) -> Level {
    let k = flat.n_clusters;
    let mut self_loops = vec![0.0f64; k];
    let mut merged: Vec<fnv::FnvHashMap<usize, f64>> =
        vec![fnv::FnvHashMap::default(); k];

    for (i, &ci) in flat.labels.iter().enumerate() {
        self_loops[ci] += level.self_loops[i];
        for &(j, w) in &level.adj[i] {
            let cj = flat.labels[j];
            if ci == cj {
                // each intra edge visited from both ends
                self_loops[ci] += w / 2.0;
            } else {
                *merged[ci].entry(cj).or_insert(0.0) += w;
            }
        }
    }

    let adj = merged
        .into_iter()
        .map(|m| {
            let mut nbrs: Vec<(usize, f64)> = m.into_iter().collect();
            nbrs.sort_by_key(|&(c, _)| c);
            nbrs
        })
        .collect();

    Level { adj, self_loops }
}

/// Modularity of a partition of the original graph at resolution γ:
/// `Q = Σ_c [ Σin_c / 2m − γ (Σtot_c / 2m)² ]`
pub fn partition_modularity(
    graph: &KnnGraph,
    weights: &[f32],
    labels: &[usize],
    gamma: f64,
) -> f32 {
    let n_comm = labels.iter().max().map(|&c| c + 1).unwrap_or(0);
    let mut sigma_in = vec![0.0f64; n_comm];
    let mut sigma_tot = vec![0.0f64; n_comm];

    let mut total = 0.0f64;
    for (&(i, j), &w) in graph.edges.iter().zip(weights) {
        let w = w as f64;
        total += w;
        sigma_tot[labels[i]] += w;
        sigma_tot[labels[j]] += w;
        if labels[i] == labels[j] {
            sigma_in[labels[i]] += w;
        }
    }

    if total <= 0.0 {
        return 0.0;
    }

    let two_m = 2.0 * total;
    let q: f64 = (0..n_comm)
        .map(|c| sigma_in[c] / total - gamma * (sigma_tot[c] / two_m).powi(2))
        .sum();
    q as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::DMatrix;

    fn two_blobs(n_per: usize) -> DMatrix<f32> {
        DMatrix::from_fn(2 * n_per, 2, |i, j| {
            let centre = if i < n_per { 0.0 } else { 20.0 };
            let jitter = ((i * 13 + j * 7) % 11) as f32 * 0.1;
            centre + jitter
        })
    }

    #[test]
    fn separates_planted_partition() {
        let coords = two_blobs(15);
        let graph = KnnGraph::from_rows(&coords, 10).unwrap();
        let out = louvain(&graph, &LouvainArgs::default()).unwrap();

        assert_eq!(out.clusters.labels.len(), 30);
        // every blob member shares a label; the two blobs differ
        let first = out.clusters.labels[0];
        let second = out.clusters.labels[15];
        assert_ne!(first, second);
        assert!(out.clusters.labels[..15].iter().all(|&c| c == first));
        assert!(out.clusters.labels[15..].iter().all(|&c| c == second));
        assert!(out.modularity > 0.3);
    }

    #[test]
    fn deterministic_under_seed() {
        let coords = two_blobs(10);
        let graph = KnnGraph::from_rows(&coords, 4).unwrap();

        let args = LouvainArgs::default();
        let a = louvain(&graph, &args).unwrap();
        let b = louvain(&graph, &args).unwrap();
        assert_eq!(a.clusters.labels, b.clusters.labels);
    }

    #[test]
    fn higher_resolution_never_coarsens() {
        let coords = two_blobs(12);
        let graph = KnnGraph::from_rows(&coords, 8).unwrap();

        let low = louvain(
            &graph,
            &LouvainArgs {
                resolution: 0.5,
                ..Default::default()
            },
        )
        .unwrap();
        let high = louvain(
            &graph,
            &LouvainArgs {
                resolution: 4.0,
                ..Default::default()
            },
        )
        .unwrap();
        assert!(high.clusters.n_clusters >= low.clusters.n_clusters);
    }

    #[test]
    fn rejects_bad_resolution() {
        let coords = two_blobs(5);
        let graph = KnnGraph::from_rows(&coords, 2).unwrap();
        let args = LouvainArgs {
            resolution: 0.0,
            ..Default::default()
        };
        assert!(louvain(&graph, &args).is_err());
    }
}
