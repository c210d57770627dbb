use dashmap::DashMap;
use indicatif::ParallelProgressIterator;
use log::info;
use nalgebra::DMatrix;
use nalgebra_sparse::{CooMatrix, CscMatrix};
use rayon::prelude::*;

const DEFAULT_BLOCK_SIZE: usize = 1000;

/// A wrapper for `Vec<f32>` so the HNSW index can measure it
#[derive(Clone, Debug)]
pub struct VecPoint {
    pub data: Vec<f32>,
}

impl instant_distance::Point for VecPoint {
    fn distance(&self, other: &Self) -> f32 {
        self.data
            .iter()
            .zip(other.data.iter())
            .map(|(x, y)| (x - y) * (x - y))
            .sum::<f32>()
            .sqrt()
    }
}

/// HNSW index over a set of points, one per cell
pub struct PointDict {
    dict: instant_distance::HnswMap<VecPoint, usize>,
    points: Vec<VecPoint>,
}

impl PointDict {
    /// Index the rows of a cells × d coordinate matrix
    pub fn from_rows(coords: &DMatrix<f32>) -> Self {
        let points: Vec<VecPoint> = coords
            .row_iter()
            .map(|row| VecPoint {
                data: row.iter().cloned().collect(),
            })
            .collect();
        let names: Vec<usize> = (0..points.len()).collect();

        use instant_distance::Builder;
        let dict = Builder::default().seed(42).build(points.clone(), names);
        Self { dict, points }
    }

    /// Nearest neighbours of point `i`, excluding `i` itself
    pub fn search_others(&self, i: usize, knn: usize) -> Vec<(usize, f32)> {
        use instant_distance::Search;
        let mut search = Search::default();
        self.dict
            .search(&self.points[i], &mut search)
            .filter(|item| *item.value != i)
            .take(knn)
            .map(|item| (*item.value, item.distance))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Symmetric k-nearest-neighbour graph over cells
pub struct KnnGraph {
    /// Symmetric CSC adjacency of distances (n × n)
    pub adjacency: CscMatrix<f32>,
    /// Sorted edge list with i < j, deduplicated
    pub edges: Vec<(usize, usize)>,
    /// Edge distances, parallel to `edges`
    pub distances: Vec<f32>,
    pub n_nodes: usize,
}

impl KnnGraph {
    /// Build from the rows of a cells × d coordinate matrix
    ///
    /// Directed kNN edges are merged by the union rule: `(i, j)` is an
    /// edge when either direction found the other, at the minimum of
    /// the two distances.
    pub fn from_rows(coords: &DMatrix<f32>, knn: usize) -> anyhow::Result<Self> {
        let nn = coords.nrows();
        if nn < 2 {
            return Err(anyhow::anyhow!("need at least 2 cells for a kNN graph"));
        }
        let knn = knn.clamp(1, nn - 1);

        let dict = PointDict::from_rows(coords);

        let triplets: DashMap<(usize, usize), f32> = DashMap::new();

        let nblocks = nn.div_ceil(DEFAULT_BLOCK_SIZE);
        (0..nblocks)
            .into_par_iter()
            .progress_count(nblocks as u64)
            .for_each(|b| {
                let lb = b * DEFAULT_BLOCK_SIZE;
                let ub = (lb + DEFAULT_BLOCK_SIZE).min(nn);
                for i in lb..ub {
                    for (j, d_ij) in dict.search_others(i, knn) {
                        triplets.insert((i, j), d_ij);
                    }
                }
            });

        if triplets.is_empty() {
            return Err(anyhow::anyhow!("kNN search produced no edges"));
        }

        let mut edges: Vec<((usize, usize), f32)> = triplets
            .par_iter()
            .filter_map(|entry| {
                let &(i, j) = entry.key();
                if i < j {
                    let d_ij = *entry.value();
                    let d_ji = triplets.get(&(j, i)).map(|e| *e).unwrap_or(d_ij);
                    Some(((i, j), d_ij.min(d_ji)))
                } else if i > j && !triplets.contains_key(&(j, i)) {
                    Some(((j, i), *entry.value()))
                } else {
                    None
                }
            })
            .collect();

        edges.par_sort_by_key(|&(ij, _)| ij);
        edges.dedup_by_key(|&mut (ij, _)| ij);

        info!("{} nodes, {} undirected kNN edges", nn, edges.len());

        let mut coo = CooMatrix::new(nn, nn);
        for &((i, j), d) in edges.iter() {
            coo.push(i, j, d);
            coo.push(j, i, d);
        }

        let (edge_pairs, distances): (Vec<_>, Vec<_>) = edges.into_iter().unzip();

        Ok(Self {
            adjacency: CscMatrix::from(&coo),
            edges: edge_pairs,
            distances,
            n_nodes: nn,
        })
    }

    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    /// Neighbours of `node` in the symmetric adjacency
    pub fn neighbors(&self, node: usize) -> &[usize] {
        let offsets = self.adjacency.col_offsets();
        &self.adjacency.row_indices()[offsets[node]..offsets[node + 1]]
    }

    /// Exponential-kernel similarity weights, `w = exp(-d / σ)` with
    /// σ the median edge distance. Parallel to `edges`, all in (0, 1].
    pub fn exp_kernel_weights(&self) -> Vec<f32> {
        if self.distances.is_empty() {
            return Vec::new();
        }
        let sigma = median(&self.distances).max(f32::EPSILON);
        self.distances.iter().map(|&d| (-d / sigma).exp()).collect()
    }
}

fn median(values: &[f32]) -> f32 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = sorted.len();
    if n % 2 == 0 {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    } else {
        sorted[n / 2]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_blobs(n_per: usize) -> DMatrix<f32> {
        // deterministic jitter around (0,0) and (10,10)
        DMatrix::from_fn(2 * n_per, 2, |i, j| {
            let centre = if i < n_per { 0.0 } else { 10.0 };
            let jitter = ((i * 31 + j * 17) % 7) as f32 * 0.05;
            centre + jitter
        })
    }

    #[test]
    fn graph_is_symmetric_and_within_blobs() {
        let coords = two_blobs(10);
        let graph = KnnGraph::from_rows(&coords, 3).unwrap();

        assert_eq!(graph.n_nodes, 20);
        assert!(graph.num_edges() > 0);

        for &(i, j) in &graph.edges {
            assert!(i < j);
            // no edge crosses between blobs at this k
            assert_eq!(i < 10, j < 10);
            assert!(graph.neighbors(i).contains(&j));
            assert!(graph.neighbors(j).contains(&i));
        }
    }

    #[test]
    fn kernel_weights_in_unit_interval() {
        let coords = two_blobs(8);
        let graph = KnnGraph::from_rows(&coords, 3).unwrap();

        let weights = graph.exp_kernel_weights();
        assert_eq!(weights.len(), graph.num_edges());
        for &w in &weights {
            assert!(w > 0.0 && w <= 1.0);
        }
    }
}
