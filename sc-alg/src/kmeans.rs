use crate::cluster::ClusterResult;

use nalgebra::DMatrix;

/// Arguments for k-means clustering
#[derive(Debug, Clone)]
pub struct KmeansArgs {
    /// Number of clusters
    pub num_clusters: usize,
    /// Maximum number of iterations
    pub max_iter: usize,
}

impl Default for KmeansArgs {
    fn default() -> Self {
        Self {
            num_clusters: 1,
            max_iter: 100,
        }
    }
}

impl KmeansArgs {
    pub fn with_clusters(num_clusters: usize) -> Self {
        Self {
            num_clusters,
            ..Default::default()
        }
    }
}

/// k-means over the rows of a cells × d coordinate matrix, the
/// non-graph alternative to Louvain clustering
pub trait KmeansRows {
    fn kmeans_rows(&self, args: &KmeansArgs) -> ClusterResult;
}

impl KmeansRows for DMatrix<f32> {
    fn kmeans_rows(&self, args: &KmeansArgs) -> ClusterResult {
        if args.num_clusters <= 1 || self.nrows() == 0 {
            return ClusterResult::from_labels(vec![0; self.nrows()]);
        }

        let data: Vec<Vec<f32>> = self
            .row_iter()
            .map(|x| x.iter().cloned().collect())
            .collect();

        let clust = clustering::kmeans(args.num_clusters, &data, args.max_iter);
        ClusterResult::from_labels(clust.membership)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_cluster_is_trivial() {
        let mat = DMatrix::from_row_slice(4, 2, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
        let out = mat.kmeans_rows(&KmeansArgs::with_clusters(1));
        assert_eq!(out.n_clusters, 1);
        assert!(out.labels.iter().all(|&c| c == 0));
    }

    #[test]
    fn two_separated_groups() {
        let mat = DMatrix::from_row_slice(
            6,
            2,
            &[
                0.0, 0.1, //
                0.1, 0.0, //
                0.2, 0.1, //
                10.0, 10.1, //
                10.1, 10.0, //
                10.2, 10.1, //
            ],
        );

        let out = mat.kmeans_rows(&KmeansArgs::with_clusters(2));
        assert_eq!(out.n_clusters, 2);
        assert_eq!(out.labels[0], out.labels[1]);
        assert_eq!(out.labels[3], out.labels[5]);
        assert_ne!(out.labels[0], out.labels[3]);
    }
}
