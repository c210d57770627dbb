/// A discrete cluster assignment, one label per cell
#[derive(Debug, Clone)]
pub struct ClusterResult {
    /// Cluster id per cell, contiguous from 0
    pub labels: Vec<usize>,
    /// Number of distinct clusters
    pub n_clusters: usize,
}

impl ClusterResult {
    /// Renumber arbitrary labels to contiguous ids in order of first
    /// appearance
    pub fn from_labels(mut labels: Vec<usize>) -> Self {
        let mut remap: Vec<usize> = Vec::new();
        for label in labels.iter_mut() {
            let pos = remap.iter().position(|&c| c == *label);
            *label = match pos {
                Some(idx) => idx,
                None => {
                    remap.push(*label);
                    remap.len() - 1
                }
            };
        }
        Self {
            n_clusters: remap.len(),
            labels,
        }
    }

    pub fn cluster_sizes(&self) -> Vec<usize> {
        let mut counts = vec![0; self.n_clusters];
        for &label in &self.labels {
            counts[label] += 1;
        }
        counts
    }

    /// Sorted distinct cluster ids
    pub fn cluster_ids(&self) -> Vec<usize> {
        (0..self.n_clusters).collect()
    }

    /// ASCII cluster-size histogram, largest first, up to `max_show`
    /// rows and `max_width` characters of bar
    pub fn histogram_ascii(&self, max_width: usize, max_show: usize) -> String {
        let sizes = self.cluster_sizes();

        let mut ranked: Vec<(usize, usize)> = sizes
            .iter()
            .enumerate()
            .filter(|(_, &s)| s > 0)
            .map(|(id, &s)| (id, s))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1));

        let max_size = ranked.first().map(|&(_, s)| s).unwrap_or(1);
        let mut lines = vec![format!(
            "Cluster assignments ({} cells, {} clusters):",
            self.labels.len(),
            ranked.len()
        )];

        for &(id, size) in ranked.iter().take(max_show) {
            let bar = max_width * size / max_size;
            lines.push(format!("{:>6} | {:<7} {}", id, size, "#".repeat(bar)));
        }
        if ranked.len() > max_show {
            lines.push(format!("... and {} more", ranked.len() - max_show));
        }
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renumbering_is_contiguous() {
        let out = ClusterResult::from_labels(vec![7, 7, 3, 7, 3, 9]);
        assert_eq!(out.labels, vec![0, 0, 1, 0, 1, 2]);
        assert_eq!(out.n_clusters, 3);
        assert_eq!(out.cluster_sizes(), vec![3, 2, 1]);
    }

    #[test]
    fn histogram_mentions_counts() {
        let out = ClusterResult::from_labels(vec![0, 0, 0, 1]);
        let text = out.histogram_ascii(20, 10);
        assert!(text.contains("4 cells"));
        assert!(text.contains("2 clusters"));
    }
}
