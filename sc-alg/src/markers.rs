use log::info;
use nalgebra_sparse::{CscMatrix, CsrMatrix};
use rayon::prelude::*;
use statrs::distribution::{ContinuousCDF, Normal};

/// Thresholds for one-vs-rest marker detection
#[derive(Debug, Clone, Copy)]
pub struct MarkerArgs {
    /// A gene is testable only if expressed in at least this fraction
    /// of cells on one of the two sides
    pub min_pct: f32,
    /// Minimum natural-log fold change (cluster vs rest)
    pub log_fc_threshold: f32,
}

impl Default for MarkerArgs {
    fn default() -> Self {
        Self {
            min_pct: 0.25,
            log_fc_threshold: 0.25,
        }
    }
}

impl MarkerArgs {
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(0.0..=1.0).contains(&self.min_pct) {
            return Err(anyhow::anyhow!("min_pct ({}) must be in [0, 1]", self.min_pct));
        }
        if self.log_fc_threshold < 0.0 {
            return Err(anyhow::anyhow!(
                "log_fc_threshold ({}) must be non-negative",
                self.log_fc_threshold
            ));
        }
        Ok(())
    }
}

/// One marker gene for one cluster
#[derive(Debug, Clone)]
pub struct MarkerGene {
    pub cluster: usize,
    pub gene: Box<str>,
    pub gene_index: usize,
    /// ln fold change of mean de-logged expression, cluster vs rest
    pub log_fc: f32,
    /// Fraction of cluster cells expressing the gene
    pub pct_in: f32,
    /// Fraction of other cells expressing the gene
    pub pct_out: f32,
    /// Wilcoxon rank-sum p-value (normal approximation)
    pub p_value: f64,
    /// Benjamini-Hochberg adjusted p-value within the cluster
    pub p_adjusted: f64,
}

/// One-vs-rest differential expression for every cluster
///
/// * `log_norm` - log-normalized genes × cells matrix
/// * `gene_names` - one per row
/// * `clusters` - cluster id per cell, contiguous from 0
///
/// Genes pass the pct/fold-change screens first, then get a Wilcoxon
/// rank-sum p-value; the per-cluster lists come back sorted by
/// adjusted p-value, ties broken by fold change.
pub fn rank_markers(
    log_norm: &CscMatrix<f32>,
    gene_names: &[Box<str>],
    clusters: &[usize],
    args: &MarkerArgs,
) -> anyhow::Result<Vec<Vec<MarkerGene>>> {
    args.validate()?;

    if clusters.len() != log_norm.ncols() {
        return Err(anyhow::anyhow!(
            "{} cluster labels for {} cells",
            clusters.len(),
            log_norm.ncols()
        ));
    }

    let n_clusters = clusters.iter().max().map(|&c| c + 1).unwrap_or(0);
    let n_genes = log_norm.nrows();

    // row-major sparse view: gene rows slice cheaply per cluster,
    // implicit zeros stay implicit
    let csr = CsrMatrix::from(log_norm);

    let out: Vec<Vec<MarkerGene>> = (0..n_clusters)
        .into_par_iter()
        .map(|c| {
            let in_cells: Vec<usize> =
                (0..clusters.len()).filter(|&j| clusters[j] == c).collect();
            let out_cells: Vec<usize> =
                (0..clusters.len()).filter(|&j| clusters[j] != c).collect();

            if in_cells.is_empty() || out_cells.is_empty() {
                return Vec::new();
            }

            let mut rows: Vec<MarkerGene> = Vec::new();
            let mut row_buf = vec![0.0f32; log_norm.ncols()];

            for (i, gene) in gene_names.iter().enumerate() {
                let row = csr.row(i);
                for (&j, &v) in row.col_indices().iter().zip(row.values()) {
                    row_buf[j] = v;
                }

                let x_in: Vec<f32> = in_cells.iter().map(|&j| row_buf[j]).collect();
                let x_out: Vec<f32> = out_cells.iter().map(|&j| row_buf[j]).collect();

                for &j in row.col_indices() {
                    row_buf[j] = 0.0;
                }

                let pct_in =
                    x_in.iter().filter(|&&v| v > 0.0).count() as f32 / x_in.len() as f32;
                let pct_out =
                    x_out.iter().filter(|&&v| v > 0.0).count() as f32 / x_out.len() as f32;

                if pct_in.max(pct_out) < args.min_pct {
                    continue;
                }

                let log_fc = log_fold_change(&x_in, &x_out);
                if log_fc < args.log_fc_threshold {
                    continue;
                }

                let p_value = wilcoxon_rank_sum(&x_in, &x_out);

                rows.push(MarkerGene {
                    cluster: c,
                    gene: gene.clone(),
                    gene_index: i,
                    log_fc,
                    pct_in,
                    pct_out,
                    p_value,
                    p_adjusted: 1.0,
                });
            }

            benjamini_hochberg(&mut rows, n_genes);

            rows.sort_by(|a, b| {
                a.p_adjusted
                    .partial_cmp(&b.p_adjusted)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(
                        b.log_fc
                            .partial_cmp(&a.log_fc)
                            .unwrap_or(std::cmp::Ordering::Equal),
                    )
            });
            rows
        })
        .collect();

    info!(
        "marker screen: {} candidate genes across {} clusters",
        out.iter().map(|v| v.len()).sum::<usize>(),
        n_clusters
    );

    Ok(out)
}

/// ln fold change of de-logged means with a pseudocount of one
fn log_fold_change(x_in: &[f32], x_out: &[f32]) -> f32 {
    fn mean_expm1(xs: &[f32]) -> f32 {
        xs.iter().map(|&x| x.exp_m1()).sum::<f32>() / xs.len() as f32
    }
    ((mean_expm1(x_in) + 1.0) / (mean_expm1(x_out) + 1.0)).ln()
}

/// Two-sided Wilcoxon rank-sum p-value via the normal approximation
/// with tie correction
fn wilcoxon_rank_sum(x_in: &[f32], x_out: &[f32]) -> f64 {
    let n1 = x_in.len() as f64;
    let n2 = x_out.len() as f64;
    let n = n1 + n2;

    let mut pooled: Vec<(f32, bool)> = x_in
        .iter()
        .map(|&x| (x, true))
        .chain(x_out.iter().map(|&x| (x, false)))
        .collect();
    pooled.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

    // mid-ranks with tie bookkeeping
    let mut rank_sum_in = 0.0f64;
    let mut tie_term = 0.0f64;
    let mut idx = 0usize;
    while idx < pooled.len() {
        let mut end = idx + 1;
        while end < pooled.len() && pooled[end].0 == pooled[idx].0 {
            end += 1;
        }
        let t = (end - idx) as f64;
        let mid_rank = (idx + 1 + end) as f64 / 2.0;
        for item in &pooled[idx..end] {
            if item.1 {
                rank_sum_in += mid_rank;
            }
        }
        tie_term += t * t * t - t;
        idx = end;
    }

    let u = rank_sum_in - n1 * (n1 + 1.0) / 2.0;
    let mu = n1 * n2 / 2.0;
    let sigma2 = n1 * n2 / 12.0 * ((n + 1.0) - tie_term / (n * (n - 1.0)));

    if sigma2 <= 0.0 {
        return 1.0; // all values tied
    }

    let z = (u - mu) / sigma2.sqrt();
    let normal = Normal::standard();
    2.0 * (1.0 - normal.cdf(z.abs()))
}

/// BH adjustment in place; `n_tests` counts the full gene universe,
/// not just the genes that survived the screens
fn benjamini_hochberg(rows: &mut [MarkerGene], n_tests: usize) {
    let mut order: Vec<usize> = (0..rows.len()).collect();
    order.sort_by(|&a, &b| {
        rows[a]
            .p_value
            .partial_cmp(&rows[b].p_value)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let m = n_tests as f64;
    let mut running_min = 1.0f64;
    for (rank, &i) in order.iter().enumerate().rev() {
        let adjusted = (rows[i].p_value * m / (rank + 1) as f64).min(1.0);
        running_min = running_min.min(adjusted);
        rows[i].p_adjusted = running_min;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra_sparse::CooMatrix;

    /// 2 genes × 10 cells; gene 0 high in cluster 0 only
    fn toy() -> (CscMatrix<f32>, Vec<Box<str>>, Vec<usize>) {
        let mut coo = CooMatrix::new(2, 10);
        for j in 0..5 {
            coo.push(0, j, 3.0 + 0.1 * j as f32);
            coo.push(1, j, 1.0);
        }
        for j in 5..10 {
            coo.push(1, j, 1.0);
        }
        let genes: Vec<Box<str>> = vec!["TH".into(), "GAPDH".into()];
        let clusters = vec![0, 0, 0, 0, 0, 1, 1, 1, 1, 1];
        (CscMatrix::from(&coo), genes, clusters)
    }

    #[test]
    fn finds_the_planted_marker() {
        let (data, genes, clusters) = toy();
        let markers = rank_markers(&data, &genes, &clusters, &MarkerArgs::default()).unwrap();

        assert_eq!(markers.len(), 2);
        assert_eq!(markers[0][0].gene.as_ref(), "TH");
        assert!(markers[0][0].log_fc > 0.25);
        assert!(markers[0][0].p_value < 0.05);

        // the flat housekeeping gene is no marker for cluster 0
        assert!(markers[0].iter().all(|m| m.gene.as_ref() != "GAPDH"));
    }

    #[test]
    fn implicit_zeros_count_toward_percentages() {
        // gene 0 stored for 3 of the 5 cluster-0 cells and nowhere
        // else; every other entry is an implicit zero
        let mut coo = CooMatrix::new(2, 10);
        for j in 0..3 {
            coo.push(0, j, 5.0);
        }
        for j in 0..10 {
            coo.push(1, j, 1.0 + 0.2 * (j % 2) as f32);
        }
        let data = CscMatrix::from(&coo);
        let genes: Vec<Box<str>> = vec!["TH".into(), "GAPDH".into()];
        let clusters = vec![0, 0, 0, 0, 0, 1, 1, 1, 1, 1];

        let markers = rank_markers(&data, &genes, &clusters, &MarkerArgs::default()).unwrap();
        let th = markers[0]
            .iter()
            .find(|m| m.gene.as_ref() == "TH")
            .expect("sparse gene should survive the screens");

        assert!((th.pct_in - 0.6).abs() < 1e-6);
        assert!((th.pct_out - 0.0).abs() < 1e-6);
        assert!(th.log_fc > 0.25);
    }

    #[test]
    fn wilcoxon_on_identical_groups_is_insignificant() {
        let x: Vec<f32> = vec![1.0, 2.0, 3.0, 4.0];
        let p = wilcoxon_rank_sum(&x, &x);
        assert!(p > 0.9);
    }

    #[test]
    fn wilcoxon_on_disjoint_groups_is_small() {
        let lo: Vec<f32> = (0..20).map(|i| i as f32 * 0.1).collect();
        let hi: Vec<f32> = (0..20).map(|i| 10.0 + i as f32 * 0.1).collect();
        assert!(wilcoxon_rank_sum(&hi, &lo) < 1e-6);
    }

    #[test]
    fn thresholds_are_validated() {
        let (data, genes, clusters) = toy();
        let bad = MarkerArgs {
            min_pct: 1.5,
            log_fc_threshold: 0.25,
        };
        assert!(rank_markers(&data, &genes, &clusters, &bad).is_err());
    }
}
