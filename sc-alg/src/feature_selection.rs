use crate::stat::RunningStatistics;

use fnv::FnvHashMap;
use log::info;
use nalgebra_sparse::CscMatrix;
use rayon::prelude::*;

const DEFAULT_BLOCK_SIZE: usize = 1000;

/// Highly-variable feature selection result
#[derive(Debug)]
pub struct FeatureSelection {
    /// Sorted indices of the selected features in the input matrix
    pub selected_indices: Vec<usize>,
    /// Names of the selected features, parallel to `selected_indices`
    pub selected_names: Vec<Box<str>>,
    /// old index -> new index
    pub index_map: FnvHashMap<usize, usize>,
    /// Per-gene mean of the input expression values
    pub gene_mean: Vec<f32>,
    /// Per-gene variance of the input expression values
    pub gene_variance: Vec<f32>,
}

/// Per-gene mean/variance over the columns of a genes × cells matrix,
/// accumulated block-parallel over cells
pub fn gene_expression_stats(data: &CscMatrix<f32>) -> RunningStatistics {
    let ncols = data.ncols();
    let nblocks = ncols.div_ceil(DEFAULT_BLOCK_SIZE);

    (0..nblocks)
        .into_par_iter()
        .map(|b| {
            let lb = b * DEFAULT_BLOCK_SIZE;
            let ub = (lb + DEFAULT_BLOCK_SIZE).min(ncols);
            let mut stat = RunningStatistics::new(data.nrows());
            for j in lb..ub {
                let col = data.col(j);
                stat.add_sparse(col.row_indices(), col.values());
            }
            stat
        })
        .reduce(
            || RunningStatistics::new(data.nrows()),
            |mut a, b| {
                a.merge(&b);
                a
            },
        )
}

/// Select the `n_features` genes with the highest expression variance
///
/// * `data` - log-normalized genes × cells matrix
/// * `gene_names` - one name per row
/// * `n_features` - exact number of genes to keep
///
/// Fails when fewer than `n_features` genes have non-zero variance;
/// a constant gene carries no signal for the downstream embedding.
pub fn select_highly_variable(
    data: &CscMatrix<f32>,
    gene_names: &[Box<str>],
    n_features: usize,
) -> anyhow::Result<FeatureSelection> {
    if n_features == 0 {
        return Err(anyhow::anyhow!("n_features must be >= 1"));
    }
    if gene_names.len() != data.nrows() {
        return Err(anyhow::anyhow!(
            "{} gene names for {} rows",
            gene_names.len(),
            data.nrows()
        ));
    }

    let stat = gene_expression_stats(data);
    let mean = stat.mean();
    let variance = stat.variance();

    let n_detected = stat.count_positives().iter().filter(|&&n| n > 0.0).count();
    info!("{} of {} genes detected at all", n_detected, data.nrows());

    let mut ranked: Vec<(usize, f32)> = variance
        .iter()
        .enumerate()
        .filter(|&(_, &v)| v > 0.0)
        .map(|(i, &v)| (i, v))
        .collect();

    if ranked.len() < n_features {
        return Err(anyhow::anyhow!(
            "only {} genes with non-zero variance, but {} variable features requested",
            ranked.len(),
            n_features
        ));
    }

    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let mut selected_indices: Vec<usize> =
        ranked.iter().take(n_features).map(|&(i, _)| i).collect();
    selected_indices.sort_unstable();

    let index_map: FnvHashMap<usize, usize> = selected_indices
        .iter()
        .enumerate()
        .map(|(new_i, &old_i)| (old_i, new_i))
        .collect();

    let selected_names = selected_indices
        .iter()
        .map(|&i| gene_names[i].clone())
        .collect();

    info!(
        "selected {} variable features out of {}",
        n_features,
        data.nrows()
    );

    Ok(FeatureSelection {
        selected_indices,
        selected_names,
        index_map,
        gene_mean: mean.iter().cloned().collect(),
        gene_variance: variance.iter().cloned().collect(),
    })
}
