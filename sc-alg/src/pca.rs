use crate::rsvd::RandomizedSvd;

use log::info;
use nalgebra::DMatrix;

type Mat = DMatrix<f32>;

/// PCA of a scaled genes × cells matrix
pub struct Pca {
    /// Cell scores, cells × k_max
    pub scores: Mat,
    /// Standard deviation explained by each component, descending
    pub sdev: Vec<f32>,
}

/// Run PCA via randomized SVD
/// * `scaled` - genes × cells, rows standardized
/// * `k_max` - number of components to compute
pub fn pca(scaled: &Mat, k_max: usize) -> anyhow::Result<Pca> {
    let n_cells = scaled.ncols();
    if k_max == 0 {
        return Err(anyhow::anyhow!("k_max must be >= 1"));
    }
    if n_cells < 2 {
        return Err(anyhow::anyhow!("need at least 2 cells for PCA"));
    }

    let svd = RandomizedSvd::new(k_max, 5).compute(scaled)?;

    // X = U S Vᵀ, so the cell coordinates are V S
    let scores = &svd.v * Mat::from_diagonal(&svd.singular_values);

    let denom = ((n_cells - 1) as f32).sqrt();
    let sdev = svd.singular_values.iter().map(|&s| s / denom).collect();

    Ok(Pca { scores, sdev })
}

/// How to choose the number of components carried downstream
#[derive(Debug, Clone, Copy)]
pub enum ComponentRule {
    /// A fixed count, picked by inspection for the dataset at hand
    Fixed(usize),
    /// First component index where the decrease between consecutive
    /// sdev values falls below `drop_fraction` of the maximum decrease
    Elbow { drop_fraction: f32 },
}

/// Apply a component rule to a descending sdev sequence
pub fn choose_components(sdev: &[f32], rule: ComponentRule) -> anyhow::Result<usize> {
    if sdev.is_empty() {
        return Err(anyhow::anyhow!("empty sdev sequence"));
    }

    let k = match rule {
        ComponentRule::Fixed(k) => {
            if k == 0 || k > sdev.len() {
                return Err(anyhow::anyhow!(
                    "fixed k = {} out of range 1..={}",
                    k,
                    sdev.len()
                ));
            }
            k
        }
        ComponentRule::Elbow { drop_fraction } => {
            if !(0.0..1.0).contains(&drop_fraction) || drop_fraction <= 0.0 {
                return Err(anyhow::anyhow!(
                    "drop_fraction ({}) must be in (0, 1)",
                    drop_fraction
                ));
            }

            let drops: Vec<f32> = sdev.windows(2).map(|w| w[0] - w[1]).collect();
            let max_drop = drops.iter().cloned().fold(0.0f32, f32::max);

            if max_drop <= 0.0 {
                // flat spectrum; keep everything
                sdev.len()
            } else {
                drops
                    .iter()
                    .position(|&d| d < drop_fraction * max_drop)
                    .map(|i| i + 1)
                    .unwrap_or(sdev.len())
            }
        }
    };

    info!("using {} of {} principal components", k, sdev.len());
    Ok(k)
}
