use crate::common::*;
use crate::input::DataArgs;

use sc_alg::cell_cycle::{assign_phase, module_score};
use sc_alg::feature_selection::{select_highly_variable, FeatureSelection};
use sc_alg::normalization::LogNormalizeOp;
use sc_alg::pca::{choose_components, pca, ComponentRule, Pca};
use sc_alg::scaling::{regress_out, ScaleRowsOp};

#[derive(Args, Debug, Clone)]
pub struct EmbedOpts {
    /// Per-cell total after count normalization, before `ln(1+x)`
    #[arg(long, default_value_t = 1e4)]
    pub scale_factor: f32,

    /// Number of highly variable features carried into PCA
    #[arg(long, default_value_t = 2000)]
    pub n_variable_features: usize,

    /// Clip standardized expression at this magnitude
    #[arg(long, default_value_t = 10.0)]
    pub clip: f32,

    /// Number of principal components to compute
    #[arg(long, default_value_t = 50)]
    pub max_components: usize,

    /// Number of principal components carried downstream, a
    /// dataset-specific choice made by inspection
    #[arg(long, default_value_t = 18)]
    pub n_components: usize,

    /// Pick the component count automatically instead: the first
    /// consecutive sdev drop below this fraction of the largest drop
    #[arg(long)]
    pub elbow_drop_fraction: Option<f32>,

    /// S-phase gene symbols, one per line; enables cell-cycle scoring
    #[arg(long)]
    pub s_genes: Option<Box<str>>,

    /// G2M-phase gene symbols, one per line
    #[arg(long)]
    pub g2m_genes: Option<Box<str>>,

    /// Regress the cell-cycle scores out before scaling; off by
    /// default, and never decided automatically
    #[arg(long, default_value_t = false)]
    pub regress_covariates: bool,
}

#[derive(Args, Debug)]
pub struct EmbedArgs {
    #[command(flatten)]
    pub data: DataArgs,

    #[command(flatten)]
    pub opts: EmbedOpts,

    /// Output header; writes `{out}.pcs.tsv.gz`, `{out}.sdev.tsv.gz`,
    /// `{out}.hvg.tsv.gz`, and `{out}.cell_cycle.tsv.gz` when scored
    #[arg(long, short, required = true)]
    pub out: Box<str>,
}

pub fn run_embed(args: &EmbedArgs) -> anyhow::Result<()> {
    let data = args.data.load()?;
    embed_stage(&data, &args.opts, &args.out)?;
    Ok(())
}

/// Normalize, select features, scale, and embed; writes the side
/// tables and returns the kept cells × k component scores
pub fn embed_stage(
    data: &SparseCounts,
    opts: &EmbedOpts,
    out: &str,
) -> anyhow::Result<Mat> {
    if data.num_cells() < 2 {
        return Err(anyhow::anyhow!(
            "need at least 2 cells to embed ({} given)",
            data.num_cells()
        ));
    }
    if opts.scale_factor <= 0.0 {
        return Err(anyhow::anyhow!(
            "scale_factor ({}) must be positive",
            opts.scale_factor
        ));
    }
    if opts.n_components > opts.max_components {
        return Err(anyhow::anyhow!(
            "n_components ({}) exceeds max_components ({})",
            opts.n_components,
            opts.max_components
        ));
    }
    if opts.regress_covariates && opts.s_genes.is_none() {
        return Err(anyhow::anyhow!(
            "--regress-covariates needs --s-genes/--g2m-genes scores"
        ));
    }

    info!("normalizing {} cells", data.num_cells());
    let log_norm = data.counts().log_normalize(opts.scale_factor);

    let selection =
        select_highly_variable(&log_norm, data.gene_names(), opts.n_variable_features)?;
    write_hvg_table(&selection, data.gene_names(), &format!("{}.hvg.tsv.gz", out))?;

    // optional cell-cycle scores; used as covariates only on request
    let covariates = cell_cycle_scores(opts, data, &log_norm, out)?;

    let mut dense = dense_hvg_matrix(&log_norm, &selection.selected_indices);
    if opts.regress_covariates {
        let cov = covariates
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("no covariates to regress"))?;
        info!("regressing {} covariates out of {} genes", cov.ncols(), dense.nrows());
        dense = regress_out(&dense, cov)?;
    }
    let scaled = dense.scale_rows(opts.clip);

    let Pca { scores, sdev } = pca(&scaled, opts.max_components.min(data.num_cells() - 1))?;

    let rule = match opts.elbow_drop_fraction {
        Some(fraction) => ComponentRule::Elbow { drop_fraction: fraction },
        None => ComponentRule::Fixed(opts.n_components.min(sdev.len())),
    };
    let k = choose_components(&sdev, rule)?;

    let kept = scores.columns(0, k).into_owned();
    write_named_matrix(&kept, data.cell_names(), "PC", &format!("{}.pcs.tsv.gz", out))?;

    let sdev_lines: Vec<Box<str>> =
        sdev.iter().map(|s| format!("{}", s).into_boxed_str()).collect();
    write_lines(&sdev_lines, &format!("{}.sdev.tsv.gz", out))?;

    info!("embedding done: {} cells x {} components", kept.nrows(), k);
    Ok(kept)
}

/// Score S/G2M gene modules if given; returns the cells × 2 covariate
/// matrix and writes the per-cell phase table
fn cell_cycle_scores(
    opts: &EmbedOpts,
    data: &SparseCounts,
    log_norm: &CscMat,
    out: &str,
) -> anyhow::Result<Option<Mat>> {
    let (s_file, g2m_file) = match (&opts.s_genes, &opts.g2m_genes) {
        (Some(s), Some(g)) => (s, g),
        (None, None) => return Ok(None),
        _ => {
            return Err(anyhow::anyhow!(
                "cell-cycle scoring needs both --s-genes and --g2m-genes"
            ))
        }
    };

    let s_set = read_lines(s_file)?;
    let g2m_set = read_lines(g2m_file)?;

    let s_scores = module_score(log_norm, data.gene_names(), &s_set)?;
    let g2m_scores = module_score(log_norm, data.gene_names(), &g2m_set)?;

    let mut lines = vec!["#cell\ts_score\tg2m_score\tphase".to_string().into_boxed_str()];
    for (j, name) in data.cell_names().iter().enumerate() {
        let phase = assign_phase(s_scores[j], g2m_scores[j]);
        lines.push(
            format!("{}\t{}\t{}\t{}", name, s_scores[j], g2m_scores[j], phase)
                .into_boxed_str(),
        );
    }
    write_lines(&lines, &format!("{}.cell_cycle.tsv.gz", out))?;

    let n = data.num_cells();
    let mut cov = Mat::zeros(n, 2);
    for j in 0..n {
        cov[(j, 0)] = s_scores[j];
        cov[(j, 1)] = g2m_scores[j];
    }
    Ok(Some(cov))
}

/// Densify the selected rows of the log-normalized matrix
fn dense_hvg_matrix(log_norm: &CscMat, selected: &[usize]) -> Mat {
    let mut new_row = vec![usize::MAX; log_norm.nrows()];
    for (new_i, &old_i) in selected.iter().enumerate() {
        new_row[old_i] = new_i;
    }

    let mut dense = Mat::zeros(selected.len(), log_norm.ncols());
    for (i, j, &v) in log_norm.triplet_iter() {
        if new_row[i] != usize::MAX {
            dense[(new_row[i], j)] = v;
        }
    }
    dense
}

fn write_hvg_table(
    selection: &FeatureSelection,
    gene_names: &[Box<str>],
    file: &str,
) -> anyhow::Result<()> {
    let mut lines = vec!["#gene\tmean\tvariance\tselected".to_string().into_boxed_str()];
    for (i, gene) in gene_names.iter().enumerate() {
        lines.push(
            format!(
                "{}\t{}\t{}\t{}",
                gene,
                selection.gene_mean[i],
                selection.gene_variance[i],
                selection.index_map.contains_key(&i) as u8
            )
            .into_boxed_str(),
        );
    }
    write_lines(&lines, file)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> EmbedOpts {
        EmbedOpts {
            scale_factor: 1e4,
            n_variable_features: 1,
            clip: 10.0,
            max_components: 5,
            n_components: 2,
            elbow_drop_fraction: None,
            s_genes: None,
            g2m_genes: None,
            regress_covariates: false,
        }
    }

    #[test]
    fn too_few_cells_is_an_error() {
        let genes: Vec<Box<str>> = vec!["g0".into(), "g1".into()];

        let one = SparseCounts::from_triplets(
            2,
            1,
            &[(0u64, 0u64, 1.0f32), (1, 0, 2.0)],
            genes.clone(),
            vec!["c0".into()],
        )
        .unwrap();
        assert!(embed_stage(&one, &opts(), "unused").is_err());

        let none = SparseCounts::from_triplets(2, 0, &[], genes, vec![]).unwrap();
        assert!(embed_stage(&none, &opts(), "unused").is_err());
    }
}
