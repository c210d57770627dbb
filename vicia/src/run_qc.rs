use crate::common::*;
use crate::input::DataArgs;

use sc_data::qc::{filter_cells, Filtered, QcBounds, DEFAULT_MITO_PREFIX};

#[derive(Args, Debug, Clone)]
pub struct QcOpts {
    /// Drop genes detected in fewer than this many cells
    #[arg(long, default_value_t = 3)]
    pub min_cells_per_gene: usize,

    /// Keep a cell only if it expresses more than this many genes
    #[arg(long, default_value_t = 200)]
    pub min_features: usize,

    /// Keep a cell only if it expresses fewer than this many genes
    #[arg(long, default_value_t = 3500)]
    pub max_features: usize,

    /// Keep a cell only if its mitochondrial percentage is below this
    #[arg(long, default_value_t = 8.0)]
    pub max_mito_pct: f32,

    /// Gene-name prefix marking mitochondrial genes (case-insensitive)
    #[arg(long, default_value = DEFAULT_MITO_PREFIX)]
    pub mito_prefix: Box<str>,
}

#[derive(Args, Debug)]
pub struct QcArgs {
    #[command(flatten)]
    pub data: DataArgs,

    #[command(flatten)]
    pub opts: QcOpts,

    /// Output header; writes `{out}.mtx.gz`, `{out}.rows.gz`,
    /// `{out}.cols.gz`, `{out}.qc_metrics.tsv.gz`
    #[arg(long, short, required = true)]
    pub out: Box<str>,
}

pub fn run_qc(args: &QcArgs) -> anyhow::Result<()> {
    let data = args.data.load()?;
    let filtered = qc_stage(&data, &args.opts)?;
    write_qc_outputs(&filtered, &args.out)
}

/// Gene filter then cell filter; pure given the input matrix
pub fn qc_stage(data: &SparseCounts, opts: &QcOpts) -> anyhow::Result<Filtered> {
    let bounds = QcBounds {
        min_features: opts.min_features,
        max_features: opts.max_features,
        max_mito_pct: opts.max_mito_pct,
    };
    bounds.validate()?;

    let data = data.filter_genes_by_min_cells(opts.min_cells_per_gene)?;
    filter_cells(&data, &bounds, &opts.mito_prefix)
}

pub fn write_qc_outputs(filtered: &Filtered, out: &str) -> anyhow::Result<()> {
    filtered.data.to_mtx(out)?;
    write_qc_metrics(filtered, &format!("{}.qc_metrics.tsv.gz", out))?;

    info!(
        "QC done: {} genes x {} cells -> {}",
        filtered.data.num_genes(),
        filtered.data.num_cells(),
        out
    );
    Ok(())
}

fn write_qc_metrics(filtered: &Filtered, file: &str) -> anyhow::Result<()> {
    let mut lines =
        vec!["#cell\ttotal_count\tn_features\tmito_pct".to_string().into_boxed_str()];
    for (name, qc) in filtered.data.cell_names().iter().zip(&filtered.metrics) {
        lines.push(
            format!(
                "{}\t{}\t{}\t{}",
                name, qc.total_count, qc.n_features, qc.mito_pct
            )
            .into_boxed_str(),
        );
    }
    write_lines(&lines, file)
}
