use crate::common::*;
use crate::input::DataArgs;

use sc_alg::markers::{rank_markers, MarkerArgs, MarkerGene};
use sc_alg::normalization::LogNormalizeOp;

#[derive(Args, Debug, Clone)]
pub struct MarkerOpts {
    /// Screen out genes expressed in less than this fraction on both
    /// sides of the one-vs-rest split
    #[arg(long, default_value_t = 0.25)]
    pub min_pct: f32,

    /// Minimum natural-log fold change, cluster vs rest
    #[arg(long, default_value_t = 0.25)]
    pub log_fc_threshold: f32,

    /// Keep this many top markers per cluster (0 keeps all)
    #[arg(long, default_value_t = 0)]
    pub top: usize,
}

#[derive(Args, Debug)]
pub struct MarkersArgs {
    /// QC-filtered counts, the same cells the clustering saw
    #[command(flatten)]
    pub data: DataArgs,

    /// Cluster assignments from `vicia cluster`
    #[arg(long, short = 'c', required = true)]
    pub clusters: Box<str>,

    #[arg(long, default_value_t = 1e4)]
    pub scale_factor: f32,

    #[command(flatten)]
    pub opts: MarkerOpts,

    /// Output header; writes `{out}.markers.tsv.gz`
    #[arg(long, short, required = true)]
    pub out: Box<str>,
}

pub fn run_markers(args: &MarkersArgs) -> anyhow::Result<()> {
    let data = args.data.load()?;
    let (cluster_cells, clusters) = read_clusters(&args.clusters)?;
    check_same_cells(data.cell_names(), &cluster_cells)?;

    markers_stage(&data, &clusters, args.scale_factor, &args.opts, &args.out)
}

/// Rank one-vs-rest markers and write the table
pub fn markers_stage(
    data: &SparseCounts,
    clusters: &[usize],
    scale_factor: f32,
    opts: &MarkerOpts,
    out: &str,
) -> anyhow::Result<()> {
    let thresholds = MarkerArgs {
        min_pct: opts.min_pct,
        log_fc_threshold: opts.log_fc_threshold,
    };
    thresholds.validate()?;

    let log_norm = data.counts().log_normalize(scale_factor);
    let per_cluster = rank_markers(&log_norm, data.gene_names(), clusters, &thresholds)?;

    write_marker_table(&per_cluster, opts.top, &format!("{}.markers.tsv.gz", out))?;

    for (c, markers) in per_cluster.iter().enumerate() {
        let preview: Vec<&str> =
            markers.iter().take(5).map(|m| m.gene.as_ref()).collect();
        info!("cluster {}: {} markers ({})", c, markers.len(), preview.join(", "));
    }
    Ok(())
}

fn write_marker_table(
    per_cluster: &[Vec<MarkerGene>],
    top: usize,
    file: &str,
) -> anyhow::Result<()> {
    let mut lines = vec![
        "#cluster\tgene\tlog_fc\tpct_in\tpct_out\tp_value\tp_adjusted"
            .to_string()
            .into_boxed_str(),
    ];

    for markers in per_cluster {
        let take = if top == 0 { markers.len() } else { top.min(markers.len()) };
        for m in &markers[..take] {
            lines.push(
                format!(
                    "{}\t{}\t{}\t{}\t{}\t{:e}\t{:e}",
                    m.cluster, m.gene, m.log_fc, m.pct_in, m.pct_out, m.p_value, m.p_adjusted
                )
                .into_boxed_str(),
            );
        }
    }
    write_lines(&lines, file)
}
