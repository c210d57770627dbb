use crate::common::*;
use crate::input::DataArgs;
use crate::run_annotate::annotate_stage;
use crate::run_cluster::{cluster_stage, ClusterOpts};
use crate::run_embed::{embed_stage, EmbedOpts};
use crate::run_markers::{markers_stage, MarkerOpts};
use crate::run_qc::{qc_stage, write_qc_outputs, QcOpts};

/// Every stage in order over one input: QC, embedding, clustering,
/// markers, and annotation when a label table is given. Each stage is
/// a function of the previous stage's value; nothing is mutated in
/// place between stages, and every intermediate table still lands on
/// disk under the shared output header.
#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub data: DataArgs,

    #[command(flatten)]
    pub qc: QcOpts,

    #[command(flatten)]
    pub embed: EmbedOpts,

    #[command(flatten)]
    pub cluster: ClusterOpts,

    #[command(flatten)]
    pub markers: MarkerOpts,

    /// Cluster to cell-type table; annotation is skipped without it
    #[arg(long, short = 'l')]
    pub labels: Option<Box<str>>,

    /// Output header shared by all stage files
    #[arg(long, short, required = true)]
    pub out: Box<str>,
}

pub fn run_pipeline(args: &RunArgs) -> anyhow::Result<()> {
    let raw = args.data.load()?;

    let filtered = qc_stage(&raw, &args.qc)?;
    write_qc_outputs(&filtered, &format!("{}.qc", args.out))?;

    let scores = embed_stage(&filtered.data, &args.embed, &args.out)?;

    let clusters = cluster_stage(&scores, &args.cluster)?;
    write_clusters(
        filtered.data.cell_names(),
        &clusters.labels,
        &format!("{}.clusters.tsv.gz", args.out),
    )?;

    markers_stage(
        &filtered.data,
        &clusters.labels,
        args.embed.scale_factor,
        &args.markers,
        &args.out,
    )?;

    match &args.labels {
        Some(labels) => {
            annotate_stage(
                filtered.data.cell_names(),
                &clusters.labels,
                labels,
                Some(&filtered.metrics),
                Some(&scores),
                &args.out,
            )?;
        }
        None => {
            info!("no label table given; skipping annotation");
        }
    }

    info!("pipeline done: {}", args.out);
    Ok(())
}
