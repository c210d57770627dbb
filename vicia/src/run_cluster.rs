use crate::common::*;

use clap::ValueEnum;
use sc_alg::cluster::ClusterResult;
use sc_alg::kmeans::{KmeansArgs, KmeansRows};
use sc_alg::knn::KnnGraph;
use sc_alg::louvain::{louvain, LouvainArgs};

#[derive(ValueEnum, Clone, Debug, Default, PartialEq)]
#[clap(rename_all = "lowercase")]
pub enum ClusterMethod {
    /// Graph community detection on the kNN graph
    #[default]
    Louvain,
    /// k-means on the component scores
    Kmeans,
}

#[derive(Args, Debug, Clone)]
pub struct ClusterOpts {
    #[arg(long, short, value_enum, default_value = "louvain")]
    pub method: ClusterMethod,

    /// Neighbours per cell in the kNN graph
    #[arg(long, default_value_t = DEFAULT_KNN)]
    pub knn: usize,

    /// Louvain resolution; higher gives more, smaller clusters
    #[arg(long, short, default_value_t = 0.5)]
    pub resolution: f32,

    /// Number of clusters (k-means only)
    #[arg(long)]
    pub num_clusters: Option<usize>,

    #[arg(long, default_value_t = DEFAULT_SEED)]
    pub seed: u64,
}

#[derive(Args, Debug)]
pub struct ClusterArgs {
    /// Component scores from `vicia embed` (`{out}.pcs.tsv.gz`)
    #[arg(long, short = 'p', required = true)]
    pub pcs: Box<str>,

    #[command(flatten)]
    pub opts: ClusterOpts,

    /// Output header; writes `{out}.clusters.tsv.gz`
    #[arg(long, short, required = true)]
    pub out: Box<str>,
}

pub fn run_cluster(args: &ClusterArgs) -> anyhow::Result<()> {
    let (cell_names, scores) = read_named_matrix(&args.pcs)?;
    let clusters = cluster_stage(&scores, &args.opts)?;
    write_clusters(&cell_names, &clusters.labels, &format!("{}.clusters.tsv.gz", args.out))?;
    Ok(())
}

/// Group the rows of the cells × k score matrix
pub fn cluster_stage(scores: &Mat, opts: &ClusterOpts) -> anyhow::Result<ClusterResult> {
    info!(
        "clustering {} cells in {} dimensions",
        scores.nrows(),
        scores.ncols()
    );

    let clusters = match opts.method {
        ClusterMethod::Louvain => {
            let graph = KnnGraph::from_rows(scores, opts.knn)?;
            let out = louvain(
                &graph,
                &LouvainArgs {
                    resolution: opts.resolution,
                    seed: opts.seed,
                    ..Default::default()
                },
            )?;
            out.clusters
        }
        ClusterMethod::Kmeans => {
            let k = opts
                .num_clusters
                .ok_or_else(|| anyhow::anyhow!("k-means needs --num-clusters"))?;
            if k == 0 {
                return Err(anyhow::anyhow!("--num-clusters must be >= 1"));
            }
            scores.kmeans_rows(&KmeansArgs::with_clusters(k))
        }
    };

    eprintln!("{}", clusters.histogram_ascii(40, 20));
    Ok(clusters)
}
