mod common;
mod input;
mod run_annotate;
mod run_cluster;
mod run_embed;
mod run_markers;
mod run_pipeline;
mod run_qc;
mod run_simulate;

use clap::{Parser, Subcommand};
use log::info;
use rayon::ThreadPoolBuilder;

use run_annotate::{run_annotate, AnnotateArgs};
use run_cluster::{run_cluster, ClusterArgs};
use run_embed::{run_embed, EmbedArgs};
use run_markers::{run_markers, MarkersArgs};
use run_pipeline::{run_pipeline, RunArgs};
use run_qc::{run_qc, QcArgs};
use run_simulate::{run_simulate, SimulateArgs};

#[derive(Parser, Debug)]
#[command(version, about, long_about, term_width = 80)]
struct Cli {
    /// Maximum number of worker threads (defaults to the CPU count)
    #[arg(long, global = true)]
    threads: Option<usize>,

    #[command(subcommand)]
    commands: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Filter genes and cells on count-based quality metrics
    Qc(QcArgs),
    /// Normalize, select variable genes, scale, and embed by PCA
    Embed(EmbedArgs),
    /// Group cells on the component scores
    Cluster(ClusterArgs),
    /// Rank cluster-vs-rest marker genes
    Markers(MarkersArgs),
    /// Substitute cell-type names for cluster numbers
    Annotate(AnnotateArgs),
    /// Run every stage in order over one input
    Run(RunArgs),
    /// Sample a Poisson-Gamma count matrix for smoke testing
    Simulate(SimulateArgs),
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    let max_threads = num_cpus::get().min(cli.threads.unwrap_or(usize::MAX).max(1));
    ThreadPoolBuilder::new()
        .num_threads(max_threads)
        .build_global()?;
    info!("will use {} threads", rayon::current_num_threads());

    match &cli.commands {
        Commands::Qc(args) => {
            run_qc(args)?;
        }
        Commands::Embed(args) => {
            run_embed(args)?;
        }
        Commands::Cluster(args) => {
            run_cluster(args)?;
        }
        Commands::Markers(args) => {
            run_markers(args)?;
        }
        Commands::Annotate(args) => {
            run_annotate(args)?;
        }
        Commands::Run(args) => {
            run_pipeline(args)?;
        }
        Commands::Simulate(args) => {
            run_simulate(args)?;
        }
    }

    Ok(())
}
