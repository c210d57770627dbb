use crate::common::*;

use sc_data::simulate::{generate_poisson_gamma_data, SimArgs};

#[derive(Args, Debug)]
pub struct SimulateArgs {
    #[arg(long, short = 'r', default_value_t = 100)]
    pub n_genes: usize,

    #[arg(long, short = 'c', default_value_t = 500)]
    pub n_cells: usize,

    /// Number of latent factors the counts are drawn from
    #[arg(long, short = 'k', default_value_t = 3)]
    pub n_factors: usize,

    /// Expected total count per cell
    #[arg(long, short = 'd', default_value_t = 1000.0)]
    pub depth: f32,

    /// Leading genes named with the mitochondrial prefix
    #[arg(long, default_value_t = 5)]
    pub n_mito_genes: usize,

    #[arg(long, default_value_t = DEFAULT_SEED)]
    pub seed: u64,

    /// Output header; writes `{out}.mtx.gz`, `{out}.rows.gz`,
    /// `{out}.cols.gz`
    #[arg(long, short, required = true)]
    pub out: Box<str>,
}

pub fn run_simulate(args: &SimulateArgs) -> anyhow::Result<()> {
    let sim = SimArgs {
        n_genes: args.n_genes,
        n_cells: args.n_cells,
        n_factors: args.n_factors,
        depth: args.depth,
        n_mito_genes: args.n_mito_genes,
        seed: args.seed,
    };

    let data = generate_poisson_gamma_data(&sim)?;
    data.to_mtx(&args.out)?;

    info!(
        "simulated {} genes x {} cells -> {}",
        data.num_genes(),
        data.num_cells(),
        args.out
    );
    Ok(())
}
