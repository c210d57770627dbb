use crate::common::*;

/// A raw or QC-filtered dataset on disk: MatrixMarket counts plus
/// one-name-per-line gene and cell files
#[derive(Args, Debug, Clone)]
pub struct DataArgs {
    /// MatrixMarket count matrix (`.mtx` or `.mtx.gz`), genes × cells
    #[arg(long, required = true)]
    pub mtx: Box<str>,

    /// Gene names, one per line; `GENE_ENSG...` suffixes are stripped
    #[arg(long, required = true)]
    pub genes: Box<str>,

    /// Cell names, one per line
    #[arg(long, required = true)]
    pub cells: Box<str>,
}

impl DataArgs {
    pub fn load(&self) -> anyhow::Result<SparseCounts> {
        SparseCounts::from_mtx(&self.mtx, &self.genes, &self.cells)
    }
}
