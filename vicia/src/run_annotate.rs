use crate::common::*;

use sc_alg::labeling::LabelMap;
use sc_data::qc::CellQcMetrics;

#[derive(Args, Debug)]
pub struct AnnotateArgs {
    /// Cluster assignments from `vicia cluster`
    #[arg(long, short = 'c', required = true)]
    pub clusters: Box<str>,

    /// Two-column `cluster<TAB>cell type` table; must cover every
    /// cluster exactly
    #[arg(long, short = 'l', required = true)]
    pub labels: Box<str>,

    /// QC metrics from `vicia qc`, copied into the output
    #[arg(long)]
    pub qc_metrics: Option<Box<str>>,

    /// Component scores; the first two become plot coordinates
    #[arg(long, short = 'p')]
    pub pcs: Option<Box<str>>,

    /// Output header; writes `{out}.annotated.tsv.gz`
    #[arg(long, short, required = true)]
    pub out: Box<str>,
}

pub fn run_annotate(args: &AnnotateArgs) -> anyhow::Result<()> {
    let (cell_names, clusters) = read_clusters(&args.clusters)?;

    let coords = match &args.pcs {
        Some(pcs_file) => {
            let (pc_cells, scores) = read_named_matrix(pcs_file)?;
            check_same_cells(&cell_names, &pc_cells)?;
            Some(scores)
        }
        None => None,
    };

    let metrics = match &args.qc_metrics {
        Some(qc_file) => {
            let (qc_cells, metrics) = read_qc_metrics(qc_file)?;
            check_same_cells(&cell_names, &qc_cells)?;
            Some(metrics)
        }
        None => None,
    };

    annotate_stage(
        &cell_names,
        &clusters,
        &args.labels,
        metrics.as_deref(),
        coords.as_ref(),
        &args.out,
    )
}

/// Substitute cell-type names for cluster ids and write the annotated
/// per-cell table, with QC metrics and 2-D coordinates when available
pub fn annotate_stage(
    cell_names: &[Box<str>],
    clusters: &[usize],
    labels_file: &str,
    metrics: Option<&[CellQcMetrics]>,
    coords: Option<&Mat>,
    out: &str,
) -> anyhow::Result<()> {
    let label_map = LabelMap::from_tsv(labels_file)?;
    let cell_types = label_map.apply(clusters)?;

    if let Some(scores) = coords {
        if scores.ncols() < 2 {
            return Err(anyhow::anyhow!("need at least 2 components for coordinates"));
        }
    }

    let mut header = String::from("#cell\tcluster\tcell_type");
    if metrics.is_some() {
        header.push_str("\ttotal_count\tn_features\tmito_pct");
    }
    if coords.is_some() {
        header.push_str("\tx\ty");
    }

    let mut lines = vec![header.into_boxed_str()];
    for (j, name) in cell_names.iter().enumerate() {
        let mut fields = format!("{}\t{}\t{}", name, clusters[j], cell_types[j]);
        if let Some(qc) = metrics {
            fields.push_str(&format!(
                "\t{}\t{}\t{}",
                qc[j].total_count, qc[j].n_features, qc[j].mito_pct
            ));
        }
        if let Some(scores) = coords {
            fields.push_str(&format!("\t{}\t{}", scores[(j, 0)], scores[(j, 1)]));
        }
        lines.push(fields.into_boxed_str());
    }

    write_lines(&lines, &format!("{}.annotated.tsv.gz", out))?;
    info!("annotated {} cells", cell_names.len());
    Ok(())
}

/// Read a `#cell<TAB>total_count<TAB>n_features<TAB>mito_pct` table back
fn read_qc_metrics(file: &str) -> anyhow::Result<(Vec<Box<str>>, Vec<CellQcMetrics>)> {
    let rows = read_lines_of_words(file)?;
    let mut names = Vec::with_capacity(rows.len());
    let mut metrics = Vec::with_capacity(rows.len());
    for row in &rows {
        if row.len() != 4 {
            return Err(anyhow::anyhow!("malformed QC metrics file: {}", file));
        }
        names.push(row[0].clone());
        metrics.push(CellQcMetrics {
            total_count: row[1].parse::<f32>()?,
            n_features: row[2].parse::<usize>()?,
            mito_pct: row[3].parse::<f32>()?,
        });
    }
    Ok((names, metrics))
}
