use crate::dataset::SparseCounts;

use log::info;

/// Default naming pattern for mitochondrial genes (human `MT-ND1` etc.)
pub const DEFAULT_MITO_PREFIX: &str = "MT-";

/// Per-cell quality control metrics
#[derive(Debug, Clone, PartialEq)]
pub struct CellQcMetrics {
    /// Total UMI count over all genes
    pub total_count: f32,
    /// Number of genes with non-zero expression
    pub n_features: usize,
    /// Percentage of counts on mitochondrial genes, in [0, 100];
    /// 0.0 by convention when the cell has no counts at all
    pub mito_pct: f32,
}

/// Cell retention bounds; all strict inequalities
#[derive(Debug, Clone, Copy)]
pub struct QcBounds {
    pub min_features: usize,
    pub max_features: usize,
    pub max_mito_pct: f32,
}

impl QcBounds {
    /// Fail fast on inconsistent thresholds, before any computation
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.min_features >= self.max_features {
            return Err(anyhow::anyhow!(
                "min_features ({}) must be < max_features ({})",
                self.min_features,
                self.max_features
            ));
        }
        if self.max_mito_pct <= 0.0 || self.max_mito_pct > 100.0 {
            return Err(anyhow::anyhow!(
                "max_mito_pct ({}) must be in (0, 100]",
                self.max_mito_pct
            ));
        }
        Ok(())
    }

    /// `min_features < n_features < max_features` and
    /// `mito_pct < max_mito_pct`, all strict
    pub fn retain(&self, qc: &CellQcMetrics) -> bool {
        qc.n_features > self.min_features
            && qc.n_features < self.max_features
            && qc.mito_pct < self.max_mito_pct
    }
}

/// The QC filter removed every cell
#[derive(Debug, thiserror::Error)]
#[error(
    "no cell passed QC ({n_cells} filtered out); \
     check min_features/max_features/max_mito_pct against the data"
)]
pub struct EmptyResultError {
    pub n_cells: usize,
}

/// QC-filtered dataset: the reduced matrix, which input columns
/// survived, and the survivors' metrics
#[derive(Debug)]
pub struct Filtered {
    pub data: SparseCounts,
    pub retained_cells: Vec<usize>,
    pub metrics: Vec<CellQcMetrics>,
}

/// Compute per-cell QC metrics in one deterministic pass over the
/// columns of the count matrix
/// * `data` - gene × cell counts
/// * `mito_prefix` - gene-name prefix marking mitochondrial genes
///   (case-insensitive)
pub fn cell_qc_metrics(data: &SparseCounts, mito_prefix: &str) -> Vec<CellQcMetrics> {
    let prefix = mito_prefix.to_uppercase();
    let is_mito: Vec<bool> = data
        .gene_names()
        .iter()
        .map(|g| g.to_uppercase().starts_with(&prefix))
        .collect();

    let counts = data.counts();

    (0..data.num_cells())
        .map(|j| {
            let col = counts.col(j);
            let mut total = 0.0f32;
            let mut mito = 0.0f32;
            let mut n_features = 0usize;

            for (&i, &v) in col.row_indices().iter().zip(col.values()) {
                if v > 0.0 {
                    n_features += 1;
                    total += v;
                    if is_mito[i] {
                        mito += v;
                    }
                }
            }

            let mito_pct = if total > 0.0 { mito / total * 100.0 } else { 0.0 };

            CellQcMetrics {
                total_count: total,
                n_features,
                mito_pct,
            }
        })
        .collect()
}

/// Remove cells outside the configured bounds. A single deterministic
/// pass; the gene set is never touched here.
///
/// * `data` - gene × cell counts
/// * `bounds` - strict retention bounds, validated before use
/// * `mito_prefix` - mitochondrial gene-name prefix
pub fn filter_cells(
    data: &SparseCounts,
    bounds: &QcBounds,
    mito_prefix: &str,
) -> anyhow::Result<Filtered> {
    bounds.validate()?;

    let metrics = cell_qc_metrics(data, mito_prefix);

    let retained_cells: Vec<usize> = metrics
        .iter()
        .enumerate()
        .filter(|(_, qc)| bounds.retain(qc))
        .map(|(j, _)| j)
        .collect();

    if retained_cells.is_empty() {
        return Err(EmptyResultError {
            n_cells: data.num_cells(),
        }
        .into());
    }

    info!(
        "QC filter: {} -> {} cells ({} removed)",
        data.num_cells(),
        retained_cells.len(),
        data.num_cells() - retained_cells.len()
    );

    let filtered = data.subset_cells(&retained_cells)?;
    let metrics = retained_cells.iter().map(|&j| metrics[j].clone()).collect();

    Ok(Filtered {
        data: filtered,
        retained_cells,
        metrics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn names(prefix: &str, n: usize) -> Vec<Box<str>> {
        (0..n).map(|i| format!("{}{}", prefix, i).into_boxed_str()).collect()
    }

    fn toy() -> SparseCounts {
        // genes: MT-ND1, TH, GAPDH; cells: c0..c3
        //   c0: MT-ND1=8, TH=92        (mito 8%, 2 features)
        //   c1: TH=5, GAPDH=5          (mito 0%, 2 features)
        //   c2: MT-ND1=50, GAPDH=50    (mito 50%, 2 features)
        //   c3: TH=1                   (1 feature)
        let triplets = vec![
            (0u64, 0u64, 8.0f32),
            (1, 0, 92.0),
            (1, 1, 5.0),
            (2, 1, 5.0),
            (0, 2, 50.0),
            (2, 2, 50.0),
            (1, 3, 1.0),
        ];
        let genes: Vec<Box<str>> = vec!["MT-ND1".into(), "TH".into(), "GAPDH".into()];
        SparseCounts::from_triplets(3, 4, &triplets, genes, names("c", 4)).unwrap()
    }

    #[test]
    fn mito_pct_is_exact() {
        let qc = cell_qc_metrics(&toy(), DEFAULT_MITO_PREFIX);
        assert_relative_eq!(qc[0].total_count, 100.0);
        assert_relative_eq!(qc[0].mito_pct, 8.0);
        assert_relative_eq!(qc[1].mito_pct, 0.0);
        assert_relative_eq!(qc[2].mito_pct, 50.0);
    }

    #[test]
    fn zero_total_cell_has_zero_mito() {
        let triplets = vec![(0u64, 0u64, 1.0f32)];
        let genes: Vec<Box<str>> = vec!["MT-ND1".into()];
        let data = SparseCounts::from_triplets(1, 2, &triplets, genes, names("c", 2)).unwrap();

        let qc = cell_qc_metrics(&data, DEFAULT_MITO_PREFIX);
        assert_eq!(qc[1].n_features, 0);
        assert_relative_eq!(qc[1].mito_pct, 0.0);
    }

    #[test]
    fn bounds_are_strict() {
        let bounds = QcBounds {
            min_features: 1,
            max_features: 3,
            max_mito_pct: 50.0,
        };
        let out = filter_cells(&toy(), &bounds, DEFAULT_MITO_PREFIX).unwrap();

        // c2 fails mito_pct < 50 (exactly 50); c3 fails n_features > 1
        assert_eq!(out.retained_cells, vec![0, 1]);
        for qc in &out.metrics {
            assert!(qc.n_features > bounds.min_features);
            assert!(qc.n_features < bounds.max_features);
            assert!(qc.mito_pct < bounds.max_mito_pct);
        }
    }

    #[test]
    fn filter_is_idempotent() {
        let bounds = QcBounds {
            min_features: 1,
            max_features: 3,
            max_mito_pct: 50.0,
        };
        let once = filter_cells(&toy(), &bounds, DEFAULT_MITO_PREFIX).unwrap();
        let twice = filter_cells(&once.data, &bounds, DEFAULT_MITO_PREFIX).unwrap();

        assert_eq!(twice.data.num_cells(), once.data.num_cells());
        assert_eq!(twice.metrics, once.metrics);
    }

    #[test]
    fn empty_result_is_typed() {
        let bounds = QcBounds {
            min_features: 10,
            max_features: 20,
            max_mito_pct: 1.0,
        };
        let err = filter_cells(&toy(), &bounds, DEFAULT_MITO_PREFIX).unwrap_err();
        assert!(err.downcast_ref::<EmptyResultError>().is_some());
    }

    #[test]
    fn synthetic_end_to_end_scenario() {
        // 10 genes x 20 cells; gene 0 is mitochondrial; cell j
        // expresses genes 0..(j % 10 + 1) with unit counts, so
        // mito_pct = 100 / n_features
        let mut triplets = vec![];
        for j in 0..20u64 {
            for i in 0..(j % 10 + 1) {
                triplets.push((i, j, 1.0f32));
            }
        }
        let mut genes = names("g", 10);
        genes[0] = "MT-X".into();
        let data =
            SparseCounts::from_triplets(10, 20, &triplets, genes, names("c", 20)).unwrap();

        let bounds = QcBounds {
            min_features: 1,
            max_features: 9,
            max_mito_pct: 50.0,
        };
        let out = filter_cells(&data, &bounds, DEFAULT_MITO_PREFIX).unwrap();

        // survivors need 1 < n_features < 9 and 100 / n_features < 50
        let expected: Vec<usize> =
            (0..20).filter(|j| (3..=8).contains(&(j % 10 + 1))).collect();
        assert_eq!(out.retained_cells, expected);

        for (&old_j, qc) in out.retained_cells.iter().zip(&out.metrics) {
            assert_eq!(qc.n_features, old_j % 10 + 1);
        }

        // counts carry over unchanged
        for (new_j, &old_j) in out.retained_cells.iter().enumerate() {
            for i in 0..10 {
                assert_eq!(
                    out.data.counts().get_entry(i, new_j).unwrap().into_value(),
                    data.counts().get_entry(i, old_j).unwrap().into_value()
                );
            }
        }
    }

    #[test]
    fn inconsistent_bounds_fail_fast() {
        let bounds = QcBounds {
            min_features: 300,
            max_features: 200,
            max_mito_pct: 8.0,
        };
        assert!(bounds.validate().is_err());
    }
}
