use crate::common_io::*;
use crate::mtx_io::*;

use log::info;
use nalgebra_sparse::{CooMatrix, CscMatrix};
use std::collections::HashSet;

/// A gene × cell sparse count matrix with row and column names.
///
/// Rows are genes (features), columns are cells; values are
/// non-negative UMI counts. Gene names are plain symbols, unique after
/// stripping source-specific `_ENS...` identifier suffixes.
#[derive(Clone, Debug)]
pub struct SparseCounts {
    counts: CscMatrix<f32>,
    gene_names: Vec<Box<str>>,
    cell_names: Vec<Box<str>>,
}

/// Strip a trailing Ensembl identifier from a composite gene name,
/// e.g. `TH_ENSG00000180176` → `TH`. Names without such a suffix pass
/// through unchanged.
pub fn strip_ensembl_suffix(name: &str) -> Box<str> {
    if let Some(pos) = name.rfind('_') {
        let suffix = &name[pos + 1..];
        if suffix.starts_with("ENS") && suffix.chars().any(|c| c.is_ascii_digit()) {
            return name[..pos].into();
        }
    }
    name.into()
}

fn check_unique(names: &[Box<str>], what: &str) -> anyhow::Result<()> {
    let mut seen = HashSet::with_capacity(names.len());
    for name in names {
        if !seen.insert(name.as_ref()) {
            return Err(anyhow::anyhow!("duplicate {} name: {}", what, name));
        }
    }
    Ok(())
}

impl SparseCounts {
    /// Build from 0-based (row, column, value) triplets
    /// * `nrow` - number of genes
    /// * `ncol` - number of cells
    pub fn from_triplets(
        nrow: usize,
        ncol: usize,
        triplets: &[(u64, u64, f32)],
        gene_names: Vec<Box<str>>,
        cell_names: Vec<Box<str>>,
    ) -> anyhow::Result<Self> {
        if gene_names.len() != nrow {
            return Err(anyhow::anyhow!(
                "{} gene names for {} rows",
                gene_names.len(),
                nrow
            ));
        }
        if cell_names.len() != ncol {
            return Err(anyhow::anyhow!(
                "{} cell names for {} columns",
                cell_names.len(),
                ncol
            ));
        }
        if let Some(&(_, _, v)) = triplets.iter().find(|&&(_, _, v)| v < 0.0) {
            return Err(anyhow::anyhow!("negative count value: {}", v));
        }

        check_unique(&gene_names, "gene")?;
        check_unique(&cell_names, "cell")?;

        let (rows, (cols, vals)): (Vec<usize>, (Vec<usize>, Vec<f32>)) = triplets
            .iter()
            .map(|&(i, j, v)| (i as usize, (j as usize, v)))
            .unzip();

        let coo = CooMatrix::try_from_triplets(nrow, ncol, rows, cols, vals)
            .map_err(|e| anyhow::anyhow!("invalid triplets: {:?}", e))?;

        Ok(Self {
            counts: CscMatrix::from(&coo),
            gene_names,
            cell_names,
        })
    }

    /// Load from a MatrixMarket file with one-name-per-line gene and
    /// cell name files (any of them gzipped or not). Gene names are
    /// suffix-stripped on the way in.
    pub fn from_mtx(
        mtx_file: &str,
        gene_file: &str,
        cell_file: &str,
    ) -> anyhow::Result<Self> {
        let (triplets, (nrow, ncol, nnz)) = read_mtx_triplets(mtx_file)?;
        info!("{}: {} x {} with {} non-zeros", mtx_file, nrow, ncol, nnz);

        let gene_names: Vec<Box<str>> = read_lines(gene_file)?
            .iter()
            .map(|x| strip_ensembl_suffix(x))
            .collect();

        let cell_names = read_lines(cell_file)?;

        Self::from_triplets(nrow, ncol, &triplets, gene_names, cell_names)
    }

    pub fn num_genes(&self) -> usize {
        self.counts.nrows()
    }

    pub fn num_cells(&self) -> usize {
        self.counts.ncols()
    }

    pub fn counts(&self) -> &CscMatrix<f32> {
        &self.counts
    }

    pub fn gene_names(&self) -> &[Box<str>] {
        &self.gene_names
    }

    pub fn cell_names(&self) -> &[Box<str>] {
        &self.cell_names
    }

    /// 0-based non-zero triplets in column-major order
    pub fn to_triplets(&self) -> Vec<(u64, u64, f32)> {
        self.counts
            .triplet_iter()
            .map(|(i, j, &v)| (i as u64, j as u64, v))
            .collect()
    }

    /// Keep only the named columns, in the given order
    pub fn subset_cells(&self, cell_idx: &[usize]) -> anyhow::Result<Self> {
        for &j in cell_idx {
            if j >= self.num_cells() {
                return Err(anyhow::anyhow!("cell index {} out of range", j));
            }
        }

        let mut coo = CooMatrix::new(self.num_genes(), cell_idx.len());
        for (new_j, &old_j) in cell_idx.iter().enumerate() {
            let col = self.counts.col(old_j);
            for (&i, &v) in col.row_indices().iter().zip(col.values()) {
                coo.push(i, new_j, v);
            }
        }

        Ok(Self {
            counts: CscMatrix::from(&coo),
            gene_names: self.gene_names.clone(),
            cell_names: cell_idx.iter().map(|&j| self.cell_names[j].clone()).collect(),
        })
    }

    /// Keep only the named rows, in the given order
    pub fn subset_genes(&self, gene_idx: &[usize]) -> anyhow::Result<Self> {
        let mut old_to_new = vec![usize::MAX; self.num_genes()];
        for (new_i, &old_i) in gene_idx.iter().enumerate() {
            if old_i >= self.num_genes() {
                return Err(anyhow::anyhow!("gene index {} out of range", old_i));
            }
            old_to_new[old_i] = new_i;
        }

        let mut coo = CooMatrix::new(gene_idx.len(), self.num_cells());
        for (i, j, &v) in self.counts.triplet_iter() {
            let new_i = old_to_new[i];
            if new_i != usize::MAX {
                coo.push(new_i, j, v);
            }
        }

        Ok(Self {
            counts: CscMatrix::from(&coo),
            gene_names: gene_idx.iter().map(|&i| self.gene_names[i].clone()).collect(),
            cell_names: self.cell_names.clone(),
        })
    }

    /// Drop genes detected in fewer than `min_cells` cells.
    ///
    /// This is the only gene-narrowing step before feature selection;
    /// the downstream QC filter touches cells only.
    pub fn filter_genes_by_min_cells(&self, min_cells: usize) -> anyhow::Result<Self> {
        let mut cells_per_gene = vec![0usize; self.num_genes()];
        for (i, _, &v) in self.counts.triplet_iter() {
            if v > 0.0 {
                cells_per_gene[i] += 1;
            }
        }

        let keep: Vec<usize> = cells_per_gene
            .iter()
            .enumerate()
            .filter(|&(_, &n)| n >= min_cells)
            .map(|(i, _)| i)
            .collect();

        if keep.is_empty() {
            return Err(anyhow::anyhow!(
                "no gene detected in >= {} cells",
                min_cells
            ));
        }

        info!(
            "genes detected in >= {} cells: {} -> {}",
            min_cells,
            self.num_genes(),
            keep.len()
        );
        self.subset_genes(&keep)
    }

    /// Write `{prefix}.mtx.gz`, `{prefix}.rows.gz`, `{prefix}.cols.gz`
    pub fn to_mtx(&self, prefix: &str) -> anyhow::Result<()> {
        let triplets = self.to_triplets();
        write_mtx_triplets(
            &triplets,
            self.num_genes(),
            self.num_cells(),
            &format!("{}.mtx.gz", prefix),
        )?;
        write_lines(&self.gene_names, &format!("{}.rows.gz", prefix))?;
        write_lines(&self.cell_names, &format!("{}.cols.gz", prefix))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(prefix: &str, n: usize) -> Vec<Box<str>> {
        (0..n).map(|i| format!("{}{}", prefix, i).into_boxed_str()).collect()
    }

    #[test]
    fn suffix_stripping() {
        assert_eq!(strip_ensembl_suffix("TH_ENSG00000180176").as_ref(), "TH");
        assert_eq!(strip_ensembl_suffix("MT-ND1_ENSG00000198888").as_ref(), "MT-ND1");
        assert_eq!(strip_ensembl_suffix("HLA_DRB1").as_ref(), "HLA_DRB1");
        assert_eq!(strip_ensembl_suffix("GAPDH").as_ref(), "GAPDH");
    }

    #[test]
    fn duplicate_gene_names_fail() {
        let triplets = vec![(0u64, 0u64, 1.0f32)];
        let genes: Vec<Box<str>> = vec!["TH".into(), "TH".into()];
        let ret = SparseCounts::from_triplets(2, 1, &triplets, genes, names("c", 1));
        assert!(ret.is_err());
    }

    #[test]
    fn gene_min_cells_filter() {
        // gene 0 in two cells, gene 1 in one cell
        let triplets = vec![(0u64, 0u64, 1.0f32), (0, 1, 2.0), (1, 0, 3.0)];
        let data =
            SparseCounts::from_triplets(2, 3, &triplets, names("g", 2), names("c", 3)).unwrap();

        let filtered = data.filter_genes_by_min_cells(2).unwrap();
        assert_eq!(filtered.num_genes(), 1);
        assert_eq!(filtered.gene_names()[0].as_ref(), "g0");
        assert_eq!(filtered.num_cells(), 3);
    }

    #[test]
    fn cell_subsetting_preserves_counts() {
        let triplets = vec![(0u64, 0u64, 1.0f32), (1, 1, 2.0), (0, 2, 3.0)];
        let data =
            SparseCounts::from_triplets(2, 3, &triplets, names("g", 2), names("c", 3)).unwrap();

        let sub = data.subset_cells(&[2, 0]).unwrap();
        assert_eq!(sub.num_cells(), 2);
        assert_eq!(sub.cell_names()[0].as_ref(), "c2");
        assert_eq!(sub.counts().get_entry(0, 0).unwrap().into_value(), 3.0);
        assert_eq!(sub.counts().get_entry(0, 1).unwrap().into_value(), 1.0);
    }

    #[test]
    fn mtx_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("out");
        let prefix = prefix.to_str().unwrap();

        let triplets = vec![(0u64, 0u64, 1.0f32), (1, 1, 2.0)];
        let data =
            SparseCounts::from_triplets(2, 2, &triplets, names("g", 2), names("c", 2)).unwrap();
        data.to_mtx(prefix).unwrap();

        let back = SparseCounts::from_mtx(
            &format!("{}.mtx.gz", prefix),
            &format!("{}.rows.gz", prefix),
            &format!("{}.cols.gz", prefix),
        )
        .unwrap();

        assert_eq!(back.num_genes(), 2);
        assert_eq!(back.counts().get_entry(1, 1).unwrap().into_value(), 2.0);
    }
}
