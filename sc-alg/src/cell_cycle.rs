use fnv::FnvHashSet;
use log::warn;
use nalgebra_sparse::CscMatrix;

/// Cell-cycle phase call from S and G2M module scores
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    G1,
    S,
    G2M,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::G1 => write!(f, "G1"),
            Phase::S => write!(f, "S"),
            Phase::G2M => write!(f, "G2M"),
        }
    }
}

/// Per-cell module score: mean log-normalized expression of the gene
/// set minus the mean over all genes in that cell
///
/// * `data` - log-normalized genes × cells matrix
/// * `gene_names` - one name per row
/// * `gene_set` - symbols of the module (e.g. S-phase genes)
pub fn module_score(
    data: &CscMatrix<f32>,
    gene_names: &[Box<str>],
    gene_set: &[Box<str>],
) -> anyhow::Result<Vec<f32>> {
    let wanted: FnvHashSet<&str> = gene_set.iter().map(|x| x.as_ref()).collect();
    let in_set: Vec<bool> = gene_names.iter().map(|g| wanted.contains(g.as_ref())).collect();

    let n_found = in_set.iter().filter(|&&x| x).count();
    if n_found == 0 {
        return Err(anyhow::anyhow!(
            "none of the {} module genes found in the data",
            gene_set.len()
        ));
    }
    if n_found < gene_set.len() {
        warn!(
            "module score: {} of {} genes present in the data",
            n_found,
            gene_set.len()
        );
    }

    let n_genes = data.nrows() as f32;

    Ok((0..data.ncols())
        .map(|j| {
            let col = data.col(j);
            let mut set_sum = 0.0f32;
            let mut all_sum = 0.0f32;
            for (&i, &v) in col.row_indices().iter().zip(col.values()) {
                all_sum += v;
                if in_set[i] {
                    set_sum += v;
                }
            }
            set_sum / n_found as f32 - all_sum / n_genes
        })
        .collect())
}

/// `G1` unless one of the scores is positive, in which case the larger
/// of S/G2M wins
pub fn assign_phase(s_score: f32, g2m_score: f32) -> Phase {
    if s_score <= 0.0 && g2m_score <= 0.0 {
        Phase::G1
    } else if s_score >= g2m_score {
        Phase::S
    } else {
        Phase::G2M
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra_sparse::CooMatrix;

    #[test]
    fn phase_calls() {
        assert_eq!(assign_phase(-0.1, -0.2), Phase::G1);
        assert_eq!(assign_phase(0.5, 0.1), Phase::S);
        assert_eq!(assign_phase(0.1, 0.5), Phase::G2M);
    }

    #[test]
    fn score_separates_expressing_cells() {
        // cell 0 expresses the module gene, cell 1 does not
        let mut coo = CooMatrix::new(2, 2);
        coo.push(0, 0, 2.0);
        coo.push(1, 1, 2.0);
        let data = CscMatrix::from(&coo);

        let genes: Vec<Box<str>> = vec!["MCM5".into(), "GAPDH".into()];
        let set: Vec<Box<str>> = vec!["MCM5".into()];

        let scores = module_score(&data, &genes, &set).unwrap();
        assert!(scores[0] > scores[1]);
    }

    #[test]
    fn unknown_module_is_an_error() {
        let mut coo = CooMatrix::new(1, 1);
        coo.push(0, 0, 1.0);
        let data = CscMatrix::from(&coo);

        let genes: Vec<Box<str>> = vec!["GAPDH".into()];
        let set: Vec<Box<str>> = vec!["MCM5".into()];
        assert!(module_score(&data, &genes, &set).is_err());
    }
}
