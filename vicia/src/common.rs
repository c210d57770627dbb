#![allow(dead_code)]

pub use clap::Args;
pub use log::info;

pub use sc_data::common_io::*;
pub use sc_data::dataset::SparseCounts;

pub type Mat = nalgebra::DMatrix<f32>;
pub type DVec = nalgebra::DVector<f32>;
pub type CscMat = nalgebra_sparse::CscMatrix<f32>;

pub const DEFAULT_KNN: usize = 20;
pub const DEFAULT_SEED: u64 = 42;

/// Write a named cells × k matrix as `#cell<TAB>V1...` tsv
pub fn write_named_matrix(
    mat: &Mat,
    names: &[Box<str>],
    value_prefix: &str,
    file: &str,
) -> anyhow::Result<()> {
    if names.len() != mat.nrows() {
        return Err(anyhow::anyhow!(
            "{} names for {} rows",
            names.len(),
            mat.nrows()
        ));
    }

    let header: String = std::iter::once("#cell".to_string())
        .chain((1..=mat.ncols()).map(|k| format!("{}{}", value_prefix, k)))
        .collect::<Vec<_>>()
        .join("\t");

    let mut lines = vec![header.into_boxed_str()];
    for (name, row) in names.iter().zip(mat.row_iter()) {
        let mut fields = vec![name.to_string()];
        fields.extend(row.iter().map(|x| format!("{}", x)));
        lines.push(fields.join("\t").into_boxed_str());
    }
    write_lines(&lines, file)
}

/// Read a `#cell<TAB>V1...` tsv back into names and a cells × k matrix
pub fn read_named_matrix(file: &str) -> anyhow::Result<(Vec<Box<str>>, Mat)> {
    let rows = read_lines_of_words(file)?;
    if rows.is_empty() {
        return Err(anyhow::anyhow!("empty matrix file: {}", file));
    }

    let ncols = rows[0].len() - 1;
    if ncols == 0 {
        return Err(anyhow::anyhow!("no value columns in {}", file));
    }

    let mut names = Vec::with_capacity(rows.len());
    let mut values = Vec::with_capacity(rows.len() * ncols);
    for row in &rows {
        if row.len() != ncols + 1 {
            return Err(anyhow::anyhow!("ragged matrix file: {}", file));
        }
        names.push(row[0].clone());
        for x in &row[1..] {
            values.push(x.parse::<f32>()?);
        }
    }

    Ok((names, Mat::from_row_slice(rows.len(), ncols, &values)))
}

/// Write per-cell cluster assignments as `#cell<TAB>cluster`
pub fn write_clusters(
    names: &[Box<str>],
    clusters: &[usize],
    file: &str,
) -> anyhow::Result<()> {
    if names.len() != clusters.len() {
        return Err(anyhow::anyhow!(
            "{} names for {} cluster labels",
            names.len(),
            clusters.len()
        ));
    }

    let mut lines = vec!["#cell\tcluster".to_string().into_boxed_str()];
    for (name, c) in names.iter().zip(clusters) {
        lines.push(format!("{}\t{}", name, c).into_boxed_str());
    }
    write_lines(&lines, file)
}

/// Read `#cell<TAB>cluster` back
pub fn read_clusters(file: &str) -> anyhow::Result<(Vec<Box<str>>, Vec<usize>)> {
    let rows = read_lines_of_words(file)?;
    let mut names = Vec::with_capacity(rows.len());
    let mut clusters = Vec::with_capacity(rows.len());
    for row in &rows {
        if row.len() != 2 {
            return Err(anyhow::anyhow!("expected `cell<TAB>cluster` in {}", file));
        }
        names.push(row[0].clone());
        clusters.push(row[1].parse::<usize>()?);
    }
    Ok((names, clusters))
}

/// The per-stage files must describe the same cells in the same order
pub fn check_same_cells(a: &[Box<str>], b: &[Box<str>]) -> anyhow::Result<()> {
    if a != b {
        return Err(anyhow::anyhow!(
            "cell names disagree between stage files; \
             rerun the earlier stages on the same input"
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_matrix_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("pcs.tsv.gz");
        let file = file.to_str().unwrap();

        let names: Vec<Box<str>> = vec!["c0".into(), "c1".into()];
        let mat = Mat::from_row_slice(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        write_named_matrix(&mat, &names, "PC", file).unwrap();

        let (back_names, back) = read_named_matrix(file).unwrap();
        assert_eq!(back_names, names);
        assert_eq!(back, mat);
    }

    #[test]
    fn cluster_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("clusters.tsv.gz");
        let file = file.to_str().unwrap();

        let names: Vec<Box<str>> = vec!["c0".into(), "c1".into(), "c2".into()];
        write_clusters(&names, &[0, 1, 0], file).unwrap();

        let (back_names, back) = read_clusters(file).unwrap();
        assert_eq!(back_names, names);
        assert_eq!(back, vec![0, 1, 0]);
    }
}
