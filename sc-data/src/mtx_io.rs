use crate::common_io::*;
use rayon::prelude::*;
use std::io::Write;

/// Write triplets into a MatrixMarket file with 1-based indices
/// * `triplets` - (row, column, value) with 0-based indices
/// * `nrow` - number of rows
/// * `ncol` - number of columns
/// * `mtx_file` - the output file (e.g., "matrix.mtx.gz")
pub fn write_mtx_triplets(
    triplets: &[(u64, u64, f32)],
    nrow: usize,
    ncol: usize,
    mtx_file: &str,
) -> anyhow::Result<()> {
    let mut buf = open_buf_writer(mtx_file)?;

    writeln!(buf, "%%MatrixMarket matrix coordinate real general")?;
    writeln!(buf, "{}\t{}\t{}", nrow, ncol, triplets.len())?;

    for (row, col, val) in triplets {
        writeln!(buf, "{}\t{}\t{}", row + 1, col + 1, val)?;
    }

    buf.flush()?;
    Ok(())
}

/// Read a MatrixMarket file into a vector of 0-based triplets
/// * `mtx_file` - path to the matrix market file, gzipped or not
///
/// Returns the triplets and the header shape `(nrow, ncol, nnz)`.
pub fn read_mtx_triplets(
    mtx_file: &str,
) -> anyhow::Result<(Vec<(u64, u64, f32)>, (usize, usize, usize))> {
    let buf = open_buf_reader(mtx_file)?;
    use std::io::BufRead;

    let mut shape = None;
    let mut data_lines = vec![];

    for line in buf.lines() {
        let line = line?;
        if line.starts_with('%') || line.is_empty() {
            continue;
        }
        if shape.is_none() {
            let hdr: Vec<&str> = line.split_whitespace().collect();
            if hdr.len() != 3 {
                return Err(anyhow::anyhow!("failed to parse mtx header: {}", line));
            }
            shape = Some((
                hdr[0].parse::<usize>()?,
                hdr[1].parse::<usize>()?,
                hdr[2].parse::<usize>()?,
            ));
        } else {
            data_lines.push(line.into_boxed_str());
        }
    }

    let shape = shape.ok_or_else(|| anyhow::anyhow!("empty mtx file: {}", mtx_file))?;

    // 1-based on disk, 0-based in memory
    fn parse_row_col_val(line: &str) -> Option<(u64, u64, f32)> {
        let mut it = line.split_whitespace();
        let row = it.next()?.parse::<u64>().ok()?.checked_sub(1)?;
        let col = it.next()?.parse::<u64>().ok()?.checked_sub(1)?;
        let val = it.next()?.parse::<f32>().ok()?;
        Some((row, col, val))
    }

    let mut triplets = data_lines
        .par_iter()
        .map(|line| {
            parse_row_col_val(line)
                .ok_or_else(|| anyhow::anyhow!("malformed mtx line: {}", line))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    if triplets.len() != shape.2 {
        return Err(anyhow::anyhow!(
            "mtx header says {} non-zeros but found {}",
            shape.2,
            triplets.len()
        ));
    }

    triplets.sort_by_key(|&(row, _, _)| row);
    triplets.sort_by_key(|&(_, col, _)| col);
    Ok((triplets, shape))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("matrix.mtx.gz");
        let file = file.to_str().unwrap();

        let triplets = vec![(0u64, 0u64, 2.0f32), (2, 1, 1.0), (1, 3, 5.0)];
        write_mtx_triplets(&triplets, 3, 4, file).unwrap();

        let (read, shape) = read_mtx_triplets(file).unwrap();
        assert_eq!(shape, (3, 4, 3));
        assert_eq!(read.len(), 3);
        assert!(read.contains(&(2, 1, 1.0)));
    }

    #[test]
    fn nnz_mismatch_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("bad.mtx");
        let file = file.to_str().unwrap();

        let lines: Vec<Box<str>> = vec![
            "%%MatrixMarket matrix coordinate real general".into(),
            "2\t2\t3".into(),
            "1\t1\t1".into(),
        ];
        crate::common_io::write_lines(&lines, file).unwrap();
        assert!(read_mtx_triplets(file).is_err());
    }
}
