use nalgebra_sparse::CscMatrix;

/// Per-cell total-count normalization followed by `ln(1 + x)`
///
/// Each column (cell) is rescaled so its counts sum to `scale_factor`,
/// then log-transformed. Monotonic within a column: the relative
/// ranking of gene counts in a cell is preserved.
pub trait LogNormalizeOp {
    /// In-place version
    fn log_normalize_inplace(&mut self, scale_factor: f32);

    /// Copying version
    fn log_normalize(&self, scale_factor: f32) -> Self;
}

impl LogNormalizeOp for CscMatrix<f32> {
    fn log_normalize_inplace(&mut self, scale_factor: f32) {
        self.col_iter_mut().for_each(|mut x_j| {
            let total: f32 = x_j.values().iter().sum();
            if total <= 0.0 {
                return; // empty cell stays empty
            }
            x_j.values_mut()
                .iter_mut()
                .for_each(|x_ij| *x_ij = (*x_ij / total * scale_factor).ln_1p());
        });
    }

    fn log_normalize(&self, scale_factor: f32) -> Self {
        let mut ret = self.clone();
        ret.log_normalize_inplace(scale_factor);
        ret
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra_sparse::CooMatrix;

    fn toy() -> CscMatrix<f32> {
        let mut coo = CooMatrix::new(3, 2);
        coo.push(0, 0, 10.0);
        coo.push(1, 0, 30.0);
        coo.push(2, 0, 60.0);
        coo.push(1, 1, 5.0);
        CscMatrix::from(&coo)
    }

    #[test]
    fn column_totals_and_log1p() {
        let norm = toy().log_normalize(1e4);

        // 10/100 * 1e4 = 1000, then ln(1 + 1000)
        let x00 = norm.get_entry(0, 0).unwrap().into_value();
        assert_relative_eq!(x00, (1.0f32 + 1000.0).ln(), epsilon = 1e-5);

        // a cell with a single gene maps its whole budget onto it
        let x11 = norm.get_entry(1, 1).unwrap().into_value();
        assert_relative_eq!(x11, (1.0f32 + 1e4).ln(), epsilon = 1e-2);
    }

    #[test]
    fn ranking_within_cell_is_preserved() {
        let raw = toy();
        let norm = raw.log_normalize(1e4);

        let raw_col: Vec<f32> = raw.col(0).values().to_vec();
        let norm_col: Vec<f32> = norm.col(0).values().to_vec();

        for a in 0..raw_col.len() {
            for b in 0..raw_col.len() {
                if raw_col[a] < raw_col[b] {
                    assert!(norm_col[a] < norm_col[b]);
                }
            }
        }
    }

    #[test]
    fn empty_cell_stays_zero() {
        let mut coo = CooMatrix::new(2, 2);
        coo.push(0, 0, 1.0);
        let mat = CscMatrix::from(&coo);

        let norm = mat.log_normalize(1e4);
        assert_eq!(norm.col(1).values().len(), 0);
    }
}
