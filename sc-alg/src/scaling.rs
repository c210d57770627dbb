use nalgebra::DMatrix;

type Mat = DMatrix<f32>;

/// Standardize each gene (row) across cells (columns)
pub trait ScaleRowsOp {
    /// Zero mean, unit variance per row, clipping standardized values
    /// at `±clip`. Rows with zero variance become all-zero.
    fn scale_rows(&self, clip: f32) -> Self;
}

impl ScaleRowsOp for Mat {
    fn scale_rows(&self, clip: f32) -> Self {
        let ncols = self.ncols() as f32;
        let mut ret = self.clone();

        for mut row in ret.row_iter_mut() {
            let mean = row.sum() / ncols;
            let var = row.iter().map(|&x| (x - mean) * (x - mean)).sum::<f32>()
                / (ncols - 1.0).max(1.0);

            if var <= 0.0 {
                row.fill(0.0);
                continue;
            }

            let sd = var.sqrt();
            row.iter_mut()
                .for_each(|x| *x = ((*x - mean) / sd).clamp(-clip, clip));
        }
        ret
    }
}

/// Replace each gene (row) by its least-squares residual against the
/// per-cell covariates, e.g. cell-cycle scores
///
/// * `data` - genes × cells
/// * `covariates` - cells × p design columns; an intercept is appended
///
/// The caller decides whether to regress at all; nothing here inspects
/// the data to make that call.
pub fn regress_out(data: &Mat, covariates: &Mat) -> anyhow::Result<Mat> {
    let n = data.ncols();
    if covariates.nrows() != n {
        return Err(anyhow::anyhow!(
            "covariates have {} rows for {} cells",
            covariates.nrows(),
            n
        ));
    }

    // design with intercept: n × (p + 1)
    let p = covariates.ncols();
    let mut design = Mat::zeros(n, p + 1);
    design.column_mut(0).fill(1.0);
    design.view_mut((0, 1), (n, p)).copy_from(covariates);

    let xtx = design.transpose() * &design;
    let chol = xtx
        .cholesky()
        .ok_or_else(|| anyhow::anyhow!("collinear covariates; cannot regress out"))?;

    // residual = y - X (XᵀX)⁻¹ Xᵀ y, per gene
    let xty = &design.transpose() * &data.transpose(); // (p+1) × genes
    let beta = chol.solve(&xty);
    let fitted = (&design * beta).transpose(); // genes × cells

    Ok(data - fitted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn rows_are_standardized_and_clipped() {
        let mat = Mat::from_row_slice(2, 4, &[1.0, 2.0, 3.0, 4.0, 5.0, 5.0, 5.0, 5.0]);
        let scaled = mat.scale_rows(10.0);

        let row0: Vec<f32> = scaled.row(0).iter().cloned().collect();
        let mean: f32 = row0.iter().sum::<f32>() / 4.0;
        let var: f32 = row0.iter().map(|x| (x - mean) * (x - mean)).sum::<f32>() / 3.0;
        assert_relative_eq!(mean, 0.0, epsilon = 1e-6);
        assert_relative_eq!(var, 1.0, epsilon = 1e-5);

        // constant row collapses to zero
        assert!(scaled.row(1).iter().all(|&x| x == 0.0));

        // tight clip saturates
        let clipped = mat.scale_rows(0.5);
        assert!(clipped.row(0).iter().all(|&x| x.abs() <= 0.5));
    }

    #[test]
    fn regression_removes_linear_covariate() {
        // gene 0 is exactly 2 * covariate + 1
        let cov = Mat::from_column_slice(4, 1, &[0.0, 1.0, 2.0, 3.0]);
        let data = Mat::from_row_slice(1, 4, &[1.0, 3.0, 5.0, 7.0]);

        let resid = regress_out(&data, &cov).unwrap();
        for &x in resid.iter() {
            assert_relative_eq!(x, 0.0, epsilon = 1e-4);
        }
    }
}
