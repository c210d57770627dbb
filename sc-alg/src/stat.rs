use nalgebra::DVector;

/// Sufficient statistics over a stream of equally-sized vectors
///
/// Tracks, element-wise: the number of positive observations, the
/// number of observations, the sum, and the sum of squares. Good
/// enough for mean/variance over cells without holding the dense
/// matrix in memory.
#[derive(Clone)]
pub struct RunningStatistics {
    npos: DVector<f32>,
    s0: DVector<f32>,
    s1: DVector<f32>,
    s2: DVector<f32>,
}

impl RunningStatistics {
    pub fn new(size: usize) -> Self {
        Self {
            npos: DVector::zeros(size),
            s0: DVector::zeros(size),
            s1: DVector::zeros(size),
            s2: DVector::zeros(size),
        }
    }

    pub fn len(&self) -> usize {
        self.s0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.s0.len() == 0
    }

    /// Accumulate one dense observation vector
    pub fn add(&mut self, xx: &DVector<f32>) {
        debug_assert_eq!(xx.len(), self.len());
        for (i, &x) in xx.iter().enumerate() {
            self.add_element(i, x);
        }
    }

    /// Accumulate one sparse observation: `indices` hold the non-zero
    /// positions, everything else is an implicit zero
    pub fn add_sparse(&mut self, indices: &[usize], values: &[f32]) {
        debug_assert_eq!(indices.len(), values.len());
        // implicit zeros are observations too
        self.s0.add_scalar_mut(1.0);
        for (&i, &x) in indices.iter().zip(values) {
            if !x.is_finite() {
                continue;
            }
            if x > 0.0 {
                self.npos[i] += 1.0;
            }
            self.s1[i] += x;
            self.s2[i] += x * x;
        }
    }

    fn add_element(&mut self, i: usize, x: f32) {
        if !x.is_finite() {
            return;
        }
        if x > 0.0 {
            self.npos[i] += 1.0;
        }
        self.s0[i] += 1.0;
        self.s1[i] += x;
        self.s2[i] += x * x;
    }

    /// Combine with statistics accumulated on another block of
    /// observations
    pub fn merge(&mut self, other: &Self) {
        debug_assert_eq!(self.len(), other.len());
        self.npos += &other.npos;
        self.s0 += &other.s0;
        self.s1 += &other.s1;
        self.s2 += &other.s2;
    }

    /// Positive-observation count per element
    pub(crate) fn count_positives(&self) -> &DVector<f32> {
        &self.npos
    }

    pub fn mean(&self) -> DVector<f32> {
        self.s1.zip_map(&self.s0, |s1, n| if n > 0.0 { s1 / n } else { 0.0 })
    }

    /// Unbiased sample variance per element
    pub fn variance(&self) -> DVector<f32> {
        let mean = self.mean();
        DVector::from_fn(self.len(), |i, _| {
            let n = self.s0[i];
            if n > 1.0 {
                ((self.s2[i] - n * mean[i] * mean[i]) / (n - 1.0)).max(0.0)
            } else {
                0.0
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn mean_and_variance() {
        let mut stat = RunningStatistics::new(2);
        stat.add(&DVector::from_vec(vec![1.0, 0.0]));
        stat.add(&DVector::from_vec(vec![3.0, 0.0]));
        stat.add(&DVector::from_vec(vec![5.0, 0.0]));

        let mean = stat.mean();
        assert_relative_eq!(mean[0], 3.0);
        assert_relative_eq!(mean[1], 0.0);

        let var = stat.variance();
        assert_relative_eq!(var[0], 4.0);
        assert_relative_eq!(var[1], 0.0);

        assert_relative_eq!(stat.count_positives()[0], 3.0);
        assert_relative_eq!(stat.count_positives()[1], 0.0);
    }

    #[test]
    fn sparse_matches_dense() {
        let mut dense = RunningStatistics::new(3);
        dense.add(&DVector::from_vec(vec![2.0, 0.0, 1.0]));
        dense.add(&DVector::from_vec(vec![0.0, 0.0, 4.0]));

        let mut sparse = RunningStatistics::new(3);
        sparse.add_sparse(&[0, 2], &[2.0, 1.0]);
        sparse.add_sparse(&[2], &[4.0]);

        assert_relative_eq!(dense.mean(), sparse.mean());
        assert_relative_eq!(dense.variance(), sparse.variance());
    }
}
