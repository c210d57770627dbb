use nalgebra::{DMatrix, DVector};
use rand::rngs::SmallRng;
use rand::SeedableRng;
use rand_distr::{Distribution, StandardNormal};

type Mat = DMatrix<f32>;
type Vec_ = DVector<f32>;

/// Randomized truncated SVD (Halko, Martinsson & Tropp 2011)
///
/// Gaussian sketch, a few power iterations with QR renormalization,
/// then an exact SVD on the small projected matrix. Deterministic for
/// a fixed seed.
pub struct RandomizedSvd {
    max_rank: usize,
    n_iter: usize,
    seed: u64,
}

/// U, singular values, V with `U * diag(s) * Vᵀ ≈ input`
pub struct SvdResult {
    pub u: Mat,
    pub singular_values: Vec_,
    pub v: Mat,
}

impl RandomizedSvd {
    pub fn new(max_rank: usize, n_iter: usize) -> Self {
        Self {
            max_rank,
            n_iter,
            seed: 42,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn compute(&self, xx: &Mat) -> anyhow::Result<SvdResult> {
        let nr = xx.nrows();
        let nc = xx.ncols();

        if nr == 0 || nc == 0 {
            return Err(anyhow::anyhow!("empty matrix"));
        }

        let full_rank = nr.min(nc);
        let rank = if self.max_rank > 0 {
            self.max_rank.min(full_rank)
        } else {
            full_rank
        };
        let oversample = if rank < full_rank { 5.min(full_rank - rank) } else { 0 };
        let sketch = rank + oversample;

        let mut rng = SmallRng::seed_from_u64(self.seed);
        let omega = gaussian(nc, sketch, &mut rng);

        // range finder with renormalized power iterations
        let mut qq = thin_q(&(xx * omega));
        for _ in 0..self.n_iter {
            let zz = thin_q(&(xx.transpose() * &qq));
            qq = thin_q(&(xx * zz));
        }

        let bb = qq.transpose() * xx;
        let svd = bb.svd(true, true);

        let (svd_u, svd_vt) = match (svd.u, svd.v_t) {
            (Some(u), Some(vt)) => (u, vt),
            _ => anyhow::bail!("SVD failed on projected matrix"),
        };

        let rank = rank.min(svd.singular_values.len());

        Ok(SvdResult {
            u: &qq * svd_u.columns(0, rank).into_owned(),
            singular_values: svd.singular_values.rows(0, rank).into_owned(),
            v: svd_vt.transpose().columns(0, rank).into_owned(),
        })
    }
}

fn gaussian(nrow: usize, ncol: usize, rng: &mut SmallRng) -> Mat {
    Mat::from_fn(nrow, ncol, |_, _| StandardNormal.sample(rng))
}

fn thin_q(xx: &Mat) -> Mat {
    let ncols = xx.ncols();
    let qr = xx.clone().qr();
    let q = qr.q();
    let kk = ncols.min(q.ncols());
    q.columns(0, kk).into_owned()
}
