//! Linear algebra on positive semi-definite matrices.
//!
//! Every covariance passed to a matrix-variate sampler goes through this
//! module: it is symmetrized, boosted on the diagonal and factored with a
//! lower Cholesky decomposition.

use faer::{
    linalg::triangular_solve::{solve_lower_triangular_in_place, solve_upper_triangular_in_place},
    Mat, Par, Side,
};
use ndarray::{ArrayD, ArrayViewD};
use serde::Serialize;

use crate::error::{Error, Result};

pub const DEFAULT_DIAGONAL_BOOST: f64 = 1e-6;

pub(crate) fn square_dim(a: &Mat<f64>, name: &str) -> Result<usize> {
    if a.nrows() != a.ncols() {
        return Err(Error::Shape(format!(
            "{name} must be square, got {}x{}",
            a.nrows(),
            a.ncols()
        )));
    }
    Ok(a.nrows())
}

/// `(A + Aᵗ) / 2`
pub fn symmetrize(a: &Mat<f64>) -> Result<Mat<f64>> {
    let n = square_dim(a, "matrix")?;
    Ok(Mat::from_fn(n, n, |i, j| 0.5 * (a[(i, j)] + a[(j, i)])))
}

/// Symmetrize a stack of square matrices over its trailing two axes.
pub fn symmetrize_stack(a: ArrayViewD<'_, f64>) -> Result<ArrayD<f64>> {
    let ndim = a.ndim();
    if ndim < 2 || a.shape()[ndim - 1] != a.shape()[ndim - 2] {
        return Err(Error::Shape(format!(
            "expected a stack of square matrices, got shape {:?}",
            a.shape()
        )));
    }
    let mut transposed = a.view();
    transposed.swap_axes(ndim - 2, ndim - 1);
    Ok((&a + &transposed) * 0.5)
}

fn add_to_diagonal(a: &mut Mat<f64>, boost: f64) {
    a.diagonal_mut()
        .column_vector_mut()
        .iter_mut()
        .for_each(|x| *x += boost);
}

fn lower_cholesky(a: &Mat<f64>) -> Option<Mat<f64>> {
    let llt = a.llt(Side::Lower).ok()?;
    Some(llt.L().to_owned())
}

/// Solve `A x = B` for a positive semi-definite `A`.
///
/// `A` is symmetrized and `diagonal_boost · I` is added before the Cholesky
/// factorization, so a merely semi-definite `A` still factors. If the boosted
/// matrix is not positive definite the solve fails with
/// [`Error::NumericalInstability`]; pick a larger boost for badly conditioned
/// inputs.
pub fn boosted_solve(a: &Mat<f64>, b: &Mat<f64>, diagonal_boost: f64) -> Result<Mat<f64>> {
    let n = square_dim(a, "A")?;
    if b.nrows() != n {
        return Err(Error::Shape(format!(
            "right hand side has {} rows, expected {n}",
            b.nrows()
        )));
    }

    let mut boosted = symmetrize(a)?;
    add_to_diagonal(&mut boosted, diagonal_boost);
    let chol = lower_cholesky(&boosted).ok_or_else(|| {
        Error::NumericalInstability(format!(
            "matrix is not positive definite after a diagonal boost of {diagonal_boost:e}"
        ))
    })?;

    let mut x = b.clone();
    solve_lower_triangular_in_place(chol.as_ref(), x.as_mut(), Par::Seq);
    solve_upper_triangular_in_place(chol.transpose(), x.as_mut(), Par::Seq);
    Ok(x)
}

/// Invert a positive semi-definite matrix. The result is exactly symmetric.
pub fn psd_inverse(a: &Mat<f64>, diagonal_boost: f64) -> Result<Mat<f64>> {
    let n = square_dim(a, "A")?;
    let inv = boosted_solve(a, &Mat::identity(n, n), diagonal_boost)?;
    symmetrize(&inv)
}

/// Jitter schedule for [`safe_cholesky`].
#[derive(Debug, Clone, Copy, Serialize)]
pub struct CholeskySettings {
    /// Jitter added on the first retry. Doubles on every further retry.
    pub initial_jitter: f64,
    pub max_tries: usize,
}

impl Default for CholeskySettings {
    fn default() -> Self {
        Self {
            initial_jitter: DEFAULT_DIAGONAL_BOOST,
            max_tries: 10,
        }
    }
}

/// Lower Cholesky factor of a symmetrized covariance.
///
/// Tries the plain factorization first and then adds a growing diagonal
/// jitter until it succeeds.
pub fn safe_cholesky(a: &Mat<f64>, settings: CholeskySettings) -> Result<Mat<f64>> {
    square_dim(a, "covariance")?;
    let sym = symmetrize(a)?;
    if let Some(chol) = lower_cholesky(&sym) {
        return Ok(chol);
    }

    let mut jitter = settings.initial_jitter;
    for attempt in 0..settings.max_tries {
        let mut boosted = sym.clone();
        add_to_diagonal(&mut boosted, jitter);
        if let Some(chol) = lower_cholesky(&boosted) {
            log::debug!("Cholesky succeeded after {} retries (jitter {jitter:e})", attempt + 1);
            return Ok(chol);
        }
        jitter *= 2.;
    }

    Err(Error::NumericalInstability(format!(
        "Cholesky factorization failed after {} jitter retries",
        settings.max_tries
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, IxDyn};
    use proptest::prelude::*;
    use rand::{Rng, SeedableRng};
    use rand_distr::StandardNormal;

    fn random_spd(n: usize, seed: u64) -> Mat<f64> {
        let mut rng = rand::rngs::SmallRng::seed_from_u64(seed);
        let g: Mat<f64> = Mat::from_fn(n, n, |_, _| rng.sample(StandardNormal));
        let mut a = &g * g.transpose();
        add_to_diagonal(&mut a, n as f64);
        a
    }

    fn assert_mat_close(a: &Mat<f64>, b: &Mat<f64>, tol: f64) {
        assert_eq!(a.shape(), b.shape());
        for i in 0..a.nrows() {
            for j in 0..a.ncols() {
                assert_abs_diff_eq!(a[(i, j)], b[(i, j)], epsilon = tol);
            }
        }
    }

    #[test]
    fn symmetrize_is_exact() {
        let a = Mat::from_fn(3, 3, |i, j| (i * 3 + j) as f64);
        let s = symmetrize(&a).unwrap();
        for i in 0..3 {
            for j in 0..3 {
                assert_eq!(s[(i, j)], s[(j, i)]);
            }
        }
        assert_eq!(s[(0, 1)], 2.);
    }

    #[test]
    fn symmetrize_rejects_rectangular() {
        assert!(matches!(symmetrize(&Mat::zeros(2, 3)), Err(Error::Shape(_))));
        assert!(matches!(symmetrize(&Mat::zeros(3, 2)), Err(Error::Shape(_))));
    }

    #[test]
    fn symmetrize_stack_trailing_axes() {
        let a = array![[[1., 2.], [4., 3.]], [[0., -2.], [2., 5.]]].into_dyn();
        let s = symmetrize_stack(a.view()).unwrap();
        let expected = array![[[1., 3.], [3., 3.]], [[0., 0.], [0., 5.]]].into_dyn();
        assert_eq!(s, expected);

        let bad = ArrayD::<f64>::zeros(IxDyn(&[2, 3]));
        assert!(matches!(symmetrize_stack(bad.view()), Err(Error::Shape(_))));
    }

    proptest! {
        #[test]
        fn solve_recovers_rhs(n in 1usize..6, k in 1usize..4, seed in 0u64..1000) {
            let a = random_spd(n, seed);
            let mut rng = rand::rngs::SmallRng::seed_from_u64(seed + 1);
            let b: Mat<f64> = Mat::from_fn(n, k, |_, _| rng.sample(StandardNormal));
            let x = boosted_solve(&a, &b, DEFAULT_DIAGONAL_BOOST).unwrap();
            let ax = &a * &x;
            for i in 0..n {
                for j in 0..k {
                    prop_assert!((ax[(i, j)] - b[(i, j)]).abs() < 1e-5);
                }
            }
        }
    }

    #[test]
    fn inverse_times_matrix_is_identity() {
        let a = random_spd(5, 3);
        let inv = psd_inverse(&a, DEFAULT_DIAGONAL_BOOST).unwrap();
        for i in 0..5 {
            for j in 0..5 {
                assert_eq!(inv[(i, j)], inv[(j, i)]);
            }
        }
        assert_mat_close(&(&a * &inv), &Mat::identity(5, 5), 1e-5);
    }

    #[test]
    fn semidefinite_needs_boost() {
        // rank one
        let v = Mat::from_fn(3, 1, |i, _| (i + 1) as f64);
        let a = &v * v.transpose();
        let b = Mat::from_fn(3, 1, |_, _| 1.);
        assert!(boosted_solve(&a, &b, 1e-3).is_ok());

        let neg = Mat::from_fn(2, 2, |i, j| if i == j { -1. } else { 0. });
        assert!(matches!(
            boosted_solve(&neg, &Mat::identity(2, 2), DEFAULT_DIAGONAL_BOOST),
            Err(Error::NumericalInstability(_))
        ));
    }

    #[test]
    fn shape_errors() {
        let a = Mat::<f64>::zeros(2, 3);
        assert!(matches!(
            psd_inverse(&a, DEFAULT_DIAGONAL_BOOST),
            Err(Error::Shape(_))
        ));
        let a = Mat::<f64>::identity(2, 2);
        let b = Mat::<f64>::zeros(3, 1);
        assert!(matches!(
            boosted_solve(&a, &b, DEFAULT_DIAGONAL_BOOST),
            Err(Error::Shape(_))
        ));
    }

    #[test]
    fn safe_cholesky_reconstructs() {
        let a = random_spd(4, 9);
        let l = safe_cholesky(&a, CholeskySettings::default()).unwrap();
        assert_mat_close(&(&l * l.transpose()), &a, 1e-8);
        for i in 0..4 {
            for j in (i + 1)..4 {
                assert_eq!(l[(i, j)], 0.);
            }
        }
    }

    #[test]
    fn safe_cholesky_jitters_singular_input() {
        let a = Mat::<f64>::zeros(3, 3);
        let l = safe_cholesky(&a, CholeskySettings::default()).unwrap();
        assert!(l[(0, 0)] > 0.);

        let neg = Mat::from_fn(2, 2, |i, j| if i == j { -1. } else { 0. });
        assert!(safe_cholesky(&neg, CholeskySettings::default()).is_err());
    }
}
