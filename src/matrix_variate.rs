//! Matrix-Normal and Inverse-Wishart samplers.

use faer::{linalg::triangular_solve::solve_lower_triangular_in_place, Mat, Par};
use ndarray::Array1;
use rand::Rng;
use rand_distr::StandardNormal;

use crate::error::{Error, Result};
use crate::psd::{safe_cholesky, square_dim, CholeskySettings};
use crate::scalar::sample_chi2_array;
use crate::seed::Seed;

/// Draw from the Matrix-Normal distribution `MN(M, U, V)`.
///
/// `U` is the row covariance (rows x rows) and `V` the column covariance
/// (cols x cols). Returns `M + chol(U) G chol(V)ᵗ` for standard normal `G`.
pub fn sample_mn(seed: Seed, m: &Mat<f64>, u: &Mat<f64>, v: &Mat<f64>) -> Result<Mat<f64>> {
    let (nrows, ncols) = m.shape();
    if square_dim(u, "row covariance")? != nrows {
        return Err(Error::Shape(format!(
            "row covariance is {}x{}, mean has {nrows} rows",
            u.nrows(),
            u.ncols()
        )));
    }
    if square_dim(v, "column covariance")? != ncols {
        return Err(Error::Shape(format!(
            "column covariance is {}x{}, mean has {ncols} columns",
            v.nrows(),
            v.ncols()
        )));
    }

    let mut rng = seed.rng();
    let g: Mat<f64> = Mat::from_fn(nrows, ncols, |_, _| rng.sample(StandardNormal));
    let chol_u = safe_cholesky(u, CholeskySettings::default())?;
    let chol_v = safe_cholesky(v, CholeskySettings::default())?;

    let noise = (&chol_u * &g) * chol_v.transpose();
    Ok(Mat::from_fn(nrows, ncols, |i, j| m[(i, j)] + noise[(i, j)]))
}

/// Upper triangular Bartlett matrix for an `n x n` Wishart draw.
///
/// The diagonal holds `sqrt(χ²(ν - i))` for `i = 0..n`, the strict upper
/// triangle independent standard normals in row-major order.
pub fn bartlett_factor(seed: Seed, n: usize, nu: f64) -> Result<Mat<f64>> {
    if !(nu > (n as f64) - 1.) {
        return Err(Error::Contract(format!(
            "Inverse-Wishart of dimension {n} needs more than {} degrees of freedom, got {nu}",
            n.saturating_sub(1)
        )));
    }
    let (chi2_seed, norm_seed) = seed.split();

    let degs: Array1<f64> = (0..n).map(|i| nu - i as f64).collect();
    let chi2 = sample_chi2_array(chi2_seed, degs.into_dyn().view())?;

    let mut x = Mat::<f64>::zeros(n, n);
    for (i, val) in chi2.iter().enumerate() {
        x[(i, i)] = val.sqrt();
    }
    let mut rng = norm_seed.rng();
    for i in 0..n {
        for j in (i + 1)..n {
            x[(i, j)] = rng.sample(StandardNormal);
        }
    }
    Ok(x)
}

/// Draw from the Inverse-Wishart distribution with scale `S` and `ν`
/// degrees of freedom, using the Bartlett decomposition.
pub fn sample_invwishart(seed: Seed, scale: &Mat<f64>, nu: f64) -> Result<Mat<f64>> {
    let n = square_dim(scale, "scale matrix")?;
    let x = bartlett_factor(seed, n, nu)?;

    let r = x.qr().R().to_owned();
    let chol = safe_cholesky(scale, CholeskySettings::default())?;

    // T = chol R⁻¹, via Rᵗ Tᵗ = cholᵗ
    let mut t_transposed = chol.transpose().to_owned();
    solve_lower_triangular_in_place(r.transpose(), t_transposed.as_mut(), Par::Seq);
    let t = t_transposed.transpose().to_owned();

    Ok(&t * t.transpose())
}

/// Joint draw `Σ ~ IW(S, ν)`, `A ~ MN(M, Σ, K)`. Returns `(A, Σ)`.
///
/// The two draws use independent children of `seed`.
pub fn sample_mniw(
    seed: Seed,
    nu: f64,
    scale: &Mat<f64>,
    m: &Mat<f64>,
    k: &Mat<f64>,
) -> Result<(Mat<f64>, Mat<f64>)> {
    let (iw_seed, mn_seed) = seed.split();
    let sigma = sample_invwishart(iw_seed, scale, nu)?;
    let a = sample_mn(mn_seed, m, &sigma, k)?;
    Ok((a, sigma))
}
