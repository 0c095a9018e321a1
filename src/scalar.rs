//! Gamma-family conjugate samplers.
//!
//! Every sampler here reduces to a unit-rate Gamma draw.

use itertools::izip;
use ndarray::{ArrayD, ArrayViewD, IxDyn};
use rand::Rng;
use rand_distr::{Distribution, Gamma};

use crate::error::{Error, Result};
use crate::seed::Seed;

fn unit_gamma<R: Rng + ?Sized>(rng: &mut R, a: f64) -> Result<f64> {
    let dist = Gamma::new(a, 1f64)
        .map_err(|err| Error::Contract(format!("invalid gamma shape {a}: {err}")))?;
    Ok(dist.sample(rng))
}

fn check_rate(b: f64) -> Result<()> {
    if !(b > 0.) {
        return Err(Error::Contract(format!("gamma rate must be positive, got {b}")));
    }
    Ok(())
}

/// Gamma with shape `a` and rate `b`.
pub fn sample_gamma(seed: Seed, a: f64, b: f64) -> Result<f64> {
    check_rate(b)?;
    Ok(unit_gamma(&mut seed.rng(), a)? / b)
}

pub fn sample_inv_gamma(seed: Seed, a: f64, b: f64) -> Result<f64> {
    Ok(sample_gamma(seed, a, b)?.recip())
}

/// Scaled inverse chi-squared with `degs` degrees of freedom and scale `variance`.
pub fn sample_scaled_inv_chi2(seed: Seed, degs: f64, variance: f64) -> Result<f64> {
    sample_inv_gamma(seed, degs / 2., degs * variance / 2.)
}

pub fn sample_chi2(seed: Seed, degs: f64) -> Result<f64> {
    Ok(unit_gamma(&mut seed.rng(), degs / 2.)? * 2.)
}

/// Shape that `a` and `b` broadcast to, under the usual trailing-axis broadcasting rules.
pub(crate) fn broadcast_shape(a: &[usize], b: &[usize]) -> Result<Vec<usize>> {
    let ndim = a.len().max(b.len());
    let pad = |shape: &[usize], i: usize| {
        let offset = ndim - shape.len();
        if i < offset {
            1
        } else {
            shape[i - offset]
        }
    };
    (0..ndim)
        .map(|i| match (pad(a, i), pad(b, i)) {
            (x, y) if x == y => Ok(x),
            (1, y) => Ok(y),
            (x, 1) => Ok(x),
            (x, y) => Err(Error::Shape(format!(
                "cannot broadcast shapes {a:?} and {b:?} (axis {i}: {x} vs {y})"
            ))),
        })
        .collect()
}

fn broadcast_pair<'x, 'y>(
    a: &'x ArrayViewD<'_, f64>,
    b: &'y ArrayViewD<'_, f64>,
) -> Result<(Vec<usize>, ArrayViewD<'x, f64>, ArrayViewD<'y, f64>)> {
    let shape = broadcast_shape(a.shape(), b.shape())?;
    let err = || Error::Shape(format!("cannot broadcast to {shape:?}"));
    let a = a.broadcast(IxDyn(&shape)).ok_or_else(err)?;
    let b = b.broadcast(IxDyn(&shape)).ok_or_else(err)?;
    Ok((shape, a, b))
}

/// Elementwise Gamma draws with broadcast shape and rate parameters.
///
/// All elements come from the stream of one seed, in row-major order.
pub fn sample_gamma_array(
    seed: Seed,
    a: ArrayViewD<'_, f64>,
    b: ArrayViewD<'_, f64>,
) -> Result<ArrayD<f64>> {
    let (shape, a, b) = broadcast_pair(&a, &b)?;
    let mut rng = seed.rng();
    let draws = izip!(a.iter(), b.iter())
        .map(|(&a, &b)| {
            check_rate(b)?;
            Ok(unit_gamma(&mut rng, a)? / b)
        })
        .collect::<Result<Vec<f64>>>()?;
    Ok(ArrayD::from_shape_vec(IxDyn(&shape), draws)?)
}

pub fn sample_inv_gamma_array(
    seed: Seed,
    a: ArrayViewD<'_, f64>,
    b: ArrayViewD<'_, f64>,
) -> Result<ArrayD<f64>> {
    Ok(sample_gamma_array(seed, a, b)?.mapv_into(f64::recip))
}

pub fn sample_scaled_inv_chi2_array(
    seed: Seed,
    degs: ArrayViewD<'_, f64>,
    variance: ArrayViewD<'_, f64>,
) -> Result<ArrayD<f64>> {
    let (_, degs, variance) = broadcast_pair(&degs, &variance)?;
    let a = degs.mapv(|d| d / 2.);
    let b = &degs * &variance / 2.;
    sample_inv_gamma_array(seed, a.view(), b.view())
}

pub fn sample_chi2_array(seed: Seed, degs: ArrayViewD<'_, f64>) -> Result<ArrayD<f64>> {
    let mut rng = seed.rng();
    let draws = degs
        .iter()
        .map(|&d| Ok(unit_gamma(&mut rng, d / 2.)? * 2.))
        .collect::<Result<Vec<f64>>>()?;
    Ok(ArrayD::from_shape_vec(IxDyn(degs.shape()), draws)?)
}
