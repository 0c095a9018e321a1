//! Circular and spherical samplers.

use std::f64::consts::PI;

use ndarray::{Array1, ArrayView1};
use rand::Rng;
use rand_distr::{Beta, Distribution, Gamma, StandardNormal};

use crate::error::{Error, Result};
use crate::seed::Seed;

// Below this concentration the von Mises distribution is uniform to machine precision.
const UNIFORM_KAPPA: f64 = 1e-8;

// Above this concentration the rejection samplers lose their acceptance region
// to rounding and the small-angle limits are used instead.
const CONCENTRATED_KAPPA: f64 = 1e6;

fn wrap_angle(theta: f64) -> f64 {
    (theta + PI).rem_euclid(2. * PI) - PI
}

/// Best-Fisher rejection sampler for a centered von Mises angle.
fn centered_vonmises<R: Rng + ?Sized>(rng: &mut R, kappa: f64) -> f64 {
    if kappa < UNIFORM_KAPPA {
        return PI * (2. * rng.random::<f64>() - 1.);
    }
    if kappa > CONCENTRATED_KAPPA {
        // wrapped normal with variance 1 / kappa
        let z: f64 = StandardNormal.sample(rng);
        return z / kappa.sqrt();
    }
    let tau = 1. + (1. + 4. * kappa * kappa).sqrt();
    let rho = (tau - (2. * tau).sqrt()) / (2. * kappa);
    let r = (1. + rho * rho) / (2. * rho);

    loop {
        let u1: f64 = rng.random();
        let u2: f64 = rng.random();
        let z = (PI * u1).cos();
        let f = (1. + r * z) / (r + z);
        let c = kappa * (r - f);
        if (c * (2. - c) - u2 > 0.) | ((c / u2).ln() + 1. - c >= 0.) {
            let u3: f64 = rng.random();
            let theta = f.clamp(-1., 1.).acos();
            return if u3 > 0.5 { theta } else { -theta };
        }
    }
}

/// Draw an angle in `[-π, π)` from a von Mises distribution with mean
/// direction `theta` and concentration `kappa`.
pub fn sample_vonmises(seed: Seed, theta: f64, kappa: f64) -> Result<f64> {
    if !theta.is_finite() | !(kappa >= 0.) | !kappa.is_finite() {
        return Err(Error::Contract(format!(
            "von Mises needs a finite mean and a finite non-negative concentration, got ({theta}, {kappa})"
        )));
    }
    let mut rng = seed.rng();
    Ok(wrap_angle(theta + centered_vonmises(&mut rng, kappa)))
}

/// Wood's sampler for the component of a von Mises-Fisher draw along the mean.
fn vmf_mean_component<R: Rng + ?Sized>(rng: &mut R, kappa: f64, dim: usize) -> Result<f64> {
    let m = (dim - 1) as f64;
    if kappa > CONCENTRATED_KAPPA {
        // kappa * (1 - w) tends to Gamma((dim - 1) / 2, 1)
        let gamma = Gamma::new(m / 2., 1f64)
            .map_err(|err| Error::Contract(format!("invalid gamma parameters: {err}")))?;
        return Ok((1. - gamma.sample(rng) / kappa).max(-1.));
    }
    let b = m / (2. * kappa + (4. * kappa * kappa + m * m).sqrt());
    let x0 = (1. - b) / (1. + b);
    // 1 - x0² without cancellation
    let c = kappa * x0 + m * (4. * b / ((1. + b) * (1. + b))).ln();
    let beta = Beta::new(m / 2., m / 2.)
        .map_err(|err| Error::Contract(format!("invalid beta parameters: {err}")))?;

    loop {
        let z = beta.sample(rng);
        let w = (1. - (1. + b) * z) / (1. - (1. - b) * z);
        let u: f64 = rng.random();
        if kappa * w + m * (1. - x0 * w).ln() - c >= u.ln() {
            return Ok(w);
        }
    }
}

/// Draw a unit vector from a von Mises-Fisher distribution.
///
/// `direction` is unnormalized: its norm is the concentration and its
/// normalization the mean direction. A zero vector has no defined mean; the
/// draw is then all NaN.
pub fn sample_vonmises_fisher(seed: Seed, direction: ArrayView1<'_, f64>) -> Result<Array1<f64>> {
    let dim = direction.len();
    if dim < 2 {
        return Err(Error::Shape(format!(
            "von Mises-Fisher needs at least two dimensions, got {dim}"
        )));
    }

    let kappa = direction.dot(&direction).sqrt();
    let mu = direction.mapv(|x| x / kappa);
    if !(kappa > 0.) | !mu.iter().all(|x| x.is_finite()) {
        log::warn!("Degenerate von Mises-Fisher direction (concentration {kappa})");
        return Ok(Array1::from_elem(dim, f64::NAN));
    }

    let mut rng = seed.rng();
    let w = vmf_mean_component(&mut rng, kappa, dim)?;

    // Uniform direction orthogonal to e1, scaled to the remaining length.
    let mut tangent: Array1<f64> = (0..dim - 1).map(|_| rng.sample(StandardNormal)).collect();
    let norm = tangent.dot(&tangent).sqrt();
    tangent *= ((1. - w) * (1. + w)).max(0.).sqrt() / norm;

    let mut sample = Array1::<f64>::zeros(dim);
    sample[0] = w;
    sample.slice_mut(ndarray::s![1..]).assign(&tangent);

    // Householder reflection taking e1 onto mu.
    let mut u = mu.mapv(|x| -x);
    u[0] += 1.;
    let uu = u.dot(&u);
    if uu > f64::EPSILON {
        let scale = 2. * u.dot(&sample) / uu;
        sample.scaled_add(-scale, &u);
    }
    Ok(sample)
}
