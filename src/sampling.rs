//! All samplers of the crate as one closed set of distributions.

use faer::Mat;
use ndarray::Array1;

use crate::directional::{sample_vonmises, sample_vonmises_fisher};
use crate::error::Result;
use crate::finite::AllFinite;
use crate::matrix_variate::{sample_invwishart, sample_mn, sample_mniw};
use crate::scalar::{sample_chi2, sample_gamma, sample_inv_gamma, sample_scaled_inv_chi2};
use crate::seed::Seed;

/// A parameterized distribution. Drawing from it is a pure function of the
/// parameters and the seed.
#[derive(Debug, Clone, PartialEq)]
pub enum Distribution {
    /// Shape `a`, rate `b`.
    Gamma { a: f64, b: f64 },
    InvGamma { a: f64, b: f64 },
    ScaledInvChi2 { degs: f64, variance: f64 },
    Chi2 { degs: f64 },
    VonMises { theta: f64, kappa: f64 },
    /// Unnormalized mean direction; its norm is the concentration.
    VonMisesFisher { direction: Array1<f64> },
    MatrixNormal { m: Mat<f64>, u: Mat<f64>, v: Mat<f64> },
    InverseWishart { scale: Mat<f64>, nu: f64 },
    MatrixNormalInverseWishart { nu: f64, scale: Mat<f64>, m: Mat<f64>, k: Mat<f64> },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Draw {
    Scalar(f64),
    Vector(Array1<f64>),
    Matrix(Mat<f64>),
    /// Regression coefficients and covariance of a joint MNIW draw.
    MatrixPair { a: Mat<f64>, sigma: Mat<f64> },
}

impl Draw {
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Draw::Scalar(val) => Some(*val),
            _ => None,
        }
    }
}

impl AllFinite for Draw {
    fn all_finite(&self) -> bool {
        match self {
            Draw::Scalar(val) => val.all_finite(),
            Draw::Vector(vals) => vals.all_finite(),
            Draw::Matrix(mat) => mat.all_finite(),
            Draw::MatrixPair { a, sigma } => a.all_finite() && sigma.all_finite(),
        }
    }
}

impl Distribution {
    pub fn sample(&self, seed: Seed) -> Result<Draw> {
        let draw = match self {
            Distribution::Gamma { a, b } => Draw::Scalar(sample_gamma(seed, *a, *b)?),
            Distribution::InvGamma { a, b } => Draw::Scalar(sample_inv_gamma(seed, *a, *b)?),
            Distribution::ScaledInvChi2 { degs, variance } => {
                Draw::Scalar(sample_scaled_inv_chi2(seed, *degs, *variance)?)
            }
            Distribution::Chi2 { degs } => Draw::Scalar(sample_chi2(seed, *degs)?),
            Distribution::VonMises { theta, kappa } => {
                Draw::Scalar(sample_vonmises(seed, *theta, *kappa)?)
            }
            Distribution::VonMisesFisher { direction } => {
                Draw::Vector(sample_vonmises_fisher(seed, direction.view())?)
            }
            Distribution::MatrixNormal { m, u, v } => Draw::Matrix(sample_mn(seed, m, u, v)?),
            Distribution::InverseWishart { scale, nu } => {
                Draw::Matrix(sample_invwishart(seed, scale, *nu)?)
            }
            Distribution::MatrixNormalInverseWishart { nu, scale, m, k } => {
                let (a, sigma) = sample_mniw(seed, *nu, scale, m, k)?;
                Draw::MatrixPair { a, sigma }
            }
        };
        Ok(draw)
    }
}
