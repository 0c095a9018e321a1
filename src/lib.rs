//! Sampling primitives for Bayesian segmentation of behavioral time series.
//!
//! Conjugate samplers for Gamma-family, directional and matrix-variate
//! distributions, a hidden-state sequence sampler, a memory-bounded batched
//! map, and helpers for packing variable-length series into segments.

pub(crate) mod directional;
pub(crate) mod error;
pub(crate) mod finite;
pub(crate) mod hmm;
pub(crate) mod matrix_variate;
pub(crate) mod mixed_map;
pub(crate) mod psd;
pub(crate) mod sampling;
pub(crate) mod scalar;
pub(crate) mod seed;
pub(crate) mod segments;

pub mod affine;
pub mod pca;

pub use directional::{sample_vonmises, sample_vonmises_fisher};
pub use error::{Error, Result};
pub use finite::{strict, AllFinite};
pub use hmm::{
    sample_hmm_stateseq, sample_hmm_stateseq_with, ForwardFilterBackwardSample, PosteriorSampler,
};
pub use matrix_variate::{bartlett_factor, sample_invwishart, sample_mn, sample_mniw};
pub use mixed_map::{
    get_mixed_map_iters, mixed_map, set_mixed_map_iters, ChunkPlan, MixedMap, MixedMapSettings,
};
pub use psd::{
    boosted_solve, psd_inverse, safe_cholesky, symmetrize, symmetrize_stack, CholeskySettings,
    DEFAULT_DIAGONAL_BOOST,
};
pub use sampling::{Distribution, Draw};
pub use scalar::{
    sample_chi2, sample_chi2_array, sample_gamma, sample_gamma_array, sample_inv_gamma,
    sample_inv_gamma_array, sample_scaled_inv_chi2, sample_scaled_inv_chi2_array,
};
pub use seed::Seed;
pub use segments::{batch, unbatch, Batch, BatchSettings, SegmentLabel};
