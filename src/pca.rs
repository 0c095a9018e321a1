//! Principal component analysis over the valid frames of masked data.

use faer::Mat;
use ndarray::{Array1, Array2, ArrayD, ArrayViewD, Axis, IxDyn};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::seed::Seed;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PcaSettings {
    /// Upper bound on the number of frames the fit uses. Larger inputs are
    /// subsampled without replacement.
    pub max_frames: usize,
    pub verbose: bool,
}

impl Default for PcaSettings {
    fn default() -> Self {
        Self {
            max_frames: 1_000_000,
            verbose: false,
        }
    }
}

/// A fitted PCA model.
///
/// Components are the rows of `components`, ordered by decreasing explained
/// variance, and normalized so that the entry of largest magnitude in each
/// row is positive.
#[derive(Debug, Clone, PartialEq)]
pub struct Pca {
    pub mean: Array1<f64>,
    pub components: Array2<f64>,
    pub explained_variance: Array1<f64>,
    pub explained_variance_ratio: Array1<f64>,
}

impl Pca {
    pub fn num_features(&self) -> usize {
        self.mean.len()
    }

    pub fn num_components(&self) -> usize {
        self.components.nrows()
    }

    /// Project `(..., d)` data onto the components, giving `(..., k)`.
    pub fn transform(&self, y: ArrayViewD<'_, f64>) -> Result<ArrayD<f64>> {
        let frames = flatten_frames(y.view(), self.num_features())?;
        let projected = (&frames - &self.mean).dot(&self.components.t());

        let mut shape = y.shape().to_vec();
        let last = shape.len() - 1;
        shape[last] = self.num_components();
        Ok(projected.into_dyn().into_shape_with_order(IxDyn(&shape))?)
    }
}

fn flatten_frames(y: ArrayViewD<'_, f64>, features: usize) -> Result<Array2<f64>> {
    if y.ndim() == 0 || y.shape()[y.ndim() - 1] != features {
        return Err(Error::Shape(format!(
            "expected data with {features} features along the last axis, got shape {:?}",
            y.shape()
        )));
    }
    let frames = y.len() / features.max(1);
    Ok(y.as_standard_layout()
        .into_owned()
        .into_shape_with_order((frames, features))?)
}

/// Fit a PCA model to the frames of `y` (shape `(..., d)`) whose `mask`
/// entry (shape `(...)`) is positive.
pub fn fit_pca(
    y: ArrayViewD<'_, f64>,
    mask: ArrayViewD<'_, f64>,
    settings: PcaSettings,
    seed: Seed,
) -> Result<Pca> {
    if y.ndim() == 0 || mask.shape() != &y.shape()[..y.ndim() - 1] {
        return Err(Error::Shape(format!(
            "mask of shape {:?} does not match data of shape {:?}",
            mask.shape(),
            y.shape()
        )));
    }
    let features = y.shape()[y.ndim() - 1];
    let frames = flatten_frames(y.view(), features)?;

    let valid: Vec<usize> = mask
        .iter()
        .enumerate()
        .filter(|&(_, &m)| m > 0.)
        .map(|(i, _)| i)
        .collect();

    let num_samples = settings.max_frames.min(valid.len());
    if num_samples < 2 {
        return Err(Error::Contract(format!(
            "PCA needs at least two frames, {} are valid and at most {} may be used",
            valid.len(),
            settings.max_frames
        )));
    }
    let mut chosen: Vec<usize> = if num_samples < valid.len() {
        let mut rng = seed.rng();
        rand::seq::index::sample(&mut rng, valid.len(), num_samples)
            .into_iter()
            .map(|i| valid[i])
            .collect()
    } else {
        valid
    };
    chosen.sort_unstable();

    if settings.verbose {
        log::info!("PCA: Fitting PCA model to {num_samples} data points");
    }

    let sample = frames.select(Axis(0), &chosen);
    let mean = sample
        .mean_axis(Axis(0))
        .ok_or_else(|| Error::Shape("no frames to average".to_string()))?;
    let centered = &sample - &mean;

    let centered = Mat::from_fn(num_samples, features, |i, j| centered[[i, j]]);
    let svd = centered.thin_svd().map_err(|err| {
        Error::NumericalInstability(format!("SVD of centered data did not converge: {err:?}"))
    })?;
    let singular = svd.S().column_vector();
    let v = svd.V();
    let num_components = singular.nrows();

    let mut components = Array2::<f64>::zeros((num_components, features));
    for (k, mut row) in components.axis_iter_mut(Axis(0)).enumerate() {
        let pivot = (0..features)
            .max_by(|&a, &b| v[(a, k)].abs().total_cmp(&v[(b, k)].abs()))
            .unwrap_or(0);
        let sign = if v[(pivot, k)] < 0. { -1. } else { 1. };
        for (j, val) in row.iter_mut().enumerate() {
            *val = sign * v[(j, k)];
        }
    }

    let dof = (num_samples - 1) as f64;
    let explained_variance: Array1<f64> = singular.iter().map(|s| s * s / dof).collect();
    let total = explained_variance.sum();
    let explained_variance_ratio = if total > 0. {
        explained_variance.mapv(|ev| ev / total)
    } else {
        Array1::zeros(num_components)
    };

    Ok(Pca {
        mean,
        components,
        explained_variance,
        explained_variance_ratio,
    })
}
