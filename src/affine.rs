//! Affine maps in homogeneous coordinates.

use ndarray::{concatenate, ArrayD, ArrayView2, ArrayViewD, Axis, IxDyn};

use crate::error::{Error, Result};

/// Append a 1 to every vector along the last axis, so that `(..., d)`
/// becomes `(..., d + 1)`.
pub fn pad_affine(x: ArrayViewD<'_, f64>) -> Result<ArrayD<f64>> {
    let Some(last) = x.ndim().checked_sub(1) else {
        return Err(Error::Shape("cannot pad a scalar".to_string()));
    };
    let mut shape = x.shape().to_vec();
    shape[last] = 1;
    let ones = ArrayD::<f64>::ones(IxDyn(&shape));
    let padded = concatenate(Axis(last), &[x.view(), ones.view()])?;
    Ok(padded.as_standard_layout().into_owned())
}

/// Apply `ab = [A | b]` of shape `(k, d + 1)` to every `d`-vector along the
/// last axis of `x`, giving `A x + b` with shape `(..., k)`.
pub fn apply_affine(x: ArrayViewD<'_, f64>, ab: ArrayView2<'_, f64>) -> Result<ArrayD<f64>> {
    let padded = pad_affine(x)?;
    let dim = padded.shape()[padded.ndim() - 1];
    if ab.ncols() != dim {
        return Err(Error::Shape(format!(
            "affine map has {} columns, vectors have {} entries plus offset",
            ab.ncols(),
            dim - 1
        )));
    }

    let mut out_shape = padded.shape().to_vec();
    let last = out_shape.len() - 1;
    out_shape[last] = ab.nrows();

    let rows = padded.len() / dim;
    let flat = padded.into_shape_with_order((rows, dim))?;
    let mapped = flat.dot(&ab.t());
    Ok(mapped.into_dyn().into_shape_with_order(IxDyn(&out_shape))?)
}
