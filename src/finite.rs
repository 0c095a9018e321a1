//! Opt-in strict checking of sampler outputs.
//!
//! The samplers let NaN and infinity propagate. Wrapping a result in
//! [`strict`] turns that silent degradation into
//! [`Error::NumericalInstability`].

use faer::Mat;
use ndarray::{ArrayBase, Data, Dimension};

use crate::error::{Error, Result};

pub trait AllFinite {
    fn all_finite(&self) -> bool;
}

impl AllFinite for f64 {
    fn all_finite(&self) -> bool {
        self.is_finite()
    }
}

impl<S: Data<Elem = f64>, D: Dimension> AllFinite for ArrayBase<S, D> {
    fn all_finite(&self) -> bool {
        self.iter().all(|val| val.is_finite())
    }
}

impl AllFinite for Mat<f64> {
    fn all_finite(&self) -> bool {
        self.col_iter()
            .all(|col| col.iter().all(|val| val.is_finite()))
    }
}

impl<A: AllFinite, B: AllFinite> AllFinite for (A, B) {
    fn all_finite(&self) -> bool {
        self.0.all_finite() & self.1.all_finite()
    }
}

/// Return `value` unchanged if every entry is finite.
pub fn strict<T: AllFinite>(value: T) -> Result<T> {
    if value.all_finite() {
        Ok(value)
    } else {
        Err(Error::NumericalInstability(
            "sampler output contains NaN or infinite values".to_string(),
        ))
    }
}
