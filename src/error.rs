use thiserror::Error;

/// Errors raised by the samplers, the mapping engine and the batching helpers.
///
/// Everything here is detected locally by the call that returns it. Nothing
/// is retried; the caller decides whether to abort the surrounding fit.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// An array argument has the wrong shape for the operation.
    #[error("Shape error: {0}")]
    Shape(String),
    /// A parameter lies outside the domain of the distribution.
    #[error("Contract violated: {0}")]
    Contract(String),
    /// A factorization failed or a result contains non-finite values.
    #[error("Numerical instability: {0}")]
    NumericalInstability(String),
    /// A setting has an invalid value.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<ndarray::ShapeError> for Error {
    fn from(err: ndarray::ShapeError) -> Self {
        Error::Shape(err.to_string())
    }
}
