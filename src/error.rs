//! Error and result types for the BLAS surface.

use failure::Fail;

use crate::Fpp;

/// Crate result type.
pub type Result<T> = ::std::result::Result<T, Error>;

/// Errors surfaced by the BLAS operations.
///
/// Runtime failures pass through from [`clrt`]; the two usage variants are
/// detected before anything is enqueued.
#[derive(Debug, Fail)]
pub enum Error {
    #[fail(display = "{}", _0)]
    Runtime(#[cause] clrt::Error),
    #[fail(display = "foreign buffer: operands belong to different contexts")]
    ForeignBuffer,
    #[fail(display = "precision {} is not supported by the device", _0)]
    PrecisionNotSupported(Fpp),
}

impl From<clrt::Error> for Error {
    fn from(err: clrt::Error) -> Error {
        Error::Runtime(err)
    }
}
