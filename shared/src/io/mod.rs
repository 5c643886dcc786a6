//! File I/O for sky images and spectral cubes.
//!
//! FITS support needs the system cfitsio library and lives behind the `fits`
//! feature. [`FitsError`] is always available so callers can name it in their
//! own error types regardless of the feature set.

#[cfg(feature = "fits")]
pub mod fits;

use thiserror::Error;

use crate::image_proc::ImageError;
use crate::units::UnitError;

/// Errors that can occur during FITS file operations
#[derive(Error, Debug)]
pub enum FitsError {
    #[error("FITS I/O error: {0}")]
    FitsIo(String),
    #[error("HDU not found: {0}")]
    HduNotFound(String),
    #[error("Missing header keyword {0}")]
    MissingKeyword(String),
    #[error("Unsupported image layout: {0}")]
    UnsupportedLayout(String),
    #[error("Invalid brightness unit: {0}")]
    Unit(#[from] UnitError),
    #[error(transparent)]
    Image(#[from] ImageError),
}

#[cfg(feature = "fits")]
impl From<fitsio::errors::Error> for FitsError {
    fn from(err: fitsio::errors::Error) -> Self {
        FitsError::FitsIo(err.to_string())
    }
}
