//! Error types for feathering operations

use shared::image_proc::ImageError;
use shared::io::FitsError;
use shared::units::UnitError;
use thiserror::Error;

/// Everything that can go wrong while combining or comparing images.
///
/// These are input or configuration problems; none of them is retried.
#[derive(Error, Debug)]
pub enum FeatherError {
    #[error("Numerical failure: {0}")]
    Numerical(String),
    #[error("Shape mismatch for {what}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        what: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },
    #[error("Incompatible units: cannot convert {from} to {to}")]
    IncompatibleUnits { from: String, to: String },
    #[error("Missing metadata: {0}")]
    MissingMetadata(String),
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("Spectral axes do not match: {0}")]
    SpectralMismatch(String),
    #[error("Pixel grids do not match: {0}")]
    GridMismatch(String),
    #[error("Chunk geometry mismatch: {0}")]
    ChunkMismatch(String),
    #[error("Unsupported input: {0}")]
    UnsupportedInput(String),
    #[error("No frequency bins in the requested angular range: {0}")]
    EmptyOverlap(String),
    #[error("Image operation failed: {0}")]
    Image(ImageError),
    #[error("FITS error: {0}")]
    Fits(#[from] FitsError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Operation cancelled after {completed} of {total} planes")]
    Cancelled { completed: usize, total: usize },
}

pub type Result<T> = std::result::Result<T, FeatherError>;

impl From<UnitError> for FeatherError {
    fn from(err: UnitError) -> Self {
        match err {
            UnitError::Incompatible { from, to } => FeatherError::IncompatibleUnits {
                from: from.to_string(),
                to: to.to_string(),
            },
            UnitError::MissingBeam { from, to } => FeatherError::MissingMetadata(format!(
                "converting {from} to {to} needs a beam"
            )),
            UnitError::MissingFrequency { from, to } => FeatherError::MissingMetadata(format!(
                "converting {from} to {to} needs a rest frequency"
            )),
            UnitError::Unknown(unit) => {
                FeatherError::InvalidParameter(format!("unknown unit '{unit}'"))
            }
        }
    }
}

impl From<ImageError> for FeatherError {
    fn from(err: ImageError) -> Self {
        match err {
            ImageError::ShapeMismatch { expected, actual } => FeatherError::ShapeMismatch {
                what: "image data".to_string(),
                expected,
                actual,
            },
            ImageError::Unit(unit) => unit.into(),
            other => FeatherError::Image(other),
        }
    }
}

impl FeatherError {
    pub(crate) fn shape_mismatch(what: &str, expected: &[usize], actual: &[usize]) -> Self {
        FeatherError::ShapeMismatch {
            what: what.to_string(),
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::units::FluxUnit;

    #[test]
    fn test_unit_errors_map_to_taxonomy() {
        let err: FeatherError = UnitError::Incompatible {
            from: FluxUnit::jansky_per_beam(),
            to: FluxUnit::dimensionless(),
        }
        .into();
        assert!(matches!(err, FeatherError::IncompatibleUnits { .. }));

        let err: FeatherError = ImageError::Unit(UnitError::MissingBeam {
            from: FluxUnit::jansky_per_beam(),
            to: FluxUnit::jansky_per_steradian(),
        })
        .into();
        assert!(matches!(err, FeatherError::MissingMetadata(_)));
    }

    #[test]
    fn test_image_shape_maps_to_shape_mismatch() {
        let err: FeatherError = ImageError::ShapeMismatch {
            expected: vec![4, 4],
            actual: vec![4, 5],
        }
        .into();
        assert!(err.to_string().contains("[4, 5]"));
    }
}
