//! Single-plane sky images

use ndarray::Array2;

use super::reproject::reproject_bilinear;
use super::{Beam, CelestialWcs, ImageError};
use crate::units::{ConversionContext, FluxUnit};

/// Metadata describing one image plane, the equivalent of a FITS header
#[derive(Debug, Clone, PartialEq)]
pub struct ImageHeader {
    /// Array shape as (rows, cols)
    pub shape: (usize, usize),
    pub wcs: CelestialWcs,
    pub unit: FluxUnit,
    pub beam: Option<Beam>,
    pub rest_frequency_hz: Option<f64>,
}

impl ImageHeader {
    pub fn new(shape: (usize, usize), wcs: CelestialWcs, unit: FluxUnit) -> Self {
        Self {
            shape,
            wcs,
            unit,
            beam: None,
            rest_frequency_hz: None,
        }
    }

    pub fn with_beam(mut self, beam: Beam) -> Self {
        self.beam = Some(beam);
        self
    }

    pub fn with_rest_frequency(mut self, hz: f64) -> Self {
        self.rest_frequency_hz = Some(hz);
        self
    }

    /// Metadata available for unit conversion of data described by this header
    pub fn conversion_context(&self) -> ConversionContext {
        ConversionContext {
            beam_solid_angle_sr: self.beam.map(|b| b.solid_angle_sr()),
            frequency_hz: self.rest_frequency_hz,
        }
    }

    /// Same pixel shape and world-coordinate solution
    pub fn shares_grid_with(&self, other: &ImageHeader) -> bool {
        self.shape == other.shape && self.wcs.approx_eq(&other.wcs)
    }
}

/// A 2D image together with its header
#[derive(Debug, Clone)]
pub struct ImagePlane {
    header: ImageHeader,
    data: Array2<f64>,
}

impl ImagePlane {
    /// Pair data with a header, checking that the shapes agree
    pub fn new(data: Array2<f64>, header: ImageHeader) -> Result<Self, ImageError> {
        if data.dim() != header.shape {
            return Err(ImageError::ShapeMismatch {
                expected: vec![header.shape.0, header.shape.1],
                actual: data.shape().to_vec(),
            });
        }
        Ok(Self { header, data })
    }

    pub fn header(&self) -> &ImageHeader {
        &self.header
    }

    pub fn data(&self) -> &Array2<f64> {
        &self.data
    }

    pub fn into_data(self) -> Array2<f64> {
        self.data
    }

    pub fn shape(&self) -> (usize, usize) {
        self.header.shape
    }

    pub fn wcs(&self) -> &CelestialWcs {
        &self.header.wcs
    }

    pub fn unit(&self) -> FluxUnit {
        self.header.unit
    }

    pub fn beam(&self) -> Option<&Beam> {
        self.header.beam.as_ref()
    }

    /// New plane with this header and different data of the same shape
    pub fn with_data(&self, data: Array2<f64>) -> Result<Self, ImageError> {
        Self::new(data, self.header.clone())
    }

    /// Multiply every pixel by a constant
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            header: self.header.clone(),
            data: &self.data * factor,
        }
    }

    /// Convert to another brightness unit using this plane's beam and frequency.
    ///
    /// Converting to the unit the plane already has is a no-op copy.
    pub fn to_unit(&self, unit: FluxUnit) -> Result<Self, ImageError> {
        let factor = self
            .header
            .unit
            .conversion_factor(&unit, &self.header.conversion_context())?;

        let mut header = self.header.clone();
        header.unit = unit;
        let data = if factor == 1.0 {
            self.data.clone()
        } else {
            &self.data * factor
        };
        Ok(Self { header, data })
    }

    /// Resample onto the pixel grid described by `target`.
    ///
    /// Brightness units are intensive, so values are interpolated without
    /// rescaling. Unit, beam and frequency are kept from this plane.
    pub fn reproject(&self, target: &ImageHeader) -> Self {
        let data = reproject_bilinear(
            &self.data.view(),
            &self.header.wcs,
            &target.wcs,
            target.shape,
        );
        let header = ImageHeader {
            shape: target.shape,
            wcs: target.wcs.clone(),
            ..self.header.clone()
        };
        Self { header, data }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::{Angle, AngleExt};
    use approx::assert_relative_eq;

    fn header(shape: (usize, usize)) -> ImageHeader {
        ImageHeader::new(
            shape,
            CelestialWcs::centered(shape, (150.0, 2.0), Angle::from_arcseconds(1.0)),
            FluxUnit::jansky_per_beam(),
        )
        .with_beam(Beam::circular(Angle::from_arcseconds(3.0)))
    }

    #[test]
    fn test_shape_is_validated() {
        let result = ImagePlane::new(Array2::zeros((4, 5)), header((5, 4)));
        assert!(matches!(result, Err(ImageError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_to_same_unit_is_noop() {
        let data = Array2::from_shape_fn((4, 4), |(r, c)| (r * 4 + c) as f64);
        let plane = ImagePlane::new(data.clone(), header((4, 4))).unwrap();
        let converted = plane.to_unit(FluxUnit::jansky_per_beam()).unwrap();
        assert_eq!(converted.data(), &data);
        assert_eq!(converted.unit(), plane.unit());
    }

    #[test]
    fn test_to_scaled_unit() {
        let plane = ImagePlane::new(Array2::from_elem((2, 2), 0.5), header((2, 2))).unwrap();
        let converted = plane.to_unit(FluxUnit::millijansky_per_beam()).unwrap();
        assert_relative_eq!(converted.data()[[1, 1]], 500.0, epsilon = 1e-9);
    }

    #[test]
    fn test_reproject_onto_own_grid_is_identity() {
        let data = Array2::from_shape_fn((8, 6), |(r, c)| (r as f64).sin() + c as f64);
        let plane = ImagePlane::new(data.clone(), header((8, 6))).unwrap();
        let same = plane.reproject(plane.header());
        for (a, b) in same.data().iter().zip(data.iter()) {
            assert_relative_eq!(*a, *b, epsilon = 1e-9);
        }
    }
}
