//! Linear celestial world-coordinate solution
//!
//! Pixels are addressed as `[row, col]` with zero-based indices, matching
//! ndarray. The FITS convention is one-based, so `CRPIX` values are offset by
//! one when mapping between the two. The projection is treated as locally
//! linear, which holds for the small fields that are feathered together.

use crate::units::{Angle, AngleExt};

/// Relative tolerance used when comparing two WCS solutions
pub const WCS_REL_TOLERANCE: f64 = 1e-10;

#[derive(Debug, Clone, PartialEq)]
pub struct CelestialWcs {
    /// Reference pixel (CRPIX1, CRPIX2), one-based
    pub crpix: [f64; 2],
    /// World coordinate at the reference pixel in degrees (CRVAL1, CRVAL2)
    pub crval: [f64; 2],
    /// Increment per pixel in degrees (CDELT1, CDELT2)
    pub cdelt: [f64; 2],
    /// Axis types (CTYPE1, CTYPE2)
    pub ctype: [String; 2],
}

impl CelestialWcs {
    pub fn new(crpix: [f64; 2], crval: [f64; 2], cdelt: [f64; 2]) -> Self {
        Self {
            crpix,
            crval,
            cdelt,
            ctype: ["RA---SIN".to_string(), "DEC--SIN".to_string()],
        }
    }

    /// Grid centred on `(ra, dec)` for an image of `shape` with square pixels.
    ///
    /// RA increases to the left as on the sky, so CDELT1 is negative.
    pub fn centered(shape: (usize, usize), center_deg: (f64, f64), pixel_scale: Angle) -> Self {
        let (rows, cols) = shape;
        let scale = pixel_scale.as_degrees();
        Self::new(
            [(cols as f64 + 1.0) / 2.0, (rows as f64 + 1.0) / 2.0],
            [center_deg.0, center_deg.1],
            [-scale, scale],
        )
    }

    /// World coordinates in degrees for a (fractional) zero-based pixel
    pub fn pixel_to_world(&self, row: f64, col: f64) -> (f64, f64) {
        (
            self.crval[0] + (col + 1.0 - self.crpix[0]) * self.cdelt[0],
            self.crval[1] + (row + 1.0 - self.crpix[1]) * self.cdelt[1],
        )
    }

    /// Zero-based fractional `(row, col)` for a world position in degrees
    pub fn world_to_pixel(&self, lon: f64, lat: f64) -> (f64, f64) {
        (
            (lat - self.crval[1]) / self.cdelt[1] + self.crpix[1] - 1.0,
            (lon - self.crval[0]) / self.cdelt[0] + self.crpix[0] - 1.0,
        )
    }

    /// Absolute pixel sizes along each axis
    pub fn pixel_scales(&self) -> (Angle, Angle) {
        (
            Angle::from_degrees(self.cdelt[0].abs()),
            Angle::from_degrees(self.cdelt[1].abs()),
        )
    }

    /// Celestial pixel area in square degrees
    pub fn pixel_area_deg2(&self) -> f64 {
        (self.cdelt[0] * self.cdelt[1]).abs()
    }

    /// Effective square pixel size: the square root of the pixel area
    pub fn pixel_scale(&self) -> Angle {
        Angle::from_degrees(self.pixel_area_deg2().sqrt())
    }

    /// Compare two solutions within [`WCS_REL_TOLERANCE`]
    pub fn approx_eq(&self, other: &CelestialWcs) -> bool {
        let close = |a: f64, b: f64| {
            (a - b).abs() <= WCS_REL_TOLERANCE * a.abs().max(b.abs()).max(1.0)
        };
        (0..2).all(|i| {
            close(self.crpix[i], other.crpix[i])
                && close(self.crval[i], other.crval[i])
                && close(self.cdelt[i], other.cdelt[i])
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_pixel_world_roundtrip() {
        let wcs = CelestialWcs::centered((64, 48), (83.8, -5.4), Angle::from_arcseconds(1.5));
        let (lon, lat) = wcs.pixel_to_world(10.25, 40.5);
        let (row, col) = wcs.world_to_pixel(lon, lat);
        assert_relative_eq!(row, 10.25, epsilon = 1e-9);
        assert_relative_eq!(col, 40.5, epsilon = 1e-9);
    }

    #[test]
    fn test_centered_reference_is_image_center() {
        let wcs = CelestialWcs::centered((65, 65), (10.0, 20.0), Angle::from_arcseconds(1.0));
        let (lon, lat) = wcs.pixel_to_world(32.0, 32.0);
        assert_relative_eq!(lon, 10.0, epsilon = 1e-12);
        assert_relative_eq!(lat, 20.0, epsilon = 1e-12);
    }

    #[test]
    fn test_pixel_scale_from_area() {
        let mut wcs = CelestialWcs::centered((10, 10), (0.0, 0.0), Angle::from_arcseconds(2.0));
        assert_relative_eq!(wcs.pixel_scale().as_arcseconds(), 2.0, epsilon = 1e-9);

        wcs.cdelt = [-2.0 / 3600.0, 8.0 / 3600.0];
        assert_relative_eq!(wcs.pixel_scale().as_arcseconds(), 4.0, epsilon = 1e-9);
    }

    #[test]
    fn test_approx_eq() {
        let a = CelestialWcs::centered((10, 10), (1.0, 2.0), Angle::from_arcseconds(1.0));
        let mut b = a.clone();
        assert!(a.approx_eq(&b));
        b.crval[0] += 1e-3;
        assert!(!a.approx_eq(&b));
    }
}
