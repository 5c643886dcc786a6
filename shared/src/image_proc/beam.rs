//! Gaussian beam descriptors

use crate::units::{gaussian_solid_angle, Angle, AngleExt};

/// Elliptical Gaussian beam described by its FWHM axes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Beam {
    /// Major-axis full width at half maximum
    pub major: Angle,
    /// Minor-axis full width at half maximum
    pub minor: Angle,
    /// Position angle of the major axis
    pub position_angle: Angle,
}

impl Beam {
    pub fn new(major: Angle, minor: Angle, position_angle: Angle) -> Self {
        Self {
            major,
            minor,
            position_angle,
        }
    }

    /// Circular beam with the given FWHM
    pub fn circular(fwhm: Angle) -> Self {
        Self::new(fwhm, fwhm, Angle::from_degrees(0.0))
    }

    /// Beam solid angle in steradians
    pub fn solid_angle_sr(&self) -> f64 {
        gaussian_solid_angle(self.major, self.minor)
    }

    /// Relative comparison used to decide whether per-channel beams vary
    pub fn approx_eq(&self, other: &Beam, rel_tol: f64) -> bool {
        let close = |a: f64, b: f64| (a - b).abs() <= rel_tol * a.abs().max(b.abs());
        close(self.major.as_radians(), other.major.as_radians())
            && close(self.minor.as_radians(), other.minor.as_radians())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_solid_angle_scales_with_area() {
        let small = Beam::circular(Angle::from_arcseconds(10.0));
        let large = Beam::circular(Angle::from_arcseconds(20.0));
        assert_relative_eq!(
            large.solid_angle_sr() / small.solid_angle_sr(),
            4.0,
            max_relative = 1e-12
        );
    }

    #[test]
    fn test_approx_eq() {
        let a = Beam::circular(Angle::from_arcseconds(10.0));
        let b = Beam::circular(Angle::from_arcseconds(10.0 * (1.0 + 1e-9)));
        let c = Beam::circular(Angle::from_arcseconds(11.0));
        assert!(a.approx_eq(&b, 1e-6));
        assert!(!a.approx_eq(&c, 1e-6));
    }
}
