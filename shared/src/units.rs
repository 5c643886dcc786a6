//! Type-safe angular quantities and surface-brightness units
//!
//! Angles use the `uom` crate so beam widths and pixel scales cannot be mixed
//! up between degrees, arcseconds and radians. Surface-brightness units are
//! the handful that radio images carry in their `BUNIT` keyword; they are
//! modelled as a kind plus a linear scale so that `mJy/beam` and `Jy/beam`
//! convert by a factor while `Jy/beam` and `K` need beam and frequency
//! metadata.

use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uom::si::angle::{degree, radian, second};

/// Type alias for angular measurements
pub type Angle = uom::si::f64::Angle;

/// Speed of light in m/s
const SPEED_OF_LIGHT: f64 = 299_792_458.0;

/// Boltzmann constant in J/K
const BOLTZMANN: f64 = 1.380_649e-23;

/// One jansky in W m^-2 Hz^-1
const JANSKY: f64 = 1e-26;

/// Extension trait for angle conversions commonly used for sky images
pub trait AngleExt {
    /// Create angle from degrees
    fn from_degrees(deg: f64) -> Self;

    /// Get angle in degrees
    fn as_degrees(&self) -> f64;

    /// Create angle from arcseconds
    fn from_arcseconds(arcsec: f64) -> Self;

    /// Get angle in arcseconds
    fn as_arcseconds(&self) -> f64;

    /// Create angle from radians
    fn from_radians(rad: f64) -> Self;

    /// Get angle in radians
    fn as_radians(&self) -> f64;
}

impl AngleExt for Angle {
    fn from_degrees(deg: f64) -> Self {
        Angle::new::<degree>(deg)
    }

    fn as_degrees(&self) -> f64 {
        self.get::<degree>()
    }

    fn from_arcseconds(arcsec: f64) -> Self {
        Angle::new::<second>(arcsec)
    }

    fn as_arcseconds(&self) -> f64 {
        self.get::<second>()
    }

    fn from_radians(rad: f64) -> Self {
        Angle::new::<radian>(rad)
    }

    fn as_radians(&self) -> f64 {
        self.get::<radian>()
    }
}

/// Errors raised while parsing or converting brightness units
#[derive(Error, Debug, Clone, PartialEq)]
pub enum UnitError {
    #[error("Unrecognised brightness unit: '{0}'")]
    Unknown(String),
    #[error("Cannot convert {from} to {to}")]
    Incompatible { from: FluxUnit, to: FluxUnit },
    #[error("Converting {from} to {to} requires a beam")]
    MissingBeam { from: FluxUnit, to: FluxUnit },
    #[error("Converting {from} to {to} requires a rest frequency")]
    MissingFrequency { from: FluxUnit, to: FluxUnit },
}

/// Physical dimension of a surface-brightness unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BrightnessKind {
    /// Flux density per beam (Jy/beam)
    JanskyPerBeam,
    /// Flux density per steradian (Jy/sr)
    JanskyPerSteradian,
    /// Brightness temperature (K)
    Kelvin,
    /// Counts or other unitless data
    Dimensionless,
}

impl BrightnessKind {
    fn symbol(&self) -> &'static str {
        match self {
            BrightnessKind::JanskyPerBeam => "Jy/beam",
            BrightnessKind::JanskyPerSteradian => "Jy/sr",
            BrightnessKind::Kelvin => "K",
            BrightnessKind::Dimensionless => "",
        }
    }
}

/// A surface-brightness unit: `value_in_base = value * scale`
///
/// The base unit of each kind is `Jy/beam`, `Jy/sr`, `K` or 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FluxUnit {
    pub kind: BrightnessKind,
    pub scale: f64,
}

/// Metadata needed to convert between brightness kinds
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ConversionContext {
    /// Beam solid angle in steradians
    pub beam_solid_angle_sr: Option<f64>,
    /// Rest frequency in Hz
    pub frequency_hz: Option<f64>,
}

impl FluxUnit {
    pub const fn new(kind: BrightnessKind, scale: f64) -> Self {
        Self { kind, scale }
    }

    pub const fn jansky_per_beam() -> Self {
        Self::new(BrightnessKind::JanskyPerBeam, 1.0)
    }

    pub const fn millijansky_per_beam() -> Self {
        Self::new(BrightnessKind::JanskyPerBeam, 1e-3)
    }

    pub const fn jansky_per_steradian() -> Self {
        Self::new(BrightnessKind::JanskyPerSteradian, 1.0)
    }

    pub const fn kelvin() -> Self {
        Self::new(BrightnessKind::Kelvin, 1.0)
    }

    pub const fn dimensionless() -> Self {
        Self::new(BrightnessKind::Dimensionless, 1.0)
    }

    /// True for `Jy/beam` and its scaled variants
    pub fn is_per_beam(&self) -> bool {
        self.kind == BrightnessKind::JanskyPerBeam
    }

    /// Units are equivalent when they differ only by a constant factor
    pub fn is_equivalent(&self, other: &FluxUnit) -> bool {
        self.kind == other.kind
    }

    /// Multiplicative factor taking values in `self` to values in `target`.
    ///
    /// Same-kind conversions need no metadata. Per-beam values go through the
    /// beam solid angle; temperatures go through the Rayleigh-Jeans relation
    /// `T = S c² / (2 k ν² Ω)`.
    pub fn conversion_factor(
        &self,
        target: &FluxUnit,
        context: &ConversionContext,
    ) -> Result<f64, UnitError> {
        if self.kind == target.kind {
            return Ok(self.scale / target.scale);
        }

        let to_hub = self.per_steradian_factor(self, target, context)?;
        let from_hub = target.per_steradian_factor(self, target, context)?;
        Ok(self.scale * to_hub / from_hub / target.scale)
    }

    /// Factor from this kind's base unit to Jy/sr.
    fn per_steradian_factor(
        &self,
        from: &FluxUnit,
        to: &FluxUnit,
        context: &ConversionContext,
    ) -> Result<f64, UnitError> {
        match self.kind {
            BrightnessKind::JanskyPerSteradian => Ok(1.0),
            BrightnessKind::JanskyPerBeam => match context.beam_solid_angle_sr {
                Some(sr) if sr > 0.0 => Ok(1.0 / sr),
                _ => Err(UnitError::MissingBeam {
                    from: *from,
                    to: *to,
                }),
            },
            BrightnessKind::Kelvin => match context.frequency_hz {
                Some(nu) if nu > 0.0 => Ok(2.0 * BOLTZMANN * nu * nu
                    / (SPEED_OF_LIGHT * SPEED_OF_LIGHT)
                    / JANSKY),
                _ => Err(UnitError::MissingFrequency {
                    from: *from,
                    to: *to,
                }),
            },
            BrightnessKind::Dimensionless => Err(UnitError::Incompatible {
                from: *from,
                to: *to,
            }),
        }
    }
}

impl fmt::Display for FluxUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = PREFIXES
            .iter()
            .find(|(_, factor)| (self.scale - factor).abs() <= 1e-12 * factor.abs())
            .map(|(p, _)| *p);

        match (self.kind, prefix) {
            (BrightnessKind::Dimensionless, _) if self.scale == 1.0 => write!(f, "dimensionless"),
            (kind, Some(p)) => write!(f, "{p}{}", kind.symbol()),
            (kind, None) => write!(f, "{} {}", self.scale, kind.symbol()),
        }
    }
}

const PREFIXES: [(&str, f64); 7] = [
    ("", 1.0),
    ("m", 1e-3),
    ("u", 1e-6),
    ("n", 1e-9),
    ("k", 1e3),
    ("M", 1e6),
    ("G", 1e9),
];

impl FromStr for FluxUnit {
    type Err = UnitError;

    /// Parse a FITS `BUNIT` value such as `Jy/beam`, `mJy beam-1`, `MJy/sr` or `K`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let compact: String = s
            .trim()
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '.' && *c != '*')
            .collect();
        let compact = compact
            .replace("beam^-1", "/beam")
            .replace("beam-1", "/beam")
            .replace("sr^-1", "/sr")
            .replace("sr-1", "/sr")
            .replace("//", "/");

        if compact.is_empty() || compact == "1" || compact.eq_ignore_ascii_case("dimensionless") {
            return Ok(FluxUnit::dimensionless());
        }

        let lowered = compact.to_lowercase();
        let cores = [
            ("jy/beam", BrightnessKind::JanskyPerBeam),
            ("jy/sr", BrightnessKind::JanskyPerSteradian),
            ("k", BrightnessKind::Kelvin),
        ];

        for (core, kind) in cores {
            if !lowered.ends_with(core) {
                continue;
            }
            let prefix = &compact[..compact.len() - core.len()];
            let scale = match prefix {
                "µ" | "μ" => Some(1e-6),
                p => PREFIXES.iter().find(|(q, _)| *q == p).map(|(_, f)| *f),
            };
            if let Some(scale) = scale {
                return Ok(FluxUnit::new(kind, scale));
            }
        }

        Err(UnitError::Unknown(s.to_string()))
    }
}

/// Solid angle of an elliptical Gaussian beam in steradians
pub fn gaussian_solid_angle(major: Angle, minor: Angle) -> f64 {
    PI / (4.0 * 2f64.ln()) * major.as_radians() * minor.as_radians()
}
