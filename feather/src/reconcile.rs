//! Flux unit reconciliation between the two inputs.
//!
//! The low-resolution data is converted into the high-resolution unit. When
//! that unit is per beam, the values are further rescaled by the ratio of beam
//! solid angles so "per beam" refers to the high-resolution beam on both
//! sides.

use log::debug;
use shared::image_proc::{Beam, ImagePlane, SpectralCube};
use shared::units::FluxUnit;

use crate::error::{FeatherError, Result};

/// Convert `lores` into the unit of `hires`.
///
/// With `match_units` off the data is left untouched, but the two units must
/// still be dimensionally equivalent.
pub fn reconcile_plane_units(
    hires: &ImagePlane,
    lores: &ImagePlane,
    match_units: bool,
) -> Result<ImagePlane> {
    let target = hires.unit();
    let mut reconciled = lores.clone();

    if match_units {
        reconciled = reconciled.to_unit(target)?;
        if target.is_per_beam() {
            let ratio = beam_area_ratio(hires.beam().copied(), lores.beam().copied())?;
            if ratio != 1.0 {
                debug!("Rescaling low-resolution plane by beam area ratio {:.6}", ratio);
                reconciled = reconciled.scaled(ratio);
            }
        }
    }

    ensure_equivalent(reconciled.unit(), target)?;
    Ok(reconciled)
}

/// Cube counterpart of [`reconcile_plane_units`], using per-channel beams
pub fn reconcile_cube_units(
    hires: &SpectralCube,
    lores: &SpectralCube,
    match_units: bool,
) -> Result<SpectralCube> {
    let target = hires.unit();
    let mut reconciled = lores.clone();

    if match_units {
        reconciled = reconciled.to_unit(target)?;
        if target.is_per_beam() {
            let ratios = (0..lores.nchan())
                .map(|c| beam_area_ratio(hires.channel_beam(c), lores.channel_beam(c)))
                .collect::<Result<Vec<f64>>>()?;
            if ratios.iter().any(|r| *r != 1.0) {
                debug!(
                    "Rescaling {} low-resolution channels by beam area ratio",
                    ratios.len()
                );
                reconciled = reconciled.scaled_per_channel(&ratios)?;
            }
        }
    }

    ensure_equivalent(reconciled.unit(), target)?;
    Ok(reconciled)
}

/// `Ω_hi / Ω_lo`
fn beam_area_ratio(hires: Option<Beam>, lores: Option<Beam>) -> Result<f64> {
    let hires = hires.ok_or_else(|| {
        FeatherError::MissingMetadata(
            "high-resolution data is in a per-beam unit but has no beam".to_string(),
        )
    })?;
    let lores = lores.ok_or_else(|| {
        FeatherError::MissingMetadata(
            "low-resolution data has no beam to rescale a per-beam unit".to_string(),
        )
    })?;

    let ratio = hires.solid_angle_sr() / lores.solid_angle_sr();
    if !ratio.is_finite() {
        return Err(FeatherError::Numerical(format!(
            "beam area ratio is not finite ({} sr / {} sr)",
            hires.solid_angle_sr(),
            lores.solid_angle_sr()
        )));
    }
    Ok(ratio)
}

fn ensure_equivalent(unit: FluxUnit, target: FluxUnit) -> Result<()> {
    if unit.is_equivalent(&target) {
        Ok(())
    } else {
        Err(FeatherError::IncompatibleUnits {
            from: unit.to_string(),
            to: target.to_string(),
        })
    }
}
