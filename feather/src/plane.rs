//! Single-plane feathering.
//!
//! [`feather_plane`] takes the two inputs from wherever they live, brings the
//! low-resolution image into the high-resolution unit and onto its pixel
//! grid, applies the optional primary-beam response and taper weights, and
//! merges the two in the Fourier domain.

use std::path::PathBuf;

use log::{debug, info};
use ndarray::{Array2, ArrayView2, Zip};
use shared::image_proc::{Beam, ImageHeader, ImagePlane};
use shared::units::{Angle, AngleExt};

use crate::error::{FeatherError, Result};
use crate::kernel::{build_kernel, FeatherKernel};
use crate::merge::{merge, MergePolicy};
use crate::reconcile::reconcile_plane_units;

/// Where a plane comes from
#[derive(Debug, Clone)]
pub enum PlaneSource {
    /// Image file; `extension` is the zero-based HDU index
    FilePath { path: PathBuf, extension: usize },
    /// Bare array described by a separate header
    HeaderAndArray {
        header: ImageHeader,
        data: Array2<f64>,
    },
    Loaded(ImagePlane),
}

impl PlaneSource {
    /// Primary HDU of a file
    pub fn path(path: impl Into<PathBuf>) -> Self {
        PlaneSource::FilePath {
            path: path.into(),
            extension: 0,
        }
    }

    /// Load or validate into one canonical plane
    pub fn resolve(self) -> Result<ImagePlane> {
        match self {
            PlaneSource::FilePath { path, extension } => load_plane(path, extension),
            PlaneSource::HeaderAndArray { header, data } => Ok(ImagePlane::new(data, header)?),
            PlaneSource::Loaded(plane) => Ok(plane),
        }
    }
}

impl From<ImagePlane> for PlaneSource {
    fn from(plane: ImagePlane) -> Self {
        PlaneSource::Loaded(plane)
    }
}

#[cfg(feature = "fits")]
fn load_plane(path: PathBuf, extension: usize) -> Result<ImagePlane> {
    debug!("Loading plane from {} [{}]", path.display(), extension);
    Ok(shared::io::fits::read_image_plane(&path, extension)?)
}

#[cfg(not(feature = "fits"))]
fn load_plane(path: PathBuf, _extension: usize) -> Result<ImagePlane> {
    Err(FeatherError::UnsupportedInput(format!(
        "cannot read {}: built without the `fits` feature",
        path.display()
    )))
}

/// Options for [`feather_plane`]
#[derive(Debug, Clone)]
pub struct PlaneFeatherConfig {
    pub highres_scale_factor: f64,
    pub lowres_scale_factor: f64,
    /// Low-resolution beam width; taken from the low-resolution beam when unset
    pub lowres_fwhm: Option<Angle>,
    /// Taper applied to both inputs before transforming
    pub weights: Option<Array2<f64>>,
    /// Primary-beam response of the high-resolution data
    pub pb_response: Option<Array2<f64>>,
    pub policy: MergePolicy,
    pub match_units: bool,
    pub return_regridded_lores: bool,
}

impl Default for PlaneFeatherConfig {
    fn default() -> Self {
        Self {
            highres_scale_factor: 1.0,
            lowres_scale_factor: 1.0,
            lowres_fwhm: None,
            weights: None,
            pb_response: None,
            policy: MergePolicy::default(),
            match_units: true,
            return_regridded_lores: false,
        }
    }
}

impl PlaneFeatherConfig {
    /// Check weights and primary-beam response against the image shape
    pub(crate) fn check_arrays(&self, shape: (usize, usize)) -> Result<()> {
        for (what, array) in [
            ("weights", &self.weights),
            ("primary beam response", &self.pb_response),
        ] {
            if let Some(array) = array {
                if array.dim() != shape {
                    return Err(FeatherError::shape_mismatch(
                        what,
                        &[shape.0, shape.1],
                        array.shape(),
                    ));
                }
            }
        }
        Ok(())
    }

    pub(crate) fn combine_inputs(&self) -> CombineInputs<'_> {
        CombineInputs {
            highres_scale_factor: self.highres_scale_factor,
            lowres_scale_factor: self.lowres_scale_factor,
            weights: self.weights.as_ref().map(|w| w.view()),
            policy: &self.policy,
        }
    }
}

/// Output of [`feather_plane`]
#[derive(Debug, Clone)]
pub struct FeatheredPlane {
    /// Real part of the combination, carrying the high-resolution header
    pub image: ImagePlane,
    /// Low-resolution plane as it entered the merge, when requested
    pub regridded_lores: Option<ImagePlane>,
}

impl FeatheredPlane {
    pub fn into_array(self) -> Array2<f64> {
        self.image.into_data()
    }
}

/// Per-merge scaling shared by the plane and block-wise paths
pub(crate) struct CombineInputs<'a> {
    pub highres_scale_factor: f64,
    pub lowres_scale_factor: f64,
    pub weights: Option<ArrayView2<'a, f64>>,
    pub policy: &'a MergePolicy,
}

/// FWHM from the caller or, failing that, from the low-resolution beam
pub(crate) fn resolve_lowres_fwhm(configured: Option<Angle>, beam: Option<&Beam>) -> Result<Angle> {
    configured.or_else(|| beam.map(|b| b.major)).ok_or_else(|| {
        FeatherError::MissingMetadata(
            "no low-resolution FWHM given and the low-resolution image has no beam".to_string(),
        )
    })
}

/// Scale, taper and merge two co-registered arrays, returning the real part
pub(crate) fn feather_arrays(
    kernel: &FeatherKernel,
    hires: &ArrayView2<f64>,
    lores: &ArrayView2<f64>,
    inputs: &CombineInputs<'_>,
) -> Result<Array2<f64>> {
    let prepare = |image: &ArrayView2<f64>, scale: f64| match &inputs.weights {
        Some(weights) => Zip::from(image)
            .and(weights)
            .map_collect(|&v, &w| v * scale * w),
        None => image.mapv(|v| v * scale),
    };

    let hi = prepare(hires, inputs.highres_scale_factor);
    let lo = prepare(lores, inputs.lowres_scale_factor);
    let output = merge(kernel, &hi.view(), &lo.view(), inputs.policy)?;
    Ok(output.real_image())
}

/// Combine one high-resolution and one low-resolution plane.
///
/// # Errors
/// * [`FeatherError::MissingMetadata`] when no FWHM is available
/// * [`FeatherError::ShapeMismatch`] when weights or the primary-beam
///   response do not match the high-resolution shape
/// * [`FeatherError::IncompatibleUnits`] when the brightness units cannot be
///   reconciled
pub fn feather_plane(
    hires: impl Into<PlaneSource>,
    lores: impl Into<PlaneSource>,
    config: &PlaneFeatherConfig,
) -> Result<FeatheredPlane> {
    let hires = hires.into().resolve()?;
    let lores = lores.into().resolve()?;

    let lowres_fwhm = resolve_lowres_fwhm(config.lowres_fwhm, lores.beam())?;
    config.check_arrays(hires.shape())?;

    let lores = reconcile_plane_units(&hires, &lores, config.match_units)?;

    let mut lores = if lores.header().shares_grid_with(hires.header()) {
        lores
    } else {
        info!(
            "Reprojecting low-resolution plane {:?} onto high-resolution grid {:?}",
            lores.shape(),
            hires.shape()
        );
        lores.reproject(hires.header())
    };

    if let Some(pb) = &config.pb_response {
        lores = lores.with_data(lores.data() * pb)?;
    }

    let (rows, cols) = hires.shape();
    let pixel_scale = hires.wcs().pixel_scale();
    debug!(
        "Feathering {}x{} plane, low-resolution FWHM {:.3}\"",
        rows,
        cols,
        lowres_fwhm.as_arcseconds()
    );
    let kernel = build_kernel(rows, cols, lowres_fwhm, pixel_scale)?;

    let mut combined = feather_arrays(
        &kernel,
        &hires.data().view(),
        &lores.data().view(),
        &config.combine_inputs(),
    )?;

    if let Some(pb) = &config.pb_response {
        Zip::from(&mut combined)
            .and(pb)
            .for_each(|value, &response| *value /= response);
    }

    let image = ImagePlane::new(combined, hires.header().clone())?;
    let regridded_lores = config.return_regridded_lores.then_some(lores);
    Ok(FeatheredPlane {
        image,
        regridded_lores,
    })
}
