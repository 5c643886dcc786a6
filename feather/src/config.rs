//! JSON settings for the command line tool.
//!
//! Every field is optional in the file; missing fields take the library
//! defaults. Angles are given in arcseconds.

use std::path::Path;

use serde::{Deserialize, Serialize};
use shared::image_proc::ChannelsPerChunk;
use shared::units::{Angle, AngleExt};

use crate::cube::CubeFeatherConfig;
use crate::error::Result;
use crate::merge::{MergePolicy, ReplaceHires, DEFAULT_MIN_BEAM_FRACTION};
use crate::plane::PlaneFeatherConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatherSettings {
    /// Low-resolution beam FWHM; the image beam is used when absent
    pub lowres_fwhm_arcsec: Option<f64>,
    pub highres_scale_factor: f64,
    pub lowres_scale_factor: f64,
    /// Multiply the low-resolution spectrum by the beam kernel
    pub lowpass_filter_sd: bool,
    /// Divide the low-resolution spectrum by the beam kernel
    pub deconvolve_sd: bool,
    pub min_beam_fraction: f64,
    /// `false`, or the `ikfft` threshold above which high-resolution bins win
    pub replace_hires: ReplaceHires,
    pub match_units: bool,
    pub allow_spectral_resample: bool,
    pub allow_huge_operations: bool,
    pub use_disk_buffer: bool,
    pub use_blockwise: bool,
    pub force_spatial_rechunk: bool,
    pub channels_per_chunk: ChannelsPerChunk,
    pub allow_lores_reproject: bool,
}

impl Default for FeatherSettings {
    fn default() -> Self {
        let cube = CubeFeatherConfig::default();
        Self {
            lowres_fwhm_arcsec: None,
            highres_scale_factor: 1.0,
            lowres_scale_factor: 1.0,
            lowpass_filter_sd: false,
            deconvolve_sd: false,
            min_beam_fraction: DEFAULT_MIN_BEAM_FRACTION,
            replace_hires: ReplaceHires::default(),
            match_units: true,
            allow_spectral_resample: cube.allow_spectral_resample,
            allow_huge_operations: cube.allow_huge_operations,
            use_disk_buffer: cube.use_disk_buffer,
            use_blockwise: cube.use_blockwise,
            force_spatial_rechunk: cube.force_spatial_rechunk,
            channels_per_chunk: cube.channels_per_chunk,
            allow_lores_reproject: cube.allow_lores_reproject,
        }
    }
}

impl FeatherSettings {
    /// Save as pretty-printed JSON
    pub fn save_to_file(&self, path: &Path) -> std::result::Result<(), std::io::Error> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, json)
    }

    /// Load from a JSON file
    pub fn load_from_file(path: &Path) -> std::result::Result<Self, std::io::Error> {
        let json = std::fs::read_to_string(path)?;
        serde_json::from_str(&json)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    pub fn lowres_fwhm(&self) -> Option<Angle> {
        self.lowres_fwhm_arcsec.map(Angle::from_arcseconds)
    }

    pub fn merge_policy(&self) -> Result<MergePolicy> {
        MergePolicy::from_flags(
            self.lowpass_filter_sd,
            self.deconvolve_sd,
            self.min_beam_fraction,
            self.replace_hires,
        )
    }

    pub fn plane_config(&self) -> Result<PlaneFeatherConfig> {
        Ok(PlaneFeatherConfig {
            highres_scale_factor: self.highres_scale_factor,
            lowres_scale_factor: self.lowres_scale_factor,
            lowres_fwhm: self.lowres_fwhm(),
            policy: self.merge_policy()?,
            match_units: self.match_units,
            ..Default::default()
        })
    }

    pub fn cube_config(&self) -> Result<CubeFeatherConfig> {
        Ok(CubeFeatherConfig {
            plane: self.plane_config()?,
            allow_spectral_resample: self.allow_spectral_resample,
            allow_huge_operations: self.allow_huge_operations,
            use_disk_buffer: self.use_disk_buffer,
            use_blockwise: self.use_blockwise,
            force_spatial_rechunk: self.force_spatial_rechunk,
            channels_per_chunk: self.channels_per_chunk,
            allow_lores_reproject: self.allow_lores_reproject,
            cancel: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FeatherError;
    use crate::merge::{Combination, LowResTreatment};
    use approx::assert_relative_eq;
    use tempfile::NamedTempFile;

    #[test]
    fn test_save_and_load() {
        let settings = FeatherSettings {
            lowres_fwhm_arcsec: Some(30.0),
            deconvolve_sd: true,
            replace_hires: ReplaceHires::Threshold(0.4),
            channels_per_chunk: ChannelsPerChunk::Count(8),
            ..Default::default()
        };
        let file = NamedTempFile::new().unwrap();
        settings.save_to_file(file.path()).unwrap();
        let loaded = FeatherSettings::load_from_file(file.path()).unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let settings: FeatherSettings =
            serde_json::from_str(r#"{ "lowpass_filter_sd": true, "replace_hires": 0.5 }"#).unwrap();
        let policy = settings.merge_policy().unwrap();
        assert_eq!(policy.low_res, LowResTreatment::LowPass);
        assert_eq!(policy.combine, Combination::ReplaceAbove { threshold: 0.5 });
        assert!(settings.match_units);
        assert_eq!(settings.channels_per_chunk, ChannelsPerChunk::Auto);
    }

    #[test]
    fn test_replace_true_is_rejected() {
        let settings: FeatherSettings =
            serde_json::from_str(r#"{ "replace_hires": true }"#).unwrap();
        assert!(matches!(
            settings.plane_config(),
            Err(FeatherError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_malformed_file_is_invalid_data() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "{ not json").unwrap();
        let err = FeatherSettings::load_from_file(file.path()).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_cube_config_carries_plane_options() {
        let settings = FeatherSettings {
            lowres_fwhm_arcsec: Some(12.0),
            use_blockwise: true,
            ..Default::default()
        };
        let config = settings.cube_config().unwrap();
        assert!(config.use_blockwise);
        assert_relative_eq!(
            config.plane.lowres_fwhm.unwrap().as_arcseconds(),
            12.0,
            epsilon = 1e-9
        );
    }
}
