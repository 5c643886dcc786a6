//! Fourier-domain combination of a high- and a low-resolution image.
//!
//! The low-resolution spectrum is first pre-processed (passed through,
//! low-pass filtered by `kfft`, or deconvolved by `kfft`), then combined with
//! the high-resolution spectrum either as a weighted sum or by replacing bins
//! above a kernel threshold. Every step returns a new array; inputs and the
//! kernel are never modified.

use log::debug;
use ndarray::{Array2, ArrayView2, Zip};
use rustfft::num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::error::{FeatherError, Result};
use crate::fft::{fft2, ifft2, nan_to_zero};
use crate::kernel::FeatherKernel;

/// Default kernel floor below which deconvolved bins are discarded
pub const DEFAULT_MIN_BEAM_FRACTION: f64 = 0.1;

/// How the low-resolution spectrum is treated before combination
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum LowResTreatment {
    /// Use the spectrum as is
    #[default]
    PassThrough,
    /// Multiply by `kfft`, re-applying the beam to already deconvolved data
    LowPass,
    /// Divide by `kfft` and zero every bin where `kfft < min_beam_fraction`
    Deconvolve { min_beam_fraction: f64 },
}

impl LowResTreatment {
    /// Deconvolution with the default floor
    pub fn deconvolve() -> Self {
        LowResTreatment::Deconvolve {
            min_beam_fraction: DEFAULT_MIN_BEAM_FRACTION,
        }
    }
}

/// How the two spectra are summed
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Combination {
    /// `lo + ikfft * hi`
    #[default]
    WeightedSum,
    /// `lo`, overwritten by `hi` wherever `ikfft > threshold`
    ReplaceAbove { threshold: f64 },
}

/// Raw "replace high-resolution" option as it appears in settings files.
///
/// `false` disables replacement and a number is the threshold. `true` is
/// rejected: it names no threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReplaceHires {
    Flag(bool),
    Threshold(f64),
}

impl Default for ReplaceHires {
    fn default() -> Self {
        ReplaceHires::Flag(false)
    }
}

impl ReplaceHires {
    pub fn into_combination(self) -> Result<Combination> {
        match self {
            ReplaceHires::Flag(false) => Ok(Combination::WeightedSum),
            ReplaceHires::Flag(true) => Err(FeatherError::InvalidParameter(
                "replace_hires must be a numeric kernel threshold, not `true`".to_string(),
            )),
            ReplaceHires::Threshold(threshold) => Ok(Combination::ReplaceAbove { threshold }),
        }
    }
}

/// Complete merge configuration
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MergePolicy {
    #[serde(default)]
    pub low_res: LowResTreatment,
    #[serde(default)]
    pub combine: Combination,
}

impl MergePolicy {
    pub fn new(low_res: LowResTreatment, combine: Combination) -> Self {
        Self { low_res, combine }
    }

    /// Build a policy from independent switches.
    ///
    /// Low-pass filtering wins over deconvolution when both are requested.
    pub fn from_flags(
        lowpass: bool,
        deconvolve: bool,
        min_beam_fraction: f64,
        replace_hires: ReplaceHires,
    ) -> Result<Self> {
        let low_res = if lowpass {
            LowResTreatment::LowPass
        } else if deconvolve {
            LowResTreatment::Deconvolve { min_beam_fraction }
        } else {
            LowResTreatment::PassThrough
        };
        let policy = Self::new(low_res, replace_hires.into_combination()?);
        policy.validate()?;
        Ok(policy)
    }

    pub fn validate(&self) -> Result<()> {
        if let LowResTreatment::Deconvolve { min_beam_fraction } = self.low_res {
            if !(min_beam_fraction.is_finite() && min_beam_fraction >= 0.0) {
                return Err(FeatherError::InvalidParameter(format!(
                    "min_beam_fraction must be a finite non-negative number, got {min_beam_fraction}"
                )));
            }
        }
        if let Combination::ReplaceAbove { threshold } = self.combine {
            if !threshold.is_finite() {
                return Err(FeatherError::InvalidParameter(format!(
                    "replacement threshold must be finite, got {threshold}"
                )));
            }
        }
        Ok(())
    }
}

/// Result of [`merge`]
#[derive(Debug, Clone)]
pub struct MergeOutput {
    /// Combined spectrum in unshifted FFT order
    pub fft_sum: Array2<Complex64>,
    /// Inverse transform of `fft_sum`
    pub combined: Array2<Complex64>,
}

impl MergeOutput {
    /// Real part of the combined image
    pub fn real_image(&self) -> Array2<f64> {
        self.combined.mapv(|c| c.re)
    }
}

/// Combine two equally shaped images under `policy`.
///
/// Non-finite pixels in either image are treated as zero.
pub fn merge(
    kernel: &FeatherKernel,
    image_hi: &ArrayView2<f64>,
    image_lo: &ArrayView2<f64>,
    policy: &MergePolicy,
) -> Result<MergeOutput> {
    policy.validate()?;
    let (rows, cols) = kernel.shape();
    for (what, image) in [("high-resolution image", image_hi.view()), ("low-resolution image", image_lo.view())] {
        if image.dim() != (rows, cols) {
            return Err(FeatherError::shape_mismatch(
                what,
                &[rows, cols],
                image.shape(),
            ));
        }
    }

    let fft_hi = fft2(&nan_to_zero(image_hi).view());
    let fft_lo = fft2(&nan_to_zero(image_lo).view());

    let lo_processed = preprocess_low_res(&fft_lo.view(), kernel, &policy.low_res);
    let fft_sum = combine_spectra(&fft_hi.view(), &lo_processed.view(), kernel, &policy.combine);
    let combined = ifft2(&fft_sum.view());

    debug!("Merged {}x{} spectra with {:?}", rows, cols, policy);
    Ok(MergeOutput { fft_sum, combined })
}

/// Low-resolution spectrum after the selected treatment
pub fn preprocess_low_res(
    fft_lo: &ArrayView2<Complex64>,
    kernel: &FeatherKernel,
    treatment: &LowResTreatment,
) -> Array2<Complex64> {
    match *treatment {
        LowResTreatment::PassThrough => fft_lo.to_owned(),
        LowResTreatment::LowPass => Zip::from(fft_lo)
            .and(&kernel.kfft())
            .map_collect(|f, &k| *f * k),
        LowResTreatment::Deconvolve { min_beam_fraction } => Zip::from(fft_lo)
            .and(&kernel.kfft())
            .map_collect(|f, &k| {
                if k < min_beam_fraction {
                    Complex64::new(0.0, 0.0)
                } else {
                    *f / k
                }
            }),
    }
}

/// Sum the high-resolution and pre-processed low-resolution spectra
pub fn combine_spectra(
    fft_hi: &ArrayView2<Complex64>,
    lo_processed: &ArrayView2<Complex64>,
    kernel: &FeatherKernel,
    combination: &Combination,
) -> Array2<Complex64> {
    match *combination {
        Combination::WeightedSum => Zip::from(lo_processed)
            .and(fft_hi)
            .and(&kernel.ikfft())
            .map_collect(|lo, hi, &ik| *lo + *hi * ik),
        Combination::ReplaceAbove { threshold } => Zip::from(lo_processed)
            .and(fft_hi)
            .and(&kernel.ikfft())
            .map_collect(|lo, hi, &ik| if ik > threshold { *hi } else { *lo }),
    }
}
