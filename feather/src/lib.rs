//! Fourier-domain feathering of interferometric and single-dish images.
//!
//! A high-resolution image keeps its fine structure while large scales come
//! from a low-resolution image. Both spectra are weighted by a kernel derived
//! from the low-resolution beam (`kfft` for the single dish, `1 - kfft` for
//! the interferometer), summed and transformed back.
//!
//! # Module Organization
//!
//! - **kernel**: the complementary weighting arrays
//! - **merge**: spectral combination and its policies
//! - **plane**: the full single-plane pipeline
//! - **cube**: sequential and block-wise cube combination
//! - **compare**: agreement of the two inputs over an angular-scale band
//! - **filters**: stand-alone deconvolution and unsharp masking
//! - **config**: JSON settings for the `feather` binary

pub mod compare;
pub mod config;
pub mod cube;
pub mod error;
pub mod fft;
pub mod filters;
pub mod kernel;
pub mod merge;
pub mod plane;
pub mod reconcile;

// Re-export commonly used types for external use
pub use crate::compare::{compare, image_domain_ratio, CompareConfig, Comparison, RatioSummary};
pub use crate::config::FeatherSettings;
pub use crate::cube::{feather_cube, CubeFeatherConfig, CubeSource, CubeStrategy};
pub use crate::error::{FeatherError, Result};
pub use crate::filters::{deconvolve_single_dish, fourier_unsharp_mask};
pub use crate::kernel::{build_kernel, FeatherKernel};
pub use crate::merge::{merge, Combination, LowResTreatment, MergeOutput, MergePolicy};
pub use crate::plane::{feather_plane, FeatheredPlane, PlaneFeatherConfig, PlaneSource};
