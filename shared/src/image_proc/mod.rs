//! In-memory sky images and spectral cubes.
//!
//! These types carry the metadata that Fourier-domain combination depends on:
//! a celestial WCS, a brightness unit, the beam and the rest frequency.
//!
//! # Module Organization
//!
//! - **plane**: 2D images with their header
//! - **cube**: 3D spectral cubes, per-channel beams and the huge-operation guard
//! - **chunks**: chunk geometry for block-wise cube processing
//! - **reproject**: bilinear resampling between pixel grids
//! - **beam** / **wcs**: the metadata primitives

pub mod beam;
pub mod chunks;
pub mod cube;
pub mod plane;
pub mod reproject;
pub mod wcs;

use thiserror::Error;

use crate::algo::misc::InterpError;
use crate::units::UnitError;

pub use beam::Beam;
pub use chunks::{ChannelsPerChunk, ChunkShape};
pub use cube::{CubeBeams, CubeHeader, SpectralCube, HUGE_OPERATION_BYTES};
pub use plane::{ImageHeader, ImagePlane};
pub use reproject::{reproject_bilinear, sample_bilinear};
pub use wcs::CelestialWcs;

/// Errors raised by image and cube operations
#[derive(Error, Debug)]
pub enum ImageError {
    #[error("Array shape {actual:?} does not match expected shape {expected:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },
    #[error(transparent)]
    Unit(#[from] UnitError),
    #[error("Spectral axis has {axis} values but the cube has {channels} channels")]
    SpectralAxisLength { axis: usize, channels: usize },
    #[error("Cube has {channels} channels but {beams} per-channel beams")]
    BeamCount { beams: usize, channels: usize },
    #[error("Channel {index} is out of range for a cube with {channels} channels")]
    ChannelOutOfRange { index: usize, channels: usize },
    #[error(
        "Operation would materialise {bytes} bytes; set allow_huge_operations to proceed anyway"
    )]
    HugeOperation { bytes: usize },
    #[error("Invalid chunk specification: {0}")]
    InvalidChunks(String),
    #[error("Spectral interpolation failed: {0}")]
    Interp(#[from] InterpError),
}
