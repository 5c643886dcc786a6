//! Shared sky-image types and numerical utilities for the feathering tools.
//!
//! This crate holds everything that is not specific to Fourier-domain
//! combination: units and beams, images and cubes with their world
//! coordinates, reprojection, statistics and file I/O.

pub mod algo;
pub mod image_proc;
pub mod io;
pub mod units;
