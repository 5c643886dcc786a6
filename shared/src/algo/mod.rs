//! Numerical building blocks shared by the image and cube code
//!
//! Interpolation, NaN-aware statistics and parallel block processing.

pub mod misc;
pub mod parallel;
pub mod stats;

pub use misc::{fractional_index, interp, InterpError};
pub use parallel::map_matching_blocks;
pub use stats::{nan_mean, nan_median, nan_std, sigma_clipped_stats, ClippedStats};
