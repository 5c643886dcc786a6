//! Chunk geometry for block-wise cube processing.
//!
//! A chunked cube is split along the spectral axis only when its spatial chunk
//! covers the whole plane; Fourier combination needs every pixel of a plane
//! in one block.

use serde::{Deserialize, Serialize};

use super::ImageError;

/// Target block size when the channel count per chunk is chosen automatically
pub const AUTO_CHUNK_BYTES: usize = 128 * 1024 * 1024;

/// How many spectral channels go in each block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelsPerChunk {
    /// Fill roughly [`AUTO_CHUNK_BYTES`] per block
    #[default]
    Auto,
    /// One block holding every channel
    All,
    /// Fixed channel count
    Count(usize),
}

impl ChannelsPerChunk {
    /// Concrete channel count for a cube of shape `(channels, rows, cols)`
    pub fn resolve(&self, shape: (usize, usize, usize)) -> Result<usize, ImageError> {
        let (nchan, rows, cols) = shape;
        let count = match *self {
            ChannelsPerChunk::All => nchan,
            ChannelsPerChunk::Count(0) => {
                return Err(ImageError::InvalidChunks(
                    "channels per chunk must be positive".to_string(),
                ))
            }
            ChannelsPerChunk::Count(n) => n.min(nchan),
            ChannelsPerChunk::Auto => {
                let plane_bytes = (rows * cols * std::mem::size_of::<f64>()).max(1);
                (AUTO_CHUNK_BYTES / plane_bytes).clamp(1, nchan.max(1))
            }
        };
        Ok(count.max(1))
    }
}

/// Block extent along (channels, rows, cols)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkShape {
    pub channels: usize,
    pub rows: usize,
    pub cols: usize,
}

impl ChunkShape {
    pub fn new(channels: usize, rows: usize, cols: usize) -> Result<Self, ImageError> {
        if channels == 0 || rows == 0 || cols == 0 {
            return Err(ImageError::InvalidChunks(format!(
                "chunk extents must be positive, got ({channels}, {rows}, {cols})"
            )));
        }
        Ok(Self {
            channels,
            rows,
            cols,
        })
    }

    /// Chunk spanning the full plane with `channels` planes per block
    pub fn full_spatial(channels: usize, spatial: (usize, usize)) -> Result<Self, ImageError> {
        Self::new(channels, spatial.0, spatial.1)
    }

    /// Clip each extent to the array it is applied to
    pub fn clipped_to(&self, shape: (usize, usize, usize)) -> Self {
        Self {
            channels: self.channels.min(shape.0.max(1)),
            rows: self.rows.min(shape.1.max(1)),
            cols: self.cols.min(shape.2.max(1)),
        }
    }

    /// True when every block holds complete planes
    pub fn covers_plane(&self, spatial: (usize, usize)) -> bool {
        self.rows == spatial.0 && self.cols == spatial.1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_counts() {
        assert_eq!(ChannelsPerChunk::All.resolve((7, 8, 8)).unwrap(), 7);
        assert_eq!(ChannelsPerChunk::Count(3).resolve((7, 8, 8)).unwrap(), 3);
        assert_eq!(ChannelsPerChunk::Count(30).resolve((7, 8, 8)).unwrap(), 7);
        assert!(ChannelsPerChunk::Count(0).resolve((7, 8, 8)).is_err());
    }

    #[test]
    fn test_auto_respects_block_budget() {
        // 4096 x 4096 doubles is exactly 128 MiB
        assert_eq!(ChannelsPerChunk::Auto.resolve((10, 4096, 4096)).unwrap(), 1);
        assert_eq!(ChannelsPerChunk::Auto.resolve((10, 64, 64)).unwrap(), 10);
    }

    #[test]
    fn test_covers_plane() {
        let chunk = ChunkShape::new(3, 4, 4).unwrap();
        assert!(chunk.covers_plane((4, 4)));
        assert!(!chunk.covers_plane((8, 4)));
    }

    #[test]
    fn test_zero_extent_rejected() {
        assert!(matches!(
            ChunkShape::new(1, 0, 4),
            Err(ImageError::InvalidChunks(_))
        ));
    }

    #[test]
    fn test_serde_forms() {
        let parsed: ChannelsPerChunk = serde_json::from_str("\"auto\"").unwrap();
        assert_eq!(parsed, ChannelsPerChunk::Auto);
        let parsed: ChannelsPerChunk = serde_json::from_str("{\"count\":4}").unwrap();
        assert_eq!(parsed, ChannelsPerChunk::Count(4));
    }
}
