//! Output storage for the sequential cube path.
//!
//! The disk variant writes planes through a memory map of a temporary file
//! rather than into a second in-memory cube while the loop runs.

use std::io;

use log::debug;
use memmap2::MmapMut;
use ndarray::{Array3, ArrayView2, ArrayView3, ArrayViewMut3, Axis};
use tempfile::NamedTempFile;

use crate::error::Result;

const F64_BYTES: usize = std::mem::size_of::<f64>();

/// Plane-by-plane output of a cube, in memory or on disk
#[derive(Debug)]
pub enum OutputBuffer {
    Memory(Array3<f64>),
    Disk(DiskBuffer),
}

impl OutputBuffer {
    pub fn new(shape: (usize, usize, usize), on_disk: bool) -> Result<Self> {
        let (channels, rows, cols) = shape;
        if on_disk && channels * rows * cols > 0 {
            Ok(OutputBuffer::Disk(DiskBuffer::new(shape)?))
        } else {
            Ok(OutputBuffer::Memory(Array3::zeros(shape)))
        }
    }

    /// Store one channel; mapped writes are flushed before returning
    pub fn write_plane(&mut self, channel: usize, plane: &ArrayView2<f64>) -> Result<()> {
        match self {
            OutputBuffer::Memory(data) => {
                check_fits(data.dim(), channel, plane)?;
                data.index_axis_mut(Axis(0), channel).assign(plane);
                Ok(())
            }
            OutputBuffer::Disk(disk) => disk.write_plane(channel, plane),
        }
    }

    pub fn into_array(self) -> Result<Array3<f64>> {
        match self {
            OutputBuffer::Memory(data) => Ok(data),
            OutputBuffer::Disk(disk) => disk.into_array(),
        }
    }
}

fn check_fits(
    shape: (usize, usize, usize),
    channel: usize,
    plane: &ArrayView2<f64>,
) -> io::Result<()> {
    let (channels, rows, cols) = shape;
    if channel >= channels || plane.dim() != (rows, cols) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!(
                "plane {:?} at channel {} does not fit buffer {:?}",
                plane.dim(),
                channel,
                shape
            ),
        ));
    }
    Ok(())
}

/// Memory-mapped temporary file holding a `(channels, rows, cols)` array of
/// native-endian f64
#[derive(Debug)]
pub struct DiskBuffer {
    file: NamedTempFile,
    map: MmapMut,
    shape: (usize, usize, usize),
}

impl DiskBuffer {
    pub fn new(shape: (usize, usize, usize)) -> Result<Self> {
        let file = NamedTempFile::new()?;
        let (channels, rows, cols) = shape;
        file.as_file()
            .set_len((channels * rows * cols * F64_BYTES) as u64)?;
        // The file is private to this buffer and never resized while mapped
        let map = unsafe { MmapMut::map_mut(file.as_file())? };
        debug!(
            "Disk buffer for {:?} cube mapped from {}",
            shape,
            file.path().display()
        );
        Ok(Self { file, map, shape })
    }

    fn plane_bytes(&self) -> usize {
        self.shape.1 * self.shape.2 * F64_BYTES
    }

    pub fn write_plane(&mut self, channel: usize, plane: &ArrayView2<f64>) -> Result<()> {
        check_fits(self.shape, channel, plane)?;
        {
            let values: &mut [f64] =
                bytemuck::try_cast_slice_mut(&mut self.map[..]).map_err(cast_error)?;
            let mut cube = ArrayViewMut3::from_shape(self.shape, values)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            cube.index_axis_mut(Axis(0), channel).assign(plane);
        }
        let plane_bytes = self.plane_bytes();
        self.map.flush_range(channel * plane_bytes, plane_bytes)?;
        Ok(())
    }

    /// Copy the mapped cube into memory; the temporary file is removed on drop
    pub fn into_array(self) -> Result<Array3<f64>> {
        debug!("Reading back disk buffer {}", self.file.path().display());
        let values: &[f64] = bytemuck::try_cast_slice(&self.map[..]).map_err(cast_error)?;
        let cube = ArrayView3::from_shape(self.shape, values)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        Ok(cube.to_owned())
    }
}

fn cast_error(err: bytemuck::PodCastError) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("mapped buffer is not an f64 array: {err:?}"),
    )
}
