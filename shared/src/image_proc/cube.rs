//! Spectral cubes: a stack of co-registered planes along a spectral axis.
//!
//! Data is stored as `(channel, row, col)`. A cube may carry a [`ChunkShape`]
//! that block-wise processing splits it along; the in-memory data itself is
//! always contiguous.

use log::debug;
use ndarray::{Array3, Axis};
use rayon::prelude::*;

use super::reproject::reproject_bilinear;
use super::{
    Beam, CelestialWcs, ChannelsPerChunk, ChunkShape, ImageError, ImageHeader, ImagePlane,
};
use crate::algo::misc::{fractional_index, InterpError};
use crate::units::{ConversionContext, FluxUnit};

/// Size above which cube-wide operations refuse to run unless explicitly allowed
pub const HUGE_OPERATION_BYTES: usize = 1 << 30;

/// Relative tolerance when deciding whether per-channel beams differ
const BEAM_REL_TOLERANCE: f64 = 1e-6;

/// Spectral axes match when `|a - b| <= ATOL + RTOL * |b|` channel by channel
const SPECTRAL_ATOL: f64 = 1e-8;
const SPECTRAL_RTOL: f64 = 1e-5;

#[derive(Debug, Clone, PartialEq)]
pub enum CubeBeams {
    None,
    Single(Beam),
    PerChannel(Vec<Beam>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CubeHeader {
    pub wcs: CelestialWcs,
    /// Spectral coordinate of each channel (frequency or velocity)
    pub spectral_axis: Vec<f64>,
    pub unit: FluxUnit,
    pub beams: CubeBeams,
    pub rest_frequency_hz: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct SpectralCube {
    header: CubeHeader,
    data: Array3<f64>,
    chunks: Option<ChunkShape>,
    allow_huge_operations: bool,
}

impl SpectralCube {
    pub fn new(data: Array3<f64>, header: CubeHeader) -> Result<Self, ImageError> {
        let nchan = data.len_of(Axis(0));
        if header.spectral_axis.len() != nchan {
            return Err(ImageError::SpectralAxisLength {
                axis: header.spectral_axis.len(),
                channels: nchan,
            });
        }
        if let CubeBeams::PerChannel(beams) = &header.beams {
            if beams.len() != nchan {
                return Err(ImageError::BeamCount {
                    beams: beams.len(),
                    channels: nchan,
                });
            }
        }
        Ok(Self {
            header,
            data,
            chunks: None,
            allow_huge_operations: false,
        })
    }

    pub fn header(&self) -> &CubeHeader {
        &self.header
    }

    pub fn data(&self) -> &Array3<f64> {
        &self.data
    }

    pub fn into_data(self) -> Array3<f64> {
        self.data
    }

    /// `(channels, rows, cols)`
    pub fn shape(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    pub fn spatial_shape(&self) -> (usize, usize) {
        let (_, rows, cols) = self.data.dim();
        (rows, cols)
    }

    pub fn nchan(&self) -> usize {
        self.data.len_of(Axis(0))
    }

    pub fn wcs(&self) -> &CelestialWcs {
        &self.header.wcs
    }

    pub fn unit(&self) -> FluxUnit {
        self.header.unit
    }

    pub fn spectral_axis(&self) -> &[f64] {
        &self.header.spectral_axis
    }

    /// The common beam, if the cube has one
    pub fn beam(&self) -> Option<&Beam> {
        match &self.header.beams {
            CubeBeams::None => None,
            CubeBeams::Single(beam) => Some(beam),
            CubeBeams::PerChannel(beams) if !self.has_varying_beams() => beams.first(),
            CubeBeams::PerChannel(_) => None,
        }
    }

    pub fn channel_beam(&self, channel: usize) -> Option<Beam> {
        match &self.header.beams {
            CubeBeams::None => None,
            CubeBeams::Single(beam) => Some(*beam),
            CubeBeams::PerChannel(beams) => beams.get(channel).copied(),
        }
    }

    /// True when the per-channel beams are not all the same
    pub fn has_varying_beams(&self) -> bool {
        match &self.header.beams {
            CubeBeams::PerChannel(beams) => match beams.first() {
                Some(first) => beams
                    .iter()
                    .any(|b| !b.approx_eq(first, BEAM_REL_TOLERANCE)),
                None => false,
            },
            _ => false,
        }
    }

    pub fn chunks(&self) -> Option<ChunkShape> {
        self.chunks
    }

    pub fn is_chunked(&self) -> bool {
        self.chunks.is_some()
    }

    /// Attach a chunk layout, clipped to the cube extent
    pub fn with_chunks(mut self, chunks: ChunkShape) -> Self {
        self.chunks = Some(chunks.clipped_to(self.shape()));
        self
    }

    /// Re-chunk so each block holds full planes
    pub fn rechunk(self, channels: ChannelsPerChunk) -> Result<Self, ImageError> {
        let count = channels.resolve(self.shape())?;
        let chunks = ChunkShape::full_spatial(count, self.spatial_shape())?;
        debug!(
            "Rechunking cube of shape {:?} to {:?}",
            self.shape(),
            chunks
        );
        Ok(self.with_chunks(chunks))
    }

    pub fn allow_huge_operations(&self) -> bool {
        self.allow_huge_operations
    }

    pub fn set_allow_huge_operations(&mut self, allow: bool) {
        self.allow_huge_operations = allow;
    }

    /// Refuse cube-wide operations above [`HUGE_OPERATION_BYTES`] unless allowed
    pub fn check_operation_size(&self) -> Result<(), ImageError> {
        let bytes = self.data.len() * std::mem::size_of::<f64>();
        if bytes > HUGE_OPERATION_BYTES && !self.allow_huge_operations {
            return Err(ImageError::HugeOperation { bytes });
        }
        Ok(())
    }

    /// Header describing one channel as a standalone plane
    pub fn plane_header(&self, channel: usize) -> ImageHeader {
        ImageHeader {
            shape: self.spatial_shape(),
            wcs: self.header.wcs.clone(),
            unit: self.header.unit,
            beam: self.channel_beam(channel),
            rest_frequency_hz: self.header.rest_frequency_hz,
        }
    }

    /// Copy out one channel
    pub fn plane(&self, channel: usize) -> Result<ImagePlane, ImageError> {
        if channel >= self.nchan() {
            return Err(ImageError::ChannelOutOfRange {
                index: channel,
                channels: self.nchan(),
            });
        }
        ImagePlane::new(
            self.data.index_axis(Axis(0), channel).to_owned(),
            self.plane_header(channel),
        )
    }

    /// Same pixel grid on the sky
    pub fn shares_grid_with(&self, other: &SpectralCube) -> bool {
        self.spatial_shape() == other.spatial_shape() && self.wcs().approx_eq(other.wcs())
    }

    /// Channel-by-channel closeness of the spectral axes
    pub fn spectral_axis_matches(&self, other: &SpectralCube) -> bool {
        let ours = self.spectral_axis();
        let theirs = other.spectral_axis();
        ours.len() == theirs.len()
            && ours
                .iter()
                .zip(theirs)
                .all(|(a, b)| (a - b).abs() <= SPECTRAL_ATOL + SPECTRAL_RTOL * b.abs())
    }

    fn channel_context(&self, channel: usize) -> ConversionContext {
        ConversionContext {
            beam_solid_angle_sr: self.channel_beam(channel).map(|b| b.solid_angle_sr()),
            frequency_hz: self.header.rest_frequency_hz,
        }
    }

    fn derived(&self, header: CubeHeader, data: Array3<f64>) -> Self {
        Self {
            header,
            data,
            chunks: self.chunks.map(|c| c.clipped_to(self.shape())),
            allow_huge_operations: self.allow_huge_operations,
        }
    }

    /// Convert to another brightness unit, channel by channel when beams vary
    pub fn to_unit(&self, unit: FluxUnit) -> Result<Self, ImageError> {
        let factors = (0..self.nchan())
            .map(|c| {
                self.header
                    .unit
                    .conversion_factor(&unit, &self.channel_context(c))
            })
            .collect::<Result<Vec<f64>, _>>()?;

        if factors.iter().all(|f| *f == 1.0) {
            let mut header = self.header.clone();
            header.unit = unit;
            return Ok(self.derived(header, self.data.clone()));
        }

        let mut converted = self.scaled_per_channel(&factors)?;
        converted.header.unit = unit;
        Ok(converted)
    }

    pub fn scaled(&self, factor: f64) -> Self {
        self.derived(self.header.clone(), &self.data * factor)
    }

    /// Multiply each channel by its own factor
    pub fn scaled_per_channel(&self, factors: &[f64]) -> Result<Self, ImageError> {
        if factors.len() != self.nchan() {
            return Err(ImageError::ShapeMismatch {
                expected: vec![self.nchan()],
                actual: vec![factors.len()],
            });
        }
        self.check_operation_size()?;

        let mut data = self.data.clone();
        data.axis_iter_mut(Axis(0))
            .into_par_iter()
            .zip(factors.par_iter())
            .for_each(|(mut plane, factor)| plane.mapv_inplace(|v| v * factor));
        Ok(self.derived(self.header.clone(), data))
    }

    /// Linearly interpolate onto `target_axis`.
    ///
    /// Target channels outside the source axis range are NaN. Each output
    /// channel takes the beam of the nearest source channel.
    pub fn spectral_interpolate(&self, target_axis: &[f64]) -> Result<Self, ImageError> {
        self.check_operation_size()?;

        let source = self.spectral_axis();
        let nchan = source.len();

        // Fractional source index for each target channel, None when out of range
        let mut fractional = Vec::with_capacity(target_axis.len());
        for &x in target_axis {
            let position = if nchan == 1 {
                let tol = SPECTRAL_ATOL + SPECTRAL_RTOL * x.abs();
                ((source[0] - x).abs() <= tol).then_some(0.0)
            } else {
                match fractional_index(x, source) {
                    Ok(p) => Some(p),
                    Err(InterpError::OutOfBounds(..)) => None,
                    Err(e) => return Err(e.into()),
                }
            };
            fractional.push(position);
        }

        let (_, rows, cols) = self.shape();
        let mut data = Array3::from_elem((target_axis.len(), rows, cols), f64::NAN);
        data.axis_iter_mut(Axis(0))
            .into_par_iter()
            .zip(fractional.par_iter())
            .for_each(|(mut out, position)| {
                if let Some(p) = position {
                    let lower = p.floor() as usize;
                    let upper = (lower + 1).min(nchan - 1);
                    let w = p - lower as f64;
                    let a = self.data.index_axis(Axis(0), lower);
                    if w == 0.0 {
                        out.assign(&a);
                    } else {
                        let b = self.data.index_axis(Axis(0), upper);
                        out.assign(&(&a * (1.0 - w) + &b * w));
                    }
                }
            });

        let beams = match &self.header.beams {
            CubeBeams::PerChannel(beams) => CubeBeams::PerChannel(
                fractional
                    .iter()
                    .map(|p| beams[p.map(|v| v.round() as usize).unwrap_or(0).min(nchan - 1)])
                    .collect(),
            ),
            other => other.clone(),
        };

        debug!(
            "Spectrally interpolated {} channels onto {} channels",
            nchan,
            target_axis.len()
        );

        let header = CubeHeader {
            spectral_axis: target_axis.to_vec(),
            beams,
            ..self.header.clone()
        };
        let mut cube = Self::new(data, header)?;
        cube.chunks = self.chunks.map(|c| c.clipped_to(cube.shape()));
        cube.allow_huge_operations = self.allow_huge_operations;
        Ok(cube)
    }

    /// Spatially resample every channel onto `wcs` with `spatial_shape`
    pub fn reproject(
        &self,
        wcs: &CelestialWcs,
        spatial_shape: (usize, usize),
    ) -> Result<Self, ImageError> {
        self.check_operation_size()?;

        let (nchan, _, _) = self.shape();
        let mut data = Array3::zeros((nchan, spatial_shape.0, spatial_shape.1));
        data.axis_iter_mut(Axis(0))
            .into_par_iter()
            .zip(self.data.axis_iter(Axis(0)).into_par_iter())
            .for_each(|(mut out, src)| {
                out.assign(&reproject_bilinear(
                    &src,
                    &self.header.wcs,
                    wcs,
                    spatial_shape,
                ));
            });

        let header = CubeHeader {
            wcs: wcs.clone(),
            ..self.header.clone()
        };
        let mut cube = Self::new(data, header)?;
        cube.chunks = self.chunks.map(|c| {
            ChunkShape {
                rows: spatial_shape.0,
                cols: spatial_shape.1,
                ..c
            }
            .clipped_to(cube.shape())
        });
        cube.allow_huge_operations = self.allow_huge_operations;
        Ok(cube)
    }
}
