//! Block-wise cube feathering.
//!
//! Both cubes are split into the same spectral blocks, each holding complete
//! planes. Every block builds its own kernel and is combined independently on
//! the rayon pool, writing only its own slice of the output.

use log::{debug, warn};
use ndarray::{Axis, Zip};
use shared::algo::map_matching_blocks;
use shared::image_proc::{ChunkShape, SpectralCube};

use super::{CubeFeatherConfig, CubeStrategy};
use crate::error::{FeatherError, Result};
use crate::kernel::build_kernel;
use crate::plane::{feather_arrays, resolve_lowres_fwhm};
use crate::reconcile::reconcile_cube_units;

#[derive(Debug, Clone, Copy, Default)]
pub struct Blockwise;

impl CubeStrategy for Blockwise {
    fn name(&self) -> &'static str {
        "blockwise"
    }

    fn run(
        &self,
        hires: SpectralCube,
        lores: SpectralCube,
        config: &CubeFeatherConfig,
    ) -> Result<SpectralCube> {
        let (hires, lores) = align_grids(hires, lores, config)?;
        let (hires, lores, chunks) = align_chunks(hires, lores, config)?;
        let lores = reconcile_cube_units(&hires, &lores, config.plane.match_units)?;

        let spatial = hires.spatial_shape();
        config.plane.check_arrays(spatial)?;
        hires.check_operation_size()?;

        let pixel_scale = hires.wcs().pixel_scale();
        let inputs = config.plane.combine_inputs();
        let pb_response = config.plane.pb_response.as_ref();

        let data = map_matching_blocks(
            hires.data().view(),
            lores.data().view(),
            chunks.channels,
            |block, hi_block, lo_block, mut out_block| -> Result<()> {
                let first_channel = block * chunks.channels;
                let fwhm = resolve_lowres_fwhm(
                    config.plane.lowres_fwhm,
                    lores.channel_beam(first_channel).as_ref(),
                )?;
                let kernel = build_kernel(spatial.0, spatial.1, fwhm, pixel_scale)?;
                debug!(
                    "Block {} covers channels {}..{}",
                    block,
                    first_channel,
                    first_channel + hi_block.len_of(Axis(0))
                );

                for ((hi_plane, lo_plane), mut out_plane) in hi_block
                    .axis_iter(Axis(0))
                    .zip(lo_block.axis_iter(Axis(0)))
                    .zip(out_block.axis_iter_mut(Axis(0)))
                {
                    let lo_plane = match pb_response {
                        Some(pb) => &lo_plane * pb,
                        None => lo_plane.to_owned(),
                    };
                    let mut combined =
                        feather_arrays(&kernel, &hi_plane, &lo_plane.view(), &inputs)?;
                    if let Some(pb) = pb_response {
                        Zip::from(&mut combined)
                            .and(pb)
                            .for_each(|value, &response| *value /= response);
                    }
                    out_plane.assign(&combined);
                }
                Ok(())
            },
        )?;

        let mut cube = SpectralCube::new(data, hires.header().clone())?;
        cube.set_allow_huge_operations(hires.allow_huge_operations());
        Ok(cube.with_chunks(chunks))
    }
}

/// Reproject the low-resolution cube if allowed and needed, then require equal shapes
fn align_grids(
    hires: SpectralCube,
    lores: SpectralCube,
    config: &CubeFeatherConfig,
) -> Result<(SpectralCube, SpectralCube)> {
    let lores = if config.allow_lores_reproject && !hires.shares_grid_with(&lores) {
        warn!(
            "Reprojecting the whole low-resolution cube {:?} onto the high-resolution grid {:?}",
            lores.shape(),
            hires.shape()
        );
        lores.reproject(hires.wcs(), hires.spatial_shape())?
    } else {
        lores
    };

    if lores.shape() != hires.shape() {
        return Err(FeatherError::GridMismatch(format!(
            "low-resolution cube shape {:?} does not match high-resolution shape {:?}; \
             allow reprojection or reproject before feathering",
            lores.shape(),
            hires.shape()
        )));
    }
    Ok((hires, lores))
}

/// Rechunk when requested, then require identical full-plane chunks
fn align_chunks(
    hires: SpectralCube,
    lores: SpectralCube,
    config: &CubeFeatherConfig,
) -> Result<(SpectralCube, SpectralCube, ChunkShape)> {
    let (hires, lores) = if config.force_spatial_rechunk {
        (
            hires.rechunk(config.channels_per_chunk)?,
            lores.rechunk(config.channels_per_chunk)?,
        )
    } else {
        (hires, lores)
    };

    let (hi_chunks, lo_chunks) = match (hires.chunks(), lores.chunks()) {
        (Some(hi), Some(lo)) => (hi, lo),
        _ => {
            return Err(FeatherError::ChunkMismatch(
                "both cubes need a chunk layout for block-wise feathering".to_string(),
            ))
        }
    };

    if hi_chunks != lo_chunks {
        return Err(FeatherError::ChunkMismatch(format!(
            "high-resolution chunks {hi_chunks:?} differ from low-resolution chunks {lo_chunks:?}"
        )));
    }

    let spatial = hires.spatial_shape();
    if !hi_chunks.covers_plane(spatial) {
        return Err(FeatherError::ChunkMismatch(format!(
            "chunks {hi_chunks:?} do not span the full {spatial:?} plane; \
             enable spatial rechunking"
        )));
    }

    debug!("Block-wise feathering with chunks {:?}", hi_chunks);
    Ok((hires, lores, hi_chunks))
}
