//! Parallel block processing for spectral cubes
//!
//! Cubes are split along their leading (spectral) axis. Each block is handed
//! to the processor together with the matching block of a second cube and the
//! output block it must fill, so blocks never share memory.

use ndarray::{Array3, ArrayView3, ArrayViewMut3, Axis};
use rayon::prelude::*;

/// Process two equally shaped cubes block by block in parallel
///
/// # Arguments
/// * `first` - Cube split into blocks along axis 0
/// * `second` - Cube with the same shape, split the same way
/// * `channels_per_block` - Number of channels per block (the last block may be shorter)
/// * `processor` - Closure receiving the block index, both input blocks and the
///   output block to fill
///
/// # Returns
/// The assembled output cube, or the first error returned by any block
pub fn map_matching_blocks<F, E>(
    first: ArrayView3<f64>,
    second: ArrayView3<f64>,
    channels_per_block: usize,
    processor: F,
) -> Result<Array3<f64>, E>
where
    F: Fn(usize, ArrayView3<f64>, ArrayView3<f64>, ArrayViewMut3<f64>) -> Result<(), E>
        + Send
        + Sync,
    E: Send,
{
    debug_assert_eq!(first.dim(), second.dim());
    let channels_per_block = channels_per_block.max(1);
    let mut output = Array3::zeros(first.dim());

    output
        .axis_chunks_iter_mut(Axis(0), channels_per_block)
        .into_par_iter()
        .zip(first.axis_chunks_iter(Axis(0), channels_per_block).into_par_iter())
        .zip(second.axis_chunks_iter(Axis(0), channels_per_block).into_par_iter())
        .enumerate()
        .map(|(block_idx, ((out, a), b))| processor(block_idx, a, b, out))
        .collect::<Result<(), E>>()?;

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Zip;

    #[test]
    fn test_blocks_cover_every_channel() {
        let a = Array3::from_shape_fn((7, 3, 2), |(c, r, x)| (c * 6 + r * 2 + x) as f64);
        let b = Array3::from_elem((7, 3, 2), 10.0);

        let sum = map_matching_blocks::<_, ()>(a.view(), b.view(), 3, |_, x, y, mut out| {
            Zip::from(&mut out)
                .and(&x)
                .and(&y)
                .for_each(|o, &x, &y| *o = x + y);
            Ok(())
        })
        .unwrap();

        assert_eq!(sum, &a + &b);
    }

    #[test]
    fn test_block_error_propagates() {
        let a = Array3::<f64>::zeros((4, 2, 2));
        let result = map_matching_blocks(a.view(), a.view(), 1, |idx, _, _, _| {
            if idx == 2 {
                Err(format!("block {idx} failed"))
            } else {
                Ok(())
            }
        });
        assert_eq!(result.unwrap_err(), "block 2 failed");
    }

    #[test]
    fn test_block_indices_follow_channel_order() {
        let a = Array3::<f64>::zeros((5, 1, 1));
        let out = map_matching_blocks::<_, ()>(a.view(), a.view(), 2, |idx, _, _, mut out| {
            out.fill(idx as f64);
            Ok(())
        })
        .unwrap();
        let channels: Vec<f64> = out.iter().copied().collect();
        assert_eq!(channels, vec![0.0, 0.0, 1.0, 1.0, 2.0]);
    }
}
