use ndarray::{Array3, ArrayView4};

use crate::{MlErr, Result};

/// Resamples a batch of labels to the spatial resolution of the scores with nearest neighbour
/// interpolation, dropping the trailing channel axis.
///
/// Output pixel `(i, j)` takes the label of input pixel
/// `(floor(i * in_h / out_h), floor(j * in_w / out_w))`.
///
/// # Arguments
/// * `labels` - A `(batch, height, width, 1)` tensor.
/// * `out_h` - The height of the scores.
/// * `out_w` - The width of the scores.
///
/// # Returns
/// A `(batch, out_h, out_w)` tensor or an error if `labels` has more than one channel.
pub fn prepare_label(labels: ArrayView4<u8>, out_h: usize, out_w: usize) -> Result<Array3<f32>> {
    let (n, in_h, in_w, c) = labels.dim();
    if c != 1 {
        return Err(MlErr::SizeMismatch {
            what: "label channels",
            got: c,
            expected: 1,
        });
    }

    if in_h == 0 || in_w == 0 {
        return Err(MlErr::SizeMismatch {
            what: "label size",
            got: 0,
            expected: out_h * out_w,
        });
    }

    let nearest = |dst: usize, src_len: usize, dst_len: usize| (dst * src_len / dst_len).min(src_len - 1);

    Ok(Array3::from_shape_fn((n, out_h, out_w), |(b, i, j)| {
        let y = nearest(i, in_h, out_h);
        let x = nearest(j, in_w, out_w);
        labels[[b, y, x, 0]] as f32
    }))
}
