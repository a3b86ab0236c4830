// Size alignment between the caller's resolution and a network's working resolution
// Pre-processing: find the smallest size divisible by 2^num_levels and zero-pad the input
// Post-processing: crop the network output back to the original size

use crate::ev_core::{EvError, EvResult};
use ndarray::{s, Array2, Array3, ArrayView2, ArrayView3};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Smallest size `>= size` divisible by `2^num_levels`, plus `safety_margin` extra blocks
pub fn optimal_crop_size(size: usize, num_levels: u32, safety_margin: usize) -> EvResult<usize> {
    let block = 1usize.checked_shl(num_levels).filter(|&b| b > 0).ok_or_else(|| {
        EvError::InvalidArgument(format!("num_levels {num_levels} is too large"))
    })?;
    size.div_ceil(block)
        .checked_add(safety_margin)
        .and_then(|blocks| blocks.checked_mul(block))
        .ok_or_else(|| {
            EvError::InvalidArgument(format!(
                "working size overflows for size {size}, num_levels {num_levels}, safety_margin {safety_margin}"
            ))
        })
}

/// Padding and crop bookkeeping for one true resolution and encoder depth
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeAlignment {
    pub true_width: usize,
    pub true_height: usize,
    pub num_levels: u32,
    pub working_width: usize,
    pub working_height: usize,
    pub pad_left: usize,
    pub pad_right: usize,
    pub pad_top: usize,
    pub pad_bottom: usize,
    pub crop_x0: usize,
    pub crop_x1: usize,
    pub crop_y0: usize,
    pub crop_y1: usize,
}

/// Compute the working resolution, pad amounts and inverse crop window
///
/// Padding puts the extra pixel of an odd difference on the leading side:
/// `pad_before = ceil(diff / 2)`, `pad_after = floor(diff / 2)`.
/// The crop window is taken around the working canvas center:
/// `[floor(working / 2) - floor(true / 2), floor(working / 2) + ceil(true / 2))`.
pub fn compute_alignment(
    true_width: usize,
    true_height: usize,
    num_levels: u32,
    safety_margin: usize,
) -> EvResult<SizeAlignment> {
    if true_width == 0 || true_height == 0 {
        return Err(EvError::InvalidArgument(format!(
            "image dimensions must be positive, got {true_width}x{true_height}"
        )));
    }

    let working_width = optimal_crop_size(true_width, num_levels, safety_margin)?;
    let working_height = optimal_crop_size(true_height, num_levels, safety_margin)?;

    let (pad_left, pad_right) = split_padding(working_width - true_width);
    let (pad_top, pad_bottom) = split_padding(working_height - true_height);
    let (crop_x0, crop_x1) = centered_window(working_width, true_width);
    let (crop_y0, crop_y1) = centered_window(working_height, true_height);

    let alignment = SizeAlignment {
        true_width,
        true_height,
        num_levels,
        working_width,
        working_height,
        pad_left,
        pad_right,
        pad_top,
        pad_bottom,
        crop_x0,
        crop_x1,
        crop_y0,
        crop_y1,
    };

    if !alignment.is_crop_aligned() {
        warn!(
            working_width,
            working_height,
            pad_left,
            pad_top,
            crop_x0,
            crop_y0,
            "Crop window does not start at the pad offset; cropping will read padded pixels"
        );
    }

    Ok(alignment)
}

fn split_padding(diff: usize) -> (usize, usize) {
    (diff.div_ceil(2), diff / 2)
}

fn centered_window(working: usize, size: usize) -> (usize, usize) {
    let center = working / 2;
    (center - size / 2, center + size.div_ceil(2))
}

impl SizeAlignment {
    /// Whether the crop window starts exactly where the padding ends.
    /// Holds whenever the working size is even, i.e. for any `num_levels >= 1`.
    pub fn is_crop_aligned(&self) -> bool {
        self.crop_x0 == self.pad_left && self.crop_y0 == self.pad_top
    }

    /// Zero-pad a `(channels, true_height, true_width)` tensor to the working resolution
    pub fn pad(&self, tensor: ArrayView3<f32>) -> EvResult<Array3<f32>> {
        let (channels, height, width) = tensor.dim();
        if (height, width) != (self.true_height, self.true_width) {
            return Err(EvError::InvalidArgument(format!(
                "cannot pad a {width}x{height} tensor with an alignment for {}x{}",
                self.true_width, self.true_height
            )));
        }

        let mut padded = Array3::zeros((channels, self.working_height, self.working_width));
        padded
            .slice_mut(s![
                ..,
                self.pad_top..self.pad_top + height,
                self.pad_left..self.pad_left + width
            ])
            .assign(&tensor);
        Ok(padded)
    }

    /// Crop a working-resolution `(height, width)` image back to the true resolution
    pub fn crop<T: Clone>(&self, image: ArrayView2<T>) -> EvResult<Array2<T>> {
        self.check_working_shape(image.dim())?;
        Ok(image
            .slice(s![self.crop_y0..self.crop_y1, self.crop_x0..self.crop_x1])
            .to_owned())
    }

    /// Crop a working-resolution `(height, width, channels)` image back to the true resolution
    pub fn crop_channels<T: Clone>(&self, image: ArrayView3<T>) -> EvResult<Array3<T>> {
        let (height, width, _) = image.dim();
        self.check_working_shape((height, width))?;
        Ok(image
            .slice(s![self.crop_y0..self.crop_y1, self.crop_x0..self.crop_x1, ..])
            .to_owned())
    }

    fn check_working_shape(&self, (height, width): (usize, usize)) -> EvResult<()> {
        if (height, width) != (self.working_height, self.working_width) {
            return Err(EvError::InvalidArgument(format!(
                "expected a {}x{} working-resolution image, got {width}x{height}",
                self.working_width, self.working_height
            )));
        }
        Ok(())
    }
}
