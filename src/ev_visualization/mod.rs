// Visualization module
// Converts voxel grids and reconstructed frames into `image` buffers

use crate::ev_processing::reconstruction::BgrImage;
use crate::ev_representations::voxel_grid::VoxelGrid;
use image::{GrayImage, Luma, Rgb, RgbImage};
use ndarray::{Array2, Axis};

/// Event counts mapped to black and white in the preview
const PREVIEW_RANGE: (f32, f32) = (-10.0, 10.0);

/// Grayscale preview of a voxel grid
///
/// Bins are summed per pixel and the signed sum is mapped linearly from [-10, 10]
/// to [0, 255], so pixels without events are mid-gray.
pub fn make_event_preview(grid: &VoxelGrid) -> GrayImage {
    let (_, height, width) = grid.dim();
    let summed = grid.sum_axis(Axis(0));
    let (lo, hi) = PREVIEW_RANGE;

    GrayImage::from_fn(width as u32, height as u32, |x, y| {
        let v = summed[[y as usize, x as usize]];
        let scaled = 255.0 * (v - lo) / (hi - lo);
        Luma([scaled.round().clamp(0.0, 255.0) as u8])
    })
}

/// Same as [`make_event_preview`], replicated to three channels
pub fn make_event_preview_rgb(grid: &VoxelGrid) -> RgbImage {
    let preview = make_event_preview(grid);
    RgbImage::from_fn(preview.width(), preview.height(), |x, y| {
        let Luma([v]) = *preview.get_pixel(x, y);
        Rgb([v, v, v])
    })
}

/// Convert a `(height, width, 3)` BGR array into an RGB image
pub fn bgr_to_rgb_image(bgr: &BgrImage) -> RgbImage {
    let (height, width, _) = bgr.dim();
    RgbImage::from_fn(width as u32, height as u32, |x, y| {
        let (x, y) = (x as usize, y as usize);
        Rgb([bgr[[y, x, 2]], bgr[[y, x, 1]], bgr[[y, x, 0]]])
    })
}

pub fn gray_to_image(gray: &Array2<u8>) -> GrayImage {
    let (height, width) = gray.dim();
    GrayImage::from_fn(width as u32, height as u32, |x, y| {
        Luma([gray[[y as usize, x as usize]]])
    })
}
