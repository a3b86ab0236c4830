// Integration tests for padding to network-friendly sizes and cropping back

use evframe::ev_processing::reconstruction::{compute_alignment, optimal_crop_size};
use ndarray::{s, Array3};

#[test]
fn test_working_size_is_smallest_aligned_size() {
    for size in 1..200 {
        for levels in 0..5u32 {
            let working = optimal_crop_size(size, levels, 0).unwrap();
            let block = 1usize << levels;
            assert_eq!(working % block, 0);
            assert!(working >= size);
            assert!(working < size + block);
        }
    }
}

#[test]
fn test_safety_margin_adds_whole_blocks() {
    let plain = optimal_crop_size(346, 3, 0).unwrap();
    let padded = optimal_crop_size(346, 3, 2).unwrap();
    assert_eq!(padded - plain, 16);
}

#[test]
fn test_pad_then_crop_recovers_input_for_many_sizes() {
    for (width, height) in [(13, 13), (1, 1), (7, 30), (346, 260), (240, 180), (33, 2)] {
        for levels in 1..4u32 {
            let alignment = compute_alignment(width, height, levels, 0).unwrap();
            assert!(alignment.is_crop_aligned());
            assert_eq!(alignment.crop_x1 - alignment.crop_x0, width);
            assert_eq!(alignment.crop_y1 - alignment.crop_y0, height);
            assert_eq!(
                alignment.pad_left + width + alignment.pad_right,
                alignment.working_width
            );
            assert_eq!(
                alignment.pad_top + height + alignment.pad_bottom,
                alignment.working_height
            );
            assert!(alignment.pad_left >= alignment.pad_right);
            assert!(alignment.pad_left - alignment.pad_right <= 1);

            let tensor = Array3::from_shape_fn((2, height, width), |(c, y, x)| {
                (c * 100_000 + y * 1000 + x) as f32 + 1.0
            });
            let padded = alignment.pad(tensor.view()).unwrap();
            for c in 0..2 {
                let cropped = alignment.crop(padded.slice(s![c, .., ..])).unwrap();
                assert_eq!(cropped, tensor.slice(s![c, .., ..]));
            }
        }
    }
}

#[test]
fn test_crop_channels_keeps_trailing_axis() {
    let alignment = compute_alignment(5, 3, 2, 0).unwrap();
    let image = Array3::from_shape_fn(
        (alignment.working_height, alignment.working_width, 3),
        |(y, x, c)| (y * 40 + x * 4 + c) as u8,
    );
    let cropped = alignment.crop_channels(image.view()).unwrap();
    assert_eq!(cropped.dim(), (3, 5, 3));
    assert_eq!(
        cropped[[0, 0, 2]],
        image[[alignment.crop_y0, alignment.crop_x0, 2]]
    );
}

#[test]
fn test_alignment_serializes() {
    let alignment = compute_alignment(13, 13, 2, 0).unwrap();
    let json = serde_json::to_string(&alignment).unwrap();
    assert!(json.contains("\"working_width\":16"));
    let back: evframe::SizeAlignment = serde_json::from_str(&json).unwrap();
    assert_eq!(alignment, back);
}
