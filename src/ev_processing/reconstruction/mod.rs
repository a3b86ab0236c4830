// Event-based reconstruction module
// Everything around an image reconstruction network except the network itself

pub mod color;
pub mod colorspace;
pub mod crop;
pub mod pipeline;
pub mod rescale;

// Re-export main items for easier access
pub use color::{
    merge_channels_into_color_image, shift_image, subsample_channel, upsample_bicubic_x2,
    BgrImage, Channel, ChannelSet, ColorChannelCompositor,
};
pub use colorspace::Colorspace;
pub use crop::{compute_alignment, optimal_crop_size, SizeAlignment};
pub use pipeline::{
    FrameReconstructor, ReconstructedFrame, ReconstructionConfig, ReconstructionModel,
    VoxelGridFilter,
};
pub use rescale::{percentile, BoundsWindow, IntensityRescaler, RescalerConfig};
