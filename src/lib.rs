// Core modules
pub mod ev_core;
pub mod ev_processing;
pub mod ev_representations;
pub mod ev_visualization;
pub mod tracing_config;

// Re-export core types for easier usage
pub use ev_core::{Event, Events, EvError, EvResult, Validatable};
pub use ev_processing::reconstruction::{
    compute_alignment, merge_channels_into_color_image, BgrImage, Channel, ChannelSet,
    ColorChannelCompositor, Colorspace, FrameReconstructor, IntensityRescaler,
    ReconstructedFrame, ReconstructionConfig, ReconstructionModel, RescalerConfig, SizeAlignment,
    VoxelGridFilter,
};
pub use ev_representations::voxel_grid::{
    events_to_voxel_grid, EventsToVoxelGrid, TimestampOrdering, VoxelGrid, VoxelGridConfig,
};

/// Returns the version of the library
pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
