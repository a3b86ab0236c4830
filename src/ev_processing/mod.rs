// Event processing module
// Post-processing around learned reconstruction models

pub mod reconstruction;

pub use reconstruction::{FrameReconstructor, ReconstructedFrame, ReconstructionConfig};
