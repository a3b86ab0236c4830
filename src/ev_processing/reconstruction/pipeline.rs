// Event-to-frame reconstruction pipeline around an external network
// events -> voxel grid -> filter -> pad -> model -> crop -> rescale -> (compose) -> 8-bit frame

use crate::ev_core::{Event, EvError, EvResult, Validatable};
use crate::ev_processing::reconstruction::color::{
    quantize, subsample_channel, BgrImage, Channel, ChannelSet, ColorChannelCompositor,
};
use crate::ev_processing::reconstruction::colorspace::Colorspace;
use crate::ev_processing::reconstruction::crop::{compute_alignment, SizeAlignment};
use crate::ev_processing::reconstruction::rescale::{IntensityRescaler, RescalerConfig};
use crate::ev_representations::voxel_grid::{
    EventsToVoxelGrid, TimestampOrdering, VoxelGrid, VoxelGridConfig,
};
use ndarray::{Array2, ArrayView3};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, instrument};

/// An image reconstruction network
///
/// `input` has shape `(num_bins, working_height, working_width)`; the output must have shape
/// `(working_height, working_width)` with intensities in [0, 1]. In color mode the model is
/// invoked once per channel, so recurrent models can keep separate state per channel.
pub trait ReconstructionModel {
    fn infer(&mut self, channel: Channel, input: ArrayView3<f32>) -> EvResult<Array2<f32>>;
}

impl<F> ReconstructionModel for F
where
    F: FnMut(Channel, ArrayView3<f32>) -> EvResult<Array2<f32>>,
{
    fn infer(&mut self, channel: Channel, input: ArrayView3<f32>) -> EvResult<Array2<f32>> {
        self(channel, input)
    }
}

/// In-place processing of the voxel grid before inference (hot pixel masking, normalization)
pub trait VoxelGridFilter {
    fn apply(&mut self, grid: &mut VoxelGrid);
}

/// Configuration for frame reconstruction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconstructionConfig {
    /// Number of temporal bins of the input voxel grid
    pub num_bins: usize,
    /// Encoder depth of the network; working sizes are multiples of 2^num_encoders
    pub num_encoders: u32,
    /// Extra 2^num_encoders blocks of padding per dimension
    pub safety_margin: usize,
    /// Reconstruct color from the RGBW sub-lattices
    pub color: bool,
    /// Colorspace used for luminance substitution in color mode
    pub colorspace: Colorspace,
    /// Timestamp ordering policy for event batches
    pub ordering: TimestampOrdering,
    /// Intensity rescaling of the network outputs
    pub rescaler: RescalerConfig,
}

impl Default for ReconstructionConfig {
    fn default() -> Self {
        Self {
            num_bins: 5,
            num_encoders: 3,
            safety_margin: 0,
            color: false,
            colorspace: Colorspace::Lab,
            ordering: TimestampOrdering::Assume,
            rescaler: RescalerConfig::default(),
        }
    }
}

impl ReconstructionConfig {
    pub fn with_num_bins(mut self, num_bins: usize) -> Self {
        self.num_bins = num_bins;
        self
    }

    pub fn with_num_encoders(mut self, num_encoders: u32) -> Self {
        self.num_encoders = num_encoders;
        self
    }

    pub fn with_safety_margin(mut self, safety_margin: usize) -> Self {
        self.safety_margin = safety_margin;
        self
    }

    pub fn with_color(mut self, colorspace: Colorspace) -> Self {
        self.color = true;
        self.colorspace = colorspace;
        self
    }

    pub fn with_ordering(mut self, ordering: TimestampOrdering) -> Self {
        self.ordering = ordering;
        self
    }

    pub fn with_rescaler(mut self, rescaler: RescalerConfig) -> Self {
        self.rescaler = rescaler;
        self
    }
}

impl Validatable for ReconstructionConfig {
    fn validate(&self) -> EvResult<()> {
        if self.num_bins == 0 {
            return Err(EvError::InvalidConfig(
                "num_bins must be positive".to_string(),
            ));
        }
        self.rescaler.validate()
    }
}

/// Output of one reconstruction step, at the caller's resolution
#[derive(Debug, Clone, PartialEq)]
pub enum ReconstructedFrame {
    Grayscale(Array2<u8>),
    Color(BgrImage),
}

impl ReconstructedFrame {
    /// (height, width) of the frame
    pub fn dim(&self) -> (usize, usize) {
        match self {
            ReconstructedFrame::Grayscale(image) => image.dim(),
            ReconstructedFrame::Color(image) => {
                let (height, width, _) = image.dim();
                (height, width)
            }
        }
    }
}

/// Turns event batches into frames through an external reconstruction model
pub struct FrameReconstructor<M> {
    config: ReconstructionConfig,
    voxel_grid: EventsToVoxelGrid,
    alignment: SizeAlignment,
    half_alignment: Option<SizeAlignment>,
    rescalers: HashMap<Channel, IntensityRescaler>,
    compositor: ColorChannelCompositor,
    filter: Option<Box<dyn VoxelGridFilter>>,
    model: M,
    frames: u64,
}

impl<M: ReconstructionModel> FrameReconstructor<M> {
    pub fn new(width: usize, height: usize, mut config: ReconstructionConfig, model: M) -> EvResult<Self> {
        config.validate()?;

        if config.color {
            if width % 2 != 0 || height % 2 != 0 {
                return Err(EvError::InvalidArgument(format!(
                    "color reconstruction requires even dimensions, got {width}x{height}"
                )));
            }
            if !config.rescaler.auto_hdr {
                info!("Color reconstruction enables auto HDR rescaling");
                config.rescaler.auto_hdr = true;
            }
        }

        let voxel_grid = EventsToVoxelGrid::with_config(
            VoxelGridConfig::new(config.num_bins).with_ordering(config.ordering),
            width,
            height,
        )?;
        let alignment = compute_alignment(width, height, config.num_encoders, config.safety_margin)?;
        let half_alignment = if config.color {
            Some(compute_alignment(
                width / 2,
                height / 2,
                config.num_encoders,
                config.safety_margin,
            )?)
        } else {
            None
        };

        let channels: &[Channel] = if config.color {
            &Channel::ALL
        } else {
            &[Channel::Grayscale]
        };
        let mut rescalers = HashMap::with_capacity(channels.len());
        for &channel in channels {
            rescalers.insert(channel, IntensityRescaler::new(config.rescaler.clone())?);
        }

        info!(
            width,
            height,
            working_width = alignment.working_width,
            working_height = alignment.working_height,
            color = config.color,
            "Frame reconstructor ready"
        );

        Ok(Self {
            compositor: ColorChannelCompositor::new(config.colorspace),
            config,
            voxel_grid,
            alignment,
            half_alignment,
            rescalers,
            filter: None,
            model,
            frames: 0,
        })
    }

    /// Install a filter applied to every voxel grid before inference
    pub fn with_filter(mut self, filter: impl VoxelGridFilter + 'static) -> Self {
        self.filter = Some(Box::new(filter));
        self
    }

    pub fn config(&self) -> &ReconstructionConfig {
        &self.config
    }

    /// Alignment between the sensor resolution and the network's working resolution
    pub fn alignment(&self) -> &SizeAlignment {
        &self.alignment
    }

    /// Alignment used for the half-resolution RGBW channels (color mode only)
    pub fn half_alignment(&self) -> Option<&SizeAlignment> {
        self.half_alignment.as_ref()
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut M {
        &mut self.model
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames
    }

    /// Reconstruct one frame from a timestamp-sorted batch of events
    #[instrument(level = "debug", skip_all, fields(frame = self.frames, n_events = events.len()))]
    pub fn reconstruct(&mut self, events: &[Event]) -> EvResult<ReconstructedFrame> {
        let mut grid = self.voxel_grid.build(events)?;
        if let Some(filter) = self.filter.as_mut() {
            filter.apply(&mut grid);
        }

        let frame = match self.half_alignment {
            None => {
                let image = self.infer_channel(Channel::Grayscale, grid.view(), self.alignment)?;
                ReconstructedFrame::Grayscale(image.mapv(quantize))
            }
            Some(half) => {
                let mut channels = ChannelSet::new();
                let grayscale = self.infer_channel(Channel::Grayscale, grid.view(), self.alignment)?;
                channels.insert(Channel::Grayscale, grayscale);
                for channel in Channel::COLOR {
                    let lattice = subsample_channel(grid.view(), channel);
                    let image = self.infer_channel(channel, lattice.view(), half)?;
                    channels.insert(channel, image);
                }
                ReconstructedFrame::Color(self.compositor.compose(&channels)?)
            }
        };

        self.frames += 1;
        debug!("Reconstructed frame");
        Ok(frame)
    }

    fn infer_channel(
        &mut self,
        channel: Channel,
        tensor: ArrayView3<f32>,
        alignment: SizeAlignment,
    ) -> EvResult<Array2<f32>> {
        let padded = alignment.pad(tensor)?;
        let output = self.model.infer(channel, padded.view())?;

        let expected = (alignment.working_height, alignment.working_width);
        if output.dim() != expected {
            return Err(EvError::ModelOutputShape {
                channel: channel.name().to_string(),
                expected,
                actual: output.dim(),
            });
        }

        let cropped = alignment.crop(output.view())?;
        match self.rescalers.get_mut(&channel) {
            Some(rescaler) => Ok(rescaler.rescale(cropped.view())),
            None => Ok(cropped),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Axis;

    fn events() -> Vec<Event> {
        vec![
            Event::new(0.0, 0, 0, 1),
            Event::new(0.5, 3, 2, 0),
            Event::new(1.0, 5, 3, 1),
        ]
    }

    #[test]
    fn test_model_sees_padded_grid() {
        let mut seen = Vec::new();
        let model = |channel: Channel, input: ArrayView3<f32>| -> EvResult<Array2<f32>> {
            seen.push((channel, input.dim(), input.sum()));
            Ok(Array2::from_elem((input.dim().1, input.dim().2), 0.5))
        };
        let config = ReconstructionConfig::default().with_num_encoders(2);
        let mut reconstructor = FrameReconstructor::new(6, 5, config, model).unwrap();
        let frame = reconstructor.reconstruct(&events()).unwrap();
        assert_eq!(frame.dim(), (5, 6));
        assert_eq!(reconstructor.frames_processed(), 1);
        drop(reconstructor);

        assert_eq!(seen.len(), 1);
        let (channel, dim, mass) = seen[0];
        assert_eq!(channel, Channel::Grayscale);
        assert_eq!(dim, (5, 8, 8));
        assert!((mass - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_wrong_model_output_shape() {
        let model = |_: Channel, _: ArrayView3<f32>| -> EvResult<Array2<f32>> {
            Ok(Array2::zeros((3, 3)))
        };
        let mut reconstructor =
            FrameReconstructor::new(6, 5, ReconstructionConfig::default(), model).unwrap();
        assert!(matches!(
            reconstructor.reconstruct(&events()),
            Err(EvError::ModelOutputShape { .. })
        ));
    }

    #[test]
    fn test_filter_runs_before_inference() {
        struct ZeroFirstBin;
        impl VoxelGridFilter for ZeroFirstBin {
            fn apply(&mut self, grid: &mut VoxelGrid) {
                grid.index_axis_mut(Axis(0), 0).fill(0.0);
            }
        }

        let model = |_: Channel, input: ArrayView3<f32>| -> EvResult<Array2<f32>> {
            assert_eq!(input.index_axis(Axis(0), 0).sum(), 0.0);
            Ok(Array2::zeros((input.dim().1, input.dim().2)))
        };
        let mut reconstructor =
            FrameReconstructor::new(6, 5, ReconstructionConfig::default(), model)
                .unwrap()
                .with_filter(ZeroFirstBin);
        reconstructor.reconstruct(&events()).unwrap();
    }

    #[test]
    fn test_color_requires_even_dimensions() {
        let model = |_: Channel, input: ArrayView3<f32>| -> EvResult<Array2<f32>> {
            Ok(Array2::zeros((input.dim().1, input.dim().2)))
        };
        let config = ReconstructionConfig::default().with_color(Colorspace::Hsv);
        assert!(FrameReconstructor::new(7, 4, config, model).is_err());
    }

    #[test]
    fn test_model_errors_propagate() {
        let model = |_: Channel, _: ArrayView3<f32>| -> EvResult<Array2<f32>> {
            Err(EvError::Model("backend unavailable".to_string()))
        };
        let mut reconstructor =
            FrameReconstructor::new(4, 4, ReconstructionConfig::default(), model).unwrap();
        let err = reconstructor.reconstruct(&events_in(4, 4)).unwrap_err();
        assert!(err.to_string().contains("backend unavailable"));
    }

    fn events_in(width: u16, height: u16) -> Vec<Event> {
        vec![
            Event::new(0.0, 0, 0, 1),
            Event::new(1.0, width - 1, height - 1, 0),
        ]
    }
}
