// Intensity rescaling of reconstructed images to [0, 1]
// Uses robust (percentile) min/max bounds, smoothed over a sliding window of recent frames

use crate::ev_core::{EvError, EvResult, Validatable};
use ndarray::{s, Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Configuration for automatic dynamic range adjustment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RescalerConfig {
    /// Rescale intensities with robust min/max bounds
    pub auto_hdr: bool,
    /// Percentile used as the robust minimum, in [0, 30)
    pub min_percentile: f64,
    /// Percentile used as the robust maximum, in [70, 100]
    pub max_percentile: f64,
    /// Number of recent frames whose bounds are smoothed, in [1, 100]
    pub moving_average_size: usize,
    /// Outer border ignored when computing the bounds, in [0, 50)
    pub border: usize,
}

impl Default for RescalerConfig {
    fn default() -> Self {
        Self {
            auto_hdr: false,
            min_percentile: 0.0,
            max_percentile: 100.0,
            moving_average_size: 1,
            border: 5,
        }
    }
}

impl RescalerConfig {
    pub fn with_auto_hdr(mut self, auto_hdr: bool) -> Self {
        self.auto_hdr = auto_hdr;
        self
    }

    pub fn with_percentiles(mut self, min_percentile: f64, max_percentile: f64) -> Self {
        self.min_percentile = min_percentile;
        self.max_percentile = max_percentile;
        self
    }

    pub fn with_moving_average_size(mut self, size: usize) -> Self {
        self.moving_average_size = size;
        self
    }

    pub fn with_border(mut self, border: usize) -> Self {
        self.border = border;
        self
    }
}

impl Validatable for RescalerConfig {
    fn validate(&self) -> EvResult<()> {
        if !(0.0..30.0).contains(&self.min_percentile) {
            return Err(EvError::InvalidConfig(format!(
                "min_percentile must be in [0, 30), got {}",
                self.min_percentile
            )));
        }
        if !(70.0..=100.0).contains(&self.max_percentile) {
            return Err(EvError::InvalidConfig(format!(
                "max_percentile must be in [70, 100], got {}",
                self.max_percentile
            )));
        }
        if !(1..=100).contains(&self.moving_average_size) {
            return Err(EvError::InvalidConfig(format!(
                "moving_average_size must be in [1, 100], got {}",
                self.moving_average_size
            )));
        }
        if self.border >= 50 {
            return Err(EvError::InvalidConfig(format!(
                "border must be in [0, 50), got {}",
                self.border
            )));
        }
        Ok(())
    }
}

/// Fixed-capacity ring buffer of intensity bounds. Pushing into a full window evicts the oldest entry.
#[derive(Debug, Clone)]
pub struct BoundsWindow {
    slots: Vec<(f32, f32)>,
    capacity: usize,
    next: usize,
}

impl BoundsWindow {
    pub fn new(capacity: usize) -> EvResult<Self> {
        if capacity == 0 {
            return Err(EvError::InvalidArgument(
                "bounds window capacity must be positive".to_string(),
            ));
        }
        Ok(Self {
            slots: Vec::with_capacity(capacity),
            capacity,
            next: 0,
        })
    }

    pub fn push(&mut self, bounds: (f32, f32)) {
        if self.slots.len() < self.capacity {
            self.slots.push(bounds);
        } else {
            self.slots[self.next] = bounds;
        }
        self.next = (self.next + 1) % self.capacity;
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Median of the stored lower and upper bounds
    pub fn median(&self) -> Option<(f32, f32)> {
        if self.slots.is_empty() {
            return None;
        }
        let mut lows: Vec<f32> = self.slots.iter().map(|b| b.0).collect();
        let mut highs: Vec<f32> = self.slots.iter().map(|b| b.1).collect();
        Some((median(&mut lows), median(&mut highs)))
    }
}

fn median(values: &mut [f32]) -> f32 {
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        0.5 * (values[mid - 1] + values[mid])
    } else {
        values[mid]
    }
}

/// Linearly interpolated percentile of unsorted values, `p` in [0, 100]
pub fn percentile(values: &[f32], p: f64) -> Option<f32> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let rank = (p / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = (rank - lo as f64) as f32;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

/// Rescales image intensities to [0, 1] with sliding-window robust bounds
#[derive(Debug, Clone)]
pub struct IntensityRescaler {
    config: RescalerConfig,
    window: BoundsWindow,
}

impl IntensityRescaler {
    pub fn new(config: RescalerConfig) -> EvResult<Self> {
        config.validate()?;
        let window = BoundsWindow::new(config.moving_average_size)?;
        Ok(Self { config, window })
    }

    pub fn config(&self) -> &RescalerConfig {
        &self.config
    }

    /// Number of frames currently contributing to the smoothed bounds
    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    /// Rescale one image. Without `auto_hdr` the image is returned unchanged.
    pub fn rescale(&mut self, image: ArrayView2<f32>) -> Array2<f32> {
        if !self.config.auto_hdr {
            return image.to_owned();
        }

        let interior = self.interior(image);
        let (rmin, rmax) = match (
            percentile(&interior, self.config.min_percentile),
            percentile(&interior, self.config.max_percentile),
        ) {
            (Some(lo), Some(hi)) => (lo, hi),
            _ => return image.mapv(|v| v.clamp(0.0, 1.0)),
        };
        self.window.push((rmin, rmax));

        let (lo, hi) = self.window.median().unwrap_or((rmin, rmax));
        trace!(rmin, rmax, lo, hi, "Intensity bounds");
        if hi <= lo {
            return image.mapv(|v| v.clamp(0.0, 1.0));
        }

        let range = hi - lo;
        image.mapv(|v| ((v - lo) / range).clamp(0.0, 1.0))
    }

    fn interior(&self, image: ArrayView2<f32>) -> Vec<f32> {
        let (height, width) = image.dim();
        let border = self.config.border;
        if border == 0 || 2 * border >= height || 2 * border >= width {
            return image.iter().copied().collect();
        }
        image
            .slice(s![border..height - border, border..width - border])
            .iter()
            .copied()
            .collect()
    }
}
