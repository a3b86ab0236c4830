//! Voxel grid representation with bilinear interpolation in the time domain
//!
//! Events are binned into a dense `(num_bins, height, width)` tensor as described in
//! Zhu et al. 2019, "Unsupervised event-based learning of optical flow, depth, and egomotion",
//! and consumed by E2VID-style reconstruction networks.
//!
//! ## Algorithm
//! 1. **Time bounds**: the first and last events of the batch (not a recomputed min/max)
//!    define the time span `deltaT`. A batch whose events all share one timestamp uses
//!    `deltaT = 1.0`, so every event lands entirely in bin 0.
//! 2. **Bin position**: `pos = (num_bins - 1) * (t - t_first) / deltaT`, derived per event.
//!    The caller's events are never rewritten.
//! 3. **Interpolation**: with `b = floor(pos)` and `f = pos - b`, an event adds
//!    `p * (1 - f)` to bin `b` and `p * f` to bin `b + 1` at its exact pixel.
//! 4. **Clipping**: a side whose bin falls outside `[0, num_bins)` is dropped silently.
//!
//! # Example
//!
//! ```rust
//! use evframe::ev_core::Event;
//! use evframe::ev_representations::events_to_voxel_grid;
//!
//! let events = vec![Event::new(0.0, 1, 1, 1), Event::new(1.0, 2, 0, 0)];
//! let grid = events_to_voxel_grid(&events, 5, 4, 3).unwrap();
//! assert_eq!(grid.shape(), &[5, 3, 4]);
//! assert_eq!(grid[[0, 1, 1]], 1.0);
//! assert_eq!(grid[[4, 0, 2]], -1.0);
//! ```

use crate::ev_core::{first_unsorted_index, Event, EvError, EvResult, Validatable};
use ndarray::Array3;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use tracing::{debug, instrument, trace};

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Dense `(num_bins, height, width)` histogram of signed event mass
pub type VoxelGrid = Array3<f32>;

/// How the builder treats the timestamp order of a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampOrdering {
    /// Trust the caller: the batch is binned as given
    #[default]
    Assume,
    /// Reject batches whose timestamps decrease anywhere
    Validate,
    /// Bin a sorted copy of unsorted batches
    Sort,
}

/// Configuration for voxel grid construction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoxelGridConfig {
    /// Number of temporal bins
    pub num_bins: usize,
    /// Timestamp ordering policy
    pub ordering: TimestampOrdering,
    /// Batches with at least this many events are binned in parallel shards
    pub parallel_threshold: usize,
}

impl Default for VoxelGridConfig {
    fn default() -> Self {
        Self {
            num_bins: 5,
            ordering: TimestampOrdering::Assume,
            parallel_threshold: 1 << 16,
        }
    }
}

impl VoxelGridConfig {
    pub fn new(num_bins: usize) -> Self {
        Self {
            num_bins,
            ..Default::default()
        }
    }

    pub fn with_ordering(mut self, ordering: TimestampOrdering) -> Self {
        self.ordering = ordering;
        self
    }

    pub fn with_parallel_threshold(mut self, threshold: usize) -> Self {
        self.parallel_threshold = threshold;
        self
    }
}

impl Validatable for VoxelGridConfig {
    fn validate(&self) -> EvResult<()> {
        if self.num_bins == 0 {
            return Err(EvError::InvalidConfig(
                "num_bins must be positive".to_string(),
            ));
        }
        if self.parallel_threshold == 0 {
            return Err(EvError::InvalidConfig(
                "parallel_threshold must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Reusable events-to-voxel-grid converter for a fixed sensor size
#[derive(Debug, Clone)]
pub struct EventsToVoxelGrid {
    pub config: VoxelGridConfig,
    pub width: usize,
    pub height: usize,
}

impl EventsToVoxelGrid {
    /// Create a converter with the default ordering policy
    pub fn new(num_bins: usize, width: usize, height: usize) -> EvResult<Self> {
        Self::with_config(VoxelGridConfig::new(num_bins), width, height)
    }

    pub fn with_config(config: VoxelGridConfig, width: usize, height: usize) -> EvResult<Self> {
        config.validate()?;
        if width == 0 || height == 0 {
            return Err(EvError::InvalidArgument(format!(
                "voxel grid dimensions must be positive, got {width}x{height}"
            )));
        }
        Ok(Self {
            config,
            width,
            height,
        })
    }

    pub fn num_bins(&self) -> usize {
        self.config.num_bins
    }

    /// Bin a batch of events into a fresh voxel grid
    #[instrument(level = "debug", skip_all, fields(n_events = events.len(), num_bins = self.config.num_bins))]
    pub fn build(&self, events: &[Event]) -> EvResult<VoxelGrid> {
        if events.is_empty() {
            return Err(EvError::EmptyEvents);
        }
        self.check_bounds(events)?;

        let events = self.ordered(events)?;
        let binning = TemporalBinning::from_events(&events, self.config.num_bins);
        let total = self.config.num_bins * self.height * self.width;

        let (voxels, dropped) = if events.len() >= self.config.parallel_threshold {
            self.accumulate_sharded(&binning, &events, total)
        } else {
            let mut voxels = vec![0.0f32; total];
            let dropped = binning.accumulate(&events, self.width, self.height, &mut voxels);
            (voxels, dropped)
        };

        if dropped > 0 {
            trace!(dropped, "Clipped out-of-range bin contributions");
        }
        debug!(
            t_first = binning.first,
            delta_t = binning.delta_t,
            dropped,
            "Built voxel grid"
        );

        Ok(Array3::from_shape_vec(
            (self.config.num_bins, self.height, self.width),
            voxels,
        )?)
    }

    fn check_bounds(&self, events: &[Event]) -> EvResult<()> {
        match events
            .iter()
            .position(|e| e.x as usize >= self.width || e.y as usize >= self.height)
        {
            Some(index) => Err(EvError::EventOutOfBounds {
                index,
                x: events[index].x,
                y: events[index].y,
                width: self.width,
                height: self.height,
            }),
            None => Ok(()),
        }
    }

    fn ordered<'a>(&self, events: &'a [Event]) -> EvResult<Cow<'a, [Event]>> {
        match self.config.ordering {
            TimestampOrdering::Assume => Ok(Cow::Borrowed(events)),
            TimestampOrdering::Validate => match first_unsorted_index(events) {
                Some(index) => Err(EvError::UnsortedEvents { index }),
                None => Ok(Cow::Borrowed(events)),
            },
            TimestampOrdering::Sort => match first_unsorted_index(events) {
                Some(index) => {
                    debug!(index, "Sorting unsorted event batch");
                    let mut sorted = events.to_vec();
                    sorted.sort_by(|a, b| a.t.total_cmp(&b.t));
                    Ok(Cow::Owned(sorted))
                }
                None => Ok(Cow::Borrowed(events)),
            },
        }
    }

    #[cfg(feature = "rayon")]
    fn accumulate_sharded(
        &self,
        binning: &TemporalBinning,
        events: &[Event],
        total: usize,
    ) -> (Vec<f32>, usize) {
        let threads = rayon::current_num_threads().max(1);
        let shard_len = events.len().div_ceil(threads).max(1);
        debug!(threads, shard_len, "Binning events in parallel shards");

        events
            .par_chunks(shard_len)
            .map(|shard| {
                let mut partial = vec![0.0f32; total];
                let dropped = binning.accumulate(shard, self.width, self.height, &mut partial);
                (partial, dropped)
            })
            .reduce(
                || (vec![0.0f32; total], 0),
                |(mut acc, dropped_a), (partial, dropped_b)| {
                    acc.iter_mut().zip(&partial).for_each(|(a, b)| *a += b);
                    (acc, dropped_a + dropped_b)
                },
            )
    }

    #[cfg(not(feature = "rayon"))]
    fn accumulate_sharded(
        &self,
        binning: &TemporalBinning,
        events: &[Event],
        total: usize,
    ) -> (Vec<f32>, usize) {
        let mut voxels = vec![0.0f32; total];
        let dropped = binning.accumulate(events, self.width, self.height, &mut voxels);
        (voxels, dropped)
    }
}

/// Time normalization shared by every event of one batch
#[derive(Debug, Clone, Copy)]
struct TemporalBinning {
    first: f64,
    delta_t: f64,
    num_bins: usize,
}

impl TemporalBinning {
    fn from_events(events: &[Event], num_bins: usize) -> Self {
        let first = events[0].t;
        let last = events[events.len() - 1].t;
        let mut delta_t = last - first;
        if delta_t == 0.0 {
            debug!(timestamp = first, "All events share one timestamp, using unit time span");
            delta_t = 1.0;
        }
        Self {
            first,
            delta_t,
            num_bins,
        }
    }

    #[inline]
    fn position(&self, t: f64) -> f64 {
        (self.num_bins - 1) as f64 * (t - self.first) / self.delta_t
    }

    /// Add the contributions of `events` into a flat `(bin, y, x)` grid.
    /// Returns the number of dropped contribution sides.
    fn accumulate(&self, events: &[Event], width: usize, height: usize, voxels: &mut [f32]) -> usize {
        let plane = width * height;
        let bins = self.num_bins as i64;
        let mut dropped = 0;

        for event in events {
            let pos = self.position(event.t);
            if !pos.is_finite() {
                dropped += 2;
                continue;
            }

            let bin = pos.floor();
            let frac = pos - bin;
            let bin = bin as i64;
            let polarity = event.signed_polarity() as f64;
            let pixel = event.y as usize * width + event.x as usize;

            if (0..bins).contains(&bin) {
                voxels[bin as usize * plane + pixel] += (polarity * (1.0 - frac)) as f32;
            } else {
                dropped += 1;
            }

            if (0..bins - 1).contains(&bin) {
                voxels[(bin as usize + 1) * plane + pixel] += (polarity * frac) as f32;
            } else {
                dropped += 1;
            }
        }

        dropped
    }
}

/// Build a voxel grid of shape `(num_bins, height, width)` from a timestamp-sorted batch
pub fn events_to_voxel_grid(
    events: &[Event],
    num_bins: usize,
    width: usize,
    height: usize,
) -> EvResult<VoxelGrid> {
    EventsToVoxelGrid::new(num_bins, width, height)?.build(events)
}

/// Normalized bin position of every event, `(num_bins - 1) * (t - t_first) / deltaT`
pub fn bin_positions(events: &[Event], num_bins: usize) -> EvResult<Vec<f64>> {
    if events.is_empty() {
        return Err(EvError::EmptyEvents);
    }
    if num_bins == 0 {
        return Err(EvError::InvalidArgument(
            "num_bins must be positive".to_string(),
        ));
    }
    let binning = TemporalBinning::from_events(events, num_bins);
    Ok(events.iter().map(|e| binning.position(e.t)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interior_events() -> Vec<Event> {
        vec![
            Event::new(0.0, 0, 0, 1),
            Event::new(0.125, 1, 1, 1),
            Event::new(0.5, 2, 1, 0),
            Event::new(1.0, 3, 2, 1),
        ]
    }

    #[test]
    fn test_grid_shape_and_layout() {
        let grid = events_to_voxel_grid(&interior_events(), 5, 4, 3).unwrap();
        assert_eq!(grid.shape(), &[5, 3, 4]);
        assert!(grid.is_standard_layout());
    }

    #[test]
    fn test_half_bin_split() {
        let grid = events_to_voxel_grid(&interior_events(), 5, 4, 3).unwrap();
        // t = 0.125 -> pos = 0.5
        assert!((grid[[0, 1, 1]] - 0.5).abs() < 1e-6);
        assert!((grid[[1, 1, 1]] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_integer_bin_boundary() {
        let grid = events_to_voxel_grid(&interior_events(), 5, 4, 3).unwrap();
        // t = 0.5 -> pos = 2.0, OFF event
        assert_eq!(grid[[2, 1, 2]], -1.0);
        assert_eq!(grid[[3, 1, 2]], 0.0);
        // last event lands fully in the last bin
        assert_eq!(grid[[4, 2, 3]], 1.0);
    }

    #[test]
    fn test_degenerate_batch_uses_first_bin() {
        let events = vec![
            Event::new(2.0, 0, 0, 1),
            Event::new(2.0, 1, 0, 0),
            Event::new(2.0, 0, 0, 1),
        ];
        let grid = events_to_voxel_grid(&events, 3, 2, 1).unwrap();
        assert_eq!(grid[[0, 0, 0]], 2.0);
        assert_eq!(grid[[0, 0, 1]], -1.0);
        let later: f32 = grid.iter().skip(2).map(|v| v.abs()).sum();
        assert_eq!(later, 0.0);
    }

    #[test]
    fn test_bin_positions_are_derived() {
        let events = interior_events();
        let before = events.clone();
        let positions = bin_positions(&events, 5).unwrap();
        assert_eq!(positions, vec![0.0, 0.5, 2.0, 4.0]);
        assert_eq!(events, before);
    }

    #[test]
    fn test_validate_ordering_rejects_unsorted() {
        let events = vec![Event::new(1.0, 0, 0, 1), Event::new(0.5, 0, 0, 1)];
        let builder = EventsToVoxelGrid::with_config(
            VoxelGridConfig::new(3).with_ordering(TimestampOrdering::Validate),
            2,
            2,
        )
        .unwrap();
        assert!(matches!(
            builder.build(&events),
            Err(EvError::UnsortedEvents { index: 1 })
        ));
    }

    #[test]
    fn test_sort_ordering_matches_sorted_input() {
        let sorted = interior_events();
        let mut shuffled = sorted.clone();
        shuffled.swap(0, 3);
        shuffled.swap(1, 2);

        let builder = EventsToVoxelGrid::with_config(
            VoxelGridConfig::new(5).with_ordering(TimestampOrdering::Sort),
            4,
            3,
        )
        .unwrap();
        let from_shuffled = builder.build(&shuffled).unwrap();
        let from_sorted = builder.build(&sorted).unwrap();
        assert_eq!(from_shuffled, from_sorted);
        // caller data untouched
        assert_eq!(shuffled[0].t, 1.0);
    }

    #[test]
    fn test_out_of_bounds_event_rejected() {
        let events = vec![Event::new(0.0, 4, 0, 1)];
        let err = events_to_voxel_grid(&events, 2, 4, 4).unwrap_err();
        assert!(matches!(err, EvError::EventOutOfBounds { index: 0, x: 4, .. }));
    }

    #[test]
    fn test_invalid_arguments() {
        assert!(matches!(
            events_to_voxel_grid(&[], 5, 4, 4),
            Err(EvError::EmptyEvents)
        ));
        assert!(EventsToVoxelGrid::new(0, 4, 4).is_err());
        assert!(EventsToVoxelGrid::new(5, 0, 4).is_err());
        assert!(EventsToVoxelGrid::new(5, 4, 0).is_err());
    }

    #[test]
    fn test_far_future_event_is_clipped() {
        // pos saturates to i64::MAX when cast
        let events = vec![
            Event::new(0.0, 0, 0, 1),
            Event::new(1.0e30, 1, 0, 1),
            Event::new(1.0, 2, 0, 1),
        ];
        let grid = events_to_voxel_grid(&events, 5, 3, 1).unwrap();
        assert_eq!(grid[[0, 0, 0]], 1.0);
        assert_eq!(grid[[4, 0, 2]], 1.0);
        assert!(grid.iter().skip(1).step_by(3).all(|&v| v == 0.0));
        assert_eq!(grid.sum(), 2.0);
    }

    #[test]
    fn test_sharded_accumulation_matches_sequential() {
        let events: Vec<Event> = (0..1000)
            .map(|i| Event::new(i as f64 * 1e-3, (i % 7) as u16, (i % 5) as u16, (i % 2) as i8))
            .collect();

        let sequential = EventsToVoxelGrid::with_config(VoxelGridConfig::new(4), 7, 5)
            .unwrap()
            .build(&events)
            .unwrap();
        let sharded = EventsToVoxelGrid::with_config(
            VoxelGridConfig::new(4).with_parallel_threshold(1),
            7,
            5,
        )
        .unwrap()
        .build(&events)
        .unwrap();

        for (a, b) in sequential.iter().zip(sharded.iter()) {
            assert!((a - b).abs() < 1e-4);
        }
    }
}
