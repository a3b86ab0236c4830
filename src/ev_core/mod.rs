// Core event data structures and types
// This module defines the event type, the crate error type and the (N, 4) buffer interchange

use ndarray::{Array2, ArrayView2};
use thiserror::Error;

/// Result type for all evframe operations
pub type EvResult<T> = Result<T, EvError>;

/// Error type for evframe operations
///
/// Degenerate batches (all events sharing one timestamp) and events whose time bin falls
/// outside the grid are not errors: they follow documented fallback and clipping rules.
#[derive(Error, Debug)]
pub enum EvError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Event batch is empty")]
    EmptyEvents,

    #[error("Event {index} at ({x}, {y}) lies outside the {width}x{height} sensor")]
    EventOutOfBounds {
        index: usize,
        x: u16,
        y: u16,
        width: usize,
        height: usize,
    },

    #[error("Event timestamps decrease at index {index}")]
    UnsortedEvents { index: usize },

    #[error("Missing channel: {0}")]
    MissingChannel(String),

    #[error("Unknown channel name: {0}")]
    UnknownChannel(String),

    #[error("Unknown colorspace: {0} (expected LAB, HSV or HLS)")]
    UnknownColorspace(String),

    #[error("Channel {channel} has shape {actual:?}, expected {expected:?}")]
    ChannelShapeMismatch {
        channel: String,
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("Model output for channel {channel} has shape {actual:?}, expected {expected:?}")]
    ModelOutputShape {
        channel: String,
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

/// Trait for validatable configurations
pub trait Validatable {
    /// Validate this configuration
    fn validate(&self) -> EvResult<()>;
}

/// Core event data structure.
/// Represents a single event from an event camera.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Event {
    pub t: f64,        // timestamp (seconds or microseconds, only differences matter)
    pub x: u16,        // x coordinate (pixel column)
    pub y: u16,        // y coordinate (pixel row)
    pub polarity: i8,  // raw polarity: 0/1 or -1/+1
}

impl Event {
    pub fn new(t: f64, x: u16, y: u16, polarity: i8) -> Self {
        Self { t, x, y, polarity }
    }

    /// Signed polarity used for accumulation: 0 (and any negative value) maps to -1, positive to +1
    #[inline]
    pub fn signed_polarity(&self) -> f32 {
        if self.polarity > 0 {
            1.0
        } else {
            -1.0
        }
    }
}

/// A collection of events
pub type Events = Vec<Event>;

/// Build events from a row-major (N, 4) buffer laid out as `[t, x, y, polarity]`
pub fn events_from_array(buffer: ArrayView2<f64>) -> EvResult<Events> {
    if buffer.ncols() != 4 {
        return Err(EvError::InvalidArgument(format!(
            "event buffer must have 4 columns [t, x, y, p], got {}",
            buffer.ncols()
        )));
    }

    let mut events = Events::with_capacity(buffer.nrows());
    for (i, row) in buffer.outer_iter().enumerate() {
        let x = coordinate(row[1], i, "x")?;
        let y = coordinate(row[2], i, "y")?;
        let polarity = match row[3] {
            p if p == 0.0 => 0,
            p if p == 1.0 => 1,
            p if p == -1.0 => -1,
            p => {
                return Err(EvError::InvalidArgument(format!(
                    "row {i}: polarity must be 0, 1 or -1, got {p}"
                )))
            }
        };
        events.push(Event::new(row[0], x, y, polarity));
    }

    Ok(events)
}

fn coordinate(value: f64, row: usize, axis: &str) -> EvResult<u16> {
    if value.fract() != 0.0 || value < 0.0 || value > u16::MAX as f64 {
        return Err(EvError::InvalidArgument(format!(
            "row {row}: {axis} coordinate must be an integer in [0, {}], got {value}",
            u16::MAX
        )));
    }
    Ok(value as u16)
}

/// Converts a set of events into an (N, 4) `[t, x, y, polarity]` block
pub fn events_to_array(events: &[Event]) -> EvResult<Array2<f64>> {
    let mut data = Vec::with_capacity(events.len() * 4);

    for ev in events {
        data.extend_from_slice(&[ev.t, ev.x as f64, ev.y as f64, ev.polarity as f64]);
    }

    Ok(Array2::from_shape_vec((events.len(), 4), data)?)
}

/// Index of the first event whose timestamp is smaller than its predecessor's
pub fn first_unsorted_index(events: &[Event]) -> Option<usize> {
    events
        .windows(2)
        .position(|pair| pair[1].t < pair[0].t)
        .map(|i| i + 1)
}
