// Color reconstruction from a full-resolution gray-scale channel and four half-resolution
// RGBW channels, following the luminance substitution trick described in
// http://www.planetary.org/blogs/emily-lakdawalla/2013/04231204-image-processing-colorizing-images.html

use crate::ev_core::{EvError, EvResult};
use crate::ev_processing::reconstruction::colorspace::Colorspace;
use ndarray::{s, Array2, Array3, ArrayView2, ArrayView3};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// 8-bit BGR image with shape (height, width, 3)
pub type BgrImage = Array3<u8>;

/// Bicubic kernel parameter (Keys, a = -0.75)
const CUBIC_A: f64 = -0.75;

/// Reconstruction channels produced per inference step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Channel {
    R,
    G,
    W,
    B,
    Grayscale,
}

impl Channel {
    /// The four half-resolution color channels of the RGBW pattern
    pub const COLOR: [Channel; 4] = [Channel::R, Channel::G, Channel::W, Channel::B];

    /// All five channels of a color reconstruction
    pub const ALL: [Channel; 5] = [
        Channel::R,
        Channel::G,
        Channel::W,
        Channel::B,
        Channel::Grayscale,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Channel::R => "R",
            Channel::G => "G",
            Channel::W => "W",
            Channel::B => "B",
            Channel::Grayscale => "grayscale",
        }
    }

    /// (row, column) offset of the channel's sample lattice in the 2x2 RGBW cell.
    /// `None` for the full-resolution gray-scale channel.
    pub fn lattice_offset(self) -> Option<(usize, usize)> {
        match self {
            Channel::R => Some((0, 0)),
            Channel::G => Some((0, 1)),
            Channel::W => Some((1, 0)),
            Channel::B => Some((1, 1)),
            Channel::Grayscale => None,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Channel {
    type Err = EvError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "R" => Ok(Channel::R),
            "G" => Ok(Channel::G),
            "W" => Ok(Channel::W),
            "B" => Ok(Channel::B),
            "grayscale" => Ok(Channel::Grayscale),
            _ => Err(EvError::UnknownChannel(s.to_string())),
        }
    }
}

/// Per-channel reconstructions in [0, 1], keyed by channel
#[derive(Debug, Clone, Default)]
pub struct ChannelSet {
    channels: HashMap<Channel, Array2<f32>>,
}

impl ChannelSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, channel: Channel, image: Array2<f32>) -> Option<Array2<f32>> {
        self.channels.insert(channel, image)
    }

    /// Insert by channel name ("R", "G", "W", "B" or "grayscale")
    pub fn insert_named(&mut self, name: &str, image: Array2<f32>) -> EvResult<()> {
        let channel = name.parse::<Channel>()?;
        self.channels.insert(channel, image);
        Ok(())
    }

    pub fn with(mut self, channel: Channel, image: Array2<f32>) -> Self {
        self.channels.insert(channel, image);
        self
    }

    pub fn get(&self, channel: Channel) -> Option<&Array2<f32>> {
        self.channels.get(&channel)
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    fn require(&self, channel: Channel) -> EvResult<&Array2<f32>> {
        self.get(channel)
            .ok_or_else(|| EvError::MissingChannel(channel.name().to_string()))
    }
}

/// Cubic convolution weights for the four taps around a sample with fractional offset `t`
fn cubic_weights(t: f64) -> [f64; 4] {
    let a = CUBIC_A;
    let w0 = ((a * (t + 1.0) - 5.0 * a) * (t + 1.0) + 8.0 * a) * (t + 1.0) - 4.0 * a;
    let w1 = ((a + 2.0) * t - (a + 3.0)) * t * t + 1.0;
    let w2 = ((a + 2.0) * (1.0 - t) - (a + 3.0)) * (1.0 - t) * (1.0 - t) + 1.0;
    [w0, w1, w2, 1.0 - w0 - w1 - w2]
}

/// Source taps and weights for every destination index of a x2 upsample along one axis
fn upsample_taps(len: usize) -> Vec<([usize; 4], [f64; 4])> {
    let last = len as isize - 1;
    (0..len * 2)
        .map(|d| {
            let src = (d as f64 + 0.5) * 0.5 - 0.5;
            let base = src.floor();
            let weights = cubic_weights(src - base);
            let base = base as isize;
            let taps = [-1, 0, 1, 2].map(|k| (base + k).clamp(0, last) as usize);
            (taps, weights)
        })
        .collect()
}

/// Upsample by a factor of 2 in both axes with bicubic interpolation (replicated border)
pub fn upsample_bicubic_x2(image: ArrayView2<f32>) -> Array2<f32> {
    let (height, width) = image.dim();
    let cols = upsample_taps(width);
    let rows = upsample_taps(height);

    let mut horizontal = Array2::<f64>::zeros((height, width * 2));
    for (y, src_row) in image.outer_iter().enumerate() {
        for (x, (taps, weights)) in cols.iter().enumerate() {
            horizontal[[y, x]] = taps
                .iter()
                .zip(weights)
                .map(|(&i, w)| src_row[i] as f64 * w)
                .sum();
        }
    }

    Array2::from_shape_fn((height * 2, width * 2), |(y, x)| {
        let (taps, weights) = &rows[y];
        taps.iter()
            .zip(weights)
            .map(|(&i, w)| horizontal[[i, x]] * w)
            .sum::<f64>() as f32
    })
}

/// Shift an image by (dx, dy) pixels. Pixels exposed at the opposite edge are zero-filled.
pub fn shift_image(image: ArrayView2<f32>, dx: isize, dy: isize) -> Array2<f32> {
    let (height, width) = image.dim();
    let mut shifted = Array2::zeros((height, width));

    let (dst_x, src_x) = shift_ranges(width, dx);
    let (dst_y, src_y) = shift_ranges(height, dy);
    if dst_x.is_empty() || dst_y.is_empty() {
        return shifted;
    }

    shifted
        .slice_mut(s![dst_y, dst_x])
        .assign(&image.slice(s![src_y, src_x]));
    shifted
}

fn shift_ranges(len: usize, shift: isize) -> (std::ops::Range<usize>, std::ops::Range<usize>) {
    let offset = shift.unsigned_abs().min(len);
    if shift >= 0 {
        (offset..len, 0..len - offset)
    } else {
        (0..len - offset, offset..len)
    }
}

#[inline]
pub(crate) fn quantize(v: f32) -> u8 {
    (255.0 * v).round().clamp(0.0, 255.0) as u8
}

/// Fuses gray-scale detail with RGBW chroma into a full-resolution BGR image
#[derive(Debug, Clone, Copy, Default)]
pub struct ColorChannelCompositor {
    pub colorspace: Colorspace,
}

impl ColorChannelCompositor {
    pub fn new(colorspace: Colorspace) -> Self {
        Self { colorspace }
    }

    /// Compose a BGR image at the gray-scale resolution
    pub fn compose(&self, channels: &ChannelSet) -> EvResult<BgrImage> {
        let grayscale = channels.require(Channel::Grayscale)?;
        let (height, width) = grayscale.dim();
        if height == 0 || width == 0 {
            return Err(EvError::InvalidArgument(format!(
                "grayscale channel must not be empty, got {width}x{height}"
            )));
        }
        if height % 2 != 0 || width % 2 != 0 {
            return Err(EvError::InvalidArgument(format!(
                "grayscale channel must have even dimensions, got {width}x{height}"
            )));
        }
        let expected = (height / 2, width / 2);

        let mut aligned = HashMap::with_capacity(4);
        for channel in Channel::COLOR {
            let image = channels.require(channel)?;
            if image.dim() != expected {
                return Err(EvError::ChannelShapeMismatch {
                    channel: channel.name().to_string(),
                    expected,
                    actual: image.dim(),
                });
            }
            let upsampled = upsample_bicubic_x2(image.view());
            let (dy, dx) = channel.lattice_offset().unwrap_or((0, 0));
            let shifted = if (dx, dy) == (0, 0) {
                upsampled
            } else {
                shift_image(upsampled.view(), dx as isize, dy as isize)
            };
            aligned.insert(channel, shifted);
        }

        debug!(width, height, colorspace = %self.colorspace, "Composing color image");
        let [r, g, w, b] = Channel::COLOR.map(|c| &aligned[&c]);
        Ok(self.fuse(grayscale.view(), r.view(), g.view(), w.view(), b.view()))
    }

    fn fuse(
        &self,
        grayscale: ArrayView2<f32>,
        r: ArrayView2<f32>,
        g: ArrayView2<f32>,
        w: ArrayView2<f32>,
        b: ArrayView2<f32>,
    ) -> BgrImage {
        let (height, width) = grayscale.dim();
        let mut bgr = Array3::zeros((height, width, 3));
        for y in 0..height {
            for x in 0..width {
                let low = [
                    quantize(b[[y, x]]),
                    quantize(0.5 * (g[[y, x]] + w[[y, x]])),
                    quantize(r[[y, x]]),
                ];
                let fused = self
                    .colorspace
                    .substitute_lightness(low, quantize(grayscale[[y, x]]));
                for (c, value) in fused.into_iter().enumerate() {
                    bgr[[y, x, c]] = value;
                }
            }
        }
        bgr
    }
}

/// Combine a full-resolution gray-scale reconstruction and four half-resolution color
/// reconstructions into a full-resolution BGR image
pub fn merge_channels_into_color_image(
    channels: &ChannelSet,
    colorspace: Colorspace,
) -> EvResult<BgrImage> {
    ColorChannelCompositor::new(colorspace).compose(channels)
}

/// Extract the RGBW sub-lattice of a `(bins, height, width)` tensor feeding `channel`
pub fn subsample_channel(tensor: ArrayView3<f32>, channel: Channel) -> Array3<f32> {
    match channel.lattice_offset() {
        Some((row, col)) => tensor.slice(s![.., row..;2, col..;2]).to_owned(),
        None => tensor.to_owned(),
    }
}
