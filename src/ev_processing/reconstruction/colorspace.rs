// 8-bit lightness-separable colorspaces used for luminance substitution
// Conventions follow the common 8-bit encoding: Lab L in [0, 255] with a, b offset by 128;
// HSV/HLS hue halved to [0, 180), saturation/value/lightness in [0, 255]

use crate::ev_core::EvError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Colorspace in which the gray-scale image replaces the lightness channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Colorspace {
    #[default]
    #[serde(rename = "LAB")]
    Lab,
    #[serde(rename = "HSV")]
    Hsv,
    #[serde(rename = "HLS")]
    Hls,
}

impl FromStr for Colorspace {
    type Err = EvError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "LAB" => Ok(Colorspace::Lab),
            "HSV" => Ok(Colorspace::Hsv),
            "HLS" => Ok(Colorspace::Hls),
            _ => Err(EvError::UnknownColorspace(s.to_string())),
        }
    }
}

impl fmt::Display for Colorspace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Colorspace::Lab => "LAB",
            Colorspace::Hsv => "HSV",
            Colorspace::Hls => "HLS",
        };
        write!(f, "{name}")
    }
}

// sRGB (D65) <-> XYZ
const RGB_TO_XYZ: [[f64; 3]; 3] = [
    [0.412453, 0.357580, 0.180423],
    [0.212671, 0.715160, 0.072169],
    [0.019334, 0.119193, 0.950227],
];
const XYZ_TO_RGB: [[f64; 3]; 3] = [
    [3.240479, -1.537150, -0.498535],
    [-0.969256, 1.875991, 0.041556],
    [0.055648, -0.204043, 1.057311],
];
const WHITE_X: f64 = 0.950456;
const WHITE_Z: f64 = 1.088754;
const LAB_EPSILON: f64 = 0.008856;
const LAB_KAPPA: f64 = 903.3;

impl Colorspace {
    /// Index of the lightness (Lab, HLS) or value (HSV) channel
    pub fn lightness_channel(self) -> usize {
        match self {
            Colorspace::Lab => 0,
            Colorspace::Hls => 1,
            Colorspace::Hsv => 2,
        }
    }

    /// Convert one BGR pixel into this colorspace
    pub fn from_bgr(self, bgr: [u8; 3]) -> [u8; 3] {
        match self {
            Colorspace::Lab => bgr_to_lab(bgr),
            Colorspace::Hsv => bgr_to_hsv(bgr),
            Colorspace::Hls => bgr_to_hls(bgr),
        }
    }

    /// Convert one pixel of this colorspace back to BGR
    pub fn to_bgr(self, pixel: [u8; 3]) -> [u8; 3] {
        match self {
            Colorspace::Lab => lab_to_bgr(pixel),
            Colorspace::Hsv => hsv_to_bgr(pixel),
            Colorspace::Hls => hls_to_bgr(pixel),
        }
    }

    /// Replace the lightness of a BGR pixel, keeping its chroma
    pub fn substitute_lightness(self, bgr: [u8; 3], lightness: u8) -> [u8; 3] {
        let mut pixel = self.from_bgr(bgr);
        pixel[self.lightness_channel()] = lightness;
        self.to_bgr(pixel)
    }
}

#[inline]
fn to_u8(v: f64) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

#[inline]
fn unit_rgb(bgr: [u8; 3]) -> (f64, f64, f64) {
    (
        bgr[2] as f64 / 255.0,
        bgr[1] as f64 / 255.0,
        bgr[0] as f64 / 255.0,
    )
}

#[inline]
fn unit_to_bgr(r: f64, g: f64, b: f64) -> [u8; 3] {
    [to_u8(b * 255.0), to_u8(g * 255.0), to_u8(r * 255.0)]
}

/// Hue in degrees [0, 360) of an RGB triple with the given max and chroma
fn hue_degrees(r: f64, g: f64, b: f64, max: f64, diff: f64) -> f64 {
    if diff <= 0.0 {
        return 0.0;
    }
    let h = if max == r {
        60.0 * (g - b) / diff
    } else if max == g {
        120.0 + 60.0 * (b - r) / diff
    } else {
        240.0 + 60.0 * (r - g) / diff
    };
    if h < 0.0 {
        h + 360.0
    } else {
        h
    }
}

fn encode_hue(degrees: f64) -> u8 {
    let h = (degrees / 2.0).round();
    if h >= 180.0 {
        (h - 180.0) as u8
    } else {
        h as u8
    }
}

fn bgr_to_hsv(bgr: [u8; 3]) -> [u8; 3] {
    let (r, g, b) = unit_rgb(bgr);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let diff = max - min;
    let s = if max > 0.0 { diff / max } else { 0.0 };
    let h = hue_degrees(r, g, b, max, diff);
    [encode_hue(h), to_u8(s * 255.0), to_u8(max * 255.0)]
}

fn hsv_to_bgr(hsv: [u8; 3]) -> [u8; 3] {
    let h = (hsv[0] as f64 * 2.0 / 60.0).rem_euclid(6.0);
    let s = hsv[1] as f64 / 255.0;
    let v = hsv[2] as f64 / 255.0;

    let sector = h.floor();
    let f = h - sector;
    let p = v * (1.0 - s);
    let q = v * (1.0 - s * f);
    let t = v * (1.0 - s * (1.0 - f));

    let (r, g, b) = match sector as u8 {
        0 => (v, t, p),
        1 => (q, v, p),
        2 => (p, v, t),
        3 => (p, q, v),
        4 => (t, p, v),
        _ => (v, p, q),
    };
    unit_to_bgr(r, g, b)
}

fn bgr_to_hls(bgr: [u8; 3]) -> [u8; 3] {
    let (r, g, b) = unit_rgb(bgr);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let diff = max - min;
    let l = (max + min) / 2.0;

    let s = if diff <= 0.0 {
        0.0
    } else if l < 0.5 {
        diff / (max + min)
    } else {
        diff / (2.0 - max - min)
    };
    let h = hue_degrees(r, g, b, max, diff);
    [encode_hue(h), to_u8(l * 255.0), to_u8(s * 255.0)]
}

fn hls_to_bgr(hls: [u8; 3]) -> [u8; 3] {
    let h = (hls[0] as f64 * 2.0 / 60.0).rem_euclid(6.0);
    let l = hls[1] as f64 / 255.0;
    let s = hls[2] as f64 / 255.0;

    if s == 0.0 {
        return unit_to_bgr(l, l, l);
    }

    let p2 = if l <= 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let p1 = 2.0 * l - p2;
    let channel = |h: f64| {
        let h = h.rem_euclid(6.0);
        if h < 1.0 {
            p1 + (p2 - p1) * h
        } else if h < 3.0 {
            p2
        } else if h < 4.0 {
            p1 + (p2 - p1) * (4.0 - h)
        } else {
            p1
        }
    };
    unit_to_bgr(channel(h + 2.0), channel(h), channel(h - 2.0))
}

#[inline]
fn srgb_to_linear(c: f64) -> f64 {
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

#[inline]
fn linear_to_srgb(c: f64) -> f64 {
    let c = c.clamp(0.0, 1.0);
    if c <= 0.0031308 {
        12.92 * c
    } else {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    }
}

#[inline]
fn lab_f(t: f64) -> f64 {
    if t > LAB_EPSILON {
        t.cbrt()
    } else {
        7.787 * t + 16.0 / 116.0
    }
}

#[inline]
fn lab_f_inv(t: f64) -> f64 {
    if t > LAB_EPSILON.cbrt() {
        t * t * t
    } else {
        (t - 16.0 / 116.0) / 7.787
    }
}

fn mat_mul(m: &[[f64; 3]; 3], v: [f64; 3]) -> [f64; 3] {
    [
        m[0][0] * v[0] + m[0][1] * v[1] + m[0][2] * v[2],
        m[1][0] * v[0] + m[1][1] * v[1] + m[1][2] * v[2],
        m[2][0] * v[0] + m[2][1] * v[1] + m[2][2] * v[2],
    ]
}

fn bgr_to_lab(bgr: [u8; 3]) -> [u8; 3] {
    let (r, g, b) = unit_rgb(bgr);
    let linear = [srgb_to_linear(r), srgb_to_linear(g), srgb_to_linear(b)];
    let [x, y, z] = mat_mul(&RGB_TO_XYZ, linear);

    let fx = lab_f(x / WHITE_X);
    let fy = lab_f(y);
    let fz = lab_f(z / WHITE_Z);

    let l = if y > LAB_EPSILON {
        116.0 * fy - 16.0
    } else {
        LAB_KAPPA * y
    };
    let a = 500.0 * (fx - fy);
    let b = 200.0 * (fy - fz);

    [to_u8(l * 255.0 / 100.0), to_u8(a + 128.0), to_u8(b + 128.0)]
}

fn lab_to_bgr(lab: [u8; 3]) -> [u8; 3] {
    let l = lab[0] as f64 * 100.0 / 255.0;
    let a = lab[1] as f64 - 128.0;
    let b = lab[2] as f64 - 128.0;

    let (y, fy) = if l > LAB_KAPPA * LAB_EPSILON {
        let fy = (l + 16.0) / 116.0;
        (fy * fy * fy, fy)
    } else {
        let y = l / LAB_KAPPA;
        (y, 7.787 * y + 16.0 / 116.0)
    };
    let x = lab_f_inv(fy + a / 500.0) * WHITE_X;
    let z = lab_f_inv(fy - b / 200.0) * WHITE_Z;

    let [r, g, b] = mat_mul(&XYZ_TO_RGB, [x, y, z]);
    unit_to_bgr(linear_to_srgb(r), linear_to_srgb(g), linear_to_srgb(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Colorspace; 3] = [Colorspace::Lab, Colorspace::Hsv, Colorspace::Hls];

    #[test]
    fn test_parse_colorspace() {
        assert_eq!("LAB".parse::<Colorspace>().unwrap(), Colorspace::Lab);
        assert_eq!("hsv".parse::<Colorspace>().unwrap(), Colorspace::Hsv);
        assert_eq!("Hls".parse::<Colorspace>().unwrap(), Colorspace::Hls);
        assert!(matches!(
            "YUV".parse::<Colorspace>(),
            Err(EvError::UnknownColorspace(_))
        ));
        assert_eq!(Colorspace::Hls.to_string(), "HLS");
    }

    #[test]
    fn test_hsv_primaries() {
        assert_eq!(bgr_to_hsv([0, 0, 255]), [0, 255, 255]);
        assert_eq!(bgr_to_hsv([0, 255, 0]), [60, 255, 255]);
        assert_eq!(bgr_to_hsv([255, 0, 0]), [120, 255, 255]);
        assert_eq!(bgr_to_hsv([0, 0, 0]), [0, 0, 0]);
        for bgr in [[0, 0, 255], [0, 255, 0], [255, 0, 0], [255, 255, 0]] {
            assert_eq!(hsv_to_bgr(bgr_to_hsv(bgr)), bgr);
        }
    }

    #[test]
    fn test_hls_primaries() {
        assert_eq!(bgr_to_hls([0, 0, 255]), [0, 128, 255]);
        assert_eq!(bgr_to_hls([255, 255, 255]), [0, 255, 0]);
        // L of a primary is 127.5 before quantization
        for bgr in [[0, 0, 255], [0, 255, 0], [255, 0, 0], [0, 255, 255]] {
            let back = hls_to_bgr(bgr_to_hls(bgr));
            for (a, b) in back.iter().zip(bgr.iter()) {
                assert!((*a as i32 - *b as i32).abs() <= 1, "{bgr:?} -> {back:?}");
            }
        }
    }

    #[test]
    fn test_lab_extremes() {
        assert_eq!(bgr_to_lab([255, 255, 255]), [255, 128, 128]);
        assert_eq!(bgr_to_lab([0, 0, 0]), [0, 128, 128]);
        let white = lab_to_bgr([255, 128, 128]);
        assert!(white.iter().all(|&c| c >= 254));
        assert_eq!(lab_to_bgr([0, 128, 128]), [0, 0, 0]);
    }

    #[test]
    fn test_neutral_grays_stay_neutral() {
        for space in ALL {
            for level in [0u8, 17, 64, 128, 200, 255] {
                let pixel = space.from_bgr([level, level, level]);
                let back = space.to_bgr(pixel);
                for c in back {
                    assert!((c as i32 - level as i32).abs() <= 1, "{space}: {level} -> {back:?}");
                }
            }
        }
    }

    #[test]
    fn test_substitute_lightness_keeps_gray_neutral() {
        for space in ALL {
            let out = space.substitute_lightness([128, 128, 128], 200);
            assert!((out[0] as i32 - out[1] as i32).abs() <= 1);
            assert!((out[1] as i32 - out[2] as i32).abs() <= 1);
        }
        // HSV value replacement on a gray pixel is exact
        assert_eq!(
            Colorspace::Hsv.substitute_lightness([128, 128, 128], 77),
            [77, 77, 77]
        );
    }

    #[test]
    fn test_substitute_lightness_darkens_color() {
        let red = [30, 30, 220];
        for space in ALL {
            let darker = space.substitute_lightness(red, 40);
            assert!(darker[2] >= darker[0], "{space}: {darker:?}");
            assert!(darker[2] < red[2], "{space}: {darker:?}");
        }
    }
}
