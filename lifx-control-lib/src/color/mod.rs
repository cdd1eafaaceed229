use std::fmt;

use palette::{FromColor, Hsv, Srgb};
use serde::{Deserialize, Serialize};

use crate::error::{LifxError, Result};

pub mod spec;

pub use spec::ColorSpec;

pub const KELVIN_MIN: u16 = 1500;
pub const KELVIN_MAX: u16 = 9000;
pub const DEFAULT_KELVIN: u16 = 3500;

/// A color as the bulbs understand it: hue, saturation, brightness and kelvin,
/// each a raw 16-bit channel.
///
/// Hue is circular over 0..=65535 (0-360 degrees). Saturation and brightness
/// map 0..=65535 onto 0-100%. Kelvin is only meaningful when saturation is low.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Hsbk {
    pub hue: u16,
    pub saturation: u16,
    pub brightness: u16,
    pub kelvin: u16,
}

// (name, hue degrees, saturation, brightness, kelvin)
const NAMED_COLORS: &[(&str, f64, f64, f64, u16)] = &[
    ("red", 0.0, 1.0, 1.0, DEFAULT_KELVIN),
    ("orange", 30.0, 1.0, 1.0, DEFAULT_KELVIN),
    ("yellow", 60.0, 1.0, 1.0, DEFAULT_KELVIN),
    ("lime", 90.0, 1.0, 1.0, DEFAULT_KELVIN),
    ("green", 120.0, 1.0, 1.0, DEFAULT_KELVIN),
    ("teal", 150.0, 1.0, 1.0, DEFAULT_KELVIN),
    ("cyan", 180.0, 1.0, 1.0, DEFAULT_KELVIN),
    ("sky", 210.0, 1.0, 1.0, DEFAULT_KELVIN),
    ("blue", 240.0, 1.0, 1.0, DEFAULT_KELVIN),
    ("purple", 270.0, 1.0, 1.0, DEFAULT_KELVIN),
    ("magenta", 300.0, 1.0, 1.0, DEFAULT_KELVIN),
    ("pink", 330.0, 1.0, 1.0, DEFAULT_KELVIN),
    ("white", 0.0, 0.0, 1.0, DEFAULT_KELVIN),
    ("warm_white", 0.0, 0.0, 1.0, 2700),
    ("cool_white", 0.0, 0.0, 1.0, 6500),
    // whites used as presets by front ends
    ("warm", 0.0, 0.0, 1.0, 2700),
    ("neutral", 0.0, 0.0, 1.0, 4000),
    ("cool", 0.0, 0.0, 1.0, 5500),
    ("daylight", 0.0, 0.0, 1.0, 6500),
];

fn fraction_to_u16(value: f64) -> u16 {
    (value.clamp(0.0, 1.0) * 65535.0).round() as u16
}

impl Hsbk {
    pub const BLACK: Hsbk = Hsbk::new(0, 0, 0, DEFAULT_KELVIN);

    pub const fn new(hue: u16, saturation: u16, brightness: u16, kelvin: u16) -> Self {
        Hsbk {
            hue,
            saturation,
            brightness,
            kelvin,
        }
    }

    /// Builds a color from degrees and 0-1 fractions. Out of range fractions
    /// are clamped, hue wraps and kelvin is clamped to 1500-9000.
    pub fn from_degrees(hue: f64, saturation: f64, brightness: f64, kelvin: u16) -> Self {
        let hue = ((hue.rem_euclid(360.0) / 360.0 * 65536.0).round() as u32 % 65536) as u16;
        Hsbk {
            hue,
            saturation: fraction_to_u16(saturation),
            brightness: fraction_to_u16(brightness),
            kelvin: kelvin.clamp(KELVIN_MIN, KELVIN_MAX),
        }
    }

    /// Returns (hue degrees, saturation fraction, brightness fraction).
    pub fn to_degrees(&self) -> (f64, f64, f64) {
        (
            self.hue as f64 * 360.0 / 65536.0,
            self.saturation as f64 / 65535.0,
            self.brightness as f64 / 65535.0,
        )
    }

    pub fn from_rgb(red: u8, green: u8, blue: u8) -> Self {
        let rgb: Srgb<f32> = Srgb::new(red, green, blue).into_format();
        let hsv: Hsv = Hsv::from_color(rgb);
        Hsbk::from_degrees(
            hsv.hue.into_positive_degrees() as f64,
            hsv.saturation as f64,
            hsv.value as f64,
            DEFAULT_KELVIN,
        )
    }

    pub fn to_rgb(&self) -> (u8, u8, u8) {
        let (hue, saturation, brightness) = self.to_degrees();
        let hsv: Hsv = Hsv::new(hue as f32, saturation as f32, brightness as f32);
        let rgb: Srgb = Srgb::from_color(hsv);
        let rgb: Srgb<u8> = rgb.into_format();
        rgb.into_components()
    }

    /// Parses `rrggbb` with or without a leading `#`.
    pub fn from_hex(value: &str) -> Result<Self> {
        let digits = value.trim().trim_start_matches('#');
        if digits.len() != 6 {
            return Err(LifxError::InvalidColor(value.to_string()));
        }
        let bytes = hex::decode(digits).map_err(|_| LifxError::InvalidColor(value.to_string()))?;
        Ok(Hsbk::from_rgb(bytes[0], bytes[1], bytes[2]))
    }

    pub fn to_hex(&self) -> String {
        let (r, g, b) = self.to_rgb();
        format!("#{}", hex::encode([r, g, b]))
    }

    /// Looks a color up in the named palette, ignoring case.
    pub fn from_name(name: &str) -> Result<Self> {
        let wanted = name.trim().to_lowercase().replace(['-', ' '], "_");
        NAMED_COLORS
            .iter()
            .find(|(candidate, ..)| *candidate == wanted)
            .map(|&(_, h, s, b, k)| Hsbk::from_degrees(h, s, b, k))
            .ok_or_else(|| LifxError::InvalidColor(name.to_string()))
    }

    pub fn names() -> impl Iterator<Item = &'static str> {
        NAMED_COLORS.iter().map(|(name, ..)| *name)
    }

    pub fn with_brightness(self, brightness: f64) -> Self {
        Hsbk {
            brightness: fraction_to_u16(brightness),
            ..self
        }
    }

    /// Scales the brightness channel by `factor`.
    pub fn dimmed(self, factor: f64) -> Self {
        Hsbk {
            brightness: (self.brightness as f64 * factor.clamp(0.0, 1.0)).round() as u16,
            ..self
        }
    }
}

impl fmt::Display for Hsbk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (h, s, b) = self.to_degrees();
        write!(
            f,
            "hue {:.0}°, saturation {:.0}%, brightness {:.0}%, {}K",
            h,
            s * 100.0,
            b * 100.0,
            self.kelvin
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HUE_STEP: f64 = 65535.0 / 360.0;

    #[test]
    fn test_from_rgb_red() {
        let color = Hsbk::from_rgb(255, 0, 0);
        assert_eq!(color.hue, 0);
        assert_eq!(color.saturation, 65535);
        assert_eq!(color.brightness, 65535);
        assert_eq!(color.kelvin, DEFAULT_KELVIN);
    }

    #[test]
    fn test_from_hex_green() {
        let color = Hsbk::from_hex("#00FF00").unwrap();
        let (hue, saturation, _) = color.to_degrees();
        assert!((hue - 120.0).abs() < 0.5, "hue was {}", hue);
        assert!((saturation - 1.0).abs() < 1e-6);
        assert_eq!(Hsbk::from_hex("00ff00").unwrap(), color);
    }

    #[test]
    fn test_from_hex_rejects_garbage() {
        assert!(Hsbk::from_hex("#12345").is_err());
        assert!(Hsbk::from_hex("zzzzzz").is_err());
        assert!(Hsbk::from_hex("").is_err());
    }

    #[test]
    fn test_degrees_round_trip_within_one_step() {
        for &(h, s, b) in &[
            (0.0, 0.0, 0.0),
            (120.0, 0.5, 0.25),
            (359.9, 1.0, 1.0),
            (200.5, 0.33, 0.66),
        ] {
            let color = Hsbk::from_degrees(h, s, b, 4000);
            let (h2, s2, b2) = color.to_degrees();
            let hue_diff = (h - h2).abs().min(360.0 - (h - h2).abs());
            assert!(hue_diff * HUE_STEP <= HUE_STEP, "hue {} -> {}", h, h2);
            assert!((s - s2).abs() * 65535.0 <= 1.0);
            assert!((b - b2).abs() * 65535.0 <= 1.0);
        }
    }

    #[test]
    fn test_from_degrees_wraps_and_clamps() {
        assert_eq!(Hsbk::from_degrees(360.0, 1.0, 1.0, 3500).hue, 0);
        assert_eq!(Hsbk::from_degrees(-90.0, 1.0, 1.0, 3500).hue, 49152);
        assert_eq!(Hsbk::from_degrees(0.0, 2.0, -1.0, 100).saturation, 65535);
        assert_eq!(Hsbk::from_degrees(0.0, 2.0, -1.0, 100).brightness, 0);
        assert_eq!(Hsbk::from_degrees(0.0, 0.0, 0.0, 100).kelvin, KELVIN_MIN);
        assert_eq!(Hsbk::from_degrees(0.0, 0.0, 0.0, 12000).kelvin, KELVIN_MAX);
    }

    #[test]
    fn test_named_colors_case_insensitive() {
        let blue = Hsbk::from_name("Blue").unwrap();
        assert_eq!(blue, Hsbk::from_degrees(240.0, 1.0, 1.0, 3500));
        assert_eq!(Hsbk::from_name("WARM_WHITE").unwrap().kelvin, 2700);
        assert_eq!(Hsbk::from_name("cool white").unwrap().kelvin, 6500);
        assert!(matches!(
            Hsbk::from_name("octarine"),
            Err(LifxError::InvalidColor(_))
        ));
    }

    #[test]
    fn test_to_rgb_primary_colors() {
        assert_eq!(Hsbk::from_rgb(0, 0, 255).to_rgb(), (0, 0, 255));
        assert_eq!(Hsbk::from_name("white").unwrap().to_hex(), "#ffffff");
    }

    #[test]
    fn test_dimmed() {
        let color = Hsbk::new(100, 200, 60000, 3500);
        assert_eq!(color.dimmed(0.5).brightness, 30000);
        assert_eq!(color.dimmed(0.5).hue, 100);
        assert_eq!(color.with_brightness(0.0).brightness, 0);
    }
}
