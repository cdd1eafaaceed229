use std::fmt;
use std::str::FromStr;

use crate::color::{Hsbk, DEFAULT_KELVIN};
use crate::error::{LifxError, Result};

/// A user supplied color, parsed once at the edge and turned into one [`Hsbk`].
///
/// Accepted forms:
///
/// - a palette name: `red`, `warm_white`, `daylight`
/// - hex: `#ff8800` or `ff8800`
/// - `rgb(255, 136, 0)`
/// - `hsb(30, 100%, 80%)`
/// - `hsbk(30, 100, 80, 3500)`
/// - `kelvin(2700)` or `kelvin(2700, 60%)`
#[derive(Debug, Clone, PartialEq)]
pub enum ColorSpec {
    Named(String),
    Hex(String),
    Rgb(u8, u8, u8),
    Hsb {
        hue: f64,
        saturation: f64,
        brightness: f64,
    },
    Hsbk {
        hue: f64,
        saturation: f64,
        brightness: f64,
        kelvin: u16,
    },
    Kelvin {
        kelvin: u16,
        brightness: f64,
    },
}

fn parse_number(raw: &str, whole: &str) -> Result<f64> {
    raw.trim()
        .trim_end_matches('%')
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or_else(|| LifxError::InvalidColor(whole.to_string()))
}

fn parse_percent(raw: &str, whole: &str) -> Result<f64> {
    let value = parse_number(raw, whole)?;
    if !(0.0..=100.0).contains(&value) {
        return Err(LifxError::InvalidColor(whole.to_string()));
    }
    Ok(value / 100.0)
}

fn parse_channel(raw: &str, whole: &str) -> Result<u8> {
    raw.trim()
        .parse::<u8>()
        .map_err(|_| LifxError::InvalidColor(whole.to_string()))
}

fn parse_kelvin(raw: &str, whole: &str) -> Result<u16> {
    raw.trim()
        .trim_end_matches(['k', 'K'])
        .parse::<u16>()
        .map_err(|_| LifxError::InvalidColor(whole.to_string()))
}

impl FromStr for ColorSpec {
    type Err = LifxError;

    fn from_str(s: &str) -> Result<Self> {
        let text = s.trim();
        if text.is_empty() {
            return Err(LifxError::InvalidColor(s.to_string()));
        }

        if let Some((function, rest)) = text.split_once('(') {
            let body = rest
                .strip_suffix(')')
                .ok_or_else(|| LifxError::InvalidColor(s.to_string()))?;
            let args: Vec<&str> = body.split(',').collect();
            return match (function.trim().to_lowercase().as_str(), args.as_slice()) {
                ("rgb", [r, g, b]) => Ok(ColorSpec::Rgb(
                    parse_channel(r, s)?,
                    parse_channel(g, s)?,
                    parse_channel(b, s)?,
                )),
                ("hsb", [h, sat, bri]) => Ok(ColorSpec::Hsb {
                    hue: parse_number(h, s)?,
                    saturation: parse_percent(sat, s)?,
                    brightness: parse_percent(bri, s)?,
                }),
                ("hsbk", [h, sat, bri, k]) => Ok(ColorSpec::Hsbk {
                    hue: parse_number(h, s)?,
                    saturation: parse_percent(sat, s)?,
                    brightness: parse_percent(bri, s)?,
                    kelvin: parse_kelvin(k, s)?,
                }),
                ("kelvin", [k]) => Ok(ColorSpec::Kelvin {
                    kelvin: parse_kelvin(k, s)?,
                    brightness: 1.0,
                }),
                ("kelvin", [k, bri]) => Ok(ColorSpec::Kelvin {
                    kelvin: parse_kelvin(k, s)?,
                    brightness: parse_percent(bri, s)?,
                }),
                _ => Err(LifxError::InvalidColor(s.to_string())),
            };
        }

        if Hsbk::from_name(text).is_ok() {
            return Ok(ColorSpec::Named(text.to_lowercase()));
        }

        let digits = text.trim_start_matches('#');
        if digits.len() == 6 && digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Ok(ColorSpec::Hex(digits.to_lowercase()));
        }

        Err(LifxError::InvalidColor(s.to_string()))
    }
}

impl ColorSpec {
    pub fn to_hsbk(&self) -> Result<Hsbk> {
        match self {
            ColorSpec::Named(name) => Hsbk::from_name(name),
            ColorSpec::Hex(digits) => Hsbk::from_hex(digits),
            ColorSpec::Rgb(r, g, b) => Ok(Hsbk::from_rgb(*r, *g, *b)),
            ColorSpec::Hsb {
                hue,
                saturation,
                brightness,
            } => Ok(Hsbk::from_degrees(
                *hue,
                *saturation,
                *brightness,
                DEFAULT_KELVIN,
            )),
            ColorSpec::Hsbk {
                hue,
                saturation,
                brightness,
                kelvin,
            } => Ok(Hsbk::from_degrees(*hue, *saturation, *brightness, *kelvin)),
            ColorSpec::Kelvin { kelvin, brightness } => {
                Ok(Hsbk::from_degrees(0.0, 0.0, *brightness, *kelvin))
            }
        }
    }
}

impl fmt::Display for ColorSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColorSpec::Named(name) => write!(f, "{}", name),
            ColorSpec::Hex(digits) => write!(f, "#{}", digits),
            ColorSpec::Rgb(r, g, b) => write!(f, "rgb({}, {}, {})", r, g, b),
            ColorSpec::Hsb {
                hue,
                saturation,
                brightness,
            } => write!(
                f,
                "hsb({}, {}%, {}%)",
                hue,
                saturation * 100.0,
                brightness * 100.0
            ),
            ColorSpec::Hsbk {
                hue,
                saturation,
                brightness,
                kelvin,
            } => write!(
                f,
                "hsbk({}, {}%, {}%, {})",
                hue,
                saturation * 100.0,
                brightness * 100.0,
                kelvin
            ),
            ColorSpec::Kelvin { kelvin, brightness } => {
                write!(f, "kelvin({}, {}%)", kelvin, brightness * 100.0)
            }
        }
    }
}
