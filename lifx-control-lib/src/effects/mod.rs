//! Lighting effects.
//!
//! Three families share one control surface:
//!
//! * waveform effects are a single SetWaveform packet the bulb runs itself,
//! * software effects are color trajectories computed here and streamed one
//!   frame per tick,
//! * firmware tile effects start a matrix animation on the device and turn it
//!   off again when the session ends.
//!
//! [`EffectEngine`] owns the running sessions.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use clap::ValueEnum;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;

use crate::color::{Hsbk, DEFAULT_KELVIN};
use crate::error::LifxError;

pub mod engine;
pub mod matrix;
pub mod software;

pub use engine::{EffectEngine, SessionHandle};

const MIN_TICK: Duration = Duration::from_millis(20);
const TICKS_PER_PERIOD: u32 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum EffectKind {
    Pulse,
    Breathe,
    Strobe,
    Saw,
    Triangle,
    Rainbow,
    Candle,
    Disco,
    Sunrise,
    Sunset,
    Police,
    Party,
    Relax,
    #[value(name = "matrix_rainbow")]
    MatrixRainbow,
    #[value(name = "matrix_wave")]
    MatrixWave,
    #[value(name = "matrix_flame")]
    MatrixFlame,
    #[value(name = "matrix_morph")]
    MatrixMorph,
    #[value(name = "matrix_sky")]
    MatrixSky,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectFamily {
    /// Run by the bulb from one SetWaveform packet.
    Waveform,
    /// Frames computed and sent by the host.
    Software,
    /// Matrix animation run by device firmware.
    Firmware,
}

impl EffectKind {
    pub const ALL: [EffectKind; 18] = [
        EffectKind::Pulse,
        EffectKind::Breathe,
        EffectKind::Strobe,
        EffectKind::Saw,
        EffectKind::Triangle,
        EffectKind::Rainbow,
        EffectKind::Candle,
        EffectKind::Disco,
        EffectKind::Sunrise,
        EffectKind::Sunset,
        EffectKind::Police,
        EffectKind::Party,
        EffectKind::Relax,
        EffectKind::MatrixRainbow,
        EffectKind::MatrixWave,
        EffectKind::MatrixFlame,
        EffectKind::MatrixMorph,
        EffectKind::MatrixSky,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            EffectKind::Pulse => "pulse",
            EffectKind::Breathe => "breathe",
            EffectKind::Strobe => "strobe",
            EffectKind::Saw => "saw",
            EffectKind::Triangle => "triangle",
            EffectKind::Rainbow => "rainbow",
            EffectKind::Candle => "candle",
            EffectKind::Disco => "disco",
            EffectKind::Sunrise => "sunrise",
            EffectKind::Sunset => "sunset",
            EffectKind::Police => "police",
            EffectKind::Party => "party",
            EffectKind::Relax => "relax",
            EffectKind::MatrixRainbow => "matrix_rainbow",
            EffectKind::MatrixWave => "matrix_wave",
            EffectKind::MatrixFlame => "matrix_flame",
            EffectKind::MatrixMorph => "matrix_morph",
            EffectKind::MatrixSky => "matrix_sky",
        }
    }

    pub fn family(&self) -> EffectFamily {
        match self {
            EffectKind::Pulse
            | EffectKind::Breathe
            | EffectKind::Strobe
            | EffectKind::Saw
            | EffectKind::Triangle => EffectFamily::Waveform,
            EffectKind::MatrixMorph | EffectKind::MatrixSky => EffectFamily::Firmware,
            _ => EffectFamily::Software,
        }
    }

    /// Needs a device with a pixel grid.
    pub fn is_matrix(&self) -> bool {
        matches!(
            self,
            EffectKind::MatrixRainbow
                | EffectKind::MatrixWave
                | EffectKind::MatrixFlame
                | EffectKind::MatrixMorph
                | EffectKind::MatrixSky
        )
    }

    pub fn list(matrix_only: bool) -> Vec<EffectKind> {
        EffectKind::ALL
            .iter()
            .copied()
            .filter(|kind| !matrix_only || kind.is_matrix())
            .collect()
    }

    /// Builds the frame generator for a software effect. `None` for the
    /// waveform and firmware families.
    pub fn software_effect(&self, seed: u64) -> Option<Box<dyn Effect>> {
        let rng = StdRng::seed_from_u64(seed);
        let effect: Box<dyn Effect> = match self {
            EffectKind::Rainbow => Box::new(software::Rainbow),
            EffectKind::Police => Box::new(software::Police),
            EffectKind::Relax => Box::new(software::Relax),
            EffectKind::Sunrise => Box::new(software::Daybreak::sunrise()),
            EffectKind::Sunset => Box::new(software::Daybreak::sunset()),
            EffectKind::Disco => Box::new(software::Disco::new(rng)),
            EffectKind::Party => Box::new(software::Party::new(rng)),
            EffectKind::Candle => Box::new(software::Candle::new(rng)),
            EffectKind::MatrixRainbow => Box::new(matrix::MatrixRainbow),
            EffectKind::MatrixWave => Box::new(matrix::MatrixWave),
            EffectKind::MatrixFlame => Box::new(matrix::MatrixFlame::new(rng)),
            _ => return None,
        };
        Some(effect)
    }
}

impl fmt::Display for EffectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EffectKind {
    type Err = LifxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace('-', "_");
        EffectKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.name() == wanted)
            .ok_or_else(|| LifxError::UnknownEffect(s.to_string()))
    }
}

/// Knobs shared by every effect. Not every effect reads every field.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectParams {
    pub period: Duration,
    /// Number of periods to run, 0 or less runs until stopped.
    pub cycles: f32,
    /// 0-1.
    pub brightness: f64,
    /// 0-1.
    pub saturation: f64,
    pub kelvin: u16,
    /// Put the device back to its previous color when the effect ends.
    pub transient: bool,
    /// Waveform duty cycle, 0-1.
    pub duty_cycle: f64,
    /// Overrides the computed waveform target color.
    pub color: Option<Hsbk>,
}

impl Default for EffectParams {
    fn default() -> Self {
        EffectParams {
            period: Duration::from_millis(1000),
            cycles: 10.0,
            brightness: 1.0,
            saturation: 1.0,
            kelvin: DEFAULT_KELVIN,
            transient: true,
            duty_cycle: 0.5,
            color: None,
        }
    }
}

impl EffectParams {
    /// period × cycles, or `None` when unbounded.
    pub fn total_duration(&self) -> Option<Duration> {
        if self.cycles > 0.0 {
            Some(self.period.mul_f64(self.cycles as f64))
        } else {
            None
        }
    }

    /// Duty cycle as the signed 16-bit skew the waveform packet carries.
    pub fn skew_ratio(&self) -> i16 {
        (self.duty_cycle.clamp(0.0, 1.0) * 32767.0).round() as i16
    }

    /// Progress through the current period in 0..1.
    pub(crate) fn phase(&self, elapsed: Duration) -> f64 {
        let period = self.period.as_secs_f64();
        if period <= 0.0 {
            return 0.0;
        }
        (elapsed.as_secs_f64() / period).fract()
    }
}

/// Pixel grid an effect renders onto. Single zone bulbs are 1×1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Canvas {
    pub width: usize,
    pub height: usize,
}

impl Canvas {
    pub const SINGLE: Canvas = Canvas {
        width: 1,
        height: 1,
    };

    pub fn new(width: usize, height: usize) -> Self {
        Canvas { width, height }
    }

    pub fn pixels(&self) -> usize {
        self.width * self.height
    }
}

/// One rendered step. `fade` is the transition the device should use.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Color { color: Hsbk, fade: Duration },
    /// Row major, `width × height` entries.
    Pixels { colors: Vec<Hsbk>, fade: Duration },
}

/// A software effect: a function of elapsed time, parameters and canvas.
/// Stateful effects keep their state in `self`.
pub trait Effect: Send {
    /// How long to wait before the next frame.
    fn tick_interval(&mut self, params: &EffectParams) -> Duration {
        default_tick(params)
    }

    /// When the session should end, `None` to run until stopped.
    fn duration(&self, params: &EffectParams) -> Option<Duration> {
        params.total_duration()
    }

    fn render(&mut self, elapsed: Duration, params: &EffectParams, canvas: Canvas) -> Frame;
}

pub(crate) fn default_tick(params: &EffectParams) -> Duration {
    (params.period / TICKS_PER_PERIOD).max(MIN_TICK)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for kind in EffectKind::ALL {
            assert_eq!(kind.name().parse::<EffectKind>().unwrap(), kind);
            assert_eq!(
                <EffectKind as ValueEnum>::from_str(kind.name(), true).unwrap(),
                kind,
                "clap name for {}",
                kind
            );
        }
        assert_eq!("Matrix-Wave".parse::<EffectKind>().unwrap(), EffectKind::MatrixWave);
        assert!(matches!(
            "lava".parse::<EffectKind>(),
            Err(LifxError::UnknownEffect(_))
        ));
    }

    #[test]
    fn test_list() {
        assert_eq!(EffectKind::list(false).len(), 18);
        let matrix: Vec<&str> = EffectKind::list(true).iter().map(|k| k.name()).collect();
        assert_eq!(
            matrix,
            vec![
                "matrix_rainbow",
                "matrix_wave",
                "matrix_flame",
                "matrix_morph",
                "matrix_sky"
            ]
        );
    }

    #[test]
    fn test_families() {
        assert_eq!(EffectKind::Strobe.family(), EffectFamily::Waveform);
        assert_eq!(EffectKind::Candle.family(), EffectFamily::Software);
        assert_eq!(EffectKind::MatrixFlame.family(), EffectFamily::Software);
        assert_eq!(EffectKind::MatrixSky.family(), EffectFamily::Firmware);
        for kind in EffectKind::ALL {
            assert_eq!(
                kind.software_effect(1).is_some(),
                kind.family() == EffectFamily::Software
            );
        }
    }

    #[test]
    fn test_params() {
        let params = EffectParams::default();
        assert_eq!(params.total_duration(), Some(Duration::from_secs(10)));
        assert_eq!(params.skew_ratio(), 16384);
        assert_eq!(default_tick(&params), Duration::from_nanos(33_333_333));

        let fast = EffectParams {
            period: Duration::from_millis(100),
            cycles: 0.0,
            ..EffectParams::default()
        };
        assert_eq!(fast.total_duration(), None);
        assert_eq!(default_tick(&fast), MIN_TICK);
    }
}
