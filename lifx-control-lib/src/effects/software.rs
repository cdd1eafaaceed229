//! Whole-device software effects. Each renders a single color per frame.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::{Distribution, Uniform};

use crate::color::Hsbk;
use crate::effects::{default_tick, Canvas, Effect, EffectParams, Frame};

const HUE_RANGE: u32 = 65536;

fn solid(color: Hsbk, fade: Duration) -> Frame {
    Frame::Color { color, fade }
}

/// Full hue circle once per period.
pub struct Rainbow;

impl Effect for Rainbow {
    fn render(&mut self, elapsed: Duration, params: &EffectParams, _canvas: Canvas) -> Frame {
        let hue = params.phase(elapsed) * 360.0;
        solid(
            Hsbk::from_degrees(hue, params.saturation, params.brightness, params.kelvin),
            default_tick(params),
        )
    }
}

/// Two red flashes then two blue flashes per period.
pub struct Police;

impl Effect for Police {
    fn render(&mut self, elapsed: Duration, params: &EffectParams, _canvas: Canvas) -> Frame {
        let slots = params.phase(elapsed) * 4.0;
        let slot = slots.floor() as u32;
        let lit = slots.fract() < 2.0 / 3.0;
        let hue = if slot < 2 { 0.0 } else { 240.0 };
        let color = if lit {
            Hsbk::from_degrees(hue, 1.0, params.brightness, params.kelvin)
        } else {
            Hsbk::from_degrees(0.0, 0.0, 0.0, params.kelvin)
        };
        solid(color, Duration::ZERO)
    }
}

// (hue degrees, saturation, kelvin)
const RELAX_PALETTE: [(f64, f64, u16); 4] = [
    (30.0, 0.4, 2700),
    (20.0, 0.5, 2500),
    (280.0, 0.3, 3000),
    (180.0, 0.2, 3500),
];
const RELAX_MIN_PERIOD: Duration = Duration::from_secs(5);
const RELAX_TICK: Duration = Duration::from_millis(200);

/// Slow cross-fade through soft warm tones.
pub struct Relax;

impl Effect for Relax {
    fn tick_interval(&mut self, _params: &EffectParams) -> Duration {
        RELAX_TICK
    }

    fn render(&mut self, elapsed: Duration, params: &EffectParams, _canvas: Canvas) -> Frame {
        let period = params.period.max(RELAX_MIN_PERIOD).as_secs_f64();
        let position = elapsed.as_secs_f64() / period;
        let index = position.floor() as usize % RELAX_PALETTE.len();
        let progress = position.fract();
        let (h1, s1, k1) = RELAX_PALETTE[index];
        let (h2, s2, k2) = RELAX_PALETTE[(index + 1) % RELAX_PALETTE.len()];

        let hue = h1 + (h2 - h1) * progress;
        let saturation = s1 + (s2 - s1) * progress;
        let kelvin = k1 as f64 + (k2 as f64 - k1 as f64) * progress;
        solid(
            Hsbk::from_degrees(hue, saturation, params.brightness * 0.7, kelvin as u16),
            RELAX_TICK,
        )
    }
}

const DAYBREAK_MIN_DURATION: Duration = Duration::from_secs(10);
const DAYBREAK_TICK: Duration = Duration::from_millis(500);

/// Sunrise brightens from dark deep orange to neutral white; sunset is the
/// same progression reversed.
pub struct Daybreak {
    rising: bool,
}

impl Daybreak {
    pub fn sunrise() -> Self {
        Daybreak { rising: true }
    }

    pub fn sunset() -> Self {
        Daybreak { rising: false }
    }

    fn length(params: &EffectParams) -> Duration {
        params
            .period
            .mul_f64(params.cycles.max(1.0) as f64)
            .max(DAYBREAK_MIN_DURATION)
    }

    /// Color at `progress` (0-1) of a sunrise.
    fn sunrise_color(progress: f64, brightness: f64) -> Hsbk {
        let (hue, saturation, kelvin) = if progress < 0.5 {
            (15.0, 0.9 - progress * 0.6, 1500.0 + progress * 2.0 * 1200.0)
        } else {
            (
                30.0,
                0.6 - (progress - 0.5) * 1.2,
                2700.0 + (progress - 0.5) * 2.0 * 1300.0,
            )
        };
        Hsbk::from_degrees(hue, saturation.max(0.0), progress * brightness, kelvin as u16)
    }
}

impl Effect for Daybreak {
    fn tick_interval(&mut self, _params: &EffectParams) -> Duration {
        DAYBREAK_TICK
    }

    fn duration(&self, params: &EffectParams) -> Option<Duration> {
        Some(Self::length(params))
    }

    fn render(&mut self, elapsed: Duration, params: &EffectParams, _canvas: Canvas) -> Frame {
        let progress =
            (elapsed.as_secs_f64() / Self::length(params).as_secs_f64()).clamp(0.0, 1.0);
        let progress = if self.rising { progress } else { 1.0 - progress };
        solid(
            Self::sunrise_color(progress, params.brightness),
            DAYBREAK_TICK,
        )
    }
}

const DISCO_MIN_HUE_STEP: u32 = 10_000;

/// A new random hue every beat, always far from the last one.
pub struct Disco {
    rng: StdRng,
    last_hue: u32,
}

impl Disco {
    pub fn new(rng: StdRng) -> Self {
        Disco { rng, last_hue: 0 }
    }

    fn beat(params: &EffectParams) -> Duration {
        params
            .period
            .clamp(Duration::from_millis(100), Duration::from_millis(500))
    }
}

impl Effect for Disco {
    fn tick_interval(&mut self, params: &EffectParams) -> Duration {
        Self::beat(params)
    }

    fn render(&mut self, _elapsed: Duration, params: &EffectParams, _canvas: Canvas) -> Frame {
        let hues = Uniform::new(0, HUE_RANGE);
        let mut hue = hues.sample(&mut self.rng);
        while hue.abs_diff(self.last_hue) < DISCO_MIN_HUE_STEP {
            hue = hues.sample(&mut self.rng);
        }
        self.last_hue = hue;
        solid(
            Hsbk::new(
                hue as u16,
                65535,
                (params.brightness.clamp(0.0, 1.0) * 65535.0) as u16,
                params.kelvin,
            ),
            Self::beat(params) / 2,
        )
    }
}

const PARTY_HUES: [f64; 8] = [0.0, 30.0, 60.0, 120.0, 180.0, 240.0, 280.0, 330.0];

/// Jumps between a fixed set of saturated hues, never repeating the last.
pub struct Party {
    rng: StdRng,
    last: Option<usize>,
}

impl Party {
    pub fn new(rng: StdRng) -> Self {
        Party { rng, last: None }
    }

    fn beat(params: &EffectParams) -> Duration {
        params
            .period
            .clamp(Duration::from_millis(200), Duration::from_millis(1000))
    }
}

impl Effect for Party {
    fn tick_interval(&mut self, params: &EffectParams) -> Duration {
        Self::beat(params)
    }

    fn render(&mut self, _elapsed: Duration, params: &EffectParams, _canvas: Canvas) -> Frame {
        let index = match self.last {
            // skip over the previous index
            Some(last) => {
                let pick = self.rng.gen_range(0..PARTY_HUES.len() - 1);
                if pick >= last {
                    pick + 1
                } else {
                    pick
                }
            }
            None => self.rng.gen_range(0..PARTY_HUES.len()),
        };
        self.last = Some(index);
        solid(
            Hsbk::from_degrees(PARTY_HUES[index], 1.0, params.brightness, params.kelvin),
            Self::beat(params) / 5,
        )
    }
}

const CANDLE_HUE: f64 = 35.0;
const CANDLE_HUE_SPREAD: f64 = 7.5;
const CANDLE_KELVIN: u16 = 2200;

/// Warm flicker at irregular intervals.
pub struct Candle {
    rng: StdRng,
    tick: Duration,
}

impl Candle {
    pub fn new(rng: StdRng) -> Self {
        Candle {
            rng,
            tick: Duration::from_millis(80),
        }
    }
}

impl Effect for Candle {
    fn tick_interval(&mut self, _params: &EffectParams) -> Duration {
        self.tick = Duration::from_millis(self.rng.gen_range(80..=200));
        self.tick
    }

    fn render(&mut self, _elapsed: Duration, params: &EffectParams, _canvas: Canvas) -> Frame {
        let flicker = Uniform::new_inclusive(0.7, 1.0).sample(&mut self.rng);
        let hue = CANDLE_HUE
            + Uniform::new_inclusive(-CANDLE_HUE_SPREAD, CANDLE_HUE_SPREAD).sample(&mut self.rng);
        solid(
            Hsbk::from_degrees(hue, 0.6, params.brightness * flicker, CANDLE_KELVIN),
            self.tick.mul_f64(0.8),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn color_of(frame: Frame) -> Hsbk {
        match frame {
            Frame::Color { color, .. } => color,
            other => panic!("expected a color frame, got {:?}", other),
        }
    }

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[test]
    fn test_rainbow_sweeps_once_per_period() {
        let params = EffectParams::default();
        let mut effect = Rainbow;
        let start = color_of(effect.render(ms(0), &params, Canvas::SINGLE));
        let quarter = color_of(effect.render(ms(250), &params, Canvas::SINGLE));
        let again = color_of(effect.render(ms(1000), &params, Canvas::SINGLE));
        assert_eq!(start.hue, 0);
        assert_eq!(quarter.hue, 16384);
        assert_eq!(again.hue, start.hue);
    }

    #[test]
    fn test_police_pattern() {
        let params = EffectParams::default();
        let mut effect = Police;
        let at = |effect: &mut Police, t| color_of(effect.render(ms(t), &params, Canvas::SINGLE));

        // first slot: red for 2/3 of 250ms, then dark
        let red = at(&mut effect, 10);
        assert_eq!((red.hue, red.brightness), (0, 65535));
        assert_eq!(at(&mut effect, 200).brightness, 0);
        assert_eq!(at(&mut effect, 260).hue, 0);
        let blue = at(&mut effect, 510);
        assert_eq!(blue.hue, 43691);
        assert_eq!(blue.brightness, 65535);
        assert_eq!(at(&mut effect, 760).hue, 43691);
        assert_eq!(at(&mut effect, 990).brightness, 0);
    }

    #[test]
    fn test_relax_stays_soft() {
        let params = EffectParams::default();
        let mut effect = Relax;
        for t in (0..40_000).step_by(700) {
            let color = color_of(effect.render(ms(t), &params, Canvas::SINGLE));
            assert!(color.brightness <= 45875 + 1);
            assert!(color.saturation <= 32768);
        }
        // period is stretched to five seconds
        let first = color_of(effect.render(ms(0), &params, Canvas::SINGLE));
        let next = color_of(effect.render(ms(5000), &params, Canvas::SINGLE));
        assert_eq!(first.kelvin, 2700);
        assert_eq!(next.kelvin, 2500);
    }

    #[test]
    fn test_sunrise_and_sunset() {
        let params = EffectParams {
            cycles: 1.0,
            ..EffectParams::default()
        };
        let mut sunrise = Daybreak::sunrise();
        assert_eq!(sunrise.duration(&params), Some(ms(10_000)));

        let dawn = color_of(sunrise.render(ms(0), &params, Canvas::SINGLE));
        let noon = color_of(sunrise.render(ms(10_000), &params, Canvas::SINGLE));
        assert_eq!(dawn.brightness, 0);
        assert_eq!(dawn.kelvin, 1500);
        assert_eq!(noon.brightness, 65535);
        assert_eq!(noon.kelvin, 4000);
        assert_eq!(noon.saturation, 0);

        let mut sunset = Daybreak::sunset();
        let dusk = color_of(sunset.render(ms(0), &params, Canvas::SINGLE));
        let night = color_of(sunset.render(ms(10_000), &params, Canvas::SINGLE));
        assert_eq!(dusk, noon);
        assert_eq!(night, dawn);

        let mut previous = 0;
        for t in (0..=10_000).step_by(500) {
            let color = color_of(sunrise.render(ms(t), &params, Canvas::SINGLE));
            assert!(color.brightness >= previous);
            previous = color.brightness;
        }
    }

    #[test]
    fn test_disco_hues_jump() {
        let params = EffectParams::default();
        let mut effect = Disco::new(StdRng::seed_from_u64(7));
        assert_eq!(effect.tick_interval(&params), ms(500));
        let mut last = 0u16;
        for _ in 0..200 {
            let color = color_of(effect.render(ms(0), &params, Canvas::SINGLE));
            assert!(color.hue.abs_diff(last) >= 10_000);
            last = color.hue;
        }
    }

    #[test]
    fn test_party_never_repeats() {
        let params = EffectParams {
            period: ms(50),
            ..EffectParams::default()
        };
        let mut effect = Party::new(StdRng::seed_from_u64(3));
        assert_eq!(effect.tick_interval(&params), ms(200));
        let mut last = None;
        for _ in 0..200 {
            let hue = color_of(effect.render(ms(0), &params, Canvas::SINGLE)).hue;
            assert_ne!(Some(hue), last);
            last = Some(hue);
        }
    }

    #[test]
    fn test_candle_flicker_bounds() {
        let params = EffectParams {
            brightness: 0.5,
            ..EffectParams::default()
        };
        let mut effect = Candle::new(StdRng::seed_from_u64(11));
        for _ in 0..200 {
            let tick = effect.tick_interval(&params);
            assert!(tick >= ms(80) && tick <= ms(200));
            let (hue, saturation, brightness) =
                color_of(effect.render(ms(0), &params, Canvas::SINGLE)).to_degrees();
            assert!((27.4..=42.6).contains(&hue), "hue {}", hue);
            assert!((saturation - 0.6).abs() < 0.001);
            assert!((0.349..=0.501).contains(&brightness), "brightness {}", brightness);
        }
    }
}
