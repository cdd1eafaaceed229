//! Software effects for pixel grids. Frames are row major with y = 0 on top.

use std::f64::consts::TAU;
use std::time::Duration;

use rand::rngs::StdRng;
use rand_distr::{Distribution, Uniform};

use crate::color::Hsbk;
use crate::effects::{default_tick, Canvas, Effect, EffectParams, Frame};

fn grid<F>(canvas: Canvas, mut pixel: F) -> Vec<Hsbk>
where
    F: FnMut(usize, usize) -> Hsbk,
{
    let mut colors = Vec::with_capacity(canvas.pixels());
    for y in 0..canvas.height {
        for x in 0..canvas.width {
            colors.push(pixel(x, y));
        }
    }
    colors
}

/// Diagonal rainbow drifting one full hue circle per period.
pub struct MatrixRainbow;

impl Effect for MatrixRainbow {
    fn render(&mut self, elapsed: Duration, params: &EffectParams, canvas: Canvas) -> Frame {
        let span = (canvas.width + canvas.height).max(1) as f64;
        let offset = params.phase(elapsed);
        let colors = grid(canvas, |x, y| {
            let hue = ((x + y) as f64 / span + offset).fract() * 360.0;
            Hsbk::from_degrees(hue, params.saturation, params.brightness, params.kelvin)
        });
        Frame::Pixels {
            colors,
            fade: default_tick(params),
        }
    }
}

/// Two crossing sine waves of brightness over a slowly drifting hue.
pub struct MatrixWave;

impl Effect for MatrixWave {
    fn render(&mut self, elapsed: Duration, params: &EffectParams, canvas: Canvas) -> Frame {
        let phi = TAU * params.phase(elapsed);
        let drift = 40.0 * elapsed.as_secs_f64() / params.period.as_secs_f64().max(0.001);
        let colors = grid(canvas, |x, y| {
            let across = (((x as f64 + phi) * 0.8).sin() + 1.0) / 2.0;
            let down = (((y as f64 + phi * 0.7) * 0.6).sin() + 1.0) / 2.0;
            let level = 0.3 + 0.7 * (across + down) / 2.0;
            let hue = drift + (x + y) as f64 * 8.0;
            Hsbk::from_degrees(hue, params.saturation, params.brightness * level, params.kelvin)
        });
        Frame::Pixels {
            colors,
            fade: default_tick(params),
        }
    }
}

const FLAME_TICK: Duration = Duration::from_millis(100);

/// Heat simulation: every cell cools, the bottom row is re-fed and heat rises.
pub struct MatrixFlame {
    rng: StdRng,
    heat: Vec<f64>,
}

impl MatrixFlame {
    pub fn new(rng: StdRng) -> Self {
        MatrixFlame {
            rng,
            heat: Vec::new(),
        }
    }

    fn step(&mut self, canvas: Canvas) {
        let (width, height) = (canvas.width, canvas.height);
        if self.heat.len() != canvas.pixels() {
            self.heat = vec![0.0; canvas.pixels()];
        }
        if width == 0 || height == 0 {
            return;
        }

        let cooling = Uniform::new_inclusive(0.05, 0.15);
        for cell in self.heat.iter_mut() {
            *cell = (*cell - cooling.sample(&mut self.rng)).max(0.0);
        }

        let fuel = Uniform::new_inclusive(0.3, 0.7);
        let bottom = (height - 1) * width;
        for cell in &mut self.heat[bottom..] {
            *cell = (*cell + fuel.sample(&mut self.rng)).min(1.0);
        }

        for y in 0..height - 1 {
            for x in 0..width {
                let below = (y + 1) * width;
                let from = x.saturating_sub(1);
                let to = (x + 1).min(width - 1);
                let sum: f64 = self.heat[below + from..=below + to].iter().sum();
                let average = sum / (to - from + 1) as f64;
                let cell = &mut self.heat[y * width + x];
                *cell = cell.max(average * 0.7);
            }
        }
    }

    fn fire_color(intensity: f64, brightness: f64) -> Hsbk {
        if intensity < 0.2 {
            Hsbk::from_degrees(0.0, 1.0, intensity * 5.0 * 0.3, 2000)
        } else if intensity < 0.5 {
            Hsbk::from_degrees(15.0, 1.0, intensity * brightness, 2000)
        } else {
            Hsbk::from_degrees(30.0, 0.7, intensity * brightness, 2200)
        }
    }
}

impl Effect for MatrixFlame {
    fn tick_interval(&mut self, _params: &EffectParams) -> Duration {
        FLAME_TICK
    }

    fn render(&mut self, _elapsed: Duration, params: &EffectParams, canvas: Canvas) -> Frame {
        self.step(canvas);
        Frame::Pixels {
            colors: self
                .heat
                .iter()
                .map(|&heat| Self::fire_color(heat, params.brightness))
                .collect(),
            fade: FLAME_TICK,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn pixels_of(frame: Frame) -> Vec<Hsbk> {
        match frame {
            Frame::Pixels { colors, .. } => colors,
            other => panic!("expected a pixel frame, got {:?}", other),
        }
    }

    #[test]
    fn test_matrix_rainbow_diagonals() {
        let params = EffectParams::default();
        let canvas = Canvas::new(8, 8);
        let colors = pixels_of(MatrixRainbow.render(Duration::ZERO, &params, canvas));
        assert_eq!(colors.len(), 64);
        assert_eq!(colors[0].hue, 0);
        // same diagonal, same hue
        assert_eq!(colors[1], colors[8]);
        // (4, 4) is half way round
        assert_eq!(colors[4 * 8 + 4].hue, 32768);

        let later = pixels_of(MatrixRainbow.render(Duration::from_millis(500), &params, canvas));
        assert_eq!(later[0].hue, 32768);
    }

    #[test]
    fn test_matrix_wave_levels() {
        let params = EffectParams::default();
        let canvas = Canvas::new(8, 1);
        for t in [0, 130, 480, 999] {
            let colors =
                pixels_of(MatrixWave.render(Duration::from_millis(t), &params, canvas));
            assert_eq!(colors.len(), 8);
            for color in colors {
                assert!(color.brightness >= 19660, "too dark: {}", color.brightness);
            }
        }
    }

    #[test]
    fn test_matrix_flame_rises_from_the_bottom() {
        let params = EffectParams::default();
        let canvas = Canvas::new(8, 8);
        let mut flame = MatrixFlame::new(StdRng::seed_from_u64(5));

        let first = pixels_of(flame.render(Duration::ZERO, &params, canvas));
        assert_eq!(first.len(), 64);
        // only the bottom row has been fed
        assert!(first[56..].iter().all(|c| c.brightness > 0));
        assert!(flame.heat[..8].iter().all(|&h| h < 0.7));

        for _ in 0..20 {
            flame.render(Duration::ZERO, &params, canvas);
        }
        assert!(flame.heat.iter().all(|&h| (0.0..=1.0).contains(&h)));
        let top: f64 = flame.heat[..8].iter().sum();
        let bottom: f64 = flame.heat[56..].iter().sum();
        assert!(bottom > top);
    }

    #[test]
    fn test_matrix_flame_single_row() {
        let params = EffectParams::default();
        let mut flame = MatrixFlame::new(StdRng::seed_from_u64(9));
        let colors = pixels_of(flame.render(Duration::ZERO, &params, Canvas::new(8, 1)));
        assert_eq!(colors.len(), 8);
    }
}
