//! A small catalog of built-in effects used by the show generator and the
//! demo timeline. Anything here is an ordinary [`Effect`]; nothing in the
//! scheduler knows about concrete effect types.

use std::time::Duration;

use rand::Rng;

use crate::{
    color::Color,
    effect::Effect,
    system::System,
};

/// Paints the whole canvas a single color.
pub struct Monochrome {
    pub color: Color,
}

impl Monochrome {
    pub fn new(color: Color) -> Self {
        Self { color }
    }
}

impl Effect for Monochrome {
    fn eval(&mut self, _progress: f64, system: &mut System) {
        system.fill(self.color);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FadeDirection {
    In,
    Out,
}

/// Scales whatever lower layers have already drawn, so it is typically
/// scheduled on a high layer over the start or end of another effect.
pub struct FadeTransition {
    direction: FadeDirection,
}

impl FadeTransition {
    pub fn fade_in() -> Self {
        Self {
            direction: FadeDirection::In,
        }
    }

    pub fn fade_out() -> Self {
        Self {
            direction: FadeDirection::Out,
        }
    }
}

impl Effect for FadeTransition {
    fn eval(&mut self, progress: f64, system: &mut System) {
        let factor = match self.direction {
            FadeDirection::In => progress,
            FadeDirection::Out => 1.0 - progress,
        };
        for led in system.leds_mut() {
            led.color = led.color.scaled(factor);
        }
    }
}

/// Per-LED twinkle. Each LED gets a random start delay and period on
/// enter, then cycles through four phases: off, fade in, hold, fade out.
/// LEDs never start a cycle they could not finish before the keyframe ends.
pub struct Sparkle {
    duration: Duration,
    baseline: Duration,
    deviation: Duration,
    target: Color,
    periods: Vec<f64>,
    delays: Vec<f64>,
}

impl Sparkle {
    pub fn new(duration: Duration, baseline: Duration, deviation: Duration, target: Color) -> Self {
        Self {
            duration,
            baseline,
            deviation,
            target,
            periods: Vec::new(),
            delays: Vec::new(),
        }
    }
}

impl Effect for Sparkle {
    fn on_enter(&mut self, system: &mut System) {
        let mut rng = rand::thread_rng();
        let baseline = self.baseline.as_secs_f64();
        let deviation = self.deviation.as_secs_f64();
        let duration = self.duration.as_secs_f64();
        self.periods = (0..system.len())
            .map(|_| baseline + rng.r#gen::<f64>() * deviation - deviation / 2.0)
            .collect();
        self.delays = (0..system.len())
            .map(|_| rng.r#gen::<f64>() * duration)
            .collect();
    }

    fn eval(&mut self, progress: f64, system: &mut System) {
        if self.periods.len() != system.len() {
            return;
        }
        let duration = self.duration.as_secs_f64();
        let now = progress * duration;

        for led in system.leds_mut() {
            let t = now - self.delays[led.id];
            if t < 0.0 {
                continue;
            }
            let period = self.periods[led.id].max(1e-3);
            let block = (t / (period * 4.0)).floor();
            let total_blocks = ((duration - self.delays[led.id]) / (period * 4.0)).floor();
            if block >= total_blocks {
                continue;
            }
            let in_block = t % (period * 4.0);
            let phase = (in_block / period).floor() as u32;
            let in_phase = (in_block % period) / period;

            led.color = match phase {
                0 => led.color,
                1 => crate::color::Blending::Rgb.mix(led.color, self.target, in_phase),
                2 => self.target,
                _ => crate::color::Blending::Rgb.mix(led.color, self.target, 1.0 - in_phase),
            };
        }
    }
}

/// Diagonal hue sweep across the installation.
pub struct Rainbow {
    pub cycles: f64,
}

impl Rainbow {
    pub fn new(cycles: f64) -> Self {
        Self { cycles }
    }
}

impl Effect for Rainbow {
    fn eval(&mut self, progress: f64, system: &mut System) {
        let travel = progress * self.cycles * 360.0;
        for led in system.leds_mut() {
            let diagonal = (led.x + led.z) * std::f64::consts::FRAC_1_SQRT_2
                + (led.y + led.z) * std::f64::consts::FRAC_1_SQRT_2;
            let hue = (travel + diagonal * 360.0).rem_euclid(360.0);
            led.color = Color::hsv(hue, 1.0, 0.5);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::PhysicalAddr;

    fn system(n: usize) -> System {
        let mut sys = System::new();
        for i in 0..n {
            sys.add_led(
                i as f64,
                0.0,
                0.0,
                PhysicalAddr {
                    controller: None,
                    chain: 0,
                    position: i as u32,
                },
            );
        }
        sys
    }

    #[test]
    fn monochrome_paints_canvas() {
        let mut sys = system(3);
        let mut effect = Monochrome::new(Color::new(1.0, 0.0, 0.0));
        effect.eval(0.3, &mut sys);
        assert!(
            sys.leds()
                .iter()
                .all(|l| l.color == Color::new(1.0, 0.0, 0.0))
        );
    }

    #[test]
    fn fade_in_scales_existing_canvas() {
        let mut sys = system(2);
        sys.fill(Color::new(1.0, 0.0, 0.0));
        let mut fade = FadeTransition::fade_in();
        fade.eval(0.5, &mut sys);
        assert_eq!(sys.leds()[0].color, Color::new(0.5, 0.0, 0.0));
    }

    #[test]
    fn fade_out_ends_black() {
        let mut sys = system(2);
        sys.fill(Color::new(0.2, 0.8, 0.4));
        let mut fade = FadeTransition::fade_out();
        fade.eval(1.0, &mut sys);
        assert_eq!(sys.leds()[0].color, Color::black());
    }

    #[test]
    fn sparkle_without_enter_is_inert() {
        let mut sys = system(4);
        let mut sparkle = Sparkle::new(
            Duration::from_secs(10),
            Duration::from_secs(1),
            Duration::from_millis(500),
            Color::new(1.0, 1.0, 1.0),
        );
        sparkle.eval(0.5, &mut sys);
        assert!(sys.leds().iter().all(|l| l.color == Color::black()));
    }

    #[test]
    fn sparkle_allocates_per_led_state_on_enter() {
        let mut sys = system(4);
        let mut sparkle = Sparkle::new(
            Duration::from_secs(10),
            Duration::from_secs(1),
            Duration::from_millis(500),
            Color::new(1.0, 1.0, 1.0),
        );
        sparkle.on_enter(&mut sys);
        assert_eq!(sparkle.periods.len(), 4);
        assert_eq!(sparkle.delays.len(), 4);
        // Evaluating after enter must not panic at the progress extremes.
        sparkle.eval(0.0, &mut sys);
        sparkle.eval(1.0, &mut sys);
    }

    #[test]
    fn rainbow_varies_hue_across_leds() {
        let mut sys = system(2);
        sys.leds_mut()[1].x = 0.5;
        let mut rainbow = Rainbow::new(1.0);
        rainbow.eval(0.25, &mut sys);
        assert_ne!(sys.leds()[0].color, sys.leds()[1].color);
    }
}
