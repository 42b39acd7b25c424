use std::collections::BTreeMap;

use crate::color::Color;

/// Where an LED sits in the physical wiring. Immutable after topology
/// construction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PhysicalAddr {
    /// Controller IP, or `None` when the chain has no registered controller
    /// (debug-only rigs).
    pub controller: Option<String>,
    pub chain: u32,
    /// Position within the chain, 0-based.
    pub position: u32,
}

/// One wired LED chain on a controller pin.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Chain {
    pub id: u32,
    pub pin: u32,
    /// Order of this chain among the chains daisy-chained on the same pin.
    pub pos_on_pin: u32,
    pub len: u32,
    pub reversed: bool,
}

/// A network-addressed microcontroller driving one or more chains.
#[derive(Clone, Debug, Default)]
pub struct Controller {
    pub ip: String,
    pub chains: BTreeMap<u32, Chain>,
}

impl Controller {
    pub fn total_leds(&self) -> u32 {
        self.chains.values().map(|c| c.len).sum()
    }
}

#[derive(Clone, Debug)]
pub struct Led {
    pub id: usize,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub color: Color,
    pub addr: PhysicalAddr,
    /// Indices of adjacent LEDs in the owning [`System`]. Symmetric.
    pub neighbors: Vec<usize>,
}

/// Per-axis min/max gathered before normalization.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Stats {
    pub min: f64,
    pub max: f64,
}

impl Stats {
    pub fn convert(&self, val: f64) -> f64 {
        if self.max == self.min {
            return 0.0;
        }
        (val - self.min) / (self.max - self.min)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AxisStats {
    pub x: Stats,
    pub y: Stats,
    pub z: Stats,
}

/// The shared render state: the ordered LED collection effects read and
/// write each frame, plus the controller registry outputs index into.
///
/// LED identity (index) and physical addressing are fixed after topology
/// construction; only colors mutate per frame, and only on the render
/// thread.
#[derive(Default)]
pub struct System {
    leds: Vec<Led>,
    controllers: BTreeMap<String, Controller>,
    stats: Option<AxisStats>,
}

impl System {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an LED, assigning it the next index as its identity.
    pub fn add_led(&mut self, x: f64, y: f64, z: f64, addr: PhysicalAddr) -> usize {
        let id = self.leds.len();
        self.leds.push(Led {
            id,
            x,
            y,
            z,
            color: Color::black(),
            addr,
            neighbors: Vec::new(),
        });
        id
    }

    pub fn register_controller(&mut self, controller: Controller) {
        self.controllers.insert(controller.ip.clone(), controller);
    }

    pub fn len(&self) -> usize {
        self.leds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leds.is_empty()
    }

    pub fn leds(&self) -> &[Led] {
        &self.leds
    }

    pub fn leds_mut(&mut self) -> &mut [Led] {
        &mut self.leds
    }

    pub fn led(&self, id: usize) -> Option<&Led> {
        self.leds.get(id)
    }

    pub fn led_mut(&mut self, id: usize) -> Option<&mut Led> {
        self.leds.get_mut(id)
    }

    pub fn controllers(&self) -> &BTreeMap<String, Controller> {
        &self.controllers
    }

    pub fn controllers_mut(&mut self) -> &mut BTreeMap<String, Controller> {
        &mut self.controllers
    }

    pub fn axis_stats(&self) -> Option<&AxisStats> {
        self.stats.as_ref()
    }

    /// Paints every LED. The scheduler uses this as the layer baseline
    /// before evaluating the active keyframes.
    pub fn fill(&mut self, color: Color) {
        for led in &mut self.leds {
            led.color = color;
        }
    }

    /// Rescales all coordinates into the unit cube. Runs exactly once: the
    /// recorded per-axis stats double as the guard, so repeat calls are
    /// no-ops and coordinates stay put.
    pub fn normalize(&mut self) {
        if self.stats.is_some() || self.leds.is_empty() {
            return;
        }

        let axis = AxisStats {
            x: compute_stats(&self.leds, |led| led.x),
            y: compute_stats(&self.leds, |led| led.y),
            z: compute_stats(&self.leds, |led| led.z),
        };

        for led in &mut self.leds {
            led.x = axis.x.convert(led.x);
            led.y = axis.y.convert(led.y);
            led.z = axis.z.convert(led.z);
        }

        self.stats = Some(axis);
    }

    /// Nearest LED to a point in normalized space, if any exist.
    pub fn led_near(&self, x: f64, y: f64, z: f64) -> Option<&Led> {
        self.leds.iter().min_by(|a, b| {
            let da = dist_sq(x, y, z, a.x, a.y, a.z);
            let db = dist_sq(x, y, z, b.x, b.y, b.z);
            da.total_cmp(&db)
        })
    }
}

fn compute_stats(leds: &[Led], getter: impl Fn(&Led) -> f64) -> Stats {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for led in leds {
        let v = getter(led);
        min = min.min(v);
        max = max.max(v);
    }
    Stats { min, max }
}

pub(crate) fn dist_sq(x0: f64, y0: f64, z0: f64, x1: f64, y1: f64, z1: f64) -> f64 {
    let dx = x1 - x0;
    let dy = y1 - y0;
    let dz = z1 - z0;
    dx * dx + dy * dy + dz * dz
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(chain: u32, position: u32) -> PhysicalAddr {
        PhysicalAddr {
            controller: None,
            chain,
            position,
        }
    }

    fn line_system() -> System {
        let mut sys = System::new();
        sys.add_led(-10.0, 0.0, 5.0, addr(0, 0));
        sys.add_led(0.0, 2.0, 10.0, addr(0, 1));
        sys.add_led(10.0, 4.0, 15.0, addr(0, 2));
        sys
    }

    #[test]
    fn normalize_maps_axes_to_unit_range() {
        let mut sys = line_system();
        sys.normalize();

        let xs: Vec<f64> = sys.leds().iter().map(|l| l.x).collect();
        assert_eq!(xs, vec![0.0, 0.5, 1.0]);
        let stats = sys.axis_stats().unwrap();
        assert_eq!(stats.y.min, 0.0);
        assert_eq!(stats.y.max, 4.0);
        assert_eq!(sys.leds()[0].y, 0.0);
        assert_eq!(sys.leds()[2].z, 1.0);
    }

    #[test]
    fn normalize_is_idempotent() {
        let mut sys = line_system();
        sys.normalize();
        let once: Vec<(f64, f64, f64)> = sys.leds().iter().map(|l| (l.x, l.y, l.z)).collect();
        sys.normalize();
        let twice: Vec<(f64, f64, f64)> = sys.leds().iter().map(|l| (l.x, l.y, l.z)).collect();
        assert_eq!(once, twice);
    }

    #[test]
    fn fill_paints_every_led() {
        let mut sys = line_system();
        sys.fill(Color::new(1.0, 0.5, 0.0));
        assert!(
            sys.leds()
                .iter()
                .all(|l| l.color == Color::new(1.0, 0.5, 0.0))
        );
    }

    #[test]
    fn led_near_returns_closest() {
        let mut sys = line_system();
        sys.normalize();
        let led = sys.led_near(0.9, 0.9, 0.9).unwrap();
        assert_eq!(led.id, 2);
    }

    #[test]
    fn degenerate_axis_normalizes_to_zero() {
        let mut sys = System::new();
        sys.add_led(1.0, 5.0, 5.0, addr(0, 0));
        sys.add_led(2.0, 5.0, 5.0, addr(0, 1));
        sys.normalize();
        assert_eq!(sys.leds()[0].y, 0.0);
        assert_eq!(sys.leds()[1].y, 0.0);
    }
}
