//! The effect contract and its composition algebra.
//!
//! An [`Effect`] receives lifecycle calls from the scheduler: `on_enter`
//! when its keyframe becomes active, `eval` once per frame with progress in
//! `[0, 1]`, and `on_exit` when the keyframe leaves the active set. Complex
//! animations are built by wrapping effects in decorators (easing, reversal,
//! repetition, sequencing) rather than by subclassing; every wrapper is
//! itself an `Effect`.

use crate::{
    color::{Blending, Color},
    ease::Ease,
    system::{Led, System},
};

pub trait Effect: Send {
    fn on_enter(&mut self, _system: &mut System) {}

    /// Renders this effect onto the system for `progress` in `[0, 1]`.
    fn eval(&mut self, progress: f64, system: &mut System);

    fn on_exit(&mut self, _system: &mut System) {}
}

/// A whole-system function of progress.
pub struct SystemEffect<F>(pub F);

impl<F> Effect for SystemEffect<F>
where
    F: FnMut(f64, &mut System) + Send,
{
    fn eval(&mut self, progress: f64, system: &mut System) {
        (self.0)(progress, system);
    }
}

/// A per-LED function of progress, applied to every LED each frame.
pub struct LedEffect<F>(pub F);

impl<F> Effect for LedEffect<F>
where
    F: FnMut(f64, &mut Led) + Send,
{
    fn eval(&mut self, progress: f64, system: &mut System) {
        for led in system.leds_mut() {
            (self.0)(progress, led);
        }
    }
}

/// A per-LED function yielding a `(color, blend factor)` pair, combined
/// with the existing canvas color through a [`Blending`] mode.
pub struct BlendEffect<F> {
    f: F,
    blending: Blending,
}

impl<F> BlendEffect<F>
where
    F: FnMut(f64, &Led) -> (Color, f64) + Send,
{
    pub fn new(f: F, blending: Blending) -> Self {
        Self { f, blending }
    }
}

impl<F> Effect for BlendEffect<F>
where
    F: FnMut(f64, &Led) -> (Color, f64) + Send,
{
    fn eval(&mut self, progress: f64, system: &mut System) {
        for led in system.leds_mut() {
            let (color, factor) = (self.f)(progress, led);
            led.color = self.blending.mix(led.color, color, factor);
        }
    }
}

/// Remaps progress through an easing curve before delegating.
pub struct Eased<E> {
    inner: E,
    ease: Ease,
}

impl<E: Effect> Effect for Eased<E> {
    fn on_enter(&mut self, system: &mut System) {
        self.inner.on_enter(system);
    }

    fn eval(&mut self, progress: f64, system: &mut System) {
        self.inner.eval(self.ease.apply(progress), system);
    }

    fn on_exit(&mut self, system: &mut System) {
        self.inner.on_exit(system);
    }
}

/// Delegates with `1 - progress`.
pub struct Reversed<E> {
    inner: E,
}

impl<E: Effect> Effect for Reversed<E> {
    fn on_enter(&mut self, system: &mut System) {
        self.inner.on_enter(system);
    }

    fn eval(&mut self, progress: f64, system: &mut System) {
        self.inner.eval(1.0 - progress, system);
    }

    fn on_exit(&mut self, system: &mut System) {
        self.inner.on_exit(system);
    }
}

/// Plays the inner effect `count` times across the keyframe's span.
///
/// With `mirror` set, every other repetition runs backwards so the
/// animation ping-pongs instead of jumping back to its start.
pub struct Repeated<E> {
    inner: E,
    count: u32,
    mirror: bool,
}

impl<E: Effect> Effect for Repeated<E> {
    fn on_enter(&mut self, system: &mut System) {
        self.inner.on_enter(system);
    }

    fn eval(&mut self, progress: f64, system: &mut System) {
        let total = self.count.max(1) * if self.mirror { 2 } else { 1 };
        let scaled = progress * f64::from(total);
        // at progress 1.0 stay in the final cycle at its end
        let cycle = scaled.floor().min(f64::from(total) - 1.0);
        let mut local = (scaled - cycle).min(1.0);
        if self.mirror && (cycle as u64) % 2 == 1 {
            local = 1.0 - local;
        }
        self.inner.eval(local, system);
    }

    fn on_exit(&mut self, system: &mut System) {
        self.inner.on_exit(system);
    }
}

/// Partitions `[0, 1]` into equal spans, one per child, dispatching
/// progress remapped into the active child's local span. Lifecycle calls
/// fan out to every child.
pub struct Sequence {
    effects: Vec<Box<dyn Effect>>,
}

pub fn sequence(effects: Vec<Box<dyn Effect>>) -> Sequence {
    Sequence { effects }
}

impl Effect for Sequence {
    fn on_enter(&mut self, system: &mut System) {
        for effect in &mut self.effects {
            effect.on_enter(system);
        }
    }

    fn eval(&mut self, progress: f64, system: &mut System) {
        let n = self.effects.len();
        if n == 0 {
            return;
        }
        let scaled = progress * n as f64;
        let idx = (scaled.floor() as usize).min(n - 1);
        // at progress 1.0 the last child ends at its end, not its start
        self.effects[idx].eval((scaled - idx as f64).min(1.0), system);
    }

    fn on_exit(&mut self, system: &mut System) {
        for effect in &mut self.effects {
            effect.on_exit(system);
        }
    }
}

/// Builder-style combinators available on every effect.
pub trait EffectExt: Effect + Sized {
    fn eased(self, ease: Ease) -> Eased<Self> {
        Eased { inner: self, ease }
    }

    fn reversed(self) -> Reversed<Self> {
        Reversed { inner: self }
    }

    fn repeated(self, count: u32) -> Repeated<Self> {
        Repeated {
            inner: self,
            count,
            mirror: false,
        }
    }

    /// Like [`repeated`](Self::repeated), alternating direction each pass.
    fn ping_pong(self, count: u32) -> Repeated<Self> {
        Repeated {
            inner: self,
            count,
            mirror: true,
        }
    }

    fn boxed(self) -> Box<dyn Effect>
    where
        Self: 'static,
    {
        Box::new(self)
    }
}

impl<E: Effect> EffectExt for E {}
