//! Keyframe scheduling.
//!
//! A show is a set of [`Keyframe`]s on a shared timeline. The
//! [`EffectsManager`] indexes them into one-second buckets so a frame only
//! probes the keyframes near the current timestamp, drives effect
//! lifecycles as keyframes become active and inactive, and blacklists any
//! effect that panics so the rest of the show keeps running. The timeline
//! loops: past the last keyframe's end, playback wraps to zero and every
//! keyframe is eligible to run again.

use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    time::{Duration, Instant},
};

use tracing::warn;

use crate::{
    color::Color,
    effect::Effect,
    error::{LoomError, LoomResult},
    executor::{Middleware, Next},
    system::System,
};

pub struct Keyframe {
    pub label: String,
    pub offset: Duration,
    pub duration: Duration,
    /// Evaluation order among concurrently active keyframes. Lower layers
    /// render first, so higher layers draw over them.
    pub layer: i32,
    pub effect: Box<dyn Effect>,
}

impl Keyframe {
    pub fn new(
        label: impl Into<String>,
        offset: Duration,
        duration: Duration,
        layer: i32,
        effect: Box<dyn Effect>,
    ) -> Self {
        Self {
            label: label.into(),
            offset,
            duration,
            layer,
            effect,
        }
    }

    pub fn end(&self) -> Duration {
        self.offset + self.duration
    }
}

pub struct EffectsManager {
    keyframes: Vec<Keyframe>,
    /// Keyframe indices active during each whole second of the timeline,
    /// ordered by (layer, insertion).
    buckets: Vec<Vec<usize>>,
    blacklist: Vec<bool>,
    last_active: Vec<usize>,
    total: Duration,
    last_loop: u128,
}

impl EffectsManager {
    pub fn new(keyframes: Vec<Keyframe>) -> LoomResult<Self> {
        for kf in &keyframes {
            if kf.duration.is_zero() {
                return Err(LoomError::schedule(format!(
                    "keyframe {:?} has zero duration",
                    kf.label
                )));
            }
        }

        let total = keyframes
            .iter()
            .map(Keyframe::end)
            .max()
            .unwrap_or(Duration::ZERO);

        let mut buckets: Vec<Vec<usize>> = Vec::new();
        if !total.is_zero() {
            // A keyframe spans [offset, end); bucket b covers [b, b+1).
            buckets.resize(total.saturating_sub(Duration::from_nanos(1)).as_secs() as usize + 1, Vec::new());
            for (idx, kf) in keyframes.iter().enumerate() {
                let first = kf.offset.as_secs() as usize;
                let last = kf.end().saturating_sub(Duration::from_nanos(1)).as_secs() as usize;
                for bucket in &mut buckets[first..=last] {
                    bucket.push(idx);
                }
            }
            for bucket in &mut buckets {
                bucket.sort_by_key(|&idx| (keyframes[idx].layer, idx));
            }
        }

        let blacklist = vec![false; keyframes.len()];
        Ok(Self {
            keyframes,
            buckets,
            blacklist,
            last_active: Vec::new(),
            total,
            last_loop: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.keyframes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keyframes.is_empty()
    }

    /// One full loop of the timeline: the latest keyframe end.
    pub fn total_duration(&self) -> Duration {
        self.total
    }

    /// Renders the frame at `elapsed` (time since show start) onto the
    /// system. Effects are entered, evaluated in layer order over a black
    /// canvas, and exited as the play head moves.
    pub fn evaluate(&mut self, system: &mut System, elapsed: Duration) {
        if self.total.is_zero() {
            system.fill(Color::black());
            return;
        }

        let loops = elapsed.as_nanos() / self.total.as_nanos();
        if loops != self.last_loop {
            // Crossing the loop boundary ends every active keyframe so it
            // can re-enter fresh on the new pass.
            let active = std::mem::take(&mut self.last_active);
            for &idx in &active {
                if !self.blacklist[idx] {
                    self.run_exit(idx, system);
                }
            }
            self.last_loop = loops;
        }

        let loop_time =
            Duration::from_nanos((elapsed.as_nanos() % self.total.as_nanos()) as u64);
        let bucket_idx = (loop_time.as_secs() as usize).min(self.buckets.len() - 1);
        let active: Vec<usize> = self.buckets[bucket_idx]
            .iter()
            .copied()
            .filter(|&idx| {
                let kf = &self.keyframes[idx];
                !self.blacklist[idx] && kf.offset <= loop_time && loop_time < kf.end()
            })
            .collect();

        // A blacklisted keyframe gets no further lifecycle calls, so it is
        // dropped here rather than exited.
        let exited: Vec<usize> = self
            .last_active
            .iter()
            .copied()
            .filter(|&idx| !active.contains(&idx) && !self.blacklist[idx])
            .collect();
        for idx in exited {
            self.run_exit(idx, system);
        }
        let entered: Vec<usize> = active
            .iter()
            .copied()
            .filter(|idx| !self.last_active.contains(idx))
            .collect();
        for idx in entered {
            self.run_enter(idx, system);
        }

        system.fill(Color::black());
        for &idx in &active {
            // on_enter may have just blacklisted it
            if self.blacklist[idx] {
                continue;
            }
            let kf = &self.keyframes[idx];
            let progress =
                (loop_time - kf.offset).as_secs_f64() / kf.duration.as_secs_f64();
            self.run_eval(idx, progress.min(1.0), system);
        }

        self.last_active = active;
    }

    fn run_enter(&mut self, idx: usize, system: &mut System) {
        let kf = &mut self.keyframes[idx];
        let result = panic::catch_unwind(AssertUnwindSafe(|| kf.effect.on_enter(system)));
        if let Err(payload) = result {
            self.blacklist[idx] = true;
            warn!(
                keyframe = %self.keyframes[idx].label,
                panic = panic_message(&payload),
                "effect panicked on enter, blacklisted"
            );
        }
    }

    fn run_eval(&mut self, idx: usize, progress: f64, system: &mut System) {
        let kf = &mut self.keyframes[idx];
        let result =
            panic::catch_unwind(AssertUnwindSafe(|| kf.effect.eval(progress, system)));
        if let Err(payload) = result {
            self.blacklist[idx] = true;
            warn!(
                keyframe = %self.keyframes[idx].label,
                panic = panic_message(&payload),
                "effect panicked, blacklisted"
            );
        }
    }

    fn run_exit(&mut self, idx: usize, system: &mut System) {
        let kf = &mut self.keyframes[idx];
        let result = panic::catch_unwind(AssertUnwindSafe(|| kf.effect.on_exit(system)));
        if let Err(payload) = result {
            warn!(
                keyframe = %self.keyframes[idx].label,
                panic = panic_message(&payload),
                "effect panicked on exit"
            );
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "unknown panic"
    }
}

/// A clock source reporting the current playback position, e.g. a media
/// player the lights must stay in sync with.
pub type MediaClock = Box<dyn FnMut() -> anyhow::Result<Duration> + Send>;

/// Middleware driving an [`EffectsManager`] from wall time or an external
/// media clock.
pub struct EffectsRunner {
    manager: EffectsManager,
    start: Instant,
    clock: Option<MediaClock>,
}

impl EffectsRunner {
    pub fn new(manager: EffectsManager) -> Self {
        Self {
            manager,
            start: Instant::now(),
            clock: None,
        }
    }

    /// Follows `clock` instead of the internal timer. When the clock
    /// errors the internal timer takes over from the last synced position.
    pub fn with_clock(manager: EffectsManager, clock: MediaClock) -> Self {
        Self {
            manager,
            start: Instant::now(),
            clock: Some(clock),
        }
    }

    pub fn manager(&self) -> &EffectsManager {
        &self.manager
    }
}

impl Middleware for EffectsRunner {
    fn execute(&mut self, system: &mut System, next: Next<'_>) -> LoomResult<()> {
        let elapsed = match &mut self.clock {
            Some(clock) => match clock() {
                Ok(position) => {
                    if let Some(start) = Instant::now().checked_sub(position) {
                        self.start = start;
                    }
                    position
                }
                Err(err) => {
                    warn!(%err, "media clock unavailable, using internal timer");
                    self.start.elapsed()
                }
            },
            None => self.start.elapsed(),
        };
        self.manager.evaluate(system, elapsed);
        next(system)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::PhysicalAddr;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Counts {
        enters: u32,
        evals: Vec<f64>,
        exits: u32,
    }

    struct Probe {
        counts: Arc<Mutex<Counts>>,
        order: Option<(Arc<Mutex<Vec<&'static str>>>, &'static str)>,
        panic_on_eval: bool,
        panic_on_enter: bool,
    }

    impl Probe {
        fn new() -> (Box<Self>, Arc<Mutex<Counts>>) {
            let counts = Arc::new(Mutex::new(Counts::default()));
            (
                Box::new(Self {
                    counts: counts.clone(),
                    order: None,
                    panic_on_eval: false,
                    panic_on_enter: false,
                }),
                counts,
            )
        }
    }

    impl Effect for Probe {
        fn on_enter(&mut self, _system: &mut System) {
            if self.panic_on_enter {
                panic!("boom on enter");
            }
            self.counts.lock().unwrap().enters += 1;
        }

        fn eval(&mut self, progress: f64, _system: &mut System) {
            if self.panic_on_eval {
                panic!("boom");
            }
            self.counts.lock().unwrap().evals.push(progress);
            if let Some((log, tag)) = &self.order {
                log.lock().unwrap().push(tag);
            }
        }

        fn on_exit(&mut self, _system: &mut System) {
            self.counts.lock().unwrap().exits += 1;
        }
    }

    fn one_led_system() -> System {
        let mut sys = System::new();
        sys.add_led(
            0.0,
            0.0,
            0.0,
            PhysicalAddr {
                controller: None,
                chain: 0,
                position: 0,
            },
        );
        sys
    }

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    fn ms(m: u64) -> Duration {
        Duration::from_millis(m)
    }

    #[test]
    fn zero_duration_keyframe_is_rejected() {
        let (probe, _) = Probe::new();
        let kf = Keyframe::new("bad", secs(0), secs(0), 0, probe);
        assert!(EffectsManager::new(vec![kf]).is_err());
    }

    #[test]
    fn lifecycle_follows_the_play_head() {
        let (a, a_counts) = Probe::new();
        let (b, b_counts) = Probe::new();
        let mut mgr = EffectsManager::new(vec![
            Keyframe::new("a", secs(0), secs(1), 0, a),
            Keyframe::new("b", secs(1), secs(1), 0, b),
        ])
        .unwrap();
        let mut sys = one_led_system();

        mgr.evaluate(&mut sys, ms(500));
        {
            let a = a_counts.lock().unwrap();
            assert_eq!(a.enters, 1);
            assert_eq!(a.evals.as_slice(), &[0.5]);
            assert_eq!(a.exits, 0);
            assert!(b_counts.lock().unwrap().evals.is_empty());
        }

        mgr.evaluate(&mut sys, ms(1500));
        let a = a_counts.lock().unwrap();
        let b = b_counts.lock().unwrap();
        assert_eq!(a.exits, 1);
        assert_eq!(a.enters, 1);
        assert_eq!(b.enters, 1);
        assert_eq!(b.evals.as_slice(), &[0.5]);
    }

    #[test]
    fn layers_evaluate_lowest_first() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let (mut high, _) = Probe::new();
        high.order = Some((order.clone(), "high"));
        let (mut low, _) = Probe::new();
        low.order = Some((order.clone(), "low"));

        let mut mgr = EffectsManager::new(vec![
            Keyframe::new("high", secs(0), secs(2), 5, high),
            Keyframe::new("low", secs(0), secs(2), 1, low),
        ])
        .unwrap();
        let mut sys = one_led_system();
        mgr.evaluate(&mut sys, ms(100));

        assert_eq!(order.lock().unwrap().as_slice(), &["low", "high"]);
    }

    #[test]
    fn panicking_effect_is_blacklisted_and_others_survive() {
        let (mut bad, bad_counts) = Probe::new();
        bad.panic_on_eval = true;
        let (good, good_counts) = Probe::new();

        let mut mgr = EffectsManager::new(vec![
            Keyframe::new("bad", secs(0), secs(4), 0, bad),
            Keyframe::new("good", secs(0), secs(4), 1, good),
        ])
        .unwrap();
        let mut sys = one_led_system();

        mgr.evaluate(&mut sys, ms(500));
        mgr.evaluate(&mut sys, ms(1000));
        mgr.evaluate(&mut sys, ms(1500));

        assert_eq!(bad_counts.lock().unwrap().evals.len(), 0);
        assert_eq!(good_counts.lock().unwrap().evals.len(), 3);
    }

    #[test]
    fn blacklisted_keyframe_receives_no_exit() {
        let (mut bad, bad_counts) = Probe::new();
        bad.panic_on_eval = true;
        let mut mgr = EffectsManager::new(vec![
            Keyframe::new("bad", secs(0), secs(1), 0, bad),
            Keyframe::new("pad", secs(0), secs(2), 0, Probe::new().0),
        ])
        .unwrap();
        let mut sys = one_led_system();

        mgr.evaluate(&mut sys, ms(500));
        mgr.evaluate(&mut sys, ms(1500));
        // crossing the loop boundary must not resurrect it either
        mgr.evaluate(&mut sys, ms(2500));

        let counts = bad_counts.lock().unwrap();
        assert_eq!(counts.exits, 0);
        assert_eq!(counts.evals.len(), 0);
    }

    #[test]
    fn loop_wrap_skips_blacklisted_exits() {
        let (mut bad, bad_counts) = Probe::new();
        bad.panic_on_eval = true;
        let mut mgr =
            EffectsManager::new(vec![Keyframe::new("bad", secs(0), secs(1), 0, bad)]).unwrap();
        let mut sys = one_led_system();

        // blacklisted while active, then the play head wraps past the end
        mgr.evaluate(&mut sys, ms(500));
        mgr.evaluate(&mut sys, ms(1500));

        assert_eq!(bad_counts.lock().unwrap().exits, 0);
    }

    #[test]
    fn panic_on_enter_prevents_eval() {
        let (mut bad, bad_counts) = Probe::new();
        bad.panic_on_enter = true;
        let mut mgr =
            EffectsManager::new(vec![Keyframe::new("bad", secs(0), secs(2), 0, bad)]).unwrap();
        let mut sys = one_led_system();

        mgr.evaluate(&mut sys, ms(100));
        mgr.evaluate(&mut sys, ms(200));

        let counts = bad_counts.lock().unwrap();
        assert_eq!(counts.enters, 0);
        assert!(counts.evals.is_empty());
    }

    #[test]
    fn timeline_loops_and_reenters_keyframes() {
        let (probe, counts) = Probe::new();
        let mut mgr =
            EffectsManager::new(vec![Keyframe::new("looper", secs(0), secs(2), 0, probe)])
                .unwrap();
        let mut sys = one_led_system();

        mgr.evaluate(&mut sys, ms(500));
        mgr.evaluate(&mut sys, ms(2500));

        let counts = counts.lock().unwrap();
        assert_eq!(counts.enters, 2);
        assert_eq!(counts.exits, 1);
        assert_eq!(counts.evals.len(), 2);
        assert!((counts.evals[1] - 0.25).abs() < 1e-9);
    }

    #[test]
    fn progress_is_relative_to_the_keyframe() {
        let (probe, counts) = Probe::new();
        let mut mgr =
            EffectsManager::new(vec![Keyframe::new("offset", secs(1), secs(2), 0, probe)])
                .unwrap();
        let mut sys = one_led_system();

        mgr.evaluate(&mut sys, secs(2));
        assert_eq!(counts.lock().unwrap().evals.as_slice(), &[0.5]);
    }

    #[test]
    fn empty_show_blanks_the_canvas() {
        let mut mgr = EffectsManager::new(Vec::new()).unwrap();
        let mut sys = one_led_system();
        sys.fill(Color::new(1.0, 1.0, 1.0));
        mgr.evaluate(&mut sys, secs(10));
        assert_eq!(sys.leds()[0].color, Color::black());
    }

    #[test]
    fn bucket_index_stays_in_range_at_the_end() {
        let (probe, counts) = Probe::new();
        // 1.5s show: one bucket for [0, 1), one for [1, 1.5).
        let mut mgr =
            EffectsManager::new(vec![Keyframe::new("short", secs(0), ms(1500), 0, probe)])
                .unwrap();
        let mut sys = one_led_system();
        mgr.evaluate(&mut sys, ms(1499));
        assert_eq!(counts.lock().unwrap().evals.len(), 1);
    }
}
