//! Fixed-rate frame loop built from a middleware chain.
//!
//! Every frame the executor threads the shared [`System`] through the
//! registered middleware in order. Each middleware decides whether to call
//! the rest of the chain via its `next` continuation, so a stage can run
//! work before and after everything downstream, or skip downstream
//! entirely.

use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, select};
use tracing::{debug, info};

use crate::{
    error::LoomResult,
    system::System,
};

/// Continuation for the rest of the middleware chain.
pub type Next<'a> = &'a mut dyn FnMut(&mut System) -> LoomResult<()>;

pub trait Middleware: Send {
    fn execute(&mut self, system: &mut System, next: Next<'_>) -> LoomResult<()>;
}

/// Wraps a closure as a [`Middleware`].
pub struct MiddlewareFn<F>(pub F);

impl<F> Middleware for MiddlewareFn<F>
where
    F: for<'a> FnMut(&mut System, Next<'a>) -> LoomResult<()> + Send,
{
    fn execute(&mut self, system: &mut System, next: Next<'_>) -> LoomResult<()> {
        (self.0)(system, next)
    }
}

fn run_chain(stack: &mut [Box<dyn Middleware>], system: &mut System) -> LoomResult<()> {
    match stack.split_first_mut() {
        None => Ok(()),
        Some((head, rest)) => {
            let mut next = |system: &mut System| run_chain(rest, system);
            head.execute(system, &mut next)
        }
    }
}

pub struct Executor {
    system: System,
    middleware: Vec<Box<dyn Middleware>>,
    frame_rate: u32,
}

impl Executor {
    pub fn new(system: System, frame_rate: u32) -> Self {
        Self {
            system,
            middleware: Vec::new(),
            frame_rate: frame_rate.max(1),
        }
    }

    pub fn push(&mut self, middleware: Box<dyn Middleware>) {
        self.middleware.push(middleware);
    }

    pub fn system(&self) -> &System {
        &self.system
    }

    /// Runs the full middleware chain once.
    pub fn tick(&mut self) -> LoomResult<()> {
        run_chain(&mut self.middleware, &mut self.system)
    }

    /// Ticks at the configured frame rate until `cancel` yields or
    /// disconnects. A frame in flight always completes before shutdown.
    pub fn run(&mut self, cancel: &Receiver<()>) -> LoomResult<()> {
        let period = Duration::from_secs_f64(1.0 / f64::from(self.frame_rate));
        info!(frame_rate = self.frame_rate, "executor started");
        let frames = crossbeam_channel::tick(period);
        loop {
            select! {
                recv(frames) -> _ => self.tick()?,
                recv(cancel) -> _ => {
                    info!("executor stopping");
                    return Ok(());
                }
            }
        }
    }
}

/// Logs how long the downstream chain takes, averaged over a window.
pub struct FrameTimer {
    frames: u32,
    busy: Duration,
}

impl FrameTimer {
    const WINDOW: u32 = 300;

    pub fn new() -> Self {
        Self {
            frames: 0,
            busy: Duration::ZERO,
        }
    }
}

impl Default for FrameTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl Middleware for FrameTimer {
    fn execute(&mut self, system: &mut System, next: Next<'_>) -> LoomResult<()> {
        let start = Instant::now();
        let result = next(system);
        self.busy += start.elapsed();
        self.frames += 1;
        if self.frames == Self::WINDOW {
            debug!(
                avg_frame_us = (self.busy / self.frames).as_micros() as u64,
                "render timing"
            );
            self.frames = 0;
            self.busy = Duration::ZERO;
        }
        result
    }
}
