//! Frame sinks. An [`Output`] receives the finished canvas once per frame;
//! [`OutputMiddleware`] adapts one into the executor chain so outputs stack
//! after the effects runner.

use crate::{
    error::LoomResult,
    executor::{Middleware, Next},
    system::System,
};

pub mod debug;
pub mod hardware;

pub trait Output: Send {
    /// Called once per frame with the rendered canvas. Must not block the
    /// render thread; slow transports hand off to their own threads.
    fn display(&mut self, system: &System);
}

pub struct OutputMiddleware<O>(pub O);

impl<O: Output> Middleware for OutputMiddleware<O> {
    fn execute(&mut self, system: &mut System, next: Next<'_>) -> LoomResult<()> {
        self.0.display(system);
        next(system)
    }
}

/// Packs the canvas as 3 bytes per LED in index order.
pub(crate) fn pack_frame(system: &System) -> Vec<u8> {
    let mut frame = Vec::with_capacity(system.len() * 3);
    for led in system.leds() {
        let (r, g, b) = led.color.rgb255();
        frame.push(r);
        frame.push(g);
        frame.push(b);
    }
    frame
}
