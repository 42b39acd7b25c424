//! UDP output to the LED controllers.
//!
//! Each controller gets one datagram per frame holding its whole LED state,
//! laid out the way the firmware walks its pins: chains ordered by pin then
//! by position on the pin, and reversed chains written back to front. LED
//! index to byte offset is resolved once at startup; per frame the render
//! thread only writes bytes and hands the buffers to a sender thread.

use std::{
    net::{IpAddr, SocketAddr, UdpSocket},
    thread,
};

use crossbeam_channel::{Receiver, Sender, TrySendError};
use tracing::{info, warn};

use crate::{
    error::{LoomError, LoomResult},
    output::Output,
    system::{Controller, System},
};

pub const DEFAULT_TARGET_PORT: u16 = 5151;

struct Sink {
    addr: SocketAddr,
    buf: Vec<u8>,
}

/// Precomputed location of one LED's bytes: which sink, and at what offset.
struct Cell {
    sink: usize,
    offset: usize,
}

type Batch = Vec<(SocketAddr, Vec<u8>)>;

pub struct HardwareOutput {
    sinks: Vec<Sink>,
    cells: Vec<Option<Cell>>,
    frames: Sender<Batch>,
    drain: Receiver<Batch>,
}

impl HardwareOutput {
    pub fn new(system: &System, bind_addr: &str, target_port: u16) -> LoomResult<Self> {
        let socket = UdpSocket::bind(bind_addr)
            .map_err(|e| LoomError::output(format!("hardware socket bind {bind_addr}: {e}")))?;

        let mut sinks = Vec::new();
        let mut sink_of = std::collections::BTreeMap::new();
        for (ip, controller) in system.controllers() {
            let parsed: IpAddr = ip
                .parse()
                .map_err(|e| LoomError::output(format!("controller address {ip}: {e}")))?;
            sink_of.insert(ip.clone(), sinks.len());
            sinks.push(Sink {
                addr: SocketAddr::new(parsed, target_port),
                buf: vec![0; 3 * controller.total_leds() as usize],
            });
        }
        info!(controllers = sinks.len(), port = target_port, "hardware output ready");

        let mut cells = Vec::with_capacity(system.len());
        for led in system.leds() {
            cells.push(resolve_cell(system, led.id, &sink_of));
        }

        let (frames, rx) = crossbeam_channel::bounded::<Batch>(1);
        let drain = rx.clone();
        thread::spawn(move || {
            while let Ok(batch) = rx.recv() {
                for (addr, buf) in batch {
                    if let Err(e) = socket.send_to(&buf, addr) {
                        warn!(target = %addr, error = %e, "controller send failed");
                    }
                }
            }
        });

        Ok(Self {
            sinks,
            cells,
            frames,
            drain,
        })
    }
}

fn resolve_cell(
    system: &System,
    led_id: usize,
    sink_of: &std::collections::BTreeMap<String, usize>,
) -> Option<Cell> {
    let led = system.led(led_id)?;
    let ip = led.addr.controller.as_ref()?;
    let Some(controller) = system.controllers().get(ip) else {
        warn!(led = led_id, controller = %ip, "led references unknown controller");
        return None;
    };
    let Some(chain) = controller.chains.get(&led.addr.chain) else {
        warn!(led = led_id, chain = led.addr.chain, "led references unknown chain");
        return None;
    };
    if led.addr.position >= chain.len {
        warn!(
            led = led_id,
            chain = chain.id,
            position = led.addr.position,
            len = chain.len,
            "led position beyond chain length"
        );
        return None;
    }

    let mut slot = chains_before(controller, chain.pin, chain.pos_on_pin);
    slot += if chain.reversed {
        chain.len - (led.addr.position + 1)
    } else {
        led.addr.position
    };
    Some(Cell {
        sink: sink_of[ip],
        offset: 3 * slot as usize,
    })
}

/// LEDs the firmware emits before reaching the chain at (pin, pos_on_pin).
fn chains_before(controller: &Controller, pin: u32, pos_on_pin: u32) -> u32 {
    controller
        .chains
        .values()
        .filter(|c| c.pin < pin || (c.pin == pin && c.pos_on_pin < pos_on_pin))
        .map(|c| c.len)
        .sum()
}

impl Output for HardwareOutput {
    fn display(&mut self, system: &System) {
        for led in system.leds() {
            let Some(cell) = &self.cells[led.id] else {
                continue;
            };
            let (r, g, b) = led.color.rgb255();
            let buf = &mut self.sinks[cell.sink].buf;
            buf[cell.offset] = r;
            buf[cell.offset + 1] = g;
            buf[cell.offset + 2] = b;
        }

        let batch: Batch = self
            .sinks
            .iter()
            .map(|s| (s.addr, s.buf.clone()))
            .collect();
        if let Err(TrySendError::Full(batch)) = self.frames.try_send(batch) {
            let _ = self.drain.try_recv();
            let _ = self.frames.try_send(batch);
        }
    }
}
