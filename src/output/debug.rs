//! WebSocket debug viewer.
//!
//! Serves the rendered frame stream to any number of connected browser
//! viewers as binary messages, 3 bytes per LED in index order. A dedicated
//! sender thread does the socket writes; the render thread only packs the
//! frame and hands it off through a depth-1 channel, so when viewers are
//! slow the oldest pending frame is dropped rather than the frame rate.

use std::{
    net::{SocketAddr, TcpListener, TcpStream},
    sync::{Arc, Mutex},
    thread,
};

use crossbeam_channel::{Receiver, Sender, TrySendError};
use tracing::{debug, info, warn};
use tungstenite::{Message, WebSocket};

use crate::{
    error::{LoomError, LoomResult},
    output::Output,
    system::System,
};

pub struct DebugServer {
    addr: SocketAddr,
    frames: Sender<Vec<u8>>,
    drain: Receiver<Vec<u8>>,
}

impl DebugServer {
    /// Binds the listener and spawns the accept and sender threads. A bind
    /// failure is fatal: a debug session with no viewer port is useless.
    pub fn bind(addr: &str) -> LoomResult<Self> {
        let listener = TcpListener::bind(addr)
            .map_err(|e| LoomError::output(format!("debug server bind {addr}: {e}")))?;
        let local = listener.local_addr()?;
        info!(addr = %local, "debug viewer listening");

        let viewers: Arc<Mutex<Vec<WebSocket<TcpStream>>>> = Arc::new(Mutex::new(Vec::new()));

        let accepting = viewers.clone();
        thread::spawn(move || {
            for stream in listener.incoming() {
                let stream = match stream {
                    Ok(s) => s,
                    Err(e) => {
                        warn!(error = %e, "debug viewer accept failed");
                        continue;
                    }
                };
                match tungstenite::accept(stream) {
                    Ok(ws) => {
                        debug!("debug viewer connected");
                        accepting.lock().unwrap().push(ws);
                    }
                    Err(e) => warn!(error = %e, "websocket handshake failed"),
                }
            }
        });

        let (frames, rx) = crossbeam_channel::bounded::<Vec<u8>>(1);
        let drain = rx.clone();
        let sending = viewers;
        thread::spawn(move || {
            while let Ok(frame) = rx.recv() {
                sending
                    .lock()
                    .unwrap()
                    .retain_mut(|ws| match ws.send(Message::Binary(frame.clone())) {
                        Ok(()) => true,
                        Err(e) => {
                            debug!(error = %e, "debug viewer dropped");
                            false
                        }
                    });
            }
        });

        Ok(Self {
            addr: local,
            frames,
            drain,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }
}

impl Output for DebugServer {
    fn display(&mut self, system: &System) {
        let frame = crate::output::pack_frame(system);
        if let Err(TrySendError::Full(frame)) = self.frames.try_send(frame) {
            // replace the stale pending frame with this one
            let _ = self.drain.try_recv();
            let _ = self.frames.try_send(frame);
        }
    }
}
