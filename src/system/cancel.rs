//! Cooperative cancellation of the control loop.
//!
//! Producers hold a [`CancelHandle`]; the loop owns the [`CancelSignal`] and
//! only looks at it while waiting for its next tick.

use std::io::{self, BufRead};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, unbounded};
use tracing::info;

/// Sending side: request that the loop stop after its current iteration.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Sender<()>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        // The loop may already be gone; nothing to do then.
        let _ = self.tx.send(());
    }
}

/// Receiving side, owned by the control loop.
#[derive(Debug)]
pub struct CancelSignal {
    rx: Receiver<()>,
}

impl CancelSignal {
    pub(crate) fn receiver(&self) -> &Receiver<()> {
        &self.rx
    }

    /// Non-consuming check for a pending request.
    pub fn is_pending(&self) -> bool {
        !self.rx.is_empty()
    }
}

pub fn cancel_channel() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = unbounded();
    (CancelHandle { tx }, CancelSignal { rx })
}

/// Watch stdin for a line starting with `key` and cancel when seen.
///
/// The thread is detached: it blocks on stdin and ends with the process.
pub fn spawn_key_watcher(key: char, handle: CancelHandle) -> JoinHandle<()> {
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if is_quit_line(&line, key) {
                info!("Quit key '{}' received", key);
                handle.cancel();
                break;
            }
        }
    })
}

fn is_quit_line(line: &str, key: char) -> bool {
    line.trim().chars().next() == Some(key)
}
