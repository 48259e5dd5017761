//! Background thread plumbing shared by the flush, checkpoint and compactor
//! threads.

use crate::error::{Error, Result};
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const JOIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Cooperative stop flag.
///
/// Stopping drops the only sender, so every clone of the receiver observes a
/// disconnected channel. Threads check it between units of work and while
/// waiting.
#[derive(Debug)]
pub struct StopSignal {
    sender: Mutex<Option<Sender<()>>>,
    receiver: Receiver<()>,
}

impl StopSignal {
    pub fn new() -> Self {
        let (sender, receiver) = channel::bounded(0);
        Self { sender: Mutex::new(Some(sender)), receiver }
    }

    /// Signals all threads to stop. Idempotent.
    pub fn stop(&self) {
        self.sender.lock().take();
    }

    /// A receiver that becomes ready once the signal is stopped.
    pub fn receiver(&self) -> StopReceiver {
        StopReceiver { receiver: self.receiver.clone() }
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Thread-side view of a [`StopSignal`].
#[derive(Debug, Clone)]
pub struct StopReceiver {
    receiver: Receiver<()>,
}

impl StopReceiver {
    pub fn is_stopped(&self) -> bool {
        matches!(self.receiver.try_recv(), Err(channel::TryRecvError::Disconnected))
    }

    /// Sleeps for `delay` or until stopped. Returns `true` if stopped.
    pub fn wait(&self, delay: Duration) -> bool {
        !matches!(self.receiver.recv_timeout(delay), Err(RecvTimeoutError::Timeout))
    }

    pub(crate) fn channel(&self) -> &Receiver<()> {
        &self.receiver
    }
}

/// A named background thread.
pub struct Worker {
    name: String,
    handle: JoinHandle<()>,
}

impl Worker {
    pub fn spawn<F>(name: impl Into<String>, f: F) -> Result<Self>
    where
        F: FnOnce() + Send + 'static,
    {
        let name = name.into();
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(f)
            .map_err(|e| Error::internal(format!("Unable to start thread {}: {}", name, e)))?;

        log::debug!("Started thread {}", name);
        Ok(Self { name, handle })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Waits up to `timeout` for the thread to finish.
    ///
    /// Returns `false` if the thread is still running; it is then left
    /// detached.
    pub fn join_timeout(self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;

        while !self.handle.is_finished() {
            if Instant::now() >= deadline {
                log::warn!("Thread {} did not stop within {:?}", self.name, timeout);
                return false;
            }
            thread::sleep(JOIN_POLL_INTERVAL);
        }

        if self.handle.join().is_err() {
            log::error!("Thread {} panicked", self.name);
        } else {
            log::debug!("Stopped thread {}", self.name);
        }
        true
    }
}
