//! Routing sink: the single egress point for the open target device.
//!
//! The write capability is bound exactly once and then shared through
//! cloneable `TargetWriter` handles. All writers funnel into one bounded
//! command queue drained by a dedicated thread, so the device sees a single
//! serialized byte stream no matter how many threads forward messages.

use crate::directory::TargetPort;
use crate::error::{Error, Result};
use arc_swap::ArcSwapOption;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{debug, warn};

const COMMAND_QUEUE_CAPACITY: usize = 1024;

enum SinkCommand {
    Send(Vec<u8>),
    Shutdown,
}

/// Handle to the bound target's writer thread.
#[derive(Clone)]
pub struct TargetWriter {
    commands: Sender<SinkCommand>,
    device: Arc<str>,
}

impl TargetWriter {
    /// Queue `bytes` for the target device. Never blocks; a full queue or a
    /// torn-down writer drops the message with a log line.
    pub fn send(&self, bytes: &[u8]) {
        match self.commands.try_send(SinkCommand::Send(bytes.to_vec())) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                debug!("sink queue full, dropping message for {}", self.device);
            }
            Err(TrySendError::Disconnected(_)) => {
                debug!("sink writer gone, dropping message for {}", self.device);
            }
        }
    }

    pub fn device_name(&self) -> &str {
        &self.device
    }
}

pub struct RoutingSink {
    bound: AtomicBool,
    writer: ArcSwapOption<TargetWriter>,
    #[cfg(test)]
    fail_spawn: AtomicBool,
}

impl RoutingSink {
    pub fn new() -> Self {
        Self {
            bound: AtomicBool::new(false),
            writer: ArcSwapOption::empty(),
            #[cfg(test)]
            fail_spawn: AtomicBool::new(false),
        }
    }

    /// Publish the target device's write capability.
    ///
    /// At most one binding may ever exist; a second call is a startup bug,
    /// not a runtime-recoverable condition. A failed bind leaves the sink
    /// unbound, so the caller may retry with another target.
    pub fn bind(&self, target: Box<dyn TargetPort>) -> Result<TargetWriter> {
        if self
            .bound
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(Error::SinkAlreadyBound);
        }

        match self.spawn_writer(target) {
            Ok(writer) => {
                self.writer.store(Some(Arc::new(writer.clone())));
                debug!("routing sink bound to {}", writer.device);
                Ok(writer)
            }
            Err(e) => {
                self.bound.store(false, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    fn spawn_writer(&self, target: Box<dyn TargetPort>) -> Result<TargetWriter> {
        #[cfg(test)]
        if self.fail_spawn.load(Ordering::SeqCst) {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "writer thread spawn failed",
            )));
        }

        let device: Arc<str> = target.descriptor().name.as_str().into();
        let (commands, receiver) = bounded(COMMAND_QUEUE_CAPACITY);
        thread::Builder::new()
            .name("midi-relay-writer".to_string())
            .spawn(move || Self::writer_thread(receiver, target))?;
        Ok(TargetWriter { commands, device })
    }

    /// The bound target's write capability. Stable from the first successful
    /// `bind` until teardown.
    pub fn current_target(&self) -> Result<TargetWriter> {
        self.writer
            .load_full()
            .map(|writer| (*writer).clone())
            .ok_or(Error::SinkUnbound)
    }

    pub fn is_bound(&self) -> bool {
        self.bound.load(Ordering::SeqCst)
    }

    fn writer_thread(receiver: Receiver<SinkCommand>, mut target: Box<dyn TargetPort>) {
        for command in receiver {
            match command {
                SinkCommand::Send(bytes) => {
                    if let Err(e) = target.send(&bytes) {
                        warn!(
                            "failed to write to target device {}: {}",
                            target.descriptor().name,
                            e
                        );
                    }
                }
                SinkCommand::Shutdown => break,
            }
        }
        debug!("routing sink torn down: {}", target.descriptor().name);
    }
}

impl Default for RoutingSink {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for RoutingSink {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.load_full() {
            let _ = writer.commands.send(SinkCommand::Shutdown);
        }
    }
}
