//! Device acquisition: resolve a live source/target device pair.
//!
//! Candidates come from preferred names or interactive selection and are
//! tried front to back; every failed open advances the queue, and an
//! exhausted queue falls back to interactive selection a bounded number of
//! times before the role is reported as unresolvable.

use crate::config::DevicePrefs;
use crate::directory::{DeviceDescriptor, DeviceDirectory, MessageHandler, SourceStream};
use crate::error::{Error, Result};
use crate::sink::{RoutingSink, TargetWriter};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Source,
    Target,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Source => f.write_str("source"),
            Role::Target => f.write_str("target"),
        }
    }
}

/// Candidate devices for one role, tried front to back.
///
/// Consumed destructively: every attempt removes the front element, so after
/// `k` failed opens a queue of `n` holds `n - k` candidates. Entries carry
/// the full descriptor from the snapshot that produced them; a bare index
/// would be silently reinterpreted after a re-enumeration shifts the listing.
#[derive(Debug)]
pub struct DeviceSelection {
    role: Role,
    candidates: VecDeque<DeviceDescriptor>,
}

impl DeviceSelection {
    /// Queue every device whose name equals `preferred` (exact, case
    /// sensitive, full string), in enumeration order. An empty queue means
    /// the role needs interactive fallback.
    pub fn from_preference(role: Role, devices: &[DeviceDescriptor], preferred: &str) -> Self {
        let candidates = devices
            .iter()
            .filter(|device| device.name == preferred)
            .cloned()
            .collect();
        Self { role, candidates }
    }

    pub fn empty(role: Role) -> Self {
        Self {
            role,
            candidates: VecDeque::new(),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Take the next candidate to attempt.
    pub fn pop(&mut self) -> Option<DeviceDescriptor> {
        self.candidates.pop_front()
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

/// Solicits a device index for a role when no candidate is left.
pub trait DeviceChooser {
    fn choose(&mut self, role: Role, devices: &[DeviceDescriptor]) -> Result<usize>;
}

/// Interactive fallbacks allowed per role before resolution gives up.
pub const DEFAULT_MAX_FALLBACKS: u32 = 3;

pub struct Resolver<'a, D, C> {
    directory: &'a D,
    chooser: C,
    max_fallbacks: u32,
}

impl<'a, D: DeviceDirectory, C: DeviceChooser> Resolver<'a, D, C> {
    pub fn new(directory: &'a D, chooser: C) -> Self {
        Self {
            directory,
            chooser,
            max_fallbacks: DEFAULT_MAX_FALLBACKS,
        }
    }

    pub fn with_max_fallbacks(mut self, max_fallbacks: u32) -> Self {
        self.max_fallbacks = max_fallbacks;
        self
    }

    /// Resolve both roles: open a source device with `handler` subscribed to
    /// its message stream, open a target device and bind its write capability
    /// into `sink`.
    ///
    /// Source and target are advanced interleaved, one attempt per role per
    /// iteration. Terminates when both roles are live, or with
    /// `DevicesExhausted` once a role has burned through its candidates and
    /// its interactive fallbacks.
    pub fn resolve(
        &mut self,
        prefs: Option<&DevicePrefs>,
        handler: MessageHandler,
        sink: &RoutingSink,
    ) -> Result<(Box<dyn SourceStream>, TargetWriter)> {
        let mut devices = self.directory.list_devices()?;

        let (mut source_sel, mut target_sel) = match prefs {
            Some(prefs) => {
                let source = DeviceSelection::from_preference(Role::Source, &devices, &prefs.source);
                let target = DeviceSelection::from_preference(Role::Target, &devices, &prefs.target);
                if source.is_empty() {
                    warn!(
                        "no device named '{}' for the source role, falling back to interactive selection",
                        prefs.source
                    );
                }
                if target.is_empty() {
                    warn!(
                        "no device named '{}' for the target role, falling back to interactive selection",
                        prefs.target
                    );
                }
                (source, target)
            }
            None => (
                DeviceSelection::empty(Role::Source),
                DeviceSelection::empty(Role::Target),
            ),
        };

        let mut source_fallbacks = self.max_fallbacks;
        let mut target_fallbacks = self.max_fallbacks;
        let mut source: Option<Box<dyn SourceStream>> = None;
        let mut target: Option<TargetWriter> = None;

        while source.is_none() || target.is_none() {
            if source.is_none() {
                let descriptor =
                    self.next_candidate(&mut source_sel, &mut devices, &mut source_fallbacks)?;
                match self.directory.open_source(&descriptor, Arc::clone(&handler)) {
                    Ok(stream) => {
                        info!("source device opened: {}", descriptor.name);
                        source = Some(stream);
                    }
                    Err(e) => {
                        warn!("failed to open source device {}: {}", descriptor.name, e);
                    }
                }
            }
            if target.is_none() {
                let descriptor =
                    self.next_candidate(&mut target_sel, &mut devices, &mut target_fallbacks)?;
                match self.directory.open_target(&descriptor) {
                    Ok(port) => {
                        info!("target device opened: {}", descriptor.name);
                        target = Some(sink.bind(port)?);
                    }
                    Err(e) => {
                        warn!("failed to open target device {}: {}", descriptor.name, e);
                    }
                }
            }
        }

        match (source, target) {
            (Some(source), Some(target)) => Ok((source, target)),
            _ => unreachable!("loop exits only when both roles are resolved"),
        }
    }

    /// Next device to try for a role: the front of its queue re-validated
    /// against the current snapshot, or one interactive pick per exhaustion
    /// until the fallback budget runs out.
    fn next_candidate(
        &mut self,
        selection: &mut DeviceSelection,
        devices: &mut Vec<DeviceDescriptor>,
        fallbacks_left: &mut u32,
    ) -> Result<DeviceDescriptor> {
        loop {
            while let Some(queued) = selection.pop() {
                match relocate(&queued, devices) {
                    Some(descriptor) => return Ok(descriptor),
                    None => warn!(
                        "{} candidate '{}' is gone from the current device snapshot, skipping",
                        selection.role(),
                        queued.name
                    ),
                }
            }
            if *fallbacks_left == 0 {
                return Err(Error::DevicesExhausted(selection.role()));
            }
            *fallbacks_left -= 1;
            // Indices are only valid within one enumeration snapshot, so take
            // a fresh one before prompting.
            *devices = self.directory.list_devices()?;
            let index = self.chooser.choose(selection.role(), devices)?;
            match devices.get(index) {
                Some(descriptor) => return Ok(descriptor.clone()),
                None => warn!(
                    "{} selection {} is outside the device snapshot",
                    selection.role(),
                    index
                ),
            }
        }
    }
}

/// Map a queued candidate onto the current snapshot.
///
/// The queued index is honored while it still names the same device; once a
/// re-enumeration has shifted the listing the device is found again by name.
/// `None` means the device is no longer present and the candidate must be
/// skipped, never opened blind.
fn relocate(queued: &DeviceDescriptor, devices: &[DeviceDescriptor]) -> Option<DeviceDescriptor> {
    if let Some(current) = devices.get(queued.index) {
        if current.name == queued.name {
            return Some(current.clone());
        }
    }
    devices.iter().find(|device| device.name == queued.name).cloned()
}
