//! Device directory: enumeration and opening of MIDI endpoints.
//!
//! The directory is a capability the resolver consumes; `MidirDirectory` is the
//! hardware-backed implementation via midir.

use crate::error::{Error, Result};
use crate::message::RawMessage;
use midir::{Ignore, MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

/// One entry of an enumeration snapshot.
///
/// Indices are stable only within the snapshot that produced them and must not
/// be cached across a re-enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub index: usize,
    pub name: String,
    pub description: String,
}

/// Callback invoked for every message the source device delivers.
///
/// The platform MIDI backend owns the thread this runs on, and the first
/// message can arrive while startup is still resolving the target, so the
/// handler must be safe to call concurrently.
pub type MessageHandler = Arc<dyn Fn(RawMessage<'_>) + Send + Sync>;

/// An open source device. Dropping it closes the connection and unsubscribes
/// the handler.
pub trait SourceStream: Send {
    fn descriptor(&self) -> &DeviceDescriptor;
}

/// Write capability of an open target device.
pub trait TargetPort: Send {
    fn descriptor(&self) -> &DeviceDescriptor;
    fn send(&mut self, bytes: &[u8]) -> Result<()>;
}

pub trait DeviceDirectory {
    /// Enumerate available devices as a fresh snapshot.
    fn list_devices(&self) -> Result<Vec<DeviceDescriptor>>;

    /// Open `descriptor` for input and subscribe `handler` to its messages.
    fn open_source(
        &self,
        descriptor: &DeviceDescriptor,
        handler: MessageHandler,
    ) -> Result<Box<dyn SourceStream>>;

    /// Open `descriptor` for output.
    fn open_target(&self, descriptor: &DeviceDescriptor) -> Result<Box<dyn TargetPort>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PortKind {
    Input,
    Output,
}

struct SnapshotEntry {
    descriptor: DeviceDescriptor,
    kind: PortKind,
    /// Index within the midir port list of `kind`.
    kind_index: usize,
}

/// Hardware directory backed by midir.
///
/// Input and output ports are merged into one indexed snapshot (inputs first)
/// so both roles select from the same listing. Opening a port for the wrong
/// direction fails as `DeviceUnavailable`, which the resolver treats like any
/// other failed candidate.
pub struct MidirDirectory {
    client_name: String,
    snapshot: Mutex<Vec<SnapshotEntry>>,
}

impl MidirDirectory {
    pub fn new(client_name: impl Into<String>) -> Self {
        Self {
            client_name: client_name.into(),
            snapshot: Mutex::new(Vec::new()),
        }
    }

    fn lookup(&self, descriptor: &DeviceDescriptor) -> Result<(PortKind, usize)> {
        let snapshot = self.snapshot.lock();
        let entry = snapshot
            .get(descriptor.index)
            .filter(|entry| entry.descriptor.name == descriptor.name)
            .ok_or_else(|| {
                Error::DeviceUnavailable(format!(
                    "{} is not in the current device snapshot",
                    descriptor.name
                ))
            })?;
        Ok((entry.kind, entry.kind_index))
    }
}

impl DeviceDirectory for MidirDirectory {
    fn list_devices(&self) -> Result<Vec<DeviceDescriptor>> {
        let midi_in = MidiInput::new(&format!("{}-enum-in", self.client_name))?;
        let midi_out = MidiOutput::new(&format!("{}-enum-out", self.client_name))?;

        let mut entries = Vec::new();
        for (kind_index, port) in midi_in.ports().iter().enumerate() {
            let name = midi_in
                .port_name(port)
                .unwrap_or_else(|_| format!("Unknown Device {}", kind_index));
            entries.push(SnapshotEntry {
                descriptor: DeviceDescriptor {
                    index: entries.len(),
                    name,
                    description: "MIDI input".to_string(),
                },
                kind: PortKind::Input,
                kind_index,
            });
        }
        for (kind_index, port) in midi_out.ports().iter().enumerate() {
            let name = midi_out
                .port_name(port)
                .unwrap_or_else(|_| format!("Unknown Device {}", kind_index));
            entries.push(SnapshotEntry {
                descriptor: DeviceDescriptor {
                    index: entries.len(),
                    name,
                    description: "MIDI output".to_string(),
                },
                kind: PortKind::Output,
                kind_index,
            });
        }

        let descriptors = entries.iter().map(|entry| entry.descriptor.clone()).collect();
        *self.snapshot.lock() = entries;
        Ok(descriptors)
    }

    fn open_source(
        &self,
        descriptor: &DeviceDescriptor,
        handler: MessageHandler,
    ) -> Result<Box<dyn SourceStream>> {
        let (kind, kind_index) = self.lookup(descriptor)?;
        if kind != PortKind::Input {
            return Err(Error::DeviceUnavailable(format!(
                "{} is not an input device",
                descriptor.name
            )));
        }

        let mut midi_in = MidiInput::new(&format!("{}-in", self.client_name))?;
        midi_in.ignore(Ignore::None);
        let ports = midi_in.ports();
        let port = self.checked_port(&ports, kind_index, descriptor, |port| {
            midi_in.port_name(port)
        })?;

        let connection = midi_in.connect(
            &port,
            "midi-relay-source",
            move |timestamp, bytes, _| {
                (*handler)(RawMessage {
                    bytes,
                    timestamp: timestamp as i64,
                });
            },
            (),
        )?;
        debug!("source connection open: {}", descriptor.name);

        Ok(Box::new(MidirSource {
            descriptor: descriptor.clone(),
            _connection: connection,
        }))
    }

    fn open_target(&self, descriptor: &DeviceDescriptor) -> Result<Box<dyn TargetPort>> {
        let (kind, kind_index) = self.lookup(descriptor)?;
        if kind != PortKind::Output {
            return Err(Error::DeviceUnavailable(format!(
                "{} is not an output device",
                descriptor.name
            )));
        }

        let midi_out = MidiOutput::new(&format!("{}-out", self.client_name))?;
        let ports = midi_out.ports();
        let port = self.checked_port(&ports, kind_index, descriptor, |port| {
            midi_out.port_name(port)
        })?;

        let connection = midi_out.connect(&port, "midi-relay-target")?;
        debug!("target connection open: {}", descriptor.name);

        Ok(Box::new(MidirTarget {
            descriptor: descriptor.clone(),
            connection,
        }))
    }
}

impl MidirDirectory {
    /// Fetch the port at `kind_index` and verify the enumeration has not
    /// shifted underneath the snapshot since `list_devices`.
    fn checked_port<P: Clone>(
        &self,
        ports: &[P],
        kind_index: usize,
        descriptor: &DeviceDescriptor,
        port_name: impl Fn(&P) -> std::result::Result<String, midir::PortInfoError>,
    ) -> Result<P> {
        let port = ports.get(kind_index).ok_or_else(|| {
            Error::DeviceUnavailable(format!("{} is no longer present", descriptor.name))
        })?;
        let name = port_name(port).map_err(|e| Error::Midi(e.to_string()))?;
        if name != descriptor.name {
            return Err(Error::DeviceUnavailable(format!(
                "device list changed: expected '{}', found '{}'",
                descriptor.name, name
            )));
        }
        Ok(port.clone())
    }
}

struct MidirSource {
    descriptor: DeviceDescriptor,
    _connection: MidiInputConnection<()>,
}

impl SourceStream for MidirSource {
    fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }
}

struct MidirTarget {
    descriptor: DeviceDescriptor,
    connection: MidiOutputConnection,
}

impl TargetPort for MidirTarget {
    fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    fn send(&mut self, bytes: &[u8]) -> Result<()> {
        self.connection.send(bytes)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Hardware enumeration depends on the machine; just verify the snapshot
    // call does not fail outright and yields contiguous indices.
    #[test]
    fn test_list_devices_indices_are_contiguous() {
        let directory = MidirDirectory::new("midi-relay-test");
        if let Ok(devices) = directory.list_devices() {
            for (expected, device) in devices.iter().enumerate() {
                assert_eq!(device.index, expected);
            }
        }
    }

    #[test]
    fn test_open_with_stale_descriptor_is_unavailable() {
        let directory = MidirDirectory::new("midi-relay-test");
        let _ = directory.list_devices();
        let stale = DeviceDescriptor {
            index: usize::MAX,
            name: "No Such Device".to_string(),
            description: "MIDI input".to_string(),
        };
        let handler: MessageHandler = Arc::new(|_| {});
        let err = directory.open_source(&stale, handler).err();
        assert!(matches!(err, Some(Error::DeviceUnavailable(_))));
    }
}
