//! Resolver, sink and relay pipeline tests against an in-memory directory.

use midi_relay::{
    config::DevicePrefs,
    directory::{DeviceDescriptor, DeviceDirectory, MessageHandler, SourceStream, TargetPort},
    forwarding_handler,
    message::RawMessage,
    resolver::{DeviceChooser, Resolver, Role},
    Error, Result, RoutingSink,
};
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

// ---------------------------------------------------------------------------
// In-memory device directory
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Shared {
    handlers: Vec<MessageHandler>,
    written: Vec<Vec<u8>>,
    failing: HashSet<usize>,
    source_attempts: Vec<usize>,
    target_attempts: Vec<usize>,
}

struct FakeDirectory {
    snapshots: Mutex<VecDeque<Vec<DeviceDescriptor>>>,
    shared: Arc<Mutex<Shared>>,
}

impl FakeDirectory {
    fn new(names: &[&str]) -> Self {
        Self {
            snapshots: Mutex::new(VecDeque::from([listing(names)])),
            shared: Arc::new(Mutex::new(Shared::default())),
        }
    }

    /// Queue the listing the next re-enumeration returns; the last queued
    /// listing repeats from then on.
    fn then_listing(self, names: &[&str]) -> Self {
        self.snapshots.lock().push_back(listing(names));
        self
    }

    fn fail_indices(self, indices: &[usize]) -> Self {
        self.shared.lock().failing = indices.iter().copied().collect();
        self
    }
}

fn listing(names: &[&str]) -> Vec<DeviceDescriptor> {
    names
        .iter()
        .enumerate()
        .map(|(index, name)| descriptor(index, name))
        .collect()
}

fn descriptor(index: usize, name: &str) -> DeviceDescriptor {
    DeviceDescriptor {
        index,
        name: name.to_string(),
        description: format!("fake device {}", index),
    }
}

struct FakeSource {
    descriptor: DeviceDescriptor,
}

impl SourceStream for FakeSource {
    fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }
}

struct FakeTarget {
    descriptor: DeviceDescriptor,
    shared: Arc<Mutex<Shared>>,
}

impl TargetPort for FakeTarget {
    fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    fn send(&mut self, bytes: &[u8]) -> Result<()> {
        self.shared.lock().written.push(bytes.to_vec());
        Ok(())
    }
}

impl DeviceDirectory for FakeDirectory {
    fn list_devices(&self) -> Result<Vec<DeviceDescriptor>> {
        let mut snapshots = self.snapshots.lock();
        if snapshots.len() > 1 {
            Ok(snapshots.pop_front().unwrap())
        } else {
            Ok(snapshots.front().cloned().unwrap())
        }
    }

    fn open_source(
        &self,
        descriptor: &DeviceDescriptor,
        handler: MessageHandler,
    ) -> Result<Box<dyn SourceStream>> {
        let mut shared = self.shared.lock();
        shared.source_attempts.push(descriptor.index);
        if shared.failing.contains(&descriptor.index) {
            return Err(Error::DeviceUnavailable(descriptor.name.clone()));
        }
        shared.handlers.push(handler);
        Ok(Box::new(FakeSource {
            descriptor: descriptor.clone(),
        }))
    }

    fn open_target(&self, descriptor: &DeviceDescriptor) -> Result<Box<dyn TargetPort>> {
        let mut shared = self.shared.lock();
        shared.target_attempts.push(descriptor.index);
        if shared.failing.contains(&descriptor.index) {
            return Err(Error::DeviceUnavailable(descriptor.name.clone()));
        }
        Ok(Box::new(FakeTarget {
            descriptor: descriptor.clone(),
            shared: Arc::clone(&self.shared),
        }))
    }
}

// ---------------------------------------------------------------------------
// Choosers
// ---------------------------------------------------------------------------

/// Panics when consulted: for scenarios that must resolve without prompting.
struct NoPrompt;

impl DeviceChooser for NoPrompt {
    fn choose(&mut self, role: Role, _devices: &[DeviceDescriptor]) -> Result<usize> {
        panic!("interactive fallback should not run for the {} role", role);
    }
}

struct ScriptedChooser {
    picks: VecDeque<usize>,
    prompted: Arc<Mutex<Vec<Role>>>,
}

impl ScriptedChooser {
    fn new(picks: &[usize]) -> Self {
        Self {
            picks: picks.iter().copied().collect(),
            prompted: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A chooser plus a handle onto the roles it gets prompted for.
    fn recording(picks: &[usize]) -> (Self, Arc<Mutex<Vec<Role>>>) {
        let chooser = Self::new(picks);
        let prompted = Arc::clone(&chooser.prompted);
        (chooser, prompted)
    }
}

impl DeviceChooser for ScriptedChooser {
    fn choose(&mut self, role: Role, _devices: &[DeviceDescriptor]) -> Result<usize> {
        self.prompted.lock().push(role);
        self.picks
            .pop_front()
            .ok_or(Error::SelectionAborted(role))
    }
}

fn wait_for_writes(shared: &Arc<Mutex<Shared>>, count: usize) {
    for _ in 0..100 {
        if shared.lock().written.len() >= count {
            return;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    panic!("sink writer did not flush {} messages in time", count);
}

fn prefs(source: &str, target: &str) -> DevicePrefs {
    DevicePrefs {
        source: source.to_string(),
        target: target.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Resolution scenarios
// ---------------------------------------------------------------------------

/// Config names listed at indices 2 and 5 resolve directly, no prompting.
#[test]
fn test_preferred_names_resolve_without_prompting() {
    let directory = FakeDirectory::new(&[
        "Through Port",
        "Drum Pads",
        "Input X",
        "Mixer",
        "Sampler",
        "Output Y",
    ]);
    let sink = RoutingSink::new();
    let handler: MessageHandler = Arc::new(|_| {});

    let mut resolver = Resolver::new(&directory, NoPrompt);
    let (source, target) = resolver
        .resolve(Some(&prefs("Input X", "Output Y")), handler, &sink)
        .unwrap();

    assert_eq!(source.descriptor().index, 2);
    assert_eq!(target.device_name(), "Output Y");

    let shared = directory.shared.lock();
    assert_eq!(shared.source_attempts, vec![2]);
    assert_eq!(shared.target_attempts, vec![5]);
}

/// Every failed open consumes one candidate; exhaustion falls back to the
/// chooser exactly once.
#[test]
fn test_failed_opens_advance_then_fall_back() {
    // Two devices share the preferred source name and both fail to open.
    let directory =
        FakeDirectory::new(&["Synth", "Synth", "Backup Keys", "Main Out"]).fail_indices(&[0, 1]);
    let sink = RoutingSink::new();
    let handler: MessageHandler = Arc::new(|_| {});

    let chooser = ScriptedChooser::new(&[2]);
    let mut resolver = Resolver::new(&directory, chooser);
    let (source, _target) = resolver
        .resolve(Some(&prefs("Synth", "Main Out")), handler, &sink)
        .unwrap();

    assert_eq!(source.descriptor().name, "Backup Keys");
    let shared = directory.shared.lock();
    assert_eq!(shared.source_attempts, vec![0, 1, 2]);
    assert_eq!(shared.target_attempts, vec![3]);
}

/// Preferred names that match nothing trigger interactive fallback instead of
/// silently never resolving.
#[test]
fn test_unmatched_preference_falls_back_interactively() {
    let directory = FakeDirectory::new(&["Keys", "Main Out"]);
    let sink = RoutingSink::new();
    let handler: MessageHandler = Arc::new(|_| {});

    let mut resolver = Resolver::new(&directory, ScriptedChooser::new(&[0, 1]));
    let (source, target) = resolver
        .resolve(Some(&prefs("Unplugged Keys", "Unplugged Out")), handler, &sink)
        .unwrap();

    assert_eq!(source.descriptor().name, "Keys");
    assert_eq!(target.device_name(), "Main Out");
}

/// No preferences at all: both roles are solicited interactively.
#[test]
fn test_no_preferences_prompts_both_roles() {
    let directory = FakeDirectory::new(&["Keys", "Main Out"]);
    let sink = RoutingSink::new();
    let handler: MessageHandler = Arc::new(|_| {});

    let chooser = ScriptedChooser::new(&[0, 1]);
    let mut resolver = Resolver::new(&directory, chooser);
    let (source, target) = resolver.resolve(None, handler, &sink).unwrap();

    assert_eq!(source.descriptor().index, 0);
    assert_eq!(target.device_name(), "Main Out");
}

/// Burning through candidates and the fallback budget is a hard error, not an
/// infinite retry loop.
#[test]
fn test_exhaustion_is_fatal() {
    let directory = FakeDirectory::new(&["Keys", "Main Out"]).fail_indices(&[0, 1]);
    let sink = RoutingSink::new();
    let handler: MessageHandler = Arc::new(|_| {});

    let chooser = ScriptedChooser::new(&[0, 1, 0, 1, 0, 1]);
    let mut resolver = Resolver::new(&directory, chooser).with_max_fallbacks(2);
    let err = resolver.resolve(None, handler, &sink).err();

    assert!(matches!(err, Some(Error::DevicesExhausted(Role::Source))));
}

/// Candidates queued from one snapshot are re-validated against the snapshot
/// current at open time: a listing shift re-locates the preferred device by
/// name instead of reusing its stale index.
#[test]
fn test_shifted_listing_relocates_queued_candidate_by_name() {
    let directory = FakeDirectory::new(&["Input X", "Output Y"])
        .then_listing(&["Input X", "USB Hub Port", "Output Y"]);
    let sink = RoutingSink::new();
    let handler: MessageHandler = Arc::new(|_| {});

    // The unmatched source preference forces a re-enumeration before the
    // queued target candidate is attempted.
    let mut resolver = Resolver::new(&directory, ScriptedChooser::new(&[0]));
    let (source, target) = resolver
        .resolve(Some(&prefs("Unplugged Keys", "Output Y")), handler, &sink)
        .unwrap();

    assert_eq!(source.descriptor().name, "Input X");
    assert_eq!(target.device_name(), "Output Y");
    let shared = directory.shared.lock();
    assert_eq!(shared.target_attempts, vec![2]);
}

/// A queued candidate that disappears in a re-enumeration is skipped and the
/// role is prompted, never silently mapped onto whatever now occupies its
/// old index.
#[test]
fn test_vanished_candidate_prompts_instead_of_opening_by_index() {
    let directory =
        FakeDirectory::new(&["Input X", "Output Y"]).then_listing(&["Input X", "USB Hub Port"]);
    let sink = RoutingSink::new();
    let handler: MessageHandler = Arc::new(|_| {});

    let (chooser, prompted) = ScriptedChooser::recording(&[0, 1]);
    let mut resolver = Resolver::new(&directory, chooser);
    let (_source, target) = resolver
        .resolve(Some(&prefs("Unplugged Keys", "Output Y")), handler, &sink)
        .unwrap();

    assert_eq!(target.device_name(), "USB Hub Port");
    assert_eq!(*prompted.lock(), vec![Role::Source, Role::Target]);
}

// ---------------------------------------------------------------------------
// End-to-end relay flow
// ---------------------------------------------------------------------------

/// Raw messages pushed through the source callback come out of the target
/// device byte-for-byte when recognized, and not at all when not.
#[test]
fn test_recognized_messages_are_forwarded_verbatim() {
    let directory = FakeDirectory::new(&["Input X", "Output Y"]);
    let sink = Arc::new(RoutingSink::new());
    let handler = forwarding_handler(Arc::clone(&sink));

    let mut resolver = Resolver::new(&directory, NoPrompt);
    let (_source, _target) = resolver
        .resolve(Some(&prefs("Input X", "Output Y")), handler, &sink)
        .unwrap();

    let handler = directory.shared.lock().handlers[0].clone();
    (*handler)(RawMessage {
        bytes: &[0xB0, 0x07, 0x64],
        timestamp: 0,
    });
    // Note On is outside the recognized ranges and must be dropped.
    (*handler)(RawMessage {
        bytes: &[0x90, 0x40, 0x7F],
        timestamp: 1,
    });
    (*handler)(RawMessage {
        bytes: &[0xCF, 0x05],
        timestamp: 2,
    });

    wait_for_writes(&directory.shared, 2);
    let shared = directory.shared.lock();
    assert_eq!(shared.written, vec![vec![0xB0, 0x07, 0x64], vec![0xCF, 0x05]]);
}

/// Messages that beat the target bind are dropped, not wedged.
#[test]
fn test_message_before_bind_is_dropped() {
    let sink = Arc::new(RoutingSink::new());
    let handler = forwarding_handler(Arc::clone(&sink));

    (*handler)(RawMessage {
        bytes: &[0xB0, 0x07, 0x64],
        timestamp: 0,
    });
    // Nothing to assert beyond "did not panic": the sink is still unbound.
    assert!(sink.current_target().is_err());
}
