//! Bridge one MIDI input device to one MIDI output device.
//!
//! Three pieces carry the weight: the device resolver (turns preferred names
//! or interactive picks into a live source/target pair, retrying through open
//! failures), the channel-voice decoder (pure byte-level classification of
//! Control Change and Program Change messages), and the routing sink (the
//! bind-once, single-writer egress for the target device).

pub mod error;
pub use error::{Error, Result};

pub mod message;
pub use message::{decode, ChannelMessage, RawMessage};

pub mod directory;
pub use directory::{
    DeviceDescriptor, DeviceDirectory, MessageHandler, MidirDirectory, SourceStream, TargetPort,
};

pub mod resolver;
pub use resolver::{DeviceChooser, DeviceSelection, Resolver, Role};

pub mod console;
pub use console::ConsoleChooser;

pub mod sink;
pub use sink::{RoutingSink, TargetWriter};

pub mod relay;
pub use relay::forwarding_handler;

pub mod config;
pub use config::DevicePrefs;
