//! Error types for device resolution and routing.

use crate::resolver::Role;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("MIDI backend error: {0}")]
    Midi(String),

    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("every known {0} device failed to open")]
    DevicesExhausted(Role),

    #[error("no valid {0} device index was entered")]
    SelectionAborted(Role),

    #[error("routing sink is already bound to a target device")]
    SinkAlreadyBound,

    #[error("routing sink has no target device bound")]
    SinkUnbound,
}

impl From<midir::InitError> for Error {
    fn from(e: midir::InitError) -> Self {
        Error::Midi(e.to_string())
    }
}

impl From<midir::ConnectError<midir::MidiInput>> for Error {
    fn from(e: midir::ConnectError<midir::MidiInput>) -> Self {
        Error::DeviceUnavailable(e.to_string())
    }
}

impl From<midir::ConnectError<midir::MidiOutput>> for Error {
    fn from(e: midir::ConnectError<midir::MidiOutput>) -> Self {
        Error::DeviceUnavailable(e.to_string())
    }
}

impl From<midir::SendError> for Error {
    fn from(e: midir::SendError) -> Self {
        Error::Midi(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
