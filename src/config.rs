//! Preferred-device configuration.
//!
//! Two lines of UTF-8 text: the preferred source device name, then the
//! preferred target device name, trailing whitespace stripped. A missing or
//! unreadable file is not an error; it switches resolution to interactive
//! selection.

use std::fs;
use std::path::Path;
use tracing::{debug, info};

pub const DEFAULT_CONFIG_PATH: &str = "devices.txt";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DevicePrefs {
    pub source: String,
    pub target: String,
}

pub fn load(path: &Path) -> Option<DevicePrefs> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            debug!("no device preferences at {}: {}", path.display(), e);
            return None;
        }
    };

    let mut lines = text.lines();
    let source = lines.next().map(str::trim_end).unwrap_or_default();
    let target = lines.next().map(str::trim_end).unwrap_or_default();
    if source.is_empty() || target.is_empty() {
        debug!("device preferences at {} are incomplete, ignoring", path.display());
        return None;
    }

    info!("device preferences loaded from {}", path.display());
    Some(DevicePrefs {
        source: source.to_string(),
        target: target.to_string(),
    })
}
