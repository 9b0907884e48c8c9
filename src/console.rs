//! Interactive device selection at the terminal.

use crate::directory::DeviceDescriptor;
use crate::error::{Error, Result};
use crate::resolver::{DeviceChooser, Role};
use std::io::{self, BufRead, BufReader, Stdin, Stdout, Write};

/// Re-prompts allowed before a selection is abandoned. Malformed input is
/// recoverable, but not forever.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

const BANNER: &str = "----------------------------------------";

/// Line-oriented device chooser.
///
/// Lists every device with its index, name and description, then reads a
/// base-10 index, re-prompting on anything that is not an integer inside the
/// listed range.
pub struct ConsoleChooser<R, W> {
    input: R,
    output: W,
    max_attempts: u32,
}

impl ConsoleChooser<BufReader<Stdin>, Stdout> {
    pub fn stdio() -> Self {
        Self::new(BufReader::new(io::stdin()), io::stdout())
    }
}

impl<R: BufRead, W: Write> ConsoleChooser<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self {
            input,
            output,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    fn list_devices(&mut self, devices: &[DeviceDescriptor]) -> io::Result<()> {
        writeln!(self.output, "{}", BANNER)?;
        for device in devices {
            writeln!(self.output, "Device Index: {}", device.index)?;
            writeln!(self.output, "Device Name: {}", device.name)?;
            writeln!(self.output, "Device Description: {}", device.description)?;
            writeln!(self.output, "{}", BANNER)?;
        }
        Ok(())
    }
}

impl<R: BufRead, W: Write> DeviceChooser for ConsoleChooser<R, W> {
    fn choose(&mut self, role: Role, devices: &[DeviceDescriptor]) -> Result<usize> {
        self.list_devices(devices)?;

        for _ in 0..self.max_attempts {
            write!(self.output, "Select {} device: ", role)?;
            self.output.flush()?;

            let mut line = String::new();
            if self.input.read_line(&mut line)? == 0 {
                // EOF: nothing further will arrive, so re-prompting is pointless.
                return Err(Error::SelectionAborted(role));
            }
            match line.trim().parse::<usize>() {
                Ok(index) if index < devices.len() => return Ok(index),
                _ => writeln!(
                    self.output,
                    "Invalid input; expects integer within range: 0, {}",
                    devices.len().saturating_sub(1)
                )?,
            }
        }

        Err(Error::SelectionAborted(role))
    }
}
