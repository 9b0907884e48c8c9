//! Channel-voice message decoding per the MIDI 1.0 byte-stream encoding.

/// Raw bytes of one inbound MIDI message plus its device-relative timestamp.
///
/// Ephemeral: borrowed for the duration of one decode call.
#[derive(Debug, Clone, Copy)]
pub struct RawMessage<'a> {
    pub bytes: &'a [u8],
    pub timestamp: i64,
}

const CONTROL_CHANGE_BASE: u8 = 0xB0;
const CONTROL_CHANGE_MAX: u8 = 0xBF;
const PROGRAM_CHANGE_BASE: u8 = 0xC0;
const PROGRAM_CHANGE_MAX: u8 = 0xCF;

/// A decoded channel-voice message.
///
/// Channels are 1-based (1..=16) even though the wire encodes a 0-based
/// nibble. Data bytes are passed through without range checks, so values
/// above 127 survive verbatim and consumers must not assume protocol-legal
/// ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelMessage {
    ControlChange { channel: u8, controller: u8, value: u8 },
    ProgramChange { channel: u8, program: u8 },
    Unrecognized,
}

/// Decode one raw message. Pure: independent of the timestamp, never fails.
///
/// Anything outside the Control Change (0xB0..=0xBF) and Program Change
/// (0xC0..=0xCF) status ranges decodes as `Unrecognized`, as does a message
/// too short to carry the data bytes its status requires.
pub fn decode(message: RawMessage<'_>) -> ChannelMessage {
    let bytes = message.bytes;
    let Some(&status) = bytes.first() else {
        return ChannelMessage::Unrecognized;
    };
    match status {
        CONTROL_CHANGE_BASE..=CONTROL_CHANGE_MAX => match (bytes.get(1), bytes.get(2)) {
            (Some(&controller), Some(&value)) => ChannelMessage::ControlChange {
                channel: status - CONTROL_CHANGE_BASE + 1,
                controller,
                value,
            },
            _ => ChannelMessage::Unrecognized,
        },
        // A third byte, if present, is ignored for Program Change.
        PROGRAM_CHANGE_BASE..=PROGRAM_CHANGE_MAX => match bytes.get(1) {
            Some(&program) => ChannelMessage::ProgramChange {
                channel: status - PROGRAM_CHANGE_BASE + 1,
                program,
            },
            None => ChannelMessage::Unrecognized,
        },
        _ => ChannelMessage::Unrecognized,
    }
}
