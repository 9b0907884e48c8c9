//! The inbound pipeline: source callback, decoder, routing sink.

use crate::directory::MessageHandler;
use crate::message::{decode, ChannelMessage, RawMessage};
use crate::sink::RoutingSink;
use std::sync::Arc;
use tracing::{debug, info, trace};

/// Build the handler installed on the source device's message stream.
///
/// Recognized channel-voice messages are reported and forwarded byte-for-byte
/// to the bound target; unrecognized ones are dropped. A translation layer
/// would slot in between the decode and the forward.
pub fn forwarding_handler(sink: Arc<RoutingSink>) -> MessageHandler {
    Arc::new(move |raw: RawMessage<'_>| match decode(raw) {
        ChannelMessage::ControlChange {
            channel,
            controller,
            value,
        } => {
            info!("channel {} cc {} value {}", channel, controller, value);
            forward(&sink, raw.bytes);
        }
        ChannelMessage::ProgramChange { channel, program } => {
            info!("channel {} pc {}", channel, program);
            forward(&sink, raw.bytes);
        }
        ChannelMessage::Unrecognized => {
            trace!("dropping unrecognized message: {:?}", raw.bytes);
        }
    })
}

fn forward(sink: &RoutingSink, bytes: &[u8]) {
    match sink.current_target() {
        Ok(writer) => writer.send(bytes),
        // Device opening and first-message arrival can race; until the
        // target is bound there is nowhere to route.
        Err(_) => debug!("message arrived before the target was bound, dropping"),
    }
}
