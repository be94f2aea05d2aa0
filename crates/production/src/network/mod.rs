//! Peer message transport helpers.
//!
//! The transport itself (connections, framing) belongs to the surrounding
//! node. This module only turns protocol messages into `(code, bytes)` pairs
//! and back, and sends them to [`Peer`]s without ever blocking the caller.

mod codec;

pub use codec::{
    decode_message, decode_payload, decode_raw, encode_message, encode_payload, CodecError,
    WIRE_VERSION,
};

use haltwatch_core::{HaltError, Peer, PeerError};
use haltwatch_messages::HaltMessage;
use tracing::trace;

/// Encode `message` and queue it on `peer`.
pub fn send_message(peer: &dyn Peer, message: &HaltMessage) -> Result<(), HaltError> {
    let bytes = encode_message(message).map_err(|e| PeerError::SendFailed {
        peer: peer.node_name(),
        reason: e.to_string(),
    })?;
    trace!(peer = %peer.node_name(), code = %message.code(), len = bytes.len(), "Sending message");
    peer.send_msg(message.code(), bytes)?;
    crate::metrics::record_network_message_sent();
    Ok(())
}
