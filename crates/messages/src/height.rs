//! Peer height probing.

use crate::{MsgCode, NetworkMessage, Request};
use sbor::prelude::BasicSbor;

/// Ask a peer for its current head height.
///
/// Carries no data; on the wire it is the version byte alone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CurrentBlockNumberRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, BasicSbor)]
pub struct CurrentBlockNumberResponse {
    pub height: u64,
}

impl CurrentBlockNumberResponse {
    pub fn new(height: u64) -> Self {
        Self { height }
    }
}

impl NetworkMessage for CurrentBlockNumberRequest {
    fn message_code() -> MsgCode {
        MsgCode::CurrentBlockNumberRequest
    }
}

impl NetworkMessage for CurrentBlockNumberResponse {
    fn message_code() -> MsgCode {
        MsgCode::CurrentBlockNumberResponse
    }
}

impl Request for CurrentBlockNumberRequest {
    type Response = CurrentBlockNumberResponse;
}
