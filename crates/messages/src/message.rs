//! Message markers and the halt-recovery message set.

use crate::{CurrentBlockNumberResponse, MsgCode, ProposalMsg};
use haltwatch_types::VoteMsg;

/// A type that travels on the wire under a fixed [`MsgCode`].
pub trait NetworkMessage {
    fn message_code() -> MsgCode;
}

/// Type-safe request/response pairing.
pub trait Request: NetworkMessage {
    type Response: NetworkMessage;
}

/// Every message the halt-recovery protocol exchanges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HaltMessage {
    CurrentBlockNumberRequest,
    CurrentBlockNumberResponse(CurrentBlockNumberResponse),
    ProposeEmptyBlock(ProposalMsg),
    SendMinimalHashBlock(ProposalMsg),
    SendMinimalHashBlockResponse(VoteMsg),
}

impl HaltMessage {
    pub fn code(&self) -> MsgCode {
        match self {
            HaltMessage::CurrentBlockNumberRequest => MsgCode::CurrentBlockNumberRequest,
            HaltMessage::CurrentBlockNumberResponse(_) => MsgCode::CurrentBlockNumberResponse,
            HaltMessage::ProposeEmptyBlock(_) => MsgCode::ProposeEmptyBlockMsg,
            HaltMessage::SendMinimalHashBlock(_) => MsgCode::SendMinimalHashBlock,
            HaltMessage::SendMinimalHashBlockResponse(_) => MsgCode::SendMinimalHashBlockResponse,
        }
    }
}
