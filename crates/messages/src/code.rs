//! Message codes agreed with the transport layer.

use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MsgCode {
    CurrentBlockNumberRequest,
    CurrentBlockNumberResponse,
    ProposeEmptyBlockMsg,
    SendMinimalHashBlock,
    SendMinimalHashBlockResponse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unknown message code {0}")]
pub struct UnknownMsgCode(pub u64);

impl MsgCode {
    pub const ALL: [MsgCode; 5] = [
        MsgCode::CurrentBlockNumberRequest,
        MsgCode::CurrentBlockNumberResponse,
        MsgCode::ProposeEmptyBlockMsg,
        MsgCode::SendMinimalHashBlock,
        MsgCode::SendMinimalHashBlockResponse,
    ];

    pub fn as_u64(self) -> u64 {
        match self {
            MsgCode::CurrentBlockNumberRequest => 1,
            MsgCode::CurrentBlockNumberResponse => 2,
            MsgCode::ProposeEmptyBlockMsg => 3,
            MsgCode::SendMinimalHashBlock => 4,
            MsgCode::SendMinimalHashBlockResponse => 5,
        }
    }

    pub fn from_u64(code: u64) -> Result<Self, UnknownMsgCode> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_u64() == code)
            .ok_or(UnknownMsgCode(code))
    }
}

impl fmt::Display for MsgCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MsgCode::CurrentBlockNumberRequest => "CurrentBlockNumberRequest",
            MsgCode::CurrentBlockNumberResponse => "CurrentBlockNumberResponse",
            MsgCode::ProposeEmptyBlockMsg => "ProposeEmptyBlockMsg",
            MsgCode::SendMinimalHashBlock => "SendMinimalHashBlock",
            MsgCode::SendMinimalHashBlockResponse => "SendMinimalHashBlockResponse",
        };
        write!(f, "{name}({})", self.as_u64())
    }
}
