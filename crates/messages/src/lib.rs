//! Network messages for the verifier-halt recovery protocol.

mod code;
mod height;
mod message;
mod proposal;

pub use code::{MsgCode, UnknownMsgCode};
pub use height::{CurrentBlockNumberRequest, CurrentBlockNumberResponse};
pub use message::{HaltMessage, NetworkMessage, Request};
pub use proposal::ProposalMsg;
