//! Message encoding and decoding for peer transport.
//!
//! # Wire Format
//!
//! ```text
//! [version: u8][payload: SBOR-encoded message]
//! ```
//!
//! - Version is currently `1`
//! - Payload is the SBOR-encoded message struct (e.g. `ProposalMsg`)
//! - `CurrentBlockNumberRequest` has no payload, only the version byte
//!
//! # Code-Based Type Dispatch
//!
//! Message type is determined by the [`MsgCode`] the transport delivers
//! alongside the bytes, not by a field in the payload.

use haltwatch_messages::{CurrentBlockNumberResponse, HaltMessage, MsgCode, ProposalMsg, UnknownMsgCode};
use haltwatch_types::VoteMsg;
use sbor::{BasicDecode, BasicEncode};
use thiserror::Error;

/// Current wire format version.
pub const WIRE_VERSION: u8 = 1;

/// Errors that can occur during message encoding/decoding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("Unknown wire version: {0}")]
    UnknownVersion(u8),

    #[error("Message too short")]
    MessageTooShort,

    #[error("SBOR decode error: {0}")]
    SborDecode(String),

    #[error("SBOR encode error: {0}")]
    SborEncode(String),

    #[error(transparent)]
    UnknownCode(#[from] UnknownMsgCode),
}

/// Encode a single message struct to wire format.
pub fn encode_payload<T: BasicEncode>(value: &T) -> Result<Vec<u8>, CodecError> {
    let payload =
        sbor::basic_encode(value).map_err(|e| CodecError::SborEncode(format!("{:?}", e)))?;

    // Prepend version byte
    let mut bytes = Vec::with_capacity(1 + payload.len());
    bytes.push(WIRE_VERSION);
    bytes.extend(payload);
    Ok(bytes)
}

/// Decode a single message struct from wire format.
pub fn decode_payload<T: BasicDecode>(data: &[u8]) -> Result<T, CodecError> {
    let payload = strip_version(data)?;
    sbor::basic_decode(payload).map_err(|e| CodecError::SborDecode(format!("{:?}", e)))
}

fn strip_version(data: &[u8]) -> Result<&[u8], CodecError> {
    let (&version, payload) = data.split_first().ok_or(CodecError::MessageTooShort)?;
    if version != WIRE_VERSION {
        return Err(CodecError::UnknownVersion(version));
    }
    Ok(payload)
}

/// Encode a protocol message to wire format.
///
/// The caller sends the bytes under `message.code()`.
pub fn encode_message(message: &HaltMessage) -> Result<Vec<u8>, CodecError> {
    match message {
        HaltMessage::CurrentBlockNumberRequest => Ok(vec![WIRE_VERSION]),
        HaltMessage::CurrentBlockNumberResponse(response) => encode_payload(response),
        HaltMessage::ProposeEmptyBlock(proposal) | HaltMessage::SendMinimalHashBlock(proposal) => {
            encode_payload(proposal)
        }
        HaltMessage::SendMinimalHashBlockResponse(vote) => encode_payload(vote),
    }
}

/// Decode a message from wire format based on its code.
pub fn decode_message(code: MsgCode, data: &[u8]) -> Result<HaltMessage, CodecError> {
    match code {
        MsgCode::CurrentBlockNumberRequest => {
            strip_version(data)?;
            Ok(HaltMessage::CurrentBlockNumberRequest)
        }
        MsgCode::CurrentBlockNumberResponse => Ok(HaltMessage::CurrentBlockNumberResponse(
            decode_payload::<CurrentBlockNumberResponse>(data)?,
        )),
        MsgCode::ProposeEmptyBlockMsg => Ok(HaltMessage::ProposeEmptyBlock(
            decode_payload::<ProposalMsg>(data)?,
        )),
        MsgCode::SendMinimalHashBlock => Ok(HaltMessage::SendMinimalHashBlock(
            decode_payload::<ProposalMsg>(data)?,
        )),
        MsgCode::SendMinimalHashBlockResponse => Ok(HaltMessage::SendMinimalHashBlockResponse(
            decode_payload::<VoteMsg>(data)?,
        )),
    }
}

/// Decode a message whose code is still the transport's raw integer.
pub fn decode_raw(code: u64, data: &[u8]) -> Result<HaltMessage, CodecError> {
    decode_message(MsgCode::from_u64(code)?, data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use haltwatch_types::test_utils::{test_head, test_key};
    use haltwatch_types::VoteType;

    fn make_proposal() -> ProposalMsg {
        let key = test_key("boot-0");
        let block = test_head(42, 1_000);
        let vote = VoteMsg::new_signed(
            42,
            3,
            block.hash(),
            VoteType::VerBootNodeVote,
            1_000,
            key.address(),
            |h| key.sign_hash(h),
        )
        .unwrap();
        ProposalMsg::new(3, block, vote)
    }

    #[test]
    fn test_encode_decode_proposal() {
        let proposal = make_proposal();
        let message = HaltMessage::ProposeEmptyBlock(proposal.clone());

        let bytes = encode_message(&message).unwrap();
        assert_eq!(bytes[0], WIRE_VERSION);

        match decode_message(message.code(), &bytes).unwrap() {
            HaltMessage::ProposeEmptyBlock(decoded) => {
                assert_eq!(decoded.block_hash(), proposal.block_hash());
                assert_eq!(decoded.signer(), proposal.signer());
                assert_eq!(decoded.vote_msg.verify_signer().unwrap(), proposal.signer());
            }
            other => panic!("Expected ProposeEmptyBlock, got {:?}", other),
        }
    }

    #[test]
    fn test_code_selects_message_type() {
        let proposal = make_proposal();
        let bytes = encode_payload(&proposal).unwrap();
        assert!(matches!(
            decode_message(MsgCode::SendMinimalHashBlock, &bytes),
            Ok(HaltMessage::SendMinimalHashBlock(_))
        ));
        // A proposal is not a vote.
        assert!(matches!(
            decode_message(MsgCode::SendMinimalHashBlockResponse, &bytes),
            Err(CodecError::SborDecode(_))
        ));
    }

    #[test]
    fn test_height_request_is_version_byte_only() {
        let bytes = encode_message(&HaltMessage::CurrentBlockNumberRequest).unwrap();
        assert_eq!(bytes, vec![WIRE_VERSION]);
        assert_eq!(
            decode_message(MsgCode::CurrentBlockNumberRequest, &bytes),
            Ok(HaltMessage::CurrentBlockNumberRequest)
        );
    }

    #[test]
    fn test_height_response() {
        let message = HaltMessage::CurrentBlockNumberResponse(CurrentBlockNumberResponse::new(77));
        let bytes = encode_message(&message).unwrap();
        assert_eq!(decode_raw(2, &bytes), Ok(message));
    }

    #[test]
    fn test_unknown_version() {
        let bytes = vec![99, 1, 2, 3]; // version 99 doesn't exist
        let result = decode_message(MsgCode::ProposeEmptyBlockMsg, &bytes);
        assert_eq!(result, Err(CodecError::UnknownVersion(99)));
    }

    #[test]
    fn test_empty_message() {
        assert_eq!(
            decode_message(MsgCode::CurrentBlockNumberRequest, &[]),
            Err(CodecError::MessageTooShort)
        );
    }

    #[test]
    fn test_unknown_code() {
        let result = decode_raw(42, &[WIRE_VERSION]);
        assert_eq!(result, Err(CodecError::UnknownCode(UnknownMsgCode(42))));
    }
}
