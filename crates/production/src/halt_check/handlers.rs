//! Inbound peer message dispatch.

use super::{HeightInfo, SystemHaltedCheck};
use crate::metrics;
use crate::network::{decode_message, send_message, CodecError};
use haltwatch_core::{HaltError, Peer};
use haltwatch_messages::{CurrentBlockNumberResponse, HaltMessage, MsgCode};
use haltwatch_types::NodeType;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

/// How long a handler waits for room on a loop channel before dropping.
const CHANNEL_SEND_TIMEOUT: Duration = Duration::from_millis(100);

const NORMAL_CODES: &[MsgCode] = &[MsgCode::CurrentBlockNumberRequest];

const VERIFIER_CODES: &[MsgCode] = &[
    MsgCode::CurrentBlockNumberRequest,
    MsgCode::SendMinimalHashBlock,
];

const BOOT_CODES: &[MsgCode] = &[
    MsgCode::CurrentBlockNumberRequest,
    MsgCode::CurrentBlockNumberResponse,
    MsgCode::ProposeEmptyBlockMsg,
    MsgCode::SendMinimalHashBlockResponse,
];

/// Message codes a node of the given role accepts.
pub fn handled_codes(node_type: NodeType) -> &'static [MsgCode] {
    match node_type {
        NodeType::VerifierBoot => BOOT_CODES,
        NodeType::Verifier => VERIFIER_CODES,
        NodeType::Normal => NORMAL_CODES,
    }
}

impl SystemHaltedCheck {
    /// Message codes this node accepts.
    pub fn handled_codes(&self) -> &'static [MsgCode] {
        handled_codes(self.node_type)
    }

    /// Handle one message received from `peer`.
    ///
    /// Proposals, alive votes and height answers are queued for the halt loop
    /// and dropped if the loop does not make room quickly.
    pub async fn handle_message(
        &self,
        code: MsgCode,
        payload: &[u8],
        peer: Arc<dyn Peer>,
    ) -> Result<(), HaltError> {
        if !self.handled_codes().contains(&code) {
            metrics::record_invalid_message("unhandled");
            return Err(HaltError::UnhandledMessage(code));
        }
        metrics::record_network_message_received();

        let message = decode_message(code, payload).map_err(|e| {
            metrics::record_invalid_message("decode");
            decode_error(code, e)
        })?;
        trace!(peer = %peer.node_name(), %code, "Received message");

        match message {
            HaltMessage::CurrentBlockNumberRequest => {
                let height = self.ctx.chain.current_block().number();
                let reply =
                    HaltMessage::CurrentBlockNumberResponse(CurrentBlockNumberResponse::new(height));
                if let Err(e) = send_message(peer.as_ref(), &reply) {
                    debug!(peer = %peer.node_name(), error = %e, "Failed to answer height request");
                }
                Ok(())
            }
            HaltMessage::CurrentBlockNumberResponse(response) => {
                let node_type = peer.node_type();
                if node_type == NodeType::Normal {
                    metrics::record_invalid_message("peer_type");
                    return Err(HaltError::PeerTypeError {
                        peer: peer.node_name(),
                        node_type,
                    });
                }
                let info = HeightInfo {
                    peer: peer.node_name(),
                    node_type,
                    height: response.height,
                };
                forward(&self.height_tx, info, "height").await;
                Ok(())
            }
            HaltMessage::ProposeEmptyBlock(proposal) => {
                let sender = peer.remote_verifier_address();
                if !self.ctx.config.boot_verifiers.contains(&sender) {
                    debug!(peer = %peer.node_name(), %sender, "Ignoring proposal from non-boot peer");
                    return Ok(());
                }
                forward(&self.proposal_tx, proposal, "proposal").await;
                Ok(())
            }
            HaltMessage::SendMinimalHashBlock(proposal) => {
                let vote = self.alive_handler.on_minimal_hash_block(
                    &proposal,
                    self.ctx.wallet.as_ref(),
                    self.ctx.state_handler.now_ms(),
                )?;
                send_message(peer.as_ref(), &HaltMessage::SendMinimalHashBlockResponse(vote))
            }
            HaltMessage::SendMinimalHashBlockResponse(vote) => {
                forward(&self.vote_tx, vote, "vote").await;
                Ok(())
            }
        }
    }
}

fn decode_error(code: MsgCode, e: CodecError) -> HaltError {
    let reason = e.to_string();
    match code {
        MsgCode::ProposeEmptyBlockMsg => HaltError::ProposalMsgDecodeError(reason),
        MsgCode::SendMinimalHashBlock => HaltError::MinimalBlockDecodeError(reason),
        MsgCode::SendMinimalHashBlockResponse => HaltError::VoteMsgDecodeError(reason),
        MsgCode::CurrentBlockNumberRequest | MsgCode::CurrentBlockNumberResponse => {
            HaltError::HeightMsgDecodeError(reason)
        }
    }
}

async fn forward<T>(tx: &mpsc::Sender<T>, item: T, kind: &'static str) {
    if let Err(e) = tx.send_timeout(item, CHANNEL_SEND_TIMEOUT).await {
        match e {
            mpsc::error::SendTimeoutError::Timeout(_) => {
                warn!(kind, "Halt loop busy, dropping message")
            }
            mpsc::error::SendTimeoutError::Closed(_) => {
                debug!(kind, "Halt loop not running, dropping message")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HaltCheckConfig;
    use crate::halt_check::HaltCheckDeps;
    use crate::network::{decode_payload, encode_message};
    use crate::test_support::{
        FlatEconomy, MockChain, MockPeer, MockPeers, MockWallet, RecordingBroadcaster,
    };
    use haltwatch_messages::ProposalMsg;
    use haltwatch_recovery::{gen_proposal, ProposalGeneratorConfig};
    use haltwatch_types::test_utils::{test_head, test_key};
    use haltwatch_types::{BootVerifierSet, KeyPair, VoteMsg, VoteType};

    fn boot_labels() -> Vec<&'static str> {
        vec!["boot-0", "boot-1", "boot-2"]
    }

    fn boot_set() -> Arc<BootVerifierSet> {
        Arc::new(BootVerifierSet::new(
            boot_labels().into_iter().map(|l| test_key(l).address()),
        ))
    }

    fn service(node_type: NodeType, key: KeyPair) -> SystemHaltedCheck {
        let verifier = test_key("verifier-0").address();
        let chain = Arc::new(MockChain::new(test_head(100, 0), vec![verifier]));
        let deps = HaltCheckDeps::new(
            chain,
            Arc::new(MockWallet(key)),
            Arc::new(MockPeers::default()),
            Arc::new(RecordingBroadcaster::default()),
            Arc::new(FlatEconomy),
        )
        .with_clock(Arc::new(|| 1_000_000));
        let config = HaltCheckConfig::default()
            .with_boot_verifiers(boot_set())
            .with_verifier_count(1);
        SystemHaltedCheck::new(node_type, config, deps).unwrap()
    }

    fn proposal_from(label: &str) -> ProposalMsg {
        let key = test_key(label);
        let signer = key.clone();
        let cfg = ProposalGeneratorConfig {
            cur_block: test_head(100, 0),
            new_block_seed: haltwatch_types::Hash::from_bytes(label.as_bytes()),
            new_block_proof: vec![1, 2, 3],
            last_verifications: Vec::new(),
            pub_key: key.public_key(),
            sign_hash_fn: Arc::new(move |hash| Ok(signer.sign_hash(hash)?)),
            process_state_fn: Arc::new(|_, state_root, register_root| Ok((state_root, register_root))),
            vote_type: VoteType::VerBootNodeVote,
            now_ms: 1_000_000,
        };
        gen_proposal(&cfg).unwrap()
    }

    #[test]
    fn test_handled_codes_per_role() {
        assert_eq!(handled_codes(NodeType::Normal), &[MsgCode::CurrentBlockNumberRequest]);
        assert!(handled_codes(NodeType::Verifier).contains(&MsgCode::SendMinimalHashBlock));
        assert!(!handled_codes(NodeType::Verifier).contains(&MsgCode::ProposeEmptyBlockMsg));
        assert_eq!(handled_codes(NodeType::VerifierBoot).len(), 4);
    }

    #[tokio::test]
    async fn test_height_request_answered_by_every_role() {
        for (node_type, label) in [
            (NodeType::Normal, "normal"),
            (NodeType::Verifier, "verifier-0"),
            (NodeType::VerifierBoot, "boot-0"),
        ] {
            let check = service(node_type, test_key(label));
            let peer = MockPeer::new("asker", NodeType::VerifierBoot, test_key("boot-1").address());
            let payload = encode_message(&HaltMessage::CurrentBlockNumberRequest).unwrap();

            check
                .handle_message(MsgCode::CurrentBlockNumberRequest, &payload, peer.clone())
                .await
                .unwrap();

            let sent = peer.sent.lock().clone();
            assert_eq!(sent.len(), 1);
            assert_eq!(sent[0].0, MsgCode::CurrentBlockNumberResponse);
            let response: CurrentBlockNumberResponse = decode_payload(&sent[0].1).unwrap();
            assert_eq!(response.height, 100);
        }
    }

    #[tokio::test]
    async fn test_unhandled_code_rejected() {
        let check = service(NodeType::Normal, test_key("normal"));
        let peer = MockPeer::new("p", NodeType::VerifierBoot, test_key("boot-1").address());
        let result = check
            .handle_message(MsgCode::ProposeEmptyBlockMsg, &[1], peer)
            .await;
        assert_eq!(
            result,
            Err(HaltError::UnhandledMessage(MsgCode::ProposeEmptyBlockMsg))
        );
    }

    #[tokio::test]
    async fn test_height_response_from_normal_peer_rejected() {
        let check = service(NodeType::VerifierBoot, test_key("boot-0"));
        let peer = MockPeer::new("normal", NodeType::Normal, test_key("normal").address());
        let payload = encode_message(&HaltMessage::CurrentBlockNumberResponse(
            CurrentBlockNumberResponse::new(7),
        ))
        .unwrap();

        let result = check
            .handle_message(MsgCode::CurrentBlockNumberResponse, &payload, peer)
            .await;
        assert!(matches!(result, Err(HaltError::PeerTypeError { .. })));
    }

    #[tokio::test]
    async fn test_proposal_queued_only_from_boot_peers() {
        let check = service(NodeType::VerifierBoot, test_key("boot-0"));
        let proposal = proposal_from("boot-1");
        let payload = encode_message(&HaltMessage::ProposeEmptyBlock(proposal.clone())).unwrap();

        let stranger = MockPeer::new("x", NodeType::Verifier, test_key("verifier-0").address());
        check
            .handle_message(MsgCode::ProposeEmptyBlockMsg, &payload, stranger)
            .await
            .unwrap();

        let boot = MockPeer::new("boot-1", NodeType::VerifierBoot, test_key("boot-1").address());
        check
            .handle_message(MsgCode::ProposeEmptyBlockMsg, &payload, boot)
            .await
            .unwrap();

        let mut receivers = check.receivers.lock().take().unwrap();
        assert_eq!(receivers.proposals.try_recv().unwrap(), proposal);
        assert!(receivers.proposals.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_garbage_proposal_is_decode_error() {
        let check = service(NodeType::VerifierBoot, test_key("boot-0"));
        let peer = MockPeer::new("boot-1", NodeType::VerifierBoot, test_key("boot-1").address());
        let result = check
            .handle_message(MsgCode::ProposeEmptyBlockMsg, &[9, 9, 9], peer)
            .await;
        assert!(matches!(result, Err(HaltError::ProposalMsgDecodeError(_))));
    }

    #[tokio::test]
    async fn test_alive_verifier_votes_for_minimal_hash_block() {
        let key = test_key("verifier-0");
        let check = service(NodeType::Verifier, key.clone());
        let proposal = proposal_from("boot-1");
        let payload = encode_message(&HaltMessage::SendMinimalHashBlock(proposal.clone())).unwrap();
        let peer = MockPeer::new("boot-1", NodeType::VerifierBoot, test_key("boot-1").address());

        check
            .handle_message(MsgCode::SendMinimalHashBlock, &payload, peer.clone())
            .await
            .unwrap();

        let sent = peer.sent.lock().clone();
        assert_eq!(sent[0].0, MsgCode::SendMinimalHashBlockResponse);
        let vote: VoteMsg = decode_payload(&sent[0].1).unwrap();
        assert_eq!(vote.block_id, proposal.block_hash());
        assert_eq!(vote.vote_type, VoteType::AliveVerifierVote);
        assert_eq!(vote.signer(), key.address());
    }

    #[tokio::test]
    async fn test_alive_verifier_rejects_proposal_from_non_boot_signer() {
        let check = service(NodeType::Verifier, test_key("verifier-0"));
        let proposal = proposal_from("intruder");
        let payload = encode_message(&HaltMessage::SendMinimalHashBlock(proposal)).unwrap();
        let peer = MockPeer::new("intruder", NodeType::VerifierBoot, test_key("intruder").address());

        let result = check
            .handle_message(MsgCode::SendMinimalHashBlock, &payload, peer.clone())
            .await;
        assert!(matches!(
            result,
            Err(HaltError::AddressIsNotVerifierBootNode(_))
        ));
        assert!(peer.sent.lock().is_empty());
    }
}
