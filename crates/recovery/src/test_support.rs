//! Shared fixtures for unit tests.

use crate::{HaltHandler, ProposalGeneratorConfig};
use haltwatch_types::{BootVerifierSet, Hash, KeyPair, VoteType};
use std::sync::Arc;

pub fn boot_keys(n: usize) -> Vec<KeyPair> {
    (0..n)
        .map(|i| KeyPair::from_seed(format!("boot-{i}").as_bytes()))
        .collect()
}

pub fn verifier_keys(n: usize) -> Vec<KeyPair> {
    (0..n)
        .map(|i| KeyPair::from_seed(format!("verifier-{i}").as_bytes()))
        .collect()
}

pub fn boot_set(keys: &[KeyPair]) -> Arc<BootVerifierSet> {
    Arc::new(BootVerifierSet::new(keys.iter().map(KeyPair::address)))
}

pub fn config_for(key: &KeyPair, head: haltwatch_types::Block, now_ms: i64) -> ProposalGeneratorConfig {
    let signer = key.clone();
    let seed = Hash::from_parts(&[b"vrf", head.header.seed.as_bytes(), key.address().as_bytes()]);
    ProposalGeneratorConfig {
        cur_block: head,
        new_block_seed: seed,
        new_block_proof: seed.as_bytes().to_vec(),
        last_verifications: Vec::new(),
        pub_key: key.public_key(),
        sign_hash_fn: Arc::new(move |hash| Ok(signer.sign_hash(hash)?)),
        process_state_fn: Arc::new(|block, state_root, register_root| {
            let number = block.number().to_be_bytes();
            Ok((
                Hash::from_parts(&[state_root.as_bytes(), &number, block.header.coinbase.as_bytes()]),
                Hash::from_parts(&[register_root.as_bytes(), &number]),
            ))
        }),
        vote_type: VoteType::VerBootNodeVote,
        now_ms,
    }
}

/// A handler for boot verifier `index` that has already proposed.
pub fn proposed_handler(
    keys: &[KeyPair],
    index: usize,
    head: haltwatch_types::Block,
    now_ms: i64,
) -> HaltHandler {
    let mut handler = HaltHandler::new(config_for(&keys[index], head, now_ms), boot_set(keys));
    handler
        .propose_empty_block()
        .expect("test proposal should build");
    handler
}
