//! Key-backed wallet for simulated nodes.

use haltwatch_core::{WalletError, WalletSigner};
use haltwatch_types::{Address, Hash, KeyPair, Signature};

/// Signs with a fixed key pair.
///
/// `evaluate` stands in for a VRF: the proof is a signature over
/// `seed ‖ account` and the index is the hash of the proof, so outputs are
/// unique per key and reproducible.
pub struct SimWallet {
    key: KeyPair,
}

impl SimWallet {
    pub fn new(key: KeyPair) -> Self {
        Self { key }
    }
}

impl WalletSigner for SimWallet {
    fn address(&self) -> Address {
        self.key.address()
    }

    fn public_key(&self) -> Vec<u8> {
        self.key.public_key()
    }

    fn sign_hash(&self, hash: &Hash) -> Result<Signature, WalletError> {
        Ok(self.key.sign_hash(hash)?)
    }

    fn evaluate(&self, account: &Address, seed: &Hash) -> Result<([u8; 32], Vec<u8>), WalletError> {
        let input = Hash::from_parts(&[seed.as_bytes(), account.as_bytes()]);
        let proof = self.key.sign_hash(&input)?;
        let index = Hash::from_bytes(proof.as_bytes());
        Ok((*index.as_bytes(), proof.as_bytes().to_vec()))
    }
}
