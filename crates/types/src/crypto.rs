//! Recoverable secp256k1 signatures.
//!
//! Signatures are 65 bytes: `r || s || v`, where `v` is the recovery id.
//! The signer's [`Address`] can be recovered from a signature and the hash
//! it was produced over, so messages only need to carry the address.

use crate::{Address, AddressType, Hash};
use k256::ecdsa::{RecoveryId, Signature as EcdsaSignature, SigningKey, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use rand::RngCore;
use sbor::prelude::*;
use std::fmt;
use thiserror::Error;

/// Length of a recoverable signature in bytes.
pub const SIGNATURE_LENGTH: usize = 65;

/// Errors from key handling, signing and signer recovery.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    #[error("invalid secret key")]
    InvalidSecretKey,

    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("invalid signature length: expected {SIGNATURE_LENGTH} bytes, got {0}")]
    InvalidSignatureLength(usize),

    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    #[error("signing failed: {0}")]
    SigningFailed(String),

    #[error("public key recovery failed: {0}")]
    RecoveryFailed(String),
}

/// Opaque signature bytes carried inside a [`crate::Witness`].
#[derive(Clone, PartialEq, Eq, Hash, Default, BasicSbor)]
#[sbor(transparent)]
pub struct Signature(Vec<u8>);

impl Signature {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Signature(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shown = self.0.len().min(8);
        write!(f, "Signature({}..)", hex::encode(&self.0[..shown]))
    }
}

/// Uncompressed SEC1 public key bytes (65 bytes, `0x04` prefix).
pub type PublicKeyBytes = Vec<u8>;

/// Derive the normal-type address of an uncompressed SEC1 public key.
///
/// The body is the last 20 bytes of `blake3(pubkey[1..])`.
pub fn address_from_public_key(public_key: &[u8]) -> Result<Address, CryptoError> {
    let key =
        VerifyingKey::from_sec1_bytes(public_key).map_err(|_| CryptoError::InvalidPublicKey)?;
    Ok(address_from_verifying_key(&key))
}

fn address_from_verifying_key(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    let digest = blake3::hash(&point.as_bytes()[1..]);
    let mut body = [0u8; 20];
    body.copy_from_slice(&digest.as_bytes()[12..]);
    Address::new(AddressType::Normal, body)
}

/// Recover the address that produced `signature` over `hash`.
pub fn recover_address(hash: &Hash, signature: &Signature) -> Result<Address, CryptoError> {
    let bytes = signature.as_bytes();
    if bytes.len() != SIGNATURE_LENGTH {
        return Err(CryptoError::InvalidSignatureLength(bytes.len()));
    }
    let sig = EcdsaSignature::from_slice(&bytes[..64])
        .map_err(|e| CryptoError::InvalidSignature(e.to_string()))?;
    let recovery_id = RecoveryId::from_byte(bytes[64])
        .ok_or_else(|| CryptoError::InvalidSignature(format!("bad recovery id {}", bytes[64])))?;
    let key = VerifyingKey::recover_from_prehash(hash.as_bytes(), &sig, recovery_id)
        .map_err(|e| CryptoError::RecoveryFailed(e.to_string()))?;
    Ok(address_from_verifying_key(&key))
}

/// A secp256k1 signing key with its derived address.
#[derive(Clone)]
pub struct KeyPair {
    signing_key: SigningKey,
    address: Address,
}

impl KeyPair {
    /// Build from raw 32-byte secret key material.
    pub fn from_secret(secret: &[u8]) -> Result<Self, CryptoError> {
        let signing_key =
            SigningKey::from_slice(secret).map_err(|_| CryptoError::InvalidSecretKey)?;
        let address = address_from_verifying_key(signing_key.verifying_key());
        Ok(Self {
            signing_key,
            address,
        })
    }

    /// Deterministic key pair from a seed. Used by tests and simulations.
    pub fn from_seed(seed: &[u8]) -> Self {
        let mut material = *blake3::hash(seed).as_bytes();
        loop {
            if let Ok(pair) = Self::from_secret(&material) {
                return pair;
            }
            // Out-of-range scalar; rehash until one is valid.
            material = *blake3::hash(&material).as_bytes();
        }
    }

    /// Fresh random key pair.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        loop {
            let mut material = [0u8; 32];
            rng.fill_bytes(&mut material);
            if let Ok(pair) = Self::from_secret(&material) {
                return pair;
            }
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Uncompressed SEC1 encoding of the public key.
    pub fn public_key(&self) -> PublicKeyBytes {
        self.signing_key
            .verifying_key()
            .to_encoded_point(false)
            .as_bytes()
            .to_vec()
    }

    /// Sign a 32-byte hash, producing a recoverable signature.
    pub fn sign_hash(&self, hash: &Hash) -> Result<Signature, CryptoError> {
        let (sig, recovery_id) = self
            .signing_key
            .sign_prehash_recoverable(hash.as_bytes())
            .map_err(|e| CryptoError::SigningFailed(e.to_string()))?;
        let mut bytes = Vec::with_capacity(SIGNATURE_LENGTH);
        bytes.extend_from_slice(&sig.to_bytes());
        bytes.push(recovery_id.to_byte());
        Ok(Signature(bytes))
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_and_recover() {
        let key = KeyPair::from_seed(b"boot-0");
        let hash = Hash::from_bytes(b"payload");
        let sig = key.sign_hash(&hash).unwrap();
        assert_eq!(sig.as_bytes().len(), SIGNATURE_LENGTH);
        assert_eq!(recover_address(&hash, &sig).unwrap(), key.address());
    }

    #[test]
    fn test_recover_with_other_hash_gives_other_address() {
        let key = KeyPair::from_seed(b"boot-1");
        let sig = key.sign_hash(&Hash::from_bytes(b"a")).unwrap();
        let recovered = recover_address(&Hash::from_bytes(b"b"), &sig);
        assert!(recovered.map(|a| a != key.address()).unwrap_or(true));
    }

    #[test]
    fn test_address_from_public_key_matches_key_pair() {
        let key = KeyPair::from_seed(b"verifier-3");
        assert_eq!(address_from_public_key(&key.public_key()).unwrap(), key.address());
        assert_eq!(key.address().address_type(), AddressType::Normal);
    }

    #[test]
    fn test_seeded_keys_are_deterministic_and_distinct() {
        assert_eq!(KeyPair::from_seed(b"x").address(), KeyPair::from_seed(b"x").address());
        assert_ne!(KeyPair::from_seed(b"x").address(), KeyPair::from_seed(b"y").address());
    }

    #[test]
    fn test_bad_signature_length() {
        let sig = Signature::from_bytes(vec![1, 2, 3]);
        assert_eq!(
            recover_address(&Hash::ZERO, &sig),
            Err(CryptoError::InvalidSignatureLength(3))
        );
    }

    #[test]
    fn test_invalid_public_key() {
        assert_eq!(address_from_public_key(&[0u8; 10]), Err(CryptoError::InvalidPublicKey));
    }
}
