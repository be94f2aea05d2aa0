//! Addresses and node role identifiers.

use crate::hash::{decode_fixed_hex, HexError};
use sbor::prelude::*;
use std::fmt;

/// Length of an address in bytes (2-byte type prefix + 20-byte body).
pub const ADDRESS_LENGTH: usize = 22;

/// Address type encoded in the first two bytes of an [`Address`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressType {
    Normal,
    Cross,
    Stake,
    Cancel,
    UnStake,
    Evidence,
    Erc20,
    EarlyReward,
    SmartContract,
    Unknown(u16),
}

impl AddressType {
    pub fn to_u16(self) -> u16 {
        match self {
            AddressType::Normal => 0x0000,
            AddressType::Cross => 0x0001,
            AddressType::Stake => 0x0002,
            AddressType::Cancel => 0x0003,
            AddressType::UnStake => 0x0004,
            AddressType::Evidence => 0x0005,
            AddressType::Erc20 => 0x0010,
            AddressType::EarlyReward => 0x0011,
            AddressType::SmartContract => 0x0016,
            AddressType::Unknown(raw) => raw,
        }
    }

    pub fn from_u16(raw: u16) -> Self {
        match raw {
            0x0000 => AddressType::Normal,
            0x0001 => AddressType::Cross,
            0x0002 => AddressType::Stake,
            0x0003 => AddressType::Cancel,
            0x0004 => AddressType::UnStake,
            0x0005 => AddressType::Evidence,
            0x0010 => AddressType::Erc20,
            0x0011 => AddressType::EarlyReward,
            0x0016 => AddressType::SmartContract,
            other => AddressType::Unknown(other),
        }
    }
}

/// 22-byte account address. Equality is byte-wise.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, BasicSbor)]
#[sbor(transparent)]
pub struct Address([u8; ADDRESS_LENGTH]);

impl Default for Address {
    fn default() -> Self {
        Address::ZERO
    }
}

impl Address {
    pub const ZERO: Self = Address([0u8; ADDRESS_LENGTH]);

    pub const fn from_bytes(bytes: [u8; ADDRESS_LENGTH]) -> Self {
        Address(bytes)
    }

    /// Build an address from a type tag and a 20-byte body.
    pub fn new(address_type: AddressType, body: [u8; 20]) -> Self {
        let mut bytes = [0u8; ADDRESS_LENGTH];
        bytes[..2].copy_from_slice(&address_type.to_u16().to_be_bytes());
        bytes[2..].copy_from_slice(&body);
        Address(bytes)
    }

    pub fn from_hex(s: &str) -> Result<Self, HexError> {
        decode_fixed_hex::<ADDRESS_LENGTH>(s).map(Address)
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_LENGTH] {
        &self.0
    }

    pub fn address_type(&self) -> AddressType {
        AddressType::from_u16(u16::from_be_bytes([self.0[0], self.0[1]]))
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; ADDRESS_LENGTH]
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_hex())
    }
}

/// Role of a node with respect to the halt-recovery protocol.
///
/// Only `VerifierBoot` drives the halt-check state machine. `Verifier`
/// (an alive verifier) answers minimal-hash block requests. `Normal` nodes
/// only answer height requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, BasicSbor)]
pub enum NodeType {
    Normal,
    Verifier,
    VerifierBoot,
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeType::Normal => write!(f, "Normal"),
            NodeType::Verifier => write!(f, "Verifier"),
            NodeType::VerifierBoot => write!(f, "VerifierBoot"),
        }
    }
}
