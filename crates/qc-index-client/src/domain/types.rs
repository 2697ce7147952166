//! Value types passed through the engine.

use crate::domain::error::ClientError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 32-byte block or transaction hash, in wire byte order.
pub type HashDigest = [u8; 32];

/// 20-byte address hash (RIPEMD160 of the public key or script).
pub type ShortHash = [u8; 20];

/// All-zero hash.
pub const NULL_HASH: HashDigest = [0u8; 32];

/// Maximum number of bits in a stealth prefix.
pub const MAX_STEALTH_PREFIX_BITS: u8 = 32;

/// Bit prefix used to match stealth payments.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StealthPrefix {
    bits: u8,
    blocks: Vec<u8>,
}

impl StealthPrefix {
    /// Build a prefix from the `bits` most significant bits of `value`.
    pub fn from_u32(bits: u8, value: u32) -> Result<Self, ClientError> {
        if bits == 0 || bits > MAX_STEALTH_PREFIX_BITS {
            return Err(ClientError::InvalidRequest(format!(
                "stealth prefix must carry 1..={} bits, got {}",
                MAX_STEALTH_PREFIX_BITS, bits
            )));
        }
        let len = Self::block_len(bits);
        let mask = u32::MAX << (32 - u32::from(bits));
        let bytes = (value & mask).to_be_bytes();
        Ok(Self {
            bits,
            blocks: bytes[..len].to_vec(),
        })
    }

    /// Build a prefix from raw blocks. The block count must match `bits`.
    pub fn from_blocks(bits: u8, blocks: Vec<u8>) -> Self {
        Self { bits, blocks }
    }

    /// Number of significant bits.
    pub fn bits(&self) -> u8 {
        self.bits
    }

    /// Prefix bytes, most significant first.
    pub fn blocks(&self) -> &[u8] {
        &self.blocks
    }

    /// Structural check applied before a prefix goes on the wire.
    pub fn validate(&self) -> Result<(), ClientError> {
        if self.bits == 0 || self.bits > MAX_STEALTH_PREFIX_BITS {
            return Err(ClientError::InvalidRequest(format!(
                "stealth prefix must carry 1..={} bits, got {}",
                MAX_STEALTH_PREFIX_BITS, self.bits
            )));
        }
        let expected = Self::block_len(self.bits);
        if self.blocks.len() != expected {
            return Err(ClientError::InvalidRequest(format!(
                "stealth prefix of {} bits needs {} bytes, got {}",
                self.bits,
                expected,
                self.blocks.len()
            )));
        }
        Ok(())
    }

    fn block_len(bits: u8) -> usize {
        usize::from(bits).div_ceil(8)
    }
}

impl fmt::Debug for StealthPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StealthPrefix({}/{})", hex::encode(&self.blocks), self.bits)
    }
}

/// Position of a confirmed transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionIndex {
    /// Height of the containing block
    pub height: u32,
    /// Position of the transaction within the block
    pub position: u32,
}

/// Activity reported for an address or stealth subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateEvent {
    /// Per-subscription sequence number assigned by the server
    pub sequence: u16,
    /// Height at which the transaction was seen (0 while unconfirmed)
    pub height: u32,
    /// Hash of the matching transaction
    pub tx_hash: HashDigest,
}

/// Item delivered to a filter subscription handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionEvent {
    /// The server acknowledged the subscription.
    Subscribed,
    /// A matching transaction was seen.
    Update(UpdateEvent),
}

/// Filter a subscription was created with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionFilter {
    Address(ShortHash),
    Stealth(StealthPrefix),
}

/// Unspent output selection strategy handed to the codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionAlgorithm {
    /// Fewest outputs that cover the target
    #[default]
    Greedy,
    /// Every output that individually covers the target
    Individual,
}
