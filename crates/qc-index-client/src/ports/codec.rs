//! Codec port: domain object serialization owned by the application.
//!
//! The engine moves opaque bytes. Whatever a block or transaction looks
//! like is decided by the codec's associated types.

use crate::domain::{CodecError, SelectionAlgorithm};

/// Encoder/decoder for the domain objects crossing the wire.
pub trait DomainCodec: Send + Sync + 'static {
    /// Full block
    type Block: Send + 'static;
    /// Block header
    type Header: Send + 'static;
    /// Transaction
    type Transaction: Send + 'static;
    /// Address history rows
    type History: Send + 'static;
    /// Stealth match rows
    type Stealth: Send + 'static;
    /// Selected unspent outputs and their total value
    type PointsValue: Send + 'static;

    fn encode_block(&self, block: &Self::Block) -> Vec<u8>;

    fn encode_transaction(&self, tx: &Self::Transaction) -> Vec<u8>;

    fn decode_block(&self, body: &[u8]) -> Result<Self::Block, CodecError>;

    fn decode_header(&self, body: &[u8]) -> Result<Self::Header, CodecError>;

    fn decode_transaction(&self, body: &[u8]) -> Result<Self::Transaction, CodecError>;

    fn decode_history(&self, body: &[u8]) -> Result<Self::History, CodecError>;

    fn decode_stealth(&self, body: &[u8]) -> Result<Self::Stealth, CodecError>;

    /// Pick unspent outputs from a decoded history so that their value
    /// reaches `satoshi`.
    fn select_outputs(
        &self,
        history: Self::History,
        satoshi: u64,
        algorithm: SelectionAlgorithm,
    ) -> Result<Self::PointsValue, CodecError>;
}
