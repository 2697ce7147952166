//! Pass-through codec that keeps every domain object as raw bytes.

use crate::domain::{CodecError, SelectionAlgorithm};
use crate::ports::DomainCodec;
use bytes::Bytes;

/// Codec whose domain objects are the undecoded reply bodies.
///
/// Useful for proxies and tests. Output selection needs real history rows
/// and is not supported.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawCodec;

impl DomainCodec for RawCodec {
    type Block = Bytes;
    type Header = Bytes;
    type Transaction = Bytes;
    type History = Bytes;
    type Stealth = Bytes;
    type PointsValue = ();

    fn encode_block(&self, block: &Bytes) -> Vec<u8> {
        block.to_vec()
    }

    fn encode_transaction(&self, tx: &Bytes) -> Vec<u8> {
        tx.to_vec()
    }

    fn decode_block(&self, body: &[u8]) -> Result<Bytes, CodecError> {
        Ok(Bytes::copy_from_slice(body))
    }

    fn decode_header(&self, body: &[u8]) -> Result<Bytes, CodecError> {
        Ok(Bytes::copy_from_slice(body))
    }

    fn decode_transaction(&self, body: &[u8]) -> Result<Bytes, CodecError> {
        Ok(Bytes::copy_from_slice(body))
    }

    fn decode_history(&self, body: &[u8]) -> Result<Bytes, CodecError> {
        Ok(Bytes::copy_from_slice(body))
    }

    fn decode_stealth(&self, body: &[u8]) -> Result<Bytes, CodecError> {
        Ok(Bytes::copy_from_slice(body))
    }

    fn select_outputs(
        &self,
        _history: Bytes,
        _satoshi: u64,
        _algorithm: SelectionAlgorithm,
    ) -> Result<(), CodecError> {
        Err(CodecError::Unsupported("output selection"))
    }
}
