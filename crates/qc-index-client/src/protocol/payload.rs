//! Request payload layouts and reply body parsing for the primitive shapes.
//!
//! All integers are little-endian. Replies start with a 4-byte status.

use crate::domain::{
    ClientError, CodecError, HashDigest, ShortHash, StealthPrefix, TransactionIndex, UpdateEvent,
};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Size of the status prefix on every reply.
pub const STATUS_SIZE: usize = 4;

const UPDATE_SIZE: usize = 2 + 4 + 32;

/// Payload for commands taking a single hash.
pub fn hash(digest: &HashDigest) -> Bytes {
    Bytes::copy_from_slice(digest)
}

/// Payload for commands taking a block height.
pub fn height(height: u32) -> Bytes {
    let mut buf = BytesMut::with_capacity(4);
    buf.put_u32_le(height);
    buf.freeze()
}

/// `address_hash ‖ from_height`
pub fn history(address: &ShortHash, from_height: u32) -> Bytes {
    let mut buf = BytesMut::with_capacity(20 + 4);
    buf.put_slice(address);
    buf.put_u32_le(from_height);
    buf.freeze()
}

/// `bits ‖ prefix blocks ‖ from_height`
pub fn stealth(prefix: &StealthPrefix, from_height: u32) -> Result<Bytes, ClientError> {
    prefix.validate()?;
    let mut buf = BytesMut::with_capacity(1 + prefix.blocks().len() + 4);
    put_prefix(&mut buf, prefix);
    buf.put_u32_le(from_height);
    Ok(buf.freeze())
}

/// Payload for `subscribe.address`.
pub fn address_subscription(address: &ShortHash) -> Bytes {
    Bytes::copy_from_slice(address)
}

/// Payload for `subscribe.stealth`.
pub fn stealth_subscription(prefix: &StealthPrefix) -> Result<Bytes, ClientError> {
    prefix.validate()?;
    let mut buf = BytesMut::with_capacity(1 + prefix.blocks().len());
    put_prefix(&mut buf, prefix);
    Ok(buf.freeze())
}

fn put_prefix(buf: &mut BytesMut, prefix: &StealthPrefix) {
    buf.put_u8(prefix.bits());
    buf.put_slice(prefix.blocks());
}

/// Split a reply payload into its status code and body.
///
/// `None` means the frame is too short to carry a status.
pub fn split_status(payload: &Bytes) -> Option<(u32, Bytes)> {
    if payload.len() < STATUS_SIZE {
        return None;
    }
    let mut body = payload.clone();
    let status = body.get_u32_le();
    Some((status, body))
}

/// Body of a `blockchain.fetch_last_height` reply.
pub fn decode_height(body: &[u8]) -> Result<u32, CodecError> {
    let mut body = exact(body, 4)?;
    Ok(body.get_u32_le())
}

/// Body of a `blockchain.fetch_transaction_index` reply.
pub fn decode_transaction_index(body: &[u8]) -> Result<TransactionIndex, CodecError> {
    let mut body = exact(body, 8)?;
    Ok(TransactionIndex {
        height: body.get_u32_le(),
        position: body.get_u32_le(),
    })
}

/// Body of a `notification.*` frame: `sequence ‖ height ‖ tx_hash`.
pub fn decode_update(body: &[u8]) -> Result<UpdateEvent, CodecError> {
    let mut body = exact(body, UPDATE_SIZE)?;
    let sequence = body.get_u16_le();
    let height = body.get_u32_le();
    let mut tx_hash = [0u8; 32];
    body.copy_to_slice(&mut tx_hash);
    Ok(UpdateEvent {
        sequence,
        height,
        tx_hash,
    })
}

fn exact(body: &[u8], expected: usize) -> Result<&[u8], CodecError> {
    if body.len() != expected {
        return Err(CodecError::Truncated {
            expected,
            actual: body.len(),
        });
    }
    Ok(body)
}

/// Build a reply payload. Used by service-side adapters.
pub fn reply(status: u32, body: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(STATUS_SIZE + body.len());
    buf.put_u32_le(status);
    buf.put_slice(body);
    buf.freeze()
}

/// Encode a transaction index body.
pub fn transaction_index_body(index: TransactionIndex) -> Bytes {
    let mut buf = BytesMut::with_capacity(8);
    buf.put_u32_le(index.height);
    buf.put_u32_le(index.position);
    buf.freeze()
}

/// Encode a notification body.
pub fn update_body(event: &UpdateEvent) -> Bytes {
    let mut buf = BytesMut::with_capacity(UPDATE_SIZE);
    buf.put_u16_le(event.sequence);
    buf.put_u32_le(event.height);
    buf.put_slice(&event.tx_hash);
    buf.freeze()
}
