/// Encodes and decodes doc records, and the bounds-checked validation
/// shared by every key/value-bearing operation. Owns no I/O: it only reads
/// and writes bytes the caller hands it, at offsets the caller computed via
/// [`crate::layout`].
use integer_encoding::VarInt;

use crate::error::CacheError;
use crate::layout::{
    self, DOC_HEADER_LEN, EXPIRES_AT_WINDOW, KEY_LEN_WINDOW, MAX_KEY_LEN, MAX_VAL_LEN, VAL_LEN_WINDOW,
};

const FLAG_EMPTY: u8 = 0;
const FLAG_OCCUPIED: u8 = 1;

/// A decoded, occupied slot header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocHeader {
    pub key_len: usize,
    pub val_len: usize,
    pub expires_at_ms: i64,
}

/// Validates a key per §4.4's "Input validation" rule, shared by every
/// key-bearing operation.
pub fn validate_key(key: &[u8]) -> Result<(), CacheError> {
    if key.is_empty() {
        return Err(CacheError::KeyTooShort);
    }
    if key.len() > MAX_KEY_LEN {
        return Err(CacheError::KeyTooLong);
    }
    Ok(())
}

/// Validates a value, `Set`-only per §4.4.
pub fn validate_val(val: &[u8]) -> Result<(), CacheError> {
    if val.is_empty() {
        return Err(CacheError::ValueTooShort);
    }
    if val.len() > MAX_VAL_LEN {
        return Err(CacheError::ValueTooLong);
    }
    Ok(())
}

fn decode_window(bytes: &[u8], slot_off: usize, window: (usize, usize)) -> Result<i64, CacheError> {
    let (start, len) = window;
    let src = &bytes[slot_off + start..slot_off + start + len];
    match i64::decode_var(src) {
        Some((value, _consumed)) => Ok(value),
        None => Err(CacheError::CorruptDoc),
    }
}

fn encode_window(dst: &mut [u8], slot_off: usize, window: (usize, usize), value: i64) {
    let (start, len) = window;
    let dst = &mut dst[slot_off + start..slot_off + start + len];
    let written = value.encode_var(dst);
    debug_assert!(written <= len, "varint overflowed its allotted window");
}

/// Reads the header of the slot at `slot_off`, returning `None` if the slot
/// is empty (`flag == 0`).
///
/// `slot_off` is a byte offset into `bytes` (i.e. already resolved via
/// [`crate::layout::slot_offset`]).
pub fn decode_header(bytes: &[u8], slot_off: u64) -> Result<Option<DocHeader>, CacheError> {
    let slot_off = slot_off as usize;
    if bytes[slot_off] == FLAG_EMPTY {
        return Ok(None);
    }

    let key_len = decode_window(bytes, slot_off, KEY_LEN_WINDOW)?;
    let val_len = decode_window(bytes, slot_off, VAL_LEN_WINDOW)?;
    let expires_at_ms = decode_window(bytes, slot_off, EXPIRES_AT_WINDOW)?;

    if key_len < 1 || key_len as usize > MAX_KEY_LEN || val_len < 1 || val_len as usize > MAX_VAL_LEN {
        return Err(CacheError::CorruptDoc);
    }

    Ok(Some(DocHeader {
        key_len: key_len as usize,
        val_len: val_len as usize,
        expires_at_ms,
    }))
}

/// Borrows the stored key bytes for an already-decoded occupied slot.
pub fn slot_key(bytes: &[u8], slot_off: u64, header: &DocHeader) -> &[u8] {
    let start = slot_off as usize + DOC_HEADER_LEN;
    &bytes[start..start + header.key_len]
}

/// Borrows the stored value bytes for an already-decoded occupied slot.
pub fn slot_val(bytes: &[u8], slot_off: u64, header: &DocHeader) -> &[u8] {
    let start = slot_off as usize + DOC_HEADER_LEN + header.key_len;
    &bytes[start..start + header.val_len]
}

/// Writes a fully-formed doc (flag, header, key, value) at `slot_off`,
/// overwriting whatever was there before. Bytes of the slot beyond the new
/// payload are left untouched, per §4.4 step 4.
pub fn write_doc(bytes: &mut [u8], slot_off: u64, key: &[u8], val: &[u8], expires_at_ms: i64) {
    let doc_len = DOC_HEADER_LEN + key.len() + val.len();
    let mut scratch = vec![0u8; doc_len];
    scratch[0] = FLAG_OCCUPIED;
    encode_window(&mut scratch, 0, KEY_LEN_WINDOW, key.len() as i64);
    encode_window(&mut scratch, 0, VAL_LEN_WINDOW, val.len() as i64);
    encode_window(&mut scratch, 0, EXPIRES_AT_WINDOW, expires_at_ms);
    scratch[DOC_HEADER_LEN..DOC_HEADER_LEN + key.len()].copy_from_slice(key);
    scratch[DOC_HEADER_LEN + key.len()..doc_len].copy_from_slice(val);

    let slot_off = slot_off as usize;
    bytes[slot_off..slot_off + doc_len].copy_from_slice(&scratch);
}

/// Marks the slot at `slot_off` empty. Does not zero the payload bytes —
/// per §3 invariant 4, an empty slot's remaining bytes are never read.
pub fn clear_doc(bytes: &mut [u8], slot_off: u64) {
    bytes[slot_off as usize] = FLAG_EMPTY;
}

/// Iterates the byte offsets of the `SLOTS_PER_REGION` slots of `region` in
/// `block_idx`.
pub fn slots_in_region(block_idx: u64, region: u32) -> impl Iterator<Item = u64> {
    (0..layout::SLOTS_PER_REGION).map(move |slot| layout::slot_offset(block_idx, region, slot))
}
