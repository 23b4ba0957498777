/// Byte-exact constants describing the on-disk layout.
///
/// The file is a sequence of blocks; each block holds a fixed array of
/// regions; each region holds a fixed array of doc slots. Nothing here is
/// runtime-configurable — the layout's fixed-ness is the entire point of the
/// format, so it is expressed as constants and offset arithmetic rather than
/// a config struct.

/// Size of one block: 5 MiB.
pub const BLOCK_SIZE: u64 = 5 * 1024 * 1024;

/// Maximum number of blocks a file may grow to.
pub const MAX_BLOCKS: u64 = 20;

/// Maximum file size: `MAX_BLOCKS * BLOCK_SIZE` (100 MiB).
pub const MAX_FILE_SIZE: u64 = MAX_BLOCKS * BLOCK_SIZE;

/// Number of regions per block.
pub const REGIONS_PER_BLOCK: u32 = 512;

/// Byte stride of one region: `SLOTS_PER_REGION * SLOT_STRIDE`.
pub const REGION_STRIDE: u64 = SLOTS_PER_REGION as u64 * SLOT_STRIDE;

/// Number of doc slots per region.
pub const SLOTS_PER_REGION: u32 = 8;

/// Byte stride of one doc slot.
pub const SLOT_STRIDE: u64 = 1280;

/// Fixed header size at the front of every doc slot.
pub const DOC_HEADER_LEN: usize = 12;

/// Byte offset and width of the `key_len` varint window within a slot header.
pub const KEY_LEN_WINDOW: (usize, usize) = (1, 2);

/// Byte offset and width of the `val_len` varint window within a slot header.
pub const VAL_LEN_WINDOW: (usize, usize) = (3, 2);

/// Byte offset and width of the `expires_at_ms` varint window within a slot header.
pub const EXPIRES_AT_WINDOW: (usize, usize) = (5, 7);

pub const MAX_KEY_LEN: usize = 244;
pub const MAX_VAL_LEN: usize = 1024;

const _: () = assert!(DOC_HEADER_LEN == 1 + KEY_LEN_WINDOW.1 + VAL_LEN_WINDOW.1 + EXPIRES_AT_WINDOW.1);
const _: () = assert!(REGION_STRIDE * REGIONS_PER_BLOCK as u64 == BLOCK_SIZE);
const _: () = assert!((DOC_HEADER_LEN as u64 + MAX_KEY_LEN as u64 + MAX_VAL_LEN as u64) <= SLOT_STRIDE);

/// Byte offset of block `block_idx` from the start of the file.
pub fn block_offset(block_idx: u64) -> u64 {
    block_idx * BLOCK_SIZE
}

/// Byte offset of `region_idx` within block `block_idx`, measured from the
/// start of the file.
pub fn region_offset(block_idx: u64, region_idx: u32) -> u64 {
    block_offset(block_idx) + region_idx as u64 * REGION_STRIDE
}

/// Byte offset of `slot_idx` within the region at `(block_idx, region_idx)`,
/// measured from the start of the file.
pub fn slot_offset(block_idx: u64, region_idx: u32, slot_idx: u32) -> u64 {
    region_offset(block_idx, region_idx) + slot_idx as u64 * SLOT_STRIDE
}

/// Number of whole blocks represented by `file_size`, or `None` if
/// `file_size` is not a positive multiple of `BLOCK_SIZE` within range.
pub fn block_count(file_size: u64) -> Option<u64> {
    if file_size == 0 || file_size % BLOCK_SIZE != 0 {
        return None;
    }
    let blocks = file_size / BLOCK_SIZE;
    if blocks == 0 || blocks > MAX_BLOCKS {
        return None;
    }
    Some(blocks)
}
