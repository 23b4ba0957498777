use std::fmt;
use std::io;

/// Every fallible operation on a [`crate::FileCache`] returns this error type.
///
/// Validation errors (`KeyTooShort`, `ValueTooLong`, ...) are returned
/// without touching the file. `Io` and `InvalidFileSize` are latched on the
/// handle at open time (or the first time they occur during a `grow`) and
/// are then returned from every subsequent operation. `FileSizeTooLarge` is
/// not latched: it means this particular `Set` had no room to grow into, not
/// that the handle is broken.
#[derive(Debug)]
#[non_exhaustive]
pub enum CacheError {
    /// The key is absent, or the stored entry has expired.
    NotFound,
    /// `len(key) == 0`.
    KeyTooShort,
    /// `len(key) > 244`.
    KeyTooLong,
    /// `len(val) == 0` (Set only).
    ValueTooShort,
    /// `len(val) > 1024` (Set only).
    ValueTooLong,
    /// Every slot of the target region, in every allocated block, is
    /// occupied by a different key and the file is already at its maximum
    /// size.
    HashConflict,
    /// The backing file's size is not a positive multiple of the block size.
    InvalidFileSize,
    /// `Set` needed a new block but the file is already at `MAX_BLOCKS`.
    FileSizeTooLarge,
    /// A slot header's varint fields did not decode within their allotted
    /// byte window.
    CorruptDoc,
    /// An underlying I/O failure (open, write, mmap).
    Io(io::Error),
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::NotFound => write!(f, "key not found"),
            CacheError::KeyTooShort => write!(f, "key too short"),
            CacheError::KeyTooLong => write!(f, "key too long"),
            CacheError::ValueTooShort => write!(f, "value too short"),
            CacheError::ValueTooLong => write!(f, "value too long"),
            CacheError::HashConflict => write!(f, "hash conflict: region is full"),
            CacheError::InvalidFileSize => write!(f, "invalid file size"),
            CacheError::FileSizeTooLarge => write!(f, "file size too large"),
            CacheError::CorruptDoc => write!(f, "doc header failed to decode"),
            CacheError::Io(err) => write!(f, "i/o error: {err}"),
        }
    }
}

impl std::error::Error for CacheError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CacheError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for CacheError {
    fn from(err: io::Error) -> Self {
        CacheError::Io(err)
    }
}

impl CacheError {
    /// Whether this error, once observed, should be latched on the handle
    /// and returned from every subsequent operation.
    pub(crate) fn is_fatal(&self) -> bool {
        matches!(self, CacheError::Io(_) | CacheError::InvalidFileSize)
    }
}
