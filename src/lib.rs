//! A persistent, fixed-layout, memory-mapped key-value cache with per-entry
//! TTL. See `SPEC_FULL.md` for the full on-disk format and contract; the
//! short version:
//!
//! - Keys are ≤ 244 bytes, values are ≤ 1024 bytes.
//! - The backing file grows in fixed 5 MiB blocks up to a 100 MiB ceiling.
//! - A key is placed in one of 512 regions per block via MurmurHash3;
//!   lookup/insert linearly probes the 8 slots of that region across every
//!   allocated block.
//! - This is a single-process, embedded cache: no locking, no eviction
//!   beyond TTL, no compaction.

mod doc;
mod error;
mod file;
mod hash;
mod layout;
mod mapper;

use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub use error::CacheError;

use file::FileManager;
use mapper::Mapper;

/// A handle onto one backing file.
///
/// Not `Sync`: per §5, the engine provides no internal synchronization, and
/// every operation takes `&mut self` so the borrow checker enforces that a
/// handle is used by one caller at a time.
pub struct FileCache {
    file: FileManager,
    mapper: Mapper,
    /// A fatal open/grow/mmap error, latched the first time it is observed.
    /// Every subsequent operation short-circuits to this error instead of
    /// touching the file again.
    fatal: Option<CacheError>,
}

impl FileCache {
    /// Opens (creating if absent) the backing file at `path`.
    ///
    /// A brand-new file is grown to one block (5 MiB); an existing file
    /// must have a size that is a positive multiple of the block size, or
    /// this returns `CacheError::InvalidFileSize`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CacheError> {
        let path = path.as_ref();
        let file = match FileManager::open(path) {
            Ok(file) => file,
            Err(err) => {
                log::error!("failed to open {}: {err}", path.display());
                return Err(err);
            }
        };
        let mapper = Mapper::new(&file)?;
        log::debug!("opened {} ({} bytes)", path.display(), file.len());
        Ok(FileCache {
            file,
            mapper,
            fatal: None,
        })
    }

    /// Total size of the backing file, in bytes. Always a positive multiple
    /// of the block size.
    pub fn file_size(&self) -> u64 {
        self.file.len()
    }

    fn check_fatal(&self) -> Result<(), CacheError> {
        match &self.fatal {
            Some(err) => Err(clone_error(err)),
            None => Ok(()),
        }
    }

    /// Records `err` on the handle if it is fatal, then returns it unchanged
    /// so the caller can propagate it for this call too.
    fn latch_if_fatal(&mut self, err: CacheError) -> CacheError {
        if err.is_fatal() && self.fatal.is_none() {
            self.fatal = Some(clone_error(&err));
        }
        err
    }

    /// Looks up `key`. Returns `CacheError::NotFound` if the key is absent
    /// or the stored entry has expired (the stale slot stays on disk).
    pub fn get(&mut self, key: &[u8]) -> Result<Vec<u8>, CacheError> {
        self.check_fatal()?;
        doc::validate_key(key)?;

        let region = hash::region(key);
        let now = now_ms();
        let bytes = self.mapper.as_slice();

        for block in 0..self.file.block_count() {
            for slot_off in doc::slots_in_region(block, region) {
                let Some(header) = doc::decode_header(bytes, slot_off)? else {
                    continue;
                };
                if doc::slot_key(bytes, slot_off, &header) != key {
                    continue;
                }
                if header.expires_at_ms < now {
                    return Err(CacheError::NotFound);
                }
                return Ok(doc::slot_val(bytes, slot_off, &header).to_vec());
            }
        }

        Err(CacheError::NotFound)
    }

    /// Stores `val` under `key` with the given time-to-live.
    ///
    /// Scans for an existing doc with the same key first (update-in-place);
    /// failing that, the first empty slot found anywhere in the region's
    /// scan. If no matching or empty slot turns up in a block and the next
    /// block hasn't been allocated yet, grows the file by one block and
    /// keeps scanning. Returns `HashConflict` once the file is at its
    /// maximum size with no room left in the region.
    pub fn set(&mut self, key: &[u8], val: &[u8], ttl: Duration) -> Result<(), CacheError> {
        self.check_fatal()?;
        doc::validate_key(key)?;
        doc::validate_val(val)?;

        let region = hash::region(key);
        let expires_at_ms = now_ms() + ttl.as_millis() as i64;

        let mut first_empty: Option<u64> = None;
        let mut block = 0u64;

        loop {
            let block_count = self.file.block_count();
            if block >= block_count {
                // Nothing left to scan. An empty slot found earlier in the
                // region wins over growing the file further.
                if let Some(slot_off) = first_empty {
                    doc::write_doc(self.mapper.as_mut_slice(), slot_off, key, val, expires_at_ms);
                    return Ok(());
                }
                match self.file.grow() {
                    Ok(()) => {
                        if let Err(err) = self.mapper.remap(&self.file) {
                            return Err(self.latch_if_fatal(err));
                        }
                        continue;
                    }
                    Err(CacheError::FileSizeTooLarge) => {
                        // Every slot of this region, in every allocated
                        // block, is occupied by a different key, and the
                        // file is already at its maximum size: this is a
                        // hash conflict, not merely a refusal to grow.
                        log::warn!("set: region {region} saturated across every block; file at max size");
                        return Err(CacheError::HashConflict);
                    }
                    Err(err) => return Err(self.latch_if_fatal(err)),
                }
            }

            let bytes = self.mapper.as_slice();
            let mut matched = None;
            for slot_off in doc::slots_in_region(block, region) {
                match doc::decode_header(bytes, slot_off)? {
                    Some(header) => {
                        if doc::slot_key(bytes, slot_off, &header) == key {
                            matched = Some(slot_off);
                            break;
                        }
                    }
                    None => {
                        if first_empty.is_none() {
                            first_empty = Some(slot_off);
                        }
                    }
                }
            }

            if let Some(slot_off) = matched {
                doc::write_doc(self.mapper.as_mut_slice(), slot_off, key, val, expires_at_ms);
                return Ok(());
            }

            block += 1;
        }
    }

    /// Returns the remaining time-to-live of `key`. Same lookup and error
    /// semantics as [`Self::get`].
    pub fn ttl(&mut self, key: &[u8]) -> Result<Duration, CacheError> {
        self.check_fatal()?;
        doc::validate_key(key)?;

        let region = hash::region(key);
        let now = now_ms();
        let bytes = self.mapper.as_slice();

        for block in 0..self.file.block_count() {
            for slot_off in doc::slots_in_region(block, region) {
                let Some(header) = doc::decode_header(bytes, slot_off)? else {
                    continue;
                };
                if doc::slot_key(bytes, slot_off, &header) != key {
                    continue;
                }
                if header.expires_at_ms < now {
                    return Err(CacheError::NotFound);
                }
                return Ok(Duration::from_millis((header.expires_at_ms - now) as u64));
            }
        }

        Err(CacheError::NotFound)
    }

    /// Deletes `key`. Idempotent: deleting an absent key is a success, not
    /// an error.
    pub fn del(&mut self, key: &[u8]) -> Result<(), CacheError> {
        self.check_fatal()?;
        doc::validate_key(key)?;

        let region = hash::region(key);
        let block_count = self.file.block_count();

        for block in 0..block_count {
            let bytes = self.mapper.as_slice();
            let mut found = None;
            for slot_off in doc::slots_in_region(block, region) {
                if let Some(header) = doc::decode_header(bytes, slot_off)? {
                    if doc::slot_key(bytes, slot_off, &header) == key {
                        found = Some(slot_off);
                        break;
                    }
                }
            }
            if let Some(slot_off) = found {
                doc::clear_doc(self.mapper.as_mut_slice(), slot_off);
                return Ok(());
            }
        }

        Ok(())
    }

    /// Returns every currently live (occupied, non-expired) `(key, value)`
    /// pair. Order is implementation-defined (block-major, region-minor,
    /// slot order) but stable for a given file state.
    pub fn range(&mut self) -> Result<Vec<(Vec<u8>, Vec<u8>)>, CacheError> {
        self.check_fatal()?;

        let now = now_ms();
        let bytes = self.mapper.as_slice();
        let mut out = Vec::new();

        for block in 0..self.file.block_count() {
            for region in 0..layout::REGIONS_PER_BLOCK {
                for slot_off in doc::slots_in_region(block, region) {
                    let Some(header) = doc::decode_header(bytes, slot_off)? else {
                        continue;
                    };
                    if header.expires_at_ms < now {
                        continue;
                    }
                    let key = doc::slot_key(bytes, slot_off, &header).to_vec();
                    let val = doc::slot_val(bytes, slot_off, &header).to_vec();
                    out.push((key, val));
                }
            }
        }

        Ok(out)
    }
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the Unix epoch")
        .as_millis() as i64
}

/// `CacheError` holds an `io::Error`, which isn't `Clone`; this lets us keep
/// a latched copy on the handle while still returning an owned error from
/// the call that triggered it.
fn clone_error(err: &CacheError) -> CacheError {
    match err {
        CacheError::NotFound => CacheError::NotFound,
        CacheError::KeyTooShort => CacheError::KeyTooShort,
        CacheError::KeyTooLong => CacheError::KeyTooLong,
        CacheError::ValueTooShort => CacheError::ValueTooShort,
        CacheError::ValueTooLong => CacheError::ValueTooLong,
        CacheError::HashConflict => CacheError::HashConflict,
        CacheError::InvalidFileSize => CacheError::InvalidFileSize,
        CacheError::FileSizeTooLarge => CacheError::FileSizeTooLarge,
        CacheError::CorruptDoc => CacheError::CorruptDoc,
        CacheError::Io(err) => CacheError::Io(std::io::Error::new(err.kind(), err.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn cache() -> (tempfile::TempDir, FileCache) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");
        let cache = FileCache::open(&path).unwrap();
        (dir, cache)
    }

    #[test]
    fn set_then_get_round_trips() {
        let (_dir, mut cache) = cache();
        cache.set(b"k", b"v", Duration::from_secs(60)).unwrap();
        assert_eq!(cache.get(b"k").unwrap(), b"v");
    }

    #[test]
    fn get_on_absent_key_is_not_found() {
        let (_dir, mut cache) = cache();
        assert!(matches!(cache.get(b"missing"), Err(CacheError::NotFound)));
    }

    #[test]
    fn expired_entry_reads_as_not_found() {
        let (_dir, mut cache) = cache();
        cache.set(b"k", b"v", Duration::from_millis(0)).unwrap();
        std::thread::sleep(Duration::from_millis(5));
        assert!(matches!(cache.get(b"k"), Err(CacheError::NotFound)));
    }

    #[test]
    fn del_then_get_is_not_found() {
        let (_dir, mut cache) = cache();
        cache.set(b"k", b"v", Duration::from_secs(60)).unwrap();
        cache.del(b"k").unwrap();
        assert!(matches!(cache.get(b"k"), Err(CacheError::NotFound)));
    }

    #[test]
    fn del_on_absent_key_succeeds() {
        let (_dir, mut cache) = cache();
        assert!(cache.del(b"missing").is_ok());
    }

    #[test]
    fn set_twice_updates_in_place() {
        let (_dir, mut cache) = cache();
        cache.set(b"k", b"v1", Duration::from_secs(60)).unwrap();
        cache.set(b"k", b"v2", Duration::from_secs(60)).unwrap();
        assert_eq!(cache.get(b"k").unwrap(), b"v2");
        assert_eq!(cache.range().unwrap().len(), 1);
    }

    #[test]
    fn freed_slot_is_reused() {
        let (_dir, mut cache) = cache();
        cache.set(b"k", b"v", Duration::from_secs(60)).unwrap();
        cache.del(b"k").unwrap();
        cache.set(b"k", b"v2", Duration::from_secs(60)).unwrap();
        assert_eq!(cache.get(b"k").unwrap(), b"v2");
    }

    #[test]
    fn ttl_reports_remaining_duration() {
        let (_dir, mut cache) = cache();
        cache.set(b"k", b"v", Duration::from_secs(60)).unwrap();
        let remaining = cache.ttl(b"k").unwrap();
        assert!(remaining <= Duration::from_secs(60));
        assert!(remaining > Duration::from_secs(55));
    }

    #[test]
    fn key_length_boundaries() {
        let (_dir, mut cache) = cache();
        assert!(matches!(cache.get(b""), Err(CacheError::KeyTooShort)));
        assert!(matches!(
            cache.set(b"", b"v", Duration::from_secs(1)),
            Err(CacheError::KeyTooShort)
        ));
        let max_key = vec![b'k'; 244];
        let too_long_key = vec![b'k'; 245];
        assert!(cache.set(&max_key, b"v", Duration::from_secs(1)).is_ok());
        assert!(matches!(
            cache.set(&too_long_key, b"v", Duration::from_secs(1)),
            Err(CacheError::KeyTooLong)
        ));
    }

    #[test]
    fn value_length_boundaries() {
        let (_dir, mut cache) = cache();
        assert!(matches!(
            cache.set(b"k", b"", Duration::from_secs(1)),
            Err(CacheError::ValueTooShort)
        ));
        let max_val = vec![b'v'; 1024];
        let too_long_val = vec![b'v'; 1025];
        assert!(cache.set(b"k1", &max_val, Duration::from_secs(1)).is_ok());
        assert!(matches!(
            cache.set(b"k2", &too_long_val, Duration::from_secs(1)),
            Err(CacheError::ValueTooLong)
        ));
    }

    #[test]
    fn fresh_file_is_exactly_one_block() {
        let (_dir, cache) = cache();
        assert_eq!(cache.file_size(), layout::BLOCK_SIZE);
    }

    /// A single region can only ever hold `SLOTS_PER_REGION * MAX_BLOCKS`
    /// distinct keys (160 at full file size); one more than that, even
    /// with the whole rest of the file empty, is a `HashConflict`.
    #[test]
    fn saturating_one_region_yields_hash_conflict() {
        let capacity = (layout::SLOTS_PER_REGION as u64 * layout::MAX_BLOCKS) as usize;

        let mut target_region = None;
        let mut colliding_keys: Vec<Vec<u8>> = Vec::new();
        let mut i: u64 = 0;
        while colliding_keys.len() <= capacity {
            let key = format!("saturate-{i}").into_bytes();
            let r = hash::region(&key);
            match target_region {
                None => {
                    target_region = Some(r);
                    colliding_keys.push(key);
                }
                Some(r2) if r2 == r => colliding_keys.push(key),
                _ => {}
            }
            i += 1;
            assert!(i < 10_000_000, "failed to find enough colliding keys");
        }

        let (_dir, mut cache) = cache();
        for key in &colliding_keys[..capacity] {
            cache.set(key, b"v", Duration::from_secs(60)).unwrap();
        }
        let last = &colliding_keys[capacity];
        assert!(matches!(
            cache.set(last, b"v", Duration::from_secs(60)),
            Err(CacheError::HashConflict)
        ));
    }
}
