/// Placement hasher: maps a key to a region index via MurmurHash3.
use std::io::Cursor;

use crate::layout::REGIONS_PER_BLOCK;

/// `region(key) = Murmur3(key_bytes) mod REGIONS_PER_BLOCK`.
///
/// The same key always maps to the same region across every block of the
/// file, which is what lets `Get`/`Set`/`Del` bound their scan to
/// `8 * block_count` slots instead of searching the whole file.
pub fn region(key: &[u8]) -> u32 {
    // murmur3_32 only fails if the reader itself fails; a Cursor over an
    // in-memory slice never does.
    let hash = murmur3::murmur3_32(&mut Cursor::new(key), 0).expect("in-memory read cannot fail");
    hash % REGIONS_PER_BLOCK
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_deterministic() {
        assert_eq!(region(b"hello"), region(b"hello"));
    }

    #[test]
    fn is_in_range() {
        for key in ["", "a", "abcdef", "the quick brown fox"] {
            assert!(region(key.as_bytes()) < REGIONS_PER_BLOCK);
        }
    }

    #[test]
    fn distinguishes_most_keys() {
        let regions: std::collections::HashSet<u32> =
            (0..2000).map(|i| region(i.to_string().as_bytes())).collect();
        // Not a strict pigeonhole guarantee, but a sanity check that we're
        // not collapsing everything into one bucket.
        assert!(regions.len() > 100);
    }
}
