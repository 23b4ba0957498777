/// Maps the backing file into a single writable byte region and remaps it
/// whenever the file grows.
use memmap2::MmapMut;

use crate::error::CacheError;
use crate::file::FileManager;

pub struct Mapper {
    mmap: MmapMut,
}

impl Mapper {
    /// Maps the entirety of `file`'s current length.
    pub fn new(file: &FileManager) -> Result<Self, CacheError> {
        let mmap = unsafe { MmapMut::map_mut(file.file())? };
        Ok(Mapper { mmap })
    }

    /// Re-maps the file after its length has changed. The previous mapping
    /// is dropped; nothing derived from it may be used afterwards.
    pub fn remap(&mut self, file: &FileManager) -> Result<(), CacheError> {
        self.mmap = unsafe { MmapMut::map_mut(file.file())? };
        Ok(())
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.mmap
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.mmap
    }

    /// Opportunistically flushes dirty pages. Not required for correctness
    /// within the process — the contract only needs pages durable once the
    /// OS writes them back — but gives a caller closing a handle a way to
    /// push bytes out promptly.
    pub fn flush(&self) -> Result<(), CacheError> {
        self.mmap.flush()?;
        Ok(())
    }
}
