//! RAM-backed block device
//!
//! Serves a caller-owned byte slice as a removable disk. The medium can be
//! ejected and write protected at runtime, which makes it useful both as a
//! scratch volume and for exercising a SCSI target's error paths.

use ferrule_hal::block::{BlockDevice, BlockDeviceInfo, BlockError};

/// Block device over a byte slice
pub struct RamDisk<'a> {
    data: &'a mut [u8],
    block_size: u32,
    inserted: bool,
    write_protected: bool,
}

impl<'a> RamDisk<'a> {
    /// Create an inserted, writable disk
    ///
    /// Trailing bytes that do not fill a whole block are not addressable.
    ///
    /// # Panics
    ///
    /// If `block_size` is zero.
    pub fn new(data: &'a mut [u8], block_size: u32) -> Self {
        assert!(block_size > 0, "block size must be non-zero");
        Self {
            data,
            block_size,
            inserted: true,
            write_protected: false,
        }
    }

    /// Insert or eject the medium
    pub fn set_inserted(&mut self, inserted: bool) {
        self.inserted = inserted;
    }

    /// Enable or disable write protection
    pub fn set_write_protected(&mut self, protected: bool) {
        self.write_protected = protected;
    }

    /// Backing storage
    pub fn data(&self) -> &[u8] {
        self.data
    }

    fn block_count(&self) -> u32 {
        (self.data.len() as u64 / self.block_size as u64).min(u32::MAX as u64) as u32
    }

    /// Byte range covered by a block request
    fn span(&self, start_block: u32, count: u32, buf_len: usize) -> Result<(usize, usize), BlockError> {
        if !self.inserted {
            return Err(BlockError::NotInserted);
        }
        if start_block as u64 + count as u64 > self.block_count() as u64 {
            return Err(BlockError::OutOfRange);
        }
        let offset = start_block as usize * self.block_size as usize;
        let len = count as usize * self.block_size as usize;
        if buf_len < len {
            return Err(BlockError::BufferTooSmall);
        }
        Ok((offset, len))
    }
}

impl BlockDevice for RamDisk<'_> {
    fn read(&mut self, start_block: u32, buf: &mut [u8], count: u32) -> Result<(), BlockError> {
        let (offset, len) = self.span(start_block, count, buf.len())?;
        buf[..len].copy_from_slice(&self.data[offset..offset + len]);
        Ok(())
    }

    fn write(&mut self, start_block: u32, buf: &[u8], count: u32) -> Result<(), BlockError> {
        let (offset, len) = self.span(start_block, count, buf.len())?;
        if self.write_protected {
            return Err(BlockError::WriteProtected);
        }
        self.data[offset..offset + len].copy_from_slice(&buf[..len]);
        Ok(())
    }

    fn info(&mut self) -> Result<BlockDeviceInfo, BlockError> {
        if !self.inserted {
            return Err(BlockError::NotInserted);
        }
        Ok(BlockDeviceInfo {
            block_size: self.block_size,
            block_count: self.block_count(),
        })
    }

    fn is_inserted(&self) -> bool {
        self.inserted
    }

    fn is_write_protected(&self) -> bool {
        self.write_protected
    }
}
