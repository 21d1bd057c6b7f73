//! Block storage abstractions
//!
//! Provides the block device interface a SCSI target reads and writes
//! through. Implementations include SD/MMC cards, flash translation layers
//! and RAM disks.

/// Geometry reported by a block device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BlockDeviceInfo {
    /// Size of one block in bytes
    pub block_size: u32,
    /// Number of addressable blocks
    pub block_count: u32,
}

impl BlockDeviceInfo {
    /// Address of the last block, or `None` for an empty device
    pub fn last_block(&self) -> Option<u32> {
        self.block_count.checked_sub(1)
    }

    /// Total capacity in bytes
    pub fn capacity_bytes(&self) -> u64 {
        self.block_size as u64 * self.block_count as u64
    }

    /// Check that `count` blocks starting at `start` fit on the device
    pub fn contains(&self, start: u32, count: u32) -> bool {
        start as u64 + count as u64 <= self.block_count as u64
    }
}

/// Errors from block device operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BlockError {
    /// No medium in the slot
    NotInserted,
    /// Request extends past the last block
    OutOfRange,
    /// Device rejects writes
    WriteProtected,
    /// Buffer does not hold `count` blocks
    BufferTooSmall,
    /// Underlying transfer failed
    Io,
}

/// Block storage device
///
/// Transfers are whole blocks. `buf` must hold at least
/// `count * block_size` bytes.
pub trait BlockDevice {
    /// Read `count` blocks starting at `start_block` into `buf`
    fn read(&mut self, start_block: u32, buf: &mut [u8], count: u32) -> Result<(), BlockError>;

    /// Write `count` blocks from `buf` starting at `start_block`
    fn write(&mut self, start_block: u32, buf: &[u8], count: u32) -> Result<(), BlockError>;

    /// Query device geometry
    fn info(&mut self) -> Result<BlockDeviceInfo, BlockError>;

    /// Check whether a medium is present
    fn is_inserted(&self) -> bool;

    /// Check whether the medium rejects writes
    fn is_write_protected(&self) -> bool;

    /// Flush any cached writes
    fn sync(&mut self) -> Result<(), BlockError> {
        Ok(())
    }
}
