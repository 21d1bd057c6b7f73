//! Test doubles for the SCSI target

use ferrule_hal::block::{BlockDevice, BlockDeviceInfo, BlockError};
use ferrule_hal::transport::ScsiTransport;

use crate::storage::RamDisk;

/// Transport that records data-in and replays queued data-out bytes
#[derive(Debug, Default)]
pub(crate) struct MockTransport {
    /// Everything transmitted to the initiator
    pub sent: Vec<u8>,
    /// Bytes the initiator will send
    pub incoming: Vec<u8>,
    pos: usize,
    /// Accept at most this many bytes per transmit
    pub transmit_limit: Option<usize>,
}

impl MockTransport {
    pub fn queue(&mut self, data: &[u8]) {
        self.incoming.extend_from_slice(data);
    }
}

impl ScsiTransport for MockTransport {
    fn transmit(&mut self, data: &[u8]) -> usize {
        let n = self.transmit_limit.map_or(data.len(), |limit| data.len().min(limit));
        self.sent.extend_from_slice(&data[..n]);
        n
    }

    fn receive(&mut self, buf: &mut [u8]) -> usize {
        let n = buf.len().min(self.incoming.len() - self.pos);
        buf[..n].copy_from_slice(&self.incoming[self.pos..self.pos + n]);
        self.pos += n;
        n
    }
}

/// RAM disk that counts accesses and fails on request
pub(crate) struct CountingDisk<'a> {
    pub inner: RamDisk<'a>,
    pub reads: usize,
    pub writes: usize,
    pub syncs: usize,
    pub fail_reads: bool,
    pub fail_writes: bool,
    pub fail_info: bool,
    pub fail_sync: bool,
}

impl<'a> CountingDisk<'a> {
    pub fn new(data: &'a mut [u8], block_size: u32) -> Self {
        Self {
            inner: RamDisk::new(data, block_size),
            reads: 0,
            writes: 0,
            syncs: 0,
            fail_reads: false,
            fail_writes: false,
            fail_info: false,
            fail_sync: false,
        }
    }
}

impl BlockDevice for CountingDisk<'_> {
    fn read(&mut self, start_block: u32, buf: &mut [u8], count: u32) -> Result<(), BlockError> {
        self.reads += 1;
        if self.fail_reads {
            return Err(BlockError::Io);
        }
        self.inner.read(start_block, buf, count)
    }

    fn write(&mut self, start_block: u32, buf: &[u8], count: u32) -> Result<(), BlockError> {
        self.writes += 1;
        if self.fail_writes {
            return Err(BlockError::Io);
        }
        self.inner.write(start_block, buf, count)
    }

    fn info(&mut self) -> Result<BlockDeviceInfo, BlockError> {
        if self.fail_info {
            return Err(BlockError::Io);
        }
        self.inner.info()
    }

    fn is_inserted(&self) -> bool {
        self.inner.is_inserted()
    }

    fn is_write_protected(&self) -> bool {
        self.inner.is_write_protected()
    }

    fn sync(&mut self) -> Result<(), BlockError> {
        self.syncs += 1;
        if self.fail_sync {
            return Err(BlockError::Io);
        }
        self.inner.sync()
    }
}
