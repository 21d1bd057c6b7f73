//! USB Mass Storage Bulk-Only Transport wrappers
//!
//! Every command starts with a 31-byte Command Block Wrapper on the bulk
//! OUT endpoint, runs an optional data phase and ends with a 13-byte
//! Command Status Wrapper on bulk IN. All fields are little-endian.
//!
//! CBW format:
//! - SIGNATURE (4 bytes): "USBC"
//! - TAG (4 bytes): echoed in the CSW
//! - DATA TRANSFER LENGTH (4 bytes): bytes the host expects to move
//! - FLAGS (1 byte): bit 7 set for device-to-host
//! - LUN (1 byte): low 4 bits
//! - CB LENGTH (1 byte): 1..=16
//! - CB (16 bytes): the SCSI CDB, zero padded

use crate::scsi::{Cdb, CDB_LEN};

/// "USBC"
pub const CBW_SIGNATURE: u32 = 0x4342_5355;
/// "USBS"
pub const CSW_SIGNATURE: u32 = 0x5342_5355;

/// Errors from wrapper parsing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BotError {
    /// Wrapper is not exactly the expected size
    InvalidLength,
    /// Signature field does not match
    InvalidSignature,
    /// CB length outside 1..=16
    InvalidCommandLength,
    /// Unknown CSW status byte
    InvalidStatus,
}

/// Data phase direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    /// Host to device (or no data)
    Out,
    /// Device to host
    In,
}

/// Command Block Wrapper
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CommandBlockWrapper {
    pub tag: u32,
    pub data_transfer_length: u32,
    pub direction: Direction,
    pub lun: u8,
    /// Significant bytes of `block`
    pub block_len: u8,
    pub block: Cdb,
}

impl CommandBlockWrapper {
    pub const LEN: usize = 31;

    const FLAG_DATA_IN: u8 = 0x80;

    /// Wrap a CDB
    pub fn new(tag: u32, data_transfer_length: u32, direction: Direction, command: &[u8]) -> Self {
        let len = command.len().min(CDB_LEN);
        let mut block = [0u8; CDB_LEN];
        block[..len].copy_from_slice(&command[..len]);
        Self {
            tag,
            data_transfer_length,
            direction,
            lun: 0,
            block_len: len as u8,
            block,
        }
    }

    /// Parse a received wrapper
    pub fn parse(buf: &[u8]) -> Result<Self, BotError> {
        if buf.len() != Self::LEN {
            return Err(BotError::InvalidLength);
        }
        if u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) != CBW_SIGNATURE {
            return Err(BotError::InvalidSignature);
        }

        let block_len = buf[14] & 0x1F;
        if block_len == 0 || block_len as usize > CDB_LEN {
            return Err(BotError::InvalidCommandLength);
        }

        // Bytes past the CB length are not part of the command
        let mut block = [0u8; CDB_LEN];
        block[..block_len as usize].copy_from_slice(&buf[15..15 + block_len as usize]);

        Ok(Self {
            tag: u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]),
            data_transfer_length: u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]),
            direction: if buf[12] & Self::FLAG_DATA_IN != 0 {
                Direction::In
            } else {
                Direction::Out
            },
            lun: buf[13] & 0x0F,
            block_len,
            block,
        })
    }

    /// Serialize into wire format
    pub fn to_bytes(&self) -> [u8; Self::LEN] {
        let mut buf = [0u8; Self::LEN];
        buf[0..4].copy_from_slice(&CBW_SIGNATURE.to_le_bytes());
        buf[4..8].copy_from_slice(&self.tag.to_le_bytes());
        buf[8..12].copy_from_slice(&self.data_transfer_length.to_le_bytes());
        buf[12] = match self.direction {
            Direction::In => Self::FLAG_DATA_IN,
            Direction::Out => 0,
        };
        buf[13] = self.lun & 0x0F;
        buf[14] = self.block_len;
        buf[15..31].copy_from_slice(&self.block);
        buf
    }
}

/// Command outcome reported in the CSW
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum CommandStatus {
    Passed = 0x00,
    Failed = 0x01,
    PhaseError = 0x02,
}

impl TryFrom<u8> for CommandStatus {
    type Error = BotError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(CommandStatus::Passed),
            0x01 => Ok(CommandStatus::Failed),
            0x02 => Ok(CommandStatus::PhaseError),
            _ => Err(BotError::InvalidStatus),
        }
    }
}

/// Command Status Wrapper
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CommandStatusWrapper {
    pub tag: u32,
    /// Expected minus actually processed bytes
    pub data_residue: u32,
    pub status: CommandStatus,
}

impl CommandStatusWrapper {
    pub const LEN: usize = 13;

    pub fn to_bytes(&self) -> [u8; Self::LEN] {
        let mut buf = [0u8; Self::LEN];
        buf[0..4].copy_from_slice(&CSW_SIGNATURE.to_le_bytes());
        buf[4..8].copy_from_slice(&self.tag.to_le_bytes());
        buf[8..12].copy_from_slice(&self.data_residue.to_le_bytes());
        buf[12] = self.status as u8;
        buf
    }

    pub fn parse(buf: &[u8]) -> Result<Self, BotError> {
        if buf.len() != Self::LEN {
            return Err(BotError::InvalidLength);
        }
        if u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) != CSW_SIGNATURE {
            return Err(BotError::InvalidSignature);
        }
        Ok(Self {
            tag: u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]),
            data_residue: u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]),
            status: CommandStatus::try_from(buf[12])?,
        })
    }
}
