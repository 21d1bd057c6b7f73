//! Wire formats for the ferrule drivers
//!
//! Everything here is bit-exact protocol data with no hardware behind it:
//!
//! - 1-Wire ROM commands, time-slot widths, the Maxim CRC-8 and 64-bit
//!   ROM codes
//! - SCSI operation codes, sense data, response records and CDB decoding
//! - USB Bulk-Only Transport command/status wrappers
//!
//! # Byte order
//!
//! SCSI fields are big-endian on the wire, Bulk-Only wrappers are
//! little-endian, 1-Wire data is shifted out least significant bit first.
//! Conversion happens only in this crate; callers see native integers.

#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![deny(unsafe_code)]

pub mod bot;
pub mod crc;
pub mod onewire;
pub mod rom;
pub mod scsi;
pub mod sense;

pub use bot::{BotError, CommandBlockWrapper, CommandStatus, CommandStatusWrapper, Direction};
pub use crc::crc8;
pub use rom::RomCode;
pub use scsi::{DataRequest, InquiryData, UnitSerialNumber};
pub use sense::{SenseCode, SenseData};
