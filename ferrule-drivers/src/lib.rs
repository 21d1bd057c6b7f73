//! Driver implementations
//!
//! This crate provides the drivers built on the traits defined in
//! ferrule-hal:
//!
//! - 1-Wire bus master (reset/presence, byte transfers, strong pull-up)
//! - Search ROM enumeration of every slave on a bus
//! - DS18B20 temperature sensor
//! - SCSI block target command engine
//! - USB Bulk-Only mass storage worker
//! - RAM disk block device

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

// Must come first so the logging macros are visible in every module
mod fmt;

pub mod onewire;
pub mod scsi;
pub mod sensor;
pub mod storage;
