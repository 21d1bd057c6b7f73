//! SCSI block target and USB mass storage
//!
//! [`ScsiTarget`] executes SCSI commands against a
//! [`BlockDevice`](ferrule_hal::BlockDevice), moving data phases over a
//! [`ScsiTransport`](ferrule_hal::ScsiTransport). [`MassStorage`] wraps it
//! with the USB Bulk-Only Transport command/status handshake.

mod msd;
mod target;

#[cfg(test)]
pub(crate) mod mock;

pub use msd::{MassStorage, MsdError};
pub use target::{DataPhase, ScsiConfig, ScsiError, ScsiTarget, TargetState};
