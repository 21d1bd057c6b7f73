//! Ferrule Hardware Abstraction Layer
//!
//! This crate defines the capability traits the ferrule drivers are written
//! against. Chip-specific crates implement them on top of their timer, pad
//! and USB peripherals; the drivers never touch registers.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  ferrule-drivers (1-Wire, SCSI, MSD)    │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  ferrule-hal (this crate - traits)      │
//! └─────────────────────────────────────────┘
//!                     │
//!         ┌───────────┴───────────┐
//!         ▼                       ▼
//! ┌───────────────┐       ┌───────────────┐
//! │  timer + pad  │       │ USB endpoint, │
//! │  LLD (PWM)    │       │ SD card, RAM  │
//! └───────────────┘       └───────────────┘
//! ```
//!
//! # Traits
//!
//! - [`pulse::PulseTimer`] - Bit-level time-slot engine for 1-Wire
//! - [`block::BlockDevice`] - Block storage backing a SCSI target
//! - [`transport::ScsiTransport`] - Byte stream carrying SCSI data phases

#![no_std]
#![deny(unsafe_code)]

pub mod block;
pub mod pulse;
pub mod transport;

// Re-export key traits at crate root for convenience
pub use block::{BlockDevice, BlockDeviceInfo, BlockError};
pub use pulse::{PulseTimer, PulseTimerConfig, SlotCompletion, SlotTiming};
pub use transport::{IoTransport, ScsiTransport};
