//! 1-Wire bus master
//!
//! [`OneWireBus`] drives a single 1-Wire segment through a
//! [`PulseTimer`](ferrule_hal::PulseTimer): every bit is one time slot in
//! which the master pulls the bus low for a fixed width and the engine
//! samples the bus at a fixed offset.
//!
//! # Lifecycle
//!
//! ```text
//!            start()             write_bytes(.., Hold)
//! Stopped ──────────▶ Ready ────────────────────────▶ PullUpAsserted
//!    ▲                  │  ◀──────────────────────────       │
//!    │     stop()       │        release_pullup()            │
//!    └──────────────────┴────────────────────────────────────┘
//! ```
//!
//! Calling an operation in the wrong state, or with an empty or oversized
//! buffer, is a programming error and panics.
//!
//! # Example
//!
//! ```ignore
//! let mut bus = OneWireBus::new(timer, embassy_time::Delay);
//! bus.start(OneWireConfig::default());
//!
//! let mut roms = [RomCode::default(); 8];
//! let report = bus.search_rom(&mut roms).await?;
//! for rom in &roms[..report.found] {
//!     info!("found {}", rom);
//! }
//! ```

mod bus;
mod search;

#[cfg(test)]
pub(crate) mod sim;

pub use bus::{BusState, OneWireBus, OneWireConfig, OneWireError, Registry, StrongPullup};
pub use ferrule_protocol::crc::crc8;
pub use search::{SearchReport, SearchResult};
