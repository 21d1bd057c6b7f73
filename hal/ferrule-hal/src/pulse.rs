//! Bit-level timing engine abstraction
//!
//! A 1-Wire master is driven by a PWM-capable timer with two channels running
//! in lockstep. The master channel pulls the bus low for a programmable width
//! at the start of every period (the time slot); the sample channel fires an
//! interrupt at a fixed offset into the slot, where the bus level is read.
//!
//! ```text
//! -      --------------------------------------- master channel pulse
//!  |   /                            .
//!   --.............................  <---------- slave (not)pulls down here
//! -             -------------------------------- sample channel
//!  |            |
//!   -------------
//!               ^
//!               | bus level sampled here
//! ```
//!
//! Implementations typically forward the sample interrupt to the waiting
//! task through a [`SlotCompletion`].

use core::future::Future;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::signal::Signal;

/// Timer channel index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Channel(pub u8);

/// Logic level that drives the bus low
///
/// Most boards drive the bus directly with an open-drain pad (active low).
/// Boards with an inverting transistor stage need active high.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ActiveLevel {
    #[default]
    Low,
    High,
}

/// Pad configuration applied while the bus is idle or active
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PadMode {
    /// Plain input, external pull-up keeps the bus high
    Input,
    /// Open-drain GPIO output
    OpenDrain,
    /// Open-drain alternate function (timer output)
    AlternateOpenDrain,
}

/// Timing engine configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PulseTimerConfig {
    /// Timer tick frequency in Hz
    pub frequency_hz: u32,
    /// Channel generating the master low pulse
    pub master_channel: Channel,
    /// Channel generating the sample interrupt
    pub sample_channel: Channel,
    /// Level that pulls the bus low
    pub active_level: ActiveLevel,
    /// Pad mode while no transaction is running
    pub pad_mode_idle: PadMode,
    /// Pad mode while the timer drives the bus
    pub pad_mode_active: PadMode,
}

impl Default for PulseTimerConfig {
    fn default() -> Self {
        Self {
            frequency_hz: 1_000_000, // 1 tick = 1 us
            master_channel: Channel(0),
            sample_channel: Channel(1),
            active_level: ActiveLevel::Low,
            pad_mode_idle: PadMode::Input,
            pad_mode_active: PadMode::AlternateOpenDrain,
        }
    }
}

/// Time slot geometry, in timer ticks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SlotTiming {
    /// Slot period (timer overflow)
    pub period: u16,
    /// Offset of the sample point from the start of the slot
    pub sample_offset: u16,
}

/// Bit-level time-slot engine
///
/// One call to [`emit_master_pulse`](PulseTimer::emit_master_pulse) is one
/// time slot. The driver holds `&mut self` across the whole transaction, so
/// at most one slot sequence can be in flight per engine.
pub trait PulseTimer {
    /// Error type for slot operations
    type Error;

    /// Apply static configuration (channels, polarity, pad modes)
    ///
    /// Called once when the bus driver is started.
    fn configure(&mut self, config: &PulseTimerConfig);

    /// Start generating slots with the given geometry
    ///
    /// Switches the pad to its active mode. The master output stays
    /// released until the first pulse is emitted.
    fn activate(&mut self, timing: SlotTiming);

    /// Emit one time slot with a master low pulse of `width` ticks
    ///
    /// Resolves once the slot is over with the bus level captured at the
    /// sample offset (`true` = high).
    fn emit_master_pulse(&mut self, width: u16)
        -> impl Future<Output = Result<bool, Self::Error>>;

    /// Stop the timer and return the pad to its idle mode
    fn idle(&mut self);

    /// Read the bus level directly, outside of any time slot
    fn sample_bus_level(&mut self) -> bool;

    /// Drive or release the strong pull-up for parasite-powered slaves
    fn set_strong_pullup(&mut self, asserted: bool);
}

/// Interrupt-to-task handoff for a finished time slot
///
/// The sample-channel interrupt calls [`complete`](Self::complete) with the
/// pad level; the task suspended in [`wait`](Self::wait) resumes with it.
/// This replaces the RTOS "thread reference" suspend/resume pair.
///
/// ```ignore
/// static SLOT: SlotCompletion<CriticalSectionRawMutex> = SlotCompletion::new();
///
/// // sample channel ISR
/// SLOT.complete(pad.is_high());
///
/// // PulseTimer::emit_master_pulse
/// SLOT.reset();
/// pwm.set_duty(master, width);
/// Ok(SLOT.wait().await)
/// ```
pub struct SlotCompletion<M: RawMutex> {
    signal: Signal<M, bool>,
}

impl<M: RawMutex> SlotCompletion<M> {
    /// Create an empty completion
    pub const fn new() -> Self {
        Self {
            signal: Signal::new(),
        }
    }

    /// Report the sampled level (interrupt context)
    pub fn complete(&self, level: bool) {
        self.signal.signal(level);
    }

    /// Suspend until the slot completes
    pub async fn wait(&self) -> bool {
        self.signal.wait().await
    }

    /// Drop a stale completion before arming the next slot
    pub fn reset(&self) {
        self.signal.reset();
    }

    /// Check whether a completion is pending
    pub fn is_complete(&self) -> bool {
        self.signal.signaled()
    }
}

impl<M: RawMutex> Default for SlotCompletion<M> {
    fn default() -> Self {
        Self::new()
    }
}
