//! Transaction layer: reset, byte transfers and strong pull-up

use core::future::Future;

use embassy_futures::select::{select, Either};
use embedded_hal_async::delay::DelayNs;
use ferrule_hal::pulse::{PulseTimer, PulseTimerConfig, SlotTiming};
use ferrule_protocol::onewire::{cmd, timing, MAX_TRANSACTION_LEN, ROM_CODE_LEN};
use ferrule_protocol::RomCode;

const RESET_SLOT: SlotTiming = SlotTiming {
    period: timing::RESET_PERIOD,
    sample_offset: timing::RESET_SAMPLE_WIDTH,
};

const DATA_SLOT: SlotTiming = SlotTiming {
    period: timing::SLOT_PERIOD,
    sample_offset: timing::SAMPLE_WIDTH,
};

/// Bus master configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OneWireConfig {
    /// Timing engine setup applied on start
    pub timer: PulseTimerConfig,
    /// Upper bound for one reset, read or write transaction
    ///
    /// `None` waits for the engine indefinitely.
    pub timeout_us: Option<u32>,
}

/// Driver lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BusState {
    Stopped,
    Ready,
    /// Strong pull-up is powering parasite slaves
    PullUpAsserted,
}

/// Strong pull-up request attached to a write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StrongPullup {
    #[default]
    None,
    /// Hold the pull-up for the given number of microseconds, then release
    For(u32),
    /// Keep the pull-up until [`OneWireBus::release_pullup`]
    Hold,
}

/// Errors from bus transactions
///
/// A missing presence pulse on [`OneWireBus::reset`] is not an error; it
/// is reported as `Ok(false)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OneWireError<E> {
    /// Timing engine failure
    Timer(E),
    /// Transaction exceeded [`OneWireConfig::timeout_us`]
    Timeout,
    /// No slave answered the reset preceding a ROM command
    NoPresence,
    /// Received data failed its CRC-8 check
    Crc,
}

/// Per-transaction bookkeeping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Registry {
    /// Presence pulse seen by the last reset
    pub slave_present: bool,
    /// Bit of the current byte, 0..=7
    pub bit: u8,
    /// Set during the last slot of a transaction
    pub final_timeslot: bool,
    /// Bytes left in the transaction
    pub bytes: u16,
}

/// 1-Wire bus master on one timing engine
pub struct OneWireBus<T, D> {
    timer: T,
    delay: D,
    config: Option<OneWireConfig>,
    state: BusState,
    reg: Registry,
}

impl<T: PulseTimer, D: DelayNs> OneWireBus<T, D> {
    /// Create a stopped bus
    pub fn new(timer: T, delay: D) -> Self {
        Self {
            timer,
            delay,
            config: None,
            state: BusState::Stopped,
            reg: Registry::default(),
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> BusState {
        self.state
    }

    /// Configuration attached by [`start`](Self::start)
    pub fn config(&self) -> Option<&OneWireConfig> {
        self.config.as_ref()
    }

    /// Progress of the current or last transaction
    pub fn registry(&self) -> Registry {
        self.reg
    }

    /// Access the timing engine
    pub fn timer(&self) -> &T {
        &self.timer
    }

    /// Mutable access to the timing engine
    pub fn timer_mut(&mut self) -> &mut T {
        &mut self.timer
    }

    /// Access the delay provider
    pub fn delay(&self) -> &D {
        &self.delay
    }

    /// Take the engine and delay back
    pub fn release(self) -> (T, D) {
        (self.timer, self.delay)
    }

    /// Configure the engine and park the bus idle
    ///
    /// # Panics
    ///
    /// If the bus is not stopped.
    pub fn start(&mut self, config: OneWireConfig) {
        assert!(
            self.state == BusState::Stopped,
            "1-Wire bus started twice"
        );
        self.timer.configure(&config.timer);
        self.timer.idle();
        self.config = Some(config);
        self.reg = Registry::default();
        self.state = BusState::Ready;
        debug!("1-Wire bus started");
    }

    /// Release the strong pull-up, idle the engine and detach the config
    pub fn stop(&mut self) {
        if self.state == BusState::PullUpAsserted {
            self.timer.set_strong_pullup(false);
        }
        self.timer.idle();
        self.config = None;
        self.state = BusState::Stopped;
        debug!("1-Wire bus stopped");
    }

    /// Issue a reset pulse and check for presence
    ///
    /// Returns `Ok(false)` when the bus is already low before the pulse
    /// (short circuit or a slave still transmitting), when no slave answers,
    /// or when the bus does not return high after the reset slot.
    pub async fn reset(&mut self) -> Result<bool, OneWireError<T::Error>> {
        self.assert_ready();
        if !self.timer.sample_bus_level() {
            warn!("1-Wire bus low before reset");
            return Ok(false);
        }

        self.reg.slave_present = false;
        let timeout = self.timeout_us();
        let Self {
            timer, delay, reg, ..
        } = self;
        let outcome = with_deadline(delay, timeout, reset_slot(timer, reg)).await;
        self.finish(outcome)?;

        self.delay.delay_us(timing::POST_RESET_DELAY_US).await;
        let released = self.timer.sample_bus_level();
        if !released {
            warn!("1-Wire bus not released after reset");
        }
        trace!("reset: presence={}", self.reg.slave_present);
        Ok(released && self.reg.slave_present)
    }

    /// Read `buf.len()` bytes, each least significant bit first
    ///
    /// # Panics
    ///
    /// If the bus is not ready or `buf` is empty or longer than 65535 bytes.
    pub async fn read_bytes(&mut self, buf: &mut [u8]) -> Result<(), OneWireError<T::Error>> {
        self.assert_ready();
        assert_transaction_len(buf.len());

        self.reg.bytes = buf.len() as u16;
        let timeout = self.timeout_us();
        let Self {
            timer, delay, reg, ..
        } = self;
        let outcome = with_deadline(delay, timeout, read_slots(timer, reg, buf)).await;
        self.finish(outcome)
    }

    /// Write `buf`, each byte least significant bit first
    ///
    /// With a strong pull-up requested the pull-up is asserted right after
    /// the last slot. [`StrongPullup::For`] holds it and returns to ready,
    /// [`StrongPullup::Hold`] leaves the bus in
    /// [`BusState::PullUpAsserted`].
    ///
    /// # Panics
    ///
    /// If the bus is not ready or `buf` is empty or longer than 65535 bytes.
    pub async fn write_bytes(
        &mut self,
        buf: &[u8],
        pullup: StrongPullup,
    ) -> Result<(), OneWireError<T::Error>> {
        self.assert_ready();
        assert_transaction_len(buf.len());

        self.reg.bytes = buf.len() as u16;
        let timeout = self.timeout_us();
        let Self {
            timer, delay, reg, ..
        } = self;
        let outcome = with_deadline(delay, timeout, write_slots(timer, reg, buf)).await;
        self.finish(outcome)?;

        match pullup {
            StrongPullup::None => {}
            StrongPullup::For(us) => {
                self.timer.set_strong_pullup(true);
                self.state = BusState::PullUpAsserted;
                self.delay.delay_us(us).await;
                self.timer.set_strong_pullup(false);
                self.state = BusState::Ready;
            }
            StrongPullup::Hold => {
                self.timer.set_strong_pullup(true);
                self.state = BusState::PullUpAsserted;
            }
        }
        Ok(())
    }

    /// Drop a strong pull-up left by [`StrongPullup::Hold`]
    ///
    /// # Panics
    ///
    /// If no pull-up is asserted.
    pub fn release_pullup(&mut self) {
        assert!(
            self.state == BusState::PullUpAsserted,
            "no strong pull-up to release"
        );
        self.timer.set_strong_pullup(false);
        self.state = BusState::Ready;
    }

    /// Reset and address every slave
    ///
    /// Returns `Ok(false)` if nobody answered the reset.
    pub async fn skip_rom(&mut self) -> Result<bool, OneWireError<T::Error>> {
        if !self.reset().await? {
            return Ok(false);
        }
        self.write_bytes(&[cmd::SKIP_ROM], StrongPullup::None)
            .await?;
        Ok(true)
    }

    /// Reset and address one slave by its ROM code
    ///
    /// Returns `Ok(false)` if nobody answered the reset.
    pub async fn match_rom(&mut self, rom: &RomCode) -> Result<bool, OneWireError<T::Error>> {
        if !self.reset().await? {
            return Ok(false);
        }
        let mut frame = [0u8; 1 + ROM_CODE_LEN];
        frame[0] = cmd::MATCH_ROM;
        frame[1..].copy_from_slice(rom.as_bytes());
        self.write_bytes(&frame, StrongPullup::None).await?;
        Ok(true)
    }

    /// Read the ROM code of the only slave on the bus
    ///
    /// Returns `Ok(None)` if nobody answered the reset. With more than one
    /// slave present the codes collide and the CRC check fails.
    pub async fn read_rom(&mut self) -> Result<Option<RomCode>, OneWireError<T::Error>> {
        if !self.reset().await? {
            return Ok(None);
        }
        self.write_bytes(&[cmd::READ_ROM], StrongPullup::None)
            .await?;

        let mut rom = RomCode::default();
        self.read_bytes(&mut rom.0).await?;
        if !rom.is_valid() {
            warn!("READ ROM: CRC mismatch");
            return Err(OneWireError::Crc);
        }
        Ok(Some(rom))
    }

    /// One read slot
    pub(super) async fn read_bit(&mut self) -> Result<bool, OneWireError<T::Error>> {
        self.slot(timing::ONE_WIDTH).await
    }

    /// One write slot
    pub(super) async fn write_bit(&mut self, bit: bool) -> Result<(), OneWireError<T::Error>> {
        let width = if bit {
            timing::ONE_WIDTH
        } else {
            timing::ZERO_WIDTH
        };
        self.slot(width).await.map(|_| ())
    }

    async fn slot(&mut self, width: u16) -> Result<bool, OneWireError<T::Error>> {
        self.assert_ready();
        let timeout = self.timeout_us();
        let Self { timer, delay, .. } = self;
        let body = async {
            timer.activate(DATA_SLOT);
            timer.emit_master_pulse(width).await
        };
        let outcome = with_deadline(delay, timeout, body).await;
        self.finish(outcome)
    }

    /// Park the engine after a transaction, whatever its outcome
    fn finish<R>(
        &mut self,
        outcome: Result<R, OneWireError<T::Error>>,
    ) -> Result<R, OneWireError<T::Error>> {
        self.timer.idle();
        self.reg.final_timeslot = false;
        if matches!(outcome, Err(OneWireError::Timeout)) {
            warn!("1-Wire transaction timed out");
        }
        outcome
    }

    fn timeout_us(&self) -> Option<u32> {
        self.config.and_then(|config| config.timeout_us)
    }

    fn assert_ready(&self) {
        assert!(
            self.state == BusState::Ready,
            "1-Wire bus not ready: {:?}",
            self.state
        );
    }
}

fn assert_transaction_len(len: usize) {
    assert!(
        (1..=MAX_TRANSACTION_LEN).contains(&len),
        "1-Wire transaction length {} out of range",
        len
    );
}

/// Race `body` against the transaction deadline
async fn with_deadline<D, F, R, E>(
    delay: &mut D,
    timeout_us: Option<u32>,
    body: F,
) -> Result<R, OneWireError<E>>
where
    D: DelayNs,
    F: Future<Output = Result<R, E>>,
{
    match timeout_us {
        None => body.await.map_err(OneWireError::Timer),
        Some(us) => match select(body, delay.delay_us(us)).await {
            Either::First(result) => result.map_err(OneWireError::Timer),
            Either::Second(()) => Err(OneWireError::Timeout),
        },
    }
}

async fn reset_slot<T: PulseTimer>(timer: &mut T, reg: &mut Registry) -> Result<(), T::Error> {
    timer.activate(RESET_SLOT);
    let level = timer.emit_master_pulse(timing::RESET_LOW_WIDTH).await?;
    reg.slave_present = !level;
    Ok(())
}

async fn read_slots<T: PulseTimer>(
    timer: &mut T,
    reg: &mut Registry,
    buf: &mut [u8],
) -> Result<(), T::Error> {
    buf.fill(0);
    timer.activate(DATA_SLOT);
    for byte in buf.iter_mut() {
        for bit in 0..8 {
            reg.bit = bit;
            reg.final_timeslot = reg.bytes == 1 && bit == 7;
            if timer.emit_master_pulse(timing::ONE_WIDTH).await? {
                *byte |= 1 << bit;
            }
        }
        reg.bit = 0;
        reg.bytes -= 1;
    }
    Ok(())
}

async fn write_slots<T: PulseTimer>(
    timer: &mut T,
    reg: &mut Registry,
    buf: &[u8],
) -> Result<(), T::Error> {
    timer.activate(DATA_SLOT);
    for &byte in buf {
        for bit in 0..8 {
            reg.bit = bit;
            reg.final_timeslot = reg.bytes == 1 && bit == 7;
            let width = if byte & (1 << bit) != 0 {
                timing::ONE_WIDTH
            } else {
                timing::ZERO_WIDTH
            };
            timer.emit_master_pulse(width).await?;
        }
        reg.bit = 0;
        reg.bytes -= 1;
    }
    Ok(())
}
