//! Simulated 1-Wire segment for host tests
//!
//! [`SimBus`] implements [`PulseTimer`] and answers every time slot the way
//! a set of real slaves would: presence on reset, wired-AND responses during
//! Search ROM, ROM and scratchpad transmission. Faults can be injected to
//! exercise the error paths of the bus master.

use core::mem;

use embedded_hal_async::delay::DelayNs;
use ferrule_hal::pulse::{PulseTimer, PulseTimerConfig, SlotTiming};
use ferrule_protocol::onewire::{cmd, timing, ROM_CODE_BITS};
use ferrule_protocol::{crc8, RomCode};

/// Engine error raised by fault injection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SimFault;

/// One simulated slave
#[derive(Debug, Clone)]
pub(crate) struct SimDevice {
    pub rom: RomCode,
    pub scratchpad: [u8; 9],
    pub parasite: bool,
    selected: bool,
}

impl SimDevice {
    /// DS18B20 at power-up defaults reading +25.0625 C
    pub fn new(rom: RomCode) -> Self {
        Self {
            rom,
            scratchpad: [0x91, 0x01, 0x4B, 0x46, 0x7F, 0xFF, 0x0F, 0x10, 0x25],
            parasite: false,
            selected: false,
        }
    }

    /// Set the raw temperature register, keeping the CRC consistent
    pub fn with_raw_temperature(mut self, raw: i16) -> Self {
        self.scratchpad[..2].copy_from_slice(&raw.to_le_bytes());
        self.scratchpad[8] = crc8(&self.scratchpad[..8]);
        self
    }
}

/// What the slaves expect from the next time slot
#[derive(Debug)]
enum Mode {
    Idle,
    RomCommand { value: u8, bits: u8 },
    Search { bit: usize, step: u8 },
    Match { rom: RomCode, bits: usize },
    Function { value: u8, bits: u8 },
    Transmit { data: Vec<u8>, bit: usize },
    Receive { data: Vec<u8>, bits: usize },
}

pub(crate) struct SimBus {
    pub devices: Vec<SimDevice>,
    pub config: Option<PulseTimerConfig>,
    pub active: Option<SlotTiming>,
    /// Line held low outside of any slot
    pub line_low: bool,
    /// Hold the line low after the next reset
    pub stuck_after_reset: bool,
    /// Never complete a slot
    pub stalled: bool,
    /// Answer (1, 1) at `(pass, bit)`, passes counted from 1
    pub collision_at: Option<(usize, usize)>,
    /// Slaves stop answering presence after this many resets
    pub vanish_after_resets: Option<usize>,
    /// Fail the n-th slot (1-based) with [`SimFault`]
    pub fail_at_slot: Option<usize>,
    pub slots: usize,
    pub resets: usize,
    /// SEARCH ROM commands seen
    pub search_passes: usize,
    /// ROM and function command bytes seen, in order
    pub commands: Vec<u8>,
    pub pullup_log: Vec<bool>,
    pub conversions: usize,
    mode: Mode,
}

impl SimBus {
    pub fn new(devices: Vec<SimDevice>) -> Self {
        Self {
            devices,
            config: None,
            active: None,
            line_low: false,
            stuck_after_reset: false,
            stalled: false,
            collision_at: None,
            vanish_after_resets: None,
            fail_at_slot: None,
            slots: 0,
            resets: 0,
            search_passes: 0,
            commands: Vec::new(),
            pullup_log: Vec::new(),
            conversions: 0,
            mode: Mode::Idle,
        }
    }

    pub fn with_roms(roms: &[RomCode]) -> Self {
        Self::new(roms.iter().copied().map(SimDevice::new).collect())
    }

    fn reset_slot(&mut self) -> bool {
        self.resets += 1;
        for device in &mut self.devices {
            device.selected = true;
        }
        if self.stuck_after_reset {
            self.line_low = true;
        }
        let vanished = self.vanish_after_resets.is_some_and(|n| self.resets > n);
        if self.devices.is_empty() || vanished {
            self.mode = Mode::Idle;
            true
        } else {
            self.mode = Mode::RomCommand { value: 0, bits: 0 };
            false
        }
    }

    fn selected(&self) -> impl Iterator<Item = &SimDevice> {
        self.devices.iter().filter(|d| d.selected)
    }

    /// Bytes of every selected slave ANDed together, as on the wire
    fn wired_and(&self, bytes: impl Fn(&SimDevice) -> Vec<u8>, len: usize) -> Vec<u8> {
        self.selected().fold(vec![0xFF; len], |acc, device| {
            acc.iter().zip(bytes(device)).map(|(a, b)| a & b).collect()
        })
    }

    fn on_rom_command(&mut self, value: u8) -> Mode {
        self.commands.push(value);
        match value {
            cmd::SEARCH_ROM | cmd::ALARM_SEARCH => {
                self.search_passes += 1;
                Mode::Search { bit: 0, step: 0 }
            }
            cmd::READ_ROM => Mode::Transmit {
                data: self.wired_and(|d| d.rom.0.to_vec(), 8),
                bit: 0,
            },
            cmd::MATCH_ROM => Mode::Match {
                rom: RomCode::default(),
                bits: 0,
            },
            cmd::SKIP_ROM => Mode::Function { value: 0, bits: 0 },
            _ => Mode::Idle,
        }
    }

    fn on_function_command(&mut self, value: u8) -> Mode {
        self.commands.push(value);
        match value {
            cmd::READ_SCRATCHPAD => Mode::Transmit {
                data: self.wired_and(|d| d.scratchpad.to_vec(), 9),
                bit: 0,
            },
            cmd::WRITE_SCRATCHPAD => Mode::Receive {
                data: vec![0; 3],
                bits: 0,
            },
            cmd::READ_POWER_SUPPLY => {
                let parasite = self.selected().any(|d| d.parasite);
                Mode::Transmit {
                    data: vec![if parasite { 0x00 } else { 0xFF }],
                    bit: 0,
                }
            }
            cmd::CONVERT_TEMP => {
                self.conversions += 1;
                Mode::Idle
            }
            _ => Mode::Idle,
        }
    }

    /// Advance the slave state machine by one data slot
    ///
    /// Returns the level the slaves leave on the bus (`true` = released).
    fn data_slot(&mut self, master_bit: bool) -> bool {
        let (level, next) = match mem::replace(&mut self.mode, Mode::Idle) {
            Mode::Idle => (true, Mode::Idle),
            Mode::RomCommand { mut value, bits } => {
                value |= (master_bit as u8) << bits;
                if bits == 7 {
                    (true, self.on_rom_command(value))
                } else {
                    (true, Mode::RomCommand { value, bits: bits + 1 })
                }
            }
            Mode::Search { bit, step } => {
                let collision = self.collision_at == Some((self.search_passes, bit));
                match step {
                    0 => {
                        let level = collision || !self.selected().any(|d| !d.rom.bit(bit));
                        (level, Mode::Search { bit, step: 1 })
                    }
                    1 => {
                        let level = collision || !self.selected().any(|d| d.rom.bit(bit));
                        (level, Mode::Search { bit, step: 2 })
                    }
                    _ => {
                        for device in &mut self.devices {
                            if device.rom.bit(bit) != master_bit {
                                device.selected = false;
                            }
                        }
                        if bit + 1 == ROM_CODE_BITS {
                            (true, Mode::Function { value: 0, bits: 0 })
                        } else {
                            (true, Mode::Search { bit: bit + 1, step: 0 })
                        }
                    }
                }
            }
            Mode::Match { mut rom, bits } => {
                rom.set_bit(bits, master_bit);
                if bits + 1 == ROM_CODE_BITS {
                    for device in &mut self.devices {
                        device.selected &= device.rom == rom;
                    }
                    (true, Mode::Function { value: 0, bits: 0 })
                } else {
                    (true, Mode::Match { rom, bits: bits + 1 })
                }
            }
            Mode::Function { mut value, bits } => {
                value |= (master_bit as u8) << bits;
                if bits == 7 {
                    (true, self.on_function_command(value))
                } else {
                    (true, Mode::Function { value, bits: bits + 1 })
                }
            }
            Mode::Transmit { data, bit } => {
                let level = data
                    .get(bit / 8)
                    .map_or(true, |byte| byte & (1 << (bit % 8)) != 0);
                (level, Mode::Transmit { data, bit: bit + 1 })
            }
            Mode::Receive { mut data, bits } => {
                if master_bit {
                    data[bits / 8] |= 1 << (bits % 8);
                }
                if bits + 1 == data.len() * 8 {
                    for device in self.devices.iter_mut().filter(|d| d.selected) {
                        device.scratchpad[2..5].copy_from_slice(&data);
                        device.scratchpad[8] = crc8(&device.scratchpad[..8]);
                    }
                    (true, Mode::Idle)
                } else {
                    (true, Mode::Receive { data, bits: bits + 1 })
                }
            }
        };
        self.mode = next;
        level
    }
}

impl PulseTimer for SimBus {
    type Error = SimFault;

    fn configure(&mut self, config: &PulseTimerConfig) {
        self.config = Some(*config);
    }

    fn activate(&mut self, timing: SlotTiming) {
        self.active = Some(timing);
    }

    async fn emit_master_pulse(&mut self, width: u16) -> Result<bool, SimFault> {
        assert!(self.active.is_some(), "slot emitted on an idle timer");
        if self.stalled {
            core::future::pending::<()>().await;
        }

        self.slots += 1;
        if self.fail_at_slot == Some(self.slots) {
            return Err(SimFault);
        }

        if width >= timing::RESET_LOW_WIDTH {
            return Ok(self.reset_slot());
        }
        let master_bit = width < timing::SAMPLE_WIDTH;
        let level = self.data_slot(master_bit);
        Ok(master_bit && level)
    }

    fn idle(&mut self) {
        self.active = None;
    }

    fn sample_bus_level(&mut self) -> bool {
        !self.line_low
    }

    fn set_strong_pullup(&mut self, asserted: bool) {
        self.pullup_log.push(asserted);
    }
}

/// Delay that completes immediately and accounts the requested time
#[derive(Debug, Default)]
pub(crate) struct SimDelay {
    pub elapsed_ns: u64,
}

impl SimDelay {
    pub fn elapsed_us(&self) -> u64 {
        self.elapsed_ns / 1_000
    }
}

impl DelayNs for SimDelay {
    async fn delay_ns(&mut self, ns: u32) {
        self.elapsed_ns += ns as u64;
    }
}
