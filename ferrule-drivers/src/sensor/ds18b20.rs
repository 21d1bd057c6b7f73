//! DS18B20 digital thermometer
//!
//! Conversions run under a strong pull-up for the full conversion time, so
//! the same sequence works for externally powered and parasite-powered
//! sensors.
//!
//! # Scratchpad
//!
//! | byte | content                       |
//! |------|-------------------------------|
//! | 0-1  | temperature, 1/16 C, LE       |
//! | 2    | TH alarm threshold            |
//! | 3    | TL alarm threshold            |
//! | 4    | configuration (resolution)    |
//! | 5-7  | reserved                      |
//! | 8    | CRC-8 of bytes 0-7            |

use embedded_hal_async::delay::DelayNs;
use ferrule_hal::pulse::PulseTimer;
use ferrule_protocol::onewire::cmd;
use ferrule_protocol::rom::FAMILY_DS18B20;
use ferrule_protocol::{crc8, RomCode};

use crate::onewire::{OneWireBus, OneWireError, StrongPullup};

/// Conversion resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Resolution {
    /// 0.5 C steps
    Bits9,
    /// 0.25 C steps
    Bits10,
    /// 0.125 C steps
    Bits11,
    /// 0.0625 C steps (power-on default)
    #[default]
    Bits12,
}

impl Resolution {
    /// Configuration register value
    pub fn config_byte(self) -> u8 {
        match self {
            Resolution::Bits9 => 0x1F,
            Resolution::Bits10 => 0x3F,
            Resolution::Bits11 => 0x5F,
            Resolution::Bits12 => 0x7F,
        }
    }

    /// Decode the configuration register
    pub fn from_config_byte(byte: u8) -> Self {
        match (byte >> 5) & 0x03 {
            0 => Resolution::Bits9,
            1 => Resolution::Bits10,
            2 => Resolution::Bits11,
            _ => Resolution::Bits12,
        }
    }

    /// Worst-case conversion time in microseconds
    pub fn conversion_time_us(self) -> u32 {
        match self {
            Resolution::Bits9 => 93_750,
            Resolution::Bits10 => 187_500,
            Resolution::Bits11 => 375_000,
            Resolution::Bits12 => 750_000,
        }
    }

    /// Mask of temperature bits that are defined at this resolution
    fn mask(self) -> i16 {
        match self {
            Resolution::Bits9 => !0x07,
            Resolution::Bits10 => !0x03,
            Resolution::Bits11 => !0x01,
            Resolution::Bits12 => !0x00,
        }
    }
}

/// CRC-checked scratchpad contents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Scratchpad([u8; 9]);

impl Scratchpad {
    /// Validate raw scratchpad bytes
    pub fn parse(raw: [u8; 9]) -> Option<Self> {
        (crc8(&raw[..8]) == raw[8]).then_some(Self(raw))
    }

    /// Temperature in 1/16 C, undefined low bits cleared
    pub fn raw_temperature(&self) -> i16 {
        i16::from_le_bytes([self.0[0], self.0[1]]) & self.resolution().mask()
    }

    /// Temperature in tenths of a degree Celsius
    pub fn temperature_x10(&self) -> i16 {
        (self.raw_temperature() as i32 * 10 / 16) as i16
    }

    /// High alarm threshold in C
    pub fn alarm_high(&self) -> i8 {
        self.0[2] as i8
    }

    /// Low alarm threshold in C
    pub fn alarm_low(&self) -> i8 {
        self.0[3] as i8
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::from_config_byte(self.0[4])
    }

    pub fn as_bytes(&self) -> &[u8; 9] {
        &self.0
    }
}

/// One DS18B20 on a bus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Ds18b20 {
    /// `None` addresses the only device with SKIP ROM
    rom: Option<RomCode>,
    resolution: Resolution,
}

impl Ds18b20 {
    /// Sensor addressed by ROM code
    ///
    /// Returns `None` if the family code is not a DS18B20.
    pub fn new(rom: RomCode) -> Option<Self> {
        if rom.family() != FAMILY_DS18B20 {
            return None;
        }
        Some(Self {
            rom: Some(rom),
            resolution: Resolution::default(),
        })
    }

    /// The only sensor on a single-drop bus
    pub fn single() -> Self {
        Self {
            rom: None,
            resolution: Resolution::default(),
        }
    }

    pub fn rom(&self) -> Option<RomCode> {
        self.rom
    }

    /// Resolution assumed for conversion timing
    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// Start a conversion and power it until it completes
    pub async fn convert<T: PulseTimer, D: DelayNs>(
        &self,
        bus: &mut OneWireBus<T, D>,
    ) -> Result<(), OneWireError<T::Error>> {
        self.select(bus).await?;
        let pullup = StrongPullup::For(self.resolution.conversion_time_us());
        bus.write_bytes(&[cmd::CONVERT_TEMP], pullup).await
    }

    /// Read and CRC-check the scratchpad
    pub async fn read_scratchpad<T: PulseTimer, D: DelayNs>(
        &self,
        bus: &mut OneWireBus<T, D>,
    ) -> Result<Scratchpad, OneWireError<T::Error>> {
        self.select(bus).await?;
        bus.write_bytes(&[cmd::READ_SCRATCHPAD], StrongPullup::None)
            .await?;
        let mut raw = [0u8; 9];
        bus.read_bytes(&mut raw).await?;
        Scratchpad::parse(raw).ok_or_else(|| {
            warn!("DS18B20 scratchpad CRC mismatch");
            OneWireError::Crc
        })
    }

    /// Convert and read back the temperature in tenths of a degree
    pub async fn read_temperature<T: PulseTimer, D: DelayNs>(
        &self,
        bus: &mut OneWireBus<T, D>,
    ) -> Result<i16, OneWireError<T::Error>> {
        self.convert(bus).await?;
        let scratchpad = self.read_scratchpad(bus).await?;
        trace!("DS18B20 raw {}", scratchpad.raw_temperature());
        Ok(scratchpad.temperature_x10())
    }

    /// Write alarm thresholds and resolution to the scratchpad
    pub async fn configure<T: PulseTimer, D: DelayNs>(
        &mut self,
        bus: &mut OneWireBus<T, D>,
        alarm_high: i8,
        alarm_low: i8,
        resolution: Resolution,
    ) -> Result<(), OneWireError<T::Error>> {
        self.select(bus).await?;
        let frame = [
            cmd::WRITE_SCRATCHPAD,
            alarm_high as u8,
            alarm_low as u8,
            resolution.config_byte(),
        ];
        bus.write_bytes(&frame, StrongPullup::None).await?;
        self.resolution = resolution;
        Ok(())
    }

    async fn select<T: PulseTimer, D: DelayNs>(
        &self,
        bus: &mut OneWireBus<T, D>,
    ) -> Result<(), OneWireError<T::Error>> {
        let present = match &self.rom {
            Some(rom) => bus.match_rom(rom).await?,
            None => bus.skip_rom().await?,
        };
        if present {
            Ok(())
        } else {
            Err(OneWireError::NoPresence)
        }
    }
}
