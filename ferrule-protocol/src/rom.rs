//! 64-bit 1-Wire ROM codes
//!
//! Byte 0 is the family code, bytes 1..7 the serial number and byte 7 the
//! CRC-8 of the first seven bytes. Bytes go on the wire in index order, each
//! least significant bit first.

use core::fmt;

use crate::crc::crc8;
use crate::onewire::ROM_CODE_LEN;

/// Family code of the DS18B20 temperature sensor
pub const FAMILY_DS18B20: u8 = 0x28;
/// Family code of the DS18S20 temperature sensor
pub const FAMILY_DS18S20: u8 = 0x10;
/// Family code of the DS2401 silicon serial number
pub const FAMILY_DS2401: u8 = 0x01;

/// Unique slave identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RomCode(pub [u8; ROM_CODE_LEN]);

impl RomCode {
    /// Build a ROM code from family and 48-bit serial, filling in the CRC
    pub fn new(family: u8, serial: [u8; 6]) -> Self {
        let mut bytes = [0u8; ROM_CODE_LEN];
        bytes[0] = family;
        bytes[1..7].copy_from_slice(&serial);
        bytes[7] = crc8(&bytes[..7]);
        Self(bytes)
    }

    /// Family code
    pub fn family(&self) -> u8 {
        self.0[0]
    }

    /// 48-bit serial number, least significant byte first
    pub fn serial(&self) -> [u8; 6] {
        let mut serial = [0u8; 6];
        serial.copy_from_slice(&self.0[1..7]);
        serial
    }

    /// Stored CRC byte
    pub fn crc(&self) -> u8 {
        self.0[7]
    }

    /// Check the stored CRC against the first seven bytes
    pub fn is_valid(&self) -> bool {
        crc8(&self.0[..7]) == self.0[7]
    }

    /// Bit `n` in transmission order (0 = family LSB)
    pub fn bit(&self, n: usize) -> bool {
        self.0[n / 8] & (1 << (n % 8)) != 0
    }

    /// Set or clear bit `n` in transmission order
    pub fn set_bit(&mut self, n: usize, value: bool) {
        let mask = 1 << (n % 8);
        if value {
            self.0[n / 8] |= mask;
        } else {
            self.0[n / 8] &= !mask;
        }
    }

    /// Key under which Search ROM discovers codes in ascending order
    ///
    /// The search takes the 0 branch first at every discrepancy, so codes
    /// come out sorted by their bits read in transmission order.
    pub fn search_order(&self) -> u64 {
        u64::from_le_bytes(self.0).reverse_bits()
    }

    /// Raw bytes in transmission order
    pub fn as_bytes(&self) -> &[u8; ROM_CODE_LEN] {
        &self.0
    }
}

impl From<[u8; ROM_CODE_LEN]> for RomCode {
    fn from(bytes: [u8; ROM_CODE_LEN]) -> Self {
        Self(bytes)
    }
}

impl From<RomCode> for [u8; ROM_CODE_LEN] {
    fn from(rom: RomCode) -> Self {
        rom.0
    }
}

impl fmt::Display for RomCode {
    /// Family first, then serial most significant byte first, then CRC
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X}-", self.0[0])?;
        for byte in self.0[1..7].iter().rev() {
            write!(f, "{:02X}", byte)?;
        }
        write!(f, "-{:02X}", self.0[7])
    }
}
