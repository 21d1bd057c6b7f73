//! 1-Wire protocol constants
//!
//! Command bytes and time-slot geometry for standard-speed 1-Wire. All
//! durations are in microseconds, which equals timer ticks at the 1 MHz
//! engine clock the bus master runs at.

/// Longest byte transaction a single read or write may carry
pub const MAX_TRANSACTION_LEN: usize = u16::MAX as usize;

/// Length of a ROM code in bytes
pub const ROM_CODE_LEN: usize = 8;

/// Number of bits walked by one Search ROM pass
pub const ROM_CODE_BITS: usize = ROM_CODE_LEN * 8;

/// ROM and function command bytes
pub mod cmd {
    /// Read the ROM code of the only slave on the bus
    pub const READ_ROM: u8 = 0x33;
    /// Enumerate slaves by walking the ROM tree
    pub const SEARCH_ROM: u8 = 0xF0;
    /// Address a single slave by its ROM code
    pub const MATCH_ROM: u8 = 0x55;
    /// Address every slave at once
    pub const SKIP_ROM: u8 = 0xCC;
    /// Search restricted to slaves with an alarm flag set
    pub const ALARM_SEARCH: u8 = 0xEC;

    /// Start a temperature conversion (DS18x20)
    pub const CONVERT_TEMP: u8 = 0x44;
    /// Read the scratchpad
    pub const READ_SCRATCHPAD: u8 = 0xBE;
    /// Write TH, TL and configuration
    pub const WRITE_SCRATCHPAD: u8 = 0x4E;
    /// Copy scratchpad to EEPROM
    pub const COPY_SCRATCHPAD: u8 = 0x48;
    /// Reload scratchpad from EEPROM
    pub const RECALL_EEPROM: u8 = 0xB8;
    /// Ask parasite-powered slaves to pull the bus low
    pub const READ_POWER_SUPPLY: u8 = 0xB4;
}

/// Standard-speed time-slot widths
pub mod timing {
    /// Master low time when writing a 0
    pub const ZERO_WIDTH: u16 = 60;
    /// Master low time when writing a 1 or starting a read slot
    pub const ONE_WIDTH: u16 = 6;
    /// Offset into a data slot where the bus is sampled
    pub const SAMPLE_WIDTH: u16 = 15;
    /// Minimum recovery time between two slots
    pub const RECOVERY_WIDTH: u16 = 10;
    /// Reset pulse low time
    pub const RESET_LOW_WIDTH: u16 = 480;
    /// Offset into the reset slot where presence is sampled
    pub const RESET_SAMPLE_WIDTH: u16 = 550;
    /// Full reset slot length
    pub const RESET_TOTAL_WIDTH: u16 = 960;

    /// Data slot period
    pub const SLOT_PERIOD: u16 = ZERO_WIDTH + RECOVERY_WIDTH;
    /// Reset slot period
    pub const RESET_PERIOD: u16 = RESET_LOW_WIDTH + RESET_SAMPLE_WIDTH;

    /// Settling time after a reset before the next transaction
    pub const POST_RESET_DELAY_US: u32 = 500;
}
