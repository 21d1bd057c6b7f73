//! SCSI sense data
//!
//! The target keeps one [`SenseCode`] describing the outcome of the last
//! command and returns it, wrapped in fixed-format [`SenseData`], on
//! REQUEST SENSE.

/// Sense keys (SPC-4 table 48)
pub mod key {
    pub const NO_SENSE: u8 = 0x00;
    pub const RECOVERED_ERROR: u8 = 0x01;
    pub const NOT_READY: u8 = 0x02;
    pub const MEDIUM_ERROR: u8 = 0x03;
    pub const HARDWARE_ERROR: u8 = 0x04;
    pub const ILLEGAL_REQUEST: u8 = 0x05;
    pub const UNIT_ATTENTION: u8 = 0x06;
    pub const DATA_PROTECT: u8 = 0x07;
    pub const BLANK_CHECK: u8 = 0x08;
    pub const VENDOR_SPECIFIC: u8 = 0x09;
    pub const COPY_ABORTED: u8 = 0x0A;
    pub const ABORTED_COMMAND: u8 = 0x0B;
    pub const VOLUME_OVERFLOW: u8 = 0x0D;
    pub const MISCOMPARE: u8 = 0x0E;
}

/// Additional sense codes
pub mod asc {
    pub const NO_ADDITIONAL_INFORMATION: u8 = 0x00;
    pub const WRITE_FAULT: u8 = 0x03;
    pub const LOGICAL_UNIT_NOT_READY: u8 = 0x04;
    pub const UNRECOVERED_READ_ERROR: u8 = 0x11;
    pub const INVALID_COMMAND_OPERATION_CODE: u8 = 0x20;
    pub const LBA_OUT_OF_RANGE: u8 = 0x21;
    pub const INVALID_FIELD_IN_CDB: u8 = 0x24;
    pub const WRITE_PROTECTED: u8 = 0x27;
    pub const NOT_READY_TO_READY_CHANGE: u8 = 0x28;
    pub const FORMAT_ERROR: u8 = 0x31;
    pub const MEDIUM_NOT_PRESENT: u8 = 0x3A;
}

/// Additional sense code qualifiers
pub mod ascq {
    pub const NONE: u8 = 0x00;
    pub const BECOMING_READY: u8 = 0x01;
    pub const INITIALIZING_COMMAND_REQUIRED: u8 = 0x02;
    pub const OPERATION_IN_PROGRESS: u8 = 0x07;
}

/// Sense key with additional sense code and qualifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SenseCode {
    pub key: u8,
    pub asc: u8,
    pub ascq: u8,
}

impl SenseCode {
    pub const fn new(key: u8, asc: u8, ascq: u8) -> Self {
        Self { key, asc, ascq }
    }

    /// Command completed without error
    pub const GOOD: Self = Self::new(key::NO_SENSE, asc::NO_ADDITIONAL_INFORMATION, ascq::NONE);

    pub const INVALID_COMMAND: Self = Self::new(
        key::ILLEGAL_REQUEST,
        asc::INVALID_COMMAND_OPERATION_CODE,
        ascq::NONE,
    );
    pub const INVALID_FIELD_IN_CDB: Self =
        Self::new(key::ILLEGAL_REQUEST, asc::INVALID_FIELD_IN_CDB, ascq::NONE);
    pub const LBA_OUT_OF_RANGE: Self =
        Self::new(key::ILLEGAL_REQUEST, asc::LBA_OUT_OF_RANGE, ascq::NONE);

    pub const MEDIUM_NOT_PRESENT: Self =
        Self::new(key::NOT_READY, asc::MEDIUM_NOT_PRESENT, ascq::NONE);
    pub const LOGICAL_UNIT_NOT_READY: Self =
        Self::new(key::NOT_READY, asc::LOGICAL_UNIT_NOT_READY, ascq::NONE);

    pub const WRITE_PROTECTED: Self =
        Self::new(key::DATA_PROTECT, asc::WRITE_PROTECTED, ascq::NONE);
    pub const UNRECOVERED_READ_ERROR: Self =
        Self::new(key::MEDIUM_ERROR, asc::UNRECOVERED_READ_ERROR, ascq::NONE);
    pub const WRITE_FAULT: Self = Self::new(key::MEDIUM_ERROR, asc::WRITE_FAULT, ascq::NONE);

    /// Check whether this code reports success
    pub fn is_good(&self) -> bool {
        self.key == key::NO_SENSE
    }
}

/// Fixed-format sense data, current errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SenseData {
    pub code: SenseCode,
}

impl SenseData {
    /// Encoded length
    pub const LEN: usize = 18;

    /// Response code for current errors in fixed format
    pub const RESPONSE_CODE: u8 = 0x70;

    /// Additional sense length (bytes following byte 7)
    const ADDITIONAL_LEN: u8 = (Self::LEN - 8) as u8;

    pub fn new(code: SenseCode) -> Self {
        Self { code }
    }

    /// Serialize into wire format
    pub fn to_bytes(&self) -> [u8; Self::LEN] {
        let mut buf = [0u8; Self::LEN];
        buf[0] = Self::RESPONSE_CODE;
        buf[2] = self.code.key & 0x0F;
        buf[7] = Self::ADDITIONAL_LEN;
        buf[12] = self.code.asc;
        buf[13] = self.code.ascq;
        buf
    }

    /// Parse fixed-format sense data
    ///
    /// Returns `None` if the buffer is short or not fixed format.
    pub fn parse(buf: &[u8]) -> Option<Self> {
        if buf.len() < 14 || buf[0] & 0x7E != Self::RESPONSE_CODE {
            return None;
        }
        Some(Self {
            code: SenseCode::new(buf[2] & 0x0F, buf[12], buf[13]),
        })
    }
}
