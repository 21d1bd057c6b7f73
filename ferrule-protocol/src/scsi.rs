//! SCSI command set subset for a direct-access block target
//!
//! Operation codes, the fixed-layout response records the target sends
//! back, and decoding of the CDB fields the handlers need. Multi-byte
//! fields are big-endian on the wire.

use heapless::Vec;

/// Command descriptor block as handed to the target, zero padded
pub type Cdb = [u8; CDB_LEN];

/// Longest CDB the target accepts
pub const CDB_LEN: usize = 16;

/// Operation codes
pub mod opcode {
    pub const TEST_UNIT_READY: u8 = 0x00;
    pub const REQUEST_SENSE: u8 = 0x03;
    pub const INQUIRY: u8 = 0x12;
    pub const MODE_SENSE_6: u8 = 0x1A;
    pub const START_STOP_UNIT: u8 = 0x1B;
    pub const SEND_DIAGNOSTIC: u8 = 0x1D;
    pub const PREVENT_ALLOW_MEDIUM_REMOVAL: u8 = 0x1E;
    pub const READ_FORMAT_CAPACITIES: u8 = 0x23;
    pub const READ_CAPACITY_10: u8 = 0x25;
    pub const READ_10: u8 = 0x28;
    pub const WRITE_10: u8 = 0x2A;
    pub const VERIFY_10: u8 = 0x2F;
}

/// Vital product data page codes
pub mod vpd {
    pub const SUPPORTED_PAGES: u8 = 0x00;
    pub const UNIT_SERIAL_NUMBER: u8 = 0x80;
}

/// Supported VPD pages response
pub const SUPPORTED_VPD_PAGES: [u8; 6] = [
    0x00, // direct access block device
    vpd::SUPPORTED_PAGES,
    0x00,
    0x02, // page length
    vpd::SUPPORTED_PAGES,
    vpd::UNIT_SERIAL_NUMBER,
];

fn be16(buf: &[u8]) -> u16 {
    u16::from_be_bytes([buf[0], buf[1]])
}

fn be32(buf: &[u8]) -> u32 {
    u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]])
}

/// Copy `src` into `dst`, padding with ASCII spaces and truncating
fn pad_ascii(dst: &mut [u8], src: &str) {
    dst.fill(b' ');
    let n = src.len().min(dst.len());
    dst[..n].copy_from_slice(&src.as_bytes()[..n]);
}

// ============================================================================
// INQUIRY
// ============================================================================

/// Standard inquiry response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InquiryData {
    /// Peripheral qualifier and device type (0x00 = direct access)
    pub peripheral: u8,
    /// Removable medium bit
    pub removable: bool,
    /// Claimed standard version (0x04 = SPC-2)
    pub version: u8,
    /// Response data format (always 2)
    pub response_format: u8,
    pub vendor: [u8; 8],
    pub product: [u8; 16],
    pub revision: [u8; 4],
}

impl InquiryData {
    /// Encoded length
    pub const LEN: usize = 36;

    /// Removable direct-access device with space-padded identification
    pub fn new(vendor: &str, product: &str, revision: &str) -> Self {
        let mut data = Self {
            peripheral: 0x00,
            removable: true,
            version: 0x04,
            response_format: 0x02,
            vendor: [b' '; 8],
            product: [b' '; 16],
            revision: [b' '; 4],
        };
        pad_ascii(&mut data.vendor, vendor);
        pad_ascii(&mut data.product, product);
        pad_ascii(&mut data.revision, revision);
        data
    }

    /// Serialize into wire format
    pub fn to_bytes(&self) -> [u8; Self::LEN] {
        let mut buf = [0u8; Self::LEN];
        buf[0] = self.peripheral;
        buf[1] = if self.removable { 0x80 } else { 0x00 };
        buf[2] = self.version;
        buf[3] = self.response_format;
        buf[4] = (Self::LEN - 5) as u8;
        buf[8..16].copy_from_slice(&self.vendor);
        buf[16..32].copy_from_slice(&self.product);
        buf[32..36].copy_from_slice(&self.revision);
        buf
    }
}

impl Default for InquiryData {
    fn default() -> Self {
        Self::new("Ferrule", "Mass Storage", "0.1")
    }
}

/// Longest serial number the unit serial page carries
pub const MAX_SERIAL_LEN: usize = 32;

/// Unit serial number VPD page (0x80)
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct UnitSerialNumber {
    serial: Vec<u8, MAX_SERIAL_LEN>,
}

impl UnitSerialNumber {
    /// Build from an ASCII serial, truncated to [`MAX_SERIAL_LEN`]
    pub fn new(serial: &str) -> Self {
        let n = serial.len().min(MAX_SERIAL_LEN);
        let mut bytes = Vec::new();
        // Cannot fail, n is within capacity
        let _ = bytes.extend_from_slice(&serial.as_bytes()[..n]);
        Self { serial: bytes }
    }

    /// Serial number bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.serial
    }

    /// Serialize into wire format
    pub fn to_bytes(&self) -> Vec<u8, { MAX_SERIAL_LEN + 4 }> {
        let mut buf = Vec::new();
        let _ = buf.extend_from_slice(&[
            0x00,
            vpd::UNIT_SERIAL_NUMBER,
            0x00,
            self.serial.len() as u8,
        ]);
        let _ = buf.extend_from_slice(&self.serial);
        buf
    }
}

/// Decoded INQUIRY CDB
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InquiryRequest {
    /// Enable vital product data
    pub evpd: bool,
    /// Obsolete command support data bit
    pub cmddt: bool,
    pub page_code: u8,
}

impl InquiryRequest {
    pub fn decode(cdb: &Cdb) -> Self {
        Self {
            evpd: cdb[1] & 0x01 != 0,
            cmddt: cdb[1] & 0x02 != 0,
            page_code: cdb[2],
        }
    }
}

// ============================================================================
// Capacity and mode records
// ============================================================================

/// READ CAPACITY (10) response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ReadCapacity10 {
    /// Address of the last block
    pub last_lba: u32,
    pub block_size: u32,
}

impl ReadCapacity10 {
    pub const LEN: usize = 8;

    pub fn to_bytes(&self) -> [u8; Self::LEN] {
        let mut buf = [0u8; Self::LEN];
        buf[0..4].copy_from_slice(&self.last_lba.to_be_bytes());
        buf[4..8].copy_from_slice(&self.block_size.to_be_bytes());
        buf
    }

    pub fn parse(buf: &[u8]) -> Option<Self> {
        if buf.len() < Self::LEN {
            return None;
        }
        Some(Self {
            last_lba: be32(&buf[0..4]),
            block_size: be32(&buf[4..8]),
        })
    }
}

/// READ FORMAT CAPACITIES response with one formatted-media descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FormatCapacities {
    pub block_count: u32,
    /// Block length, 24 bits on the wire
    pub block_size: u32,
}

impl FormatCapacities {
    pub const LEN: usize = 12;

    /// Descriptor type: formatted media
    const FORMATTED_MEDIA: u8 = 0x02;

    pub fn to_bytes(&self) -> [u8; Self::LEN] {
        let mut buf = [0u8; Self::LEN];
        buf[3] = 8; // capacity list length
        buf[4..8].copy_from_slice(&self.block_count.to_be_bytes());
        buf[8] = Self::FORMATTED_MEDIA;
        buf[9..12].copy_from_slice(&self.block_size.to_be_bytes()[1..4]);
        buf
    }
}

/// MODE SENSE (6) parameter header, no block descriptors or pages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ModeParameterHeader6 {
    pub write_protected: bool,
}

impl ModeParameterHeader6 {
    pub const LEN: usize = 4;

    pub fn to_bytes(&self) -> [u8; Self::LEN] {
        [
            (Self::LEN - 1) as u8, // mode data length
            0x00,                  // medium type
            if self.write_protected { 0x80 } else { 0x00 },
            0x00, // block descriptor length
        ]
    }
}

// ============================================================================
// READ/WRITE (10)
// ============================================================================

/// Block range of a READ (10), WRITE (10) or VERIFY (10) command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DataRequest {
    /// First logical block
    pub lba: u32,
    /// Number of blocks
    pub blocks: u16,
}

impl DataRequest {
    pub fn decode(cdb: &Cdb) -> Self {
        Self {
            lba: be32(&cdb[2..6]),
            blocks: be16(&cdb[7..9]),
        }
    }
}

/// CDB builders for initiators and tests
pub mod cdb {
    use super::{opcode, Cdb};

    pub fn test_unit_ready() -> Cdb {
        [0; 16]
    }

    pub fn request_sense(allocation_length: u8) -> Cdb {
        let mut cdb = [0; 16];
        cdb[0] = opcode::REQUEST_SENSE;
        cdb[4] = allocation_length;
        cdb
    }

    pub fn inquiry(evpd: bool, page_code: u8, allocation_length: u16) -> Cdb {
        let mut cdb = [0; 16];
        cdb[0] = opcode::INQUIRY;
        cdb[1] = evpd as u8;
        cdb[2] = page_code;
        cdb[3..5].copy_from_slice(&allocation_length.to_be_bytes());
        cdb
    }

    pub fn read_capacity_10() -> Cdb {
        let mut cdb = [0; 16];
        cdb[0] = opcode::READ_CAPACITY_10;
        cdb
    }

    pub fn mode_sense_6(allocation_length: u8) -> Cdb {
        let mut cdb = [0; 16];
        cdb[0] = opcode::MODE_SENSE_6;
        cdb[2] = 0x3F; // all pages
        cdb[4] = allocation_length;
        cdb
    }

    pub fn read_10(lba: u32, blocks: u16) -> Cdb {
        data(opcode::READ_10, lba, blocks)
    }

    pub fn write_10(lba: u32, blocks: u16) -> Cdb {
        data(opcode::WRITE_10, lba, blocks)
    }

    pub fn verify_10(lba: u32, blocks: u16) -> Cdb {
        data(opcode::VERIFY_10, lba, blocks)
    }

    fn data(op: u8, lba: u32, blocks: u16) -> Cdb {
        let mut cdb = [0; 16];
        cdb[0] = op;
        cdb[2..6].copy_from_slice(&lba.to_be_bytes());
        cdb[7..9].copy_from_slice(&blocks.to_be_bytes());
        cdb
    }
}
