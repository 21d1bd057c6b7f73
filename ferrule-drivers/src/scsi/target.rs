//! SCSI command engine
//!
//! Dispatches one CDB at a time to its handler. Handlers talk to the block
//! device and move data over the transport; the engine keeps the sense data
//! a following REQUEST SENSE returns.
//!
//! Any command that completes successfully resets the sense data to GOOD,
//! including REQUEST SENSE itself.

use ferrule_hal::block::{BlockDevice, BlockDeviceInfo};
use ferrule_hal::transport::ScsiTransport;
use ferrule_protocol::scsi::{
    opcode, vpd, Cdb, DataRequest, FormatCapacities, InquiryData, InquiryRequest,
    ModeParameterHeader6, ReadCapacity10, UnitSerialNumber, SUPPORTED_VPD_PAGES,
};
use ferrule_protocol::sense::{SenseCode, SenseData};

/// Collaborators attached while the target runs
pub struct ScsiConfig<'a, T, B> {
    /// Carries data-in and data-out phases
    pub transport: &'a mut T,
    /// Medium behind the logical unit
    pub device: &'a mut B,
    /// Standard INQUIRY response
    pub inquiry: &'a InquiryData,
    /// Unit serial number VPD page
    pub serial: &'a UnitSerialNumber,
    /// Staging area for READ/WRITE, at least one block long
    pub block_buffer: &'a mut [u8],
}

/// Target lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TargetState {
    Stopped,
    Ready,
}

/// Data phase a command performs on success
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DataPhase {
    None,
    /// Device to initiator, in bytes
    In(u32),
    /// Initiator to device, in bytes
    Out(u32),
}

/// Command failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ScsiError {
    /// Command rejected; the code is also stored as sense data
    CheckCondition(SenseCode),
    /// The transport moved fewer bytes than the data phase needed
    ShortTransfer { residue: u32 },
}

/// Per-command bookkeeping
#[derive(Debug, Default)]
struct Session {
    sense: SenseData,
    mode_sense: ModeParameterHeader6,
    /// Bytes missing from the last short data phase
    residue: u32,
    /// Bytes moved in either direction by the current command
    transferred: u32,
}

/// SCSI block target
pub struct ScsiTarget<'a, T, B> {
    config: Option<ScsiConfig<'a, T, B>>,
    session: Session,
}

impl<'a, T: ScsiTransport, B: BlockDevice> ScsiTarget<'a, T, B> {
    /// Create a stopped target
    pub fn new() -> Self {
        Self {
            config: None,
            session: Session::default(),
        }
    }

    pub fn state(&self) -> TargetState {
        if self.config.is_some() {
            TargetState::Ready
        } else {
            TargetState::Stopped
        }
    }

    /// Attach collaborators and clear the sense data
    ///
    /// # Panics
    ///
    /// If the target is already running.
    pub fn start(&mut self, config: ScsiConfig<'a, T, B>) {
        assert!(self.config.is_none(), "SCSI target started twice");
        self.config = Some(config);
        self.session = Session::default();
        debug!("SCSI target started");
    }

    /// Detach and return the collaborators
    pub fn stop(&mut self) -> Option<ScsiConfig<'a, T, B>> {
        debug!("SCSI target stopped");
        self.config.take()
    }

    /// Sense code of the last executed command
    pub fn sense(&self) -> SenseCode {
        self.session.sense.code
    }

    /// Bytes missing from the last short data phase
    pub fn residue(&self) -> u32 {
        self.session.residue
    }

    /// Bytes moved by the last executed command
    pub fn transferred(&self) -> u32 {
        self.session.transferred
    }

    /// Data phase `cdb` would perform, without running it
    ///
    /// Commands that will fail before moving any data report
    /// [`DataPhase::None`].
    ///
    /// # Panics
    ///
    /// If the target is not started.
    pub fn data_phase(&mut self, cdb: &Cdb) -> DataPhase {
        let Some(config) = self.config.as_mut() else {
            panic!("SCSI target not started");
        };

        let len = match cdb[0] {
            opcode::INQUIRY => {
                let request = InquiryRequest::decode(cdb);
                match (request.cmddt, request.evpd, request.page_code) {
                    (false, false, 0) => InquiryData::LEN,
                    (false, true, vpd::UNIT_SERIAL_NUMBER) => config.serial.to_bytes().len(),
                    (false, true, vpd::SUPPORTED_PAGES) => SUPPORTED_VPD_PAGES.len(),
                    _ => return DataPhase::None,
                }
            }
            opcode::REQUEST_SENSE => SenseData::LEN,
            opcode::MODE_SENSE_6 => ModeParameterHeader6::LEN,
            opcode::READ_CAPACITY_10 | opcode::READ_FORMAT_CAPACITIES => {
                if ready_medium(&mut *config.device).is_err() {
                    return DataPhase::None;
                }
                if cdb[0] == opcode::READ_CAPACITY_10 {
                    ReadCapacity10::LEN
                } else {
                    FormatCapacities::LEN
                }
            }
            opcode::READ_10 | opcode::WRITE_10 => {
                let request = DataRequest::decode(cdb);
                let Ok(info) = ready_medium(&mut *config.device) else {
                    return DataPhase::None;
                };
                let writing = cdb[0] == opcode::WRITE_10;
                if request.blocks == 0
                    || !info.contains(request.lba, request.blocks as u32)
                    || (writing && config.device.is_write_protected())
                {
                    return DataPhase::None;
                }
                let bytes = (request.blocks as u32).saturating_mul(info.block_size);
                return if writing {
                    DataPhase::Out(bytes)
                } else {
                    DataPhase::In(bytes)
                };
            }
            _ => return DataPhase::None,
        };
        DataPhase::In(len as u32)
    }

    pub(crate) fn transport_mut(&mut self) -> Option<&mut T> {
        self.config.as_mut().map(|config| &mut *config.transport)
    }

    /// Execute one command
    ///
    /// # Panics
    ///
    /// If the target is not started, or a READ/WRITE meets a block buffer
    /// smaller than one block.
    pub fn execute(&mut self, cdb: &Cdb) -> Result<(), ScsiError> {
        let Self { config, session } = self;
        let Some(config) = config.as_mut() else {
            panic!("SCSI target not started");
        };

        session.residue = 0;
        session.transferred = 0;

        let result = match cdb[0] {
            opcode::INQUIRY => session.inquiry(config, cdb),
            opcode::REQUEST_SENSE => session.request_sense(config),
            opcode::READ_CAPACITY_10 => session.read_capacity_10(config),
            opcode::READ_10 => session.read_10(config, cdb),
            opcode::WRITE_10 => session.write_10(config, cdb),
            opcode::TEST_UNIT_READY => session.test_unit_ready(config),
            opcode::MODE_SENSE_6 => session.mode_sense_6(config),
            opcode::READ_FORMAT_CAPACITIES => session.read_format_capacities(config),
            opcode::PREVENT_ALLOW_MEDIUM_REMOVAL
            | opcode::START_STOP_UNIT
            | opcode::VERIFY_10 => Ok(()),
            op => {
                debug!("SCSI opcode {=u8:#x} not supported", op);
                Err(ScsiError::CheckCondition(SenseCode::INVALID_COMMAND))
            }
        };

        match result {
            Ok(()) => session.sense = SenseData::new(SenseCode::GOOD),
            Err(ScsiError::CheckCondition(code)) => session.sense = SenseData::new(code),
            Err(ScsiError::ShortTransfer { .. }) => {}
        }
        result
    }
}

impl<T: ScsiTransport, B: BlockDevice> Default for ScsiTarget<'_, T, B> {
    fn default() -> Self {
        Self::new()
    }
}

fn check(code: SenseCode) -> ScsiError {
    ScsiError::CheckCondition(code)
}

/// Medium present and geometry readable
fn ready_medium<B: BlockDevice>(device: &mut B) -> Result<BlockDeviceInfo, ScsiError> {
    if !device.is_inserted() {
        return Err(check(SenseCode::MEDIUM_NOT_PRESENT));
    }
    device.info().map_err(|_| {
        warn!("block device info unavailable");
        check(SenseCode::LOGICAL_UNIT_NOT_READY)
    })
}

impl Session {
    /// Data-in phase
    fn transmit<T: ScsiTransport>(&mut self, transport: &mut T, data: &[u8]) -> Result<(), ScsiError> {
        let sent = transport.transmit(data).min(data.len());
        self.account(data.len(), sent)
    }

    /// Data-out phase
    fn receive<T: ScsiTransport>(&mut self, transport: &mut T, buf: &mut [u8]) -> Result<(), ScsiError> {
        let received = transport.receive(buf).min(buf.len());
        self.account(buf.len(), received)
    }

    fn account(&mut self, wanted: usize, moved: usize) -> Result<(), ScsiError> {
        self.transferred += moved as u32;
        self.residue = (wanted - moved) as u32;
        if self.residue > 0 {
            warn!("short data phase, residue {}", self.residue);
            return Err(ScsiError::ShortTransfer {
                residue: self.residue,
            });
        }
        Ok(())
    }

    fn inquiry<T: ScsiTransport, B>(
        &mut self,
        config: &mut ScsiConfig<'_, T, B>,
        cdb: &Cdb,
    ) -> Result<(), ScsiError> {
        let request = InquiryRequest::decode(cdb);
        if request.cmddt {
            return Err(check(SenseCode::INVALID_FIELD_IN_CDB));
        }
        match (request.evpd, request.page_code) {
            (false, 0) => self.transmit(&mut *config.transport, &config.inquiry.to_bytes()),
            (true, vpd::UNIT_SERIAL_NUMBER) => {
                self.transmit(&mut *config.transport, &config.serial.to_bytes())
            }
            (true, vpd::SUPPORTED_PAGES) => self.transmit(&mut *config.transport, &SUPPORTED_VPD_PAGES),
            _ => Err(check(SenseCode::INVALID_FIELD_IN_CDB)),
        }
    }

    fn request_sense<T: ScsiTransport, B>(
        &mut self,
        config: &mut ScsiConfig<'_, T, B>,
    ) -> Result<(), ScsiError> {
        let bytes = self.sense.to_bytes();
        self.transmit(&mut *config.transport, &bytes)
    }

    fn read_capacity_10<T: ScsiTransport, B: BlockDevice>(
        &mut self,
        config: &mut ScsiConfig<'_, T, B>,
    ) -> Result<(), ScsiError> {
        let info = ready_medium(&mut *config.device)?;
        let capacity = ReadCapacity10 {
            last_lba: info.last_block().unwrap_or(0),
            block_size: info.block_size,
        };
        self.transmit(&mut *config.transport, &capacity.to_bytes())
    }

    fn read_format_capacities<T: ScsiTransport, B: BlockDevice>(
        &mut self,
        config: &mut ScsiConfig<'_, T, B>,
    ) -> Result<(), ScsiError> {
        let info = ready_medium(&mut *config.device)?;
        let capacities = FormatCapacities {
            block_count: info.block_count,
            block_size: info.block_size,
        };
        self.transmit(&mut *config.transport, &capacities.to_bytes())
    }

    fn test_unit_ready<T, B: BlockDevice>(
        &mut self,
        config: &mut ScsiConfig<'_, T, B>,
    ) -> Result<(), ScsiError> {
        if !config.device.is_inserted() {
            return Err(check(SenseCode::MEDIUM_NOT_PRESENT));
        }
        Ok(())
    }

    fn mode_sense_6<T: ScsiTransport, B: BlockDevice>(
        &mut self,
        config: &mut ScsiConfig<'_, T, B>,
    ) -> Result<(), ScsiError> {
        self.mode_sense.write_protected = config.device.is_write_protected();
        let bytes = self.mode_sense.to_bytes();
        self.transmit(&mut *config.transport, &bytes)
    }

    /// Validate a READ/WRITE range and return the block size
    fn prepare_transfer<T, B: BlockDevice>(
        config: &mut ScsiConfig<'_, T, B>,
        request: &DataRequest,
    ) -> Result<usize, ScsiError> {
        let info = ready_medium(&mut *config.device)?;
        if !info.contains(request.lba, request.blocks as u32) {
            return Err(check(SenseCode::LBA_OUT_OF_RANGE));
        }
        let block_size = info.block_size as usize;
        assert!(
            config.block_buffer.len() >= block_size,
            "block buffer smaller than one block"
        );
        Ok(block_size)
    }

    fn read_10<T: ScsiTransport, B: BlockDevice>(
        &mut self,
        config: &mut ScsiConfig<'_, T, B>,
        cdb: &Cdb,
    ) -> Result<(), ScsiError> {
        let request = DataRequest::decode(cdb);
        let block_size = Self::prepare_transfer(config, &request)?;
        let ScsiConfig {
            transport,
            device,
            block_buffer,
            ..
        } = config;
        let buf = &mut block_buffer[..block_size];

        for lba in request.lba..request.lba + request.blocks as u32 {
            device.read(lba, buf, 1).map_err(|_| {
                warn!("read failed at block {}", lba);
                check(SenseCode::UNRECOVERED_READ_ERROR)
            })?;
            self.transmit(&mut **transport, buf)?;
        }
        Ok(())
    }

    fn write_10<T: ScsiTransport, B: BlockDevice>(
        &mut self,
        config: &mut ScsiConfig<'_, T, B>,
        cdb: &Cdb,
    ) -> Result<(), ScsiError> {
        let request = DataRequest::decode(cdb);
        let block_size = Self::prepare_transfer(config, &request)?;
        if config.device.is_write_protected() {
            return Err(check(SenseCode::WRITE_PROTECTED));
        }
        let ScsiConfig {
            transport,
            device,
            block_buffer,
            ..
        } = config;
        let buf = &mut block_buffer[..block_size];

        for lba in request.lba..request.lba + request.blocks as u32 {
            self.receive(&mut **transport, buf)?;
            device.write(lba, buf, 1).map_err(|_| {
                warn!("write failed at block {}", lba);
                check(SenseCode::WRITE_FAULT)
            })?;
        }
        device.sync().map_err(|_| {
            warn!("block device sync failed");
            check(SenseCode::WRITE_FAULT)
        })
    }
}
