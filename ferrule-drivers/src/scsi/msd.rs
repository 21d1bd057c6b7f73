//! USB mass storage (Bulk-Only Transport) worker
//!
//! One call to [`MassStorage::process`] serves one command: it receives the
//! CBW, runs the wrapped CDB through the SCSI target (which performs the
//! data phase) and answers with a CSW.

use ferrule_hal::block::BlockDevice;
use ferrule_hal::transport::ScsiTransport;
use ferrule_protocol::bot::{
    BotError, CommandBlockWrapper, CommandStatus, CommandStatusWrapper, Direction,
};

use super::target::{DataPhase, ScsiError, ScsiTarget};

/// Errors that prevent a command from completing with a CSW
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MsdError {
    /// The CBW was short or malformed; the host must reset recovery
    InvalidCommand(BotError),
    /// The CSW could not be sent in full
    StatusNotSent,
}

/// Bulk-Only Transport front end of a SCSI target
pub struct MassStorage<'a, T, B> {
    target: ScsiTarget<'a, T, B>,
}

impl<'a, T: ScsiTransport, B: BlockDevice> MassStorage<'a, T, B> {
    /// Wrap a started target
    pub fn new(target: ScsiTarget<'a, T, B>) -> Self {
        Self { target }
    }

    pub fn target(&self) -> &ScsiTarget<'a, T, B> {
        &self.target
    }

    pub fn target_mut(&mut self) -> &mut ScsiTarget<'a, T, B> {
        &mut self.target
    }

    pub fn into_target(self) -> ScsiTarget<'a, T, B> {
        self.target
    }

    /// Serve one command and return the status sent to the host
    ///
    /// # Panics
    ///
    /// If the wrapped target is not started.
    pub fn process(&mut self) -> Result<CommandStatusWrapper, MsdError> {
        let mut raw = [0u8; CommandBlockWrapper::LEN];
        let received = match self.target.transport_mut() {
            Some(transport) => transport.receive(&mut raw),
            None => panic!("SCSI target not started"),
        };
        if received != raw.len() {
            warn!("short CBW: {} bytes", received);
            return Err(MsdError::InvalidCommand(BotError::InvalidLength));
        }
        let cbw = CommandBlockWrapper::parse(&raw).map_err(MsdError::InvalidCommand)?;
        trace!("CBW tag {} op {=u8:#x}", cbw.tag, cbw.block[0]);

        let phase = self.target.data_phase(&cbw.block);
        if !host_expects(&cbw, phase) {
            // Nothing is moved; the host recovers with a reset
            warn!("phase error on tag {}", cbw.tag);
            return self.send_status(CommandStatusWrapper {
                tag: cbw.tag,
                data_residue: cbw.data_transfer_length,
                status: CommandStatus::PhaseError,
            });
        }

        let outcome = self.target.execute(&cbw.block);
        let transferred = self.target.transferred();
        let status = if transferred > cbw.data_transfer_length {
            warn!("phase error on tag {}", cbw.tag);
            CommandStatus::PhaseError
        } else {
            match outcome {
                Ok(()) => CommandStatus::Passed,
                Err(ScsiError::CheckCondition(_)) | Err(ScsiError::ShortTransfer { .. }) => {
                    CommandStatus::Failed
                }
            }
        };

        self.send_status(CommandStatusWrapper {
            tag: cbw.tag,
            data_residue: cbw.data_transfer_length.saturating_sub(transferred),
            status,
        })
    }

    fn send_status(&mut self, csw: CommandStatusWrapper) -> Result<CommandStatusWrapper, MsdError> {
        let bytes = csw.to_bytes();
        let sent = match self.target.transport_mut() {
            Some(transport) => transport.transmit(&bytes),
            None => 0,
        };
        if sent != bytes.len() {
            return Err(MsdError::StatusNotSent);
        }
        Ok(csw)
    }
}

/// Whether the CBW covers the data phase the command will perform
///
/// The host may announce more than the device moves, never less, and the
/// direction must agree whenever data moves.
fn host_expects(cbw: &CommandBlockWrapper, phase: DataPhase) -> bool {
    match phase {
        DataPhase::None => true,
        DataPhase::In(len) => cbw.direction == Direction::In && len <= cbw.data_transfer_length,
        DataPhase::Out(len) => cbw.direction == Direction::Out && len <= cbw.data_transfer_length,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scsi::mock::{CountingDisk, MockTransport};
    use crate::scsi::target::ScsiConfig;
    use ferrule_protocol::scsi::{cdb, InquiryData, UnitSerialNumber};
    use ferrule_protocol::sense::{asc, key};

    const BLOCK: usize = 512;

    fn cbw(tag: u32, length: u32, direction: Direction, command: &[u8]) -> [u8; 31] {
        CommandBlockWrapper::new(tag, length, direction, command).to_bytes()
    }

    fn csw(bytes: &[u8]) -> CommandStatusWrapper {
        CommandStatusWrapper::parse(bytes).unwrap()
    }

    struct Fixture<'d> {
        transport: MockTransport,
        disk: CountingDisk<'d>,
        inquiry: InquiryData,
        serial: UnitSerialNumber,
        block: [u8; BLOCK],
    }

    impl<'d> Fixture<'d> {
        fn new(storage: &'d mut [u8]) -> Self {
            Self {
                transport: MockTransport::default(),
                disk: CountingDisk::new(storage, BLOCK as u32),
                inquiry: InquiryData::default(),
                serial: UnitSerialNumber::new("0001"),
                block: [0; BLOCK],
            }
        }

        fn msd(&mut self) -> MassStorage<'_, MockTransport, CountingDisk<'d>> {
            let mut target = ScsiTarget::new();
            target.start(ScsiConfig {
                transport: &mut self.transport,
                device: &mut self.disk,
                inquiry: &self.inquiry,
                serial: &self.serial,
                block_buffer: &mut self.block,
            });
            MassStorage::new(target)
        }
    }

    #[test]
    fn test_inquiry_round_trip() {
        let mut storage = [0u8; BLOCK * 4];
        let mut fx = Fixture::new(&mut storage);
        fx.transport
            .queue(&cbw(0xA1B2_C3D4, 36, Direction::In, &cdb::inquiry(false, 0, 36)[..6]));
        let mut msd = fx.msd();

        let status = msd.process().unwrap();
        assert_eq!(status.tag, 0xA1B2_C3D4);
        assert_eq!(status.status, CommandStatus::Passed);
        assert_eq!(status.data_residue, 0);
        drop(msd);

        let sent = &fx.transport.sent;
        assert_eq!(sent.len(), InquiryData::LEN + CommandStatusWrapper::LEN);
        assert_eq!(&sent[..36], &fx.inquiry.to_bytes());
        assert_eq!(csw(&sent[36..]), status);
    }

    #[test]
    fn test_residue_reports_unused_allocation() {
        let mut storage = [0u8; BLOCK * 4];
        let mut fx = Fixture::new(&mut storage);
        fx.transport
            .queue(&cbw(1, 64, Direction::In, &cdb::inquiry(false, 0, 64)[..6]));
        let mut msd = fx.msd();

        let status = msd.process().unwrap();
        assert_eq!(status.status, CommandStatus::Passed);
        assert_eq!(status.data_residue, 28);
    }

    #[test]
    fn test_failed_command_then_request_sense() {
        let mut storage = [0u8; BLOCK * 4];
        let mut fx = Fixture::new(&mut storage);
        fx.disk.inner.set_inserted(false);
        fx.transport
            .queue(&cbw(1, 0, Direction::Out, &cdb::test_unit_ready()[..6]));
        fx.transport
            .queue(&cbw(2, 18, Direction::In, &cdb::request_sense(18)[..6]));
        let mut msd = fx.msd();

        assert_eq!(msd.process().unwrap().status, CommandStatus::Failed);
        let status = msd.process().unwrap();
        assert_eq!(status.status, CommandStatus::Passed);
        assert_eq!(status.tag, 2);
        drop(msd);

        let sent = &fx.transport.sent;
        // CSW, sense data, CSW
        assert_eq!(sent.len(), 13 + 18 + 13);
        let sense = &sent[13..31];
        assert_eq!(sense[2], key::NOT_READY);
        assert_eq!(sense[12], asc::MEDIUM_NOT_PRESENT);
    }

    #[test]
    fn test_write_and_read_blocks() {
        let mut storage = [0u8; BLOCK * 4];
        let mut fx = Fixture::new(&mut storage);
        fx.transport
            .queue(&cbw(10, BLOCK as u32, Direction::Out, &cdb::write_10(3, 1)[..10]));
        fx.transport.queue(&[0x3C; BLOCK]);
        fx.transport
            .queue(&cbw(11, BLOCK as u32, Direction::In, &cdb::read_10(3, 1)[..10]));
        let mut msd = fx.msd();

        assert_eq!(msd.process().unwrap().status, CommandStatus::Passed);
        assert_eq!(msd.process().unwrap().status, CommandStatus::Passed);
        drop(msd);

        let sent = &fx.transport.sent;
        assert_eq!(sent.len(), 13 + BLOCK + 13);
        assert!(sent[13..13 + BLOCK].iter().all(|&b| b == 0x3C));
        assert_eq!(fx.disk.writes, 1);
    }

    #[test]
    fn test_read_longer_than_announced_is_refused() {
        let mut storage = [0u8; BLOCK * 4];
        let mut fx = Fixture::new(&mut storage);
        fx.transport
            .queue(&cbw(5, BLOCK as u32, Direction::In, &cdb::read_10(0, 2)[..10]));
        let mut msd = fx.msd();

        let status = msd.process().unwrap();
        assert_eq!(status.status, CommandStatus::PhaseError);
        assert_eq!(status.data_residue, BLOCK as u32);
        drop(msd);

        assert_eq!(fx.disk.reads, 0);
        assert_eq!(fx.transport.sent.len(), CommandStatusWrapper::LEN);
    }

    #[test]
    fn test_write_longer_than_announced_leaves_medium_untouched() {
        let mut storage = [0u8; BLOCK * 4];
        let mut fx = Fixture::new(&mut storage);
        fx.transport
            .queue(&cbw(1, BLOCK as u32, Direction::Out, &cdb::write_10(0, 2)[..10]));
        fx.transport.queue(&[0x5A; BLOCK]);
        fx.transport
            .queue(&cbw(2, 0, Direction::Out, &cdb::test_unit_ready()[..6]));
        let mut msd = fx.msd();

        let status = msd.process().unwrap();
        assert_eq!(status.tag, 1);
        assert_eq!(status.status, CommandStatus::PhaseError);
        assert_eq!(status.data_residue, BLOCK as u32);
        drop(msd);

        assert_eq!(fx.disk.writes, 0);
        assert!(fx.disk.inner.data().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_host_may_announce_more_than_moved() {
        let mut storage = [0u8; BLOCK * 4];
        let mut fx = Fixture::new(&mut storage);
        fx.transport
            .queue(&cbw(3, 192, Direction::In, &cdb::mode_sense_6(192)[..6]));
        fx.transport
            .queue(&cbw(4, 8, Direction::In, &cdb::test_unit_ready()[..6]));
        let mut msd = fx.msd();

        let status = msd.process().unwrap();
        assert_eq!(status.status, CommandStatus::Passed);
        assert_eq!(status.data_residue, 188);
        let status = msd.process().unwrap();
        assert_eq!(status.status, CommandStatus::Passed);
        assert_eq!(status.data_residue, 8);
    }

    #[test]
    fn test_direction_mismatch_is_phase_error() {
        let mut storage = [0u8; BLOCK * 4];
        let mut fx = Fixture::new(&mut storage);
        fx.transport
            .queue(&cbw(6, 36, Direction::Out, &cdb::inquiry(false, 0, 36)[..6]));
        let mut msd = fx.msd();

        assert_eq!(msd.process().unwrap().status, CommandStatus::PhaseError);
    }

    #[test]
    fn test_malformed_cbw() {
        let mut storage = [0u8; BLOCK * 4];
        let mut fx = Fixture::new(&mut storage);
        let mut bad = cbw(1, 0, Direction::Out, &cdb::test_unit_ready()[..6]);
        bad[3] = 0;
        fx.transport.queue(&bad);
        let mut msd = fx.msd();

        assert_eq!(
            msd.process(),
            Err(MsdError::InvalidCommand(BotError::InvalidSignature))
        );
        assert_eq!(
            msd.process(),
            Err(MsdError::InvalidCommand(BotError::InvalidLength))
        );
        drop(msd);
        assert!(fx.transport.sent.is_empty());
    }

    #[test]
    fn test_status_not_sent() {
        let mut storage = [0u8; BLOCK * 4];
        let mut fx = Fixture::new(&mut storage);
        fx.transport.transmit_limit = Some(4);
        fx.transport
            .queue(&cbw(1, 0, Direction::Out, &cdb::test_unit_ready()[..6]));
        let mut msd = fx.msd();

        assert_eq!(msd.process(), Err(MsdError::StatusNotSent));
    }
}
