//! Search ROM enumeration
//!
//! Walks the binary tree spanned by the ROM codes on the bus, one pass per
//! device. In every pass each slave answers a bit and its complement; the
//! master decodes the pair and writes back the branch it follows, which
//! silences the slaves on the other branch:
//!
//! | direct | complement | meaning                         |
//! |--------|------------|---------------------------------|
//! | 0      | 1          | every remaining slave has a 0   |
//! | 1      | 0          | every remaining slave has a 1   |
//! | 0      | 0          | discrepancy, both values present |
//! | 1      | 1          | nobody answered                 |
//!
//! The 0 branch is taken first at each discrepancy, so codes are found in
//! ascending [`RomCode::search_order`].

use embedded_hal_async::delay::DelayNs;
use ferrule_hal::pulse::PulseTimer;
use ferrule_protocol::onewire::{cmd, ROM_CODE_BITS};
use ferrule_protocol::RomCode;
use heapless::Vec;

use super::bus::{OneWireBus, OneWireError, StrongPullup};

/// Outcome of a search
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SearchResult {
    /// Output buffer filled; more devices may remain
    Success,
    /// Every device on the bus was found
    LastDevice,
    /// A pass saw no response or a ROM failed its CRC
    Error,
    /// A reset preceding a pass saw no presence pulse
    NoPresence,
}

/// Summary returned by [`OneWireBus::search_rom`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SearchReport {
    /// Valid entries at the start of the output buffer
    pub found: usize,
    pub result: SearchResult,
    /// No discrepancy was seen in any pass
    pub single_device: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Iteration {
    First,
    Next,
}

/// State carried from one pass to the next
struct SearchState {
    iteration: Iteration,
    single_device: bool,
    previous_path: RomCode,
    /// Deepest 0 branch taken in the previous pass, -1 if none
    previous_zero_branch: i8,
    /// Deepest 0 branch taken in the current pass, -1 if none
    last_zero_branch: i8,
}

impl SearchState {
    fn new() -> Self {
        Self {
            iteration: Iteration::First,
            single_device: true,
            previous_path: RomCode::default(),
            previous_zero_branch: -1,
            last_zero_branch: -1,
        }
    }

    /// Pick the branch to follow at a discrepancy
    fn choose(&mut self, rom_bit: u8) -> bool {
        self.single_device = false;
        let depth = rom_bit as i8;
        let bit = match self.iteration {
            Iteration::First => false,
            Iteration::Next if depth < self.previous_zero_branch => {
                self.previous_path.bit(rom_bit as usize)
            }
            Iteration::Next => depth == self.previous_zero_branch,
        };
        if !bit {
            self.last_zero_branch = depth;
        }
        bit
    }

    fn complete_pass(&mut self, rom: RomCode) {
        self.iteration = Iteration::Next;
        self.previous_path = rom;
        self.previous_zero_branch = self.last_zero_branch;
    }

    fn exhausted(&self) -> bool {
        self.previous_zero_branch < 0
    }
}

impl<T: PulseTimer, D: DelayNs> OneWireBus<T, D> {
    /// Discover the ROM codes of the slaves on the bus
    ///
    /// Fills `out` from the start and reports how many entries are valid.
    /// The search stops early with [`SearchResult::Success`] when `out` is
    /// full. Protocol failures are reported in the result; engine errors and
    /// timeouts are returned as `Err`.
    ///
    /// # Panics
    ///
    /// If `out` is empty or the bus is not ready.
    pub async fn search_rom(
        &mut self,
        out: &mut [RomCode],
    ) -> Result<SearchReport, OneWireError<T::Error>> {
        assert!(!out.is_empty(), "search needs room for one ROM code");

        let mut state = SearchState::new();
        let mut found = 0;
        let result = loop {
            if !self.reset().await? {
                break SearchResult::NoPresence;
            }
            self.write_bytes(&[cmd::SEARCH_ROM], StrongPullup::None)
                .await?;

            let Some(rom) = self.search_pass(&mut state).await? else {
                break SearchResult::Error;
            };
            if !rom.is_valid() {
                warn!("search: CRC mismatch after {} device(s)", found);
                break SearchResult::Error;
            }

            out[found] = rom;
            found += 1;
            state.complete_pass(rom);

            if state.exhausted() {
                break SearchResult::LastDevice;
            }
            if found == out.len() {
                break SearchResult::Success;
            }
        };

        debug!("search: {} device(s)", found);
        Ok(SearchReport {
            found,
            result,
            single_device: state.single_device,
        })
    }

    /// [`search_rom`](Self::search_rom) into a fixed-capacity vector
    pub async fn search_rom_vec<const N: usize>(
        &mut self,
    ) -> Result<(Vec<RomCode, N>, SearchResult), OneWireError<T::Error>> {
        let mut roms = [RomCode::default(); N];
        let report = self.search_rom(&mut roms).await?;
        Ok((roms[..report.found].iter().copied().collect(), report.result))
    }

    /// Walk one path from the root to a leaf
    ///
    /// Returns `None` when a bit pair reads (1, 1).
    async fn search_pass(
        &mut self,
        state: &mut SearchState,
    ) -> Result<Option<RomCode>, OneWireError<T::Error>> {
        state.last_zero_branch = -1;
        let mut rom = RomCode::default();

        for rom_bit in 0..ROM_CODE_BITS as u8 {
            let direct = self.read_bit().await?;
            let complement = self.read_bit().await?;
            let bit = match (direct, complement) {
                (true, true) => {
                    warn!("search: no response at bit {}", rom_bit);
                    return Ok(None);
                }
                (false, true) => false,
                (true, false) => true,
                (false, false) => state.choose(rom_bit),
            };
            self.write_bit(bit).await?;
            rom.set_bit(rom_bit as usize, bit);
        }
        Ok(Some(rom))
    }
}
