//! Machine state snapshots.
//!
//! The wire formats (.sna/.z80/.nx) are a host concern; the core's contract
//! is [`SnapshotState`]: everything observable about a machine, serialisable
//! with serde, restorable bit-identically. `apply` validates the whole state
//! before touching the machine, so a failed restore leaves the prior state
//! intact.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use zx_z80::{Registers, TState};

use crate::breakpoints::Breakpoint;

/// Size of the RAM image in a snapshot ($4000-$FFFF).
pub const SNAPSHOT_RAM_LEN: usize = 0xC000;

/// Complete observable machine state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotState {
    /// Full register file including IR, shadow set, IX/IY and MEMPTR.
    pub registers: Registers,
    /// One-instruction interrupt mask following EI.
    pub ei_just_executed: bool,
    /// 48K RAM image, $4000 upward.
    pub ram: Vec<u8>,
    /// T-state within the current frame.
    pub t_state: TState,
    /// Border colour (0-7).
    pub border: u8,
    /// The breakpoint set.
    pub breakpoints: Vec<Breakpoint>,
}

/// Why a snapshot could not be materialised.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SnapshotError {
    #[error("RAM image is {0} bytes, expected {SNAPSHOT_RAM_LEN}")]
    TruncatedRam(usize),

    #[error("interrupt mode {0} is not one of 0, 1, 2")]
    BadInterruptMode(u8),

    #[error("border colour {0} is out of range 0-7")]
    BadBorder(u8),

    #[error("T-state {0} lies outside the frame")]
    BadTState(TState),
}

impl SnapshotState {
    /// Validate internal consistency without touching any machine.
    ///
    /// # Errors
    ///
    /// Returns the first [`SnapshotError`] found.
    pub fn validate(&self) -> Result<(), SnapshotError> {
        if self.ram.len() != SNAPSHOT_RAM_LEN {
            return Err(SnapshotError::TruncatedRam(self.ram.len()));
        }
        if self.registers.im > 2 {
            return Err(SnapshotError::BadInterruptMode(self.registers.im));
        }
        if self.border > 7 {
            return Err(SnapshotError::BadBorder(self.border));
        }
        if !(0..crate::spectrum::FRAME_TSTATES).contains(&self.t_state) {
            return Err(SnapshotError::BadTState(self.t_state));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_state() -> SnapshotState {
        SnapshotState {
            registers: Registers::default(),
            ei_just_executed: false,
            ram: vec![0; SNAPSHOT_RAM_LEN],
            t_state: 0,
            border: 7,
            breakpoints: Vec::new(),
        }
    }

    #[test]
    fn valid_state_passes() {
        assert_eq!(valid_state().validate(), Ok(()));
    }

    #[test]
    fn truncated_ram_rejected() {
        let mut state = valid_state();
        state.ram.truncate(100);
        assert_eq!(state.validate(), Err(SnapshotError::TruncatedRam(100)));
    }

    #[test]
    fn bad_interrupt_mode_rejected() {
        let mut state = valid_state();
        state.registers.im = 3;
        assert_eq!(state.validate(), Err(SnapshotError::BadInterruptMode(3)));
    }

    #[test]
    fn bad_border_rejected() {
        let mut state = valid_state();
        state.border = 9;
        assert_eq!(state.validate(), Err(SnapshotError::BadBorder(9)));
    }

    #[test]
    fn bad_t_state_rejected() {
        let mut state = valid_state();
        state.t_state = 69_888;
        assert!(state.validate().is_err());
    }
}
