//! Tape input contract and a pulse-stream tape.
//!
//! The core does not parse tape files; the host mounts anything implementing
//! [`Tape`]. Each instruction step advances the mounted tape by the step's
//! T-state delta and latches the reported EAR level into the ULA read path
//! (bit 6 of port $FE) and the beeper mix.

use zx_z80::TState;

/// EAR bit as it appears in a port $FE read (bit 6).
pub const EAR_HIGH: u8 = 0x40;

/// A mounted tape, advanced in lockstep with the CPU clock.
pub trait Tape {
    /// Advance the tape position by `dt` T-states.
    fn advance(&mut self, dt: TState);

    /// EAR level at the current position: 0 or [`EAR_HIGH`].
    fn ear(&self) -> u8;

    /// True when the deck is stopped or playback has run out.
    fn stopped(&self) -> bool;
}

/// A tape rendered down to a pulse stream: a list of pulse durations in
/// T-states, the level toggling at each pulse boundary (starting low).
///
/// Hosts that parse TAP/TZX render blocks to pulses and mount one of these.
pub struct PulseTape {
    pulses: Vec<TState>,
    index: usize,
    /// T-states consumed within the current pulse.
    position: TState,
    level: bool,
}

impl PulseTape {
    #[must_use]
    pub fn new(pulses: Vec<TState>) -> Self {
        Self {
            pulses,
            index: 0,
            position: 0,
            level: false,
        }
    }

    /// Rewind to the start of the stream.
    pub fn rewind(&mut self) {
        self.index = 0;
        self.position = 0;
        self.level = false;
    }
}

impl Tape for PulseTape {
    fn advance(&mut self, dt: TState) {
        let mut remaining = dt;
        while remaining > 0 && self.index < self.pulses.len() {
            let left = self.pulses[self.index] - self.position;
            if remaining >= left {
                remaining -= left;
                self.position = 0;
                self.index += 1;
                self.level = !self.level;
            } else {
                self.position += remaining;
                remaining = 0;
            }
        }
    }

    fn ear(&self) -> u8 {
        if self.level { EAR_HIGH } else { 0 }
    }

    fn stopped(&self) -> bool {
        self.index >= self.pulses.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_toggles_at_pulse_boundaries() {
        let mut tape = PulseTape::new(vec![100, 100, 100]);
        assert_eq!(tape.ear(), 0);

        tape.advance(99);
        assert_eq!(tape.ear(), 0);

        tape.advance(1);
        assert_eq!(tape.ear(), EAR_HIGH);

        tape.advance(100);
        assert_eq!(tape.ear(), 0);
    }

    #[test]
    fn advance_spans_multiple_pulses() {
        let mut tape = PulseTape::new(vec![10, 10, 10, 10]);
        tape.advance(25);
        // Two boundaries crossed: the level is back low.
        assert_eq!(tape.ear(), 0);
        tape.advance(5);
        assert_eq!(tape.ear(), EAR_HIGH);
    }

    #[test]
    fn runs_out_and_stops() {
        let mut tape = PulseTape::new(vec![10]);
        assert!(!tape.stopped());
        tape.advance(10);
        assert!(tape.stopped());
        // Advancing past the end is harmless.
        tape.advance(1000);
        assert_eq!(tape.ear(), EAR_HIGH);
    }

    #[test]
    fn rewind_restores_start() {
        let mut tape = PulseTape::new(vec![10, 10]);
        tape.advance(15);
        tape.rewind();
        assert_eq!(tape.ear(), 0);
        assert!(!tape.stopped());
    }
}
