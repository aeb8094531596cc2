//! I/O port decoding and I/O contention.
//!
//! Ports decode by bit pattern, not full address. Bit 0 clear selects the
//! ULA; a low byte with bits 7..5 clear (and bit 0 set) selects the Kempston
//! interface at $1F and its aliases. Everything else is unattached and reads
//! $FF (floating-bus fidelity is out of scope for this core).

use zx_z80::TState;

use crate::keyboard::Keyboard;
use crate::memory::Memory;

/// I/O-side ULA state: keyboard, border latch, speaker/MIC lines, the tape
/// EAR level, and the Kempston byte.
pub struct IoPorts {
    /// Keyboard matrix, active low.
    pub keyboard: Keyboard,
    /// Kempston joystick byte (bits: right, left, down, up, fire; active high).
    pub kempston: u8,
    /// Whether the Kempston interface is attached at all.
    pub kempston_enabled: bool,
    /// Border colour latch (0-7), from bits 0-2 of the last $FE write.
    pub border: u8,
    /// Speaker line (bit 4 of the last $FE write).
    pub speaker: bool,
    /// MIC line (bit 3 of the last $FE write).
    pub mic: bool,
    /// Tape EAR level: 0 or 0x40, merged into bit 6 of ULA reads.
    pub ear: u8,
}

impl IoPorts {
    #[must_use]
    pub fn new(kempston_enabled: bool) -> Self {
        Self {
            keyboard: Keyboard::new(),
            kempston: 0,
            kempston_enabled,
            border: 7, // White on power-up.
            speaker: false,
            mic: false,
            ear: 0,
        }
    }

    /// Decode a port read.
    ///
    /// ULA port: the AND of all keyboard half-rows enabled by zero bits in
    /// the high byte, with bits 5 and 7 forced high and bit 6 carrying EAR.
    #[must_use]
    pub fn read(&self, port: u16) -> u8 {
        if port & 0x0001 == 0 {
            let high = (port >> 8) as u8;
            let mut keys = 0x1F;
            for row in 0..8 {
                if high & (1 << row) == 0 {
                    keys &= self.keyboard.row(row);
                }
            }
            (keys & 0x1F) | 0xA0 | self.ear
        } else if port & 0x00E0 == 0 && self.kempston_enabled {
            self.kempston
        } else {
            0xFF
        }
    }

    /// Decode a ULA port write: bits 0-2 border, bit 3 MIC, bit 4 speaker.
    ///
    /// The caller is responsible for rendering up to the write's T-state
    /// before the border latch changes.
    pub fn write_ula(&mut self, value: u8) {
        self.border = value & 0x07;
        self.mic = value & 0x08 != 0;
        self.speaker = value & 0x10 != 0;
    }

    /// Does this port address select the ULA?
    #[must_use]
    pub const fn is_ula_port(port: u16) -> bool {
        port & 0x0001 == 0
    }
}

/// Charge the 4-T-state I/O access pattern for `port`, stretching where the
/// raster position demands it:
///
/// | high byte contended | ULA port | pattern              |
/// |---------------------|----------|----------------------|
/// | no                  | no       | N:4                  |
/// | no                  | yes      | N:1, C:3             |
/// | yes                 | yes      | C:1, C:3             |
/// | yes                 | no       | C:1, C:1, C:1, C:1   |
pub fn io_contend(memory: &Memory, port: u16, t: &mut TState) {
    let contended_high = Memory::is_contended(port);
    let ula = IoPorts::is_ula_port(port);

    // Address phase.
    if contended_high {
        *t += memory.contention_at(*t);
    }
    *t += 1;

    // Data phase.
    if ula {
        *t += memory.contention_at(*t) + 3;
    } else if contended_high {
        for _ in 0..3 {
            *t += memory.contention_at(*t) + 1;
        }
    } else {
        *t += 3;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyboard::Key;
    use crate::memory::CONTENTION_START;

    #[test]
    fn ula_read_idle_keyboard() {
        let io = IoPorts::new(true);
        // Bits 0-4 high (no keys), 5 and 7 forced, EAR low.
        assert_eq!(io.read(0xFEFE), 0xBF);
    }

    #[test]
    fn ula_read_selected_row() {
        let mut io = IoPorts::new(true);
        io.keyboard.set_key(Key::Shift, true); // Row 0, bit 0.
        assert_eq!(io.read(0xFEFE) & 0x01, 0x00);
        // Row 0 not selected by this high byte.
        assert_eq!(io.read(0xFDFE) & 0x01, 0x01);
    }

    #[test]
    fn ula_read_merges_multiple_rows() {
        let mut io = IoPorts::new(true);
        io.keyboard.set_key(Key::Shift, true); // Row 0, bit 0.
        io.keyboard.set_key(Key::Space, true); // Row 7, bit 0... different rows, same bit.
        io.keyboard.set_key(Key::B, true); // Row 7, bit 4.
        // High byte 0x00 selects every row: AND of all of them.
        assert_eq!(io.read(0x00FE) & 0x1F, 0x0E);
    }

    #[test]
    fn ear_level_appears_in_bit_6() {
        let mut io = IoPorts::new(true);
        io.ear = 0x40;
        assert_eq!(io.read(0xFEFE) & 0x40, 0x40);
        io.ear = 0;
        assert_eq!(io.read(0xFEFE) & 0x40, 0x00);
    }

    #[test]
    fn kempston_decodes_low_byte_pattern() {
        let mut io = IoPorts::new(true);
        io.kempston = 0b0001_0001; // Right + fire.
        assert_eq!(io.read(0x001F), 0x11);
        // Any high byte aliases.
        assert_eq!(io.read(0xA01F), 0x11);
        // Bit 5 set in the low byte: not Kempston.
        assert_eq!(io.read(0x003F), 0xFF);
    }

    #[test]
    fn kempston_detached_reads_ff() {
        let mut io = IoPorts::new(false);
        io.kempston = 0x1F;
        assert_eq!(io.read(0x001F), 0xFF);
    }

    #[test]
    fn ula_write_latches_border_mic_speaker() {
        let mut io = IoPorts::new(true);
        io.write_ula(0b0001_1010);
        assert_eq!(io.border, 2);
        assert!(io.mic);
        assert!(io.speaker);
    }

    #[test]
    fn io_contend_uncontended_non_ula_is_four() {
        let mem = Memory::new();
        let mut t: TState = CONTENTION_START;
        io_contend(&mem, 0x01FF, &mut t);
        assert_eq!(t, CONTENTION_START + 4);
    }

    #[test]
    fn io_contend_uncontended_ula_in_border() {
        let mem = Memory::new();
        let mut t: TState = 100;
        io_contend(&mem, 0x00FE, &mut t);
        assert_eq!(t, 104);
    }

    #[test]
    fn io_contend_uncontended_ula_in_window() {
        let mem = Memory::new();
        // N:1 moves to pattern position 1 (delay 5), then C:3.
        let mut t: TState = CONTENTION_START;
        io_contend(&mem, 0x00FE, &mut t);
        assert_eq!(t, CONTENTION_START + 1 + 5 + 3);
    }

    #[test]
    fn io_contend_contended_ula_in_window() {
        let mem = Memory::new();
        // C:1 at delay 6 lands on position 7 (delay 0), then C:3.
        let mut t: TState = CONTENTION_START;
        io_contend(&mem, 0x40FE, &mut t);
        assert_eq!(t, CONTENTION_START + 6 + 1 + 0 + 3);
    }

    #[test]
    fn io_contend_contended_non_ula_in_window() {
        let mem = Memory::new();
        // C:1 four times: 6+1, 0+1, 6+1, 0+1.
        let mut t: TState = CONTENTION_START;
        io_contend(&mem, 0x40FF, &mut t);
        assert_eq!(t, CONTENTION_START + 16);
    }
}
