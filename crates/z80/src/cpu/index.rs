//! DD/FD-prefixed instruction execution (IX/IY pages), including DDCB/FDCB.
//!
//! A DD or FD prefix rebinds HL to the index register, H/L to its halves,
//! and `(HL)` to `(II+d)` with a signed displacement. Opcodes whose
//! unprefixed form touches none of those fall through to the unprefixed
//! handler - the classic prefix behaviour, which also makes DD DD / DD FD /
//! DD ED chains come out right by re-dispatch.

#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::too_many_lines)]

use crate::bus::{Bus, TState};

use super::execute::decode;
use super::Z80;

/// Which index register a DD/FD prefix selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum IndexReg {
    Ix,
    Iy,
}

impl Z80 {
    fn index(&self, idx: IndexReg) -> u16 {
        match idx {
            IndexReg::Ix => self.regs.ix,
            IndexReg::Iy => self.regs.iy,
        }
    }

    fn set_index(&mut self, idx: IndexReg, value: u16) {
        match idx {
            IndexReg::Ix => self.regs.ix = value,
            IndexReg::Iy => self.regs.iy = value,
        }
    }

    fn index_hi(&self, idx: IndexReg) -> u8 {
        (self.index(idx) >> 8) as u8
    }

    fn index_lo(&self, idx: IndexReg) -> u8 {
        self.index(idx) as u8
    }

    fn set_index_hi(&mut self, idx: IndexReg, value: u8) {
        let old = self.index(idx);
        self.set_index(idx, (old & 0x00FF) | (u16::from(value) << 8));
    }

    fn set_index_lo(&mut self, idx: IndexReg, value: u8) {
        let old = self.index(idx);
        self.set_index(idx, (old & 0xFF00) | u16::from(value));
    }

    /// Read the displacement operand, charge the 5 internal T-states on PC,
    /// and latch MEMPTR = II+d.
    fn fetch_displacement<B: Bus>(&mut self, bus: &mut B, t: &mut TState, idx: IndexReg) {
        let d = bus.peek_timed(self.regs.pc, t) as i8;
        bus.contend(self.regs.pc, 1, 5, t);
        self.regs.pc = self.regs.pc.wrapping_add(1);
        self.regs.wz = self.index(idx).wrapping_add_signed(i16::from(d));
    }

    /// Execute the instruction after a DD/FD prefix.
    pub(crate) fn step_index<B: Bus>(&mut self, bus: &mut B, t: &mut TState, idx: IndexReg) {
        let opcode = self.fetch_opcode(bus, t);
        let (x, y, z, p, q) = decode(opcode);

        match x {
            0 => match z {
                1 => {
                    if q == 0 {
                        // 21 - LD II,nn
                        if p == 2 {
                            let value = bus.peek16_timed(self.regs.pc, t);
                            self.regs.pc = self.regs.pc.wrapping_add(2);
                            self.set_index(idx, value);
                        } else {
                            self.execute(bus, t, opcode);
                        }
                    } else {
                        // 09, 19, 29, 39 - ADD II,BC/DE/II/SP
                        bus.contend(self.regs.ir(), 1, 7, t);
                        self.regs.wz = self.index(idx).wrapping_add(1);
                        let rhs = if p == 2 { self.index(idx) } else { self.get_rp(p) };
                        let result = self.add16(self.index(idx), rhs);
                        self.set_index(idx, result);
                    }
                }

                2 if p == 2 => {
                    if q == 0 {
                        // 22 - LD (nn),II
                        let addr = bus.peek16_timed(self.regs.pc, t);
                        bus.poke16_timed(addr, self.index(idx), t);
                        self.regs.wz = addr.wrapping_add(1);
                        self.regs.pc = self.regs.pc.wrapping_add(2);
                    } else {
                        // 2A - LD II,(nn)
                        let addr = bus.peek16_timed(self.regs.pc, t);
                        let value = bus.peek16_timed(addr, t);
                        self.set_index(idx, value);
                        self.regs.pc = self.regs.pc.wrapping_add(2);
                        self.regs.wz = addr.wrapping_add(1);
                    }
                }

                3 if p == 2 => {
                    // 23 / 2B - INC II / DEC II
                    bus.contend(self.regs.ir(), 1, 2, t);
                    let value = if q == 0 {
                        self.index(idx).wrapping_add(1)
                    } else {
                        self.index(idx).wrapping_sub(1)
                    };
                    self.set_index(idx, value);
                }

                4 => match y {
                    // 24 - INC IIH
                    4 => {
                        let value = self.inc8(self.index_hi(idx));
                        self.set_index_hi(idx, value);
                    }
                    // 2C - INC IIL
                    5 => {
                        let value = self.inc8(self.index_lo(idx));
                        self.set_index_lo(idx, value);
                    }
                    // 34 - INC (II+d)
                    6 => {
                        self.fetch_displacement(bus, t, idx);
                        let value = bus.peek_timed(self.regs.wz, t);
                        bus.contend(self.regs.wz, 1, 1, t);
                        let value = self.inc8(value);
                        bus.poke_timed(self.regs.wz, value, t);
                    }
                    _ => self.execute(bus, t, opcode),
                },

                5 => match y {
                    // 25 - DEC IIH
                    4 => {
                        let value = self.dec8(self.index_hi(idx));
                        self.set_index_hi(idx, value);
                    }
                    // 2D - DEC IIL
                    5 => {
                        let value = self.dec8(self.index_lo(idx));
                        self.set_index_lo(idx, value);
                    }
                    // 35 - DEC (II+d)
                    6 => {
                        self.fetch_displacement(bus, t, idx);
                        let value = bus.peek_timed(self.regs.wz, t);
                        bus.contend(self.regs.wz, 1, 1, t);
                        let value = self.dec8(value);
                        bus.poke_timed(self.regs.wz, value, t);
                    }
                    _ => self.execute(bus, t, opcode),
                },

                6 => match y {
                    // 26 - LD IIH,n
                    4 => {
                        let value = bus.peek_timed(self.regs.pc, t);
                        self.regs.pc = self.regs.pc.wrapping_add(1);
                        self.set_index_hi(idx, value);
                    }
                    // 2E - LD IIL,n
                    5 => {
                        let value = bus.peek_timed(self.regs.pc, t);
                        self.regs.pc = self.regs.pc.wrapping_add(1);
                        self.set_index_lo(idx, value);
                    }
                    // 36 - LD (II+d),n
                    6 => {
                        let d = bus.peek_timed(self.regs.pc, t) as i8;
                        self.regs.pc = self.regs.pc.wrapping_add(1);
                        let value = bus.peek_timed(self.regs.pc, t);
                        bus.contend(self.regs.pc, 1, 2, t);
                        self.regs.pc = self.regs.pc.wrapping_add(1);
                        self.regs.wz = self.index(idx).wrapping_add_signed(i16::from(d));
                        bus.poke_timed(self.regs.wz, value, t);
                    }
                    _ => self.execute(bus, t, opcode),
                },

                _ => self.execute(bus, t, opcode),
            },

            1 => self.step_index_load(bus, t, idx, opcode, y, z),

            2 => {
                // ALU A with IIH/IIL/(II+d)
                let value = match z {
                    4 => self.index_hi(idx),
                    5 => self.index_lo(idx),
                    6 => {
                        self.fetch_displacement(bus, t, idx);
                        bus.peek_timed(self.regs.wz, t)
                    }
                    _ => {
                        self.execute(bus, t, opcode);
                        return;
                    }
                };
                self.alu_op(y, value);
            }

            _ => match opcode {
                // DDCB / FDCB prefixes
                0xCB => self.step_index_cb(bus, t, idx),

                // E1 - POP II
                0xE1 => {
                    let value = self.pop(bus, t);
                    self.set_index(idx, value);
                }

                // E3 - EX (SP),II
                0xE3 => {
                    let value = bus.peek16_timed(self.regs.sp, t);
                    bus.contend(self.regs.sp.wrapping_add(1), 1, 1, t);
                    bus.poke_timed(self.regs.sp.wrapping_add(1), self.index_hi(idx), t);
                    bus.poke_timed(self.regs.sp, self.index_lo(idx), t);
                    bus.contend(self.regs.sp, 1, 2, t);
                    self.set_index(idx, value);
                    self.regs.wz = value;
                }

                // E5 - PUSH II
                0xE5 => {
                    bus.contend(self.regs.ir(), 1, 1, t);
                    let value = self.index(idx);
                    self.push(bus, value, t);
                }

                // E9 - JP (II)
                0xE9 => self.regs.pc = self.index(idx),

                // F9 - LD SP,II
                0xF9 => {
                    bus.contend(self.regs.ir(), 1, 2, t);
                    self.regs.sp = self.index(idx);
                }

                _ => self.execute(bus, t, opcode),
            },
        }
    }

    /// The 0x40-0x7F page under DD/FD: LD r,r' with H/L rebound to the index
    /// halves, except that `(II+d)` forms use the real H/L and DD 76 stays
    /// HALT.
    fn step_index_load<B: Bus>(
        &mut self,
        bus: &mut B,
        t: &mut TState,
        idx: IndexReg,
        opcode: u8,
        y: u8,
        z: u8,
    ) {
        if y == 6 && z == 6 {
            self.execute(bus, t, opcode); // DD 76 = HALT
            return;
        }

        if y == 6 {
            // LD (II+d),r - source is the unmodified register set
            self.fetch_displacement(bus, t, idx);
            bus.poke_timed(self.regs.wz, self.get_r(z), t);
            return;
        }

        if z == 6 {
            // LD r,(II+d) - destination is the unmodified register set
            self.fetch_displacement(bus, t, idx);
            let value = bus.peek_timed(self.regs.wz, t);
            self.set_r(y, value);
            return;
        }

        let value = match z {
            4 => self.index_hi(idx),
            5 => self.index_lo(idx),
            _ => self.get_r(z),
        };
        match y {
            4 => self.set_index_hi(idx, value),
            5 => self.set_index_lo(idx, value),
            _ => self.set_r(y, value),
        }
    }

    /// DDCB / FDCB page. The displacement and sub-opcode are read without R
    /// increments (only the two prefix fetches bump R); MEMPTR = II+d is
    /// latched before the operation and every form operates on memory, with
    /// the non-BIT forms also writing the result back to a register when
    /// z != 6 (the undocumented `LD r,op (II+d)` behaviour).
    fn step_index_cb<B: Bus>(&mut self, bus: &mut B, t: &mut TState, idx: IndexReg) {
        bus.contend(self.regs.pc, 3, 1, t);
        let d = bus.peek(self.regs.pc) as i8;
        self.regs.wz = self.index(idx).wrapping_add_signed(i16::from(d));
        self.regs.pc = self.regs.pc.wrapping_add(1);

        bus.contend(self.regs.pc, 3, 1, t);
        let opcode = bus.peek(self.regs.pc);
        bus.contend(self.regs.pc, 1, 2, t);
        self.regs.pc = self.regs.pc.wrapping_add(1);

        let (x, y, z, _, _) = decode(opcode);
        let addr = self.regs.wz;

        match x {
            // rot/shift (II+d), optionally LD r,...
            0 => {
                let value = bus.peek_timed(addr, t);
                bus.contend(addr, 1, 1, t);
                let value = self.rot_shift(y, value);
                bus.poke_timed(addr, value, t);
                if z != 6 {
                    self.set_r(z, value);
                }
            }

            // BIT y,(II+d)
            1 => {
                let value = bus.peek_timed(addr, t);
                bus.contend(addr, 1, 1, t);
                self.bit_memptr(value, y);
            }

            // RES y,(II+d), optionally LD r,...
            2 => {
                let value = bus.peek_timed(addr, t) & !(1 << y);
                bus.contend(addr, 1, 1, t);
                bus.poke_timed(addr, value, t);
                if z != 6 {
                    self.set_r(z, value);
                }
            }

            // SET y,(II+d), optionally LD r,...
            _ => {
                let value = bus.peek_timed(addr, t) | (1 << y);
                bus.contend(addr, 1, 1, t);
                bus.poke_timed(addr, value, t);
                if z != 6 {
                    self.set_r(z, value);
                }
            }
        }
    }
}
