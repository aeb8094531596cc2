//! Unprefixed and CB-prefixed instruction execution.
//!
//! Opcodes decode as `xxyyyzzz` with `y = ppq`; the match arms below follow
//! that decomposition page by page. Every arm charges its exact T-state cost
//! through the bus, including internal cycles expressed as `contend(IR, ...)`
//! against the refresh address, and writes MEMPTR where the hardware does.

#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::too_many_lines)] // One match arm per opcode group reads best flat.

use crate::bus::{Bus, TState};
use crate::flags::{CF, HF, NF, PF, SF, XF, YF, ZF};

use super::{IndexReg, Z80};

/// Split an opcode into the canonical x/y/z/p/q decode fields.
pub(crate) fn decode(opcode: u8) -> (u8, u8, u8, u8, u8) {
    let x = opcode >> 6;
    let y = (opcode >> 3) & 0x07;
    let z = opcode & 0x07;
    let p = y >> 1;
    let q = y & 1;
    (x, y, z, p, q)
}

impl Z80 {
    /// Execute one already-fetched unprefixed opcode.
    pub(crate) fn execute<B: Bus>(&mut self, bus: &mut B, t: &mut TState, opcode: u8) {
        let (x, y, z, p, q) = decode(opcode);

        match x {
            0 => self.execute_x0(bus, t, y, z, p, q),
            1 => self.execute_x1(bus, t, y, z),
            2 => self.execute_x2(bus, t, y, z),
            _ => self.execute_x3(bus, t, y, z, p, q),
        }
    }

    /// Page 0x00-0x3F.
    fn execute_x0<B: Bus>(&mut self, bus: &mut B, t: &mut TState, y: u8, z: u8, p: u8, q: u8) {
        match z {
            0 => match y {
                // 00 - NOP
                0 => {}

                // 08 - EX AF,AF'
                1 => self.ex_af_af(),

                // 10 - DJNZ d
                2 => {
                    bus.contend(self.regs.ir(), 1, 1, t);
                    self.regs.b = self.regs.b.wrapping_sub(1);
                    if self.regs.b != 0 {
                        self.jump_relative(bus, t);
                    } else {
                        bus.contend(self.regs.pc, 3, 1, t);
                        self.regs.pc = self.regs.pc.wrapping_add(1);
                    }
                }

                // 18 - JR d
                3 => self.jump_relative(bus, t),

                // 20, 28, 30, 38 - JR cc,d
                _ => {
                    if self.condition(y - 4) {
                        self.jump_relative(bus, t);
                    } else {
                        bus.contend(self.regs.pc, 3, 1, t);
                        self.regs.pc = self.regs.pc.wrapping_add(1);
                    }
                }
            },

            1 => {
                if q == 0 {
                    // 01, 11, 21, 31 - LD rr,nn
                    let value = bus.peek16_timed(self.regs.pc, t);
                    self.regs.pc = self.regs.pc.wrapping_add(2);
                    self.set_rp(p, value);
                } else {
                    // 09, 19, 29, 39 - ADD HL,rr
                    bus.contend(self.regs.ir(), 1, 7, t);
                    self.regs.wz = self.regs.hl().wrapping_add(1);
                    let result = self.add16(self.regs.hl(), self.get_rp(p));
                    self.regs.set_hl(result);
                }
            }

            2 => match y {
                // 02 - LD (BC),A
                0 => {
                    bus.poke_timed(self.regs.bc(), self.regs.a, t);
                    self.regs.wz = (self.regs.bc().wrapping_add(1) & 0x00FF)
                        | (u16::from(self.regs.a) << 8);
                }

                // 0A - LD A,(BC)
                1 => {
                    self.regs.a = bus.peek_timed(self.regs.bc(), t);
                    self.regs.wz = self.regs.bc().wrapping_add(1);
                }

                // 12 - LD (DE),A
                2 => {
                    bus.poke_timed(self.regs.de(), self.regs.a, t);
                    self.regs.wz = (self.regs.de().wrapping_add(1) & 0x00FF)
                        | (u16::from(self.regs.a) << 8);
                }

                // 1A - LD A,(DE)
                3 => {
                    self.regs.a = bus.peek_timed(self.regs.de(), t);
                    self.regs.wz = self.regs.de().wrapping_add(1);
                }

                // 22 - LD (nn),HL
                4 => {
                    let addr = bus.peek16_timed(self.regs.pc, t);
                    bus.poke16_timed(addr, self.regs.hl(), t);
                    self.regs.wz = addr.wrapping_add(1);
                    self.regs.pc = self.regs.pc.wrapping_add(2);
                }

                // 2A - LD HL,(nn)
                5 => {
                    let addr = bus.peek16_timed(self.regs.pc, t);
                    let value = bus.peek16_timed(addr, t);
                    self.regs.set_hl(value);
                    self.regs.pc = self.regs.pc.wrapping_add(2);
                    self.regs.wz = addr.wrapping_add(1);
                }

                // 32 - LD (nn),A
                6 => {
                    let addr = bus.peek16_timed(self.regs.pc, t);
                    self.regs.pc = self.regs.pc.wrapping_add(2);
                    bus.poke_timed(addr, self.regs.a, t);
                    self.regs.wz =
                        (addr.wrapping_add(1) & 0x00FF) | (u16::from(self.regs.a) << 8);
                }

                // 3A - LD A,(nn)
                _ => {
                    let addr = bus.peek16_timed(self.regs.pc, t);
                    self.regs.wz = addr.wrapping_add(1);
                    self.regs.a = bus.peek_timed(addr, t);
                    self.regs.pc = self.regs.pc.wrapping_add(2);
                }
            },

            3 => {
                // 03.. / 0B.. - INC rr / DEC rr
                bus.contend(self.regs.ir(), 1, 2, t);
                let value = self.get_rp(p);
                let value = if q == 0 {
                    value.wrapping_add(1)
                } else {
                    value.wrapping_sub(1)
                };
                self.set_rp(p, value);
            }

            4 => {
                // 04.. - INC r / INC (HL)
                if y == 6 {
                    let value = bus.peek_timed(self.regs.hl(), t);
                    bus.contend(self.regs.hl(), 1, 1, t);
                    let value = self.inc8(value);
                    bus.poke_timed(self.regs.hl(), value, t);
                } else {
                    let value = self.get_r(y);
                    let value = self.inc8(value);
                    self.set_r(y, value);
                }
            }

            5 => {
                // 05.. - DEC r / DEC (HL)
                if y == 6 {
                    let value = bus.peek_timed(self.regs.hl(), t);
                    bus.contend(self.regs.hl(), 1, 1, t);
                    let value = self.dec8(value);
                    bus.poke_timed(self.regs.hl(), value, t);
                } else {
                    let value = self.get_r(y);
                    let value = self.dec8(value);
                    self.set_r(y, value);
                }
            }

            6 => {
                // 06.. - LD r,n / LD (HL),n
                let value = bus.peek_timed(self.regs.pc, t);
                self.regs.pc = self.regs.pc.wrapping_add(1);
                if y == 6 {
                    bus.poke_timed(self.regs.hl(), value, t);
                } else {
                    self.set_r(y, value);
                }
            }

            _ => match y {
                // 07 - RLCA
                0 => {
                    self.regs.a = self.regs.a.rotate_left(1);
                    self.regs.f =
                        (self.regs.f & (PF | ZF | SF)) | (self.regs.a & (CF | XF | YF));
                }

                // 0F - RRCA
                1 => {
                    self.regs.f = (self.regs.f & (PF | ZF | SF)) | (self.regs.a & CF);
                    self.regs.a = self.regs.a.rotate_right(1);
                    self.regs.f |= self.regs.a & (XF | YF);
                }

                // 17 - RLA
                2 => {
                    let old = self.regs.a;
                    self.regs.a = (old << 1) | (self.regs.f & CF);
                    self.regs.f =
                        (self.regs.f & (PF | ZF | SF)) | (self.regs.a & (XF | YF)) | (old >> 7);
                }

                // 1F - RRA
                3 => {
                    let old = self.regs.a;
                    self.regs.a = (old >> 1) | (self.regs.f << 7);
                    self.regs.f =
                        (self.regs.f & (PF | ZF | SF)) | (self.regs.a & (XF | YF)) | (old & CF);
                }

                // 27 - DAA
                4 => self.daa(),

                // 2F - CPL
                5 => {
                    self.regs.a ^= 0xFF;
                    self.regs.f = (self.regs.f & (CF | PF | ZF | SF))
                        | (self.regs.a & (XF | YF))
                        | NF
                        | HF;
                }

                // 37 - SCF
                6 => {
                    self.regs.f =
                        (self.regs.f & (PF | ZF | SF)) | (self.regs.a & (XF | YF)) | CF;
                }

                // 3F - CCF
                _ => {
                    self.regs.f = (self.regs.f & (PF | ZF | SF))
                        | (self.regs.a & (XF | YF))
                        | (if self.regs.f & CF != 0 { HF } else { CF });
                }
            },
        }
    }

    /// Page 0x40-0x7F: LD r,r' and HALT.
    fn execute_x1<B: Bus>(&mut self, bus: &mut B, t: &mut TState, y: u8, z: u8) {
        if y == 6 && z == 6 {
            // 76 - HALT: hold PC on the opcode so the fetch loop re-executes
            // it, 4 T-states at a time, until an interrupt releases it.
            self.regs.halted = true;
            self.regs.pc = self.regs.pc.wrapping_sub(1);
        } else if y == 6 {
            // LD (HL),r
            bus.poke_timed(self.regs.hl(), self.get_r(z), t);
        } else if z == 6 {
            // LD r,(HL)
            let value = bus.peek_timed(self.regs.hl(), t);
            self.set_r(y, value);
        } else {
            let value = self.get_r(z);
            self.set_r(y, value);
        }
    }

    /// Page 0x80-0xBF: ALU A,r.
    fn execute_x2<B: Bus>(&mut self, bus: &mut B, t: &mut TState, y: u8, z: u8) {
        let value = if z == 6 {
            bus.peek_timed(self.regs.hl(), t)
        } else {
            self.get_r(z)
        };
        self.alu_op(y, value);
    }

    /// Page 0xC0-0xFF.
    fn execute_x3<B: Bus>(&mut self, bus: &mut B, t: &mut TState, y: u8, z: u8, p: u8, q: u8) {
        match z {
            0 => {
                // C0.. - RET cc
                bus.contend(self.regs.ir(), 1, 1, t);
                if self.condition(y) {
                    self.regs.pc = self.pop(bus, t);
                    self.regs.wz = self.regs.pc;
                }
            }

            1 => {
                if q == 0 {
                    // C1, D1, E1, F1 - POP rr
                    let value = self.pop(bus, t);
                    self.set_rp_af(p, value);
                } else {
                    match p {
                        // C9 - RET
                        0 => {
                            self.regs.pc = self.pop(bus, t);
                            self.regs.wz = self.regs.pc;
                        }

                        // D9 - EXX
                        1 => self.exx(),

                        // E9 - JP (HL)
                        2 => self.regs.pc = self.regs.hl(),

                        // F9 - LD SP,HL
                        _ => {
                            bus.contend(self.regs.ir(), 1, 2, t);
                            self.regs.sp = self.regs.hl();
                        }
                    }
                }
            }

            2 => {
                // C2.. - JP cc,nn
                let addr = bus.peek16_timed(self.regs.pc, t);
                if self.condition(y) {
                    self.regs.pc = addr;
                } else {
                    self.regs.pc = self.regs.pc.wrapping_add(2);
                }
                self.regs.wz = addr;
            }

            3 => match y {
                // C3 - JP nn
                0 => {
                    self.regs.pc = bus.peek16_timed(self.regs.pc, t);
                    self.regs.wz = self.regs.pc;
                }

                // CB - prefix
                1 => self.execute_cb(bus, t),

                // D3 - OUT (n),A
                2 => {
                    let port_lo = bus.peek_timed(self.regs.pc, t);
                    let port = u16::from(port_lo) | (u16::from(self.regs.a) << 8);
                    bus.port_out(port, self.regs.a, t);
                    self.regs.wz = (u16::from(self.regs.a) << 8)
                        | u16::from(port_lo.wrapping_add(1));
                    self.regs.pc = self.regs.pc.wrapping_add(1);
                }

                // DB - IN A,(n)
                3 => {
                    let port_lo = bus.peek_timed(self.regs.pc, t);
                    let port = (u16::from(self.regs.a) << 8) | u16::from(port_lo);
                    self.regs.wz = (u16::from(self.regs.a) << 8)
                        | u16::from(port_lo.wrapping_add(1));
                    self.regs.a = bus.port_in(port, t);
                    self.regs.pc = self.regs.pc.wrapping_add(1);
                }

                // E3 - EX (SP),HL
                4 => {
                    let value = bus.peek16_timed(self.regs.sp, t);
                    bus.contend(self.regs.sp.wrapping_add(1), 1, 1, t);
                    bus.poke_timed(self.regs.sp.wrapping_add(1), self.regs.h, t);
                    bus.poke_timed(self.regs.sp, self.regs.l, t);
                    bus.contend(self.regs.sp, 1, 2, t);
                    self.regs.set_hl(value);
                    self.regs.wz = value;
                }

                // EB - EX DE,HL
                5 => {
                    let de = self.regs.de();
                    self.regs.set_de(self.regs.hl());
                    self.regs.set_hl(de);
                }

                // F3 - DI
                6 => {
                    self.regs.iff1 = false;
                    self.regs.iff2 = false;
                }

                // FB - EI
                _ => {
                    self.regs.iff1 = true;
                    self.regs.iff2 = true;
                    self.ei_just_executed = true;
                }
            },

            4 => {
                // C4.. - CALL cc,nn
                let addr = bus.peek16_timed(self.regs.pc, t);
                self.regs.wz = addr;
                if self.condition(y) {
                    bus.contend(self.regs.pc.wrapping_add(1), 1, 1, t);
                    let ret = self.regs.pc.wrapping_add(2);
                    self.push(bus, ret, t);
                    self.regs.pc = addr;
                } else {
                    self.regs.pc = self.regs.pc.wrapping_add(2);
                }
            }

            5 => {
                if q == 0 {
                    // C5, D5, E5, F5 - PUSH rr
                    bus.contend(self.regs.ir(), 1, 1, t);
                    let value = self.get_rp_af(p);
                    self.push(bus, value, t);
                } else {
                    match p {
                        // CD - CALL nn
                        0 => {
                            let addr = bus.peek16_timed(self.regs.pc, t);
                            self.regs.wz = addr;
                            bus.contend(self.regs.pc.wrapping_add(1), 1, 1, t);
                            let ret = self.regs.pc.wrapping_add(2);
                            self.push(bus, ret, t);
                            self.regs.pc = addr;
                        }

                        // DD - IX prefix
                        1 => self.step_index(bus, t, IndexReg::Ix),

                        // ED - extensions prefix
                        2 => self.step_ed(bus, t),

                        // FD - IY prefix
                        _ => self.step_index(bus, t, IndexReg::Iy),
                    }
                }
            }

            6 => {
                // C6.. - ALU A,n
                let value = bus.peek_timed(self.regs.pc, t);
                self.regs.pc = self.regs.pc.wrapping_add(1);
                self.alu_op(y, value);
            }

            _ => {
                // C7.. - RST y*8
                bus.contend(self.regs.ir(), 1, 1, t);
                let pc = self.regs.pc;
                self.push(bus, pc, t);
                self.regs.pc = u16::from(y) * 8;
                self.regs.wz = self.regs.pc;
            }
        }
    }

    /// Relative jump: read displacement, 5 internal T-states at the operand
    /// address, then PC and MEMPTR move together.
    fn jump_relative<B: Bus>(&mut self, bus: &mut B, t: &mut TState) {
        let d = bus.peek_timed(self.regs.pc, t) as i8;
        bus.contend(self.regs.pc, 1, 5, t);
        self.regs.pc = self
            .regs
            .pc
            .wrapping_add(1)
            .wrapping_add_signed(i16::from(d));
        self.regs.wz = self.regs.pc;
    }

    /// CB-prefixed page: rotates/shifts, BIT, RES, SET.
    fn execute_cb<B: Bus>(&mut self, bus: &mut B, t: &mut TState) {
        let opcode = self.fetch_opcode(bus, t);
        let (x, y, z, _, _) = decode(opcode);

        match x {
            // 00-3F: rotate/shift
            0 => {
                if z == 6 {
                    let value = bus.peek_timed(self.regs.hl(), t);
                    bus.contend(self.regs.hl(), 1, 1, t);
                    let value = self.rot_shift(y, value);
                    bus.poke_timed(self.regs.hl(), value, t);
                } else {
                    let value = self.get_r(z);
                    let value = self.rot_shift(y, value);
                    self.set_r(z, value);
                }
            }

            // 40-7F: BIT
            1 => {
                if z == 6 {
                    let value = bus.peek_timed(self.regs.hl(), t);
                    bus.contend(self.regs.hl(), 1, 1, t);
                    self.bit_memptr(value, y);
                } else {
                    let value = self.get_r(z);
                    self.bit(value, y);
                }
            }

            // 80-BF: RES
            2 => {
                if z == 6 {
                    let value = bus.peek_timed(self.regs.hl(), t);
                    bus.contend(self.regs.hl(), 1, 1, t);
                    bus.poke_timed(self.regs.hl(), value & !(1 << y), t);
                } else {
                    let value = self.get_r(z) & !(1 << y);
                    self.set_r(z, value);
                }
            }

            // C0-FF: SET
            _ => {
                if z == 6 {
                    let value = bus.peek_timed(self.regs.hl(), t);
                    bus.contend(self.regs.hl(), 1, 1, t);
                    bus.poke_timed(self.regs.hl(), value | (1 << y), t);
                } else {
                    let value = self.get_r(z) | (1 << y);
                    self.set_r(z, value);
                }
            }
        }
    }
}
