//! ED-prefixed instruction execution.
//!
//! Covers the 16-bit loads, ADC/SBC HL, RETN/RETI, IM, I/R transfers,
//! RRD/RLD, and the block transfer/compare/I-O family with the repeat
//! variants. Block I/O flag math follows the instruction-specific `C +/- 1`
//! (or L) addend; parity folds `(addend & 7) ^ B` into the parity table.

#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::too_many_lines)]

use crate::bus::{Bus, TState};
use crate::flags::{CF, HALF_CARRY_SUB, HF, NF, PARITY, PF, SF, SZ53, SZ53P, XF, YF, ZF};

use super::execute::decode;
use super::Z80;

impl Z80 {
    /// Execute the instruction after an ED prefix.
    pub(crate) fn step_ed<B: Bus>(&mut self, bus: &mut B, t: &mut TState) {
        let opcode = self.fetch_opcode(bus, t);
        let (x, y, z, p, q) = decode(opcode);

        match x {
            1 => match z {
                0 => {
                    // 40.. - IN r,(C) (ED 70 = IN (C): flags only)
                    self.regs.wz = self.regs.bc().wrapping_add(1);
                    let value = bus.port_in(self.regs.bc(), t);
                    self.regs.f = (self.regs.f & CF) | SZ53P[value as usize];
                    if y != 6 {
                        self.set_r(y, value);
                    }
                }

                1 => {
                    // 41.. - OUT (C),r (ED 71 = OUT (C),0)
                    let value = if y == 6 { 0 } else { self.get_r(y) };
                    bus.port_out(self.regs.bc(), value, t);
                    self.regs.wz = self.regs.bc().wrapping_add(1);
                }

                2 => {
                    // 42.. / 4A.. - SBC HL,rr / ADC HL,rr
                    bus.contend(self.regs.ir(), 1, 7, t);
                    let value = self.get_rp(p);
                    if q == 0 {
                        self.sbc16_hl(value);
                    } else {
                        self.adc16_hl(value);
                    }
                }

                3 => {
                    // 43.. / 4B.. - LD (nn),rr / LD rr,(nn)
                    let addr = bus.peek16_timed(self.regs.pc, t);
                    self.regs.pc = self.regs.pc.wrapping_add(2);
                    if q == 0 {
                        bus.poke16_timed(addr, self.get_rp(p), t);
                    } else {
                        let value = bus.peek16_timed(addr, t);
                        self.set_rp(p, value);
                    }
                    self.regs.wz = addr.wrapping_add(1);
                }

                4 => {
                    // 44.. - NEG (all eight aliases)
                    let value = self.regs.a;
                    self.regs.a = 0;
                    self.sub_a(value);
                }

                5 => {
                    // 45.. - RETN / RETI: IFF1 restored from IFF2
                    self.regs.iff1 = self.regs.iff2;
                    self.regs.pc = self.pop(bus, t);
                    self.regs.wz = self.regs.pc;
                }

                6 => {
                    // 46.. - IM 0/1/2 (with aliases)
                    let mode = y & 3;
                    self.regs.im = if mode == 0 { 0 } else { mode - 1 };
                }

                _ => match y {
                    // 47 - LD I,A
                    0 => {
                        bus.contend(self.regs.ir(), 1, 1, t);
                        self.regs.i = self.regs.a;
                    }

                    // 4F - LD R,A
                    1 => {
                        bus.contend(self.regs.ir(), 1, 1, t);
                        self.regs.r = self.regs.a;
                    }

                    // 57 - LD A,I: P/V reflects IFF2
                    2 => {
                        bus.contend(self.regs.ir(), 1, 1, t);
                        self.regs.a = self.regs.i;
                        self.regs.f = (self.regs.f & CF)
                            | SZ53[self.regs.a as usize]
                            | (if self.regs.iff2 { PF } else { 0 });
                    }

                    // 5F - LD A,R: P/V reflects IFF2
                    3 => {
                        bus.contend(self.regs.ir(), 1, 1, t);
                        self.regs.a = self.regs.r;
                        self.regs.f = (self.regs.f & CF)
                            | SZ53[self.regs.a as usize]
                            | (if self.regs.iff2 { PF } else { 0 });
                    }

                    // 67 - RRD
                    4 => {
                        let value = bus.peek_timed(self.regs.hl(), t);
                        bus.contend(self.regs.hl(), 1, 4, t);
                        bus.poke_timed(self.regs.hl(), (self.regs.a << 4) | (value >> 4), t);
                        self.regs.a = (self.regs.a & 0xF0) | (value & 0x0F);
                        self.regs.f = (self.regs.f & CF) | SZ53P[self.regs.a as usize];
                        self.regs.wz = self.regs.hl().wrapping_add(1);
                    }

                    // 6F - RLD
                    5 => {
                        let value = bus.peek_timed(self.regs.hl(), t);
                        bus.contend(self.regs.hl(), 1, 4, t);
                        bus.poke_timed(self.regs.hl(), (value << 4) | (self.regs.a & 0x0F), t);
                        self.regs.a = (self.regs.a & 0xF0) | (value >> 4);
                        self.regs.f = (self.regs.f & CF) | SZ53P[self.regs.a as usize];
                        self.regs.wz = self.regs.hl().wrapping_add(1);
                    }

                    // 77 / 7F - NOP
                    _ => {}
                },
            },

            2 => match opcode {
                0xA0 => self.ldi_ldd(bus, t, false, 1),
                0xA8 => self.ldi_ldd(bus, t, false, -1),
                0xB0 => self.ldi_ldd(bus, t, true, 1),
                0xB8 => self.ldi_ldd(bus, t, true, -1),

                0xA1 => self.cpi_cpd(bus, t, false, 1),
                0xA9 => self.cpi_cpd(bus, t, false, -1),
                0xB1 => self.cpi_cpd(bus, t, true, 1),
                0xB9 => self.cpi_cpd(bus, t, true, -1),

                0xA2 => self.ini_ind(bus, t, false, 1),
                0xAA => self.ini_ind(bus, t, false, -1),
                0xB2 => self.ini_ind(bus, t, true, 1),
                0xBA => self.ini_ind(bus, t, true, -1),

                0xA3 => self.outi_outd(bus, t, false, 1),
                0xAB => self.outi_outd(bus, t, false, -1),
                0xB3 => self.outi_outd(bus, t, true, 1),
                0xBB => self.outi_outd(bus, t, true, -1),

                _ => self.execute(bus, t, opcode),
            },

            // Undefined ED pages fall through to the unprefixed execution.
            _ => self.execute(bus, t, opcode),
        }
    }

    /// LDI/LDD/LDIR/LDDR: N/H reset, P = (BC != 0), bits 3/5 from
    /// (transferred byte + A) with bit 5 taken from bit 1.
    fn ldi_ldd<B: Bus>(&mut self, bus: &mut B, t: &mut TState, repeat: bool, dir: i16) {
        let value = bus.peek_timed(self.regs.hl(), t);
        bus.poke_timed(self.regs.de(), value, t);
        bus.contend(self.regs.de(), 1, 2, t);
        self.regs.set_bc(self.regs.bc().wrapping_sub(1));

        let marker = value.wrapping_add(self.regs.a);
        self.regs.f = (self.regs.f & (CF | ZF | SF))
            | (if self.regs.bc() != 0 { PF } else { 0 })
            | (marker & XF)
            | (if marker & 0x02 != 0 { YF } else { 0 });

        if repeat && self.regs.bc() != 0 {
            bus.contend(self.regs.de(), 1, 5, t);
            self.regs.pc = self.regs.pc.wrapping_sub(2);
            self.regs.wz = self.regs.pc.wrapping_add(1);
        }

        self.regs.set_de(self.regs.de().wrapping_add_signed(dir));
        self.regs.set_hl(self.regs.hl().wrapping_add_signed(dir));
    }

    /// CPI/CPD/CPIR/CPDR: compare A with (HL); bits 3/5 come from the
    /// difference minus one when half-carry borrowed.
    fn cpi_cpd<B: Bus>(&mut self, bus: &mut B, t: &mut TState, repeat: bool, dir: i16) {
        let value = bus.peek_timed(self.regs.hl(), t);
        let diff = self.regs.a.wrapping_sub(value);
        let key = (((self.regs.a & 0x08) >> 3) | ((value & 0x08) >> 2) | ((diff & 0x08) >> 1))
            as usize;
        bus.contend(self.regs.hl(), 1, 5, t);
        self.regs.set_bc(self.regs.bc().wrapping_sub(1));

        self.regs.f = (self.regs.f & CF)
            | (if self.regs.bc() != 0 { PF | NF } else { NF })
            | HALF_CARRY_SUB[key]
            | (if diff == 0 { ZF } else { 0 })
            | (diff & SF);
        let marker = if self.regs.f & HF != 0 {
            diff.wrapping_sub(1)
        } else {
            diff
        };
        self.regs.f |= (marker & XF) | (if marker & 0x02 != 0 { YF } else { 0 });

        if repeat && self.regs.f & (PF | ZF) == PF {
            bus.contend(self.regs.hl(), 1, 5, t);
            self.regs.pc = self.regs.pc.wrapping_sub(2);
            self.regs.wz = self.regs.pc.wrapping_add(1);
        } else if dir > 0 {
            self.regs.wz = self.regs.wz.wrapping_add(1);
        } else {
            self.regs.wz = self.regs.wz.wrapping_sub(1);
        }

        self.regs.set_hl(self.regs.hl().wrapping_add_signed(dir));
    }

    /// INI/IND/INIR/INDR: flag addend is C +/- 1; carry/half from its
    /// overflow, parity from `(addend & 7) ^ B`, SZ53 from B.
    fn ini_ind<B: Bus>(&mut self, bus: &mut B, t: &mut TState, repeat: bool, dir: i16) {
        bus.contend(self.regs.ir(), 1, 1, t);
        let value = bus.port_in(self.regs.bc(), t);
        bus.poke_timed(self.regs.hl(), value, t);
        self.regs.wz = self.regs.bc().wrapping_add_signed(dir);
        self.regs.b = self.regs.b.wrapping_sub(1);

        let addend = value
            .wrapping_add(self.regs.c)
            .wrapping_add_signed(dir as i8);
        self.set_block_io_flags(value, addend);

        if repeat && self.regs.b != 0 {
            bus.contend(self.regs.hl(), 1, 5, t);
            self.regs.pc = self.regs.pc.wrapping_sub(2);
        }

        self.regs.set_hl(self.regs.hl().wrapping_add_signed(dir));
    }

    /// OUTI/OUTD/OTIR/OTDR: flag addend is the output byte + L (after HL
    /// moves); repeat contention runs on BC.
    fn outi_outd<B: Bus>(&mut self, bus: &mut B, t: &mut TState, repeat: bool, dir: i16) {
        bus.contend(self.regs.ir(), 1, 1, t);
        let value = bus.peek_timed(self.regs.hl(), t);
        self.regs.b = self.regs.b.wrapping_sub(1);
        self.regs.wz = self.regs.bc().wrapping_add_signed(dir);
        bus.port_out(self.regs.bc(), value, t);
        self.regs.set_hl(self.regs.hl().wrapping_add_signed(dir));

        let addend = value.wrapping_add(self.regs.l);
        self.set_block_io_flags(value, addend);

        if repeat && self.regs.b != 0 {
            bus.contend(self.regs.bc(), 1, 5, t);
            self.regs.pc = self.regs.pc.wrapping_sub(2);
        }
    }

    fn set_block_io_flags(&mut self, io_byte: u8, addend: u8) {
        self.regs.f = (if io_byte & 0x80 != 0 { NF } else { 0 })
            | (if addend < io_byte { HF | CF } else { 0 })
            | (if PARITY[((addend & 0x07) ^ self.regs.b) as usize] != 0 {
                PF
            } else {
                0
            })
            | SZ53[self.regs.b as usize];
    }
}
