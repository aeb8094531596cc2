//! Z80 CPU core: fetch loop, ALU helpers, and interrupt entry.
//!
//! Instruction execution lives in the `execute` (unprefixed + CB), `index`
//! (DD/FD + DDCB/FDCB) and `ed` submodules, split the same way the hardware
//! decodes its prefix pages.

#![allow(clippy::cast_possible_truncation)] // Intentional truncation for low byte extraction.
#![allow(clippy::cast_possible_wrap)] // Intentional i8 casts for displacements.

use crate::bus::{Bus, TState};
use crate::flags::{
    CF, HALF_CARRY_ADD, HALF_CARRY_SUB, HF, NF, OVERFLOW_ADD, OVERFLOW_SUB, PARITY, PF, SF, SZ53,
    SZ53P, XF, YF, ZF,
};
use crate::registers::Registers;

mod ed;
mod execute;
mod index;

pub(crate) use index::IndexReg;

/// Z80 CPU.
///
/// The CPU does not own the bus; one is borrowed for each `step()`. The
/// T-state counter is likewise owned by the machine and threaded through so
/// that instruction timing and machine timing cannot drift apart.
pub struct Z80 {
    /// The register file. Public so snapshot loaders can poke registers
    /// directly after a reset.
    pub regs: Registers,

    /// Set by EI, cleared when the following instruction starts. A pending
    /// maskable interrupt is ignored while this is set, so `EI : RET`
    /// sequences return before the handler runs again.
    pub ei_just_executed: bool,
}

impl Z80 {
    /// Create a new CPU in the post-reset state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            regs: Registers::default(),
            ei_just_executed: false,
        }
    }

    /// Reset the CPU: all registers cleared, interrupts disabled, IM 0.
    pub fn reset(&mut self) {
        self.regs = Registers::default();
        self.ei_just_executed = false;
    }

    /// Current program counter.
    #[must_use]
    pub const fn pc(&self) -> u16 {
        self.regs.pc
    }

    /// Is the CPU in the HALT state?
    #[must_use]
    pub const fn is_halted(&self) -> bool {
        self.regs.halted
    }

    /// Execute one instruction.
    ///
    /// While halted the fetch re-reads the HALT opcode (PC is held on it),
    /// burning 4 T-states per call until an interrupt releases it.
    pub fn step<B: Bus>(&mut self, bus: &mut B, t: &mut TState) {
        self.ei_just_executed = false;
        let opcode = self.fetch_opcode(bus, t);
        self.execute(bus, t, opcode);
    }

    /// Service a maskable interrupt if the CPU will accept one.
    ///
    /// Returns `true` when the interrupt was taken: HALT released, IFF1/IFF2
    /// cleared, PC pushed, and control transferred to 0x0038 (IM 0/1,
    /// 13 T-states) or the IM 2 vector read from `(I << 8) | 0xFF`
    /// (19 T-states).
    pub fn interrupt<B: Bus>(&mut self, bus: &mut B, t: &mut TState) -> bool {
        if !self.regs.iff1 || self.ei_just_executed {
            return false;
        }

        if self.regs.halted {
            self.regs.halted = false;
            self.regs.pc = self.regs.pc.wrapping_add(1);
        }

        self.regs.iff1 = false;
        self.regs.iff2 = false;
        self.inc_r();

        // Interrupt acknowledge M1 plus the two push cycles.
        *t += 7;
        let pc = self.regs.pc;
        self.push(bus, pc, t);

        if self.regs.im == 2 {
            let vector = (u16::from(self.regs.i) << 8) | 0x00FF;
            self.regs.pc = bus.peek16_timed(vector, t);
        } else {
            self.regs.pc = 0x0038;
        }
        self.regs.wz = self.regs.pc;
        true
    }

    /// Service a non-maskable interrupt (11 T-states, jump to 0x0066).
    pub fn nmi<B: Bus>(&mut self, bus: &mut B, t: &mut TState) {
        if self.regs.halted {
            self.regs.halted = false;
            self.regs.pc = self.regs.pc.wrapping_add(1);
        }

        self.regs.iff2 = self.regs.iff1;
        self.regs.iff1 = false;
        self.inc_r();

        *t += 5;
        let pc = self.regs.pc;
        self.push(bus, pc, t);
        self.regs.pc = 0x0066;
    }

    /// Increment R (lower 7 bits only, bit 7 preserved).
    fn inc_r(&mut self) {
        self.regs.r = (self.regs.r & 0x80) | (self.regs.r.wrapping_add(1) & 0x7F);
    }

    /// M1 cycle: bump R, charge 4 contended T-states at PC, read the opcode.
    fn fetch_opcode<B: Bus>(&mut self, bus: &mut B, t: &mut TState) -> u8 {
        self.inc_r();
        bus.contend(self.regs.pc, 4, 1, t);
        let opcode = bus.peek(self.regs.pc);
        self.regs.pc = self.regs.pc.wrapping_add(1);
        opcode
    }

    // === Register selection by opcode field ===

    /// Register by 3-bit encoding. Index 6 is `(HL)` and must be handled by
    /// the caller; it reads as 0 here.
    fn get_r(&self, code: u8) -> u8 {
        match code & 7 {
            0 => self.regs.b,
            1 => self.regs.c,
            2 => self.regs.d,
            3 => self.regs.e,
            4 => self.regs.h,
            5 => self.regs.l,
            6 => 0, // (HL) - handled specially
            _ => self.regs.a,
        }
    }

    /// Set register by 3-bit encoding. Index 6 (`(HL)`) is a no-op here.
    fn set_r(&mut self, code: u8, value: u8) {
        match code & 7 {
            0 => self.regs.b = value,
            1 => self.regs.c = value,
            2 => self.regs.d = value,
            3 => self.regs.e = value,
            4 => self.regs.h = value,
            5 => self.regs.l = value,
            6 => {} // (HL) - handled specially
            _ => self.regs.a = value,
        }
    }

    /// Register pair by 2-bit encoding: BC, DE, HL, SP.
    fn get_rp(&self, code: u8) -> u16 {
        match code & 3 {
            0 => self.regs.bc(),
            1 => self.regs.de(),
            2 => self.regs.hl(),
            _ => self.regs.sp,
        }
    }

    /// Set register pair by 2-bit encoding: BC, DE, HL, SP.
    fn set_rp(&mut self, code: u8, value: u16) {
        match code & 3 {
            0 => self.regs.set_bc(value),
            1 => self.regs.set_de(value),
            2 => self.regs.set_hl(value),
            _ => self.regs.sp = value,
        }
    }

    /// Register pair for PUSH/POP: BC, DE, HL, AF.
    fn get_rp_af(&self, code: u8) -> u16 {
        match code & 3 {
            0 => self.regs.bc(),
            1 => self.regs.de(),
            2 => self.regs.hl(),
            _ => self.regs.af(),
        }
    }

    /// Set register pair for PUSH/POP: BC, DE, HL, AF.
    fn set_rp_af(&mut self, code: u8, value: u16) {
        match code & 3 {
            0 => self.regs.set_bc(value),
            1 => self.regs.set_de(value),
            2 => self.regs.set_hl(value),
            _ => self.regs.set_af(value),
        }
    }

    /// Evaluate condition code: NZ, Z, NC, C, PO, PE, P, M.
    fn condition(&self, code: u8) -> bool {
        match code & 7 {
            0 => self.regs.f & ZF == 0,
            1 => self.regs.f & ZF != 0,
            2 => self.regs.f & CF == 0,
            3 => self.regs.f & CF != 0,
            4 => self.regs.f & PF == 0,
            5 => self.regs.f & PF != 0,
            6 => self.regs.f & SF == 0,
            _ => self.regs.f & SF != 0,
        }
    }

    // === Stack ===

    fn push<B: Bus>(&mut self, bus: &mut B, value: u16, t: &mut TState) {
        self.regs.sp = self.regs.sp.wrapping_sub(1);
        bus.poke_timed(self.regs.sp, (value >> 8) as u8, t);
        self.regs.sp = self.regs.sp.wrapping_sub(1);
        bus.poke_timed(self.regs.sp, value as u8, t);
    }

    fn pop<B: Bus>(&mut self, bus: &mut B, t: &mut TState) -> u16 {
        let value = bus.peek16_timed(self.regs.sp, t);
        self.regs.sp = self.regs.sp.wrapping_add(2);
        value
    }

    // === 8-bit ALU ===
    //
    // Half-carry and overflow come from the 3-bit lookup keyed by bit 3
    // (resp. bit 7) of both operands and the result:
    // `((a & 0x88) >> 3) | (b & 0x88) >> 2) | ((r & 0x88) >> 1)`.

    /// Dispatch the 8-bit ALU operation selected by opcode bits 5-3.
    fn alu_op(&mut self, op: u8, value: u8) {
        match op & 7 {
            0 => self.add_a(value),
            1 => self.adc_a(value),
            2 => self.sub_a(value),
            3 => self.sbc_a(value),
            4 => self.and_a(value),
            5 => self.xor_a(value),
            6 => self.or_a(value),
            _ => self.cp_a(value),
        }
    }

    fn add_a(&mut self, value: u8) {
        let a = self.regs.a;
        let result = u16::from(a) + u16::from(value);
        let key = (((a & 0x88) >> 3) | ((value & 0x88) >> 2) | ((result as u8 & 0x88) >> 1)) as usize;
        self.regs.a = result as u8;
        self.regs.f = (if result & 0x100 != 0 { CF } else { 0 })
            | HALF_CARRY_ADD[key & 0x07]
            | OVERFLOW_ADD[key >> 4]
            | SZ53[self.regs.a as usize];
    }

    fn adc_a(&mut self, value: u8) {
        let a = self.regs.a;
        let result = u16::from(a) + u16::from(value) + u16::from(self.regs.f & CF);
        let key = (((a & 0x88) >> 3) | ((value & 0x88) >> 2) | ((result as u8 & 0x88) >> 1)) as usize;
        self.regs.a = result as u8;
        self.regs.f = (if result & 0x100 != 0 { CF } else { 0 })
            | HALF_CARRY_ADD[key & 0x07]
            | OVERFLOW_ADD[key >> 4]
            | SZ53[self.regs.a as usize];
    }

    fn sub_a(&mut self, value: u8) {
        let a = self.regs.a;
        let result = u16::from(a).wrapping_sub(u16::from(value));
        let key = (((a & 0x88) >> 3) | ((value & 0x88) >> 2) | ((result as u8 & 0x88) >> 1)) as usize;
        self.regs.a = result as u8;
        self.regs.f = (if result & 0x100 != 0 { CF } else { 0 })
            | NF
            | HALF_CARRY_SUB[key & 0x07]
            | OVERFLOW_SUB[key >> 4]
            | SZ53[self.regs.a as usize];
    }

    fn sbc_a(&mut self, value: u8) {
        let a = self.regs.a;
        let result = u16::from(a)
            .wrapping_sub(u16::from(value))
            .wrapping_sub(u16::from(self.regs.f & CF));
        let key = (((a & 0x88) >> 3) | ((value & 0x88) >> 2) | ((result as u8 & 0x88) >> 1)) as usize;
        self.regs.a = result as u8;
        self.regs.f = (if result & 0x100 != 0 { CF } else { 0 })
            | NF
            | HALF_CARRY_SUB[key & 0x07]
            | OVERFLOW_SUB[key >> 4]
            | SZ53[self.regs.a as usize];
    }

    fn and_a(&mut self, value: u8) {
        self.regs.a &= value;
        self.regs.f = HF | SZ53P[self.regs.a as usize];
    }

    fn xor_a(&mut self, value: u8) {
        self.regs.a ^= value;
        self.regs.f = SZ53P[self.regs.a as usize];
    }

    fn or_a(&mut self, value: u8) {
        self.regs.a |= value;
        self.regs.f = SZ53P[self.regs.a as usize];
    }

    /// CP: subtraction flags, but bits 3/5 come from the operand, not the
    /// discarded result.
    fn cp_a(&mut self, value: u8) {
        let a = self.regs.a;
        let result = u16::from(a).wrapping_sub(u16::from(value));
        let key = (((a & 0x88) >> 3) | ((value & 0x88) >> 2) | ((result as u8 & 0x88) >> 1)) as usize;
        self.regs.f = (if result & 0x100 != 0 {
            CF
        } else if result == 0 {
            ZF
        } else {
            0
        }) | NF
            | HALF_CARRY_SUB[key & 0x07]
            | OVERFLOW_SUB[key >> 4]
            | (value & (XF | YF))
            | (result as u8 & SF);
    }

    /// INC r: carry preserved, P/V = (result == 0x80).
    fn inc8(&mut self, value: u8) -> u8 {
        let result = value.wrapping_add(1);
        self.regs.f = (self.regs.f & CF)
            | (if result == 0x80 { PF } else { 0 })
            | (if result & 0x0F == 0 { HF } else { 0 })
            | SZ53[result as usize];
        result
    }

    /// DEC r: carry preserved, P/V = (result == 0x7F), N set.
    fn dec8(&mut self, value: u8) -> u8 {
        self.regs.f = (self.regs.f & CF) | (if value & 0x0F == 0 { HF } else { 0 }) | NF;
        let result = value.wrapping_sub(1);
        self.regs.f |= (if result == 0x7F { PF } else { 0 }) | SZ53[result as usize];
        result
    }

    // === 16-bit ALU ===

    /// ADD rr,rr: S/Z/P preserved, H from bit 11, C from bit 15, bits 3/5
    /// from the high byte of the result.
    fn add16(&mut self, a: u16, b: u16) -> u16 {
        let result = u32::from(a) + u32::from(b);
        let key = (((a & 0x0800) >> 11) | ((b & 0x0800) >> 10) | ((result as u16 & 0x0800) >> 9))
            as usize;
        self.regs.f = (self.regs.f & (PF | ZF | SF))
            | (if result & 0x1_0000 != 0 { CF } else { 0 })
            | ((result >> 8) as u8 & (XF | YF))
            | HALF_CARRY_ADD[key];
        result as u16
    }

    /// ADC HL,rr: all flags set, Z from the full 16-bit result.
    fn adc16_hl(&mut self, value: u16) {
        let hl = self.regs.hl();
        let result = u32::from(hl) + u32::from(value) + u32::from(self.regs.f & CF);
        let key = (((hl & 0x8800) >> 11)
            | ((value & 0x8800) >> 10)
            | ((result as u16 & 0x8800) >> 9)) as usize;
        self.regs.wz = hl.wrapping_add(1);
        self.regs.set_hl(result as u16);
        self.regs.f = (if result & 0x1_0000 != 0 { CF } else { 0 })
            | OVERFLOW_ADD[key >> 4]
            | (self.regs.h & (XF | YF | SF))
            | HALF_CARRY_ADD[key & 0x07]
            | (if self.regs.hl() == 0 { ZF } else { 0 });
    }

    /// SBC HL,rr: all flags set, Z from the full 16-bit result.
    fn sbc16_hl(&mut self, value: u16) {
        let hl = self.regs.hl();
        let result = u32::from(hl)
            .wrapping_sub(u32::from(value))
            .wrapping_sub(u32::from(self.regs.f & CF));
        let key = (((hl & 0x8800) >> 11)
            | ((value & 0x8800) >> 10)
            | ((result as u16 & 0x8800) >> 9)) as usize;
        self.regs.wz = hl.wrapping_add(1);
        self.regs.set_hl(result as u16);
        self.regs.f = (if result & 0x1_0000 != 0 { CF } else { 0 })
            | NF
            | OVERFLOW_SUB[key >> 4]
            | (self.regs.h & (XF | YF | SF))
            | HALF_CARRY_SUB[key & 0x07]
            | (if self.regs.hl() == 0 { ZF } else { 0 });
    }

    // === Rotates and shifts (CB page semantics: SZ53P from result) ===

    /// Dispatch the rotate/shift selected by opcode bits 5-3.
    fn rot_shift(&mut self, op: u8, value: u8) -> u8 {
        match op & 7 {
            0 => self.rlc(value),
            1 => self.rrc(value),
            2 => self.rl(value),
            3 => self.rr(value),
            4 => self.sla(value),
            5 => self.sra(value),
            6 => self.sll(value),
            _ => self.srl(value),
        }
    }

    fn rlc(&mut self, value: u8) -> u8 {
        let result = value.rotate_left(1);
        self.regs.f = (result & CF) | SZ53P[result as usize];
        result
    }

    fn rrc(&mut self, value: u8) -> u8 {
        let carry = value & CF;
        let result = value.rotate_right(1);
        self.regs.f = carry | SZ53P[result as usize];
        result
    }

    fn rl(&mut self, value: u8) -> u8 {
        let result = (value << 1) | (self.regs.f & CF);
        self.regs.f = (value >> 7) | SZ53P[result as usize];
        result
    }

    fn rr(&mut self, value: u8) -> u8 {
        let result = (value >> 1) | (self.regs.f << 7);
        self.regs.f = (value & CF) | SZ53P[result as usize];
        result
    }

    fn sla(&mut self, value: u8) -> u8 {
        let result = value << 1;
        self.regs.f = (value >> 7) | SZ53P[result as usize];
        result
    }

    fn sra(&mut self, value: u8) -> u8 {
        let result = (value & 0x80) | (value >> 1);
        self.regs.f = (value & CF) | SZ53P[result as usize];
        result
    }

    /// SLL (undocumented): shift left, bit 0 forced to 1.
    fn sll(&mut self, value: u8) -> u8 {
        let result = (value << 1) | 0x01;
        self.regs.f = (value >> 7) | SZ53P[result as usize];
        result
    }

    fn srl(&mut self, value: u8) -> u8 {
        let result = value >> 1;
        self.regs.f = (value & CF) | SZ53P[result as usize];
        result
    }

    // === Bit test ===

    /// BIT n,r: Z and P from the complemented bit, H set, N reset, C
    /// preserved, bits 3/5 from the tested value.
    fn bit(&mut self, value: u8, bit: u8) {
        self.regs.f = (self.regs.f & CF) | HF | (value & (XF | YF));
        if value & (1 << bit) == 0 {
            self.regs.f |= PF | ZF;
        }
        if bit == 7 && value & 0x80 != 0 {
            self.regs.f |= SF;
        }
    }

    /// BIT n,(HL) / BIT n,(II+d): bits 3/5 come from MEMPTR high instead of
    /// the operand.
    fn bit_memptr(&mut self, value: u8, bit: u8) {
        self.regs.f = (self.regs.f & CF) | HF | ((self.regs.wz >> 8) as u8 & (XF | YF));
        if value & (1 << bit) == 0 {
            self.regs.f |= PF | ZF;
        }
        if bit == 7 && value & 0x80 != 0 {
            self.regs.f |= SF;
        }
    }

    // === Decimal adjust ===

    fn daa(&mut self) {
        let a = self.regs.a;
        let mut adjust = 0u8;
        let mut carry = self.regs.f & CF != 0;

        if self.regs.f & HF != 0 || a & 0x0F > 0x09 {
            adjust |= 0x06;
        }
        if carry || a > 0x9F || (a > 0x8F && a & 0x0F > 0x09) {
            adjust |= 0x60;
        }
        if a > 0x99 {
            carry = true;
        }

        if self.regs.f & NF != 0 {
            self.sub_a(adjust);
        } else {
            self.add_a(adjust);
        }

        if carry {
            self.regs.f |= CF;
        } else {
            self.regs.f &= !CF;
        }
        if PARITY[self.regs.a as usize] != 0 {
            self.regs.f |= PF;
        } else {
            self.regs.f &= !PF;
        }
    }

    // === Exchanges ===

    fn exx(&mut self) {
        core::mem::swap(&mut self.regs.b, &mut self.regs.b_alt);
        core::mem::swap(&mut self.regs.c, &mut self.regs.c_alt);
        core::mem::swap(&mut self.regs.d, &mut self.regs.d_alt);
        core::mem::swap(&mut self.regs.e, &mut self.regs.e_alt);
        core::mem::swap(&mut self.regs.h, &mut self.regs.h_alt);
        core::mem::swap(&mut self.regs.l, &mut self.regs.l_alt);
    }

    fn ex_af_af(&mut self) {
        core::mem::swap(&mut self.regs.a, &mut self.regs.a_alt);
        core::mem::swap(&mut self.regs.f, &mut self.regs.f_alt);
    }
}

impl Default for Z80 {
    fn default() -> Self {
        Self::new()
    }
}
