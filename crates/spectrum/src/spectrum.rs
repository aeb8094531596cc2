//! The 48K machine: CPU + memory + ULA + tape, driven a frame at a time.
//!
//! # Frame loop
//!
//! `update(mode)` loops `Z80::step()` until the frame's 69,888 T-states are
//! consumed, servicing the frame-start interrupt, advancing the tape by each
//! instruction's T-state delta, and checking breakpoints before every
//! instruction. On frame completion the T-state counter is reduced by the
//! frame length (not zeroed) so fractional overflow carries into the next
//! frame, the remaining raster is painted, and the beeper renders its
//! samples.
//!
//! The CPU borrows memory and I/O through [`SpectrumBus`], a view struct
//! assembled per step - nothing here is shared or re-entrant.

#![allow(clippy::cast_possible_truncation)]

use zx_z80::{Bus, TState, Z80};

use crate::audio::Beeper;
use crate::breakpoints::Breakpoints;
use crate::config::SpectrumConfig;
use crate::io::{io_contend, IoPorts};
use crate::memory::Memory;
use crate::snapshot::{SnapshotError, SnapshotState};
use crate::tape::Tape;
use crate::video::Ula;

/// T-states per frame.
pub const FRAME_TSTATES: TState = crate::memory::FRAME_TSTATES;

/// The ULA holds INT low for this many T-states at the start of a frame; an
/// interrupt request not accepted within the window is dropped.
const INT_ACTIVE_TSTATES: TState = 32;

/// How the next `update` call should run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Don't run any instructions.
    Stopped,
    /// Run a full frame (or until a breakpoint hits).
    Normal,
    /// Execute exactly one instruction, following CALLs.
    StepIn,
    /// Execute one instruction, running CALL-class instructions through to
    /// the following address.
    StepOver,
}

/// What an `update` call produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateStatus {
    /// A frame boundary was crossed; the frame buffer and audio backlog are
    /// ready for the host.
    pub frame_complete: bool,
    /// A breakpoint tripped; the host should drop to `Stopped`.
    pub breakpoint_hit: bool,
}

/// The per-step bus view the CPU executes against.
struct SpectrumBus<'a> {
    memory: &'a mut Memory,
    ports: &'a mut IoPorts,
    ula: &'a mut Ula,
    beeper: &'a mut Beeper,
}

impl Bus for SpectrumBus<'_> {
    fn peek(&self, addr: u16) -> u8 {
        self.memory.peek(addr)
    }

    fn peek_timed(&mut self, addr: u16, t: &mut TState) -> u8 {
        self.memory.peek_timed(addr, t)
    }

    fn poke_timed(&mut self, addr: u16, value: u8, t: &mut TState) {
        self.memory.poke_timed(addr, value, t);
    }

    fn contend(&mut self, addr: u16, delay: TState, count: u32, t: &mut TState) {
        self.memory.contend(addr, delay, count, t);
    }

    fn port_in(&mut self, port: u16, t: &mut TState) -> u8 {
        io_contend(self.memory, port, t);
        self.ports.read(port)
    }

    fn port_out(&mut self, port: u16, value: u8, t: &mut TState) {
        io_contend(self.memory, port, t);
        if IoPorts::is_ula_port(port) {
            // Paint with the old border before the latch changes.
            if value & 0x07 != self.ports.border {
                self.ula.draw_up_to(*t, self.memory, self.ports.border);
            }
            self.ports.write_ula(value);
            self.beeper.set_speaker(self.ports.speaker, *t);
        }
    }
}

/// A complete 48K Spectrum core.
pub struct Spectrum {
    z80: Z80,
    memory: Memory,
    ports: IoPorts,
    ula: Ula,
    beeper: Beeper,
    tape: Option<Box<dyn Tape>>,
    breakpoints: Breakpoints,
    /// T-state within the current frame.
    t: TState,
    /// A frame-boundary interrupt is waiting to be serviced.
    int_pending: bool,
}

impl Spectrum {
    /// Create a machine with the given ROM image loaded at $0000.
    #[must_use]
    pub fn new(config: &SpectrumConfig) -> Self {
        let mut memory = Memory::new();
        memory.load(0x0000, &config.rom);

        Self {
            z80: Z80::new(),
            memory,
            ports: IoPorts::new(config.kempston),
            ula: Ula::new(),
            beeper: Beeper::new(),
            tape: None,
            breakpoints: Breakpoints::new(),
            t: 0,
            int_pending: false,
        }
    }

    /// Run according to `mode`: up to one frame in `Normal`, one instruction
    /// in the stepping modes, nothing when `Stopped`.
    pub fn update(&mut self, mode: RunMode) -> UpdateStatus {
        match mode {
            RunMode::Stopped => UpdateStatus::default(),
            RunMode::Normal => self.run_frame(),
            RunMode::StepIn => self.step_one(),
            RunMode::StepOver => self.step_over(),
        }
    }

    /// Run until the frame completes or a breakpoint trips.
    fn run_frame(&mut self) -> UpdateStatus {
        let mut status = UpdateStatus::default();
        loop {
            if self.breakpoints.should_break(self.z80.pc()) {
                log::debug!("breakpoint hit at {:#06x}", self.z80.pc());
                status.breakpoint_hit = true;
                break;
            }
            self.step_instruction();
            if self.t >= FRAME_TSTATES {
                self.complete_frame();
                status.frame_complete = true;
                break;
            }
        }
        status
    }

    /// Execute exactly one instruction, then stop.
    fn step_one(&mut self) -> UpdateStatus {
        let mut status = UpdateStatus::default();
        self.step_instruction();
        if self.t >= FRAME_TSTATES {
            self.complete_frame();
            status.frame_complete = true;
        }
        status
    }

    /// Step over: run CALL-class instructions to the address that follows
    /// them via a temporary breakpoint; everything else steps in.
    fn step_over(&mut self) -> UpdateStatus {
        match self.step_over_target() {
            Some(return_addr) => {
                self.breakpoints.add_temporary(return_addr);
                // Get off the current instruction first, or the loop would
                // re-check PC before moving.
                let mut status = self.step_one();
                if self.z80.pc() == return_addr {
                    // Not taken (or a single-iteration block op): consume
                    // the temporary entry, there is nothing to run through.
                    self.breakpoints.should_break(return_addr);
                    return status;
                }
                if status.frame_complete {
                    // The temporary breakpoint stays armed; it trips on a
                    // later Normal frame when the call returns.
                    return status;
                }
                let rest = self.run_frame();
                status.frame_complete |= rest.frame_complete;
                status.breakpoint_hit |= rest.breakpoint_hit;
                status
            }
            None => self.step_one(),
        }
    }

    /// Service the pending frame interrupt, then run one instruction and
    /// advance the tape by its T-state delta.
    fn step_instruction(&mut self) {
        if self.int_pending {
            if self.t >= INT_ACTIVE_TSTATES {
                self.int_pending = false;
            } else {
                let mut bus = SpectrumBus {
                    memory: &mut self.memory,
                    ports: &mut self.ports,
                    ula: &mut self.ula,
                    beeper: &mut self.beeper,
                };
                if self.z80.interrupt(&mut bus, &mut self.t) {
                    self.int_pending = false;
                }
            }
        }

        let before = self.t;
        let mut bus = SpectrumBus {
            memory: &mut self.memory,
            ports: &mut self.ports,
            ula: &mut self.ula,
            beeper: &mut self.beeper,
        };
        self.z80.step(&mut bus, &mut self.t);

        self.advance_tape(self.t - before);
    }

    fn advance_tape(&mut self, dt: TState) {
        let Some(tape) = self.tape.as_mut() else {
            return;
        };
        if tape.stopped() {
            return;
        }
        tape.advance(dt);
        let ear = tape.ear();
        if ear != self.ports.ear {
            self.ports.ear = ear;
            self.beeper.set_ear(ear != 0, self.t);
        }
    }

    /// Frame boundary: paint the rest of the raster, render audio, raise the
    /// interrupt, and carry the T-state overflow into the next frame.
    fn complete_frame(&mut self) {
        self.ula.draw_up_to(FRAME_TSTATES, &self.memory, self.ports.border);
        self.beeper.end_frame();
        self.ula.start_frame();
        self.t -= FRAME_TSTATES;
        self.int_pending = true;
        log::trace!("frame {} complete, overflow {}", self.ula.frames(), self.t);
    }

    /// Classify the instruction at PC for step-over: anything with a fixed
    /// return address immediately after it (CALL, CALL cc, RST, DJNZ, and
    /// the repeating block instructions).
    fn step_over_target(&self) -> Option<u16> {
        let pc = self.z80.pc();
        let opcode = self.memory.peek(pc);
        match opcode {
            0xCD => Some(pc.wrapping_add(3)),                      // CALL nn
            0x10 => Some(pc.wrapping_add(2)),                      // DJNZ d
            _ if opcode & 0xC7 == 0xC4 => Some(pc.wrapping_add(3)), // CALL cc,nn
            _ if opcode & 0xC7 == 0xC7 => Some(pc.wrapping_add(1)), // RST
            0xED => {
                let sub = self.memory.peek(pc.wrapping_add(1));
                // LDIR/CPIR/INIR/OTIR and the decrementing forms.
                if sub & 0xF4 == 0xB0 {
                    Some(pc.wrapping_add(2))
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// Reset the machine. A hard reset also clears RAM and drops
    /// breakpoints; a soft reset preserves both (snapshot loaders reset soft
    /// and then materialise state).
    pub fn reset(&mut self, hard: bool) {
        log::debug!("{} reset", if hard { "hard" } else { "soft" });
        self.z80.reset();
        self.t = 0;
        self.int_pending = false;
        self.ports = IoPorts::new(self.ports.kempston_enabled);
        self.ula.reset();
        self.beeper.reset();
        if hard {
            self.memory.clear_ram();
            self.breakpoints.clear();
        }
    }

    // === Host-facing surface ===

    /// The RGBA frame buffer (see [`crate::FB_WIDTH`]/[`crate::FB_HEIGHT`]).
    #[must_use]
    pub fn frame_buffer(&self) -> &[u32] {
        self.ula.frame_buffer()
    }

    /// Current border colour (0-7).
    #[must_use]
    pub fn border(&self) -> u8 {
        self.ports.border
    }

    /// Drain the rendered audio samples for the completed frame(s).
    #[must_use]
    pub fn take_audio_frame(&mut self) -> Vec<f32> {
        self.beeper.take_samples()
    }

    /// Current T-state within the frame.
    #[must_use]
    pub const fn t_state(&self) -> TState {
        self.t
    }

    /// Replace the keyboard matrix (8 bytes, active low), pushed by the
    /// host before each frame.
    pub fn set_keyboard_rows(&mut self, rows: [u8; 8]) {
        self.ports.keyboard.set_rows(rows);
    }

    /// Press or release a single key.
    pub fn set_key(&mut self, key: crate::Key, down: bool) {
        self.ports.keyboard.set_key(key, down);
    }

    /// Kempston joystick byte (bits: right, left, down, up, fire).
    pub fn set_kempston(&mut self, state: u8) {
        self.ports.kempston = state;
    }

    /// Mount a tape. It will be advanced while not stopped.
    pub fn set_tape(&mut self, tape: Box<dyn Tape>) {
        self.tape = Some(tape);
    }

    /// Unmount the tape and drop the EAR line.
    pub fn eject_tape(&mut self) {
        self.tape = None;
        self.ports.ear = 0;
    }

    /// Add or remove a user breakpoint.
    pub fn toggle_breakpoint(&mut self, address: u16) {
        self.breakpoints.toggle(address);
    }

    /// Install a temporary (self-removing) breakpoint.
    pub fn add_temporary_breakpoint(&mut self, address: u16) {
        self.breakpoints.add_temporary(address);
    }

    /// Is there a user breakpoint at `address`?
    #[must_use]
    pub fn has_user_breakpoint_at(&self, address: u16) -> bool {
        self.breakpoints.has_user_at(address)
    }

    /// The CPU, for register inspection.
    #[must_use]
    pub fn cpu(&self) -> &Z80 {
        &self.z80
    }

    /// Mutable CPU access, for snapshot materialisation and tests.
    pub fn cpu_mut(&mut self) -> &mut Z80 {
        &mut self.z80
    }

    /// The memory bank.
    #[must_use]
    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    /// Mutable memory access (bulk loads, ROM write gating).
    pub fn memory_mut(&mut self) -> &mut Memory {
        &mut self.memory
    }

    /// Set the T-state within the frame (snapshot materialisation).
    pub fn set_t_state(&mut self, t: TState) {
        self.t = t;
    }

    // === Snapshots ===

    /// Capture the complete observable machine state.
    #[must_use]
    pub fn capture_snapshot(&self) -> SnapshotState {
        SnapshotState {
            registers: self.z80.regs,
            ei_just_executed: self.z80.ei_just_executed,
            ram: self.memory.ram().to_vec(),
            t_state: self.t,
            border: self.ports.border,
            breakpoints: self.breakpoints.entries().to_vec(),
        }
    }

    /// Materialise a snapshot.
    ///
    /// The state is validated first; on error the machine is untouched.
    ///
    /// # Errors
    ///
    /// Returns a [`SnapshotError`] describing the first inconsistency.
    pub fn apply_snapshot(&mut self, state: &SnapshotState) -> Result<(), SnapshotError> {
        state.validate()?;
        log::debug!(
            "applying snapshot: pc={:#06x} t={}",
            state.registers.pc,
            state.t_state
        );

        self.reset(false);
        self.z80.regs = state.registers;
        self.z80.ei_just_executed = state.ei_just_executed;
        self.memory.load(0x4000, &state.ram);
        self.t = state.t_state;
        self.ports.border = state.border;
        self.breakpoints.restore(state.breakpoints.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_spectrum() -> Spectrum {
        // ROM of NOPs: the CPU just sleds through address space.
        Spectrum::new(&SpectrumConfig {
            rom: vec![0u8; 0x4000],
            kempston: true,
        })
    }

    #[test]
    fn frame_runs_to_the_boundary() {
        let mut spec = make_spectrum();
        let status = spec.update(RunMode::Normal);
        assert!(status.frame_complete);
        assert!(!status.breakpoint_hit);
        // Overflow carried forward, not zeroed: 69,888 is not a multiple of
        // the NOP sled's instruction lengths, so a few T-states remain.
        assert!(spec.t_state() >= 0 && spec.t_state() < 23);
    }

    #[test]
    fn stopped_mode_is_inert() {
        let mut spec = make_spectrum();
        let pc = spec.cpu().pc();
        let status = spec.update(RunMode::Stopped);
        assert_eq!(status, UpdateStatus::default());
        assert_eq!(spec.cpu().pc(), pc);
        assert_eq!(spec.t_state(), 0);
    }

    #[test]
    fn step_in_executes_one_instruction() {
        let mut spec = make_spectrum();
        spec.memory_mut().load(0x8000, &[0x3E, 0x42]); // LD A,0x42
        spec.cpu_mut().regs.pc = 0x8000;

        let status = spec.update(RunMode::StepIn);
        assert!(!status.frame_complete);
        assert_eq!(spec.cpu().regs.a, 0x42);
        assert_eq!(spec.cpu().pc(), 0x8002);
        assert_eq!(spec.t_state(), 7);
    }

    #[test]
    fn breakpoint_stops_the_frame() {
        let mut spec = make_spectrum();
        spec.toggle_breakpoint(0x0010);
        let status = spec.update(RunMode::Normal);
        assert!(status.breakpoint_hit);
        assert!(!status.frame_complete);
        assert_eq!(spec.cpu().pc(), 0x0010);
    }

    #[test]
    fn step_over_runs_call_to_completion() {
        let mut spec = make_spectrum();
        spec.memory_mut().load(
            0x8000,
            &[
                0xCD, 0x10, 0x90, // CALL 0x9010
                0x3E, 0x01, // LD A,1
            ],
        );
        spec.memory_mut().load(
            0x9010,
            &[
                0x3E, 0x42, // LD A,0x42
                0xC9, // RET
            ],
        );
        spec.cpu_mut().regs.pc = 0x8000;
        spec.cpu_mut().regs.sp = 0xFF00;

        let status = spec.update(RunMode::StepOver);
        assert!(status.breakpoint_hit);
        assert_eq!(spec.cpu().pc(), 0x8003, "stopped at the return address");
        assert_eq!(spec.cpu().regs.a, 0x42, "subroutine ran");
        // The temporary breakpoint consumed itself.
        assert!(!spec.has_user_breakpoint_at(0x8003));
        let again = spec.update(RunMode::Normal);
        assert!(!again.breakpoint_hit);
    }

    #[test]
    fn step_over_plain_instruction_steps_in() {
        let mut spec = make_spectrum();
        spec.memory_mut().load(0x8000, &[0x3E, 0x42]);
        spec.cpu_mut().regs.pc = 0x8000;

        spec.update(RunMode::StepOver);
        assert_eq!(spec.cpu().pc(), 0x8002);
    }

    #[test]
    fn out_fe_latches_border() {
        let mut spec = make_spectrum();
        spec.memory_mut().load(
            0x8000,
            &[
                0x3E, 0x02, // LD A,2
                0xD3, 0xFE, // OUT (0xFE),A
            ],
        );
        spec.cpu_mut().regs.pc = 0x8000;
        spec.update(RunMode::StepIn);
        spec.update(RunMode::StepIn);
        assert_eq!(spec.border(), 2);
    }

    #[test]
    fn hard_reset_clears_ram_soft_keeps_it() {
        let mut spec = make_spectrum();
        spec.memory_mut().load(0x8000, &[0xAB]);
        spec.toggle_breakpoint(0x1234);

        spec.reset(false);
        assert_eq!(spec.memory().peek(0x8000), 0xAB);
        assert!(spec.has_user_breakpoint_at(0x1234));

        spec.reset(true);
        assert_eq!(spec.memory().peek(0x8000), 0x00);
        assert!(!spec.has_user_breakpoint_at(0x1234));
    }

    #[test]
    fn audio_backlog_appears_after_frame() {
        let mut spec = make_spectrum();
        spec.update(RunMode::Normal);
        let samples = spec.take_audio_frame();
        assert_eq!(samples.len(), crate::SAMPLES_PER_FRAME);
        assert!(spec.take_audio_frame().is_empty());
    }
}
