//! Cycle-accurate Z80 CPU interpreter.
//!
//! The CPU is instruction-stepped: `Z80::step()` fetches, decodes, and
//! executes one instruction, threading a T-state counter through every bus
//! access so that memory contention can stretch individual machine cycles.
//! The CPU does not own the bus — a `Bus` implementation is borrowed for the
//! duration of each step, which lets the machine share memory with the ULA
//! without reference cycles.
//!
//! Coverage is the full instruction set including the CB/ED/DD/FD/DDCB/FDCB
//! prefix pages, the undocumented IXH/IXL/IYH/IYL forms, SLL, MEMPTR (WZ)
//! tracking, and the undocumented flag bits 3 and 5.

mod bus;
mod cpu;
mod flags;
mod registers;

pub use bus::{Bus, TState};
pub use cpu::Z80;
pub use flags::{CF, HF, NF, PF, SF, XF, YF, ZF};
pub use registers::Registers;
