//! Bus interface between the CPU and the rest of the machine.

/// T-state counter type.
///
/// Signed 64-bit so the machine can carry fractional frame overflow forward
/// by subtraction without wrapping concerns.
pub type TState = i64;

/// Timed memory and I/O access.
///
/// Every timed method threads the T-state counter so implementations can
/// insert contention delays at the exact cycle the access happens. `peek` is
/// the untimed read used for opcode fetch data (the fetch's 4 T-states are
/// charged separately via `contend`) and for observation.
pub trait Bus {
    /// Read a byte with no timing effect.
    fn peek(&self, addr: u16) -> u8;

    /// Read a byte, charging 3 possibly-contended T-states first.
    fn peek_timed(&mut self, addr: u16, t: &mut TState) -> u8;

    /// Write a byte, charging 3 possibly-contended T-states first.
    fn poke_timed(&mut self, addr: u16, value: u8, t: &mut TState);

    /// Charge `delay` T-states `count` times, adding the contention penalty
    /// for `addr` before each charge when the address is contended.
    fn contend(&mut self, addr: u16, delay: TState, count: u32, t: &mut TState);

    /// Read from an I/O port, charging the port's contention pattern.
    fn port_in(&mut self, port: u16, t: &mut TState) -> u8;

    /// Write to an I/O port, charging the port's contention pattern.
    fn port_out(&mut self, port: u16, value: u8, t: &mut TState);

    /// Read a little-endian word: low byte first, two timed reads.
    fn peek16_timed(&mut self, addr: u16, t: &mut TState) -> u16 {
        let lo = self.peek_timed(addr, t);
        let hi = self.peek_timed(addr.wrapping_add(1), t);
        u16::from(lo) | (u16::from(hi) << 8)
    }

    /// Write a little-endian word: low byte first, two timed writes.
    fn poke16_timed(&mut self, addr: u16, value: u16, t: &mut TState) {
        self.poke_timed(addr, value as u8, t);
        self.poke_timed(addr.wrapping_add(1), (value >> 8) as u8, t);
    }
}
