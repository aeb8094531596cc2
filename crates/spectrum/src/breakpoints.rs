//! Execution breakpoints.

use serde::{Deserialize, Serialize};

/// Breakpoint kind: user breakpoints stay until toggled off, temporary ones
/// (installed by step-over) remove themselves when tripped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BreakpointKind {
    User,
    Temporary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Breakpoint {
    pub address: u16,
    pub kind: BreakpointKind,
}

/// The breakpoint set, checked against PC before each instruction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Breakpoints {
    entries: Vec<Breakpoint>,
}

impl Breakpoints {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or remove a user breakpoint at `address`.
    pub fn toggle(&mut self, address: u16) {
        if let Some(pos) = self
            .entries
            .iter()
            .position(|bp| bp.address == address && bp.kind == BreakpointKind::User)
        {
            self.entries.remove(pos);
        } else {
            self.entries.push(Breakpoint {
                address,
                kind: BreakpointKind::User,
            });
        }
    }

    /// Install a temporary breakpoint (no-op if one is already there).
    pub fn add_temporary(&mut self, address: u16) {
        if !self
            .entries
            .iter()
            .any(|bp| bp.address == address && bp.kind == BreakpointKind::Temporary)
        {
            self.entries.push(Breakpoint {
                address,
                kind: BreakpointKind::Temporary,
            });
        }
    }

    /// Is there a user breakpoint at `address`?
    #[must_use]
    pub fn has_user_at(&self, address: u16) -> bool {
        self.entries
            .iter()
            .any(|bp| bp.address == address && bp.kind == BreakpointKind::User)
    }

    /// Check whether execution at `address` should stop. Temporary entries
    /// at the address are consumed by the check.
    pub fn should_break(&mut self, address: u16) -> bool {
        let mut hit = false;
        self.entries.retain(|bp| {
            if bp.address != address {
                return true;
            }
            hit = true;
            bp.kind != BreakpointKind::Temporary
        });
        hit
    }

    /// All current entries, for snapshots and debugger display.
    #[must_use]
    pub fn entries(&self) -> &[Breakpoint] {
        &self.entries
    }

    /// Replace the whole set (snapshot restore).
    pub fn restore(&mut self, entries: Vec<Breakpoint>) {
        self.entries = entries;
    }

    /// Remove every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggle_adds_and_removes() {
        let mut bps = Breakpoints::new();
        bps.toggle(0x8000);
        assert!(bps.has_user_at(0x8000));
        bps.toggle(0x8000);
        assert!(!bps.has_user_at(0x8000));
    }

    #[test]
    fn user_breakpoint_survives_hits() {
        let mut bps = Breakpoints::new();
        bps.toggle(0x8000);
        assert!(bps.should_break(0x8000));
        assert!(bps.should_break(0x8000));
    }

    #[test]
    fn temporary_breakpoint_self_removes() {
        let mut bps = Breakpoints::new();
        bps.add_temporary(0x8003);
        assert!(bps.should_break(0x8003));
        assert!(!bps.should_break(0x8003));
    }

    #[test]
    fn no_hit_at_other_addresses() {
        let mut bps = Breakpoints::new();
        bps.toggle(0x8000);
        assert!(!bps.should_break(0x8001));
    }

    #[test]
    fn temporary_does_not_count_as_user() {
        let mut bps = Breakpoints::new();
        bps.add_temporary(0x8000);
        assert!(!bps.has_user_at(0x8000));
    }
}
