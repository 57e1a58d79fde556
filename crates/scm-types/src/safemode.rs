use serde::{Deserialize, Serialize};

/// §3 `SafeModeStatus`. Monotone in normal operation: once both fields
/// reach `(false, true)` they do not regress within a process lifetime
/// (§4.7, §8 "Safe-mode monotonicity").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafeModeStatus {
    pub in_safe_mode: bool,
    pub pre_check_complete: bool,
}

impl Default for SafeModeStatus {
    fn default() -> Self {
        Self { in_safe_mode: true, pre_check_complete: false }
    }
}

impl SafeModeStatus {
    pub const fn new() -> Self {
        Self { in_safe_mode: true, pre_check_complete: false }
    }

    /// Moves status forward, never backward. Returns `true` if this call
    /// changed anything (used by callers to decide whether to emit a
    /// status-transition event / notify subscribers).
    pub fn advance(&mut self, pre_check_complete: bool, in_safe_mode: bool) -> bool {
        let mut changed = false;
        if pre_check_complete && !self.pre_check_complete {
            self.pre_check_complete = true;
            changed = true;
        }
        if !in_safe_mode && self.in_safe_mode {
            self.in_safe_mode = false;
            changed = true;
        }
        changed
    }
}
