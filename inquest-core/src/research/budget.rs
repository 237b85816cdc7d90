use serde::{Deserialize, Serialize};

/// Monotonic counter with a hard cap.
///
/// Bounds researcher iterations and supervisor planning passes. Once the cap
/// is reached no further unit can start, whatever the reasoning capability
/// asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IterationBudget {
    cap: usize,
    used: usize,
}

impl IterationBudget {
    pub fn new(cap: usize) -> Self {
        Self { cap, used: 0 }
    }

    /// Claim the next unit. Returns false once the cap is reached.
    pub fn try_start(&mut self) -> bool {
        if self.used >= self.cap {
            return false;
        }
        self.used += 1;
        true
    }

    pub fn used(&self) -> usize {
        self.used
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    pub fn remaining(&self) -> usize {
        self.cap - self.used
    }

    pub fn is_exhausted(&self) -> bool {
        self.used >= self.cap
    }
}
