/// Lazy resource gate - construct GPU objects the first frame their inputs exist

use crate::error::Result;
use crate::{engine_debug, engine_error};

/// Gate state
///
/// `generation` counts constructions; a chain or pipeline built in generation
/// N belongs to that generation until the gate is invalidated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    /// Never constructed
    Waiting,
    /// Constructed and usable
    Ready { generation: u64 },
    /// Torn down by an external event; re-runs construction when preconditions hold
    Invalidated { generation: u64 },
}

/// Result of one [`ResourceGate::poll`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateStatus {
    /// Construction ran this frame
    Constructed { generation: u64 },
    /// Already constructed
    Ready,
    /// At least one precondition is missing
    Waiting { missing: Vec<String> },
}

impl GateStatus {
    /// Whether the gated resources can be used this frame
    pub fn is_open(&self) -> bool {
        !matches!(self, GateStatus::Waiting { .. })
    }
}

/// Construct-once gate over a set of named preconditions
///
/// # Example
///
/// ```
/// use loom_engine::loom::resource::{ResourceGate, GateStatus};
///
/// let mut gate = ResourceGate::new("blur");
/// let mut built = 0;
/// let status = gate.poll(&[("device", true), ("width", false)], |_| { built += 1; Ok(()) }).unwrap();
/// assert!(!status.is_open());
/// let status = gate.poll(&[("device", true), ("width", true)], |_| { built += 1; Ok(()) }).unwrap();
/// assert_eq!(status, GateStatus::Constructed { generation: 1 });
/// assert_eq!(built, 1);
/// ```
pub struct ResourceGate {
    label: String,
    state: GateState,
    last_missing: Vec<String>,
}

impl ResourceGate {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            state: GateState::Waiting,
            last_missing: Vec::new(),
        }
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, GateState::Ready { .. })
    }

    /// Generation of the current or last construction (0 if never constructed)
    pub fn generation(&self) -> u64 {
        match self.state {
            GateState::Waiting => 0,
            GateState::Ready { generation } | GateState::Invalidated { generation } => generation,
        }
    }

    /// Evaluate preconditions and construct at most once per generation
    ///
    /// A construction error leaves the gate armed and is returned; the next
    /// poll retries.
    pub fn poll<F>(&mut self, checks: &[(&str, bool)], construct: F) -> Result<GateStatus>
    where
        F: FnOnce(u64) -> Result<()>,
    {
        if self.is_ready() {
            return Ok(GateStatus::Ready);
        }

        let missing: Vec<String> = checks
            .iter()
            .filter(|(_, ok)| !ok)
            .map(|(name, _)| name.to_string())
            .collect();
        if !missing.is_empty() {
            if missing != self.last_missing {
                engine_debug!("loom::Gate", "[{}] waiting for {:?}", self.label, missing);
                self.last_missing = missing.clone();
            }
            return Ok(GateStatus::Waiting { missing });
        }

        let generation = self.generation() + 1;
        if let Err(err) = construct(generation) {
            engine_error!("loom::Gate", "[{}] construction failed: {}", self.label, err);
            return Err(err);
        }
        self.last_missing.clear();
        self.state = GateState::Ready { generation };
        engine_debug!("loom::Gate", "[{}] constructed generation {}", self.label, generation);
        Ok(GateStatus::Constructed { generation })
    }

    /// Re-arm the gate; the owner drops its stale objects before the next poll
    pub fn invalidate(&mut self) {
        if let GateState::Ready { generation } = self.state {
            self.state = GateState::Invalidated { generation };
            engine_debug!("loom::Gate", "[{}] invalidated generation {}", self.label, generation);
        }
    }
}

#[cfg(test)]
#[path = "gate_tests.rs"]
mod tests;
