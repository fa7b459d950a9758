/// Per-frame record-or-advance decision for module-owned chains

use crate::error::Result;
use crate::gpu::Chain;

/// What happened to a chain this frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// New commands were recorded; the owner emits the chain to its parent
    Recorded,
    /// Nothing changed; the ring was advanced
    Advanced,
}

/// Drives the per-frame chain protocol
pub struct ChainCycle;

impl ChainCycle {
    /// Re-record the chain when `dirty`, otherwise advance its ring
    ///
    /// On a recording error the chain is left as the backend left it and the
    /// error is returned; the caller keeps its dirty state so the next frame
    /// retries.
    pub fn record_or_advance<F>(chain: &mut dyn Chain, dirty: bool, record: F) -> Result<CycleOutcome>
    where
        F: FnOnce(&mut dyn Chain) -> Result<()>,
    {
        if !dirty {
            chain.advance()?;
            return Ok(CycleOutcome::Advanced);
        }

        chain.begin()?;
        record(chain)?;
        chain.end()?;
        Ok(CycleOutcome::Recorded)
    }
}
