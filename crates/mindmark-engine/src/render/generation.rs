use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Hands out render generations; the most recently issued one is current.
#[derive(Debug, Clone, Default)]
pub struct GenerationCounter {
    pending: Arc<AtomicU64>,
}

impl GenerationCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new generation, making every earlier one stale.
    pub fn next(&self) -> Generation {
        let token = self.pending.fetch_add(1, Ordering::SeqCst) + 1;
        Generation {
            token,
            pending: Arc::clone(&self.pending),
        }
    }

    /// Token of the most recently issued generation (0 before any).
    pub fn pending(&self) -> u64 {
        self.pending.load(Ordering::SeqCst)
    }
}

/// One render attempt's ticket. Cheap to clone and check.
#[derive(Debug, Clone)]
pub struct Generation {
    token: u64,
    pending: Arc<AtomicU64>,
}

impl Generation {
    pub fn token(&self) -> u64 {
        self.token
    }

    pub fn is_current(&self) -> bool {
        self.pending.load(Ordering::SeqCst) == self.token
    }

    /// A generation that stays current for as long as nothing else bumps it.
    /// Useful for one-shot callers that have no orchestrator.
    pub fn detached() -> Self {
        GenerationCounter::new().next()
    }
}
