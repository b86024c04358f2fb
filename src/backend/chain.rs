//! Linear dependency chain
//!
//! An execution sequence orders its work through at most one pending
//! completion marker. Each new operation depends on the current marker and
//! replaces it, so the dependency graph is a single path: it can never fork
//! and it never holds more than one outstanding marker.
//!
//! The chain is generic over the marker so its bookkeeping is testable
//! without a device; the sequence instantiates it with `HipEvent`.

/// Zero-or-one pending marker plus link accounting
#[derive(Debug)]
pub struct DependencyChain<E> {
    pending: Option<E>,
    links: u64,
}

impl<E> Default for DependencyChain<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> DependencyChain<E> {
    pub fn new() -> Self {
        DependencyChain {
            pending: None,
            links: 0,
        }
    }

    /// The marker the next operation must wait on, if any
    pub fn pending(&self) -> Option<&E> {
        self.pending.as_ref()
    }

    /// Append `marker` as the new tail, returning the marker it replaces
    pub fn extend(&mut self, marker: E) -> Option<E> {
        self.links += 1;
        self.pending.replace(marker)
    }

    /// Take the pending marker, leaving the chain idle
    pub fn drain(&mut self) -> Option<E> {
        self.pending.take()
    }

    pub fn is_idle(&self) -> bool {
        self.pending.is_none()
    }

    /// Total markers ever appended
    pub fn links(&self) -> u64 {
        self.links
    }
}
