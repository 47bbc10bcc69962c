//! Single-flight mutual exclusion.
//!
//! A sync cycle and a phase transition are each guarded by an [`InFlight`]
//! flag. Acquisition never waits: a second caller gets `None` and reports
//! "already in progress". The returned [`InFlightPermit`] clears the flag on
//! drop, so early returns and panics release it too.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// A non-blocking, single-holder flag.
#[derive(Debug, Clone, Default)]
pub struct InFlight {
    active: Arc<AtomicBool>,
}

impl InFlight {
    /// Create a cleared flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to set the flag; `None` if it is already set.
    #[must_use]
    pub fn try_acquire(&self) -> Option<InFlightPermit> {
        self.active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlightPermit {
                active: Arc::clone(&self.active),
            })
    }

    /// Whether the flag is currently held.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

/// Proof of holding an [`InFlight`] flag; releases it on drop.
#[derive(Debug)]
pub struct InFlightPermit {
    active: Arc<AtomicBool>,
}

impl Drop for InFlightPermit {
    fn drop(&mut self) {
        self.active.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_rejected_until_release() {
        let flag = InFlight::new();
        let permit = flag.try_acquire();
        assert!(permit.is_some());
        assert!(flag.is_active());
        assert!(flag.try_acquire().is_none());

        drop(permit);
        assert!(!flag.is_active());
        assert!(flag.try_acquire().is_some());
    }

    #[test]
    fn test_clones_share_state() {
        let flag = InFlight::new();
        let other = flag.clone();
        let _permit = flag.try_acquire();
        assert!(other.try_acquire().is_none());
    }

    #[test]
    #[allow(clippy::panic)]
    fn test_released_on_panic() {
        let flag = InFlight::new();
        let inner = flag.clone();
        let result = std::panic::catch_unwind(move || {
            let _permit = inner.try_acquire();
            panic!("boom");
        });
        assert!(result.is_err());
        assert!(!flag.is_active());
    }
}
