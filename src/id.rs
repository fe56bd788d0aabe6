//! Correlation id allocation.
//!
//! Every outbound request and heartbeat carries a correlation id that the
//! peer echoes back in the matching response, letting the connection route
//! inbound frames to the caller that issued them.
//!
//! The counter is shared process-wide, not per-connection: the wire format
//! encodes ids with a bounded integer width, so correctness depends on
//! staying under the ceiling, not on global uniqueness over the process
//! lifetime. Ids wrap back to 1 when the ceiling is reached.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use serde::{Deserialize, Serialize};

// ============================================================================
// Constants
// ============================================================================

/// Reserved ceiling for correlation ids (2^30).
///
/// Imposed by the wire integer width; ids are always in `[1, 2^30)`.
pub const MAX_CORRELATION_ID: u32 = 1 << 30;

// ============================================================================
// CorrelationId
// ============================================================================

/// Integer tag linking one outbound request to its eventual inbound response.
///
/// Always positive and below [`MAX_CORRELATION_ID`]; never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(u32);

impl CorrelationId {
    /// Wraps a raw id decoded from the wire.
    ///
    /// The value is taken as-is; protocol decoders are trusted to hand back
    /// the ids this process issued.
    #[inline]
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw integer value.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// IdAllocator
// ============================================================================

/// Issues correlation ids for outbound requests and heartbeats.
///
/// Connections allocate from [`IdAllocator::global()`] so ids are shared by
/// every connection in the process. The type is constructible on its own so
/// allocation stays testable in isolation.
///
/// # Limitation
///
/// With more than 2^30 requests concurrently pending in one process the
/// wrapped counter could collide with a still-pending id. This mirrors the
/// wire format's constraint and is intentionally not detected.
#[derive(Debug)]
pub struct IdAllocator {
    next: AtomicU32,
}

impl IdAllocator {
    /// Creates an allocator whose first issued id is 1.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            next: AtomicU32::new(0),
        }
    }

    /// Returns the process-wide shared allocator.
    #[must_use]
    pub fn global() -> &'static IdAllocator {
        static GLOBAL: IdAllocator = IdAllocator::new();
        &GLOBAL
    }

    /// Allocates the next correlation id, wrapping to 1 at the ceiling.
    pub fn next(&self) -> CorrelationId {
        let mut current = self.next.load(Ordering::Relaxed);
        loop {
            let candidate = if current + 1 >= MAX_CORRELATION_ID {
                1
            } else {
                current + 1
            };
            match self.next.compare_exchange_weak(
                current,
                candidate,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return CorrelationId(candidate),
                Err(observed) => current = observed,
            }
        }
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    #[test]
    fn test_first_id_is_one() {
        let allocator = IdAllocator::new();
        assert_eq!(allocator.next().get(), 1);
        assert_eq!(allocator.next().get(), 2);
    }

    #[test]
    fn test_wraps_to_one_at_ceiling() {
        let allocator = IdAllocator {
            next: AtomicU32::new(MAX_CORRELATION_ID - 1),
        };
        assert_eq!(allocator.next().get(), 1);
        assert_eq!(allocator.next().get(), 2);
    }

    #[test]
    fn test_ceiling_is_never_issued() {
        let allocator = IdAllocator {
            next: AtomicU32::new(MAX_CORRELATION_ID - 2),
        };
        assert_eq!(allocator.next().get(), MAX_CORRELATION_ID - 1);
        assert_eq!(allocator.next().get(), 1);
    }

    #[test]
    fn test_global_is_shared() {
        let first = IdAllocator::global().next();
        let second = IdAllocator::global().next();
        assert_ne!(first, second);
    }

    #[test]
    fn test_display() {
        assert_eq!(CorrelationId::from_raw(42).to_string(), "42");
    }

    proptest! {
        #[test]
        fn ids_stay_in_wire_range(start in 0u32..MAX_CORRELATION_ID) {
            let allocator = IdAllocator {
                next: AtomicU32::new(start),
            };
            let id = allocator.next();
            prop_assert!(id.get() >= 1);
            prop_assert!(id.get() < MAX_CORRELATION_ID);
        }
    }
}
