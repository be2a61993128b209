use std::sync::atomic::{AtomicU32, Ordering};
use serde::{Deserialize, Serialize};
use crate::errors::FleetError;

/// The three ports an agent listens on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortTriplet {
    pub api: u16,
    pub viewer: u16,
    pub inventory: u16,
}

/// Hands out port triplets from a monotonic counter.
///
/// Ports are never returned to the pool, even after the agent that held them
/// is removed.
#[derive(Debug)]
pub struct PortAllocator {
    next: AtomicU32,
}

impl PortAllocator {
    pub fn new(base: u16) -> Self {
        Self { next: AtomicU32::new(base as u32) }
    }

    pub fn allocate(&self) -> Result<PortTriplet, FleetError> {
        let start = self.next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |next| {
                (next + 2 <= u16::MAX as u32).then_some(next + 3)
            })
            .map_err(|next| FleetError::PortsExhausted(format!("next port would be {}", next)))?;

        Ok(PortTriplet {
            api: start as u16,
            viewer: (start + 1) as u16,
            inventory: (start + 2) as u16,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_triplets() {
        let ports = PortAllocator::new(4000);
        let a = ports.allocate().unwrap();
        let b = ports.allocate().unwrap();
        assert_eq!(a, PortTriplet { api: 4000, viewer: 4001, inventory: 4002 });
        assert_eq!(b, PortTriplet { api: 4003, viewer: 4004, inventory: 4005 });
    }

    #[test]
    fn test_many_allocations_disjoint_and_increasing() {
        let ports = PortAllocator::new(10_000);
        let mut last = 0u16;
        let mut seen = std::collections::HashSet::new();
        for _ in 0..200 {
            let t = ports.allocate().unwrap();
            for p in [t.api, t.viewer, t.inventory] {
                assert!(p > last || last == 0);
                assert!(seen.insert(p));
                last = p;
            }
        }
    }

    #[test]
    fn test_exhaustion_is_error() {
        let ports = PortAllocator::new(65_532);
        assert!(ports.allocate().is_ok());
        assert!(matches!(ports.allocate(), Err(FleetError::PortsExhausted(_))));
        // Still exhausted; the counter does not wrap.
        assert!(ports.allocate().is_err());
    }
}
