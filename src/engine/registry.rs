//! Order id registry - local id allocation and local <-> system id binding

use parking_lot::Mutex;
use std::collections::HashMap;

use crate::core::error::ProtocolAnomaly;
use crate::core::types::{LocalId, SystemId};

#[derive(Debug, Default)]
struct Inner {
    last: u64,
    local_to_system: HashMap<LocalId, SystemId>,
    system_to_local: HashMap<SystemId, LocalId>,
}

/// Shared between the submitting caller and the callback thread.
#[derive(Debug, Default)]
pub struct OrderIdRegistry {
    inner: Mutex<Inner>,
}

impl OrderIdRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ids start after `last`; use a non-zero seed to stay clear of an earlier session.
    pub fn with_seed(last: u64) -> Self {
        Self {
            inner: Mutex::new(Inner {
                last,
                ..Default::default()
            }),
        }
    }

    /// Strictly increasing, never reused.
    pub fn allocate_local_id(&self) -> LocalId {
        let mut inner = self.inner.lock();
        inner.last += 1;
        LocalId::new(inner.last)
    }

    /// Keep future allocations above an id the venue reported but this session did not issue.
    pub fn observe(&self, local_id: LocalId) {
        let mut inner = self.inner.lock();
        if local_id.value() > inner.last {
            inner.last = local_id.value();
        }
    }

    /// Idempotent for an identical pair; any conflicting pair is rejected and nothing changes.
    pub fn bind(&self, local_id: LocalId, system_id: SystemId) -> Result<(), ProtocolAnomaly> {
        let mut inner = self.inner.lock();

        if let Some(existing) = inner.local_to_system.get(&local_id) {
            if *existing == system_id {
                return Ok(());
            }
            return Err(ProtocolAnomaly::DuplicateBinding {
                local_id,
                existing: existing.clone(),
                attempted: system_id,
            });
        }
        if let Some(existing) = inner.system_to_local.get(&system_id) {
            return Err(ProtocolAnomaly::SystemIdReused {
                system_id,
                existing: *existing,
                attempted: local_id,
            });
        }

        inner.system_to_local.insert(system_id.clone(), local_id);
        inner.local_to_system.insert(local_id, system_id);
        Ok(())
    }

    pub fn lookup_system_id(&self, local_id: LocalId) -> Option<SystemId> {
        self.inner.lock().local_to_system.get(&local_id).cloned()
    }

    pub fn lookup_local_id(&self, system_id: &SystemId) -> Option<LocalId> {
        self.inner.lock().system_to_local.get(system_id).copied()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().local_to_system.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn sys(s: &str) -> SystemId {
        SystemId::parse(s).unwrap()
    }

    #[test]
    fn test_allocate_is_strictly_increasing() {
        let registry = OrderIdRegistry::new();
        let ids: Vec<LocalId> = (0..100).map(|_| registry.allocate_local_id()).collect();
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(ids[0], LocalId::new(1));
    }

    #[test]
    fn test_allocate_from_many_threads_is_unique() {
        let registry = Arc::new(OrderIdRegistry::with_seed(1000));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || (0..250).map(|_| registry.allocate_local_id()).collect::<Vec<_>>())
            })
            .collect();
        let mut all: Vec<LocalId> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
        all.sort();
        all.dedup();
        assert_eq!(all.len(), 1000);
        assert_eq!(all[0], LocalId::new(1001));
    }

    #[test]
    fn test_bind_is_idempotent() {
        let registry = OrderIdRegistry::new();
        let id = registry.allocate_local_id();
        assert!(registry.bind(id, sys("S1")).is_ok());
        assert!(registry.bind(id, sys("S1")).is_ok());
        assert_eq!(registry.lookup_system_id(id), Some(sys("S1")));
        assert_eq!(registry.lookup_local_id(&sys("S1")), Some(id));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_conflicting_bind_is_an_anomaly() {
        let registry = OrderIdRegistry::new();
        let a = registry.allocate_local_id();
        let b = registry.allocate_local_id();
        registry.bind(a, sys("S1")).unwrap();

        let err = registry.bind(a, sys("S2")).unwrap_err();
        assert!(matches!(err, ProtocolAnomaly::DuplicateBinding { .. }));
        assert_eq!(registry.lookup_system_id(a), Some(sys("S1")));
        assert_eq!(registry.lookup_local_id(&sys("S2")), None);

        let err = registry.bind(b, sys("S1")).unwrap_err();
        assert!(matches!(err, ProtocolAnomaly::SystemIdReused { .. }));
        assert_eq!(registry.lookup_system_id(b), None);
    }

    #[test]
    fn test_observe_moves_allocation_past_foreign_ids() {
        let registry = OrderIdRegistry::new();
        registry.observe(LocalId::new(41));
        registry.observe(LocalId::new(7));
        assert_eq!(registry.allocate_local_id(), LocalId::new(42));
    }
}
