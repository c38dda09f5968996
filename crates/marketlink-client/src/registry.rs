//! Instrument registry (C8): canonicalizes instruments by contract id
//! within a Connection so event routing stays stable across messages.

use std::sync::{Arc, Weak};

use dashmap::DashMap;

use crate::connection::ConnectionInner;
use crate::error::ClientError;
use crate::instrument::Instrument;

pub struct InstrumentRegistry {
    connection: Weak<ConnectionInner>,
    by_contract_id: DashMap<i32, Weak<Instrument>>,
}

impl InstrumentRegistry {
    pub fn new(connection: Weak<ConnectionInner>) -> Self {
        Self {
            connection,
            by_contract_id: DashMap::new(),
        }
    }

    /// Look up the instrument for `contract_id`, creating a fresh one if
    /// none exists yet (or the previous one was dropped).
    pub fn get_or_create(&self, contract_id: i32) -> Arc<Instrument> {
        if let Some(existing) = self
            .by_contract_id
            .get(&contract_id)
            .and_then(|entry| entry.upgrade())
        {
            return existing;
        }

        let connection = self.connection.clone();
        let fresh = Arc::new_cyclic(|weak| Instrument::new(contract_id, connection, weak.clone()));
        self.by_contract_id.insert(contract_id, Arc::downgrade(&fresh));
        fresh
    }

    pub fn get(&self, contract_id: i32) -> Option<Arc<Instrument>> {
        self.by_contract_id.get(&contract_id).and_then(|entry| entry.upgrade())
    }

    /// Move `instrument` from `old_contract_id` to `new_contract_id`,
    /// e.g. after a contract roll assigns it a new id. Fails with
    /// `InvariantViolation` if the new slot is already taken by a
    /// *different* live instrument; assigning to an empty or
    /// already-dead slot is fine.
    pub fn reassign(
        &self,
        old_contract_id: i32,
        new_contract_id: i32,
        instrument: &Arc<Instrument>,
    ) -> Result<(), ClientError> {
        if let Some(existing) = self
            .by_contract_id
            .get(&new_contract_id)
            .and_then(|entry| entry.upgrade())
        {
            if !Arc::ptr_eq(&existing, instrument) {
                return Err(ClientError::InvariantViolation(format!(
                    "contract id {new_contract_id} is already assigned to a different instrument"
                )));
            }
        }

        self.by_contract_id.remove(&old_contract_id);
        instrument.set_contract_id(new_contract_id);
        self.by_contract_id.insert(new_contract_id, Arc::downgrade(instrument));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.by_contract_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_contract_id.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_registry() -> InstrumentRegistry {
        InstrumentRegistry::new(Weak::new())
    }

    #[test]
    fn get_or_create_returns_stable_identity() {
        let registry = test_registry();
        let a = registry.get_or_create(42);
        let b = registry.get_or_create(42);
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn different_contract_ids_get_different_instruments() {
        let registry = test_registry();
        let a = registry.get_or_create(1);
        let b = registry.get_or_create(2);
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn reassign_moves_the_slot() {
        let registry = test_registry();
        let instrument = registry.get_or_create(1);
        registry.reassign(1, 2, &instrument).unwrap();
        assert!(registry.get(1).is_none());
        assert!(Arc::ptr_eq(&registry.get(2).unwrap(), &instrument));
        assert_eq!(instrument.contract_id(), 2);
    }

    #[test]
    fn reassigning_onto_a_taken_slot_is_an_invariant_violation() {
        let registry = test_registry();
        let a = registry.get_or_create(1);
        let _b = registry.get_or_create(2);
        let err = registry.reassign(1, 2, &a).unwrap_err();
        assert!(matches!(err, ClientError::InvariantViolation(_)));
    }

    #[test]
    fn dropped_instrument_slot_is_recreated() {
        let registry = test_registry();
        {
            let _instrument = registry.get_or_create(1);
        }
        // Strong ref dropped; the weak slot is now dead.
        assert!(registry.get(1).is_none());
        let recreated = registry.get_or_create(1);
        assert_eq!(recreated.contract_id(), 1);
    }
}
