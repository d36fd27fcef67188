//! Copy-on-write view of the stores a transaction works on.

use crate::error::{EngineError, EngineResult};
use crate::journal::JournalOp;
use crate::schema::StoreSchema;
use crate::store::StoreState;
use crate::types::TransactionMode;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Stores as the transaction sees them, plus what it has changed.
///
/// Stores are shared with the committed state until the first write clones
/// them.
#[derive(Debug)]
pub(crate) struct Working {
    pub(crate) mode: TransactionMode,
    pub(crate) stores: BTreeMap<String, Arc<StoreState>>,
    pub(crate) dirty: BTreeSet<String>,
    pub(crate) ops: Vec<JournalOp>,
}

impl Working {
    pub(crate) fn new(mode: TransactionMode, stores: BTreeMap<String, Arc<StoreState>>) -> Self {
        Self {
            mode,
            stores,
            dirty: BTreeSet::new(),
            ops: Vec::new(),
        }
    }

    pub(crate) fn store_names(&self) -> Vec<String> {
        self.stores.keys().cloned().collect()
    }

    pub(crate) fn store(&self, name: &str) -> EngineResult<&StoreState> {
        self.stores
            .get(name)
            .map(|store| &**store)
            .ok_or_else(|| EngineError::invalid_state(format!("store {name:?} has been deleted")))
    }

    pub(crate) fn store_mut(&mut self, name: &str) -> EngineResult<&mut StoreState> {
        if !self.mode.is_writable() {
            return Err(EngineError::read_only(format!(
                "cannot modify {name:?} in a read-only transaction"
            )));
        }
        let store = self
            .stores
            .get_mut(name)
            .ok_or_else(|| EngineError::invalid_state(format!("store {name:?} has been deleted")))?;
        self.dirty.insert(name.to_owned());
        Ok(Arc::make_mut(store))
    }

    pub(crate) fn record(&mut self, op: JournalOp) {
        self.ops.push(op);
    }

    pub(crate) fn create_store(&mut self, schema: StoreSchema) -> EngineResult<()> {
        if self.stores.contains_key(&schema.name) {
            return Err(EngineError::constraint(format!(
                "store {:?} already exists",
                schema.name
            )));
        }
        self.stores
            .insert(schema.name.clone(), Arc::new(StoreState::new(schema.clone())));
        self.dirty.insert(schema.name.clone());
        self.record(JournalOp::CreateStore { schema });
        Ok(())
    }

    pub(crate) fn delete_store(&mut self, name: &str) -> EngineResult<()> {
        if self.stores.remove(name).is_none() {
            return Err(EngineError::not_found(format!("no store named {name:?}")));
        }
        self.dirty.remove(name);
        self.record(JournalOp::DeleteStore {
            name: name.to_owned(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::StoreParams;
    use modernidb_codec::Key;
    use serde_json::json;

    fn schema(name: &str) -> StoreSchema {
        StoreSchema::new(name, StoreParams::new()).unwrap()
    }

    #[test]
    fn first_write_clones_the_shared_store() {
        let committed = Arc::new(StoreState::new(schema("a")));
        let mut working = Working::new(
            TransactionMode::ReadWrite,
            BTreeMap::from([("a".to_owned(), Arc::clone(&committed))]),
        );
        working
            .store_mut("a")
            .unwrap()
            .insert_record(Key::from(1), json!("x"), false)
            .unwrap();

        assert_eq!(committed.count(None), 0);
        assert_eq!(working.store("a").unwrap().count(None), 1);
        assert!(working.dirty.contains("a"));
    }

    #[test]
    fn read_only_refuses_writes() {
        let mut working = Working::new(
            TransactionMode::ReadOnly,
            BTreeMap::from([("a".to_owned(), Arc::new(StoreState::new(schema("a"))))]),
        );
        assert_eq!(working.store_mut("a").unwrap_err().name(), "ReadOnlyError");
    }

    #[test]
    fn store_lifecycle_is_journaled() {
        let mut working = Working::new(TransactionMode::VersionChange, BTreeMap::new());
        working.create_store(schema("a")).unwrap();
        assert_eq!(working.create_store(schema("a")).unwrap_err().name(), "ConstraintError");
        working.delete_store("a").unwrap();
        assert_eq!(working.delete_store("a").unwrap_err().name(), "NotFoundError");
        assert_eq!(working.ops.len(), 2);
        assert!(working.store("a").is_err());
    }
}
