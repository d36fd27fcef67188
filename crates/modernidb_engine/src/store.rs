//! In-memory state of one object store and its indexes.

use crate::error::{EngineError, EngineResult};
use crate::schema::{IndexSchema, StoreSchema};
use modernidb_codec::{Key, KeyRange};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;

/// Largest key the generator hands out (2^53).
const MAX_GENERATED_KEY: u64 = 1 << 53;

/// Records of a store, keyed by primary key, plus its indexes.
///
/// Transactions hold stores behind `Arc` and clone on first write, so a
/// `StoreState` is never mutated while a reader can see it.
#[derive(Debug, Clone)]
pub(crate) struct StoreState {
    schema: StoreSchema,
    records: BTreeMap<Key, Value>,
    indexes: BTreeMap<String, IndexState>,
    next_key: u64,
}

/// Index key to the primary keys of the records carrying it.
#[derive(Debug, Clone)]
pub(crate) struct IndexState {
    schema: IndexSchema,
    entries: BTreeMap<Key, BTreeSet<Key>>,
}

fn range_bounds(range: Option<&KeyRange>) -> (Bound<&Key>, Bound<&Key>) {
    range.map_or((Bound::Unbounded, Bound::Unbounded), KeyRange::bounds)
}

impl IndexState {
    fn new(schema: IndexSchema) -> Self {
        Self {
            schema,
            entries: BTreeMap::new(),
        }
    }

    pub(crate) fn schema(&self) -> &IndexSchema {
        &self.schema
    }

    pub(crate) fn entries(&self) -> &BTreeMap<Key, BTreeSet<Key>> {
        &self.entries
    }

    /// Index keys the record contributes; empty when it is not indexed.
    fn keys_for(&self, value: &Value) -> Vec<Key> {
        if self.schema.multi_entry {
            self.schema.key_path.extract_multi_entry_keys(value)
        } else {
            self.schema
                .key_path
                .extract_key(value)
                .filter(Key::is_valid)
                .into_iter()
                .collect()
        }
    }

    fn conflicts(&self, index_key: &Key, primary_key: &Key) -> bool {
        self.schema.unique
            && self
                .entries
                .get(index_key)
                .is_some_and(|owners| owners.iter().any(|owner| owner != primary_key))
    }

    fn insert(&mut self, index_key: Key, primary_key: Key) {
        self.entries.entry(index_key).or_default().insert(primary_key);
    }

    fn remove(&mut self, index_key: &Key, primary_key: &Key) {
        if let Some(owners) = self.entries.get_mut(index_key) {
            owners.remove(primary_key);
            if owners.is_empty() {
                self.entries.remove(index_key);
            }
        }
    }

    fn pairs<'a>(
        &'a self,
        range: Option<&'a KeyRange>,
    ) -> impl Iterator<Item = (&'a Key, &'a Key)> + 'a {
        self.entries
            .range(range_bounds(range))
            .flat_map(|(index_key, owners)| owners.iter().map(move |pk| (index_key, pk)))
    }

    pub(crate) fn first_primary_key(&self, range: &KeyRange) -> Option<Key> {
        self.pairs(Some(range)).next().map(|(_, pk)| pk.clone())
    }

    pub(crate) fn primary_keys(&self, range: Option<&KeyRange>, count: Option<u32>) -> Vec<Key> {
        let limit = count.map_or(usize::MAX, |c| c as usize);
        self.pairs(range).take(limit).map(|(_, pk)| pk.clone()).collect()
    }

    pub(crate) fn count(&self, range: Option<&KeyRange>) -> u64 {
        self.entries
            .range(range_bounds(range))
            .map(|(_, owners)| owners.len() as u64)
            .sum()
    }
}

impl StoreState {
    pub(crate) fn new(schema: StoreSchema) -> Self {
        Self {
            schema,
            records: BTreeMap::new(),
            indexes: BTreeMap::new(),
            next_key: 1,
        }
    }

    pub(crate) fn schema(&self) -> &StoreSchema {
        &self.schema
    }

    pub(crate) fn records(&self) -> &BTreeMap<Key, Value> {
        &self.records
    }

    pub(crate) fn index(&self, name: &str) -> EngineResult<&IndexState> {
        self.indexes.get(name).ok_or_else(|| {
            EngineError::not_found(format!(
                "store {:?} has no index named {name:?}",
                self.schema.name
            ))
        })
    }

    pub(crate) fn index_names(&self) -> Vec<String> {
        self.indexes.keys().cloned().collect()
    }

    /// Adds or replaces a record, resolving its key first.
    ///
    /// Returns the final key and the stored value, which differs from the
    /// input when a generated key was injected.
    pub(crate) fn put(
        &mut self,
        mut value: Value,
        key: Option<Key>,
        no_overwrite: bool,
    ) -> EngineResult<(Key, Value)> {
        let key = self.resolve_key(&mut value, key)?;
        self.insert_record(key.clone(), value.clone(), no_overwrite)?;
        Ok((key, value))
    }

    fn resolve_key(&mut self, value: &mut Value, key: Option<Key>) -> EngineResult<Key> {
        match (self.schema.key_path.clone(), key) {
            (Some(_), Some(_)) => Err(EngineError::data(
                "the store uses in-line keys and a key was also provided",
            )),
            (Some(path), None) => match path.evaluate(value) {
                Some(found) => Key::from_value(&found)
                    .filter(Key::is_valid)
                    .ok_or_else(|| EngineError::data(format!("value at {path} is not a valid key"))),
                None if self.schema.auto_increment => {
                    let key = self.generate_key()?;
                    path.inject(value, &key)?;
                    Ok(key)
                }
                None => Err(EngineError::data(format!("record has no key at {path}"))),
            },
            (None, Some(key)) if key.is_valid() => Ok(key),
            (None, Some(key)) => Err(EngineError::data(format!("{key} is not a valid key"))),
            (None, None) if self.schema.auto_increment => self.generate_key(),
            (None, None) => Err(EngineError::data(
                "the store uses out-of-line keys and no key was provided",
            )),
        }
    }

    fn generate_key(&mut self) -> EngineResult<Key> {
        if self.next_key > MAX_GENERATED_KEY {
            return Err(EngineError::constraint(format!(
                "key generator of store {:?} is exhausted",
                self.schema.name
            )));
        }
        let key = Key::Number(self.next_key as f64);
        self.next_key += 1;
        Ok(key)
    }

    fn bump_generator(&mut self, key: &Key) {
        if let (true, Some(n)) = (self.schema.auto_increment, key.as_number()) {
            if n >= self.next_key as f64 {
                self.next_key = if n >= MAX_GENERATED_KEY as f64 {
                    MAX_GENERATED_KEY + 1
                } else {
                    n.floor() as u64 + 1
                };
            }
        }
    }

    /// Writes a record under an already resolved key, maintaining indexes.
    pub(crate) fn insert_record(
        &mut self,
        key: Key,
        value: Value,
        no_overwrite: bool,
    ) -> EngineResult<()> {
        if no_overwrite && self.records.contains_key(&key) {
            return Err(EngineError::constraint(format!(
                "store {:?} already holds key {key}",
                self.schema.name
            )));
        }

        let mut additions = Vec::with_capacity(self.indexes.len());
        for index in self.indexes.values() {
            let index_keys = index.keys_for(&value);
            if let Some(taken) = index_keys.iter().find(|ik| index.conflicts(ik, &key)) {
                return Err(EngineError::constraint(format!(
                    "unique index {:?} already holds {taken}",
                    index.schema.name
                )));
            }
            additions.push(index_keys);
        }

        if let Some(old) = self.records.remove(&key) {
            self.unindex(&key, &old);
        }
        for (index, index_keys) in self.indexes.values_mut().zip(additions) {
            for index_key in index_keys {
                index.insert(index_key, key.clone());
            }
        }
        self.bump_generator(&key);
        self.records.insert(key, value);
        Ok(())
    }

    fn unindex(&mut self, key: &Key, value: &Value) {
        for index in self.indexes.values_mut() {
            for index_key in index.keys_for(value) {
                index.remove(&index_key, key);
            }
        }
    }

    /// Deletes every record in `range`, returning how many were removed.
    pub(crate) fn delete_range(&mut self, range: &KeyRange) -> usize {
        let doomed: Vec<Key> = self.records.range(range.bounds()).map(|(k, _)| k.clone()).collect();
        for key in &doomed {
            if let Some(old) = self.records.remove(key) {
                self.unindex(key, &old);
            }
        }
        doomed.len()
    }

    pub(crate) fn clear(&mut self) {
        self.records.clear();
        for index in self.indexes.values_mut() {
            index.entries.clear();
        }
    }

    /// Adds an index and populates it from existing records.
    pub(crate) fn create_index(&mut self, schema: IndexSchema) -> EngineResult<()> {
        if self.indexes.contains_key(&schema.name) {
            return Err(EngineError::constraint(format!(
                "store {:?} already has an index named {:?}",
                self.schema.name, schema.name
            )));
        }
        let mut index = IndexState::new(schema);
        for (key, value) in &self.records {
            for index_key in index.keys_for(value) {
                if index.conflicts(&index_key, key) {
                    return Err(EngineError::constraint(format!(
                        "existing records share {index_key} in unique index {:?}",
                        index.schema.name
                    )));
                }
                index.insert(index_key, key.clone());
            }
        }
        self.indexes.insert(index.schema.name.clone(), index);
        Ok(())
    }

    pub(crate) fn delete_index(&mut self, name: &str) -> EngineResult<()> {
        self.indexes.remove(name).map(drop).ok_or_else(|| {
            EngineError::not_found(format!(
                "store {:?} has no index named {name:?}",
                self.schema.name
            ))
        })
    }

    pub(crate) fn get(&self, range: &KeyRange) -> Option<&Value> {
        self.records.range(range.bounds()).next().map(|(_, v)| v)
    }

    pub(crate) fn get_key(&self, range: &KeyRange) -> Option<&Key> {
        self.records.range(range.bounds()).next().map(|(k, _)| k)
    }

    pub(crate) fn get_all(&self, range: Option<&KeyRange>, count: Option<u32>) -> Vec<Value> {
        let limit = count.map_or(usize::MAX, |c| c as usize);
        self.records
            .range(range_bounds(range))
            .take(limit)
            .map(|(_, v)| v.clone())
            .collect()
    }

    pub(crate) fn get_all_keys(&self, range: Option<&KeyRange>, count: Option<u32>) -> Vec<Key> {
        let limit = count.map_or(usize::MAX, |c| c as usize);
        self.records
            .range(range_bounds(range))
            .take(limit)
            .map(|(k, _)| k.clone())
            .collect()
    }

    pub(crate) fn count(&self, range: Option<&KeyRange>) -> u64 {
        match range.and_then(KeyRange::as_single_key) {
            Some(key) => u64::from(self.records.contains_key(key)),
            None => self.records.range(range_bounds(range)).count() as u64,
        }
    }
}
