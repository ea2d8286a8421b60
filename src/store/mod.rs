//! Storage collaborator boundary.
//!
//! The mapper never talks to a backend directly: states and the repository
//! hand records to a [`Store`] and interpret its answers. Records are keyed by
//! storage field name and carry dumped (storage primitive) values.

pub mod memory;

pub use memory::{MemoryStore, StoreStats};

use crate::core::{KeyTuple, Result, Value};
use crate::model::Model;
use std::collections::BTreeMap;

/// Field name -> dumped value.
pub type Record = BTreeMap<String, Value>;

/// Restricts a read to rows whose `field` holds one of `values`.
#[derive(Debug, Clone, PartialEq)]
pub struct ScopeFilter {
    pub field: String,
    pub values: Vec<Value>,
}

/// A read of selected fields from one storage name.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadRequest {
    pub storage_name: String,
    pub key_fields: Vec<String>,
    /// Dumped key tuples to fetch; `None` reads every row
    pub keys: Option<Vec<KeyTuple>>,
    pub fields: Vec<String>,
    pub scope: Option<ScopeFilter>,
}

impl ReadRequest {
    pub fn new(model: &Model, fields: Vec<String>) -> Self {
        Self {
            storage_name: model.storage_name().to_string(),
            key_fields: model.key_fields(),
            keys: None,
            fields,
            scope: None,
        }
    }

    pub fn keys(mut self, keys: Vec<KeyTuple>) -> Self {
        self.keys = Some(keys);
        self
    }

    pub fn scope(mut self, scope: Option<ScopeFilter>) -> Self {
        self.scope = scope;
        self
    }
}

/// Backend operations the persistence states rely on.
///
/// A `false` return means the backend declined the write without raising;
/// the mapper reports it as a rejection and leaves the resource untouched.
pub trait Store {
    /// Insert `record`; the store fills serial key fields it assigns.
    fn create(&self, model: &Model, record: &mut Record) -> Result<bool>;

    /// Apply `changes` to the row identified by the dumped `key`.
    fn update(&self, model: &Model, key: &KeyTuple, changes: &Record) -> Result<bool>;

    fn delete(&self, model: &Model, key: &KeyTuple) -> Result<bool>;

    fn read(&self, request: &ReadRequest) -> Result<Vec<Record>>;
}
