use super::{ReadRequest, Record, Store};
use crate::core::{KeyTuple, MapperError, Result, Value};
use crate::model::Model;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;

#[derive(Debug, Default)]
struct Table {
    rows: Vec<Record>,
    next_serial: i64,
}

impl Table {
    fn position(&self, key_fields: &[String], key: &KeyTuple) -> Option<usize> {
        self.rows
            .iter()
            .position(|row| row_matches(row, key_fields, key.values()))
    }
}

fn row_matches(row: &Record, key_fields: &[String], key: &[Value]) -> bool {
    key_fields.len() == key.len()
        && key_fields
            .iter()
            .zip(key)
            .all(|(field, value)| row.get(field).unwrap_or(&Value::Null) == value)
}

fn row_key(row: &Record, key_fields: &[String]) -> KeyTuple {
    KeyTuple::new(
        key_fields
            .iter()
            .map(|f| row.get(f).cloned().unwrap_or(Value::Null))
            .collect(),
    )
}

/// Operation counters, for asserting how often the backend was reached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub creates: usize,
    pub updates: usize,
    pub deletes: usize,
    pub reads: usize,
}

/// In-memory reference store
///
/// Tables are created on first write, keyed by storage name. Serial key
/// fields are allocated per table starting at 1.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RefCell<HashMap<String, Table>>,
    stats: Cell<StoreStats>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a row directly, bypassing the mapper.
    pub fn insert_row(&self, model: &Model, row: Record) {
        let mut tables = self.tables.borrow_mut();
        let table = tables.entry(model.storage_name().to_string()).or_default();
        if let Some(Value::Integer(id)) = model.serial().and_then(|s| row.get(s.field())) {
            table.next_serial = table.next_serial.max(*id);
        }
        table.rows.push(row);
    }

    /// Snapshot of every row stored under `storage_name`.
    pub fn rows(&self, storage_name: &str) -> Vec<Record> {
        self.tables
            .borrow()
            .get(storage_name)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    pub fn row_count(&self, storage_name: &str) -> usize {
        self.tables
            .borrow()
            .get(storage_name)
            .map_or(0, |t| t.rows.len())
    }

    pub fn stats(&self) -> StoreStats {
        self.stats.get()
    }

    pub fn reset_stats(&self) {
        self.stats.set(StoreStats::default());
    }

    fn bump(&self, update: impl FnOnce(&mut StoreStats)) {
        let mut stats = self.stats.get();
        update(&mut stats);
        self.stats.set(stats);
    }
}

impl Store for MemoryStore {
    fn create(&self, model: &Model, record: &mut Record) -> Result<bool> {
        self.bump(|s| s.creates += 1);
        let mut tables = self.tables.borrow_mut();
        let table = tables.entry(model.storage_name().to_string()).or_default();

        if let Some(serial) = model.serial() {
            match record.get(serial.field()) {
                None | Some(Value::Null) => {
                    table.next_serial += 1;
                    record.insert(serial.field().to_string(), Value::Integer(table.next_serial));
                }
                Some(Value::Integer(assigned)) => {
                    table.next_serial = table.next_serial.max(*assigned);
                }
                Some(_) => {}
            }
        }

        let key_fields = model.key_fields();
        let key = row_key(record, &key_fields);
        if table.position(&key_fields, &key).is_some() {
            return Err(MapperError::Store(format!(
                "duplicate key {} in '{}'",
                key,
                model.storage_name()
            )));
        }

        table.rows.push(record.clone());
        Ok(true)
    }

    fn update(&self, model: &Model, key: &KeyTuple, changes: &Record) -> Result<bool> {
        self.bump(|s| s.updates += 1);
        let mut tables = self.tables.borrow_mut();
        let Some(table) = tables.get_mut(model.storage_name()) else {
            return Ok(false);
        };
        let key_fields = model.key_fields();
        let Some(index) = table.position(&key_fields, key) else {
            return Ok(false);
        };

        let mut row = table.rows[index].clone();
        row.extend(changes.iter().map(|(f, v)| (f.clone(), v.clone())));
        let new_key = row_key(&row, &key_fields);
        if &new_key != key && table.position(&key_fields, &new_key).is_some() {
            return Err(MapperError::Store(format!(
                "duplicate key {} in '{}'",
                new_key,
                model.storage_name()
            )));
        }
        table.rows[index] = row;
        Ok(true)
    }

    fn delete(&self, model: &Model, key: &KeyTuple) -> Result<bool> {
        self.bump(|s| s.deletes += 1);
        let mut tables = self.tables.borrow_mut();
        let Some(table) = tables.get_mut(model.storage_name()) else {
            return Ok(false);
        };
        match table.position(&model.key_fields(), key) {
            Some(index) => {
                table.rows.remove(index);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn read(&self, request: &ReadRequest) -> Result<Vec<Record>> {
        self.bump(|s| s.reads += 1);
        let tables = self.tables.borrow();
        let Some(table) = tables.get(&request.storage_name) else {
            return Ok(Vec::new());
        };

        let records = table
            .rows
            .iter()
            .filter(|row| match &request.keys {
                Some(keys) => keys
                    .iter()
                    .any(|key| row_matches(row, &request.key_fields, key.values())),
                None => true,
            })
            .filter(|row| match &request.scope {
                Some(scope) => scope
                    .values
                    .contains(row.get(&scope.field).unwrap_or(&Value::Null)),
                None => true,
            })
            .map(|row| {
                request
                    .fields
                    .iter()
                    .filter_map(|f| row.get(f).map(|v| (f.clone(), v.clone())))
                    .collect()
            })
            .collect();
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ModelBuilder, ModelRegistry};
    use crate::property::PropertySpec;
    use std::rc::Rc;

    fn model() -> Rc<Model> {
        ModelRegistry::default()
            .register(
                ModelBuilder::new("Widget")
                    .property(PropertySpec::new("id", "Serial"))
                    .property(PropertySpec::new("name", "String")),
            )
            .unwrap()
    }

    fn record(entries: &[(&str, Value)]) -> Record {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_create_allocates_serials() {
        let store = MemoryStore::new();
        let model = model();

        let mut first = record(&[("name", "a".into())]);
        let mut second = record(&[("name", "b".into())]);
        assert!(store.create(&model, &mut first).unwrap());
        assert!(store.create(&model, &mut second).unwrap());

        assert_eq!(first.get("id"), Some(&Value::Integer(1)));
        assert_eq!(second.get("id"), Some(&Value::Integer(2)));
        assert_eq!(store.row_count("widgets"), 2);
    }

    #[test]
    fn test_duplicate_key_is_an_error() {
        let store = MemoryStore::new();
        let model = model();
        let mut row = record(&[("id", Value::Integer(5))]);
        store.create(&model, &mut row).unwrap();

        let mut again = record(&[("id", Value::Integer(5))]);
        assert!(matches!(store.create(&model, &mut again), Err(MapperError::Store(_))));
    }

    #[test]
    fn test_update_and_delete_missing_rows() {
        let store = MemoryStore::new();
        let model = model();
        let changes = record(&[("name", "x".into())]);

        assert!(!store.update(&model, &KeyTuple::from(9), &changes).unwrap());
        assert!(!store.delete(&model, &KeyTuple::from(9)).unwrap());
        assert_eq!(store.stats().updates, 1);
        assert_eq!(store.stats().deletes, 1);
    }

    #[test]
    fn test_read_projects_and_filters() {
        let store = MemoryStore::new();
        let model = model();
        for name in ["a", "b", "c"] {
            let mut row = record(&[("name", name.into())]);
            store.create(&model, &mut row).unwrap();
        }

        let request = ReadRequest::new(&model, vec!["id".to_string()])
            .keys(vec![KeyTuple::from(1), KeyTuple::from(3)]);
        let rows = store.read(&request).unwrap();

        assert_eq!(rows, vec![
            record(&[("id", Value::Integer(1))]),
            record(&[("id", Value::Integer(3))]),
        ]);
    }
}
