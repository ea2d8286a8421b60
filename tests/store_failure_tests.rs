/// Store failure tests
///
/// Rejected and failing writes leave the resource, its state and the
/// identity map untouched; update payloads carry only what changed plus
/// lock properties.
/// Run with: cargo test --test store_failure_tests

use memomapper::{
    KeyTuple, MapperError, MemoryStore, Model, ModelBuilder, ModelRegistry, PropertySpec,
    ReadRequest, Record, Repository, Result, StateKind, Store, Value,
};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// How the wrapped store answers writes.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Mode {
    Accept,
    Reject,
    Fail,
}

/// Memory store that can refuse or fail writes and records update payloads.
struct FlakyStore {
    inner: MemoryStore,
    mode: Cell<Mode>,
    updates: RefCell<Vec<Record>>,
}

impl FlakyStore {
    fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            mode: Cell::new(Mode::Accept),
            updates: RefCell::new(Vec::new()),
        }
    }

    fn answer(&self) -> Result<Option<bool>> {
        match self.mode.get() {
            Mode::Accept => Ok(None),
            Mode::Reject => Ok(Some(false)),
            Mode::Fail => Err(MapperError::Store("connection reset".into())),
        }
    }
}

impl Store for FlakyStore {
    fn create(&self, model: &Model, record: &mut Record) -> Result<bool> {
        match self.answer()? {
            Some(answer) => Ok(answer),
            None => self.inner.create(model, record),
        }
    }

    fn update(&self, model: &Model, key: &KeyTuple, changes: &Record) -> Result<bool> {
        self.updates.borrow_mut().push(changes.clone());
        match self.answer()? {
            Some(answer) => Ok(answer),
            None => self.inner.update(model, key, changes),
        }
    }

    fn delete(&self, model: &Model, key: &KeyTuple) -> Result<bool> {
        match self.answer()? {
            Some(answer) => Ok(answer),
            None => self.inner.delete(model, key),
        }
    }

    fn read(&self, request: &ReadRequest) -> Result<Vec<Record>> {
        self.inner.read(request)
    }
}

fn setup() -> (Repository, Rc<FlakyStore>) {
    let registry = Rc::new(ModelRegistry::default());
    registry
        .register(
            ModelBuilder::new("Document")
                .property(PropertySpec::new("id", "Serial"))
                .property(PropertySpec::new("title", "String"))
                .property(PropertySpec::new("author", "String"))
                .property(PropertySpec::new("version", "Integer").lock(true)),
        )
        .unwrap();
    let store = Rc::new(FlakyStore::new());
    (Repository::new(registry, store.clone()), store)
}

fn document(repo: &Repository) -> memomapper::Resource {
    repo.create(
        "Document",
        [
            ("title", Value::from("Draft")),
            ("author", Value::from("Ines")),
            ("version", Value::from(1)),
        ],
    )
    .unwrap()
}

#[test]
fn test_rejected_create_stays_transient() {
    let (repo, store) = setup();
    let doc = repo
        .build("Document", [("title", Value::from("Draft"))])
        .unwrap();
    store.mode.set(Mode::Reject);

    let err = doc.commit(&repo).unwrap_err();
    assert!(matches!(
        err,
        MapperError::StoreRejected { ref operation, .. } if operation == "create"
    ));
    assert_eq!(doc.state_kind(), StateKind::Transient);
    assert!(doc.repository().is_none());
    assert!(repo.identity_map("Document").unwrap().is_empty());

    store.mode.set(Mode::Accept);
    doc.commit(&repo).unwrap();
    assert_eq!(doc.state_kind(), StateKind::Clean);
}

#[test]
fn test_rejected_update_stays_dirty() {
    let (repo, store) = setup();
    let doc = document(&repo);
    doc.set(&repo, "title", "Final").unwrap();
    store.mode.set(Mode::Reject);

    assert!(matches!(
        doc.commit(&repo),
        Err(MapperError::StoreRejected { .. })
    ));
    assert_eq!(doc.state_kind(), StateKind::Dirty);
    assert_eq!(doc.attribute("title"), Some(Value::from("Final")));
    assert_eq!(
        doc.original_attributes().get("title"),
        Some(&Value::from("Draft"))
    );
}

#[test]
fn test_store_errors_propagate_unchanged() {
    let (repo, store) = setup();
    let doc = document(&repo);
    doc.set(&repo, "title", "Final").unwrap();
    store.mode.set(Mode::Fail);

    match doc.commit(&repo) {
        Err(MapperError::Store(message)) => assert_eq!(message, "connection reset"),
        other => panic!("expected a store error, got {:?}", other),
    }
    assert_eq!(doc.state_kind(), StateKind::Dirty);
}

#[test]
fn test_rejected_delete_stays_deleted_and_mapped() {
    let (repo, store) = setup();
    let doc = document(&repo);
    doc.delete().unwrap();
    store.mode.set(Mode::Reject);

    assert!(matches!(
        doc.commit(&repo),
        Err(MapperError::StoreRejected { ref operation, .. }) if operation == "delete"
    ));
    assert_eq!(doc.state_kind(), StateKind::Deleted);
    assert!(repo.identity_map("Document").unwrap().contains(&doc.key()));

    store.mode.set(Mode::Accept);
    doc.commit(&repo).unwrap();
    assert_eq!(doc.state_kind(), StateKind::Immutable);
}

#[test]
fn test_update_payload_has_changes_and_lock() {
    let (repo, store) = setup();
    let doc = document(&repo);

    doc.set(&repo, "title", "Final").unwrap();
    doc.commit(&repo).unwrap();

    let updates = store.updates.borrow();
    assert_eq!(updates.len(), 1);
    let payload = &updates[0];
    assert_eq!(payload.get("title"), Some(&Value::from("Final")));
    assert_eq!(payload.get("version"), Some(&Value::Integer(1)));
    assert!(!payload.contains_key("author"));
    assert!(!payload.contains_key("id"));
}

#[test]
fn test_clean_commit_does_not_reach_the_store() {
    let (repo, store) = setup();
    let doc = document(&repo);
    doc.set(&repo, "title", "Draft").unwrap();
    doc.commit(&repo).unwrap();

    assert!(store.updates.borrow().is_empty());
    assert_eq!(doc.state_kind(), StateKind::Clean);
}
