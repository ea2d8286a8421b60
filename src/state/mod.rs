// ============================================================================
// Persistence State Machine
// ============================================================================
//
// Implements the State Pattern for the resource lifecycle. A resource holds
// exactly one state object; every operation is delegated to it and returns
// the state the resource moves to:
//
// ```text
// Transient ──commit──> Clean <──rollback/commit── Dirty
//                         │  └──set (changed)──────────^
//                         └──delete──> Deleted ──commit──> Immutable
// ```
//
// State objects are never mutated. A no-op hands back the same `Rc`; a
// change builds a new state. Dirty keeps its originals in a persistent map
// so each set only copies the path it touches.
//
// ============================================================================

mod clean;
mod deleted;
mod dirty;
mod immutable;
mod transient;

pub use clean::Clean;
pub use deleted::Deleted;
pub use dirty::Dirty;
pub use immutable::Immutable;
pub use transient::Transient;

use crate::core::{MapperError, Result, Value};
use crate::model::Relationship;
use crate::property::Property;
use crate::repository::Repository;
use crate::resource::{Link, Resource, WeakResource};
use crate::store::Record;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

pub type StateRef = Rc<dyn PersistenceState>;

/// Previous values of everything changed since the last commit.
pub type Originals = im::OrdMap<SubjectKey, Original>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateKind {
    Transient,
    Clean,
    Dirty,
    Deleted,
    Immutable,
}

impl StateKind {
    /// States backed by a stored row that may still be lazily read.
    pub fn is_persisted(&self) -> bool {
        matches!(self, Self::Clean | Self::Dirty | Self::Deleted)
    }
}

impl fmt::Display for StateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Transient => "transient",
            Self::Clean => "clean",
            Self::Dirty => "dirty",
            Self::Deleted => "deleted",
            Self::Immutable => "immutable",
        };
        write!(f, "{}", name)
    }
}

/// What a state operation reads or writes.
#[derive(Debug, Clone)]
pub enum Subject {
    Property(Rc<Property>),
    Relationship(Rc<Relationship>),
}

impl Subject {
    pub fn name(&self) -> &str {
        match self {
            Self::Property(property) => property.name(),
            Self::Relationship(relationship) => relationship.name(),
        }
    }

    pub fn key(&self) -> SubjectKey {
        match self {
            Self::Property(property) => SubjectKey::Property(property.name().to_string()),
            Self::Relationship(relationship) => {
                SubjectKey::Relationship(relationship.name().to_string())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SubjectKey {
    Property(String),
    Relationship(String),
}

impl SubjectKey {
    pub fn property_name(&self) -> Option<&str> {
        match self {
            Self::Property(name) => Some(name),
            Self::Relationship(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum SubjectValue {
    Attribute(Value),
    Target(Option<Resource>),
}

impl SubjectValue {
    pub fn into_attribute(self) -> Option<Value> {
        match self {
            Self::Attribute(value) => Some(value),
            Self::Target(_) => None,
        }
    }

    pub fn into_target(self) -> Option<Option<Resource>> {
        match self {
            Self::Target(target) => Some(target),
            Self::Attribute(_) => None,
        }
    }
}

/// Value of a subject before its first change. `Target(None)` records a
/// relationship that had not been resolved yet.
#[derive(Debug, Clone, PartialEq)]
pub enum Original {
    Attribute(Value),
    Target(Option<Link>),
}

/// A lifecycle state
///
/// `set`, `delete`, `commit` and `rollback` consume the state handle and
/// return the next one. Operations a state does not support fall through to
/// these defaults, which report an internal error.
pub trait PersistenceState: fmt::Debug {
    fn kind(&self) -> StateKind;

    fn resource_ref(&self) -> &WeakResource;

    fn resource(&self) -> Result<Resource> {
        self.resource_ref()
            .upgrade()
            .ok_or_else(|| MapperError::Internal(format!("{} state outlived its resource", self.kind())))
    }

    /// Read a subject, lazily loading an unloaded property first.
    fn get(&self, repo: &Repository, subject: &Subject) -> Result<SubjectValue> {
        read(repo, &self.resource()?, subject)
    }

    fn set(
        self: Rc<Self>,
        _repo: &Repository,
        _subject: &Subject,
        _value: SubjectValue,
    ) -> Result<StateRef> {
        Err(unsupported(self.kind(), "set"))
    }

    fn delete(self: Rc<Self>) -> Result<StateRef> {
        Err(unsupported(self.kind(), "delete"))
    }

    fn commit(self: Rc<Self>, _repo: &Repository) -> Result<StateRef> {
        Err(unsupported(self.kind(), "commit"))
    }

    fn rollback(self: Rc<Self>) -> Result<StateRef> {
        Err(unsupported(self.kind(), "rollback"))
    }

    fn original_attributes(&self) -> Originals {
        Originals::new()
    }
}

/// Same variant, same resource.
impl PartialEq for dyn PersistenceState {
    fn eq(&self, other: &Self) -> bool {
        self.kind() == other.kind() && self.resource_ref().ptr_eq(other.resource_ref())
    }
}

fn unsupported(kind: StateKind, operation: &str) -> MapperError {
    MapperError::Internal(format!("{} is not implemented for {} state", operation, kind))
}

// ============================================================================
// Helpers shared by the concrete states
// ============================================================================

pub(crate) fn read(repo: &Repository, resource: &Resource, subject: &Subject) -> Result<SubjectValue> {
    match subject {
        Subject::Property(property) => {
            repo.ensure_loaded(resource, property)?;
            Ok(SubjectValue::Attribute(
                resource.attribute(property.name()).unwrap_or(Value::Null),
            ))
        }
        Subject::Relationship(relationship) => {
            Ok(SubjectValue::Target(relationship.get(repo, resource)?))
        }
    }
}

/// Write `value` through `subject`, recording the pre-change value in
/// `originals` and dropping the entry again once a write reverts it.
pub(crate) fn assign(
    repo: &Repository,
    resource: &Resource,
    subject: &Subject,
    value: SubjectValue,
    originals: Originals,
) -> Result<Originals> {
    match (subject, value) {
        (Subject::Property(property), SubjectValue::Attribute(value)) => {
            assign_attribute(repo, resource, property, value, originals)
        }
        (Subject::Relationship(relationship), SubjectValue::Target(target)) => {
            assign_target(repo, resource, relationship, target.as_ref(), originals)
        }
        (subject, _) => Err(MapperError::Internal(format!(
            "value kind does not match subject '{}'",
            subject.name()
        ))),
    }
}

fn assign_attribute(
    repo: &Repository,
    resource: &Resource,
    property: &Rc<Property>,
    value: Value,
    mut originals: Originals,
) -> Result<Originals> {
    let value = property.typecast(&value).into_owned();
    repo.ensure_loaded(resource, property)?;
    let current = resource.attribute(property.name()).unwrap_or(Value::Null);
    if current == value {
        return Ok(originals);
    }

    let key = SubjectKey::Property(property.name().to_string());
    let original = originals
        .get(&key)
        .cloned()
        .unwrap_or(Original::Attribute(current));
    resource.write_attribute(property.name(), value.clone());

    if original == Original::Attribute(value) {
        originals.remove(&key);
    } else {
        originals.insert(key, original);
    }
    Ok(originals)
}

fn assign_target(
    repo: &Repository,
    resource: &Resource,
    relationship: &Rc<Relationship>,
    target: Option<&Resource>,
    mut originals: Originals,
) -> Result<Originals> {
    let link = match target {
        Some(target) => Link::Target(target.downgrade()),
        None => Link::Empty,
    };
    let current = resource.link(relationship.name());
    if current.as_ref() == Some(&link) {
        return Ok(originals);
    }

    for (property, value) in relationship
        .child_key()
        .iter()
        .zip(relationship.target_key(target))
    {
        originals = assign_attribute(repo, resource, property, value, originals)?;
    }

    let key = SubjectKey::Relationship(relationship.name().to_string());
    let original = originals
        .get(&key)
        .cloned()
        .unwrap_or(Original::Target(current));
    resource.set_link(relationship.name(), link.clone());

    if original == Original::Target(Some(link)) {
        originals.remove(&key);
    } else {
        originals.insert(key, original);
    }
    Ok(originals)
}

/// Copy the keys of linked parents into the foreign-key attributes of
/// `staged`. Returns the names of the properties that changed.
pub(crate) fn cascade_child_keys(
    resource: &Resource,
    staged: &mut BTreeMap<String, Value>,
) -> Vec<String> {
    let mut changed = Vec::new();
    for relationship in resource.model().relationships() {
        let Some(Link::Target(target)) = resource.link(relationship.name()) else {
            continue;
        };
        let Some(target) = target.upgrade() else {
            continue;
        };
        let values = relationship.target_key(Some(&target));
        for (property, value) in relationship.child_key().iter().zip(values) {
            if value.is_null() {
                continue;
            }
            let value = property.typecast(&value).into_owned();
            if staged.get(property.name()) != Some(&value) {
                staged.insert(property.name().to_string(), value);
                changed.push(property.name().to_string());
            }
        }
    }
    changed
}

/// Dump the named properties of `staged` into a storage record.
pub(crate) fn dump_record<'a>(
    resource: &Resource,
    staged: &BTreeMap<String, Value>,
    names: impl IntoIterator<Item = &'a str>,
) -> Record {
    let model = resource.model();
    names
        .into_iter()
        .filter_map(|name| {
            let property = model.property(name)?;
            let value = staged.get(name)?;
            Some((property.field().to_string(), property.dump(value)))
        })
        .collect()
}

pub(crate) fn store_rejected(resource: &Resource, operation: &str) -> MapperError {
    log::warn!(
        "Store rejected {} of '{}' {}",
        operation,
        resource.model().name(),
        resource.key()
    );
    MapperError::StoreRejected {
        operation: operation.to_string(),
        model: resource.model().name().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ModelBuilder, ModelRegistry};
    use crate::property::PropertySpec;
    use crate::store::MemoryStore;

    /// A state that only names its resource.
    #[derive(Debug)]
    struct Bare(WeakResource);

    impl PersistenceState for Bare {
        fn kind(&self) -> StateKind {
            StateKind::Clean
        }

        fn resource_ref(&self) -> &WeakResource {
            &self.0
        }
    }

    fn repository() -> Repository {
        let registry = Rc::new(ModelRegistry::default());
        registry
            .register(ModelBuilder::new("Widget").property(PropertySpec::new("id", "Serial")))
            .unwrap();
        Repository::new(registry, Rc::new(MemoryStore::new()))
    }

    #[test]
    fn test_base_operations_are_internal_errors() {
        let repo = repository();
        let widget = repo.build("Widget", Vec::<(&str, Value)>::new()).unwrap();
        let bare = Rc::new(Bare(widget.downgrade()));

        assert!(matches!(Rc::clone(&bare).commit(&repo), Err(MapperError::Internal(_))));
        assert!(matches!(Rc::clone(&bare).rollback(), Err(MapperError::Internal(_))));
        assert!(matches!(Rc::clone(&bare).delete(), Err(MapperError::Internal(_))));
        let id = widget.model().property("id").cloned().unwrap();
        assert!(matches!(
            Rc::clone(&bare).set(&repo, &Subject::Property(id), SubjectValue::Attribute(1.into())),
            Err(MapperError::Internal(_))
        ));
        assert!(bare.original_attributes().is_empty());
    }

    #[test]
    fn test_states_compare_by_variant_and_resource() {
        let repo = repository();
        let first = repo.build("Widget", Vec::<(&str, Value)>::new()).unwrap();
        let second = repo.build("Widget", Vec::<(&str, Value)>::new()).unwrap();

        let a: StateRef = Rc::new(Transient::new(first.downgrade()));
        let b: StateRef = Rc::new(Transient::new(first.downgrade()));
        let c: StateRef = Rc::new(Clean::new(first.downgrade()));
        let d: StateRef = Rc::new(Transient::new(second.downgrade()));

        assert!(*a == *b);
        assert!(*a != *c);
        assert!(*a != *d);
    }

    #[test]
    fn test_dropped_resource_is_reported() {
        let repo = repository();
        let widget = repo.build("Widget", Vec::<(&str, Value)>::new()).unwrap();
        let state = Bare(widget.downgrade());
        drop(widget);
        assert!(matches!(state.resource(), Err(MapperError::Internal(_))));
    }
}
