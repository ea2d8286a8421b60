//! Resources: attribute storage plus the current persistence state.
//!
//! A [`Resource`] is a cheap, clonable handle. Every read and write goes
//! through its current state, which decides whether to lazy-load, track a
//! change, or refuse. Relationship targets are cached as weak links so
//! resource graphs never own each other.

use crate::core::{KeyTuple, MapperError, Result, Value};
use crate::model::Model;
use crate::property::Visibility;
use crate::repository::Repository;
use crate::state::{
    Clean, Immutable, Original, PersistenceState, StateKind, StateRef, Subject, SubjectKey,
    SubjectValue, Transient,
};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{Level, event, info_span};

/// Global resource ID counter
static NEXT_RESOURCE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of a resource instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(pub u64);

impl ResourceId {
    pub fn new() -> Self {
        ResourceId(NEXT_RESOURCE_ID.fetch_add(1, Ordering::SeqCst))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ResourceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "res_{}", self.0)
    }
}

/// Cached relationship target.
#[derive(Debug, Clone)]
pub enum Link {
    /// Explicitly set to no target
    Empty,
    Target(WeakResource),
}

impl PartialEq for Link {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Empty, Self::Empty) => true,
            (Self::Target(a), Self::Target(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

/// Resources loaded together; lazy loads fetch for every live member at once.
#[derive(Debug, Default)]
pub struct LoadBatch {
    members: RefCell<Vec<WeakResource>>,
}

impl LoadBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, resource: &Resource) {
        self.members.borrow_mut().push(resource.downgrade());
    }

    pub fn members(&self) -> Vec<Resource> {
        self.members
            .borrow()
            .iter()
            .filter_map(WeakResource::upgrade)
            .collect()
    }
}

struct ResourceData {
    attributes: BTreeMap<String, Value>,
    links: BTreeMap<String, Link>,
    state: StateRef,
    batch: Option<Rc<LoadBatch>>,
}

pub struct ResourceCell {
    id: ResourceId,
    model: Rc<Model>,
    repository: RefCell<Option<String>>,
    log_transitions: Cell<bool>,
    data: RefCell<ResourceData>,
}

/// Shared handle to one resource instance. Equality is identity.
#[derive(Clone)]
pub struct Resource(Rc<ResourceCell>);

#[derive(Clone)]
pub struct WeakResource(Weak<ResourceCell>);

impl WeakResource {
    pub fn upgrade(&self) -> Option<Resource> {
        self.0.upgrade().map(Resource)
    }

    pub fn ptr_eq(&self, other: &WeakResource) -> bool {
        self.0.ptr_eq(&other.0)
    }
}

impl fmt::Debug for WeakResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.upgrade() {
            Some(cell) => write!(f, "WeakResource({})", cell.id),
            None => write!(f, "WeakResource(<dropped>)"),
        }
    }
}

impl Resource {
    /// A new, transient resource of `model` with no attributes set.
    pub fn new(model: Rc<Model>) -> Self {
        Self::with_state(model, BTreeMap::new(), |weak| Rc::new(Transient::new(weak)))
    }

    /// A resource materialized from storage in `kind` (clean or immutable).
    pub(crate) fn loaded(
        model: Rc<Model>,
        attributes: BTreeMap<String, Value>,
        kind: StateKind,
    ) -> Self {
        Self::with_state(model, attributes, |weak| match kind {
            StateKind::Immutable => Rc::new(Immutable::new(weak)),
            _ => Rc::new(Clean::new(weak)),
        })
    }

    fn with_state(
        model: Rc<Model>,
        attributes: BTreeMap<String, Value>,
        state: impl FnOnce(WeakResource) -> StateRef,
    ) -> Self {
        Resource(Rc::new_cyclic(|weak| ResourceCell {
            id: ResourceId::new(),
            model,
            repository: RefCell::new(None),
            log_transitions: Cell::new(false),
            data: RefCell::new(ResourceData {
                attributes,
                links: BTreeMap::new(),
                state: state(WeakResource(weak.clone())),
                batch: None,
            }),
        }))
    }

    pub fn id(&self) -> ResourceId {
        self.0.id
    }

    pub fn model(&self) -> &Rc<Model> {
        &self.0.model
    }

    /// Repository the resource is bound to, once stored or loaded.
    pub fn repository(&self) -> Option<String> {
        self.0.repository.borrow().clone()
    }

    pub fn state(&self) -> StateRef {
        Rc::clone(&self.0.data.borrow().state)
    }

    pub fn state_kind(&self) -> StateKind {
        self.0.data.borrow().state.kind()
    }

    pub fn is_new(&self) -> bool {
        self.state_kind() == StateKind::Transient
    }

    pub fn downgrade(&self) -> WeakResource {
        WeakResource(Rc::downgrade(&self.0))
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn get(&self, repo: &Repository, name: &str) -> Result<Value> {
        self.check_repository(repo)?;
        let property = self.property(name)?;
        if property.reader_visibility() != Visibility::Public {
            return Err(self.private_accessor(name));
        }
        let value = self.state().get(repo, &Subject::Property(property))?;
        Ok(value.into_attribute().unwrap_or(Value::Null))
    }

    pub fn set(&self, repo: &Repository, name: &str, value: impl Into<Value>) -> Result<()> {
        self.check_repository(repo)?;
        let property = self.property(name)?;
        if property.writer_visibility() != Visibility::Public {
            return Err(self.private_accessor(name));
        }
        let next = self.state().set(
            repo,
            &Subject::Property(property),
            SubjectValue::Attribute(value.into()),
        )?;
        self.swap_state(next);
        Ok(())
    }

    pub fn get_related(&self, repo: &Repository, name: &str) -> Result<Option<Resource>> {
        self.check_repository(repo)?;
        let relationship = self.relationship(name)?;
        let value = self.state().get(repo, &Subject::Relationship(relationship))?;
        Ok(value.into_target().flatten())
    }

    pub fn set_related(
        &self,
        repo: &Repository,
        name: &str,
        target: Option<&Resource>,
    ) -> Result<()> {
        self.check_repository(repo)?;
        let relationship = self.relationship(name)?;
        if let Some(target) = target {
            if !repo
                .registry()
                .is_descendant(target.model().name(), relationship.target_model())
            {
                return Err(MapperError::WrongTarget {
                    relationship: name.to_string(),
                    expected: relationship.target_model().to_string(),
                    actual: target.model().name().to_string(),
                });
            }
        }
        let next = self.state().set(
            repo,
            &Subject::Relationship(relationship),
            SubjectValue::Target(target.cloned()),
        )?;
        self.swap_state(next);
        Ok(())
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    pub fn commit(&self, repo: &Repository) -> Result<()> {
        self.check_repository(repo)?;
        let span = info_span!(
            "resource.commit",
            model = %self.model().name(),
            state = %self.state_kind(),
            repository = %repo.name()
        );
        let _enter = span.enter();

        let next = self.state().commit(repo).inspect_err(|err| {
            event!(Level::DEBUG, error = %err, "commit failed");
        })?;
        self.swap_state(next);
        Ok(())
    }

    pub fn rollback(&self) -> Result<()> {
        let next = self.state().rollback()?;
        self.swap_state(next);
        Ok(())
    }

    pub fn delete(&self) -> Result<()> {
        let next = self.state().delete()?;
        self.swap_state(next);
        Ok(())
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    /// Current key tuple; incomplete while unsaved serial keys are unset.
    pub fn key(&self) -> KeyTuple {
        self.model().key_from(&self.0.data.borrow().attributes)
    }

    /// Loaded value of `name`, without lazy loading or defaults.
    pub fn attribute(&self, name: &str) -> Option<Value> {
        self.0.data.borrow().attributes.get(name).cloned()
    }

    pub fn attributes(&self) -> BTreeMap<String, Value> {
        self.0.data.borrow().attributes.clone()
    }

    pub fn attribute_loaded(&self, name: &str) -> bool {
        self.0.data.borrow().attributes.contains_key(name)
    }

    /// Pre-change values of the changed properties.
    pub fn original_attributes(&self) -> BTreeMap<String, Value> {
        self.state()
            .original_attributes()
            .into_iter()
            .filter_map(|(key, original)| match (key, original) {
                (SubjectKey::Property(name), Original::Attribute(value)) => Some((name, value)),
                _ => None,
            })
            .collect()
    }

    pub fn attribute_dirty(&self, name: &str) -> bool {
        self.state()
            .original_attributes()
            .contains_key(&SubjectKey::Property(name.to_string()))
    }

    /// Current values of the changed properties.
    pub fn dirty_attributes(&self) -> BTreeMap<String, Value> {
        let data = self.0.data.borrow();
        data.state
            .original_attributes()
            .keys()
            .filter_map(SubjectKey::property_name)
            .map(|name| {
                let value = data.attributes.get(name).cloned().unwrap_or(Value::Null);
                (name.to_string(), value)
            })
            .collect()
    }

    /// Value equality: same model and equal loaded attributes.
    pub fn eql(&self, other: &Resource) -> bool {
        if self == other {
            return true;
        }
        self.model().name() == other.model().name()
            && self.0.data.borrow().attributes == other.0.data.borrow().attributes
    }

    // ========================================================================
    // Crate internals
    // ========================================================================

    /// Key as it was before any pending change.
    pub(crate) fn original_key(&self) -> KeyTuple {
        let mut attributes = self.attributes();
        for (key, original) in self.state().original_attributes() {
            if let (SubjectKey::Property(name), Original::Attribute(value)) = (key, original) {
                attributes.insert(name, value);
            }
        }
        self.model().key_from(&attributes)
    }

    pub(crate) fn write_attribute(&self, name: &str, value: Value) {
        self.0
            .data
            .borrow_mut()
            .attributes
            .insert(name.to_string(), value);
    }

    pub(crate) fn replace_attributes(&self, attributes: BTreeMap<String, Value>) {
        self.0.data.borrow_mut().attributes = attributes;
    }

    pub(crate) fn link(&self, name: &str) -> Option<Link> {
        self.0.data.borrow().links.get(name).cloned()
    }

    pub(crate) fn set_link(&self, name: &str, link: Link) {
        self.0
            .data
            .borrow_mut()
            .links
            .insert(name.to_string(), link);
    }

    pub(crate) fn remove_link(&self, name: &str) {
        self.0.data.borrow_mut().links.remove(name);
    }

    pub(crate) fn batch(&self) -> Option<Rc<LoadBatch>> {
        self.0.data.borrow().batch.clone()
    }

    pub(crate) fn set_batch(&self, batch: &Rc<LoadBatch>) {
        batch.push(self);
        self.0.data.borrow_mut().batch = Some(Rc::clone(batch));
    }

    pub(crate) fn bind(&self, repo: &Repository) {
        *self.0.repository.borrow_mut() = Some(repo.name().to_string());
        self.0
            .log_transitions
            .set(repo.config().log_transitions);
    }

    pub(crate) fn set_log_transitions(&self, enabled: bool) {
        self.0.log_transitions.set(enabled);
    }

    fn swap_state(&self, next: StateRef) {
        let mut data = self.0.data.borrow_mut();
        if Rc::ptr_eq(&data.state, &next) {
            return;
        }
        let from = data.state.kind();
        let to = next.kind();
        data.state = next;
        drop(data);

        if self.0.log_transitions.get() {
            log::debug!("{} {} {}: {} -> {}", self.model().name(), self.id(), self.key(), from, to);
        }
        event!(Level::DEBUG, model = %self.model().name(), id = %self.id(), %from, %to, "state transition");
    }

    fn check_repository(&self, repo: &Repository) -> Result<()> {
        match self.0.repository.borrow().as_deref() {
            Some(bound) if bound != repo.name() => Err(MapperError::RepositoryMismatch {
                expected: bound.to_string(),
                actual: repo.name().to_string(),
            }),
            _ => Ok(()),
        }
    }

    fn property(&self, name: &str) -> Result<Rc<crate::property::Property>> {
        self.model().property(name).cloned().ok_or_else(|| {
            MapperError::UnknownProperty(self.model().name().to_string(), name.to_string())
        })
    }

    fn relationship(&self, name: &str) -> Result<Rc<crate::model::Relationship>> {
        self.model().relationship(name).cloned().ok_or_else(|| {
            MapperError::UnknownRelationship(self.model().name().to_string(), name.to_string())
        })
    }

    fn private_accessor(&self, name: &str) -> MapperError {
        MapperError::PrivateAccessor(self.model().name().to_string(), name.to_string())
    }
}

impl PartialEq for Resource {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Resource {}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = self.0.data.borrow();
        f.debug_struct("Resource")
            .field("id", &self.0.id)
            .field("model", &self.0.model.name())
            .field("state", &data.state.kind())
            .field("attributes", &data.attributes)
            .finish()
    }
}
