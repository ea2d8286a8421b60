use super::{PersistenceState, StateKind, StateRef, Subject, SubjectValue};
use crate::core::{MapperError, Result};
use crate::repository::Repository;
use crate::resource::WeakResource;
use std::rc::Rc;

/// Read-only: a deleted-and-committed resource, or a projection that does
/// not cover the key.
#[derive(Debug)]
pub struct Immutable {
    resource: WeakResource,
}

impl Immutable {
    pub fn new(resource: WeakResource) -> Self {
        Self { resource }
    }

    fn refuse(&self, operation: &str) -> MapperError {
        match self.resource() {
            Ok(resource) => MapperError::immutable(resource.model().name(), operation),
            Err(err) => err,
        }
    }
}

impl PersistenceState for Immutable {
    fn kind(&self) -> StateKind {
        StateKind::Immutable
    }

    fn resource_ref(&self) -> &WeakResource {
        &self.resource
    }

    /// Loaded properties and relationships only; nothing is lazily read.
    fn get(&self, repo: &Repository, subject: &Subject) -> Result<SubjectValue> {
        let resource = self.resource()?;
        match subject {
            Subject::Property(property) => resource
                .attribute(property.name())
                .map(SubjectValue::Attribute)
                .ok_or_else(|| self.refuse("load an unloaded property")),
            Subject::Relationship(relationship) => {
                Ok(SubjectValue::Target(relationship.get(repo, &resource)?))
            }
        }
    }

    fn set(
        self: Rc<Self>,
        _repo: &Repository,
        _subject: &Subject,
        _value: SubjectValue,
    ) -> Result<StateRef> {
        Err(self.refuse("be modified"))
    }

    fn delete(self: Rc<Self>) -> Result<StateRef> {
        Err(self.refuse("be deleted"))
    }

    fn commit(self: Rc<Self>, _repo: &Repository) -> Result<StateRef> {
        Ok(self)
    }

    fn rollback(self: Rc<Self>) -> Result<StateRef> {
        Ok(self)
    }
}
