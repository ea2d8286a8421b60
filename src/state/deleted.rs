use super::{Immutable, PersistenceState, StateKind, StateRef, Subject, SubjectValue, store_rejected};
use crate::core::{MapperError, Result};
use crate::repository::Repository;
use crate::resource::WeakResource;
use std::rc::Rc;

/// Marked for removal; the row goes away on commit.
#[derive(Debug)]
pub struct Deleted {
    resource: WeakResource,
}

impl Deleted {
    pub fn new(resource: WeakResource) -> Self {
        Self { resource }
    }
}

impl PersistenceState for Deleted {
    fn kind(&self) -> StateKind {
        StateKind::Deleted
    }

    fn resource_ref(&self) -> &WeakResource {
        &self.resource
    }

    fn set(
        self: Rc<Self>,
        _repo: &Repository,
        _subject: &Subject,
        _value: SubjectValue,
    ) -> Result<StateRef> {
        let resource = self.resource()?;
        Err(MapperError::ImmutableDeleted(resource.model().name().to_string()))
    }

    fn delete(self: Rc<Self>) -> Result<StateRef> {
        Ok(self)
    }

    fn rollback(self: Rc<Self>) -> Result<StateRef> {
        Ok(self)
    }

    fn commit(self: Rc<Self>, repo: &Repository) -> Result<StateRef> {
        let resource = self.resource()?;
        let model = Rc::clone(resource.model());
        let key = resource.original_key();

        if !repo.store().delete(&model, &model.dump_key(&key))? {
            return Err(store_rejected(&resource, "delete"));
        }
        repo.unmap(&model, &key);

        Ok(Rc::new(Immutable::new(self.resource.clone())))
    }
}
