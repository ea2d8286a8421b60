use super::{
    Deleted, Dirty, Originals, PersistenceState, StateKind, StateRef, Subject, SubjectValue,
    assign,
};
use crate::core::Result;
use crate::repository::Repository;
use crate::resource::WeakResource;
use std::rc::Rc;

/// Stored and unchanged since the last load or commit.
#[derive(Debug)]
pub struct Clean {
    resource: WeakResource,
}

impl Clean {
    pub fn new(resource: WeakResource) -> Self {
        Self { resource }
    }
}

impl PersistenceState for Clean {
    fn kind(&self) -> StateKind {
        StateKind::Clean
    }

    fn resource_ref(&self) -> &WeakResource {
        &self.resource
    }

    fn set(
        self: Rc<Self>,
        repo: &Repository,
        subject: &Subject,
        value: SubjectValue,
    ) -> Result<StateRef> {
        let resource = self.resource()?;
        let originals = assign(repo, &resource, subject, value, Originals::new())?;
        if originals.is_empty() {
            Ok(self)
        } else {
            Ok(Rc::new(Dirty::new(self.resource.clone(), originals)))
        }
    }

    fn delete(self: Rc<Self>) -> Result<StateRef> {
        Ok(Rc::new(Deleted::new(self.resource.clone())))
    }

    fn commit(self: Rc<Self>, _repo: &Repository) -> Result<StateRef> {
        Ok(self)
    }

    fn rollback(self: Rc<Self>) -> Result<StateRef> {
        Ok(self)
    }
}
