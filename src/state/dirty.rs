use super::{
    Clean, Deleted, Original, Originals, PersistenceState, StateKind, StateRef, Subject,
    SubjectKey, SubjectValue, assign, cascade_child_keys, dump_record, store_rejected,
};
use crate::core::{MapperError, Result, Value};
use crate::repository::Repository;
use crate::resource::WeakResource;
use std::collections::BTreeSet;
use std::rc::Rc;

/// Stored, with pending changes.
///
/// `originals` maps each changed subject to its value before the first
/// change; it is never empty.
#[derive(Debug)]
pub struct Dirty {
    resource: WeakResource,
    originals: Originals,
}

impl Dirty {
    pub fn new(resource: WeakResource, originals: Originals) -> Self {
        Self {
            resource,
            originals,
        }
    }

    pub fn originals(&self) -> &Originals {
        &self.originals
    }

    fn revert(&self) -> Result<()> {
        let resource = self.resource()?;
        for (key, original) in self.originals.iter() {
            match (key, original) {
                (SubjectKey::Property(name), Original::Attribute(value)) => {
                    resource.write_attribute(name, value.clone());
                }
                (SubjectKey::Relationship(name), Original::Target(Some(link))) => {
                    resource.set_link(name, link.clone());
                }
                (SubjectKey::Relationship(name), Original::Target(None)) => {
                    resource.remove_link(name);
                }
                (key, _) => {
                    return Err(MapperError::Internal(format!(
                        "original of {:?} has the wrong kind",
                        key
                    )));
                }
            }
        }
        Ok(())
    }
}

impl PersistenceState for Dirty {
    fn kind(&self) -> StateKind {
        StateKind::Dirty
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
        let originals = assign(repo, &resource, subject, value, self.originals.clone())?;
        if originals.is_empty() {
            Ok(Rc::new(Clean::new(self.resource.clone())))
        } else {
            Ok(Rc::new(Dirty::new(self.resource.clone(), originals)))
        }
    }

    fn delete(self: Rc<Self>) -> Result<StateRef> {
        self.revert()?;
        Ok(Rc::new(Deleted::new(self.resource.clone())))
    }

    fn rollback(self: Rc<Self>) -> Result<StateRef> {
        self.revert()?;
        Ok(Rc::new(Clean::new(self.resource.clone())))
    }

    fn commit(self: Rc<Self>, repo: &Repository) -> Result<StateRef> {
        let resource = self.resource()?;
        let model = Rc::clone(resource.model());
        let mut staged = resource.attributes();

        let mut changed: BTreeSet<String> = self
            .originals
            .keys()
            .filter_map(|key| key.property_name().map(str::to_string))
            .collect();
        changed.extend(cascade_child_keys(&resource, &mut staged));
        if !changed.is_empty() {
            for property in model.properties().iter().filter(|p| p.is_lock()) {
                repo.ensure_loaded(&resource, property)?;
                if let Some(value) = resource.attribute(property.name()) {
                    staged.entry(property.name().to_string()).or_insert(value);
                    changed.insert(property.name().to_string());
                }
            }
        }

        for name in &changed {
            if let Some(property) = model.property(name) {
                let value = staged.get(name).cloned().unwrap_or(Value::Null);
                property.assert_valid_value(&value)?;
            }
        }

        let original_key = resource.original_key();
        let key = model.key_from(&staged);
        if key != original_key && key.is_complete() && repo.mapped(&model, &key).is_some() {
            return Err(MapperError::DuplicateIdentity {
                model: model.name().to_string(),
                key: key.to_string(),
            });
        }

        let record = dump_record(&resource, &staged, changed.iter().map(String::as_str));
        if !record.is_empty() && !repo.store().update(&model, &model.dump_key(&original_key), &record)? {
            return Err(store_rejected(&resource, "update"));
        }

        resource.replace_attributes(staged);
        if key != original_key {
            repo.rekey(&model, &original_key, key);
        }

        Ok(Rc::new(Clean::new(self.resource.clone())))
    }

    fn original_attributes(&self) -> Originals {
        self.originals.clone()
    }
}
