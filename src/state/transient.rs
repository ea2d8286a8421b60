use super::{
    Clean, PersistenceState, StateKind, StateRef, Subject, SubjectValue, cascade_child_keys,
    dump_record, read, store_rejected,
};
use crate::core::{MapperError, Result, Value};
use crate::repository::Repository;
use crate::resource::WeakResource;
use std::rc::Rc;

/// A resource that has never been stored.
#[derive(Debug)]
pub struct Transient {
    resource: WeakResource,
}

impl Transient {
    pub fn new(resource: WeakResource) -> Self {
        Self { resource }
    }
}

impl PersistenceState for Transient {
    fn kind(&self) -> StateKind {
        StateKind::Transient
    }

    fn resource_ref(&self) -> &WeakResource {
        &self.resource
    }

    /// Unset properties with a default pick it up on first read.
    fn get(&self, repo: &Repository, subject: &Subject) -> Result<SubjectValue> {
        let resource = self.resource()?;
        if let Subject::Property(property) = subject {
            if !resource.attribute_loaded(property.name()) && property.has_default() {
                let value = property.default_for(&resource);
                resource.write_attribute(property.name(), property.typecast(&value).into_owned());
            }
        }
        read(repo, &resource, subject)
    }

    fn set(
        self: Rc<Self>,
        _repo: &Repository,
        subject: &Subject,
        value: SubjectValue,
    ) -> Result<StateRef> {
        let resource = self.resource()?;
        match (subject, value) {
            (Subject::Property(property), SubjectValue::Attribute(value)) => {
                resource.write_attribute(property.name(), property.typecast(&value).into_owned());
            }
            (Subject::Relationship(relationship), SubjectValue::Target(target)) => {
                relationship.set(&resource, target.as_ref());
            }
            (subject, _) => {
                return Err(MapperError::Internal(format!(
                    "value kind does not match subject '{}'",
                    subject.name()
                )));
            }
        }
        Ok(self)
    }

    fn delete(self: Rc<Self>) -> Result<StateRef> {
        Ok(self)
    }

    fn rollback(self: Rc<Self>) -> Result<StateRef> {
        Ok(self)
    }

    /// Stage cascade, defaults and validation on a copy of the attributes so
    /// a failed commit leaves the resource as it was.
    fn commit(self: Rc<Self>, repo: &Repository) -> Result<StateRef> {
        let resource = self.resource()?;
        let model = Rc::clone(resource.model());
        let mut staged = resource.attributes();

        cascade_child_keys(&resource, &mut staged);

        for property in model.properties() {
            if !staged.contains_key(property.name()) && property.has_default() {
                let value = property.default_for(&resource);
                staged.insert(
                    property.name().to_string(),
                    property.typecast(&value).into_owned(),
                );
            }
        }

        for property in model.properties() {
            let value = staged.get(property.name()).cloned().unwrap_or(Value::Null);
            // Left for the store to assign
            if property.is_serial() && value.is_null() {
                continue;
            }
            property.assert_valid_value(&value)?;
        }

        let key = model.key_from(&staged);
        if key.is_complete() && repo.mapped(&model, &key).is_some() {
            return Err(MapperError::DuplicateIdentity {
                model: model.name().to_string(),
                key: key.to_string(),
            });
        }

        let names: Vec<String> = staged
            .iter()
            .filter(|(_, value)| !value.is_null())
            .map(|(name, _)| name.clone())
            .collect();
        let mut record = dump_record(&resource, &staged, names.iter().map(String::as_str));
        if !repo.store().create(&model, &mut record)? {
            return Err(store_rejected(&resource, "create"));
        }

        if let Some(serial) = model.serial() {
            if let Some(assigned) = record.get(serial.field()) {
                staged.insert(serial.name().to_string(), serial.load(assigned.clone()));
            }
        }

        let key = model.key_from(&staged);
        resource.replace_attributes(staged);
        repo.map_resource(&model, key, resource.clone());
        resource.bind(repo);

        Ok(Rc::new(Clean::new(self.resource.clone())))
    }
}
