use crate::core::{KeyTuple, Result, Value};
use crate::property::Property;
use crate::repository::Repository;
use crate::resource::{Link, Resource};
use std::rc::Rc;

/// Declaration of a to-one (`belongs_to`) relationship.
#[derive(Debug, Clone)]
pub struct RelationshipSpec {
    pub(crate) name: String,
    pub(crate) target: String,
    pub(crate) child_key: Option<Vec<String>>,
    pub(crate) required: bool,
}

impl RelationshipSpec {
    pub fn new(name: &str, target: &str) -> Self {
        Self {
            name: name.to_string(),
            target: target.to_string(),
            child_key: None,
            required: true,
        }
    }

    /// Foreign-key properties, in target key order.
    ///
    /// Defaults to `<name>_<target key>` for each target key property.
    pub fn child_key(mut self, properties: &[&str]) -> Self {
        self.child_key = Some(properties.iter().map(|p| p.to_string()).collect());
        self
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }
}

/// A registered to-one relationship.
///
/// The parent is reached through the foreign-key properties; a resolved
/// parent is cached on the child as a weak link.
#[derive(Debug)]
pub struct Relationship {
    name: String,
    source_model: String,
    target_model: String,
    child_key: Vec<Rc<Property>>,
    parent_key: Vec<String>,
    required: bool,
}

impl Relationship {
    pub(crate) fn new(
        name: String,
        source_model: String,
        target_model: String,
        child_key: Vec<Rc<Property>>,
        parent_key: Vec<String>,
        required: bool,
    ) -> Self {
        Self {
            name,
            source_model,
            target_model,
            child_key,
            parent_key,
            required,
        }
    }

    /// Same relationship owned by a subtype, pointing at its rebound foreign keys.
    pub(crate) fn rebind(&self, model_name: &str, properties: &[Rc<Property>]) -> Self {
        let child_key = self
            .child_key
            .iter()
            .map(|fk| {
                properties
                    .iter()
                    .find(|p| p.name() == fk.name())
                    .cloned()
                    .unwrap_or_else(|| Rc::clone(fk))
            })
            .collect();
        Self {
            name: self.name.clone(),
            source_model: model_name.to_string(),
            target_model: self.target_model.clone(),
            child_key,
            parent_key: self.parent_key.clone(),
            required: self.required,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source_model(&self) -> &str {
        &self.source_model
    }

    pub fn target_model(&self) -> &str {
        &self.target_model
    }

    pub fn child_key(&self) -> &[Rc<Property>] {
        &self.child_key
    }

    /// Names of the target's key properties, matching `child_key` by position.
    pub fn parent_key(&self) -> &[String] {
        &self.parent_key
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    /// Whether the target has been resolved or assigned on `resource`.
    pub fn loaded(&self, resource: &Resource) -> bool {
        resource.link(&self.name).is_some()
    }

    /// Resolve the parent: the cached link if it is still alive, otherwise a
    /// repository lookup by the foreign-key values.
    pub fn get(&self, repo: &Repository, resource: &Resource) -> Result<Option<Resource>> {
        match resource.link(&self.name) {
            Some(Link::Empty) => return Ok(None),
            Some(Link::Target(target)) => {
                if let Some(target) = target.upgrade() {
                    return Ok(Some(target));
                }
            }
            None => {}
        }

        let mut values = Vec::with_capacity(self.child_key.len());
        for property in &self.child_key {
            if resource.state_kind().is_persisted() {
                repo.ensure_loaded(resource, property)?;
            }
            values.push(resource.attribute(property.name()).unwrap_or(Value::Null));
        }
        let key = KeyTuple::new(values);
        if !key.is_complete() {
            return Ok(None);
        }

        let target = repo.get(&self.target_model, key)?;
        if let Some(target) = &target {
            resource.set_link(&self.name, Link::Target(target.downgrade()));
        }
        Ok(target)
    }

    /// Point `resource` at `target` and copy the target's key into the
    /// foreign-key properties. Change tracking is the caller's concern.
    pub fn set(&self, resource: &Resource, target: Option<&Resource>) {
        let key = self.target_key(target);
        for (property, value) in self.child_key.iter().zip(key) {
            resource.write_attribute(property.name(), value);
        }
        let link = match target {
            Some(target) => Link::Target(target.downgrade()),
            None => Link::Empty,
        };
        resource.set_link(&self.name, link);
    }

    /// Current key values of `target`, one per foreign-key property.
    pub(crate) fn target_key(&self, target: Option<&Resource>) -> Vec<Value> {
        self.parent_key
            .iter()
            .map(|name| {
                target
                    .and_then(|t| t.attribute(name))
                    .unwrap_or(Value::Null)
            })
            .collect()
    }
}
