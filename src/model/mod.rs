//! Declared entity kinds: their properties, key, to-one relationships and
//! single-table inheritance tree.

pub mod namespace;
pub mod registry;
pub mod relationship;

pub use namespace::Namespace;
pub use registry::ModelRegistry;
pub use relationship::{Relationship, RelationshipSpec};

use crate::core::{KeyTuple, MapperError, Result, Value};
use crate::property::{Kind, Property, PropertySpec};
use crate::store::Record;
use std::collections::BTreeMap;
use std::rc::Rc;

/// Declaration of a model before it is checked and registered.
#[derive(Debug, Clone)]
pub struct ModelBuilder {
    pub(crate) name: String,
    pub(crate) storage_name: Option<String>,
    pub(crate) properties: Vec<PropertySpec>,
    pub(crate) relationships: Vec<RelationshipSpec>,
}

impl ModelBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            storage_name: None,
            properties: Vec::new(),
            relationships: Vec::new(),
        }
    }

    /// Override the storage name (defaults to the snake-cased model name).
    pub fn storage_name(mut self, storage_name: &str) -> Self {
        self.storage_name = Some(storage_name.to_string());
        self
    }

    pub fn property(mut self, spec: PropertySpec) -> Self {
        self.properties.push(spec);
        self
    }

    pub fn belongs_to(mut self, spec: RelationshipSpec) -> Self {
        self.relationships.push(spec);
        self
    }
}

/// A registered model.
#[derive(Debug)]
pub struct Model {
    pub(crate) name: String,
    pub(crate) storage_name: String,
    pub(crate) parent: Option<String>,
    pub(crate) base_name: String,
    pub(crate) properties: Vec<Rc<Property>>,
    pub(crate) relationships: Vec<Rc<Relationship>>,
    pub(crate) key: Vec<Rc<Property>>,
    pub(crate) discriminator: Option<Rc<Property>>,
}

impl Model {
    pub(crate) fn assemble(
        name: &str,
        storage_name: String,
        parent: Option<String>,
        base_name: String,
        properties: Vec<Rc<Property>>,
        relationships: Vec<Rc<Relationship>>,
    ) -> Result<Self> {
        let key: Vec<Rc<Property>> = properties.iter().filter(|p| p.is_key()).cloned().collect();
        if key.is_empty() {
            return Err(MapperError::MissingKey(name.to_string()));
        }
        let discriminator = properties
            .iter()
            .find(|p| p.kind() == Kind::Discriminator)
            .cloned();

        Ok(Self {
            name: name.to_string(),
            storage_name,
            parent,
            base_name,
            properties,
            relationships,
            key,
            discriminator,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn storage_name(&self) -> &str {
        &self.storage_name
    }

    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    /// Root of the inheritance tree; subtypes share its storage and identity map.
    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    pub fn properties(&self) -> &[Rc<Property>] {
        &self.properties
    }

    pub fn property(&self, name: &str) -> Option<&Rc<Property>> {
        self.properties.iter().find(|p| p.name() == name)
    }

    pub fn relationships(&self) -> &[Rc<Relationship>] {
        &self.relationships
    }

    pub fn relationship(&self, name: &str) -> Option<&Rc<Relationship>> {
        self.relationships.iter().find(|r| r.name() == name)
    }

    pub fn key(&self) -> &[Rc<Property>] {
        &self.key
    }

    pub fn key_fields(&self) -> Vec<String> {
        self.key.iter().map(|p| p.field().to_string()).collect()
    }

    pub fn discriminator(&self) -> Option<&Rc<Property>> {
        self.discriminator.as_ref()
    }

    pub fn serial(&self) -> Option<&Rc<Property>> {
        self.properties.iter().find(|p| p.is_serial())
    }

    /// Properties read by a default load.
    pub fn eager_properties(&self) -> impl Iterator<Item = &Rc<Property>> {
        self.properties.iter().filter(|p| !p.is_lazy())
    }

    /// Properties sharing a lazy-load group.
    pub fn lazy_group(&self, group: &str) -> Vec<Rc<Property>> {
        self.properties
            .iter()
            .filter(|p| p.lazy_group() == Some(group))
            .cloned()
            .collect()
    }

    /// Key tuple from runtime attribute values; missing parts are null.
    pub fn key_from(&self, attributes: &BTreeMap<String, Value>) -> KeyTuple {
        KeyTuple::new(
            self.key
                .iter()
                .map(|p| attributes.get(p.name()).cloned().unwrap_or(Value::Null))
                .collect(),
        )
    }

    /// Key tuple from a storage record.
    pub fn key_from_record(&self, record: &Record) -> KeyTuple {
        KeyTuple::new(
            self.key
                .iter()
                .map(|p| {
                    record
                        .get(p.field())
                        .cloned()
                        .map(|v| p.load(v))
                        .unwrap_or(Value::Null)
                })
                .collect(),
        )
    }

    /// Typecast caller-supplied key values through the key properties.
    pub fn typecast_key(&self, key: KeyTuple) -> Result<KeyTuple> {
        if key.len() != self.key.len() {
            return Err(MapperError::KeyArity {
                model: self.name.clone(),
                expected: self.key.len(),
                actual: key.len(),
            });
        }
        Ok(KeyTuple::new(
            self.key
                .iter()
                .zip(key.into_values())
                .map(|(p, v)| p.typecast(&v).into_owned())
                .collect(),
        ))
    }

    /// Storage form of a runtime key tuple.
    pub fn dump_key(&self, key: &KeyTuple) -> KeyTuple {
        KeyTuple::new(
            self.key
                .iter()
                .zip(key.values())
                .map(|(p, v)| p.dump(v))
                .collect(),
        )
    }
}

/// `Blog::PostComment` -> `blog_post_comments`
pub(crate) fn default_storage_name(model_name: &str) -> String {
    let mut snake = String::new();
    let mut previous_lower = false;
    for ch in model_name.replace("::", "_").chars() {
        if ch.is_uppercase() {
            if previous_lower {
                snake.push('_');
            }
            snake.extend(ch.to_lowercase());
            previous_lower = false;
        } else {
            previous_lower = ch != '_';
            snake.push(ch);
        }
    }
    if !snake.ends_with('s') {
        snake.push('s');
    }
    snake
}
