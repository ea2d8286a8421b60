// ============================================================================
// Model Registry
// ============================================================================
//
// Holds every declared model, the property type registry they are built
// against, and the discriminator scopes of single-table inheritance trees.
//
// Declaration order matters: a relationship target must be registered before
// the model pointing at it (or be the model itself), and a subtype is
// registered against an existing parent.
//
// ============================================================================

use super::{Model, ModelBuilder, Namespace, Relationship, RelationshipSpec, default_storage_name};
use crate::config::MapperConfig;
use crate::core::{MapperError, Result};
use crate::property::{OptionName, OptionValue, Property, PropertySpec, TypeRegistry};
use lazy_static::lazy_static;
use regex::Regex;
use std::cell::{Ref, RefCell};
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

lazy_static! {
    static ref MODEL_NAME: Regex = Regex::new(r"^[A-Z][A-Za-z0-9_]*(::[A-Z][A-Za-z0-9_]*)*$")
        .expect("valid model name regex");
}

#[derive(Debug)]
pub struct ModelRegistry {
    config: MapperConfig,
    types: RefCell<TypeRegistry>,
    namespace: Namespace,
    models: RefCell<BTreeMap<String, Rc<Model>>>,
    /// Model name -> itself plus every descendant
    scopes: RefCell<BTreeMap<String, BTreeSet<String>>>,
}

impl ModelRegistry {
    pub fn new(config: MapperConfig) -> Self {
        Self {
            types: RefCell::new(TypeRegistry::new(&config)),
            config,
            namespace: Namespace::default(),
            models: RefCell::new(BTreeMap::new()),
            scopes: RefCell::new(BTreeMap::new()),
        }
    }

    pub fn config(&self) -> &MapperConfig {
        &self.config
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn types(&self) -> Ref<'_, TypeRegistry> {
        self.types.borrow()
    }

    // ========================================================================
    // Property types
    // ========================================================================

    pub fn declare_type(&self, name: &str, parent: &str) -> Result<()> {
        self.types.borrow_mut().declare(name, parent)
    }

    pub fn accept_options(&self, type_name: &str, options: &[OptionName]) -> Result<()> {
        self.types.borrow_mut().accept_options(type_name, options)
    }

    pub fn set_type_default(
        &self,
        type_name: &str,
        option: OptionName,
        value: impl Into<OptionValue>,
    ) -> Result<()> {
        self.types.borrow_mut().set_default(type_name, option, value)
    }

    // ========================================================================
    // Models
    // ========================================================================

    /// Check and register a root model.
    pub fn register(&self, builder: ModelBuilder) -> Result<Rc<Model>> {
        let name = self.check_name(&builder.name)?;

        let mut properties = Vec::new();
        self.build_properties(&name, builder.properties, &mut properties)?;
        let relationships =
            self.build_relationships(&name, builder.relationships, &mut properties)?;

        let storage_name = builder
            .storage_name
            .unwrap_or_else(|| default_storage_name(&name));
        let model = Model::assemble(
            &name,
            storage_name,
            None,
            name.clone(),
            properties,
            relationships,
        )?;

        Ok(self.insert(model, &[]))
    }

    /// Register `builder` as a single-table subtype of `parent`.
    ///
    /// The subtype inherits every property and relationship, shares the
    /// parent's storage and identity map, and joins the discriminator scope of
    /// each ancestor.
    pub fn register_subtype(&self, parent: &str, builder: ModelBuilder) -> Result<Rc<Model>> {
        let parent = self.model(parent)?;
        let name = self.check_name(&builder.name)?;

        let mut properties: Vec<Rc<Property>> = parent
            .properties()
            .iter()
            .map(|p| Rc::new(p.rebind(&name)))
            .collect();
        self.build_properties(&name, builder.properties, &mut properties)?;

        let mut relationships: Vec<Rc<Relationship>> = parent
            .relationships()
            .iter()
            .map(|r| Rc::new(r.rebind(&name, &properties)))
            .collect();
        let own = self.build_relationships(&name, builder.relationships, &mut properties)?;
        for relationship in own {
            if relationships.iter().any(|r| r.name() == relationship.name()) {
                return Err(MapperError::DuplicateProperty(
                    name.clone(),
                    relationship.name().to_string(),
                ));
            }
            relationships.push(relationship);
        }

        let model = Model::assemble(
            &name,
            parent.storage_name().to_string(),
            Some(parent.name().to_string()),
            parent.base_name().to_string(),
            properties,
            relationships,
        )?;

        let ancestors = self.ancestors(&parent);
        Ok(self.insert(model, &ancestors))
    }

    pub fn model(&self, name: &str) -> Result<Rc<Model>> {
        let name = name.strip_prefix("::").unwrap_or(name);
        self.models
            .borrow()
            .get(name)
            .cloned()
            .ok_or_else(|| MapperError::UnknownModel(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.models.borrow().contains_key(name)
    }

    pub fn model_names(&self) -> Vec<String> {
        self.models.borrow().keys().cloned().collect()
    }

    /// Default scope of `name`: the model itself and all of its descendants.
    pub fn scope(&self, name: &str) -> BTreeSet<String> {
        self.scopes.borrow().get(name).cloned().unwrap_or_default()
    }

    /// Whether `name` is `ancestor` or one of its descendants.
    pub fn is_descendant(&self, name: &str, ancestor: &str) -> bool {
        self.scopes
            .borrow()
            .get(ancestor)
            .is_some_and(|scope| scope.contains(name))
    }

    /// Model to construct for `requested` given a discriminator value.
    ///
    /// Only descendants of `requested` are honoured; anything else keeps the
    /// requested model.
    pub fn redirect(&self, requested: &Rc<Model>, discriminator: &str) -> Rc<Model> {
        if discriminator != requested.name() && self.is_descendant(discriminator, requested.name())
        {
            if let Ok(model) = self.model(discriminator) {
                return model;
            }
        }
        Rc::clone(requested)
    }

    fn check_name(&self, name: &str) -> Result<String> {
        let name = name.strip_prefix("::").unwrap_or(name);
        if !MODEL_NAME.is_match(name) {
            return Err(MapperError::InvalidName(name.to_string()));
        }
        if self.contains(name) {
            return Err(MapperError::DuplicateModel(name.to_string()));
        }
        Ok(name.to_string())
    }

    fn build_properties(
        &self,
        model_name: &str,
        specs: Vec<PropertySpec>,
        properties: &mut Vec<Rc<Property>>,
    ) -> Result<()> {
        let types = self.types.borrow();
        for spec in specs {
            if properties.iter().any(|p| p.name() == spec.name()) {
                return Err(MapperError::DuplicateProperty(
                    model_name.to_string(),
                    spec.name().to_string(),
                ));
            }
            let property = Property::build(&types, &self.namespace, model_name, spec)?;
            properties.push(Rc::new(property));
        }
        Ok(())
    }

    /// Resolve relationship targets and their foreign keys, declaring any
    /// foreign-key property the model does not already have.
    fn build_relationships(
        &self,
        model_name: &str,
        specs: Vec<RelationshipSpec>,
        properties: &mut Vec<Rc<Property>>,
    ) -> Result<Vec<Rc<Relationship>>> {
        let mut relationships = Vec::with_capacity(specs.len());

        for spec in specs {
            if relationships
                .iter()
                .any(|r: &Rc<Relationship>| r.name() == spec.name)
            {
                return Err(MapperError::DuplicateProperty(
                    model_name.to_string(),
                    spec.name.clone(),
                ));
            }

            let resolved = self.namespace.resolve(model_name, &spec.target);
            let (target_name, target_key): (String, Vec<Rc<Property>>) = match resolved {
                Some(resolved) => {
                    let target = self.model(&resolved)?;
                    (resolved, target.key().to_vec())
                }
                None if spec.target == model_name
                    || model_name.rsplit("::").next() == Some(spec.target.as_str()) =>
                {
                    let key = properties.iter().filter(|p| p.is_key()).cloned().collect();
                    (model_name.to_string(), key)
                }
                None => return Err(MapperError::UnknownModel(spec.target.clone())),
            };

            let fk_names: Vec<String> = match &spec.child_key {
                Some(names) => names.clone(),
                None => target_key
                    .iter()
                    .map(|p| format!("{}_{}", spec.name, p.name()))
                    .collect(),
            };
            if fk_names.len() != target_key.len() {
                return Err(MapperError::KeyArity {
                    model: target_name,
                    expected: target_key.len(),
                    actual: fk_names.len(),
                });
            }

            let mut child_key = Vec::with_capacity(fk_names.len());
            for (fk_name, parent_property) in fk_names.iter().zip(&target_key) {
                if let Some(existing) = properties.iter().find(|p| p.name() == fk_name) {
                    child_key.push(Rc::clone(existing));
                    continue;
                }
                let type_name = if parent_property.is_serial() {
                    "Integer"
                } else {
                    parent_property.type_name()
                };
                let fk_spec = PropertySpec::new(fk_name, type_name)
                    .required(spec.required)
                    .index(true);
                let property = {
                    let types = self.types.borrow();
                    Rc::new(Property::build(&types, &self.namespace, model_name, fk_spec)?)
                };
                properties.push(Rc::clone(&property));
                child_key.push(property);
            }

            relationships.push(Rc::new(Relationship::new(
                spec.name,
                model_name.to_string(),
                target_name,
                child_key,
                target_key.iter().map(|p| p.name().to_string()).collect(),
                spec.required,
            )));
        }

        Ok(relationships)
    }

    fn ancestors(&self, model: &Rc<Model>) -> Vec<String> {
        let mut names = vec![model.name().to_string()];
        let mut current = model.parent().map(str::to_string);
        while let Some(name) = current {
            current = self
                .models
                .borrow()
                .get(&name)
                .and_then(|m| m.parent().map(str::to_string));
            names.push(name);
        }
        names
    }

    fn insert(&self, model: Model, ancestors: &[String]) -> Rc<Model> {
        let model = Rc::new(model);
        let name = model.name().to_string();

        let mut scopes = self.scopes.borrow_mut();
        scopes.entry(name.clone()).or_default().insert(name.clone());
        for ancestor in ancestors {
            scopes
                .entry(ancestor.clone())
                .or_default()
                .insert(name.clone());
        }
        drop(scopes);

        self.models.borrow_mut().insert(name.clone(), Rc::clone(&model));
        self.namespace.register(&name);
        log::debug!("Registered model '{}' ({})", name, model.storage_name());
        model
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new(MapperConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::Kind;

    fn registry_with_users() -> ModelRegistry {
        let registry = ModelRegistry::default();
        registry
            .register(
                ModelBuilder::new("User")
                    .property(PropertySpec::new("id", "Serial"))
                    .property(PropertySpec::new("name", "String").required(true)),
            )
            .unwrap();
        registry
    }

    #[test]
    fn test_model_without_key_is_rejected() {
        let registry = ModelRegistry::default();
        let result = registry.register(
            ModelBuilder::new("Note").property(PropertySpec::new("body", "Text")),
        );
        assert!(matches!(result, Err(MapperError::MissingKey(name)) if name == "Note"));
        assert!(!registry.contains("Note"));
    }

    #[test]
    fn test_duplicate_model_and_property() {
        let registry = registry_with_users();
        let again = registry.register(
            ModelBuilder::new("User").property(PropertySpec::new("id", "Serial")),
        );
        assert!(matches!(again, Err(MapperError::DuplicateModel(_))));

        let twice = registry.register(
            ModelBuilder::new("Tag")
                .property(PropertySpec::new("id", "Serial"))
                .property(PropertySpec::new("id", "Integer")),
        );
        assert!(matches!(twice, Err(MapperError::DuplicateProperty(_, p)) if p == "id"));
    }

    #[test]
    fn test_belongs_to_declares_foreign_key() {
        let registry = registry_with_users();
        let post = registry
            .register(
                ModelBuilder::new("Post")
                    .property(PropertySpec::new("id", "Serial"))
                    .belongs_to(RelationshipSpec::new("author", "User")),
            )
            .unwrap();

        let fk = post.property("author_id").unwrap();
        assert_eq!(fk.kind(), Kind::Integer);
        assert!(fk.is_required());
        assert!(!fk.is_serial());
        assert!(fk.is_indexed());

        let relationship = post.relationship("author").unwrap();
        assert_eq!(relationship.target_model(), "User");
        assert_eq!(relationship.parent_key(), ["id".to_string()]);
    }

    #[test]
    fn test_belongs_to_unknown_target() {
        let registry = ModelRegistry::default();
        let result = registry.register(
            ModelBuilder::new("Post")
                .property(PropertySpec::new("id", "Serial"))
                .belongs_to(RelationshipSpec::new("author", "Ghost")),
        );
        assert!(matches!(result, Err(MapperError::UnknownModel(_))));
    }

    #[test]
    fn test_subtype_scopes_reach_every_ancestor() {
        let registry = ModelRegistry::default();
        registry
            .register(
                ModelBuilder::new("Vehicle")
                    .property(PropertySpec::new("id", "Serial"))
                    .property(PropertySpec::new("kind", "Discriminator")),
            )
            .unwrap();
        let car = registry
            .register_subtype("Vehicle", ModelBuilder::new("Car"))
            .unwrap();
        registry
            .register_subtype(
                "Car",
                ModelBuilder::new("SportsCar").property(PropertySpec::new("top_speed", "Integer")),
            )
            .unwrap();

        assert_eq!(car.storage_name(), "vehicles");
        assert_eq!(car.base_name(), "Vehicle");
        assert_eq!(car.property("kind").unwrap().model_name(), "Car");
        assert!(registry.is_descendant("SportsCar", "Vehicle"));
        assert!(registry.is_descendant("SportsCar", "Car"));
        assert!(!registry.is_descendant("Vehicle", "Car"));
        assert_eq!(registry.scope("Vehicle").len(), 3);

        let vehicle = registry.model("Vehicle").unwrap();
        assert_eq!(registry.redirect(&vehicle, "SportsCar").name(), "SportsCar");
        assert_eq!(registry.redirect(&car, "Vehicle").name(), "Car");
    }

    #[test]
    fn test_custom_type_declaration() {
        let registry = ModelRegistry::default();
        registry.declare_type("EmailAddress", "String").unwrap();
        registry
            .set_type_default("EmailAddress", OptionName::Format, OptionValue::Pattern("@".into()))
            .unwrap();
        let account = registry
            .register(
                ModelBuilder::new("Account")
                    .property(PropertySpec::new("id", "Serial"))
                    .property(PropertySpec::new("email", "EmailAddress")),
            )
            .unwrap();
        let email = account.property("email").unwrap();
        assert!(email.valid(&"a@b".into()));
        assert!(!email.valid(&"ab".into()));
    }
}
