// ============================================================================
// Repository
// ============================================================================
//
// Explicit handle bundling a store, the model registry and one identity map
// per base model. Every operation that reaches storage takes a repository;
// there is no ambient "current" repository.
//
// Loads consult the identity map first, so two fetches of the same key hand
// back the same resource instance. Resources loaded by one `all`/`select`
// call share a load batch: the first lazy read of a group fetches it for
// every live member of the batch in a single store read.
//
// ============================================================================

use crate::config::MapperConfig;
use crate::core::{KeyTuple, MapperError, Result, Value};
use crate::identity_map::IdentityMap;
use crate::model::{Model, ModelRegistry};
use crate::property::Property;
use crate::resource::{LoadBatch, Resource};
use crate::state::StateKind;
use crate::store::{ReadRequest, Record, ScopeFilter, Store};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;
use tracing::{Level, event, info_span};

pub struct Repository {
    config: MapperConfig,
    registry: Rc<ModelRegistry>,
    store: Rc<dyn Store>,
    identity_maps: RefCell<HashMap<String, IdentityMap>>,
}

impl Repository {
    /// Repository named by the registry's configuration.
    pub fn new(registry: Rc<ModelRegistry>, store: Rc<dyn Store>) -> Self {
        let config = registry.config().clone();
        Self::with_config(config, registry, store)
    }

    pub fn with_config(
        config: MapperConfig,
        registry: Rc<ModelRegistry>,
        store: Rc<dyn Store>,
    ) -> Self {
        log::debug!("Opening repository '{}'", config.repository);
        Self {
            config,
            registry,
            store,
            identity_maps: RefCell::new(HashMap::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.repository
    }

    pub fn config(&self) -> &MapperConfig {
        &self.config
    }

    pub fn registry(&self) -> &Rc<ModelRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    /// Snapshot of the identity map shared by `model_name` and the rest of
    /// its inheritance tree. Later commits and loads do not show up in it.
    pub fn identity_map(&self, model_name: &str) -> Result<IdentityMap> {
        let model = self.registry.model(model_name)?;
        let base = model.base_name();
        Ok(self
            .identity_maps
            .borrow()
            .get(base)
            .cloned()
            .unwrap_or_else(|| IdentityMap::new(base)))
    }

    // ========================================================================
    // Construction
    // ========================================================================

    /// Build a transient resource, assigning `attributes` through the public
    /// writers.
    ///
    /// A discriminator value naming a descendant of `model_name` builds that
    /// descendant instead.
    pub fn build<I, S>(&self, model_name: &str, attributes: I) -> Result<Resource>
    where
        I: IntoIterator<Item = (S, Value)>,
        S: AsRef<str>,
    {
        let requested = self.registry.model(model_name)?;
        let attributes: Vec<(S, Value)> = attributes.into_iter().collect();

        let mut model = Rc::clone(&requested);
        if let Some(discriminator) = requested.discriminator() {
            let supplied = attributes
                .iter()
                .find(|(name, _)| name.as_ref() == discriminator.name());
            if let Some((_, value)) = supplied {
                if let Value::Class(name) = discriminator.typecast(value).as_ref() {
                    model = self.registry.redirect(&requested, name);
                }
            }
        }

        let resource = Resource::new(model);
        resource.set_log_transitions(self.config.log_transitions);
        for (name, value) in attributes {
            resource.set(self, name.as_ref(), value)?;
        }
        Ok(resource)
    }

    /// Build and commit in one step.
    pub fn create<I, S>(&self, model_name: &str, attributes: I) -> Result<Resource>
    where
        I: IntoIterator<Item = (S, Value)>,
        S: AsRef<str>,
    {
        let resource = self.build(model_name, attributes)?;
        resource.commit(self)?;
        Ok(resource)
    }

    // ========================================================================
    // Loading
    // ========================================================================

    /// Fetch one resource by key, from the identity map when already loaded.
    pub fn get(&self, model_name: &str, key: impl Into<KeyTuple>) -> Result<Option<Resource>> {
        let model = self.registry.model(model_name)?;
        let key = model.typecast_key(key.into())?;
        if !key.is_complete() {
            return Ok(None);
        }

        if let Some(resource) = self.mapped(&model, &key) {
            let in_scope = self
                .registry
                .is_descendant(resource.model().name(), model.name());
            return Ok(in_scope.then_some(resource));
        }

        let fields = default_fields(&model);
        let request = ReadRequest::new(&model, fields.clone())
            .keys(vec![model.dump_key(&key)])
            .scope(self.scope_filter(&model));
        let record = self.store.read(&request)?.into_iter().next();
        record
            .map(|record| self.materialize(&model, &fields, record, None))
            .transpose()
    }

    /// Every stored resource in the default scope of `model_name`.
    pub fn all(&self, model_name: &str) -> Result<Vec<Resource>> {
        let model = self.registry.model(model_name)?;
        let fields = default_fields(&model);
        let request = ReadRequest::new(&model, fields.clone()).scope(self.scope_filter(&model));

        let span = info_span!("repository.all", model = %model.name());
        let _enter = span.enter();

        let batch = Rc::new(LoadBatch::new());
        let records = self.store.read(&request)?;
        event!(Level::DEBUG, count = records.len(), "records read");
        records
            .into_iter()
            .map(|record| self.materialize(&model, &fields, record, Some(&batch)))
            .collect()
    }

    /// Load only the named properties.
    ///
    /// A projection covering the whole key yields clean, identity-mapped
    /// resources whose other properties load lazily. Anything narrower
    /// yields immutable resources that are not mapped.
    pub fn select(&self, model_name: &str, names: &[&str]) -> Result<Vec<Resource>> {
        let model = self.registry.model(model_name)?;
        let mut fields = Vec::with_capacity(names.len());
        for name in names {
            let property = model.property(name).ok_or_else(|| {
                MapperError::UnknownProperty(model.name().to_string(), name.to_string())
            })?;
            fields.push(property.field().to_string());
        }

        let covers_key = model
            .key()
            .iter()
            .all(|k| fields.iter().any(|f| f == k.field()));
        if let Some(discriminator) = model.discriminator() {
            if !fields.iter().any(|f| f == discriminator.field()) {
                fields.push(discriminator.field().to_string());
            }
        }

        let request = ReadRequest::new(&model, fields.clone()).scope(self.scope_filter(&model));
        let records = self.store.read(&request)?;

        if covers_key {
            let batch = Rc::new(LoadBatch::new());
            return records
                .into_iter()
                .map(|record| self.materialize(&model, &fields, record, Some(&batch)))
                .collect();
        }

        Ok(records
            .into_iter()
            .map(|record| {
                let model = self.record_model(&model, &record);
                let attributes = load_attributes(&model, &fields, &record);
                let resource = Resource::loaded(model, attributes, StateKind::Immutable);
                resource.bind(self);
                resource
            })
            .collect())
    }

    // ========================================================================
    // Crate internals used by the persistence states
    // ========================================================================

    pub(crate) fn mapped(&self, model: &Model, key: &KeyTuple) -> Option<Resource> {
        self.identity_maps
            .borrow()
            .get(model.base_name())
            .and_then(|map| map.get(key))
    }

    pub(crate) fn map_resource(&self, model: &Model, key: KeyTuple, resource: Resource) {
        self.identity_maps
            .borrow_mut()
            .entry(model.base_name().to_string())
            .or_insert_with(|| IdentityMap::new(model.base_name()))
            .insert(key, resource);
    }

    pub(crate) fn unmap(&self, model: &Model, key: &KeyTuple) {
        if let Some(map) = self.identity_maps.borrow_mut().get_mut(model.base_name()) {
            map.remove(key);
        }
    }

    pub(crate) fn rekey(&self, model: &Model, from: &KeyTuple, to: KeyTuple) {
        event!(Level::DEBUG, model = %model.name(), from = %from, to = %to, "identity rekey");
        if let Some(map) = self.identity_maps.borrow_mut().get_mut(model.base_name()) {
            map.rekey(from, to);
        }
    }

    /// Load `property` on `resource` if it is stored but not read yet.
    pub(crate) fn ensure_loaded(&self, resource: &Resource, property: &Rc<Property>) -> Result<()> {
        if resource.attribute_loaded(property.name()) || !resource.state_kind().is_persisted() {
            return Ok(());
        }
        self.lazy_load(resource, property)
    }

    /// Fetch the unloaded members of `property`'s group for `resource` and
    /// every live sibling of its load batch, in one store read.
    fn lazy_load(&self, resource: &Resource, property: &Rc<Property>) -> Result<()> {
        let model = Rc::clone(resource.model());
        let group: Vec<Rc<Property>> = match property.lazy_group() {
            Some(group) => model.lazy_group(group),
            None => model.eager_properties().cloned().collect(),
        };
        let group: Vec<Rc<Property>> = group
            .into_iter()
            .filter(|p| !resource.attribute_loaded(p.name()))
            .collect();

        let mut siblings: Vec<Resource> = match resource.batch() {
            Some(batch) => batch
                .members()
                .into_iter()
                .filter(|member| {
                    member.model().base_name() == model.base_name()
                        && member.model().property(property.name()).is_some()
                        && member.state_kind().is_persisted()
                        && !member.attribute_loaded(property.name())
                })
                .collect(),
            None => Vec::new(),
        };
        if !siblings.contains(resource) {
            siblings.push(resource.clone());
        }

        let keyed: Vec<(KeyTuple, Resource)> = siblings
            .into_iter()
            .map(|sibling| (sibling.original_key(), sibling))
            .filter(|(key, _)| key.is_complete())
            .collect();

        if !keyed.is_empty() {
            let mut fields = model.key_fields();
            for p in &group {
                if !fields.iter().any(|f| f == p.field()) {
                    fields.push(p.field().to_string());
                }
            }
            let request = ReadRequest::new(&model, fields)
                .keys(keyed.iter().map(|(key, _)| model.dump_key(key)).collect());

            event!(
                Level::DEBUG,
                model = %model.name(),
                property = %property.name(),
                resources = keyed.len(),
                "lazy load"
            );
            for record in self.store.read(&request)? {
                let key = model.key_from_record(&record);
                let Some((_, sibling)) = keyed.iter().find(|(k, _)| *k == key) else {
                    continue;
                };
                for p in &group {
                    if sibling.model().property(p.name()).is_none()
                        || sibling.attribute_loaded(p.name())
                    {
                        continue;
                    }
                    let value = record
                        .get(p.field())
                        .cloned()
                        .map(|v| p.load(v))
                        .unwrap_or(Value::Null);
                    sibling.write_attribute(p.name(), value);
                }
            }
        }

        // A vanished row reads as null rather than being fetched again
        for p in &group {
            if !resource.attribute_loaded(p.name()) {
                resource.write_attribute(p.name(), Value::Null);
            }
        }
        Ok(())
    }

    /// Turn a stored record into a clean, mapped resource, reusing the
    /// instance already mapped for its key.
    fn materialize(
        &self,
        requested: &Rc<Model>,
        fields: &[String],
        record: Record,
        batch: Option<&Rc<LoadBatch>>,
    ) -> Result<Resource> {
        let model = self.record_model(requested, &record);
        let key = model.key_from_record(&record);
        if !key.is_complete() {
            return Err(MapperError::Store(format!(
                "record of '{}' has an incomplete key {}",
                model.name(),
                key
            )));
        }
        let attributes = load_attributes(&model, fields, &record);

        if let Some(existing) = self.mapped(&model, &key) {
            for (name, value) in attributes {
                if !existing.attribute_loaded(&name) {
                    existing.write_attribute(&name, value);
                }
            }
            return Ok(existing);
        }

        let resource = Resource::loaded(Rc::clone(&model), attributes, StateKind::Clean);
        resource.bind(self);
        if let Some(batch) = batch {
            resource.set_batch(batch);
        }
        self.map_resource(&model, key, resource.clone());
        Ok(resource)
    }

    /// Model named by the record's discriminator, when it is a descendant of
    /// `requested`.
    fn record_model(&self, requested: &Rc<Model>, record: &Record) -> Rc<Model> {
        let discriminated = requested.discriminator().and_then(|discriminator| {
            match discriminator.load(record.get(discriminator.field())?.clone()) {
                Value::Class(name) => Some(self.registry.redirect(requested, &name)),
                _ => None,
            }
        });
        discriminated.unwrap_or_else(|| Rc::clone(requested))
    }

    fn scope_filter(&self, model: &Model) -> Option<ScopeFilter> {
        let discriminator = model.discriminator()?;
        let values = self
            .registry
            .scope(model.name())
            .into_iter()
            .map(|name| discriminator.dump(&Value::Class(name)))
            .collect();
        Some(ScopeFilter {
            field: discriminator.field().to_string(),
            values,
        })
    }
}

fn default_fields(model: &Model) -> Vec<String> {
    model
        .eager_properties()
        .map(|p| p.field().to_string())
        .collect()
}

/// Runtime attributes for the properties of `model` stored in `fields`.
fn load_attributes(model: &Model, fields: &[String], record: &Record) -> BTreeMap<String, Value> {
    model
        .properties()
        .iter()
        .filter(|p| fields.iter().any(|f| f == p.field()))
        .map(|p| {
            let value = record
                .get(p.field())
                .cloned()
                .map(|v| p.load(v))
                .unwrap_or(Value::Null);
            (p.name().to_string(), value)
        })
        .collect()
}
