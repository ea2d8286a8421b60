use crate::core::KeyTuple;
use crate::resource::Resource;
use std::collections::HashMap;

/// Key tuple -> the single live resource for that row.
///
/// One map exists per (repository, base model); subtypes of a single-table
/// hierarchy share their base model's map. Only the persistence states and
/// the repository load path insert or remove entries.
#[derive(Debug, Clone, Default)]
pub struct IdentityMap {
    model: String,
    entries: HashMap<KeyTuple, Resource>,
}

impl IdentityMap {
    pub fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
            entries: HashMap::new(),
        }
    }

    /// Base model this map belongs to.
    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn get(&self, key: &KeyTuple) -> Option<Resource> {
        self.entries.get(key).cloned()
    }

    pub fn contains(&self, key: &KeyTuple) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &KeyTuple> {
        self.entries.keys()
    }

    /// Map `key` to `resource`. Incomplete keys are never stored.
    pub(crate) fn insert(&mut self, key: KeyTuple, resource: Resource) -> bool {
        if !key.is_complete() {
            return false;
        }
        self.entries.insert(key, resource);
        true
    }

    pub(crate) fn remove(&mut self, key: &KeyTuple) -> Option<Resource> {
        self.entries.remove(key)
    }

    /// Move the entry for `from` to `to`.
    pub(crate) fn rekey(&mut self, from: &KeyTuple, to: KeyTuple) {
        if let Some(resource) = self.entries.remove(from) {
            self.insert(to, resource);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Value;
    use crate::model::{ModelBuilder, ModelRegistry};
    use crate::property::PropertySpec;

    fn resource() -> Resource {
        let registry = ModelRegistry::default();
        let model = registry
            .register(ModelBuilder::new("Widget").property(PropertySpec::new("id", "Serial")))
            .unwrap();
        Resource::new(model)
    }

    #[test]
    fn test_incomplete_keys_are_not_mapped() {
        let mut map = IdentityMap::new("Widget");
        assert!(!map.insert(KeyTuple::new(vec![Value::Null]), resource()));
        assert!(!map.insert(KeyTuple::default(), resource()));
        assert!(map.is_empty());
    }

    #[test]
    fn test_rekey_moves_the_entry() {
        let mut map = IdentityMap::new("Widget");
        let widget = resource();
        map.insert(KeyTuple::from(1), widget.clone());

        map.rekey(&KeyTuple::from(1), KeyTuple::from(2));

        assert!(!map.contains(&KeyTuple::from(1)));
        assert_eq!(map.get(&KeyTuple::from(2)), Some(widget));
        assert_eq!(map.len(), 1);
    }
}
