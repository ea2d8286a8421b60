// ============================================================================
// Property Type Registry
// ============================================================================
//
// Every property type class (built-in or application-declared) is an entry
// in this registry. A subtype copies its parent's accepted options and option
// defaults at declaration time; later changes on the parent only reach
// descendants that have not configured that option themselves.
//
// ============================================================================

use super::kinds::Kind;
use super::options::{OptionName, OptionValue, PropertyOptions};
use crate::config::MapperConfig;
use crate::core::{MapperError, Result, Value};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::BTreeMap;

lazy_static! {
    static ref TYPE_NAME: Regex =
        Regex::new(r"^[A-Z][A-Za-z0-9_]*(::[A-Z][A-Za-z0-9_]*)*$").expect("valid type name regex");
}

/// Options every property type accepts.
const PROPERTY_OPTIONS: &[OptionName] = &[
    OptionName::Accessor,
    OptionName::Reader,
    OptionName::Writer,
    OptionName::Lazy,
    OptionName::Default,
    OptionName::Key,
    OptionName::Field,
    OptionName::Index,
    OptionName::UniqueIndex,
    OptionName::Unique,
    OptionName::Required,
    OptionName::AllowNil,
    OptionName::AllowBlank,
    OptionName::Lock,
];

pub const DEFAULT_PRECISION: usize = 10;
pub const DEFAULT_DECIMAL_SCALE: usize = 0;

/// A registered property type.
#[derive(Debug, Clone)]
pub struct TypeClass {
    name: String,
    parent: Option<String>,
    /// `None` for abstract types such as `Property` and `Numeric`.
    kind: Option<Kind>,
    accepted_options: Vec<OptionName>,
    defaults: PropertyOptions,
    children: Vec<String>,
}

impl TypeClass {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    pub fn kind(&self) -> Option<Kind> {
        self.kind
    }

    pub fn is_abstract(&self) -> bool {
        self.kind.is_none()
    }

    pub fn accepted_options(&self) -> &[OptionName] {
        &self.accepted_options
    }

    pub fn accepts(&self, option: OptionName) -> bool {
        self.accepted_options.contains(&option)
    }

    pub fn option_default(&self, option: OptionName) -> Option<&OptionValue> {
        self.defaults.get(&option)
    }

    pub fn defaults(&self) -> &PropertyOptions {
        &self.defaults
    }

    pub fn children(&self) -> &[String] {
        &self.children
    }
}

/// Registry of property type classes, one per model registry.
#[derive(Debug, Clone)]
pub struct TypeRegistry {
    classes: BTreeMap<String, TypeClass>,
}

impl TypeRegistry {
    /// Registry holding the built-in type hierarchy, with length defaults
    /// taken from `config`.
    pub fn new(config: &MapperConfig) -> Self {
        let mut registry = Self {
            classes: BTreeMap::new(),
        };

        registry.classes.insert(
            "Property".to_string(),
            TypeClass {
                name: "Property".to_string(),
                parent: None,
                kind: None,
                accepted_options: PROPERTY_OPTIONS.to_vec(),
                defaults: PropertyOptions::new(),
                children: Vec::new(),
            },
        );

        registry.builtin("Object", "Property", Some(Kind::Object), &[]);
        registry.builtin("Boolean", "Property", Some(Kind::Boolean), &[]);

        registry.builtin(
            "String",
            "Property",
            Some(Kind::String),
            &[OptionName::Length, OptionName::Format],
        );
        registry.builtin_default("String", OptionName::Length, config.string_length);

        registry.builtin("Text", "String", Some(Kind::Text), &[]);
        registry.builtin_default("Text", OptionName::Length, config.text_length);
        registry.builtin_default("Text", OptionName::Lazy, true);

        registry.builtin("Binary", "String", Some(Kind::Binary), &[]);
        registry.builtin_default("Binary", OptionName::Length, config.binary_length);

        registry.builtin(
            "Numeric",
            "Property",
            None,
            &[
                OptionName::Precision,
                OptionName::Scale,
                OptionName::Min,
                OptionName::Max,
            ],
        );

        registry.builtin("Integer", "Numeric", Some(Kind::Integer), &[OptionName::Serial]);
        registry.builtin("Serial", "Integer", Some(Kind::Integer), &[]);
        registry.builtin_default("Serial", OptionName::Serial, true);
        registry.builtin_default("Serial", OptionName::Min, OptionValue::Bound(Value::Integer(1)));

        registry.builtin("Float", "Numeric", Some(Kind::Float), &[]);
        registry.builtin_default("Float", OptionName::Precision, DEFAULT_PRECISION);

        registry.builtin("Decimal", "Numeric", Some(Kind::Decimal), &[]);
        registry.builtin_default("Decimal", OptionName::Precision, DEFAULT_PRECISION);
        registry.builtin_default("Decimal", OptionName::Scale, DEFAULT_DECIMAL_SCALE);

        registry.builtin("Date", "Property", Some(Kind::Date), &[]);
        registry.builtin("DateTime", "Property", Some(Kind::DateTime), &[]);
        registry.builtin("Time", "Property", Some(Kind::Time), &[]);

        registry.builtin("Class", "Property", Some(Kind::Class), &[]);
        registry.builtin("Discriminator", "Class", Some(Kind::Discriminator), &[]);
        registry.builtin_default("Discriminator", OptionName::Required, true);

        registry
    }

    fn builtin(&mut self, name: &str, parent: &str, kind: Option<Kind>, options: &[OptionName]) {
        self.insert_subtype(name, parent, kind);
        if let Some(class) = self.classes.get_mut(name) {
            for option in options {
                if !class.accepted_options.contains(option) {
                    class.accepted_options.push(*option);
                }
            }
        }
    }

    fn builtin_default(&mut self, name: &str, option: OptionName, value: impl Into<OptionValue>) {
        if let Some(class) = self.classes.get_mut(name) {
            class.defaults.insert(option, value.into());
        }
    }

    fn insert_subtype(&mut self, name: &str, parent: &str, kind: Option<Kind>) {
        let Some(parent_class) = self.classes.get_mut(parent) else {
            return;
        };
        parent_class.children.push(name.to_string());
        let class = TypeClass {
            name: name.to_string(),
            parent: Some(parent.to_string()),
            kind: kind.or(parent_class.kind),
            accepted_options: parent_class.accepted_options.clone(),
            defaults: parent_class.defaults.clone(),
            children: Vec::new(),
        };
        self.classes.insert(name.to_string(), class);
    }

    /// Declare an application type deriving from `parent`.
    pub fn declare(&mut self, name: &str, parent: &str) -> Result<()> {
        if !TYPE_NAME.is_match(name) {
            return Err(MapperError::InvalidName(name.to_string()));
        }
        if self.classes.contains_key(name) {
            return Err(MapperError::DuplicateType(name.to_string()));
        }
        if !self.classes.contains_key(parent) {
            return Err(MapperError::UnknownType(parent.to_string()));
        }
        self.insert_subtype(name, parent, None);
        Ok(())
    }

    /// Extend the accepted options of `name` and every type derived from it.
    pub fn accept_options(&mut self, name: &str, options: &[OptionName]) -> Result<()> {
        for type_name in self.subtree(name)? {
            if let Some(class) = self.classes.get_mut(&type_name) {
                for option in options {
                    if !class.accepted_options.contains(option) {
                        class.accepted_options.push(*option);
                    }
                }
            }
        }
        Ok(())
    }

    /// Set the default for `option` on `name`.
    ///
    /// Descendants without a value of their own pick it up; descendants that
    /// were configured independently keep theirs, as do their subtypes.
    pub fn set_default(
        &mut self,
        name: &str,
        option: OptionName,
        value: impl Into<OptionValue>,
    ) -> Result<()> {
        let class = self.get(name)?;
        if !class.accepts(option) {
            return Err(MapperError::UnsupportedOption {
                type_name: name.to_string(),
                option: option.to_string(),
            });
        }
        let value = value.into();

        let mut pending = class.children.clone();
        while let Some(child) = pending.pop() {
            let Some(child_class) = self.classes.get_mut(&child) else {
                continue;
            };
            if child_class.defaults.contains_key(&option) {
                continue;
            }
            child_class.defaults.insert(option, value.clone());
            pending.extend(child_class.children.iter().cloned());
        }

        if let Some(class) = self.classes.get_mut(name) {
            class.defaults.insert(option, value);
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&TypeClass> {
        self.classes
            .get(name)
            .ok_or_else(|| MapperError::UnknownType(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    /// Whether `name` is `ancestor` or derives from it.
    pub fn is_a(&self, name: &str, ancestor: &str) -> bool {
        let mut current = self.classes.get(name);
        while let Some(class) = current {
            if class.name == ancestor {
                return true;
            }
            current = class.parent.as_deref().and_then(|p| self.classes.get(p));
        }
        false
    }

    fn subtree(&self, name: &str) -> Result<Vec<String>> {
        self.get(name)?;
        let mut names = Vec::new();
        let mut pending = vec![name.to_string()];
        while let Some(current) = pending.pop() {
            if let Some(class) = self.classes.get(&current) {
                pending.extend(class.children.iter().cloned());
            }
            names.push(current);
        }
        Ok(names)
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new(&MapperConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn length_of(registry: &TypeRegistry, name: &str) -> Option<usize> {
        match registry.get(name).unwrap().option_default(OptionName::Length) {
            Some(OptionValue::Size(n)) => Some(*n),
            _ => None,
        }
    }

    #[test]
    fn test_builtin_defaults() {
        let registry = TypeRegistry::default();
        assert_eq!(length_of(&registry, "String"), Some(50));
        assert_eq!(length_of(&registry, "Text"), Some(65_535));
        assert!(registry.get("Numeric").unwrap().is_abstract());
        assert!(registry.is_a("Serial", "Numeric"));
        assert!(registry.is_a("Discriminator", "Class"));
        assert!(!registry.is_a("Text", "Numeric"));
    }

    #[test]
    fn test_subtype_extends_options_without_touching_parent() {
        let mut registry = TypeRegistry::default();
        registry.declare("Slug", "String").unwrap();
        registry.accept_options("Slug", &[OptionName::Min]).unwrap();

        assert!(registry.get("Slug").unwrap().accepts(OptionName::Min));
        assert!(registry.get("Slug").unwrap().accepts(OptionName::Length));
        assert!(!registry.get("String").unwrap().accepts(OptionName::Min));
    }

    #[test]
    fn test_parent_option_extension_reaches_descendants() {
        let mut registry = TypeRegistry::default();
        registry.declare("Slug", "String").unwrap();
        registry.accept_options("String", &[OptionName::Min]).unwrap();

        assert!(registry.get("Slug").unwrap().accepts(OptionName::Min));
        assert!(registry.get("Text").unwrap().accepts(OptionName::Min));
    }

    #[test]
    fn test_redeclared_default_skips_configured_descendant() {
        let mut registry = TypeRegistry::default();
        registry.declare("Slug", "String").unwrap();
        registry.declare("ShortSlug", "Slug").unwrap();
        registry.set_default("ShortSlug", OptionName::Length, 8usize).unwrap();

        registry.set_default("Slug", OptionName::Length, 120usize).unwrap();

        assert_eq!(length_of(&registry, "Slug"), Some(120));
        assert_eq!(length_of(&registry, "ShortSlug"), Some(8));
        assert_eq!(length_of(&registry, "String"), Some(50));
    }

    #[test]
    fn test_default_fills_descendants_without_value() {
        let mut registry = TypeRegistry::default();
        registry.declare("Code", "String").unwrap();
        registry.declare("CountryCode", "Code").unwrap();

        registry.set_default("Code", OptionName::Format, OptionValue::Pattern("^[A-Z]+$".into())).unwrap();

        assert!(registry.get("CountryCode").unwrap().option_default(OptionName::Format).is_some());
    }

    #[test]
    fn test_declaration_errors() {
        let mut registry = TypeRegistry::default();
        assert!(matches!(registry.declare("lower", "String"), Err(MapperError::InvalidName(_))));
        assert!(matches!(registry.declare("Text", "String"), Err(MapperError::DuplicateType(_))));
        assert!(matches!(registry.declare("Thing", "Missing"), Err(MapperError::UnknownType(_))));
        assert!(matches!(
            registry.set_default("Boolean", OptionName::Length, 3usize),
            Err(MapperError::UnsupportedOption { .. })
        ));
    }
}
