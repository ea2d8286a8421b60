//! Property descriptors and the type/typecast engine.
//!
//! A [`Property`] is built once per model attribute from a [`PropertySpec`],
//! checked against the [`TypeRegistry`], and then used by the persistence
//! states for typecasting, validation, defaults and load/dump conversion.

pub mod kinds;
pub mod numeric;
pub mod options;
pub mod registry;
pub mod temporal;

pub use kinds::{Kind, PropertyType};
pub use options::{
    DefaultFn, DefaultValue, OptionName, OptionValue, PropertyOptions, PropertySpec, Visibility,
};
pub use registry::{TypeClass, TypeRegistry};

use crate::core::{InvalidValueError, MapperError, Primitive, Result, Value};
use crate::model::Namespace;
use crate::resource::Resource;
use lazy_static::lazy_static;
use regex::Regex;
use std::borrow::Cow;
use std::rc::Rc;

lazy_static! {
    static ref PROPERTY_NAME: Regex =
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid property name regex");
}

/// A named, typed attribute declaration on a model.
#[derive(Debug, Clone)]
pub struct Property {
    name: String,
    model_name: String,
    type_name: String,
    kind: Kind,
    options: PropertyOptions,
    field: String,
    key: bool,
    serial: bool,
    required: bool,
    allow_nil: bool,
    allow_blank: bool,
    lock: bool,
    lazy: Option<String>,
    reader: Visibility,
    writer: Visibility,
    index: bool,
    unique_index: bool,
    unique: bool,
    length: Option<usize>,
    precision: Option<usize>,
    scale: Option<usize>,
    min: Option<Value>,
    max: Option<Value>,
    format: Option<Regex>,
    default: Option<DefaultValue>,
    namespace: Namespace,
}

impl Property {
    /// Build a descriptor for `model_name` from `spec`.
    ///
    /// Fails when the type is unknown or abstract, when an option is not
    /// accepted by the type (own or inherited), or when option values are
    /// inconsistent.
    pub fn build(
        types: &TypeRegistry,
        namespace: &Namespace,
        model_name: &str,
        spec: PropertySpec,
    ) -> Result<Self> {
        if !PROPERTY_NAME.is_match(&spec.name) {
            return Err(MapperError::InvalidName(spec.name));
        }

        let type_class = types.get(&spec.type_name)?;
        let kind = type_class
            .kind()
            .ok_or_else(|| MapperError::AbstractType(spec.type_name.clone()))?;

        for option in spec.options.keys() {
            if !type_class.accepts(*option) {
                return Err(MapperError::UnsupportedOption {
                    type_name: spec.type_name.clone(),
                    option: option.to_string(),
                });
            }
        }

        let mut options = type_class.defaults().clone();
        options.extend(spec.options);

        let serial = flag(&options, OptionName::Serial)?.unwrap_or(false);
        let key = flag(&options, OptionName::Key)?.unwrap_or(serial);
        let required = flag(&options, OptionName::Required)?.unwrap_or(key);
        let allow_nil = flag(&options, OptionName::AllowNil)?.unwrap_or(!required);
        let allow_blank = flag(&options, OptionName::AllowBlank)?.unwrap_or(!required);

        let lazy = match options.get(&OptionName::Lazy) {
            None | Some(OptionValue::Flag(false)) => None,
            Some(OptionValue::Flag(true)) => Some(spec.name.clone()),
            Some(OptionValue::Name(group)) => Some(group.clone()),
            Some(other) => return Err(wrong_kind(OptionName::Lazy, other)),
        };
        // Keys are always part of the default load
        let lazy = if key { None } else { lazy };

        let accessor = visibility(&options, OptionName::Accessor)?.unwrap_or_default();
        let reader = visibility(&options, OptionName::Reader)?.unwrap_or(accessor);
        let writer = visibility(&options, OptionName::Writer)?.unwrap_or(accessor);

        let field = match options.get(&OptionName::Field) {
            None => spec.name.clone(),
            Some(OptionValue::Name(field)) if !field.is_empty() => field.clone(),
            Some(other) => return Err(wrong_kind(OptionName::Field, other)),
        };

        let precision = size(&options, OptionName::Precision)?;
        let scale = size(&options, OptionName::Scale)?;
        if let (Some(precision), Some(scale)) = (precision, scale) {
            if precision < scale {
                return Err(MapperError::PrecisionLessThanScale {
                    property: spec.name,
                    precision,
                    scale,
                });
            }
        }
        if precision == Some(0) {
            return Err(MapperError::InvalidOptionValue {
                option: OptionName::Precision.to_string(),
                reason: "precision must be at least 1".to_string(),
            });
        }

        let format = match options.get(&OptionName::Format) {
            None => None,
            Some(OptionValue::Pattern(source)) => {
                Some(Regex::new(source).map_err(|e| MapperError::InvalidOptionValue {
                    option: OptionName::Format.to_string(),
                    reason: e.to_string(),
                })?)
            }
            Some(other) => return Err(wrong_kind(OptionName::Format, other)),
        };

        let default = match options.get(&OptionName::Default) {
            None => None,
            Some(OptionValue::Default(default)) => Some(default.clone()),
            Some(OptionValue::Bound(value)) => Some(DefaultValue::Static(value.clone())),
            Some(other) => return Err(wrong_kind(OptionName::Default, other)),
        };

        Ok(Self {
            model_name: model_name.to_string(),
            type_name: spec.type_name,
            kind,
            field,
            key,
            serial,
            required,
            allow_nil,
            allow_blank,
            lock: flag(&options, OptionName::Lock)?.unwrap_or(false),
            lazy,
            reader,
            writer,
            index: indexed(&options, OptionName::Index)?,
            unique_index: indexed(&options, OptionName::UniqueIndex)?,
            unique: flag(&options, OptionName::Unique)?.unwrap_or(false),
            length: size(&options, OptionName::Length)?,
            precision,
            scale,
            min: bound(&options, OptionName::Min)?,
            max: bound(&options, OptionName::Max)?,
            format,
            default,
            namespace: namespace.clone(),
            name: spec.name,
            options,
        })
    }

    /// Copy of this descriptor owned by another model (single-table subtypes).
    pub(crate) fn rebind(&self, model_name: &str) -> Self {
        let mut property = self.clone();
        property.model_name = model_name.to_string();
        property
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    /// Merged option set: type defaults overlaid with the declaration.
    pub fn options(&self) -> &PropertyOptions {
        &self.options
    }

    /// Storage field name.
    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn is_key(&self) -> bool {
        self.key
    }

    pub fn is_serial(&self) -> bool {
        self.serial
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn allows_nil(&self) -> bool {
        self.allow_nil
    }

    pub fn allows_blank(&self) -> bool {
        self.allow_blank
    }

    pub fn is_lock(&self) -> bool {
        self.lock
    }

    pub fn is_lazy(&self) -> bool {
        self.lazy.is_some()
    }

    pub fn lazy_group(&self) -> Option<&str> {
        self.lazy.as_deref()
    }

    pub fn reader_visibility(&self) -> Visibility {
        self.reader
    }

    pub fn writer_visibility(&self) -> Visibility {
        self.writer
    }

    pub fn is_indexed(&self) -> bool {
        self.index
    }

    pub fn is_unique_index(&self) -> bool {
        self.unique_index
    }

    pub fn is_unique(&self) -> bool {
        self.unique || self.unique_index
    }

    pub fn length(&self) -> Option<usize> {
        self.length
    }

    pub fn precision(&self) -> Option<usize> {
        self.precision
    }

    pub fn scale(&self) -> Option<usize> {
        self.scale
    }

    pub fn min(&self) -> Option<&Value> {
        self.min.as_ref()
    }

    pub fn max(&self) -> Option<&Value> {
        self.max.as_ref()
    }

    pub fn format(&self) -> Option<&Regex> {
        self.format.as_ref()
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Runtime primitive (`load_as`).
    pub fn primitive(&self) -> Primitive {
        self.kind.behaviour().primitive()
    }

    /// Storage primitive (`dump_as`).
    pub fn dump_as(&self) -> Primitive {
        self.kind.behaviour().dump_as()
    }

    /// Best-effort coercion into the runtime primitive.
    ///
    /// Values already in primitive form (and nulls) come back borrowed; a
    /// value that cannot be coerced also comes back borrowed and unchanged,
    /// leaving the failure to validation.
    pub fn typecast<'a>(&self, value: &'a Value) -> Cow<'a, Value> {
        if value.is_null() || self.primitive().matches(value) {
            return Cow::Borrowed(value);
        }
        match self.kind.behaviour().typecast_to_primitive(self, value) {
            Some(cast) => Cow::Owned(cast),
            None => Cow::Borrowed(value),
        }
    }

    pub fn valid(&self, value: &Value) -> bool {
        self.valid_with(value, false)
    }

    /// Validity check; `negated` admits nil regardless of requiredness.
    pub fn valid_with(&self, value: &Value, negated: bool) -> bool {
        if value.is_null() {
            return if self.required {
                negated
            } else {
                self.allow_nil || negated
            };
        }
        if !self.primitive().matches(value) {
            return false;
        }
        if !self.allow_blank && is_blank(value) {
            return false;
        }
        self.kind.behaviour().valid_primitive(self, value)
    }

    pub fn assert_valid_value(self: &Rc<Self>, value: &Value) -> Result<()> {
        if self.valid(value) {
            Ok(())
        } else {
            Err(InvalidValueError::new(Rc::clone(self), value.clone()).into())
        }
    }

    /// Storage primitive to runtime primitive.
    pub fn load(&self, value: Value) -> Value {
        let loaded = self.kind.behaviour().load(self, value);
        let cast = match self.typecast(&loaded) {
            Cow::Owned(cast) => Some(cast),
            Cow::Borrowed(_) => None,
        };
        cast.unwrap_or(loaded)
    }

    /// Runtime primitive to storage primitive.
    pub fn dump(&self, value: &Value) -> Value {
        self.kind.behaviour().dump(self, value)
    }

    pub fn has_default(&self) -> bool {
        self.default.is_some() || self.kind == Kind::Discriminator
    }

    /// Default for `resource`; computed defaults run on every call.
    pub fn default_for(&self, resource: &Resource) -> Value {
        match &self.default {
            Some(DefaultValue::Static(value)) => value.clone(),
            Some(DefaultValue::Computed(compute)) => compute(resource, self),
            None if self.kind == Kind::Discriminator => {
                Value::Class(resource.model().name().to_string())
            }
            None => Value::Null,
        }
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Text(text) => text.trim().is_empty(),
        Value::Binary(bytes) => bytes.is_empty(),
        Value::List(items) => items.is_empty(),
        Value::Map(map) => map.is_empty(),
        _ => false,
    }
}

fn wrong_kind(option: OptionName, value: &OptionValue) -> MapperError {
    MapperError::InvalidOptionValue {
        option: option.to_string(),
        reason: format!("unexpected {} value", value.kind_name()),
    }
}

fn flag(options: &PropertyOptions, name: OptionName) -> Result<Option<bool>> {
    match options.get(&name) {
        None => Ok(None),
        Some(OptionValue::Flag(flag)) => Ok(Some(*flag)),
        Some(other) => Err(wrong_kind(name, other)),
    }
}

fn size(options: &PropertyOptions, name: OptionName) -> Result<Option<usize>> {
    match options.get(&name) {
        None => Ok(None),
        Some(OptionValue::Size(size)) => Ok(Some(*size)),
        Some(other) => Err(wrong_kind(name, other)),
    }
}

fn bound(options: &PropertyOptions, name: OptionName) -> Result<Option<Value>> {
    match options.get(&name) {
        None => Ok(None),
        Some(OptionValue::Bound(value)) if value.is_numeric() => Ok(Some(value.clone())),
        Some(other) => Err(wrong_kind(name, other)),
    }
}

fn visibility(options: &PropertyOptions, name: OptionName) -> Result<Option<Visibility>> {
    match options.get(&name) {
        None => Ok(None),
        Some(OptionValue::Visibility(visibility)) => Ok(Some(*visibility)),
        Some(other) => Err(wrong_kind(name, other)),
    }
}

fn indexed(options: &PropertyOptions, name: OptionName) -> Result<bool> {
    match options.get(&name) {
        None => Ok(false),
        Some(OptionValue::Flag(flag)) => Ok(*flag),
        Some(OptionValue::Name(_)) => Ok(true),
        Some(other) => Err(wrong_kind(name, other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use std::collections::BTreeMap;

    fn build(spec: PropertySpec) -> Result<Property> {
        let namespace = Namespace::default();
        namespace.register("Blog::Post");
        namespace.register("Blog::Comment");
        namespace.register("Comment");
        Property::build(&TypeRegistry::default(), &namespace, "Blog::Post", spec)
    }

    fn property(name: &str, type_name: &str) -> Property {
        build(PropertySpec::new(name, type_name)).unwrap()
    }

    fn cast(property: &Property, value: impl Into<Value>) -> Value {
        property.typecast(&value.into()).into_owned()
    }

    #[test]
    fn test_boolean_typecast_table() {
        let flag = property("published", "Boolean");
        for input in ["1", "t", "T", "true", "TRUE"] {
            assert_eq!(cast(&flag, input), Value::Boolean(true), "{input}");
        }
        for input in ["0", "f", "F", "false", "FALSE"] {
            assert_eq!(cast(&flag, input), Value::Boolean(false), "{input}");
        }
        assert_eq!(cast(&flag, 1), Value::Boolean(true));
        assert_eq!(cast(&flag, 0), Value::Boolean(false));
        assert_eq!(cast(&flag, "maybe"), Value::from("maybe"));
        assert_eq!(cast(&flag, 2), Value::Integer(2));
    }

    #[test]
    fn test_primitive_values_come_back_borrowed() {
        let count = property("count", "Integer");
        let value = Value::Integer(7);
        assert!(matches!(count.typecast(&value), Cow::Borrowed(v) if std::ptr::eq(v, &value)));

        let junk = Value::from("seven");
        assert!(matches!(count.typecast(&junk), Cow::Borrowed(_)));
    }

    #[test]
    fn test_numeric_typecasts() {
        let integer = property("count", "Integer");
        let float = property("ratio", "Float");
        let decimal = build(PropertySpec::new("price", "Decimal").precision(8).scale(2)).unwrap();

        assert_eq!(cast(&integer, "-12"), Value::Integer(-12));
        assert_eq!(cast(&integer, "3.9"), Value::Integer(3));
        assert_eq!(cast(&integer, 3.9), Value::Integer(3));
        assert_eq!(cast(&float, ".41"), Value::Float(0.41));
        assert_eq!(cast(&float, 2), Value::Float(2.0));
        assert_eq!(cast(&decimal, ".41"), Value::Decimal(Decimal::new(41, 2)));
        assert_eq!(cast(&decimal, 5), Value::Decimal(Decimal::from(5)));
        assert_eq!(cast(&integer, "1e5"), Value::from("1e5"));
        assert_eq!(cast(&float, true), Value::Boolean(true));
    }

    #[test]
    fn test_class_typecast_resolves_relative_to_model() {
        let kind = property("kind", "Class");
        assert_eq!(cast(&kind, "Comment"), Value::Class("Blog::Comment".into()));
        assert_eq!(cast(&kind, "Missing"), Value::from("Missing"));
    }

    #[test]
    fn test_date_typecast_from_components_and_text() {
        let day = property("published_on", "Date");
        let mut parts = BTreeMap::new();
        parts.insert("year".to_string(), Value::Integer(2024));
        parts.insert("month".to_string(), Value::Integer(5));
        parts.insert("day".to_string(), Value::Integer(17));

        let expected = Value::Date(NaiveDate::from_ymd_opt(2024, 5, 17).unwrap());
        assert_eq!(cast(&day, Value::Map(parts)), expected);
        assert_eq!(cast(&day, "2024-05-17"), expected);
        assert_eq!(cast(&day, "someday"), Value::from("someday"));
    }

    #[test]
    fn test_string_defaults_and_validation() {
        let title = build(PropertySpec::new("title", "String").required(true)).unwrap();
        assert_eq!(title.length(), Some(50));
        assert!(title.valid(&Value::from("x".repeat(50))));
        assert!(!title.valid(&Value::from("x".repeat(51))));
        assert!(!title.valid(&Value::Null));
        assert!(title.valid_with(&Value::Null, true));
        assert!(!title.valid(&Value::from("   ")));
        assert!(!title.valid(&Value::Integer(3)));

        let body = property("body", "Text");
        assert!(body.is_lazy());
        assert_eq!(body.length(), Some(65_535));
        assert!(body.valid(&Value::Null));
    }

    #[test]
    fn test_format_option() {
        let code = build(PropertySpec::new("code", "String").format("^[A-Z]{3}$")).unwrap();
        assert!(code.valid(&Value::from("ABC")));
        assert!(!code.valid(&Value::from("abc")));

        let bad = build(PropertySpec::new("code", "String").format("(["));
        assert!(matches!(bad, Err(MapperError::InvalidOptionValue { .. })));
    }

    #[test]
    fn test_numeric_bounds_and_precision() {
        let age = build(PropertySpec::new("age", "Integer").min(0).max(150)).unwrap();
        assert!(age.valid(&Value::Integer(0)));
        assert!(!age.valid(&Value::Integer(-1)));
        assert!(!age.valid(&Value::Integer(151)));

        let price = build(PropertySpec::new("price", "Decimal").precision(5).scale(2)).unwrap();
        assert!(price.valid(&Value::Decimal(Decimal::new(99999, 2))));
        assert!(!price.valid(&Value::Decimal(Decimal::new(100000, 2))));
        assert!(!price.valid(&Value::Decimal(Decimal::new(1234, 3))));
    }

    #[test]
    fn test_serial_implies_key_and_required() {
        let id = property("id", "Serial");
        assert!(id.is_serial());
        assert!(id.is_key());
        assert!(id.is_required());
        assert!(!id.valid(&Value::Integer(0)));
    }

    #[test]
    fn test_construction_errors() {
        assert!(matches!(
            build(PropertySpec::new("flag", "Boolean").length(3)),
            Err(MapperError::UnsupportedOption { .. })
        ));
        assert!(matches!(
            build(PropertySpec::new("amount", "Decimal").precision(2).scale(4)),
            Err(MapperError::PrecisionLessThanScale { .. })
        ));
        assert!(matches!(
            build(PropertySpec::new("x", "Numeric")),
            Err(MapperError::AbstractType(_))
        ));
        assert!(matches!(
            build(PropertySpec::new("x", "Currency")),
            Err(MapperError::UnknownType(_))
        ));
        assert!(matches!(
            build(PropertySpec::new("9lives", "String")),
            Err(MapperError::InvalidName(_))
        ));
        assert!(matches!(
            build(PropertySpec::new("x", "String").option(OptionName::Length, true)),
            Err(MapperError::InvalidOptionValue { .. })
        ));
    }

    #[test]
    fn test_binary_forces_bytes_on_load_and_dump() {
        let blob = property("blob", "Binary");
        assert_eq!(blob.dump(&Value::from("ab")), Value::Binary(vec![b'a', b'b']));
        assert_eq!(blob.load(Value::from("ab")), Value::Binary(vec![b'a', b'b']));
    }

    #[test]
    fn test_object_dumps_json_text() {
        let meta = property("meta", "Object");
        let mut map = BTreeMap::new();
        map.insert("tags".to_string(), Value::List(vec![Value::from("a")]));
        let value = Value::Map(map);

        let dumped = meta.dump(&value);
        assert_eq!(dumped, Value::from(r#"{"Map":{"tags":{"List":[{"Text":"a"}]}}}"#));
        assert_eq!(meta.load(dumped), value);
    }

    #[test]
    fn test_object_keeps_typed_leaves() {
        let meta = property("meta", "Object");
        let mut map = BTreeMap::new();
        map.insert(
            "on".to_string(),
            Value::Date(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()),
        );
        map.insert("price".to_string(), Value::Decimal(Decimal::new(150, 2)));
        map.insert("raw".to_string(), Value::Binary(vec![0, 255]));
        map.insert("kind".to_string(), Value::Class("Post".into()));
        let value = Value::Map(map);

        assert!(meta.valid(&value));
        assert_eq!(meta.load(meta.dump(&value)), value);
    }

    #[test]
    fn test_object_loads_plain_json_and_refuses_non_finite_floats() {
        let meta = property("meta", "Object");
        let mut map = BTreeMap::new();
        map.insert("tags".to_string(), Value::List(vec![Value::from("a")]));
        assert_eq!(meta.load(Value::from(r#"{"tags":["a"]}"#)), Value::Map(map));

        let nested = Value::List(vec![Value::Integer(1), Value::Float(f64::NAN)]);
        assert!(!meta.valid(&nested));
        assert!(meta.valid(&Value::List(vec![Value::Float(1.5)])));
    }

    #[test]
    fn test_visibility_and_field_options() {
        let secret = build(
            PropertySpec::new("secret", "String")
                .accessor(Visibility::Private)
                .reader(Visibility::Protected)
                .field("secret_col"),
        )
        .unwrap();
        assert_eq!(secret.reader_visibility(), Visibility::Protected);
        assert_eq!(secret.writer_visibility(), Visibility::Private);
        assert_eq!(secret.field(), "secret_col");
    }
}
