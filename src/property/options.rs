use crate::core::Value;
use crate::property::Property;
use crate::resource::Resource;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

/// Computes a default from the resource being committed and the descriptor.
pub type DefaultFn = Rc<dyn Fn(&Resource, &Property) -> Value>;

/// Every option a property declaration may carry.
///
/// Which of these a given type accepts is decided by its
/// [`TypeRegistry`](crate::property::TypeRegistry) entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OptionName {
    Accessor,
    Reader,
    Writer,
    Lazy,
    Default,
    Key,
    Serial,
    Field,
    Index,
    UniqueIndex,
    Unique,
    Required,
    AllowNil,
    AllowBlank,
    Lock,
    Length,
    Format,
    Precision,
    Scale,
    Min,
    Max,
}

impl OptionName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accessor => "accessor",
            Self::Reader => "reader",
            Self::Writer => "writer",
            Self::Lazy => "lazy",
            Self::Default => "default",
            Self::Key => "key",
            Self::Serial => "serial",
            Self::Field => "field",
            Self::Index => "index",
            Self::UniqueIndex => "unique_index",
            Self::Unique => "unique",
            Self::Required => "required",
            Self::AllowNil => "allow_nil",
            Self::AllowBlank => "allow_blank",
            Self::Lock => "lock",
            Self::Length => "length",
            Self::Format => "format",
            Self::Precision => "precision",
            Self::Scale => "scale",
            Self::Min => "min",
            Self::Max => "max",
        }
    }
}

impl fmt::Display for OptionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    #[default]
    Public,
    Protected,
    Private,
}

#[derive(Clone)]
pub enum DefaultValue {
    Static(Value),
    Computed(DefaultFn),
}

impl fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(value) => f.debug_tuple("Static").field(value).finish(),
            Self::Computed(_) => f.write_str("Computed(<fn>)"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum OptionValue {
    Flag(bool),
    Size(usize),
    Bound(Value),
    /// Field name, index name or lazy group name.
    Name(String),
    /// Regular expression source, compiled when the property is built.
    Pattern(String),
    Visibility(Visibility),
    Default(DefaultValue),
}

impl OptionValue {
    pub(crate) fn kind_name(&self) -> &'static str {
        match self {
            Self::Flag(_) => "flag",
            Self::Size(_) => "size",
            Self::Bound(_) => "bound",
            Self::Name(_) => "name",
            Self::Pattern(_) => "pattern",
            Self::Visibility(_) => "visibility",
            Self::Default(_) => "default",
        }
    }
}

impl From<bool> for OptionValue {
    fn from(flag: bool) -> Self {
        Self::Flag(flag)
    }
}

impl From<usize> for OptionValue {
    fn from(size: usize) -> Self {
        Self::Size(size)
    }
}

impl From<Visibility> for OptionValue {
    fn from(visibility: Visibility) -> Self {
        Self::Visibility(visibility)
    }
}

pub type PropertyOptions = BTreeMap<OptionName, OptionValue>;

/// Declaration of a single property, checked against the type registry when
/// the owning model is registered.
#[derive(Debug, Clone)]
pub struct PropertySpec {
    pub(crate) name: String,
    pub(crate) type_name: String,
    pub(crate) options: PropertyOptions,
}

impl PropertySpec {
    pub fn new(name: &str, type_name: &str) -> Self {
        Self {
            name: name.to_string(),
            type_name: type_name.to_string(),
            options: PropertyOptions::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Set any option by name.
    pub fn option(mut self, name: OptionName, value: impl Into<OptionValue>) -> Self {
        self.options.insert(name, value.into());
        self
    }

    pub fn required(self, required: bool) -> Self {
        self.option(OptionName::Required, required)
    }

    pub fn allow_nil(self, allow: bool) -> Self {
        self.option(OptionName::AllowNil, allow)
    }

    pub fn allow_blank(self, allow: bool) -> Self {
        self.option(OptionName::AllowBlank, allow)
    }

    pub fn key(self, key: bool) -> Self {
        self.option(OptionName::Key, key)
    }

    pub fn serial(self, serial: bool) -> Self {
        self.option(OptionName::Serial, serial)
    }

    pub fn lock(self, lock: bool) -> Self {
        self.option(OptionName::Lock, lock)
    }

    pub fn index(self, index: bool) -> Self {
        self.option(OptionName::Index, index)
    }

    pub fn unique(self, unique: bool) -> Self {
        self.option(OptionName::Unique, unique)
    }

    pub fn unique_index(self, index: bool) -> Self {
        self.option(OptionName::UniqueIndex, index)
    }

    pub fn length(self, length: usize) -> Self {
        self.option(OptionName::Length, length)
    }

    pub fn precision(self, precision: usize) -> Self {
        self.option(OptionName::Precision, precision)
    }

    pub fn scale(self, scale: usize) -> Self {
        self.option(OptionName::Scale, scale)
    }

    pub fn min(self, min: impl Into<Value>) -> Self {
        self.option(OptionName::Min, OptionValue::Bound(min.into()))
    }

    pub fn max(self, max: impl Into<Value>) -> Self {
        self.option(OptionName::Max, OptionValue::Bound(max.into()))
    }

    pub fn format(self, pattern: &str) -> Self {
        self.option(OptionName::Format, OptionValue::Pattern(pattern.to_string()))
    }

    pub fn field(self, field: &str) -> Self {
        self.option(OptionName::Field, OptionValue::Name(field.to_string()))
    }

    /// Lazy-load this property on its own.
    pub fn lazy(self, lazy: bool) -> Self {
        self.option(OptionName::Lazy, lazy)
    }

    /// Lazy-load this property together with the rest of `group`.
    pub fn lazy_in(self, group: &str) -> Self {
        self.option(OptionName::Lazy, OptionValue::Name(group.to_string()))
    }

    pub fn accessor(self, visibility: Visibility) -> Self {
        self.option(OptionName::Accessor, visibility)
    }

    pub fn reader(self, visibility: Visibility) -> Self {
        self.option(OptionName::Reader, visibility)
    }

    pub fn writer(self, visibility: Visibility) -> Self {
        self.option(OptionName::Writer, visibility)
    }

    pub fn default_value(self, value: impl Into<Value>) -> Self {
        self.option(
            OptionName::Default,
            OptionValue::Default(DefaultValue::Static(value.into())),
        )
    }

    pub fn default_with<F>(self, compute: F) -> Self
    where
        F: Fn(&Resource, &Property) -> Value + 'static,
    {
        self.option(
            OptionName::Default,
            OptionValue::Default(DefaultValue::Computed(Rc::new(compute))),
        )
    }
}
