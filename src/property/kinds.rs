use super::Property;
use super::numeric::{DecimalType, FloatType, IntegerType};
use super::temporal::{DateTimeType, DateType, TimeType};
use crate::core::{Primitive, Value};
use std::fmt;

/// Coercion and validation rules shared by every property of one kind.
///
/// Implemented once per built-in kind; a [`Property`] dispatches to its
/// kind's implementation instead of carrying generated accessors.
pub trait PropertyType {
    /// Runtime primitive (`load_as`).
    fn primitive(&self) -> Primitive;

    /// Storage primitive (`dump_as`).
    fn dump_as(&self) -> Primitive {
        self.primitive()
    }

    /// Coerce a non-primitive value; `None` leaves the input untouched.
    fn typecast_to_primitive(&self, property: &Property, value: &Value) -> Option<Value>;

    /// Type-specific checks for a non-null value already in primitive form.
    fn valid_primitive(&self, _property: &Property, _value: &Value) -> bool {
        true
    }

    fn load(&self, _property: &Property, value: Value) -> Value {
        value
    }

    fn dump(&self, _property: &Property, value: &Value) -> Value {
        value.clone()
    }
}

/// Dispatch tag for the built-in property kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Object,
    Boolean,
    String,
    Text,
    Binary,
    Integer,
    Float,
    Decimal,
    Date,
    DateTime,
    Time,
    Class,
    Discriminator,
}

impl Kind {
    pub fn behaviour(&self) -> &'static dyn PropertyType {
        match self {
            Self::Object => &ObjectType,
            Self::Boolean => &BooleanType,
            Self::String | Self::Text => &StringType,
            Self::Binary => &BinaryType,
            Self::Integer => &IntegerType,
            Self::Float => &FloatType,
            Self::Decimal => &DecimalType,
            Self::Date => &DateType,
            Self::DateTime => &DateTimeType,
            Self::Time => &TimeType,
            Self::Class | Self::Discriminator => &ClassType,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Integer | Self::Float | Self::Decimal)
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

pub struct ObjectType;

impl PropertyType for ObjectType {
    fn primitive(&self) -> Primitive {
        Primitive::Any
    }

    fn dump_as(&self) -> Primitive {
        Primitive::Text
    }

    fn typecast_to_primitive(&self, _property: &Property, _value: &Value) -> Option<Value> {
        None
    }

    /// Non-finite floats have no JSON form.
    fn valid_primitive(&self, _property: &Property, value: &Value) -> bool {
        json_safe(value)
    }

    /// Reads the tagged form written by `dump`; plain JSON documents written
    /// by other tools load through the untyped mapping.
    fn load(&self, _property: &Property, value: Value) -> Value {
        match value {
            Value::Text(text) => match serde_json::from_str::<Value>(&text) {
                Ok(loaded) => loaded,
                Err(_) => match serde_json::from_str::<serde_json::Value>(&text) {
                    Ok(json) => Value::from_json(json),
                    Err(_) => Value::Text(text),
                },
            },
            other => other,
        }
    }

    fn dump(&self, _property: &Property, value: &Value) -> Value {
        match value {
            Value::Null => Value::Null,
            other => match serde_json::to_string(other) {
                Ok(text) => Value::Text(text),
                Err(err) => {
                    log::warn!("Object value could not be serialized: {}", err);
                    other.clone()
                }
            },
        }
    }
}

fn json_safe(value: &Value) -> bool {
    match value {
        Value::Float(f) => f.is_finite(),
        Value::List(items) => items.iter().all(json_safe),
        Value::Map(map) => map.values().all(json_safe),
        _ => true,
    }
}

pub struct BooleanType;

impl PropertyType for BooleanType {
    fn primitive(&self) -> Primitive {
        Primitive::Boolean
    }

    fn typecast_to_primitive(&self, _property: &Property, value: &Value) -> Option<Value> {
        match value {
            Value::Integer(1) => Some(Value::Boolean(true)),
            Value::Integer(0) => Some(Value::Boolean(false)),
            Value::Text(text) => match text.as_str() {
                "1" | "t" | "T" | "true" | "TRUE" => Some(Value::Boolean(true)),
                "0" | "f" | "F" | "false" | "FALSE" => Some(Value::Boolean(false)),
                _ => None,
            },
            _ => None,
        }
    }
}

/// `String` and `Text`.
pub struct StringType;

impl PropertyType for StringType {
    fn primitive(&self) -> Primitive {
        Primitive::Text
    }

    fn typecast_to_primitive(&self, _property: &Property, value: &Value) -> Option<Value> {
        match value {
            Value::Boolean(_)
            | Value::Integer(_)
            | Value::Float(_)
            | Value::Decimal(_)
            | Value::Date(_)
            | Value::DateTime(_)
            | Value::Time(_)
            | Value::Class(_) => Some(Value::Text(value.to_string())),
            Value::Binary(bytes) => String::from_utf8(bytes.clone()).ok().map(Value::Text),
            _ => None,
        }
    }

    fn valid_primitive(&self, property: &Property, value: &Value) -> bool {
        let Value::Text(text) = value else {
            return false;
        };
        if let Some(length) = property.length() {
            if text.chars().count() > length {
                return false;
            }
        }
        match property.format() {
            Some(format) => format.is_match(text),
            None => true,
        }
    }
}

pub struct BinaryType;

impl PropertyType for BinaryType {
    fn primitive(&self) -> Primitive {
        Primitive::Binary
    }

    fn typecast_to_primitive(&self, _property: &Property, value: &Value) -> Option<Value> {
        match value {
            Value::Text(text) => Some(Value::Binary(text.as_bytes().to_vec())),
            _ => None,
        }
    }

    fn valid_primitive(&self, property: &Property, value: &Value) -> bool {
        match (value, property.length()) {
            (Value::Binary(bytes), Some(length)) => bytes.len() <= length,
            (Value::Binary(_), None) => true,
            _ => false,
        }
    }

    fn load(&self, _property: &Property, value: Value) -> Value {
        match value {
            Value::Text(text) => Value::Binary(text.into_bytes()),
            other => other,
        }
    }

    fn dump(&self, _property: &Property, value: &Value) -> Value {
        match value {
            Value::Text(text) => Value::Binary(text.as_bytes().to_vec()),
            other => other.clone(),
        }
    }
}

/// `Class` and `Discriminator`: values name registered models.
pub struct ClassType;

impl PropertyType for ClassType {
    fn primitive(&self) -> Primitive {
        Primitive::Class
    }

    fn dump_as(&self) -> Primitive {
        Primitive::Text
    }

    fn typecast_to_primitive(&self, property: &Property, value: &Value) -> Option<Value> {
        match value {
            Value::Text(name) => property
                .namespace()
                .resolve(property.model_name(), name)
                .map(Value::Class),
            _ => None,
        }
    }

    fn valid_primitive(&self, property: &Property, value: &Value) -> bool {
        match value {
            Value::Class(name) => property.namespace().contains(name),
            _ => false,
        }
    }

    fn load(&self, property: &Property, value: Value) -> Value {
        match value {
            Value::Text(name) if property.namespace().contains(&name) => Value::Class(name),
            other => other,
        }
    }

    fn dump(&self, _property: &Property, value: &Value) -> Value {
        match value {
            Value::Class(name) => Value::Text(name.clone()),
            other => other.clone(),
        }
    }
}
