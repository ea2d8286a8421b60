use super::Property;
use super::kinds::PropertyType;
use crate::core::{Primitive, Value};
use lazy_static::lazy_static;
use regex::Regex;
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use std::cmp::Ordering;
use std::str::FromStr;

lazy_static! {
    // Optional sign, no leading zeros, optional fraction; ".41" style allowed
    static ref NUMERIC_TEXT: Regex =
        Regex::new(r"^[+-]?(?:(?:0|[1-9]\d*)(?:\.\d+)?|\.\d+)$").expect("valid numeric regex");
}

/// Canonical form of a numeric-looking string: no `+`, a digit before the dot.
fn numeric_text(value: &Value) -> Option<String> {
    let Value::Text(text) = value else {
        return None;
    };
    if !NUMERIC_TEXT.is_match(text) {
        return None;
    }
    let (negative, digits) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text.as_str()),
    };
    let digits = if digits.starts_with('.') {
        format!("0{}", digits)
    } else {
        digits.to_string()
    };
    Some(if negative {
        format!("-{}", digits)
    } else {
        digits
    })
}

/// Orders two numeric values of possibly different primitives.
pub(crate) fn compare_numeric(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Integer(x), Value::Integer(y)) => Some(x.cmp(y)),
        (Value::Float(_), _) | (_, Value::Float(_)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        _ => Some(a.as_decimal()?.cmp(&b.as_decimal()?)),
    }
}

fn within_bounds(property: &Property, value: &Value) -> bool {
    let above_min = property.min().is_none_or(|min| {
        matches!(
            compare_numeric(value, min),
            Some(Ordering::Greater | Ordering::Equal)
        )
    });
    let below_max = property.max().is_none_or(|max| {
        matches!(
            compare_numeric(value, max),
            Some(Ordering::Less | Ordering::Equal)
        )
    });
    above_min && below_max
}

pub struct IntegerType;

impl PropertyType for IntegerType {
    fn primitive(&self) -> Primitive {
        Primitive::Integer
    }

    fn typecast_to_primitive(&self, _property: &Property, value: &Value) -> Option<Value> {
        match value {
            Value::Text(_) => {
                let text = numeric_text(value)?;
                // Fractions truncate toward zero
                let whole = text.split('.').next().unwrap_or("0");
                whole.parse::<i64>().ok().map(Value::Integer)
            }
            Value::Float(_) | Value::Decimal(_) => value.as_i64().map(Value::Integer),
            _ => None,
        }
    }

    fn valid_primitive(&self, property: &Property, value: &Value) -> bool {
        within_bounds(property, value)
    }
}

pub struct FloatType;

impl PropertyType for FloatType {
    fn primitive(&self) -> Primitive {
        Primitive::Float
    }

    fn typecast_to_primitive(&self, _property: &Property, value: &Value) -> Option<Value> {
        match value {
            Value::Text(_) => numeric_text(value)?.parse::<f64>().ok().map(Value::Float),
            Value::Integer(_) | Value::Decimal(_) => value.as_f64().map(Value::Float),
            _ => None,
        }
    }

    fn valid_primitive(&self, property: &Property, value: &Value) -> bool {
        matches!(value, Value::Float(f) if f.is_finite()) && within_bounds(property, value)
    }
}

pub struct DecimalType;

impl PropertyType for DecimalType {
    fn primitive(&self) -> Primitive {
        Primitive::Decimal
    }

    fn typecast_to_primitive(&self, _property: &Property, value: &Value) -> Option<Value> {
        match value {
            Value::Text(_) => Decimal::from_str(&numeric_text(value)?)
                .ok()
                .map(Value::Decimal),
            Value::Integer(i) => Some(Value::Decimal(Decimal::from(*i))),
            Value::Float(f) => Decimal::from_f64(*f).map(Value::Decimal),
            _ => None,
        }
    }

    fn valid_primitive(&self, property: &Property, value: &Value) -> bool {
        let Value::Decimal(decimal) = value else {
            return false;
        };
        if !within_bounds(property, value) {
            return false;
        }
        let normalized = decimal.normalize();
        let scale = property.scale().unwrap_or(0);
        if normalized.scale() as usize > scale {
            return false;
        }
        match property.precision() {
            Some(precision) => {
                let whole = normalized.trunc().abs();
                let whole_digits = if whole.is_zero() {
                    0
                } else {
                    whole.to_string().len()
                };
                whole_digits <= precision.saturating_sub(scale)
            }
            None => true,
        }
    }
}
