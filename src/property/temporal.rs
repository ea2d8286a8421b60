use super::Property;
use super::kinds::PropertyType;
use crate::core::{Primitive, Value};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use std::collections::BTreeMap;

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%d %b %Y", "%B %d, %Y", "%b %d %Y"];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
];

const TIME_FORMATS: &[&str] = &["%H:%M:%S%.f", "%H:%M"];

/// Reads an integral component from a `year`/`month`/... map.
fn component(parts: &BTreeMap<String, Value>, name: &str) -> Option<i64> {
    match parts.get(name)? {
        Value::Integer(i) => Some(*i),
        Value::Text(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn date_from_parts(parts: &BTreeMap<String, Value>) -> Option<NaiveDate> {
    let year = i32::try_from(component(parts, "year")?).ok()?;
    let month = u32::try_from(component(parts, "month")?).ok()?;
    let day = u32::try_from(component(parts, "day")?).ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Missing time components default to zero, as long as a date is present.
fn time_from_parts(parts: &BTreeMap<String, Value>) -> Option<NaiveTime> {
    let part = |name: &str| match parts.get(name) {
        None => Some(0),
        Some(_) => component(parts, name).and_then(|v| u32::try_from(v).ok()),
    };
    NaiveTime::from_hms_opt(part("hour")?, part("min")?, part("sec")?)
}

fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(text, format).ok())
        .or_else(|| parse_datetime(text).map(|dt| dt.date()))
}

fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_utc());
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
}

fn parse_time(text: &str) -> Option<NaiveTime> {
    let text = text.trim();
    TIME_FORMATS
        .iter()
        .find_map(|format| NaiveTime::parse_from_str(text, format).ok())
        .or_else(|| parse_datetime(text).map(|dt| dt.time()))
}

pub struct DateType;

impl PropertyType for DateType {
    fn primitive(&self) -> Primitive {
        Primitive::Date
    }

    fn typecast_to_primitive(&self, _property: &Property, value: &Value) -> Option<Value> {
        match value {
            Value::Map(parts) => date_from_parts(parts).map(Value::Date),
            Value::Text(text) => parse_date(text).map(Value::Date),
            Value::DateTime(dt) => Some(Value::Date(dt.date())),
            _ => None,
        }
    }
}

pub struct DateTimeType;

impl PropertyType for DateTimeType {
    fn primitive(&self) -> Primitive {
        Primitive::DateTime
    }

    fn typecast_to_primitive(&self, _property: &Property, value: &Value) -> Option<Value> {
        match value {
            Value::Map(parts) => {
                let date = date_from_parts(parts)?;
                Some(Value::DateTime(date.and_time(time_from_parts(parts)?)))
            }
            Value::Text(text) => parse_datetime(text)
                .or_else(|| parse_date(text).map(|d| d.and_time(NaiveTime::MIN)))
                .map(Value::DateTime),
            Value::Date(date) => Some(Value::DateTime(date.and_time(NaiveTime::MIN))),
            _ => None,
        }
    }
}

pub struct TimeType;

impl PropertyType for TimeType {
    fn primitive(&self) -> Primitive {
        Primitive::Time
    }

    fn typecast_to_primitive(&self, _property: &Property, value: &Value) -> Option<Value> {
        match value {
            Value::Map(parts) if parts.contains_key("hour") => {
                time_from_parts(parts).map(Value::Time)
            }
            Value::Text(text) => parse_time(text).map(Value::Time),
            Value::DateTime(dt) => Some(Value::Time(dt.time())),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts(entries: &[(&str, Value)]) -> BTreeMap<String, Value> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_date_from_parts_accepts_text_components() {
        let map = parts(&[
            ("year", Value::from("2024")),
            ("month", Value::Integer(2)),
            ("day", Value::Integer(29)),
        ]);
        assert_eq!(date_from_parts(&map), NaiveDate::from_ymd_opt(2024, 2, 29));
    }

    #[test]
    fn test_invalid_calendar_date_is_rejected() {
        let map = parts(&[
            ("year", Value::Integer(2023)),
            ("month", Value::Integer(2)),
            ("day", Value::Integer(29)),
        ]);
        assert_eq!(date_from_parts(&map), None);
    }

    #[test]
    fn test_free_text_parsing() {
        assert_eq!(parse_date("2024-03-01"), NaiveDate::from_ymd_opt(2024, 3, 1));
        assert_eq!(parse_date("01 Mar 2024"), NaiveDate::from_ymd_opt(2024, 3, 1));
        assert!(parse_datetime("2024-03-01T10:20:30Z").is_some());
        assert!(parse_datetime("2024-03-01 10:20").is_some());
        assert_eq!(parse_time("07:30"), NaiveTime::from_hms_opt(7, 30, 0));
        assert_eq!(parse_date("next tuesday"), None);
    }
}
