//! Checking loosely-typed input against the record schema.
//!
//! Validation is all-or-nothing: it either produces a fully populated [`Record`] or an error
//! naming the offending field. Unknown keys are ignored so newer producers can add fields.
//!
//! Rules, by input key:
//!
//! - The item itself must be a map.
//! - `device`, if present, must be a map. Within it `id` and `type`, if present, must be strings.
//! - `lat` and `lon`, if present, must be numbers. Integers are widened to `f64`.
//! - `apps`, if present, must be an array of integers, each of which fits in a `u32`.
//!
//! A present `Null` counts as present, and so fails every rule above.

use crate::error::{Error, Result};
use crate::record::{Device, Record};
use crate::value::Value;
use std::collections::BTreeMap;

fn field_type(field: &'static str, expected: &'static str, actual: &Value) -> Error {
    Error::FieldType {
        field,
        expected,
        actual: actual.kind_name(),
    }
}

fn opt_str(
    map: &BTreeMap<String, Value>,
    key: &str,
    field: &'static str,
) -> Result<Option<String>> {
    match map.get(key) {
        None => Ok(None),
        Some(Value::Str(s)) => Ok(Some(s.clone())),
        Some(v) => Err(field_type(field, "a string", v)),
    }
}

fn opt_f64(map: &BTreeMap<String, Value>, key: &'static str) -> Result<Option<f64>> {
    match map.get(key) {
        None => Ok(None),
        Some(v) => v
            .as_floating()
            .map(Some)
            .ok_or_else(|| field_type(key, "a number", v)),
    }
}

fn parse_device(val: &Value) -> Result<Device> {
    let map = val
        .as_map()
        .ok_or_else(|| field_type("device", "a map", val))?;
    Ok(Device {
        id: opt_str(map, "id", "device.id")?,
        kind: opt_str(map, "type", "device.type")?,
    })
}

fn parse_apps(val: &Value) -> Result<Vec<u32>> {
    let array = val
        .as_array()
        .ok_or_else(|| field_type("apps", "an array of integers", val))?;
    array
        .iter()
        .map(|item| match item {
            Value::Int(n) => n
                .as_u32()
                .ok_or_else(|| field_type("apps", "an unsigned 32-bit integer", item)),
            _ => Err(field_type("apps", "an array of integers", item)),
        })
        .collect()
}

/// Validate a loosely-typed value, producing a [`Record`] on success.
pub fn validate(val: &Value) -> Result<Record> {
    let map = val.as_map().ok_or_else(|| {
        Error::InputShape(format!(
            "record must be a map, but got {}",
            val.kind_name()
        ))
    })?;
    let device = map.get("device").map(parse_device).transpose()?;
    let latitude = opt_f64(map, "lat")?;
    let longitude = opt_f64(map, "lon")?;
    let apps = map.get("apps").map(parse_apps).transpose()?.unwrap_or_default();
    Ok(Record {
        device,
        latitude,
        longitude,
        apps,
    })
}

impl TryFrom<&Value> for Record {
    type Error = Error;

    fn try_from(val: &Value) -> Result<Self> {
        validate(val)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::error::ErrorKind;

    fn json(s: &str) -> Value {
        serde_json::from_str(s).unwrap()
    }

    #[test]
    fn full_record() {
        let rec = validate(&json(
            r#"{"device": {"type": "idfa", "id": "e7e1a50c0ec2747ca56cd9e1558c0d7c"},
                "lat": 67.7835424444, "lon": -22.8044005471, "apps": [1, 2, 3, 4]}"#,
        ))
        .unwrap();
        let expected = Record::new()
            .device(
                Device::new()
                    .id("e7e1a50c0ec2747ca56cd9e1558c0d7c")
                    .kind("idfa"),
            )
            .latitude(67.7835424444)
            .longitude(-22.8044005471)
            .apps([1, 2, 3, 4]);
        assert_eq!(rec, expected);
    }

    #[test]
    fn integers_widen() {
        let rec = validate(&json(r#"{"lat": 42, "lon": -42}"#)).unwrap();
        assert_eq!(rec.latitude, Some(42.0));
        assert_eq!(rec.longitude, Some(-42.0));
        assert!(rec.apps.is_empty());
        assert!(rec.device.is_none());
    }

    #[test]
    fn empty_map() {
        assert_eq!(validate(&json("{}")).unwrap(), Record::new());
    }

    #[test]
    fn partial_device() {
        let rec = validate(&json(r#"{"device": {"type": "gaid"}, "apps": [1]}"#)).unwrap();
        let device = rec.device.unwrap();
        assert_eq!(device.id, None);
        assert_eq!(device.kind.as_deref(), Some("gaid"));
        // An empty device map is still a present device.
        let rec = validate(&json(r#"{"device": {}}"#)).unwrap();
        assert_eq!(rec.device, Some(Device::new()));
    }

    #[test]
    fn unknown_keys_ignored() {
        let rec = validate(&json(r#"{"apps": [5], "extra": [1, "x"], "device": {"os": 1}}"#));
        assert_eq!(rec.unwrap(), Record::new().device(Device::new()).app(5));
    }

    #[test]
    fn not_a_map() {
        let err = validate(&json("[1, 2]")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InputShape);
        let err = validate(&Value::from("device")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InputShape);
    }

    #[test]
    fn bad_fields() {
        let cases = [
            (r#"{"device": "idfa"}"#, "device"),
            (r#"{"device": null}"#, "device"),
            (r#"{"device": {"id": 12}}"#, "device.id"),
            (r#"{"device": {"id": "a", "type": ["gaid"]}}"#, "device.type"),
            (r#"{"lat": "67.7"}"#, "lat"),
            (r#"{"lat": 1.0, "lon": true}"#, "lon"),
            (r#"{"apps": 1}"#, "apps"),
            (r#"{"apps": {"a": 1}}"#, "apps"),
            (r#"{"apps": [1, 2, "3"]}"#, "apps"),
            (r#"{"apps": [1, 2.5]}"#, "apps"),
            (r#"{"apps": [-1]}"#, "apps"),
            (r#"{"apps": [4294967296]}"#, "apps"),
        ];
        for (input, field) in cases {
            let err = validate(&json(input)).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::FieldType, "input: {}", input);
            assert_eq!(err.field(), Some(field), "input: {}", input);
        }
    }

    #[test]
    fn apps_bounds() {
        let rec = validate(&json(r#"{"apps": [0, 4294967295]}"#)).unwrap();
        assert_eq!(rec.apps, vec![0, u32::MAX]);
    }
}
