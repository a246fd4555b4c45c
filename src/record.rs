//! The device-apps record.
//!
//! A [`Record`] describes one device: who it is, where it was seen, and which apps it has. Every
//! optional field tracks presence explicitly, so a record with `latitude: Some(0.0)` is distinct
//! from one with no latitude at all, and the distinction survives encoding.

use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Identity of the device a record belongs to. Both parts are independently optional.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Device {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl Device {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    pub fn to_value(&self) -> Value {
        let mut map = BTreeMap::new();
        if let Some(ref id) = self.id {
            map.insert("id".to_string(), Value::from(id.as_str()));
        }
        if let Some(ref kind) = self.kind {
            map.insert("type".to_string(), Value::from(kind.as_str()));
        }
        Value::Map(map)
    }
}

/// A single device-apps record.
///
/// Field names on the serde side match the keys the validator reads (`lat`, `lon`), so a record
/// can be pushed through any serde format and come back in the same shape the host produced it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Record {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<Device>,
    #[serde(rename = "lat", skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(rename = "lon", skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    pub apps: Vec<u32>,
}

impl Record {
    /// Make an empty record: no device, no coordinates, no apps.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn device(mut self, device: Device) -> Self {
        self.device = Some(device);
        self
    }

    pub fn latitude(mut self, latitude: f64) -> Self {
        self.latitude = Some(latitude);
        self
    }

    pub fn longitude(mut self, longitude: f64) -> Self {
        self.longitude = Some(longitude);
        self
    }

    pub fn app(mut self, app: u32) -> Self {
        self.apps.push(app);
        self
    }

    pub fn apps(mut self, apps: impl IntoIterator<Item = u32>) -> Self {
        self.apps.extend(apps);
        self
    }

    /// Convert the record back into a loosely-typed mapping. Absent fields are left out; the app
    /// list is always present.
    pub fn to_value(&self) -> Value {
        let mut map = BTreeMap::new();
        if let Some(ref device) = self.device {
            map.insert("device".to_string(), device.to_value());
        }
        if let Some(lat) = self.latitude {
            map.insert("lat".to_string(), Value::F64(lat));
        }
        if let Some(lon) = self.longitude {
            map.insert("lon".to_string(), Value::F64(lon));
        }
        map.insert(
            "apps".to_string(),
            Value::Array(self.apps.iter().map(|&app| Value::from(app)).collect()),
        );
        Value::Map(map)
    }
}

impl From<&Record> for Value {
    fn from(record: &Record) -> Self {
        record.to_value()
    }
}
