//! Data-source bindings.
//!
//! A [`DataSourceConfig`] is the persisted half: it maps each declared data field of a
//! widget to a literal, a request or a subscription. The [`DataBinder`] is the runtime
//! half: it resolves those mappings through an injected [`FetchCapability`] and keeps
//! a [`DataBindingStatus`] per field.

mod binder;
mod fetch;
mod status;

pub use binder::{DEFAULT_MIN_REFRESH_INTERVAL, DataBinder};
pub use fetch::{
    FetchCapability, FetchError, FetchFuture, FetchRequest, FetchResult, PushSink,
    SubscribeRequest, Unsubscribe,
};
pub use status::{BindingSnapshot, DataBindingStatus};

use crate::registry::SourceKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

/// Per-field binding failure. Never fatal: the widget keeps its last known value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindingError {
    #[error("required field '{field}' has no data source")]
    Unbound { field: String },
    #[error("field '{field}' does not accept {kind:?} sources")]
    UnsupportedSource { field: String, kind: SourceKind },
    #[error("request for field '{field}' failed: {message}")]
    Fetch { field: String, message: String },
    #[error("subscription for field '{field}' failed: {message}")]
    Subscribe { field: String, message: String },
    #[error("field '{field}': response has nothing at '{pointer}'")]
    MissingValue { field: String, pointer: String },
}

/// Where a widget's data comes from.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum DataOrigin {
    /// Tenant-wide data.
    #[default]
    System,
    /// Data of a single device.
    Device { device_id: String },
}

/// Time window forwarded verbatim to the fetch capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TimeRange {
    /// A window ending now, e.g. `"1h"` or `"7d"`.
    Relative { last: String },
    Absolute {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

/// Aggregation forwarded verbatim to the fetch capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Aggregation {
    /// Bucket width, e.g. `"5m"`.
    pub window: String,
    /// Aggregate function, e.g. `"avg"`.
    pub function: String,
}

/// When request-based fields are re-fetched besides manual refresh.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshPolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_ms: Option<u64>,
    /// Re-fetch request fields whenever a push field of the same instance receives data.
    #[serde(default)]
    pub on_push: bool,
}

impl RefreshPolicy {
    pub fn every(interval: Duration) -> Self {
        Self {
            interval_ms: Some(interval.as_millis() as u64),
            on_push: false,
        }
    }

    pub fn interval(&self) -> Option<Duration> {
        self.interval_ms.map(Duration::from_millis)
    }
}

/// HTTP-ish verb of a request descriptor. Interpreted only by the fetch capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    #[default]
    Get,
    Post,
    Put,
    Delete,
}

/// A one-shot request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestDescriptor {
    pub endpoint: String,
    #[serde(default)]
    pub method: Method,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    /// JSON pointer selecting the field value inside the response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub select: Option<String>,
}

impl RequestDescriptor {
    pub fn get(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            method: Method::Get,
            params: BTreeMap::new(),
            body: None,
            select: None,
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    pub fn with_select(mut self, pointer: impl Into<String>) -> Self {
        self.select = Some(pointer.into());
        self
    }
}

/// A push subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionDescriptor {
    pub channel: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, Value>,
    /// JSON pointer selecting the field value inside each pushed message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub select: Option<String>,
}

impl SubscriptionDescriptor {
    pub fn channel(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            params: BTreeMap::new(),
            select: None,
        }
    }
}

/// The source bound to one data field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldSource {
    Static { value: Value },
    Request(RequestDescriptor),
    Subscription(SubscriptionDescriptor),
}

impl FieldSource {
    pub fn literal(value: Value) -> Self {
        FieldSource::Static { value }
    }

    pub fn kind(&self) -> SourceKind {
        match self {
            FieldSource::Static { .. } => SourceKind::Static,
            FieldSource::Request(_) => SourceKind::Request,
            FieldSource::Subscription(_) => SourceKind::Push,
        }
    }
}

/// Per-instance data binding, persisted with the layout item.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSourceConfig {
    #[serde(default, deserialize_with = "null_as_default")]
    pub origin: DataOrigin,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_range: Option<TimeRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregation: Option<Aggregation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh: Option<RefreshPolicy>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub field_mapping: BTreeMap<String, FieldSource>,
}

impl DataSourceConfig {
    pub fn new(origin: DataOrigin) -> Self {
        Self {
            origin,
            ..Self::default()
        }
    }

    /// Map a field to a source.
    pub fn with_field(mut self, field: impl Into<String>, source: FieldSource) -> Self {
        self.field_mapping.insert(field.into(), source);
        self
    }

    pub fn with_time_range(mut self, range: TimeRange) -> Self {
        self.time_range = Some(range);
        self
    }

    pub fn with_aggregation(mut self, aggregation: Aggregation) -> Self {
        self.aggregation = Some(aggregation);
        self
    }

    pub fn with_refresh(mut self, refresh: RefreshPolicy) -> Self {
        self.refresh = Some(refresh);
        self
    }

    pub fn source(&self, field: &str) -> Option<&FieldSource> {
        self.field_mapping.get(field)
    }
}

/// Decode an explicit `null` the same way as a missing key.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Apply an optional JSON pointer to a value.
pub(crate) fn select_value(value: Value, pointer: Option<&str>) -> Option<Value> {
    match pointer {
        None | Some("") => Some(value),
        Some(p) => value.pointer(p).cloned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_field_source_wire_shape() {
        let config = DataSourceConfig::new(DataOrigin::Device {
            device_id: "dev-1".into(),
        })
        .with_field("value", FieldSource::Request(RequestDescriptor::get("/telemetry/current")))
        .with_field("title", FieldSource::literal(json!("Boiler")));

        let encoded = serde_json::to_value(&config).unwrap();
        assert_eq!(encoded["origin"], json!({"scope": "device", "deviceId": "dev-1"}));
        assert_eq!(encoded["fieldMapping"]["value"]["kind"], json!("request"));
        assert_eq!(encoded["fieldMapping"]["value"]["method"], json!("GET"));
        assert_eq!(encoded["fieldMapping"]["title"], json!({"kind": "static", "value": "Boiler"}));
    }

    #[test]
    fn test_missing_keys_default() {
        let config: DataSourceConfig = serde_json::from_value(json!({})).unwrap();
        assert_eq!(config, DataSourceConfig::default());
    }

    #[test]
    fn test_null_values_default() {
        let config: DataSourceConfig = serde_json::from_value(json!({
            "origin": null,
            "timeRange": null,
            "refresh": null,
            "fieldMapping": null
        }))
        .unwrap();
        assert_eq!(config, DataSourceConfig::default());
    }

    #[test]
    fn test_select_value() {
        let response = json!({"data": {"temp": 21.5}});
        assert_eq!(select_value(response.clone(), None), Some(response.clone()));
        assert_eq!(select_value(response.clone(), Some("/data/temp")), Some(json!(21.5)));
        assert_eq!(select_value(response, Some("/data/missing")), None);
    }

    #[test]
    fn test_refresh_policy_interval() {
        let policy = RefreshPolicy::every(Duration::from_secs(5));
        assert_eq!(policy.interval(), Some(Duration::from_secs(5)));
        assert_eq!(RefreshPolicy::default().interval(), None);
    }
}
