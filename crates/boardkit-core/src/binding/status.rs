//! Runtime status of a bound data field.

use super::BindingError;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeMap;

/// Status of one data field of one active instance. Never persisted.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DataBindingStatus {
    /// The field has a mapping in the instance binding.
    pub is_bound: bool,
    /// The field currently satisfies its declaration.
    pub is_valid: bool,
    /// Last value delivered, or the declared default.
    pub current_value: Option<Value>,
    pub error: Option<BindingError>,
    /// A request for this field is in flight.
    pub pending: bool,
    pub updated_at: Option<DateTime<Utc>>,
}

impl DataBindingStatus {
    /// A field with no mapping yet.
    pub(crate) fn unbound(default: Option<Value>, error: Option<BindingError>) -> Self {
        Self {
            is_bound: false,
            is_valid: error.is_none(),
            current_value: default,
            error,
            pending: false,
            updated_at: None,
        }
    }

    pub(crate) fn set_value(&mut self, value: Value) {
        self.is_valid = true;
        self.current_value = Some(value);
        self.error = None;
        self.pending = false;
        self.updated_at = Some(Utc::now());
    }

    /// Record a failure while keeping the last known value.
    pub(crate) fn set_error(&mut self, error: BindingError) {
        self.is_valid = false;
        self.error = Some(error);
        self.pending = false;
        self.updated_at = Some(Utc::now());
    }
}

/// All field statuses of one instance, keyed by field name.
pub type BindingSnapshot = BTreeMap<String, DataBindingStatus>;
