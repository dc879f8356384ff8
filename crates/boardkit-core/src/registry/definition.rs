//! Component definitions: the declared contract of a widget type.

use crate::grid::GridSize;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use thiserror::Error;

/// Value type of a configuration field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    String,
    Number,
    Boolean,
    /// A CSS-style color string.
    Color,
    Object,
    Array,
    /// Anything goes.
    Any,
}

impl FieldKind {
    /// Check whether a JSON value fits this kind. `null` is accepted everywhere.
    pub fn accepts(self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) | (FieldKind::Any, _) => true,
            (FieldKind::String | FieldKind::Color, Value::String(_)) => true,
            (FieldKind::Number, Value::Number(_)) => true,
            (FieldKind::Boolean, Value::Bool(_)) => true,
            (FieldKind::Object, Value::Object(_)) => true,
            (FieldKind::Array, Value::Array(_)) => true,
            _ => false,
        }
    }
}

/// One named, typed configuration field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigField {
    pub name: String,
    pub kind: FieldKind,
    #[serde(default)]
    pub default: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ConfigField {
    pub fn new(name: impl Into<String>, kind: FieldKind, default: Value) -> Self {
        Self {
            name: name.into(),
            kind,
            default,
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// How a data field can be sourced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// A literal value stored in the board.
    Static,
    /// A one-shot request through the fetch capability.
    Request,
    /// A push subscription through the fetch capability.
    Push,
}

/// A named data requirement declared by a component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataRequirement {
    pub name: String,
    #[serde(default)]
    pub required: bool,
    pub supported: BTreeSet<SourceKind>,
    /// Value shown until the field is bound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl DataRequirement {
    /// A required field accepting every source kind.
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: true,
            supported: [SourceKind::Static, SourceKind::Request, SourceKind::Push].into(),
            default: None,
            description: None,
        }
    }

    /// An optional field accepting every source kind.
    pub fn optional(name: impl Into<String>) -> Self {
        Self {
            required: false,
            ..Self::required(name)
        }
    }

    /// Restrict the accepted source kinds.
    pub fn with_sources(mut self, kinds: impl IntoIterator<Item = SourceKind>) -> Self {
        self.supported = kinds.into_iter().collect();
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn supports(&self, kind: SourceKind) -> bool {
        self.supported.contains(&kind)
    }
}

/// A problem found when checking an instance configuration against the schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigIssue {
    #[error("unknown configuration field '{0}'")]
    UnknownField(String),
    #[error("configuration field '{name}' expects {expected:?}")]
    TypeMismatch { name: String, expected: FieldKind },
}

/// Catalog entry describing a widget type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentDefinition {
    /// Unique key in the registry.
    pub type_id: String,
    /// Display name.
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Permission tag required to offer this widget in a catalog.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permission: Option<String>,
    pub default_size: GridSize,
    pub min_size: GridSize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_size: Option<GridSize>,
    #[serde(default)]
    pub config_schema: Vec<ConfigField>,
    #[serde(default)]
    pub data_source_schema: Vec<DataRequirement>,
}

impl ComponentDefinition {
    /// Create a definition with a default size and a 1×1 minimum.
    pub fn new(type_id: impl Into<String>, default_size: GridSize) -> Self {
        let type_id = type_id.into();
        Self {
            name: type_id.clone(),
            type_id,
            category: None,
            tags: Vec::new(),
            permission: None,
            default_size,
            min_size: GridSize::new(1, 1),
            max_size: None,
            config_schema: Vec::new(),
            data_source_schema: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_permission(mut self, permission: impl Into<String>) -> Self {
        self.permission = Some(permission.into());
        self
    }

    pub fn with_min_size(mut self, size: GridSize) -> Self {
        self.min_size = size;
        self
    }

    pub fn with_max_size(mut self, size: GridSize) -> Self {
        self.max_size = Some(size);
        self
    }

    pub fn with_config_field(mut self, field: ConfigField) -> Self {
        self.config_schema.push(field);
        self
    }

    pub fn with_data_requirement(mut self, requirement: DataRequirement) -> Self {
        self.data_source_schema.push(requirement);
        self
    }

    /// Look up a data requirement by field name.
    pub fn requirement(&self, name: &str) -> Option<&DataRequirement> {
        self.data_source_schema.iter().find(|r| r.name == name)
    }

    /// Look up a configuration field by name.
    pub fn config_field(&self, name: &str) -> Option<&ConfigField> {
        self.config_schema.iter().find(|f| f.name == name)
    }

    /// Check that the size constraints are consistent with each other.
    pub fn check_constraints(&self) -> Result<(), String> {
        if self.type_id.trim().is_empty() {
            return Err("empty type id".to_string());
        }
        if self.min_size.is_empty() || self.default_size.is_empty() {
            return Err("sizes must be at least 1x1".to_string());
        }
        if !self.default_size.covers(self.min_size) {
            return Err(format!(
                "default size {}x{} is below minimum {}x{}",
                self.default_size.w, self.default_size.h, self.min_size.w, self.min_size.h
            ));
        }
        if let Some(max) = self.max_size {
            if !max.covers(self.default_size) {
                return Err(format!(
                    "default size {}x{} exceeds maximum {}x{}",
                    self.default_size.w, self.default_size.h, max.w, max.h
                ));
            }
        }
        Ok(())
    }

    /// Describe why `size` violates the constraints, or `None` if it is acceptable.
    pub fn size_violation(&self, size: GridSize) -> Option<String> {
        if size.is_empty() {
            return Some("size must be at least 1x1".to_string());
        }
        if !size.covers(self.min_size) {
            return Some(format!(
                "{}x{} is below minimum {}x{}",
                size.w, size.h, self.min_size.w, self.min_size.h
            ));
        }
        match self.max_size {
            Some(max) if !max.covers(size) => Some(format!(
                "{}x{} exceeds maximum {}x{}",
                size.w, size.h, max.w, max.h
            )),
            _ => None,
        }
    }

    /// Clamp a size into `[min_size, max_size]`.
    pub fn clamp_size(&self, size: GridSize) -> GridSize {
        let (max_w, max_h) = self
            .max_size
            .map(|m| (m.w, m.h))
            .unwrap_or((u32::MAX, u32::MAX));
        GridSize::new(
            size.w.clamp(self.min_size.w, max_w.max(self.min_size.w)),
            size.h.clamp(self.min_size.h, max_h.max(self.min_size.h)),
        )
    }

    /// Check an instance configuration against the declared schema.
    pub fn validate_config(&self, config: &Map<String, Value>) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();
        for (name, value) in config {
            match self.config_field(name) {
                None => issues.push(ConfigIssue::UnknownField(name.clone())),
                Some(field) if !field.kind.accepts(value) => issues.push(ConfigIssue::TypeMismatch {
                    name: name.clone(),
                    expected: field.kind,
                }),
                Some(_) => {}
            }
        }
        issues
    }

    /// Schema defaults overlaid with the well-typed values of `config`.
    ///
    /// Unknown fields and mistyped values are dropped.
    pub fn effective_config(&self, config: &Map<String, Value>) -> Map<String, Value> {
        self.config_schema
            .iter()
            .map(|field| {
                let value = config
                    .get(&field.name)
                    .filter(|v| field.kind.accepts(v))
                    .cloned()
                    .unwrap_or_else(|| field.default.clone());
                (field.name.clone(), value)
            })
            .collect()
    }
}
