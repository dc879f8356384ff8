//! Layout items: placed widget instances.

use crate::binding::{DataSourceConfig, null_as_default};
use crate::grid::{GridPoint, GridRect, GridSize};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

/// Identity of a placed widget, unique within its board.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(String);

impl InstanceId {
    /// Generate a fresh random id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for InstanceId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for InstanceId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Widget-specific payload of a layout item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemData {
    pub type_id: String,
    /// Hint for the render surface (e.g. which widget body variant to mount). Opaque.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub render_id: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub instance_config: Map<String, Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub data_source_config: DataSourceConfig,
    /// Keys this version does not understand, kept so saving does not lose them.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One placed widget instance.
///
/// Serializes to the persisted shape `{x, y, w, h, i, data: {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutItem {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
    #[serde(rename = "i")]
    pub instance_id: InstanceId,
    pub data: ItemData,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl LayoutItem {
    /// Create an unconfigured item of `type_id` occupying `rect`.
    pub fn new(instance_id: InstanceId, type_id: impl Into<String>, rect: GridRect) -> Self {
        Self {
            x: rect.x,
            y: rect.y,
            w: rect.w,
            h: rect.h,
            instance_id,
            data: ItemData {
                type_id: type_id.into(),
                render_id: None,
                instance_config: Map::new(),
                data_source_config: DataSourceConfig::default(),
                extra: Map::new(),
            },
            extra: Map::new(),
        }
    }

    pub fn type_id(&self) -> &str {
        &self.data.type_id
    }

    pub fn geometry(&self) -> GridRect {
        GridRect::new(self.x, self.y, self.w, self.h)
    }

    pub fn position(&self) -> GridPoint {
        GridPoint::new(self.x, self.y)
    }

    pub fn size(&self) -> GridSize {
        GridSize::new(self.w, self.h)
    }

    pub fn set_geometry(&mut self, rect: GridRect) {
        self.x = rect.x;
        self.y = rect.y;
        self.w = rect.w;
        self.h = rect.h;
    }

    pub fn instance_config(&self) -> &Map<String, Value> {
        &self.data.instance_config
    }

    pub fn data_source_config(&self) -> &DataSourceConfig {
        &self.data.data_source_config
    }
}
