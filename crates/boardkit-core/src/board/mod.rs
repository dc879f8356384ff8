//! Board documents: an ordered set of placed widget instances.

mod codec;
mod item;

pub use codec::{deserialize_items, serialize_items};
pub use item::{InstanceId, ItemData, LayoutItem};

use crate::binding::DataSourceConfig;
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::grid::{GridPoint, GridRect, SurfaceBounds, find_available_position};
use crate::registry::{ComponentDefinition, ComponentRegistry, ConfigIssue};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

/// Errors from board edits.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BoardError {
    #[error("unknown component type '{type_id}'")]
    UnknownComponentType { type_id: String },
    #[error("invalid geometry for '{instance_id}': {reason}")]
    InvalidGeometry {
        instance_id: InstanceId,
        reason: String,
    },
    #[error("no item with instance id '{0}'")]
    InstanceNotFound(InstanceId),
    #[error("instance id '{0}' is already on the board")]
    DuplicateInstance(InstanceId),
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result type for board operations.
pub type BoardResult<T> = Result<T, BoardError>;

/// Tenant and optional user a board belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OwnerScope {
    pub tenant_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl OwnerScope {
    pub fn tenant(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            user_id: None,
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }
}

/// The persisted row of a board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardRecord {
    pub id: String,
    pub name: String,
    pub tenant_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home_flag: Option<bool>,
    /// JSON array of layout items.
    #[serde(default)]
    pub config: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A board restored from persistence together with everything that was skipped or
/// flagged while loading it.
#[derive(Debug, Clone)]
pub struct LoadedBoard {
    pub board: Board,
    pub diagnostics: Diagnostics,
}

/// An item paired with its catalog definition, if the catalog knows its type.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedItem<'a> {
    pub item: &'a LayoutItem,
    pub definition: Option<&'a ComponentDefinition>,
}

impl ResolvedItem<'_> {
    /// The item references a type the catalog does not contain.
    pub fn is_orphan(&self) -> bool {
        self.definition.is_none()
    }
}

/// A dashboard document.
///
/// Items keep their insertion order. Every mutation preserves instance id uniqueness.
#[derive(Debug, Clone, PartialEq)]
pub struct Board {
    pub id: String,
    pub name: String,
    pub owner_scope: OwnerScope,
    pub description: Option<String>,
    pub home: bool,
    items: Vec<LayoutItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Board {
    /// Create an empty board.
    pub fn new(name: impl Into<String>, owner_scope: OwnerScope) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            owner_scope,
            description: None,
            home: false,
            items: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn items(&self) -> &[LayoutItem] {
        &self.items
    }

    pub fn item(&self, instance_id: &InstanceId) -> Option<&LayoutItem> {
        self.items.iter().find(|item| &item.instance_id == instance_id)
    }

    fn item_mut(&mut self, instance_id: &InstanceId) -> BoardResult<&mut LayoutItem> {
        self.items
            .iter_mut()
            .find(|item| &item.instance_id == instance_id)
            .ok_or_else(|| BoardError::InstanceNotFound(instance_id.clone()))
    }

    pub fn contains(&self, instance_id: &InstanceId) -> bool {
        self.item(instance_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Geometry of every item, in board order.
    pub fn geometries(&self) -> Vec<GridRect> {
        self.items.iter().map(LayoutItem::geometry).collect()
    }

    /// Mark the board as modified now.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Replace every item at once, e.g. when restoring a snapshot.
    ///
    /// Fails without changing the board if two items share an instance id.
    pub fn replace_items(&mut self, items: Vec<LayoutItem>) -> BoardResult<()> {
        let mut seen = std::collections::HashSet::new();
        for item in &items {
            if !seen.insert(&item.instance_id) {
                return Err(BoardError::DuplicateInstance(item.instance_id.clone()));
            }
        }
        self.items = items;
        self.touch();
        Ok(())
    }

    /// Create an instance of `type_id` at its default size.
    ///
    /// The size is clamped to `bounds`. Without a position the first free slot is used.
    pub fn create_item(
        &mut self,
        registry: &ComponentRegistry,
        type_id: &str,
        position: Option<GridPoint>,
        bounds: &SurfaceBounds,
    ) -> BoardResult<&LayoutItem> {
        let definition = registry
            .get(type_id)
            .ok_or_else(|| BoardError::UnknownComponentType {
                type_id: type_id.to_string(),
            })?;

        let size = bounds.clamp_size(definition.default_size);
        let origin = position
            .unwrap_or_else(|| find_available_position(&self.geometries(), size, bounds));
        let rect = bounds.clamp_rect(GridRect::from_parts(origin, size));

        let mut instance_id = InstanceId::generate();
        while self.contains(&instance_id) {
            instance_id = InstanceId::generate();
        }
        log::debug!("Board {}: created {} as {}", self.id, type_id, instance_id);

        self.items.push(LayoutItem::new(instance_id, type_id, rect));
        self.touch();
        Ok(&self.items[self.items.len() - 1])
    }

    /// Append an existing item.
    pub fn insert_item(&mut self, item: LayoutItem) -> BoardResult<()> {
        if self.contains(&item.instance_id) {
            return Err(BoardError::DuplicateInstance(item.instance_id));
        }
        self.items.push(item);
        self.touch();
        Ok(())
    }

    /// Move and/or resize an item.
    ///
    /// Geometry outside the definition's min/max constraints is rejected and the item
    /// keeps its current geometry. Returns the previous geometry on success.
    pub fn move_resize(
        &mut self,
        registry: &ComponentRegistry,
        instance_id: &InstanceId,
        geometry: GridRect,
    ) -> BoardResult<GridRect> {
        if !geometry.is_representable() {
            return Err(BoardError::InvalidGeometry {
                instance_id: instance_id.clone(),
                reason: format!(
                    "edges of {}x{} at ({}, {}) overflow the grid",
                    geometry.w, geometry.h, geometry.x, geometry.y
                ),
            });
        }
        let item = self.item_mut(instance_id)?;
        let definition =
            registry
                .get(item.type_id())
                .ok_or_else(|| BoardError::UnknownComponentType {
                    type_id: item.type_id().to_string(),
                })?;
        if let Some(reason) = definition.size_violation(geometry.size()) {
            return Err(BoardError::InvalidGeometry {
                instance_id: instance_id.clone(),
                reason,
            });
        }

        let previous = item.geometry();
        item.set_geometry(geometry);
        self.touch();
        Ok(previous)
    }

    /// Remove an item. Removing an absent id is a no-op.
    pub fn remove(&mut self, instance_id: &InstanceId) -> Option<LayoutItem> {
        let index = self
            .items
            .iter()
            .position(|item| &item.instance_id == instance_id)?;
        self.touch();
        Some(self.items.remove(index))
    }

    /// Replace the instance configuration of an item.
    ///
    /// The values are stored as given; the returned issues list what the definition's
    /// schema does not accept.
    pub fn update_config(
        &mut self,
        registry: &ComponentRegistry,
        instance_id: &InstanceId,
        config: Map<String, Value>,
    ) -> BoardResult<Vec<ConfigIssue>> {
        let item = self.item_mut(instance_id)?;
        let definition =
            registry
                .get(item.type_id())
                .ok_or_else(|| BoardError::UnknownComponentType {
                    type_id: item.type_id().to_string(),
                })?;
        let issues = definition.validate_config(&config);
        item.data.instance_config = config;
        self.touch();
        Ok(issues)
    }

    /// Replace the data binding of an item.
    pub fn bind_data(
        &mut self,
        instance_id: &InstanceId,
        config: DataSourceConfig,
    ) -> BoardResult<()> {
        self.item_mut(instance_id)?.data.data_source_config = config;
        self.touch();
        Ok(())
    }

    /// Pair every item with its definition.
    pub fn resolve<'a>(&'a self, registry: &'a ComponentRegistry) -> Vec<ResolvedItem<'a>> {
        self.items
            .iter()
            .map(|item| ResolvedItem {
                item,
                definition: registry.get(item.type_id()),
            })
            .collect()
    }

    /// Report an `UnknownComponentType` diagnostic for every orphaned item.
    pub fn check_orphans(&self, registry: &ComponentRegistry) -> Diagnostics {
        let mut diagnostics = Diagnostics::new();
        for resolved in self.resolve(registry) {
            if resolved.is_orphan() {
                diagnostics.report(Diagnostic::UnknownComponentType {
                    instance_id: resolved.item.instance_id.to_string(),
                    type_id: resolved.item.type_id().to_string(),
                });
            }
        }
        diagnostics
    }

    /// Encode the items as the persisted JSON array.
    pub fn serialize(&self) -> BoardResult<String> {
        serialize_items(&self.items)
    }

    /// Decode a persisted JSON array. See [`deserialize_items`].
    pub fn deserialize(blob: &str) -> BoardResult<(Vec<LayoutItem>, Diagnostics)> {
        deserialize_items(blob)
    }

    pub fn to_record(&self) -> BoardResult<BoardRecord> {
        Ok(BoardRecord {
            id: self.id.clone(),
            name: self.name.clone(),
            tenant_id: self.owner_scope.tenant_id.clone(),
            user_id: self.owner_scope.user_id.clone(),
            description: self.description.clone(),
            home_flag: Some(self.home),
            config: self.serialize()?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }

    /// Restore a board from its record.
    ///
    /// Malformed and duplicate items are skipped; items of unknown types are kept as
    /// orphans. All of these are reported in the returned diagnostics.
    pub fn from_record(
        record: BoardRecord,
        registry: &ComponentRegistry,
    ) -> BoardResult<LoadedBoard> {
        let (items, mut diagnostics) = deserialize_items(&record.config)?;
        let board = Board {
            id: record.id,
            name: record.name,
            owner_scope: OwnerScope {
                tenant_id: record.tenant_id,
                user_id: record.user_id,
            },
            description: record.description,
            home: record.home_flag.unwrap_or(false),
            items,
            created_at: record.created_at,
            updated_at: record.updated_at,
        };
        diagnostics.extend(board.check_orphans(registry));
        log::info!(
            "Loaded board {} with {} items ({} diagnostics)",
            board.id,
            board.len(),
            diagnostics.len()
        );
        Ok(LoadedBoard { board, diagnostics })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::GridSize;
    use crate::registry::{ConfigField, FieldKind};
    use serde_json::json;

    fn registry() -> ComponentRegistry {
        ComponentRegistry::builder()
            .with(
                ComponentDefinition::new("gauge", GridSize::new(3, 2))
                    .with_min_size(GridSize::new(2, 2))
                    .with_max_size(GridSize::new(6, 6))
                    .with_config_field(ConfigField::new("unit", FieldKind::String, json!("")))
            )
            .with(ComponentDefinition::new("wide", GridSize::new(20, 3)))
            .build()
    }

    fn board() -> Board {
        Board::new("Plant", OwnerScope::tenant("t-1"))
    }

    #[test]
    fn test_create_item_uses_default_size() {
        let registry = registry();
        let mut board = board();
        let item = board
            .create_item(&registry, "gauge", Some(GridPoint::new(0, 0)), &SurfaceBounds::default())
            .unwrap();
        assert_eq!(item.size(), GridSize::new(3, 2));
        assert!(item.instance_config().is_empty());
        assert!(item.data_source_config().field_mapping.is_empty());
    }

    #[test]
    fn test_create_item_clamps_to_bounds() {
        let registry = registry();
        let mut board = board();
        let item = board
            .create_item(&registry, "wide", Some(GridPoint::new(5, 0)), &SurfaceBounds::default())
            .unwrap();
        assert_eq!(item.geometry(), GridRect::new(0, 0, 12, 3));
    }

    #[test]
    fn test_create_item_auto_places() {
        let registry = registry();
        let mut board = board();
        let bounds = SurfaceBounds::default();
        for _ in 0..5 {
            board.create_item(&registry, "gauge", None, &bounds).unwrap();
        }
        let rects = board.geometries();
        for (i, a) in rects.iter().enumerate() {
            for b in &rects[i + 1..] {
                assert!(!a.overlaps(b));
            }
        }
        assert_eq!(rects[4], GridRect::new(0, 2, 3, 2));
    }

    #[test]
    fn test_create_unknown_type() {
        let registry = registry();
        let mut board = board();
        let result = board.create_item(&registry, "missing", None, &SurfaceBounds::default());
        assert_eq!(
            result.unwrap_err(),
            BoardError::UnknownComponentType {
                type_id: "missing".into()
            }
        );
        assert!(board.is_empty());
    }

    #[test]
    fn test_gauge_resize_below_minimum_rejected() {
        let registry = registry();
        let mut board = board();
        let id = board
            .create_item(&registry, "gauge", None, &SurfaceBounds::default())
            .unwrap()
            .instance_id
            .clone();

        let result = board.move_resize(&registry, &id, GridRect::new(0, 0, 1, 1));
        assert!(matches!(result, Err(BoardError::InvalidGeometry { .. })));
        assert_eq!(board.item(&id).unwrap().size(), GridSize::new(3, 2));
    }

    #[test]
    fn test_move_resize_bounds() {
        let registry = registry();
        let mut board = board();
        let id = board
            .create_item(&registry, "gauge", None, &SurfaceBounds::default())
            .unwrap()
            .instance_id
            .clone();

        assert!(board.move_resize(&registry, &id, GridRect::new(0, 0, 7, 2)).is_err());
        assert!(board.move_resize(&registry, &id, GridRect::new(0, 0, 0, 2)).is_err());
        let previous = board
            .move_resize(&registry, &id, GridRect::new(4, 1, 6, 6))
            .unwrap();
        assert_eq!(previous, GridRect::new(0, 0, 3, 2));
        assert_eq!(board.item(&id).unwrap().geometry(), GridRect::new(4, 1, 6, 6));

        let missing = InstanceId::from("nope");
        assert_eq!(
            board.move_resize(&registry, &missing, GridRect::new(0, 0, 3, 3)),
            Err(BoardError::InstanceNotFound(missing))
        );
    }

    #[test]
    fn test_move_resize_rejects_overflowing_edges() {
        let registry = registry();
        let mut board = board();
        let id = board
            .create_item(&registry, "gauge", None, &SurfaceBounds::default())
            .unwrap()
            .instance_id
            .clone();

        let result = board.move_resize(&registry, &id, GridRect::new(0, u32::MAX - 1, 3, 2));
        assert!(matches!(result, Err(BoardError::InvalidGeometry { .. })));
        assert_eq!(board.item(&id).unwrap().geometry(), GridRect::new(0, 0, 3, 2));
    }

    #[test]
    fn test_move_resize_orphan() {
        let registry = registry();
        let mut board = board();
        board
            .insert_item(LayoutItem::new("o".into(), "missing", GridRect::new(0, 0, 2, 2)))
            .unwrap();
        let result = board.move_resize(&registry, &"o".into(), GridRect::new(0, 0, 3, 3));
        assert!(matches!(result, Err(BoardError::UnknownComponentType { .. })));
    }

    #[test]
    fn test_remove_is_idempotent() {
        let registry = registry();
        let mut board = board();
        let id = board
            .create_item(&registry, "gauge", None, &SurfaceBounds::default())
            .unwrap()
            .instance_id
            .clone();
        assert!(board.remove(&id).is_some());
        assert!(board.remove(&id).is_none());
        assert!(board.is_empty());
    }

    #[test]
    fn test_insert_duplicate_rejected() {
        let mut board = board();
        let item = LayoutItem::new("a".into(), "gauge", GridRect::new(0, 0, 3, 2));
        board.insert_item(item.clone()).unwrap();
        assert_eq!(
            board.insert_item(item),
            Err(BoardError::DuplicateInstance("a".into()))
        );
        assert_eq!(board.len(), 1);
    }

    #[test]
    fn test_update_config_reports_issues() {
        let registry = registry();
        let mut board = board();
        let id = board
            .create_item(&registry, "gauge", None, &SurfaceBounds::default())
            .unwrap()
            .instance_id
            .clone();
        let config = json!({"unit": 5, "color": "red"}).as_object().cloned().unwrap();
        let issues = board.update_config(&registry, &id, config).unwrap();
        assert_eq!(issues.len(), 2);
        assert_eq!(board.item(&id).unwrap().instance_config()["unit"], json!(5));
    }

    #[test]
    fn test_record_round_trip_keeps_orphans() {
        let registry = registry();
        let mut board = board();
        board.description = Some("Boiler room".into());
        board
            .create_item(&registry, "gauge", None, &SurfaceBounds::default())
            .unwrap();
        board
            .insert_item(LayoutItem::new("b".into(), "missing-widget", GridRect::new(4, 0, 2, 2)))
            .unwrap();

        let record = board.to_record().unwrap();
        let loaded = Board::from_record(record, &registry).unwrap();
        assert_eq!(loaded.board, board);
        assert_eq!(
            loaded.diagnostics.into_vec(),
            vec![Diagnostic::UnknownComponentType {
                instance_id: "b".into(),
                type_id: "missing-widget".into()
            }]
        );

        let resolved = loaded.board.resolve(&registry);
        assert!(!resolved[0].is_orphan());
        assert!(resolved[1].is_orphan());
    }

    #[test]
    fn test_replace_items_rejects_duplicates() {
        let mut board = board();
        let item = LayoutItem::new("a".into(), "gauge", GridRect::new(0, 0, 3, 2));
        assert!(board.replace_items(vec![item.clone(), item]).is_err());
        assert!(board.is_empty());
    }
}
