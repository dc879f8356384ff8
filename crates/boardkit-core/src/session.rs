//! Editing session: one board, its bindings and its surface traffic.

use crate::binding::{DataBinder, DataSourceConfig, FetchCapability};
use crate::board::{Board, BoardError, BoardRecord, InstanceId, LayoutItem};
use crate::config::EngineConfig;
use crate::diagnostics::Diagnostics;
use crate::events::{EditorEvent, EventBus, EventKind, SubscribeOptions};
use crate::grid::{GridPoint, GridRect, SurfaceBounds};
use crate::registry::{ComponentRegistry, ConfigIssue};
use crate::widget::WidgetManager;
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use thiserror::Error;

const SESSION_REGISTRAR: &str = "session";

#[derive(Debug, Error)]
pub enum SessionError {
    /// Nothing could ever be placed on the board.
    #[error("component registry is empty")]
    EmptyRegistry,
    #[error(transparent)]
    Board(#[from] BoardError),
}

pub type SessionResult<T> = Result<T, SessionError>;

/// What a render surface may touch while it draws.
///
/// The board itself is handed out separately and read-only: surfaces propose edits
/// through the bus instead of applying them.
pub struct SurfaceContext<'a> {
    pub registry: &'a ComponentRegistry,
    pub binder: &'a mut DataBinder,
    pub bus: &'a mut EventBus<EditorEvent>,
    pub widgets: &'a mut WidgetManager,
    pub bounds: SurfaceBounds,
}

/// Owns a board while it is being edited.
///
/// Edits come from direct calls or from proposals published on the bus by a surface;
/// the latter are queued and applied by [`apply_pending`](Self::apply_pending).
pub struct EditorSession {
    registry: Arc<ComponentRegistry>,
    board: Board,
    binder: DataBinder,
    bus: EventBus<EditorEvent>,
    widgets: WidgetManager,
    inbox: Arc<Mutex<VecDeque<EditorEvent>>>,
    bounds: SurfaceBounds,
    undo_stack: Vec<Vec<LayoutItem>>,
    redo_stack: Vec<Vec<LayoutItem>>,
    undo_limit: usize,
    diagnostics: Diagnostics,
}

impl EditorSession {
    /// Start editing `board`.
    ///
    /// Fails only when the registry is empty. Orphaned items are reported in
    /// [`diagnostics`](Self::diagnostics) and kept.
    pub fn open(
        registry: Arc<ComponentRegistry>,
        board: Board,
        fetch: Arc<dyn FetchCapability>,
        config: &EngineConfig,
    ) -> SessionResult<Self> {
        if registry.is_empty() {
            return Err(SessionError::EmptyRegistry);
        }
        let diagnostics = board.check_orphans(&registry);
        Ok(Self::start(registry, board, fetch, config, diagnostics))
    }

    /// Restore a board from its record and start editing it.
    ///
    /// Skipped and orphaned items are reported in [`diagnostics`](Self::diagnostics).
    pub fn load(
        registry: Arc<ComponentRegistry>,
        record: BoardRecord,
        fetch: Arc<dyn FetchCapability>,
        config: &EngineConfig,
    ) -> SessionResult<Self> {
        if registry.is_empty() {
            return Err(SessionError::EmptyRegistry);
        }
        let loaded = Board::from_record(record, &registry)?;
        Ok(Self::start(
            registry,
            loaded.board,
            fetch,
            config,
            loaded.diagnostics,
        ))
    }

    fn start(
        registry: Arc<ComponentRegistry>,
        board: Board,
        fetch: Arc<dyn FetchCapability>,
        config: &EngineConfig,
        diagnostics: Diagnostics,
    ) -> Self {
        let mut bus =
            EventBus::with_limits(config.events.history_capacity, config.events.max_listeners);
        let inbox = Arc::new(Mutex::new(VecDeque::new()));
        for kind in [EventKind::GeometryProposed, EventKind::RemoveRequested] {
            let queue = inbox.clone();
            bus.subscribe(
                kind,
                move |event: &EditorEvent| {
                    if let Ok(mut queue) = queue.lock() {
                        queue.push_back(event.clone());
                    }
                },
                SubscribeOptions::new().registrar(SESSION_REGISTRAR),
            );
        }

        let binder = DataBinder::new(fetch)
            .with_min_refresh_interval(config.binder.min_refresh_interval());

        let mut session = Self {
            registry,
            board,
            binder,
            bus,
            widgets: WidgetManager::new(),
            inbox,
            bounds: config.surface.bounds(),
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            undo_limit: config.history.undo_limit,
            diagnostics,
        };
        log::info!(
            "Opened board {} ({} items, {} orphaned)",
            session.board.id,
            session.board.len(),
            session.diagnostics.len()
        );
        let board_id = session.board.id.clone();
        session.bus.publish(EditorEvent::BoardLoaded { board_id });
        session
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn registry(&self) -> &Arc<ComponentRegistry> {
        &self.registry
    }

    pub fn binder(&self) -> &DataBinder {
        &self.binder
    }

    pub fn bus(&self) -> &EventBus<EditorEvent> {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut EventBus<EditorEvent> {
        &mut self.bus
    }

    pub fn widgets(&self) -> &WidgetManager {
        &self.widgets
    }

    pub fn bounds(&self) -> SurfaceBounds {
        self.bounds
    }

    /// Everything reported while loading the board.
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Split the session into the read-only board and what a surface may use.
    pub fn surface(&mut self) -> (&Board, SurfaceContext<'_>) {
        (
            &self.board,
            SurfaceContext {
                registry: &self.registry,
                binder: &mut self.binder,
                bus: &mut self.bus,
                widgets: &mut self.widgets,
                bounds: self.bounds,
            },
        )
    }

    fn push_undo(&mut self, snapshot: Vec<LayoutItem>) {
        self.undo_stack.push(snapshot);
        self.redo_stack.clear();
        if self.undo_stack.len() > self.undo_limit {
            self.undo_stack.remove(0);
        }
    }

    /// Place a new instance of `type_id`. Without a position the first free slot is used.
    pub fn add_item(
        &mut self,
        type_id: &str,
        position: Option<GridPoint>,
    ) -> SessionResult<InstanceId> {
        let snapshot = self.board.items().to_vec();
        let item = self
            .board
            .create_item(&self.registry, type_id, position, &self.bounds)?;
        let instance_id = item.instance_id.clone();
        self.push_undo(snapshot);
        self.bus.publish(EditorEvent::ItemAdded {
            instance_id: instance_id.clone(),
            type_id: type_id.to_string(),
        });
        Ok(instance_id)
    }

    /// Move and/or resize an instance.
    ///
    /// Rejections are published as `GeometryRejected` and leave the geometry unchanged.
    pub fn move_resize(
        &mut self,
        instance_id: &InstanceId,
        geometry: GridRect,
    ) -> SessionResult<()> {
        let result = if self.bounds.contains(&geometry) {
            let snapshot = self.board.items().to_vec();
            self.board
                .move_resize(&self.registry, instance_id, geometry)
                .map(|_| snapshot)
        } else {
            Err(BoardError::InvalidGeometry {
                instance_id: instance_id.clone(),
                reason: format!(
                    "{}x{} at ({}, {}) does not fit the surface",
                    geometry.w, geometry.h, geometry.x, geometry.y
                ),
            })
        };

        match result {
            Ok(snapshot) => {
                self.push_undo(snapshot);
                self.bus.publish(EditorEvent::GeometryApplied {
                    instance_id: instance_id.clone(),
                    geometry,
                });
                Ok(())
            }
            Err(e) => {
                log::debug!("Rejected geometry for {}: {}", instance_id, e);
                self.bus.publish(EditorEvent::GeometryRejected {
                    instance_id: instance_id.clone(),
                    reason: e.to_string(),
                });
                Err(e.into())
            }
        }
    }

    /// Remove an instance and tear down its bindings. Returns false if it was absent.
    pub fn remove_item(&mut self, instance_id: &InstanceId) -> bool {
        let snapshot = self.board.items().to_vec();
        if self.board.remove(instance_id).is_none() {
            return false;
        }
        self.push_undo(snapshot);
        self.binder.teardown(instance_id);
        self.widgets.remove(instance_id);
        self.bus.publish(EditorEvent::ItemRemoved {
            instance_id: instance_id.clone(),
        });
        true
    }

    /// Replace the instance configuration. Returns what the schema does not accept.
    pub fn configure(
        &mut self,
        instance_id: &InstanceId,
        config: Map<String, Value>,
    ) -> SessionResult<Vec<ConfigIssue>> {
        let snapshot = self.board.items().to_vec();
        let issues = self.board.update_config(&self.registry, instance_id, config)?;
        self.push_undo(snapshot);
        for issue in &issues {
            log::warn!("Instance {}: {}", instance_id, issue);
        }
        self.bus.publish(EditorEvent::ConfigChanged {
            instance_id: instance_id.clone(),
        });
        Ok(issues)
    }

    /// Replace the data binding and re-resolve it if the instance is on a surface.
    pub fn bind_data(
        &mut self,
        instance_id: &InstanceId,
        config: DataSourceConfig,
    ) -> SessionResult<()> {
        let snapshot = self.board.items().to_vec();
        self.board.bind_data(instance_id, config)?;
        self.push_undo(snapshot);
        self.rebind(instance_id);
        self.bus.publish(EditorEvent::DataChanged {
            instance_id: instance_id.clone(),
        });
        Ok(())
    }

    fn rebind(&mut self, instance_id: &InstanceId) {
        if !self.binder.is_active(instance_id) {
            return;
        }
        let Some(item) = self.board.item(instance_id) else {
            self.binder.teardown(instance_id);
            return;
        };
        match self.registry.get(item.type_id()) {
            Some(definition) => self.binder.resolve(item, definition),
            None => {
                self.binder.teardown(instance_id);
            }
        }
    }

    /// Re-fetch the request-based fields of an instance.
    pub fn refresh(&mut self, instance_id: &InstanceId) -> usize {
        self.binder.refresh(instance_id)
    }

    /// Apply data that has already arrived for any instance.
    pub fn process_data(&mut self) -> usize {
        self.binder.process_pending()
    }

    /// Wait for the next data update and apply it.
    pub async fn next_data(&mut self) -> usize {
        self.binder.process_next().await
    }

    /// Apply the proposals surfaces published since the last call.
    ///
    /// Rejected proposals are published as `GeometryRejected`. Returns how many
    /// proposals took effect.
    pub fn apply_pending(&mut self) -> usize {
        let pending: Vec<EditorEvent> = match self.inbox.lock() {
            Ok(mut queue) => queue.drain(..).collect(),
            Err(_) => return 0,
        };

        let mut applied = 0;
        for event in pending {
            match event {
                EditorEvent::GeometryProposed {
                    instance_id,
                    geometry,
                } => {
                    if self.move_resize(&instance_id, geometry).is_ok() {
                        applied += 1;
                    }
                }
                EditorEvent::RemoveRequested { instance_id } => {
                    if self.remove_item(&instance_id) {
                        applied += 1;
                    }
                }
                _ => {}
            }
        }
        applied
    }

    /// Undo the last edit. Returns false if there is nothing to undo.
    pub fn undo(&mut self) -> bool {
        let Some(snapshot) = self.undo_stack.pop() else {
            return false;
        };
        let current = self.board.items().to_vec();
        self.redo_stack.push(current);
        self.restore(snapshot);
        true
    }

    /// Redo the last undone edit. Returns false if there is nothing to redo.
    pub fn redo(&mut self) -> bool {
        let Some(snapshot) = self.redo_stack.pop() else {
            return false;
        };
        let current = self.board.items().to_vec();
        self.undo_stack.push(current);
        self.restore(snapshot);
        true
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    fn restore(&mut self, items: Vec<LayoutItem>) {
        if let Err(e) = self.board.replace_items(items) {
            log::warn!("Could not restore snapshot: {}", e);
            return;
        }
        for instance_id in self.binder.active_instances() {
            self.rebind(&instance_id);
        }
        let board = &self.board;
        self.widgets.retain(|id| board.contains(id));
    }

    /// Snapshot the board for persistence.
    pub fn save(&self) -> SessionResult<BoardRecord> {
        Ok(self.board.to_record()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::{
        FetchError, FetchFuture, FetchRequest, FieldSource, PushSink, RequestDescriptor,
        SubscribeRequest, Unsubscribe,
    };
    use crate::board::OwnerScope;
    use crate::grid::GridSize;
    use crate::registry::{ComponentDefinition, DataRequirement};
    use serde_json::json;

    struct EchoFetch;

    impl FetchCapability for EchoFetch {
        fn request(&self, request: FetchRequest) -> FetchFuture {
            Box::pin(async move { Ok(json!(request.descriptor.endpoint)) })
        }

        fn subscribe(
            &self,
            _request: SubscribeRequest,
            _sink: PushSink,
        ) -> Result<Box<dyn Unsubscribe>, FetchError> {
            Err(FetchError::Unavailable("no push".into()))
        }
    }

    fn registry() -> Arc<ComponentRegistry> {
        Arc::new(
            ComponentRegistry::builder()
                .with(
                    ComponentDefinition::new("gauge", GridSize::new(3, 2))
                        .with_min_size(GridSize::new(2, 2))
                        .with_data_requirement(DataRequirement::required("value")),
                )
                .build(),
        )
    }

    fn session() -> EditorSession {
        EditorSession::open(
            registry(),
            Board::new("Plant", OwnerScope::tenant("t-1")),
            Arc::new(EchoFetch),
            &EngineConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_empty_registry_is_fatal() {
        let result = EditorSession::open(
            Arc::new(ComponentRegistry::builder().build()),
            Board::new("Plant", OwnerScope::tenant("t-1")),
            Arc::new(EchoFetch),
            &EngineConfig::default(),
        );
        assert!(matches!(result, Err(SessionError::EmptyRegistry)));
    }

    #[test]
    fn test_add_item_and_undo_redo() {
        let mut session = session();
        let id = session.add_item("gauge", None).unwrap();
        assert!(session.board().contains(&id));

        assert!(session.undo());
        assert!(session.board().is_empty());
        assert!(session.redo());
        assert!(session.board().contains(&id));
        assert!(!session.redo());
    }

    #[test]
    fn test_failed_add_leaves_no_undo_entry() {
        let mut session = session();
        assert!(session.add_item("missing", None).is_err());
        assert!(!session.can_undo());
    }

    #[test]
    fn test_move_resize_rejection_is_published() {
        let mut session = session();
        let id = session.add_item("gauge", None).unwrap();
        let before = session.bus().stats().get(&EventKind::GeometryRejected).copied();
        assert_eq!(before, None);

        let result = session.move_resize(&id, GridRect::new(0, 0, 1, 1));
        assert!(matches!(
            result,
            Err(SessionError::Board(BoardError::InvalidGeometry { .. }))
        ));
        let off_surface = session.move_resize(&id, GridRect::new(11, 0, 3, 2));
        assert!(off_surface.is_err());
        assert_eq!(session.bus().history(EventKind::GeometryRejected).len(), 2);
        assert_eq!(session.board().item(&id).unwrap().size(), GridSize::new(3, 2));
    }

    #[test]
    fn test_move_resize_with_overflowing_edges_is_rejected() {
        let mut session = session();
        let id = session.add_item("gauge", None).unwrap();
        let before = session.board().item(&id).unwrap().geometry();

        let result = session.move_resize(&id, GridRect::new(u32::MAX, 0, 3, 2));
        assert!(matches!(
            result,
            Err(SessionError::Board(BoardError::InvalidGeometry { .. }))
        ));
        assert!(session.move_resize(&id, GridRect::new(0, u32::MAX, 3, 2)).is_err());
        assert_eq!(session.board().item(&id).unwrap().geometry(), before);
        assert_eq!(session.bus().history(EventKind::GeometryRejected).len(), 2);
    }

    #[test]
    fn test_proposals_apply_on_drain() {
        let mut session = session();
        let id = session.add_item("gauge", None).unwrap();

        session.bus_mut().publish(EditorEvent::GeometryProposed {
            instance_id: id.clone(),
            geometry: GridRect::new(2, 1, 4, 3),
        });
        assert_eq!(session.board().item(&id).unwrap().geometry(), GridRect::new(0, 0, 3, 2));

        assert_eq!(session.apply_pending(), 1);
        assert_eq!(session.board().item(&id).unwrap().geometry(), GridRect::new(2, 1, 4, 3));

        session.bus_mut().publish(EditorEvent::RemoveRequested {
            instance_id: id.clone(),
        });
        assert_eq!(session.apply_pending(), 1);
        assert!(session.board().is_empty());
        assert_eq!(session.apply_pending(), 0);
    }

    #[tokio::test]
    async fn test_remove_tears_down_bindings() {
        let mut session = session();
        let id = session.add_item("gauge", None).unwrap();
        let config = DataSourceConfig::default()
            .with_field("value", FieldSource::Request(RequestDescriptor::get("/v")));
        session.bind_data(&id, config).unwrap();

        {
            let (board, mut ctx) = session.surface();
            let item = board.item(&id).unwrap();
            let definition = ctx.registry.get(item.type_id()).unwrap();
            ctx.binder.resolve(item, definition);
        }
        assert_eq!(session.binder().in_flight(&id), 1);

        assert!(session.remove_item(&id));
        assert!(!session.binder().is_active(&id));
        tokio::task::yield_now().await;
        assert_eq!(session.process_data(), 0);
    }

    #[tokio::test]
    async fn test_bind_data_rebinds_active_instance() {
        let mut session = session();
        let id = session.add_item("gauge", None).unwrap();
        {
            let (board, mut ctx) = session.surface();
            let item = board.item(&id).unwrap();
            ctx.binder.resolve(item, ctx.registry.get("gauge").unwrap());
        }
        assert!(!session.binder().is_fully_bound(&id));

        let config = DataSourceConfig::default().with_field("value", FieldSource::literal(json!(3)));
        session.bind_data(&id, config).unwrap();
        assert!(session.binder().is_fully_bound(&id));
        assert_eq!(session.binder().value(&id, "value"), Some(&json!(3)));
    }

    #[test]
    fn test_configure_reports_issues() {
        let mut session = session();
        let id = session.add_item("gauge", None).unwrap();
        let issues = session
            .configure(&id, json!({"unknown": 1}).as_object().cloned().unwrap())
            .unwrap();
        assert_eq!(issues, vec![ConfigIssue::UnknownField("unknown".into())]);
    }

    #[test]
    fn test_undo_limit() {
        let config = EngineConfig {
            history: crate::config::HistoryConfig { undo_limit: 2 },
            ..EngineConfig::default()
        };
        let mut session = EditorSession::open(
            registry(),
            Board::new("Plant", OwnerScope::tenant("t-1")),
            Arc::new(EchoFetch),
            &config,
        )
        .unwrap();
        for _ in 0..4 {
            session.add_item("gauge", None).unwrap();
        }
        assert!(session.undo());
        assert!(session.undo());
        assert!(!session.undo());
        assert_eq!(session.board().len(), 2);
    }

    #[test]
    fn test_load_reports_orphans() {
        let mut board = Board::new("Plant", OwnerScope::tenant("t-1"));
        board
            .insert_item(LayoutItem::new("b".into(), "missing-widget", GridRect::new(0, 0, 2, 2)))
            .unwrap();
        let session = EditorSession::load(
            registry(),
            board.to_record().unwrap(),
            Arc::new(EchoFetch),
            &EngineConfig::default(),
        )
        .unwrap();
        assert_eq!(session.diagnostics().len(), 1);
        assert_eq!(session.board().len(), 1);
        assert_eq!(session.save().unwrap().id, board.id);
    }
}
