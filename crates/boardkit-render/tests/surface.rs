//! Session, grid surface and binder working together.

use boardkit_core::{
    Board, BoardError, ComponentDefinition, ComponentRegistry, DataOrigin, DataRequirement,
    DataSourceConfig, Diagnostic, EditorEvent, EditorSession, EngineConfig, EventKind,
    FetchCapability, FetchError, FetchFuture, FetchRequest, FieldSource, GridRect, GridSize,
    InstanceId, LayoutItem, OwnerScope, PushSink, RequestDescriptor, SessionError,
    SubscribeRequest, Unsubscribe,
};
use boardkit_render::{GridRenderer, PlacementKind, Renderer};
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Answers every request with the number of requests seen so far.
#[derive(Default)]
struct CountingFetch {
    requests: AtomicUsize,
}

impl FetchCapability for CountingFetch {
    fn request(&self, _request: FetchRequest) -> FetchFuture {
        let n = self.requests.fetch_add(1, Ordering::SeqCst) + 1;
        Box::pin(async move { Ok(json!({ "reading": n })) })
    }

    fn subscribe(
        &self,
        _request: SubscribeRequest,
        _sink: PushSink,
    ) -> Result<Box<dyn Unsubscribe>, FetchError> {
        Err(FetchError::Unavailable("push not configured".into()))
    }
}

fn registry() -> Arc<ComponentRegistry> {
    Arc::new(
        ComponentRegistry::builder()
            .with(
                ComponentDefinition::new("gauge", GridSize::new(3, 2))
                    .with_min_size(GridSize::new(2, 2))
                    .with_max_size(GridSize::new(6, 4))
                    .with_data_requirement(DataRequirement::required("value")),
            )
            .build(),
    )
}

fn gauge_id() -> InstanceId {
    InstanceId::from("gauge-1")
}

/// A saved board holding a bound gauge and a widget whose type no longer exists.
fn saved_board() -> boardkit_core::BoardRecord {
    let mut board = Board::new("Boiler room", OwnerScope::tenant("t-1").with_user("u-7"));
    let mut gauge = LayoutItem::new(gauge_id(), "gauge", GridRect::new(0, 0, 3, 2));
    gauge.data.data_source_config = DataSourceConfig::new(DataOrigin::Device {
        device_id: "boiler-3".into(),
    })
    .with_field(
        "value",
        FieldSource::Request(
            RequestDescriptor::get("/telemetry/latest").with_select("/reading"),
        ),
    );
    board.insert_item(gauge).unwrap();
    board
        .insert_item(LayoutItem::new(
            "old-1".into(),
            "missing-widget",
            GridRect::new(3, 0, 2, 2),
        ))
        .unwrap();
    board.to_record().unwrap()
}

fn open(fetch: Arc<CountingFetch>) -> EditorSession {
    EditorSession::load(registry(), saved_board(), fetch, &EngineConfig::default()).unwrap()
}

#[tokio::test]
async fn test_orphan_kept_and_refresh_issues_one_request() {
    let fetch = Arc::new(CountingFetch::default());
    let mut session = open(fetch.clone());

    let diagnostics: Vec<_> = session.diagnostics().iter().cloned().collect();
    assert_eq!(
        diagnostics,
        vec![Diagnostic::UnknownComponentType {
            instance_id: "old-1".into(),
            type_id: "missing-widget".into(),
        }]
    );
    assert_eq!(session.board().len(), 2);

    let mut renderer = GridRenderer::default();
    {
        let (board, mut ctx) = session.surface();
        renderer.init(board, &mut ctx).unwrap();
    }
    assert_eq!(fetch.requests.load(Ordering::SeqCst), 1);

    session.next_data().await;
    assert_eq!(session.binder().value(&gauge_id(), "value"), Some(&json!(1)));

    {
        let (board, mut ctx) = session.surface();
        let frame = renderer.render(board, &mut ctx).unwrap();
        assert_eq!(frame.placements.len(), 2);
        let placeholder = frame.placeholders().next().unwrap();
        assert_eq!(placeholder.instance_id.as_str(), "old-1");
        assert_eq!(placeholder.kind, PlacementKind::Placeholder);
        let gauge = frame.placement(&gauge_id()).unwrap();
        assert!(gauge.data["value"].is_valid);
    }

    assert_eq!(session.refresh(&gauge_id()), 1);
    assert_eq!(fetch.requests.load(Ordering::SeqCst), 2);
    session.next_data().await;
    assert_eq!(session.binder().value(&gauge_id(), "value"), Some(&json!(2)));

    // Saving keeps the orphan.
    let record = session.save().unwrap();
    assert!(record.config.contains("missing-widget"));
}

#[tokio::test]
async fn test_gauge_below_minimum_is_rejected() {
    let mut session = open(Arc::new(CountingFetch::default()));
    let result = session.move_resize(&gauge_id(), GridRect::new(0, 0, 1, 1));
    assert!(matches!(
        result,
        Err(SessionError::Board(BoardError::InvalidGeometry { .. }))
    ));
    assert_eq!(
        session.board().item(&gauge_id()).unwrap().geometry(),
        GridRect::new(0, 0, 3, 2)
    );
    assert_eq!(session.bus().history(EventKind::GeometryRejected).len(), 1);
}

#[tokio::test]
async fn test_drag_proposal_applied_by_session() {
    let mut session = open(Arc::new(CountingFetch::default()));
    let mut renderer = GridRenderer::new(session_surface_config());
    {
        let (board, mut ctx) = session.surface();
        renderer.init(board, &mut ctx).unwrap();
        renderer
            .begin_resize(board, &mut ctx, &gauge_id(), boardkit_core::HandleKind::Right)
            .unwrap();
        let step = renderer.column_width() + renderer.config().margin;
        renderer.drag(step, 0.0).unwrap();
        assert_eq!(
            renderer.end_drag(&mut ctx).unwrap(),
            Some(GridRect::new(0, 0, 4, 2))
        );
    }

    assert_eq!(session.apply_pending(), 1);
    assert_eq!(
        session.board().item(&gauge_id()).unwrap().geometry(),
        GridRect::new(0, 0, 4, 2)
    );
    assert_eq!(
        session.bus().history(EventKind::GeometryApplied),
        vec![EditorEvent::GeometryApplied {
            instance_id: gauge_id(),
            geometry: GridRect::new(0, 0, 4, 2),
        }]
    );

    assert!(session.undo());
    assert_eq!(
        session.board().item(&gauge_id()).unwrap().geometry(),
        GridRect::new(0, 0, 3, 2)
    );
}

#[tokio::test]
async fn test_removal_stops_data_for_instance() {
    let fetch = Arc::new(CountingFetch::default());
    let mut session = open(fetch.clone());
    let mut renderer = GridRenderer::default();
    {
        let (board, mut ctx) = session.surface();
        renderer.init(board, &mut ctx).unwrap();
        renderer.request_remove(&mut ctx, &gauge_id()).unwrap();
    }
    assert_eq!(session.apply_pending(), 1);
    assert!(!session.binder().is_active(&gauge_id()));
    // The in-flight result for the removed gauge is dropped.
    assert_eq!(session.process_data(), 0);
    assert_eq!(session.refresh(&gauge_id()), 0);

    let (board, mut ctx) = session.surface();
    let frame = renderer.render(board, &mut ctx).unwrap();
    assert_eq!(frame.placements.len(), 1);
    renderer.destroy(&mut ctx).unwrap();
}

fn session_surface_config() -> boardkit_core::config::SurfaceConfig {
    EngineConfig::default().surface
}
