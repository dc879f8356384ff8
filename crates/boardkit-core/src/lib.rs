//! BoardKit Core Library
//!
//! Data model and runtime of the dashboard builder: the component catalog, board
//! documents, grid layout, data bindings, the editor event bus and editing sessions.
//! Rendering lives in `boardkit-render`.

pub mod binding;
pub mod board;
pub mod config;
pub mod diagnostics;
pub mod events;
pub mod grid;
pub mod registry;
pub mod session;
pub mod storage;
pub mod widget;

pub use binding::{
    Aggregation, BindingError, BindingSnapshot, DataBinder, DataBindingStatus, DataOrigin,
    DataSourceConfig, FetchCapability, FetchError, FetchFuture, FetchRequest, FieldSource, Method,
    PushSink, RefreshPolicy, RequestDescriptor, SubscribeRequest, SubscriptionDescriptor,
    TimeRange, Unsubscribe,
};
pub use board::{
    Board, BoardError, BoardRecord, BoardResult, InstanceId, LayoutItem, LoadedBoard,
    OwnerScope, ResolvedItem,
};
pub use config::{ConfigError, EngineConfig};
pub use diagnostics::{Diagnostic, Diagnostics};
pub use events::{BusEvent, EditorEvent, EventBus, EventKind, SubscribeOptions, SubscriptionId};
pub use grid::{GridPoint, GridRect, GridSize, SurfaceBounds};
pub use registry::{
    CatalogFilter, ComponentDefinition, ComponentRegistry, ConfigField, DataRequirement,
    FieldKind, RegistryBuilder, SourceKind,
};
pub use session::{EditorSession, SessionError, SessionResult, SurfaceContext};
pub use storage::{AutoSaveManager, FileStorage, MemoryStorage, Storage, StorageError};
pub use widget::{Handle, HandleKind, InteractionKind, WidgetManager, WidgetState};
