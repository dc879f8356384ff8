//! Renderer trait and frame types.

use boardkit_core::widget::Handle;
use boardkit_core::{Board, BindingSnapshot, GridRect, InstanceId, SurfaceContext};
use kurbo::{Point, Rect, Size};
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors that can occur during rendering.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RendererError {
    #[error("cannot {operation} while the surface is {from:?}")]
    InvalidState {
        from: SurfaceState,
        operation: &'static str,
    },
    #[error("{0} is not supported by this surface")]
    Unsupported(&'static str),
    #[error("instance {0} cannot be manipulated on this surface")]
    NotInteractive(InstanceId),
    #[error("no interaction in progress")]
    NoInteraction,
}

/// Result type for renderer operations.
pub type RenderResult<T> = Result<T, RendererError>;

/// Lifecycle of a render surface.
///
/// `Uninitialized → Active ⇄ Asleep → Destroyed`; `Destroyed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SurfaceState {
    #[default]
    Uninitialized,
    Active,
    Asleep,
    Destroyed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementKind {
    /// A widget with a registered definition.
    Widget,
    /// An orphaned item whose type is not in the catalog.
    Placeholder,
}

/// One item as laid out on the surface.
#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    pub instance_id: InstanceId,
    pub type_id: String,
    pub render_id: Option<String>,
    /// Grid rectangle as shown, which can differ from the stored geometry while a drag
    /// is previewed or when the surface compacts vertically.
    pub grid: GridRect,
    /// Pixel rectangle on the surface.
    pub bounds: Rect,
    pub kind: PlacementKind,
    pub selected: bool,
    /// Resize handles, only for selected widgets.
    pub handles: Vec<Handle>,
    /// Instance configuration merged over the component's defaults. Placeholders carry
    /// the stored values as they are.
    pub config: Map<String, Value>,
    /// Binding statuses per data field. Empty for placeholders.
    pub data: BindingSnapshot,
}

/// The output of one render pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    /// Items in board order; later placements paint over earlier ones.
    pub placements: Vec<Placement>,
    /// Pixel size of the laid-out content.
    pub size: Size,
    /// Number of grid rows in use.
    pub rows: u32,
}

impl Frame {
    pub fn placement(&self, instance_id: &InstanceId) -> Option<&Placement> {
        self.placements.iter().find(|p| &p.instance_id == instance_id)
    }

    /// Topmost placement under `point`.
    pub fn hit_test(&self, point: Point) -> Option<&Placement> {
        self.placements.iter().rev().find(|p| p.bounds.contains(point))
    }

    pub fn placeholders(&self) -> impl Iterator<Item = &Placement> {
        self.placements
            .iter()
            .filter(|p| p.kind == PlacementKind::Placeholder)
    }
}

/// A render surface for boards.
///
/// Surfaces read the board, activate data bindings for the items they show and publish
/// edit proposals on the event bus in `ctx`. They never mutate the board.
pub trait Renderer: Send {
    fn name(&self) -> &str;

    fn state(&self) -> SurfaceState;

    /// Prepare the surface for `board`.
    ///
    /// Re-initialising tears down the bindings activated before and starts over.
    fn init(&mut self, board: &Board, ctx: &mut SurfaceContext<'_>) -> RenderResult<()>;

    /// Lay out the board and reconcile bindings with its current items.
    fn render(&mut self, board: &Board, ctx: &mut SurfaceContext<'_>) -> RenderResult<&Frame>;

    /// Release surface state and every binding the surface activated.
    fn destroy(&mut self, ctx: &mut SurfaceContext<'_>) -> RenderResult<()>;

    /// Pause the surface.
    fn sleep(&mut self) -> RenderResult<()> {
        Err(RendererError::Unsupported("sleep"))
    }

    /// Resume a paused surface.
    fn wakeup(&mut self) -> RenderResult<()> {
        Err(RendererError::Unsupported("wakeup"))
    }
}
