//! BoardKit Render Library
//!
//! Renderer abstraction and the constrained-grid surface for BoardKit boards.
//! Surfaces read the board, drive data bindings for what they show, and propose edits
//! on the session's event bus.

mod grid;
mod renderer;

pub use grid::{GridRenderer, HANDLE_HIT_TOLERANCE};
pub use renderer::{
    Frame, Placement, PlacementKind, RenderResult, Renderer, RendererError, SurfaceState,
};
