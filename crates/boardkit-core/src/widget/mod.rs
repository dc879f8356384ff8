//! Interaction state of placed widgets.
//!
//! Selection and drag state live here, keyed by instance id. Layout items stay
//! pure data; surfaces read this state to decide what to draw around each widget.

mod handles;
mod manager;
mod state;

pub use handles::{Handle, HandleKind, HandleShape, handles_for_rect, hit_test_handle};
pub use manager::WidgetManager;
pub use state::{InteractionKind, WidgetState};
