//! Widget state definitions.

use super::handles::HandleKind;

/// The UI state of a placed widget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WidgetState {
    /// Normal display state - no interaction.
    #[default]
    Normal,
    /// Widget is selected (shows handles, can be moved/resized).
    Selected,
    /// Widget is being dragged.
    Interacting(InteractionKind),
}

impl WidgetState {
    /// Check if widget is selected (either just selected or being dragged).
    pub fn is_selected(&self) -> bool {
        matches!(self, Self::Selected | Self::Interacting(_))
    }

    pub fn is_interacting(&self) -> bool {
        matches!(self, Self::Interacting(_))
    }
}

/// Kind of drag in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionKind {
    Moving,
    Resizing(HandleKind),
}
