//! Widget manager for tracking UI state of placed instances.

use super::state::{InteractionKind, WidgetState};
use crate::board::InstanceId;
use std::collections::{BTreeSet, HashMap};

/// Manages UI state for all instances on a board.
///
/// This separates UI concerns (selection and dragging) from the layout items.
#[derive(Debug, Clone, Default)]
pub struct WidgetManager {
    /// UI state for each instance.
    states: HashMap<InstanceId, WidgetState>,
    /// Currently selected instances (subset of states with Selected/Interacting).
    selected: BTreeSet<InstanceId>,
    /// Instance currently being dragged.
    active: Option<InstanceId>,
}

impl WidgetManager {
    /// Create a new widget manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the state of an instance.
    pub fn state(&self, id: &InstanceId) -> WidgetState {
        self.states.get(id).copied().unwrap_or_default()
    }

    /// Set the state of an instance.
    pub fn set_state(&mut self, id: &InstanceId, state: WidgetState) {
        if state.is_selected() {
            self.selected.insert(id.clone());
        } else {
            self.selected.remove(id);
        }

        if state.is_interacting() {
            self.active = Some(id.clone());
        } else if self.active.as_ref() == Some(id) {
            self.active = None;
        }

        self.states.insert(id.clone(), state);
    }

    /// Check if an instance is selected.
    pub fn is_selected(&self, id: &InstanceId) -> bool {
        self.selected.contains(id)
    }

    /// Selected instance ids, in id order.
    pub fn selected(&self) -> Vec<InstanceId> {
        self.selected.iter().cloned().collect()
    }

    /// The instance being dragged, if any.
    pub fn active(&self) -> Option<&InstanceId> {
        self.active.as_ref()
    }

    /// Select a single instance (clears other selections).
    pub fn select(&mut self, id: &InstanceId) {
        self.clear_selection();
        self.add_to_selection(id);
    }

    pub fn add_to_selection(&mut self, id: &InstanceId) {
        self.set_state(id, WidgetState::Selected);
    }

    pub fn deselect(&mut self, id: &InstanceId) {
        if self.selected.contains(id) {
            self.set_state(id, WidgetState::Normal);
        }
    }

    /// Clear all selections.
    pub fn clear_selection(&mut self) {
        let selected: Vec<_> = self.selected.iter().cloned().collect();
        for id in selected {
            self.set_state(&id, WidgetState::Normal);
        }
    }

    /// Start dragging an instance. It becomes the only selected one.
    pub fn begin_interaction(&mut self, id: &InstanceId, kind: InteractionKind) {
        if !self.is_selected(id) {
            self.select(id);
        }
        if let Some(old) = self.active.clone() {
            if &old != id {
                self.end_interaction();
            }
        }
        self.set_state(id, WidgetState::Interacting(kind));
    }

    /// Finish the current drag, leaving the instance selected.
    pub fn end_interaction(&mut self) -> Option<InstanceId> {
        let id = self.active.clone()?;
        self.set_state(&id, WidgetState::Selected);
        Some(id)
    }

    /// The current drag, if any.
    pub fn interaction(&self) -> Option<(&InstanceId, InteractionKind)> {
        let id = self.active.as_ref()?;
        match self.state(id) {
            WidgetState::Interacting(kind) => Some((id, kind)),
            _ => None,
        }
    }

    /// Remove state for a deleted instance.
    pub fn remove(&mut self, id: &InstanceId) {
        self.states.remove(id);
        self.selected.remove(id);
        if self.active.as_ref() == Some(id) {
            self.active = None;
        }
    }

    /// Drop state for every instance not in `live`.
    pub fn retain(&mut self, live: impl Fn(&InstanceId) -> bool) {
        let stale: Vec<InstanceId> = self.states.keys().filter(|id| !live(id)).cloned().collect();
        for id in stale {
            self.remove(&id);
        }
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
