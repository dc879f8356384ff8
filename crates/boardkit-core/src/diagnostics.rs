//! Non-fatal diagnostics collected while building catalogs and loading boards.

use thiserror::Error;

/// A recoverable problem reported instead of aborting the surrounding operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Diagnostic {
    /// A second definition was registered under an existing type id; the first one was kept.
    #[error("duplicate registration for component type '{type_id}', keeping the first")]
    DuplicateRegistration { type_id: String },
    /// A definition with inconsistent size constraints was refused.
    #[error("component type '{type_id}' rejected: {reason}")]
    InvalidDefinition { type_id: String, reason: String },
    /// A board item references a type id that is not in the catalog.
    #[error("item '{instance_id}' references unknown component type '{type_id}'")]
    UnknownComponentType { instance_id: String, type_id: String },
    /// A persisted item could not be decoded and was skipped.
    #[error("board item #{index} skipped: {reason}")]
    MalformedBoardItem { index: usize, reason: String },
    /// A persisted item reused an instance id already present on the board and was skipped.
    #[error("board item #{index} skipped: instance id '{instance_id}' already used")]
    DuplicateInstanceId { index: usize, instance_id: String },
    /// An item's stored configuration does not match its component's schema. Defaults
    /// stand in for the rejected values.
    #[error("item '{instance_id}' has invalid configuration: {reason}")]
    InvalidInstanceConfig { instance_id: String, reason: String },
}

impl Diagnostic {
    /// Emit the diagnostic on the log channel.
    pub fn log(&self) {
        log::warn!("{}", self);
    }
}

/// An append-only list of diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record and log a diagnostic.
    pub fn report(&mut self, diagnostic: Diagnostic) {
        diagnostic.log();
        self.entries.push(diagnostic);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    /// Move every entry of `other` into `self` without logging them again.
    pub fn extend(&mut self, other: Diagnostics) {
        self.entries.extend(other.entries);
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.entries
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
