//! Component registry: the catalog of widget definitions.
//!
//! The catalog has two phases. During startup every widget module registers its
//! definition on a [`RegistryBuilder`]; [`RegistryBuilder::build`] then freezes the
//! catalog into a [`ComponentRegistry`] that only supports lookups and can be shared
//! freely behind an `Arc`.

mod definition;

pub use definition::{
    ComponentDefinition, ConfigField, ConfigIssue, DataRequirement, FieldKind, SourceKind,
};

use crate::diagnostics::{Diagnostic, Diagnostics};
use std::collections::{BTreeMap, HashMap};

/// Startup-phase catalog that accepts registrations.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    definitions: Vec<ComponentDefinition>,
    index: HashMap<String, usize>,
    diagnostics: Diagnostics,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a definition.
    ///
    /// Never fails: a duplicate type id keeps the first entry and records a
    /// [`Diagnostic::DuplicateRegistration`]; inconsistent size constraints record a
    /// [`Diagnostic::InvalidDefinition`]. Returns true if the definition was inserted.
    pub fn register(&mut self, definition: ComponentDefinition) -> bool {
        if self.index.contains_key(&definition.type_id) {
            self.diagnostics.report(Diagnostic::DuplicateRegistration {
                type_id: definition.type_id,
            });
            return false;
        }

        if let Err(reason) = definition.check_constraints() {
            self.diagnostics.report(Diagnostic::InvalidDefinition {
                type_id: definition.type_id,
                reason,
            });
            return false;
        }

        log::debug!("Registered component type '{}'", definition.type_id);
        self.index
            .insert(definition.type_id.clone(), self.definitions.len());
        self.definitions.push(definition);
        true
    }

    /// Chainable form of [`register`](Self::register).
    pub fn with(mut self, definition: ComponentDefinition) -> Self {
        self.register(definition);
        self
    }

    /// Diagnostics recorded so far.
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Freeze the catalog.
    pub fn build(self) -> ComponentRegistry {
        log::info!(
            "Component registry frozen with {} definitions",
            self.definitions.len()
        );
        ComponentRegistry {
            definitions: self.definitions,
            index: self.index,
            diagnostics: self.diagnostics,
        }
    }
}

/// Selection criteria for [`ComponentRegistry::list`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogFilter {
    pub category: Option<String>,
    pub tag: Option<String>,
    /// Only definitions that require no permission or one of these.
    pub permissions: Option<Vec<String>>,
}

impl CatalogFilter {
    pub fn category(category: impl Into<String>) -> Self {
        Self {
            category: Some(category.into()),
            ..Self::default()
        }
    }

    pub fn tag(tag: impl Into<String>) -> Self {
        Self {
            tag: Some(tag.into()),
            ..Self::default()
        }
    }

    pub fn with_permissions(mut self, granted: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.permissions = Some(granted.into_iter().map(Into::into).collect());
        self
    }

    /// Check whether a definition passes the filter.
    pub fn matches(&self, definition: &ComponentDefinition) -> bool {
        if let Some(category) = &self.category {
            if definition.category.as_ref() != Some(category) {
                return false;
            }
        }
        if let Some(tag) = &self.tag {
            if !definition.tags.iter().any(|t| t == tag) {
                return false;
            }
        }
        if let (Some(granted), Some(required)) = (&self.permissions, &definition.permission) {
            if !granted.iter().any(|p| p == required) {
                return false;
            }
        }
        true
    }
}

/// Frozen, read-only catalog of component definitions.
#[derive(Debug, Default)]
pub struct ComponentRegistry {
    definitions: Vec<ComponentDefinition>,
    index: HashMap<String, usize>,
    diagnostics: Diagnostics,
}

impl ComponentRegistry {
    /// Start a new startup-phase builder.
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Look up a definition. `None` is a normal outcome callers must handle.
    pub fn get(&self, type_id: &str) -> Option<&ComponentDefinition> {
        self.index.get(type_id).map(|&i| &self.definitions[i])
    }

    pub fn contains(&self, type_id: &str) -> bool {
        self.index.contains_key(type_id)
    }

    /// Definitions in registration order, optionally filtered.
    pub fn list(&self, filter: Option<&CatalogFilter>) -> Vec<&ComponentDefinition> {
        self.definitions
            .iter()
            .filter(|d| filter.is_none_or(|f| f.matches(d)))
            .collect()
    }

    /// Definitions whose display name or type id contains `fragment` (case-insensitive).
    pub fn search(&self, fragment: &str) -> Vec<&ComponentDefinition> {
        let needle = fragment.to_lowercase();
        self.definitions
            .iter()
            .filter(|d| {
                d.name.to_lowercase().contains(&needle) || d.type_id.to_lowercase().contains(&needle)
            })
            .collect()
    }

    /// Number of definitions per category; uncategorised entries count under `""`.
    pub fn stats(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for definition in &self.definitions {
            let key = definition.category.clone().unwrap_or_default();
            *counts.entry(key).or_insert(0) += 1;
        }
        counts
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Diagnostics recorded while the catalog was being built.
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::GridSize;

    fn def(type_id: &str) -> ComponentDefinition {
        ComponentDefinition::new(type_id, GridSize::new(2, 2))
    }

    #[test]
    fn test_register_and_get() {
        let registry = ComponentRegistry::builder().with(def("gauge")).build();
        assert!(registry.get("gauge").is_some());
        assert!(registry.get("missing").is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_duplicate_keeps_first() {
        let mut builder = RegistryBuilder::new();
        assert!(builder.register(def("gauge").with_name("First")));
        assert!(!builder.register(def("gauge").with_name("Second")));

        let registry = builder.build();
        assert_eq!(registry.get("gauge").unwrap().name, "First");
        assert_eq!(registry.diagnostics().len(), 1);
        assert!(matches!(
            registry.diagnostics().iter().next(),
            Some(Diagnostic::DuplicateRegistration { type_id }) if type_id == "gauge"
        ));
    }

    #[test]
    fn test_invalid_definition_rejected() {
        let mut builder = RegistryBuilder::new();
        let bad = def("tiny").with_min_size(GridSize::new(4, 4));
        assert!(!builder.register(bad));
        assert!(builder.is_empty());
        assert!(matches!(
            builder.diagnostics().iter().next(),
            Some(Diagnostic::InvalidDefinition { .. })
        ));
    }

    #[test]
    fn test_list_preserves_insertion_order() {
        let registry = ComponentRegistry::builder()
            .with(def("c"))
            .with(def("a"))
            .with(def("b"))
            .build();
        let ids: Vec<_> = registry.list(None).iter().map(|d| d.type_id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_list_filters() {
        let registry = ComponentRegistry::builder()
            .with(def("gauge").with_category("chart").with_tag("iot"))
            .with(def("text").with_category("basic"))
            .with(def("switch").with_category("control").with_permission("device:write"))
            .build();

        let charts = registry.list(Some(&CatalogFilter::category("chart")));
        assert_eq!(charts.len(), 1);
        assert_eq!(charts[0].type_id, "gauge");

        let iot = registry.list(Some(&CatalogFilter::tag("iot")));
        assert_eq!(iot.len(), 1);

        let no_perms = CatalogFilter::default().with_permissions(Vec::<String>::new());
        let visible: Vec<_> = registry
            .list(Some(&no_perms))
            .iter()
            .map(|d| d.type_id.clone())
            .collect();
        assert_eq!(visible, vec!["gauge", "text"]);

        let writer = CatalogFilter::default().with_permissions(["device:write"]);
        assert_eq!(registry.list(Some(&writer)).len(), 3);
    }

    #[test]
    fn test_search_and_stats() {
        let registry = ComponentRegistry::builder()
            .with(def("gauge").with_name("Dial Gauge").with_category("chart"))
            .with(def("line-chart").with_category("chart"))
            .with(def("text"))
            .build();

        assert_eq!(registry.search("dial").len(), 1);
        assert_eq!(registry.search("CHART").len(), 1);

        let stats = registry.stats();
        assert_eq!(stats.get("chart"), Some(&2));
        assert_eq!(stats.get(""), Some(&1));
    }
}
