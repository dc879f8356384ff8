//! Built-in component catalog.

use boardkit_core::{
    ComponentDefinition, ComponentRegistry, ConfigField, DataRequirement, FieldKind, GridSize,
    RegistryBuilder, SourceKind,
};
use serde_json::json;

/// Definitions shipped with the application.
pub fn builtin_definitions() -> Vec<ComponentDefinition> {
    vec![
        ComponentDefinition::new("gauge", GridSize::new(3, 2))
            .with_name("Gauge")
            .with_category("metrics")
            .with_tag("realtime")
            .with_min_size(GridSize::new(2, 2))
            .with_max_size(GridSize::new(6, 4))
            .with_config_field(ConfigField::new("unit", FieldKind::String, json!("")))
            .with_config_field(ConfigField::new("min", FieldKind::Number, json!(0)))
            .with_config_field(ConfigField::new("max", FieldKind::Number, json!(100)))
            .with_data_requirement(DataRequirement::required("value")),
        ComponentDefinition::new("line-chart", GridSize::new(6, 4))
            .with_name("Line chart")
            .with_category("metrics")
            .with_tag("history")
            .with_min_size(GridSize::new(4, 3))
            .with_config_field(
                ConfigField::new("title", FieldKind::String, json!(""))
                    .with_description("Shown above the plot"),
            )
            .with_config_field(ConfigField::new("smooth", FieldKind::Boolean, json!(false)))
            .with_data_requirement(
                DataRequirement::required("series")
                    .with_sources([SourceKind::Request, SourceKind::Static]),
            ),
        ComponentDefinition::new("text", GridSize::new(4, 1))
            .with_name("Text")
            .with_category("layout")
            .with_config_field(ConfigField::new("content", FieldKind::String, json!("")))
            .with_data_requirement(DataRequirement::optional("content")),
        ComponentDefinition::new("switch", GridSize::new(2, 1))
            .with_name("Switch")
            .with_category("controls")
            .with_tag("realtime")
            .with_permission("device:write")
            .with_max_size(GridSize::new(4, 2))
            .with_data_requirement(
                DataRequirement::required("state")
                    .with_sources([SourceKind::Push, SourceKind::Static])
                    .with_default(json!(false)),
            ),
    ]
}

/// Register the built-in definitions, logging anything the builder refused.
pub fn builtin_registry() -> ComponentRegistry {
    let mut builder = RegistryBuilder::new();
    for definition in builtin_definitions() {
        builder.register(definition);
    }
    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use boardkit_core::CatalogFilter;

    #[test]
    fn test_builtin_catalog_is_consistent() {
        let registry = builtin_registry();
        assert!(registry.diagnostics().is_empty());
        assert_eq!(registry.len(), 4);
        let ids: Vec<_> = registry.list(None).iter().map(|d| d.type_id.as_str()).collect();
        assert_eq!(ids, ["gauge", "line-chart", "text", "switch"]);
    }

    #[test]
    fn test_switch_needs_permission() {
        let registry = builtin_registry();
        let metrics = CatalogFilter::category("metrics");
        assert_eq!(registry.list(Some(&metrics)).len(), 2);
        let ungranted = CatalogFilter::category("controls").with_permissions(Vec::<String>::new());
        assert!(registry.list(Some(&ungranted)).is_empty());
        let granted = CatalogFilter::category("controls").with_permissions(["device:write"]);
        assert_eq!(registry.list(Some(&granted)).len(), 1);
    }
}
