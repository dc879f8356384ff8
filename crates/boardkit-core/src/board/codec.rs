//! Persisted item array encoding.
//!
//! The board's `config` column holds a JSON array of layout items. Decoding is
//! tolerant: items that cannot be understood are skipped with a diagnostic instead of
//! failing the whole board.

use super::{BoardError, BoardResult, InstanceId, LayoutItem};
use crate::diagnostics::{Diagnostic, Diagnostics};
use serde_json::{Map, Value};
use std::collections::HashSet;

/// Keys of the pre-grid item shape `{id, type, x, y, width, height, properties}`.
const LEGACY_KEYS: [&str; 7] = ["id", "type", "x", "y", "width", "height", "properties"];

/// Encode items as the persisted JSON array.
pub fn serialize_items(items: &[LayoutItem]) -> BoardResult<String> {
    serde_json::to_string(items).map_err(|e| BoardError::Serialization(e.to_string()))
}

/// Decode a persisted item array.
///
/// Fails only when the blob is not a JSON array. Blank blobs decode to no items.
pub fn deserialize_items(blob: &str) -> BoardResult<(Vec<LayoutItem>, Diagnostics)> {
    let mut diagnostics = Diagnostics::new();
    if blob.trim().is_empty() {
        return Ok((Vec::new(), diagnostics));
    }

    let value: Value =
        serde_json::from_str(blob).map_err(|e| BoardError::Serialization(e.to_string()))?;
    let Value::Array(entries) = value else {
        return Err(BoardError::Serialization(
            "board config is not a JSON array".to_string(),
        ));
    };

    let mut items = Vec::with_capacity(entries.len());
    let mut seen: HashSet<InstanceId> = HashSet::new();
    for (index, entry) in entries.into_iter().enumerate() {
        let item = match decode_item(entry) {
            Ok(item) => item,
            Err(reason) => {
                diagnostics.report(Diagnostic::MalformedBoardItem { index, reason });
                continue;
            }
        };
        if !seen.insert(item.instance_id.clone()) {
            diagnostics.report(Diagnostic::DuplicateInstanceId {
                index,
                instance_id: item.instance_id.to_string(),
            });
            continue;
        }
        items.push(item);
    }

    Ok((items, diagnostics))
}

fn decode_item(entry: Value) -> Result<LayoutItem, String> {
    let Value::Object(object) = entry else {
        return Err("item is not an object".to_string());
    };

    let item = if object.contains_key("i") || object.contains_key("data") {
        serde_json::from_value::<LayoutItem>(Value::Object(object)).map_err(|e| e.to_string())?
    } else if object.contains_key("type") {
        convert_legacy(object)?
    } else {
        return Err("unrecognised item shape".to_string());
    };

    if item.instance_id.as_str().is_empty() {
        return Err("empty instance id".to_string());
    }
    if item.type_id().is_empty() {
        return Err("empty type id".to_string());
    }
    if item.w == 0 || item.h == 0 {
        return Err(format!("zero-sized geometry {}x{}", item.w, item.h));
    }
    if !item.geometry().is_representable() {
        return Err(format!(
            "geometry {}x{} at ({}, {}) overflows the grid",
            item.w, item.h, item.x, item.y
        ));
    }
    Ok(item)
}

/// Map the legacy shape onto a layout item. Missing geometry defaults; nothing else is
/// inferred.
fn convert_legacy(mut object: Map<String, Value>) -> Result<LayoutItem, String> {
    let instance_id = match object.get("id") {
        Some(Value::String(id)) => InstanceId::from(id.as_str()),
        Some(Value::Number(n)) => InstanceId::from(n.to_string()),
        _ => return Err("legacy item without id".to_string()),
    };
    let type_id = object
        .get("type")
        .and_then(Value::as_str)
        .ok_or("legacy item type is not a string")?
        .to_string();

    let cells = |key: &str, default: u32| -> u32 {
        object
            .get(key)
            .and_then(Value::as_f64)
            .filter(|v| v.is_finite() && *v >= 0.0)
            .map(|v| v.round() as u32)
            .unwrap_or(default)
    };
    let x = cells("x", 0);
    let y = cells("y", 0);
    let w = cells("width", 1).max(1);
    let h = cells("height", 1).max(1);

    let mut item = LayoutItem::new(instance_id, type_id, crate::grid::GridRect::new(x, y, w, h));
    if let Some(Value::Object(properties)) = object.remove("properties") {
        item.data.instance_config = properties;
    }
    for key in LEGACY_KEYS {
        object.remove(key);
    }
    item.extra = object;
    Ok(item)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::{
        Aggregation, DataOrigin, DataSourceConfig, FieldSource, Method, RefreshPolicy,
        RequestDescriptor, SubscriptionDescriptor, TimeRange,
    };
    use crate::grid::GridRect;
    use chrono::DateTime;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_wire_shape() {
        let item = LayoutItem::new("a".into(), "gauge", GridRect::new(1, 2, 3, 4));
        let blob = serialize_items(&[item]).unwrap();
        let value: Value = serde_json::from_str(&blob).unwrap();
        assert_eq!(value[0]["i"], json!("a"));
        assert_eq!(value[0]["x"], json!(1));
        assert_eq!(value[0]["h"], json!(4));
        assert_eq!(value[0]["data"]["typeId"], json!("gauge"));
        assert!(value[0]["data"]["dataSourceConfig"].is_object());
    }

    #[test]
    fn test_missing_optional_keys_default() {
        let blob = r#"[{"x":0,"y":0,"w":2,"h":2,"i":"a","data":{"typeId":"text"}}]"#;
        let (items, diagnostics) = deserialize_items(blob).unwrap();
        assert!(diagnostics.is_empty());
        assert_eq!(items[0].type_id(), "text");
        assert!(items[0].instance_config().is_empty());
        assert!(items[0].data_source_config().field_mapping.is_empty());
    }

    #[test]
    fn test_null_optional_values_default() {
        let blob = r#"[{"x":0,"y":0,"w":3,"h":2,"i":"a","data":{"typeId":"gauge",
            "renderId":null,"dataSourceConfig":null,"instanceConfig":null}}]"#;
        let (items, diagnostics) = deserialize_items(blob).unwrap();
        assert!(diagnostics.is_empty());
        assert_eq!(items.len(), 1);
        assert!(items[0].instance_config().is_empty());
        assert_eq!(items[0].data_source_config(), &DataSourceConfig::default());

        let (reloaded, _) = deserialize_items(&serialize_items(&items).unwrap()).unwrap();
        assert_eq!(reloaded, items);
    }

    #[test]
    fn test_overflowing_geometry_skipped() {
        let blob = r#"[{"x":4294967295,"y":0,"w":3,"h":2,"i":"a","data":{"typeId":"gauge"}}]"#;
        let (items, diagnostics) = deserialize_items(blob).unwrap();
        assert!(items.is_empty());
        assert!(matches!(
            diagnostics.into_vec().as_slice(),
            [Diagnostic::MalformedBoardItem { index: 0, .. }]
        ));
    }

    #[test]
    fn test_unknown_keys_preserved() {
        let blob = r#"[{"x":0,"y":0,"w":2,"h":2,"i":"a","static":true,
            "data":{"typeId":"text","theme":"dark"}}]"#;
        let (items, _) = deserialize_items(blob).unwrap();
        let encoded: Value = serde_json::from_str(&serialize_items(&items).unwrap()).unwrap();
        assert_eq!(encoded[0]["static"], json!(true));
        assert_eq!(encoded[0]["data"]["theme"], json!("dark"));
    }

    #[test]
    fn test_malformed_items_skipped() {
        let blob = r#"[
            {"x":0,"y":0,"w":2,"h":2,"i":"a","data":{"typeId":"text"}},
            42,
            {"x":"left","y":0,"w":2,"h":2,"i":"b","data":{"typeId":"text"}},
            {"x":0,"y":0,"w":0,"h":2,"i":"c","data":{"typeId":"text"}},
            {"hello":"world"}
        ]"#;
        let (items, diagnostics) = deserialize_items(blob).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(diagnostics.len(), 4);
        assert!(
            diagnostics
                .iter()
                .all(|d| matches!(d, Diagnostic::MalformedBoardItem { .. }))
        );
    }

    #[test]
    fn test_duplicate_instance_ids_skipped() {
        let blob = r#"[
            {"x":0,"y":0,"w":2,"h":2,"i":"a","data":{"typeId":"text"}},
            {"x":4,"y":0,"w":2,"h":2,"i":"a","data":{"typeId":"gauge"}}
        ]"#;
        let (items, diagnostics) = deserialize_items(blob).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].type_id(), "text");
        assert_eq!(
            diagnostics.into_vec(),
            vec![Diagnostic::DuplicateInstanceId {
                index: 1,
                instance_id: "a".into()
            }]
        );
    }

    #[test]
    fn test_legacy_shape_converted() {
        let blob = r#"[{"id":7,"type":"gauge","x":1.2,"y":3,"width":4,"height":2,
            "properties":{"unit":"C"},"locked":true}]"#;
        let (items, diagnostics) = deserialize_items(blob).unwrap();
        assert!(diagnostics.is_empty());
        let item = &items[0];
        assert_eq!(item.instance_id.as_str(), "7");
        assert_eq!(item.geometry(), GridRect::new(1, 3, 4, 2));
        assert_eq!(item.instance_config()["unit"], json!("C"));
        assert_eq!(item.extra["locked"], json!(true));
        assert!(!item.extra.contains_key("width"));
    }

    #[test]
    fn test_legacy_shape_missing_geometry_defaults() {
        let (items, _) = deserialize_items(r#"[{"id":"x","type":"text"}]"#).unwrap();
        assert_eq!(items[0].geometry(), GridRect::new(0, 0, 1, 1));
    }

    #[test]
    fn test_not_an_array() {
        assert!(matches!(
            deserialize_items(r#"{"items":[]}"#),
            Err(BoardError::Serialization(_))
        ));
        assert!(deserialize_items("not json").is_err());
        assert!(deserialize_items("  ").unwrap().0.is_empty());
    }

    fn arb_scalar() -> impl Strategy<Value = Value> {
        prop_oneof![
            any::<i32>().prop_map(|v| json!(v)),
            any::<bool>().prop_map(Value::Bool),
            "[a-zA-Z0-9 ]{0,8}".prop_map(Value::String),
        ]
    }

    fn arb_map() -> impl Strategy<Value = Map<String, Value>> {
        prop::collection::btree_map("[a-z]{1,5}", arb_scalar(), 0..3)
            .prop_map(|m| m.into_iter().collect())
    }

    /// Keys that never collide with the ones the item shape defines.
    fn arb_extra() -> impl Strategy<Value = Map<String, Value>> {
        prop::collection::btree_map("ext[A-Z][a-z]{0,4}", arb_scalar(), 0..3)
            .prop_map(|m| m.into_iter().collect())
    }

    fn arb_pointer() -> impl Strategy<Value = Option<String>> {
        prop::option::of("(/[a-z]{1,4}){1,2}")
    }

    fn arb_field_source() -> impl Strategy<Value = FieldSource> {
        let request = (
            "/[a-z]{1,8}",
            prop::sample::select(vec![Method::Get, Method::Post, Method::Put, Method::Delete]),
            prop::collection::btree_map("[a-z]{1,4}", arb_scalar(), 0..3),
            prop::option::of(arb_scalar()),
            arb_pointer(),
        )
            .prop_map(|(endpoint, method, params, body, select)| {
                FieldSource::Request(RequestDescriptor {
                    endpoint,
                    method,
                    params,
                    body,
                    select,
                })
            });
        let subscription = (
            "[a-z]{1,8}",
            prop::collection::btree_map("[a-z]{1,4}", arb_scalar(), 0..3),
            arb_pointer(),
        )
            .prop_map(|(channel, params, select)| {
                FieldSource::Subscription(SubscriptionDescriptor {
                    channel,
                    params,
                    select,
                })
            });
        prop_oneof![arb_scalar().prop_map(FieldSource::literal), request, subscription]
    }

    fn arb_time_range() -> impl Strategy<Value = TimeRange> {
        prop_oneof![
            "[1-9][0-9]?[mhd]".prop_map(|last| TimeRange::Relative { last }),
            (0i64..4_000_000_000, 0i64..1_000_000).prop_map(|(start, span)| {
                TimeRange::Absolute {
                    start: DateTime::from_timestamp(start, 0).unwrap(),
                    end: DateTime::from_timestamp(start + span, 0).unwrap(),
                }
            }),
        ]
    }

    fn arb_data_source() -> impl Strategy<Value = DataSourceConfig> {
        (
            prop::option::of("dev-[0-9]{1,3}"),
            prop::option::of(arb_time_range()),
            prop::option::of(("[1-9][mh]", prop::sample::select(vec!["avg", "max", "sum"]))),
            prop::option::of((prop::option::of(1u64..600_000), any::<bool>())),
            prop::collection::btree_map("[a-z]{1,6}", arb_field_source(), 0..4),
        )
            .prop_map(|(device, time_range, aggregation, refresh, field_mapping)| {
                DataSourceConfig {
                    origin: match device {
                        Some(device_id) => DataOrigin::Device { device_id },
                        None => DataOrigin::System,
                    },
                    time_range,
                    aggregation: aggregation.map(|(window, function)| Aggregation {
                        window,
                        function: function.to_string(),
                    }),
                    refresh: refresh.map(|(interval_ms, on_push)| RefreshPolicy {
                        interval_ms,
                        on_push,
                    }),
                    field_mapping,
                }
            })
    }

    fn arb_item() -> impl Strategy<Value = LayoutItem> {
        (
            (
                "[a-z0-9]{1,8}",
                prop::sample::select(vec!["gauge", "text", "line-chart"]),
                0u32..24,
                0u32..100,
                1u32..12,
                1u32..12,
            ),
            prop::option::of("[a-z]{1,6}"),
            arb_map(),
            arb_data_source(),
            arb_extra(),
            arb_extra(),
        )
            .prop_map(
                |((id, type_id, x, y, w, h), render_id, config, source, extra, data_extra)| {
                    let mut item =
                        LayoutItem::new(id.into(), type_id, GridRect::new(x, y, w, h));
                    item.data.render_id = render_id;
                    item.data.instance_config = config;
                    item.data.data_source_config = source;
                    item.data.extra = data_extra;
                    item.extra = extra;
                    item
                },
            )
    }

    proptest! {
        #[test]
        fn prop_round_trip(items in prop::collection::vec(arb_item(), 0..16)) {
            let mut seen = HashSet::new();
            let items: Vec<LayoutItem> = items
                .into_iter()
                .filter(|item| seen.insert(item.instance_id.clone()))
                .collect();

            let blob = serialize_items(&items).unwrap();
            let (decoded, diagnostics) = deserialize_items(&blob).unwrap();
            prop_assert!(diagnostics.is_empty());
            prop_assert_eq!(decoded, items);
        }
    }
}
