//! Configuration validation against a [`Schema`].
//!
//! Validation walks the configured value with the schema and reports every
//! problem it finds instead of stopping at the first one:
//!
//! - required attributes must be present and non-null
//! - computed-only attributes must not be configured
//! - values must match the declared type
//! - attributes declared as conflicting may not both be set
//! - attached [`Validator`](crate::validators::Validator)s run on string values
//! - nested blocks respect their item limits
//!
//! Values that are not known yet (see [`crate::plan::UNKNOWN`]) pass every
//! check; they are validated again once they are known.
//!
//! ```
//! use hemmer_provider_atlas::schema::{Attribute, Schema};
//! use hemmer_provider_atlas::validation::validate;
//! use hemmer_provider_atlas::validators::Validator;
//! use serde_json::json;
//!
//! let schema = Schema::v0()
//!     .with_attribute("project_id", Attribute::required_string())
//!     .with_attribute("cidr_block", Attribute::optional_string().with_validator(Validator::Cidr));
//!
//! assert!(validate(&schema, &json!({"project_id": "5f1", "cidr_block": "10.0.0.0/24"})).is_empty());
//!
//! let diagnostics = validate(&schema, &json!({"project_id": "5f1", "cidr_block": "10.0.0.1/24"}));
//! assert_eq!(diagnostics[0].attribute.as_deref(), Some("cidr_block"));
//! ```

use serde_json::{Map, Value};

use crate::plan::is_unknown;
use crate::schema::{Attribute, AttributeType, Block, BlockNestingMode, Diagnostic, NestedBlock, Schema};

/// Validate a configured value, returning every problem found.
pub fn validate(schema: &Schema, config: &Value) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    check_block(&schema.block, config, "", &mut diagnostics);
    diagnostics
}

/// Like [`validate`] but as a `Result`.
pub fn validate_result(schema: &Schema, config: &Value) -> Result<(), Vec<Diagnostic>> {
    let diagnostics = validate(schema, config);
    if diagnostics.is_empty() {
        Ok(())
    } else {
        Err(diagnostics)
    }
}

fn check_block(block: &Block, value: &Value, path: &str, diagnostics: &mut Vec<Diagnostic>) {
    if value.is_null() || is_unknown(value) {
        return;
    }
    let Some(obj) = value.as_object() else {
        let mut diag = Diagnostic::error("Expected object")
            .with_detail(format!("Got {}", type_name(value)));
        if !path.is_empty() {
            diag = diag.with_attribute(path);
        }
        diagnostics.push(diag);
        return;
    };

    let mut names: Vec<&String> = block.attributes.keys().collect();
    names.sort();
    for name in names {
        let attr = &block.attributes[name];
        let attr_path = join_path(path, name);
        check_attribute(attr, obj.get(name.as_str()), &attr_path, diagnostics);
        check_conflicts(name, attr, obj, path, diagnostics);
    }

    let mut block_names: Vec<&String> = block.blocks.keys().collect();
    block_names.sort();
    for name in block_names {
        let nested = &block.blocks[name];
        let block_path = join_path(path, name);
        check_nested(nested, obj.get(name.as_str()), &block_path, diagnostics);
    }
}

fn is_set(value: Option<&Value>) -> bool {
    matches!(value, Some(v) if !v.is_null())
}

fn check_attribute(
    attr: &Attribute,
    value: Option<&Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let computed_only = attr.flags.computed && !attr.flags.optional && !attr.flags.required;

    let value = match value {
        Some(v) if !v.is_null() => v,
        _ => {
            if attr.flags.required {
                diagnostics.push(
                    Diagnostic::error("Missing required argument")
                        .with_detail(format!("The argument \"{}\" is required, but no definition was found.", path))
                        .with_attribute(path),
                );
            }
            return;
        }
    };

    if computed_only {
        diagnostics.push(
            Diagnostic::error("Value for unconfigurable attribute")
                .with_detail(format!("Can't configure a value for \"{}\": its value will be decided automatically.", path))
                .with_attribute(path),
        );
        return;
    }

    if is_unknown(value) {
        return;
    }

    let before = diagnostics.len();
    check_type(&attr.attr_type, value, path, diagnostics);
    if diagnostics.len() > before {
        return;
    }

    if let Some(s) = value.as_str() {
        diagnostics.extend(attr.validators.iter().filter_map(|v| v.check(path, s)));
    }
}

fn check_conflicts(
    name: &str,
    attr: &Attribute,
    obj: &Map<String, Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    if !is_set(obj.get(name)) {
        return;
    }
    for other in &attr.conflicts_with {
        if is_set(obj.get(other.as_str())) {
            diagnostics.push(
                Diagnostic::error("Conflicting configuration arguments")
                    .with_detail(format!(
                        "\"{}\": conflicts with {}",
                        join_path(path, name),
                        join_path(path, other)
                    ))
                    .with_attribute(join_path(path, name)),
            );
        }
    }
}

fn check_type(expected: &AttributeType, value: &Value, path: &str, diagnostics: &mut Vec<Diagnostic>) {
    if is_unknown(value) && !matches!(expected, AttributeType::String) {
        return;
    }
    let ok = match expected {
        AttributeType::String => value.is_string(),
        AttributeType::Int64 => is_int64(value),
        AttributeType::Float64 => value.is_number(),
        AttributeType::Bool => value.is_boolean(),
        AttributeType::Dynamic => true,
        AttributeType::List(elem) | AttributeType::Set(elem) => match value.as_array() {
            Some(items) => {
                for (i, item) in items.iter().enumerate() {
                    check_type(elem, item, &format!("{}.{}", path, i), diagnostics);
                }
                true
            }
            None => false,
        },
        AttributeType::Map(elem) => match value.as_object() {
            Some(entries) => {
                for (key, item) in entries {
                    check_type(elem, item, &format!("{}.{}", path, key), diagnostics);
                }
                true
            }
            None => false,
        },
        AttributeType::Object(fields) => match value.as_object() {
            Some(entries) => {
                for (key, field_type) in fields {
                    if let Some(item) = entries.get(key) {
                        if !item.is_null() {
                            check_type(field_type, item, &join_path(path, key), diagnostics);
                        }
                    }
                }
                true
            }
            None => false,
        },
    };

    if !ok {
        diagnostics.push(
            Diagnostic::error("Incorrect attribute value type")
                .with_detail(format!(
                    "Inappropriate value for attribute \"{}\": {} required, got {}.",
                    path,
                    expected_name(expected),
                    type_name(value)
                ))
                .with_attribute(path),
        );
    }
}

fn check_nested(nested: &NestedBlock, value: Option<&Value>, path: &str, diagnostics: &mut Vec<Diagnostic>) {
    let value = match value {
        Some(v) if !v.is_null() => v,
        _ => {
            if nested.min_items > 0 {
                diagnostics.push(item_count_error(path, nested, 0));
            }
            return;
        }
    };
    if is_unknown(value) {
        return;
    }

    match nested.nesting_mode {
        BlockNestingMode::Single => check_block(&nested.block, value, path, diagnostics),
        BlockNestingMode::List | BlockNestingMode::Set => match value.as_array() {
            Some(items) => {
                let count = items.len() as u32;
                if count < nested.min_items || (nested.max_items > 0 && count > nested.max_items) {
                    diagnostics.push(item_count_error(path, nested, count));
                }
                for (i, item) in items.iter().enumerate() {
                    check_block(&nested.block, item, &format!("{}.{}", path, i), diagnostics);
                }
            }
            None => diagnostics.push(block_shape_error(path, "list", value)),
        },
        BlockNestingMode::Map => match value.as_object() {
            Some(items) => {
                let count = items.len() as u32;
                if count < nested.min_items || (nested.max_items > 0 && count > nested.max_items) {
                    diagnostics.push(item_count_error(path, nested, count));
                }
                for (key, item) in items {
                    check_block(&nested.block, item, &format!("{}.{}", path, key), diagnostics);
                }
            }
            None => diagnostics.push(block_shape_error(path, "map", value)),
        },
    }
}

fn item_count_error(path: &str, nested: &NestedBlock, count: u32) -> Diagnostic {
    let summary = if count < nested.min_items {
        "Insufficient blocks"
    } else {
        "Too many blocks"
    };
    let limit = if nested.max_items > 0 {
        format!("between {} and {}", nested.min_items, nested.max_items)
    } else {
        format!("at least {}", nested.min_items)
    };
    Diagnostic::error(summary)
        .with_detail(format!("Block \"{}\" requires {} item(s), got {}.", path, limit, count))
        .with_attribute(path)
}

fn block_shape_error(path: &str, expected: &str, got: &Value) -> Diagnostic {
    Diagnostic::error("Unsupported block type")
        .with_detail(format!("Block \"{}\" must be a {}, got {}.", path, expected, type_name(got)))
        .with_attribute(path)
}

fn join_path(base: &str, name: &str) -> String {
    if base.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", base, name)
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

fn expected_name(expected: &AttributeType) -> &'static str {
    match expected {
        AttributeType::String => "string",
        AttributeType::Int64 => "whole number",
        AttributeType::Float64 => "number",
        AttributeType::Bool => "bool",
        AttributeType::List(_) => "list",
        AttributeType::Set(_) => "set",
        AttributeType::Map(_) => "map",
        AttributeType::Object(_) => "object",
        AttributeType::Dynamic => "any value",
    }
}

fn is_int64(value: &Value) -> bool {
    match value {
        Value::Number(n) if n.is_i64() || n.is_u64() => n.as_i64().is_some(),
        Value::Number(n) => n
            .as_f64()
            .is_some_and(|f| f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::UNKNOWN;
    use crate::schema::AttributeFlags;
    use crate::validators::Validator;
    use serde_json::json;
    use std::collections::HashMap;
    use std::time::Duration;

    fn access_list_schema() -> Schema {
        Schema::v0()
            .with_attribute("project_id", Attribute::required_string())
            .with_attribute(
                "cidr_block",
                Attribute::optional_computed_string()
                    .with_validator(Validator::Cidr)
                    .conflicts_with("ip_address"),
            )
            .with_attribute(
                "ip_address",
                Attribute::optional_computed_string()
                    .with_validator(Validator::Ip)
                    .conflicts_with("cidr_block"),
            )
            .with_attribute("id", Attribute::computed_string())
    }

    #[test]
    fn test_required_attribute() {
        let schema = access_list_schema();

        assert!(validate(&schema, &json!({"project_id": "5f1"})).is_empty());

        let diagnostics = validate(&schema, &json!({}));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].summary, "Missing required argument");
        assert_eq!(diagnostics[0].attribute.as_deref(), Some("project_id"));

        assert_eq!(validate(&schema, &json!({"project_id": null})).len(), 1);
    }

    #[test]
    fn test_computed_only_is_not_configurable() {
        let schema = access_list_schema();
        let diagnostics = validate(&schema, &json!({"project_id": "5f1", "id": "x"}));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].summary, "Value for unconfigurable attribute");
    }

    #[test]
    fn test_validators_run_on_strings() {
        let schema = access_list_schema();

        let diagnostics = validate(
            &schema,
            &json!({"project_id": "5f1", "cidr_block": "10.0.0.1/24"}),
        );
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute.as_deref(), Some("cidr_block"));

        let diagnostics = validate(&schema, &json!({"project_id": "5f1", "ip_address": "300.1.1.1"}));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute.as_deref(), Some("ip_address"));
    }

    #[test]
    fn test_unknown_values_pass() {
        let schema = access_list_schema();
        let diagnostics = validate(
            &schema,
            &json!({"project_id": UNKNOWN, "cidr_block": UNKNOWN}),
        );
        assert!(diagnostics.is_empty());

        let schema = Schema::v0().with_attribute("disk_size_gb", Attribute::optional_computed_float64());
        assert!(validate(&schema, &json!({"disk_size_gb": UNKNOWN})).is_empty());
    }

    #[test]
    fn test_conflicting_attributes() {
        let schema = access_list_schema();
        let diagnostics = validate(
            &schema,
            &json!({"project_id": "5f1", "cidr_block": "10.0.0.0/24", "ip_address": "10.0.0.1"}),
        );
        assert_eq!(diagnostics.len(), 2);
        assert!(diagnostics
            .iter()
            .all(|d| d.summary == "Conflicting configuration arguments"));

        // null does not count as set
        assert!(validate(
            &schema,
            &json!({"project_id": "5f1", "cidr_block": "10.0.0.0/24", "ip_address": null}),
        )
        .is_empty());
    }

    #[test]
    fn test_type_mismatch_skips_validators() {
        let schema = access_list_schema();
        let diagnostics = validate(&schema, &json!({"project_id": "5f1", "cidr_block": 10}));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].summary, "Incorrect attribute value type");
    }

    #[test]
    fn test_duration_validator() {
        let schema = Schema::v0().with_attribute(
            "delete_on_create_timeout",
            Attribute::optional_string().with_validator(Validator::DurationBetween {
                min: Duration::from_secs(15 * 60),
                max: Duration::from_secs(12 * 3600),
            }),
        );
        assert!(validate(&schema, &json!({"delete_on_create_timeout": "15m"})).is_empty());
        assert_eq!(validate(&schema, &json!({"delete_on_create_timeout": "1m"})).len(), 1);
    }

    #[test]
    fn test_int64_and_collections() {
        let schema = Schema::v0()
            .with_attribute("num_shards", Attribute::optional_int64())
            .with_attribute("tags", Attribute::optional_string_list())
            .with_attribute(
                "labels",
                Attribute::new(AttributeType::map(AttributeType::String), AttributeFlags::optional()),
            );

        assert!(validate(&schema, &json!({"num_shards": 2, "tags": ["a"], "labels": {"k": "v"}})).is_empty());
        assert!(validate(&schema, &json!({"num_shards": 2.0})).is_empty());
        assert_eq!(validate(&schema, &json!({"num_shards": 2.5})).len(), 1);

        let diagnostics = validate(&schema, &json!({"tags": ["a", 1]}));
        assert_eq!(diagnostics[0].attribute.as_deref(), Some("tags.1"));

        let diagnostics = validate(&schema, &json!({"labels": {"k": true}}));
        assert_eq!(diagnostics[0].attribute.as_deref(), Some("labels.k"));
    }

    #[test]
    fn test_object_type() {
        let mut fields = HashMap::new();
        fields.insert("enabled".to_string(), AttributeType::Bool);
        let schema = Schema::v0().with_attribute(
            "bi_connector",
            Attribute::new(AttributeType::Object(fields), AttributeFlags::optional()),
        );
        assert!(validate(&schema, &json!({"bi_connector": {"enabled": true}})).is_empty());
        let diagnostics = validate(&schema, &json!({"bi_connector": {"enabled": "yes"}}));
        assert_eq!(diagnostics[0].attribute.as_deref(), Some("bi_connector.enabled"));
    }

    #[test]
    fn test_nested_block_limits() {
        let schema = Schema::v0().with_block(
            "replication_specs",
            NestedBlock::list(
                Block::new()
                    .with_attribute("num_shards", Attribute::optional_int64())
                    .with_attribute("zone_name", Attribute::optional_string()),
            )
            .with_min_items(1)
            .with_max_items(2),
        );

        assert!(validate(&schema, &json!({"replication_specs": [{"num_shards": 1}]})).is_empty());

        let diagnostics = validate(&schema, &json!({"replication_specs": []}));
        assert_eq!(diagnostics[0].summary, "Insufficient blocks");

        let diagnostics = validate(&schema, &json!({}));
        assert_eq!(diagnostics[0].summary, "Insufficient blocks");

        let diagnostics = validate(&schema, &json!({"replication_specs": [{}, {}, {}]}));
        assert_eq!(diagnostics[0].summary, "Too many blocks");

        let diagnostics = validate(&schema, &json!({"replication_specs": [{"num_shards": "one"}]}));
        assert_eq!(
            diagnostics[0].attribute.as_deref(),
            Some("replication_specs.0.num_shards")
        );

        let diagnostics = validate(&schema, &json!({"replication_specs": {"num_shards": 1}}));
        assert_eq!(diagnostics[0].summary, "Unsupported block type");
    }

    #[test]
    fn test_single_block_and_root_shape() {
        let schema = Schema::v0().with_block(
            "assume_role",
            NestedBlock::single(Block::new().with_attribute("role_arn", Attribute::required_string())),
        );
        assert!(validate(&schema, &json!({})).is_empty());
        let diagnostics = validate(&schema, &json!({"assume_role": {}}));
        assert_eq!(diagnostics[0].attribute.as_deref(), Some("assume_role.role_arn"));

        let diagnostics = validate(&schema, &json!("not an object"));
        assert_eq!(diagnostics[0].summary, "Expected object");
        assert!(diagnostics[0].attribute.is_none());
    }

    #[test]
    fn test_validate_result() {
        let schema = access_list_schema();
        assert!(validate_result(&schema, &json!({"project_id": "5f1"})).is_ok());
        assert_eq!(validate_result(&schema, &json!({})).unwrap_err().len(), 1);
    }
}
