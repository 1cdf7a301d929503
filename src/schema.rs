//! Schema types for the provider block, resources and data sources.
//!
//! A schema carries both the wire description sent to the host (types and
//! flags) and the provider-side behavior attached to attributes: validators,
//! plan modifiers and conflicts. The latter never leave the process.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::plan::PlanModifier;
use crate::validators::Validator;

/// Value type of an attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeType {
    /// UTF-8 string.
    String,
    /// Signed 64-bit integer.
    Int64,
    /// Double precision number.
    Float64,
    /// `true` or `false`.
    Bool,
    /// Ordered elements.
    List(Box<AttributeType>),
    /// Unordered unique elements.
    Set(Box<AttributeType>),
    /// String-keyed elements.
    Map(Box<AttributeType>),
    /// Fixed field names, each with its own type.
    Object(HashMap<String, AttributeType>),
    /// Accepts any JSON value.
    Dynamic,
}

impl AttributeType {
    /// `List(element)`.
    pub fn list(element: AttributeType) -> Self {
        Self::List(Box::new(element))
    }

    /// `Set(element)`.
    pub fn set(element: AttributeType) -> Self {
        Self::Set(Box::new(element))
    }

    /// `Map(element)`.
    pub fn map(element: AttributeType) -> Self {
        Self::Map(Box::new(element))
    }

    /// `Object(fields)`.
    pub fn object(fields: HashMap<String, AttributeType>) -> Self {
        Self::Object(fields)
    }
}

/// Who sets an attribute and whether the host should mask it.
///
/// `optional` together with `computed` means the user may set the value and
/// Atlas fills it in otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AttributeFlags {
    /// Must be configured.
    pub required: bool,
    /// May be configured.
    pub optional: bool,
    /// Set by the provider.
    pub computed: bool,
    /// Masked in host output.
    pub sensitive: bool,
}

impl AttributeFlags {
    /// Only `required`.
    pub fn required() -> Self {
        Self { required: true, ..Self::default() }
    }

    /// Only `optional`.
    pub fn optional() -> Self {
        Self { optional: true, ..Self::default() }
    }

    /// Only `computed`.
    pub fn computed() -> Self {
        Self { computed: true, ..Self::default() }
    }

    /// `optional` and `computed`.
    pub fn optional_computed() -> Self {
        Self { optional: true, computed: true, ..Self::default() }
    }
}

/// One attribute of a block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    /// Value type.
    #[serde(rename = "type")]
    pub attr_type: AttributeType,
    /// Usage flags, flattened into the attribute on the wire.
    #[serde(flatten)]
    pub flags: AttributeFlags,
    /// Shown by the host in docs and errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// A change to this attribute replaces the Atlas object.
    #[serde(default)]
    pub force_new: bool,
    /// Value planned when the attribute is not configured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
    /// Checks for configured values.
    #[serde(skip)]
    pub validators: Vec<Validator>,
    /// Run in order while planning.
    #[serde(skip)]
    pub plan_modifiers: Vec<PlanModifier>,
    /// Sibling attributes that must not be configured alongside this one.
    #[serde(skip)]
    pub conflicts_with: Vec<String>,
}

macro_rules! shorthand {
    ($($(#[$doc:meta])* $name:ident => $ty:expr, $flags:ident;)*) => {
        $(
            $(#[$doc])*
            pub fn $name() -> Self {
                Self::new($ty, AttributeFlags::$flags())
            }
        )*
    };
}

impl Attribute {
    /// An attribute with no description, default or behavior.
    pub fn new(attr_type: AttributeType, flags: AttributeFlags) -> Self {
        Self {
            attr_type,
            flags,
            description: None,
            force_new: false,
            default: None,
            validators: Vec::new(),
            plan_modifiers: Vec::new(),
            conflicts_with: Vec::new(),
        }
    }

    shorthand! {
        /// Required string.
        required_string => AttributeType::String, required;
        /// Optional string.
        optional_string => AttributeType::String, optional;
        /// Computed string.
        computed_string => AttributeType::String, computed;
        /// Optional string that Atlas fills in when unset.
        optional_computed_string => AttributeType::String, optional_computed;
        /// Optional list of strings.
        optional_string_list => AttributeType::list(AttributeType::String), optional;
        /// Optional set of strings that Atlas fills in when unset.
        optional_computed_string_set => AttributeType::set(AttributeType::String), optional_computed;
        /// Required integer.
        required_int64 => AttributeType::Int64, required;
        /// Optional integer.
        optional_int64 => AttributeType::Int64, optional;
        /// Computed integer.
        computed_int64 => AttributeType::Int64, computed;
        /// Optional integer that Atlas fills in when unset.
        optional_computed_int64 => AttributeType::Int64, optional_computed;
        /// Optional number that Atlas fills in when unset.
        optional_computed_float64 => AttributeType::Float64, optional_computed;
        /// Optional bool.
        optional_bool => AttributeType::Bool, optional;
        /// Computed bool.
        computed_bool => AttributeType::Bool, computed;
        /// Optional bool that Atlas fills in when unset.
        optional_computed_bool => AttributeType::Bool, optional_computed;
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Replace the object when this attribute changes.
    pub fn with_force_new(mut self) -> Self {
        self.force_new = true;
        self
    }

    /// Plan `default` when the attribute is not configured.
    pub fn with_default(mut self, default: serde_json::Value) -> Self {
        self.default = Some(default);
        self
    }

    /// Mask the value in host output.
    pub fn sensitive(mut self) -> Self {
        self.flags.sensitive = true;
        self
    }

    /// Add a check for configured values.
    pub fn with_validator(mut self, validator: Validator) -> Self {
        self.validators.push(validator);
        self
    }

    /// Append a plan modifier. [`PlanModifier::RequiresReplace`] also sets
    /// `force_new` so the host sees it.
    pub fn with_plan_modifier(mut self, modifier: PlanModifier) -> Self {
        self.force_new |= modifier == PlanModifier::RequiresReplace;
        self.plan_modifiers.push(modifier);
        self
    }

    /// Reject configurations that set both this attribute and `other`.
    pub fn conflicts_with(mut self, other: impl Into<String>) -> Self {
        self.conflicts_with.push(other.into());
        self
    }
}

/// How instances of a nested block are grouped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BlockNestingMode {
    /// At most one instance, held as an object.
    #[default]
    Single,
    /// Ordered instances.
    List,
    /// Unordered instances, compared as a whole.
    Set,
    /// Instances keyed by label.
    Map,
}

/// Attributes and nested blocks at one level of a schema, for example a
/// single `replication_specs` entry of a cluster.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Attributes by name.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub attributes: HashMap<String, Attribute>,
    /// Nested blocks by name.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub blocks: HashMap<String, NestedBlock>,
    /// Shown by the host in docs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Block {
    /// An empty block.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `attr` under `name`.
    pub fn with_attribute(mut self, name: impl Into<String>, attr: Attribute) -> Self {
        self.attributes.insert(name.into(), attr);
        self
    }

    /// Add a nested block under `name`.
    pub fn with_block(mut self, name: impl Into<String>, block: NestedBlock) -> Self {
        self.blocks.insert(name.into(), block);
        self
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// A [`Block`] placed inside another, with its grouping and count bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NestedBlock {
    /// Contents of each instance.
    #[serde(flatten)]
    pub block: Block,
    /// Grouping of the instances.
    #[serde(default)]
    pub nesting_mode: BlockNestingMode,
    /// Fewest instances accepted.
    #[serde(default)]
    pub min_items: u32,
    /// Most instances accepted, 0 for no limit.
    #[serde(default)]
    pub max_items: u32,
}

impl NestedBlock {
    fn grouped(block: Block, nesting_mode: BlockNestingMode) -> Self {
        Self { block, nesting_mode, min_items: 0, max_items: 0 }
    }

    /// Zero or one instance.
    pub fn single(block: Block) -> Self {
        Self::grouped(block, BlockNestingMode::Single).with_max_items(1)
    }

    /// Any number of ordered instances.
    pub fn list(block: Block) -> Self {
        Self::grouped(block, BlockNestingMode::List)
    }

    /// Any number of unordered instances.
    pub fn set(block: Block) -> Self {
        Self::grouped(block, BlockNestingMode::Set)
    }

    /// Require at least `min` instances.
    pub fn with_min_items(mut self, min: u32) -> Self {
        self.min_items = min;
        self
    }

    /// Accept at most `max` instances.
    pub fn with_max_items(mut self, max: u32) -> Self {
        self.max_items = max;
        self
    }
}

/// Top-level schema of a resource, data source or the provider block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    /// Bumped when the state layout changes.
    #[serde(default)]
    pub version: u64,
    /// Root attributes and blocks.
    #[serde(flatten)]
    pub block: Block,
}

impl Schema {
    /// An empty schema at `version`.
    pub fn new(version: u64) -> Self {
        Self { version, block: Block::new() }
    }

    /// An empty schema at version 0.
    pub fn v0() -> Self {
        Self::new(0)
    }

    /// Add `attr` under `name` at the root.
    pub fn with_attribute(mut self, name: impl Into<String>, attr: Attribute) -> Self {
        self.block = self.block.with_attribute(name, attr);
        self
    }

    /// Add a nested block under `name` at the root.
    pub fn with_block(mut self, name: impl Into<String>, block: NestedBlock) -> Self {
        self.block = self.block.with_block(name, block);
        self
    }
}

/// Every schema the provider serves, keyed by type name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ProviderSchema {
    /// The provider block.
    #[serde(default)]
    pub provider: Schema,
    /// Resource schemas.
    #[serde(default)]
    pub resources: HashMap<String, Schema>,
    /// Data source schemas.
    #[serde(default)]
    pub data_sources: HashMap<String, Schema>,
}

impl ProviderSchema {
    /// No provider attributes, resources or data sources.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the provider block schema.
    pub fn with_provider_config(mut self, schema: Schema) -> Self {
        self.provider = schema;
        self
    }

    /// Register a resource type.
    pub fn with_resource(mut self, name: impl Into<String>, schema: Schema) -> Self {
        self.resources.insert(name.into(), schema);
        self
    }

    /// Register a data source type.
    pub fn with_data_source(mut self, name: impl Into<String>, schema: Schema) -> Self {
        self.data_sources.insert(name.into(), schema);
        self
    }
}

/// Whether a diagnostic fails the operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticSeverity {
    /// The operation failed.
    Error,
    /// The operation went ahead.
    Warning,
}

/// A problem reported to the host alongside a response.
///
/// Provider failures never surface as gRPC status codes; they become
/// diagnostics instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Error or warning.
    pub severity: DiagnosticSeverity,
    /// One-line summary.
    pub summary: String,
    /// Longer explanation, often the Atlas error text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Dotted path of the offending attribute.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
}

impl Diagnostic {
    fn with_severity(severity: DiagnosticSeverity, summary: String) -> Self {
        Self { severity, summary, detail: None, attribute: None }
    }

    /// An error with `summary`.
    pub fn error(summary: impl Into<String>) -> Self {
        Self::with_severity(DiagnosticSeverity::Error, summary.into())
    }

    /// A warning with `summary`.
    pub fn warning(summary: impl Into<String>) -> Self {
        Self::with_severity(DiagnosticSeverity::Warning, summary.into())
    }

    /// True for error severity.
    pub fn is_error(&self) -> bool {
        self.severity == DiagnosticSeverity::Error
    }

    /// Set the detail text.
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Point at an attribute path.
    pub fn with_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = Some(attribute.into());
        self
    }
}

/// True if any diagnostic is an error.
pub fn has_errors(diagnostics: &[Diagnostic]) -> bool {
    diagnostics.iter().any(Diagnostic::is_error)
}

impl From<Diagnostic> for crate::generated::Diagnostic {
    fn from(diag: Diagnostic) -> Self {
        use crate::generated::diagnostic::Severity;

        let severity = match diag.severity {
            DiagnosticSeverity::Error => Severity::Error,
            DiagnosticSeverity::Warning => Severity::Warning,
        };
        Self {
            severity: severity.into(),
            summary: diag.summary,
            detail: diag.detail.unwrap_or_default(),
            attribute: diag.attribute.unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_shorthand_flags() {
        let id = Attribute::computed_string();
        assert_eq!(id.attr_type, AttributeType::String);
        assert!(id.flags.computed && !id.flags.optional && !id.flags.required);

        let disk = Attribute::optional_computed_float64();
        assert_eq!(disk.attr_type, AttributeType::Float64);
        assert!(disk.flags.optional && disk.flags.computed);

        let regions = Attribute::optional_computed_string_set();
        assert_eq!(regions.attr_type, AttributeType::set(AttributeType::String));
    }

    #[test]
    fn test_attribute_builders() {
        let attr = Attribute::required_string()
            .with_description("Name of the project")
            .with_force_new();

        assert!(attr.flags.required);
        assert_eq!(attr.description.as_deref(), Some("Name of the project"));
        assert!(attr.force_new);
    }

    #[test]
    fn test_attribute_behavior_builders() {
        let attr = Attribute::optional_string()
            .with_validator(Validator::Cidr)
            .with_plan_modifier(PlanModifier::RequiresReplace)
            .conflicts_with("ip_address");

        assert_eq!(attr.validators, vec![Validator::Cidr]);
        assert_eq!(attr.plan_modifiers, vec![PlanModifier::RequiresReplace]);
        assert_eq!(attr.conflicts_with, vec!["ip_address".to_string()]);
        assert!(attr.force_new);

        let attr = Attribute::optional_computed_string()
            .with_plan_modifier(PlanModifier::UseStateForUnknown);
        assert!(!attr.force_new);
    }

    #[test]
    fn test_wire_form() {
        let attr = Attribute::optional_string()
            .sensitive()
            .with_validator(Validator::Ip)
            .conflicts_with("cidr_block");
        let json = serde_json::to_value(&attr).unwrap();
        assert_eq!(json["type"], "string");
        assert_eq!(json["optional"], true);
        assert_eq!(json["sensitive"], true);
        assert!(json.get("validators").is_none());
        assert!(json.get("conflicts_with").is_none());
        assert!(json.get("description").is_none());
    }

    #[test]
    fn test_cluster_style_schema() {
        let schema = Schema::v0()
            .with_attribute("name", Attribute::required_string().with_force_new())
            .with_attribute("cluster_id", Attribute::computed_string())
            .with_block(
                "replication_specs",
                NestedBlock::list(
                    Block::new()
                        .with_attribute("num_shards", Attribute::optional_computed_int64())
                        .with_attribute("zone_name", Attribute::optional_computed_string()),
                )
                .with_min_items(1),
            );

        let specs = &schema.block.blocks["replication_specs"];
        assert_eq!(specs.nesting_mode, BlockNestingMode::List);
        assert_eq!(specs.min_items, 1);
        assert_eq!(specs.max_items, 0);
        assert_eq!(specs.block.attributes.len(), 2);

        let json = serde_json::to_value(&schema).unwrap();
        assert_eq!(json["version"], 0);
        assert_eq!(json["attributes"]["name"]["force_new"], true);
        assert_eq!(json["blocks"]["replication_specs"]["nesting_mode"], "list");
    }

    #[test]
    fn test_single_block_allows_one() {
        let role = NestedBlock::single(Block::new().with_attribute("role_arn", Attribute::optional_string()));
        assert_eq!(role.nesting_mode, BlockNestingMode::Single);
        assert_eq!((role.min_items, role.max_items), (0, 1));
        assert_eq!(NestedBlock::set(Block::new()).nesting_mode, BlockNestingMode::Set);
    }

    #[test]
    fn test_provider_schema_registry() {
        let schemas = ProviderSchema::new()
            .with_provider_config(Schema::v0().with_attribute("private_key", Attribute::optional_string().sensitive()))
            .with_resource("mongodbatlas_project", Schema::new(1))
            .with_data_source("mongodbatlas_project", Schema::v0());

        assert!(schemas.provider.block.attributes["private_key"].flags.sensitive);
        assert_eq!(schemas.resources["mongodbatlas_project"].version, 1);
        assert!(schemas.data_sources.contains_key("mongodbatlas_project"));
    }

    #[test]
    fn test_default_survives_serialization() {
        let attr = Attribute::optional_bool().with_default(json!(true));
        let json = serde_json::to_value(&attr).unwrap();
        assert_eq!(json["default"], true);
    }

    #[test]
    fn test_diagnostic() {
        let err = Diagnostic::error("Invalid Attribute Value")
            .with_detail("must be a valid CIDR block")
            .with_attribute("cidr_block");

        assert!(err.is_error());
        assert_eq!(err.detail.as_deref(), Some("must be a valid CIDR block"));
        assert_eq!(err.attribute.as_deref(), Some("cidr_block"));
        assert!(!Diagnostic::warning("deprecated").is_error());
    }

    #[test]
    fn test_has_errors() {
        let warn = Diagnostic::warning("deprecated");
        assert!(!has_errors(&[warn.clone()]));
        assert!(has_errors(&[warn, Diagnostic::error("boom")]));
        assert!(!has_errors(&[]));
    }

    #[test]
    fn test_diagnostic_to_proto() {
        let proto: crate::generated::Diagnostic = Diagnostic::warning("careful")
            .with_attribute("name")
            .into();
        assert_eq!(
            proto.severity,
            i32::from(crate::generated::diagnostic::Severity::Warning)
        );
        assert_eq!(proto.attribute, "name");
        assert_eq!(proto.detail, "");
    }
}
