//! Plain Rust values exchanged with the host, and their protobuf conversions.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::schema::Diagnostic;

/// One attribute that differs between prior state and the plan.
///
/// `before` is `None` when the attribute is being set for the first time and
/// `after` is `None` when it is being cleared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeChange {
    /// Dotted attribute path, e.g. `limits.0.value`.
    pub path: String,
    /// Value in prior state.
    pub before: Option<Value>,
    /// Value in the plan.
    pub after: Option<Value>,
}

impl AttributeChange {
    /// Create a change record.
    pub fn new(path: impl Into<String>, before: Option<Value>, after: Option<Value>) -> Self {
        Self {
            path: path.into(),
            before,
            after,
        }
    }
}

fn decode_optional(bytes: &[u8]) -> Option<Value> {
    if bytes.is_empty() {
        None
    } else {
        serde_json::from_slice(bytes).ok()
    }
}

fn encode_optional(value: Option<Value>) -> Vec<u8> {
    value
        .and_then(|v| serde_json::to_vec(&v).ok())
        .unwrap_or_default()
}

impl From<crate::generated::AttributeChange> for AttributeChange {
    fn from(proto: crate::generated::AttributeChange) -> Self {
        Self {
            path: proto.path,
            before: decode_optional(&proto.before),
            after: decode_optional(&proto.after),
        }
    }
}

impl From<AttributeChange> for crate::generated::AttributeChange {
    fn from(change: AttributeChange) -> Self {
        Self {
            path: change.path,
            before: encode_optional(change.before),
            after: encode_optional(change.after),
        }
    }
}

/// Outcome of planning one resource instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanResult {
    /// The state the resource will have after apply. Values that are only
    /// known after apply carry the [`crate::plan::UNKNOWN`] sentinel.
    pub planned_state: Value,
    /// Attribute level differences between prior state and the plan.
    pub changes: Vec<AttributeChange>,
    /// True when apply must destroy and recreate the resource.
    pub requires_replace: bool,
    /// Attribute paths responsible for `requires_replace`.
    #[serde(default)]
    pub replace_paths: Vec<String>,
    /// Warnings (or errors) raised while planning.
    #[serde(default)]
    pub diagnostics: Vec<Diagnostic>,
}

impl PlanResult {
    /// A plan that leaves the resource as it is.
    pub fn no_change(state: Value) -> Self {
        Self {
            planned_state: state,
            changes: Vec::new(),
            requires_replace: false,
            replace_paths: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    /// True when applying the plan does something.
    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty() || self.requires_replace
    }
}

/// A resource produced by `ImportResourceState`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportedResource {
    /// Type name of the imported resource.
    pub resource_type: String,
    /// State to be refreshed with `Read`.
    pub state: Value,
}

impl ImportedResource {
    /// Create an imported resource.
    pub fn new(resource_type: impl Into<String>, state: Value) -> Self {
        Self {
            resource_type: resource_type.into(),
            state,
        }
    }
}

/// Answer to `GetMetadata`: the type names this provider serves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ProviderMetadata {
    /// Resource type names.
    pub resources: Vec<String>,
    /// Data source type names.
    pub data_sources: Vec<String>,
    /// Protocol capabilities.
    pub capabilities: ServerCapabilities,
}

/// Optional protocol features the provider implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ServerCapabilities {
    /// The provider wants `Plan` calls for destroy operations too.
    pub plan_destroy: bool,
}

/// Protocol version printed in the handshake line.
pub const PROTOCOL_VERSION: u32 = 1;

/// First field of the handshake line printed on stdout.
pub const HANDSHAKE_PREFIX: &str = "HEMMER_PROVIDER";
