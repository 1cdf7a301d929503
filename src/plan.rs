//! Planning: turning configuration and prior state into a planned state.
//!
//! The host sends the prior state (absent on create) and the configuration.
//! [`plan_resource`] computes the planned state from the schema alone; each
//! resource may then adjust it in its `modify_plan` hook before the plan is
//! turned into a [`PlanResult`] with [`ResourcePlan::into_result`].
//!
//! Values that are only known after apply are represented by the [`UNKNOWN`]
//! sentinel string wherever they appear.

use std::collections::BTreeSet;

use serde_json::{Map, Value};

use crate::schema::{AttributeType, Block, BlockNestingMode, Diagnostic, Schema};
use crate::types::{AttributeChange, PlanResult};

/// Marker for a value that is only known after apply.
pub const UNKNOWN: &str = "74D93920-ED26-11E3-AC10-0800200C9A66";

/// An unknown value.
pub fn unknown() -> Value {
    Value::String(UNKNOWN.to_string())
}

/// True if `value` is the unknown marker.
pub fn is_unknown(value: &Value) -> bool {
    value.as_str() == Some(UNKNOWN)
}

/// True if `value` or anything nested in it is unknown.
pub fn contains_unknown(value: &Value) -> bool {
    match value {
        Value::Array(items) => items.iter().any(contains_unknown),
        Value::Object(map) => map.values().any(contains_unknown),
        other => is_unknown(other),
    }
}

/// Replace every unknown with null, recursively.
///
/// Planned state is passed through this before it is deserialized into a
/// typed model, so a model never sees the marker as a real value.
pub fn strip_unknowns(value: Value) -> Value {
    match value {
        Value::Array(items) => Value::Array(items.into_iter().map(strip_unknowns).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, strip_unknowns(v)))
                .collect(),
        ),
        other if is_unknown(&other) => Value::Null,
        other => other,
    }
}

/// Replace unknowns in `planned` with the value at the same place in `prior`.
///
/// Objects and lists are walked recursively. Object keys listed in
/// `keep_unknown` are left untouched at every level. An unknown whose prior
/// counterpart is missing becomes null.
pub fn copy_unknowns(planned: &mut Value, prior: &Value, keep_unknown: &[&str]) {
    if is_unknown(planned) {
        *planned = prior.clone();
        return;
    }
    match planned {
        Value::Object(map) => {
            for (key, value) in map.iter_mut() {
                if keep_unknown.contains(&key.as_str()) {
                    continue;
                }
                let prior_value = prior.get(key.as_str()).unwrap_or(&Value::Null);
                copy_unknowns(value, prior_value, keep_unknown);
            }
        }
        Value::Array(items) => {
            for (i, value) in items.iter_mut().enumerate() {
                let prior_value = prior.get(i).unwrap_or(&Value::Null);
                copy_unknowns(value, prior_value, keep_unknown);
            }
        }
        _ => {}
    }
}

/// A rule that adjusts the planned value of one attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanModifier {
    /// An unknown plan takes the prior value when there is one.
    UseStateForUnknown,
    /// An unknown plan becomes null unless the configuration itself is unknown.
    UseNullForUnknown,
    /// A change to a known value replaces the resource.
    RequiresReplace,
    /// Instance size bounds that are only tracked while compute autoscaling,
    /// the boolean sibling `enabled_by`, is on.
    AutoScalingInstanceSize {
        /// Sibling attribute holding the autoscaling switch.
        enabled_by: &'static str,
    },
}

/// Input to a [`PlanModifier`].
#[derive(Debug, Clone)]
pub struct ModifierRequest<'a> {
    /// Configured value, null when unset.
    pub config: &'a Value,
    /// Prior state value; `None` on create.
    pub prior: Option<&'a Value>,
    /// Value planned so far.
    pub planned: Value,
    /// The whole planned object, read-only.
    pub plan: &'a Map<String, Value>,
}

/// Result of a [`PlanModifier`].
#[derive(Debug, Clone, PartialEq)]
pub struct ModifierResponse {
    /// Planned value after the modifier ran.
    pub planned: Value,
    /// The change cannot be applied in place.
    pub requires_replace: bool,
}

impl PlanModifier {
    /// Modifiers that read sibling values run after all the others.
    fn reads_siblings(&self) -> bool {
        matches!(self, Self::AutoScalingInstanceSize { .. })
    }

    /// Apply the modifier.
    pub fn apply(&self, req: ModifierRequest<'_>) -> ModifierResponse {
        let mut planned = req.planned;
        let mut requires_replace = false;

        match self {
            Self::UseStateForUnknown => {
                if is_unknown(&planned) {
                    if let Some(prior) = req.prior.filter(|p| !p.is_null()) {
                        planned = prior.clone();
                    }
                }
            }
            Self::UseNullForUnknown => {
                if is_unknown(&planned) && !is_unknown(req.config) {
                    planned = Value::Null;
                }
            }
            Self::RequiresReplace => {
                if let Some(prior) = req.prior {
                    requires_replace = !is_unknown(&planned) && &planned != prior;
                }
            }
            Self::AutoScalingInstanceSize { enabled_by } => {
                if is_unknown(&planned) {
                    match req.plan.get(*enabled_by).and_then(Value::as_bool) {
                        Some(true) => {
                            planned = req.prior.cloned().unwrap_or(Value::Null);
                        }
                        Some(false) => planned = Value::Null,
                        None => {}
                    }
                }
            }
        }

        ModifierResponse {
            planned,
            requires_replace,
        }
    }
}

/// A plan in progress for one resource instance.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourcePlan {
    /// Prior state; `None` on create.
    pub prior: Option<Value>,
    /// Configuration as written by the user.
    pub config: Value,
    /// Planned state, an object.
    pub planned: Value,
    /// Attributes whose change forces replacement.
    pub replace_paths: Vec<String>,
    /// Diagnostics raised while planning.
    pub diagnostics: Vec<Diagnostic>,
}

impl ResourcePlan {
    /// True when there is no prior state.
    pub fn is_create(&self) -> bool {
        self.prior.is_none()
    }

    /// The planned value of a root attribute, null when absent.
    pub fn planned_attr(&self, name: &str) -> &Value {
        self.planned.get(name).unwrap_or(&Value::Null)
    }

    /// The prior value of a root attribute, null when absent or on create.
    pub fn prior_attr(&self, name: &str) -> &Value {
        self.prior
            .as_ref()
            .and_then(|p| p.get(name))
            .unwrap_or(&Value::Null)
    }

    /// Overwrite the planned value of a root attribute.
    pub fn set_planned(&mut self, name: &str, value: Value) {
        if let Some(map) = self.planned.as_object_mut() {
            map.insert(name.to_string(), value);
        }
    }

    /// Mark the resource for replacement because of `path`.
    pub fn require_replace(&mut self, path: impl Into<String>) {
        let path = path.into();
        if !self.replace_paths.contains(&path) {
            self.replace_paths.push(path);
        }
    }

    /// True if the resource must be replaced.
    pub fn requires_replace(&self) -> bool {
        !self.replace_paths.is_empty()
    }

    /// Finish the plan, computing the change list.
    pub fn into_result(self) -> PlanResult {
        let before = self.prior.unwrap_or(Value::Null);
        let changes = find_changes(&before, &self.planned);
        PlanResult {
            planned_state: self.planned,
            changes,
            requires_replace: !self.replace_paths.is_empty(),
            replace_paths: self.replace_paths,
            diagnostics: self.diagnostics,
        }
    }
}

/// The plan for destroying a resource: null state, every prior attribute removed.
pub fn plan_destroy(prior: &Value) -> PlanResult {
    PlanResult {
        planned_state: Value::Null,
        changes: find_changes(prior, &Value::Null),
        requires_replace: false,
        replace_paths: Vec::new(),
        diagnostics: Vec::new(),
    }
}

/// Plan a resource from its schema.
///
/// Configured values are planned as written, with defaults filling unset
/// attributes. Computed attributes left unset are unknown on create; on
/// update they keep their prior value unless some configured value changed,
/// in which case they become unknown. Elements of nested list and set blocks
/// inherit computed values from the prior element with the same configured
/// values.
///
/// Plan modifiers then run on the root attributes, and attributes marked
/// `force_new` that change request replacement.
pub fn plan_resource(schema: &Schema, prior: Option<&Value>, config: &Value) -> ResourcePlan {
    let empty = Map::new();
    let prior_obj = prior.and_then(Value::as_object);
    let config_obj = config.as_object().unwrap_or(&empty);

    let changed = configured_differs(&schema.block, prior_obj, config_obj);
    let mut planned = plan_block(&schema.block, prior_obj, config_obj, changed);
    let mut replace_paths = Vec::new();

    let mut names: Vec<&String> = schema.block.attributes.keys().collect();
    names.sort();

    for deferred in [false, true] {
        for name in &names {
            let attr = &schema.block.attributes[name.as_str()];
            for modifier in attr
                .plan_modifiers
                .iter()
                .filter(|m| m.reads_siblings() == deferred)
            {
                let response = modifier.apply(ModifierRequest {
                    config: config_obj.get(name.as_str()).unwrap_or(&Value::Null),
                    prior: prior_obj.map(|p| p.get(name.as_str()).unwrap_or(&Value::Null)),
                    planned: planned.get(name.as_str()).cloned().unwrap_or(Value::Null),
                    plan: &planned,
                });
                planned.insert(name.to_string(), response.planned);
                if response.requires_replace && !replace_paths.contains(*name) {
                    replace_paths.push(name.to_string());
                }
            }
        }
    }

    if let Some(prior) = prior_obj {
        for name in &names {
            let attr = &schema.block.attributes[name.as_str()];
            if !attr.force_new || replace_paths.contains(*name) {
                continue;
            }
            let after = planned.get(name.as_str()).unwrap_or(&Value::Null);
            let before = prior.get(name.as_str()).unwrap_or(&Value::Null);
            if !is_unknown(after) && after != before {
                replace_paths.push(name.to_string());
            }
        }
    }

    ResourcePlan {
        prior: prior.cloned(),
        config: config.clone(),
        planned: Value::Object(planned),
        replace_paths,
        diagnostics: Vec::new(),
    }
}

fn non_null<'a>(map: Option<&'a Map<String, Value>>, key: &str) -> Option<&'a Value> {
    map.and_then(|m| m.get(key)).filter(|v| !v.is_null())
}

fn plan_block(
    block: &Block,
    prior: Option<&Map<String, Value>>,
    config: &Map<String, Value>,
    changed: bool,
) -> Map<String, Value> {
    let mut planned = Map::new();

    for (name, attr) in &block.attributes {
        let configured = non_null(Some(config), name)
            .cloned()
            .or_else(|| attr.default.clone());
        let value = match configured {
            Some(v) => match prior.and_then(|p| p.get(name)) {
                Some(p) if same_value(&attr.attr_type, &v, p) => p.clone(),
                _ => v,
            },
            None if attr.flags.computed => match prior {
                Some(p) if !changed => p.get(name).cloned().unwrap_or(Value::Null),
                _ => unknown(),
            },
            None => Value::Null,
        };
        planned.insert(name.clone(), value);
    }

    for (name, nested) in &block.blocks {
        let configured = non_null(Some(config), name);
        let prior_value = non_null(prior, name);

        let value = match nested.nesting_mode {
            BlockNestingMode::Single => match configured {
                Some(v) if is_unknown(v) => v.clone(),
                Some(v) => match v.as_object() {
                    Some(c) => {
                        let p = prior_value.and_then(Value::as_object);
                        let changed = configured_differs(&nested.block, p, c);
                        Value::Object(plan_block(&nested.block, p, c, changed))
                    }
                    None => v.clone(),
                },
                None => Value::Null,
            },
            BlockNestingMode::List | BlockNestingMode::Set => {
                let items = configured.and_then(Value::as_array);
                let prior_items = prior_value
                    .and_then(Value::as_array)
                    .map(Vec::as_slice)
                    .unwrap_or(&[]);
                let mut used = vec![false; prior_items.len()];
                let mut planned_items: Vec<(usize, Value)> = Vec::new();

                for item in items.into_iter().flatten() {
                    let Some(c) = item.as_object() else {
                        planned_items.push((usize::MAX, item.clone()));
                        continue;
                    };
                    let mut matched = None;
                    for (i, candidate) in prior_items.iter().enumerate() {
                        let Some(p) = candidate.as_object() else {
                            continue;
                        };
                        if !used[i] && !configured_differs(&nested.block, Some(p), c) {
                            used[i] = true;
                            matched = Some((i, p));
                            break;
                        }
                    }
                    planned_items.push((
                        matched.map_or(usize::MAX, |(i, _)| i),
                        Value::Object(plan_block(&nested.block, matched.map(|(_, p)| p), c, false)),
                    ));
                }
                // set elements keep their prior order
                if nested.nesting_mode == BlockNestingMode::Set {
                    planned_items.sort_by_key(|(i, _)| *i);
                }
                match configured {
                    Some(v) if is_unknown(v) => v.clone(),
                    _ => Value::Array(planned_items.into_iter().map(|(_, v)| v).collect()),
                }
            }
            BlockNestingMode::Map => match configured {
                Some(v) if is_unknown(v) => v.clone(),
                _ => {
                    let mut planned_items = Map::new();
                    let prior_items = prior_value.and_then(Value::as_object);
                    for (key, item) in configured.and_then(Value::as_object).into_iter().flatten() {
                        let planned_item = match item.as_object() {
                            Some(c) => {
                                let p = non_null(prior_items, key).and_then(Value::as_object);
                                let changed = configured_differs(&nested.block, p, c);
                                Value::Object(plan_block(&nested.block, p, c, changed))
                            }
                            None => item.clone(),
                        };
                        planned_items.insert(key.clone(), planned_item);
                    }
                    Value::Object(planned_items)
                }
            },
        };
        planned.insert(name.clone(), value);
    }

    planned
}

/// True if any user-controlled value in `config` differs from `prior`.
fn configured_differs(
    block: &Block,
    prior: Option<&Map<String, Value>>,
    config: &Map<String, Value>,
) -> bool {
    let Some(prior) = prior else {
        return true;
    };

    for (name, attr) in &block.attributes {
        if attr.flags.computed && !attr.flags.optional && !attr.flags.required {
            continue;
        }
        let configured = non_null(Some(config), name)
            .cloned()
            .or_else(|| attr.default.clone());
        let before = non_null(Some(prior), name);
        match configured {
            Some(v) => {
                let same = before.is_some_and(|b| same_value(&attr.attr_type, &v, b));
                if is_unknown(&v) || !same {
                    return true;
                }
            }
            None => {
                if !attr.flags.computed && before.is_some() {
                    return true;
                }
            }
        }
    }

    for (name, nested) in &block.blocks {
        let configured = non_null(Some(config), name);
        let before = non_null(Some(prior), name);
        if configured.is_some_and(is_unknown) {
            return true;
        }
        let differs = match nested.nesting_mode {
            BlockNestingMode::Single => {
                match (
                    configured.and_then(Value::as_object),
                    before.and_then(Value::as_object),
                ) {
                    (None, None) => false,
                    (Some(c), Some(p)) => configured_differs(&nested.block, Some(p), c),
                    _ => true,
                }
            }
            BlockNestingMode::List => {
                let c = configured.and_then(Value::as_array).map(Vec::as_slice).unwrap_or(&[]);
                let p = before.and_then(Value::as_array).map(Vec::as_slice).unwrap_or(&[]);
                c.len() != p.len()
                    || c.iter().zip(p).any(|(c, p)| element_differs(&nested.block, p, c))
            }
            BlockNestingMode::Set => {
                let c = configured.and_then(Value::as_array).map(Vec::as_slice).unwrap_or(&[]);
                let p = before.and_then(Value::as_array).map(Vec::as_slice).unwrap_or(&[]);
                c.len() != p.len()
                    || c.iter()
                        .any(|c| p.iter().all(|p| element_differs(&nested.block, p, c)))
            }
            BlockNestingMode::Map => {
                let empty = Map::new();
                let c = configured.and_then(Value::as_object).unwrap_or(&empty);
                let p = before.and_then(Value::as_object).unwrap_or(&empty);
                c.len() != p.len()
                    || c.iter().any(|(key, c)| match p.get(key) {
                        Some(p) => element_differs(&nested.block, p, c),
                        None => true,
                    })
            }
        };
        if differs {
            return true;
        }
    }

    false
}

/// Equality that ignores element order for set-typed values.
fn same_value(attr_type: &AttributeType, a: &Value, b: &Value) -> bool {
    match (attr_type, a.as_array(), b.as_array()) {
        (AttributeType::Set(_), Some(a), Some(b)) => {
            a.len() == b.len() && a.iter().all(|x| b.contains(x)) && b.iter().all(|x| a.contains(x))
        }
        _ => a == b,
    }
}

fn element_differs(block: &Block, prior: &Value, config: &Value) -> bool {
    match (config.as_object(), prior.as_object()) {
        (Some(c), Some(p)) => configured_differs(block, Some(p), c),
        _ => config != prior,
    }
}

/// List the attribute paths that differ between `before` and `after`.
///
/// Paths are dotted. A differing object is reported itself and then each of
/// its differing attributes; a differing list is reported as a whole. Null
/// and absent values are the same.
pub fn find_changes(before: &Value, after: &Value) -> Vec<AttributeChange> {
    let mut changes = Vec::new();
    diff_objects("", before.as_object(), after.as_object(), &mut changes);
    changes
}

fn diff_objects(
    prefix: &str,
    before: Option<&Map<String, Value>>,
    after: Option<&Map<String, Value>>,
    changes: &mut Vec<AttributeChange>,
) {
    let keys: BTreeSet<&String> = before
        .into_iter()
        .flat_map(Map::keys)
        .chain(after.into_iter().flat_map(Map::keys))
        .collect();

    for key in keys {
        let b = non_null(before, key);
        let a = non_null(after, key);
        if b == a {
            continue;
        }
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };
        changes.push(AttributeChange::new(path.clone(), b.cloned(), a.cloned()));

        let b_obj = b.and_then(Value::as_object);
        let a_obj = a.and_then(Value::as_object);
        if (b_obj.is_some() || b.is_none()) && (a_obj.is_some() || a.is_none()) {
            diff_objects(&path, b_obj, a_obj, changes);
        }
    }
}
