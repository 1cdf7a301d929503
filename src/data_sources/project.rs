//! `mongodbatlas_project` data source: look a project up by id or by name.

use std::collections::HashMap;

use serde_json::Value;

use super::{set_attr, DataSource};
use crate::error::ProviderError;
use crate::resources::project::{fetch, Group, ProjectState, SETTINGS, TYPE_NAME};
use crate::resources::{known, segment, to_state, with_context, Session};
use crate::schema::{Attribute, AttributeFlags, AttributeType, Diagnostic, Schema};

/// The project data source.
pub struct ProjectDataSource;

fn object_list(fields: &[(&str, AttributeType)]) -> Attribute {
    let fields: HashMap<String, AttributeType> = fields
        .iter()
        .map(|(name, t)| (name.to_string(), t.clone()))
        .collect();
    Attribute::new(
        AttributeType::list(AttributeType::object(fields)),
        AttributeFlags::computed(),
    )
}

fn schema() -> Schema {
    let mut schema = Schema::v0()
        .with_attribute("id", Attribute::computed_string())
        .with_attribute(
            "project_id",
            Attribute::optional_computed_string().conflicts_with("name"),
        )
        .with_attribute(
            "name",
            Attribute::optional_computed_string().conflicts_with("project_id"),
        )
        .with_attribute("org_id", Attribute::computed_string())
        .with_attribute("cluster_count", Attribute::computed_int64())
        .with_attribute("created", Attribute::computed_string())
        .with_attribute("region_usage_restrictions", Attribute::computed_string())
        .with_attribute(
            "teams",
            object_list(&[
                ("team_id", AttributeType::String),
                ("role_names", AttributeType::list(AttributeType::String)),
            ]),
        )
        .with_attribute(
            "limits",
            object_list(&[
                ("name", AttributeType::String),
                ("value", AttributeType::Int64),
                ("current_usage", AttributeType::Int64),
                ("default_limit", AttributeType::Int64),
                ("maximum_limit", AttributeType::Int64),
            ]),
        );
    for (name, _) in SETTINGS {
        schema = schema.with_attribute(name, Attribute::computed_bool());
    }
    schema
}

#[async_trait::async_trait]
impl DataSource for ProjectDataSource {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> Schema {
        schema()
    }

    fn validate(&self, config: &Value) -> Vec<Diagnostic> {
        let is_set = |key: &str| config.get(key).is_some_and(|v| !v.is_null());
        if is_set("project_id") == is_set("name") {
            vec![Diagnostic::error("Invalid configuration")
                .with_detail("one of project_id or name must be configured")]
        } else {
            Vec::new()
        }
    }

    async fn read(&self, session: &Session, config: Value) -> Result<Value, ProviderError> {
        let id = match (
            known(&config, "project_id").and_then(Value::as_str),
            known(&config, "name").and_then(Value::as_str),
        ) {
            (Some(id), _) => id.to_string(),
            (None, Some(name)) => {
                let group: Group = session
                    .client
                    .get(&format!("/groups/byName/{}", segment(name)))
                    .await
                    .map_err(|e| with_context(e, format!("error getting project by name ({})", name)))?;
                group.id.ok_or_else(|| {
                    ProviderError::Internal(format!("project {} has no id", name))
                })?
            }
            (None, None) => {
                return Err(ProviderError::Validation(
                    "one of project_id or name must be configured".to_string(),
                ))
            }
        };

        let project = fetch(session, &id, None, &ProjectState::default())
            .await?
            .ok_or_else(|| ProviderError::NotFound(format!("project {} not found", id)))?;

        let mut state = to_state(&project)?;
        if let Some(map) = state.as_object_mut() {
            map.remove("project_owner_id");
            map.remove("with_default_alerts_settings");
        }
        set_attr(&mut state, "project_id", Value::String(id));
        Ok(state)
    }
}
