//! `mongodbatlas_project_ip_access_list` data source.

use serde_json::Value;

use super::DataSource;
use crate::error::ProviderError;
use crate::resources::project_ip_access_list::{
    state_id, ProjectIpAccessListResource, ENTRY_KINDS, TYPE_NAME,
};
use crate::resources::{known, Resource, Session};
use crate::schema::{Attribute, Diagnostic, Schema};
use crate::validators::Validator;

/// The project IP access list data source.
pub struct ProjectIpAccessListDataSource;

fn schema() -> Schema {
    Schema::v0()
        .with_attribute("id", Attribute::computed_string())
        .with_attribute("project_id", Attribute::required_string())
        .with_attribute(
            "cidr_block",
            Attribute::optional_computed_string().with_validator(Validator::Cidr),
        )
        .with_attribute(
            "ip_address",
            Attribute::optional_computed_string().with_validator(Validator::Ip),
        )
        .with_attribute("aws_security_group", Attribute::optional_computed_string())
        .with_attribute("comment", Attribute::computed_string())
}

#[async_trait::async_trait]
impl DataSource for ProjectIpAccessListDataSource {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> Schema {
        schema()
    }

    fn validate(&self, config: &Value) -> Vec<Diagnostic> {
        let set = ENTRY_KINDS
            .iter()
            .filter(|k| config.get(**k).is_some_and(|v| !v.is_null()))
            .count();
        if set == 1 {
            Vec::new()
        } else {
            vec![Diagnostic::error("Invalid configuration")
                .with_detail("exactly one of cidr_block, ip_address or aws_security_group must be set")]
        }
    }

    async fn read(&self, session: &Session, config: Value) -> Result<Value, ProviderError> {
        let project_id = known(&config, "project_id")
            .and_then(Value::as_str)
            .ok_or_else(|| ProviderError::Validation("project_id is required".to_string()))?;
        let entry = ENTRY_KINDS
            .iter()
            .find_map(|k| known(&config, k).and_then(Value::as_str))
            .ok_or_else(|| {
                ProviderError::Validation(
                    "one of cidr_block, ip_address or aws_security_group must be set".to_string(),
                )
            })?;

        let lookup = serde_json::json!({
            "id": state_id(project_id, entry),
            "project_id": project_id,
        });
        ProjectIpAccessListResource
            .read(session, lookup)
            .await?
            .ok_or_else(|| {
                ProviderError::NotFound(format!(
                    "access list entry {} not found in project {}",
                    entry, project_id
                ))
            })
    }
}
