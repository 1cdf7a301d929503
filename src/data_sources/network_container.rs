//! `mongodbatlas_network_container` data source.

use serde_json::Value;

use super::{read_only, DataSource};
use crate::error::ProviderError;
use crate::resources::network_container::{fetch, schema as resource_schema, ContainerState, TYPE_NAME};
use crate::resources::{known, to_state, Session};
use crate::schema::Schema;

/// The network container data source.
pub struct NetworkContainerDataSource;

#[async_trait::async_trait]
impl DataSource for NetworkContainerDataSource {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> Schema {
        read_only(resource_schema(), &["project_id", "container_id"])
    }

    async fn read(&self, session: &Session, config: Value) -> Result<Value, ProviderError> {
        let lookup = |key: &str| {
            known(&config, key)
                .and_then(Value::as_str)
                .ok_or_else(|| ProviderError::Validation(format!("{} is required", key)))
        };
        let project_id = lookup("project_id")?;
        let container_id = lookup("container_id")?;

        let container = fetch(session, project_id, container_id).await?.ok_or_else(|| {
            ProviderError::NotFound(format!(
                "network container {} not found in project {}",
                container_id, project_id
            ))
        })?;
        to_state(&ContainerState::from_container(project_id, container))
    }
}
