//! `mongodbatlas_cluster` data source.

use serde_json::Value;

use super::{read_only, DataSource};
use crate::error::ProviderError;
use crate::resources::cluster::{fetch, schema as resource_schema, ClusterState, TYPE_NAME};
use crate::resources::{known, to_state, Session};
use crate::schema::Schema;

/// The cluster data source.
pub struct ClusterDataSource;

#[async_trait::async_trait]
impl DataSource for ClusterDataSource {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> Schema {
        read_only(resource_schema(), &["project_id", "name"])
    }

    async fn read(&self, session: &Session, config: Value) -> Result<Value, ProviderError> {
        let lookup = |key: &str| {
            known(&config, key)
                .and_then(Value::as_str)
                .ok_or_else(|| ProviderError::Validation(format!("{} is required", key)))
        };
        let project_id = lookup("project_id")?;
        let name = lookup("name")?;

        let cluster = fetch(session, project_id, name).await?.ok_or_else(|| {
            ProviderError::NotFound(format!("cluster {} not found in project {}", name, project_id))
        })?;
        let carry = ClusterState {
            name: name.to_string(),
            ..Default::default()
        };
        to_state(&ClusterState::from_cluster(project_id, cluster, &carry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::test_support::session;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_read_cluster() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/atlas/v2/groups/p1/clusters/analytics"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "c1", "name": "analytics", "stateName": "IDLE",
                "mongoURI": "mongodb://analytics.example.net:27017",
                "providerSettings": {
                    "providerName": "TENANT", "backingProviderName": "AWS",
                    "instanceSizeName": "M5", "regionName": "US_EAST_1"
                }
            })))
            .mount(&server)
            .await;

        let state = ClusterDataSource
            .read(&session(&server), json!({"project_id": "p1", "name": "analytics"}))
            .await
            .unwrap();
        assert_eq!(state["backing_provider_name"], "AWS");
        assert_eq!(state["provider_instance_size_name"], "M5");
        assert_eq!(state["mongo_uri"], "mongodb://analytics.example.net:27017");
        assert_eq!(state["project_id"], "p1");
    }

    #[tokio::test]
    async fn test_read_requires_name() {
        let server = MockServer::start().await;
        let err = ClusterDataSource
            .read(&session(&server), json!({"project_id": "p1"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Validation(_)));
    }
}
