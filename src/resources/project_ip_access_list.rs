//! `mongodbatlas_project_ip_access_list`: one entry of a project's IP access list.
//!
//! An entry is a CIDR block, a single IP address or an AWS security group.
//! Every attribute forces replacement, so there is no in-place update.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use super::{from_state, segment, to_state, with_context, Resource, Session};
use crate::error::ProviderError;
use crate::schema::{Attribute, Diagnostic, Schema};
use crate::state_id::{decode_state_id, encode_state_id, id_part, split_import_id};
use crate::validators::Validator;

/// Type name.
pub const TYPE_NAME: &str = "mongodbatlas_project_ip_access_list";

/// The attributes that name an entry.
pub const ENTRY_KINDS: [&str; 3] = ["cidr_block", "ip_address", "aws_security_group"];

const TIMEOUT_CREATE_DELETE: Duration = Duration::from_secs(45 * 60);
const TIMEOUT_READ: Duration = Duration::from_secs(2 * 60);
const RETRY_INTERVAL: Duration = Duration::from_secs(10);

/// An access list entry as the API returns it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkPermissionEntry {
    /// Owning project.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    /// CIDR block, also filled in for single addresses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cidr_block: Option<String>,
    /// Single IP address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    /// AWS security group id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws_security_group: Option<String>,
    /// Free text comment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct AccessListState {
    pub id: Option<String>,
    #[serde(default)]
    pub project_id: String,
    pub cidr_block: Option<String>,
    pub ip_address: Option<String>,
    pub aws_security_group: Option<String>,
    pub comment: Option<String>,
}

impl AccessListState {
    /// The entry key: whichever of the three identifiers is set.
    fn entry(&self) -> Option<&str> {
        [&self.cidr_block, &self.aws_security_group, &self.ip_address]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .find(|v| !v.is_empty())
    }

    fn from_entry(project_id: &str, entry_key: &str, entry: NetworkPermissionEntry) -> Self {
        Self {
            id: Some(state_id(project_id, entry_key)),
            project_id: project_id.to_string(),
            cidr_block: entry.cidr_block,
            ip_address: entry.ip_address,
            aws_security_group: entry.aws_security_group,
            comment: entry.comment,
        }
    }
}

pub(crate) fn state_id(project_id: &str, entry: &str) -> String {
    encode_state_id([("project_id", project_id), ("entry", entry)])
}

fn entry_path(project_id: &str, entry: &str) -> String {
    format!("/groups/{}/accessList/{}", segment(project_id), segment(entry))
}

fn is_transient(err: &ProviderError) -> bool {
    err.status() == Some(500) || err.error_code() == Some("UNEXPECTED_ERROR")
}

/// The project IP access list resource.
pub struct ProjectIpAccessListResource;

fn schema() -> Schema {
    Schema::v0()
        .with_attribute("id", Attribute::computed_string())
        .with_attribute("project_id", Attribute::required_string().with_force_new())
        .with_attribute(
            "cidr_block",
            Attribute::optional_computed_string()
                .with_force_new()
                .with_validator(Validator::Cidr)
                .conflicts_with("ip_address")
                .conflicts_with("aws_security_group"),
        )
        .with_attribute(
            "ip_address",
            Attribute::optional_computed_string()
                .with_force_new()
                .with_validator(Validator::Ip)
                .conflicts_with("cidr_block")
                .conflicts_with("aws_security_group"),
        )
        .with_attribute(
            "aws_security_group",
            Attribute::optional_computed_string()
                .with_force_new()
                .conflicts_with("cidr_block")
                .conflicts_with("ip_address"),
        )
        .with_attribute(
            "comment",
            Attribute::optional_computed_string().with_force_new(),
        )
}

/// Fetch one entry, retrying while the API reports `retry_on`.
async fn get_entry(
    session: &Session,
    project_id: &str,
    entry: &str,
    timeout: Duration,
    retry_on: impl Fn(&ProviderError) -> bool,
) -> Result<NetworkPermissionEntry, ProviderError> {
    let path = entry_path(project_id, entry);
    session
        .retry_while(
            timeout,
            RETRY_INTERVAL,
            || session.client.get::<NetworkPermissionEntry>(&path),
            retry_on,
        )
        .await
}

#[async_trait::async_trait]
impl Resource for ProjectIpAccessListResource {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> Schema {
        schema()
    }

    fn validate(&self, config: &Value) -> Vec<Diagnostic> {
        let any_set = ENTRY_KINDS
            .iter()
            .any(|k| config.get(*k).is_some_and(|v| !v.is_null()));
        if any_set {
            Vec::new()
        } else {
            vec![Diagnostic::error("validation error")
                .with_detail("cidr_block, ip_address or aws_security_group needs to contain a value")]
        }
    }

    async fn create(&self, session: &Session, planned: Value) -> Result<Value, ProviderError> {
        let plan: AccessListState = from_state(&planned)?;
        let entry = plan.entry().map(str::to_string).ok_or_else(|| {
            ProviderError::Validation(
                "cidr_block, ip_address or aws_security_group needs to contain a value".to_string(),
            )
        })?;
        let project_id = plan.project_id.clone();

        let _guard = session.locks.lock(&project_id).await;

        let body = vec![NetworkPermissionEntry {
            cidr_block: plan.cidr_block.clone(),
            ip_address: plan.ip_address.clone(),
            aws_security_group: plan.aws_security_group.clone(),
            comment: plan.comment.clone(),
            ..Default::default()
        }];
        let list_path = format!("/groups/{}/accessList", segment(&project_id));
        session
            .retry_while(
                TIMEOUT_CREATE_DELETE,
                RETRY_INTERVAL,
                || session.client.post::<_, Value>(&list_path, &body),
                is_transient,
            )
            .await
            .map_err(|e| with_context(e, "error creating Project IP Access List information"))?;
        info!(project_id = %project_id, entry = %entry, "created access list entry");

        let created = get_entry(session, &project_id, &entry, TIMEOUT_CREATE_DELETE, |e| {
            is_transient(e) || e.is_not_found()
        })
        .await
        .map_err(|e| with_context(e, "error creating Project IP Access List information"))?;

        let mut state = AccessListState::from_entry(&project_id, &entry, created);
        if state.comment.is_none() {
            state.comment = plan.comment;
        }
        to_state(&state)
    }

    async fn read(&self, session: &Session, state: Value) -> Result<Option<Value>, ProviderError> {
        let current: AccessListState = from_state(&state)?;
        let id = current.id.clone().unwrap_or_default();
        let parts = decode_state_id(&id)?;
        if parts.len() != 2 {
            return Err(ProviderError::InvalidRequest(
                "the provided resource ID is not correct".to_string(),
            ));
        }
        let project_id = id_part(&parts, "project_id")?;
        let entry = id_part(&parts, "entry")?;

        match get_entry(session, project_id, entry, TIMEOUT_READ, |e| e.status() == Some(500)).await {
            Ok(found) => Ok(Some(to_state(&AccessListState::from_entry(project_id, entry, found))?)),
            Err(err) if err.is_not_found() => {
                debug!(project_id, entry, "access list entry not found");
                Ok(None)
            }
            Err(err) => Err(with_context(err, "error getting project ip access list information")),
        }
    }

    async fn update(
        &self,
        _session: &Session,
        _prior: Value,
        _planned: Value,
    ) -> Result<Value, ProviderError> {
        Err(ProviderError::Unimplemented(format!(
            "{} does not support in-place updates",
            TYPE_NAME
        )))
    }

    async fn delete(&self, session: &Session, state: Value) -> Result<(), ProviderError> {
        let current: AccessListState = from_state(&state)?;
        let parts = decode_state_id(current.id.as_deref().unwrap_or_default())?;
        let project_id = match parts.get("project_id") {
            Some(p) => p.clone(),
            None => current.project_id.clone(),
        };
        let entry = match parts.get("entry") {
            Some(e) => e.clone(),
            None => current
                .entry()
                .map(str::to_string)
                .ok_or_else(|| ProviderError::InvalidRequest("state has no access list entry".to_string()))?,
        };
        let path = entry_path(&project_id, &entry);

        session
            .retry_while(
                TIMEOUT_CREATE_DELETE,
                RETRY_INTERVAL,
                || async {
                    match session.client.delete(&path).await {
                        Err(err) if err.is_not_found() => Ok(()),
                        other => other,
                    }
                },
                |e| e.status() == Some(500),
            )
            .await
            .map_err(|e| with_context(e, "error deleting Project IP Access List information"))?;

        session
            .retry_while(
                TIMEOUT_CREATE_DELETE,
                RETRY_INTERVAL,
                || async {
                    match session.client.get::<Value>(&path).await {
                        Err(err) if err.is_not_found() => Ok(()),
                        Err(err) => Err(err),
                        Ok(_) => Err(ProviderError::FailedPrecondition(
                            "Access list still exists".to_string(),
                        )),
                    }
                },
                |_| true,
            )
            .await
            .map_err(|e| with_context(e, "error deleting Project IP Access List information"))?;
        info!(project_id = %project_id, entry = %entry, "deleted access list entry");
        Ok(())
    }

    async fn import(&self, session: &Session, id: &str) -> Result<Value, ProviderError> {
        let (project_id, entry) = split_import_id(id, "{project_id}-{entry}")?;
        let stub = AccessListState {
            id: Some(state_id(project_id, entry)),
            project_id: project_id.to_string(),
            ..Default::default()
        };
        self.read(session, to_state(&stub)?)
            .await?
            .ok_or_else(|| {
                ProviderError::NotFound(format!(
                    "access list entry {} not found in project {}",
                    entry, project_id
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{plan_resource, unknown};
    use crate::resources::test_support::session;
    use crate::validation::validate;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PROJECT: &str = "5f1a";

    fn entry_json() -> Value {
        json!({
            "groupId": PROJECT,
            "cidrBlock": "10.0.0.0/24",
            "comment": "office"
        })
    }

    #[test]
    fn test_validate_needs_one_entry() {
        let resource = ProjectIpAccessListResource;
        let diags = resource.validate(&json!({"project_id": PROJECT, "comment": "x"}));
        assert_eq!(diags.len(), 1);
        assert_eq!(
            diags[0].detail.as_deref(),
            Some("cidr_block, ip_address or aws_security_group needs to contain a value")
        );

        assert!(resource.validate(&json!({"project_id": PROJECT, "ip_address": "1.2.3.4"})).is_empty());
        assert!(resource.validate(&json!({"project_id": PROJECT, "cidr_block": unknown()})).is_empty());
    }

    #[test]
    fn test_schema_validators() {
        let schema = schema();
        let diags = validate(&schema, &json!({"project_id": PROJECT, "cidr_block": "10.0.0.1/24"}));
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].attribute.as_deref(), Some("cidr_block"));

        let diags = validate(&schema, &json!({"project_id": PROJECT, "ip_address": "300.1.1.1"}));
        assert_eq!(diags.len(), 1);

        let diags = validate(
            &schema,
            &json!({"project_id": PROJECT, "ip_address": "1.2.3.4", "cidr_block": "10.0.0.0/24"}),
        );
        assert!(diags.iter().any(|d| d.summary == "Conflicting configuration arguments"));
    }

    #[test]
    fn test_plan_comment_change_replaces() {
        let prior = json!({
            "id": state_id(PROJECT, "10.0.0.0/24"),
            "project_id": PROJECT,
            "cidr_block": "10.0.0.0/24",
            "ip_address": null,
            "aws_security_group": null,
            "comment": "office"
        });
        let plan = plan_resource(
            &schema(),
            Some(&prior),
            &json!({"project_id": PROJECT, "cidr_block": "10.0.0.0/24", "comment": "home"}),
        );
        assert_eq!(plan.replace_paths, vec!["comment".to_string()]);

        let plan = plan_resource(
            &schema(),
            Some(&prior),
            &json!({"project_id": PROJECT, "cidr_block": "10.0.0.0/24"}),
        );
        assert!(!plan.requires_replace());
    }

    #[tokio::test]
    async fn test_create_retries_unexpected_error() {
        let server = MockServer::start().await;
        let posts = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&posts);
        Mock::given(method("POST"))
            .and(path(format!("/api/atlas/v2/groups/{}/accessList", PROJECT)))
            .and(body_json(json!([{"cidrBlock": "10.0.0.0/24", "comment": "office"}])))
            .respond_with(move |_: &wiremock::Request| {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    ResponseTemplate::new(500).set_body_json(json!({
                        "error": 500, "errorCode": "UNEXPECTED_ERROR", "detail": "Unexpected error."
                    }))
                } else {
                    ResponseTemplate::new(201).set_body_json(json!({"results": [entry_json()]}))
                }
            })
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/api/atlas/v2/groups/{}/accessList/10.0.0.0%2F24", PROJECT)))
            .respond_with(ResponseTemplate::new(200).set_body_json(entry_json()))
            .mount(&server)
            .await;

        let planned = plan_resource(
            &schema(),
            None,
            &json!({"project_id": PROJECT, "cidr_block": "10.0.0.0/24", "comment": "office"}),
        )
        .planned;
        let state = ProjectIpAccessListResource
            .create(&session(&server), planned)
            .await
            .unwrap();

        assert_eq!(posts.load(Ordering::SeqCst), 2);
        assert_eq!(state["id"], state_id(PROJECT, "10.0.0.0/24"));
        assert_eq!(state["cidr_block"], "10.0.0.0/24");
        assert_eq!(state["ip_address"], Value::Null);
    }

    #[tokio::test]
    async fn test_create_fails_on_permanent_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/api/atlas/v2/groups/{}/accessList", PROJECT)))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": 400, "errorCode": "INVALID_IP_ADDRESS_OR_CIDR_NOTATION", "detail": "bad"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let planned = json!({"project_id": PROJECT, "ip_address": "1.2.3.4", "id": unknown()});
        let err = ProjectIpAccessListResource
            .create(&session(&server), planned)
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), Some("INVALID_IP_ADDRESS_OR_CIDR_NOTATION"));
    }

    #[tokio::test]
    async fn test_read_retries_500_and_reports_gone() {
        let server = MockServer::start().await;
        let gets = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&gets);
        Mock::given(method("GET"))
            .and(path(format!("/api/atlas/v2/groups/{}/accessList/sg-0123", PROJECT)))
            .respond_with(move |_: &wiremock::Request| {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    ResponseTemplate::new(500)
                } else {
                    ResponseTemplate::new(404).set_body_json(json!({
                        "error": 404, "errorCode": "ATLAS_NETWORK_PERMISSION_ENTRY_NOT_FOUND", "detail": "gone"
                    }))
                }
            })
            .mount(&server)
            .await;

        let state = json!({"id": state_id(PROJECT, "sg-0123"), "project_id": PROJECT});
        let result = ProjectIpAccessListResource
            .read(&session(&server), state)
            .await
            .unwrap();
        assert!(result.is_none());
        assert_eq!(gets.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_read_rejects_bad_id() {
        let server = MockServer::start().await;
        let err = ProjectIpAccessListResource
            .read(&session(&server), json!({"id": encode_state_id([("project_id", PROJECT)])}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("the provided resource ID is not correct"));
    }

    #[tokio::test]
    async fn test_delete_polls_until_gone() {
        let server = MockServer::start().await;
        let entry = format!("/api/atlas/v2/groups/{}/accessList/1.2.3.4", PROJECT);
        Mock::given(method("DELETE"))
            .and(path(entry.clone()))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        let gets = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&gets);
        Mock::given(method("GET"))
            .and(path(entry))
            .respond_with(move |_: &wiremock::Request| {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    ResponseTemplate::new(200).set_body_json(json!({"ipAddress": "1.2.3.4"}))
                } else {
                    ResponseTemplate::new(404)
                }
            })
            .mount(&server)
            .await;

        let state = json!({
            "id": state_id(PROJECT, "1.2.3.4"),
            "project_id": PROJECT,
            "ip_address": "1.2.3.4",
            "cidr_block": "1.2.3.4/32"
        });
        ProjectIpAccessListResource
            .delete(&session(&server), state)
            .await
            .unwrap();
        assert_eq!(gets.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_import() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/api/atlas/v2/groups/{}/accessList/sg-0123", PROJECT)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "groupId": PROJECT, "awsSecurityGroup": "sg-0123"
            })))
            .mount(&server)
            .await;

        let state = ProjectIpAccessListResource
            .import(&session(&server), &format!("{}-sg-0123", PROJECT))
            .await
            .unwrap();
        assert_eq!(state["aws_security_group"], "sg-0123");
        assert_eq!(state["project_id"], PROJECT);

        let err = ProjectIpAccessListResource
            .import(&session(&server), "nodash")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("{project_id}-{entry}"));
    }

    #[tokio::test]
    async fn test_update_is_unsupported() {
        let server = MockServer::start().await;
        let err = ProjectIpAccessListResource
            .update(&session(&server), json!({}), json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Unimplemented(_)));
    }
}
