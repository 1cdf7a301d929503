//! `mongodbatlas_network_container`: the Atlas side of a peering network.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use super::{from_state, known, segment, to_state, with_context, Resource, Session};
use crate::error::ProviderError;
use crate::plan::PlanModifier;
use crate::schema::{Attribute, AttributeFlags, AttributeType, Diagnostic, Schema};
use crate::state_id::{decode_state_id, encode_state_id, id_part, split_import_id};
use crate::validators::Validator;

/// Type name.
pub const TYPE_NAME: &str = "mongodbatlas_network_container";

const PROVIDER_AWS: &str = "AWS";
const PROVIDER_GCP: &str = "GCP";
const PROVIDER_AZURE: &str = "AZURE";
const PROVIDERS: &[&str] = &[PROVIDER_AWS, PROVIDER_GCP, PROVIDER_AZURE];

const CONTAINERS_IN_USE: &str = "CONTAINERS_IN_USE";
const DELETE_TIMEOUT: Duration = Duration::from_secs(60);
const DELETE_INTERVAL: Duration = Duration::from_secs(10);

/// A network container as the API returns it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    /// Container id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// CIDR block Atlas uses for the container.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub atlas_cidr_block: Option<String>,
    /// AWS, GCP or AZURE.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_name: Option<String>,
    /// AWS region.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region_name: Option<String>,
    /// Azure region.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// GCP regions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regions: Option<Vec<String>>,
    /// Azure subscription.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azure_subscription_id: Option<String>,
    /// Whether a cluster has been deployed into the container.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisioned: Option<bool>,
    /// GCP project.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gcp_project_id: Option<String>,
    /// GCP network.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_name: Option<String>,
    /// AWS VPC.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vpc_id: Option<String>,
    /// Azure virtual network.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vnet_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct ContainerState {
    pub id: Option<String>,
    pub container_id: Option<String>,
    #[serde(default)]
    pub project_id: String,
    pub atlas_cidr_block: Option<String>,
    pub provider_name: Option<String>,
    pub region_name: Option<String>,
    pub region: Option<String>,
    pub regions: Option<Vec<String>>,
    pub azure_subscription_id: Option<String>,
    pub provisioned: Option<bool>,
    pub gcp_project_id: Option<String>,
    pub network_name: Option<String>,
    pub vpc_id: Option<String>,
    pub vnet_name: Option<String>,
}

impl ContainerState {
    pub(crate) fn from_container(project_id: &str, c: Container) -> Self {
        let container_id = c.id.unwrap_or_default();
        Self {
            id: Some(state_id(project_id, &container_id)),
            container_id: Some(container_id),
            project_id: project_id.to_string(),
            atlas_cidr_block: c.atlas_cidr_block,
            provider_name: c.provider_name,
            region_name: c.region_name,
            region: c.region,
            regions: c.regions,
            azure_subscription_id: c.azure_subscription_id,
            provisioned: c.provisioned,
            gcp_project_id: c.gcp_project_id,
            network_name: c.network_name,
            vpc_id: c.vpc_id,
            vnet_name: c.vnet_name,
        }
    }

    /// The request body for this container. Region fields follow the provider.
    fn request_body(&self) -> Container {
        let provider = self.provider_name.clone().unwrap_or_else(|| PROVIDER_AWS.to_string());
        let mut body = Container {
            atlas_cidr_block: self.atlas_cidr_block.clone(),
            ..Default::default()
        };
        match provider.as_str() {
            PROVIDER_AWS => body.region_name = self.region_name.clone(),
            PROVIDER_AZURE => body.region = self.region.clone(),
            PROVIDER_GCP => body.regions = self.regions.clone().filter(|r| !r.is_empty()),
            _ => {}
        }
        body.provider_name = Some(provider);
        body
    }
}

fn state_id(project_id: &str, container_id: &str) -> String {
    encode_state_id([("project_id", project_id), ("container_id", container_id)])
}

fn container_path(project_id: &str, container_id: &str) -> String {
    format!(
        "/groups/{}/containers/{}",
        segment(project_id),
        segment(container_id)
    )
}

/// Fetch a container. `None` when it no longer exists.
pub(crate) async fn fetch(
    session: &Session,
    project_id: &str,
    container_id: &str,
) -> Result<Option<Container>, ProviderError> {
    match session.client.get(&container_path(project_id, container_id)).await {
        Ok(container) => Ok(Some(container)),
        Err(err) if err.is_not_found() => Ok(None),
        Err(err) => Err(with_context(
            err,
            format!("error reading network container {}", container_id),
        )),
    }
}

fn ids_of(state: &ContainerState) -> Result<(String, String), ProviderError> {
    let parts = decode_state_id(state.id.as_deref().unwrap_or_default())?;
    let project_id = id_part(&parts, "project_id")?.to_string();
    let container_id = id_part(&parts, "container_id")?.to_string();
    Ok((project_id, container_id))
}

/// The network container resource.
pub struct NetworkContainerResource;

pub(crate) fn schema() -> Schema {
    let computed = |t| Attribute::new(t, AttributeFlags::computed());
    Schema::v0()
        .with_attribute("id", Attribute::computed_string())
        .with_attribute("container_id", Attribute::computed_string())
        .with_attribute(
            "project_id",
            Attribute::required_string().with_plan_modifier(PlanModifier::RequiresReplace),
        )
        .with_attribute("atlas_cidr_block", Attribute::required_string())
        .with_attribute(
            "provider_name",
            Attribute::optional_string()
                .with_default(json!(PROVIDER_AWS))
                .with_validator(Validator::OneOf(PROVIDERS))
                .with_plan_modifier(PlanModifier::RequiresReplace),
        )
        .with_attribute("region_name", Attribute::optional_computed_string())
        .with_attribute("region", Attribute::optional_computed_string())
        .with_attribute(
            "regions",
            Attribute::new(
                AttributeType::list(AttributeType::String),
                AttributeFlags::optional_computed(),
            ),
        )
        .with_attribute("azure_subscription_id", computed(AttributeType::String))
        .with_attribute("provisioned", computed(AttributeType::Bool))
        .with_attribute("gcp_project_id", computed(AttributeType::String))
        .with_attribute("network_name", computed(AttributeType::String))
        .with_attribute("vpc_id", computed(AttributeType::String))
        .with_attribute("vnet_name", computed(AttributeType::String))
}

#[async_trait::async_trait]
impl Resource for NetworkContainerResource {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> Schema {
        schema()
    }

    fn validate(&self, config: &Value) -> Vec<Diagnostic> {
        let provider = config
            .get("provider_name")
            .and_then(Value::as_str)
            .unwrap_or(PROVIDER_AWS);
        let is_set = |key: &str| config.get(key).is_some_and(|v| !v.is_null());

        let mut diags = Vec::new();
        if provider == PROVIDER_AWS && !is_set("region_name") {
            diags.push(
                Diagnostic::error("Missing required argument")
                    .with_detail("`region_name` must be set when `provider_name` is AWS")
                    .with_attribute("region_name"),
            );
        }
        if provider == PROVIDER_AZURE && !is_set("region") {
            diags.push(
                Diagnostic::error("Missing required argument")
                    .with_detail("`region` must be set when `provider_name` is AZURE")
                    .with_attribute("region"),
            );
        }
        diags
    }

    async fn create(&self, session: &Session, planned: Value) -> Result<Value, ProviderError> {
        let plan: ContainerState = from_state(&planned)?;
        let project_id = plan.project_id.clone();

        let _guard = session.locks.lock(&project_id).await;

        let created: Container = session
            .client
            .post(
                &format!("/groups/{}/containers", segment(&project_id)),
                &plan.request_body(),
            )
            .await
            .map_err(|e| with_context(e, "error creating network container"))?;
        let container_id = created.id.clone().ok_or_else(|| {
            ProviderError::Internal("network container created without an id".to_string())
        })?;
        info!(project_id = %project_id, container_id = %container_id, "created network container");

        let current = fetch(session, &project_id, &container_id)
            .await?
            .unwrap_or(created);
        to_state(&ContainerState::from_container(&project_id, current))
    }

    async fn read(&self, session: &Session, state: Value) -> Result<Option<Value>, ProviderError> {
        let current: ContainerState = from_state(&state)?;
        let (project_id, container_id) = ids_of(&current)?;
        match fetch(session, &project_id, &container_id).await? {
            Some(container) => Ok(Some(to_state(&ContainerState::from_container(
                &project_id,
                container,
            ))?)),
            None => {
                debug!(project_id = %project_id, container_id = %container_id, "network container gone");
                Ok(None)
            }
        }
    }

    async fn update(
        &self,
        session: &Session,
        prior: Value,
        planned: Value,
    ) -> Result<Value, ProviderError> {
        let before: ContainerState = from_state(&prior)?;
        let (project_id, container_id) = ids_of(&before)?;

        let changed = ["atlas_cidr_block", "region_name", "region", "regions"]
            .iter()
            .any(|k| known(&planned, k).is_some_and(|v| prior.get(*k) != Some(v)));
        if changed {
            let plan: ContainerState = from_state(&planned)?;
            let _: Value = session
                .client
                .patch(&container_path(&project_id, &container_id), &plan.request_body())
                .await
                .map_err(|e| with_context(e, format!("error updating network container {}", container_id)))?;
        }

        let current = fetch(session, &project_id, &container_id)
            .await?
            .ok_or_else(|| {
                ProviderError::NotFound(format!("network container {} disappeared", container_id))
            })?;
        to_state(&ContainerState::from_container(&project_id, current))
    }

    async fn delete(&self, session: &Session, state: Value) -> Result<(), ProviderError> {
        let current: ContainerState = from_state(&state)?;
        let (project_id, container_id) = ids_of(&current)?;
        let path = container_path(&project_id, &container_id);

        let _guard = session.locks.lock(&project_id).await;
        session
            .retry_while(
                DELETE_TIMEOUT,
                DELETE_INTERVAL,
                || async {
                    match session.client.delete(&path).await {
                        Err(err) if err.is_not_found() => Ok(()),
                        other => other,
                    }
                },
                |e| e.error_code() == Some(CONTAINERS_IN_USE),
            )
            .await
            .map_err(|e| with_context(e, format!("error deleting network container {}", container_id)))?;
        info!(project_id = %project_id, container_id = %container_id, "deleted network container");
        Ok(())
    }

    async fn import(&self, session: &Session, id: &str) -> Result<Value, ProviderError> {
        let (project_id, container_id) = split_import_id(id, "{project_id}-{container_id}")?;
        match fetch(session, project_id, container_id).await? {
            Some(container) => to_state(&ContainerState::from_container(project_id, container)),
            None => Err(ProviderError::NotFound(format!(
                "network container {} not found in project {}",
                container_id, project_id
            ))),
        }
    }
}
