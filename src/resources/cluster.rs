//! `mongodbatlas_cluster`: a single-region cluster.
//!
//! Covers the provider-level settings of a cluster and the compute
//! autoscaling bounds, which are only tracked while compute autoscaling is
//! enabled. Shared tier (`TENANT`) clusters move to a dedicated provider in
//! place through the tenant upgrade endpoint; any other provider change
//! replaces the cluster.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use super::{from_state, known, segment, to_state, with_context, Resource, Session};
use crate::client::StateChangeConf;
use crate::error::ProviderError;
use crate::plan::{copy_unknowns, is_unknown, PlanModifier, ResourcePlan};
use crate::schema::{Attribute, Diagnostic, Schema};
use crate::state_id::{decode_state_id, encode_state_id, id_part, split_import_id};

/// Type name.
pub const TYPE_NAME: &str = "mongodbatlas_cluster";

/// Provider name of shared tier clusters.
pub const TENANT: &str = "TENANT";

/// Never taken from prior state while planning.
const VOLATILE: &[&str] = &["state_name", "mongo_uri_updated"];

/// Recomputed by Atlas when a shared tier moves to a dedicated one.
const TENANT_UPGRADE_KEEP_UNKNOWN: &[&str] = &["disk_size_gb", "cluster_id", "backup_enabled", "provider_disk_iops"];

/// Attributes whose change invalidates the prior value of others.
const CHANGE_DEPENDENTS: &[(&str, &[&str])] = &[
    ("disk_size_gb", &[]),
    ("mongo_db_major_version", &["mongo_db_version"]),
    (INSTANCE_SIZE, &["provider_disk_iops"]),
    ("provider_region_name", &["mongo_uri", "mongo_uri_with_options"]),
];

const STATE_IDLE: &str = "IDLE";
const STATE_DELETED: &str = "DELETED";
const PENDING_APPLY: &[&str] = &["CREATING", "UPDATING", "REPAIRING", "REPEATING", "PENDING"];
const PENDING_DELETE: &[&str] = &["IDLE", "CREATING", "UPDATING", "REPAIRING", "DELETING"];

const TIMEOUT: Duration = Duration::from_secs(3 * 60 * 60);

const COMPUTE_ENABLED: &str = "auto_scaling_compute_enabled";
const SCALE_DOWN_ENABLED: &str = "auto_scaling_compute_scale_down_enabled";
const MAX_INSTANCE_SIZE: &str = "provider_auto_scaling_compute_max_instance_size";
const MIN_INSTANCE_SIZE: &str = "provider_auto_scaling_compute_min_instance_size";
const INSTANCE_SIZE: &str = "provider_instance_size_name";

/// Attributes an in-place update sends to the API.
const UPDATABLE: &[&str] = &[
    INSTANCE_SIZE,
    "provider_region_name",
    "backing_provider_name",
    "provider_disk_iops",
    "replication_factor",
    "disk_size_gb",
    "cluster_type",
    "mongo_db_major_version",
    "auto_scaling_disk_gb_enabled",
    COMPUTE_ENABLED,
    SCALE_DOWN_ENABLED,
    MAX_INSTANCE_SIZE,
    MIN_INSTANCE_SIZE,
    "backup_enabled",
    "pit_enabled",
    "cloud_backup",
];

/// Cluster as the API returns and accepts it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct Cluster {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_type: Option<String>,
    #[serde(rename = "diskSizeGB", default, skip_serializing_if = "Option::is_none")]
    pub disk_size_gb: Option<f64>,
    #[serde(rename = "mongoDBMajorVersion", default, skip_serializing_if = "Option::is_none")]
    pub mongo_db_major_version: Option<String>,
    #[serde(rename = "mongoDBVersion", default, skip_serializing_if = "Option::is_none")]
    pub mongo_db_version: Option<String>,
    #[serde(rename = "mongoURI", default, skip_serializing_if = "Option::is_none")]
    pub mongo_uri: Option<String>,
    #[serde(rename = "mongoURIUpdated", default, skip_serializing_if = "Option::is_none")]
    pub mongo_uri_updated: Option<String>,
    #[serde(rename = "mongoURIWithOptions", default, skip_serializing_if = "Option::is_none")]
    pub mongo_uri_with_options: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_backup_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pit_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paused: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replication_factor: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_scaling: Option<AutoScaling>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_settings: Option<ProviderSettings>,
}

/// Cluster level autoscaling switches.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct AutoScaling {
    #[serde(rename = "diskGBEnabled", default, skip_serializing_if = "Option::is_none")]
    pub disk_gb_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compute: Option<Compute>,
}

/// Compute autoscaling switches and bounds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct Compute {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_down_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_instance_size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_instance_size: Option<String>,
}

/// Cloud provider placement of a cluster.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct ProviderSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backing_provider_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_size_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region_name: Option<String>,
    #[serde(rename = "diskIOPS", default, skip_serializing_if = "Option::is_none")]
    pub disk_iops: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_scaling: Option<AutoScaling>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct ClusterState {
    pub id: Option<String>,
    pub cluster_id: Option<String>,
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub name: String,
    pub provider_name: Option<String>,
    pub provider_instance_size_name: Option<String>,
    pub provider_region_name: Option<String>,
    pub backing_provider_name: Option<String>,
    pub provider_disk_iops: Option<i64>,
    pub replication_factor: Option<i64>,
    pub disk_size_gb: Option<f64>,
    pub cluster_type: Option<String>,
    pub mongo_db_major_version: Option<String>,
    pub mongo_db_version: Option<String>,
    pub mongo_uri: Option<String>,
    pub mongo_uri_updated: Option<String>,
    pub mongo_uri_with_options: Option<String>,
    pub state_name: Option<String>,
    pub auto_scaling_disk_gb_enabled: Option<bool>,
    pub auto_scaling_compute_enabled: Option<bool>,
    pub auto_scaling_compute_scale_down_enabled: Option<bool>,
    pub provider_auto_scaling_compute_max_instance_size: Option<String>,
    pub provider_auto_scaling_compute_min_instance_size: Option<String>,
    pub backup_enabled: Option<bool>,
    pub pit_enabled: Option<bool>,
    pub paused: Option<bool>,
    pub cloud_backup: Option<bool>,
}

impl ClusterState {
    /// State for `cluster`. `carry` supplies values the API does not echo back.
    pub(crate) fn from_cluster(project_id: &str, cluster: Cluster, carry: &ClusterState) -> Self {
        let settings = cluster.provider_settings.unwrap_or_default();
        let provider_name = settings.provider_name.clone();
        let is_tenant = provider_name.as_deref() == Some(TENANT);
        let compute = cluster
            .auto_scaling
            .as_ref()
            .and_then(|a| a.compute.clone())
            .unwrap_or_default();
        let bounds = settings
            .auto_scaling
            .and_then(|a| a.compute)
            .unwrap_or_default();
        let name = cluster.name.unwrap_or_else(|| carry.name.clone());

        Self {
            id: Some(state_id(project_id, &name)),
            cluster_id: cluster.id,
            project_id: project_id.to_string(),
            name,
            provider_name,
            provider_instance_size_name: settings.instance_size_name,
            provider_region_name: settings.region_name,
            backing_provider_name: if is_tenant {
                settings.backing_provider_name
            } else {
                carry.backing_provider_name.clone()
            },
            provider_disk_iops: settings.disk_iops.filter(|iops| *iops != 0),
            replication_factor: cluster.replication_factor,
            disk_size_gb: cluster.disk_size_gb,
            cluster_type: cluster.cluster_type,
            mongo_db_major_version: cluster.mongo_db_major_version,
            mongo_db_version: cluster.mongo_db_version,
            mongo_uri: cluster.mongo_uri,
            mongo_uri_updated: cluster.mongo_uri_updated,
            mongo_uri_with_options: cluster.mongo_uri_with_options,
            state_name: cluster.state_name,
            auto_scaling_disk_gb_enabled: if is_tenant {
                carry.auto_scaling_disk_gb_enabled
            } else {
                cluster.auto_scaling.and_then(|a| a.disk_gb_enabled)
            },
            auto_scaling_compute_enabled: compute.enabled,
            auto_scaling_compute_scale_down_enabled: compute.scale_down_enabled,
            provider_auto_scaling_compute_max_instance_size: bounds.max_instance_size,
            provider_auto_scaling_compute_min_instance_size: bounds.min_instance_size,
            backup_enabled: cluster.backup_enabled,
            pit_enabled: cluster.pit_enabled,
            paused: cluster.paused,
            cloud_backup: cluster.provider_backup_enabled,
        }
    }

    /// The request body for creating or updating this cluster.
    fn request(&self) -> Cluster {
        let provider = self.provider_name.clone().unwrap_or_default();
        let is_tenant = provider == TENANT;
        let compute_enabled = self.auto_scaling_compute_enabled.unwrap_or(false);

        let mut settings = ProviderSettings {
            instance_size_name: self.provider_instance_size_name.clone(),
            region_name: self.provider_region_name.clone(),
            ..Default::default()
        };
        if is_tenant {
            settings.backing_provider_name = self.backing_provider_name.clone();
        }
        if provider == "AWS" {
            let nvme = self
                .provider_instance_size_name
                .as_deref()
                .is_some_and(|s| s.contains("NVME"));
            if !nvme {
                settings.disk_iops = self.provider_disk_iops;
            }
        }
        if compute_enabled {
            settings.auto_scaling = Some(AutoScaling {
                disk_gb_enabled: None,
                compute: Some(Compute {
                    min_instance_size: self.provider_auto_scaling_compute_min_instance_size.clone(),
                    max_instance_size: self.provider_auto_scaling_compute_max_instance_size.clone(),
                    ..Default::default()
                }),
            });
        }
        settings.provider_name = Some(provider);

        Cluster {
            name: Some(self.name.clone()),
            cluster_type: self.cluster_type.clone(),
            disk_size_gb: self.disk_size_gb,
            mongo_db_major_version: self.mongo_db_major_version.clone(),
            backup_enabled: self.backup_enabled,
            provider_backup_enabled: self.cloud_backup,
            pit_enabled: self.pit_enabled,
            replication_factor: self.replication_factor,
            auto_scaling: (!is_tenant).then(|| AutoScaling {
                disk_gb_enabled: self.auto_scaling_disk_gb_enabled,
                compute: Some(Compute {
                    enabled: Some(compute_enabled),
                    scale_down_enabled: Some(
                        self.auto_scaling_compute_scale_down_enabled.unwrap_or(false),
                    ),
                    ..Default::default()
                }),
            }),
            provider_settings: Some(settings),
            ..Default::default()
        }
    }
}

fn state_id(project_id: &str, name: &str) -> String {
    encode_state_id([("project_id", project_id), ("cluster_name", name)])
}

fn clusters_path(project_id: &str) -> String {
    format!("/groups/{}/clusters", segment(project_id))
}

fn cluster_path(project_id: &str, name: &str) -> String {
    format!("{}/{}", clusters_path(project_id), segment(name))
}

fn ids_of(state: &ClusterState) -> Result<(String, String), ProviderError> {
    match state.id.as_deref().filter(|id| !id.is_empty()) {
        Some(id) => {
            let parts = decode_state_id(id)?;
            Ok((
                id_part(&parts, "project_id")?.to_string(),
                id_part(&parts, "cluster_name")?.to_string(),
            ))
        }
        None => Ok((state.project_id.clone(), state.name.clone())),
    }
}

/// Fetch a cluster. `None` when it does not exist.
pub(crate) async fn fetch(
    session: &Session,
    project_id: &str,
    name: &str,
) -> Result<Option<Cluster>, ProviderError> {
    match session.client.get(&cluster_path(project_id, name)).await {
        Ok(cluster) => Ok(Some(cluster)),
        Err(err) if err.is_not_found() => Ok(None),
        Err(err) => Err(with_context(err, format!("error reading cluster {}", name))),
    }
}

/// Poll until the cluster settles in `IDLE`.
async fn wait_for_idle(session: &Session, project_id: &str, name: &str) -> Result<Cluster, ProviderError> {
    let conf = StateChangeConf::new(PENDING_APPLY, &[STATE_IDLE], TIMEOUT)
        .with_delay(Duration::from_secs(3 * 60))
        .with_min_timeout(Duration::from_secs(60));
    session
        .wait_for_state(&conf, || async {
            let cluster = fetch(session, project_id, name).await?.ok_or_else(|| {
                ProviderError::NotFound(format!("cluster {} not found in project {}", name, project_id))
            })?;
            let state = cluster.state_name.clone().unwrap_or_default();
            Ok((cluster, state))
        })
        .await
}

/// Poll until the cluster is gone.
async fn wait_for_deleted(session: &Session, project_id: &str, name: &str) -> Result<(), ProviderError> {
    let conf = StateChangeConf::new(PENDING_DELETE, &[STATE_DELETED], TIMEOUT)
        .with_delay(Duration::from_secs(60))
        .with_min_timeout(Duration::from_secs(30));
    session
        .wait_for_state(&conf, || async {
            let state = match fetch(session, project_id, name).await? {
                Some(cluster) => cluster.state_name.unwrap_or_default(),
                None => STATE_DELETED.to_string(),
            };
            Ok(((), state))
        })
        .await
}

/// Compare two instance sizes of the same family by their tier number.
///
/// `M30` and `M40` compare; `M40` and `R40` or `M40_NVME` do not.
fn tier_ordering(a: &str, b: &str) -> Option<std::cmp::Ordering> {
    fn split(size: &str) -> Option<(&str, u32, &str)> {
        let digits_at = size.find(|c: char| c.is_ascii_digit())?;
        let (prefix, rest) = size.split_at(digits_at);
        let digits_end = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        let (number, suffix) = rest.split_at(digits_end);
        Some((prefix, number.parse().ok()?, suffix))
    }
    let (pa, na, sa) = split(a)?;
    let (pb, nb, sb) = split(b)?;
    (pa == pb && sa == sb).then(|| na.cmp(&nb))
}

fn known_bool(config: &Value, key: &str) -> Option<bool> {
    known(config, key).and_then(Value::as_bool)
}

fn known_str<'a>(config: &'a Value, key: &str) -> Option<&'a str> {
    known(config, key).and_then(Value::as_str)
}

fn invalid(detail: &str) -> Diagnostic {
    Diagnostic::error("Invalid cluster configuration").with_detail(detail)
}

/// Attributes that must stay unknown when an update plan falls back to
/// prior state for everything else.
fn keep_unknown(config: &Value, prior: &Value, tenant_upgrade: bool) -> Vec<&'static str> {
    let mut keep = VOLATILE.to_vec();
    if tenant_upgrade {
        keep.extend_from_slice(TENANT_UPGRADE_KEEP_UNKNOWN);
    }
    for (attr, dependents) in CHANGE_DEPENDENTS {
        let changed = known(config, attr).is_some_and(|v| prior.get(*attr) != Some(v));
        if changed {
            keep.push(*attr);
            keep.extend_from_slice(*dependents);
        }
    }
    keep
}

/// The cluster resource.
pub struct ClusterResource;

pub(crate) fn schema() -> Schema {
    let state_for_unknown = |attr: Attribute| attr.with_plan_modifier(PlanModifier::UseStateForUnknown);
    let null_for_unknown = |attr: Attribute| attr.with_plan_modifier(PlanModifier::UseNullForUnknown);
    let instance_bound = || {
        Attribute::optional_computed_string().with_plan_modifier(PlanModifier::AutoScalingInstanceSize {
            enabled_by: COMPUTE_ENABLED,
        })
    };

    let mut schema = Schema::v0();
    for name in [
        "id",
        "cluster_id",
        "mongo_uri",
        "mongo_uri_with_options",
    ] {
        schema = schema.with_attribute(name, state_for_unknown(Attribute::computed_string()));
    }
    for name in ["mongo_db_version", "mongo_uri_updated", "state_name"] {
        schema = schema.with_attribute(name, Attribute::computed_string());
    }

    schema
        .with_attribute(
            "project_id",
            Attribute::required_string().with_plan_modifier(PlanModifier::RequiresReplace),
        )
        .with_attribute(
            "name",
            Attribute::required_string().with_plan_modifier(PlanModifier::RequiresReplace),
        )
        .with_attribute("provider_name", Attribute::required_string())
        .with_attribute(INSTANCE_SIZE, Attribute::required_string())
        .with_attribute(
            "provider_region_name",
            state_for_unknown(Attribute::optional_computed_string()),
        )
        .with_attribute(
            "backing_provider_name",
            null_for_unknown(Attribute::optional_computed_string()),
        )
        .with_attribute(
            "provider_disk_iops",
            null_for_unknown(Attribute::optional_computed_int64()),
        )
        .with_attribute(
            "replication_factor",
            null_for_unknown(Attribute::optional_computed_int64()),
        )
        .with_attribute(
            "disk_size_gb",
            state_for_unknown(Attribute::optional_computed_float64()),
        )
        .with_attribute(
            "cluster_type",
            state_for_unknown(Attribute::optional_computed_string()),
        )
        .with_attribute(
            "mongo_db_major_version",
            state_for_unknown(Attribute::optional_computed_string()),
        )
        .with_attribute(
            "auto_scaling_disk_gb_enabled",
            Attribute::optional_bool().with_default(json!(true)),
        )
        .with_attribute(COMPUTE_ENABLED, Attribute::optional_computed_bool())
        .with_attribute(SCALE_DOWN_ENABLED, Attribute::optional_computed_bool())
        .with_attribute(MAX_INSTANCE_SIZE, instance_bound())
        .with_attribute(MIN_INSTANCE_SIZE, instance_bound())
        .with_attribute("backup_enabled", Attribute::optional_computed_bool())
        .with_attribute("pit_enabled", Attribute::optional_computed_bool())
        .with_attribute("paused", Attribute::optional_computed_bool())
        .with_attribute(
            "cloud_backup",
            Attribute::optional_bool()
                .with_default(json!(false))
                .conflicts_with("backup_enabled"),
        )
}

#[async_trait::async_trait]
impl Resource for ClusterResource {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> Schema {
        schema()
    }

    fn validate(&self, config: &Value) -> Vec<Diagnostic> {
        let compute = known_bool(config, COMPUTE_ENABLED).unwrap_or(false);
        let scale_down = known_bool(config, SCALE_DOWN_ENABLED).unwrap_or(false);
        let is_set = |key: &str| config.get(key).is_some_and(|v| !v.is_null());

        let mut diags = Vec::new();
        if scale_down && !compute {
            diags.push(invalid(
                "`auto_scaling_compute_scale_down_enabled` must be set when `auto_scaling_compute_enabled` is set",
            ));
        }
        if compute && !is_set(MAX_INSTANCE_SIZE) {
            diags.push(invalid(
                "`provider_auto_scaling_compute_max_instance_size` must be set when `auto_scaling_compute_enabled` is set",
            ));
        }
        if scale_down && !is_set(MIN_INSTANCE_SIZE) {
            diags.push(invalid(
                "`provider_auto_scaling_compute_min_instance_size` must be set when `auto_scaling_compute_scale_down_enabled` is set",
            ));
        }

        if compute {
            if let Some(size) = known_str(config, INSTANCE_SIZE) {
                if let Some(min) = known_str(config, MIN_INSTANCE_SIZE) {
                    if tier_ordering(size, min) == Some(std::cmp::Ordering::Less) {
                        diags.push(
                            invalid("`provider_auto_scaling_compute_min_instance_size` must be lower than `provider_instance_size_name`")
                                .with_attribute(MIN_INSTANCE_SIZE),
                        );
                    }
                }
                if let Some(max) = known_str(config, MAX_INSTANCE_SIZE) {
                    if tier_ordering(size, max) == Some(std::cmp::Ordering::Greater) {
                        diags.push(
                            invalid("`provider_auto_scaling_compute_max_instance_size` must be higher than `provider_instance_size_name`")
                                .with_attribute(MAX_INSTANCE_SIZE),
                        );
                    }
                }
            }
        }
        diags
    }

    fn modify_plan(&self, plan: &mut ResourcePlan) {
        let Some(prior) = plan.prior.clone() else {
            return;
        };
        let current = plan.prior_attr("provider_name").clone();
        let updated = plan.planned_attr("provider_name").clone();
        let tenant_upgrade = !is_unknown(&updated) && current != updated && current.as_str() == Some(TENANT);
        if tenant_upgrade {
            plan.set_planned("backing_provider_name", Value::Null);
        } else if !is_unknown(&updated) && current != updated {
            plan.require_replace("provider_name");
        }
        if plan.requires_replace() {
            return;
        }

        let keep = keep_unknown(&plan.config, &prior, tenant_upgrade);
        copy_unknowns(&mut plan.planned, &prior, &keep);
    }

    async fn create(&self, session: &Session, planned: Value) -> Result<Value, ProviderError> {
        let plan: ClusterState = from_state(&planned)?;
        let project_id = plan.project_id.clone();
        let name = plan.name.clone();

        let _: Cluster = session
            .client
            .post(&clusters_path(&project_id), &plan.request())
            .await
            .map_err(|e| with_context(e, format!("error creating cluster {}", name)))?;
        info!(project_id = %project_id, name = %name, "cluster creation started");

        let mut cluster = wait_for_idle(session, &project_id, &name)
            .await
            .map_err(|e| with_context(e, format!("error creating cluster {}", name)))?;

        if plan.paused == Some(true) {
            cluster = set_paused(session, &project_id, &name, true).await?;
        }
        to_state(&ClusterState::from_cluster(&project_id, cluster, &plan))
    }

    async fn read(&self, session: &Session, state: Value) -> Result<Option<Value>, ProviderError> {
        let current: ClusterState = from_state(&state)?;
        let (project_id, name) = ids_of(&current)?;
        match fetch(session, &project_id, &name).await? {
            Some(cluster) => Ok(Some(to_state(&ClusterState::from_cluster(
                &project_id,
                cluster,
                &current,
            ))?)),
            None => {
                debug!(project_id = %project_id, name = %name, "cluster gone");
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
        let before: ClusterState = from_state(&prior)?;
        let plan: ClusterState = from_state(&planned)?;
        let (project_id, name) = ids_of(&before)?;

        let was_paused = before.paused == Some(true);
        let pause = plan.paused == Some(true) && !was_paused;
        let resume = was_paused && plan.paused == Some(false);

        if resume {
            set_paused(session, &project_id, &name, false).await?;
        }

        let leaving_tenant = before.provider_name.as_deref() == Some(TENANT)
            && plan.provider_name.as_deref().is_some_and(|p| p != TENANT);
        let changed = UPDATABLE
            .iter()
            .any(|k| known(&planned, k).is_some_and(|v| prior.get(*k) != Some(v)));

        if leaving_tenant {
            let _: Cluster = session
                .client
                .post(&format!("{}/tenantUpgrade", clusters_path(&project_id)), &plan.request())
                .await
                .map_err(|e| with_context(e, format!("error upgrading cluster {}", name)))?;
            info!(project_id = %project_id, name = %name, "shared tier upgrade started");
            wait_for_idle(session, &project_id, &name).await?;
        } else if changed {
            let _: Cluster = session
                .client
                .patch(&cluster_path(&project_id, &name), &plan.request())
                .await
                .map_err(|e| with_context(e, format!("error updating cluster {}", name)))?;
            wait_for_idle(session, &project_id, &name)
                .await
                .map_err(|e| with_context(e, format!("error updating cluster {}", name)))?;
        }

        if pause {
            set_paused(session, &project_id, &name, true).await?;
        }

        let cluster = fetch(session, &project_id, &name)
            .await?
            .ok_or_else(|| ProviderError::NotFound(format!("cluster {} disappeared", name)))?;
        to_state(&ClusterState::from_cluster(&project_id, cluster, &plan))
    }

    async fn delete(&self, session: &Session, state: Value) -> Result<(), ProviderError> {
        let current: ClusterState = from_state(&state)?;
        let (project_id, name) = ids_of(&current)?;

        match session.client.delete(&cluster_path(&project_id, &name)).await {
            Ok(()) => {}
            Err(err) if err.is_not_found() => return Ok(()),
            Err(err) => return Err(with_context(err, format!("error deleting cluster {}", name))),
        }
        info!(project_id = %project_id, name = %name, "waiting for cluster to be destroyed");
        wait_for_deleted(session, &project_id, &name)
            .await
            .map_err(|e| with_context(e, format!("error deleting cluster {}", name)))
    }

    async fn import(&self, session: &Session, id: &str) -> Result<Value, ProviderError> {
        let (project_id, name) = split_import_id(id, "{project_id}-{name}")?;
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

async fn set_paused(
    session: &Session,
    project_id: &str,
    name: &str,
    paused: bool,
) -> Result<Cluster, ProviderError> {
    let body = Cluster {
        paused: Some(paused),
        ..Default::default()
    };
    let _: Cluster = session
        .client
        .patch(&cluster_path(project_id, name), &body)
        .await
        .map_err(|e| with_context(e, format!("error setting paused={} on cluster {}", paused, name)))?;
    wait_for_idle(session, project_id, name).await
}
