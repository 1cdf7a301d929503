//! `mongodbatlas_project`: an Atlas project with its teams, limits and settings.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use super::{from_state, known, segment, to_state, with_context, Resource, Session};
use crate::client::StateChangeConf;
use crate::error::ProviderError;
use crate::plan::PlanModifier;
use crate::schema::{Attribute, AttributeFlags, AttributeType, Block, NestedBlock, Schema};

/// Type name.
pub const TYPE_NAME: &str = "mongodbatlas_project";

/// Settings attributes and their API field names.
pub const SETTINGS: [(&str, &str); 6] = [
    (
        "is_collect_database_specifics_statistics_enabled",
        "isCollectDatabaseSpecificsStatisticsEnabled",
    ),
    ("is_data_explorer_enabled", "isDataExplorerEnabled"),
    ("is_extended_storage_sizes_enabled", "isExtendedStorageSizesEnabled"),
    ("is_performance_advisor_enabled", "isPerformanceAdvisorEnabled"),
    ("is_realtime_performance_panel_enabled", "isRealtimePerformancePanelEnabled"),
    ("is_schema_advisor_enabled", "isSchemaAdvisorEnabled"),
];

const DEPENDENTS_DELETING: &str = "DELETING";
const DEPENDENTS_RETRY: &str = "RETRY";
const DEPENDENTS_IDLE: &str = "IDLE";

/// Project as returned by `GET /groups/{id}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    /// Project id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Project name.
    #[serde(default)]
    pub name: String,
    /// Owning organization.
    #[serde(default)]
    pub org_id: String,
    /// Number of clusters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_count: Option<i64>,
    /// Creation timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    /// Region restriction, e.g. `GOV_REGIONS_ONLY`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region_usage_restrictions: Option<String>,
    /// Create default alert configurations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub with_default_alerts_settings: Option<bool>,
}

/// A team's roles in a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamRole {
    /// Team id.
    pub team_id: String,
    /// Project roles granted to the team.
    #[serde(default)]
    pub role_names: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Paginated<T> {
    #[serde(default = "Vec::new")]
    results: Vec<T>,
    #[serde(default)]
    total_count: Option<i64>,
}

/// A project limit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataFederationLimit {
    /// Limit name, e.g. `atlas.project.deployment.clusters`.
    pub name: String,
    /// Configured value.
    pub value: i64,
    /// Current usage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_usage: Option<i64>,
    /// Default value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_limit: Option<i64>,
    /// Maximum value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum_limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClusterSummary {
    #[serde(default)]
    state_name: String,
}

/// Resource state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct ProjectState {
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub org_id: String,
    pub project_owner_id: Option<String>,
    pub with_default_alerts_settings: Option<bool>,
    pub region_usage_restrictions: Option<String>,
    pub cluster_count: Option<i64>,
    pub created: Option<String>,
    /// Settings keyed by attribute name.
    #[serde(flatten)]
    pub settings: BTreeMap<String, Option<bool>>,
    #[serde(default)]
    pub teams: Vec<TeamState>,
    #[serde(default)]
    pub limits: Vec<LimitState>,
}

/// One `teams` block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct TeamState {
    pub team_id: String,
    #[serde(default)]
    pub role_names: Vec<String>,
}

/// One `limits` block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct LimitState {
    pub name: String,
    pub value: i64,
    pub current_usage: Option<i64>,
    pub default_limit: Option<i64>,
    pub maximum_limit: Option<i64>,
}

impl From<&TeamState> for TeamRole {
    fn from(team: &TeamState) -> Self {
        TeamRole {
            team_id: team.team_id.clone(),
            role_names: team.role_names.clone(),
        }
    }
}

/// The project resource.
pub struct ProjectResource;

fn schema() -> Schema {
    let mut schema = Schema::v0()
        .with_attribute(
            "id",
            Attribute::computed_string().with_plan_modifier(PlanModifier::UseStateForUnknown),
        )
        .with_attribute("name", Attribute::required_string().with_description("Project name"))
        .with_attribute(
            "org_id",
            Attribute::required_string()
                .with_description("Organization that owns the project")
                .with_plan_modifier(PlanModifier::RequiresReplace),
        )
        .with_attribute("project_owner_id", Attribute::optional_string())
        .with_attribute(
            "with_default_alerts_settings",
            Attribute::optional_computed_bool().with_default(json!(true)),
        )
        .with_attribute("region_usage_restrictions", Attribute::optional_computed_string())
        .with_attribute(
            "cluster_count",
            Attribute::computed_int64().with_plan_modifier(PlanModifier::UseStateForUnknown),
        )
        .with_attribute(
            "created",
            Attribute::computed_string().with_plan_modifier(PlanModifier::UseStateForUnknown),
        )
        .with_block(
            "teams",
            NestedBlock::set(
                Block::new()
                    .with_attribute("team_id", Attribute::required_string())
                    .with_attribute(
                        "role_names",
                        Attribute::new(
                            AttributeType::set(AttributeType::String),
                            AttributeFlags::required(),
                        ),
                    ),
            ),
        )
        .with_block(
            "limits",
            NestedBlock::set(
                Block::new()
                    .with_attribute("name", Attribute::required_string())
                    .with_attribute("value", Attribute::required_int64())
                    .with_attribute("current_usage", Attribute::computed_int64())
                    .with_attribute("default_limit", Attribute::computed_int64())
                    .with_attribute("maximum_limit", Attribute::computed_int64()),
            ),
        );
    for (name, _) in SETTINGS {
        schema = schema.with_attribute(
            name,
            Attribute::optional_computed_bool().with_plan_modifier(PlanModifier::UseStateForUnknown),
        );
    }
    schema
}

fn project_path(id: &str) -> String {
    format!("/groups/{}", segment(id))
}

/// Build state from the API objects.
fn build_state(
    group: Group,
    teams: Vec<TeamRole>,
    limits: Vec<DataFederationLimit>,
    settings: &Value,
    configured_limits: Option<&[String]>,
    carry: &ProjectState,
) -> ProjectState {
    let mut teams: Vec<TeamState> = teams
        .into_iter()
        .map(|t| {
            let mut role_names = t.role_names;
            role_names.sort();
            TeamState {
                team_id: t.team_id,
                role_names,
            }
        })
        .collect();
    teams.sort_by(|a, b| a.team_id.cmp(&b.team_id));

    let limit_state = |l: &DataFederationLimit| LimitState {
        name: l.name.clone(),
        value: l.value,
        current_usage: l.current_usage,
        default_limit: l.default_limit,
        maximum_limit: l.maximum_limit,
    };
    let limits = match configured_limits {
        Some(names) => names
            .iter()
            .filter_map(|name| limits.iter().find(|l| &l.name == name))
            .map(limit_state)
            .collect(),
        None => limits.iter().map(limit_state).collect(),
    };

    let settings = SETTINGS
        .iter()
        .map(|(attr, api)| (attr.to_string(), settings.get(*api).and_then(Value::as_bool)))
        .collect();

    ProjectState {
        id: group.id,
        name: group.name,
        org_id: group.org_id,
        project_owner_id: carry.project_owner_id.clone(),
        with_default_alerts_settings: carry.with_default_alerts_settings.or(Some(true)),
        region_usage_restrictions: group.region_usage_restrictions,
        cluster_count: group.cluster_count,
        created: group.created,
        settings,
        teams,
        limits,
    }
}

/// Read a project and its properties. `None` when the project is gone.
///
/// Only the limits named in `configured_limits` are kept; `None` keeps all.
pub(crate) async fn fetch(
    session: &Session,
    id: &str,
    configured_limits: Option<&[String]>,
    carry: &ProjectState,
) -> Result<Option<ProjectState>, ProviderError> {
    let client = &session.client;
    let path = project_path(id);
    let group: Group = match client.get(&path).await {
        Ok(group) => group,
        Err(err) if err.is_not_found() => return Ok(None),
        Err(err) => return Err(with_context(err, format!("error reading project ({})", id))),
    };

    let teams: Paginated<TeamRole> = client
        .get(&format!("{}/teams", path))
        .await
        .map_err(|e| with_context(e, format!("error getting project's teams assigned ({})", id)))?;
    let limits: Vec<DataFederationLimit> = client
        .get(&format!("{}/limits", path))
        .await
        .map_err(|e| with_context(e, format!("error getting project's limits ({})", id)))?;
    let settings: Value = client
        .get(&format!("{}/settings", path))
        .await
        .map_err(|e| with_context(e, format!("error getting project's settings assigned ({})", id)))?;

    Ok(Some(build_state(
        group,
        teams.results,
        limits,
        &settings,
        configured_limits,
        carry,
    )))
}

async fn set_limits(session: &Session, id: &str, limits: &[&LimitState]) -> Result<(), ProviderError> {
    for limit in limits {
        debug!(project_id = id, limit = %limit.name, value = limit.value, "setting project limit");
        let _: Value = session
            .client
            .patch(
                &format!("{}/limits/{}", project_path(id), segment(&limit.name)),
                &json!({"name": limit.name, "value": limit.value}),
            )
            .await
            .map_err(|e| with_context(e, format!("error setting limit {}", limit.name)))?;
    }
    Ok(())
}

/// Apply the known values of `planned` over the current settings.
///
/// Only settings whose planned value differs from `prior` are sent; with no
/// prior every known planned value is sent. Returns whether a patch was made.
async fn patch_settings(
    session: &Session,
    id: &str,
    planned: &Value,
    prior: Option<&Value>,
) -> Result<bool, ProviderError> {
    let mut changed = Map::new();
    for (attr, api) in SETTINGS {
        let Some(value) = known(planned, attr) else {
            continue;
        };
        if prior.and_then(|p| p.get(attr)) == Some(value) {
            continue;
        }
        changed.insert(api.to_string(), value.clone());
    }
    if changed.is_empty() {
        return Ok(false);
    }

    let path = format!("{}/settings", project_path(id));
    let mut settings: Value = session.client.get(&path).await?;
    match settings.as_object_mut() {
        Some(current) => current.extend(changed),
        None => settings = Value::Object(changed),
    }
    let _: Value = session.client.patch(&path, &settings).await?;
    Ok(true)
}

/// Wait for dependent clusters to finish deleting, then delete the project.
async fn delete_project(session: &Session, id: &str) -> Result<(), ProviderError> {
    let clusters_path = format!("{}/clusters", project_path(id));
    let conf = StateChangeConf::new(
        &[DEPENDENTS_DELETING, DEPENDENTS_RETRY],
        &[DEPENDENTS_IDLE],
        Duration::from_secs(30 * 60),
    )
    .with_delay(Duration::ZERO)
    .with_min_timeout(Duration::from_secs(30));

    let waited = session
        .wait_for_state(&conf, || async {
            let clusters: Paginated<ClusterSummary> = match session.client.get(&clusters_path).await {
                Ok(clusters) => clusters,
                Err(err @ ProviderError::Api(_)) => return Err(err),
                Err(err) => {
                    debug!(project_id = id, error = %err, "retrying dependents check");
                    return Ok(((), DEPENDENTS_RETRY.to_string()));
                }
            };
            let deleting = clusters.total_count.unwrap_or(clusters.results.len() as i64) > 0
                && clusters.results.iter().all(|c| c.state_name == DEPENDENTS_DELETING);
            let state = if deleting { DEPENDENTS_DELETING } else { DEPENDENTS_IDLE };
            Ok(((), state.to_string()))
        })
        .await;
    if let Err(err) = waited {
        info!(project_id = id, error = %err, "could not determine project dependents status");
    }

    match session.client.delete(&project_path(id)).await {
        Err(err) if err.is_not_found() => Ok(()),
        other => other,
    }
}

fn limit_names(limits: &[LimitState]) -> Vec<String> {
    limits.iter().map(|l| l.name.clone()).collect()
}

#[async_trait::async_trait]
impl Resource for ProjectResource {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> Schema {
        schema()
    }

    async fn create(&self, session: &Session, planned: Value) -> Result<Value, ProviderError> {
        let plan: ProjectState = from_state(&planned)?;

        let group = Group {
            name: plan.name.clone(),
            org_id: plan.org_id.clone(),
            region_usage_restrictions: plan.region_usage_restrictions.clone(),
            with_default_alerts_settings: plan.with_default_alerts_settings,
            ..Default::default()
        };
        let path = match plan.project_owner_id.as_deref().filter(|o| !o.is_empty()) {
            Some(owner) => format!("/groups?projectOwnerId={}", segment(owner)),
            None => "/groups".to_string(),
        };
        let created: Group = session
            .client
            .post(&path, &group)
            .await
            .map_err(|e| with_context(e, "error creating project"))?;
        let id = created
            .id
            .ok_or_else(|| ProviderError::Internal("project created without an id".to_string()))?;
        info!(project_id = %id, name = %plan.name, "created project");

        let setup = async {
            if !plan.teams.is_empty() {
                let teams: Vec<TeamRole> = plan.teams.iter().map(TeamRole::from).collect();
                let _: Value = session
                    .client
                    .post(&format!("{}/teams", project_path(&id)), &teams)
                    .await
                    .map_err(|e| with_context(e, "error adding teams into the project"))?;
            }
            let limits: Vec<&LimitState> = plan.limits.iter().collect();
            set_limits(session, &id, &limits)
                .await
                .map_err(|e| with_context(e, "error adding limits into the project"))?;
            patch_settings(session, &id, &planned, None)
                .await
                .map_err(|e| with_context(e, format!("error updating project's settings assigned ({})", id)))?;
            Ok::<(), ProviderError>(())
        };

        if let Err(err) = setup.await {
            warn!(project_id = %id, error = %err, "project setup failed, deleting project");
            if let Err(delete_err) = delete_project(session, &id).await {
                return Err(ProviderError::Internal(format!(
                    "error during project deletion ({}) after setup failed: {}: {}",
                    id, err, delete_err
                )));
            }
            return Err(err);
        }

        let state = fetch(session, &id, Some(limit_names(&plan.limits).as_slice()), &plan)
            .await?
            .ok_or_else(|| ProviderError::NotFound(format!("project {} disappeared after create", id)))?;
        to_state(&state)
    }

    async fn read(&self, session: &Session, state: Value) -> Result<Option<Value>, ProviderError> {
        let current: ProjectState = from_state(&state)?;
        let Some(id) = current.id.clone() else {
            return Ok(None);
        };
        match fetch(session, &id, Some(limit_names(&current.limits).as_slice()), &current).await? {
            Some(refreshed) => Ok(Some(to_state(&refreshed)?)),
            None => {
                warn!(project_id = %id, "project not found, removing from state");
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
        let before: ProjectState = from_state(&prior)?;
        let plan: ProjectState = from_state(&planned)?;
        let id = before
            .id
            .clone()
            .ok_or_else(|| ProviderError::InvalidRequest("prior state has no id".to_string()))?;
        let path = project_path(&id);

        if plan.name != before.name {
            let _: Value = session
                .client
                .patch(&path, &json!({"name": plan.name}))
                .await
                .map_err(|e| with_context(e, format!("error updating the project({})", id)))?;
        }

        let teams = diff_teams(&plan.teams, &before.teams);
        for team in &teams.removed {
            let removed = session
                .client
                .delete(&format!("{}/teams/{}", path, segment(&team.team_id)))
                .await;
            match removed {
                Err(err) if err.error_code() == Some("USER_UNAUTHORIZED") => {
                    warn!(team_id = %team.team_id, project_id = %id, error = %err, "error removing team from the project");
                }
                Err(err) => {
                    return Err(with_context(
                        err,
                        format!("error removing team({}) from the project({})", team.team_id, id),
                    ))
                }
                Ok(()) => {}
            }
        }
        for team in &teams.changed {
            let _: Value = session
                .client
                .patch(
                    &format!("{}/teams/{}", path, segment(&team.team_id)),
                    &json!({"roleNames": team.role_names}),
                )
                .await
                .map_err(|e| with_context(e, format!("error updating role names for the team({})", team.team_id)))?;
        }
        if !teams.added.is_empty() {
            let added: Vec<TeamRole> = teams.added.iter().map(|t| TeamRole::from(*t)).collect();
            let _: Value = session
                .client
                .post(&format!("{}/teams", path), &added)
                .await
                .map_err(|e| with_context(e, "error adding teams to the project"))?;
        }

        let limits = diff_limits(&plan.limits, &before.limits);
        for limit in &limits.removed {
            session
                .client
                .delete(&format!("{}/limits/{}", path, segment(&limit.name)))
                .await
                .map_err(|e| {
                    with_context(e, format!("error removing limit {} from the project({})", limit.name, id))
                })?;
        }
        let to_set: Vec<&LimitState> = limits.changed.iter().chain(&limits.added).copied().collect();
        set_limits(session, &id, &to_set).await?;

        patch_settings(session, &id, &planned, Some(&prior))
            .await
            .map_err(|e| with_context(e, format!("error updating project's settings ({})", id)))?;

        let state = fetch(session, &id, Some(limit_names(&plan.limits).as_slice()), &plan)
            .await?
            .ok_or_else(|| ProviderError::NotFound(format!("project {} disappeared during update", id)))?;
        to_state(&state)
    }

    async fn delete(&self, session: &Session, state: Value) -> Result<(), ProviderError> {
        let current: ProjectState = from_state(&state)?;
        let Some(id) = current.id else {
            return Ok(());
        };
        delete_project(session, &id)
            .await
            .map_err(|e| with_context(e, format!("error deleting project ({})", id)))
    }

    async fn import(&self, session: &Session, id: &str) -> Result<Value, ProviderError> {
        let carry = ProjectState::default();
        let state = fetch(session, id, Some(&[][..]), &carry)
            .await?
            .ok_or_else(|| ProviderError::NotFound(format!("project {} not found", id)))?;
        to_state(&state)
    }
}

/// Teams to add, change and remove.
#[derive(Debug, Default)]
pub(crate) struct TeamChanges<'a> {
    pub added: Vec<&'a TeamState>,
    pub changed: Vec<&'a TeamState>,
    pub removed: Vec<&'a TeamState>,
}

/// Compare planned teams with prior teams by team id.
pub(crate) fn diff_teams<'a>(planned: &'a [TeamState], prior: &'a [TeamState]) -> TeamChanges<'a> {
    let mut changes = TeamChanges::default();
    for before in prior {
        match planned.iter().find(|t| t.team_id == before.team_id) {
            Some(after) => {
                let mut a = after.role_names.clone();
                let mut b = before.role_names.clone();
                a.sort();
                b.sort();
                if a != b {
                    changes.changed.push(after);
                }
            }
            None => changes.removed.push(before),
        }
    }
    changes.added = planned
        .iter()
        .filter(|t| !prior.iter().any(|p| p.team_id == t.team_id))
        .collect();
    changes
}

/// Limits to add, change and remove.
#[derive(Debug, Default)]
pub(crate) struct LimitChanges<'a> {
    pub added: Vec<&'a LimitState>,
    pub changed: Vec<&'a LimitState>,
    pub removed: Vec<&'a LimitState>,
}

/// Compare planned limits with prior limits by name. Only `value` is compared.
pub(crate) fn diff_limits<'a>(planned: &'a [LimitState], prior: &'a [LimitState]) -> LimitChanges<'a> {
    let mut changes = LimitChanges::default();
    for before in prior {
        match planned.iter().find(|l| l.name == before.name) {
            Some(after) if after.value != before.value => changes.changed.push(after),
            Some(_) => {}
            None => changes.removed.push(before),
        }
    }
    changes.added = planned
        .iter()
        .filter(|l| !prior.iter().any(|p| p.name == l.name))
        .collect();
    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::plan_resource;
    use crate::resources::test_support::session;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const ID: &str = "5f1a";

    fn group_json() -> Value {
        json!({
            "id": ID,
            "name": "analytics",
            "orgId": "org1",
            "clusterCount": 0,
            "created": "2024-01-02T03:04:05Z",
            "regionUsageRestrictions": "COMMERCIAL_FEDRAMP_REGIONS_ONLY"
        })
    }

    fn settings_json() -> Value {
        json!({
            "isCollectDatabaseSpecificsStatisticsEnabled": true,
            "isDataExplorerEnabled": true,
            "isExtendedStorageSizesEnabled": false,
            "isPerformanceAdvisorEnabled": true,
            "isRealtimePerformancePanelEnabled": true,
            "isSchemaAdvisorEnabled": true
        })
    }

    async fn mount_reads(server: &MockServer, teams: Value) {
        let base = format!("/api/atlas/v2/groups/{}", ID);
        Mock::given(method("GET"))
            .and(path(base.clone()))
            .respond_with(ResponseTemplate::new(200).set_body_json(group_json()))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("{}/teams", base)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": teams, "totalCount": 1})))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("{}/limits", base)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"name": "atlas.project.deployment.clusters", "value": 10, "currentUsage": 0, "defaultLimit": 25, "maximumLimit": 100},
                {"name": "atlas.project.deployment.nodesPerPrivateLinkRegion", "value": 50, "currentUsage": 0}
            ])))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("{}/settings", base)))
            .respond_with(ResponseTemplate::new(200).set_body_json(settings_json()))
            .mount(server)
            .await;
    }

    fn config() -> Value {
        json!({
            "name": "analytics",
            "org_id": "org1",
            "is_data_explorer_enabled": false,
            "teams": [{"team_id": "t1", "role_names": ["GROUP_OWNER"]}],
            "limits": [{"name": "atlas.project.deployment.clusters", "value": 10}]
        })
    }

    #[test]
    fn test_schema_shape() {
        let schema = schema();
        assert!(schema.block.attributes["org_id"]
            .plan_modifiers
            .contains(&PlanModifier::RequiresReplace));
        assert_eq!(
            schema.block.attributes["with_default_alerts_settings"].default,
            Some(json!(true))
        );
        for (name, _) in SETTINGS {
            assert!(schema.block.attributes[name].flags.optional);
        }
        assert!(schema.block.blocks.contains_key("teams"));
        assert!(schema.block.blocks.contains_key("limits"));
    }

    #[test]
    fn test_diff_teams() {
        let team = |id: &str, roles: &[&str]| TeamState {
            team_id: id.into(),
            role_names: roles.iter().map(|r| r.to_string()).collect(),
        };
        let prior = vec![team("a", &["GROUP_OWNER"]), team("b", &["GROUP_READ_ONLY"]), team("c", &["X", "Y"])];
        let planned = vec![team("b", &["GROUP_OWNER"]), team("c", &["Y", "X"]), team("d", &["GROUP_READ_ONLY"])];

        let changes = diff_teams(&planned, &prior);
        assert_eq!(changes.removed.iter().map(|t| t.team_id.as_str()).collect::<Vec<_>>(), ["a"]);
        assert_eq!(changes.changed.iter().map(|t| t.team_id.as_str()).collect::<Vec<_>>(), ["b"]);
        assert_eq!(changes.added.iter().map(|t| t.team_id.as_str()).collect::<Vec<_>>(), ["d"]);
    }

    #[test]
    fn test_diff_limits() {
        let limit = |name: &str, value: i64| LimitState {
            name: name.into(),
            value,
            current_usage: Some(1),
            default_limit: None,
            maximum_limit: None,
        };
        let prior = vec![limit("a", 1), limit("b", 2)];
        let planned = vec![
            LimitState {
                current_usage: None,
                ..limit("b", 2)
            },
            limit("c", 3),
        ];

        let changes = diff_limits(&planned, &prior);
        assert_eq!(changes.removed.len(), 1);
        assert!(changes.changed.is_empty());
        assert_eq!(changes.added[0].name, "c");
    }

    #[tokio::test]
    async fn test_create_project() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/atlas/v2/groups"))
            .and(query_param("projectOwnerId", "owner1"))
            .and(body_json(json!({"name": "analytics", "orgId": "org1", "withDefaultAlertsSettings": true})))
            .respond_with(ResponseTemplate::new(200).set_body_json(group_json()))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(format!("/api/atlas/v2/groups/{}/teams", ID)))
            .and(body_json(json!([{"teamId": "t1", "roleNames": ["GROUP_OWNER"]}])))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": []})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path(format!("/api/atlas/v2/groups/{}/limits/atlas.project.deployment.clusters", ID)))
            .and(body_json(json!({"name": "atlas.project.deployment.clusters", "value": 10})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;
        let mut patched = settings_json();
        patched["isDataExplorerEnabled"] = json!(false);
        Mock::given(method("PATCH"))
            .and(path(format!("/api/atlas/v2/groups/{}/settings", ID)))
            .and(body_json(patched))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;
        mount_reads(&server, json!([{"teamId": "t1", "roleNames": ["GROUP_OWNER"]}])).await;

        let mut config = config();
        config["project_owner_id"] = json!("owner1");
        let plan = plan_resource(&schema(), None, &config);
        let state = ProjectResource
            .create(&session(&server), plan.planned)
            .await
            .unwrap();

        assert_eq!(state["id"], ID);
        assert_eq!(state["project_owner_id"], "owner1");
        assert_eq!(state["with_default_alerts_settings"], true);
        assert_eq!(state["cluster_count"], 0);
        assert_eq!(state["teams"], json!([{"team_id": "t1", "role_names": ["GROUP_OWNER"]}]));
        let limits = state["limits"].as_array().unwrap();
        assert_eq!(limits.len(), 1);
        assert_eq!(limits[0]["maximum_limit"], 100);
    }

    #[tokio::test]
    async fn test_create_rolls_back_on_team_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/atlas/v2/groups"))
            .respond_with(ResponseTemplate::new(200).set_body_json(group_json()))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(format!("/api/atlas/v2/groups/{}/teams", ID)))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": 404, "errorCode": "TEAM_NOT_FOUND", "detail": "no team t1"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/api/atlas/v2/groups/{}/clusters", ID)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": [], "totalCount": 0})))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path(format!("/api/atlas/v2/groups/{}", ID)))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let plan = plan_resource(&schema(), None, &config());
        let err = ProjectResource
            .create(&session(&server), plan.planned)
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), Some("TEAM_NOT_FOUND"));
        assert!(err.message().contains("error adding teams into the project"));
    }

    #[tokio::test]
    async fn test_read_filters_limits_and_handles_gone() {
        let server = MockServer::start().await;
        mount_reads(&server, json!([{"teamId": "t2", "roleNames": ["GROUP_READ_ONLY", "GROUP_OWNER"]}])).await;

        let prior = json!({
            "id": ID,
            "name": "old",
            "org_id": "org1",
            "with_default_alerts_settings": false,
            "limits": [{"name": "atlas.project.deployment.clusters", "value": 5}]
        });
        let state = ProjectResource
            .read(&session(&server), prior)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(state["name"], "analytics");
        assert_eq!(state["with_default_alerts_settings"], false);
        assert_eq!(state["limits"].as_array().unwrap().len(), 1);
        assert_eq!(state["limits"][0]["value"], 10);
        assert_eq!(state["teams"][0]["role_names"], json!(["GROUP_OWNER", "GROUP_READ_ONLY"]));
        assert_eq!(state["is_extended_storage_sizes_enabled"], false);

        let gone_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/api/atlas/v2/groups/{}", ID)))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": 404, "errorCode": "GROUP_NOT_FOUND", "detail": "gone"
            })))
            .mount(&gone_server)
            .await;
        let gone = ProjectResource
            .read(&session(&gone_server), json!({"id": ID, "name": "x", "org_id": "o"}))
            .await
            .unwrap();
        assert!(gone.is_none());
    }

    #[tokio::test]
    async fn test_update_diffs_teams_limits_and_settings() {
        let server = MockServer::start().await;
        let base = format!("/api/atlas/v2/groups/{}", ID);
        Mock::given(method("PATCH"))
            .and(path(base.clone()))
            .and(body_json(json!({"name": "analytics"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(group_json()))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path(format!("{}/teams/gone", base)))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "error": 403, "errorCode": "USER_UNAUTHORIZED", "detail": "nope"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(format!("{}/teams", base)))
            .and(body_json(json!([{"teamId": "t1", "roleNames": ["GROUP_OWNER"]}])))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path(format!("{}/limits/old.limit", base)))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path(format!("{}/limits/atlas.project.deployment.clusters", base)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path(format!("{}/settings", base)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;
        mount_reads(&server, json!([{"teamId": "t1", "roleNames": ["GROUP_OWNER"]}])).await;

        let mut prior = json!({
            "id": ID,
            "name": "renamed-from",
            "org_id": "org1",
            "with_default_alerts_settings": true,
            "teams": [{"team_id": "gone", "role_names": ["GROUP_OWNER"]}],
            "limits": [
                {"name": "old.limit", "value": 1, "current_usage": 0, "default_limit": null, "maximum_limit": null},
                {"name": "atlas.project.deployment.clusters", "value": 5, "current_usage": 0, "default_limit": 25, "maximum_limit": 100}
            ]
        });
        for (name, _) in SETTINGS {
            prior[name] = json!(true);
        }
        let plan = plan_resource(&schema(), Some(&prior), &config());
        assert!(!plan.requires_replace());

        let state = ProjectResource
            .update(&session(&server), prior, plan.planned)
            .await
            .unwrap();
        assert_eq!(state["name"], "analytics");
    }

    #[tokio::test]
    async fn test_delete_waits_for_deleting_clusters() {
        let server = MockServer::start().await;
        let polls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&polls);
        Mock::given(method("GET"))
            .and(path(format!("/api/atlas/v2/groups/{}/clusters", ID)))
            .respond_with(move |_: &wiremock::Request| {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    ResponseTemplate::new(200).set_body_json(json!({
                        "results": [{"name": "c1", "stateName": "DELETING"}],
                        "totalCount": 1
                    }))
                } else {
                    ResponseTemplate::new(200).set_body_json(json!({"results": [], "totalCount": 0}))
                }
            })
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path(format!("/api/atlas/v2/groups/{}", ID)))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        ProjectResource
            .delete(&session(&server), json!({"id": ID, "name": "p", "org_id": "o"}))
            .await
            .unwrap();
        assert_eq!(polls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_import_by_id() {
        let server = MockServer::start().await;
        mount_reads(&server, json!([])).await;

        let state = ProjectResource.import(&session(&server), ID).await.unwrap();
        assert_eq!(state["id"], ID);
        assert_eq!(state["org_id"], "org1");
        assert_eq!(state["limits"], json!([]));
        assert_eq!(state["with_default_alerts_settings"], true);
    }

    #[test]
    fn test_plan_keeps_settings_from_state() {
        let mut prior = json!({
            "id": ID,
            "name": "analytics",
            "org_id": "org1",
            "with_default_alerts_settings": true,
            "cluster_count": 0,
            "created": "2024",
            "region_usage_restrictions": null,
            "project_owner_id": null,
            "teams": [],
            "limits": []
        });
        for (name, _) in SETTINGS {
            prior[name] = json!(true);
        }
        let plan = plan_resource(&schema(), Some(&prior), &json!({"name": "renamed", "org_id": "org1"}));
        assert_eq!(plan.planned_attr("is_schema_advisor_enabled"), &json!(true));
        assert_eq!(plan.planned_attr("id"), &json!(ID));
        assert_eq!(plan.planned_attr("cluster_count"), &json!(0));
        assert!(crate::plan::is_unknown(plan.planned_attr("region_usage_restrictions")));
    }
}
