//! The Atlas provider: routes protocol calls to resources and data sources.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::client::{AtlasClient, UserAgentExtra};
use crate::config::{provider_schema, resolve, NoAwsSecrets, ProviderConfig, SecretsSource, Vars};
use crate::data_sources::{self, DataSource};
use crate::error::ProviderError;
use crate::plan::{plan_destroy, plan_resource};
use crate::resources::{self, Resource, Session};
use crate::schema::{has_errors, Diagnostic, ProviderSchema};
use crate::server::ProviderService;
use crate::types::{ImportedResource, PlanResult, ProviderMetadata, ServerCapabilities};
use crate::validation::validate;

const TYPE_PREFIX: &str = "mongodbatlas_";

/// MongoDB Atlas provider.
///
/// Holds no session until `Configure` succeeds. Resource and data source
/// calls made before that fail with [`ProviderError::NotConfigured`].
pub struct AtlasProvider {
    resources: BTreeMap<&'static str, Arc<dyn Resource>>,
    data_sources: BTreeMap<&'static str, Arc<dyn DataSource>>,
    session: RwLock<Option<Session>>,
    env: Vars,
    secrets: Arc<dyn SecretsSource>,
}

impl Default for AtlasProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl AtlasProvider {
    /// A provider reading fallbacks from the process environment.
    pub fn new() -> Self {
        Self::with_env(Vars::from_env())
    }

    /// A provider with explicit environment fallbacks.
    pub fn with_env(env: Vars) -> Self {
        Self {
            resources: resources::all()
                .into_iter()
                .map(|r| (r.type_name(), r))
                .collect(),
            data_sources: data_sources::all()
                .into_iter()
                .map(|d| (d.type_name(), d))
                .collect(),
            session: RwLock::new(None),
            env,
            secrets: Arc::new(NoAwsSecrets),
        }
    }

    /// Replace the source used for `assume_role` credentials.
    pub fn with_secrets(mut self, secrets: Arc<dyn SecretsSource>) -> Self {
        self.secrets = secrets;
        self
    }

    /// Start out configured with `session`.
    pub fn with_session(self, session: Session) -> Self {
        Self {
            session: RwLock::new(Some(session)),
            ..self
        }
    }

    fn resource(&self, type_name: &str) -> Result<&Arc<dyn Resource>, ProviderError> {
        self.resources.get(type_name).ok_or_else(|| {
            ProviderError::UnknownResource(format!("Unknown resource type: {}", type_name))
        })
    }

    fn data_source(&self, type_name: &str) -> Result<&Arc<dyn DataSource>, ProviderError> {
        self.data_sources.get(type_name).ok_or_else(|| {
            ProviderError::UnknownResource(format!("Unknown data source type: {}", type_name))
        })
    }

    async fn session(&self, extra: &UserAgentExtra) -> Result<Session, ProviderError> {
        self.session
            .read()
            .await
            .as_ref()
            .map(|s| s.scoped(extra))
            .ok_or_else(|| {
                ProviderError::NotConfigured(
                    "the provider must be configured before managing resources".to_string(),
                )
            })
    }

    async fn resource_session(
        &self,
        type_name: &str,
        operation: &str,
    ) -> Result<Session, ProviderError> {
        let name = type_name.strip_prefix(TYPE_PREFIX).unwrap_or(type_name);
        self.session(&UserAgentExtra::resource(name, operation)).await
    }
}

#[async_trait::async_trait]
impl ProviderService for AtlasProvider {
    fn schema(&self) -> ProviderSchema {
        let schema = ProviderSchema::new().with_provider_config(provider_schema());
        let schema = self
            .resources
            .iter()
            .fold(schema, |s, (name, r)| s.with_resource(*name, r.schema()));
        self.data_sources
            .iter()
            .fold(schema, |s, (name, d)| s.with_data_source(*name, d.schema()))
    }

    fn metadata(&self) -> ProviderMetadata {
        ProviderMetadata {
            resources: self.resources.keys().map(|k| k.to_string()).collect(),
            data_sources: self.data_sources.keys().map(|k| k.to_string()).collect(),
            capabilities: ServerCapabilities { plan_destroy: true },
        }
    }

    async fn validate_provider_config(
        &self,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        Ok(validate(&provider_schema(), &config))
    }

    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        let config = ProviderConfig::from_value(config)?;
        let (resolved, diagnostics) = resolve(&config, &self.env, self.secrets.as_ref()).await?;
        if has_errors(&diagnostics) {
            return Ok(diagnostics);
        }

        let client = AtlasClient::new(&resolved.base_url, &resolved.credentials)?;
        info!(
            base_url = %resolved.base_url,
            auth_method = ?resolved.credentials.auth_method(),
            "Provider configured"
        );
        *self.session.write().await = Some(Session::new(client));
        Ok(diagnostics)
    }

    async fn stop(&self) -> Result<(), ProviderError> {
        self.session.write().await.take();
        Ok(())
    }

    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let resource = self.resource(resource_type)?;
        let mut diagnostics = validate(&resource.schema(), &config);
        diagnostics.extend(resource.validate(&config));
        Ok(diagnostics)
    }

    async fn plan(
        &self,
        resource_type: &str,
        prior_state: Option<Value>,
        _proposed_state: Value,
        config: Value,
    ) -> Result<PlanResult, ProviderError> {
        let resource = self.resource(resource_type)?;
        let prior = prior_state.filter(|p| !p.is_null());

        if config.is_null() {
            debug!(resource_type, "Planning destroy");
            return Ok(plan_destroy(prior.as_ref().unwrap_or(&Value::Null)));
        }

        let mut plan = plan_resource(&resource.schema(), prior.as_ref(), &config);
        resource.modify_plan(&mut plan);
        Ok(plan.into_result())
    }

    async fn create(&self, resource_type: &str, planned_state: Value) -> Result<Value, ProviderError> {
        let resource = self.resource(resource_type)?;
        let session = self.resource_session(resource_type, "create").await?;
        resource.create(&session, planned_state).await
    }

    async fn read(&self, resource_type: &str, current_state: Value) -> Result<Value, ProviderError> {
        let resource = self.resource(resource_type)?;
        let session = self.resource_session(resource_type, "read").await?;
        match resource.read(&session, current_state).await? {
            Some(state) => Ok(state),
            None => {
                info!(resource_type, "Resource no longer exists, removing from state");
                Ok(Value::Null)
            }
        }
    }

    async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        let resource = self.resource(resource_type)?;
        let session = self.resource_session(resource_type, "update").await?;
        resource.update(&session, prior_state, planned_state).await
    }

    async fn delete(&self, resource_type: &str, current_state: Value) -> Result<(), ProviderError> {
        let resource = self.resource(resource_type)?;
        let session = self.resource_session(resource_type, "delete").await?;
        resource.delete(&session, current_state).await
    }

    async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        let resource = self.resource(resource_type)?;
        let session = self.resource_session(resource_type, "import").await?;
        let state = resource.import(&session, id).await?;
        Ok(vec![ImportedResource::new(resource_type, state)])
    }

    async fn validate_data_source_config(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let data_source = self.data_source(data_source_type)?;
        let mut diagnostics = validate(&data_source.schema(), &config);
        diagnostics.extend(data_source.validate(&config));
        Ok(diagnostics)
    }

    async fn read_data_source(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Value, ProviderError> {
        let data_source = self.data_source(data_source_type)?;
        let name = data_source_type
            .strip_prefix(TYPE_PREFIX)
            .unwrap_or(data_source_type);
        let session = self.session(&UserAgentExtra::data_source(name)).await?;
        data_source.read(&session, config).await
    }
}
