//! Managed resources.
//!
//! Every resource implements [`Resource`]. The provider routes protocol calls
//! to the implementation registered under the requested type name and hands it
//! a [`Session`] scoped to the operation.

pub mod cluster;
pub mod network_container;
pub mod project;
pub mod project_ip_access_list;

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::client::{self, AtlasClient, Pacing, StateChangeConf, UserAgentExtra};
use crate::error::ProviderError;
use crate::mutexkv::MutexKV;
use crate::plan::{is_unknown, strip_unknowns, ResourcePlan};
use crate::schema::{Diagnostic, Schema};

/// Everything an operation needs to talk to the API.
#[derive(Debug, Clone)]
pub struct Session {
    /// API client, scoped to the operation.
    pub client: AtlasClient,
    /// Locks shared by every operation of this provider instance.
    pub locks: Arc<MutexKV>,
    /// Caps on waiter sleeps.
    pub pacing: Pacing,
}

impl Session {
    /// A session with fresh locks and default pacing.
    pub fn new(client: AtlasClient) -> Self {
        Self {
            client,
            locks: Arc::new(MutexKV::new()),
            pacing: Pacing::default(),
        }
    }

    /// Replace the pacing.
    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    /// A session whose requests carry `extra` in their User-Agent.
    pub fn scoped(&self, extra: &UserAgentExtra) -> Self {
        Self {
            client: self.client.scoped(extra),
            locks: Arc::clone(&self.locks),
            pacing: self.pacing,
        }
    }

    /// [`client::wait_for_state`] with this session's pacing.
    pub async fn wait_for_state<T, F, Fut>(
        &self,
        conf: &StateChangeConf<'_>,
        refresh: F,
    ) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<(T, String), ProviderError>>,
    {
        client::wait_for_state(conf, self.pacing, refresh).await
    }

    /// [`client::retry_while`] with this session's pacing.
    pub async fn retry_while<T, F, Fut, P>(
        &self,
        timeout: Duration,
        interval: Duration,
        op: F,
        should_retry: P,
    ) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, ProviderError>>,
        P: Fn(&ProviderError) -> bool,
    {
        client::retry_while(timeout, interval, self.pacing, op, should_retry).await
    }
}

/// A managed resource type.
#[async_trait::async_trait]
pub trait Resource: Send + Sync {
    /// Type name, e.g. `mongodbatlas_project`.
    fn type_name(&self) -> &'static str;

    /// Schema of the resource.
    fn schema(&self) -> Schema;

    /// Checks that span several attributes. Runs after schema validation.
    fn validate(&self, _config: &Value) -> Vec<Diagnostic> {
        Vec::new()
    }

    /// Adjust the plan computed from the schema.
    fn modify_plan(&self, _plan: &mut ResourcePlan) {}

    /// Create the remote object and return its state.
    async fn create(&self, session: &Session, planned: Value) -> Result<Value, ProviderError>;

    /// Refresh `state`. `None` means the object is gone.
    async fn read(&self, session: &Session, state: Value) -> Result<Option<Value>, ProviderError>;

    /// Apply `planned` over `prior` and return the new state.
    async fn update(
        &self,
        session: &Session,
        prior: Value,
        planned: Value,
    ) -> Result<Value, ProviderError>;

    /// Delete the remote object.
    async fn delete(&self, session: &Session, state: Value) -> Result<(), ProviderError>;

    /// Build state for an existing object from an import id.
    async fn import(&self, session: &Session, id: &str) -> Result<Value, ProviderError>;
}

/// All resources served by this provider.
pub fn all() -> Vec<Arc<dyn Resource>> {
    vec![
        Arc::new(project::ProjectResource),
        Arc::new(project_ip_access_list::ProjectIpAccessListResource),
        Arc::new(network_container::NetworkContainerResource),
        Arc::new(cluster::ClusterResource),
    ]
}

/// Deserialize state into a model, treating unknowns as unset.
pub fn from_state<T: DeserializeOwned>(value: &Value) -> Result<T, ProviderError> {
    Ok(serde_json::from_value(strip_unknowns(value.clone()))?)
}

/// Serialize a model into state.
pub fn to_state<T: Serialize>(model: &T) -> Result<Value, ProviderError> {
    Ok(serde_json::to_value(model)?)
}

/// The attribute `key` of `value` when it is set and known.
pub fn known<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    value
        .get(key)
        .filter(|v| !v.is_null() && !is_unknown(v))
}

/// Percent-encode a value for use as one path segment.
pub fn segment(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

/// Attach `context` to an error while keeping its kind.
pub fn with_context(err: ProviderError, context: impl std::fmt::Display) -> ProviderError {
    match err {
        ProviderError::Api(mut api) => {
            api.detail = format!("{}: {}", context, api.detail);
            ProviderError::Api(api)
        }
        ProviderError::NotFound(msg) => ProviderError::NotFound(format!("{}: {}", context, msg)),
        ProviderError::DeadlineExceeded(msg) => {
            ProviderError::DeadlineExceeded(format!("{}: {}", context, msg))
        }
        ProviderError::FailedPrecondition(msg) => {
            ProviderError::FailedPrecondition(format!("{}: {}", context, msg))
        }
        other => ProviderError::Internal(format!("{}: {}", context, other)),
    }
}
