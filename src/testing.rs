//! Drive a [`ProviderService`] the way the host does, without gRPC.
//!
//! ```ignore
//! use hemmer_provider_atlas::testing::ProviderTester;
//! use hemmer_provider_atlas::AtlasProvider;
//!
//! let tester = ProviderTester::new(AtlasProvider::new().with_session(session));
//! let state = tester
//!     .lifecycle_create("mongodbatlas_project_ip_access_list", config)
//!     .await?;
//! ```

use serde_json::Value;
use thiserror::Error;

use crate::error::ProviderError;
use crate::schema::{has_errors, Diagnostic, DiagnosticSeverity};
use crate::server::ProviderService;
use crate::types::{ImportedResource, PlanResult};

/// A failed step of a tester run.
#[derive(Debug, Error)]
pub enum TestError {
    /// Validation or configuration returned error diagnostics.
    #[error("{} error diagnostic(s): {}", .0.len(), summarize(.0))]
    Diagnostics(Vec<Diagnostic>),
    /// The provider returned an error.
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),
}

fn summarize(diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .map(|d| match &d.detail {
            Some(detail) => format!("{}: {}", d.summary, detail),
            None => d.summary.clone(),
        })
        .collect::<Vec<_>>()
        .join("; ")
}

fn check_diagnostics(diagnostics: Vec<Diagnostic>) -> Result<Vec<Diagnostic>, TestError> {
    if has_errors(&diagnostics) {
        Err(TestError::Diagnostics(
            diagnostics.into_iter().filter(Diagnostic::is_error).collect(),
        ))
    } else {
        Ok(diagnostics)
    }
}

/// Wraps a provider and runs the host's call sequences against it.
pub struct ProviderTester<P: ProviderService> {
    provider: P,
}

impl<P: ProviderService> ProviderTester<P> {
    /// Wrap `provider`.
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// The wrapped provider.
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Configure the provider. Returns the warnings on success.
    pub async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, TestError> {
        let diagnostics = self.provider.validate_provider_config(config.clone()).await?;
        check_diagnostics(diagnostics)?;
        check_diagnostics(self.provider.configure(config).await?)
    }

    /// Validate a resource configuration. Returns the warnings on success.
    pub async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, TestError> {
        check_diagnostics(
            self.provider
                .validate_resource_config(resource_type, config)
                .await?,
        )
    }

    /// Plan a new resource from `config`.
    pub async fn plan_create(&self, resource_type: &str, config: Value) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(resource_type, None, config.clone(), config)
            .await
    }

    /// Plan `prior` towards `config`.
    pub async fn plan_update(
        &self,
        resource_type: &str,
        prior: Value,
        config: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(resource_type, Some(prior), config.clone(), config)
            .await
    }

    /// Plan the destruction of `prior`.
    pub async fn plan_delete(&self, resource_type: &str, prior: Value) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(resource_type, Some(prior), Value::Null, Value::Null)
            .await
    }

    /// Refresh a resource.
    pub async fn read(&self, resource_type: &str, state: Value) -> Result<Value, ProviderError> {
        self.provider.read(resource_type, state).await
    }

    /// Import a resource by id.
    pub async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        self.provider.import_resource(resource_type, id).await
    }

    /// Validate then read a data source.
    pub async fn read_data_source(&self, data_source_type: &str, config: Value) -> Result<Value, TestError> {
        check_diagnostics(
            self.provider
                .validate_data_source_config(data_source_type, config.clone())
                .await?,
        )?;
        Ok(self.provider.read_data_source(data_source_type, config).await?)
    }

    /// Validate, plan, create and read back a resource.
    pub async fn lifecycle_create(&self, resource_type: &str, config: Value) -> Result<Value, TestError> {
        self.validate_resource_config(resource_type, config.clone())
            .await?;
        let plan = self.plan_create(resource_type, config).await?;
        check_diagnostics(plan.diagnostics)?;
        let created = self.provider.create(resource_type, plan.planned_state).await?;
        Ok(self.read(resource_type, created).await?)
    }

    /// Plan and apply an in-place update, then read back.
    pub async fn lifecycle_update(
        &self,
        resource_type: &str,
        prior: Value,
        config: Value,
    ) -> Result<Value, TestError> {
        self.validate_resource_config(resource_type, config.clone())
            .await?;
        let plan = self.plan_update(resource_type, prior.clone(), config).await?;
        assert_plan_updates_in_place(&plan);
        check_diagnostics(plan.diagnostics)?;
        let updated = self
            .provider
            .update(resource_type, prior, plan.planned_state)
            .await?;
        Ok(self.read(resource_type, updated).await?)
    }

    /// Plan the destruction of `state` and delete it.
    pub async fn lifecycle_delete(&self, resource_type: &str, state: Value) -> Result<(), TestError> {
        let plan = self.plan_delete(resource_type, state.clone()).await?;
        check_diagnostics(plan.diagnostics)?;
        Ok(self.provider.delete(resource_type, state).await?)
    }
}

/// Panics unless the plan replaces the resource because of `path`.
pub fn assert_plan_replaces(plan: &PlanResult, path: &str) {
    assert!(plan.requires_replace, "expected a replacement plan");
    assert!(
        plan.replace_paths.iter().any(|p| p == path),
        "expected {} to force replacement, got {:?}",
        path,
        plan.replace_paths
    );
}

/// Panics if the plan replaces the resource.
pub fn assert_plan_updates_in_place(plan: &PlanResult) {
    assert!(
        !plan.requires_replace,
        "expected an in-place update, replacement forced by {:?}",
        plan.replace_paths
    );
}

/// Panics unless the plan changes `path`.
pub fn assert_plan_changes_attribute(plan: &PlanResult, path: &str) {
    assert!(
        plan.changes.iter().any(|c| c.path == path),
        "expected a change to {}, changed: {:?}",
        path,
        plan.changes.iter().map(|c| &c.path).collect::<Vec<_>>()
    );
}

/// Panics unless some error diagnostic mentions `text` in its summary or detail.
pub fn assert_error_contains(diagnostics: &[Diagnostic], text: &str) {
    let found = diagnostics.iter().any(|d| {
        d.severity == DiagnosticSeverity::Error
            && (d.summary.contains(text) || d.detail.as_deref().is_some_and(|s| s.contains(text)))
    });
    assert!(found, "no error mentions {:?}: {}", text, summarize(diagnostics));
}
