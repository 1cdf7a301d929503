//! Data sources.
//!
//! Data sources look up existing objects. They share fetch and state
//! conversion code with the matching resource.

pub mod cluster;
pub mod network_container;
pub mod project;
pub mod project_ip_access_list;

use std::sync::Arc;

use serde_json::Value;

use crate::error::ProviderError;
use crate::resources::Session;
use crate::schema::{Attribute, AttributeFlags, Diagnostic, Schema};

/// A data source type.
#[async_trait::async_trait]
pub trait DataSource: Send + Sync {
    /// Type name, e.g. `mongodbatlas_project`.
    fn type_name(&self) -> &'static str;

    /// Schema of the data source.
    fn schema(&self) -> Schema;

    /// Checks that span several attributes. Runs after schema validation.
    fn validate(&self, _config: &Value) -> Vec<Diagnostic> {
        Vec::new()
    }

    /// Look up the object described by `config`.
    async fn read(&self, session: &Session, config: Value) -> Result<Value, ProviderError>;
}

/// All data sources served by this provider.
pub fn all() -> Vec<Arc<dyn DataSource>> {
    vec![
        Arc::new(project::ProjectDataSource),
        Arc::new(project_ip_access_list::ProjectIpAccessListDataSource),
        Arc::new(network_container::NetworkContainerDataSource),
        Arc::new(cluster::ClusterDataSource),
    ]
}

/// A read-only copy of a resource schema: `lookup` attributes become
/// required, everything else computed.
pub fn read_only(resource: Schema, lookup: &[&str]) -> Schema {
    let mut schema = Schema::new(resource.version);
    for (name, attr) in resource.block.attributes {
        let flags = if lookup.contains(&name.as_str()) {
            AttributeFlags::required()
        } else {
            AttributeFlags::computed()
        };
        schema = schema.with_attribute(name, Attribute::new(attr.attr_type, flags));
    }
    schema
}

/// Overwrite `key` in a state object.
pub(crate) fn set_attr(state: &mut Value, key: &str, value: Value) {
    if let Some(map) = state.as_object_mut() {
        map.insert(key.to_string(), value);
    }
}
