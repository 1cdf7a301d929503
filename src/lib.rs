//! Hemmer provider for MongoDB Atlas.
//!
//! The provider manages Atlas projects, project IP access lists, network
//! peering containers and clusters, and offers a data source for each. It is
//! a plugin binary: the host starts it, reads the handshake line from stdout
//! and talks to it over gRPC.
//!
//! # Handshake
//!
//! ```text
//! HEMMER_PROVIDER|1|127.0.0.1:50051
//! ```
//!
//! Format: `HEMMER_PROVIDER|<protocol_version>|<address>`.
//!
//! # Layout
//!
//! - [`server`]: the protocol as [`ProviderService`] and the gRPC server.
//! - [`provider`]: [`AtlasProvider`], which routes calls to resources and
//!   data sources.
//! - [`schema`], [`validation`], [`validators`]: schemas and config checks.
//! - [`plan`]: planning and plan modifiers.
//! - [`resources`], [`data_sources`]: the Atlas objects.
//! - [`client`]: the Atlas Administration API client and state waiters.
//! - [`config`]: provider block and credential resolution.
//!
//! Every failure reaches the host as a diagnostic on the response.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod config;
pub mod data_sources;
pub mod error;
pub mod logging;
pub mod mutexkv;
pub mod plan;
pub mod provider;
pub mod resources;
pub mod schema;
pub mod server;
pub mod state_id;
pub mod testing;
pub mod types;
pub mod validation;
pub mod validators;

#[allow(missing_docs)]
#[allow(clippy::all)]
pub mod generated;

pub use error::{ApiError, ProviderError};
pub use logging::{init_logging, init_logging_with_default};
pub use provider::AtlasProvider;
pub use schema::{Diagnostic, ProviderSchema};
pub use server::{serve, serve_on, serve_with_options, ProviderService, ServeOptions};
pub use types::{
    AttributeChange, ImportedResource, PlanResult, ProviderMetadata, ServerCapabilities,
    HANDSHAKE_PREFIX, PROTOCOL_VERSION,
};
pub use validation::{validate, validate_result};
