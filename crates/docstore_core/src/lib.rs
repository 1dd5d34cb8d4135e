//! Core of the namespaced document store.
//! Owns option evaluation, authorization filtering and document persistence.

pub mod api;
pub mod auth;
pub mod config;
pub mod context;
pub mod db;
pub mod index;
pub mod logging;
pub mod model;
pub mod query;
pub mod store;

pub use api::{ApiError, ApiRequest, ApiResponse, ApiResult, DocumentHandler, Method};
pub use auth::{Action, AuthorizationContext, Authorizer, Permission, PermissionAuthorizer};
pub use config::{ConfigError, StoreConfig};
pub use context::{CancelHandle, CancelReason, ExecContext};
pub use index::{DocumentIndex, IndexScope, SqliteDocumentIndex, SqliteOrganizationRegistry};
pub use logging::{default_log_level, init_logging, parse_level, LoggingError};
pub use model::document::{Document, DocumentId, DocumentMeta, Label, LabelId};
pub use model::namespace::{Namespace, NamespaceError};
pub use model::org::{OrgId, OrgRef, Organization};
pub use query::decorator::{DocumentDecorator, Field, Projection};
pub use query::evaluate::{evaluate, validate_query_options, EvalScope, Evaluation};
pub use query::option::{DocumentOption, DocumentOrder, Predicate};
pub use store::document_store::DocumentStore;
pub use store::service::{DocumentService, SqliteDocumentStore};
pub use store::{StoreError, StoreResult};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
