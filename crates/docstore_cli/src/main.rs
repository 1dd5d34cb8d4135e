//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `docstore_core` linkage.
//! - Run one create/find round trip against the configured database.
//!
//! Reads `DOCSTORE_*` variables; defaults to an in-memory database.

use docstore_core::db::open_db_with_config;
use docstore_core::{
    AuthorizationContext, Document, DocumentOption, DocumentService, ExecContext,
    PermissionAuthorizer, SqliteOrganizationRegistry, StoreConfig,
};
use serde_json::json;
use std::error::Error;

const PROBE_NAMESPACE: &str = "smoke";

fn main() -> Result<(), Box<dyn Error>> {
    println!("docstore_core ping={}", docstore_core::ping());
    println!("docstore_core version={}", docstore_core::core_version());

    let config = StoreConfig::from_env()?;
    config.init_logging()?;
    let conn = open_db_with_config(&config)?;

    let registry = SqliteOrganizationRegistry::new(&conn);
    let org = match registry.find_organization_by_name("smoke-org")? {
        Some(org) => org,
        None => registry.create_organization("smoke-org")?,
    };

    let service = DocumentService::new(PermissionAuthorizer);
    let store = service.create_document_store(&conn, PROBE_NAMESPACE)?;
    let exec = ExecContext::background();
    let auth = AuthorizationContext::org_member("smoke", org.id);

    let mut document = Document::new("probe", json!({"probe": true}));
    store.create_document(
        &exec,
        &auth,
        &mut document,
        &[
            DocumentOption::with_org_id(org.id),
            DocumentOption::with_label("smoke"),
        ],
    )?;

    let found = store.find_document(
        &exec,
        &auth,
        &[
            DocumentOption::authorized_where_id(document.id),
            DocumentOption::include_content(),
            DocumentOption::include_labels(),
        ],
    )?;
    println!("docstore_core round_trip={}", serde_json::to_string(&found)?);
    Ok(())
}
