//! Index contract consumed by the store, plus the SQLite implementation.
//!
//! # Responsibility
//! - Define the primitives the evaluator and store need from a backend.
//! - Keep backend details out of option evaluation and orchestration.
//!
//! # Invariants
//! - An index instance is bound to exactly one namespace.
//! - Only live (non-deleted) documents are ever resolved or loaded.
//! - Each `insert`/`replace`/`delete` call is atomic; a failed or cancelled
//!   call leaves no partial effect visible.

use crate::context::ExecContext;
use crate::model::document::{Document, DocumentId, Label};
use crate::model::namespace::Namespace;
use crate::model::org::OrgId;
use crate::query::decorator::Projection;
use crate::store::StoreResult;
use std::collections::BTreeSet;

pub mod org_registry;
pub mod sqlite;

pub use org_registry::SqliteOrganizationRegistry;
pub use sqlite::SqliteDocumentIndex;

/// Resolved lookup scope handed to `DocumentIndex::resolve`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexScope {
    Org(OrgId),
    Document(DocumentId),
    Label(String),
}

/// Storage primitives over one namespace's documents.
pub trait DocumentIndex {
    /// Namespace this index is bound to.
    fn namespace(&self) -> &Namespace;

    /// Resolves one scope into the IDs of matching live documents.
    fn resolve(&self, exec: &ExecContext, scope: &IndexScope) -> StoreResult<BTreeSet<DocumentId>>;

    /// Looks up an organization by its unique name.
    fn find_org_by_name(&self, exec: &ExecContext, name: &str) -> StoreResult<Option<OrgId>>;

    /// Returns whether the organization is registered.
    fn org_exists(&self, exec: &ExecContext, org: OrgId) -> StoreResult<bool>;

    /// Returns the stored owning organization of one live document.
    fn document_owner(&self, exec: &ExecContext, id: DocumentId) -> StoreResult<Option<OrgId>>;

    /// Persists a new document with its owner and labels in one atomic step.
    ///
    /// Fails with `InvalidRequest` when the ID is already taken, including by
    /// a deleted document. Returns the attached labels in input order.
    fn insert(
        &self,
        exec: &ExecContext,
        document: &Document,
        owner: OrgId,
        labels: &[String],
    ) -> StoreResult<Vec<Label>>;

    /// Replaces metadata and content of a live document, and its label set
    /// when `labels` is given.
    fn replace(
        &self,
        exec: &ExecContext,
        document: &Document,
        labels: Option<&[String]>,
    ) -> StoreResult<()>;

    /// Tombstones every listed live document; returns how many were deleted.
    fn delete(&self, exec: &ExecContext, ids: &BTreeSet<DocumentId>) -> StoreResult<usize>;

    /// Loads live documents, populating only the projected optional fields.
    fn load(
        &self,
        exec: &ExecContext,
        ids: &BTreeSet<DocumentId>,
        projection: &Projection,
    ) -> StoreResult<Vec<Document>>;
}
