//! Document CRUD over one namespace.
//!
//! # Responsibility
//! - Turn option lists into index calls through the evaluator.
//! - Resolve and authorize document ownership on create.
//! - Enforce the exactly-one contract for get, update and single delete.
//!
//! # Invariants
//! - Finds check `Read`; update and delete check `Write`.
//! - Update targets are authorized against the stored owner, never a
//!   caller-supplied org.
//! - Unknown and unauthorized organizations both surface as `NotFound`.

use crate::auth::{Action, AuthorizationContext, Authorizer, Permission};
use crate::context::ExecContext;
use crate::index::DocumentIndex;
use crate::logging::elapsed_ms;
use crate::model::document::{normalize_label_names, Document, DocumentId};
use crate::model::namespace::Namespace;
use crate::model::org::{OrgId, OrgRef};
use crate::query::decorator::Projection;
use crate::query::evaluate::{evaluate, EvalScope, Evaluation};
use crate::query::option::{DocumentOption, DocumentOrder};
use crate::store::{StoreError, StoreResult};
use log::{debug, error, info, warn};
use std::collections::BTreeSet;
use std::time::Instant;
use uuid::Uuid;

const OWNER_REQUIRED: &str = "provide exactly one of org or orgID";

/// Namespace-scoped document store.
pub struct DocumentStore<I, A> {
    index: I,
    authorizer: A,
}

impl<I: DocumentIndex, A: Authorizer> DocumentStore<I, A> {
    pub fn new(index: I, authorizer: A) -> Self {
        Self { index, authorizer }
    }

    pub fn namespace(&self) -> &Namespace {
        self.index.namespace()
    }

    pub fn index(&self) -> &I {
        &self.index
    }

    /// Creates `document` owned by the single `WithOrg` scope.
    ///
    /// Assigns a fresh ID when `document.id` is nil and sets
    /// `document.labels` to the attached labels. On failure the document is
    /// left as it was passed in.
    pub fn create_document(
        &self,
        exec: &ExecContext,
        auth: &AuthorizationContext,
        document: &mut Document,
        options: &[DocumentOption],
    ) -> StoreResult<()> {
        self.observe("create", || self.create_inner(exec, auth, document, options))
    }

    /// Returns every document matching `options` that the caller may read.
    ///
    /// Order is by ID unless an `OrderBy` option is supplied.
    pub fn find_documents(
        &self,
        exec: &ExecContext,
        auth: &AuthorizationContext,
        options: &[DocumentOption],
    ) -> StoreResult<Vec<Document>> {
        self.observe("find_many", || {
            let mut projection = Projection::default();
            let evaluation = self.evaluate(exec, auth, Action::Read, &mut projection, options)?;
            if evaluation.ids.is_empty() {
                return Ok(Vec::new());
            }
            let mut documents = self.index.load(exec, &evaluation.ids, &projection)?;
            if let Some(order) = evaluation.order {
                sort_documents(&mut documents, order);
            }
            Ok(documents)
        })
    }

    /// Returns the one document matching `options`.
    pub fn find_document(
        &self,
        exec: &ExecContext,
        auth: &AuthorizationContext,
        options: &[DocumentOption],
    ) -> StoreResult<Document> {
        self.observe("find_one", || {
            let mut projection = Projection::default();
            let evaluation = self.evaluate(exec, auth, Action::Read, &mut projection, options)?;
            let id = expect_single(&evaluation.ids, "find")?;
            self.index
                .load(exec, &BTreeSet::from([id]), &projection)?
                .into_iter()
                .next()
                .ok_or_else(|| StoreError::NotFound(format!("document not found: {id}")))
        })
    }

    /// Replaces metadata and content of an existing document.
    ///
    /// Only `WithLabel` options are accepted; when at least one is given the
    /// label set is replaced, otherwise labels are left untouched.
    pub fn update_document(
        &self,
        exec: &ExecContext,
        auth: &AuthorizationContext,
        document: &Document,
        options: &[DocumentOption],
    ) -> StoreResult<()> {
        self.observe("update", || {
            if !document.has_id() {
                return Err(StoreError::InvalidRequest(
                    "document id is required for update".to_string(),
                ));
            }

            let mut raw_labels: Option<Vec<&str>> = None;
            for option in options {
                match option {
                    DocumentOption::WithLabel(name) => {
                        raw_labels.get_or_insert_with(Vec::new).push(name.as_str())
                    }
                    other => {
                        return Err(StoreError::InvalidRequest(format!(
                            "`{}` option is not valid when updating documents",
                            other.kind()
                        )))
                    }
                }
            }
            let labels = raw_labels
                .map(|raw| normalize_label_names(&raw))
                .transpose()
                .map_err(blank_label)?;

            self.resolve_single(exec, auth, document.id, "update")?;
            self.index.replace(exec, document, labels.as_deref())
        })
    }

    /// Deletes every document matching `options` that the caller may write.
    ///
    /// Returns how many were deleted; zero matches is not an error.
    pub fn delete_documents(
        &self,
        exec: &ExecContext,
        auth: &AuthorizationContext,
        options: &[DocumentOption],
    ) -> StoreResult<usize> {
        self.observe("delete_many", || {
            let mut projection = Projection::default();
            let evaluation = self.evaluate(exec, auth, Action::Write, &mut projection, options)?;
            if evaluation.ids.is_empty() {
                return Ok(0);
            }
            self.index.delete(exec, &evaluation.ids)
        })
    }

    /// Deletes exactly one document by ID.
    pub fn delete_document(
        &self,
        exec: &ExecContext,
        auth: &AuthorizationContext,
        id: DocumentId,
    ) -> StoreResult<()> {
        self.observe("delete_one", || {
            let id = self.resolve_single(exec, auth, id, "delete")?;
            match self.index.delete(exec, &BTreeSet::from([id]))? {
                0 => Err(StoreError::NotFound(format!("document not found: {id}"))),
                _ => Ok(()),
            }
        })
    }

    fn create_inner(
        &self,
        exec: &ExecContext,
        auth: &AuthorizationContext,
        document: &mut Document,
        options: &[DocumentOption],
    ) -> StoreResult<()> {
        let mut owner_ref: Option<&OrgRef> = None;
        let mut raw_labels: Vec<&str> = Vec::new();
        for option in options {
            match option {
                DocumentOption::WithOrg(org) => {
                    if owner_ref.replace(org).is_some() {
                        return Err(StoreError::InvalidRequest(OWNER_REQUIRED.to_string()));
                    }
                }
                DocumentOption::WithLabel(name) => raw_labels.push(name.as_str()),
                other => {
                    return Err(StoreError::InvalidRequest(format!(
                        "`{}` option is not valid when creating documents",
                        other.kind()
                    )))
                }
            }
        }
        let owner_ref =
            owner_ref.ok_or_else(|| StoreError::InvalidRequest(OWNER_REQUIRED.to_string()))?;
        let labels = normalize_label_names(&raw_labels).map_err(blank_label)?;

        exec.check()?;
        let owner = self.resolve_owner(exec, auth, owner_ref)?;

        let assigned = !document.has_id();
        if assigned {
            document.id = Uuid::new_v4();
        }
        match self.index.insert(exec, document, owner, &labels) {
            Ok(attached) => {
                document.labels = Some(attached);
                Ok(())
            }
            Err(err) => {
                if assigned {
                    document.id = Uuid::nil();
                }
                Err(err)
            }
        }
    }

    /// Resolves the owning org of a new document and checks `Write` on it.
    fn resolve_owner(
        &self,
        exec: &ExecContext,
        auth: &AuthorizationContext,
        owner_ref: &OrgRef,
    ) -> StoreResult<OrgId> {
        let resolved = match owner_ref {
            OrgRef::Id(org) => self.index.org_exists(exec, *org)?.then_some(*org),
            OrgRef::Name(name) => self.index.find_org_by_name(exec, name)?,
        };

        match resolved {
            Some(org) if self.authorizer.permitted(auth, &Permission::write(org)) => Ok(org),
            Some(org) => {
                debug!(
                    "event=authorize module=store status=denied ns={} user={} permission={}",
                    self.namespace(),
                    auth.user_id(),
                    Permission::write(org)
                );
                Err(StoreError::NotFound("organization not found".to_string()))
            }
            None => Err(StoreError::NotFound("organization not found".to_string())),
        }
    }

    /// Resolves `id` through an authorized `Write` predicate and applies the
    /// exactly-one contract.
    fn resolve_single(
        &self,
        exec: &ExecContext,
        auth: &AuthorizationContext,
        id: DocumentId,
        operation: &str,
    ) -> StoreResult<DocumentId> {
        let mut projection = Projection::default();
        let evaluation = self.evaluate(
            exec,
            auth,
            Action::Write,
            &mut projection,
            &[DocumentOption::authorized_where_id(id)],
        )?;
        expect_single(&evaluation.ids, operation)
    }

    fn evaluate(
        &self,
        exec: &ExecContext,
        auth: &AuthorizationContext,
        action: Action,
        projection: &mut Projection,
        options: &[DocumentOption],
    ) -> StoreResult<Evaluation> {
        let scope = EvalScope {
            exec,
            auth,
            authorizer: &self.authorizer,
            index: &self.index,
            action,
        };
        evaluate(&scope, projection, options)
    }

    fn observe<T>(&self, operation: &str, run: impl FnOnce() -> StoreResult<T>) -> StoreResult<T> {
        let started_at = Instant::now();
        let ns = self.namespace();
        debug!("event=document_{operation} module=store status=start ns={ns}");

        let result = run();
        match &result {
            Ok(_) => info!(
                "event=document_{operation} module=store status=ok ns={ns} duration_ms={}",
                elapsed_ms(started_at)
            ),
            Err(err @ (StoreError::InternalConsistency(_)
            | StoreError::InvalidData(_)
            | StoreError::Db(_))) => error!(
                "event=document_{operation} module=store status=error ns={ns} duration_ms={} error_code={} error={}",
                elapsed_ms(started_at),
                error_code(err),
                err
            ),
            Err(err) => warn!(
                "event=document_{operation} module=store status=error ns={ns} duration_ms={} error_code={}",
                elapsed_ms(started_at),
                error_code(err)
            ),
        }
        result
    }
}

/// Applies the exactly-one contract to an evaluated ID set.
fn expect_single(ids: &BTreeSet<DocumentId>, operation: &str) -> StoreResult<DocumentId> {
    let mut iter = ids.iter();
    match (iter.next(), ids.len()) {
        (None, _) => Err(StoreError::NotFound("document not found".to_string())),
        (Some(id), 1) => Ok(*id),
        (Some(_), count) => Err(StoreError::InternalConsistency(format!(
            "{operation} matched {count} documents where exactly one was expected"
        ))),
    }
}

fn sort_documents(documents: &mut [Document], order: DocumentOrder) {
    match order {
        DocumentOrder::Id => documents.sort_by(|a, b| a.id.cmp(&b.id)),
        DocumentOrder::Name => documents.sort_by(|a, b| {
            a.meta
                .name
                .cmp(&b.meta.name)
                .then_with(|| a.id.cmp(&b.id))
        }),
    }
}

fn blank_label(raw: String) -> StoreError {
    StoreError::InvalidRequest(format!("label name `{raw}` must not be blank"))
}

fn error_code(err: &StoreError) -> &'static str {
    match err {
        StoreError::InvalidRequest(_) => "invalid_request",
        StoreError::NotFound(_) => "not_found",
        StoreError::InternalConsistency(_) => "internal_consistency",
        StoreError::Cancelled(_) => "cancelled",
        StoreError::InvalidData(_) => "invalid_data",
        StoreError::Db(_) => "db_error",
    }
}
