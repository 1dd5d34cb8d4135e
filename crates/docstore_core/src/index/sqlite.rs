//! SQLite-backed `DocumentIndex`.
//!
//! # Responsibility
//! - Resolve scopes, owners and org names with plain SQL lookups.
//! - Persist documents, label links and tombstones transactionally.
//!
//! # Invariants
//! - Every statement is filtered by the bound namespace.
//! - Writes run in `IMMEDIATE` transactions; reads of one batch run in one
//!   transaction so a document row and its labels come from one snapshot.
//! - A progress handler aborts in-flight statements once the execution
//!   context is cancelled or expired; the open transaction rolls back.

use crate::context::ExecContext;
use crate::index::{DocumentIndex, IndexScope};
use crate::model::document::{Document, DocumentId, DocumentMeta, Label, LabelId};
use crate::model::namespace::Namespace;
use crate::model::org::OrgId;
use crate::query::decorator::{Field, Projection};
use crate::store::{StoreError, StoreResult};
use rusqlite::{params, Connection, OptionalExtension, Params, Row, Transaction, TransactionBehavior};
use serde_json::Value;
use std::collections::BTreeSet;
use std::os::raw::c_int;
use uuid::Uuid;

/// SQLite VM instructions between cancellation probes.
const PROGRESS_HANDLER_OPS: c_int = 1_000;

const DOCUMENT_SELECT_SQL: &str = "SELECT
    id,
    name,
    description,
    content
FROM documents
WHERE namespace = ?1
  AND id = ?2
  AND is_deleted = 0;";

/// Namespace-bound SQLite document index.
pub struct SqliteDocumentIndex<'conn> {
    conn: &'conn Connection,
    namespace: Namespace,
}

impl<'conn> SqliteDocumentIndex<'conn> {
    /// Registers `namespace` when missing and binds an index to it.
    pub fn create(conn: &'conn Connection, namespace: Namespace) -> StoreResult<Self> {
        conn.execute(
            "INSERT OR IGNORE INTO namespaces (name) VALUES (?1);",
            [namespace.as_str()],
        )?;
        Ok(Self { conn, namespace })
    }

    /// Binds an index to an already registered namespace.
    pub fn open(conn: &'conn Connection, namespace: Namespace) -> StoreResult<Self> {
        if !namespace_exists(conn, &namespace)? {
            return Err(StoreError::NotFound(format!(
                "document store not found: {namespace}"
            )));
        }
        Ok(Self { conn, namespace })
    }

    /// Lists every registered namespace, sorted by name.
    pub fn list_namespaces(conn: &Connection) -> StoreResult<Vec<Namespace>> {
        let mut stmt = conn.prepare("SELECT name FROM namespaces ORDER BY name ASC;")?;
        let mut rows = stmt.query([])?;
        let mut namespaces = Vec::new();
        while let Some(row) = rows.next()? {
            let name: String = row.get(0)?;
            let namespace = Namespace::parse(&name).map_err(|err| {
                StoreError::InvalidData(format!("namespaces.name `{name}`: {err}"))
            })?;
            namespaces.push(namespace);
        }
        Ok(namespaces)
    }

    /// Runs `op` with cancellation wired into SQLite.
    ///
    /// SQLite failures observed after cancellation are reported as
    /// `Cancelled`, since the interrupt is what caused them.
    fn run<T>(
        &self,
        exec: &ExecContext,
        op: impl FnOnce(&Connection) -> StoreResult<T>,
    ) -> StoreResult<T> {
        exec.check()?;
        let _guard = InterruptGuard::install(self.conn, exec);
        op(self.conn).map_err(|err| match (err, exec.cancel_reason()) {
            (StoreError::Db(_), Some(reason)) => StoreError::Cancelled(reason),
            (err, _) => err,
        })
    }
}

impl DocumentIndex for SqliteDocumentIndex<'_> {
    fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    fn resolve(&self, exec: &ExecContext, scope: &IndexScope) -> StoreResult<BTreeSet<DocumentId>> {
        let ns = self.namespace.as_str();
        self.run(exec, |conn| match scope {
            IndexScope::Org(org) => collect_ids(
                conn,
                "SELECT id
                 FROM documents
                 WHERE namespace = ?1
                   AND org_id = ?2
                   AND is_deleted = 0;",
                params![ns, org.to_string()],
            ),
            IndexScope::Document(id) => collect_ids(
                conn,
                "SELECT id
                 FROM documents
                 WHERE namespace = ?1
                   AND id = ?2
                   AND is_deleted = 0;",
                params![ns, id.to_string()],
            ),
            IndexScope::Label(name) => collect_ids(
                conn,
                "SELECT d.id
                 FROM documents d
                 INNER JOIN document_labels dl
                    ON dl.namespace = d.namespace AND dl.document_id = d.id
                 INNER JOIN labels l ON l.id = dl.label_id
                 WHERE d.namespace = ?1
                   AND l.name = ?2
                   AND d.is_deleted = 0;",
                params![ns, name],
            ),
        })
    }

    fn find_org_by_name(&self, exec: &ExecContext, name: &str) -> StoreResult<Option<OrgId>> {
        self.run(exec, |conn| {
            let id_text: Option<String> = conn
                .query_row(
                    "SELECT id FROM organizations WHERE name = ?1;",
                    [name],
                    |row| row.get(0),
                )
                .optional()?;
            id_text.as_deref().map(parse_org_id).transpose()
        })
    }

    fn org_exists(&self, exec: &ExecContext, org: OrgId) -> StoreResult<bool> {
        self.run(exec, |conn| {
            let exists: i64 = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM organizations WHERE id = ?1);",
                [org.to_string()],
                |row| row.get(0),
            )?;
            Ok(exists == 1)
        })
    }

    fn document_owner(&self, exec: &ExecContext, id: DocumentId) -> StoreResult<Option<OrgId>> {
        let ns = self.namespace.as_str();
        self.run(exec, |conn| {
            let org_text: Option<String> = conn
                .query_row(
                    "SELECT org_id
                     FROM documents
                     WHERE namespace = ?1
                       AND id = ?2
                       AND is_deleted = 0;",
                    params![ns, id.to_string()],
                    |row| row.get(0),
                )
                .optional()?;
            org_text.as_deref().map(parse_org_id).transpose()
        })
    }

    fn insert(
        &self,
        exec: &ExecContext,
        document: &Document,
        owner: OrgId,
        labels: &[String],
    ) -> StoreResult<Vec<Label>> {
        let ns = self.namespace.as_str();
        self.run(exec, |conn| {
            let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
            let id_text = document.id.to_string();
            if id_taken(&tx, ns, &id_text)? {
                return Err(StoreError::InvalidRequest(format!(
                    "document id {} is already taken",
                    document.id
                )));
            }

            tx.execute(
                "INSERT INTO documents (
                    namespace,
                    id,
                    org_id,
                    name,
                    description,
                    content
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
                params![
                    ns,
                    id_text.as_str(),
                    owner.to_string(),
                    document.meta.name.as_str(),
                    document.meta.description.as_str(),
                    encode_content(document.content.as_ref())?,
                ],
            )?;
            let attached = attach_labels(&tx, exec, ns, &id_text, labels)?;

            exec.check()?;
            tx.commit()?;
            Ok(attached)
        })
    }

    fn replace(
        &self,
        exec: &ExecContext,
        document: &Document,
        labels: Option<&[String]>,
    ) -> StoreResult<()> {
        let ns = self.namespace.as_str();
        self.run(exec, |conn| {
            let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
            let id_text = document.id.to_string();
            let changed = tx.execute(
                "UPDATE documents
                 SET
                    name = ?3,
                    description = ?4,
                    content = ?5,
                    updated_at = (strftime('%s', 'now') * 1000)
                 WHERE namespace = ?1
                   AND id = ?2
                   AND is_deleted = 0;",
                params![
                    ns,
                    id_text.as_str(),
                    document.meta.name.as_str(),
                    document.meta.description.as_str(),
                    encode_content(document.content.as_ref())?,
                ],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!(
                    "document not found: {}",
                    document.id
                )));
            }

            if let Some(labels) = labels {
                tx.execute(
                    "DELETE FROM document_labels WHERE namespace = ?1 AND document_id = ?2;",
                    params![ns, id_text.as_str()],
                )?;
                attach_labels(&tx, exec, ns, &id_text, labels)?;
            }

            exec.check()?;
            tx.commit()?;
            Ok(())
        })
    }

    fn delete(&self, exec: &ExecContext, ids: &BTreeSet<DocumentId>) -> StoreResult<usize> {
        let ns = self.namespace.as_str();
        self.run(exec, |conn| {
            let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
            let mut deleted = 0;
            for id in ids {
                exec.check()?;
                let id_text = id.to_string();
                let changed = tx.execute(
                    "UPDATE documents
                     SET
                        is_deleted = 1,
                        updated_at = (strftime('%s', 'now') * 1000)
                     WHERE namespace = ?1
                       AND id = ?2
                       AND is_deleted = 0;",
                    params![ns, id_text.as_str()],
                )?;
                if changed > 0 {
                    tx.execute(
                        "DELETE FROM document_labels WHERE namespace = ?1 AND document_id = ?2;",
                        params![ns, id_text.as_str()],
                    )?;
                    deleted += changed;
                }
            }
            tx.commit()?;
            Ok(deleted)
        })
    }

    fn load(
        &self,
        exec: &ExecContext,
        ids: &BTreeSet<DocumentId>,
        projection: &Projection,
    ) -> StoreResult<Vec<Document>> {
        let ns = self.namespace.as_str();
        self.run(exec, |conn| {
            let tx = Transaction::new_unchecked(conn, TransactionBehavior::Deferred)?;
            let mut documents = Vec::with_capacity(ids.len());
            {
                let mut stmt = tx.prepare(DOCUMENT_SELECT_SQL)?;
                for id in ids {
                    exec.check()?;
                    let id_text = id.to_string();
                    let mut rows = stmt.query(params![ns, id_text.as_str()])?;
                    let Some(row) = rows.next()? else {
                        continue;
                    };
                    let mut document = parse_document_row(row, projection)?;
                    if projection.includes(Field::Labels) {
                        document.labels = Some(load_labels(&tx, ns, &id_text)?);
                    }
                    documents.push(document);
                }
            }
            tx.commit()?;
            Ok(documents)
        })
    }
}

/// Removes the progress handler when an index call ends.
struct InterruptGuard<'c> {
    conn: &'c Connection,
}

impl<'c> InterruptGuard<'c> {
    fn install(conn: &'c Connection, exec: &ExecContext) -> Self {
        let probe = exec.clone();
        conn.progress_handler(
            PROGRESS_HANDLER_OPS,
            Some(move || probe.cancel_reason().is_some()),
        );
        Self { conn }
    }
}

impl Drop for InterruptGuard<'_> {
    fn drop(&mut self) {
        self.conn
            .progress_handler(PROGRESS_HANDLER_OPS, None::<fn() -> bool>);
    }
}

fn attach_labels(
    conn: &Connection,
    exec: &ExecContext,
    ns: &str,
    document_id: &str,
    labels: &[String],
) -> StoreResult<Vec<Label>> {
    let mut attached = Vec::with_capacity(labels.len());
    for (position, name) in labels.iter().enumerate() {
        exec.check()?;
        conn.execute(
            "INSERT OR IGNORE INTO labels (namespace, name) VALUES (?1, ?2);",
            params![ns, name.as_str()],
        )?;
        let label_id: LabelId = conn.query_row(
            "SELECT id FROM labels WHERE namespace = ?1 AND name = ?2;",
            params![ns, name.as_str()],
            |row| row.get(0),
        )?;
        conn.execute(
            "INSERT INTO document_labels (namespace, document_id, label_id, position)
             VALUES (?1, ?2, ?3, ?4);",
            params![ns, document_id, label_id, position as i64],
        )?;
        attached.push(Label {
            id: label_id,
            name: name.clone(),
        });
    }
    Ok(attached)
}

fn load_labels(conn: &Connection, ns: &str, document_id: &str) -> StoreResult<Vec<Label>> {
    let mut stmt = conn.prepare(
        "SELECT l.id, l.name
         FROM document_labels dl
         INNER JOIN labels l ON l.id = dl.label_id
         WHERE dl.namespace = ?1
           AND dl.document_id = ?2
         ORDER BY dl.position ASC;",
    )?;
    let mut rows = stmt.query(params![ns, document_id])?;
    let mut labels = Vec::new();
    while let Some(row) = rows.next()? {
        labels.push(Label {
            id: row.get(0)?,
            name: row.get(1)?,
        });
    }
    Ok(labels)
}

fn parse_document_row(row: &Row<'_>, projection: &Projection) -> StoreResult<Document> {
    let id_text: String = row.get("id")?;
    let content = if projection.includes(Field::Content) {
        let raw: Option<String> = row.get("content")?;
        Some(decode_content(&id_text, raw.as_deref())?)
    } else {
        None
    };

    Ok(Document {
        id: parse_document_id(&id_text)?,
        meta: DocumentMeta {
            name: row.get("name")?,
            description: row.get("description")?,
        },
        content,
        labels: None,
    })
}

fn collect_ids(conn: &Connection, sql: &str, params: impl Params) -> StoreResult<BTreeSet<DocumentId>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params)?;
    let mut ids = BTreeSet::new();
    while let Some(row) = rows.next()? {
        let id_text: String = row.get(0)?;
        ids.insert(parse_document_id(&id_text)?);
    }
    Ok(ids)
}

fn id_taken(conn: &Connection, ns: &str, id_text: &str) -> StoreResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM documents WHERE namespace = ?1 AND id = ?2);",
        params![ns, id_text],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn namespace_exists(conn: &Connection, namespace: &Namespace) -> StoreResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM namespaces WHERE name = ?1);",
        [namespace.as_str()],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn encode_content(content: Option<&Value>) -> StoreResult<Option<String>> {
    content
        .map(serde_json::to_string)
        .transpose()
        .map_err(|err| StoreError::InvalidRequest(format!("content is not encodable: {err}")))
}

fn decode_content(id_text: &str, raw: Option<&str>) -> StoreResult<Value> {
    match raw {
        Some(text) => serde_json::from_str(text).map_err(|err| {
            StoreError::InvalidData(format!("documents.content of `{id_text}`: {err}"))
        }),
        None => Ok(Value::Null),
    }
}

pub(crate) fn parse_document_id(value: &str) -> StoreResult<DocumentId> {
    Uuid::parse_str(value)
        .map_err(|_| StoreError::InvalidData(format!("invalid uuid value `{value}` in documents.id")))
}

pub(crate) fn parse_org_id(value: &str) -> StoreResult<OrgId> {
    value
        .parse()
        .map_err(|_| StoreError::InvalidData(format!("invalid org id value `{value}`")))
}
