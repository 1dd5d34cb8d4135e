//! Namespace registry facade handing out SQLite-backed stores.

use crate::auth::Authorizer;
use crate::index::SqliteDocumentIndex;
use crate::model::namespace::Namespace;
use crate::store::document_store::DocumentStore;
use crate::store::{StoreError, StoreResult};
use log::info;
use rusqlite::Connection;

/// Store handed out by [`DocumentService`].
pub type SqliteDocumentStore<'c, 'a, A> = DocumentStore<SqliteDocumentIndex<'c>, &'a A>;

/// Creates and opens namespaced document stores sharing one authorizer.
pub struct DocumentService<A: Authorizer> {
    authorizer: A,
}

impl<A: Authorizer> DocumentService<A> {
    pub fn new(authorizer: A) -> Self {
        Self { authorizer }
    }

    pub fn authorizer(&self) -> &A {
        &self.authorizer
    }

    /// Registers `namespace` when missing and returns its store.
    ///
    /// Calling this for an existing namespace returns the existing store.
    pub fn create_document_store<'c>(
        &self,
        conn: &'c Connection,
        namespace: &str,
    ) -> StoreResult<SqliteDocumentStore<'c, '_, A>> {
        let namespace = parse_namespace(namespace)?;
        let index = SqliteDocumentIndex::create(conn, namespace.clone())?;
        info!("event=store_create module=store status=ok ns={namespace}");
        Ok(DocumentStore::new(index, &self.authorizer))
    }

    /// Returns the store of an already registered namespace.
    pub fn find_document_store<'c>(
        &self,
        conn: &'c Connection,
        namespace: &str,
    ) -> StoreResult<SqliteDocumentStore<'c, '_, A>> {
        let namespace = parse_namespace(namespace)?;
        let index = SqliteDocumentIndex::open(conn, namespace)?;
        Ok(DocumentStore::new(index, &self.authorizer))
    }

    /// Lists registered namespaces sorted by name.
    pub fn list_document_stores(&self, conn: &Connection) -> StoreResult<Vec<Namespace>> {
        SqliteDocumentIndex::list_namespaces(conn)
    }
}

fn parse_namespace(raw: &str) -> StoreResult<Namespace> {
    Namespace::parse(raw)
        .map_err(|err| StoreError::InvalidRequest(format!("invalid namespace `{raw}`: {err}")))
}
