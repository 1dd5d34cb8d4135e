//! Route dispatch for `/documents/{ns}` and `/documents/{ns}/{id}`.
//!
//! Every read and delete path goes through authorized predicates built from
//! exactly the requested scope, including the re-read after an update.

use crate::api::{ApiError, ApiRequest, ApiResponse, ApiResult, Method};
use crate::auth::{AuthorizationContext, Authorizer};
use crate::context::ExecContext;
use crate::logging::elapsed_ms;
use crate::model::document::{Document, DocumentId};
use crate::model::org::OrgId;
use crate::query::option::DocumentOption;
use crate::store::service::DocumentService;
use crate::store::StoreError;
use log::info;
use rusqlite::Connection;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Instant;
use uuid::Uuid;

pub const DOCUMENTS_PREFIX: &str = "/documents";

/// Create body: a document plus its owner and label names.
#[derive(Debug, Deserialize)]
struct PostDocumentRequest {
    #[serde(flatten)]
    document: Document,
    #[serde(default)]
    org: Option<String>,
    #[serde(default, rename = "orgID")]
    org_id: Option<OrgId>,
    #[serde(default)]
    labels: Vec<String>,
}

#[derive(Debug, Serialize)]
struct DocumentResponse {
    links: BTreeMap<&'static str, String>,
    #[serde(flatten)]
    document: Document,
}

#[derive(Debug, Serialize)]
struct DocumentsResponse {
    documents: Vec<DocumentResponse>,
}

enum Route<'p> {
    Collection { ns: &'p str },
    Item { ns: &'p str, id: &'p str },
}

/// Serves the document routes over one connection.
pub struct DocumentHandler<'c, A: Authorizer> {
    conn: &'c Connection,
    service: DocumentService<A>,
}

impl<'c, A: Authorizer> DocumentHandler<'c, A> {
    pub fn new(conn: &'c Connection, service: DocumentService<A>) -> Self {
        Self { conn, service }
    }

    pub fn service(&self) -> &DocumentService<A> {
        &self.service
    }

    /// Dispatches one request; failures become error responses.
    pub fn handle(
        &self,
        exec: &ExecContext,
        auth: &AuthorizationContext,
        request: ApiRequest,
    ) -> ApiResponse {
        let started_at = Instant::now();
        let response = self
            .dispatch(exec, auth, &request)
            .unwrap_or_else(|err| ApiResponse::from_error(&err));
        info!(
            "event=api_request module=api method={} path={} status={} duration_ms={}",
            request.method,
            request.path,
            response.status,
            elapsed_ms(started_at)
        );
        response
    }

    fn dispatch(
        &self,
        exec: &ExecContext,
        auth: &AuthorizationContext,
        request: &ApiRequest,
    ) -> ApiResult<ApiResponse> {
        let not_allowed = || ApiError::MethodNotAllowed {
            method: request.method,
            path: request.path.clone(),
        };

        match (parse_route(&request.path)?, request.method) {
            (Route::Collection { ns }, Method::Post) => {
                self.post_document(exec, auth, ns, request.body.as_deref())
            }
            (Route::Collection { ns }, Method::Get) => {
                self.get_documents(exec, auth, ns, &request.query)
            }
            (Route::Collection { .. }, _) => Err(not_allowed()),
            (Route::Item { ns, id }, Method::Get) => {
                self.get_document(exec, auth, ns, parse_document_id(id)?)
            }
            (Route::Item { ns, id }, Method::Put) => self.put_document(
                exec,
                auth,
                ns,
                parse_document_id(id)?,
                request.body.as_deref(),
            ),
            (Route::Item { ns, id }, Method::Delete) => {
                self.delete_document(exec, auth, ns, parse_document_id(id)?)
            }
            (Route::Item { .. }, _) => Err(not_allowed()),
        }
    }

    fn post_document(
        &self,
        exec: &ExecContext,
        auth: &AuthorizationContext,
        ns: &str,
        body: Option<&str>,
    ) -> ApiResult<ApiResponse> {
        let request: PostDocumentRequest = decode_body(body)?;
        let store = self.service.find_document_store(self.conn, ns)?;

        let mut options = Vec::with_capacity(request.labels.len() + 1);
        if let Some(org_id) = request.org_id {
            options.push(DocumentOption::with_org_id(org_id));
        }
        if let Some(org) = request.org.filter(|org| !org.trim().is_empty()) {
            options.push(DocumentOption::with_org(org));
        }
        options.extend(request.labels.into_iter().map(DocumentOption::with_label));

        let mut document = request.document;
        document.labels = None;
        store.create_document(exec, auth, &mut document, &options)?;

        let body = encode(&document_response(store.namespace().as_str(), document))?;
        Ok(ApiResponse::json(201, body))
    }

    fn get_documents(
        &self,
        exec: &ExecContext,
        auth: &AuthorizationContext,
        ns: &str,
        query: &BTreeMap<String, String>,
    ) -> ApiResult<ApiResponse> {
        let org = query_value(query, "org");
        let org_id = query_value(query, "orgID")
            .map(|raw| {
                raw.parse::<OrgId>()
                    .map_err(|_| StoreError::InvalidRequest("Invalid orgID".to_string()))
            })
            .transpose()?;
        if org.is_none() && org_id.is_none() {
            return Err(StoreError::InvalidRequest(
                "Please provide either org or orgID".to_string(),
            )
            .into());
        }

        let store = self.service.find_document_store(self.conn, ns)?;
        // Both scopes are forwarded so the evaluator rejects the pair.
        let mut options = Vec::with_capacity(3);
        if let Some(org_id) = org_id {
            options.push(DocumentOption::authorized_where_org_id(org_id));
        }
        if let Some(org) = org {
            options.push(DocumentOption::authorized_where_org(org));
        }
        options.push(DocumentOption::include_labels());

        let ns = store.namespace().as_str();
        let documents = store
            .find_documents(exec, auth, &options)?
            .into_iter()
            .map(|document| document_response(ns, document))
            .collect();
        Ok(ApiResponse::json(200, encode(&DocumentsResponse { documents })?))
    }

    fn get_document(
        &self,
        exec: &ExecContext,
        auth: &AuthorizationContext,
        ns: &str,
        id: DocumentId,
    ) -> ApiResult<ApiResponse> {
        let store = self.service.find_document_store(self.conn, ns)?;
        let document = store.find_document(exec, auth, &read_one_options(id))?;
        let body = encode(&document_response(store.namespace().as_str(), document))?;
        Ok(ApiResponse::json(200, body))
    }

    /// Replaces a document, then re-reads it with the caller's `Read` grant.
    ///
    /// The update is committed before the re-read. A caller holding `Write`
    /// but not `Read` gets `204 No Content` instead of the document.
    fn put_document(
        &self,
        exec: &ExecContext,
        auth: &AuthorizationContext,
        ns: &str,
        id: DocumentId,
        body: Option<&str>,
    ) -> ApiResult<ApiResponse> {
        let mut document: Document = decode_body(body)?;
        document.id = id;
        let store = self.service.find_document_store(self.conn, ns)?;
        store.update_document(exec, auth, &document, &[])?;

        match store.find_document(exec, auth, &read_one_options(id)) {
            Ok(updated) => {
                let body = encode(&document_response(store.namespace().as_str(), updated))?;
                Ok(ApiResponse::json(200, body))
            }
            Err(StoreError::NotFound(_)) => Ok(ApiResponse::no_content()),
            Err(err) => Err(err.into()),
        }
    }

    fn delete_document(
        &self,
        exec: &ExecContext,
        auth: &AuthorizationContext,
        ns: &str,
        id: DocumentId,
    ) -> ApiResult<ApiResponse> {
        let store = self.service.find_document_store(self.conn, ns)?;
        store.delete_document(exec, auth, id)?;
        Ok(ApiResponse::no_content())
    }
}

fn parse_route(path: &str) -> ApiResult<Route<'_>> {
    let rest = path
        .strip_prefix(DOCUMENTS_PREFIX)
        .filter(|rest| rest.is_empty() || rest.starts_with('/'))
        .ok_or_else(|| ApiError::RouteNotFound(path.to_string()))?;
    let segments: Vec<&str> = rest.trim_matches('/').split('/').collect();

    match segments.as_slice() {
        [""] => Err(StoreError::InvalidRequest("url missing namespace".to_string()).into()),
        [ns] => Ok(Route::Collection { ns: *ns }),
        [ns, id] if !ns.is_empty() && !id.is_empty() => Ok(Route::Item { ns: *ns, id: *id }),
        _ => Err(ApiError::RouteNotFound(path.to_string())),
    }
}

fn parse_document_id(raw: &str) -> ApiResult<DocumentId> {
    Uuid::parse_str(raw)
        .map_err(|_| StoreError::InvalidRequest("bad id in url".to_string()).into())
}

fn read_one_options(id: DocumentId) -> [DocumentOption; 3] {
    [
        DocumentOption::authorized_where_id(id),
        DocumentOption::include_content(),
        DocumentOption::include_labels(),
    ]
}

fn query_value<'q>(query: &'q BTreeMap<String, String>, key: &str) -> Option<&'q str> {
    query
        .get(key)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
}

fn decode_body<T: DeserializeOwned>(body: Option<&str>) -> ApiResult<T> {
    let body = body
        .filter(|body| !body.trim().is_empty())
        .ok_or_else(|| ApiError::TransportEncoding("missing document body".to_string()))?;
    serde_json::from_str(body).map_err(|err| ApiError::TransportEncoding(err.to_string()))
}

fn document_response(ns: &str, mut document: Document) -> DocumentResponse {
    document.labels.get_or_insert_with(Vec::new);
    DocumentResponse {
        links: BTreeMap::from([("self", format!("{DOCUMENTS_PREFIX}/{ns}/{}", document.id))]),
        document,
    }
}

fn encode<T: Serialize>(value: &T) -> ApiResult<Value> {
    serde_json::to_value(value).map_err(|err| ApiError::ResponseEncoding(err.to_string()))
}
