//! Transport-neutral request/response adapter for the document routes.
//!
//! # Responsibility
//! - Describe requests and responses without binding to an HTTP stack.
//! - Map store errors to status codes and `{code, message}` bodies.
//!
//! # Invariants
//! - Every response carries a status; bodies are JSON values or absent.
//! - Not-found and unauthorized outcomes are indistinguishable to callers.

use crate::store::StoreError;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod handler;

pub use handler::{DocumentHandler, DOCUMENTS_PREFIX};

pub type ApiResult<T> = Result<T, ApiError>;

/// Status used for cancelled or expired requests.
pub const STATUS_CLIENT_CLOSED: u16 = 499;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Display for Method {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        };
        write!(f, "{name}")
    }
}

/// One inbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: BTreeMap<String, String>,
    /// Raw JSON body text.
    pub body: Option<String>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: BTreeMap::new(),
            body: None,
        }
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_json(self, body: &Value) -> Self {
        self.with_body(body.to_string())
    }
}

/// One outbound response.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Option<Value>,
}

impl ApiResponse {
    pub fn json(status: u16, body: Value) -> Self {
        Self {
            status,
            body: Some(body),
        }
    }

    pub fn no_content() -> Self {
        Self {
            status: 204,
            body: None,
        }
    }

    pub fn from_error(err: &ApiError) -> Self {
        Self::json(
            err.status(),
            json!({
                "code": err.code(),
                "message": err.to_string(),
            }),
        )
    }
}

/// Adapter-level failure.
#[derive(Debug)]
pub enum ApiError {
    /// Request body is missing or not decodable.
    TransportEncoding(String),
    /// Response could not be encoded.
    ResponseEncoding(String),
    RouteNotFound(String),
    MethodNotAllowed { method: Method, path: String },
    Store(StoreError),
}

impl ApiError {
    pub fn status(&self) -> u16 {
        match self {
            Self::TransportEncoding(_) => 400,
            Self::ResponseEncoding(_) => 500,
            Self::RouteNotFound(_) => 404,
            Self::MethodNotAllowed { .. } => 405,
            Self::Store(err) => match err {
                StoreError::InvalidRequest(_) => 400,
                StoreError::NotFound(_) => 404,
                StoreError::Cancelled(_) => STATUS_CLIENT_CLOSED,
                StoreError::InternalConsistency(_)
                | StoreError::InvalidData(_)
                | StoreError::Db(_) => 500,
            },
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::TransportEncoding(_) => "invalid",
            Self::ResponseEncoding(_) => "internal error",
            Self::RouteNotFound(_) => "not found",
            Self::MethodNotAllowed { .. } => "method not allowed",
            Self::Store(err) => err.code(),
        }
    }
}

impl Display for ApiError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TransportEncoding(message) => write!(f, "malformed request: {message}"),
            Self::ResponseEncoding(message) => write!(f, "response encoding failed: {message}"),
            Self::RouteNotFound(path) => write!(f, "no route for {path}"),
            Self::MethodNotAllowed { method, path } => {
                write!(f, "method {method} not allowed on {path}")
            }
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ApiError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}
