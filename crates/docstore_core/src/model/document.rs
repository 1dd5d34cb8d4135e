//! Document and label records.
//!
//! # Responsibility
//! - Define the canonical document shape shared by store, index and adapter.
//! - Normalize label names supplied by callers.
//!
//! # Invariants
//! - `id` is nil only before creation; the store assigns it exactly once.
//! - `content` and `labels` are `None` unless explicitly requested, which is
//!   distinct from an empty value.
//! - Label order is display order and is preserved end to end.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use uuid::Uuid;

/// Stable identifier for one document within its namespace.
pub type DocumentId = Uuid;

/// Storage identifier of one label.
pub type LabelId = i64;

/// Named tag attachable to many documents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Label {
    pub id: LabelId,
    pub name: String,
}

/// Descriptive metadata stored alongside the opaque content.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMeta {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

/// One stored document.
///
/// The store never interprets `content`; it is persisted as JSON text and
/// returned as-is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub id: DocumentId,
    #[serde(default)]
    pub meta: DocumentMeta,
    /// Populated only when the content projection was requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,
    /// Populated only when the labels projection was requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<Label>>,
}

impl Document {
    /// Creates an unsaved document; the store assigns its ID on create.
    pub fn new(name: impl Into<String>, content: Value) -> Self {
        Self {
            id: Uuid::nil(),
            meta: DocumentMeta {
                name: name.into(),
                description: String::new(),
            },
            content: Some(content),
            labels: None,
        }
    }

    /// Returns whether an ID has been assigned.
    pub fn has_id(&self) -> bool {
        !self.id.is_nil()
    }

    /// Returns label names in display order, or an empty list when labels
    /// were not loaded.
    pub fn label_names(&self) -> Vec<&str> {
        self.labels
            .iter()
            .flatten()
            .map(|label| label.name.as_str())
            .collect()
    }
}

/// Normalizes caller-supplied label names.
///
/// Names are trimmed and deduplicated keeping the first occurrence, so the
/// caller's display order survives. Returns the first blank input as `Err`.
pub fn normalize_label_names<S: AsRef<str>>(names: &[S]) -> Result<Vec<String>, String> {
    let mut seen: HashSet<&str> = HashSet::with_capacity(names.len());
    let mut normalized: Vec<String> = Vec::with_capacity(names.len());
    for raw in names {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            return Err(raw.as_ref().to_string());
        }
        if seen.insert(trimmed) {
            normalized.push(trimmed.to_string());
        }
    }
    Ok(normalized)
}
