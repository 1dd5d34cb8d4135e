//! Domain model for namespaced, org-owned documents.
//!
//! # Responsibility
//! - Define the records the store persists and returns.
//! - Keep identifier types distinct so org and document IDs cannot be mixed.
//!
//! # Invariants
//! - Every document is identified by a stable `DocumentId` assigned once.
//! - Every document belongs to exactly one organization, fixed at creation.
//! - Deletion is represented by soft-delete tombstones so IDs stay reserved.

pub mod document;
pub mod namespace;
pub mod org;
