//! Option values accepted by store operations.
//!
//! Callers build a `Vec<DocumentOption>` in the order they want it evaluated.
//! The constructor helpers mirror the phrasing used at call sites, e.g.
//! `DocumentOption::authorized_where_org_id(org)`.

use crate::model::document::DocumentId;
use crate::model::org::{OrgId, OrgRef};
use crate::query::decorator::Field;
use std::fmt::{Display, Formatter};

/// Narrowing constraint over the namespace's document IDs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Predicate {
    OrgId(OrgId),
    OrgName(String),
    Id(DocumentId),
    Label(String),
}

impl Display for Predicate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OrgId(id) => write!(f, "orgID={id}"),
            Self::OrgName(name) => write!(f, "org={name}"),
            Self::Id(id) => write!(f, "id={id}"),
            Self::Label(name) => write!(f, "label={name}"),
        }
    }
}

/// Explicit result ordering. Without one, result order is unspecified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentOrder {
    Id,
    Name,
}

/// One unit of query behavior.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DocumentOption {
    /// Unchecked predicate; for internal callers only.
    Where(Predicate),
    /// Predicate guarded by a permission check on exactly its own scope.
    Authorized(Predicate),
    /// Decorator requesting one optional field.
    Include(Field),
    OrderBy(DocumentOrder),
    /// Create only: owning organization, always authorized.
    WithOrg(OrgRef),
    /// Create/update: attach one label by name.
    WithLabel(String),
}

impl DocumentOption {
    pub fn where_org_id(org: OrgId) -> Self {
        Self::Where(Predicate::OrgId(org))
    }

    pub fn where_org(name: impl Into<String>) -> Self {
        Self::Where(Predicate::OrgName(name.into()))
    }

    pub fn where_id(id: DocumentId) -> Self {
        Self::Where(Predicate::Id(id))
    }

    pub fn where_label(name: impl Into<String>) -> Self {
        Self::Where(Predicate::Label(name.into()))
    }

    pub fn authorized_where_org_id(org: OrgId) -> Self {
        Self::Authorized(Predicate::OrgId(org))
    }

    pub fn authorized_where_org(name: impl Into<String>) -> Self {
        Self::Authorized(Predicate::OrgName(name.into()))
    }

    pub fn authorized_where_id(id: DocumentId) -> Self {
        Self::Authorized(Predicate::Id(id))
    }

    pub fn include_content() -> Self {
        Self::Include(Field::Content)
    }

    pub fn include_labels() -> Self {
        Self::Include(Field::Labels)
    }

    pub fn with_org_id(org: OrgId) -> Self {
        Self::WithOrg(OrgRef::Id(org))
    }

    pub fn with_org(name: impl Into<String>) -> Self {
        Self::WithOrg(OrgRef::Name(name.into()))
    }

    pub fn with_label(name: impl Into<String>) -> Self {
        Self::WithLabel(name.into())
    }

    /// Returns the wrapped predicate, authorized or not.
    pub fn predicate(&self) -> Option<&Predicate> {
        match self {
            Self::Where(predicate) | Self::Authorized(predicate) => Some(predicate),
            _ => None,
        }
    }

    /// Short kind tag used in validation messages and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Where(_) => "where",
            Self::Authorized(_) => "authorized",
            Self::Include(_) => "include",
            Self::OrderBy(_) => "order_by",
            Self::WithOrg(_) => "with_org",
            Self::WithLabel(_) => "with_label",
        }
    }
}
