//! Authorization context, permissions and the authorizer seam.
//!
//! # Responsibility
//! - Describe what a caller may do, per organization.
//! - Answer permission checks for the option evaluator and the store.
//!
//! # Invariants
//! - Permissions are org-scoped; `org: None` grants the action on every org.
//! - `Write` does not imply `Read`.
//! - The context is always passed explicitly, never read from ambient state.

use crate::model::org::OrgId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};

/// Operation class checked against a permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Read,
    Write,
}

impl Display for Action {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Read => write!(f, "read"),
            Self::Write => write!(f, "write"),
        }
    }
}

/// Permission to perform `action` on documents owned by `org`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Permission {
    pub action: Action,
    /// `None` grants the action on documents of every organization.
    #[serde(default)]
    pub org: Option<OrgId>,
}

impl Permission {
    pub fn new(action: Action, org: OrgId) -> Self {
        Self {
            action,
            org: Some(org),
        }
    }

    pub fn read(org: OrgId) -> Self {
        Self::new(Action::Read, org)
    }

    pub fn write(org: OrgId) -> Self {
        Self::new(Action::Write, org)
    }

    /// Operator-style grant covering every organization.
    pub fn all_orgs(action: Action) -> Self {
        Self { action, org: None }
    }

    /// Returns whether holding `self` satisfies a request for `requested`.
    pub fn covers(&self, requested: &Permission) -> bool {
        if self.action != requested.action {
            return false;
        }
        match (self.org, requested.org) {
            (None, _) => true,
            (Some(granted), Some(wanted)) => granted == wanted,
            (Some(_), None) => false,
        }
    }
}

impl Display for Permission {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.org {
            Some(org) => write!(f, "{}:orgs/{org}/documents", self.action),
            None => write!(f, "{}:orgs/*/documents", self.action),
        }
    }
}

/// Caller identity plus granted permissions for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationContext {
    user_id: String,
    permissions: BTreeSet<Permission>,
}

impl AuthorizationContext {
    pub fn new(user_id: impl Into<String>, permissions: impl IntoIterator<Item = Permission>) -> Self {
        Self {
            user_id: user_id.into(),
            permissions: permissions.into_iter().collect(),
        }
    }

    /// Context with no permissions at all.
    pub fn anonymous() -> Self {
        Self::new("anonymous", [])
    }

    /// Convenience for a member with read and write access to one org.
    pub fn org_member(user_id: impl Into<String>, org: OrgId) -> Self {
        Self::new(user_id, [Permission::read(org), Permission::write(org)])
    }

    pub fn user_id(&self) -> &str {
        self.user_id.as_str()
    }

    pub fn permissions(&self) -> impl Iterator<Item = &Permission> {
        self.permissions.iter()
    }

    /// Returns whether any granted permission covers `requested`.
    pub fn allows(&self, requested: &Permission) -> bool {
        self.permissions
            .iter()
            .any(|granted| granted.covers(requested))
    }
}

/// Answers permission checks for a (caller, scope) pair.
pub trait Authorizer {
    fn permitted(&self, auth: &AuthorizationContext, permission: &Permission) -> bool;
}

impl<T: Authorizer + ?Sized> Authorizer for &T {
    fn permitted(&self, auth: &AuthorizationContext, permission: &Permission) -> bool {
        (**self).permitted(auth, permission)
    }
}

/// Authorizer that trusts the permission set carried by the context.
#[derive(Debug, Clone, Copy, Default)]
pub struct PermissionAuthorizer;

impl Authorizer for PermissionAuthorizer {
    fn permitted(&self, auth: &AuthorizationContext, permission: &Permission) -> bool {
        auth.allows(permission)
    }
}

#[cfg(test)]
mod tests {
    use super::{Action, AuthorizationContext, Authorizer, Permission, PermissionAuthorizer};
    use crate::model::org::OrgId;

    #[test]
    fn org_permission_covers_only_its_org_and_action() {
        let org = OrgId::new();
        let other = OrgId::new();
        let granted = Permission::read(org);
        assert!(granted.covers(&Permission::read(org)));
        assert!(!granted.covers(&Permission::read(other)));
        assert!(!granted.covers(&Permission::write(org)));
    }

    #[test]
    fn all_orgs_permission_covers_every_org_for_its_action() {
        let granted = Permission::all_orgs(Action::Write);
        assert!(granted.covers(&Permission::write(OrgId::new())));
        assert!(!granted.covers(&Permission::read(OrgId::new())));
    }

    #[test]
    fn anonymous_context_is_denied_everything() {
        let auth = AuthorizationContext::anonymous();
        assert!(!PermissionAuthorizer.permitted(&auth, &Permission::read(OrgId::new())));
    }

    #[test]
    fn org_member_can_read_and_write_own_org() {
        let org = OrgId::new();
        let auth = AuthorizationContext::org_member("user-1", org);
        assert!(PermissionAuthorizer.permitted(&auth, &Permission::read(org)));
        assert!(PermissionAuthorizer.permitted(&auth, &Permission::write(org)));
        assert_eq!(auth.user_id(), "user-1");
    }
}
