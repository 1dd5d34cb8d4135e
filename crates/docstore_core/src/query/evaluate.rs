//! Option list evaluator.
//!
//! # Responsibility
//! - Validate an option list for the operation it is used with.
//! - Resolve predicates in order into one intersected ID set.
//! - Forward decorator options to the decorator target.
//!
//! # Invariants
//! - Validation completes before the first index call.
//! - An authorized predicate checks exactly the scope it names: an org ID,
//!   an org name resolved to its ID, or a document ID resolved to its stored
//!   owner. Denial contributes the empty set.
//! - Once the working set is empty, remaining predicates are skipped but
//!   decorators are still recorded.

use crate::auth::{Action, AuthorizationContext, Authorizer, Permission};
use crate::context::ExecContext;
use crate::index::{DocumentIndex, IndexScope};
use crate::model::document::DocumentId;
use crate::model::org::OrgId;
use crate::query::decorator::DocumentDecorator;
use crate::query::option::{DocumentOption, DocumentOrder, Predicate};
use crate::store::{StoreError, StoreResult};
use log::debug;
use std::collections::BTreeSet;

/// Outcome of evaluating one option list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Evaluation {
    /// Intersection of every evaluated predicate.
    pub ids: BTreeSet<DocumentId>,
    /// Last `OrderBy` supplied, if any.
    pub order: Option<DocumentOrder>,
    /// Predicates actually resolved against the index.
    pub predicates_evaluated: usize,
}

/// Inputs shared by every predicate in one evaluation.
pub struct EvalScope<'a, I: ?Sized, A: ?Sized> {
    pub exec: &'a ExecContext,
    pub auth: &'a AuthorizationContext,
    pub authorizer: &'a A,
    pub index: &'a I,
    /// Action checked by authorized predicates.
    pub action: Action,
}

/// Rejects option lists that cannot be evaluated as a query.
///
/// Runs without touching the index.
pub fn validate_query_options(options: &[DocumentOption]) -> StoreResult<()> {
    let mut has_org_id = false;
    let mut has_org_name = false;
    let mut has_predicate = false;

    for option in options {
        let Some(predicate) = option.predicate() else {
            if matches!(
                option,
                DocumentOption::WithOrg(_) | DocumentOption::WithLabel(_)
            ) {
                return Err(StoreError::InvalidRequest(format!(
                    "`{}` option is only valid when writing documents",
                    option.kind()
                )));
            }
            continue;
        };

        has_predicate = true;
        match predicate {
            Predicate::OrgId(_) => has_org_id = true,
            Predicate::OrgName(_) => has_org_name = true,
            Predicate::Label(name) if matches!(option, DocumentOption::Authorized(_)) => {
                return Err(StoreError::InvalidRequest(format!(
                    "label predicate `{name}` has no org scope to authorize against"
                )));
            }
            Predicate::Label(_) | Predicate::Id(_) => {}
        }
    }

    if has_org_id && has_org_name {
        return Err(StoreError::InvalidRequest(
            "provide either org or orgID, not both".to_string(),
        ));
    }
    if !has_predicate {
        return Err(StoreError::InvalidRequest(
            "at least one predicate is required".to_string(),
        ));
    }
    Ok(())
}

/// Evaluates `options` in order and returns the matching ID set.
///
/// Decorator options are forwarded to `decorator` as they are met.
pub fn evaluate<I, A, D>(
    scope: &EvalScope<'_, I, A>,
    decorator: &mut D,
    options: &[DocumentOption],
) -> StoreResult<Evaluation>
where
    I: DocumentIndex + ?Sized,
    A: Authorizer + ?Sized,
    D: DocumentDecorator + ?Sized,
{
    validate_query_options(options)?;
    scope.exec.check()?;

    let mut working: Option<BTreeSet<DocumentId>> = None;
    let mut evaluation = Evaluation::default();

    for option in options {
        match option {
            DocumentOption::Where(predicate) => {
                if is_exhausted(&working) {
                    continue;
                }
                let ids = resolve_predicate(scope, predicate)?;
                evaluation.predicates_evaluated += 1;
                narrow(&mut working, ids);
            }
            DocumentOption::Authorized(predicate) => {
                if is_exhausted(&working) {
                    continue;
                }
                let ids = resolve_authorized(scope, predicate)?;
                evaluation.predicates_evaluated += 1;
                narrow(&mut working, ids);
            }
            DocumentOption::Include(field) => decorator.request(*field),
            DocumentOption::OrderBy(order) => evaluation.order = Some(*order),
            DocumentOption::WithOrg(_) | DocumentOption::WithLabel(_) => {
                return Err(StoreError::InvalidRequest(format!(
                    "`{}` option is only valid when writing documents",
                    option.kind()
                )));
            }
        }
    }

    evaluation.ids = working.unwrap_or_default();
    Ok(evaluation)
}

fn is_exhausted(working: &Option<BTreeSet<DocumentId>>) -> bool {
    working.as_ref().is_some_and(|ids| ids.is_empty())
}

fn narrow(working: &mut Option<BTreeSet<DocumentId>>, ids: BTreeSet<DocumentId>) {
    let next = match working.take() {
        None => ids,
        Some(current) => current.intersection(&ids).copied().collect(),
    };
    *working = Some(next);
}

fn resolve_predicate<I, A>(
    scope: &EvalScope<'_, I, A>,
    predicate: &Predicate,
) -> StoreResult<BTreeSet<DocumentId>>
where
    I: DocumentIndex + ?Sized,
    A: Authorizer + ?Sized,
{
    let index_scope = match predicate {
        Predicate::OrgId(org) => IndexScope::Org(*org),
        Predicate::OrgName(name) => match scope.index.find_org_by_name(scope.exec, name)? {
            Some(org) => IndexScope::Org(org),
            None => return Ok(BTreeSet::new()),
        },
        Predicate::Id(id) => IndexScope::Document(*id),
        Predicate::Label(name) => IndexScope::Label(name.clone()),
    };
    scope.index.resolve(scope.exec, &index_scope)
}

fn resolve_authorized<I, A>(
    scope: &EvalScope<'_, I, A>,
    predicate: &Predicate,
) -> StoreResult<BTreeSet<DocumentId>>
where
    I: DocumentIndex + ?Sized,
    A: Authorizer + ?Sized,
{
    let Some(org) = authorization_org(scope, predicate)? else {
        return Ok(BTreeSet::new());
    };

    let permission = Permission::new(scope.action, org);
    if !scope.authorizer.permitted(scope.auth, &permission) {
        debug!(
            "event=authorize module=query status=denied ns={} user={} permission={} predicate_kind={}",
            scope.index.namespace(),
            scope.auth.user_id(),
            permission,
            predicate_kind(predicate)
        );
        return Ok(BTreeSet::new());
    }

    match predicate {
        // Resolve the name once; the authorized org is the one scanned.
        Predicate::OrgName(_) => scope.index.resolve(scope.exec, &IndexScope::Org(org)),
        _ => resolve_predicate(scope, predicate),
    }
}

/// Org whose permission guards `predicate`; `None` when nothing can match.
fn authorization_org<I, A>(
    scope: &EvalScope<'_, I, A>,
    predicate: &Predicate,
) -> StoreResult<Option<OrgId>>
where
    I: DocumentIndex + ?Sized,
    A: Authorizer + ?Sized,
{
    match predicate {
        Predicate::OrgId(org) => Ok(Some(*org)),
        Predicate::OrgName(name) => scope.index.find_org_by_name(scope.exec, name),
        Predicate::Id(id) => scope.index.document_owner(scope.exec, *id),
        Predicate::Label(name) => Err(StoreError::InvalidRequest(format!(
            "label predicate `{name}` has no org scope to authorize against"
        ))),
    }
}

fn predicate_kind(predicate: &Predicate) -> &'static str {
    match predicate {
        Predicate::OrgId(_) => "org_id",
        Predicate::OrgName(_) => "org_name",
        Predicate::Id(_) => "id",
        Predicate::Label(_) => "label",
    }
}

#[cfg(test)]
mod tests {
    use super::validate_query_options;
    use crate::model::org::OrgId;
    use crate::query::option::{DocumentOption, Predicate};
    use crate::store::StoreError;
    use uuid::Uuid;

    #[test]
    fn org_name_and_org_id_are_mutually_exclusive() {
        let err = validate_query_options(&[
            DocumentOption::authorized_where_org("acme"),
            DocumentOption::authorized_where_org_id(OrgId::new()),
        ])
        .unwrap_err();
        assert!(matches!(err, StoreError::InvalidRequest(_)));
    }

    #[test]
    fn mixed_wrapping_still_conflicts() {
        let err = validate_query_options(&[
            DocumentOption::where_org("acme"),
            DocumentOption::authorized_where_org_id(OrgId::new()),
        ])
        .unwrap_err();
        assert!(matches!(err, StoreError::InvalidRequest(_)));
    }

    #[test]
    fn two_org_ids_do_not_conflict() {
        validate_query_options(&[
            DocumentOption::authorized_where_org_id(OrgId::new()),
            DocumentOption::authorized_where_org_id(OrgId::new()),
        ])
        .expect("same-kind org predicates intersect instead of conflicting");
    }

    #[test]
    fn decorators_alone_are_rejected() {
        let err = validate_query_options(&[DocumentOption::include_content()]).unwrap_err();
        assert!(matches!(err, StoreError::InvalidRequest(_)));
    }

    #[test]
    fn write_options_are_rejected_in_queries() {
        let err = validate_query_options(&[
            DocumentOption::authorized_where_id(Uuid::new_v4()),
            DocumentOption::with_label("a"),
        ])
        .unwrap_err();
        assert!(matches!(err, StoreError::InvalidRequest(_)));
    }

    #[test]
    fn authorized_label_predicate_is_rejected() {
        let err = validate_query_options(&[DocumentOption::Authorized(Predicate::Label(
            "x".to_string(),
        ))])
        .unwrap_err();
        assert!(matches!(err, StoreError::InvalidRequest(_)));
    }
}
