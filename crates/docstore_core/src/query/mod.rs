//! Composable query options and their evaluator.
//!
//! # Responsibility
//! - Model predicates, decorators and authorization wrappers as plain data.
//! - Evaluate an ordered option list against a `DocumentIndex`.
//!
//! # Invariants
//! - Options are evaluated strictly in caller order.
//! - Conflicting or misplaced options are rejected before the index is used.
//! - Authorization denial narrows to the empty set; it is never an error.

pub mod decorator;
pub mod evaluate;
pub mod option;
