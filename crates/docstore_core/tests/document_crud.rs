use docstore_core::db::{open_db, open_db_in_memory};
use docstore_core::{
    AuthorizationContext, CancelReason, Document, DocumentOption, DocumentOrder, DocumentService,
    ExecContext, Organization, PermissionAuthorizer, SqliteOrganizationRegistry, StoreError,
};
use rusqlite::Connection;
use serde_json::json;
use std::thread;
use std::time::{Duration, Instant};
use uuid::Uuid;

fn register_org(conn: &Connection, name: &str) -> Organization {
    SqliteOrganizationRegistry::new(conn)
        .create_organization(name)
        .unwrap()
}

fn count_rows(conn: &Connection, sql: &str) -> i64 {
    conn.query_row(sql, [], |row| row.get(0)).unwrap()
}

fn full_read(id: Uuid) -> [DocumentOption; 3] {
    [
        DocumentOption::authorized_where_id(id),
        DocumentOption::include_content(),
        DocumentOption::include_labels(),
    ]
}

#[test]
fn create_then_get_round_trips_content_and_label_order() {
    let conn = open_db_in_memory().unwrap();
    let acme = register_org(&conn, "acme");
    let service = DocumentService::new(PermissionAuthorizer);
    let store = service.create_document_store(&conn, "templates").unwrap();
    let exec = ExecContext::background();
    let auth = AuthorizationContext::org_member("ada", acme.id);

    let content = json!({"cells": [{"type": "markdown", "text": "hi"}], "version": 2});
    let mut document = Document::new("dashboard", content.clone());
    store
        .create_document(
            &exec,
            &auth,
            &mut document,
            &[
                DocumentOption::with_org_id(acme.id),
                DocumentOption::with_label("b"),
                DocumentOption::with_label(" a "),
                DocumentOption::with_label("b"),
                DocumentOption::with_label("c"),
            ],
        )
        .unwrap();
    assert!(document.has_id());
    assert_eq!(document.label_names(), vec!["b", "a", "c"]);

    let found = store
        .find_document(&exec, &auth, &full_read(document.id))
        .unwrap();
    assert_eq!(found.id, document.id);
    assert_eq!(found.meta.name, "dashboard");
    assert_eq!(found.content, Some(content));
    assert_eq!(found.label_names(), vec!["b", "a", "c"]);
}

#[test]
fn unrequested_projections_stay_absent() {
    let conn = open_db_in_memory().unwrap();
    let acme = register_org(&conn, "acme");
    let service = DocumentService::new(PermissionAuthorizer);
    let store = service.create_document_store(&conn, "templates").unwrap();
    let exec = ExecContext::background();
    let auth = AuthorizationContext::org_member("ada", acme.id);

    let mut document = Document::new("bare", json!({"k": 1}));
    store
        .create_document(
            &exec,
            &auth,
            &mut document,
            &[DocumentOption::with_org("acme"), DocumentOption::with_label("x")],
        )
        .unwrap();

    let found = store
        .find_document(&exec, &auth, &[DocumentOption::authorized_where_id(document.id)])
        .unwrap();
    assert_eq!(found.content, None);
    assert_eq!(found.labels, None);

    let mut empty = Document::new("no-labels", json!(null));
    store
        .create_document(&exec, &auth, &mut empty, &[DocumentOption::with_org_id(acme.id)])
        .unwrap();
    let found = store.find_document(&exec, &auth, &full_read(empty.id)).unwrap();
    assert_eq!(found.labels, Some(Vec::new()));
    assert_eq!(found.content, Some(json!(null)));
}

#[test]
fn create_requires_exactly_one_org_scope() {
    let conn = open_db_in_memory().unwrap();
    let acme = register_org(&conn, "acme");
    let service = DocumentService::new(PermissionAuthorizer);
    let store = service.create_document_store(&conn, "templates").unwrap();
    let exec = ExecContext::background();
    let auth = AuthorizationContext::org_member("ada", acme.id);

    let mut document = Document::new("orphan", json!({}));
    let err = store
        .create_document(&exec, &auth, &mut document, &[DocumentOption::with_label("a")])
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidRequest(_)));

    let err = store
        .create_document(
            &exec,
            &auth,
            &mut document,
            &[
                DocumentOption::with_org_id(acme.id),
                DocumentOption::with_org("acme"),
            ],
        )
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidRequest(_)));

    assert!(!document.has_id());
    assert_eq!(count_rows(&conn, "SELECT COUNT(*) FROM documents;"), 0);
    assert_eq!(count_rows(&conn, "SELECT COUNT(*) FROM labels;"), 0);
}

#[test]
fn blank_label_and_query_options_are_rejected_on_create() {
    let conn = open_db_in_memory().unwrap();
    let acme = register_org(&conn, "acme");
    let service = DocumentService::new(PermissionAuthorizer);
    let store = service.create_document_store(&conn, "templates").unwrap();
    let exec = ExecContext::background();
    let auth = AuthorizationContext::org_member("ada", acme.id);

    let mut document = Document::new("doc", json!({}));
    let err = store
        .create_document(
            &exec,
            &auth,
            &mut document,
            &[DocumentOption::with_org_id(acme.id), DocumentOption::with_label("  ")],
        )
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidRequest(_)));

    let err = store
        .create_document(
            &exec,
            &auth,
            &mut document,
            &[
                DocumentOption::with_org_id(acme.id),
                DocumentOption::include_content(),
            ],
        )
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidRequest(_)));
    assert_eq!(count_rows(&conn, "SELECT COUNT(*) FROM documents;"), 0);
}

#[test]
fn unknown_org_is_not_found_on_create() {
    let conn = open_db_in_memory().unwrap();
    let acme = register_org(&conn, "acme");
    let service = DocumentService::new(PermissionAuthorizer);
    let store = service.create_document_store(&conn, "templates").unwrap();
    let exec = ExecContext::background();
    let auth = AuthorizationContext::org_member("ada", acme.id);

    let mut document = Document::new("doc", json!({}));
    let err = store
        .create_document(&exec, &auth, &mut document, &[DocumentOption::with_org("globex")])
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
}

#[test]
fn ids_stay_reserved_after_delete() {
    let conn = open_db_in_memory().unwrap();
    let acme = register_org(&conn, "acme");
    let service = DocumentService::new(PermissionAuthorizer);
    let store = service.create_document_store(&conn, "templates").unwrap();
    let exec = ExecContext::background();
    let auth = AuthorizationContext::org_member("ada", acme.id);

    let fixed_id = Uuid::new_v4();
    let mut document = Document::new("fixed", json!(1));
    document.id = fixed_id;
    store
        .create_document(&exec, &auth, &mut document, &[DocumentOption::with_org_id(acme.id)])
        .unwrap();
    assert_eq!(document.id, fixed_id);

    let mut duplicate = Document::new("again", json!(2));
    duplicate.id = fixed_id;
    let err = store
        .create_document(&exec, &auth, &mut duplicate, &[DocumentOption::with_org_id(acme.id)])
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidRequest(_)));

    store.delete_document(&exec, &auth, fixed_id).unwrap();
    let err = store
        .create_document(&exec, &auth, &mut duplicate, &[DocumentOption::with_org_id(acme.id)])
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidRequest(_)));
}

#[test]
fn delete_then_get_is_not_found() {
    let conn = open_db_in_memory().unwrap();
    let acme = register_org(&conn, "acme");
    let service = DocumentService::new(PermissionAuthorizer);
    let store = service.create_document_store(&conn, "templates").unwrap();
    let exec = ExecContext::background();
    let auth = AuthorizationContext::org_member("ada", acme.id);

    let mut document = Document::new("short-lived", json!({}));
    store
        .create_document(
            &exec,
            &auth,
            &mut document,
            &[DocumentOption::with_org_id(acme.id), DocumentOption::with_label("tmp")],
        )
        .unwrap();

    store.delete_document(&exec, &auth, document.id).unwrap();
    let err = store
        .find_document(&exec, &auth, &full_read(document.id))
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));

    let err = store.delete_document(&exec, &auth, document.id).unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
    assert_eq!(count_rows(&conn, "SELECT COUNT(*) FROM document_labels;"), 0);
}

#[test]
fn update_replaces_content_and_labels_only_when_given() {
    let conn = open_db_in_memory().unwrap();
    let acme = register_org(&conn, "acme");
    let service = DocumentService::new(PermissionAuthorizer);
    let store = service.create_document_store(&conn, "templates").unwrap();
    let exec = ExecContext::background();
    let auth = AuthorizationContext::org_member("ada", acme.id);

    let mut document = Document::new("draft", json!({"v": 1}));
    store
        .create_document(
            &exec,
            &auth,
            &mut document,
            &[DocumentOption::with_org_id(acme.id), DocumentOption::with_label("a")],
        )
        .unwrap();

    document.meta.name = "final".to_string();
    document.content = Some(json!({"v": 2}));
    store.update_document(&exec, &auth, &document, &[]).unwrap();
    let found = store.find_document(&exec, &auth, &full_read(document.id)).unwrap();
    assert_eq!(found.meta.name, "final");
    assert_eq!(found.content, Some(json!({"v": 2})));
    assert_eq!(found.label_names(), vec!["a"]);

    store
        .update_document(
            &exec,
            &auth,
            &document,
            &[DocumentOption::with_label("z"), DocumentOption::with_label("y")],
        )
        .unwrap();
    let found = store.find_document(&exec, &auth, &full_read(document.id)).unwrap();
    assert_eq!(found.label_names(), vec!["z", "y"]);
}

#[test]
fn update_rejects_missing_ids_and_foreign_options() {
    let conn = open_db_in_memory().unwrap();
    let acme = register_org(&conn, "acme");
    let service = DocumentService::new(PermissionAuthorizer);
    let store = service.create_document_store(&conn, "templates").unwrap();
    let exec = ExecContext::background();
    let auth = AuthorizationContext::org_member("ada", acme.id);

    let unsaved = Document::new("unsaved", json!({}));
    let err = store.update_document(&exec, &auth, &unsaved, &[]).unwrap_err();
    assert!(matches!(err, StoreError::InvalidRequest(_)));

    let mut ghost = Document::new("ghost", json!({}));
    ghost.id = Uuid::new_v4();
    let err = store.update_document(&exec, &auth, &ghost, &[]).unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));

    let err = store
        .update_document(&exec, &auth, &ghost, &[DocumentOption::with_org_id(acme.id)])
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidRequest(_)));
}

#[test]
fn find_intersects_predicates_and_honors_order() {
    let conn = open_db_in_memory().unwrap();
    let acme = register_org(&conn, "acme");
    let service = DocumentService::new(PermissionAuthorizer);
    let store = service.create_document_store(&conn, "templates").unwrap();
    let exec = ExecContext::background();
    let auth = AuthorizationContext::org_member("ada", acme.id);

    for (name, label) in [("gamma", "hot"), ("alpha", "hot"), ("beta", "cold")] {
        let mut document = Document::new(name, json!({}));
        store
            .create_document(
                &exec,
                &auth,
                &mut document,
                &[DocumentOption::with_org_id(acme.id), DocumentOption::with_label(label)],
            )
            .unwrap();
    }

    let hot = store
        .find_documents(
            &exec,
            &auth,
            &[
                DocumentOption::authorized_where_org_id(acme.id),
                DocumentOption::where_label("hot"),
                DocumentOption::OrderBy(DocumentOrder::Name),
            ],
        )
        .unwrap();
    let names: Vec<&str> = hot.iter().map(|doc| doc.meta.name.as_str()).collect();
    assert_eq!(names, vec!["alpha", "gamma"]);

    let none = store
        .find_documents(
            &exec,
            &auth,
            &[
                DocumentOption::authorized_where_org("acme"),
                DocumentOption::where_label("missing"),
            ],
        )
        .unwrap();
    assert!(none.is_empty());
}

#[test]
fn bulk_delete_counts_and_tolerates_no_match() {
    let conn = open_db_in_memory().unwrap();
    let acme = register_org(&conn, "acme");
    let service = DocumentService::new(PermissionAuthorizer);
    let store = service.create_document_store(&conn, "templates").unwrap();
    let exec = ExecContext::background();
    let auth = AuthorizationContext::org_member("ada", acme.id);

    for name in ["one", "two"] {
        let mut document = Document::new(name, json!({}));
        store
            .create_document(
                &exec,
                &auth,
                &mut document,
                &[DocumentOption::with_org_id(acme.id), DocumentOption::with_label("bulk")],
            )
            .unwrap();
    }

    let deleted = store
        .delete_documents(
            &exec,
            &auth,
            &[
                DocumentOption::authorized_where_org_id(acme.id),
                DocumentOption::where_label("bulk"),
            ],
        )
        .unwrap();
    assert_eq!(deleted, 2);

    let deleted = store
        .delete_documents(&exec, &auth, &[DocumentOption::authorized_where_org_id(acme.id)])
        .unwrap();
    assert_eq!(deleted, 0);
}

#[test]
fn namespaces_are_isolated_and_labels_shared_within_one() {
    let conn = open_db_in_memory().unwrap();
    let acme = register_org(&conn, "acme");
    let service = DocumentService::new(PermissionAuthorizer);
    let templates = service.create_document_store(&conn, "templates").unwrap();
    let notebooks = service.create_document_store(&conn, "notebooks").unwrap();
    let exec = ExecContext::background();
    let auth = AuthorizationContext::org_member("ada", acme.id);
    let owner = [DocumentOption::with_org_id(acme.id), DocumentOption::with_label("shared")];

    let mut first = Document::new("first", json!({}));
    templates.create_document(&exec, &auth, &mut first, &owner).unwrap();
    let mut second = Document::new("second", json!({}));
    templates.create_document(&exec, &auth, &mut second, &owner).unwrap();
    let first_label = first.labels.as_ref().unwrap()[0].id;
    let second_label = second.labels.as_ref().unwrap()[0].id;
    assert_eq!(first_label, second_label);

    let err = notebooks
        .find_document(&exec, &auth, &full_read(first.id))
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
    let listed = notebooks
        .find_documents(&exec, &auth, &[DocumentOption::authorized_where_org_id(acme.id)])
        .unwrap();
    assert!(listed.is_empty());
}

#[test]
fn cancelled_context_persists_nothing() {
    let conn = open_db_in_memory().unwrap();
    let acme = register_org(&conn, "acme");
    let service = DocumentService::new(PermissionAuthorizer);
    let store = service.create_document_store(&conn, "templates").unwrap();
    let auth = AuthorizationContext::org_member("ada", acme.id);

    let exec = ExecContext::background();
    exec.cancel_handle().cancel();

    let mut document = Document::new("never", json!({}));
    let err = store
        .create_document(
            &exec,
            &auth,
            &mut document,
            &[DocumentOption::with_org_id(acme.id), DocumentOption::with_label("a")],
        )
        .unwrap_err();
    assert!(matches!(err, StoreError::Cancelled(_)));
    assert!(!document.has_id());
    assert_eq!(count_rows(&conn, "SELECT COUNT(*) FROM documents;"), 0);

    let err = store
        .find_documents(&exec, &auth, &[DocumentOption::authorized_where_org_id(acme.id)])
        .unwrap_err();
    assert!(matches!(err, StoreError::Cancelled(_)));
}

#[test]
fn cancelling_a_running_create_rolls_back_every_row() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("docs.sqlite3");
    let conn = open_db(&path).unwrap();
    let acme = register_org(&conn, "acme");
    let service = DocumentService::new(PermissionAuthorizer);
    let store = service.create_document_store(&conn, "templates").unwrap();
    let auth = AuthorizationContext::org_member("ada", acme.id);

    let exec = ExecContext::background();
    let cancel = exec.cancel_handle();
    let watched = path.clone();
    // A second connection sees the create's write lock only while its
    // transaction is open; cancel at that point.
    let watcher = thread::spawn(move || {
        let other = Connection::open(&watched).unwrap();
        let started_at = Instant::now();
        while started_at.elapsed() < Duration::from_secs(30) {
            if other.execute_batch("BEGIN IMMEDIATE; ROLLBACK;").is_err() {
                cancel.cancel();
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }
        false
    });

    let mut options = vec![DocumentOption::with_org_id(acme.id)];
    options.extend((0..50_000).map(|n| DocumentOption::with_label(format!("label-{n}"))));
    let mut document = Document::new("huge", json!({"cells": []}));
    let err = store
        .create_document(&exec, &auth, &mut document, &options)
        .unwrap_err();

    assert!(watcher.join().unwrap(), "write transaction was never observed");
    assert!(matches!(err, StoreError::Cancelled(CancelReason::Cancelled)));
    assert!(!document.has_id());
    assert_eq!(count_rows(&conn, "SELECT COUNT(*) FROM documents;"), 0);
    assert_eq!(count_rows(&conn, "SELECT COUNT(*) FROM document_labels;"), 0);
    assert_eq!(count_rows(&conn, "SELECT COUNT(*) FROM labels;"), 0);

    // The connection is usable again after the rollback.
    let mut retry = Document::new("small", json!({}));
    store
        .create_document(
            &ExecContext::background(),
            &auth,
            &mut retry,
            &[DocumentOption::with_org_id(acme.id), DocumentOption::with_label("a")],
        )
        .unwrap();
    assert_eq!(count_rows(&conn, "SELECT COUNT(*) FROM document_labels;"), 1);
}

#[test]
fn expired_deadline_is_reported_as_cancelled() {
    let conn = open_db_in_memory().unwrap();
    let acme = register_org(&conn, "acme");
    let service = DocumentService::new(PermissionAuthorizer);
    let store = service.create_document_store(&conn, "templates").unwrap();
    let auth = AuthorizationContext::org_member("ada", acme.id);

    let exec = ExecContext::background().with_timeout(Duration::ZERO);
    let err = store
        .find_documents(&exec, &auth, &[DocumentOption::authorized_where_org_id(acme.id)])
        .unwrap_err();
    assert!(matches!(err, StoreError::Cancelled(_)));
}
