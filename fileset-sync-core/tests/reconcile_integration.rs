use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use fileset_sync_core::contract::{MockObjectStore, ObjectMetadata, PutObjectOutput, PutObjectRequest};
use fileset_sync_core::diagnostics::Severity;
use fileset_sync_core::publish::ConfirmationPolicy;
use fileset_sync_core::{
    Attr, FilesetConfiguration, FilesetIdentity, Operation, OperationContext, PersistedState,
    Reconciler, StateChange, StoreError,
};
use tempfile::{tempdir, TempDir};

fn write(root: &Path, rel: &str, contents: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

/// Mirrors the acceptance fixtures: a text file and a script under `fixtures/`.
fn fixture_dir() -> TempDir {
    let dir = tempdir().unwrap();
    write(dir.path(), "fixtures/hello.txt", "Hello, world!\n");
    write(dir.path(), "fixtures/static/main.js", "console.log('hello');\n");
    write(dir.path(), "fixtures/static/ignored.css", "body {}\n");
    dir
}

fn fast_policy() -> ConfirmationPolicy {
    ConfirmationPolicy {
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(2),
        ceiling: Duration::from_millis(50),
    }
}

/// A mock store that accepts every write, records it, and confirms at once.
fn recording_store() -> (MockObjectStore, Arc<Mutex<Vec<PutObjectRequest>>>) {
    let puts = Arc::new(Mutex::new(Vec::new()));
    let sink = puts.clone();
    let mut store = MockObjectStore::new();
    store.expect_put_object().returning(move |req| {
        sink.lock().unwrap().push(req);
        Ok(PutObjectOutput {
            etag: Some("\"abc\"".into()),
        })
    });
    store
        .expect_head_object()
        .returning(|_, _| Ok(Some(ObjectMetadata::default())));
    (store, puts)
}

fn reconciler(store: MockObjectStore, root: &Path) -> Reconciler<MockObjectStore> {
    Reconciler::new(store)
        .with_root(root)
        .with_confirmation_policy(fast_policy())
}

fn base_config() -> FilesetConfiguration {
    FilesetConfiguration::new("acc-bucket", "**/*.{txt,js}")
        .with_cache_control(Attr::Value("max-age=0".into()))
        .with_tag("hello", "world")
}

#[tokio::test]
async fn create_uploads_every_file_and_persists_digests() {
    let dir = fixture_dir();
    let (store, puts) = recording_store();
    let reconciler = reconciler(store, dir.path());
    let desired = base_config();

    let outcome = reconciler
        .reconcile(Operation::Create { desired: &desired }, &OperationContext::background())
        .await;

    assert!(outcome.is_success(), "diagnostics: {:?}", outcome.diagnostics);
    let state = outcome.written_state().expect("create should write state");
    assert_eq!(state.identity, FilesetIdentity::of(&desired));
    assert_eq!(state.file_digests.len(), 2);
    for (path, digest) in &state.file_digests {
        assert!(!path.starts_with('/'), "absolute path leaked: {path}");
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    }

    let puts = puts.lock().unwrap();
    let mut seen: Vec<(&str, &str)> = puts
        .iter()
        .map(|p| (p.key.as_str(), p.content_type.as_str()))
        .collect();
    seen.sort();
    assert_eq!(
        seen,
        vec![
            ("fixtures/hello.txt", "text/plain; charset=utf-8"),
            ("fixtures/static/main.js", "application/javascript"),
        ]
    );
    assert!(puts
        .iter()
        .all(|p| p.cache_control.as_deref() == Some("max-age=0")
            && p.tagging.as_deref() == Some("hello=world")
            && p.bucket == "acc-bucket"));

    let report = outcome.report.expect("converge report");
    assert_eq!(report.uploads.len(), 2);
}

#[tokio::test]
async fn read_without_local_changes_is_byte_identical() {
    let dir = fixture_dir();
    let (store, puts) = recording_store();
    let reconciler = reconciler(store, dir.path());
    let desired = base_config();
    let ctx = OperationContext::background();

    let created = reconciler
        .reconcile(Operation::Create { desired: &desired }, &ctx)
        .await;
    let prior = created.written_state().unwrap().clone();
    let uploads_after_create = puts.lock().unwrap().len();

    let read = reconciler
        .reconcile(Operation::Read { prior: &prior, desired: &desired }, &ctx)
        .await;
    assert_eq!(read.state, StateChange::Write(prior.clone()));

    let again = reconciler
        .reconcile(Operation::Read { prior: &prior, desired: &desired }, &ctx)
        .await;
    assert_eq!(again.written_state(), Some(&prior));

    assert_eq!(puts.lock().unwrap().len(), uploads_after_create, "read must not upload");
}

#[tokio::test]
async fn read_exposes_local_drift_without_writing() {
    let dir = fixture_dir();
    let (store, puts) = recording_store();
    let reconciler = reconciler(store, dir.path());
    let desired = base_config();
    let ctx = OperationContext::background();

    let created = reconciler
        .reconcile(Operation::Create { desired: &desired }, &ctx)
        .await;
    let prior = created.written_state().unwrap().clone();

    write(dir.path(), "fixtures/hello.txt", "Hello again\n");
    write(dir.path(), "fixtures/new.txt", "brand new\n");

    let read = reconciler
        .reconcile(Operation::Read { prior: &prior, desired: &desired }, &ctx)
        .await;
    let refreshed = read.written_state().unwrap();
    assert_eq!(refreshed.identity, prior.identity);
    assert_eq!(refreshed.file_digests.len(), 3);
    assert_ne!(
        refreshed.file_digests["fixtures/hello.txt"],
        prior.file_digests["fixtures/hello.txt"]
    );
    assert_eq!(puts.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn prefix_change_yields_new_identity_and_prefixed_keys() {
    let dir = fixture_dir();
    let (store, puts) = recording_store();
    let reconciler = reconciler(store, dir.path());
    let ctx = OperationContext::background();

    let initial = FilesetConfiguration::new("B", "**/*.txt");
    let created = reconciler
        .reconcile(Operation::Create { desired: &initial }, &ctx)
        .await;
    let prior = created.written_state().unwrap().clone();

    let prefixed = initial.clone().with_prefix("updated");
    let updated = reconciler
        .reconcile(Operation::Update { prior: &prior, desired: &prefixed }, &ctx)
        .await;
    let next = updated.written_state().unwrap();

    assert_ne!(next.identity, prior.identity);
    let keys: Vec<String> = puts.lock().unwrap().iter().map(|p| p.key.clone()).collect();
    assert_eq!(keys, vec!["fixtures/hello.txt", "updated/fixtures/hello.txt"]);
}

#[tokio::test]
async fn tag_change_keeps_identity_and_republishes_everything() {
    let dir = fixture_dir();
    let (store, puts) = recording_store();
    let reconciler = reconciler(store, dir.path());
    let ctx = OperationContext::background();

    let initial = FilesetConfiguration::new("B", "**/*.txt");
    let created = reconciler
        .reconcile(Operation::Create { desired: &initial }, &ctx)
        .await;
    let prior = created.written_state().unwrap().clone();

    let retagged = initial.clone().with_tag("team", "web");
    let updated = reconciler
        .reconcile(Operation::Update { prior: &prior, desired: &retagged }, &ctx)
        .await;

    assert_eq!(updated.written_state().unwrap().identity, prior.identity);
    let puts = puts.lock().unwrap();
    assert_eq!(puts.len(), 2, "update republishes the whole fileset");
    assert_eq!(puts[1].tagging.as_deref(), Some("team=web"));
}

#[tokio::test]
async fn create_with_no_matches_persists_nothing() {
    let dir = fixture_dir();
    let mut store = MockObjectStore::new();
    store.expect_put_object().never();
    let reconciler = reconciler(store, dir.path());
    let desired = FilesetConfiguration::new("B", "nonexistent/**/*.xyz");

    let outcome = reconciler
        .reconcile(Operation::Create { desired: &desired }, &OperationContext::background())
        .await;

    assert_eq!(outcome.state, StateChange::Keep);
    let errors: Vec<_> = outcome.diagnostics.errors().collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].summary, "Local files error");
}

#[tokio::test]
async fn upload_failure_surfaces_error_and_keeps_prior_state() {
    let dir = fixture_dir();
    let mut store = MockObjectStore::new();
    store.expect_put_object().times(1).returning(|req| {
        Err(StoreError::Network {
            message: format!("connection reset writing {}", req.key),
            retryable: true,
        })
    });
    store.expect_head_object().never();
    let reconciler = reconciler(store, dir.path());
    let desired = base_config();
    let prior = PersistedState::imported(FilesetIdentity::of(&desired));

    let outcome = reconciler
        .reconcile(Operation::Update { prior: &prior, desired: &desired }, &OperationContext::background())
        .await;

    assert_eq!(outcome.state, StateChange::Keep);
    let error = outcome.diagnostics.errors().next().unwrap();
    assert_eq!(error.summary, "Upload error");
    assert!(error.detail.contains("fixtures/hello.txt"));
}

#[tokio::test]
async fn delete_only_warns_and_removes_record() {
    let mut store = MockObjectStore::new();
    store.expect_put_object().never();
    store.expect_head_object().never();
    let reconciler = Reconciler::new(store);
    let prior = PersistedState::imported(FilesetIdentity::derive("B", "**/*.txt", ""));

    let outcome = reconciler
        .reconcile(Operation::Delete { prior: &prior }, &OperationContext::background())
        .await;

    assert_eq!(outcome.state, StateChange::Remove);
    assert!(outcome.is_success());
    let warnings: Vec<_> = outcome.diagnostics.warnings().collect();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].severity, Severity::Warning);
    assert_eq!(warnings[0].summary, "Not deleting files");
}

#[tokio::test]
async fn import_adopts_identity_and_next_read_fills_digests() {
    let dir = fixture_dir();
    let mut store = MockObjectStore::new();
    store.expect_put_object().never();
    let reconciler = reconciler(store, dir.path());
    let ctx = OperationContext::background();

    let imported = reconciler
        .reconcile(Operation::Import { identity: "external-id" }, &ctx)
        .await;
    let prior = imported.written_state().unwrap().clone();
    assert_eq!(prior.identity.as_str(), "external-id");
    assert!(prior.file_digests.is_empty());

    let desired = FilesetConfiguration::new("B", "**/*.txt");
    let read = reconciler
        .reconcile(Operation::Read { prior: &prior, desired: &desired }, &ctx)
        .await;
    let refreshed = read.written_state().unwrap();
    assert_eq!(refreshed.identity, FilesetIdentity::of(&desired));
    assert_eq!(refreshed.file_digests.len(), 1);
}

#[tokio::test]
async fn import_with_empty_identity_is_rejected() {
    let reconciler = Reconciler::new(MockObjectStore::new());
    let outcome = reconciler
        .reconcile(Operation::Import { identity: "  " }, &OperationContext::background())
        .await;
    assert_eq!(outcome.state, StateChange::Keep);
    assert_eq!(
        outcome.diagnostics.errors().next().unwrap().summary,
        "Host protocol error"
    );
}

#[tokio::test]
async fn cancellation_aborts_converge() {
    let dir = fixture_dir();
    let mut store = MockObjectStore::new();
    store.expect_put_object().never();
    let reconciler = reconciler(store, dir.path());
    let (ctx, handle) = OperationContext::cancellable();
    handle.cancel();

    let outcome = reconciler
        .reconcile(Operation::Create { desired: &base_config() }, &ctx)
        .await;
    assert_eq!(outcome.state, StateChange::Keep);
    assert_eq!(
        outcome.diagnostics.errors().next().unwrap().summary,
        "Operation cancelled"
    );
}

#[cfg(unix)]
#[tokio::test]
async fn unreadable_file_fails_create_without_uploading() {
    let dir = fixture_dir();
    std::os::unix::fs::symlink(
        dir.path().join("gone.txt"),
        dir.path().join("fixtures/broken.txt"),
    )
    .unwrap();
    let mut store = MockObjectStore::new();
    store.expect_put_object().never();
    store.expect_head_object().never();
    let reconciler = reconciler(store, dir.path());

    let outcome = reconciler
        .reconcile(Operation::Create { desired: &base_config() }, &OperationContext::background())
        .await;

    assert_eq!(outcome.state, StateChange::Keep);
    assert!(outcome.report.is_none());
    let error = outcome.diagnostics.errors().next().unwrap();
    assert_eq!(error.summary, "Local files error");
    assert!(error.detail.contains("fixtures/broken.txt"), "detail: {}", error.detail);
}

#[cfg(unix)]
#[tokio::test]
async fn symlinked_file_is_published_under_its_link_path() {
    let dir = fixture_dir();
    write(dir.path(), "shared/banner.txt", "banner\n");
    std::os::unix::fs::symlink(
        dir.path().join("shared/banner.txt"),
        dir.path().join("fixtures/banner.txt"),
    )
    .unwrap();
    let (store, puts) = recording_store();
    let reconciler = reconciler(store, dir.path());
    let desired = FilesetConfiguration::new("B", "fixtures/*.txt");

    let outcome = reconciler
        .reconcile(Operation::Create { desired: &desired }, &OperationContext::background())
        .await;

    assert!(outcome.is_success(), "diagnostics: {:?}", outcome.diagnostics);
    let keys: Vec<String> = puts.lock().unwrap().iter().map(|p| p.key.clone()).collect();
    assert_eq!(keys, vec!["fixtures/banner.txt", "fixtures/hello.txt"]);
}
