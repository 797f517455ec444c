//! The outward store operations driven end to end over an in-memory
//! workbook: creation, routing, caching, read-only mode, and queries.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use epicsheet_core::backend::{BackendError, Rows, SheetBackend};
use epicsheet_core::backend::memory::{MemoryBackend, Op};
use epicsheet_core::config::StoreConfig;
use epicsheet_core::model::{EpicState, NewEpic, NewStatusUpdate, Platform, StatusPatch, UpdateKind};
use epicsheet_core::quarter::{current_quarter, partition_name};
use epicsheet_core::{EpicStore, StoreError, query, workflow};

fn open(backend: &Arc<MemoryBackend>, config: StoreConfig) -> EpicStore {
    let dyn_backend: Arc<dyn SheetBackend> = backend.clone();
    EpicStore::new(dyn_backend, config)
}

fn fresh_store() -> (Arc<MemoryBackend>, EpicStore) {
    let backend = Arc::new(MemoryBackend::new());
    let store = open(&backend, StoreConfig::default());
    store.init_workbook().expect("init");
    (backend, store)
}

fn new_epic(url: &str) -> NewEpic {
    NewEpic {
        epic_name: "Checkout redesign".into(),
        epic_url: url.into(),
        ios_assignee: "@kim".into(),
        android_assignee: "@lee".into(),
        js_assignee: "@park".into(),
        start_date: "2025-04-01".into(),
        target_date: "2025-06-30".into(),
        author: "@kim".into(),
        ..NewEpic::default()
    }
}

// ---------------------------------------------------------------------------
// Creation
// ---------------------------------------------------------------------------

#[test]
fn init_creates_tables_at_target_version() {
    let backend = Arc::new(MemoryBackend::new());
    let store = open(&backend, StoreConfig::default());
    let created = store.init_workbook().expect("init");
    assert_eq!(created, ["Epics", "Epic_Status", "Metadata"]);
    assert!(store.init_workbook().expect("again").is_empty());
    assert_eq!(store.stored_version().expect("version").to_string(), "1.1.0");
}

#[test]
fn create_then_read_back() {
    let (backend, store) = fresh_store();
    let id = store
        .create_work_item(&new_epic("https://x/browse/PROJ-7"))
        .expect("create");
    assert_eq!(id, "PROJ-7");

    let partition = partition_name("Status_Updates_", Some(current_quarter()));
    let log = backend.sheet(&partition).expect("partition created on demand");
    assert_eq!(log.len(), 2);
    assert_eq!(log[1][2], "status_change");
    assert_eq!(log[1][4], "Epic created: Checkout redesign");

    let data = store.fetch_all_data().expect("read");
    let epic = data.epic("PROJ-7").expect("epic");
    assert_eq!(epic.current_status, EpicState::Backlog);
    assert_eq!(epic.created_quarter, Some(current_quarter()));
    assert_eq!(data.statuses.len(), 1);
    let status = data.status("PROJ-7").expect("status");
    assert_eq!(status.overall_status, "backlog");
    assert_eq!(status.last_comment, "Epic created");
    assert_eq!(
        (status.ios_progress, status.android_progress, status.js_progress),
        (0, 0, 0)
    );
    assert_eq!(data.updates_for("PROJ-7").count(), 1);
}

#[test]
fn duplicate_and_malformed_urls_are_rejected() {
    let (backend, store) = fresh_store();
    store
        .create_work_item(&new_epic("https://x/browse/PROJ-7"))
        .expect("create");
    let err = store
        .create_work_item(&new_epic("https://y/browse/PROJ-7"))
        .expect_err("duplicate");
    assert!(matches!(err, StoreError::DuplicateWorkItem(_)));

    backend.reset_calls();
    let err = store
        .create_work_item(&new_epic("https://x/issues/7"))
        .expect_err("bad url");
    assert!(matches!(err, StoreError::InvalidUrl(_)));
    assert_eq!(backend.total_calls(), 0);
}

#[test]
fn audit_event_failure_does_not_fail_creation() {
    let (backend, store) = fresh_store();
    backend.fail_next(
        Op::CreateSheet,
        "Status_Updates_",
        epicsheet_core::backend::BackendError::Transport("timeout".into()),
    );
    let id = store
        .create_work_item(&new_epic("https://x/browse/PROJ-8"))
        .expect("created despite audit failure");
    assert_eq!(id, "PROJ-8");
    assert!(store.find_epic("PROJ-8").expect("lookup").is_some());
}

// ---------------------------------------------------------------------------
// Blockers
// ---------------------------------------------------------------------------

#[test]
fn resolved_blocker_is_no_longer_reported() {
    let (_backend, store) = fresh_store();
    store
        .create_work_item(&new_epic("https://x/browse/PROJ-7"))
        .expect("create");

    workflow::report_blocker(&store, "PROJ-7", Platform::Ios, "signing cert expired", "@kim")
        .expect("block");
    let open = query::unresolved_blockers(&store.fetch_all_data().expect("read"));
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].epic_name, "Checkout redesign");

    // Resolution must carry a strictly later timestamp.
    thread::sleep(Duration::from_millis(5));
    workflow::resolve_blocker(&store, "https://x/browse/PROJ-7", Platform::Ios, "renewed", "@kim")
        .expect("resolve");
    let data = store.fetch_all_data().expect("read");
    assert!(query::unresolved_blockers(&data).is_empty());
    assert_eq!(
        data.status("PROJ-7").map(|s| s.last_comment.as_str()),
        Some("[iOS] blocker resolved: renewed")
    );
}

#[test]
fn resolution_on_another_platform_leaves_blocker_open() {
    let (_backend, store) = fresh_store();
    store
        .create_work_item(&new_epic("https://x/browse/PROJ-7"))
        .expect("create");
    workflow::report_blocker(&store, "PROJ-7", Platform::Android, "emulator crash", "@lee")
        .expect("block");
    thread::sleep(Duration::from_millis(5));
    workflow::resolve_blocker(&store, "PROJ-7", Platform::Ios, "unrelated", "@kim").expect("resolve");
    let data = store.fetch_all_data().expect("read");
    assert_eq!(query::unresolved_blockers(&data)[0].blockers.len(), 1);
}

// ---------------------------------------------------------------------------
// Status and progress
// ---------------------------------------------------------------------------

#[test]
fn status_change_is_visible_everywhere() {
    let (_backend, store) = fresh_store();
    store
        .create_work_item(&new_epic("https://x/browse/PROJ-7"))
        .expect("create");
    workflow::change_status(&store, "PROJ-7", EpicState::Development, Some("kickoff done"), "@kim")
        .expect("status");
    workflow::record_progress(&store, "PROJ-7", Platform::Js, 35, None, "@park").expect("progress");

    let data = store.fetch_all_data().expect("read");
    let details = query::epic_details(&data, "PROJ-7").expect("details");
    assert_eq!(details.overview.epic.current_status, EpicState::Development);
    let status = details.overview.status.expect("snapshot");
    assert_eq!(status.overall_status, "development");
    assert_eq!(status.js_progress, 35);
    assert_eq!(details.recent_updates.len(), 3);

    let team = query::team_progress(&data);
    assert_eq!(team.active_epics, 1);
    assert_eq!(team.average_progress.js, 35);

    let history = store.fetch_event_history("PROJ-7").expect("history");
    assert_eq!(history.len(), 3);
    assert_eq!(history[1].message, "Status changed: development - kickoff done");
}

#[test]
fn empty_partition_is_no_events_but_failures_propagate() {
    let (backend, store) = fresh_store();
    store
        .create_work_item(&new_epic("https://x/browse/PROJ-7"))
        .expect("create");
    let partition = partition_name("Status_Updates_", Some(current_quarter()));
    backend.seed(&partition, &[]);
    assert!(store.fetch_event_history("PROJ-7").expect("empty").is_empty());

    backend.fail_next(
        Op::Read,
        &partition,
        epicsheet_core::backend::BackendError::Status {
            code: 500,
            body: "boom".into(),
        },
    );
    assert!(store.fetch_event_history("PROJ-7").is_err());
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

#[test]
fn cache_expires_after_ttl() {
    let backend = Arc::new(MemoryBackend::new());
    let config = StoreConfig {
        cache_ttl_ms: 50,
        ..StoreConfig::default()
    };
    let store = open(&backend, config);
    store.init_workbook().expect("init");

    store.fetch_all_data().expect("read");
    let reads = backend.calls(Op::BatchRead);
    store.fetch_all_data().expect("cached");
    assert_eq!(backend.calls(Op::BatchRead), reads);

    thread::sleep(Duration::from_millis(120));
    store.fetch_all_data().expect("expired");
    assert_eq!(backend.calls(Op::BatchRead), reads + 1);
}

#[test]
fn every_write_invalidates_the_snapshot() {
    let (_backend, store) = fresh_store();
    store
        .create_work_item(&new_epic("https://x/browse/PROJ-7"))
        .expect("create");
    let before = store.fetch_all_data().expect("read");

    store
        .update_status_snapshot("PROJ-7", &StatusPatch::default().progress(Platform::Ios, 90))
        .expect("snapshot");
    let after = store.fetch_all_data().expect("read");
    assert_eq!(before.status("PROJ-7").map(|s| s.ios_progress), Some(0));
    assert_eq!(after.status("PROJ-7").map(|s| s.ios_progress), Some(90));

    store
        .append_event(NewStatusUpdate::new("PROJ-7", UpdateKind::Comment, "note", "@kim"))
        .expect("event");
    assert_eq!(store.fetch_all_data().expect("read").updates.len(), 2);
}

/// Holds one armed `batch_read` after it has read, until the test lets it
/// return.
struct PausingBackend {
    inner: Arc<MemoryBackend>,
    armed: AtomicBool,
    read_done: Barrier,
    resume: Barrier,
}

impl PausingBackend {
    fn new(inner: Arc<MemoryBackend>) -> Self {
        Self {
            inner,
            armed: AtomicBool::new(false),
            read_done: Barrier::new(2),
            resume: Barrier::new(2),
        }
    }
}

impl SheetBackend for PausingBackend {
    fn batch_read(&self, ranges: &[String]) -> Result<Vec<Rows>, BackendError> {
        let result = self.inner.batch_read(ranges);
        if self.armed.swap(false, Ordering::SeqCst) {
            self.read_done.wait();
            self.resume.wait();
        }
        result
    }

    fn read_range(&self, range: &str) -> Result<Rows, BackendError> {
        self.inner.read_range(range)
    }

    fn write_range(&self, range: &str, rows: &[Vec<String>]) -> Result<(), BackendError> {
        self.inner.write_range(range, rows)
    }

    fn append_range(&self, range: &str, rows: &[Vec<String>]) -> Result<(), BackendError> {
        self.inner.append_range(range, rows)
    }

    fn list_sheets(&self) -> Result<Vec<String>, BackendError> {
        self.inner.list_sheets()
    }

    fn create_sheet(&self, name: &str) -> Result<(), BackendError> {
        self.inner.create_sheet(name)
    }

    fn is_writable(&self) -> bool {
        self.inner.is_writable()
    }
}

#[test]
fn write_during_read_is_not_masked_by_the_cache() {
    let backend = Arc::new(PausingBackend::new(Arc::new(MemoryBackend::new())));
    let dyn_backend: Arc<dyn SheetBackend> = backend.clone();
    let store = Arc::new(EpicStore::new(dyn_backend, StoreConfig::default()));
    store.init_workbook().expect("init");
    store
        .create_work_item(&new_epic("https://x/browse/PROJ-1"))
        .expect("create");

    backend.armed.store(true, Ordering::SeqCst);
    let reader = {
        let store = Arc::clone(&store);
        thread::spawn(move || store.fetch_all_data().expect("read"))
    };

    // The reader now holds pre-write rows and has not cached them yet.
    backend.read_done.wait();
    store
        .update_status_snapshot("PROJ-1", &StatusPatch::default().progress(Platform::Ios, 90))
        .expect("write");
    backend.resume.wait();

    let stale = reader.join().expect("reader thread");
    assert_eq!(stale.status("PROJ-1").map(|s| s.ios_progress), Some(0));

    let data = store.fetch_all_data().expect("read after write");
    assert_eq!(data.statuses.len(), 1);
    assert_eq!(data.status("PROJ-1").map(|s| s.ios_progress), Some(90));
}

// ---------------------------------------------------------------------------
// Read-only mode
// ---------------------------------------------------------------------------

#[test]
fn read_only_writes_fail_before_any_backend_call() {
    let backend = Arc::new(MemoryBackend::read_only());
    let store = open(&backend, StoreConfig::default());

    let results = [
        store
            .update_status_snapshot("PROJ-1", &StatusPatch::default().comment("x"))
            .map(|_| ()),
        store
            .append_event(NewStatusUpdate::new("PROJ-1", UpdateKind::Comment, "x", "@a"))
            .map(|_| ()),
        store
            .change_work_item_status("PROJ-1", EpicState::Done)
            .map(|_| ()),
        store
            .create_work_item(&new_epic("https://x/browse/PROJ-1"))
            .map(|_| ()),
        store.init_workbook().map(|_| ()),
    ];
    for result in results {
        assert!(matches!(result, Err(StoreError::AuthRequired)));
    }
    assert_eq!(backend.total_calls(), 0);
}
