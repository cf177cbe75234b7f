//! Integration tests for list controllers with time tracking.
//!
//! Controllers run against the local backend over a shared in-memory store,
//! with a manual clock and scheduler so sessions are fully deterministic.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use quadtodo_core::{
    display_label, Category, FileStore, ItemId, KeyValueStore, ListContext, ListController,
    LocalBackend, ManualClock, ManualScheduler, MemoryStore, TodoItem,
};
use tempfile::TempDir;

// ============================================================================
// Helper Functions
// ============================================================================

type LocalController = ListController<LocalBackend<MemoryStore>>;

struct Fixture {
    clock: ManualClock,
    scheduler: ManualScheduler,
    store: MemoryStore,
    context: ListContext,
}

impl Fixture {
    fn new() -> Self {
        let clock = ManualClock::new(Utc.timestamp_opt(1_700_000_000, 0).unwrap());
        let scheduler = ManualScheduler::new();
        let context = ListContext::new(Arc::new(clock.clone()), Arc::new(scheduler.clone()));
        Self {
            clock,
            scheduler,
            store: MemoryStore::new(),
            context,
        }
    }

    fn controller(&self, category: Category) -> LocalController {
        ListController::new(
            category,
            Arc::new(LocalBackend::new(self.store.clone())),
            &self.context,
        )
    }
}

fn id_of(controller: &LocalController, name: &str) -> ItemId {
    controller
        .items()
        .iter()
        .find(|i| i.name == name)
        .map(|i| i.id.clone())
        .unwrap_or_else(|| panic!("no item named {name}"))
}

fn item<'a>(controller: &'a LocalController, name: &str) -> &'a TodoItem {
    controller
        .items()
        .iter()
        .find(|i| i.name == name)
        .unwrap_or_else(|| panic!("no item named {name}"))
}

fn running_count(controller: &LocalController) -> usize {
    controller.items().iter().filter(|i| i.is_running()).count()
}

fn assert_partitioned(controller: &LocalController) {
    let items = controller.items();
    if let Some(boundary) = items.iter().position(|i| i.done) {
        assert!(
            items[boundary..].iter().all(|i| i.done),
            "not-done item after a done item"
        );
    }
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn test_track_65_seconds() {
    let fx = Fixture::new();
    let mut list = fx.controller(Category::ImportantUrgent);

    list.add("Write report").await.unwrap();
    let id = id_of(&list, "Write report");
    list.start(&id).await.unwrap();
    fx.clock.advance(Duration::from_millis(65_400));
    list.stop(&id).await.unwrap();

    let report = item(&list, "Write report");
    assert_eq!(report.total_time, 65);
    assert!(report.current_session_start.is_none());
    assert!(!report.done);
    assert_eq!(display_label(report.total_time).as_deref(), Some("a minute (65s)"));
    assert_eq!(fx.scheduler.live_count(), 0);
}

#[tokio::test]
async fn test_start_switches_active_item() {
    let fx = Fixture::new();
    let mut list = fx.controller(Category::ImportantUrgent);

    list.add("A").await.unwrap();
    list.add("B").await.unwrap();
    let a = id_of(&list, "A");
    let b = id_of(&list, "B");

    list.start(&a).await.unwrap();
    fx.clock.advance_secs(20);
    list.start(&b).await.unwrap();
    fx.clock.advance_secs(100);

    assert_eq!(item(&list, "A").total_time, 20);
    assert!(item(&list, "A").current_session_start.is_none());
    assert_eq!(list.active_item().map(|i| i.id.clone()), Some(b));
    assert_eq!(running_count(&list), 1);
    assert_eq!(fx.scheduler.live_count(), 1);
}

#[tokio::test]
async fn test_redundant_stop_changes_nothing() {
    let fx = Fixture::new();
    let mut list = fx.controller(Category::ImportantUrgent);
    list.add("A").await.unwrap();
    let a = id_of(&list, "A");

    list.start(&a).await.unwrap();
    fx.clock.advance_secs(5);
    list.stop(&a).await.unwrap();
    let after_first = list.snapshot();
    let saved = fx.store.get("Important & Urgent").unwrap();

    fx.clock.advance_secs(30);
    list.stop(&a).await.unwrap();

    assert_eq!(list.snapshot(), after_first);
    assert_eq!(fx.store.get("Important & Urgent").unwrap(), saved);
}

#[tokio::test]
async fn test_totals_accumulate_floored_sessions() {
    let fx = Fixture::new();
    let mut list = fx.controller(Category::ImportantNotUrgent);
    list.add("A").await.unwrap();
    let a = id_of(&list, "A");

    let sessions_ms = [1_999_u64, 500, 10_001, 59_999];
    let mut expected = 0;
    for ms in sessions_ms {
        list.start(&a).await.unwrap();
        fx.clock.advance(Duration::from_millis(ms));
        list.stop(&a).await.unwrap();

        let total = item(&list, "A").total_time;
        assert!(total >= expected, "total decreased");
        expected += ms / 1_000;
        assert_eq!(total, expected);
    }
    assert_eq!(expected, 1 + 10 + 59);
}

#[tokio::test]
async fn test_clock_stepping_back_credits_nothing() {
    let fx = Fixture::new();
    let mut list = fx.controller(Category::ImportantUrgent);
    list.add("A").await.unwrap();
    let a = id_of(&list, "A");

    list.start(&a).await.unwrap();
    fx.clock.set(Utc.timestamp_opt(1_699_999_000, 0).unwrap());
    list.stop(&a).await.unwrap();

    let a = item(&list, "A");
    assert_eq!(a.total_time, 0);
    assert!(a.current_session_start.is_none());
}

#[tokio::test]
async fn test_toggle_done_stops_running_item() {
    let fx = Fixture::new();
    let mut list = fx.controller(Category::ImportantUrgent);
    list.add("A").await.unwrap();
    list.add("B").await.unwrap();
    let a = id_of(&list, "A");

    list.start(&a).await.unwrap();
    fx.clock.advance_secs(7);
    list.toggle_done(&a).await.unwrap();

    let done = item(&list, "A");
    assert!(done.done);
    assert_eq!(done.total_time, 7);
    assert!(list.active_item().is_none());
    assert_eq!(fx.scheduler.live_count(), 0);

    let names: Vec<&str> = list.items().iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, vec!["B", "A"]);

    let err = list.start(&a).await.unwrap_err();
    assert!(matches!(
        err,
        quadtodo_core::TodoError::Validation(quadtodo_core::ValidationError::ItemDone(_))
    ));
}

#[tokio::test]
async fn test_delete_mid_session_flushes_then_removes() {
    let fx = Fixture::new();
    let mut list = fx.controller(Category::NotImportantUrgent);
    list.add("A").await.unwrap();
    list.add("B").await.unwrap();
    let a = id_of(&list, "A");

    list.start(&a).await.unwrap();
    fx.clock.advance_secs(9);
    list.remove(&a).await.unwrap();

    assert!(list.items().iter().all(|i| i.id != a));
    assert!(list.active_item().is_none());
    assert_eq!(fx.scheduler.live_count(), 0);

    let mut reloaded = fx.controller(Category::NotImportantUrgent);
    reloaded.load().await.unwrap();
    assert!(reloaded.items().iter().all(|i| i.id != a));
    assert_eq!(reloaded.total_count(), 1);
}

#[tokio::test]
async fn test_ordering_holds_after_every_mutation() {
    let fx = Fixture::new();
    let mut list = fx.controller(Category::ImportantUrgent);

    for name in ["a", "b", "c", "d", "e"] {
        list.add(name).await.unwrap();
        assert_partitioned(&list);
    }
    for name in ["b", "d", "a", "d", "e"] {
        let id = id_of(&list, name);
        list.toggle_done(&id).await.unwrap();
        assert_partitioned(&list);
    }
    list.add("f").await.unwrap();
    assert_partitioned(&list);
    let c = id_of(&list, "c");
    list.remove(&c).await.unwrap();
    assert_partitioned(&list);

    let names: Vec<&str> = list.items().iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, vec!["d", "f", "e", "a", "b"]);
}

#[tokio::test]
async fn test_at_most_one_running_across_interleavings() {
    let fx = Fixture::new();
    let mut list = fx.controller(Category::ImportantUrgent);
    for name in ["a", "b", "c"] {
        list.add(name).await.unwrap();
    }
    let ids: Vec<ItemId> = list.items().iter().map(|i| i.id.clone()).collect();

    let script = [
        (0, true),
        (1, true),
        (1, false),
        (2, true),
        (0, false),
        (0, true),
        (0, true),
        (2, false),
        (1, true),
        (2, true),
    ];
    for (index, start) in script {
        if start {
            list.start(&ids[index]).await.unwrap();
        } else {
            list.stop(&ids[index]).await.unwrap();
        }
        fx.clock.advance_secs(3);
        assert!(running_count(&list) <= 1);
        assert!(fx.scheduler.live_count() <= 1);
    }
}

#[tokio::test]
async fn test_save_then_load_round_trip() {
    let fx = Fixture::new();
    let mut list = fx.controller(Category::NotImportantNotUrgent);
    for name in ["a", "b", "c"] {
        list.add(name).await.unwrap();
    }
    let b = id_of(&list, "b");
    list.start(&b).await.unwrap();
    fx.clock.advance_secs(11);
    list.stop(&b).await.unwrap();
    let a = id_of(&list, "a");
    list.toggle_done(&a).await.unwrap();

    let mut reloaded = fx.controller(Category::NotImportantNotUrgent);
    let snapshot = reloaded.load().await.unwrap();

    assert_eq!(snapshot.as_slice(), list.items());
}

#[tokio::test]
async fn test_running_session_resumes_after_reload() {
    let fx = Fixture::new();
    let mut list = fx.controller(Category::ImportantUrgent);
    list.add("A").await.unwrap();
    let a = id_of(&list, "A");
    list.start(&a).await.unwrap();
    fx.clock.advance_secs(30);
    drop(list);
    assert_eq!(fx.scheduler.live_count(), 0);

    let mut reloaded = fx.controller(Category::ImportantUrgent);
    reloaded.load().await.unwrap();
    assert_eq!(reloaded.active_item().map(|i| i.id.clone()), Some(a.clone()));
    assert_eq!(fx.scheduler.live_count(), 1);

    fx.clock.advance_secs(15);
    assert_eq!(reloaded.rows()[0].display_time, 45);
    reloaded.stop(&a).await.unwrap();
    assert_eq!(item(&reloaded, "A").total_time, 45);
}

#[tokio::test]
async fn test_stray_sessions_are_closed_on_load() {
    let fx = Fixture::new();
    let start = Utc.timestamp_opt(1_699_999_000, 0).unwrap();

    let mut older = TodoItem::new("older");
    older.current_session_start = Some(start);
    let mut newer = TodoItem::new("newer");
    newer.current_session_start = Some(start + chrono::Duration::seconds(60));
    let mut finished = TodoItem::new("finished");
    finished.done = true;
    finished.current_session_start = Some(start + chrono::Duration::seconds(120));
    let raw = serde_json::to_string(&vec![older, newer.clone(), finished]).unwrap();
    fx.store.set("Important & Urgent", &raw).unwrap();

    let mut list = fx.controller(Category::ImportantUrgent);
    list.load().await.unwrap();

    assert_eq!(list.active_item().map(|i| i.id.clone()), Some(newer.id));
    assert_eq!(running_count(&list), 1);
    assert_eq!(item(&list, "older").total_time, 0);
    assert_eq!(item(&list, "finished").total_time, 0);
}

#[tokio::test]
async fn test_categories_time_independently() {
    let fx = Fixture::new();
    let mut urgent = fx.controller(Category::ImportantUrgent);
    let mut later = fx.controller(Category::ImportantNotUrgent);
    urgent.add("x").await.unwrap();
    later.add("y").await.unwrap();
    let x = id_of(&urgent, "x");
    let y = id_of(&later, "y");

    urgent.start(&x).await.unwrap();
    later.start(&y).await.unwrap();
    fx.clock.advance_secs(4);

    assert!(urgent.active_item().is_some());
    assert!(later.active_item().is_some());
    assert_eq!(fx.scheduler.live_count(), 2);
}

#[tokio::test]
async fn test_file_store_survives_restart() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let fx = Fixture::new();

    {
        let backend = Arc::new(LocalBackend::new(FileStore::new(temp_dir.path())));
        let mut list = ListController::new(Category::ImportantUrgent, backend, &fx.context);
        list.add("persisted").await.unwrap();
        let id = list.items()[0].id.clone();
        list.start(&id).await.unwrap();
        fx.clock.advance_secs(8);
        list.teardown().await.unwrap();
    }

    let backend = Arc::new(LocalBackend::new(FileStore::new(temp_dir.path())));
    assert_eq!(backend.store().dir(), temp_dir.path());
    assert!(backend
        .store()
        .path_for(Category::ImportantUrgent.label())
        .exists());
    let mut list = ListController::new(Category::ImportantUrgent, backend, &fx.context);
    list.load().await.unwrap();

    assert_eq!(list.items().len(), 1);
    assert_eq!(list.items()[0].total_time, 8);
    assert!(list.active_item().is_none());
}
