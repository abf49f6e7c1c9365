//! Integration tests for the tracker pipeline
//!
//! These tests drive a tracker end to end: SQLite-backed identity storage, a
//! manual clock for session expiry, and an in-memory transport to inspect
//! what would have been sent. The browser replay uses the fixture in
//! `tests/fixtures/visit.jsonl`.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use patrack_core::db::Database;
use patrack_core::{
    BrowserEvent, CaptureBindings, DatabaseStorage, Dimensions, EnvelopeType, EventData,
    ManualClock, MemoryStorage, MemoryTransport, NavigationObserver, PageContext, SessionRecord,
    StorageScope, Tracker, TrackerConfig, SESSION_KEY, VISITOR_ID_KEY,
};
use patrack_core::{Clock, Storage};
use serde_json::json;
use tempfile::TempDir;

fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

fn config() -> TrackerConfig {
    TrackerConfig {
        endpoint: "https://collector.example.com/api/events".to_string(),
        project_id: "pa_integration".to_string(),
        ..Default::default()
    }
}

fn page() -> PageContext {
    PageContext {
        title: "Shop".to_string(),
        referrer: "https://search.example/".to_string(),
        user_agent: "Mozilla/5.0 (X11; Linux x86_64)".to_string(),
        language: "en-US".to_string(),
        screen: Dimensions::new(1920, 1080),
        viewport: Dimensions::new(1280, 800),
        ..PageContext::new("https://shop.example.com/")
    }
}

fn start_clock() -> ManualClock {
    ManualClock::new(Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap())
}

/// A tracker whose stores live in one SQLite file
struct Harness {
    _temp_dir: TempDir,
    db: Arc<Database>,
    clock: ManualClock,
    transport: MemoryTransport,
}

impl Harness {
    fn new() -> Self {
        patrack_core::logging::init_test();

        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let db = Arc::new(Database::open(&temp_dir.path().join("storage.db")).unwrap());
        db.migrate().unwrap();

        Self {
            _temp_dir: temp_dir,
            db,
            clock: start_clock(),
            transport: MemoryTransport::new(),
        }
    }

    /// A fresh tracker over the same storage, as after a page reload
    fn tracker(&self, config: TrackerConfig) -> Tracker {
        Tracker::builder(config)
            .page(page())
            .durable_storage(DatabaseStorage::new(self.db.clone(), StorageScope::Durable))
            .session_storage(DatabaseStorage::new(self.db.clone(), StorageScope::Session))
            .clock(self.clock.clone())
            .transport(self.transport.clone())
            .build()
            .expect("tracker should build")
    }

    fn stored_session(&self) -> SessionRecord {
        let raw = self
            .db
            .get_item(StorageScope::Session, SESSION_KEY)
            .unwrap()
            .expect("session record should exist");
        serde_json::from_str(&raw).unwrap()
    }
}

// ============================================
// Identity
// ============================================

#[test]
fn test_visitor_id_survives_reload() {
    let harness = Harness::new();

    let first = harness.tracker(config()).visitor_id();
    let second = harness.tracker(config()).visitor_id();

    assert_eq!(first, second);
    assert_eq!(
        harness
            .db
            .get_item(StorageScope::Durable, VISITOR_ID_KEY)
            .unwrap()
            .as_deref(),
        Some(first.as_str())
    );
}

#[test]
fn test_session_continues_across_reload_within_timeout() {
    let harness = Harness::new();

    harness.tracker(config()).track_pageview();
    harness.clock.advance(Duration::minutes(10));
    harness.tracker(config()).track_pageview();

    let sent = harness.transport.envelopes();
    assert_eq!(sent[0].visitor.session_id, sent[1].visitor.session_id);
    assert_eq!(harness.stored_session().pageviews, 2);
}

#[test]
fn test_session_rotates_after_inactivity() {
    let harness = Harness::new();
    let tracker = harness.tracker(config());

    tracker.track_pageview();
    tracker.track_event("custom", "first", None);
    harness.clock.advance(Duration::minutes(30) + Duration::seconds(1));
    tracker.track_event("custom", "second", None);

    let sent = harness.transport.envelopes();
    assert_eq!(sent[0].visitor.session_id, sent[1].visitor.session_id);
    assert_ne!(sent[1].visitor.session_id, sent[2].visitor.session_id);
    assert_eq!(sent[0].visitor.id, sent[2].visitor.id);

    let record = harness.stored_session();
    assert_eq!(record.id, sent[2].visitor.session_id);
    assert_eq!(record.pageviews, 1);
    assert_eq!(record.last_activity_at(), Some(harness.clock.now()));
}

#[test]
fn test_custom_session_timeout() {
    let harness = Harness::new();
    let tracker = harness.tracker(TrackerConfig {
        session_timeout_minutes: 5,
        ..config()
    });

    let (_, first) = tracker.resolve_identity();
    harness.clock.advance(Duration::minutes(5));
    let (_, same) = tracker.resolve_identity();
    harness.clock.advance(Duration::minutes(6));
    let (_, rotated) = tracker.resolve_identity();

    assert_eq!(first, same);
    assert_ne!(first, rotated);
}

#[test]
fn test_unavailable_storage_still_tracks() {
    let durable = MemoryStorage::new();
    let session = MemoryStorage::new();
    durable.set_unavailable(true);
    session.set_unavailable(true);
    let transport = MemoryTransport::new();

    let tracker = Tracker::builder(config())
        .page(page())
        .durable_storage(durable.clone())
        .session_storage(session.clone())
        .transport(transport.clone())
        .build()
        .unwrap();

    tracker.track_pageview();
    tracker.track_event("custom", "test", None);

    let sent = transport.envelopes();
    assert_eq!(sent.len(), 2);
    assert!(!sent[0].visitor.id.is_empty());
    assert_eq!(sent[0].visitor.id, sent[1].visitor.id);
    assert_eq!(sent[0].visitor.session_id, sent[1].visitor.session_id);

    durable.set_unavailable(false);
    assert!(durable.get_item(VISITOR_ID_KEY).unwrap().is_none());
}

// ============================================
// Envelopes
// ============================================

#[test]
fn test_envelope_wire_json() {
    let harness = Harness::new();
    let tracker = harness.tracker(config());

    let mut data = EventData::new();
    data.insert("plan".to_string(), json!("pro"));
    tracker.track_event("checkout", "start", Some(data));

    let envelope = harness.transport.envelopes().remove(0);
    let json = serde_json::to_value(&envelope).unwrap();

    assert_eq!(json["type"], "event");
    assert_eq!(json["projectId"], "pa_integration");
    assert_eq!(json["timestamp"], "2025-06-01T09:00:00.000Z");
    assert_eq!(json["url"], "https://shop.example.com/");
    assert_eq!(
        json["data"],
        json!({"category": "checkout", "action": "start", "plan": "pro"})
    );
    assert_eq!(json["visitor"]["referrer"], "https://search.example/");
    assert_eq!(json["visitor"]["language"], "en-US");
    assert_eq!(json["visitor"]["screenSize"], "1920x1080");
    assert_eq!(json["visitor"]["viewportSize"], "1280x800");
    assert_eq!(json["visitor"]["userAgent"], "Mozilla/5.0 (X11; Linux x86_64)");
}

#[test]
fn test_pageview_counts_add_up() {
    let harness = Harness::new();
    let tracker = harness.tracker(config());

    tracker.track_pageview();
    let before = harness.stored_session().pageviews;
    tracker.track_pageview();
    tracker.track_pageview();

    assert_eq!(harness.stored_session().pageviews, before + 2);
}

// ============================================
// Capture
// ============================================

fn replay(bindings: &CaptureBindings, fixture: &str) -> usize {
    let content = std::fs::read_to_string(fixture_path(fixture)).unwrap();
    let mut count = 0;
    for line in content.lines().filter(|l| !l.trim().is_empty()) {
        let event: BrowserEvent = serde_json::from_str(line).unwrap();
        bindings.dispatch(&event);
        count += 1;
    }
    count
}

#[test]
fn test_replay_browser_visit() {
    let harness = Harness::new();
    let bindings = CaptureBindings::new(Arc::new(harness.tracker(config())));

    assert_eq!(replay(&bindings, "visit.jsonl"), 10);

    let sent = harness.transport.envelopes();
    let kinds: Vec<String> = sent
        .iter()
        .map(|e| match e.event_type {
            EnvelopeType::Pageview => format!("pageview {}", e.data["path"].as_str().unwrap()),
            EnvelopeType::Event => format!("{}/{}", e.category().unwrap(), e.action().unwrap()),
        })
        .collect();
    assert_eq!(
        kinds,
        vec![
            "pageview /",
            "click/a",
            "pageview /pricing",
            "click/a",
            "form/submit",
            "visibility/tab_hidden",
            "visibility/tab_visible",
            "pageview /",
            "page/exit",
        ]
    );

    let nav_click = &sent[1].data;
    assert_eq!(nav_click["href"], "https://shop.example.com/pricing");
    assert_eq!(nav_click["className"], "nav-link");
    assert!(nav_click.get("external").is_none());

    let external_click = &sent[3].data;
    assert_eq!(external_click["external"], true);
    assert_eq!(sent[3].url, "https://shop.example.com/pricing");

    let form = &sent[4].data;
    assert_eq!(form["id"], "signup");
    assert_eq!(form["action"], "https://shop.example.com/signup");
    assert_eq!(form["method"], "post");
    assert_eq!(form["fields"], 3);

    assert!(sent
        .iter()
        .all(|e| e.visitor.session_id == sent[0].visitor.session_id));
    assert_eq!(harness.stored_session().pageviews, sent.len() as u64);
}

#[test]
fn test_replay_with_capture_disabled() {
    let harness = Harness::new();
    let bindings = CaptureBindings::new(Arc::new(harness.tracker(TrackerConfig {
        track_pageviews: false,
        track_clicks: false,
        track_forms: false,
        ..config()
    })));

    replay(&bindings, "visit.jsonl");

    let actions: Vec<_> = harness
        .transport
        .take()
        .iter()
        .map(|e| e.action().unwrap_or_default().to_string())
        .collect();
    assert_eq!(actions, vec!["tab_hidden", "tab_visible", "exit"]);
    assert!(harness.transport.is_empty());

    // Load still resolved identity
    assert!(harness
        .db
        .get_item(StorageScope::Durable, VISITOR_ID_KEY)
        .unwrap()
        .is_some());
}

#[test]
fn test_navigation_observer_updates_location() {
    let harness = Harness::new();
    let bindings = CaptureBindings::new(Arc::new(harness.tracker(config())));

    bindings.on_navigate("https://shop.example.com/cart", Some("Cart"));
    bindings.tracker().track_event("cart", "view", None);

    let sent = harness.transport.envelopes();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].data["title"], "Cart");
    assert_eq!(sent[1].url, "https://shop.example.com/cart");
}

#[test]
fn test_debug_mode_records_recent_events() {
    let harness = Harness::new();
    let tracker = harness.tracker(TrackerConfig {
        debug: true,
        ..config()
    });

    assert!(tracker.is_debug());
    tracker.track_pageview();
    tracker.track_event("custom", "test", None);

    let recent = tracker.recent_events();
    assert_eq!(recent.len(), 2);
    assert_eq!(recent, harness.transport.envelopes());
}
