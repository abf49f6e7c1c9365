//! The tracker context object and its public API
//!
//! A [`Tracker`] is built once per page with a fixed [`TrackerConfig`] and is
//! then handed to whatever needs it: the capture bindings, host code calling
//! the facade methods, the CLI. The only state that changes after
//! construction is the page location, the identity records, and the debug
//! switch.
//!
//! ## Example
//!
//! ```rust
//! use patrack_core::{MemoryTransport, PageContext, Tracker, TrackerConfig};
//!
//! let transport = MemoryTransport::new();
//! let tracker = Tracker::builder(TrackerConfig {
//!     project_id: "pa_demo".to_string(),
//!     ..Default::default()
//! })
//! .page(PageContext::new("https://example.com/"))
//! .transport(transport.clone())
//! .build()
//! .expect("valid config");
//!
//! tracker.track_event("custom", "test", None);
//! assert_eq!(transport.len(), 1);
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::clock::{Clock, SystemClock};
use crate::config::{TrackerConfig, TransportConfig};
use crate::error::Result;
use crate::event::{EventBuilder, EventData};
use crate::identity::IdentityStore;
use crate::logging::DEBUG_TARGET;
use crate::storage::{MemoryStorage, Storage};
use crate::transport::{HttpTransport, Transport};
use crate::types::{Envelope, PageContext, SessionRecord};

/// Envelopes kept for inspection while debug mode is on
pub const RECENT_EVENTS_CAPACITY: usize = 10;

pub struct Tracker {
    config: TrackerConfig,
    builder: EventBuilder,
    identity: Mutex<IdentityStore>,
    page: Mutex<PageContext>,
    transport: Arc<dyn Transport>,
    debug: AtomicBool,
    recent: Mutex<VecDeque<Envelope>>,
}

impl Tracker {
    pub fn builder(config: TrackerConfig) -> TrackerBuilder {
        TrackerBuilder::new(config)
    }

    // ============================================
    // Facade
    // ============================================

    /// Send a custom event. Keys in `data` may override `category`/`action`.
    pub fn track_event(&self, category: &str, action: &str, data: Option<EventData>) {
        let envelope = {
            let page = lock(&self.page);
            let mut identity = lock(&self.identity);
            self.builder
                .build_event(&mut identity, &page, category, action, data.unwrap_or_default())
        };
        self.send(envelope);
    }

    /// Send a pageview for the current location.
    pub fn track_pageview(&self) {
        let envelope = {
            let page = lock(&self.page);
            let mut identity = lock(&self.identity);
            self.builder.build_pageview(&mut identity, &page)
        };
        self.send(envelope);
    }

    /// Turn on verbose logging of outgoing envelopes and delivery failures.
    pub fn enable_debug(&self) {
        self.debug.store(true, Ordering::SeqCst);
        self.transport.set_debug(true);
        tracing::info!(target: DEBUG_TARGET, "Debug mode enabled");
    }

    /// The visitor id, created on first use.
    pub fn visitor_id(&self) -> String {
        lock(&self.identity).get_or_create_visitor_id()
    }

    // ============================================
    // Host integration
    // ============================================

    pub fn is_debug(&self) -> bool {
        self.debug.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Current page context
    pub fn page(&self) -> PageContext {
        lock(&self.page).clone()
    }

    /// Record an in-place location change. Does not emit anything.
    pub fn set_location(&self, url: &str, title: Option<&str>) {
        let mut page = lock(&self.page);
        page.url = url.to_string();
        if let Some(title) = title {
            page.title = title.to_string();
        }
    }

    /// Resolve visitor and session ids without sending anything.
    ///
    /// Touches the session like any other tracked interaction.
    pub fn resolve_identity(&self) -> (String, String) {
        let mut identity = lock(&self.identity);
        let visitor = identity.get_or_create_visitor_id();
        let session = identity.get_or_create_session_id();
        (visitor, session)
    }

    /// Stored session record, without touching it
    pub fn session(&self) -> Option<SessionRecord> {
        lock(&self.identity).session()
    }

    /// Forget the current session; the next event starts a new one.
    pub fn reset_session(&self) {
        lock(&self.identity).reset_session();
    }

    /// The last envelopes sent while debug mode was on, oldest first
    pub fn recent_events(&self) -> Vec<Envelope> {
        lock(&self.recent).iter().cloned().collect()
    }

    /// Shut the transport down, giving in-flight sends a bounded grace period.
    pub fn shutdown(&self) {
        self.transport.shutdown();
    }

    fn send(&self, envelope: Envelope) {
        if self.is_debug() {
            {
                let mut recent = lock(&self.recent);
                recent.push_back(envelope.clone());
                while recent.len() > RECENT_EVENTS_CAPACITY {
                    recent.pop_front();
                }
            }

            let payload = serde_json::to_string(&envelope).unwrap_or_default();
            tracing::info!(
                target: DEBUG_TARGET,
                payload = %payload,
                "Sending {}",
                envelope.event_type
            );
        }

        self.transport.send(&envelope);
    }
}

/// Lock a mutex, recovering the data if a previous holder panicked.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Builder for [`Tracker`]
///
/// Defaults: in-memory durable and session storage, the system clock, and an
/// [`HttpTransport`] for the configured endpoint.
pub struct TrackerBuilder {
    config: TrackerConfig,
    transport_config: TransportConfig,
    page: PageContext,
    durable: Option<Box<dyn Storage>>,
    session: Option<Box<dyn Storage>>,
    clock: Option<Arc<dyn Clock>>,
    transport: Option<Arc<dyn Transport>>,
}

impl TrackerBuilder {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            transport_config: TransportConfig::default(),
            page: PageContext::new("about:blank"),
            durable: None,
            session: None,
            clock: None,
            transport: None,
        }
    }

    pub fn page(mut self, page: PageContext) -> Self {
        self.page = page;
        self
    }

    /// Storage for the visitor id (survives restarts)
    pub fn durable_storage(mut self, storage: impl Storage + 'static) -> Self {
        self.durable = Some(Box::new(storage));
        self
    }

    /// Storage for the session record (scoped to the browsing session)
    pub fn session_storage(mut self, storage: impl Storage + 'static) -> Self {
        self.session = Some(Box::new(storage));
        self
    }

    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Some(Arc::new(clock));
        self
    }

    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Use an already shared transport (e.g. to read its stats later)
    pub fn shared_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Settings for the default HTTP transport
    pub fn transport_config(mut self, config: TransportConfig) -> Self {
        self.transport_config = config;
        self
    }

    /// Validate the configuration and build the tracker.
    pub fn build(self) -> Result<Tracker> {
        self.config.validate()?;

        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new(&self.config, &self.transport_config)?),
        };
        let clock: Arc<dyn Clock> = self.clock
            .unwrap_or_else(|| Arc::new(SystemClock) as Arc<dyn Clock>);

        let identity = IdentityStore::new(
            self.durable
                .unwrap_or_else(|| Box::new(MemoryStorage::new()) as Box<dyn Storage>),
            self.session
                .unwrap_or_else(|| Box::new(MemoryStorage::new()) as Box<dyn Storage>),
            clock.clone(),
            self.config.session_timeout(),
        );

        let debug = self.config.debug;
        transport.set_debug(debug);

        Ok(Tracker {
            builder: EventBuilder::new(self.config.project_id.clone(), clock),
            identity: Mutex::new(identity),
            page: Mutex::new(self.page),
            transport,
            debug: AtomicBool::new(debug),
            recent: Mutex::new(VecDeque::new()),
            config: self.config,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryTransport;
    use crate::types::{EnvelopeType, SESSION_KEY};
    use serde_json::json;

    fn config() -> TrackerConfig {
        TrackerConfig {
            endpoint: "https://analytics.example.com/api/events".to_string(),
            project_id: "pa_test".to_string(),
            ..Default::default()
        }
    }

    fn tracker() -> (Tracker, MemoryTransport, MemoryStorage) {
        let transport = MemoryTransport::new();
        let session = MemoryStorage::new();
        let tracker = Tracker::builder(config())
            .page(PageContext::new("https://app.example.com/home"))
            .session_storage(session.clone())
            .transport(transport.clone())
            .build()
            .unwrap();
        (tracker, transport, session)
    }

    fn stored_pageviews(session: &MemoryStorage) -> u64 {
        let raw = session.get_item(SESSION_KEY).unwrap().unwrap();
        serde_json::from_str::<SessionRecord>(&raw).unwrap().pageviews
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let result = Tracker::builder(TrackerConfig::default())
            .transport(MemoryTransport::new())
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_track_event_envelope() {
        let (tracker, transport, _) = tracker();
        let mut data = EventData::new();
        data.insert("foo".to_string(), json!(1));

        tracker.track_event("custom", "test", Some(data));

        let sent = transport.envelopes();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].event_type, EnvelopeType::Event);
        assert_eq!(sent[0].category(), Some("custom"));
        assert_eq!(sent[0].action(), Some("test"));
        assert_eq!(sent[0].data["foo"], json!(1));
        assert_eq!(sent[0].project_id, "pa_test");
    }

    #[test]
    fn test_two_pageviews_add_two() {
        let (tracker, transport, session) = tracker();
        tracker.track_pageview();
        let before = stored_pageviews(&session);

        tracker.track_pageview();
        tracker.track_pageview();

        assert_eq!(stored_pageviews(&session), before + 2);
        let sent = transport.envelopes();
        assert_eq!(sent.len(), 3);
        assert!(sent.iter().all(|e| e.event_type == EnvelopeType::Pageview));
    }

    #[test]
    fn test_visitor_id_matches_envelopes() {
        let (tracker, transport, _) = tracker();
        let visitor = tracker.visitor_id();
        tracker.track_pageview();
        assert_eq!(transport.envelopes()[0].visitor.id, visitor);
        assert_eq!(tracker.visitor_id(), visitor);
    }

    #[test]
    fn test_set_location_changes_envelope_url() {
        let (tracker, transport, _) = tracker();
        tracker.set_location("https://app.example.com/settings", Some("Settings"));
        tracker.track_pageview();

        let sent = transport.envelopes();
        assert_eq!(sent[0].url, "https://app.example.com/settings");
        assert_eq!(sent[0].data["path"], "/settings");
        assert_eq!(sent[0].data["title"], "Settings");
    }

    #[test]
    fn test_debug_keeps_recent_events() {
        let (tracker, _, _) = tracker();
        tracker.track_pageview();
        assert!(tracker.recent_events().is_empty());

        tracker.enable_debug();
        assert!(tracker.is_debug());
        for i in 0..12 {
            tracker.track_event("custom", &format!("n{}", i), None);
        }

        let recent = tracker.recent_events();
        assert_eq!(recent.len(), RECENT_EVENTS_CAPACITY);
        assert_eq!(recent[0].action(), Some("n2"));
        assert_eq!(recent[9].action(), Some("n11"));
    }

    #[test]
    fn test_reset_session() {
        let (tracker, _, _) = tracker();
        let (_, first) = tracker.resolve_identity();
        assert_eq!(tracker.session().map(|s| s.id), Some(first.clone()));

        tracker.reset_session();
        assert!(tracker.session().is_none());
        let (_, second) = tracker.resolve_identity();
        assert_ne!(first, second);
    }
}
