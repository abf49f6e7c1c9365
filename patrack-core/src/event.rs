//! Envelope construction
//!
//! Every envelope carries a fresh timestamp, the page location at build time,
//! and a visitor snapshot. Building an envelope re-resolves the session id, so
//! it touches the session record and may rotate it.

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::clock::Clock;
use crate::identity::IdentityStore;
use crate::types::{Envelope, EnvelopeType, PageContext, VisitorSnapshot};

/// Key/value payload attached to an envelope
pub type EventData = Map<String, Value>;

pub struct EventBuilder {
    project_id: String,
    clock: Arc<dyn Clock>,
}

impl EventBuilder {
    pub fn new(project_id: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            project_id: project_id.into(),
            clock,
        }
    }

    /// Pageview envelope: `url`, `path`, `title`, `referrer` of the current page.
    pub fn build_pageview(&self, identity: &mut IdentityStore, page: &PageContext) -> Envelope {
        let mut data = Map::new();
        data.insert("url".to_string(), Value::String(page.url.clone()));
        data.insert("path".to_string(), Value::String(page.path()));
        data.insert("title".to_string(), Value::String(page.title.clone()));
        data.insert("referrer".to_string(), Value::String(page.referrer.clone()));

        self.build(EnvelopeType::Pageview, identity, page, data)
    }

    /// Event envelope with `category` and `action` followed by `extra`.
    ///
    /// Keys in `extra` are merged last, so they win over `category` and
    /// `action` when they collide.
    pub fn build_event(
        &self,
        identity: &mut IdentityStore,
        page: &PageContext,
        category: &str,
        action: &str,
        extra: EventData,
    ) -> Envelope {
        let mut data = Map::new();
        data.insert("category".to_string(), Value::String(category.to_string()));
        data.insert("action".to_string(), Value::String(action.to_string()));
        data.extend(extra);

        self.build(EnvelopeType::Event, identity, page, data)
    }

    fn build(
        &self,
        event_type: EnvelopeType,
        identity: &mut IdentityStore,
        page: &PageContext,
        data: EventData,
    ) -> Envelope {
        let visitor = VisitorSnapshot {
            id: identity.get_or_create_visitor_id(),
            session_id: identity.get_or_create_session_id(),
            referrer: page.referrer.clone(),
            user_agent: page.user_agent.clone(),
            language: page.language.clone(),
            screen_size: page.screen.to_string(),
            viewport_size: page.viewport.to_string(),
        };

        Envelope {
            event_type,
            project_id: self.project_id.clone(),
            timestamp: self.clock.now(),
            url: page.url.clone(),
            visitor,
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::storage::MemoryStorage;
    use crate::types::Dimensions;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn setup() -> (EventBuilder, IdentityStore, PageContext, ManualClock) {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap());
        let identity = IdentityStore::new(
            Box::new(MemoryStorage::new()),
            Box::new(MemoryStorage::new()),
            Arc::new(clock.clone()),
            chrono::Duration::minutes(30),
        );
        let builder = EventBuilder::new("pa_test", Arc::new(clock.clone()));
        let page = PageContext {
            title: "Pricing".to_string(),
            referrer: "https://search.example/".to_string(),
            user_agent: "Mozilla/5.0".to_string(),
            language: "en-GB".to_string(),
            screen: Dimensions::new(2560, 1440),
            viewport: Dimensions::new(1280, 720),
            ..PageContext::new("https://app.example.com/pricing?plan=pro")
        };
        (builder, identity, page, clock)
    }

    #[test]
    fn test_build_pageview() {
        let (builder, mut identity, page, clock) = setup();
        let envelope = builder.build_pageview(&mut identity, &page);

        assert_eq!(envelope.event_type, EnvelopeType::Pageview);
        assert_eq!(envelope.project_id, "pa_test");
        assert_eq!(envelope.timestamp, clock.now());
        assert_eq!(envelope.url, page.url);
        assert_eq!(
            Value::Object(envelope.data),
            json!({
                "url": "https://app.example.com/pricing?plan=pro",
                "path": "/pricing",
                "title": "Pricing",
                "referrer": "https://search.example/",
            })
        );
        assert_eq!(envelope.visitor.screen_size, "2560x1440");
        assert_eq!(envelope.visitor.viewport_size, "1280x720");
        assert_eq!(envelope.visitor.language, "en-GB");
    }

    #[test]
    fn test_build_event_merges_extra() {
        let (builder, mut identity, page, _) = setup();
        let mut extra = Map::new();
        extra.insert("foo".to_string(), json!(1));

        let envelope = builder.build_event(&mut identity, &page, "custom", "test", extra);

        assert_eq!(envelope.event_type, EnvelopeType::Event);
        assert_eq!(envelope.category(), Some("custom"));
        assert_eq!(envelope.action(), Some("test"));
        assert_eq!(envelope.data["foo"], json!(1));
    }

    #[test]
    fn test_extra_keys_shadow_category_and_action() {
        let (builder, mut identity, page, _) = setup();
        let mut extra = Map::new();
        extra.insert("category".to_string(), json!("overridden"));
        extra.insert("action".to_string(), json!(7));

        let envelope = builder.build_event(&mut identity, &page, "custom", "test", extra);
        assert_eq!(envelope.category(), Some("overridden"));
        assert_eq!(envelope.data["action"], json!(7));
    }

    #[test]
    fn test_each_build_resolves_session() {
        let (builder, mut identity, page, clock) = setup();
        let first = builder.build_pageview(&mut identity, &page);
        let second = builder.build_pageview(&mut identity, &page);
        assert_eq!(first.visitor.session_id, second.visitor.session_id);
        assert_eq!(first.visitor.id, second.visitor.id);

        clock.advance(chrono::Duration::hours(1));
        let third = builder.build_pageview(&mut identity, &page);
        assert_ne!(third.visitor.session_id, first.visitor.session_id);
        assert_eq!(third.visitor.id, first.visitor.id);
    }
}
