//! Core domain types for patrack
//!
//! | Term | Definition |
//! |------|------------|
//! | **Visitor** | A storage origin assumed to represent one end user; identified by a durable id |
//! | **Session** | A window of continuous activity, superseded after a period of inactivity |
//! | **Envelope** | The JSON message POSTed to the collector |
//! | **Page** | The host document the tracker is embedded in (location, title, environment) |

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Durable storage key holding the visitor id
pub const VISITOR_ID_KEY: &str = "pa_visitor_id";

/// Session-scoped storage key holding the JSON session record
pub const SESSION_KEY: &str = "pa_session";

// ============================================
// Storage
// ============================================

/// Lifetime class of a key/value store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageScope {
    /// Survives restarts (browser `localStorage`)
    Durable,
    /// Lives as long as the browsing session (browser `sessionStorage`)
    Session,
}

impl StorageScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageScope::Durable => "durable",
            StorageScope::Session => "session",
        }
    }
}

impl std::str::FromStr for StorageScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "durable" => Ok(StorageScope::Durable),
            "session" => Ok(StorageScope::Session),
            _ => Err(format!("unknown storage scope: {}", s)),
        }
    }
}

// ============================================
// Session
// ============================================

/// Rolling session record, stored as JSON under [`SESSION_KEY`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    /// Session id
    pub id: String,
    /// Most recent tracked interaction, in epoch milliseconds
    pub last_activity: i64,
    /// Tracked interactions within this session
    #[serde(default)]
    pub pageviews: u64,
}

impl SessionRecord {
    /// Start a new session at `now`
    pub fn new(id: String, now: DateTime<Utc>) -> Self {
        Self {
            id,
            last_activity: now.timestamp_millis(),
            pageviews: 1,
        }
    }

    /// Last activity as a UTC instant
    pub fn last_activity_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.last_activity).single()
    }

    /// Whether the session is still valid at `now` for the given timeout.
    ///
    /// Valid while `now - last_activity <= timeout`. A gap that does not fit
    /// in an `i64` counts as expired.
    pub fn is_active(&self, now: DateTime<Utc>, timeout: chrono::Duration) -> bool {
        now.timestamp_millis()
            .checked_sub(self.last_activity)
            .is_some_and(|gap| gap <= timeout.num_milliseconds())
    }

    /// Record another interaction at `now`
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_activity = now.timestamp_millis();
        self.pageviews = self.pageviews.saturating_add(1);
    }
}

// ============================================
// Page context
// ============================================

/// Width and height in CSS pixels, rendered as `"{w}x{h}"`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// The host page and browser environment the tracker runs in.
///
/// `url` and `title` change on navigation; the rest is fixed for the
/// lifetime of the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageContext {
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub referrer: String,
    #[serde(default)]
    pub user_agent: String,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub screen: Dimensions,
    #[serde(default)]
    pub viewport: Dimensions,
}

impl PageContext {
    /// A page at `url` with an empty environment
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: String::new(),
            referrer: String::new(),
            user_agent: String::new(),
            language: String::new(),
            screen: Dimensions::default(),
            viewport: Dimensions::default(),
        }
    }

    /// Path component of the current location, `/` if unparseable
    pub fn path(&self) -> String {
        url::Url::parse(&self.url)
            .map(|u| u.path().to_string())
            .unwrap_or_else(|_| "/".to_string())
    }

    /// Hostname of the current location, empty if none
    pub fn hostname(&self) -> String {
        url::Url::parse(&self.url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_default()
    }

    /// Resolve a possibly relative reference against the current location.
    ///
    /// Unresolvable references are returned unchanged.
    pub fn resolve(&self, reference: &str) -> String {
        url::Url::parse(&self.url)
            .and_then(|base| base.join(reference))
            .map(|u| u.to_string())
            .unwrap_or_else(|_| reference.to_string())
    }
}

// ============================================
// Envelope
// ============================================

/// Envelope discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeType {
    Pageview,
    Event,
}

impl EnvelopeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvelopeType::Pageview => "pageview",
            EnvelopeType::Event => "event",
        }
    }
}

impl fmt::Display for EnvelopeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Visitor identity plus environment, captured when an envelope is built
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitorSnapshot {
    pub id: String,
    pub session_id: String,
    pub referrer: String,
    pub user_agent: String,
    pub language: String,
    pub screen_size: String,
    pub viewport_size: String,
}

/// Message sent to the collector.
///
/// Immutable once built; never retried or persisted after send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    #[serde(rename = "type")]
    pub event_type: EnvelopeType,
    pub project_id: String,
    #[serde(with = "iso_millis")]
    pub timestamp: DateTime<Utc>,
    pub url: String,
    pub visitor: VisitorSnapshot,
    pub data: serde_json::Map<String, serde_json::Value>,
}

impl Envelope {
    /// `data.category` for event envelopes
    pub fn category(&self) -> Option<&str> {
        self.data.get("category").and_then(|v| v.as_str())
    }

    /// `data.action` for event envelopes
    pub fn action(&self) -> Option<&str> {
        self.data.get("action").and_then(|v| v.as_str())
    }
}

/// ISO-8601 with millisecond precision and a `Z` suffix
mod iso_millis {
    use super::*;

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        DateTime::<Utc>::deserialize(deserializer)
    }
}
