//! # patrack-core
//!
//! Core library for patrack - an embeddable product analytics tracker.
//!
//! This library provides:
//! - Visitor and session identity over pluggable key/value storage
//! - Envelope construction for pageviews and custom events
//! - Fire-and-forget delivery to a collector endpoint over HTTP
//! - Capture bindings that turn page events into tracked events
//! - Configuration management and logging infrastructure
//!
//! ## Architecture
//!
//! A tracked interaction flows through three stages:
//! - **Capture:** a page event (load, click, submit, navigation) reaches [`CaptureBindings`]
//! - **Build:** the [`Tracker`] resolves identity and builds an [`Envelope`]
//! - **Deliver:** the [`Transport`] POSTs the envelope; failures are swallowed
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use patrack_core::{CaptureBindings, Config, Database, DatabaseStorage, PageContext, StorageScope, Tracker};
//!
//! let config = Config::load().expect("failed to load config");
//!
//! let db = Arc::new(Database::open(&Config::database_path()).expect("failed to open database"));
//! db.migrate().expect("failed to run migrations");
//!
//! let tracker = Tracker::builder(config.tracker.clone())
//!     .transport_config(config.transport.clone())
//!     .page(PageContext::new("https://example.com/"))
//!     .durable_storage(DatabaseStorage::new(db.clone(), StorageScope::Durable))
//!     .session_storage(DatabaseStorage::new(db, StorageScope::Session))
//!     .build()
//!     .expect("invalid tracker config");
//!
//! let bindings = CaptureBindings::new(Arc::new(tracker));
//! bindings.on_load();
//! bindings.tracker().shutdown();
//! ```

// Re-export commonly used items at the crate root
pub use capture::{BrowserEvent, CaptureBindings, Element, FormElement, NavigationObserver, Visibility};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, TrackerConfig, TransportConfig};
pub use db::Database;
pub use error::{Error, Result};
pub use event::EventData;
pub use storage::{DatabaseStorage, MemoryStorage, Storage};
pub use tracker::{Tracker, TrackerBuilder};
pub use transport::{HttpTransport, MemoryTransport, Transport, TransportStats};
pub use types::*;

// Public modules
pub mod capture;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod event;
pub mod identity;
pub mod logging;
pub mod storage;
pub mod tracker;
pub mod transport;
pub mod types;
