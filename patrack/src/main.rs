//! patrack - command line front end for the patrack tracker
//!
//! This tool provides commands for:
//! - Checking tracker configuration and collector reachability
//! - Sending pageviews and custom events by hand
//! - Inspecting and resetting the stored visitor and session identity
//! - Replaying recorded browser events through the capture bindings
//!
//! Uses XDG Base Directory specification for file locations:
//! - Storage: $XDG_DATA_HOME/patrack/storage.db (~/.local/share/patrack/storage.db)
//! - Config: $XDG_CONFIG_HOME/patrack/config.toml (~/.config/patrack/config.toml)
//! - Logs: $XDG_STATE_HOME/patrack/patrack.log

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use patrack_core::identity::IdentityStore;
use patrack_core::logging::LoggingGuard;
use patrack_core::{
    BrowserEvent, CaptureBindings, Config, Database, DatabaseStorage, EventData, HttpTransport,
    PageContext, StorageScope, SystemClock, Tracker, Transport, VISITOR_ID_KEY,
};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "patrack")]
#[command(about = "Send and inspect product analytics events")]
#[command(version)]
struct Args {
    /// Verbose output (writes a log file)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable tracker debug mode and print sent envelopes
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show tracker configuration and stored identity
    Status {
        /// Also check that the collector answers
        #[arg(long)]
        ping: bool,
    },

    /// Send a pageview
    Pageview {
        /// Page URL
        #[arg(long)]
        url: String,

        /// Page title
        #[arg(long)]
        title: Option<String>,

        /// Referring URL
        #[arg(long)]
        referrer: Option<String>,
    },

    /// Send a custom event
    Event {
        /// Event category (e.g. "signup")
        category: String,

        /// Event action (e.g. "complete")
        action: String,

        /// Extra data as key=value; values are parsed as JSON when possible
        #[arg(short, long = "data", value_name = "KEY=VALUE")]
        data: Vec<String>,

        /// Page URL the event happened on
        #[arg(long, default_value = "about:blank")]
        url: String,
    },

    /// Print the visitor id, creating it if needed
    Visitor,

    /// Show the current session
    Session {
        /// Forget the session so the next event starts a new one
        #[arg(long)]
        reset: bool,
    },

    /// Replay browser events from a JSON Lines file
    Replay {
        /// File with one browser event per line
        file: PathBuf,

        /// URL of the page the events happened on
        #[arg(long, default_value = "about:blank")]
        url: String,
    },
}

/// Storage handles shared by every command
struct Stores {
    db: Arc<Database>,
}

impl Stores {
    fn open() -> Result<Self> {
        let db_path = Config::database_path();
        let db = Database::open(&db_path)
            .with_context(|| format!("failed to open storage at {}", db_path.display()))?;
        db.migrate().context("failed to run storage migrations")?;
        Ok(Self { db: Arc::new(db) })
    }

    fn durable(&self) -> DatabaseStorage {
        DatabaseStorage::new(self.db.clone(), StorageScope::Durable)
    }

    fn session(&self) -> DatabaseStorage {
        DatabaseStorage::new(self.db.clone(), StorageScope::Session)
    }

    fn identity(&self, config: &Config) -> IdentityStore {
        IdentityStore::new(
            Box::new(self.durable()),
            Box::new(self.session()),
            Arc::new(SystemClock),
            config.tracker.session_timeout(),
        )
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::load().context("failed to load configuration")?;
    if args.debug {
        config.tracker.debug = true;
    }

    // Held until exit so buffered log lines are flushed
    let _log_guard: Option<LoggingGuard> = if args.verbose || args.debug {
        Some(patrack_core::logging::init(&config.logging).context("failed to initialize logging")?)
    } else {
        None
    };

    match args.command {
        Command::Status { ping } => cmd_status(&config, ping),
        Command::Pageview {
            url,
            title,
            referrer,
        } => {
            let mut page = PageContext::new(url);
            page.title = title.unwrap_or_default();
            page.referrer = referrer.unwrap_or_default();
            with_tracker(&config, page, |tracker| tracker.track_pageview())
        }
        Command::Event {
            category,
            action,
            data,
            url,
        } => {
            let data = parse_event_data(&data)?;
            let data = (!data.is_empty()).then_some(data);
            with_tracker(&config, PageContext::new(url), |tracker| {
                tracker.track_event(&category, &action, data)
            })
        }
        Command::Visitor => cmd_visitor(&config),
        Command::Session { reset } => cmd_session(&config, reset),
        Command::Replay { file, url } => cmd_replay(&config, &file, url),
    }
}

fn cmd_status(config: &Config, ping: bool) -> Result<()> {
    println!("patrack Configuration");
    println!("=====================");
    println!();

    let tracker = &config.tracker;
    println!("Config File:     {}", Config::config_path().display());
    println!("Storage:         {}", Config::database_path().display());
    println!("Log File:        {}", Config::log_path().display());
    println!("Endpoint:        {}", tracker.endpoint);
    println!(
        "Project ID:      {}",
        if tracker.project_id.is_empty() {
            "<not set>"
        } else {
            tracker.project_id.as_str()
        }
    );
    println!("Pageviews:       {}", on_off(tracker.track_pageviews));
    println!("Clicks:          {}", on_off(tracker.track_clicks));
    println!("Forms:           {}", on_off(tracker.track_forms));
    println!("Session Timeout: {}m", tracker.session_timeout_minutes);
    println!("Debug:           {}", on_off(tracker.debug));
    println!("Timeout:         {}s", config.transport.timeout_secs);

    // Identity is only shown if storage already exists; status never creates it
    let db_path = Config::database_path();
    if db_path.exists() {
        let stores = Stores::open()?;
        let visitor = stores.db.get_item(StorageScope::Durable, VISITOR_ID_KEY)?;
        let session = stores.identity(config).session();

        println!();
        println!("Schema Version:  {}", stores.db.schema_version()?);
        println!("Visitor ID:      {}", visitor.as_deref().unwrap_or("<none>"));
        match session {
            Some(session) => println!(
                "Session ID:      {} ({} interactions)",
                session.id, session.pageviews
            ),
            None => println!("Session ID:      <none>"),
        }

        println!();
        println!("Stored Items:");
        for scope in [StorageScope::Durable, StorageScope::Session] {
            for item in stores.db.list_items(scope)? {
                println!(
                    "  {:<8} {:<16} updated {}",
                    item.scope.as_str(),
                    item.key,
                    item.updated_at.format("%Y-%m-%d %H:%M:%S UTC")
                );
            }
        }
    }

    println!();
    match tracker.validate() {
        Ok(()) => println!("Status: Ready to track"),
        Err(e) => println!("Status: Not ready ({})", e),
    }

    if ping {
        let transport = HttpTransport::new(tracker, &config.transport)
            .context("failed to create transport")?;
        let reachable = transport.ping_blocking()?;
        println!(
            "Collector:       {}",
            if reachable { "reachable" } else { "unreachable" }
        );
        transport.shutdown();
    }

    Ok(())
}

fn cmd_visitor(config: &Config) -> Result<()> {
    let stores = Stores::open()?;
    let mut identity = stores.identity(config);
    println!("{}", identity.get_or_create_visitor_id());
    Ok(())
}

fn cmd_session(config: &Config, reset: bool) -> Result<()> {
    let stores = Stores::open()?;
    let mut identity = stores.identity(config);

    if reset {
        identity.reset_session();
        println!("Session reset; the next event starts a new session.");
        return Ok(());
    }

    let Some(session) = identity.session() else {
        println!("No active session.");
        return Ok(());
    };

    let now = chrono::Utc::now();
    let last_activity = session
        .last_activity_at()
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| "<invalid>".to_string());

    println!("Session ID:      {}", session.id);
    println!("Last Activity:   {}", last_activity);
    println!("Interactions:    {}", session.pageviews);
    println!(
        "Status:          {}",
        if session.is_active(now, identity.session_timeout()) {
            "active"
        } else {
            "expired"
        }
    );
    Ok(())
}

fn cmd_replay(config: &Config, file: &Path, url: String) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;

    let mut events = Vec::new();
    for (index, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let event: BrowserEvent = serde_json::from_str(line)
            .with_context(|| format!("{}:{}: invalid browser event", file.display(), index + 1))?;
        events.push(event);
    }

    with_tracker(config, PageContext::new(url), |tracker| {
        let bindings = CaptureBindings::new(tracker);
        for event in &events {
            tracing::debug!(?event, "Replaying browser event");
            bindings.dispatch(event);
        }
        println!("Replayed {} browser events", events.len());
    })
}

/// Build a tracker over persistent storage, run `f`, then shut the transport
/// down and report delivery.
fn with_tracker<F>(config: &Config, page: PageContext, f: F) -> Result<()>
where
    F: FnOnce(Arc<Tracker>),
{
    let stores = Stores::open()?;
    let transport = Arc::new(
        HttpTransport::new(&config.tracker, &config.transport)
            .context("failed to create transport")?,
    );

    let tracker = Tracker::builder(config.tracker.clone())
        .page(page)
        .durable_storage(stores.durable())
        .session_storage(stores.session())
        .shared_transport(transport.clone())
        .transport_config(config.transport.clone())
        .build()
        .context("invalid tracker configuration")?;
    let tracker = Arc::new(tracker);

    f(tracker.clone());
    tracker.shutdown();

    let stats = transport.stats();
    println!(
        "Sent to {}: {} delivered, {} failed, {} dropped",
        transport.endpoint(),
        stats.delivered,
        stats.failed,
        stats.dropped
    );

    if tracker.is_debug() {
        for envelope in tracker.recent_events() {
            println!("{}", serde_json::to_string_pretty(&envelope)?);
        }
    }

    Ok(())
}

/// Parse `key=value` pairs into event data.
fn parse_event_data(pairs: &[String]) -> Result<EventData> {
    let mut data = EventData::new();
    for pair in pairs {
        let Some((key, raw)) = pair.split_once('=') else {
            bail!("invalid data '{}': expected KEY=VALUE", pair);
        };
        if key.is_empty() {
            bail!("invalid data '{}': empty key", pair);
        }
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        data.insert(key.to_string(), value);
    }
    Ok(data)
}

fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "on"
    } else {
        "off"
    }
}
