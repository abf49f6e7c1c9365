//! HTTP transport for the collector endpoint
//!
//! Envelopes are POSTed as JSON. The preferred path hands each envelope to a
//! dedicated dispatcher thread that owns its own runtime, so delivery carries
//! on regardless of what the caller does next. If the dispatcher is not
//! available the envelope is spawned as a plain request on the caller's tokio
//! runtime instead. Either way failures are counted and, in debug mode,
//! logged; they are never retried or returned.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::config::{TrackerConfig, TransportConfig};
use crate::error::{Error, Result};
use crate::logging::DEBUG_TARGET;
use crate::types::Envelope;

use super::Transport;

/// Delivery counters
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TransportStats {
    /// Envelopes the collector answered with a 2xx status
    pub delivered: usize,
    /// Envelopes that hit a network error or a non-2xx status
    pub failed: usize,
    /// Envelopes discarded without a request (after shutdown, no runtime)
    pub dropped: usize,
}

#[derive(Default)]
struct Counters {
    delivered: AtomicUsize,
    failed: AtomicUsize,
    dropped: AtomicUsize,
}

/// State shared between the transport handle and in-flight deliveries
struct Shared {
    http_client: reqwest::Client,
    endpoint: String,
    debug: AtomicBool,
    counters: Counters,
}

struct Dispatcher {
    tx: mpsc::UnboundedSender<Envelope>,
    worker: JoinHandle<()>,
}

/// Fire-and-forget JSON POST transport
pub struct HttpTransport {
    shared: Arc<Shared>,
    dispatcher: Mutex<Option<Dispatcher>>,
    closed: AtomicBool,
    shutdown_grace: Duration,
}

impl HttpTransport {
    /// Create a transport for the configured endpoint and start its dispatcher.
    ///
    /// Returns an error if the endpoint is invalid or the HTTP client cannot
    /// be built. Failing to start the dispatcher is not an error; sends then
    /// use the fallback path.
    pub fn new(tracker: &TrackerConfig, transport: &TransportConfig) -> Result<Self> {
        let endpoint = url::Url::parse(&tracker.endpoint)?.to_string();

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http_client = reqwest::Client::builder()
            .timeout(transport.timeout())
            .tcp_keepalive(Duration::from_secs(60))
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        let shared = Arc::new(Shared {
            http_client,
            endpoint,
            debug: AtomicBool::new(tracker.debug),
            counters: Counters::default(),
        });

        let dispatcher = match spawn_dispatcher(shared.clone()) {
            Ok(dispatcher) => Some(dispatcher),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to start delivery thread, using fallback sends");
                None
            }
        };

        Ok(Self {
            shared,
            dispatcher: Mutex::new(dispatcher),
            closed: AtomicBool::new(false),
            shutdown_grace: transport.shutdown_grace(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.shared.endpoint
    }

    /// Snapshot of the delivery counters
    pub fn stats(&self) -> TransportStats {
        let counters = &self.shared.counters;
        TransportStats {
            delivered: counters.delivered.load(Ordering::SeqCst),
            failed: counters.failed.load(Ordering::SeqCst),
            dropped: counters.dropped.load(Ordering::SeqCst),
        }
    }

    /// Whether the collector answers `{endpoint}/test` with a 2xx status
    pub async fn ping(&self) -> bool {
        let url = format!("{}/test", self.shared.endpoint.trim_end_matches('/'));

        match self.shared.http_client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!(error = %e, url = %url, "Collector ping failed");
                false
            }
        }
    }

    /// Blocking variant of [`ping`](Self::ping) for synchronous callers.
    ///
    /// Only fails if the runtime for the request cannot be created.
    pub fn ping_blocking(&self) -> Result<bool> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| Error::Transport(format!("failed to create runtime: {}", e)))?;
        Ok(runtime.block_on(self.ping()))
    }

    /// Spawn the envelope onto the caller's runtime, if there is one.
    fn send_fallback(&self, envelope: Envelope) {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(deliver(self.shared.clone(), envelope));
            }
            Err(_) => {
                self.shared.counters.dropped.fetch_add(1, Ordering::SeqCst);
                if self.shared.debug.load(Ordering::SeqCst) {
                    tracing::warn!(target: DEBUG_TARGET, "No runtime available, envelope dropped");
                }
            }
        }
    }
}

impl Transport for HttpTransport {
    fn send(&self, envelope: &Envelope) {
        if self.closed.load(Ordering::SeqCst) {
            self.shared.counters.dropped.fetch_add(1, Ordering::SeqCst);
            return;
        }

        let rejected = match self.dispatcher.lock() {
            Ok(guard) => match guard.as_ref() {
                Some(dispatcher) => dispatcher.tx.send(envelope.clone()).err().map(|e| e.0),
                None => Some(envelope.clone()),
            },
            Err(_) => Some(envelope.clone()),
        };

        if let Some(envelope) = rejected {
            self.send_fallback(envelope);
        }
    }

    fn set_debug(&self, enabled: bool) {
        self.shared.debug.store(enabled, Ordering::SeqCst);
    }

    fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);

        let dispatcher = match self.dispatcher.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        };
        let Some(Dispatcher { tx, worker }) = dispatcher else {
            return;
        };

        // Closing the channel lets the worker drain in-flight requests and exit.
        drop(tx);

        let deadline = Instant::now() + self.shutdown_grace;
        while !worker.is_finished() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }

        if worker.is_finished() {
            let _ = worker.join();
        } else {
            tracing::debug!(
                grace = ?self.shutdown_grace,
                "Delivery thread still busy after shutdown grace, abandoning in-flight sends"
            );
        }
    }
}

fn spawn_dispatcher(shared: Arc<Shared>) -> std::io::Result<Dispatcher> {
    let (tx, mut rx) = mpsc::unbounded_channel::<Envelope>();

    let worker = std::thread::Builder::new()
        .name("patrack-delivery".to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to create delivery runtime");
                    return;
                }
            };

            runtime.block_on(async move {
                let mut in_flight = JoinSet::new();
                while let Some(envelope) = rx.recv().await {
                    in_flight.spawn(deliver(shared.clone(), envelope));
                    while in_flight.try_join_next().is_some() {}
                }
                while in_flight.join_next().await.is_some() {}
            });
        })?;

    Ok(Dispatcher { tx, worker })
}

async fn deliver(shared: Arc<Shared>, envelope: Envelope) {
    match post_envelope(&shared.http_client, &shared.endpoint, &envelope).await {
        Ok(()) => {
            shared.counters.delivered.fetch_add(1, Ordering::SeqCst);
        }
        Err(e) => {
            shared.counters.failed.fetch_add(1, Ordering::SeqCst);
            if shared.debug.load(Ordering::SeqCst) {
                tracing::warn!(
                    target: DEBUG_TARGET,
                    event_type = %envelope.event_type,
                    error = %e,
                    "Error sending data"
                );
            }
        }
    }
}

async fn post_envelope(client: &reqwest::Client, endpoint: &str, envelope: &Envelope) -> Result<()> {
    let response = client
        .post(endpoint)
        .json(envelope)
        .send()
        .await
        .map_err(|e| Error::Transport(format!("HTTP request failed: {}", e)))?;

    let status = response.status();
    if status.is_success() {
        Ok(())
    } else {
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "unknown".to_string());
        Err(Error::Transport(format!(
            "API error ({}): {}",
            status, error_text
        )))
    }
}
