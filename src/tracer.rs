//! The error tracer.
//!
//! [`ErrorTracer`] subscribes to a host [`EventTarget`], turns every qualifying event
//! into an [`ErrorRecord`], keeps it in its [`History`] and hands it to the configured
//! callback and remote endpoint.
//!
//! # Lifecycle
//!
//! A new tracer is inactive and unsubscribed. [`ErrorTracer::init`] applies a
//! configuration, (re)registers one listener per trigger and activates the tracer.
//! [`ErrorTracer::deactive`] and [`ErrorTracer::active`] pause and resume capture.
//! [`ErrorTracer::reset`] forgets the delivery targets and history and deactivates.
//! Listeners are released by [`ErrorTracer::dispose`] or when the tracer is dropped.
//!
//! # Failure isolation
//!
//! Nothing that goes wrong inside the pipeline reaches the host's dispatcher. Failures
//! are logged and forwarded to the optional diagnostic sink. Report failures are also
//! surfaced back to the event target as tagged `unhandledrejection` events, which the
//! tracer recognises and suppresses instead of capturing. Panics raised while the
//! pipeline runs, including those from the callback or the diagnostic sink, are not
//! forwarded by [`crate::panic::install_panic_hook`], so they cannot re-enter it.
//!
//! # Usage Example
//!
//! ```rust,ignore
//! use errortrace::{ErrorTracer, LocalEventTarget, StaticEnvironment, HostEvent};
//! use std::sync::Arc;
//!
//! let target = Arc::new(LocalEventTarget::new());
//! let tracer = ErrorTracer::new(target.clone(), Arc::new(StaticEnvironment::default()));
//!
//! tracer.init("https://collector.example.com/errors");
//! target.dispatch(HostEvent::error("boom")).await;
//! tracer.flush().await;
//! ```

use crate::config::{TracerConfig, TracerInit};
use crate::error::{ErrorTraceError, Result};
use crate::event::{HostEvent, Propagation, RejectionReason};
use crate::history::History;
use crate::host::{EventHandler, EventTarget, HostEnvironment, ListenerId};
use crate::identity::{derive_error_id, new_client_id, serialize_error};
use crate::record::ErrorRecord;
use crate::reporter::RemoteReporter;
use crate::source::{is_remote, SourceFetcher};
use futures::FutureExt;
use reqwest::Client;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};
use tokio::runtime::Handle;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

tokio::task_local! {
    static IN_PIPELINE: ();
}

/// Whether the current task is running a tracer's capture or report pipeline
pub(crate) fn in_pipeline() -> bool {
    IN_PIPELINE.try_with(|_| ()).is_ok()
}

/// Captures host errors and delivers enriched records
pub struct ErrorTracer {
    inner: Arc<TracerInner>,
}

struct TracerInner {
    client_id: Uuid,
    active: AtomicBool,
    config: RwLock<TracerConfig>,
    history: History,
    fetcher: SourceFetcher,
    reporter: RemoteReporter,
    target: Arc<dyn EventTarget>,
    environment: Arc<dyn HostEnvironment>,
    listeners: Mutex<Vec<ListenerId>>,
    reports: Mutex<JoinSet<()>>,
}

impl ErrorTracer {
    /// Create an inactive tracer bound to a host
    ///
    /// # Arguments
    ///
    /// * `target` - Event target to subscribe to once configured
    /// * `environment` - Source of location, navigator, storage and cookie data
    pub fn new(target: Arc<dyn EventTarget>, environment: Arc<dyn HostEnvironment>) -> Self {
        Self::with_client(target, environment, Client::new())
    }

    /// Create a tracer whose fetches and reports go through `client`
    ///
    /// Use this to set timeouts, proxies or default headers on outbound requests.
    pub fn with_client(
        target: Arc<dyn EventTarget>,
        environment: Arc<dyn HostEnvironment>,
        client: Client,
    ) -> Self {
        let client_id = new_client_id();
        debug!("Created error tracer {}", client_id);

        Self {
            inner: Arc::new(TracerInner {
                client_id,
                active: AtomicBool::new(false),
                config: RwLock::new(TracerConfig::default()),
                history: History::new(),
                fetcher: SourceFetcher::with_client(client.clone()),
                reporter: RemoteReporter::with_client(client),
                target,
                environment,
                listeners: Mutex::new(Vec::new()),
                reports: Mutex::new(JoinSet::new()),
            }),
        }
    }

    /// Apply a configuration and start capturing
    ///
    /// Listeners from a previous `init` are removed before the new ones are registered.
    /// Returns `false`, changing nothing, if the configuration has nothing to apply.
    pub fn init(&self, init: impl Into<TracerInit>) -> bool {
        let init = init.into();
        let Some(config) = init.resolve() else {
            debug!("Ignoring empty tracer configuration");
            return false;
        };

        self.inner.unsubscribe();

        let mut listeners = self.inner.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        for trigger in &config.triggers {
            let id = self.inner.target.add_listener(*trigger, self.handler());
            listeners.push(id);
        }
        drop(listeners);

        info!(
            "Error tracer {} listening for {:?} (endpoint: {:?})",
            self.inner.client_id, config.triggers, config.api_url
        );
        *self.inner.config.write().unwrap_or_else(PoisonError::into_inner) = config;
        self.active();
        true
    }

    fn handler(&self) -> EventHandler {
        let weak: Weak<TracerInner> = Arc::downgrade(&self.inner);
        Arc::new(move |event: HostEvent| {
            let weak = weak.clone();
            async move {
                match weak.upgrade() {
                    Some(inner) => inner.handle_event(event).await,
                    None => Propagation::Continue,
                }
            }
            .boxed()
        })
    }

    /// Resume capturing
    pub fn active(&self) {
        self.inner.active.store(true, Ordering::SeqCst);
    }

    /// Pause capturing; events are dropped until [`ErrorTracer::active`]
    pub fn deactive(&self) {
        self.inner.active.store(false, Ordering::SeqCst);
    }

    /// Forget callback, endpoint, ignores and history, and deactivate
    pub fn reset(&self) {
        self.deactive();
        self.inner.history.clear();
        self.inner
            .config
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear_targets();
        debug!("Error tracer {} reset", self.inner.client_id);
    }

    /// Deregister every listener this tracer holds
    pub fn dispose(&self) {
        self.inner.unsubscribe();
    }

    /// Run the capture pipeline for one event without going through the event target
    pub async fn handle_event(&self, event: HostEvent) -> Propagation {
        self.inner.clone().handle_event(event).await
    }

    /// Wait for every in-flight report to finish
    pub async fn flush(&self) {
        loop {
            let mut reports = std::mem::take(&mut *self.inner.reports.lock().unwrap_or_else(PoisonError::into_inner));
            if reports.is_empty() {
                break;
            }
            while let Some(result) = reports.join_next().await {
                if let Err(e) = result {
                    debug!("Report task ended abnormally: {}", e);
                }
            }
        }
    }

    pub fn client_id(&self) -> Uuid {
        self.inner.client_id
    }

    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::SeqCst)
    }

    /// Shared handle to the captured records
    pub fn history(&self) -> History {
        self.inner.history.clone()
    }

    /// Snapshot of the configuration in effect
    pub fn config(&self) -> TracerConfig {
        self.inner.config.read().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl Drop for ErrorTracer {
    fn drop(&mut self) {
        self.inner.unsubscribe();
    }
}

impl TracerInner {
    fn unsubscribe(&self) {
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        for id in listeners.drain(..) {
            self.target.remove_listener(id);
        }
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    async fn handle_event(self: Arc<Self>, event: HostEvent) -> Propagation {
        IN_PIPELINE.scope((), self.run_pipeline(event)).await
    }

    async fn run_pipeline(self: Arc<Self>, event: HostEvent) -> Propagation {
        match AssertUnwindSafe(self.process(event)).catch_unwind().await {
            Ok(Ok(propagation)) => propagation,
            Ok(Err(err)) => {
                debug!("Error tracer dropped an event: {}", err);
                self.notify(&err);
                Propagation::Continue
            }
            Err(panic) => {
                let err = ErrorTraceError::HandlerError(panic_message(panic.as_ref()));
                debug!("Error tracer handler panicked: {}", err);
                self.notify(&err);
                Propagation::Continue
            }
        }
    }

    async fn process(self: &Arc<Self>, event: HostEvent) -> Result<Propagation> {
        if !self.is_active() {
            return Ok(Propagation::Continue);
        }

        let config = self.config.read().unwrap_or_else(PoisonError::into_inner).clone();

        if config.ignores(event.message.as_deref()) {
            debug!("Ignoring {} event: {:?}", event.kind, event.message);
            return Ok(Propagation::Continue);
        }

        if event.is_internal() {
            debug!("Suppressing tracer transport failure: {:?}", event.reason);
            return Ok(Propagation::PreventDefault);
        }

        let record = self.create_record(event, &config).await?;
        self.history.append(record.clone());

        if let Some(callback) = &config.callback {
            if let Err(panic) = std::panic::catch_unwind(AssertUnwindSafe(|| callback(&record))) {
                let err = ErrorTraceError::HandlerError(format!("callback panicked: {}", panic_message(panic.as_ref())));
                warn!("{}", err);
                self.notify(&err);
            }
        }

        if let Some(api_url) = config.api_url {
            self.spawn_report(api_url, record);
        }

        Ok(Propagation::Continue)
    }

    async fn create_record(&self, event: HostEvent, config: &TracerConfig) -> Result<ErrorRecord> {
        let error_id = derive_error_id(&serialize_error(&event)?, &self.client_id);

        let (source, error_line_number) = match event.source_location() {
            Some((filename, lineno)) => {
                let fetched = self
                    .fetcher
                    .fetch_snippet_within(
                        filename,
                        lineno as usize,
                        config.source_range,
                        config.local_sources.as_deref(),
                    )
                    .await;
                match fetched {
                    Ok(snippet) => (Some(snippet), Some(lineno)),
                    // A missing or refused local file still yields a record
                    Err(err) if !is_remote(filename) => {
                        debug!("No source snippet for {}: {}", filename, err);
                        self.notify(&err);
                        (None, Some(lineno))
                    }
                    Err(err) => return Err(err),
                }
            }
            None => (None, None),
        };

        Ok(ErrorRecord {
            error_id,
            client_id: self.client_id,
            location: self.environment.location(),
            error: event,
            environment: self.environment.snapshot(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            source,
            error_line_number,
        })
    }

    fn spawn_report(self: &Arc<Self>, api_url: String, record: ErrorRecord) {
        if Handle::try_current().is_err() {
            let err = ErrorTraceError::HandlerError(format!(
                "no tokio runtime available; report of {} to {} not sent",
                record.error_id, api_url
            ));
            warn!("{}", err);
            self.notify(&err);
            return;
        }

        let reporter = self.reporter.clone();
        let weak = Arc::downgrade(self);

        let task = async move {
            let Err(err) = reporter.report(&api_url, &record).await else {
                return;
            };
            warn!("Failed to report error {}: {}", record.error_id, err);

            if let Some(inner) = weak.upgrade() {
                inner.notify(&err);
                // Surface the rejected report to the host like any other unhandled failure
                let outcome = inner
                    .target
                    .dispatch(HostEvent::unhandled_rejection(RejectionReason::from(&err)))
                    .await;
                debug!("Surfaced report failure to {} listener(s)", outcome.delivered);
            }
        };

        let mut reports = self.reports.lock().unwrap_or_else(PoisonError::into_inner);
        while reports.try_join_next().is_some() {}
        reports.spawn(IN_PIPELINE.scope((), task));
    }

    fn notify(&self, err: &ErrorTraceError) {
        let sink = self
            .config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .diagnostics
            .clone();

        if let Some(sink) = sink {
            // A failing sink must not feed back into the pipeline
            let _ = std::panic::catch_unwind(AssertUnwindSafe(|| sink(err)));
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
