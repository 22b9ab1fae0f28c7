//! Host runtime collaborators.
//!
//! The tracer never talks to a runtime directly. It registers listeners on an
//! [`EventTarget`] and reads context from a [`HostEnvironment`]. [`LocalEventTarget`]
//! and [`StaticEnvironment`] are in-process implementations that ordinary Rust
//! programs (and the tests) can use as the host.

use crate::event::{HostEvent, Propagation, Trigger};
use crate::record::{Environment, Navigator, StorageSnapshot};
use async_trait::async_trait;
use futures::future::{join_all, BoxFuture};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

/// Handle returned by [`EventTarget::add_listener`], used to deregister
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Type alias for event listener functions
pub type EventHandler = Arc<dyn Fn(HostEvent) -> BoxFuture<'static, Propagation> + Send + Sync>;

/// Result of dispatching one event to a target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DispatchOutcome {
    /// Number of listeners the event was delivered to
    pub delivered: usize,
    /// Whether any listener prevented the default handling
    pub default_prevented: bool,
}

/// A global event target that error listeners can be attached to
#[async_trait]
pub trait EventTarget: Send + Sync {
    /// Register a listener for one trigger
    fn add_listener(&self, trigger: Trigger, handler: EventHandler) -> ListenerId;

    /// Deregister a listener. Returns false if it was not registered.
    fn remove_listener(&self, id: ListenerId) -> bool;

    /// Deliver an event to every listener registered for its trigger
    async fn dispatch(&self, event: HostEvent) -> DispatchOutcome;
}

/// In-process event target
///
/// Listeners registered for the event's trigger run concurrently on the calling task;
/// `dispatch` resolves once all of them have finished.
#[derive(Default)]
pub struct LocalEventTarget {
    listeners: Mutex<Vec<(ListenerId, Trigger, EventHandler)>>,
    next_id: AtomicU64,
}

impl LocalEventTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of listeners currently registered for `trigger`
    pub fn listener_count(&self, trigger: Trigger) -> usize {
        let listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        listeners.iter().filter(|(_, t, _)| *t == trigger).count()
    }

    /// Total number of registered listeners
    pub fn len(&self) -> usize {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl EventTarget for LocalEventTarget {
    fn add_listener(&self, trigger: Trigger, handler: EventHandler) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        listeners.push((id, trigger, handler));
        id
    }

    fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|(listener_id, _, _)| *listener_id != id);
        listeners.len() != before
    }

    async fn dispatch(&self, event: HostEvent) -> DispatchOutcome {
        // Snapshot the handlers so listeners may (de)register while running
        let handlers: Vec<EventHandler> = {
            let listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
            listeners
                .iter()
                .filter(|(_, trigger, _)| *trigger == event.kind)
                .map(|(_, _, handler)| handler.clone())
                .collect()
        };

        debug!("Dispatching {} event to {} listener(s)", event.kind, handlers.len());

        let results = join_all(handlers.iter().map(|handler| handler(event.clone()))).await;

        DispatchOutcome {
            delivered: results.len(),
            default_prevented: results.contains(&Propagation::PreventDefault),
        }
    }
}

/// Source of the contextual data attached to every record
pub trait HostEnvironment: Send + Sync {
    /// URI of the current document
    fn location(&self) -> String;

    fn navigator(&self) -> Navigator;

    fn local_storage(&self) -> StorageSnapshot;

    fn session_storage(&self) -> StorageSnapshot;

    fn cookie(&self) -> String;

    /// Capture everything at once
    fn snapshot(&self) -> Environment {
        Environment {
            navigator: self.navigator(),
            local_storage: self.local_storage(),
            session_storage: self.session_storage(),
            cookie: self.cookie(),
        }
    }
}

/// Environment with fixed values, defaulting to a description of the current process
#[derive(Debug, Clone, PartialEq)]
pub struct StaticEnvironment {
    pub location: String,
    pub navigator: Navigator,
    pub local_storage: StorageSnapshot,
    pub session_storage: StorageSnapshot,
    pub cookie: String,
}

impl StaticEnvironment {
    /// Describe the running process: executable as location, OS and arch as navigator
    pub fn from_process() -> Self {
        let location = std::env::current_exe()
            .ok()
            .and_then(|path| reqwest::Url::from_file_path(path).ok())
            .map(|url| url.to_string())
            .unwrap_or_else(|| "about:blank".to_string());

        let language = std::env::var("LANG")
            .ok()
            .and_then(|lang| lang.split('.').next().map(|l| l.replace('_', "-")))
            .filter(|lang| !lang.is_empty())
            .unwrap_or_else(|| "en-US".to_string());

        Self {
            location,
            navigator: Navigator {
                user_agent: format!(
                    "errortrace/{} ({}; {})",
                    env!("CARGO_PKG_VERSION"),
                    std::env::consts::OS,
                    std::env::consts::ARCH
                ),
                platform: std::env::consts::OS.to_string(),
                language,
                on_line: true,
            },
            local_storage: StorageSnapshot::new(),
            session_storage: StorageSnapshot::new(),
            cookie: String::new(),
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    pub fn with_cookie(mut self, cookie: impl Into<String>) -> Self {
        self.cookie = cookie.into();
        self
    }

    pub fn with_local_item(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.local_storage.insert(key.into(), value.into());
        self
    }

    pub fn with_session_item(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.session_storage.insert(key.into(), value.into());
        self
    }
}

impl Default for StaticEnvironment {
    fn default() -> Self {
        Self::from_process()
    }
}

impl HostEnvironment for StaticEnvironment {
    fn location(&self) -> String {
        self.location.clone()
    }

    fn navigator(&self) -> Navigator {
        self.navigator.clone()
    }

    fn local_storage(&self) -> StorageSnapshot {
        self.local_storage.clone()
    }

    fn session_storage(&self) -> StorageSnapshot {
        self.session_storage.clone()
    }

    fn cookie(&self) -> String {
        self.cookie.clone()
    }
}
