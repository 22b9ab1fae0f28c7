//! Tracer configuration.
//!
//! A tracer is configured with a [`TracerInit`], which is either a full
//! [`TracerConfig`] or one of two shorthands: a bare callback or a bare endpoint URL.

use crate::error::{ErrorTraceError, Result};
use crate::event::Trigger;
use crate::record::ErrorRecord;
use crate::source::DEFAULT_SOURCE_RANGE;
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Type alias for the callback invoked with every captured record
pub type RecordCallback = Arc<dyn Fn(&ErrorRecord) + Send + Sync>;

/// Type alias for the sink that receives failures the tracer absorbed
pub type DiagnosticSink = Arc<dyn Fn(&ErrorTraceError) + Send + Sync>;

/// Environment variable holding the collection endpoint
pub const ENV_API_URL: &str = "ERRORTRACE_API_URL";
/// Environment variable holding the snippet window size
pub const ENV_SOURCE_RANGE: &str = "ERRORTRACE_SOURCE_RANGE";
/// Environment variable holding a comma-separated trigger list
pub const ENV_TRIGGERS: &str = "ERRORTRACE_TRIGGERS";
/// Environment variable holding the directory local sources may be read from
pub const ENV_LOCAL_SOURCES: &str = "ERRORTRACE_LOCAL_SOURCES";

/// Configuration applied by [`crate::ErrorTracer::init`]
#[derive(Clone)]
pub struct TracerConfig {
    pub triggers: BTreeSet<Trigger>,
    pub callback: Option<RecordCallback>,
    pub api_url: Option<String>,
    pub source_range: usize,
    /// Messages whose events are dropped without a record
    pub ignores: HashSet<String>,
    pub diagnostics: Option<DiagnosticSink>,
    /// Directory that `file://` and path filenames may be read from; `None` refuses them
    pub local_sources: Option<PathBuf>,
}

impl TracerConfig {
    /// Build a configuration from `ERRORTRACE_*` environment variables
    ///
    /// Unset variables keep their defaults; malformed values are a `ConfigError`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(url) = lookup(ENV_API_URL).filter(|url| !url.trim().is_empty()) {
            config.api_url = Some(url.trim().to_string());
        }

        if let Some(range) = lookup(ENV_SOURCE_RANGE) {
            config.source_range = range.trim().parse().map_err(|_| {
                ErrorTraceError::ConfigError(format!("{} must be a positive integer, got {:?}", ENV_SOURCE_RANGE, range))
            })?;
        }

        if let Some(triggers) = lookup(ENV_TRIGGERS) {
            config.triggers = triggers
                .split(',')
                .filter(|name| !name.trim().is_empty())
                .map(str::parse)
                .collect::<Result<_>>()?;
        }

        if let Some(root) = lookup(ENV_LOCAL_SOURCES).filter(|root| !root.trim().is_empty()) {
            config.local_sources = Some(PathBuf::from(root.trim()));
        }

        Ok(config)
    }

    pub fn with_triggers(mut self, triggers: impl IntoIterator<Item = Trigger>) -> Self {
        self.triggers = triggers.into_iter().collect();
        self
    }

    pub fn with_callback(mut self, callback: impl Fn(&ErrorRecord) + Send + Sync + 'static) -> Self {
        self.callback = Some(Arc::new(callback));
        self
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = Some(api_url.into());
        self
    }

    pub fn with_source_range(mut self, source_range: usize) -> Self {
        self.source_range = source_range;
        self
    }

    pub fn with_ignore(mut self, message: impl Into<String>) -> Self {
        self.ignores.insert(message.into());
        self
    }

    pub fn with_diagnostics(mut self, sink: impl Fn(&ErrorTraceError) + Send + Sync + 'static) -> Self {
        self.diagnostics = Some(Arc::new(sink));
        self
    }

    /// Allow snippets to be read from files under `root`
    ///
    /// Panic locations are relative to the crate root they were compiled in, so passing
    /// the working directory of a checked-out build makes them resolvable.
    pub fn with_local_sources(mut self, root: impl Into<PathBuf>) -> Self {
        self.local_sources = Some(root.into());
        self
    }

    /// Whether events with this message are dropped
    pub fn ignores(&self, message: Option<&str>) -> bool {
        message.is_some_and(|m| self.ignores.contains(m))
    }

    /// Drop the delivery targets and ignore list, keeping triggers and source range
    pub(crate) fn clear_targets(&mut self) {
        self.callback = None;
        self.api_url = None;
        self.ignores.clear();
        self.diagnostics = None;
    }
}

impl Default for TracerConfig {
    fn default() -> Self {
        Self {
            triggers: Trigger::ALL.into_iter().collect(),
            callback: None,
            api_url: None,
            source_range: DEFAULT_SOURCE_RANGE,
            ignores: HashSet::new(),
            diagnostics: None,
            local_sources: None,
        }
    }
}

impl fmt::Debug for TracerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TracerConfig")
            .field("triggers", &self.triggers)
            .field("callback", &self.callback.as_ref().map(|_| "<fn>"))
            .field("api_url", &self.api_url)
            .field("source_range", &self.source_range)
            .field("ignores", &self.ignores)
            .field("diagnostics", &self.diagnostics.as_ref().map(|_| "<fn>"))
            .field("local_sources", &self.local_sources)
            .finish()
    }
}

/// The ways a tracer can be configured
#[derive(Clone)]
pub enum TracerInit {
    ByOptions(TracerConfig),
    ByCallback(RecordCallback),
    ByEndpoint(String),
}

impl TracerInit {
    /// Shorthand for a callback-only configuration
    pub fn callback(callback: impl Fn(&ErrorRecord) + Send + Sync + 'static) -> Self {
        Self::ByCallback(Arc::new(callback))
    }

    /// Shorthand for an endpoint-only configuration
    pub fn endpoint(api_url: impl Into<String>) -> Self {
        Self::ByEndpoint(api_url.into())
    }

    /// Turn the variant into a full configuration
    ///
    /// Returns `None` when there is nothing usable to apply (a blank endpoint), in which
    /// case the tracer is left untouched.
    pub fn resolve(self) -> Option<TracerConfig> {
        match self {
            TracerInit::ByOptions(mut config) => {
                if config.source_range == 0 {
                    config.source_range = DEFAULT_SOURCE_RANGE;
                }
                if config.api_url.as_deref().is_some_and(|url| url.trim().is_empty()) {
                    config.api_url = None;
                }
                Some(config)
            }
            TracerInit::ByCallback(callback) => Some(TracerConfig {
                callback: Some(callback),
                ..TracerConfig::default()
            }),
            TracerInit::ByEndpoint(api_url) if api_url.trim().is_empty() => None,
            TracerInit::ByEndpoint(api_url) => Some(TracerConfig::default().with_api_url(api_url.trim())),
        }
    }
}

impl fmt::Debug for TracerInit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TracerInit::ByOptions(config) => f.debug_tuple("ByOptions").field(config).finish(),
            TracerInit::ByCallback(_) => f.write_str("ByCallback(<fn>)"),
            TracerInit::ByEndpoint(url) => f.debug_tuple("ByEndpoint").field(url).finish(),
        }
    }
}

impl From<TracerConfig> for TracerInit {
    fn from(config: TracerConfig) -> Self {
        Self::ByOptions(config)
    }
}

impl From<RecordCallback> for TracerInit {
    fn from(callback: RecordCallback) -> Self {
        Self::ByCallback(callback)
    }
}

impl From<String> for TracerInit {
    fn from(api_url: String) -> Self {
        Self::ByEndpoint(api_url)
    }
}

impl From<&str> for TracerInit {
    fn from(api_url: &str) -> Self {
        Self::ByEndpoint(api_url.to_string())
    }
}
