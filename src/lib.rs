//! Client-side error capture.
//!
//! `errortrace` listens for uncaught errors and unhandled rejections delivered by a
//! host, enriches each one with a source snippet and environment metadata, keeps it
//! in an in-memory history and delivers it to a callback and/or a remote endpoint.

pub mod config;
pub mod error;
pub mod event;
pub mod history;
pub mod host;
pub mod identity;
pub mod panic;
pub mod record;
pub mod reporter;
pub mod source;
pub mod tracer;

pub use config::{DiagnosticSink, RecordCallback, TracerConfig, TracerInit};
pub use error::{ErrorTraceError, Result, ERRORTRACE_CODE};
pub use event::{HostEvent, Propagation, RejectionReason, Trigger};
pub use history::History;
pub use host::{DispatchOutcome, EventTarget, HostEnvironment, LocalEventTarget, StaticEnvironment};
pub use record::{Environment, ErrorRecord, Navigator};
pub use source::SourceLine;
pub use tracer::ErrorTracer;

/// Prelude module for common imports
pub mod prelude {
    pub use crate::error::{ErrorTraceError, Result};
    pub use crate::event::{HostEvent, RejectionReason, Trigger};
    pub use crate::host::{EventTarget, LocalEventTarget, StaticEnvironment};
    pub use crate::panic::install_panic_hook;
    pub use crate::{ErrorTracer, TracerConfig, TracerInit};
}
