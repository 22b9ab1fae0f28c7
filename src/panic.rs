//! Panic hook integration
//!
//! Rust has no global "uncaught error" event. [`install_panic_hook`] fills that gap by
//! turning every panic into an `error` [`HostEvent`] and dispatching it to an
//! [`EventTarget`], so a tracer subscribed there captures panics like any other error.

use crate::event::HostEvent;
use crate::host::EventTarget;
use crate::tracer::in_pipeline;
use serde_json::json;
use std::panic::PanicHookInfo;
use std::sync::Arc;
use std::thread;
use tokio::runtime::Handle;
use tracing::{debug, warn};

/// Build the event dispatched for a panic
pub fn panic_event(info: &PanicHookInfo<'_>) -> HostEvent {
    let payload = info
        .payload()
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| info.payload().downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "Box<dyn Any>".to_string());

    let thread_name = thread::current().name().unwrap_or("<unnamed>").to_string();
    let mut event = HostEvent::error(payload).with_error(json!({
        "name": "panic",
        "thread": thread_name,
    }));

    if let Some(location) = info.location() {
        event = event.with_location(location.file(), location.line(), location.column());
    }

    event
}

/// Forward panics to `target` as `error` events
///
/// Must be called from within a tokio runtime; the runtime is used to run the
/// dispatch. The previously installed hook keeps running after ours, so default
/// panic output is preserved. Panics raised inside a tracer's own pipeline (a
/// panicking callback or diagnostic sink) are not forwarded. Returns `false` if there
/// is no current runtime.
pub fn install_panic_hook(target: Arc<dyn EventTarget>) -> bool {
    let Ok(handle) = Handle::try_current() else {
        warn!("No tokio runtime available; panic hook not installed");
        return false;
    };

    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        if in_pipeline() {
            debug!("Not forwarding panic raised inside the tracer pipeline");
            previous(info);
            return;
        }

        let event = panic_event(info);
        let target = target.clone();
        debug!("Forwarding panic to error listeners: {:?}", event.message);
        handle.spawn(async move {
            target.dispatch(event).await;
        });
        previous(info);
    }));

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TracerConfig;
    use crate::event::{Propagation, Trigger};
    use crate::host::{LocalEventTarget, StaticEnvironment};
    use crate::tracer::ErrorTracer;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::mpsc;

    // The panic hook is process-wide; tests that install it take turns
    static HOOK_LOCK: tokio::sync::Mutex<()> = tokio::sync::Mutex::const_new(());

    #[tokio::test]
    async fn test_panic_is_dispatched_as_error_event() {
        let _hook = HOOK_LOCK.lock().await;
        let target = Arc::new(LocalEventTarget::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let tx = Arc::new(Mutex::new(tx));

        target.add_listener(
            Trigger::Error,
            Arc::new(move |event: HostEvent| {
                let tx = tx.clone();
                async move {
                    let _ = tx.lock().unwrap().send(event);
                    Propagation::Continue
                }
                .boxed()
            }),
        );

        assert!(install_panic_hook(target.clone()));

        let result = std::thread::Builder::new()
            .name("worker".to_string())
            .spawn(|| panic!("disk on fire"))
            .unwrap()
            .join();
        assert!(result.is_err());

        drop(std::panic::take_hook());

        // Panics from tests running in parallel may arrive too
        let event = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let event: HostEvent = rx.recv().await.unwrap();
                if event.message.as_deref() == Some("disk on fire") {
                    break event;
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(event.kind, Trigger::Error);
        assert_eq!(event.message.as_deref(), Some("disk on fire"));
        assert!(event.filename.as_deref().unwrap().ends_with("panic.rs"));
        assert!(event.lineno.unwrap() > 0);
        assert_eq!(event.error.unwrap()["thread"], "worker");
    }

    #[tokio::test]
    async fn test_panicking_callback_is_not_recaptured_through_hook() {
        let _hook = HOOK_LOCK.lock().await;
        let target = Arc::new(LocalEventTarget::new());
        let tracer = ErrorTracer::new(target.clone(), Arc::new(StaticEnvironment::default()));
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let sink_calls = Arc::new(AtomicUsize::new(0));
        let sink_calls_clone = sink_calls.clone();

        tracer.init(
            TracerConfig::default()
                .with_callback(move |_| {
                    calls_clone.fetch_add(1, Ordering::SeqCst);
                    panic!("callback exploded");
                })
                .with_diagnostics(move |_| {
                    sink_calls_clone.fetch_add(1, Ordering::SeqCst);
                    panic!("sink exploded");
                }),
        );
        assert!(install_panic_hook(target.clone()));

        target.dispatch(HostEvent::error("boom")).await;
        tokio::time::sleep(Duration::from_millis(200)).await;
        drop(std::panic::take_hook());

        assert_eq!(tracer.history().len(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(sink_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_install_without_runtime_fails() {
        let target = Arc::new(LocalEventTarget::new());
        assert!(!install_panic_hook(target));
    }
}
