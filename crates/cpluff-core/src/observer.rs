//! The three observer channels: event listeners, loggers, and the
//! process-wide fatal-error handler, plus the invocation-kind stack used to
//! detect forbidden re-entrant calls from inside a callback.

use crate::lifecycle::PluginState;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
}

pub trait EventListener: Send + Sync {
    fn on_event(&self, plugin_id: &str, old: PluginState, new: PluginState);
}

pub trait Logger: Send + Sync {
    fn log(&self, severity: Severity, message: &str, activating_plugin_id: Option<&str>);
}

pub trait FatalErrorHandler: Send + Sync {
    fn on_fatal(&self, message: &str);
}

fn mirror_to_tracing(severity: Severity, message: &str, activating_plugin_id: Option<&str>) {
    let plugin_id = activating_plugin_id.unwrap_or("-");
    match severity {
        Severity::Debug => tracing::trace!(plugin_id, "{message}"),
        Severity::Info => tracing::debug!(plugin_id, "{message}"),
        Severity::Warning => tracing::warn!(plugin_id, "{message}"),
        Severity::Error => tracing::error!(plugin_id, "{message}"),
    }
}

/// Event-listener and logger channels for a single context. Delivery
/// iterates a snapshot taken before the loop starts, so a subscriber that
/// unregisters itself (or another subscriber) mid-delivery doesn't
/// invalidate the iteration.
#[derive(Default)]
pub struct ObserverChannels {
    listeners: Vec<Arc<dyn EventListener>>,
    loggers: Vec<(Arc<dyn Logger>, Severity)>,
    min_logger_severity: Option<Severity>,
}

impl ObserverChannels {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener(&mut self, listener: Arc<dyn EventListener>) {
        self.listeners.push(listener);
    }

    pub fn remove_listener(&mut self, listener: &Arc<dyn EventListener>) {
        self.listeners.retain(|l| !Arc::ptr_eq(l, listener));
    }

    pub fn add_logger(&mut self, logger: Arc<dyn Logger>, min_severity: Severity) {
        self.loggers.push((logger, min_severity));
        self.recompute_min_severity();
    }

    pub fn remove_logger(&mut self, logger: &Arc<dyn Logger>) {
        self.loggers.retain(|(l, _)| !Arc::ptr_eq(l, logger));
        self.recompute_min_severity();
    }

    fn recompute_min_severity(&mut self) {
        self.min_logger_severity = self.loggers.iter().map(|(_, s)| *s).min();
    }

    pub fn emit_event(&self, plugin_id: &str, old: PluginState, new: PluginState) {
        let snapshot = self.listeners.clone();
        for listener in snapshot {
            listener.on_event(plugin_id, old, new);
        }
    }

    /// Deliver a log message. Mirrors unconditionally to `tracing`
    /// regardless of registered loggers or their thresholds, then delivers
    /// to each registered logger whose own minimum severity is met. The
    /// cached context-wide minimum lets a below-every-threshold call
    /// short-circuit before touching the logger list at all.
    pub fn log(&self, severity: Severity, message: &str, activating_plugin_id: Option<&str>) {
        mirror_to_tracing(severity, message, activating_plugin_id);
        let Some(min) = self.min_logger_severity else {
            return;
        };
        if severity < min {
            return;
        }
        let snapshot = self.loggers.clone();
        for (logger, logger_min) in snapshot {
            if severity >= logger_min {
                logger.log(severity, message, activating_plugin_id);
            }
        }
    }
}

static FATAL_HANDLER: Lazy<Mutex<Option<Arc<dyn FatalErrorHandler>>>> =
    Lazy::new(|| Mutex::new(None));

pub fn set_fatal_error_handler(handler: Option<Arc<dyn FatalErrorHandler>>) {
    *FATAL_HANDLER.lock() = handler;
}

/// Invoke the process-wide fatal handler if one is installed, then abort.
/// Per the spec, fatal conditions never return to their caller; absent a
/// handler, the process aborts directly.
pub fn raise_fatal(message: &str) -> ! {
    let handler = FATAL_HANDLER.lock().clone();
    match handler {
        Some(h) => {
            h.on_fatal(message);
            std::process::abort();
        }
        None => {
            eprintln!("fatal error with no handler installed: {message}");
            std::process::abort();
        }
    }
}

/// The kinds of plug-in/observer callback a thread can be executing inside.
/// Used to reject operations the spec forbids from within each of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationKind {
    Logger,
    Listener,
    Start,
    Stop,
    Create,
    Destroy,
}

/// A per-context stack of invocation kinds, one entry per nested callback
/// currently executing on the thread holding the context lock.
#[derive(Default)]
pub struct InvocationStack {
    stack: Vec<InvocationKind>,
}

impl InvocationStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_inside(&self, kind: InvocationKind) -> bool {
        self.stack.contains(&kind)
    }

    pub fn is_inside_any(&self) -> bool {
        !self.stack.is_empty()
    }

    pub fn push(&mut self, kind: InvocationKind) {
        self.stack.push(kind);
    }

    pub fn pop(&mut self) {
        self.stack.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingListener(Arc<AtomicUsize>);
    impl EventListener for CountingListener {
        fn on_event(&self, _plugin_id: &str, _old: PluginState, _new: PluginState) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn listener_snapshot_tolerates_reentrant_unregister() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut channels = ObserverChannels::new();
        let listener: Arc<dyn EventListener> = Arc::new(CountingListener(count.clone()));
        channels.add_listener(listener.clone());
        channels.remove_listener(&listener);
        channels.emit_event("p", PluginState::Installed, PluginState::Resolved);
        // removed before emit, so no delivery
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn logger_threshold_is_cached_and_respected() {
        struct Seen(Arc<Mutex<Vec<Severity>>>);
        impl Logger for Seen {
            fn log(&self, s: Severity, _m: &str, _p: Option<&str>) {
                self.0.lock().push(s);
            }
        }
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut channels = ObserverChannels::new();
        channels.add_logger(Arc::new(Seen(seen.clone())), Severity::Warning);
        channels.log(Severity::Debug, "ignored", None);
        channels.log(Severity::Error, "kept", None);
        assert_eq!(*seen.lock(), vec![Severity::Error]);
    }

    #[test]
    fn invocation_stack_tracks_nesting() {
        let mut stack = InvocationStack::new();
        assert!(!stack.is_inside(InvocationKind::Logger));
        stack.push(InvocationKind::Start);
        assert!(stack.is_inside(InvocationKind::Start));
        assert!(!stack.is_inside(InvocationKind::Stop));
        stack.pop();
        assert!(!stack.is_inside_any());
    }
}
