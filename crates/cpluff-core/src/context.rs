//! The top-level handle a host creates once per plug-in framework instance.
//! Wraps the lifecycle state, the registered plug-in sources, and the
//! observer channels behind the single recursive lock, and exposes the
//! full public operation surface.

use crate::config::ContextConfig;
use crate::descriptor::loader::load_descriptor;
use crate::descriptor::xml::QuickXmlEventSource;
use crate::descriptor::Descriptor;
use crate::error::{Error, Result};
use crate::lifecycle::{LifecycleState, PluginState};
use crate::lock::ReentrantLock;
use crate::observer::{
    EventListener, FatalErrorHandler, InvocationKind, InvocationStack, Logger, ObserverChannels, Severity,
};
use crate::source::{merge_candidates, PluginSource, ScanFlags};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

/// Opaque handle returned by [`Context::register_source`], needed to
/// unregister it later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceHandle(usize);

struct ContextInner {
    lifecycle: LifecycleState,
    sources: Vec<Option<Box<dyn PluginSource>>>,
    observers: ObserverChannels,
    invocation: InvocationStack,
    config: ContextConfig,
}

/// A single plug-in framework instance. Cheap to clone (it's an `Arc`
/// underneath); every operation takes `&self` and serializes through the
/// recursive lock, so a plug-in's own `start`/`stop` callback is free to
/// call back into the same context.
pub struct Context {
    inner: ReentrantLock<ContextInner>,
}

impl Context {
    pub fn new(config: ContextConfig) -> Arc<Self> {
        Arc::new(Context {
            inner: ReentrantLock::new(ContextInner {
                lifecycle: LifecycleState::new(),
                sources: Vec::new(),
                observers: ObserverChannels::new(),
                invocation: InvocationStack::new(),
                config,
            }),
        })
    }

    /// There is no explicit `destroy` beyond dropping the last `Arc`: every
    /// plug-in still active is stopped and every registration released when
    /// `ContextInner`'s fields drop, since `LifecycleState::uninstall_all`
    /// already stops everything before tearing down the map.
    pub fn destroy(&self) -> Result<()> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        inner.lifecycle.uninstall_all(&inner.observers)
    }

    fn guard_against_reentrant_registration(inner: &ContextInner) -> Result<()> {
        if inner.invocation.is_inside_any() {
            return Err(Error::Runtime(
                "cannot change observer registrations from within a callback".to_string(),
            ));
        }
        Ok(())
    }

    // --- sources -----------------------------------------------------

    pub fn register_source(&self, source: Box<dyn PluginSource>) -> SourceHandle {
        let mut guard = self.inner.lock();
        guard.sources.push(Some(source));
        SourceHandle(guard.sources.len() - 1)
    }

    pub fn unregister_source(&self, handle: SourceHandle) {
        let mut guard = self.inner.lock();
        if let Some(slot) = guard.sources.get_mut(handle.0) {
            *slot = None;
        }
    }

    // --- descriptor loading / manual install --------------------------

    pub fn load_descriptor_file(&self, path: &Path) -> Result<Descriptor> {
        let file = File::open(path)?;
        let mut source = QuickXmlEventSource::new(BufReader::new(file));
        load_descriptor(&mut source, path.parent().map(|p| p.to_path_buf()))
    }

    pub fn install(&self, descriptor: Descriptor) -> Result<()> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        inner.lifecycle.install(Arc::new(descriptor), &inner.observers)
    }

    /// Merge candidates from every registered source and reconcile them
    /// against the currently installed set per `flags`.
    pub fn scan(&self, flags: ScanFlags) -> Result<()> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        let mut live_sources: Vec<Box<dyn PluginSource>> = inner
            .sources
            .iter_mut()
            .filter_map(|slot| slot.take())
            .collect();
        let candidates = merge_candidates(&mut live_sources);
        for (idx, source) in live_sources.into_iter().enumerate() {
            if let Some(slot) = inner.sources.get_mut(idx) {
                *slot = Some(source);
            }
        }

        let active_before: Vec<String> = inner
            .lifecycle
            .plugins
            .iter()
            .filter(|(_, p)| p.state == PluginState::Active)
            .map(|(id, _)| id.clone())
            .collect();

        let mut stopped_all_for_install = false;
        let mut stopped_all_for_upgrade = false;

        for (id, candidate) in &candidates {
            let existing_version = inner.lifecycle.plugins.get(id).map(|p| p.descriptor.version);
            match existing_version {
                None => {
                    if flags.install {
                        if flags.stop_all_on_install && !stopped_all_for_install {
                            inner.lifecycle.stop_all(&inner.observers)?;
                            stopped_all_for_install = true;
                        }
                        inner
                            .lifecycle
                            .install(Arc::new(clone_descriptor(candidate)), &inner.observers)?;
                    }
                }
                Some(current) if candidate.version > current && flags.upgrade => {
                    if flags.stop_all_on_upgrade && !stopped_all_for_upgrade {
                        inner.lifecycle.stop_all(&inner.observers)?;
                        stopped_all_for_upgrade = true;
                    }
                    inner.lifecycle.uninstall(id, &inner.observers)?;
                    inner
                        .lifecycle
                        .install(Arc::new(clone_descriptor(candidate)), &inner.observers)?;
                }
                Some(current) if candidate.version < current && flags.downgrade => {
                    if flags.stop_all_on_upgrade && !stopped_all_for_upgrade {
                        inner.lifecycle.stop_all(&inner.observers)?;
                        stopped_all_for_upgrade = true;
                    }
                    inner.lifecycle.uninstall(id, &inner.observers)?;
                    inner
                        .lifecycle
                        .install(Arc::new(clone_descriptor(candidate)), &inner.observers)?;
                }
                _ => {}
            }
        }

        if flags.uninstall {
            let stale: Vec<String> = inner
                .lifecycle
                .plugins
                .keys()
                .filter(|id| !candidates.contains_key(*id))
                .cloned()
                .collect();
            for id in stale {
                inner.lifecycle.uninstall(&id, &inner.observers)?;
            }
        }

        if flags.restart_active {
            for id in active_before {
                if inner.lifecycle.plugins.contains_key(&id) {
                    inner.lifecycle.start(&id, &inner.observers)?;
                }
            }
        }

        Ok(())
    }

    // --- lifecycle -----------------------------------------------------

    pub fn resolve(&self, id: &str) -> Result<()> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        inner.lifecycle.resolve(id, &inner.observers)
    }

    pub fn start(&self, id: &str) -> Result<()> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        inner.invocation.push(InvocationKind::Start);
        let result = inner.lifecycle.start(id, &inner.observers);
        inner.invocation.pop();
        result
    }

    pub fn stop(&self, id: &str) -> Result<()> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        inner.invocation.push(InvocationKind::Stop);
        let result = inner.lifecycle.stop(id, &inner.observers);
        inner.invocation.pop();
        result
    }

    pub fn stop_all(&self) -> Result<()> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        inner.invocation.push(InvocationKind::Stop);
        let result = inner.lifecycle.stop_all(&inner.observers);
        inner.invocation.pop();
        result
    }

    pub fn unresolve(&self, id: &str) -> Result<()> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        inner.lifecycle.unresolve(id, &inner.observers)
    }

    pub fn uninstall(&self, id: &str) -> Result<()> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        inner.lifecycle.uninstall(id, &inner.observers)
    }

    pub fn uninstall_all(&self) -> Result<()> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        inner.lifecycle.uninstall_all(&inner.observers)
    }

    pub fn get_state(&self, id: &str) -> Result<PluginState> {
        let guard = self.inner.lock();
        guard.lifecycle.state_of(id)
    }

    // --- introspection ---------------------------------------------------

    /// Clone of the plug-in's descriptor handle. Holding the returned `Arc`
    /// keeps the descriptor alive even across an `uninstall` of the plug-in
    /// that produced it; there's no explicit `release-info` call to balance
    /// since dropping the `Arc` is exactly that release.
    pub fn plugin_info(&self, id: &str) -> Result<Arc<Descriptor>> {
        let guard = self.inner.lock();
        guard.lifecycle.descriptor_of(id)
    }

    pub fn plugins_info(&self) -> Vec<Arc<Descriptor>> {
        let guard = self.inner.lock();
        guard.lifecycle.plugins.values().map(|p| p.descriptor.clone()).collect()
    }

    pub fn extension_point(&self, global_id: &str) -> Option<Arc<Descriptor>> {
        let guard = self.inner.lock();
        guard
            .lifecycle
            .plugins
            .values()
            .find(|p| p.descriptor.extension_point(global_id).is_some())
            .map(|p| p.descriptor.clone())
    }

    // --- symbols ---------------------------------------------------------

    pub fn define_symbol(&self, provider_id: &str, name: &str, ptr: usize) -> Result<()> {
        let mut guard = self.inner.lock();
        guard.lifecycle.define_symbol(provider_id, name, ptr)
    }

    pub fn resolve_symbol(&self, consumer_id: Option<&str>, provider_id: &str, name: &str) -> Result<usize> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        inner
            .lifecycle
            .resolve_symbol(consumer_id, provider_id, name, &inner.observers)
    }

    pub fn release_symbol(&self, provider_id: &str, name: &str) {
        let mut guard = self.inner.lock();
        guard.lifecycle.release_symbol(provider_id, name);
    }

    // --- observers ---------------------------------------------------------

    pub fn add_event_listener(&self, listener: Arc<dyn EventListener>) -> Result<()> {
        let mut guard = self.inner.lock();
        Self::guard_against_reentrant_registration(&guard)?;
        guard.observers.add_listener(listener);
        Ok(())
    }

    pub fn remove_event_listener(&self, listener: &Arc<dyn EventListener>) -> Result<()> {
        let mut guard = self.inner.lock();
        Self::guard_against_reentrant_registration(&guard)?;
        guard.observers.remove_listener(listener);
        Ok(())
    }

    pub fn add_logger(&self, logger: Arc<dyn Logger>, min_severity: Severity) -> Result<()> {
        let mut guard = self.inner.lock();
        Self::guard_against_reentrant_registration(&guard)?;
        guard.observers.add_logger(logger, min_severity);
        Ok(())
    }

    pub fn remove_logger(&self, logger: &Arc<dyn Logger>) -> Result<()> {
        let mut guard = self.inner.lock();
        Self::guard_against_reentrant_registration(&guard)?;
        guard.observers.remove_logger(logger);
        Ok(())
    }

    pub fn log(&self, severity: Severity, message: &str, activating_plugin_id: Option<&str>) {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        inner.invocation.push(InvocationKind::Logger);
        inner.observers.log(severity, message, activating_plugin_id);
        inner.invocation.pop();
    }

    pub fn set_fatal_error_handler(&self, handler: Option<Arc<dyn FatalErrorHandler>>) {
        crate::observer::set_fatal_error_handler(handler);
    }

    pub fn config(&self) -> ContextConfig {
        self.inner.lock().config.clone()
    }
}

/// `Descriptor` doesn't implement `Clone` (its `ConfigElement` subtree is an
/// `Arc` graph already shared cheaply) so `scan` works with the owned
/// candidate directly, cloning only the lightweight fields it compares.
fn clone_descriptor(d: &Descriptor) -> Descriptor {
    Descriptor {
        id: d.id.clone(),
        name: d.name.clone(),
        version: d.version,
        provider_name: d.provider_name.clone(),
        path: d.path.clone(),
        abi_compatibility: d.abi_compatibility,
        api_compatibility: d.api_compatibility,
        required_framework_version: d.required_framework_version,
        runtime_library: d.runtime_library.clone(),
        runtime_funcs_symbol: d.runtime_funcs_symbol.clone(),
        imports: d.imports.clone(),
        extension_points: d.extension_points.clone(),
        extensions: d
            .extensions
            .iter()
            .map(|e| crate::descriptor::Extension {
                point_id: e.point_id.clone(),
                local_id: e.local_id.clone(),
                global_id: e.global_id.clone(),
                name: e.name.clone(),
                configuration: e.configuration.clone(),
            })
            .collect(),
    }
}
