//! The state machine and dependency graph at the heart of the framework:
//! per-plug-in state, install/resolve/start/stop/unresolve/uninstall, and
//! the cycle handling described in the design notes (an explicit traversal
//! stack plus a deferred-commit queue for cycle members, replacing pointer
//! aliasing and `active_operation` sentinels with plain `HashSet` adjacency
//! keyed directly by plug-in identifier).

use crate::descriptor::Descriptor;
use crate::error::{Error, Result};
use crate::observer::ObserverChannels;
use crate::symbol::runtime::platform_library_filename;
use crate::symbol::{ResolutionLog, RuntimeHandle, SharedRuntimeHandle, SymbolTable};
use std::collections::{HashMap, HashSet};
use std::ffi::c_void;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginState {
    Uninstalled,
    Installed,
    Resolved,
    Starting,
    Active,
    Stopping,
}

impl PluginState {
    /// Rank used for ">= resolved"-style invariant checks. `Starting` and
    /// `Stopping` are transient siblings of `Resolved`/`Active` rather than
    /// strictly greater, so this is a deliberate hand-written mapping
    /// instead of a derived `Ord` over declaration order.
    fn rank(self) -> u8 {
        match self {
            PluginState::Uninstalled => 0,
            PluginState::Installed => 1,
            PluginState::Resolved => 2,
            PluginState::Starting => 3,
            PluginState::Active => 4,
            PluginState::Stopping => 3,
        }
    }

    pub fn at_least(self, floor: PluginState) -> bool {
        self.rank() >= floor.rank()
    }
}

impl std::fmt::Display for PluginState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PluginState::Uninstalled => "uninstalled",
            PluginState::Installed => "installed",
            PluginState::Resolved => "resolved",
            PluginState::Starting => "starting",
            PluginState::Active => "active",
            PluginState::Stopping => "stopping",
        };
        f.write_str(s)
    }
}

pub struct RegisteredPlugin {
    pub descriptor: Arc<Descriptor>,
    pub state: PluginState,
    pub imported: HashSet<String>,
    pub importing: HashSet<String>,
    pub runtime: Option<SharedRuntimeHandle>,
    pub instance: Option<usize>,
    pub state_locked: bool,
}

impl RegisteredPlugin {
    fn new(descriptor: Arc<Descriptor>) -> Self {
        RegisteredPlugin {
            descriptor,
            state: PluginState::Installed,
            imported: HashSet::new(),
            importing: HashSet::new(),
            runtime: None,
            instance: None,
            state_locked: false,
        }
    }
}

/// Owns the identifier -> plug-in map, the started-order list, and the
/// symbol tables. Does not own the lock or the observer channels — those
/// live on `Context`, which serializes all access to this state and passes
/// the observer channels through to each operation for event delivery.
#[derive(Default)]
pub struct LifecycleState {
    pub plugins: HashMap<String, RegisteredPlugin>,
    pub started: Vec<String>,
    symbols: SymbolTable,
    resolution_log: ResolutionLog,
}

impl LifecycleState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state_of(&self, id: &str) -> Result<PluginState> {
        self.plugins
            .get(id)
            .map(|p| p.state)
            .ok_or_else(|| Error::Unknown(id.to_string()))
    }

    pub fn descriptor_of(&self, id: &str) -> Result<Arc<Descriptor>> {
        self.plugins
            .get(id)
            .map(|p| p.descriptor.clone())
            .ok_or_else(|| Error::Unknown(id.to_string()))
    }

    pub fn install(&mut self, descriptor: Arc<Descriptor>, observers: &ObserverChannels) -> Result<()> {
        if self.plugins.contains_key(&descriptor.id) {
            return Err(Error::Conflict(descriptor.id.clone()));
        }
        let id = descriptor.id.clone();
        self.plugins.insert(id.clone(), RegisteredPlugin::new(descriptor));
        observers.emit_event(&id, PluginState::Uninstalled, PluginState::Installed);
        Ok(())
    }

    fn open_runtime(&mut self, id: &str) -> Result<()> {
        let descriptor = self.plugins[id].descriptor.clone();
        let Some(lib_base) = &descriptor.runtime_library else {
            return Ok(());
        };
        let funcs_symbol = descriptor
            .runtime_funcs_symbol
            .as_deref()
            .unwrap_or("cpluff_runtime_funcs");
        let install_dir = descriptor.path.clone().unwrap_or_else(|| PathBuf::from("."));
        let lib_path = install_dir.join(platform_library_filename(lib_base));
        let handle = RuntimeHandle::open(&lib_path, funcs_symbol)?;
        self.plugins.get_mut(id).unwrap().runtime = Some(Arc::new(handle));
        Ok(())
    }

    fn resolve_one(
        &mut self,
        id: &str,
        stack: &mut Vec<String>,
        pending: &mut Vec<String>,
        observers: &ObserverChannels,
    ) -> Result<()> {
        let state = self
            .plugins
            .get(id)
            .ok_or_else(|| Error::Dependency(format!("unknown plug-in '{id}'")))?
            .state;
        if state.at_least(PluginState::Resolved) {
            return Ok(());
        }
        if stack.iter().any(|s| s == id) {
            if !pending.iter().any(|p| p == id) {
                pending.push(id.to_string());
            }
            return Ok(());
        }
        if self.plugins[id].state_locked {
            return Err(Error::Deadlock(id.to_string()));
        }

        self.plugins.get_mut(id).unwrap().state_locked = true;
        stack.push(id.to_string());

        let imports = self.plugins[id].descriptor.imports.clone();
        let mut added: Vec<String> = Vec::new();

        for imp in &imports {
            if !self.plugins.contains_key(&imp.plugin_id) {
                if imp.optional {
                    continue;
                }
                self.rollback_node(id, &added, stack);
                return Err(Error::Dependency(format!(
                    "plug-in '{id}' requires missing import '{}'",
                    imp.plugin_id
                )));
            }
            if let Some(required) = imp.version {
                let candidate_version = self.plugins[&imp.plugin_id].descriptor.version;
                if !imp.match_rule.matches(candidate_version, required) {
                    self.rollback_node(id, &added, stack);
                    return Err(Error::Dependency(format!(
                        "plug-in '{id}' import '{}' does not satisfy version constraint",
                        imp.plugin_id
                    )));
                }
            }
            match self.resolve_one(&imp.plugin_id, stack, pending, observers) {
                Ok(()) => {
                    self.plugins
                        .get_mut(id)
                        .unwrap()
                        .imported
                        .insert(imp.plugin_id.clone());
                    self.plugins
                        .get_mut(&imp.plugin_id)
                        .unwrap()
                        .importing
                        .insert(id.to_string());
                    added.push(imp.plugin_id.clone());
                }
                Err(e) => {
                    self.rollback_node(id, &added, stack);
                    return Err(e);
                }
            }
        }

        if let Err(e) = self.open_runtime(id) {
            self.rollback_node(id, &added, stack);
            return Err(e);
        }

        stack.retain(|s| s != id);
        if pending.iter().any(|p| p == id) {
            // Cycle member: stays locked and at its prior state until the
            // top-level caller commits the whole pending queue.
            Ok(())
        } else {
            self.plugins.get_mut(id).unwrap().state = PluginState::Resolved;
            self.plugins.get_mut(id).unwrap().state_locked = false;
            observers.emit_event(id, PluginState::Installed, PluginState::Resolved);
            Ok(())
        }
    }

    fn rollback_node(&mut self, id: &str, added: &[String], stack: &mut Vec<String>) {
        for target in added {
            if let Some(p) = self.plugins.get_mut(id) {
                p.imported.remove(target);
            }
            if let Some(p) = self.plugins.get_mut(target.as_str()) {
                p.importing.remove(id);
            }
        }
        if let Some(p) = self.plugins.get_mut(id) {
            p.state_locked = false;
        }
        stack.retain(|s| s != id);
    }

    pub fn resolve(&mut self, id: &str, observers: &ObserverChannels) -> Result<()> {
        if !self.plugins.contains_key(id) {
            return Err(Error::Unknown(id.to_string()));
        }
        let mut stack = Vec::new();
        let mut pending = Vec::new();
        match self.resolve_one(id, &mut stack, &mut pending, observers) {
            Ok(()) => {
                for pid in &pending {
                    if let Some(p) = self.plugins.get_mut(pid) {
                        p.state = PluginState::Resolved;
                        p.state_locked = false;
                    }
                }
                for pid in &pending {
                    observers.emit_event(pid, PluginState::Installed, PluginState::Resolved);
                }
                Ok(())
            }
            Err(e) => {
                for pid in &pending {
                    if let Some(p) = self.plugins.get_mut(pid) {
                        p.state_locked = false;
                    }
                }
                Err(e)
            }
        }
    }

    /// Starts `id`, starting its resolved imports first (C-Pluff starts
    /// imports transitively, though never the reverse — *importers* are
    /// left alone). Cyclic imports are handled the same way `resolve` does:
    /// a traversal stack catches re-entry into a node already being started
    /// by an ancestor frame and defers it into `pending`, which the
    /// top-level call commits once the whole cycle has unwound.
    pub fn start(&mut self, id: &str, observers: &ObserverChannels) -> Result<()> {
        if !self.plugins.contains_key(id) {
            return Err(Error::Unknown(id.to_string()));
        }
        let mut stack = Vec::new();
        let mut pending = Vec::new();
        self.start_one(id, &mut stack, &mut pending, observers)?;
        for pid in pending {
            if self.plugins.get(&pid).map(|p| p.state) != Some(PluginState::Active) {
                self.commit_start(&pid, observers)?;
            }
        }
        Ok(())
    }

    fn start_one(
        &mut self,
        id: &str,
        stack: &mut Vec<String>,
        pending: &mut Vec<String>,
        observers: &ObserverChannels,
    ) -> Result<()> {
        let state = self.plugins.get(id).ok_or_else(|| Error::Unknown(id.to_string()))?.state;
        if state == PluginState::Active {
            return Ok(());
        }
        if stack.iter().any(|s| s == id) {
            if !pending.iter().any(|p| p == id) {
                pending.push(id.to_string());
            }
            return Ok(());
        }
        if self.plugins[id].state_locked {
            return Err(Error::Deadlock(id.to_string()));
        }

        self.resolve(id, observers)?;

        stack.push(id.to_string());
        let imported = self.plugins[id].imported.clone();
        let import_ids: Vec<String> = self.plugins[id]
            .descriptor
            .imports
            .iter()
            .map(|imp| imp.plugin_id.clone())
            .filter(|pid| imported.contains(pid))
            .collect();
        for dep in &import_ids {
            self.start_one(dep, stack, pending, observers)?;
        }
        stack.retain(|s| s != id);

        if pending.iter().any(|p| p == id) {
            // Deferred: committed by the top-level `start` call once the
            // whole cycle has unwound.
            Ok(())
        } else {
            self.commit_start(id, observers)
        }
    }

    fn commit_start(&mut self, id: &str, observers: &ObserverChannels) -> Result<()> {
        if self.plugins[id].state == PluginState::Active {
            return Ok(());
        }

        self.plugins.get_mut(id).unwrap().state_locked = true;
        self.plugins.get_mut(id).unwrap().state = PluginState::Starting;
        observers.emit_event(id, PluginState::Resolved, PluginState::Starting);

        let runtime = self.plugins[id].runtime.clone();
        let instance_ptr = runtime
            .as_ref()
            .map(|r| r.create(std::ptr::null_mut()))
            .unwrap_or(std::ptr::null_mut());
        self.plugins.get_mut(id).unwrap().instance = Some(instance_ptr as usize);

        let start_ok = runtime.as_ref().map(|r| r.start(instance_ptr)).unwrap_or(true);

        if !start_ok {
            self.plugins.get_mut(id).unwrap().state = PluginState::Stopping;
            observers.emit_event(id, PluginState::Starting, PluginState::Stopping);
            if let Some(r) = &runtime {
                r.stop(instance_ptr);
                r.destroy(instance_ptr);
            }
            self.plugins.get_mut(id).unwrap().instance = None;
            self.plugins.get_mut(id).unwrap().state = PluginState::Resolved;
            self.plugins.get_mut(id).unwrap().state_locked = false;
            observers.emit_event(id, PluginState::Stopping, PluginState::Resolved);
            return Err(Error::Runtime(format!("plug-in '{id}' failed to start")));
        }

        self.started.push(id.to_string());
        self.plugins.get_mut(id).unwrap().state = PluginState::Active;
        self.plugins.get_mut(id).unwrap().state_locked = false;
        observers.emit_event(id, PluginState::Starting, PluginState::Active);
        Ok(())
    }

    pub fn stop(&mut self, id: &str, observers: &ObserverChannels) -> Result<()> {
        let rp = self.plugins.get(id).ok_or_else(|| Error::Unknown(id.to_string()))?;
        if rp.state != PluginState::Active {
            return Ok(());
        }
        if rp.state_locked {
            return Err(Error::Deadlock(id.to_string()));
        }

        let importer_ids: HashSet<String> = self.plugins[id].importing.clone();
        let to_stop_first: Vec<String> = self
            .started
            .iter()
            .rev()
            .filter(|pid| importer_ids.contains(*pid))
            .cloned()
            .collect();
        for importer in to_stop_first {
            self.stop(&importer, observers)?;
        }

        self.plugins.get_mut(id).unwrap().state_locked = true;
        self.plugins.get_mut(id).unwrap().state = PluginState::Stopping;
        observers.emit_event(id, PluginState::Active, PluginState::Stopping);

        let runtime = self.plugins[id].runtime.clone();
        let instance_ptr = self.plugins[id]
            .instance
            .map(|p| p as *mut c_void)
            .unwrap_or(std::ptr::null_mut());
        if let Some(r) = &runtime {
            r.stop(instance_ptr);
        }
        // `destroy` is not called here: per the callback-counter scenario,
        // it fires on unresolve (when the runtime library itself is closed),
        // not on every stop. The instance stays alive, stopped, until then.
        self.symbols.clear_provider(id);
        self.resolution_log.clear_consumer(id);

        self.started.retain(|x| x != id);
        self.plugins.get_mut(id).unwrap().state = PluginState::Resolved;
        self.plugins.get_mut(id).unwrap().state_locked = false;
        observers.emit_event(id, PluginState::Stopping, PluginState::Resolved);
        Ok(())
    }

    pub fn stop_all(&mut self, observers: &ObserverChannels) -> Result<()> {
        while let Some(id) = self.started.last().cloned() {
            self.stop(&id, observers)?;
        }
        Ok(())
    }

    pub fn unresolve(&mut self, id: &str, observers: &ObserverChannels) -> Result<()> {
        let rp = self.plugins.get(id).ok_or_else(|| Error::Unknown(id.to_string()))?;
        if matches!(rp.state, PluginState::Uninstalled | PluginState::Installed) {
            return Ok(());
        }
        if rp.state_locked {
            return Err(Error::Deadlock(id.to_string()));
        }

        self.stop(id, observers)?;

        let importer_ids: Vec<String> = self.plugins[id].importing.iter().cloned().collect();
        for importer in importer_ids {
            let still_resolved = self
                .plugins
                .get(&importer)
                .map(|p| !matches!(p.state, PluginState::Uninstalled | PluginState::Installed))
                .unwrap_or(false);
            if still_resolved {
                self.unresolve(&importer, observers)?;
            }
        }

        let imported_ids: Vec<String> = self.plugins[id].imported.iter().cloned().collect();
        for dep in &imported_ids {
            if let Some(p) = self.plugins.get_mut(dep) {
                p.importing.remove(id);
            }
        }
        let rp = self.plugins.get_mut(id).unwrap();
        let instance_ptr = rp.instance.map(|p| p as *mut c_void).unwrap_or(std::ptr::null_mut());
        if let Some(r) = &rp.runtime {
            r.destroy(instance_ptr);
        }
        rp.instance = None;
        rp.imported.clear();
        rp.importing.clear();
        rp.runtime = None;
        self.symbols.clear_provider(id);

        let old = self.plugins[id].state;
        self.plugins.get_mut(id).unwrap().state = PluginState::Installed;
        observers.emit_event(id, old, PluginState::Installed);
        Ok(())
    }

    pub fn uninstall(&mut self, id: &str, observers: &ObserverChannels) -> Result<()> {
        if !self.plugins.contains_key(id) {
            return Err(Error::Unknown(id.to_string()));
        }
        self.unresolve(id, observers)?;
        let old = self.plugins[id].state;
        observers.emit_event(id, old, PluginState::Uninstalled);
        self.plugins.remove(id);
        Ok(())
    }

    pub fn uninstall_all(&mut self, observers: &ObserverChannels) -> Result<()> {
        self.stop_all(observers)?;
        loop {
            let Some(next_id) = self.plugins.keys().next().cloned() else {
                break;
            };
            self.uninstall(&next_id, observers)?;
        }
        Ok(())
    }

    pub fn define_symbol(&mut self, provider_id: &str, name: &str, ptr: usize) -> Result<()> {
        match self.plugins.get(provider_id).map(|p| p.state) {
            Some(PluginState::Starting) | Some(PluginState::Active) => {}
            Some(_) => {
                return Err(Error::Runtime(format!(
                    "plug-in '{provider_id}' must be starting or active to define a symbol"
                )))
            }
            None => return Err(Error::Unknown(provider_id.to_string())),
        }
        self.symbols.define(provider_id, name, ptr)
    }

    pub fn resolve_symbol(
        &mut self,
        consumer_id: Option<&str>,
        provider_id: &str,
        name: &str,
        observers: &ObserverChannels,
    ) -> Result<usize> {
        if !self.plugins.contains_key(provider_id) {
            return Err(Error::Unknown(provider_id.to_string()));
        }
        if self.plugins[provider_id].state != PluginState::Active {
            self.start(provider_id, observers)?;
        }
        let ptr = self.symbols.resolve(provider_id, name)?;
        if let Some(consumer) = consumer_id {
            self.resolution_log.record(consumer, provider_id);
        }
        Ok(ptr)
    }

    pub fn release_symbol(&mut self, provider_id: &str, name: &str) {
        self.symbols.release(provider_id, name);
    }
}
