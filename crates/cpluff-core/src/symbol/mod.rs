//! Symbol resolver: runtime-library loading plus `defineSymbol` /
//! `resolveSymbol` / `releaseSymbol`, each with their own per-provider
//! refcount bookkeeping.

pub mod runtime;

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;

/// A symbol published by a plug-in while `starting` or `active`, keyed by
/// name within that plug-in.
#[derive(Default)]
pub struct SymbolTable {
    /// provider plug-in id -> (symbol name -> raw pointer)
    published: HashMap<String, HashMap<String, usize>>,
    /// (provider id, symbol name) -> outstanding refcount
    refcounts: HashMap<(String, String), u32>,
}

// Pointers are stored as `usize` so the table itself stays `Send`; callers
// reinterpret them at the declared ABI type on use.
unsafe impl Send for SymbolTable {}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish `name` -> `ptr` on behalf of `provider_id`. Fails with
    /// `conflict` if that provider already published a symbol of this name.
    pub fn define(&mut self, provider_id: &str, name: &str, ptr: usize) -> Result<()> {
        let table = self.published.entry(provider_id.to_string()).or_default();
        if table.contains_key(name) {
            return Err(Error::Conflict(format!(
                "symbol '{name}' already defined by plug-in '{provider_id}'"
            )));
        }
        table.insert(name.to_string(), ptr);
        Ok(())
    }

    /// Look up `name` published by `provider_id`, incrementing its refcount
    /// on success. `unknown` if no such symbol exists.
    pub fn resolve(&mut self, provider_id: &str, name: &str) -> Result<usize> {
        let ptr = *self
            .published
            .get(provider_id)
            .and_then(|t| t.get(name))
            .ok_or_else(|| Error::Unknown(format!("symbol '{name}' on '{provider_id}'")))?;
        *self
            .refcounts
            .entry((provider_id.to_string(), name.to_string()))
            .or_insert(0) += 1;
        Ok(ptr)
    }

    /// Decrement the refcount for `(provider_id, name)`. Returns `true` once
    /// the count reaches zero, i.e. the provider may now leave the "using"
    /// set for this symbol.
    pub fn release(&mut self, provider_id: &str, name: &str) -> bool {
        let key = (provider_id.to_string(), name.to_string());
        match self.refcounts.get_mut(&key) {
            Some(count) if *count > 0 => {
                *count -= 1;
                if *count == 0 {
                    self.refcounts.remove(&key);
                    true
                } else {
                    false
                }
            }
            _ => true,
        }
    }

    /// Total outstanding refcount across every symbol a provider published;
    /// non-zero means the provider is currently in some consumer's "using"
    /// set and a pending `stop` must wait for it to drain.
    pub fn provider_use_count(&self, provider_id: &str) -> u32 {
        self.refcounts
            .iter()
            .filter(|((pid, _), _)| pid == provider_id)
            .map(|(_, count)| *count)
            .sum()
    }

    pub fn clear_provider(&mut self, provider_id: &str) {
        self.published.remove(provider_id);
        self.refcounts.retain(|(pid, _), _| pid != provider_id);
    }
}

/// Tracks which plug-in resolved a symbol from which other plug-in, so that
/// stopping the provider can force dependent consumers to release first.
#[derive(Default)]
pub struct ResolutionLog {
    /// consumer id -> set of provider ids it currently holds a resolved
    /// symbol from.
    consumers: HashMap<String, std::collections::HashSet<String>>,
}

impl ResolutionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, consumer_id: &str, provider_id: &str) {
        self.consumers
            .entry(consumer_id.to_string())
            .or_default()
            .insert(provider_id.to_string());
    }

    pub fn consumers_of(&self, provider_id: &str) -> Vec<String> {
        self.consumers
            .iter()
            .filter(|(_, providers)| providers.contains(provider_id))
            .map(|(consumer, _)| consumer.clone())
            .collect()
    }

    pub fn clear_consumer(&mut self, consumer_id: &str) {
        self.consumers.remove(consumer_id);
    }
}

pub use runtime::RuntimeHandle;

/// Shared reference to an opened runtime library, kept alive for as long as
/// any registered plug-in references it.
pub type SharedRuntimeHandle = Arc<RuntimeHandle>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn define_resolve_release_cycle() {
        let mut table = SymbolTable::new();
        table.define("p", "sym", 0x1000).unwrap();
        assert_eq!(table.resolve("p", "sym").unwrap(), 0x1000);
        assert_eq!(table.provider_use_count("p"), 1);
        assert!(table.release("p", "sym"));
        assert_eq!(table.provider_use_count("p"), 0);
    }

    #[test]
    fn duplicate_define_conflicts() {
        let mut table = SymbolTable::new();
        table.define("p", "sym", 1).unwrap();
        let err = table.define("p", "sym", 2).unwrap_err();
        assert_eq!(err.status(), crate::error::Status::Conflict);
    }

    #[test]
    fn unknown_symbol_fails() {
        let mut table = SymbolTable::new();
        let err = table.resolve("p", "missing").unwrap_err();
        assert_eq!(err.status(), crate::error::Status::Unknown);
    }

    #[test]
    fn resolution_log_tracks_consumers() {
        let mut log = ResolutionLog::new();
        log.record("consumer", "provider");
        assert_eq!(log.consumers_of("provider"), vec!["consumer".to_string()]);
        log.clear_consumer("consumer");
        assert!(log.consumers_of("provider").is_empty());
    }
}
