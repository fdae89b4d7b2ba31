//! Plug-in sources: opaque collaborators that enumerate candidate
//! descriptors. [`fs`] provides the default filesystem-directory source.

pub mod fs;

use crate::descriptor::Descriptor;

/// A registered collaborator the context asks for candidate descriptors
/// during `scan`. The source's `release` operation from the spec has no
/// Rust counterpart beyond ordinary drop: scanned descriptors are owned
/// values, and a source that wants to reclaim anything it allocated for
/// them does so in its own `Drop` impl.
pub trait PluginSource: Send {
    /// Enumerate candidate descriptors. May be called repeatedly; must not
    /// return descriptors with duplicate identifiers within one call.
    fn scan(&mut self) -> Vec<Descriptor>;
}

/// Flags controlling one `scan` call, per the operation table.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScanFlags {
    /// Install candidates whose identifier isn't currently known.
    pub install: bool,
    /// Replace an installed plug-in with a higher-versioned candidate.
    pub upgrade: bool,
    /// Replace an installed plug-in with a lower-versioned candidate.
    pub downgrade: bool,
    /// Uninstall plug-ins no longer offered by any source.
    pub uninstall: bool,
    /// Force a single context-wide stop before the first install this scan performs.
    pub stop_all_on_install: bool,
    /// Force a single context-wide stop before the first upgrade/downgrade this scan performs.
    pub stop_all_on_upgrade: bool,
    /// Restart, after the scan, every plug-in that was `starting`/`active` beforehand.
    pub restart_active: bool,
}

/// Fold candidates from every registered source into one
/// `identifier -> descriptor` mapping, keeping only the highest version per
/// identifier (ties keep whichever was seen first).
pub fn merge_candidates(
    sources: &mut [Box<dyn PluginSource>],
) -> std::collections::HashMap<String, Descriptor> {
    let mut by_id: std::collections::HashMap<String, Descriptor> = std::collections::HashMap::new();
    for source in sources.iter_mut() {
        for candidate in source.scan() {
            match by_id.get(&candidate.id) {
                Some(existing) if existing.version >= candidate.version => {
                    // first-seen / higher version wins; drop this candidate
                }
                _ => {
                    by_id.insert(candidate.id.clone(), candidate);
                }
            }
        }
    }
    by_id
}
