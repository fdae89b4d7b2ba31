//! A plug-in framework: descriptor parsing, dependency resolution, a
//! start/stop lifecycle state machine, and dynamic-library-backed symbol
//! exchange between plug-ins, all serialized behind one recursive context
//! lock.
//!
//! A host typically:
//! 1. creates a [`context::Context`] with [`context::Context::new`],
//! 2. registers one or more [`source::PluginSource`]s (or installs
//!    descriptors directly via [`context::Context::install`]),
//! 3. calls [`context::Context::scan`] to discover and install candidates,
//! 4. starts plug-ins by id with [`context::Context::start`], and
//! 5. listens for state transitions via [`context::Context::add_event_listener`].

pub mod config;
pub mod context;
pub mod descriptor;
pub mod error;
pub mod lifecycle;
pub mod lock;
pub mod observer;
pub mod source;
pub mod symbol;
pub mod version;

pub mod prelude {
    pub use crate::config::ContextConfig;
    pub use crate::context::Context;
    pub use crate::descriptor::Descriptor;
    pub use crate::error::{Error, Result, Status};
    pub use crate::lifecycle::PluginState;
    pub use crate::observer::{EventListener, Logger, Severity};
    pub use crate::source::{PluginSource, ScanFlags};
    pub use crate::version::{MatchRule, Version};
}
