//! ABI surface for plug-ins loaded by a C-Pluff-style runtime.
//!
//! A plug-in crate built against this SDK is compiled as a `cdylib` and
//! exports a single symbol — named whatever its descriptor's `funcs`
//! attribute declares — pointing at a [`RuntimeFuncs`] value. The host
//! resolves that symbol after opening the plug-in's runtime library and
//! calls through it for the plug-in's whole lifetime; it never calls
//! into the plug-in crate any other way.
//!
//! ```rust,ignore
//! use cpluff_abi::{Runtime, declare_runtime};
//!
//! struct Counter { n: u32 }
//!
//! impl Runtime for Counter {
//!     fn create(_ctx: *mut std::ffi::c_void) -> Self { Counter { n: 0 } }
//!     fn start(&mut self) -> bool { self.n += 1; true }
//! }
//!
//! declare_runtime!(Counter);
//! ```

mod runtime;

pub use runtime::{Runtime, RuntimeFuncs};

/// ABI version this crate's [`RuntimeFuncs`] layout corresponds to.
///
/// A host that changes the layout of `RuntimeFuncs` bumps this constant;
/// plug-ins built against a mismatched version are rejected at resolve
/// time rather than crashing on a misinterpreted function pointer.
pub const ABI_VERSION: u32 = 1;
