//! Opens a plug-in's declared runtime library via `libloading` and resolves
//! its runtime-funcs symbol to the four create/start/stop/destroy entry
//! points defined by `cpluff-abi`.

use crate::error::{Error, Result};
use cpluff_abi::RuntimeFuncs;
use libloading::Library;
use std::ffi::c_void;
use std::path::Path;

/// Turn a descriptor's platform-independent "runtime library base name"
/// into the filename `libloading` should open on the current platform.
pub fn platform_library_filename(base_name: &str) -> String {
    #[cfg(target_os = "windows")]
    {
        format!("{base_name}.dll")
    }
    #[cfg(target_os = "macos")]
    {
        format!("lib{base_name}.dylib")
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        format!("lib{base_name}.so")
    }
}

/// An opened runtime library plus its resolved runtime-funcs pointer. Kept
/// alive in the registered plug-in for as long as the plug-in is resolved
/// or beyond; dropping it unloads the library.
pub struct RuntimeHandle {
    _library: Library,
    funcs: *const RuntimeFuncs,
}

// SAFETY: the only interior-mutable state is the C ABI functions themselves,
// which are plain function pointers; the plug-in author is responsible for
// `RuntimeFuncs`' `Sync` contract, asserted by `cpluff-abi`.
unsafe impl Send for RuntimeHandle {}
unsafe impl Sync for RuntimeHandle {}

impl RuntimeHandle {
    /// Open `library_path` and resolve `funcs_symbol` as a `RuntimeFuncs`
    /// pointer.
    pub fn open(library_path: &Path, funcs_symbol: &str) -> Result<Self> {
        let library = unsafe { Library::new(library_path) }.map_err(|e| {
            Error::Runtime(format!(
                "failed to open runtime library {}: {e}",
                library_path.display()
            ))
        })?;

        let funcs: *const RuntimeFuncs = unsafe {
            let symbol: libloading::Symbol<'_, *const RuntimeFuncs> = library
                .get(funcs_symbol.as_bytes())
                .map_err(|e| Error::Runtime(format!("failed to resolve symbol '{funcs_symbol}': {e}")))?;
            *symbol
        };

        Ok(RuntimeHandle {
            _library: library,
            funcs,
        })
    }

    pub fn create(&self, ctx: *mut c_void) -> *mut c_void {
        match unsafe { &*self.funcs }.create {
            Some(f) => f(ctx),
            None => std::ptr::null_mut(),
        }
    }

    /// Returns `true` on success (or if `start` is absent, which counts as
    /// an implicit success).
    pub fn start(&self, instance: *mut c_void) -> bool {
        match unsafe { &*self.funcs }.start {
            Some(f) => f(instance) != 0,
            None => true,
        }
    }

    pub fn stop(&self, instance: *mut c_void) {
        if let Some(f) = unsafe { &*self.funcs }.stop {
            f(instance);
        }
    }

    pub fn destroy(&self, instance: *mut c_void) {
        if let Some(f) = unsafe { &*self.funcs }.destroy {
            f(instance);
        }
    }

    /// Resolve an arbitrary exported symbol from the same library, for the
    /// `defineSymbol`/`resolveSymbol` surface exposed to other plug-ins.
    pub fn resolve_exported_symbol(&self, name: &str) -> Result<usize> {
        unsafe {
            let symbol: libloading::Symbol<'_, *const ()> = self
                ._library
                .get(name.as_bytes())
                .map_err(|e| Error::Unknown(format!("symbol '{name}': {e}")))?;
            Ok(*symbol as usize)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_filename_has_expected_shape() {
        let name = platform_library_filename("sample_plugin");
        assert!(name.contains("sample_plugin"));
    }
}
