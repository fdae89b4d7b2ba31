//! Fixture plug-in used by `cpluff-core`'s integration tests to exercise the
//! real `libloading` path end to end instead of mocking the runtime library.
//!
//! Tracks create/start/stop/destroy call counts in a process-wide atomic so
//! a test that dlopens this library can assert on lifecycle callback counts
//! (see the "callback counter" scenario) without needing IPC back to the
//! instance itself.

use cpluff_abi::{declare_runtime, Runtime};
use std::ffi::c_void;
use std::sync::atomic::{AtomicU32, Ordering};

pub static CREATE_COUNT: AtomicU32 = AtomicU32::new(0);
pub static START_COUNT: AtomicU32 = AtomicU32::new(0);
pub static STOP_COUNT: AtomicU32 = AtomicU32::new(0);
pub static DESTROY_COUNT: AtomicU32 = AtomicU32::new(0);

pub struct CounterPlugin;

impl Runtime for CounterPlugin {
    fn create(_ctx: *mut c_void) -> Self {
        CREATE_COUNT.fetch_add(1, Ordering::SeqCst);
        CounterPlugin
    }

    fn start(&mut self) -> bool {
        START_COUNT.fetch_add(1, Ordering::SeqCst);
        true
    }

    fn stop(&mut self) {
        STOP_COUNT.fetch_add(1, Ordering::SeqCst);
    }
}

impl Drop for CounterPlugin {
    fn drop(&mut self) {
        DESTROY_COUNT.fetch_add(1, Ordering::SeqCst);
    }
}

declare_runtime!(CounterPlugin);

/// Exported so integration tests in another process (or the same process,
/// via a fresh dlopen) can read the counters through a plain symbol lookup
/// rather than linking this crate as an rlib.
#[no_mangle]
pub extern "C" fn sample_plugin_counters() -> [u32; 4] {
    [
        CREATE_COUNT.load(Ordering::SeqCst),
        START_COUNT.load(Ordering::SeqCst),
        STOP_COUNT.load(Ordering::SeqCst),
        DESTROY_COUNT.load(Ordering::SeqCst),
    ]
}
