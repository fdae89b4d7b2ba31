use std::ffi::c_void;
use std::os::raw::c_int;

/// The four lifecycle entry points a plug-in's runtime-funcs symbol points to.
///
/// Any entry may be `None`; per the ABI contract, an absent `create`/`start`
/// means an implicit success with a null instance, and an absent
/// `stop`/`destroy` means no-op.
#[repr(C)]
pub struct RuntimeFuncs {
    pub create: Option<extern "C" fn(ctx: *mut c_void) -> *mut c_void>,
    pub start: Option<extern "C" fn(instance: *mut c_void) -> c_int>,
    pub stop: Option<extern "C" fn(instance: *mut c_void)>,
    pub destroy: Option<extern "C" fn(instance: *mut c_void)>,
}

// Safe: the struct only holds plain function pointers, not aliased data.
unsafe impl Sync for RuntimeFuncs {}

/// Implemented by a plug-in's instance type; [`declare_runtime!`] wires this
/// up to the `extern "C"` trampolines a host can call through [`RuntimeFuncs`].
pub trait Runtime: Sized + Send {
    /// Build the instance. `ctx` is the opaque host context pointer passed
    /// through from the framework; plug-ins that don't need it can ignore it.
    fn create(ctx: *mut c_void) -> Self;

    /// Returns `true` on success. The default no-op implementation always
    /// succeeds, matching an absent `start` entry.
    fn start(&mut self) -> bool {
        true
    }

    /// Called before the instance is dropped. Default is no-op.
    fn stop(&mut self) {}
}

/// Exports `$ty`'s [`Runtime`] implementation as a `RuntimeFuncs` static
/// named `$name`, plus the `extern "C"` trampolines it points to.
///
/// The single-argument form exports under the conventional name
/// `cpluff_runtime_funcs`; use the two-argument form when a descriptor's
/// `funcs` attribute names something else.
#[macro_export]
macro_rules! declare_runtime {
    ($ty:ty) => {
        $crate::declare_runtime!(cpluff_runtime_funcs, $ty);
    };
    ($name:ident, $ty:ty) => {
        #[no_mangle]
        pub static $name: $crate::RuntimeFuncs = $crate::RuntimeFuncs {
            create: Some(__cpluff_abi_create),
            start: Some(__cpluff_abi_start),
            stop: Some(__cpluff_abi_stop),
            destroy: Some(__cpluff_abi_destroy),
        };

        extern "C" fn __cpluff_abi_create(
            ctx: *mut ::std::ffi::c_void,
        ) -> *mut ::std::ffi::c_void {
            let instance = <$ty as $crate::Runtime>::create(ctx);
            Box::into_raw(Box::new(instance)) as *mut ::std::ffi::c_void
        }

        extern "C" fn __cpluff_abi_start(
            instance: *mut ::std::ffi::c_void,
        ) -> ::std::os::raw::c_int {
            if instance.is_null() {
                return 1;
            }
            let inst = unsafe { &mut *(instance as *mut $ty) };
            if <$ty as $crate::Runtime>::start(inst) {
                1
            } else {
                0
            }
        }

        extern "C" fn __cpluff_abi_stop(instance: *mut ::std::ffi::c_void) {
            if instance.is_null() {
                return;
            }
            let inst = unsafe { &mut *(instance as *mut $ty) };
            <$ty as $crate::Runtime>::stop(inst);
        }

        extern "C" fn __cpluff_abi_destroy(instance: *mut ::std::ffi::c_void) {
            if instance.is_null() {
                return;
            }
            unsafe {
                drop(Box::from_raw(instance as *mut $ty));
            }
        }
    };
}
