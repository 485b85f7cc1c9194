//! Library entry points and helper macros
//!
//! A module library exports four symbols, generated by [`declare_module!`]:
//!
//! - `ModuleDate() -> *const c_char`: build date, `"Mmm dd yyyy"`
//! - `ModuleBridgeAbi() -> *const c_char`: [`abi_tag`] of the bridge the
//!   library was built against
//! - `InitModule(host, instance) -> bool`: registers the library's modules
//! - `ExitModule(instance)`: called before the library is unloaded
//!
//! `InitModule` receives the loader's [`Host`] by pointer, so a loader must
//! refuse libraries whose ABI tag differs from its own.

use std::os::raw::c_char;
use std::panic::{self, AssertUnwindSafe};

use crate::bridge::OpaqueContext;
use crate::callbacks::CallbackTable;
use crate::host::catalog::{truncate_on_char_boundary, DEBUG_STRING_CAPACITY};
use crate::host::{Host, HostApi, ModuleHandle};
use crate::module::ModuleCallbacks;
use crate::types::{InstanceHandle, Result};

const BUILD_DATE: &str = concat!(env!("ORBITER_BRIDGE_BUILD_DATE"), "\0");

const ABI_TAG: &str = concat!(
    env!("CARGO_PKG_NAME"),
    " ",
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("ORBITER_BRIDGE_RUSTC"),
    ")\0"
);

fn without_nul(text: &'static str) -> &'static str {
    text.trim_end_matches('\0')
}

/// Date this crate was built
pub fn build_date() -> &'static str {
    without_nul(BUILD_DATE)
}

/// Crate version and compiler version; libraries and loaders must agree on it
pub fn abi_tag() -> &'static str {
    without_nul(ABI_TAG)
}

#[doc(hidden)]
pub fn build_date_ptr() -> *const c_char {
    BUILD_DATE.as_ptr().cast()
}

#[doc(hidden)]
pub fn abi_tag_ptr() -> *const c_char {
    ABI_TAG.as_ptr().cast()
}

/// What `InitModule` hands to a library's init function
pub struct ModuleRegistrar<'a> {
    host: &'a mut Host,
    instance: InstanceHandle,
}

impl<'a> ModuleRegistrar<'a> {
    pub fn new(host: &'a mut Host, instance: InstanceHandle) -> Self {
        Self { host, instance }
    }

    /// Instance handle of the library being initialised
    pub fn instance(&self) -> InstanceHandle {
        self.instance
    }

    pub fn api(&self) -> &dyn HostApi {
        self.host.api()
    }

    pub fn register_module<M: ModuleCallbacks + 'static>(&mut self, callbacks: M) -> Result<ModuleHandle> {
        self.host.register_module(self.instance, callbacks)
    }

    /// Register a raw callback table
    ///
    /// # Safety
    /// See [`OpaqueContext::from_raw`].
    pub unsafe fn register_callbacks(
        &mut self,
        callbacks: CallbackTable,
        context: *mut std::os::raw::c_void,
    ) -> Result<ModuleHandle> {
        self.host
            .register_callbacks(callbacks, OpaqueContext::from_raw(context), self.instance)
    }
}

#[doc(hidden)]
pub fn run_init(
    host: &mut Host,
    instance: InstanceHandle,
    init: impl FnOnce(&mut ModuleRegistrar<'_>) -> Result<()>,
) -> bool {
    let mut registrar = ModuleRegistrar::new(host, instance);
    match panic::catch_unwind(AssertUnwindSafe(|| init(&mut registrar))) {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            log::error!("Module initialisation failed: {}", e);
            false
        }
        Err(_) => {
            log::error!("Module initialisation panicked");
            false
        }
    }
}

#[doc(hidden)]
pub fn init_without_host() -> bool {
    log::error!("InitModule called without a host");
    false
}

#[doc(hidden)]
pub fn run_exit(instance: InstanceHandle, exit: impl FnOnce(InstanceHandle)) {
    if panic::catch_unwind(AssertUnwindSafe(|| exit(instance))).is_err() {
        log::error!("Module exit panicked");
    }
}

#[doc(hidden)]
pub fn debug_string(api: &dyn HostApi, text: &str) {
    api.debug_string(truncate_on_char_boundary(text, DEBUG_STRING_CAPACITY));
}

/// Export the entry points of a module library
///
/// The init block gets a [`ModuleRegistrar`] and must evaluate to
/// `orbiter_bridge::Result<()>`; the exit block gets the library's
/// [`InstanceHandle`]. Invoke once at the crate root of a `cdylib`.
///
/// ```ignore
/// use orbiter_bridge::{declare_module, ModuleCallbacks};
///
/// struct Hello;
/// impl ModuleCallbacks for Hello {}
///
/// declare_module!(
///     fn init(registrar) {
///         registrar.register_module(Hello)?;
///         Ok(())
///     }
///
///     fn exit(_instance) {}
/// );
/// ```
#[macro_export]
macro_rules! declare_module {
    (
        fn init($registrar:ident) $init:block
        fn exit($instance:ident) $exit:block
    ) => {
        #[no_mangle]
        #[allow(non_snake_case)]
        pub extern "C" fn ModuleDate() -> *const ::std::os::raw::c_char {
            $crate::macros::build_date_ptr()
        }

        #[no_mangle]
        #[allow(non_snake_case)]
        pub extern "C" fn ModuleBridgeAbi() -> *const ::std::os::raw::c_char {
            $crate::macros::abi_tag_ptr()
        }

        /// # Safety
        /// `host` must be null or point to the loader's live host.
        #[no_mangle]
        #[allow(non_snake_case)]
        pub unsafe extern "C" fn InitModule(
            host: *mut $crate::Host,
            instance: $crate::InstanceHandle,
        ) -> bool {
            #[allow(unused_unsafe)]
            let host = unsafe { host.as_mut() };
            match host {
                Some(host) => $crate::macros::run_init(
                    host,
                    instance,
                    |$registrar: &mut $crate::ModuleRegistrar<'_>| -> $crate::Result<()> { $init },
                ),
                None => $crate::macros::init_without_host(),
            }
        }

        #[no_mangle]
        #[allow(non_snake_case)]
        pub extern "C" fn ExitModule(instance: $crate::InstanceHandle) {
            $crate::macros::run_exit(instance, |$instance: $crate::InstanceHandle| $exit)
        }
    };
}

/// Show a formatted line in the viewport, truncated to 255 bytes
///
/// ```ignore
/// debug_string!(module.api(), "Altitude: {:.1} km", altitude / 1000.0);
/// ```
#[macro_export]
macro_rules! debug_string {
    ($api:expr, $($args:tt)+) => {
        $crate::macros::debug_string($api, &::std::format!($($args)+))
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HostConfig;
    use crate::host::ObjectCatalog;
    use std::ffi::CStr;
    use std::rc::Rc;

    struct Idle;
    impl ModuleCallbacks for Idle {}

    #[test]
    fn test_exported_strings_are_nul_terminated() {
        let date = unsafe { CStr::from_ptr(build_date_ptr()) };
        assert_eq!(date.to_str().unwrap(), build_date());
        assert_eq!(build_date().split_whitespace().count(), 3);

        let tag = unsafe { CStr::from_ptr(abi_tag_ptr()) };
        assert_eq!(tag.to_str().unwrap(), abi_tag());
        assert!(abi_tag().starts_with(concat!("orbiter-bridge ", env!("CARGO_PKG_VERSION"))));
    }

    #[test]
    fn test_run_init_registers_and_reports_failure() {
        let mut host = Host::simulated(HostConfig::default());
        let instance = InstanceHandle::from_raw(0x10000);

        let ok = run_init(&mut host, instance, |registrar| {
            assert_eq!(registrar.instance(), instance);
            registrar.register_module(Idle)?;
            Ok(())
        });
        assert!(ok);
        assert_eq!(host.module_count(), 1);

        let failed = run_init(&mut host, instance, |_| {
            Err(crate::BridgeError::NullArgument("test"))
        });
        assert!(!failed);

        let panicked = run_init(&mut host, instance, |_| panic!("init exploded"));
        assert!(!panicked);
        assert!(!init_without_host());
        assert_eq!(host.module_count(), 1);
    }

    #[test]
    fn test_debug_string_macro_truncates() {
        let catalog = Rc::new(ObjectCatalog::new(160828));
        let api: &dyn HostApi = &*catalog;
        debug_string!(api, "{}-{}", "a".repeat(300), 1);
        assert_eq!(catalog.debug_line().len(), DEBUG_STRING_CAPACITY);

        debug_string!(api, "MJD {:.2}", 51544.5);
        assert_eq!(catalog.debug_line(), "MJD 51544.50");
    }
}
