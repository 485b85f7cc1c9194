//! C ABI of the bridge
//!
//! Every function takes the host it operates on explicitly. Pointers may be
//! null: fallible functions then return [`BridgeStatus::NullArgument`],
//! getters return zero, the null handle or `false`. The message of the last
//! failure on the calling thread is available from
//! [`obr_last_error_message`].
//!
//! Functions taking a `*mut Host` or `*const Host` must not be called from
//! inside a callback that the same host is currently dispatching. Callbacks
//! query the session through their module handle instead: every object and
//! vessel query has an `obr_module_*` twin for that.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int, c_void};
use std::ptr;

use crate::bridge::OpaqueContext;
use crate::callbacks::{CallbackTable, RawCallbackTable};
use crate::config::HostConfig;
use crate::host::{Host, HostApi, ModuleHandle};
use crate::input::KeyStateBuffer;
use crate::types::{BridgeError, InstanceHandle, ObjHandle, RenderMode, Vector3};

/// Result code of fallible exports
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeStatus {
    Ok = 0,
    NullArgument = 1,
    IncompleteCallbackTable = 2,
    UnknownRenderMode = 3,
    ModuleNotFound = 4,
    DuplicateModule = 5,
    ForeignModule = 6,
    InvalidName = 7,
    ObjectNotFound = 8,
    Failed = 9,
}

impl From<&BridgeError> for BridgeStatus {
    fn from(error: &BridgeError) -> Self {
        match error {
            BridgeError::IncompleteCallbackTable { .. } => BridgeStatus::IncompleteCallbackTable,
            BridgeError::NullArgument(_) => BridgeStatus::NullArgument,
            BridgeError::UnknownRenderMode(_) => BridgeStatus::UnknownRenderMode,
            BridgeError::ObjectNotFound(_) => BridgeStatus::ObjectNotFound,
            BridgeError::InvalidName(_) => BridgeStatus::InvalidName,
            BridgeError::ModuleNotFound(_) => BridgeStatus::ModuleNotFound,
            BridgeError::DuplicateModule(_) => BridgeStatus::DuplicateModule,
            BridgeError::ForeignModule(_) => BridgeStatus::ForeignModule,
            BridgeError::UnsupportedObjectType { .. } | BridgeError::IoError(_) => {
                BridgeStatus::Failed
            }
        }
    }
}

thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn fail(error: BridgeError) -> BridgeStatus {
    log::debug!("FFI call failed: {}", error);
    let status = BridgeStatus::from(&error);
    // Display output of our errors never contains NUL
    let message = CString::new(error.to_string()).ok();
    LAST_ERROR.with(|last| *last.borrow_mut() = message);
    status
}

fn report(result: crate::Result<()>) -> BridgeStatus {
    match result {
        Ok(()) => BridgeStatus::Ok,
        Err(e) => fail(e),
    }
}

unsafe fn host_mut<'a>(host: *mut Host) -> crate::Result<&'a mut Host> {
    host.as_mut().ok_or(BridgeError::NullArgument("host"))
}

/// Message of the last failed call on this thread, or null
///
/// The pointer stays valid until the next failing call on this thread.
#[no_mangle]
pub extern "C" fn obr_last_error_message() -> *const c_char {
    LAST_ERROR.with(|last| {
        last.borrow()
            .as_ref()
            .map_or(ptr::null(), |message| message.as_ptr())
    })
}

#[no_mangle]
pub extern "C" fn obr_clear_last_error() {
    LAST_ERROR.with(|last| *last.borrow_mut() = None);
}

/// Create a host with an empty object catalog
#[no_mangle]
pub extern "C" fn obr_host_new(orbiter_version: u32, module_version: u32, start_mjd: f64) -> *mut Host {
    let config = HostConfig::new()
        .with_orbiter_version(orbiter_version)
        .with_module_version(module_version)
        .with_start_mjd(start_mjd);
    Box::into_raw(Box::new(Host::simulated(config)))
}

/// Destroy a host and every module still registered with it
///
/// # Safety
/// `host` must be null or come from [`obr_host_new`] and not be used again.
#[no_mangle]
pub unsafe extern "C" fn obr_host_free(host: *mut Host) {
    if !host.is_null() {
        drop(Box::from_raw(host));
    }
}

/// Register a callback table with its opaque context
///
/// On success the host owns the module and the returned handle must be freed
/// with [`obr_module_handle_free`]. Store the handle in the context to query
/// the session from callbacks through the `obr_module_*` functions.
///
/// On failure null is returned and `status` (if non-null) is set. Every
/// failure is detected before a bridge exists, so the context is untouched
/// and `destroy` is not called.
///
/// # Safety
/// `host` and `table` must be null or valid. `ctx` must stay valid for every
/// callback of the table until `destroy` has been called.
#[no_mangle]
pub unsafe extern "C" fn obr_module_new(
    host: *mut Host,
    table: *const RawCallbackTable,
    ctx: *mut c_void,
    instance: InstanceHandle,
    status: *mut BridgeStatus,
) -> *mut ModuleHandle {
    let result = (|| -> crate::Result<ModuleHandle> {
        let host = host_mut(host)?;
        let raw = table.as_ref().ok_or(BridgeError::NullArgument("table"))?;
        let callbacks = CallbackTable::try_from(*raw)?;
        host.register_callbacks(callbacks, OpaqueContext::from_raw(ctx), instance)
    })();

    let (code, handle) = match result {
        Ok(handle) => (BridgeStatus::Ok, Box::into_raw(Box::new(handle))),
        Err(e) => (fail(e), ptr::null_mut()),
    };
    if let Some(status) = status.as_mut() {
        *status = code;
    }
    handle
}

/// Destroy one module now; its handle stays valid for queries
///
/// # Safety
/// `host` and `handle` must be null or valid.
#[no_mangle]
pub unsafe extern "C" fn obr_module_release(
    host: *mut Host,
    handle: *const ModuleHandle,
) -> BridgeStatus {
    report((|| -> crate::Result<()> {
        let host = host_mut(host)?;
        let handle = handle.as_ref().ok_or(BridgeError::NullArgument("handle"))?;
        host.release(handle.id())
    })())
}

/// # Safety
/// `handle` must be null or come from [`obr_module_new`] and not be used again.
#[no_mangle]
pub unsafe extern "C" fn obr_module_handle_free(handle: *mut ModuleHandle) {
    if !handle.is_null() {
        drop(Box::from_raw(handle));
    }
}

/// # Safety
/// `handle` must be null or valid.
#[no_mangle]
pub unsafe extern "C" fn obr_module_version(handle: *const ModuleHandle) -> c_int {
    handle.as_ref().map_or(0, |h| h.version() as c_int)
}

/// # Safety
/// `handle` must be null or valid.
#[no_mangle]
pub unsafe extern "C" fn obr_module_get_module(handle: *const ModuleHandle) -> InstanceHandle {
    handle.as_ref().map_or(InstanceHandle::NULL, |h| h.module())
}

/// # Safety
/// `handle` must be null or valid.
#[no_mangle]
pub unsafe extern "C" fn obr_module_get_sim_time(handle: *const ModuleHandle) -> f64 {
    handle.as_ref().map_or(0.0, |h| h.sim_time())
}

/// # Safety
/// `handle` must be null or valid.
#[no_mangle]
pub unsafe extern "C" fn obr_module_get_sim_step(handle: *const ModuleHandle) -> f64 {
    handle.as_ref().map_or(0.0, |h| h.sim_step())
}

/// # Safety
/// `handle` must be null or valid.
#[no_mangle]
pub unsafe extern "C" fn obr_module_get_sim_mjd(handle: *const ModuleHandle) -> f64 {
    handle.as_ref().map_or(0.0, |h| h.sim_mjd())
}

// Host-side event entry points.
//
// Safety for all of them: `host` must be null or valid.

/// Dispatch simulation start with a raw render-mode code
///
/// Codes other than 0 (none), 1 (fullscreen) and 2 (window) are rejected with
/// [`BridgeStatus::UnknownRenderMode`] and no module is called.
///
/// # Safety
/// See the event entry point notes above.
#[no_mangle]
pub unsafe extern "C" fn obr_host_simulation_start(host: *mut Host, render_mode: c_int) -> BridgeStatus {
    report((|| -> crate::Result<()> {
        let host = host_mut(host)?;
        host.simulation_start(RenderMode::try_from(render_mode)?);
        Ok(())
    })())
}

/// # Safety
/// See the event entry point notes above.
#[no_mangle]
pub unsafe extern "C" fn obr_host_simulation_end(host: *mut Host) -> BridgeStatus {
    report(host_mut(host).map(|host| host.simulation_end()))
}

/// # Safety
/// See the event entry point notes above.
#[no_mangle]
pub unsafe extern "C" fn obr_host_pre_step(host: *mut Host, simt: f64, simdt: f64, mjd: f64) -> BridgeStatus {
    report(host_mut(host).map(|host| host.pre_step(simt, simdt, mjd)))
}

/// # Safety
/// See the event entry point notes above.
#[no_mangle]
pub unsafe extern "C" fn obr_host_post_step(host: *mut Host, simt: f64, simdt: f64, mjd: f64) -> BridgeStatus {
    report(host_mut(host).map(|host| host.post_step(simt, simdt, mjd)))
}

/// # Safety
/// See the event entry point notes above.
#[no_mangle]
pub unsafe extern "C" fn obr_host_time_jump(host: *mut Host, simt: f64, simdt: f64, mjd: f64) -> BridgeStatus {
    report(host_mut(host).map(|host| host.time_jump(simt, simdt, mjd)))
}

/// # Safety
/// See the event entry point notes above.
#[no_mangle]
pub unsafe extern "C" fn obr_host_focus_changed(
    host: *mut Host,
    new_focus: ObjHandle,
    old_focus: ObjHandle,
) -> BridgeStatus {
    report(host_mut(host).map(|host| host.focus_changed(new_focus, old_focus)))
}

/// # Safety
/// See the event entry point notes above.
#[no_mangle]
pub unsafe extern "C" fn obr_host_time_acc_changed(
    host: *mut Host,
    new_warp: f64,
    old_warp: f64,
) -> BridgeStatus {
    report(host_mut(host).map(|host| host.time_acc_changed(new_warp, old_warp)))
}

/// # Safety
/// See the event entry point notes above.
#[no_mangle]
pub unsafe extern "C" fn obr_host_new_vessel(host: *mut Host, vessel: ObjHandle) -> BridgeStatus {
    report(host_mut(host).map(|host| host.new_vessel(vessel)))
}

/// # Safety
/// See the event entry point notes above.
#[no_mangle]
pub unsafe extern "C" fn obr_host_delete_vessel(host: *mut Host, vessel: ObjHandle) -> BridgeStatus {
    report(host_mut(host).map(|host| host.delete_vessel(vessel)))
}

/// # Safety
/// See the event entry point notes above.
#[no_mangle]
pub unsafe extern "C" fn obr_host_vessel_jump(host: *mut Host, vessel: ObjHandle) -> BridgeStatus {
    report(host_mut(host).map(|host| host.vessel_jump(vessel)))
}

/// # Safety
/// See the event entry point notes above.
#[no_mangle]
pub unsafe extern "C" fn obr_host_pause(host: *mut Host, paused: bool) -> BridgeStatus {
    report(host_mut(host).map(|host| host.pause(paused)))
}

/// Returns `true` if a module consumed the event
///
/// # Safety
/// See the event entry point notes above.
#[no_mangle]
pub unsafe extern "C" fn obr_host_process_mouse(
    host: *mut Host,
    event: u32,
    state: u32,
    x: u32,
    y: u32,
) -> bool {
    host.as_mut()
        .is_some_and(|host| host.process_mouse(event, state, x, y))
}

/// Returns `true` if a module consumed the keyboard state
///
/// # Safety
/// `host` must be null or valid; `kstate` must be null or point to 256
/// writable bytes.
#[no_mangle]
pub unsafe extern "C" fn obr_host_process_keyboard_immediate(
    host: *mut Host,
    kstate: *mut c_char,
    sim_running: bool,
) -> bool {
    match (host.as_mut(), (kstate as *mut KeyStateBuffer).as_mut()) {
        (Some(host), Some(keys)) => host.process_keyboard_immediate(keys, sim_running),
        _ => false,
    }
}

/// Returns `true` if a module consumed the key
///
/// # Safety
/// As for [`obr_host_process_keyboard_immediate`].
#[no_mangle]
pub unsafe extern "C" fn obr_host_process_keyboard_buffered(
    host: *mut Host,
    key: u32,
    kstate: *mut c_char,
    sim_running: bool,
) -> bool {
    match (host.as_mut(), (kstate as *mut KeyStateBuffer).as_mut()) {
        (Some(host), Some(keys)) => host.process_keyboard_buffered(key, keys, sim_running),
        _ => false,
    }
}

// Object and vessel queries.
//
// Each query is exported twice. `obr_<query>` takes the host and must not be
// called while that host is dispatching. `obr_module_<query>` takes the
// handle returned by `obr_module_new` and may be called from any callback of
// that module, including `destroy`.
//
// Safety for all of them: `host` and `module` must be null or valid, string
// arguments must be null or NUL-terminated, output pointers must be null or
// writable.

type Api<'a> = crate::Result<&'a dyn HostApi>;

unsafe fn host_api<'a>(host: *const Host) -> Api<'a> {
    host.as_ref()
        .map(|host| host.api())
        .ok_or(BridgeError::NullArgument("host"))
}

unsafe fn module_api<'a>(module: *const ModuleHandle) -> Api<'a> {
    module
        .as_ref()
        .map(|module| module.api())
        .ok_or(BridgeError::NullArgument("module"))
}

mod query {
    use super::*;

    pub(super) unsafe fn orbiter_version(api: Api<'_>) -> u32 {
        api.map_or(0, |api| api.orbiter_version())
    }

    pub(super) unsafe fn object_by_name(api: Api<'_>, name: *const c_char) -> ObjHandle {
        let (Ok(api), false) = (api, name.is_null()) else {
            return ObjHandle::NULL;
        };
        match CStr::from_ptr(name).to_str() {
            Ok(name) => api.object_by_name(name),
            Err(_) => ObjHandle::NULL,
        }
    }

    pub(super) unsafe fn object_by_index(api: Api<'_>, index: usize) -> ObjHandle {
        api.map_or(ObjHandle::NULL, |api| api.object_by_index(index))
    }

    pub(super) unsafe fn object_count(api: Api<'_>) -> usize {
        api.map_or(0, |api| api.object_count())
    }

    pub(super) unsafe fn object_type(api: Api<'_>, handle: ObjHandle) -> c_int {
        api.map_or(0, |api| api.object_type(handle))
    }

    pub(super) unsafe fn object_name(api: Api<'_>, handle: ObjHandle, buf: *mut c_char, len: usize) -> usize {
        let Some(name) = api.ok().and_then(|api| api.object_name(handle)) else {
            return 0;
        };
        if !buf.is_null() && len > 0 {
            let copied = name.len().min(len - 1);
            ptr::copy_nonoverlapping(name.as_ptr() as *const c_char, buf, copied);
            *buf.add(copied) = 0;
        }
        name.len()
    }

    pub(super) unsafe fn object_size(api: Api<'_>, handle: ObjHandle) -> f64 {
        api.map_or(0.0, |api| api.size(handle))
    }

    pub(super) unsafe fn object_mass(api: Api<'_>, handle: ObjHandle) -> f64 {
        api.map_or(0.0, |api| api.mass(handle))
    }

    unsafe fn write_vector(
        api: Api<'_>,
        out: *mut Vector3,
        query: impl FnOnce(&dyn HostApi) -> Vector3,
    ) -> BridgeStatus {
        let out = out.as_mut().ok_or(BridgeError::NullArgument("out"));
        report(api.and_then(|api| {
            *out? = query(api);
            Ok(())
        }))
    }

    pub(super) unsafe fn object_global_pos(api: Api<'_>, handle: ObjHandle, out: *mut Vector3) -> BridgeStatus {
        write_vector(api, out, |api| api.global_pos(handle))
    }

    pub(super) unsafe fn object_global_vel(api: Api<'_>, handle: ObjHandle, out: *mut Vector3) -> BridgeStatus {
        write_vector(api, out, |api| api.global_vel(handle))
    }

    pub(super) unsafe fn object_relative_pos(
        api: Api<'_>,
        handle: ObjHandle,
        reference: ObjHandle,
        out: *mut Vector3,
    ) -> BridgeStatus {
        write_vector(api, out, |api| api.relative_pos(handle, reference))
    }

    pub(super) unsafe fn object_relative_vel(
        api: Api<'_>,
        handle: ObjHandle,
        reference: ObjHandle,
        out: *mut Vector3,
    ) -> BridgeStatus {
        write_vector(api, out, |api| api.relative_vel(handle, reference))
    }

    pub(super) unsafe fn vessel_interface(api: Api<'_>, handle: ObjHandle) -> ObjHandle {
        api.map_or(ObjHandle::NULL, |api| api.vessel_interface(handle))
    }

    pub(super) unsafe fn focus_object(api: Api<'_>) -> ObjHandle {
        api.map_or(ObjHandle::NULL, |api| api.focus_object())
    }

    pub(super) unsafe fn set_focus_object(api: Api<'_>, vessel: ObjHandle) -> ObjHandle {
        api.map_or(ObjHandle::NULL, |api| api.set_focus_object(vessel))
    }

    pub(super) unsafe fn vessel_empty_mass(api: Api<'_>, vessel: ObjHandle) -> f64 {
        api.map_or(0.0, |api| api.empty_mass(vessel))
    }

    pub(super) unsafe fn vessel_set_empty_mass(api: Api<'_>, vessel: ObjHandle, mass: f64) -> BridgeStatus {
        report(api.map(|api| api.set_empty_mass(vessel, mass)))
    }

    pub(super) unsafe fn vessel_fuel_mass(api: Api<'_>, vessel: ObjHandle) -> f64 {
        api.map_or(0.0, |api| api.fuel_mass(vessel))
    }

    pub(super) unsafe fn vessel_max_fuel_mass(api: Api<'_>, vessel: ObjHandle) -> f64 {
        api.map_or(0.0, |api| api.max_fuel_mass(vessel))
    }

    pub(super) unsafe fn debug_string(api: Api<'_>, text: *const c_char) -> BridgeStatus {
        let result = api.and_then(|api| {
            let text = text.as_ref().ok_or(BridgeError::NullArgument("text"))?;
            api.debug_string(&CStr::from_ptr(text).to_string_lossy());
            Ok(())
        });
        report(result)
    }
}

/// Export a query as `obr_<name>(host, ..)` and `obr_module_<name>(module, ..)`
macro_rules! query_exports {
    ($(
        $(#[$meta:meta])*
        fn $query:ident / $module_query:ident ( $($arg:ident: $ty:ty),* ) -> $ret:ty = $body:ident;
    )*) => {
        $(
            $(#[$meta])*
            ///
            /// # Safety
            /// See the query notes above.
            #[no_mangle]
            pub unsafe extern "C" fn $query(host: *const Host, $($arg: $ty),*) -> $ret {
                query::$body(host_api(host), $($arg),*)
            }

            $(#[$meta])*
            ///
            /// Safe to call from inside this module's callbacks.
            ///
            /// # Safety
            /// See the query notes above.
            #[no_mangle]
            pub unsafe extern "C" fn $module_query(module: *const ModuleHandle, $($arg: $ty),*) -> $ret {
                query::$body(module_api(module), $($arg),*)
            }
        )*
    };
}

query_exports! {
    /// Host version number
    fn obr_orbiter_version / obr_module_orbiter_version() -> u32 = orbiter_version;

    /// Object with this name, or null
    fn obr_object_by_name / obr_module_object_by_name(name: *const c_char) -> ObjHandle = object_by_name;

    /// Object at `index` in catalog order, or null
    fn obr_object_by_index / obr_module_object_by_index(index: usize) -> ObjHandle = object_by_index;

    /// Number of objects in the session
    fn obr_object_count / obr_module_object_count() -> usize = object_count;

    /// Object type code, 0 for an unknown handle
    fn obr_object_type / obr_module_object_type(handle: ObjHandle) -> c_int = object_type;

    /// Copy the object name into `buf` (NUL-terminated, truncated to `len - 1`)
    ///
    /// Returns the full name length in bytes, 0 if the object does not exist.
    /// `buf` must be null or hold `len` bytes.
    fn obr_object_name / obr_module_object_name(handle: ObjHandle, buf: *mut c_char, len: usize) -> usize = object_name;

    /// Mean radius in meters
    fn obr_object_size / obr_module_object_size(handle: ObjHandle) -> f64 = object_size;

    /// Mass in kilograms
    fn obr_object_mass / obr_module_object_mass(handle: ObjHandle) -> f64 = object_mass;

    /// Position in the global frame, written to `out`
    fn obr_object_global_pos / obr_module_object_global_pos(handle: ObjHandle, out: *mut Vector3) -> BridgeStatus = object_global_pos;

    /// Velocity in the global frame, written to `out`
    fn obr_object_global_vel / obr_module_object_global_vel(handle: ObjHandle, out: *mut Vector3) -> BridgeStatus = object_global_vel;

    /// Position of `handle` relative to `reference`, written to `out`
    fn obr_object_relative_pos / obr_module_object_relative_pos(handle: ObjHandle, reference: ObjHandle, out: *mut Vector3) -> BridgeStatus = object_relative_pos;

    /// Velocity of `handle` relative to `reference`, written to `out`
    fn obr_object_relative_vel / obr_module_object_relative_vel(handle: ObjHandle, reference: ObjHandle, out: *mut Vector3) -> BridgeStatus = object_relative_vel;

    /// Vessel interface of an object, null if it is not a vessel
    fn obr_vessel_interface / obr_module_vessel_interface(handle: ObjHandle) -> ObjHandle = vessel_interface;

    /// Vessel with input focus, or null
    fn obr_focus_object / obr_module_focus_object() -> ObjHandle = focus_object;

    /// Returns the vessel that lost focus, or null if focus did not change
    fn obr_set_focus_object / obr_module_set_focus_object(vessel: ObjHandle) -> ObjHandle = set_focus_object;

    /// Dry mass in kilograms
    fn obr_vessel_empty_mass / obr_module_vessel_empty_mass(vessel: ObjHandle) -> f64 = vessel_empty_mass;

    fn obr_vessel_set_empty_mass / obr_module_vessel_set_empty_mass(vessel: ObjHandle, mass: f64) -> BridgeStatus = vessel_set_empty_mass;

    /// Propellant mass in kilograms
    fn obr_vessel_fuel_mass / obr_module_vessel_fuel_mass(vessel: ObjHandle) -> f64 = vessel_fuel_mass;

    /// Propellant capacity in kilograms
    fn obr_vessel_max_fuel_mass / obr_module_vessel_max_fuel_mass(vessel: ObjHandle) -> f64 = vessel_max_fuel_mass;

    /// Show a line of text in the viewport (truncated to 255 bytes)
    fn obr_debug_string / obr_module_debug_string(text: *const c_char) -> BridgeStatus = debug_string;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callbacks::DestroyFn;
    use std::cell::Cell;

    thread_local! {
        static DESTROYED: Cell<u32> = const { Cell::new(0) };
        static STARTS: Cell<u32> = const { Cell::new(0) };
    }

    extern "C" fn start(_: *mut c_void, _: c_int) {
        STARTS.with(|s| s.set(s.get() + 1));
    }
    extern "C" fn end(_: *mut c_void) {}
    extern "C" fn step(ctx: *mut c_void, simt: f64, _: f64, _: f64) {
        unsafe { *(ctx as *mut f64) = simt };
    }
    extern "C" fn focus(_: *mut c_void, _: ObjHandle, _: ObjHandle) {}
    extern "C" fn warp(_: *mut c_void, _: f64, _: f64) {}
    extern "C" fn vessel(_: *mut c_void, _: ObjHandle) {}
    extern "C" fn pause(_: *mut c_void, _: bool) {}
    extern "C" fn mouse(_: *mut c_void, _: u32, _: u32, _: u32, _: u32) -> bool {
        true
    }
    extern "C" fn immediate(_: *mut c_void, _: *mut c_char, _: bool) -> bool {
        false
    }
    extern "C" fn buffered(_: *mut c_void, _: u32, _: *mut c_char, _: bool) -> bool {
        false
    }
    extern "C" fn destroy(_: *mut c_void) -> bool {
        DESTROYED.with(|d| d.set(d.get() + 1));
        true
    }

    fn raw_table(destroy_slot: Option<DestroyFn>) -> RawCallbackTable {
        RawCallbackTable {
            simulation_start: Some(start),
            simulation_end: Some(end),
            pre_step: Some(step),
            post_step: Some(step),
            time_jump: Some(step),
            focus_changed: Some(focus),
            time_acc_changed: Some(warp),
            new_vessel: Some(vessel),
            delete_vessel: Some(vessel),
            vessel_jump: Some(vessel),
            pause: Some(pause),
            process_mouse: Some(mouse),
            process_keyboard_immediate: Some(immediate),
            process_keyboard_buffered: Some(buffered),
            destroy: destroy_slot,
        }
    }

    fn last_error() -> String {
        let ptr = obr_last_error_message();
        assert!(!ptr.is_null());
        unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
    }

    #[test]
    fn test_module_lifecycle_through_c_abi() {
        DESTROYED.with(|d| d.set(0));
        let mut simt = 0.0f64;
        unsafe {
            let host = obr_host_new(160828, 100830, 51544.5);
            let mut status = BridgeStatus::Failed;
            let table = raw_table(Some(destroy));
            let module = obr_module_new(
                host,
                &table,
                &mut simt as *mut f64 as *mut c_void,
                InstanceHandle::from_raw(0xABC),
                &mut status,
            );
            assert_eq!(status, BridgeStatus::Ok);
            assert!(!module.is_null());
            assert_eq!(obr_module_version(module), 100830);
            assert_eq!(obr_module_get_module(module), InstanceHandle::from_raw(0xABC));

            assert_eq!(obr_host_pre_step(host, 12.5, 0.1, 59000.2), BridgeStatus::Ok);
            assert_eq!(obr_module_get_sim_time(module), 12.5);
            assert_eq!(obr_module_get_sim_step(module), 0.1);
            assert_eq!(obr_module_get_sim_mjd(module), 59000.2);
            assert!(obr_host_process_mouse(host, 0x201, 0, 5, 5));

            assert_eq!(obr_host_simulation_start(host, 9), BridgeStatus::UnknownRenderMode);
            assert!(last_error().contains("9"));

            assert_eq!(obr_module_release(host, module), BridgeStatus::Ok);
            assert_eq!(obr_module_release(host, module), BridgeStatus::ModuleNotFound);
            obr_host_free(host);

            // Queries keep working on the handle after destruction
            assert_eq!(obr_module_get_sim_time(module), 12.5);
            obr_module_handle_free(module);
        }
        assert_eq!(simt, 12.5);
        assert_eq!(DESTROYED.with(|d| d.get()), 1);
    }

    #[test]
    fn test_incomplete_table_rejected() {
        DESTROYED.with(|d| d.set(0));
        unsafe {
            let host = obr_host_new(160828, 160828, 51544.5);
            let mut status = BridgeStatus::Ok;
            let table = raw_table(None);
            let module = obr_module_new(host, &table, ptr::null_mut(), InstanceHandle::NULL, &mut status);
            assert!(module.is_null());
            assert_eq!(status, BridgeStatus::IncompleteCallbackTable);
            assert!(last_error().contains("destroy"));

            let module = obr_module_new(host, ptr::null(), ptr::null_mut(), InstanceHandle::NULL, ptr::null_mut());
            assert!(module.is_null());
            obr_host_free(host);
        }
        assert_eq!(DESTROYED.with(|d| d.get()), 0);
    }

    #[test]
    fn test_unknown_render_mode_not_dispatched() {
        STARTS.with(|s| s.set(0));
        unsafe {
            let host = obr_host_new(160828, 160828, 51544.5);
            let table = raw_table(Some(destroy));
            let module = obr_module_new(host, &table, ptr::null_mut(), InstanceHandle::NULL, ptr::null_mut());
            assert!(!module.is_null());

            assert_eq!(obr_host_simulation_start(host, -1), BridgeStatus::UnknownRenderMode);
            assert_eq!(obr_host_simulation_start(host, 3), BridgeStatus::UnknownRenderMode);
            assert_eq!(STARTS.with(|s| s.get()), 0);

            assert_eq!(obr_host_simulation_start(host, 2), BridgeStatus::Ok);
            assert_eq!(STARTS.with(|s| s.get()), 1);
            obr_host_free(host);
            obr_module_handle_free(module);
        }
    }

    #[test]
    fn test_null_pointers_are_not_dereferenced() {
        unsafe {
            assert_eq!(obr_host_pause(ptr::null_mut(), true), BridgeStatus::NullArgument);
            assert!(!obr_host_process_mouse(ptr::null_mut(), 0x201, 0, 0, 0));
            assert_eq!(obr_module_version(ptr::null()), 0);
            assert_eq!(obr_module_get_sim_mjd(ptr::null()), 0.0);
            assert_eq!(obr_object_count(ptr::null()), 0);
            assert_eq!(obr_object_by_name(ptr::null(), ptr::null()), ObjHandle::NULL);
            assert_eq!(obr_module_object_count(ptr::null()), 0);
            assert_eq!(obr_module_focus_object(ptr::null()), ObjHandle::NULL);
            let text = CString::new("lost").unwrap();
            assert_eq!(obr_module_debug_string(ptr::null(), text.as_ptr()), BridgeStatus::NullArgument);
            assert!(last_error().contains("module"));

            let host = obr_host_new(160828, 160828, 51544.5);
            let mut keys: KeyStateBuffer = [0; 256];
            assert!(!obr_host_process_keyboard_immediate(host, ptr::null_mut(), true));
            assert!(!obr_host_process_keyboard_immediate(host, keys.as_mut_ptr(), true));
            assert_eq!(
                obr_object_global_pos(host, ObjHandle::NULL, ptr::null_mut()),
                BridgeStatus::NullArgument
            );
            assert_eq!(obr_debug_string(host, ptr::null()), BridgeStatus::NullArgument);
            obr_host_free(host);
            obr_host_free(ptr::null_mut());
        }
    }

    #[test]
    fn test_object_queries_on_empty_catalog() {
        unsafe {
            let host = obr_host_new(160828, 160828, 51544.5);
            let mut out = Vector3::new(1.0, 2.0, 3.0);
            assert_eq!(obr_orbiter_version(host), 160828);
            assert_eq!(obr_object_global_pos(host, ObjHandle::from_raw(42), &mut out), BridgeStatus::Ok);
            assert_eq!(out, Vector3::ZERO);
            assert_eq!(obr_object_name(host, ObjHandle::from_raw(42), ptr::null_mut(), 0), 0);
            assert_eq!(obr_focus_object(host), ObjHandle::NULL);
            let text = CString::new("hello").unwrap();
            assert_eq!(obr_debug_string(host, text.as_ptr()), BridgeStatus::Ok);
            obr_host_free(host);
        }
    }
}
