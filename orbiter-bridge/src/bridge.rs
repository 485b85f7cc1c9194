//! The callback bridge
//!
//! [`ModuleBridge`] is a host module whose every event is forwarded to one
//! slot of a [`CallbackTable`], with the caller's opaque context prepended.
//! It has no logic of its own: arguments pass through unchanged, results come
//! back unchanged, and dropping the bridge fires the `destroy` slot once.

use std::os::raw::c_void;

use crate::callbacks::CallbackTable;
use crate::host::{HostModule, ModuleHandle};
use crate::input::KeyStateBuffer;
use crate::types::{ObjHandle, RenderMode};

/// Untyped pointer owned by the foreign side
///
/// Passed unmodified as the first argument of every callback. The bridge never
/// dereferences it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpaqueContext(*mut c_void);

impl OpaqueContext {
    pub const NULL: OpaqueContext = OpaqueContext(std::ptr::null_mut());

    /// Wrap a caller-owned pointer
    ///
    /// # Safety
    /// The pointer must stay valid for every callback of the table it is
    /// registered with, up to and including `destroy`.
    pub unsafe fn from_raw(ptr: *mut c_void) -> Self {
        Self(ptr)
    }

    /// Move `value` onto the heap; the table's `destroy` slot owns it from
    /// now on and must reclaim it with `Box::from_raw`
    pub fn from_box<T>(value: Box<T>) -> Self {
        Self(Box::into_raw(value).cast())
    }

    pub fn as_ptr(self) -> *mut c_void {
        self.0
    }
}

/// Host module implemented by a foreign callback table
pub struct ModuleBridge {
    callbacks: CallbackTable,
    context: OpaqueContext,
    handle: ModuleHandle,
}

impl ModuleBridge {
    pub fn new(callbacks: CallbackTable, context: OpaqueContext, handle: ModuleHandle) -> Self {
        log::debug!("Bridging {} with context {:p}", handle.id(), context.as_ptr());
        Self {
            callbacks,
            context,
            handle,
        }
    }

    pub fn context(&self) -> OpaqueContext {
        self.context
    }

    pub fn callbacks(&self) -> &CallbackTable {
        &self.callbacks
    }

    fn ctx(&self) -> *mut c_void {
        self.context.as_ptr()
    }
}

impl HostModule for ModuleBridge {
    fn base(&self) -> &ModuleHandle {
        &self.handle
    }

    fn simulation_start(&mut self, mode: RenderMode) {
        (self.callbacks.simulation_start)(self.ctx(), mode.code())
    }

    fn simulation_end(&mut self) {
        (self.callbacks.simulation_end)(self.ctx())
    }

    fn pre_step(&mut self, simt: f64, simdt: f64, mjd: f64) {
        (self.callbacks.pre_step)(self.ctx(), simt, simdt, mjd)
    }

    fn post_step(&mut self, simt: f64, simdt: f64, mjd: f64) {
        (self.callbacks.post_step)(self.ctx(), simt, simdt, mjd)
    }

    fn time_jump(&mut self, simt: f64, simdt: f64, mjd: f64) {
        (self.callbacks.time_jump)(self.ctx(), simt, simdt, mjd)
    }

    fn focus_changed(&mut self, new_focus: ObjHandle, old_focus: ObjHandle) {
        (self.callbacks.focus_changed)(self.ctx(), new_focus, old_focus)
    }

    fn time_acc_changed(&mut self, new_warp: f64, old_warp: f64) {
        (self.callbacks.time_acc_changed)(self.ctx(), new_warp, old_warp)
    }

    fn new_vessel(&mut self, vessel: ObjHandle) {
        (self.callbacks.new_vessel)(self.ctx(), vessel)
    }

    fn delete_vessel(&mut self, vessel: ObjHandle) {
        (self.callbacks.delete_vessel)(self.ctx(), vessel)
    }

    fn vessel_jump(&mut self, vessel: ObjHandle) {
        (self.callbacks.vessel_jump)(self.ctx(), vessel)
    }

    fn pause(&mut self, paused: bool) {
        (self.callbacks.pause)(self.ctx(), paused)
    }

    fn process_mouse(&mut self, event: u32, state: u32, x: u32, y: u32) -> bool {
        (self.callbacks.process_mouse)(self.ctx(), event, state, x, y)
    }

    fn process_keyboard_immediate(
        &mut self,
        key_states: &mut KeyStateBuffer,
        sim_running: bool,
    ) -> bool {
        (self.callbacks.process_keyboard_immediate)(self.ctx(), key_states.as_mut_ptr(), sim_running)
    }

    fn process_keyboard_buffered(
        &mut self,
        key: u32,
        key_states: &mut KeyStateBuffer,
        sim_running: bool,
    ) -> bool {
        (self.callbacks.process_keyboard_buffered)(
            self.ctx(),
            key,
            key_states.as_mut_ptr(),
            sim_running,
        )
    }
}

impl Drop for ModuleBridge {
    fn drop(&mut self) {
        if !(self.callbacks.destroy)(self.ctx()) {
            log::warn!("{}: destroy callback reported failure", self.handle.id());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callbacks::RawCallbackTable;
    use crate::config::HostConfig;
    use crate::host::Host;
    use crate::types::InstanceHandle;
    use std::os::raw::{c_char, c_int};

    #[derive(Default)]
    struct Probe {
        starts: Vec<c_int>,
        steps: Vec<(f64, f64, f64)>,
        destroyed: u32,
    }

    fn probe<'a>(ctx: *mut c_void) -> &'a mut Probe {
        unsafe { &mut *(ctx as *mut Probe) }
    }

    extern "C" fn start(ctx: *mut c_void, mode: c_int) {
        probe(ctx).starts.push(mode);
    }
    extern "C" fn end(_: *mut c_void) {}
    extern "C" fn step(ctx: *mut c_void, simt: f64, simdt: f64, mjd: f64) {
        probe(ctx).steps.push((simt, simdt, mjd));
    }
    extern "C" fn focus(_: *mut c_void, _: ObjHandle, _: ObjHandle) {}
    extern "C" fn warp(_: *mut c_void, _: f64, _: f64) {}
    extern "C" fn vessel(_: *mut c_void, _: ObjHandle) {}
    extern "C" fn pause(_: *mut c_void, _: bool) {}
    extern "C" fn mouse(_: *mut c_void, event: u32, _: u32, _: u32, _: u32) -> bool {
        event == 0x201
    }
    extern "C" fn immediate(_: *mut c_void, kstate: *mut c_char, _: bool) -> bool {
        unsafe { *kstate.add(0x39) = 0 };
        true
    }
    extern "C" fn buffered(_: *mut c_void, key: u32, _: *mut c_char, running: bool) -> bool {
        running && key == 0x01
    }
    extern "C" fn destroy(ctx: *mut c_void) -> bool {
        probe(ctx).destroyed += 1;
        false
    }

    fn table() -> CallbackTable {
        CallbackTable::try_from(RawCallbackTable {
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
            destroy: Some(destroy),
        })
        .unwrap()
    }

    #[test]
    fn test_forwarding_and_single_destroy() {
        let mut host = Host::simulated(HostConfig::default());
        let mut state = Probe::default();
        let ctx = unsafe { OpaqueContext::from_raw(&mut state as *mut Probe as *mut c_void) };
        let handle = host.register_callbacks(table(), ctx, InstanceHandle::NULL).unwrap();

        host.simulation_start(RenderMode::Window);
        host.pre_step(1.0, 0.5, 51544.5);
        host.time_jump(9.0, 0.0, 51544.6);
        assert!(host.process_mouse(0x201, 0, 0, 0));
        assert!(!host.process_mouse(0x200, 0, 0, 0));

        let mut keys = [0x80u8 as c_char; 256];
        assert!(host.process_keyboard_immediate(&mut keys, true));
        assert_eq!(keys[0x39], 0);
        assert!(host.process_keyboard_buffered(0x01, &mut keys, true));
        assert!(!host.process_keyboard_buffered(0x01, &mut keys, false));

        host.release(handle.id()).unwrap();
        drop(host);

        assert_eq!(state.starts, vec![2]);
        assert_eq!(state.steps, vec![(1.0, 0.5, 51544.5), (9.0, 0.0, 51544.6)]);
        assert_eq!(state.destroyed, 1);
    }

    #[test]
    fn test_destroy_only_for_admitted_bridges() {
        let mut host = Host::simulated(HostConfig::default());
        let mut other = Host::simulated(HostConfig::default());
        let mut state = Probe::default();
        let ctx = unsafe { OpaqueContext::from_raw(&mut state as *mut Probe as *mut c_void) };

        // A hand-built bridge that `register` refuses is dropped on the spot
        let stray = ModuleBridge::new(table(), ctx, other.allocate_module(InstanceHandle::NULL));
        assert!(matches!(
            host.register(Box::new(stray)),
            Err(crate::BridgeError::ForeignModule(_))
        ));
        assert_eq!(host.module_count(), 0);
        assert_eq!(state.destroyed, 1);

        let handle = host.register_callbacks(table(), ctx, InstanceHandle::NULL).unwrap();
        assert_eq!(state.destroyed, 1);
        host.release(handle.id()).unwrap();
        assert_eq!(state.destroyed, 2);
    }

    #[test]
    fn test_boxed_context_released_by_destroy() {
        extern "C" fn destroy_box(ctx: *mut c_void) -> bool {
            drop(unsafe { Box::from_raw(ctx as *mut Probe) });
            true
        }

        let mut table = table();
        table.destroy = destroy_box;
        let mut host = Host::simulated(HostConfig::default());
        let ctx = OpaqueContext::from_box(Box::new(Probe::default()));
        host.register_callbacks(table, ctx, InstanceHandle::NULL).unwrap();
        host.pre_step(1.0, 1.0, 51544.5);
        host.shutdown();
        assert_eq!(host.stats().count(crate::callbacks::CallbackSlot::Destroy), 1);
    }
}
