//! Safe module API
//!
//! Implement [`ModuleCallbacks`] and hand the value to
//! [`Host::register_module`]. Registration builds a callback table of
//! monomorphised trampolines, boxes the callbacks as the opaque context and
//! registers an ordinary [`ModuleBridge`]. The host cannot tell such a module
//! apart from one written in C.
//!
//! Trampolines translate raw arguments into typed ones and contain panics:
//! a panicking callback is logged and the host sees the neutral result
//! (`false` for input events).

use std::any::Any;
use std::os::raw::{c_char, c_int, c_void};
use std::panic::{self, AssertUnwindSafe};

use crate::bridge::{ModuleBridge, OpaqueContext};
use crate::callbacks::{CallbackSlot, CallbackTable};
use crate::host::{Host, ModuleHandle};
use crate::input::{Key, KeyStates, MouseEvent};
use crate::object::Vessel;
use crate::types::{InstanceHandle, ObjHandle, RenderMode, Result};

/// Event handlers of a module written in Rust
///
/// Every method defaults to doing nothing. Input handlers return `true` to
/// consume the input so no later module sees it.
pub trait ModuleCallbacks {
    fn on_simulation_start(&mut self, _module: &ModuleHandle, _render_mode: RenderMode) {}
    fn on_simulation_end(&mut self, _module: &ModuleHandle) {}
    fn on_pre_step(&mut self, _module: &ModuleHandle, _simt: f64, _simdt: f64, _mjd: f64) {}
    fn on_post_step(&mut self, _module: &ModuleHandle, _simt: f64, _simdt: f64, _mjd: f64) {}
    fn on_time_jump(&mut self, _module: &ModuleHandle, _simt: f64, _simdt: f64, _mjd: f64) {}
    fn on_focus_changed(
        &mut self,
        _module: &ModuleHandle,
        _new_focus: Vessel,
        _old_focus: Option<Vessel>,
    ) {
    }
    fn on_time_acc_changed(&mut self, _module: &ModuleHandle, _new_warp: f64, _old_warp: f64) {}
    fn on_new_vessel(&mut self, _module: &ModuleHandle, _vessel: Vessel) {}
    fn on_delete_vessel(&mut self, _module: &ModuleHandle, _vessel: Vessel) {}
    fn on_vessel_jump(&mut self, _module: &ModuleHandle, _vessel: Vessel) {}
    fn on_pause(&mut self, _module: &ModuleHandle, _paused: bool) {}
    fn on_process_mouse(&mut self, _module: &ModuleHandle, _event: MouseEvent) -> bool {
        false
    }
    fn on_process_keyboard_immediate(
        &mut self,
        _module: &ModuleHandle,
        _key_states: &mut KeyStates<'_>,
        _sim_running: bool,
    ) -> bool {
        false
    }
    fn on_process_keyboard_buffered(
        &mut self,
        _module: &ModuleHandle,
        _key: Key,
        _key_states: &mut KeyStates<'_>,
        _sim_running: bool,
    ) -> bool {
        false
    }

    /// Last call before the module is released
    fn on_destroy(&mut self, _module: &ModuleHandle) {}
}

/// Opaque context behind the trampolines of one registered module
struct ModuleAdapter<M> {
    handle: ModuleHandle,
    callbacks: M,
}

impl Host {
    /// Register a Rust module
    ///
    /// The host owns `callbacks` from now on and drops it after
    /// [`ModuleCallbacks::on_destroy`] when the module is released.
    pub fn register_module<M: ModuleCallbacks + 'static>(
        &mut self,
        instance: InstanceHandle,
        callbacks: M,
    ) -> Result<ModuleHandle> {
        let handle = self.allocate_module(instance);
        let adapter = Box::new(ModuleAdapter {
            handle: handle.clone(),
            callbacks,
        });
        let bridge = ModuleBridge::new(
            callback_table::<M>(),
            OpaqueContext::from_box(adapter),
            handle.clone(),
        );
        self.register(Box::new(bridge))?;
        Ok(handle)
    }
}

/// Trampoline table for modules of type `M`
///
/// The table expects a context created from `Box<ModuleAdapter<M>>`.
fn callback_table<M: ModuleCallbacks>() -> CallbackTable {
    CallbackTable {
        simulation_start: simulation_start::<M>,
        simulation_end: simulation_end::<M>,
        pre_step: pre_step::<M>,
        post_step: post_step::<M>,
        time_jump: time_jump::<M>,
        focus_changed: focus_changed::<M>,
        time_acc_changed: time_acc_changed::<M>,
        new_vessel: new_vessel::<M>,
        delete_vessel: delete_vessel::<M>,
        vessel_jump: vessel_jump::<M>,
        pause: pause::<M>,
        process_mouse: process_mouse::<M>,
        process_keyboard_immediate: process_keyboard_immediate::<M>,
        process_keyboard_buffered: process_keyboard_buffered::<M>,
        destroy: destroy::<M>,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "<non-string panic payload>"
    }
}

/// Run `f` against the adapter behind `ctx`, returning `default` on panic
fn guarded<M, R>(
    ctx: *mut c_void,
    slot: CallbackSlot,
    default: R,
    f: impl FnOnce(&mut ModuleAdapter<M>) -> R,
) -> R {
    // SAFETY: contexts handed to these trampolines are always created by
    // `register_module` from a `Box<ModuleAdapter<M>>` and live until destroy
    let adapter = match unsafe { (ctx as *mut ModuleAdapter<M>).as_mut() } {
        Some(adapter) => adapter,
        None => {
            log::error!("{} called with a null context", slot);
            return default;
        }
    };

    let id = adapter.handle.id();
    match panic::catch_unwind(AssertUnwindSafe(|| f(&mut *adapter))) {
        Ok(result) => result,
        Err(payload) => {
            log::error!("{}: {} panicked: {}", id, slot, panic_message(payload.as_ref()));
            default
        }
    }
}

fn vessel_argument(slot: CallbackSlot, handle: ObjHandle) -> Option<Vessel> {
    let vessel = Vessel::from_handle(handle);
    if vessel.is_none() {
        log::warn!("{} received a null vessel handle, event skipped", slot);
    }
    vessel
}

extern "C" fn simulation_start<M: ModuleCallbacks>(ctx: *mut c_void, render_mode: c_int) {
    let slot = CallbackSlot::SimulationStart;
    guarded(ctx, slot, (), |a: &mut ModuleAdapter<M>| match RenderMode::try_from(render_mode) {
        Ok(mode) => a.callbacks.on_simulation_start(&a.handle, mode),
        Err(e) => log::warn!("{}: {}, event skipped", slot, e),
    })
}

extern "C" fn simulation_end<M: ModuleCallbacks>(ctx: *mut c_void) {
    guarded(ctx, CallbackSlot::SimulationEnd, (), |a: &mut ModuleAdapter<M>| {
        a.callbacks.on_simulation_end(&a.handle)
    })
}

extern "C" fn pre_step<M: ModuleCallbacks>(ctx: *mut c_void, simt: f64, simdt: f64, mjd: f64) {
    guarded(ctx, CallbackSlot::PreStep, (), |a: &mut ModuleAdapter<M>| {
        a.callbacks.on_pre_step(&a.handle, simt, simdt, mjd)
    })
}

extern "C" fn post_step<M: ModuleCallbacks>(ctx: *mut c_void, simt: f64, simdt: f64, mjd: f64) {
    guarded(ctx, CallbackSlot::PostStep, (), |a: &mut ModuleAdapter<M>| {
        a.callbacks.on_post_step(&a.handle, simt, simdt, mjd)
    })
}

extern "C" fn time_jump<M: ModuleCallbacks>(ctx: *mut c_void, simt: f64, simdt: f64, mjd: f64) {
    guarded(ctx, CallbackSlot::TimeJump, (), |a: &mut ModuleAdapter<M>| {
        a.callbacks.on_time_jump(&a.handle, simt, simdt, mjd)
    })
}

extern "C" fn focus_changed<M: ModuleCallbacks>(
    ctx: *mut c_void,
    new_focus: ObjHandle,
    old_focus: ObjHandle,
) {
    let slot = CallbackSlot::FocusChanged;
    guarded(ctx, slot, (), |a: &mut ModuleAdapter<M>| {
        if let Some(new_focus) = vessel_argument(slot, new_focus) {
            a.callbacks
                .on_focus_changed(&a.handle, new_focus, Vessel::from_handle(old_focus))
        }
    })
}

extern "C" fn time_acc_changed<M: ModuleCallbacks>(ctx: *mut c_void, new_warp: f64, old_warp: f64) {
    guarded(ctx, CallbackSlot::TimeAccChanged, (), |a: &mut ModuleAdapter<M>| {
        a.callbacks.on_time_acc_changed(&a.handle, new_warp, old_warp)
    })
}

extern "C" fn new_vessel<M: ModuleCallbacks>(ctx: *mut c_void, vessel: ObjHandle) {
    let slot = CallbackSlot::NewVessel;
    guarded(ctx, slot, (), |a: &mut ModuleAdapter<M>| {
        if let Some(vessel) = vessel_argument(slot, vessel) {
            a.callbacks.on_new_vessel(&a.handle, vessel)
        }
    })
}

extern "C" fn delete_vessel<M: ModuleCallbacks>(ctx: *mut c_void, vessel: ObjHandle) {
    let slot = CallbackSlot::DeleteVessel;
    guarded(ctx, slot, (), |a: &mut ModuleAdapter<M>| {
        if let Some(vessel) = vessel_argument(slot, vessel) {
            a.callbacks.on_delete_vessel(&a.handle, vessel)
        }
    })
}

extern "C" fn vessel_jump<M: ModuleCallbacks>(ctx: *mut c_void, vessel: ObjHandle) {
    let slot = CallbackSlot::VesselJump;
    guarded(ctx, slot, (), |a: &mut ModuleAdapter<M>| {
        if let Some(vessel) = vessel_argument(slot, vessel) {
            a.callbacks.on_vessel_jump(&a.handle, vessel)
        }
    })
}

extern "C" fn pause<M: ModuleCallbacks>(ctx: *mut c_void, paused: bool) {
    guarded(ctx, CallbackSlot::Pause, (), |a: &mut ModuleAdapter<M>| {
        a.callbacks.on_pause(&a.handle, paused)
    })
}

extern "C" fn process_mouse<M: ModuleCallbacks>(
    ctx: *mut c_void,
    event: u32,
    state: u32,
    x: u32,
    y: u32,
) -> bool {
    guarded(ctx, CallbackSlot::ProcessMouse, false, |a: &mut ModuleAdapter<M>| {
        a.callbacks
            .on_process_mouse(&a.handle, MouseEvent::from_raw(event, state, x, y))
    })
}

extern "C" fn process_keyboard_immediate<M: ModuleCallbacks>(
    ctx: *mut c_void,
    kstate: *mut c_char,
    sim_running: bool,
) -> bool {
    let slot = CallbackSlot::ProcessKeyboardImmediate;
    guarded(ctx, slot, false, |a: &mut ModuleAdapter<M>| {
        // SAFETY: the host passes its 256-byte key state buffer for the
        // duration of the call
        match unsafe { KeyStates::from_raw(kstate) } {
            Some(mut keys) => a
                .callbacks
                .on_process_keyboard_immediate(&a.handle, &mut keys, sim_running),
            None => {
                log::warn!("{} received a null key state buffer", slot);
                false
            }
        }
    })
}

extern "C" fn process_keyboard_buffered<M: ModuleCallbacks>(
    ctx: *mut c_void,
    key: u32,
    kstate: *mut c_char,
    sim_running: bool,
) -> bool {
    let slot = CallbackSlot::ProcessKeyboardBuffered;
    guarded(ctx, slot, false, |a: &mut ModuleAdapter<M>| {
        let Some(key) = Key::from_code(key) else {
            log::warn!("{} received out-of-range key code {:#x}", slot, key);
            return false;
        };
        // SAFETY: as for the immediate keyboard event
        match unsafe { KeyStates::from_raw(kstate) } {
            Some(mut keys) => a
                .callbacks
                .on_process_keyboard_buffered(&a.handle, key, &mut keys, sim_running),
            None => {
                log::warn!("{} received a null key state buffer", slot);
                false
            }
        }
    })
}

extern "C" fn destroy<M: ModuleCallbacks>(ctx: *mut c_void) -> bool {
    if ctx.is_null() {
        log::error!("destroy called with a null context");
        return false;
    }

    // SAFETY: destroy is the last call for this context; ownership of the
    // adapter returns here and nothing touches the pointer afterwards
    let adapter = unsafe { Box::from_raw(ctx as *mut ModuleAdapter<M>) };
    let id = adapter.handle.id();
    let released = panic::catch_unwind(AssertUnwindSafe(move || {
        let mut adapter = adapter;
        adapter.callbacks.on_destroy(&adapter.handle);
        drop(adapter);
    }));

    match released {
        Ok(()) => {
            log::debug!("{} released", id);
            true
        }
        Err(payload) => {
            log::error!("{}: destroy panicked: {}", id, panic_message(payload.as_ref()));
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HostConfig;
    use crate::host::{HostApi, ObjectRecord};
    use crate::input::{KeyStateBuffer, MouseEventKind};
    use crate::object::ObjectKind;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct Seen {
        events: Vec<String>,
    }

    struct Recorder {
        seen: Rc<RefCell<Seen>>,
    }

    impl Recorder {
        fn log(&self, event: String) {
            self.seen.borrow_mut().events.push(event);
        }
    }

    impl ModuleCallbacks for Recorder {
        fn on_simulation_start(&mut self, _module: &ModuleHandle, render_mode: RenderMode) {
            self.log(format!("start {:?}", render_mode));
        }

        fn on_pre_step(&mut self, module: &ModuleHandle, simt: f64, _simdt: f64, _mjd: f64) {
            self.log(format!("pre_step {} {}", simt, module.sim_time()));
        }

        fn on_focus_changed(
            &mut self,
            module: &ModuleHandle,
            new_focus: Vessel,
            old_focus: Option<Vessel>,
        ) {
            use crate::object::ObjectTrait;
            self.log(format!(
                "focus {} from {:?}",
                new_focus.name(module.api()),
                old_focus.map(|v| v.name(module.api()))
            ));
        }

        fn on_process_mouse(&mut self, _module: &ModuleHandle, event: MouseEvent) -> bool {
            self.log(format!("mouse {:?}", event.kind));
            event.kind == MouseEventKind::LeftDown
        }

        fn on_process_keyboard_immediate(
            &mut self,
            _module: &ModuleHandle,
            key_states: &mut KeyStates<'_>,
            _sim_running: bool,
        ) -> bool {
            if key_states.is_down(Key::F1) {
                key_states.reset(Key::F1);
                return true;
            }
            false
        }

        fn on_process_keyboard_buffered(
            &mut self,
            _module: &ModuleHandle,
            key: Key,
            key_states: &mut KeyStates<'_>,
            _sim_running: bool,
        ) -> bool {
            self.log(format!("key {} ctrl {}", key, key_states.control()));
            false
        }

        fn on_pause(&mut self, _module: &ModuleHandle, _paused: bool) {
            panic!("pause handler exploded");
        }

        fn on_destroy(&mut self, module: &ModuleHandle) {
            self.log(format!("destroy {}", module.id()));
        }
    }

    fn setup() -> (Host, Rc<RefCell<Seen>>, ModuleHandle) {
        let mut host = Host::simulated(HostConfig::default());
        let seen = Rc::new(RefCell::new(Seen::default()));
        let recorder = Recorder {
            seen: Rc::clone(&seen),
        };
        let handle = host
            .register_module(InstanceHandle::from_raw(0x1000), recorder)
            .unwrap();
        (host, seen, handle)
    }

    #[test]
    fn test_typed_arguments() {
        let (mut host, seen, _) = setup();
        host.simulation_start(RenderMode::Fullscreen);
        host.pre_step(2.0, 1.0, 51544.5);
        assert!(host.process_mouse(0x201, 0, 1, 1));
        assert!(!host.process_mouse(0x20A, 0, 1, 1));

        let mut keys: KeyStateBuffer = [0; 256];
        keys[usize::from(Key::LCONTROL.0)] = 0x80u8 as c_char;
        assert!(!host.process_keyboard_buffered(0x3B, &mut keys, true));

        assert_eq!(
            seen.borrow().events,
            vec![
                "start Fullscreen",
                "pre_step 2 2",
                "mouse LeftDown",
                "mouse Wheel",
                "key F1 ctrl true",
            ]
        );
    }

    #[test]
    fn test_keyboard_changes_visible_to_host() {
        let (mut host, _, _) = setup();
        let mut keys: KeyStateBuffer = [0; 256];
        keys[usize::from(Key::F1.0)] = 0x80u8 as c_char;

        assert!(host.process_keyboard_immediate(&mut keys, true));
        assert_eq!(keys[usize::from(Key::F1.0)], 0);
        assert!(!host.process_keyboard_immediate(&mut keys, true));
    }

    #[test]
    fn test_focus_change_resolves_vessels() {
        let catalog = Rc::new(crate::host::ObjectCatalog::new(160828));
        let first = catalog.insert(ObjectRecord::new("GL-01", ObjectKind::Vessel));
        let second = catalog.insert(ObjectRecord::new("GL-02", ObjectKind::Vessel));
        let api: Rc<dyn HostApi> = catalog;

        let mut host = Host::new(HostConfig::default(), api);
        let seen = Rc::new(RefCell::new(Seen::default()));
        host.register_module(InstanceHandle::NULL, Recorder { seen: Rc::clone(&seen) })
            .unwrap();

        host.focus_changed(first, ObjHandle::NULL);
        host.focus_changed(second, first);
        // Null new focus is skipped
        host.focus_changed(ObjHandle::NULL, second);

        assert_eq!(
            seen.borrow().events,
            vec!["focus GL-01 from None", "focus GL-02 from Some(\"GL-01\")"]
        );
    }

    #[test]
    fn test_panics_are_contained() {
        let (mut host, seen, handle) = setup();
        host.pause(true);
        // Module stays registered and keeps receiving events
        host.pre_step(1.0, 1.0, 51544.5);
        assert!(host.is_registered(handle.id()));
        assert_eq!(seen.borrow().events, vec!["pre_step 1 1"]);
    }

    #[test]
    fn test_unknown_render_mode_skipped() {
        let mut host = Host::simulated(HostConfig::default());
        let seen = Rc::new(RefCell::new(Seen::default()));
        let handle = host.allocate_module(InstanceHandle::NULL);
        let adapter = Box::new(ModuleAdapter {
            handle: handle.clone(),
            callbacks: Recorder {
                seen: Rc::clone(&seen),
            },
        });

        let table = callback_table::<Recorder>();
        let ctx = OpaqueContext::from_box(adapter).as_ptr();
        (table.simulation_start)(ctx, 7);
        (table.simulation_start)(ctx, RenderMode::Window.code());
        assert!((table.destroy)(ctx));

        assert_eq!(
            seen.borrow().events,
            vec!["start Window".to_string(), format!("destroy {}", handle.id())]
        );
    }

    #[test]
    fn test_destroy_runs_once_on_release() {
        let (mut host, seen, handle) = setup();
        host.release(handle.id()).unwrap();
        drop(host);
        assert_eq!(
            seen.borrow().events,
            vec![format!("destroy {}", handle.id())]
        );
    }
}
