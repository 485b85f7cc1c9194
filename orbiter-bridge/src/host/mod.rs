//! In-process host model
//!
//! The real simulator owns the module registry, the simulation clock and the
//! object database, and calls every registered module's virtual methods from
//! its single control thread. [`Host`] reproduces that contract so bridges and
//! native modules can be driven, tested and scripted without the simulator.
//!
//! Dispatch rules:
//! - Modules are called in registration order.
//! - Step events (`pre_step`, `post_step`, `time_jump`) publish the new clock
//!   before any module is called, so handle queries inside the callback see it.
//! - Mouse and keyboard events stop at the first module that consumes them.
//! - Nothing is re-entrant: a callback must not call back into the host that
//!   is dispatching to it.

pub mod api;
pub mod catalog;

pub use api::HostApi;
pub use catalog::{ObjectCatalog, ObjectRecord};

use serde::Serialize;
use std::cell::Cell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::callbacks::{CallbackSlot, CallbackTable};
use crate::bridge::{ModuleBridge, OpaqueContext};
use crate::config::HostConfig;
use crate::input::KeyStateBuffer;
use crate::types::{BridgeError, InstanceHandle, ModuleId, ObjHandle, RenderMode, Result, SimClock};

/// The host's polymorphic module interface
///
/// Every method has a neutral default, matching the host's base class. Input
/// methods return `true` when the module consumed the input.
pub trait HostModule {
    /// Host-side state of this module (version, instance, clock)
    fn base(&self) -> &ModuleHandle;

    fn simulation_start(&mut self, _mode: RenderMode) {}
    fn simulation_end(&mut self) {}
    fn pre_step(&mut self, _simt: f64, _simdt: f64, _mjd: f64) {}
    fn post_step(&mut self, _simt: f64, _simdt: f64, _mjd: f64) {}
    fn time_jump(&mut self, _simt: f64, _simdt: f64, _mjd: f64) {}
    fn focus_changed(&mut self, _new_focus: ObjHandle, _old_focus: ObjHandle) {}
    fn time_acc_changed(&mut self, _new_warp: f64, _old_warp: f64) {}
    fn new_vessel(&mut self, _vessel: ObjHandle) {}
    fn delete_vessel(&mut self, _vessel: ObjHandle) {}
    fn vessel_jump(&mut self, _vessel: ObjHandle) {}
    fn pause(&mut self, _paused: bool) {}
    fn process_mouse(&mut self, _event: u32, _state: u32, _x: u32, _y: u32) -> bool {
        false
    }
    fn process_keyboard_immediate(
        &mut self,
        _key_states: &mut KeyStateBuffer,
        _sim_running: bool,
    ) -> bool {
        false
    }
    fn process_keyboard_buffered(
        &mut self,
        _key: u32,
        _key_states: &mut KeyStateBuffer,
        _sim_running: bool,
    ) -> bool {
        false
    }
}

struct ModuleState {
    instance: InstanceHandle,
    version: u32,
    clock: Rc<Cell<SimClock>>,
    api: Rc<dyn HostApi>,
}

/// Introspection handle of a registered module
///
/// Reads host-held state only, so it stays usable after the module itself has
/// been destroyed.
#[derive(Clone)]
pub struct ModuleHandle {
    id: ModuleId,
    state: Rc<ModuleState>,
}

impl ModuleHandle {
    pub fn id(&self) -> ModuleId {
        self.id
    }

    /// API version the module was registered against
    pub fn version(&self) -> u32 {
        self.state.version
    }

    /// Instance handle of the library that registered the module
    pub fn module(&self) -> InstanceHandle {
        self.state.instance
    }

    /// Simulation time in seconds since session start
    pub fn sim_time(&self) -> f64 {
        self.state.clock.get().simt
    }

    /// Length of the last simulation step in seconds
    pub fn sim_step(&self) -> f64 {
        self.state.clock.get().simdt
    }

    /// Current simulation time as Modified Julian Date
    pub fn sim_mjd(&self) -> f64 {
        self.state.clock.get().mjd
    }

    /// Global object and vessel queries of the owning host
    pub fn api(&self) -> &dyn HostApi {
        self.state.api.as_ref()
    }

    fn belongs_to(&self, clock: &Rc<Cell<SimClock>>) -> bool {
        Rc::ptr_eq(&self.state.clock, clock)
    }
}

impl fmt::Debug for ModuleHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleHandle")
            .field("id", &self.id)
            .field("instance", &self.state.instance)
            .field("version", &self.state.version)
            .field("clock", &self.state.clock.get())
            .finish()
    }
}

/// Per-slot dispatch counters
#[derive(Debug, Clone, Default, Serialize)]
pub struct DispatchStats {
    counts: BTreeMap<CallbackSlot, u64>,
}

impl DispatchStats {
    fn record(&mut self, slot: CallbackSlot) {
        *self.counts.entry(slot).or_insert(0) += 1;
    }

    /// How often the host dispatched `slot` (destroys count per module)
    pub fn count(&self, slot: CallbackSlot) -> u64 {
        self.counts.get(&slot).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (CallbackSlot, u64)> + '_ {
        self.counts.iter().map(|(slot, count)| (*slot, *count))
    }
}

/// Module registry, event dispatcher and clock owner
pub struct Host {
    config: HostConfig,
    api: Rc<dyn HostApi>,
    clock: Rc<Cell<SimClock>>,
    modules: Vec<Box<dyn HostModule>>,
    next_id: u64,
    stats: DispatchStats,
}

impl Host {
    /// Create a host answering object queries from `api`
    pub fn new(config: HostConfig, api: Rc<dyn HostApi>) -> Self {
        log::info!(
            "Host started (orbiter version {}, module version {}, MJD {})",
            config.orbiter_version,
            config.module_version,
            config.start_mjd
        );
        let clock = Rc::new(Cell::new(SimClock::new(0.0, 0.0, config.start_mjd)));
        Self {
            config,
            api,
            clock,
            modules: Vec::new(),
            next_id: 1,
            stats: DispatchStats::default(),
        }
    }

    /// Create a host backed by an empty [`ObjectCatalog`]
    pub fn simulated(config: HostConfig) -> Self {
        let catalog = Rc::new(ObjectCatalog::new(config.orbiter_version));
        Self::new(config, catalog)
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    pub fn api(&self) -> &dyn HostApi {
        self.api.as_ref()
    }

    pub fn clock(&self) -> SimClock {
        self.clock.get()
    }

    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }

    pub fn module_count(&self) -> usize {
        self.modules.len()
    }

    pub fn is_registered(&self, id: ModuleId) -> bool {
        self.modules.iter().any(|m| m.base().id() == id)
    }

    /// Reserve an id and build the handle a module will be registered with
    pub fn allocate_module(&mut self, instance: InstanceHandle) -> ModuleHandle {
        let id = ModuleId(self.next_id);
        self.next_id += 1;
        ModuleHandle {
            id,
            state: Rc::new(ModuleState {
                instance,
                version: self.config.module_version,
                clock: Rc::clone(&self.clock),
                api: Rc::clone(&self.api),
            }),
        }
    }

    /// Take ownership of a module; the host releases it on [`Host::release`],
    /// [`Host::shutdown`] or drop
    ///
    /// A module rejected here is dropped immediately, so a bridge built by
    /// hand would still fire its destroy slot. [`Host::register_callbacks`]
    /// rejects before a bridge exists.
    pub fn register(&mut self, module: Box<dyn HostModule>) -> Result<ModuleId> {
        let id = self.admit(module.base())?;
        self.modules.push(module);
        log::info!("Registered {} ({} module(s) active)", id, self.modules.len());
        Ok(id)
    }

    /// Registration entry point for a callback table plus opaque context
    ///
    /// The handle is checked before the bridge is built, so a rejected
    /// registration never calls `destroy`; it runs only when the module is
    /// released.
    pub fn register_callbacks(
        &mut self,
        callbacks: CallbackTable,
        context: OpaqueContext,
        instance: InstanceHandle,
    ) -> Result<ModuleHandle> {
        let handle = self.allocate_module(instance);
        self.admit(&handle)?;
        let bridge = ModuleBridge::new(callbacks, context, handle.clone());
        self.register(Box::new(bridge))?;
        Ok(handle)
    }

    fn admit(&self, handle: &ModuleHandle) -> Result<ModuleId> {
        let id = handle.id();
        if !handle.belongs_to(&self.clock) {
            return Err(BridgeError::ForeignModule(id));
        }
        if self.is_registered(id) {
            return Err(BridgeError::DuplicateModule(id));
        }
        Ok(id)
    }

    /// Destroy one module
    pub fn release(&mut self, id: ModuleId) -> Result<()> {
        let index = self
            .modules
            .iter()
            .position(|m| m.base().id() == id)
            .ok_or(BridgeError::ModuleNotFound(id))?;

        let module = self.modules.remove(index);
        self.stats.record(CallbackSlot::Destroy);
        drop(module);
        log::info!("Released {} ({} module(s) active)", id, self.modules.len());
        Ok(())
    }

    /// Destroy every module registered by one library instance, returning
    /// how many were released
    pub fn release_instance(&mut self, instance: InstanceHandle) -> usize {
        let (released, kept): (Vec<_>, Vec<_>) = self
            .modules
            .drain(..)
            .partition(|m| m.base().module() == instance);
        self.modules = kept;

        let count = released.len();
        for module in released {
            self.stats.record(CallbackSlot::Destroy);
            log::debug!("Destroying {}", module.base().id());
            drop(module);
        }
        if count > 0 {
            log::info!(
                "Released {} module(s) of instance {:?} ({} module(s) active)",
                count,
                instance,
                self.modules.len()
            );
        }
        count
    }

    /// Destroy every module in registration order
    pub fn shutdown(&mut self) {
        if self.modules.is_empty() {
            return;
        }
        log::info!("Shutting down {} module(s)", self.modules.len());
        for module in self.modules.drain(..) {
            self.stats.record(CallbackSlot::Destroy);
            log::debug!("Destroying {}", module.base().id());
            drop(module);
        }
    }

    fn publish_clock(&mut self, simt: f64, simdt: f64, mjd: f64) {
        self.clock.set(SimClock::new(simt, simdt, mjd));
    }

    fn for_each_module(&mut self, slot: CallbackSlot, mut f: impl FnMut(&mut dyn HostModule)) {
        self.stats.record(slot);
        log::trace!("Dispatching {} to {} module(s)", slot, self.modules.len());
        for module in self.modules.iter_mut() {
            f(module.as_mut());
        }
    }

    fn until_consumed(
        &mut self,
        slot: CallbackSlot,
        mut f: impl FnMut(&mut dyn HostModule) -> bool,
    ) -> bool {
        self.stats.record(slot);
        for module in self.modules.iter_mut() {
            if f(module.as_mut()) {
                log::trace!("{} consumed by {}", slot, module.base().id());
                return true;
            }
        }
        false
    }

    pub fn simulation_start(&mut self, mode: RenderMode) {
        self.for_each_module(CallbackSlot::SimulationStart, |m| m.simulation_start(mode));
    }

    pub fn simulation_end(&mut self) {
        self.for_each_module(CallbackSlot::SimulationEnd, |m| m.simulation_end());
    }

    pub fn pre_step(&mut self, simt: f64, simdt: f64, mjd: f64) {
        self.publish_clock(simt, simdt, mjd);
        self.for_each_module(CallbackSlot::PreStep, |m| m.pre_step(simt, simdt, mjd));
    }

    pub fn post_step(&mut self, simt: f64, simdt: f64, mjd: f64) {
        self.publish_clock(simt, simdt, mjd);
        self.for_each_module(CallbackSlot::PostStep, |m| m.post_step(simt, simdt, mjd));
    }

    pub fn time_jump(&mut self, simt: f64, simdt: f64, mjd: f64) {
        self.publish_clock(simt, simdt, mjd);
        self.for_each_module(CallbackSlot::TimeJump, |m| m.time_jump(simt, simdt, mjd));
    }

    pub fn focus_changed(&mut self, new_focus: ObjHandle, old_focus: ObjHandle) {
        self.for_each_module(CallbackSlot::FocusChanged, |m| {
            m.focus_changed(new_focus, old_focus)
        });
    }

    pub fn time_acc_changed(&mut self, new_warp: f64, old_warp: f64) {
        self.for_each_module(CallbackSlot::TimeAccChanged, |m| {
            m.time_acc_changed(new_warp, old_warp)
        });
    }

    pub fn new_vessel(&mut self, vessel: ObjHandle) {
        self.for_each_module(CallbackSlot::NewVessel, |m| m.new_vessel(vessel));
    }

    pub fn delete_vessel(&mut self, vessel: ObjHandle) {
        self.for_each_module(CallbackSlot::DeleteVessel, |m| m.delete_vessel(vessel));
    }

    pub fn vessel_jump(&mut self, vessel: ObjHandle) {
        self.for_each_module(CallbackSlot::VesselJump, |m| m.vessel_jump(vessel));
    }

    pub fn pause(&mut self, paused: bool) {
        self.for_each_module(CallbackSlot::Pause, |m| m.pause(paused));
    }

    /// Returns `true` if a module consumed the event
    pub fn process_mouse(&mut self, event: u32, state: u32, x: u32, y: u32) -> bool {
        self.until_consumed(CallbackSlot::ProcessMouse, |m| {
            m.process_mouse(event, state, x, y)
        })
    }

    /// Returns `true` if a module consumed the keyboard state
    ///
    /// Modules may modify `key_states` in place; the caller sees the result.
    pub fn process_keyboard_immediate(
        &mut self,
        key_states: &mut KeyStateBuffer,
        sim_running: bool,
    ) -> bool {
        self.until_consumed(CallbackSlot::ProcessKeyboardImmediate, |m| {
            m.process_keyboard_immediate(key_states, sim_running)
        })
    }

    /// Returns `true` if a module consumed the key
    pub fn process_keyboard_buffered(
        &mut self,
        key: u32,
        key_states: &mut KeyStateBuffer,
        sim_running: bool,
    ) -> bool {
        self.until_consumed(CallbackSlot::ProcessKeyboardBuffered, |m| {
            m.process_keyboard_buffered(key, key_states, sim_running)
        })
    }
}

impl Drop for Host {
    fn drop(&mut self) {
        self.shutdown();
    }
}
