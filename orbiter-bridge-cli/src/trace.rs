//! Built-in tracing module
//!
//! Registers through the typed module API like any third-party module and
//! writes down every event it sees together with the published clock.

use orbiter_bridge::{
    CallbackSlot, HostApi, Key, KeyStates, ModuleCallbacks, ModuleHandle, MouseEvent, Object,
    ObjectTrait, RenderMode, Vessel,
};
use serde::Serialize;
use std::cell::RefCell;
use std::rc::Rc;

/// One observed event
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceEntry {
    /// Simulation time published when the event arrived
    pub simt: f64,
    pub event: CallbackSlot,
    pub detail: String,
}

/// Shared view of the entries recorded by a [`Tracer`]
pub type TraceLog = Rc<RefCell<Vec<TraceEntry>>>;

pub struct Tracer {
    log: TraceLog,
    /// Record every pre/post step instead of only the first of each
    verbose_steps: bool,
    steps_seen: u64,
}

impl Tracer {
    pub fn new(verbose_steps: bool) -> (Self, TraceLog) {
        let log = TraceLog::default();
        let tracer = Self {
            log: Rc::clone(&log),
            verbose_steps,
            steps_seen: 0,
        };
        (tracer, log)
    }

    fn record(&self, module: &ModuleHandle, event: CallbackSlot, detail: String) {
        log::debug!("[trace] t={:.3} {} {}", module.sim_time(), event, detail);
        self.log.borrow_mut().push(TraceEntry {
            simt: module.sim_time(),
            event,
            detail,
        });
    }

    fn vessel_label(api: &dyn HostApi, vessel: Vessel) -> String {
        format!("{} ({:.0} kg)", vessel.name(api), vessel.mass(api))
    }
}

impl ModuleCallbacks for Tracer {
    fn on_simulation_start(&mut self, module: &ModuleHandle, render_mode: RenderMode) {
        let api = module.api();
        let objects = Object::all(api);
        for object in &objects {
            log::info!("[trace] {}", object.display(api));
        }
        self.record(
            module,
            CallbackSlot::SimulationStart,
            format!("{:?}, {} object(s)", render_mode, objects.len()),
        );
    }

    fn on_simulation_end(&mut self, module: &ModuleHandle) {
        self.record(
            module,
            CallbackSlot::SimulationEnd,
            format!("after {} step(s)", self.steps_seen),
        );
    }

    fn on_pre_step(&mut self, module: &ModuleHandle, simt: f64, simdt: f64, mjd: f64) {
        if self.verbose_steps || self.steps_seen == 0 {
            self.record(
                module,
                CallbackSlot::PreStep,
                format!("simt={:.3} simdt={:.3} mjd={:.6}", simt, simdt, mjd),
            );
        }
    }

    fn on_post_step(&mut self, module: &ModuleHandle, simt: f64, simdt: f64, mjd: f64) {
        if self.verbose_steps || self.steps_seen == 0 {
            self.record(
                module,
                CallbackSlot::PostStep,
                format!("simt={:.3} simdt={:.3} mjd={:.6}", simt, simdt, mjd),
            );
        }
        self.steps_seen += 1;

        let api = module.api();
        match Vessel::focus(api) {
            Some(vessel) => orbiter_bridge::debug_string!(
                api,
                "{} | t={:.1}s | mass {:.0} kg | fuel {:.0}/{:.0} kg",
                vessel.name(api),
                simt,
                vessel.mass(api),
                vessel.fuel_mass(api),
                vessel.max_fuel_mass(api)
            ),
            None => orbiter_bridge::debug_string!(api, "t={:.1}s | MJD {:.4}", simt, mjd),
        }
    }

    fn on_time_jump(&mut self, module: &ModuleHandle, simt: f64, simdt: f64, mjd: f64) {
        self.record(
            module,
            CallbackSlot::TimeJump,
            format!("simt={:.3} jump={:.3} mjd={:.6}", simt, simdt, mjd),
        );
    }

    fn on_focus_changed(&mut self, module: &ModuleHandle, new_focus: Vessel, old_focus: Option<Vessel>) {
        let api = module.api();
        let old = old_focus
            .map(|v| Self::vessel_label(api, v))
            .unwrap_or_else(|| "none".to_string());
        self.record(
            module,
            CallbackSlot::FocusChanged,
            format!("{} -> {}", old, Self::vessel_label(api, new_focus)),
        );
    }

    fn on_time_acc_changed(&mut self, module: &ModuleHandle, new_warp: f64, old_warp: f64) {
        self.record(
            module,
            CallbackSlot::TimeAccChanged,
            format!("x{} -> x{}", old_warp, new_warp),
        );
    }

    fn on_new_vessel(&mut self, module: &ModuleHandle, vessel: Vessel) {
        let detail = Self::vessel_label(module.api(), vessel);
        self.record(module, CallbackSlot::NewVessel, detail);
    }

    fn on_delete_vessel(&mut self, module: &ModuleHandle, vessel: Vessel) {
        let detail = Self::vessel_label(module.api(), vessel);
        self.record(module, CallbackSlot::DeleteVessel, detail);
    }

    fn on_vessel_jump(&mut self, module: &ModuleHandle, vessel: Vessel) {
        let detail = Self::vessel_label(module.api(), vessel);
        self.record(module, CallbackSlot::VesselJump, detail);
    }

    fn on_pause(&mut self, module: &ModuleHandle, paused: bool) {
        let detail = if paused { "paused" } else { "resumed" };
        self.record(module, CallbackSlot::Pause, detail.to_string());
    }

    fn on_process_mouse(&mut self, module: &ModuleHandle, event: MouseEvent) -> bool {
        self.record(
            module,
            CallbackSlot::ProcessMouse,
            format!("{:?} at ({}, {})", event.kind, event.x, event.y),
        );
        false
    }

    fn on_process_keyboard_immediate(
        &mut self,
        module: &ModuleHandle,
        key_states: &mut KeyStates<'_>,
        sim_running: bool,
    ) -> bool {
        self.record(
            module,
            CallbackSlot::ProcessKeyboardImmediate,
            format!("{:?} running={}", key_states, sim_running),
        );
        false
    }

    fn on_process_keyboard_buffered(
        &mut self,
        module: &ModuleHandle,
        key: Key,
        key_states: &mut KeyStates<'_>,
        _sim_running: bool,
    ) -> bool {
        let mut chord = Vec::new();
        if key_states.control() {
            chord.push("Ctrl");
        }
        if key_states.shift() {
            chord.push("Shift");
        }
        if key_states.alt() {
            chord.push("Alt");
        }
        let key_name = key.to_string();
        chord.push(&key_name);
        self.record(module, CallbackSlot::ProcessKeyboardBuffered, chord.join("+"));
        false
    }

    fn on_destroy(&mut self, module: &ModuleHandle) {
        self.record(module, CallbackSlot::Destroy, format!("{}", module.id()));
    }
}
