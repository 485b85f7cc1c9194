//! Sample module library
//!
//! Build it as a `cdylib` and load it with
//! `orbiter-bridge --module target/debug/libtelemetry_module.so`.
//! It shows the focus vessel's distance to a reference body in the debug
//! line and echoes mouse and keyboard input.

use orbiter_bridge::{
    debug_string, declare_module, HostApi, Key, KeyStates, ModuleCallbacks, ModuleHandle,
    MouseEvent, Object, ObjectTrait, RenderMode, Vessel,
};

/// Body distances are measured from
const REFERENCE_BODY: &str = "Earth";

#[derive(Default)]
pub struct Telemetry {
    steps: u64,
}

impl ModuleCallbacks for Telemetry {
    fn on_simulation_start(&mut self, module: &ModuleHandle, render_mode: RenderMode) {
        let api = module.api();
        log::info!(
            "Telemetry: host version {}, module version {}, {:?}",
            api.orbiter_version(),
            module.version(),
            render_mode
        );
        for object in Object::all(api) {
            log::info!("Telemetry: {}", object.display(api));
        }
    }

    fn on_pre_step(&mut self, module: &ModuleHandle, simt: f64, _simdt: f64, _mjd: f64) {
        self.steps += 1;
        let api = module.api();
        let Some(vessel) = Vessel::focus(api) else {
            return;
        };

        match Object::find_by_name(api, REFERENCE_BODY) {
            Ok(Some(body)) => {
                let distance = vessel.relative_position(api, &body).norm();
                debug_string!(
                    api,
                    "{}: {:.1} km from {} at t={:.1}s",
                    vessel.name(api),
                    distance / 1000.0,
                    REFERENCE_BODY,
                    simt
                );
            }
            Ok(None) => debug_string!(api, "{}: no {} in this session", vessel.name(api), REFERENCE_BODY),
            Err(e) => log::warn!("Telemetry: {}", e),
        }
    }

    fn on_focus_changed(&mut self, module: &ModuleHandle, new_focus: Vessel, _old_focus: Option<Vessel>) {
        let api = module.api();
        debug_string!(
            api,
            "Focus is now on {}. Size: {}m. Mass: {}kg",
            new_focus.name(api),
            new_focus.size(api),
            new_focus.mass(api)
        );
    }

    fn on_pause(&mut self, module: &ModuleHandle, paused: bool) {
        debug_string!(
            module.api(),
            "Simulation is paused: {}. Current time: {}",
            paused,
            module.sim_time()
        );
    }

    fn on_process_mouse(&mut self, module: &ModuleHandle, event: MouseEvent) -> bool {
        debug_string!(module.api(), "Mouse event: {:?}", event);
        false
    }

    fn on_process_keyboard_buffered(
        &mut self,
        module: &ModuleHandle,
        key: Key,
        key_states: &mut KeyStates<'_>,
        _sim_running: bool,
    ) -> bool {
        debug_string!(module.api(), "Pressed key: {} (ctrl: {})", key, key_states.control());
        false
    }

    fn on_destroy(&mut self, _module: &ModuleHandle) {
        log::info!("Telemetry: destroyed after {} step(s)", self.steps);
    }
}

declare_module!(
    fn init(registrar) {
        log::info!("Telemetry: registering module");
        registrar.register_module(Telemetry::default())?;
        Ok(())
    }

    fn exit(_instance) {
        log::info!("Telemetry: goodbye");
    }
);
