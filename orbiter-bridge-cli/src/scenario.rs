//! Scenario runner
//!
//! Drives an in-process host through a scripted session:
//! simulation start, initial focus, `steps` frames of scripted events followed
//! by pre/post step, simulation end, and finally module destruction.
//!
//! Each frame advances the clock by `step_size * time_acceleration` seconds
//! unless the session is paused.

use anyhow::{Context, Result};
use orbiter_bridge::{
    Host, HostApi, InstanceHandle, Key, KeyStateBuffer, KeyStates, ModuleCallbacks, ModuleHandle,
    ObjHandle, Object, ObjectCatalog, ObjectKind, ObjectRecord, ObjectTrait, SimClock,
};
use serde::Serialize;
use std::path::Path;
use std::rc::Rc;

use crate::config::{EventAction, ScenarioConfig, ScriptedEvent};
use crate::loader::ModuleLibrary;
use crate::trace::{TraceLog, Tracer};

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Counters collected while running a scenario
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    /// Frames processed, paused or not
    pub frames: u32,
    /// Frames in which the clock advanced
    pub steps_simulated: u32,
    pub events_applied: u32,
    pub events_skipped: u32,
    /// Scripted key and mouse events some module consumed
    pub inputs_consumed: u32,
}

pub struct ScenarioRunner {
    config: ScenarioConfig,
    catalog: Rc<ObjectCatalog>,
    host: Host,
    libraries: Vec<ModuleLibrary>,
    trace: Option<TraceLog>,
    clock: SimClock,
    time_acceleration: f64,
    paused: bool,
    keys: KeyStateBuffer,
    summary: RunSummary,
}

impl ScenarioRunner {
    /// Build the catalog and host, then register the configured modules
    pub fn new(config: ScenarioConfig) -> Result<Self> {
        let catalog = Rc::new(ObjectCatalog::new(config.host.orbiter_version));
        for record in &config.objects {
            catalog.insert(record.clone());
        }
        log::info!("Catalog holds {} object(s)", catalog.object_count());

        let host = Host::new(config.host.clone(), catalog.clone());
        let clock = host.clock();
        let time_acceleration = config.run.time_acceleration;

        let mut runner = Self {
            config,
            catalog,
            host,
            libraries: Vec::new(),
            trace: None,
            clock,
            time_acceleration,
            paused: false,
            keys: [0; 256],
            summary: RunSummary::default(),
        };

        if runner.config.module.trace {
            let (tracer, log) = Tracer::new(runner.config.module.trace_steps);
            runner.register_module(tracer)?;
            runner.trace = Some(log);
        }

        if let Some(path) = runner.config.module.library.clone() {
            runner.load_library(&path)?;
        }

        Ok(runner)
    }

    /// Register a module implemented in this process
    pub fn register_module<M: ModuleCallbacks + 'static>(&mut self, callbacks: M) -> Result<ModuleHandle> {
        let handle = self
            .host
            .register_module(InstanceHandle::NULL, callbacks)
            .context("Failed to register built-in module")?;
        Ok(handle)
    }

    /// Load a module library and let it register its modules
    pub fn load_library(&mut self, path: &Path) -> Result<()> {
        let instance = InstanceHandle::from_raw(self.libraries.len() + 1);
        let library = ModuleLibrary::load(path, &mut self.host, instance)
            .with_context(|| format!("Failed to initialise module library {:?}", path))?;
        self.libraries.push(library);
        Ok(())
    }

    pub fn host(&self) -> &Host {
        &self.host
    }

    pub fn catalog(&self) -> &ObjectCatalog {
        &self.catalog
    }

    pub fn libraries(&self) -> &[ModuleLibrary] {
        &self.libraries
    }

    pub fn trace(&self) -> Option<&TraceLog> {
        self.trace.as_ref()
    }

    pub fn summary(&self) -> &RunSummary {
        &self.summary
    }

    pub fn time_acceleration(&self) -> f64 {
        self.time_acceleration
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Run the whole session
    pub fn run(&mut self) -> Result<RunSummary> {
        let steps = self.config.run.steps;
        log::info!(
            "Running {} step(s) of {} s at x{}",
            steps,
            self.config.run.step_size,
            self.time_acceleration
        );

        self.host.simulation_start(self.config.run.render_mode);

        if let Some(name) = self.config.run.focus.clone() {
            self.change_focus(&name)
                .with_context(|| format!("Failed to set initial focus to '{}'", name))?;
        }

        for step in 1..=steps {
            let events: Vec<ScriptedEvent> = self.config.events_at(step).cloned().collect();
            for event in &events {
                match self.apply(&event.action) {
                    Ok(()) => self.summary.events_applied += 1,
                    Err(e) => {
                        log::warn!("Step {}: skipping {} event: {:#}", step, event.action.name(), e);
                        self.summary.events_skipped += 1;
                    }
                }
            }

            self.summary.frames += 1;
            if self.paused {
                log::trace!("Step {}: paused", step);
                continue;
            }
            self.advance();
            self.summary.steps_simulated += 1;
        }

        self.host.simulation_end();
        log::info!(
            "Session ended at t={:.3} s (MJD {:.6})",
            self.clock.simt,
            self.clock.mjd
        );
        Ok(self.summary.clone())
    }

    /// Destroy all modules, then let libraries run their exit hooks
    pub fn finish(&mut self) {
        self.host.shutdown();
        for library in &mut self.libraries {
            library.exit();
        }
    }

    fn advance(&mut self) {
        let simdt = self.config.run.step_size * self.time_acceleration;
        self.clock = SimClock::new(
            self.clock.simt + simdt,
            simdt,
            self.clock.mjd + simdt / SECONDS_PER_DAY,
        );
        let SimClock { simt, simdt, mjd } = self.clock;
        self.host.pre_step(simt, simdt, mjd);
        self.host.post_step(simt, simdt, mjd);
    }

    fn apply(&mut self, action: &EventAction) -> Result<()> {
        log::debug!("Applying {:?}", action);
        match action {
            EventAction::Pause { paused } => {
                if *paused != self.paused {
                    self.paused = *paused;
                    self.host.pause(*paused);
                }
            }
            EventAction::TimeJump { seconds } => {
                if !seconds.is_finite() {
                    anyhow::bail!("jump of {} s", seconds);
                }
                self.clock = SimClock::new(
                    self.clock.simt + seconds,
                    *seconds,
                    self.clock.mjd + seconds / SECONDS_PER_DAY,
                );
                let SimClock { simt, simdt, mjd } = self.clock;
                self.host.time_jump(simt, simdt, mjd);
            }
            EventAction::Focus { vessel } => self.change_focus(vessel)?,
            EventAction::TimeAcceleration { factor } => {
                if !(factor.is_finite() && *factor > 0.0) {
                    anyhow::bail!("time acceleration must be positive, got {}", factor);
                }
                let old = self.time_acceleration;
                if *factor != old {
                    self.time_acceleration = *factor;
                    self.host.time_acc_changed(*factor, old);
                }
            }
            EventAction::NewVessel {
                name,
                size,
                position,
                velocity,
                empty_mass,
                fuel_mass,
                max_fuel_mass,
            } => {
                if Object::find_by_name(&*self.catalog, name)?.is_some() {
                    anyhow::bail!("an object named '{}' already exists", name);
                }
                let record = ObjectRecord::new(name.clone(), ObjectKind::Vessel)
                    .with_size(*size)
                    .with_state(*position, *velocity)
                    .with_vessel_masses(*empty_mass, *fuel_mass, *max_fuel_mass);
                let handle = self.catalog.insert(record);
                self.host.new_vessel(handle);
            }
            EventAction::DeleteVessel { vessel } => {
                let handle = self.vessel_by_name(vessel)?;
                // Modules see the vessel one last time before it disappears
                self.host.delete_vessel(handle);
                self.catalog.remove(handle);
            }
            EventAction::VesselJump { vessel } => {
                let handle = self.vessel_by_name(vessel)?;
                self.host.vessel_jump(handle);
            }
            EventAction::Key { key, modifiers } => {
                let key = parse_key(key)?;
                let modifiers = modifiers
                    .iter()
                    .map(|m| parse_key(m))
                    .collect::<Result<Vec<_>>>()?;
                if self.press_key(key, &modifiers) {
                    self.summary.inputs_consumed += 1;
                }
            }
            EventAction::Mouse { event, state, x, y } => {
                if self.host.process_mouse(*event, *state, *x, *y) {
                    self.summary.inputs_consumed += 1;
                }
            }
        }
        Ok(())
    }

    /// Deliver a key press as immediate state, then as a buffered key
    ///
    /// Returns `true` if any module consumed either of them.
    fn press_key(&mut self, key: Key, modifiers: &[Key]) -> bool {
        let running = !self.paused;
        {
            let mut states = KeyStates::new(&mut self.keys);
            for modifier in modifiers {
                states.set_down(*modifier, true);
            }
            states.set_down(key, true);
        }

        let immediate = self.host.process_keyboard_immediate(&mut self.keys, running);
        let buffered = self
            .host
            .process_keyboard_buffered(key.code(), &mut self.keys, running);

        let states = KeyStates::new(&mut self.keys);
        let still_down: Vec<Key> = states.pressed().collect();
        if !still_down.is_empty() {
            log::trace!("Keys left down by modules: {:?}", still_down);
        }
        self.keys = [0; 256];
        immediate || buffered
    }

    fn change_focus(&mut self, name: &str) -> Result<()> {
        let handle = self.vessel_by_name(name)?;
        let old = self.catalog.focus_object();
        if old == handle {
            log::debug!("'{}' already has focus", name);
            return Ok(());
        }
        self.catalog.set_focus_object(handle);
        self.host.focus_changed(handle, old);
        Ok(())
    }

    fn vessel_by_name(&self, name: &str) -> Result<ObjHandle> {
        match Object::find_by_name(&*self.catalog, name)? {
            Some(Object::Vessel(vessel)) => Ok(vessel.handle()),
            Some(other) => anyhow::bail!("'{}' is a {:?}, not a vessel", name, other.kind()),
            None => anyhow::bail!("no object named '{}'", name),
        }
    }
}

impl Drop for ScenarioRunner {
    fn drop(&mut self) {
        // Bridges must be gone before the libraries they point into
        self.finish();
    }
}

fn parse_key(name: &str) -> Result<Key> {
    Key::from_name(name).with_context(|| format!("unknown key '{}'", name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use orbiter_bridge::{CallbackSlot, HostConfig, ObjectRecord, RenderMode, Vector3, Vessel};
    use std::cell::RefCell;

    fn scenario(events: &str) -> ScenarioConfig {
        let text = format!(
            r#"
            [run]
            steps = 4
            step_size = 1.0

            [[objects]]
            name = "Earth"
            kind = "planet"
            mass = 5.97e24

            [[objects]]
            name = "GL-01"
            kind = "vessel"
            empty_mass = 1000.0
            fuel_mass = 250.0

            [[objects]]
            name = "GL-02"
            kind = "vessel"
            {}
            "#,
            events
        );
        toml::from_str(&text).unwrap()
    }

    /// Consumes the P key and clears it from the state buffer
    struct Autopilot {
        log: Rc<RefCell<Vec<String>>>,
    }

    impl ModuleCallbacks for Autopilot {
        fn on_process_keyboard_buffered(
            &mut self,
            _module: &ModuleHandle,
            key: Key,
            key_states: &mut KeyStates<'_>,
            _sim_running: bool,
        ) -> bool {
            self.log.borrow_mut().push(format!("key {}", key));
            if key == Key::P {
                key_states.reset(Key::P);
                return true;
            }
            false
        }

        fn on_focus_changed(&mut self, module: &ModuleHandle, new_focus: Vessel, old_focus: Option<Vessel>) {
            let api = module.api();
            self.log.borrow_mut().push(format!(
                "focus {} from {:?}",
                new_focus.name(api),
                old_focus.map(|v| v.name(api))
            ));
        }

        fn on_destroy(&mut self, _module: &ModuleHandle) {
            self.log.borrow_mut().push("destroy".to_string());
        }
    }

    #[test]
    fn test_clock_advances_each_step() {
        let mut config = scenario("");
        config.host = HostConfig::default().with_start_mjd(59000.0);
        let mut runner = ScenarioRunner::new(config).unwrap();

        let summary = runner.run().unwrap();
        assert_eq!(summary.frames, 4);
        assert_eq!(summary.steps_simulated, 4);

        let clock = runner.host().clock();
        assert_eq!(clock.simt, 4.0);
        assert_eq!(clock.simdt, 1.0);
        assert!((clock.mjd - (59000.0 + 4.0 / 86_400.0)).abs() < 1e-9);

        let stats = runner.host().stats();
        assert_eq!(stats.count(CallbackSlot::SimulationStart), 1);
        assert_eq!(stats.count(CallbackSlot::PreStep), 4);
        assert_eq!(stats.count(CallbackSlot::PostStep), 4);
        assert_eq!(stats.count(CallbackSlot::SimulationEnd), 1);
    }

    #[test]
    fn test_pause_and_time_acceleration() {
        let mut runner = ScenarioRunner::new(scenario(
            r#"
            [[events]]
            step = 2
            action = "time_acceleration"
            factor = 10.0

            [[events]]
            step = 3
            action = "pause"
            paused = true
            "#,
        ))
        .unwrap();

        let summary = runner.run().unwrap();
        assert_eq!(summary.frames, 4);
        assert_eq!(summary.steps_simulated, 2);
        assert_eq!(summary.events_applied, 2);

        // 1 s at x1, then 10 s at x10, then paused
        assert_eq!(runner.host().clock().simt, 11.0);
        assert_eq!(runner.time_acceleration(), 10.0);
        assert!(runner.is_paused());
        assert_eq!(runner.host().stats().count(CallbackSlot::Pause), 1);
        assert_eq!(runner.host().stats().count(CallbackSlot::TimeAccChanged), 1);
    }

    #[test]
    fn test_time_jump_moves_clock() {
        let mut runner = ScenarioRunner::new(scenario(
            r#"
            [[events]]
            step = 2
            action = "time_jump"
            seconds = 86400.0
            "#,
        ))
        .unwrap();
        let start_mjd = runner.host().clock().mjd;

        runner.run().unwrap();
        let clock = runner.host().clock();
        assert_eq!(clock.simt, 86_404.0);
        assert!((clock.mjd - (start_mjd + 1.0 + 4.0 / 86_400.0)).abs() < 1e-9);
        assert_eq!(runner.host().stats().count(CallbackSlot::TimeJump), 1);
    }

    #[test]
    fn test_vessel_lifecycle_events() {
        let mut runner = ScenarioRunner::new(scenario(
            r#"
            [[events]]
            step = 1
            action = "new_vessel"
            name = "Probe"
            empty_mass = 50.0
            position = { x = 1.0, y = 2.0, z = 3.0 }

            [[events]]
            step = 2
            action = "vessel_jump"
            vessel = "Probe"

            [[events]]
            step = 3
            action = "delete_vessel"
            vessel = "Probe"

            [[events]]
            step = 4
            action = "vessel_jump"
            vessel = "Earth"
            "#,
        ))
        .unwrap();

        let summary = runner.run().unwrap();
        assert_eq!(summary.events_applied, 3);
        assert_eq!(summary.events_skipped, 1);
        assert!(runner.catalog().object_by_name("Probe").is_null());

        let stats = runner.host().stats();
        assert_eq!(stats.count(CallbackSlot::NewVessel), 1);
        assert_eq!(stats.count(CallbackSlot::VesselJump), 1);
        assert_eq!(stats.count(CallbackSlot::DeleteVessel), 1);

        let trace = runner.trace().unwrap().borrow();
        let new_vessel = trace
            .iter()
            .find(|e| e.event == CallbackSlot::NewVessel)
            .unwrap();
        assert_eq!(new_vessel.detail, "Probe (50 kg)");
    }

    #[test]
    fn test_focus_changes_reach_modules() {
        let mut config = scenario(
            r#"
            [[events]]
            step = 2
            action = "focus"
            vessel = "GL-02"

            [[events]]
            step = 3
            action = "focus"
            vessel = "GL-02"

            [[events]]
            step = 3
            action = "focus"
            vessel = "Earth"
            "#,
        );
        config.run.focus = Some("GL-01".to_string());
        config.module.trace = false;

        let log = Rc::new(RefCell::new(Vec::new()));
        let mut runner = ScenarioRunner::new(config).unwrap();
        runner
            .register_module(Autopilot { log: Rc::clone(&log) })
            .unwrap();

        let summary = runner.run().unwrap();
        assert_eq!(summary.events_applied, 2);
        assert_eq!(summary.events_skipped, 1);
        assert_eq!(
            *log.borrow(),
            vec![
                "focus GL-01 from None".to_string(),
                "focus GL-02 from Some(\"GL-01\")".to_string(),
            ]
        );
        let focus = runner.catalog().focus_object();
        assert_eq!(runner.catalog().object_name(focus).as_deref(), Some("GL-02"));
    }

    #[test]
    fn test_scripted_input_consumption() {
        let mut config = scenario(
            r#"
            [[events]]
            step = 1
            action = "key"
            key = "P"
            modifiers = ["LCONTROL"]

            [[events]]
            step = 2
            action = "key"
            key = "Q"

            [[events]]
            step = 2
            action = "key"
            key = "NOT_A_KEY"

            [[events]]
            step = 3
            action = "mouse"
            event = 0x201
            x = 5
            y = 6
            "#,
        );
        config.module.trace = false;

        let log = Rc::new(RefCell::new(Vec::new()));
        let mut runner = ScenarioRunner::new(config).unwrap();
        runner
            .register_module(Autopilot { log: Rc::clone(&log) })
            .unwrap();

        let summary = runner.run().unwrap();
        assert_eq!(summary.inputs_consumed, 1);
        assert_eq!(summary.events_applied, 3);
        assert_eq!(summary.events_skipped, 1);
        assert_eq!(*log.borrow(), vec!["key P", "key Q"]);

        let stats = runner.host().stats();
        assert_eq!(stats.count(CallbackSlot::ProcessKeyboardImmediate), 2);
        assert_eq!(stats.count(CallbackSlot::ProcessKeyboardBuffered), 2);
        assert_eq!(stats.count(CallbackSlot::ProcessMouse), 1);
    }

    #[test]
    fn test_unknown_initial_focus_fails_run() {
        let mut config = scenario("");
        config.run.focus = Some("Nobody".to_string());
        let mut runner = ScenarioRunner::new(config).unwrap();

        let err = runner.run().unwrap_err();
        assert!(format!("{:#}", err).contains("no object named 'Nobody'"));
    }

    #[test]
    fn test_finish_destroys_modules_once() {
        let mut config = scenario("");
        config.module.trace = false;
        config.objects.push(
            ObjectRecord::new("Sun", ObjectKind::Star).with_state(Vector3::ZERO, Vector3::ZERO),
        );

        let log = Rc::new(RefCell::new(Vec::new()));
        let mut runner = ScenarioRunner::new(config).unwrap();
        runner
            .register_module(Autopilot { log: Rc::clone(&log) })
            .unwrap();
        runner.host.simulation_start(RenderMode::None);

        runner.finish();
        runner.finish();
        assert_eq!(runner.host().module_count(), 0);
        assert_eq!(runner.host().stats().count(CallbackSlot::Destroy), 1);

        drop(runner);
        assert_eq!(*log.borrow(), vec!["destroy"]);
    }

    #[test]
    fn test_missing_library_is_an_error() {
        let mut config = scenario("");
        config.module.library = Some("/nonexistent/libmodule.so".into());

        let err = ScenarioRunner::new(config).err().unwrap();
        assert!(format!("{:#}", err).contains("Failed to initialise module library"));
    }
}
