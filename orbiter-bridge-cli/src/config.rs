//! Scenario configuration
//!
//! A scenario is a TOML file describing the simulated session: host versions,
//! how many steps to run, which module library to load, the objects in the
//! catalog and a script of events keyed by step number.

use anyhow::{Context, Result};
use orbiter_bridge::{HostConfig, ObjectRecord, RenderMode, Vector3};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main scenario structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ScenarioConfig {
    #[serde(default)]
    pub host: HostConfig,

    #[serde(default)]
    pub run: RunConfig,

    #[serde(default)]
    pub module: ModuleConfig,

    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub objects: Vec<ObjectRecord>,

    #[serde(default)]
    pub events: Vec<ScriptedEvent>,
}

/// Clock and session settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RunConfig {
    /// Number of time steps to simulate
    #[serde(default = "default_steps")]
    pub steps: u32,

    /// Real-time length of one step (seconds)
    #[serde(default = "default_step_size")]
    pub step_size: f64,

    /// Initial time acceleration factor
    #[serde(default = "default_time_acceleration")]
    pub time_acceleration: f64,

    #[serde(default = "default_render_mode")]
    pub render_mode: RenderMode,

    /// Vessel that has input focus when the session starts
    #[serde(default)]
    pub focus: Option<String>,
}

fn default_steps() -> u32 {
    10
}

fn default_step_size() -> f64 {
    0.1
}

fn default_time_acceleration() -> f64 {
    1.0
}

fn default_render_mode() -> RenderMode {
    RenderMode::Window
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            steps: default_steps(),
            step_size: default_step_size(),
            time_acceleration: default_time_acceleration(),
            render_mode: default_render_mode(),
            focus: None,
        }
    }
}

/// Modules taking part in the session
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModuleConfig {
    /// Module library to load (`.so`, `.dll`, `.dylib`)
    #[serde(default)]
    pub library: Option<PathBuf>,

    /// Also register the built-in tracing module
    #[serde(default = "default_true")]
    pub trace: bool,

    /// Trace every step instead of only the first
    #[serde(default)]
    pub trace_steps: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            library: None,
            trace: true,
            trace_steps: false,
        }
    }
}

/// Report settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,

    /// Report file; stdout if unset
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Txt,
    Json,
}

impl OutputFormat {
    /// Guess the format from a report file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()?.to_ascii_lowercase().as_str() {
            "json" => Some(OutputFormat::Json),
            "txt" | "log" => Some(OutputFormat::Txt),
            _ => None,
        }
    }
}

/// An action applied before the given step is simulated
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ScriptedEvent {
    pub step: u32,

    #[serde(flatten)]
    pub action: EventAction,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum EventAction {
    Pause {
        paused: bool,
    },
    /// Discontinuous jump of the simulation clock by `seconds`
    TimeJump {
        seconds: f64,
    },
    Focus {
        vessel: String,
    },
    TimeAcceleration {
        factor: f64,
    },
    NewVessel {
        name: String,
        #[serde(default)]
        size: f64,
        #[serde(default)]
        position: Vector3,
        #[serde(default)]
        velocity: Vector3,
        #[serde(default)]
        empty_mass: f64,
        #[serde(default)]
        fuel_mass: f64,
        #[serde(default)]
        max_fuel_mass: f64,
    },
    DeleteVessel {
        vessel: String,
    },
    VesselJump {
        vessel: String,
    },
    /// Key press, delivered as immediate state and as a buffered key
    Key {
        key: String,
        #[serde(default)]
        modifiers: Vec<String>,
    },
    /// Raw Win32 mouse message, e.g. `event = 0x201` for a left click
    Mouse {
        event: u32,
        #[serde(default)]
        state: u32,
        #[serde(default)]
        x: u32,
        #[serde(default)]
        y: u32,
    },
}

impl EventAction {
    /// Short name used in logs and reports
    pub fn name(&self) -> &'static str {
        match self {
            EventAction::Pause { .. } => "pause",
            EventAction::TimeJump { .. } => "time_jump",
            EventAction::Focus { .. } => "focus",
            EventAction::TimeAcceleration { .. } => "time_acceleration",
            EventAction::NewVessel { .. } => "new_vessel",
            EventAction::DeleteVessel { .. } => "delete_vessel",
            EventAction::VesselJump { .. } => "vessel_jump",
            EventAction::Key { .. } => "key",
            EventAction::Mouse { .. } => "mouse",
        }
    }
}

impl ScenarioConfig {
    /// Scripted events for one step, in file order
    pub fn events_at(&self, step: u32) -> impl Iterator<Item = &ScriptedEvent> {
        self.events.iter().filter(move |e| e.step == step)
    }

    /// Check settings the runner cannot recover from
    pub fn validate(&self) -> Result<()> {
        if !(self.run.step_size.is_finite() && self.run.step_size > 0.0) {
            anyhow::bail!("run.step_size must be positive, got {}", self.run.step_size);
        }
        if !(self.run.time_acceleration.is_finite() && self.run.time_acceleration > 0.0) {
            anyhow::bail!(
                "run.time_acceleration must be positive, got {}",
                self.run.time_acceleration
            );
        }
        for event in &self.events {
            if event.step == 0 || event.step > self.run.steps {
                log::warn!(
                    "Event '{}' at step {} is outside 1..={} and will never fire",
                    event.action.name(),
                    event.step,
                    self.run.steps
                );
            }
        }
        Ok(())
    }
}

/// Load a scenario from a TOML file
pub fn load_config(path: &Path) -> Result<ScenarioConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read scenario file: {:?}", path))?;

    let config: ScenarioConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse scenario file: {:?}", path))?;

    config.validate()?;
    Ok(config)
}
