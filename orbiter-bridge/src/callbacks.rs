//! Callback table supplied by the foreign side
//!
//! A module written outside the host's language implements the host's module
//! interface by handing over one function pointer per event plus an opaque
//! context pointer. The bridge calls slot `N` whenever the host calls virtual
//! method `N`, passing the context first.
//!
//! Two layouts exist with the same field order:
//! - [`RawCallbackTable`]: what C callers fill in. Every slot is nullable.
//! - [`CallbackTable`]: what the bridge stores. Every slot is a non-null
//!   function pointer, so an incomplete table cannot be constructed. The only
//!   way from the raw layout to this one is [`CallbackTable::try_from`].

use serde::Serialize;
use std::fmt;
use std::os::raw::{c_char, c_int, c_void};

use crate::types::{BridgeError, ObjHandle, Result};

pub type SimulationStartFn = extern "C" fn(ctx: *mut c_void, render_mode: c_int);
pub type SimulationEndFn = extern "C" fn(ctx: *mut c_void);
pub type StepFn = extern "C" fn(ctx: *mut c_void, simt: f64, simdt: f64, mjd: f64);
pub type FocusChangedFn =
    extern "C" fn(ctx: *mut c_void, new_focus: ObjHandle, old_focus: ObjHandle);
pub type TimeAccChangedFn = extern "C" fn(ctx: *mut c_void, new_warp: f64, old_warp: f64);
pub type VesselFn = extern "C" fn(ctx: *mut c_void, vessel: ObjHandle);
pub type PauseFn = extern "C" fn(ctx: *mut c_void, paused: bool);
pub type ProcessMouseFn =
    extern "C" fn(ctx: *mut c_void, event: u32, state: u32, x: u32, y: u32) -> bool;
pub type KeyboardImmediateFn =
    extern "C" fn(ctx: *mut c_void, kstate: *mut c_char, sim_running: bool) -> bool;
pub type KeyboardBufferedFn =
    extern "C" fn(ctx: *mut c_void, key: u32, kstate: *mut c_char, sim_running: bool) -> bool;
pub type DestroyFn = extern "C" fn(ctx: *mut c_void) -> bool;

/// Complete callback table, one non-null function pointer per slot
#[repr(C)]
#[derive(Clone, Copy)]
pub struct CallbackTable {
    pub simulation_start: SimulationStartFn,
    pub simulation_end: SimulationEndFn,
    pub pre_step: StepFn,
    pub post_step: StepFn,
    pub time_jump: StepFn,
    pub focus_changed: FocusChangedFn,
    pub time_acc_changed: TimeAccChangedFn,
    pub new_vessel: VesselFn,
    pub delete_vessel: VesselFn,
    pub vessel_jump: VesselFn,
    pub pause: PauseFn,
    pub process_mouse: ProcessMouseFn,
    pub process_keyboard_immediate: KeyboardImmediateFn,
    pub process_keyboard_buffered: KeyboardBufferedFn,
    pub destroy: DestroyFn,
}

impl fmt::Debug for CallbackTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackTable")
            .field("simulation_start", &(self.simulation_start as *const ()))
            .field("pre_step", &(self.pre_step as *const ()))
            .field("destroy", &(self.destroy as *const ()))
            .finish_non_exhaustive()
    }
}

/// Callback table as laid out by C callers
///
/// `Option<extern "C" fn>` has the same representation as a nullable function
/// pointer, so a C struct of function pointers maps onto this one directly.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct RawCallbackTable {
    pub simulation_start: Option<SimulationStartFn>,
    pub simulation_end: Option<SimulationEndFn>,
    pub pre_step: Option<StepFn>,
    pub post_step: Option<StepFn>,
    pub time_jump: Option<StepFn>,
    pub focus_changed: Option<FocusChangedFn>,
    pub time_acc_changed: Option<TimeAccChangedFn>,
    pub new_vessel: Option<VesselFn>,
    pub delete_vessel: Option<VesselFn>,
    pub vessel_jump: Option<VesselFn>,
    pub pause: Option<PauseFn>,
    pub process_mouse: Option<ProcessMouseFn>,
    pub process_keyboard_immediate: Option<KeyboardImmediateFn>,
    pub process_keyboard_buffered: Option<KeyboardBufferedFn>,
    pub destroy: Option<DestroyFn>,
}

impl RawCallbackTable {
    /// Slots that are still null, in table order
    pub fn missing_slots(&self) -> Vec<CallbackSlot> {
        let populated = [
            self.simulation_start.is_some(),
            self.simulation_end.is_some(),
            self.pre_step.is_some(),
            self.post_step.is_some(),
            self.time_jump.is_some(),
            self.focus_changed.is_some(),
            self.time_acc_changed.is_some(),
            self.new_vessel.is_some(),
            self.delete_vessel.is_some(),
            self.vessel_jump.is_some(),
            self.pause.is_some(),
            self.process_mouse.is_some(),
            self.process_keyboard_immediate.is_some(),
            self.process_keyboard_buffered.is_some(),
            self.destroy.is_some(),
        ];

        CallbackSlot::ALL
            .iter()
            .zip(populated)
            .filter(|(_, present)| !present)
            .map(|(slot, _)| *slot)
            .collect()
    }
}

impl From<CallbackTable> for RawCallbackTable {
    fn from(table: CallbackTable) -> Self {
        Self {
            simulation_start: Some(table.simulation_start),
            simulation_end: Some(table.simulation_end),
            pre_step: Some(table.pre_step),
            post_step: Some(table.post_step),
            time_jump: Some(table.time_jump),
            focus_changed: Some(table.focus_changed),
            time_acc_changed: Some(table.time_acc_changed),
            new_vessel: Some(table.new_vessel),
            delete_vessel: Some(table.delete_vessel),
            vessel_jump: Some(table.vessel_jump),
            pause: Some(table.pause),
            process_mouse: Some(table.process_mouse),
            process_keyboard_immediate: Some(table.process_keyboard_immediate),
            process_keyboard_buffered: Some(table.process_keyboard_buffered),
            destroy: Some(table.destroy),
        }
    }
}

impl TryFrom<RawCallbackTable> for CallbackTable {
    type Error = BridgeError;

    fn try_from(raw: RawCallbackTable) -> Result<Self> {
        match raw {
            RawCallbackTable {
                simulation_start: Some(simulation_start),
                simulation_end: Some(simulation_end),
                pre_step: Some(pre_step),
                post_step: Some(post_step),
                time_jump: Some(time_jump),
                focus_changed: Some(focus_changed),
                time_acc_changed: Some(time_acc_changed),
                new_vessel: Some(new_vessel),
                delete_vessel: Some(delete_vessel),
                vessel_jump: Some(vessel_jump),
                pause: Some(pause),
                process_mouse: Some(process_mouse),
                process_keyboard_immediate: Some(process_keyboard_immediate),
                process_keyboard_buffered: Some(process_keyboard_buffered),
                destroy: Some(destroy),
            } => Ok(CallbackTable {
                simulation_start,
                simulation_end,
                pre_step,
                post_step,
                time_jump,
                focus_changed,
                time_acc_changed,
                new_vessel,
                delete_vessel,
                vessel_jump,
                pause,
                process_mouse,
                process_keyboard_immediate,
                process_keyboard_buffered,
                destroy,
            }),
            _ => Err(BridgeError::IncompleteCallbackTable {
                missing: raw.missing_slots(),
            }),
        }
    }
}

/// Names of the callback table slots, in table order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallbackSlot {
    SimulationStart,
    SimulationEnd,
    PreStep,
    PostStep,
    TimeJump,
    FocusChanged,
    TimeAccChanged,
    NewVessel,
    DeleteVessel,
    VesselJump,
    Pause,
    ProcessMouse,
    ProcessKeyboardImmediate,
    ProcessKeyboardBuffered,
    Destroy,
}

impl CallbackSlot {
    pub const ALL: [CallbackSlot; 15] = [
        CallbackSlot::SimulationStart,
        CallbackSlot::SimulationEnd,
        CallbackSlot::PreStep,
        CallbackSlot::PostStep,
        CallbackSlot::TimeJump,
        CallbackSlot::FocusChanged,
        CallbackSlot::TimeAccChanged,
        CallbackSlot::NewVessel,
        CallbackSlot::DeleteVessel,
        CallbackSlot::VesselJump,
        CallbackSlot::Pause,
        CallbackSlot::ProcessMouse,
        CallbackSlot::ProcessKeyboardImmediate,
        CallbackSlot::ProcessKeyboardBuffered,
        CallbackSlot::Destroy,
    ];

    pub fn name(self) -> &'static str {
        match self {
            CallbackSlot::SimulationStart => "simulation_start",
            CallbackSlot::SimulationEnd => "simulation_end",
            CallbackSlot::PreStep => "pre_step",
            CallbackSlot::PostStep => "post_step",
            CallbackSlot::TimeJump => "time_jump",
            CallbackSlot::FocusChanged => "focus_changed",
            CallbackSlot::TimeAccChanged => "time_acc_changed",
            CallbackSlot::NewVessel => "new_vessel",
            CallbackSlot::DeleteVessel => "delete_vessel",
            CallbackSlot::VesselJump => "vessel_jump",
            CallbackSlot::Pause => "pause",
            CallbackSlot::ProcessMouse => "process_mouse",
            CallbackSlot::ProcessKeyboardImmediate => "process_keyboard_immediate",
            CallbackSlot::ProcessKeyboardBuffered => "process_keyboard_buffered",
            CallbackSlot::Destroy => "destroy",
        }
    }

    /// True for the fourteen host events (everything but `destroy`)
    pub fn is_event(self) -> bool {
        self != CallbackSlot::Destroy
    }

    pub(crate) fn join(slots: &[CallbackSlot]) -> String {
        slots
            .iter()
            .map(|slot| slot.name())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for CallbackSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}
