//! Core types shared by the bridge, the host model and the C ABI
//!
//! Everything here that crosses the C boundary is either a scalar, a
//! pointer-sized handle or a fixed-size `#[repr(C)]` struct. Handles use `0`
//! as the host's "not found" sentinel.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::os::raw::c_int;

use crate::callbacks::CallbackSlot;

/// Result type for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Handle to a simulation object (star, planet, vessel, surface base)
///
/// Pointer-sized so it matches the host's `OBJHANDLE` at the C boundary.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct ObjHandle(usize);

impl ObjHandle {
    /// The "not found" sentinel
    pub const NULL: ObjHandle = ObjHandle(0);

    pub const fn from_raw(raw: usize) -> Self {
        Self(raw)
    }

    pub const fn into_raw(self) -> usize {
        self.0
    }

    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// `None` for the null sentinel
    pub fn non_null(self) -> Option<Self> {
        if self.is_null() {
            None
        } else {
            Some(self)
        }
    }
}

impl fmt::Display for ObjHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "obj#{:X}", self.0)
    }
}

/// Handle of the module library instance (`HINSTANCE` on the host side)
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct InstanceHandle(usize);

impl InstanceHandle {
    pub const NULL: InstanceHandle = InstanceHandle(0);

    pub const fn from_raw(raw: usize) -> Self {
        Self(raw)
    }

    pub const fn into_raw(self) -> usize {
        self.0
    }

    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

/// Three-component double vector, copied by value across the boundary
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3 {
    pub const ZERO: Vector3 = Vector3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Euclidean length
    pub fn norm(&self) -> f64 {
        nalgebra::Vector3::<f64>::from(*self).norm()
    }
}

impl From<Vector3> for nalgebra::Vector3<f64> {
    fn from(v: Vector3) -> Self {
        nalgebra::Vector3::new(v.x, v.y, v.z)
    }
}

impl From<nalgebra::Vector3<f64>> for Vector3 {
    fn from(v: nalgebra::Vector3<f64>) -> Self {
        Vector3::new(v.x, v.y, v.z)
    }
}

impl fmt::Display for Vector3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.3}, {:.3}, {:.3})", self.x, self.y, self.z)
    }
}

/// Graphics mode the simulation session was started in
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderMode {
    /// No graphics support
    None = 0,
    /// Fullscreen mode
    Fullscreen = 1,
    /// Window mode
    Window = 2,
}

impl RenderMode {
    pub fn code(self) -> c_int {
        self as c_int
    }
}

impl TryFrom<c_int> for RenderMode {
    type Error = BridgeError;

    fn try_from(value: c_int) -> Result<Self> {
        match value {
            0 => Ok(Self::None),
            1 => Ok(Self::Fullscreen),
            2 => Ok(Self::Window),
            other => Err(BridgeError::UnknownRenderMode(other)),
        }
    }
}

/// Simulation clock as last published by the host
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct SimClock {
    /// Simulation time since session start (seconds)
    pub simt: f64,
    /// Length of the last time step (seconds)
    pub simdt: f64,
    /// Absolute time as Modified Julian Date
    pub mjd: f64,
}

impl SimClock {
    pub fn new(simt: f64, simdt: f64, mjd: f64) -> Self {
        Self { simt, simdt, mjd }
    }
}

/// Errors reported by the bridge and the host model
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Callback table is incomplete, missing: {}", CallbackSlot::join(.missing))]
    IncompleteCallbackTable { missing: Vec<CallbackSlot> },

    #[error("Null argument: {0}")]
    NullArgument(&'static str),

    #[error("Unknown render mode: {0}")]
    UnknownRenderMode(i32),

    #[error("Unsupported object type {code} for {handle}")]
    UnsupportedObjectType { handle: ObjHandle, code: i32 },

    #[error("Object not found: {0}")]
    ObjectNotFound(String),

    #[error("Invalid object name: {0}")]
    InvalidName(#[from] std::ffi::NulError),

    #[error("Module not found: {0}")]
    ModuleNotFound(ModuleId),

    #[error("Module already registered: {0}")]
    DuplicateModule(ModuleId),

    #[error("Module {0} was allocated by a different host")]
    ForeignModule(ModuleId),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Registry key of a module inside one host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ModuleId(pub(crate) u64);

impl ModuleId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "module#{}", self.0)
    }
}
