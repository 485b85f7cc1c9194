//! Typed views over host objects
//!
//! Thin wrappers around [`ObjHandle`] that resolve the host's type codes and
//! forward every query to a [`HostApi`]. The wrappers hold no state beyond the
//! handle, so they are only as valid as the object they point at.

use serde::{Deserialize, Serialize};
use std::ffi::CString;
use std::fmt;

use crate::host::HostApi;
use crate::types::{BridgeError, ObjHandle, Result, Vector3};

/// Object type codes used by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    Invalid,
    Generic,
    CelestialBody,
    Star,
    Planet,
    Vessel,
    SurfaceBase,
}

impl ObjectKind {
    pub fn code(self) -> i32 {
        match self {
            ObjectKind::Invalid => 0,
            ObjectKind::Generic => 1,
            ObjectKind::CelestialBody => 2,
            ObjectKind::Star => 3,
            ObjectKind::Planet => 4,
            ObjectKind::Vessel => 10,
            ObjectKind::SurfaceBase => 20,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(ObjectKind::Invalid),
            1 => Some(ObjectKind::Generic),
            2 => Some(ObjectKind::CelestialBody),
            3 => Some(ObjectKind::Star),
            4 => Some(ObjectKind::Planet),
            10 => Some(ObjectKind::Vessel),
            20 => Some(ObjectKind::SurfaceBase),
            _ => None,
        }
    }
}

/// Queries shared by every kind of object
pub trait ObjectTrait {
    fn handle(&self) -> ObjHandle;

    /// Object name, empty if the object no longer exists
    fn name(&self, api: &dyn HostApi) -> String {
        api.object_name(self.handle()).unwrap_or_default()
    }

    /// Mean radius in meters
    fn size(&self, api: &dyn HostApi) -> f64 {
        api.size(self.handle())
    }

    /// Mass in kilograms; for vessels this includes the current fuel
    fn mass(&self, api: &dyn HostApi) -> f64 {
        api.mass(self.handle())
    }

    /// Position in the heliocentric ecliptic J2000 frame, meters
    fn global_pos(&self, api: &dyn HostApi) -> Vector3 {
        api.global_pos(self.handle())
    }

    /// Velocity in the heliocentric ecliptic J2000 frame, m/s
    fn global_velocity(&self, api: &dyn HostApi) -> Vector3 {
        api.global_vel(self.handle())
    }

    /// Distance vector from `reference` to this object
    fn relative_position(&self, api: &dyn HostApi, reference: &dyn ObjectTrait) -> Vector3 {
        api.relative_pos(self.handle(), reference.handle())
    }

    /// Velocity of this object relative to `reference`
    fn relative_velocity(&self, api: &dyn HostApi, reference: &dyn ObjectTrait) -> Vector3 {
        api.relative_vel(self.handle(), reference.handle())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Star(ObjHandle);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Planet(ObjHandle);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceBase(ObjHandle);

/// A spacecraft, station or other vessel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Vessel(ObjHandle);

impl ObjectTrait for Star {
    fn handle(&self) -> ObjHandle {
        self.0
    }
}

impl ObjectTrait for Planet {
    fn handle(&self) -> ObjHandle {
        self.0
    }
}

impl ObjectTrait for SurfaceBase {
    fn handle(&self) -> ObjHandle {
        self.0
    }
}

impl ObjectTrait for Vessel {
    fn handle(&self) -> ObjHandle {
        self.0
    }
}

impl Vessel {
    /// Wrap a handle the host passed as a vessel; `None` for the null handle
    pub fn from_handle(handle: ObjHandle) -> Option<Self> {
        handle.non_null().map(Vessel)
    }

    /// Resolve any object handle to a vessel, `None` if it is not one
    pub fn from_object(api: &dyn HostApi, handle: ObjHandle) -> Option<Self> {
        Self::from_handle(api.vessel_interface(handle))
    }

    /// The user-controlled vessel, present only while a session runs
    pub fn focus(api: &dyn HostApi) -> Option<Self> {
        Self::from_handle(api.focus_object())
    }

    /// Give this vessel the input focus
    ///
    /// Returns the vessel losing focus, or `None` if focus did not change.
    pub fn set_focus(&self, api: &dyn HostApi) -> Option<Vessel> {
        Self::from_handle(api.set_focus_object(self.0))
    }

    /// Mass without fuel (kg); changes when stages are jettisoned
    pub fn empty_mass(&self, api: &dyn HostApi) -> f64 {
        api.empty_mass(self.0)
    }

    /// Register a structural mass change (kg)
    pub fn set_empty_mass(&self, api: &dyn HostApi, mass: f64) {
        api.set_empty_mass(self.0, mass)
    }

    /// Current mass of the first propellant resource (kg)
    pub fn fuel_mass(&self, api: &dyn HostApi) -> f64 {
        api.fuel_mass(self.0)
    }

    /// Capacity of the first propellant resource (kg)
    pub fn max_fuel_mass(&self, api: &dyn HostApi) -> f64 {
        api.max_fuel_mass(self.0)
    }
}

/// Any object the host exposes to modules
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Object {
    Star(Star),
    /// Every non-star celestial body, including moons and comets
    Planet(Planet),
    Vessel(Vessel),
    /// A spaceport or other surface base
    SurfaceBase(SurfaceBase),
}

impl ObjectTrait for Object {
    fn handle(&self) -> ObjHandle {
        match self {
            Object::Star(star) => star.handle(),
            Object::Planet(planet) => planet.handle(),
            Object::Vessel(vessel) => vessel.handle(),
            Object::SurfaceBase(base) => base.handle(),
        }
    }
}

impl Object {
    /// Resolve a handle by its type code
    ///
    /// The null handle and handles of deleted objects resolve to `Ok(None)`.
    /// Generic and celestial-body codes are never handed to modules by the
    /// host; they and unknown codes are reported as errors.
    pub fn from_handle(api: &dyn HostApi, handle: ObjHandle) -> Result<Option<Self>> {
        if handle.is_null() {
            return Ok(None);
        }

        let code = api.object_type(handle);
        match ObjectKind::from_code(code) {
            Some(ObjectKind::Invalid) => Ok(None),
            Some(ObjectKind::Star) => Ok(Some(Object::Star(Star(handle)))),
            Some(ObjectKind::Planet) => Ok(Some(Object::Planet(Planet(handle)))),
            Some(ObjectKind::Vessel) => Ok(Some(Object::Vessel(Vessel(handle)))),
            Some(ObjectKind::SurfaceBase) => Ok(Some(Object::SurfaceBase(SurfaceBase(handle)))),
            Some(ObjectKind::Generic) | Some(ObjectKind::CelestialBody) | None => {
                Err(BridgeError::UnsupportedObjectType { handle, code })
            }
        }
    }

    pub fn kind(&self) -> ObjectKind {
        match self {
            Object::Star(_) => ObjectKind::Star,
            Object::Planet(_) => ObjectKind::Planet,
            Object::Vessel(_) => ObjectKind::Vessel,
            Object::SurfaceBase(_) => ObjectKind::SurfaceBase,
        }
    }

    /// Every object of the current simulation
    ///
    /// Objects with unsupported type codes are logged and skipped.
    pub fn all(api: &dyn HostApi) -> Vec<Object> {
        (0..api.object_count())
            .filter_map(|index| {
                let handle = api.object_by_index(index);
                match Object::from_handle(api, handle) {
                    Ok(object) => object,
                    Err(e) => {
                        log::warn!("Skipping object {}: {}", index, e);
                        None
                    }
                }
            })
            .collect()
    }

    /// Look an object up by name
    pub fn find_by_name(api: &dyn HostApi, name: &str) -> Result<Option<Object>> {
        // Names containing NUL could never reach the host's C API
        CString::new(name)?;
        Object::from_handle(api, api.object_by_name(name))
    }

    /// Formatter that prints `Kind(name)`
    pub fn display<'a>(&'a self, api: &'a dyn HostApi) -> impl fmt::Display + 'a {
        ObjectDisplay { object: self, api }
    }
}

struct ObjectDisplay<'a> {
    object: &'a Object,
    api: &'a dyn HostApi,
}

impl fmt::Display for ObjectDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.object {
            Object::Star(_) => "Star",
            Object::Planet(_) => "Planet",
            Object::Vessel(_) => "Vessel",
            Object::SurfaceBase(_) => "SurfaceBase",
        };
        write!(f, "{}({})", kind, self.object.name(self.api))
    }
}
