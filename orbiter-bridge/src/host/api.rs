//! Global object and vessel queries offered by the host
//!
//! These mirror the host's free-function API one to one. They carry no state
//! of their own and never fail: unknown or null handles produce the null
//! sentinel, `None`, zero or [`Vector3::ZERO`].

use crate::types::{ObjHandle, Vector3};

pub trait HostApi {
    /// Version of the host core, `YYMMDD`
    fn orbiter_version(&self) -> u32;

    /// Object with the given name, or the null handle
    fn object_by_name(&self, name: &str) -> ObjHandle;

    /// Object at `index` in `0..object_count()`, or the null handle
    fn object_by_index(&self, index: usize) -> ObjHandle;

    fn object_count(&self) -> usize;

    /// Raw type code of an object (0 for invalid handles)
    fn object_type(&self, handle: ObjHandle) -> i32;

    fn object_name(&self, handle: ObjHandle) -> Option<String>;

    /// Mean radius in meters
    fn size(&self, handle: ObjHandle) -> f64;

    /// Total mass in kilograms (vessels include fuel)
    fn mass(&self, handle: ObjHandle) -> f64;

    /// Position in the global (heliocentric ecliptic J2000) frame, meters
    fn global_pos(&self, handle: ObjHandle) -> Vector3;

    /// Velocity in the global frame, meters per second
    fn global_vel(&self, handle: ObjHandle) -> Vector3;

    /// Position of `handle` relative to `reference`, ecliptic frame
    fn relative_pos(&self, handle: ObjHandle, reference: ObjHandle) -> Vector3;

    /// Velocity of `handle` relative to `reference`, ecliptic frame
    fn relative_vel(&self, handle: ObjHandle, reference: ObjHandle) -> Vector3;

    /// `handle` itself if it refers to a vessel, otherwise the null handle
    fn vessel_interface(&self, handle: ObjHandle) -> ObjHandle;

    /// Vessel receiving user input, null outside a session
    fn focus_object(&self) -> ObjHandle;

    /// Switch input focus; returns the vessel that lost focus or null if
    /// focus did not change
    fn set_focus_object(&self, vessel: ObjHandle) -> ObjHandle;

    fn empty_mass(&self, vessel: ObjHandle) -> f64;

    fn set_empty_mass(&self, vessel: ObjHandle, mass: f64);

    /// Fuel mass of the first propellant resource
    fn fuel_mass(&self, vessel: ObjHandle) -> f64;

    /// Capacity of the first propellant resource
    fn max_fuel_mass(&self, vessel: ObjHandle) -> f64;

    /// Replace the debug line shown in the viewport
    fn debug_string(&self, text: &str);
}
