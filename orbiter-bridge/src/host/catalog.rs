//! In-memory object database answering [`HostApi`] queries
//!
//! Handles are slot numbers starting at 1 and are never reused, so a handle
//! to a removed object keeps resolving to "not found".

use serde::{Deserialize, Serialize};
use std::cell::RefCell;

use super::HostApi;
use crate::object::ObjectKind;
use crate::types::{ObjHandle, Vector3};

/// Longest debug line the host keeps (bytes, without terminator)
pub const DEBUG_STRING_CAPACITY: usize = 255;

/// One simulation object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectRecord {
    pub name: String,
    pub kind: ObjectKind,
    /// Mean radius in meters
    #[serde(default)]
    pub size: f64,
    /// Mass in kilograms; ignored for vessels, see [`ObjectRecord::total_mass`]
    #[serde(default)]
    pub mass: f64,
    #[serde(default)]
    pub position: Vector3,
    #[serde(default)]
    pub velocity: Vector3,
    #[serde(default)]
    pub empty_mass: f64,
    #[serde(default)]
    pub fuel_mass: f64,
    #[serde(default)]
    pub max_fuel_mass: f64,
}

impl ObjectRecord {
    pub fn new(name: impl Into<String>, kind: ObjectKind) -> Self {
        Self {
            name: name.into(),
            kind,
            size: 0.0,
            mass: 0.0,
            position: Vector3::ZERO,
            velocity: Vector3::ZERO,
            empty_mass: 0.0,
            fuel_mass: 0.0,
            max_fuel_mass: 0.0,
        }
    }

    /// Builder method: set the mean radius
    pub fn with_size(mut self, size: f64) -> Self {
        self.size = size;
        self
    }

    /// Builder method: set the mass of a non-vessel object
    pub fn with_mass(mut self, mass: f64) -> Self {
        self.mass = mass;
        self
    }

    /// Builder method: set global position and velocity
    pub fn with_state(mut self, position: Vector3, velocity: Vector3) -> Self {
        self.position = position;
        self.velocity = velocity;
        self
    }

    /// Builder method: set vessel masses
    pub fn with_vessel_masses(mut self, empty_mass: f64, fuel_mass: f64, max_fuel_mass: f64) -> Self {
        self.empty_mass = empty_mass;
        self.fuel_mass = fuel_mass;
        self.max_fuel_mass = max_fuel_mass;
        self
    }

    /// Mass reported by the host: vessels include their current fuel
    pub fn total_mass(&self) -> f64 {
        if self.kind == ObjectKind::Vessel {
            self.empty_mass + self.fuel_mass
        } else {
            self.mass
        }
    }
}

#[derive(Debug, Default)]
struct CatalogState {
    slots: Vec<Option<ObjectRecord>>,
    focus: ObjHandle,
    debug_line: String,
}

impl CatalogState {
    fn get(&self, handle: ObjHandle) -> Option<&ObjectRecord> {
        let index = handle.into_raw().checked_sub(1)?;
        self.slots.get(index)?.as_ref()
    }

    fn get_mut(&mut self, handle: ObjHandle) -> Option<&mut ObjectRecord> {
        let index = handle.into_raw().checked_sub(1)?;
        self.slots.get_mut(index)?.as_mut()
    }

    fn live(&self) -> impl Iterator<Item = (ObjHandle, &ObjectRecord)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|r| (ObjHandle::from_raw(i + 1), r)))
    }

    fn vessel(&self, handle: ObjHandle) -> Option<&ObjectRecord> {
        self.get(handle).filter(|r| r.kind == ObjectKind::Vessel)
    }
}

/// Object database of the in-process host
#[derive(Debug)]
pub struct ObjectCatalog {
    orbiter_version: u32,
    state: RefCell<CatalogState>,
}

impl ObjectCatalog {
    pub fn new(orbiter_version: u32) -> Self {
        Self {
            orbiter_version,
            state: RefCell::new(CatalogState::default()),
        }
    }

    /// Add an object and return its handle
    pub fn insert(&self, record: ObjectRecord) -> ObjHandle {
        let mut state = self.state.borrow_mut();
        log::debug!("Catalog: adding {} ({:?})", record.name, record.kind);
        state.slots.push(Some(record));
        ObjHandle::from_raw(state.slots.len())
    }

    /// Remove an object; focus is cleared if it pointed at it
    pub fn remove(&self, handle: ObjHandle) -> Option<ObjectRecord> {
        let mut state = self.state.borrow_mut();
        let index = handle.into_raw().checked_sub(1)?;
        let record = state.slots.get_mut(index)?.take()?;
        if state.focus == handle {
            state.focus = ObjHandle::NULL;
        }
        log::debug!("Catalog: removed {} ({})", record.name, handle);
        Some(record)
    }

    /// Snapshot of one object
    pub fn get(&self, handle: ObjHandle) -> Option<ObjectRecord> {
        self.state.borrow().get(handle).cloned()
    }

    /// Overwrite global position and velocity of an object
    pub fn set_state(&self, handle: ObjHandle, position: Vector3, velocity: Vector3) -> bool {
        match self.state.borrow_mut().get_mut(handle) {
            Some(record) => {
                record.position = position;
                record.velocity = velocity;
                true
            }
            None => false,
        }
    }

    /// Last line passed to [`HostApi::debug_string`]
    pub fn debug_line(&self) -> String {
        self.state.borrow().debug_line.clone()
    }
}

pub(crate) fn truncate_on_char_boundary(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

impl HostApi for ObjectCatalog {
    fn orbiter_version(&self) -> u32 {
        self.orbiter_version
    }

    fn object_by_name(&self, name: &str) -> ObjHandle {
        self.state
            .borrow()
            .live()
            .find(|(_, r)| r.name == name)
            .map(|(handle, _)| handle)
            .unwrap_or(ObjHandle::NULL)
    }

    fn object_by_index(&self, index: usize) -> ObjHandle {
        self.state
            .borrow()
            .live()
            .nth(index)
            .map(|(handle, _)| handle)
            .unwrap_or(ObjHandle::NULL)
    }

    fn object_count(&self) -> usize {
        self.state.borrow().live().count()
    }

    fn object_type(&self, handle: ObjHandle) -> i32 {
        self.state
            .borrow()
            .get(handle)
            .map(|r| r.kind.code())
            .unwrap_or(ObjectKind::Invalid.code())
    }

    fn object_name(&self, handle: ObjHandle) -> Option<String> {
        self.state.borrow().get(handle).map(|r| r.name.clone())
    }

    fn size(&self, handle: ObjHandle) -> f64 {
        self.state.borrow().get(handle).map(|r| r.size).unwrap_or(0.0)
    }

    fn mass(&self, handle: ObjHandle) -> f64 {
        self.state.borrow().get(handle).map(|r| r.total_mass()).unwrap_or(0.0)
    }

    fn global_pos(&self, handle: ObjHandle) -> Vector3 {
        self.state.borrow().get(handle).map(|r| r.position).unwrap_or(Vector3::ZERO)
    }

    fn global_vel(&self, handle: ObjHandle) -> Vector3 {
        self.state.borrow().get(handle).map(|r| r.velocity).unwrap_or(Vector3::ZERO)
    }

    fn relative_pos(&self, handle: ObjHandle, reference: ObjHandle) -> Vector3 {
        let state = self.state.borrow();
        match (state.get(handle), state.get(reference)) {
            (Some(obj), Some(reference)) => {
                let delta = nalgebra::Vector3::<f64>::from(obj.position)
                    - nalgebra::Vector3::<f64>::from(reference.position);
                delta.into()
            }
            _ => Vector3::ZERO,
        }
    }

    fn relative_vel(&self, handle: ObjHandle, reference: ObjHandle) -> Vector3 {
        let state = self.state.borrow();
        match (state.get(handle), state.get(reference)) {
            (Some(obj), Some(reference)) => {
                let delta = nalgebra::Vector3::<f64>::from(obj.velocity)
                    - nalgebra::Vector3::<f64>::from(reference.velocity);
                delta.into()
            }
            _ => Vector3::ZERO,
        }
    }

    fn vessel_interface(&self, handle: ObjHandle) -> ObjHandle {
        match self.state.borrow().vessel(handle) {
            Some(_) => handle,
            None => ObjHandle::NULL,
        }
    }

    fn focus_object(&self) -> ObjHandle {
        self.state.borrow().focus
    }

    fn set_focus_object(&self, vessel: ObjHandle) -> ObjHandle {
        let mut state = self.state.borrow_mut();
        if state.vessel(vessel).is_none() || state.focus == vessel {
            return ObjHandle::NULL;
        }
        std::mem::replace(&mut state.focus, vessel)
    }

    fn empty_mass(&self, vessel: ObjHandle) -> f64 {
        self.state.borrow().vessel(vessel).map(|r| r.empty_mass).unwrap_or(0.0)
    }

    fn set_empty_mass(&self, vessel: ObjHandle, mass: f64) {
        let mut state = self.state.borrow_mut();
        if let Some(record) = state.get_mut(vessel).filter(|r| r.kind == ObjectKind::Vessel) {
            record.empty_mass = mass;
        }
    }

    fn fuel_mass(&self, vessel: ObjHandle) -> f64 {
        self.state.borrow().vessel(vessel).map(|r| r.fuel_mass).unwrap_or(0.0)
    }

    fn max_fuel_mass(&self, vessel: ObjHandle) -> f64 {
        self.state.borrow().vessel(vessel).map(|r| r.max_fuel_mass).unwrap_or(0.0)
    }

    fn debug_string(&self, text: &str) {
        let line = truncate_on_char_boundary(text, DEBUG_STRING_CAPACITY);
        self.state.borrow_mut().debug_line = line.to_string();
    }
}
