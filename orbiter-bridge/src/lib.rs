//! Orbiter Bridge Library
//!
//! A C-ABI callback bridge that lets code outside the host's language
//! implement the flight simulator's polymorphic module interface.
//!
//! # Architecture
//!
//! - [`callbacks`]: the fifteen-slot function-pointer table and its validation
//! - [`bridge`]: [`ModuleBridge`], which forwards each host event to its slot
//!   with the caller's opaque context prepended
//! - [`host`]: an in-process host (module registry, clock, object catalog)
//!   that dispatches events the way the simulator does
//! - [`module`], [`object`], [`input`]: a typed Rust API on top of the bridge
//! - [`ffi`]: `obr_*` exports for C callers
//!
//! Everything runs on the host's single control thread; none of the types
//! here are `Send`.
//!
//! # Example Usage
//!
//! ```no_run
//! use orbiter_bridge::{Host, HostConfig, InstanceHandle, ModuleCallbacks, ModuleHandle};
//!
//! struct Clock;
//!
//! impl ModuleCallbacks for Clock {
//!     fn on_post_step(&mut self, module: &ModuleHandle, simt: f64, _simdt: f64, mjd: f64) {
//!         orbiter_bridge::debug_string!(module.api(), "t = {:.1} s (MJD {:.4})", simt, mjd);
//!     }
//! }
//!
//! let mut host = Host::simulated(HostConfig::default());
//! let handle = host.register_module(InstanceHandle::NULL, Clock).unwrap();
//! host.post_step(10.0, 0.1, 51544.6);
//! assert_eq!(handle.sim_time(), 10.0);
//! ```

// Public modules
pub mod bridge;
pub mod callbacks;
pub mod config;
pub mod ffi;
pub mod host;
pub mod input;
pub mod macros;
pub mod module;
pub mod object;
pub mod types;

// Re-export main types for convenience
pub use bridge::{ModuleBridge, OpaqueContext};
pub use callbacks::{CallbackSlot, CallbackTable, RawCallbackTable};
pub use config::HostConfig;
pub use ffi::BridgeStatus;
pub use host::{DispatchStats, Host, HostApi, HostModule, ModuleHandle, ObjectCatalog, ObjectRecord};
pub use input::{Key, KeyStateBuffer, KeyStates, MouseEvent, MouseEventKind};
pub use macros::{abi_tag, build_date, ModuleRegistrar};
pub use module::ModuleCallbacks;
pub use object::{Object, ObjectKind, ObjectTrait, Planet, Star, SurfaceBase, Vessel};
pub use types::{
    BridgeError, InstanceHandle, ModuleId, ObjHandle, RenderMode, Result, SimClock, Vector3,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
