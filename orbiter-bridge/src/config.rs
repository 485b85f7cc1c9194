//! Host configuration
//!
//! The in-process host only needs to know which versions to report and where
//! the simulation clock starts. Everything scenario-specific lives in the
//! application layer.

use serde::{Deserialize, Serialize};

/// Configuration of the in-process host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostConfig {
    /// Host core version reported to modules (`YYMMDD`)
    #[serde(default = "default_version")]
    pub orbiter_version: u32,

    /// API version assigned to registered modules
    #[serde(default = "default_version")]
    pub module_version: u32,

    /// Modified Julian Date of the clock before the first step
    #[serde(default = "default_start_mjd")]
    pub start_mjd: f64,
}

fn default_version() -> u32 {
    160828
}

fn default_start_mjd() -> f64 {
    // J2000 epoch
    51544.5
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            orbiter_version: default_version(),
            module_version: default_version(),
            start_mjd: default_start_mjd(),
        }
    }
}

impl HostConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: set the reported host version
    pub fn with_orbiter_version(mut self, version: u32) -> Self {
        self.orbiter_version = version;
        self
    }

    /// Builder method: set the module API version
    pub fn with_module_version(mut self, version: u32) -> Self {
        self.module_version = version;
        self
    }

    /// Builder method: set the starting MJD
    pub fn with_start_mjd(mut self, mjd: f64) -> Self {
        self.start_mjd = mjd;
        self
    }
}
