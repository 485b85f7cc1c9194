//! Dynamic loading of module libraries
//!
//! A module library is a `cdylib` built with `orbiter_bridge::declare_module!`.
//! It is only initialised if it was built against the same bridge version and
//! compiler as this binary, because `InitModule` receives the host by pointer.

use libloading::{Library, Symbol};
use orbiter_bridge::{Host, InstanceHandle};
use std::ffi::CStr;
use std::os::raw::c_char;
use std::path::{Path, PathBuf};

type StringFn = unsafe extern "C" fn() -> *const c_char;
type InitFn = unsafe extern "C" fn(*mut Host, InstanceHandle) -> bool;
type ExitFn = unsafe extern "C" fn(InstanceHandle);

/// Errors that can occur while loading a module library
#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    #[error("Failed to load module library {path:?}: {source}")]
    Open {
        path: PathBuf,
        source: libloading::Error,
    },

    #[error("Module library {path:?} does not export {symbol}")]
    MissingSymbol {
        path: PathBuf,
        symbol: &'static str,
        source: libloading::Error,
    },

    #[error("Module library {path:?} was built against '{found}', this host is '{expected}'")]
    AbiMismatch {
        path: PathBuf,
        found: String,
        expected: &'static str,
    },

    #[error("InitModule of {path:?} reported failure")]
    InitFailed { path: PathBuf },
}

/// A loaded and initialised module library
///
/// Bridges registered by the library hold function pointers into it, so the
/// owner must shut the host down before calling [`ModuleLibrary::exit`] and
/// dropping this value.
pub struct ModuleLibrary {
    path: PathBuf,
    instance: InstanceHandle,
    build_date: String,
    exited: bool,
    library: Library,
}

impl ModuleLibrary {
    /// Load `path`, check its ABI tag and run its `InitModule`
    pub fn load(path: &Path, host: &mut Host, instance: InstanceHandle) -> Result<Self, LoaderError> {
        log::info!("Loading module library {:?}", path);

        // SAFETY: running the library's initialisers is inherent to loading it
        let library = unsafe { Library::new(path) }.map_err(|source| LoaderError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        let found = read_string(&library, path, "ModuleBridgeAbi")?;
        let expected = orbiter_bridge::abi_tag();
        if found != expected {
            return Err(LoaderError::AbiMismatch {
                path: path.to_path_buf(),
                found,
                expected,
            });
        }

        let build_date = read_string(&library, path, "ModuleDate")?;
        log::debug!("{:?}: built {}, ABI '{}'", path, build_date, found);

        // The exit symbol is resolved up front so a library without one is
        // rejected before it registers anything
        symbol::<ExitFn>(&library, path, "ExitModule")?;

        let ok = {
            let init: Symbol<InitFn> = symbol(&library, path, "InitModule")?;
            // SAFETY: the ABI tag matched, so the library's `Host` is our `Host`
            unsafe { init(host as *mut Host, instance) }
        };
        if !ok {
            // Modules registered before the failure point into this library
            let released = host.release_instance(instance);
            if released > 0 {
                log::warn!("Released {} module(s) left behind by {:?}", released, path);
            }
            return Err(LoaderError::InitFailed {
                path: path.to_path_buf(),
            });
        }

        log::info!(
            "Initialised {:?} ({} module(s) registered in total)",
            path,
            host.module_count()
        );

        Ok(Self {
            path: path.to_path_buf(),
            instance,
            build_date,
            exited: false,
            library,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Build date reported by the library's `ModuleDate`
    pub fn build_date(&self) -> &str {
        &self.build_date
    }

    /// Run the library's `ExitModule`; later calls do nothing
    pub fn exit(&mut self) {
        if self.exited {
            return;
        }
        self.exited = true;

        match symbol::<ExitFn>(&self.library, &self.path, "ExitModule") {
            Ok(exit) => {
                log::debug!("Calling ExitModule of {:?}", self.path);
                // SAFETY: resolved from a library that passed the ABI check
                unsafe { exit(self.instance) };
            }
            Err(e) => log::error!("{}", e),
        }
    }
}

impl Drop for ModuleLibrary {
    fn drop(&mut self) {
        self.exit();
        log::info!("Unloading module library {:?}", self.path);
    }
}

fn symbol<'lib, T>(
    library: &'lib Library,
    path: &Path,
    name: &'static str,
) -> Result<Symbol<'lib, T>, LoaderError> {
    let mut raw = Vec::with_capacity(name.len() + 1);
    raw.extend_from_slice(name.as_bytes());
    raw.push(0);

    // SAFETY: every entry point is declared with the signature `T` names
    unsafe { library.get::<T>(&raw) }.map_err(|source| LoaderError::MissingSymbol {
        path: path.to_path_buf(),
        symbol: name,
        source,
    })
}

fn read_string(library: &Library, path: &Path, name: &'static str) -> Result<String, LoaderError> {
    let get: Symbol<StringFn> = symbol(library, path, name)?;
    // SAFETY: both string exports return pointers to static NUL-terminated text
    let text = unsafe {
        let ptr = get();
        if ptr.is_null() {
            return Ok(String::new());
        }
        CStr::from_ptr(ptr)
    };
    Ok(text.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use orbiter_bridge::HostConfig;

    #[test]
    fn test_missing_library_reports_open_error() {
        let mut host = Host::simulated(HostConfig::default());
        let result = ModuleLibrary::load(
            Path::new("/nonexistent/libmodule.so"),
            &mut host,
            InstanceHandle::from_raw(1),
        );

        match result {
            Err(LoaderError::Open { path, .. }) => {
                assert_eq!(path, PathBuf::from("/nonexistent/libmodule.so"));
            }
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("loading a missing library succeeded"),
        }
        assert_eq!(host.module_count(), 0);
    }

    #[test]
    fn test_non_library_file_rejected() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), b"not a shared object").unwrap();

        let mut host = Host::simulated(HostConfig::default());
        let result = ModuleLibrary::load(file.path(), &mut host, InstanceHandle::from_raw(1));
        assert!(matches!(result, Err(LoaderError::Open { .. })));
    }

    #[test]
    fn test_abi_mismatch_message() {
        let err = LoaderError::AbiMismatch {
            path: PathBuf::from("libold.so"),
            found: "orbiter-bridge 0.0.1 (rustc 1.70.0)".to_string(),
            expected: orbiter_bridge::abi_tag(),
        };
        let message = err.to_string();
        assert!(message.contains("orbiter-bridge 0.0.1"));
        assert!(message.contains(orbiter_bridge::abi_tag()));
    }
}
