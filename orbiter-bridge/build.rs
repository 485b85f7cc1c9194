//! Build script for orbiter-bridge
//!
//! Stamps the crate with the two values a module library reports to its
//! loader: the build date (returned by `ModuleDate`) and the compiler version
//! (part of the ABI tag returned by `ModuleBridgeAbi`).

use std::env;
use std::process::Command;

use chrono::Utc;

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-env-changed=RUSTC");

    // The host expects the same "Mmm dd yyyy" layout as the C `__DATE__` macro.
    // Do a clean rebuild before shipping a module so the date is current.
    let date = Utc::now().format("%b %e %Y");
    println!("cargo:rustc-env=ORBITER_BRIDGE_BUILD_DATE={}", date);

    let rustc = env::var("RUSTC").unwrap_or_else(|_| String::from("rustc"));
    let rustc_version = Command::new(&rustc)
        .arg("-V")
        .output()
        .ok()
        .filter(|output| output.status.success())
        .map(|output| String::from_utf8_lossy(&output.stdout).trim().to_string())
        .unwrap_or_else(|| {
            println!("cargo:warning=Could not query {} -V, ABI tag will be less strict", rustc);
            String::from("rustc unknown")
        });
    println!("cargo:rustc-env=ORBITER_BRIDGE_RUSTC={}", rustc_version);
}
