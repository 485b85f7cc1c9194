// Library entry points generated by declare_module!, called the way a loader would
use std::cell::RefCell;
use std::ffi::CStr;

use orbiter_bridge::{
    declare_module, CallbackSlot, Host, HostConfig, InstanceHandle, ModuleCallbacks, ModuleHandle,
};

thread_local! {
    static EVENTS: RefCell<Vec<String>> = RefCell::new(Vec::new());
}

fn push(event: String) {
    EVENTS.with(|events| events.borrow_mut().push(event));
}

fn take_events() -> Vec<String> {
    EVENTS.with(|events| std::mem::take(&mut *events.borrow_mut()))
}

struct Stopwatch;

impl ModuleCallbacks for Stopwatch {
    fn on_post_step(&mut self, module: &ModuleHandle, simt: f64, _simdt: f64, _mjd: f64) {
        push(format!("post_step {} {}", simt, module.sim_time()));
        orbiter_bridge::debug_string!(module.api(), "Stopwatch: {:.1} s", simt);
    }

    fn on_destroy(&mut self, module: &ModuleHandle) {
        push(format!("destroy {:?}", module.module()));
    }
}

declare_module!(
    fn init(registrar) {
        push(format!("init {:?}", registrar.instance()));
        registrar.register_module(Stopwatch)?;
        Ok(())
    }

    fn exit(instance) {
        push(format!("exit {:?}", instance));
    }
);

#[test]
fn exported_strings_match_the_crate() {
    let abi = unsafe { CStr::from_ptr(ModuleBridgeAbi()) };
    assert_eq!(abi.to_str().unwrap(), orbiter_bridge::abi_tag());

    let date = unsafe { CStr::from_ptr(ModuleDate()) };
    assert_eq!(date.to_str().unwrap(), orbiter_bridge::build_date());
}

#[test]
fn init_step_exit_sequence() {
    take_events();
    let instance = InstanceHandle::from_raw(7);
    let mut host = Host::simulated(HostConfig::default());

    assert!(unsafe { InitModule(&mut host, instance) });
    assert_eq!(host.module_count(), 1);

    host.post_step(4.5, 0.5, 51544.6);
    host.shutdown();
    ExitModule(instance);

    assert_eq!(
        take_events(),
        vec![
            format!("init {:?}", instance),
            "post_step 4.5 4.5".to_string(),
            format!("destroy {:?}", instance),
            format!("exit {:?}", instance),
        ]
    );
    assert_eq!(host.stats().count(CallbackSlot::Destroy), 1);
}

#[test]
fn init_without_host_fails() {
    assert!(!unsafe { InitModule(std::ptr::null_mut(), InstanceHandle::NULL) });
}

#[test]
fn init_helper_needs_no_unsafe() {
    let mut host = Host::simulated(HostConfig::default());
    let instance = InstanceHandle::from_raw(9);

    let ok = orbiter_bridge::macros::run_init(&mut host, instance, |registrar| {
        registrar.register_module(Stopwatch)?;
        Ok(())
    });
    assert!(ok);
    assert_eq!(host.module_count(), 1);
    host.shutdown();
    assert!(!orbiter_bridge::macros::init_without_host());
}
