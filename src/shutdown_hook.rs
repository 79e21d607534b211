//! Forgetting the VM when it shuts down.
//!
//! Once the VM has begun to exit, global references and attached threads must no longer be
//! used. [`register_shutdown_hook`] installs a Java shutdown hook (`org.jnibridge.ShutdownHook`)
//! that calls back into native code, which [resets](Jvm::reset) the lifecycle state: later
//! releases become no-ops and later attaches fail with [`Error::VmShutdown`].
//!
//! The VM is not destroyed from the hook; it is already on its way out.

use std::{
    ffi::c_void,
    panic::{self, AssertUnwindSafe},
};

use log::{debug, error};
use parking_lot::{const_mutex, Mutex};

use crate::{
    env::{Env, NativeMethod},
    errors::*,
    sys, Jvm,
};

pub const SHUTDOWN_HOOK_CLASS: &str = "org/jnibridge/ShutdownHook";

const SIGNAL_VM_SHUTDOWN: &str = "signalVMShutdown";

/// The lifecycle to reset, and the generation of the VM the hook was registered in.
static HOOKED: Mutex<Option<(Jvm, u64)>> = const_mutex(None);

/// Registers the shutdown hook for the VM `env` belongs to. Calling it again is harmless: the
/// Java side adds its hook once per VM.
pub fn register_shutdown_hook(env: &Env) -> Result<()> {
    let class = env.find_class(SHUTDOWN_HOOK_CLASS)?;
    let method = unsafe {
        NativeMethod::new(
            SIGNAL_VM_SHUTDOWN,
            "()V",
            signal_vm_shutdown as *mut c_void,
        )?
    };
    env.register_native_methods(&class, &[method])
        .map_err(|err| caused_by("Unable to register native callback for signalVMShutdown()", err))?;

    let register = env.get_static_method_id(&class, "register", "()V")?;
    arm(env.vm(), env.generation(), || {
        unsafe { env.call_static_void_method(&class, register, &[]) }
            .map_err(|err| caused_by("Exception thrown invoking ShutdownHook.register()", err))
    })?;
    debug!("Registered the VM shutdown hook");
    Ok(())
}

/// Remembers `vm` for [`on_vm_shutdown`], once `register` has installed the Java hook.
fn arm(vm: &Jvm, generation: u64, register: impl FnOnce() -> Result<()>) -> Result<()> {
    register()?;
    *HOOKED.lock() = Some((vm.clone(), generation));
    Ok(())
}

fn caused_by(msg: &str, err: Error) -> Error {
    Error::Bridge(format!("{msg}\ncaused by:\n{err}"))
}

/// Resets the lifecycle the hook was registered for, unless a different VM has been registered
/// since.
fn on_vm_shutdown() {
    let Some((vm, generation)) = HOOKED.lock().take() else {
        return;
    };
    if vm.is_generation_live(generation) {
        debug!("The VM is shutting down; forgetting it");
        vm.reset();
    }
}

/// `ShutdownHook.signalVMShutdown`
extern "system" fn signal_vm_shutdown(_env: *mut sys::JNIEnv, _class: sys::jclass) {
    if panic::catch_unwind(AssertUnwindSafe(on_vm_shutdown)).is_err() {
        error!("Panicked while handling VM shutdown");
    }
}
