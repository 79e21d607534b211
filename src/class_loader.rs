//! A per-thread `java.lang.ClassLoader` that class descriptors resolve through.
//!
//! Threads attached from native code see only the system class loader through `FindClass`;
//! classes loaded by an application class loader can be found by setting it here first.
//! The loader is held as a global reference and released when the thread exits.

use std::{cell::RefCell, sync::Arc};

use crate::{
    env::Env,
    errors::*,
    refs::{GlobalRef, Reference},
};

thread_local! {
    static CLASS_LOADER: RefCell<Option<Arc<GlobalRef>>> = const { RefCell::new(None) };
}

/// Sets (or with `None`, clears) the calling thread's class loader.
pub fn set_class_loader(env: &Env, loader: Option<&dyn Reference>) -> Result<()> {
    let loader = match loader {
        Some(loader) if !loader.is_null() => Some(Arc::new(env.new_global_ref(loader)?)),
        _ => None,
    };
    let previous = CLASS_LOADER.with(|slot| slot.replace(loader));
    drop(previous);
    Ok(())
}

/// The calling thread's class loader, if one is set and its VM is still running.
pub fn class_loader() -> Option<Arc<GlobalRef>> {
    CLASS_LOADER
        .try_with(|slot| slot.borrow().clone())
        .ok()
        .flatten()
        .filter(|loader| loader.is_live())
}
