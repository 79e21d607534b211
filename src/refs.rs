//! Local and global references.
//!
//! These functions are the only places that create or delete references; everything else in
//! the crate goes through them (and through them, through [`Runtime`](crate::vm::Runtime)).

use std::{fmt, marker::PhantomData, ptr};

use log::{debug, warn};

use crate::{env::Env, errors::*, sys, vm::AttachConfig, Jvm};

/// Anything that stands for a reference to a Java object.
pub trait Reference {
    /// The raw reference. Null for a released [`GlobalRef`].
    fn as_raw(&self) -> sys::jobject;

    fn is_null(&self) -> bool {
        self.as_raw().is_null()
    }
}

/// Creates a new local reference to `obj`.
///
/// Fails with [`Error::LocalRefExhausted`] if the VM can't make one.
pub fn new_local<'env>(env: &'env Env, obj: &dyn Reference) -> Result<AutoLocal<'env>> {
    let obj = null_check!(obj.as_raw(), "new_local obj")?;
    let local = unsafe { env.runtime().new_local_ref(env.get_raw(), obj) };
    if local.is_null() {
        return Err(Error::LocalRefExhausted);
    }
    Ok(unsafe { AutoLocal::new(env, local) })
}

/// Deletes a local reference. Does nothing once the VM that issued it has been torn down.
///
/// # Safety
///
/// `obj` must be a local reference of the current frame that is not used afterwards.
pub unsafe fn delete_local(env: &Env, obj: sys::jobject) {
    if obj.is_null() {
        return;
    }
    let deleted = env.vm().with_generation(env.generation(), |record| unsafe {
        record.runtime.delete_local_ref(env.get_raw(), obj)
    });
    if deleted.is_none() {
        debug!("Skipped deleting a local reference: its VM is gone");
    }
}

/// Creates a new global reference to `obj`.
///
/// Fails with [`Error::GlobalRefExhausted`] if the VM can't make one.
pub fn new_global(env: &Env, obj: &dyn Reference) -> Result<GlobalRef> {
    let obj = null_check!(obj.as_raw(), "new_global obj")?;
    let global = unsafe { env.runtime().new_global_ref(env.get_raw(), obj) };
    if global.is_null() {
        return Err(Error::GlobalRefExhausted);
    }
    Ok(GlobalRef {
        obj: global,
        vm: env.vm().clone(),
        generation: env.generation(),
    })
}

/// Deletes a global reference issued by `generation` of `vm`, from any thread.
///
/// Does nothing once that VM has been torn down. A thread that isn't attached is attached for
/// the duration of the call.
///
/// # Safety
///
/// `obj` must be a global reference owned by the caller that is not used afterwards.
pub unsafe fn delete_global(vm: &Jvm, generation: u64, obj: sys::jobject) {
    if obj.is_null() {
        return;
    }
    let deleted = vm.with_generation(generation, |record| {
        let config = AttachConfig::new().scoped(true);
        let (env, attached_here) = match vm.attach_locked(record, &config) {
            Ok(attached) => attached,
            Err(err) => {
                warn!("Leaking a global reference: couldn't attach to delete it: {err}");
                return;
            }
        };
        if attached_here {
            warn!("A global reference was dropped on a thread that isn't attached to the VM; attached it temporarily");
        }
        unsafe { record.runtime.delete_global_ref(env, obj) };
        if attached_here {
            vm.detach_locked(record);
        }
    });
    if deleted.is_none() {
        debug!("Skipped deleting a global reference: its VM is gone");
    }
}

/// An owned global reference, deleted when dropped.
///
/// Releasing is idempotent, and releasing after the VM has been torn down does nothing. Copies
/// are explicit: [`try_clone`](GlobalRef::try_clone) makes a new global reference.
pub struct GlobalRef {
    obj: sys::jobject,
    vm: Jvm,
    generation: u64,
}

// Global references are valid on every thread.
unsafe impl Send for GlobalRef {}
unsafe impl Sync for GlobalRef {}

impl GlobalRef {
    /// The raw reference; null once released.
    pub fn as_raw(&self) -> sys::jobject {
        self.obj
    }

    pub fn is_released(&self) -> bool {
        self.obj.is_null()
    }

    /// Whether the reference can still be used: not released, and its VM still registered.
    pub fn is_live(&self) -> bool {
        !self.is_released() && self.vm.is_generation_live(self.generation)
    }

    /// The lifecycle the reference belongs to.
    pub fn vm(&self) -> &Jvm {
        &self.vm
    }

    /// Deletes the reference now. Later calls, and the eventual drop, do nothing.
    pub fn release(&mut self) {
        let obj = std::mem::replace(&mut self.obj, ptr::null_mut());
        unsafe { delete_global(&self.vm, self.generation, obj) };
    }

    /// A new global reference to the same object.
    pub fn try_clone(&self, env: &Env) -> Result<GlobalRef> {
        new_global(env, self)
    }

    /// Gives up ownership without deleting the reference.
    pub fn into_raw(mut self) -> sys::jobject {
        std::mem::replace(&mut self.obj, ptr::null_mut())
    }
}

impl Reference for GlobalRef {
    fn as_raw(&self) -> sys::jobject {
        self.obj
    }
}

impl Drop for GlobalRef {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for GlobalRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlobalRef")
            .field("obj", &self.obj)
            .field("generation", &self.generation)
            .finish()
    }
}

/// A local reference deleted when it goes out of scope.
///
/// Local references are also freed when a native method returns to Java; deleting them early
/// matters in loops, where the local reference table would otherwise fill up.
pub struct AutoLocal<'env> {
    obj: sys::jobject,
    env: &'env Env,
}

impl<'env> AutoLocal<'env> {
    /// Takes ownership of a local reference.
    ///
    /// # Safety
    ///
    /// `obj` must be null or a local reference of the current frame, owned by nobody else.
    pub unsafe fn new(env: &'env Env, obj: sys::jobject) -> Self {
        AutoLocal { obj, env }
    }

    pub fn as_raw(&self) -> sys::jobject {
        self.obj
    }

    /// Gives up ownership without deleting the reference, e.g. to return it to Java.
    pub fn into_raw(mut self) -> sys::jobject {
        std::mem::replace(&mut self.obj, ptr::null_mut())
    }
}

impl Reference for AutoLocal<'_> {
    fn as_raw(&self) -> sys::jobject {
        self.obj
    }
}

impl Drop for AutoLocal<'_> {
    fn drop(&mut self) {
        unsafe { delete_local(self.env, self.obj) };
    }
}

impl fmt::Debug for AutoLocal<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AutoLocal").field(&self.obj).finish()
    }
}

/// A reference owned by someone else, such as an argument of a native method.
#[derive(Debug, Clone, Copy)]
pub struct Borrowed<'a> {
    obj: sys::jobject,
    _lifetime: PhantomData<&'a ()>,
}

impl Borrowed<'_> {
    /// # Safety
    ///
    /// `obj` must be null or a reference that stays valid for the lifetime of the value.
    pub unsafe fn from_raw(obj: sys::jobject) -> Self {
        Borrowed {
            obj,
            _lifetime: PhantomData,
        }
    }
}

impl Reference for Borrowed<'_> {
    fn as_raw(&self) -> sys::jobject {
        self.obj
    }
}
