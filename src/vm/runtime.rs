use std::{ffi::CStr, fmt};

use crate::{errors::*, sys, JNIVersion};

/// The raw per-thread environment pointer handed out by a [`Runtime`].
pub type RawEnv = *mut sys::JNIEnv;

/// Parameters for attaching the calling thread.
#[derive(Debug, Clone, Copy)]
pub struct AttachRequest<'a> {
    pub version: JNIVersion,
    pub name: &'a CStr,
    pub group: sys::jobject,
    pub daemon: bool,
}

/// The invocation-level operations of one running VM, plus the reference primitives.
///
/// [`JavaVM`](crate::vm::JavaVM) implements this over the real invocation interface. Everything
/// that attaches threads or creates and deletes references goes through this trait, so another
/// implementation can stand in for a VM in tests.
///
/// # Safety
///
/// Implementations must uphold the JNI contract for the functions they stand for: the
/// environment pointers returned by [`get_env`](Runtime::get_env) and
/// [`attach_current_thread`](Runtime::attach_current_thread) must be valid for the calling
/// thread until it is detached, and the reference functions must accept those pointers.
pub unsafe trait Runtime: fmt::Debug + Send + Sync + 'static {
    /// The raw `JavaVM` pointer, or null for runtimes that are not backed by one.
    fn raw(&self) -> *mut sys::JavaVM;

    /// `GetEnv`: fails with `JniError::ThreadDetached` if the calling thread isn't attached.
    fn get_env(&self, version: JNIVersion) -> std::result::Result<RawEnv, JniError>;

    /// `AttachCurrentThread` / `AttachCurrentThreadAsDaemon`
    fn attach_current_thread(
        &self,
        request: &AttachRequest<'_>,
    ) -> std::result::Result<RawEnv, JniError>;

    /// `DetachCurrentThread`
    fn detach_current_thread(&self) -> std::result::Result<(), JniError>;

    /// `DestroyJavaVM`. Blocks until the VM has shut down.
    fn destroy(&self) -> std::result::Result<(), JniError>;

    /// `GetVersion`
    ///
    /// # Safety
    ///
    /// `env` must be valid for the calling thread.
    unsafe fn get_version(&self, env: RawEnv) -> JNIVersion;

    /// `NewLocalRef`, null on failure.
    ///
    /// # Safety
    ///
    /// `env` must be valid for the calling thread and `obj` a live reference.
    unsafe fn new_local_ref(&self, env: RawEnv, obj: sys::jobject) -> sys::jobject;

    /// `DeleteLocalRef`
    ///
    /// # Safety
    ///
    /// `obj` must be a local reference owned by the caller in the current frame.
    unsafe fn delete_local_ref(&self, env: RawEnv, obj: sys::jobject);

    /// `NewGlobalRef`, null on failure.
    ///
    /// # Safety
    ///
    /// `env` must be valid for the calling thread and `obj` a live reference.
    unsafe fn new_global_ref(&self, env: RawEnv, obj: sys::jobject) -> sys::jobject;

    /// `DeleteGlobalRef`
    ///
    /// # Safety
    ///
    /// `obj` must be a global reference owned by the caller, deleted at most once.
    unsafe fn delete_global_ref(&self, env: RawEnv, obj: sys::jobject);
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// A VM every thread is already attached to.
    #[derive(Debug)]
    pub(crate) struct Attached;

    unsafe impl Runtime for Attached {
        fn raw(&self) -> *mut sys::JavaVM {
            self as *const Self as *mut sys::JavaVM
        }

        fn get_env(&self, _version: JNIVersion) -> std::result::Result<RawEnv, JniError> {
            Ok(0x10 as RawEnv)
        }

        fn attach_current_thread(
            &self,
            _request: &AttachRequest<'_>,
        ) -> std::result::Result<RawEnv, JniError> {
            Ok(0x10 as RawEnv)
        }

        fn detach_current_thread(&self) -> std::result::Result<(), JniError> {
            Ok(())
        }

        fn destroy(&self) -> std::result::Result<(), JniError> {
            Ok(())
        }

        unsafe fn get_version(&self, _env: RawEnv) -> JNIVersion {
            JNIVersion::V1_8
        }

        unsafe fn new_local_ref(&self, _env: RawEnv, obj: sys::jobject) -> sys::jobject {
            obj
        }

        unsafe fn delete_local_ref(&self, _env: RawEnv, _obj: sys::jobject) {}

        unsafe fn new_global_ref(&self, _env: RawEnv, obj: sys::jobject) -> sys::jobject {
            obj
        }

        unsafe fn delete_global_ref(&self, _env: RawEnv, _obj: sys::jobject) {}
    }
}
