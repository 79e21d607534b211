use std::{ffi::c_void, ptr};

use crate::{
    errors::*,
    sys,
    vm::runtime::{AttachRequest, RawEnv, Runtime},
    JNIVersion,
};

/// A real VM behind a raw `JavaVM` pointer.
///
/// The pointer may be shared between threads; everything thread-specific happens through the
/// environment pointers returned by `GetEnv` / `AttachCurrentThread`.
#[derive(Debug)]
#[repr(transparent)]
pub struct JavaVM(*mut sys::JavaVM);

unsafe impl Send for JavaVM {}
unsafe impl Sync for JavaVM {}

impl JavaVM {
    /// Wraps a raw `JavaVM` pointer.
    ///
    /// # Safety
    ///
    /// `ptr` must point to a live VM that outlives the returned value.
    pub unsafe fn from_raw(ptr: *mut sys::JavaVM) -> Result<Self> {
        let ptr = null_check!(ptr, "JavaVM::from_raw ptr")?;
        Ok(JavaVM(ptr))
    }

    pub fn get_raw(&self) -> *mut sys::JavaVM {
        self.0
    }
}

unsafe impl Runtime for JavaVM {
    fn raw(&self) -> *mut sys::JavaVM {
        self.0
    }

    fn get_env(&self, version: JNIVersion) -> std::result::Result<RawEnv, JniError> {
        let mut env = ptr::null_mut();
        let res = unsafe {
            java_vm_call_unchecked!(self.0, v1_2, GetEnv, &mut env, version.into())
        };
        jni_error_code_to_result(res)?;
        Ok(env as RawEnv)
    }

    fn attach_current_thread(
        &self,
        request: &AttachRequest<'_>,
    ) -> std::result::Result<RawEnv, JniError> {
        let mut env = ptr::null_mut();
        let mut args = sys::JavaVMAttachArgs {
            version: request.version.into(),
            name: request.name.as_ptr() as *mut _,
            group: request.group,
        };
        let args = &mut args as *mut sys::JavaVMAttachArgs as *mut c_void;
        let res = unsafe {
            if request.daemon {
                java_vm_call_unchecked!(self.0, v1_4, AttachCurrentThreadAsDaemon, &mut env, args)
            } else {
                java_vm_call_unchecked!(self.0, v1_1, AttachCurrentThread, &mut env, args)
            }
        };
        jni_error_code_to_result(res)?;
        Ok(env as RawEnv)
    }

    fn detach_current_thread(&self) -> std::result::Result<(), JniError> {
        let res = unsafe { java_vm_call_unchecked!(self.0, v1_1, DetachCurrentThread) };
        jni_error_code_to_result(res)
    }

    fn destroy(&self) -> std::result::Result<(), JniError> {
        let res = unsafe { java_vm_call_unchecked!(self.0, v1_1, DestroyJavaVM) };
        jni_error_code_to_result(res)
    }

    unsafe fn get_version(&self, env: RawEnv) -> JNIVersion {
        unsafe { JNIVersion::new(jni_call_unchecked!(env, v1_1, GetVersion)) }
    }

    unsafe fn new_local_ref(&self, env: RawEnv, obj: sys::jobject) -> sys::jobject {
        unsafe { jni_call_unchecked!(env, v1_2, NewLocalRef, obj) }
    }

    unsafe fn delete_local_ref(&self, env: RawEnv, obj: sys::jobject) {
        unsafe { jni_call_unchecked!(env, v1_1, DeleteLocalRef, obj) }
    }

    unsafe fn new_global_ref(&self, env: RawEnv, obj: sys::jobject) -> sys::jobject {
        unsafe { jni_call_unchecked!(env, v1_1, NewGlobalRef, obj) }
    }

    unsafe fn delete_global_ref(&self, env: RawEnv, obj: sys::jobject) {
        unsafe { jni_call_unchecked!(env, v1_1, DeleteGlobalRef, obj) }
    }
}
