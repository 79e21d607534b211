//! Ways of locating and starting a VM implementation.

use std::sync::Arc;

use crate::{errors::*, vm::init_args::InitArgs, vm::runtime::Runtime, JNIVersion};

cfg_if::cfg_if! {
    if #[cfg(windows)] {
        /// The platform specific file name of the VM shared library.
        pub const LIBJVM_NAME: &str = "jvm.dll";
    } else if #[cfg(any(target_os = "macos", target_os = "ios"))] {
        /// The platform specific file name of the VM shared library.
        pub const LIBJVM_NAME: &str = "libjvm.dylib";
    } else {
        /// The platform specific file name of the VM shared library.
        pub const LIBJVM_NAME: &str = "libjvm.so";
    }
}

/// Starts a VM for [`Jvm::create`](crate::Jvm::create).
pub trait VmLoader: Send + Sync {
    /// The JNI version to request from the VM.
    fn jni_version(&self) -> JNIVersion;

    /// Creates and starts a VM with `args`, blocking until it has bootstrapped.
    ///
    /// On success the calling thread is attached to the new VM, as `JNI_CreateJavaVM` does.
    /// Failures carry the status code as [`Error::VmCreation`].
    fn create_java_vm(&self, args: &InitArgs) -> Result<Arc<dyn Runtime>>;
}

#[cfg(all(feature = "invocation", not(target_os = "android")))]
pub use self::library::{DefaultVmLoader, LibraryVmLoader};

#[cfg(all(feature = "invocation", not(target_os = "android")))]
mod library {
    use std::{
        ffi::{c_void, OsStr},
        path::PathBuf,
        ptr,
        sync::Arc,
    };

    use log::debug;

    use super::{VmLoader, LIBJVM_NAME};
    use crate::{
        errors::*,
        sys,
        vm::{init_args::InitArgs, runtime::Runtime, JavaVM},
        JNIVersion,
    };

    type CreateJavaVmFn = unsafe extern "system" fn(
        pvm: *mut *mut sys::JavaVM,
        penv: *mut *mut c_void,
        args: *mut c_void,
    ) -> sys::jint;

    type GetCreatedJavaVmsFn = unsafe extern "system" fn(
        vm_buf: *mut *mut sys::JavaVM,
        buf_len: sys::jsize,
        n_vms: *mut sys::jsize,
    ) -> sys::jint;

    /// Loads the VM from a given shared library.
    #[derive(Debug)]
    pub struct LibraryVmLoader {
        path: String,
        version: JNIVersion,
        library: Arc<libloading::Library>,
        create_fn: CreateJavaVmFn,
        created_vms_fn: GetCreatedJavaVmsFn,
    }

    impl LibraryVmLoader {
        /// Loads `path` and resolves `JNI_CreateJavaVM` and `JNI_GetCreatedJavaVMs` from it.
        pub fn new(path: impl AsRef<OsStr>, version: JNIVersion) -> Result<Self> {
            let display = path.as_ref().to_string_lossy().into_owned();
            let library = unsafe { libloading::Library::new(path.as_ref()) }
                .map_err(|error| Error::LoadError(display.clone(), error))?;

            let (create_fn, created_vms_fn) = unsafe {
                let create = library
                    .get::<CreateJavaVmFn>(b"JNI_CreateJavaVM\0")
                    .map_err(|error| Error::LoadError(display.clone(), error))?;
                let created = library
                    .get::<GetCreatedJavaVmsFn>(b"JNI_GetCreatedJavaVMs\0")
                    .map_err(|error| Error::LoadError(display.clone(), error))?;
                (*create, *created)
            };

            debug!("Loaded Java VM library from {display}");
            Ok(LibraryVmLoader {
                path: display,
                version,
                library: Arc::new(library),
                create_fn,
                created_vms_fn,
            })
        }

        pub fn path(&self) -> &str {
            &self.path
        }

        /// VMs already running in this process according to `JNI_GetCreatedJavaVMs`.
        pub fn created_java_vms(&self) -> Result<Vec<JavaVM>> {
            let mut count: sys::jsize = 0;
            let res = unsafe { (self.created_vms_fn)(ptr::null_mut(), 0, &mut count) };
            jni_error_code_to_result(res)?;

            let mut vms = vec![ptr::null_mut(); count as usize];
            let res = unsafe { (self.created_vms_fn)(vms.as_mut_ptr(), count, &mut count) };
            jni_error_code_to_result(res)?;
            vms.truncate(count as usize);

            vms.into_iter()
                .map(|vm| unsafe { JavaVM::from_raw(vm) })
                .collect()
        }
    }

    impl VmLoader for LibraryVmLoader {
        fn jni_version(&self) -> JNIVersion {
            self.version
        }

        fn create_java_vm(&self, args: &InitArgs) -> Result<Arc<dyn Runtime>> {
            let mut vm: *mut sys::JavaVM = ptr::null_mut();
            let mut env: *mut sys::JNIEnv = ptr::null_mut();
            let res = unsafe {
                (self.create_fn)(
                    &mut vm,
                    &mut env as *mut *mut sys::JNIEnv as *mut *mut c_void,
                    args.as_raw(),
                )
            };
            jni_error_code_to_result(res).map_err(Error::VmCreation)?;
            let vm = unsafe { JavaVM::from_raw(vm)? };

            // The VM can't be unloaded once it has run: keep the library mapped for good.
            std::mem::forget(Arc::clone(&self.library));

            Ok(Arc::new(vm))
        }
    }

    /// Locates the VM library of the installed JDK/JRE (honouring `JAVA_HOME`), falling back to
    /// the platform's library search path.
    #[derive(Debug)]
    pub struct DefaultVmLoader(LibraryVmLoader);

    impl DefaultVmLoader {
        pub fn new(version: JNIVersion) -> Result<Self> {
            let located = java_locator::locate_jvm_dyn_library().map(|dir| {
                PathBuf::from(dir).join(java_locator::get_jvm_dyn_lib_file_name())
            });
            let loader = match located {
                Ok(path) => LibraryVmLoader::new(path, version)?,
                Err(err) => {
                    debug!("Java VM not located ({err}), trying {LIBJVM_NAME} on the search path");
                    LibraryVmLoader::new(LIBJVM_NAME, version).map_err(|_| Error::NotFound(err))?
                }
            };
            Ok(DefaultVmLoader(loader))
        }

        pub fn library(&self) -> &LibraryVmLoader {
            &self.0
        }
    }

    impl VmLoader for DefaultVmLoader {
        fn jni_version(&self) -> JNIVersion {
            self.0.jni_version()
        }

        fn create_java_vm(&self, args: &InitArgs) -> Result<Arc<dyn Runtime>> {
            self.0.create_java_vm(args)
        }
    }
}
