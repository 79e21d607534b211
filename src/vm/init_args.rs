use std::{
    ffi::{c_void, CStr, CString},
    ptr,
};

use crate::{errors::*, sys, vm::options::VmOption, JNIVersion};

/// The translated option array for `JNI_CreateJavaVM`.
///
/// Owns every option string; dropping it releases them, which
/// [`Jvm::create`](crate::Jvm::create) does as soon as the creation call returns.
#[derive(Debug)]
pub struct InitArgs {
    inner: sys::JavaVMInitArgs,
    options: Vec<sys::JavaVMOption>,
    strings: Vec<CString>,
}

// The raw pointers only ever point into `strings` and `options`, which this value owns.
unsafe impl Send for InitArgs {}
unsafe impl Sync for InitArgs {}

impl InitArgs {
    pub(crate) fn new(
        version: JNIVersion,
        ignore_unrecognized: bool,
        options: &[VmOption],
    ) -> Result<Self> {
        let strings = options
            .iter()
            .map(|opt| CString::new(opt.option_string()))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut options: Vec<_> = options
            .iter()
            .zip(&strings)
            .map(|(opt, string)| sys::JavaVMOption {
                optionString: string.as_ptr() as *mut _,
                extraInfo: opt.extra_info(),
            })
            .collect();

        let inner = sys::JavaVMInitArgs {
            version: version.into(),
            ignoreUnrecognized: ignore_unrecognized as _,
            options: if options.is_empty() {
                ptr::null_mut()
            } else {
                options.as_mut_ptr()
            },
            nOptions: options.len() as _,
        };

        Ok(InitArgs {
            inner,
            options,
            strings,
        })
    }

    pub fn version(&self) -> JNIVersion {
        JNIVersion::new(self.inner.version)
    }

    pub fn ignore_unrecognized(&self) -> bool {
        self.inner.ignoreUnrecognized == sys::JNI_TRUE
    }

    /// The option strings, in order.
    pub fn option_strings(&self) -> impl Iterator<Item = &CStr> {
        self.strings.iter().map(CString::as_c_str)
    }

    /// The `extraInfo` of each option, in order.
    pub fn extra_infos(&self) -> impl Iterator<Item = *mut c_void> + '_ {
        self.options.iter().map(|opt| opt.extraInfo)
    }

    /// Pointer to pass as the `args` of `JNI_CreateJavaVM`, valid while `self` is alive.
    pub fn as_raw(&self) -> *mut c_void {
        &self.inner as *const sys::JavaVMInitArgs as *mut c_void
    }
}
