use std::fmt;

use crate::sys;

/// A JNI interface version, as negotiated with the VM (`GetVersion()`) or requested from it.
#[derive(Copy, Clone, PartialEq, PartialOrd, Ord, Eq, Hash)]
#[repr(transparent)]
pub struct JNIVersion(u32);

macro_rules! jni_versions {
    ( $( $(#[$meta:meta])* $name:ident = $raw:ident ),* $(,)? ) => {
        impl JNIVersion {
            $(
                $(#[$meta])*
                pub const $name: Self = JNIVersion(sys::$raw as u32);
            )*
        }
    };
}

jni_versions! {
    V1_1 = JNI_VERSION_1_1,
    V1_2 = JNI_VERSION_1_2,
    V1_4 = JNI_VERSION_1_4,
    /// The first version where `DestroyJavaVM` reports a meaningful status.
    V1_6 = JNI_VERSION_1_6,
    V1_8 = JNI_VERSION_1_8,
    V9 = JNI_VERSION_9,
    V10 = JNI_VERSION_10,
    V19 = JNI_VERSION_19,
    V20 = JNI_VERSION_20,
    V21 = JNI_VERSION_21,
}

impl JNIVersion {
    pub fn new(raw: sys::jint) -> Self {
        JNIVersion(raw as u32)
    }

    pub fn major(&self) -> u16 {
        ((self.0 >> 16) & 0xff) as u16
    }

    pub fn minor(&self) -> u16 {
        (self.0 & 0xff) as u16
    }

    /// A zero version is what a failed or bogus `GetVersion()` looks like.
    pub fn is_valid(&self) -> bool {
        self.0 != 0
    }
}

impl Default for JNIVersion {
    fn default() -> Self {
        JNIVersion::V1_8
    }
}

impl From<sys::jint> for JNIVersion {
    fn from(raw: sys::jint) -> Self {
        JNIVersion::new(raw)
    }
}

impl From<JNIVersion> for sys::jint {
    fn from(version: JNIVersion) -> Self {
        version.0 as sys::jint
    }
}

impl fmt::Display for JNIVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major(), self.minor())
    }
}

impl fmt::Debug for JNIVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JNIVersion({self})")
    }
}
