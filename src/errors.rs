//! Error types shared by every part of the bridge.

use thiserror::Error;

use crate::{exceptions::JavaException, sys};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// No VM is registered (never started, or already torn down).
    #[error("The virtual machine is shut down")]
    VmShutdown,

    #[error("The virtual machine is already running")]
    VmRunning,

    #[error("Unable to create the virtual machine. The error was {0}")]
    VmCreation(JniError),

    #[error("Unable to destroy the virtual machine. The error was {0}")]
    VmDestroy(JniError),

    #[error("Unable to attach the current thread. The specific JNI error code is {0}")]
    AttachFailed(JniError),

    #[error(
        "Unable to create a new local reference. It is likely that you have exceeded the maximum \
         local reference count. You can increase the maximum by calling EnsureLocalCapacity()"
    )]
    LocalRefExhausted,

    #[error(
        "Unable to create a new global reference. It is likely that you have exceeded the max \
         heap size of your virtual machine"
    )]
    GlobalRefExhausted,

    #[error("JNI call failed")]
    JniCall(#[source] JniError),

    /// A Java exception mapped onto the proxy type registered for it (or one of its ancestors).
    #[error("{0}")]
    JavaException(JavaException),

    /// A Java exception none of whose classes has a registered factory.
    #[error("Can't find any linked-in parent exception for `{class}`")]
    UnlinkedException { class: String },

    /// A failure inside the bridge itself, optionally with the Java cause appended.
    #[error("{0}")]
    Bridge(String),

    #[error("null pointer in {0}")]
    NullPtr(&'static str),

    #[error("Invalid VM option `{option}`: {reason}")]
    InvalidOption { option: String, reason: &'static str },

    #[error("Interior NUL in string passed to the VM")]
    NulInString(#[from] std::ffi::NulError),

    #[cfg(feature = "invocation")]
    #[error("Couldn't automatically discover the Java VM's location (try setting JAVA_HOME): {0}")]
    NotFound(#[from] java_locator::errors::JavaLocatorError),

    #[cfg(feature = "invocation")]
    #[error("Couldn't load the Java VM shared library ({0}): {1}")]
    LoadError(String, #[source] libloading::Error),
}

impl Error {
    /// `true` for a bridged Java exception, matched or not.
    pub fn is_java_exception(&self) -> bool {
        matches!(self, Error::JavaException(_) | Error::UnlinkedException { .. })
    }

    pub(crate) fn bridge(msg: impl Into<String>) -> Self {
        Error::Bridge(msg.into())
    }
}

/// Raw JNI status codes
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum JniError {
    #[error("Unknown error")]
    Unknown,
    #[error("Current thread is not attached to the Java VM")]
    ThreadDetached,
    #[error("JNI version error")]
    WrongVersion,
    #[error("Not enough memory")]
    NoMemory,
    #[error("VM already created")]
    AlreadyCreated,
    #[error("Invalid arguments")]
    InvalidArguments,
    #[error("Error code {0}")]
    Other(sys::jint),
}

impl JniError {
    /// The raw status code this error was built from.
    pub fn code(&self) -> sys::jint {
        match *self {
            JniError::Unknown => sys::JNI_ERR,
            JniError::ThreadDetached => sys::JNI_EDETACHED,
            JniError::WrongVersion => sys::JNI_EVERSION,
            JniError::NoMemory => sys::JNI_ENOMEM,
            JniError::AlreadyCreated => sys::JNI_EEXIST,
            JniError::InvalidArguments => sys::JNI_EINVAL,
            JniError::Other(code) => code,
        }
    }

    fn from_code(code: sys::jint) -> Self {
        match code {
            sys::JNI_EDETACHED => JniError::ThreadDetached,
            sys::JNI_EVERSION => JniError::WrongVersion,
            sys::JNI_ENOMEM => JniError::NoMemory,
            sys::JNI_EEXIST => JniError::AlreadyCreated,
            sys::JNI_EINVAL => JniError::InvalidArguments,
            sys::JNI_ERR => JniError::Unknown,
            _ => JniError::Other(code),
        }
    }
}

impl From<JniError> for Error {
    fn from(err: JniError) -> Self {
        Error::JniCall(err)
    }
}

/// Converts a JNI status code into a `Result`, with `JNI_OK` mapping to `Ok(())`.
pub fn jni_error_code_to_result(code: sys::jint) -> std::result::Result<(), JniError> {
    match code {
        sys::JNI_OK => Ok(()),
        code => Err(JniError::from_code(code)),
    }
}
