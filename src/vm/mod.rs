//! VM lifecycle, thread attachment and VM startup.

mod attach;
mod java_vm;
mod lifecycle;
mod runtime;

pub mod init_args;
pub mod loader;
pub mod options;

pub use self::{
    attach::{AttachConfig, Daemon},
    java_vm::JavaVM,
    lifecycle::Jvm,
    runtime::{AttachRequest, RawEnv, Runtime},
};

pub(crate) use self::lifecycle::VmRecord;

#[cfg(test)]
pub(crate) use self::runtime::test_support;
