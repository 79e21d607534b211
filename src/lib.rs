#![warn(missing_debug_implementations)]
#![allow(clippy::missing_safety_doc)]

//! # Embedding and driving a Java VM from Rust
//!
//! This crate manages the native side of a JNI bridge: it starts (or adopts) one Java VM per
//! process, attaches native threads to it, owns the references native code holds on Java
//! objects, and turns Java exceptions into Rust errors whose type follows the Java class
//! hierarchy.
//!
//! ## Overview
//!
//! - [`Jvm`] is the VM lifecycle: [`create`](Jvm::create) a VM through a
//!   [`VmLoader`](vm::loader::VmLoader), or [`adopt`](Jvm::adopt) one the process already runs;
//!   [`teardown`](Jvm::teardown) when done. At most one VM is registered at a time.
//! - [`Jvm::attach`] returns the calling thread's [`Env`], attaching the thread first if needed.
//!   Threads attached that way are detached automatically when they exit.
//! - [`refs`] holds the reference primitives. A [`GlobalRef`](refs::GlobalRef) can be dropped on
//!   any thread, more than once, and after the VM has gone.
//! - [`exceptions`] maps pending Java exceptions onto proxy types enlisted in a
//!   [`FactoryRegistry`](exceptions::FactoryRegistry).
//! - [`native_proxy`] implements Java interfaces with Rust closures.
//!
//! ## Starting a VM
//!
//! With the `invocation` feature, the VM library is found through `JAVA_HOME`:
//!
//! ```rust,no_run
//! # #[cfg(feature = "invocation")]
//! # fn main() -> jni_bridge::errors::Result<()> {
//! use jni_bridge::{
//!     vm::{loader::DefaultVmLoader, options::{OptionList, SystemProperty}},
//!     JNIVersion, Jvm,
//! };
//!
//! let loader = DefaultVmLoader::new(JNIVersion::V1_8)?;
//! let options = OptionList::new().with(SystemProperty::class_path("."));
//! let jvm = Jvm::global();
//! jvm.create(&loader, &options)?;
//!
//! let env = jvm.attach()?;
//! let greeting = env.new_string("Hello from Rust")?;
//! assert_eq!(env.object_to_string(&greeting)?, "Hello from Rust");
//!
//! jvm.teardown()?;
//! # Ok(())
//! # }
//! #
//! # #[cfg(not(feature = "invocation"))]
//! # fn main() {}
//! ```
//!
//! ## Exceptions
//!
//! Every [`Env`] call that can raise checks for a pending exception afterwards. The exception
//! is cleared and returned as [`Error::JavaException`](errors::Error::JavaException), carrying
//! the proxy of the most specific enlisted class, or as
//! [`Error::UnlinkedException`](errors::Error::UnlinkedException) when no class in its
//! hierarchy has a factory.
//!
//! ## Logging
//!
//! The crate logs through the [`log`](https://docs.rs/log) facade: attach/detach and lifecycle
//! changes at `debug`, recoverable surprises at `warn`, swallowed failures at `error`.

/// Bindgen-generated definitions
pub use jni_sys as sys;

#[macro_use]
mod macros;

pub mod errors;

mod version;
pub use crate::version::JNIVersion;

pub mod vm;
pub use crate::vm::Jvm;

mod env;
pub use crate::env::{Env, JMethodID, NativeMethod};

pub mod refs;

pub mod descriptor;

pub mod class_loader;

pub mod exceptions;

pub mod proxy;

pub mod lang;

pub mod value;

pub mod native_proxy;

pub mod shutdown_hook;

/// Directory of the compiled Java helper classes (`org.jnibridge.*`), when they were built with
/// the crate. Add it to the class path of a VM created with [`Jvm::create`] to use
/// [`native_proxy`] and [`shutdown_hook`].
pub const HELPER_CLASSES: Option<&str> = option_env!("JNI_BRIDGE_CLASSES");
