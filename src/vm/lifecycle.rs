use std::{
    fmt, ptr,
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
    thread::{self, ThreadId},
};

use log::{debug, error};
use once_cell::sync::Lazy;
use parking_lot::{RwLock, RwLockUpgradableReadGuard};

use crate::{
    errors::*,
    sys,
    vm::{
        attach::AttachConfig, loader::VmLoader, options::OptionList, runtime::Runtime, JavaVM,
    },
    JNIVersion,
};

/// Identifies one Create/Adopt so that references and auto-detach hooks from an earlier VM can
/// tell it has gone, even once a new one is registered.
static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

static GLOBAL: Lazy<Jvm> = Lazy::new(Jvm::new);

/// What is known about the registered VM.
#[derive(Clone)]
pub(crate) struct VmRecord {
    pub(crate) runtime: Arc<dyn Runtime>,
    pub(crate) version: JNIVersion,
    pub(crate) main_thread: ThreadId,
    pub(crate) owned: bool,
    pub(crate) generation: u64,
}

impl fmt::Debug for VmRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VmRecord")
            .field("vm", &self.runtime.raw())
            .field("version", &self.version)
            .field("main_thread", &self.main_thread)
            .field("owned", &self.owned)
            .field("generation", &self.generation)
            .finish()
    }
}

pub(crate) struct JvmState {
    pub(crate) record: RwLock<Option<VmRecord>>,
    pub(crate) attached: AtomicUsize,
}

/// The lifecycle state of a VM: whether one is running, and which.
///
/// A `Jvm` is a cheap handle; clones share the same state. The process normally uses the
/// [`global`](Jvm::global) instance, which is what proxies, class descriptors and native
/// callbacks go through. Separate instances exist so that tests can run several lifecycles side
/// by side.
///
/// ```text
/// Unstarted --create/adopt--> Running (owned | adopted) --teardown--> Unstarted
/// ```
///
/// Reads (attach, [`is_running`](Jvm::is_running), [`handle`](Jvm::handle)) share the lock;
/// create, adopt and teardown take it exclusively.
#[derive(Clone)]
pub struct Jvm {
    pub(crate) inner: Arc<JvmState>,
}

impl fmt::Debug for Jvm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Jvm")
            .field("record", &self.inner.record.try_read().map(|r| r.clone()))
            .finish()
    }
}

impl Default for Jvm {
    fn default() -> Self {
        Self::new()
    }
}

impl Jvm {
    /// A fresh, unstarted lifecycle.
    pub fn new() -> Self {
        Jvm {
            inner: Arc::new(JvmState {
                record: RwLock::new(None),
                attached: AtomicUsize::new(0),
            }),
        }
    }

    /// The process-wide lifecycle.
    pub fn global() -> &'static Jvm {
        &GLOBAL
    }

    /// Starts a VM through `loader` and registers it as owned.
    ///
    /// The calling thread becomes the "main" thread: it stays attached as a non-daemon thread
    /// and [`teardown`](Self::teardown) will destroy the VM.
    ///
    /// Fails with [`Error::VmRunning`] if a VM is already registered, and with
    /// [`Error::VmCreation`] if the loader can't start one.
    pub fn create(&self, loader: &dyn VmLoader, options: &OptionList) -> Result<()> {
        let state = self.inner.record.upgradable_read();
        if state.is_some() {
            return Err(Error::VmRunning);
        }

        let runtime = {
            let args = options.to_init_args(loader.jni_version())?;
            loader.create_java_vm(&args)?
        };
        let record = match self.register(Arc::clone(&runtime), loader.jni_version(), true) {
            Ok(record) => record,
            Err(err) => {
                if let Err(destroy_err) = runtime.destroy() {
                    error!("Failed to destroy a Java VM that couldn't be registered: {destroy_err}");
                }
                return Err(err);
            }
        };

        debug!(
            "Created Java VM {:?} (JNI {}) on thread {:?}",
            record.runtime.raw(),
            record.version,
            record.main_thread
        );
        *RwLockUpgradableReadGuard::upgrade(state) = Some(record);
        Ok(())
    }

    /// Registers a VM that was started elsewhere, e.g. by the `java` launcher before loading
    /// this library.
    ///
    /// The VM is not owned: [`teardown`](Self::teardown) only forgets it.
    ///
    /// # Safety
    ///
    /// `vm` must point to a running VM that stays alive until it is torn down here.
    pub unsafe fn adopt(&self, vm: *mut sys::JavaVM, version: JNIVersion) -> Result<()> {
        let vm = unsafe { JavaVM::from_raw(vm)? };
        self.adopt_runtime(Arc::new(vm), version)
    }

    /// Like [`adopt`](Self::adopt), for any [`Runtime`].
    pub fn adopt_runtime(&self, runtime: Arc<dyn Runtime>, version: JNIVersion) -> Result<()> {
        if !version.is_valid() {
            return Err(Error::bridge(
                "Unable to adopt the virtual machine: its JNI version is 0",
            ));
        }

        let state = self.inner.record.upgradable_read();
        if state.is_some() {
            return Err(Error::VmRunning);
        }
        let mut record = self.register(runtime, version, false)?;
        record.version = version;

        debug!(
            "Adopted Java VM {:?} (JNI {}) on thread {:?}",
            record.runtime.raw(),
            record.version,
            record.main_thread
        );
        *RwLockUpgradableReadGuard::upgrade(state) = Some(record);
        Ok(())
    }

    /// Makes sure the calling thread is attached (non-daemon) and reads the negotiated version.
    fn register(
        &self,
        runtime: Arc<dyn Runtime>,
        version: JNIVersion,
        owned: bool,
    ) -> Result<VmRecord> {
        let mut record = VmRecord {
            runtime,
            version,
            main_thread: thread::current().id(),
            owned,
            generation: NEXT_GENERATION.fetch_add(1, Ordering::SeqCst),
        };
        let (env, attached_here) = self.attach_locked(&record, &AttachConfig::new())?;
        if owned && !attached_here {
            // Attached by the loader's JNI_CreateJavaVM.
            self.inner.attached.fetch_add(1, Ordering::SeqCst);
        }
        record.version = unsafe { record.runtime.get_version(env) };
        Ok(record)
    }

    /// Forgets the registered VM, destroying it first if it is owned.
    ///
    /// Destruction blocks until the VM has shut down, including its own shutdown hooks; it runs
    /// after the state has been cleared, so other threads see the VM as gone from that point on.
    /// A VM that predates JNI 1.6 doesn't report a meaningful status from `DestroyJavaVM`, so
    /// its failures are ignored.
    ///
    /// Calling this without a registered VM does nothing.
    pub fn teardown(&self) -> Result<()> {
        let Some(record) = self.take_record() else {
            return Ok(());
        };
        debug!(
            "Tearing down Java VM {:?} ({})",
            record.runtime.raw(),
            if record.owned { "owned" } else { "adopted" }
        );
        if !record.owned {
            return Ok(());
        }

        match record.runtime.destroy() {
            Ok(()) => Ok(()),
            Err(err) if record.version < JNIVersion::V1_6 => {
                debug!("Ignoring DestroyJavaVM failure from a JNI {} VM: {err}", record.version);
                Ok(())
            }
            Err(err) => Err(Error::VmDestroy(err)),
        }
    }

    /// Forgets the registered VM without destroying it.
    pub fn reset(&self) {
        if let Some(record) = self.take_record() {
            debug!("Reset Java VM {:?}", record.runtime.raw());
        }
    }

    /// Tears down an owned VM (falling back to [`reset`](Self::reset) if that fails) or resets
    /// an adopted one. Never fails.
    pub fn cleanup(&self) {
        if self.is_owned() {
            if let Err(err) = self.teardown() {
                error!("Failed to destroy the Java VM during cleanup: {err}");
                self.reset();
            }
        } else {
            self.reset();
        }
    }

    fn take_record(&self) -> Option<VmRecord> {
        let record = self.inner.record.write().take();
        if record.is_some() {
            self.inner.attached.store(0, Ordering::SeqCst);
        }
        record
    }

    /// Whether a VM is registered. Returns `false` instead of waiting while the state is being
    /// changed by another thread.
    pub fn is_running(&self) -> bool {
        self.inner
            .record
            .try_read()
            .map(|state| state.is_some())
            .unwrap_or(false)
    }

    /// The raw `JavaVM` pointer, or null if no VM is registered.
    pub fn handle(&self) -> *mut sys::JavaVM {
        self.inner
            .record
            .read()
            .as_ref()
            .map(|record| record.runtime.raw())
            .unwrap_or(ptr::null_mut())
    }

    /// The negotiated JNI version of the registered VM.
    pub fn version(&self) -> Option<JNIVersion> {
        self.inner.record.read().as_ref().map(|record| record.version)
    }

    /// Whether the registered VM was created here (and will be destroyed on teardown).
    pub fn is_owned(&self) -> bool {
        self.inner
            .record
            .read()
            .as_ref()
            .is_some_and(|record| record.owned)
    }

    /// A snapshot of the registered VM.
    pub(crate) fn record(&self) -> Result<VmRecord> {
        self.inner
            .record
            .read_recursive()
            .clone()
            .ok_or(Error::VmShutdown)
    }

    /// Runs `f` only if the VM that was registered as `generation` still is, holding the state
    /// so that it can't be torn down meanwhile.
    pub(crate) fn with_generation<T>(
        &self,
        generation: u64,
        f: impl FnOnce(&VmRecord) -> T,
    ) -> Option<T> {
        let state = self.inner.record.read_recursive();
        state
            .as_ref()
            .filter(|record| record.generation == generation)
            .map(f)
    }

    /// Whether `generation` is still the registered VM.
    pub(crate) fn is_generation_live(&self, generation: u64) -> bool {
        self.with_generation(generation, |_| ()).is_some()
    }
}
