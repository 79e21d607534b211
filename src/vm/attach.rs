//! Attaching native threads to the registered VM.
//!
//! A thread attached through [`Jvm::attach`] (other than the thread that created or adopted the
//! VM) gets a thread-local hook that detaches it when the thread exits.

use std::{
    cell::RefCell,
    ffi::CString,
    ptr,
    sync::{atomic::Ordering, Arc, Weak},
    thread::{current, Thread},
};

use log::{debug, error, warn};

use crate::{
    env::Env,
    errors::*,
    refs::GlobalRef,
    vm::{
        lifecycle::{JvmState, VmRecord},
        runtime::{AttachRequest, RawEnv},
        Jvm,
    },
};

/// Whether an attached thread keeps the VM from shutting down.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Daemon {
    /// The thread that created or adopted the VM attaches as a normal thread, every other
    /// thread as a daemon.
    #[default]
    Auto,
    Daemon,
    NonDaemon,
}

/// Parameters for [`Jvm::attach_with`] and [`Jvm::with_env`].
#[derive(Debug, Default, Clone)]
pub struct AttachConfig<'a> {
    pub(crate) daemon: Daemon,
    pub(crate) name: Option<String>,
    pub(crate) group: Option<&'a GlobalRef>,
    pub(crate) scoped: bool,
}

impl<'a> AttachConfig<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn daemon(mut self, daemon: Daemon) -> Self {
        self.daemon = daemon;
        self
    }

    /// The Java name of the thread. Defaults to the Rust thread name, or `NativeThread-<id>`.
    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = Some(name.into());
        self
    }

    /// A `java.lang.ThreadGroup` for the thread.
    pub fn group(mut self, group: &'a GlobalRef) -> Self {
        self.group = Some(group);
        self
    }

    /// Detach again once [`Jvm::with_env`] returns, if that call did the attaching. Scoped
    /// attachments never get an auto-detach hook.
    pub fn scoped(mut self, scoped: bool) -> Self {
        self.scoped = scoped;
        self
    }
}

impl Jvm {
    /// Returns an environment for the calling thread, attaching it if necessary.
    ///
    /// Fails with [`Error::VmShutdown`] if no VM is registered and with
    /// [`Error::AttachFailed`] if the VM refuses the thread. Attaching an already attached
    /// thread returns its existing environment and registers nothing new.
    pub fn attach(&self) -> Result<Env> {
        self.attach_with(&AttachConfig::new())
    }

    /// [`attach`](Self::attach) with explicit parameters. The `scoped` flag is ignored here.
    pub fn attach_with(&self, config: &AttachConfig<'_>) -> Result<Env> {
        let state = self.inner.record.read();
        let record = state.as_ref().ok_or(Error::VmShutdown)?;
        let config = AttachConfig {
            scoped: false,
            ..config.clone()
        };
        let (raw, _) = self.attach_locked(record, &config)?;
        Ok(Env::new(self.clone(), record, raw))
    }

    /// Runs `f` with an environment for the calling thread.
    ///
    /// With a [`scoped`](AttachConfig::scoped) config, a thread that had to be attached for the
    /// call is detached again afterwards.
    pub fn with_env<T>(
        &self,
        config: &AttachConfig<'_>,
        f: impl FnOnce(&Env) -> Result<T>,
    ) -> Result<T> {
        let (env, attached_here) = {
            let state = self.inner.record.read();
            let record = state.as_ref().ok_or(Error::VmShutdown)?;
            let (raw, attached) = self.attach_locked(record, config)?;
            (Env::new(self.clone(), record, raw), attached)
        };
        let generation = env.generation();
        let result = f(&env);
        drop(env);

        if attached_here && config.scoped {
            self.with_generation(generation, |record| self.detach_locked(record));
        }
        result
    }

    /// Detaches the calling thread and cancels its auto-detach hook.
    ///
    /// Does nothing if no VM is registered. Failures are logged, never returned.
    pub fn detach(&self) {
        let state = self.inner.record.read();
        if let Some(record) = state.as_ref() {
            self.detach_locked(record);
        }
    }

    /// Whether the calling thread currently has an environment for the registered VM.
    pub fn is_thread_attached(&self) -> bool {
        self.inner
            .record
            .read()
            .as_ref()
            .is_some_and(|record| record.runtime.get_env(record.version).is_ok())
    }

    /// How many threads are attached through this lifecycle right now.
    pub fn threads_attached(&self) -> usize {
        self.inner.attached.load(Ordering::SeqCst)
    }

    /// Attaches the calling thread to `record`'s VM unless it already is.
    ///
    /// Returns the environment and whether this call attached the thread. The caller holds the
    /// state lock, so the VM can't be torn down underneath the attach.
    pub(crate) fn attach_locked(
        &self,
        record: &VmRecord,
        config: &AttachConfig<'_>,
    ) -> Result<(RawEnv, bool)> {
        match record.runtime.get_env(record.version) {
            Ok(env) => return Ok((env, false)),
            Err(JniError::ThreadDetached) => {}
            Err(err) => return Err(Error::AttachFailed(err)),
        }

        let thread = current();
        let is_main = thread.id() == record.main_thread;
        let daemon = match config.daemon {
            Daemon::Daemon => true,
            Daemon::NonDaemon => false,
            Daemon::Auto => !is_main,
        };
        let name = match &config.name {
            Some(name) => name.clone(),
            None => default_thread_name(&thread),
        };
        let name = CString::new(cesu8::to_java_cesu8(&name).into_owned())?;
        let request = AttachRequest {
            version: record.version,
            name: &name,
            group: config.group.map(GlobalRef::as_raw).unwrap_or(ptr::null_mut()),
            daemon,
        };
        let env = record
            .runtime
            .attach_current_thread(&request)
            .map_err(Error::AttachFailed)?;
        self.inner.attached.fetch_add(1, Ordering::SeqCst);

        debug!(
            "Attached thread {} ({:?}){}. {} threads attached",
            name.to_string_lossy(),
            thread.id(),
            if daemon { " as daemon" } else { "" },
            self.threads_attached()
        );

        if !is_main && !config.scoped {
            register_auto_detach(self, record.generation, thread);
        }
        Ok((env, true))
    }

    pub(crate) fn detach_locked(&self, record: &VmRecord) {
        cancel_auto_detach(&self.inner, record.generation);

        let thread = current();
        if record.runtime.get_env(record.version).is_err() {
            debug!(
                "Thread {} ({:?}) isn't attached, nothing to detach",
                thread.name().unwrap_or_default(),
                thread.id()
            );
            return;
        }
        self.sys_detach(record, &thread);
    }

    fn sys_detach(&self, record: &VmRecord, thread: &Thread) {
        if let Err(err) = record.runtime.detach_current_thread() {
            error!(
                "Error detaching thread {} ({:?}): {err}",
                thread.name().unwrap_or_default(),
                thread.id()
            );
            return;
        }
        let _ = self
            .inner
            .attached
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        debug!(
            "Detached thread {} ({:?}). {} threads attached",
            thread.name().unwrap_or_default(),
            thread.id(),
            self.threads_attached()
        );
    }
}

fn default_thread_name(thread: &Thread) -> String {
    match thread.name() {
        Some(name) => name.to_owned(),
        None => {
            let id = format!("{:?}", thread.id());
            let id = id.trim_start_matches("ThreadId(").trim_end_matches(')');
            format!("NativeThread-{id}")
        }
    }
}

/// A pending detach of the current thread from one registered VM.
struct AutoDetach {
    vm: Weak<JvmState>,
    generation: u64,
    thread: Thread,
}

impl AutoDetach {
    fn run(self) {
        let Some(inner) = self.vm.upgrade() else {
            return;
        };
        let jvm = Jvm { inner };
        let detached = jvm.with_generation(self.generation, |record| {
            if record.runtime.get_env(record.version).is_ok() {
                jvm.sys_detach(record, &self.thread);
            }
        });
        if detached.is_none() {
            debug!(
                "Thread {} ({:?}) exited after its VM went away, nothing to detach",
                self.thread.name().unwrap_or_default(),
                self.thread.id()
            );
        }
    }
}

/// Runs every pending detach when the thread's locals are destroyed.
#[derive(Default)]
struct AutoDetachHooks(Vec<AutoDetach>);

impl Drop for AutoDetachHooks {
    fn drop(&mut self) {
        for hook in self.0.drain(..) {
            hook.run();
        }
    }
}

thread_local! {
    static AUTO_DETACH: RefCell<AutoDetachHooks> = RefCell::new(AutoDetachHooks::default());
}

fn register_auto_detach(jvm: &Jvm, generation: u64, thread: Thread) {
    let registered = AUTO_DETACH.try_with(|hooks| {
        let mut hooks = hooks.borrow_mut();
        // Hooks of VMs that have since gone away are dead weight.
        hooks.0.retain(|hook| hook.vm.strong_count() > 0);
        hooks.0.push(AutoDetach {
            vm: Arc::downgrade(&jvm.inner),
            generation,
            thread,
        });
    });
    if registered.is_err() {
        warn!("Thread is exiting; it will not be detached automatically");
    }
}

fn cancel_auto_detach(state: &Arc<JvmState>, generation: u64) {
    // Fails while the thread's locals are being destroyed, when there is nothing left to cancel.
    let _ = AUTO_DETACH.try_with(|hooks| {
        hooks.borrow_mut().0.retain(|hook| {
            !(hook.generation == generation && ptr::eq(hook.vm.as_ptr(), Arc::as_ptr(state)))
        });
    });
}
