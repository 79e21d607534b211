//! A stand-in VM that records what the bridge asks of it, so the lifecycle, attachment and
//! reference rules can be checked without starting Java.
#![allow(dead_code)]

use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    thread::{self, ThreadId},
};

use jni_bridge::{
    errors::{Error, JniError, Result},
    refs::{Borrowed, GlobalRef},
    sys,
    vm::{init_args::InitArgs, loader::VmLoader, AttachRequest, RawEnv, Runtime},
    Env, JNIVersion,
};

#[cfg(feature = "invocation")]
pub mod jvm;

/// One attachment as the VM saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub name: String,
    pub daemon: bool,
    env: usize,
}

#[derive(Debug)]
pub struct FakeRuntime {
    version: JNIVersion,
    destroy_error: Option<JniError>,
    attach_error: Mutex<Option<JniError>>,
    exhausted: AtomicBool,
    threads: Mutex<HashMap<ThreadId, Attachment>>,
    history: Mutex<Vec<Attachment>>,
    globals: Mutex<HashSet<usize>>,
    next_env: AtomicUsize,
    next_ref: AtomicUsize,
    attaches: AtomicUsize,
    detaches: AtomicUsize,
    destroys: AtomicUsize,
    globals_created: AtomicUsize,
    globals_deleted: AtomicUsize,
    bad_global_deletes: AtomicUsize,
    locals_created: AtomicUsize,
    locals_deleted: AtomicUsize,
}

impl FakeRuntime {
    pub fn new(version: JNIVersion) -> Arc<Self> {
        Arc::new(Self::build(version, None))
    }

    /// A runtime whose `DestroyJavaVM` fails with `err`.
    pub fn failing_destroy(version: JNIVersion, err: JniError) -> Arc<Self> {
        Arc::new(Self::build(version, Some(err)))
    }

    fn build(version: JNIVersion, destroy_error: Option<JniError>) -> Self {
        FakeRuntime {
            version,
            destroy_error,
            attach_error: Mutex::new(None),
            exhausted: AtomicBool::new(false),
            threads: Mutex::new(HashMap::new()),
            history: Mutex::new(Vec::new()),
            globals: Mutex::new(HashSet::new()),
            next_env: AtomicUsize::new(1),
            next_ref: AtomicUsize::new(1),
            attaches: AtomicUsize::new(0),
            detaches: AtomicUsize::new(0),
            destroys: AtomicUsize::new(0),
            globals_created: AtomicUsize::new(0),
            globals_deleted: AtomicUsize::new(0),
            bad_global_deletes: AtomicUsize::new(0),
            locals_created: AtomicUsize::new(0),
            locals_deleted: AtomicUsize::new(0),
        }
    }

    /// Marks the calling thread attached without counting an attach, the way
    /// `JNI_CreateJavaVM` or the `java` launcher would have.
    pub fn attach_externally(&self) {
        let env = self.fresh_env();
        self.threads.lock().unwrap().insert(
            thread::current().id(),
            Attachment {
                name: "main".into(),
                daemon: false,
                env,
            },
        );
    }

    /// Makes the next attaches fail with `err`.
    pub fn fail_attach(&self, err: Option<JniError>) {
        *self.attach_error.lock().unwrap() = err;
    }

    /// Makes the reference functions return null.
    pub fn exhaust(&self, exhausted: bool) {
        self.exhausted.store(exhausted, Ordering::SeqCst);
    }

    /// The calling thread's attachment.
    pub fn attachment(&self) -> Option<Attachment> {
        self.threads.lock().unwrap().get(&thread::current().id()).cloned()
    }

    pub fn history(&self) -> Vec<Attachment> {
        self.history.lock().unwrap().clone()
    }

    pub fn attaches(&self) -> usize {
        self.attaches.load(Ordering::SeqCst)
    }

    pub fn detaches(&self) -> usize {
        self.detaches.load(Ordering::SeqCst)
    }

    pub fn destroys(&self) -> usize {
        self.destroys.load(Ordering::SeqCst)
    }

    pub fn globals_created(&self) -> usize {
        self.globals_created.load(Ordering::SeqCst)
    }

    pub fn globals_deleted(&self) -> usize {
        self.globals_deleted.load(Ordering::SeqCst)
    }

    /// Deletes of global references that were never created or already deleted.
    pub fn bad_global_deletes(&self) -> usize {
        self.bad_global_deletes.load(Ordering::SeqCst)
    }

    pub fn live_globals(&self) -> usize {
        self.globals.lock().unwrap().len()
    }

    pub fn locals_created(&self) -> usize {
        self.locals_created.load(Ordering::SeqCst)
    }

    pub fn locals_deleted(&self) -> usize {
        self.locals_deleted.load(Ordering::SeqCst)
    }

    fn fresh_env(&self) -> usize {
        0x1000 + self.next_env.fetch_add(1, Ordering::SeqCst) * 0x10
    }

    fn fresh_ref(&self) -> usize {
        0x10_0000 + self.next_ref.fetch_add(1, Ordering::SeqCst) * 0x8
    }
}

unsafe impl Runtime for FakeRuntime {
    fn raw(&self) -> *mut sys::JavaVM {
        self as *const Self as *mut sys::JavaVM
    }

    fn get_env(&self, _version: JNIVersion) -> std::result::Result<RawEnv, JniError> {
        self.threads
            .lock()
            .unwrap()
            .get(&thread::current().id())
            .map(|attachment| attachment.env as RawEnv)
            .ok_or(JniError::ThreadDetached)
    }

    fn attach_current_thread(
        &self,
        request: &AttachRequest<'_>,
    ) -> std::result::Result<RawEnv, JniError> {
        if let Some(err) = *self.attach_error.lock().unwrap() {
            return Err(err);
        }
        let attachment = Attachment {
            name: request.name.to_string_lossy().into_owned(),
            daemon: request.daemon,
            env: self.fresh_env(),
        };
        let env = attachment.env as RawEnv;
        self.threads
            .lock()
            .unwrap()
            .insert(thread::current().id(), attachment.clone());
        self.history.lock().unwrap().push(attachment);
        self.attaches.fetch_add(1, Ordering::SeqCst);
        Ok(env)
    }

    fn detach_current_thread(&self) -> std::result::Result<(), JniError> {
        match self.threads.lock().unwrap().remove(&thread::current().id()) {
            Some(_) => {
                self.detaches.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            None => Err(JniError::ThreadDetached),
        }
    }

    fn destroy(&self) -> std::result::Result<(), JniError> {
        self.destroys.fetch_add(1, Ordering::SeqCst);
        self.threads.lock().unwrap().clear();
        match self.destroy_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    unsafe fn get_version(&self, _env: RawEnv) -> JNIVersion {
        self.version
    }

    unsafe fn new_local_ref(&self, _env: RawEnv, _obj: sys::jobject) -> sys::jobject {
        if self.exhausted.load(Ordering::SeqCst) {
            return std::ptr::null_mut();
        }
        self.locals_created.fetch_add(1, Ordering::SeqCst);
        self.fresh_ref() as sys::jobject
    }

    unsafe fn delete_local_ref(&self, _env: RawEnv, _obj: sys::jobject) {
        self.locals_deleted.fetch_add(1, Ordering::SeqCst);
    }

    unsafe fn new_global_ref(&self, _env: RawEnv, _obj: sys::jobject) -> sys::jobject {
        if self.exhausted.load(Ordering::SeqCst) {
            return std::ptr::null_mut();
        }
        let global = self.fresh_ref();
        self.globals.lock().unwrap().insert(global);
        self.globals_created.fetch_add(1, Ordering::SeqCst);
        global as sys::jobject
    }

    unsafe fn delete_global_ref(&self, env: RawEnv, obj: sys::jobject) {
        let valid_env = self
            .threads
            .lock()
            .unwrap()
            .get(&thread::current().id())
            .is_some_and(|attachment| attachment.env as RawEnv == env);
        if valid_env && self.globals.lock().unwrap().remove(&(obj as usize)) {
            self.globals_deleted.fetch_add(1, Ordering::SeqCst);
        } else {
            self.bad_global_deletes.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Hands out a [`FakeRuntime`], recording the options it was given.
pub struct FakeLoader {
    runtime: Arc<FakeRuntime>,
    error: Option<JniError>,
    options: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl FakeLoader {
    pub fn new(runtime: &Arc<FakeRuntime>) -> Self {
        FakeLoader {
            runtime: Arc::clone(runtime),
            error: None,
            options: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// A loader whose `JNI_CreateJavaVM` fails with `err`.
    pub fn failing(runtime: &Arc<FakeRuntime>, err: JniError) -> Self {
        FakeLoader {
            error: Some(err),
            ..Self::new(runtime)
        }
    }

    pub fn options(&self) -> Vec<String> {
        self.options.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl VmLoader for FakeLoader {
    fn jni_version(&self) -> JNIVersion {
        self.runtime.version
    }

    fn create_java_vm(&self, args: &InitArgs) -> Result<Arc<dyn Runtime>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.options.lock().unwrap() = args
            .option_strings()
            .map(|option| option.to_string_lossy().into_owned())
            .collect();
        if let Some(err) = self.error {
            return Err(Error::VmCreation(err));
        }
        self.runtime.attach_externally();
        let runtime: Arc<dyn Runtime> = self.runtime.clone();
        Ok(runtime)
    }
}

/// Some object for the fake to make references to.
pub fn some_object() -> Borrowed<'static> {
    unsafe { Borrowed::from_raw(0x42 as sys::jobject) }
}

/// A new global reference through `env`.
pub fn new_global(env: &Env) -> GlobalRef {
    env.new_global_ref(&some_object())
        .unwrap_or_else(|e| panic!("{:#?}", e))
}
