//! Implementing Java interfaces with native callbacks.
//!
//! A [`Builder`] creates an `org.jnibridge.NativeInvocation` for an interface, registers native
//! callbacks for some of its methods by name and finally asks Java for a
//! `java.lang.reflect.Proxy` implementing the interface. Calls on the proxy come back to
//! [`invoke_native`] with the id of the builder's callback table and the index of the callback.
//!
//! Methods without a callback are handled by the Java side: `equals`, `hashCode` and `toString`
//! get identity-based defaults, anything else throws `UnsupportedOperationException`.

use std::{
    collections::HashMap,
    ffi::{c_void, CString},
    fmt,
    panic::{self, AssertUnwindSafe},
    ptr,
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc,
    },
};

use log::{debug, error};
use once_cell::sync::Lazy;
use parking_lot::{const_mutex, Mutex, RwLock};

use crate::{
    env::{Env, JMethodID, NativeMethod},
    errors::*,
    proxy::{self, FromGlobal, JavaClass},
    refs::{AutoLocal, Borrowed, GlobalRef, Reference},
    sys,
    value::{JValue, Primitive},
    Jvm,
};

/// The Java half of the bridge.
pub const NATIVE_INVOCATION_CLASS: &str = "org/jnibridge/NativeInvocation";

const INVOKE_NATIVE: &str = "invokeNative";
const INVOKE_NATIVE_SIG: &str = "(JILjava/lang/Object;[Ljava/lang/Object;)Ljava/lang/Object;";
const REGISTER_NATIVE: &str = "registerNative";
const REGISTER_NATIVE_SIG: &str = "(Ljava/lang/String;JI)V";
const CREATE_PROXY: &str = "createProxy";
const CREATE_PROXY_SIG: &str = "()Ljava/lang/Object;";
const CONSTRUCTOR_SIG: &str = "(Ljava/lang/String;)V";

/// The generation of the VM `invokeNative` was last bound in.
static HOOK: Mutex<Option<u64>> = const_mutex(None);

static NEXT_TABLE: AtomicI64 = AtomicI64::new(1);

static TABLES: Lazy<RwLock<HashMap<i64, Arc<CallbackTable>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

type CallbackFn = dyn Fn(&Env, Borrowed<'_>, &CallbackArgs<'_>) -> Result<JValue> + Send + Sync;

/// A native implementation of one interface method.
///
/// The function gets the proxy object and the call's arguments. Whatever it returns is
/// converted to a Java object: `()` becomes `null`, primitives are boxed. An error or a panic
/// is thrown into Java as a `java.lang.RuntimeException`.
#[derive(Clone)]
pub struct Callback(Arc<CallbackFn>);

impl Callback {
    pub fn new<F, R>(f: F) -> Self
    where
        F: Fn(&Env, Borrowed<'_>, &CallbackArgs<'_>) -> Result<R> + Send + Sync + 'static,
        R: Into<JValue>,
    {
        Callback(Arc::new(move |env, obj, args| f(env, obj, args).map(Into::into)))
    }

    fn call(&self, env: &Env, obj: Borrowed<'_>, args: &CallbackArgs<'_>) -> Result<JValue> {
        (self.0)(env, obj, args)
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Callback")
    }
}

/// The arguments of a proxied call: the `Object[]` Java passes, `null` for no arguments.
#[derive(Debug)]
pub struct CallbackArgs<'a> {
    env: &'a Env,
    array: Borrowed<'a>,
}

impl<'a> CallbackArgs<'a> {
    pub fn len(&self) -> Result<usize> {
        if self.array.is_null() {
            return Ok(0);
        }
        self.env.get_array_length(&self.array)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Argument `index`; primitives arrive boxed.
    pub fn get(&self, index: usize) -> Result<Option<AutoLocal<'a>>> {
        let len = self.len()?;
        if index >= len {
            return Err(Error::bridge(format!(
                "Argument {index} out of range for a call with {len} arguments"
            )));
        }
        self.env.get_object_array_element(&self.array, index)
    }

    /// Argument `index`, unboxed.
    pub fn unbox(&self, index: usize, kind: Primitive) -> Result<JValue> {
        match self.get(index)? {
            Some(obj) => JValue::unbox(self.env, &obj, kind),
            None => Err(Error::bridge(format!(
                "Argument {index} is null, expected a boxed {kind}"
            ))),
        }
    }

    /// Argument `index` as a string.
    pub fn string(&self, index: usize) -> Result<Option<String>> {
        self.get(index)?
            .map(|obj| self.env.get_string(&obj))
            .transpose()
    }
}

struct CallbackTable {
    vm: Jvm,
    callbacks: RwLock<Vec<Callback>>,
}

/// Builds Java objects implementing an interface through native callbacks.
pub struct Builder {
    interface: String,
    instance: GlobalRef,
    register_native: JMethodID,
    create_proxy: JMethodID,
    id: i64,
    table: Arc<CallbackTable>,
}

impl Builder {
    /// A builder for the interface with the given binary name (`java.lang.Runnable`).
    pub fn new(env: &Env, interface: &str) -> Result<Self> {
        register_hook(env)?;

        let class = env.find_class(NATIVE_INVOCATION_CLASS)?;
        let register_native = env.get_method_id(&class, REGISTER_NATIVE, REGISTER_NATIVE_SIG)?;
        let create_proxy = env.get_method_id(&class, CREATE_PROXY, CREATE_PROXY_SIG)?;
        let ctor = env.get_method_id(&class, "<init>", CONSTRUCTOR_SIG)?;

        let name = env.new_string(interface)?;
        let instance = unsafe { env.new_object(&class, ctor, &[sys::jvalue { l: name.as_raw() }]) }
            .map_err(|err| {
                caused_by(
                    format!("Unable to create a NativeInvocation for {interface}"),
                    err,
                )
            })?;
        let instance = env.new_global_ref(&instance)?;

        let id = NEXT_TABLE.fetch_add(1, Ordering::Relaxed);
        let table = Arc::new(CallbackTable {
            vm: env.vm().clone(),
            callbacks: RwLock::new(Vec::new()),
        });
        TABLES.write().insert(id, Arc::clone(&table));
        debug!("Created native proxy builder {id} for {interface}");

        Ok(Builder {
            interface: interface.to_owned(),
            instance,
            register_native,
            create_proxy,
            id,
            table,
        })
    }

    /// A builder for the interface proxied by `T`.
    pub fn for_class<T: JavaClass>(env: &Env) -> Result<Self> {
        Self::new(env, &T::class().dotted_name())
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    /// Number of registered callbacks.
    pub fn len(&self) -> usize {
        self.table.callbacks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Implements the interface method `name` with `callback`. Overloads share one callback;
    /// registering a name again replaces the earlier one.
    pub fn register_callback(&mut self, env: &Env, name: &str, callback: Callback) -> Result<()> {
        let index = self.len();
        let java_name = env.new_string(name)?;
        let args = [
            sys::jvalue {
                l: java_name.as_raw(),
            },
            sys::jvalue { j: self.id },
            sys::jvalue { i: index as sys::jint },
        ];
        unsafe { env.call_void_method(&self.instance, self.register_native, &args) }.map_err(
            |err| caused_by("Exception thrown invoking NativeInvocation.registerNative()".into(), err),
        )?;
        self.table.callbacks.write().push(callback);
        Ok(())
    }

    /// A new proxy object, untyped.
    pub fn instantiate<'env>(&self, env: &'env Env) -> Result<AutoLocal<'env>> {
        let obj = unsafe { env.call_object_method(&self.instance, self.create_proxy, &[]) }
            .map_err(|err| {
                caused_by("Exception thrown invoking NativeInvocation.createProxy()".into(), err)
            })?;
        obj.ok_or_else(|| Error::bridge("NativeInvocation.createProxy() returned null"))
    }

    /// A new proxy object, checked to be an instance of `T`.
    pub fn build<T: JavaClass + FromGlobal>(&self, env: &Env) -> Result<T> {
        let obj = self.instantiate(env)?;
        if !proxy::instance_of::<T>(env, &obj)? {
            return Err(Error::bridge(format!(
                "Proxy not instance of {}",
                T::class().internal_name()
            )));
        }
        Ok(T::from_global(env.new_global_ref(&obj)?))
    }
}

impl Drop for Builder {
    fn drop(&mut self) {
        TABLES.write().remove(&self.id);
        debug!("Dropped native proxy builder {}", self.id);
    }
}

impl fmt::Debug for Builder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Builder")
            .field("interface", &self.interface)
            .field("id", &self.id)
            .field("callbacks", &self.len())
            .finish()
    }
}

fn caused_by(msg: String, err: Error) -> Error {
    Error::Bridge(format!("{msg}\ncaused by:\n{err}"))
}

/// Binds `invokeNative` once per VM.
fn register_hook(env: &Env) -> Result<()> {
    let mut registered = HOOK.lock();
    if *registered == Some(env.generation()) {
        return Ok(());
    }
    let class = env.find_class(NATIVE_INVOCATION_CLASS)?;
    let method = unsafe {
        NativeMethod::new(
            INVOKE_NATIVE,
            INVOKE_NATIVE_SIG,
            invoke_native as *mut c_void,
        )?
    };
    env.register_native_methods(&class, &[method])
        .map_err(|err| caused_by("Unable to register native callback for invokeNative()".into(), err))?;
    *registered = Some(env.generation());
    debug!("Registered {NATIVE_INVOCATION_CLASS}.{INVOKE_NATIVE}");
    Ok(())
}

/// `NativeInvocation.invokeNative`. Errors and panics never cross into Java: they are thrown as
/// `java.lang.RuntimeException`.
extern "system" fn invoke_native(
    raw: *mut sys::JNIEnv,
    _this: sys::jobject,
    table: sys::jlong,
    index: sys::jint,
    obj: sys::jobject,
    args: sys::jobjectArray,
) -> sys::jobject {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| unsafe {
        dispatch(raw, table, index, obj, args)
    }));
    match outcome {
        Ok(Ok(ret)) => ret,
        Ok(Err(err)) => {
            unsafe { throw_runtime_exception(raw, &format!("Exception during native execution: {err}")) };
            ptr::null_mut()
        }
        Err(_) => {
            unsafe { throw_runtime_exception(raw, "Unknown exception during native execution") };
            ptr::null_mut()
        }
    }
}

unsafe fn dispatch(
    raw: *mut sys::JNIEnv,
    table: sys::jlong,
    index: sys::jint,
    obj: sys::jobject,
    args: sys::jobjectArray,
) -> Result<sys::jobject> {
    let Some(table) = TABLES.read().get(&table).cloned() else {
        return Err(Error::bridge(format!(
            "The native callbacks of proxy table {table} have been dropped"
        )));
    };
    let callback = usize::try_from(index)
        .ok()
        .and_then(|index| table.callbacks.read().get(index).cloned())
        .ok_or_else(|| Error::bridge(format!("No native callback at index {index}")))?;

    let env = unsafe { Env::from_raw(&table.vm, raw)? };
    let receiver = unsafe { Borrowed::from_raw(obj) };
    let args = CallbackArgs {
        env: &env,
        array: unsafe { Borrowed::from_raw(args) },
    };
    let ret = callback.call(&env, receiver, &args)?;
    let raw = ret.to_object(&env)?.map_or(ptr::null_mut(), AutoLocal::into_raw);
    Ok(raw)
}

unsafe fn throw_runtime_exception(raw: *mut sys::JNIEnv, msg: &str) {
    unsafe {
        if jni_call_unchecked!(raw, v1_2, ExceptionCheck) == sys::JNI_TRUE {
            jni_call_unchecked!(raw, v1_1, ExceptionClear);
        }
        let class = jni_call_unchecked!(raw, v1_1, FindClass, c"java/lang/RuntimeException".as_ptr());
        if class.is_null() {
            error!("Couldn't throw a RuntimeException for: {msg}");
            return;
        }
        let msg = CString::new(cesu8::to_java_cesu8(msg).into_owned())
            .unwrap_or_else(|_| c"Unknown exception during native execution".to_owned());
        jni_call_unchecked!(raw, v1_1, ThrowNew, class, msg.as_ptr());
        jni_call_unchecked!(raw, v1_1, DeleteLocalRef, class);
    }
}
