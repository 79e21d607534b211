use std::{
    ffi::{c_void, CStr, CString},
    fmt,
    marker::PhantomData,
    ptr,
    sync::Arc,
};

use crate::{
    errors::*,
    exceptions,
    refs::{self, AutoLocal, GlobalRef, Reference},
    sys,
    value::{JValue, Primitive},
    vm::{RawEnv, Runtime, VmRecord},
    JNIVersion, Jvm,
};

/// A method ID, valid for as long as its class stays loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct JMethodID(sys::jmethodID);

// Method IDs are not tied to a thread.
unsafe impl Send for JMethodID {}
unsafe impl Sync for JMethodID {}

impl JMethodID {
    pub fn as_raw(&self) -> sys::jmethodID {
        self.0
    }
}

/// A native method to bind with [`Env::register_native_methods`].
#[derive(Debug)]
pub struct NativeMethod {
    name: CString,
    sig: CString,
    fn_ptr: *mut c_void,
}

impl NativeMethod {
    /// # Safety
    ///
    /// `fn_ptr` must be an `extern "system"` function whose parameters match `sig`, preceded by
    /// the `JNIEnv` pointer and the receiver (or class, for static methods).
    pub unsafe fn new(name: &str, sig: &str, fn_ptr: *mut c_void) -> Result<Self> {
        Ok(NativeMethod {
            name: CString::new(name)?,
            sig: CString::new(sig)?,
            fn_ptr,
        })
    }
}

/// The calling thread's environment for one registered VM.
///
/// Every call that can raise a Java exception checks for one afterwards and turns it into an
/// error through the exception bridge (see [`exceptions::catch_and_throw`]).
///
/// An `Env` is bound to the thread it was obtained on.
pub struct Env {
    raw: RawEnv,
    runtime: Arc<dyn Runtime>,
    vm: Jvm,
    version: JNIVersion,
    generation: u64,
    _not_send: PhantomData<*mut ()>,
}

impl fmt::Debug for Env {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Env")
            .field("raw", &self.raw)
            .field("version", &self.version)
            .finish()
    }
}

impl Env {
    pub(crate) fn new(vm: Jvm, record: &VmRecord, raw: RawEnv) -> Self {
        Env {
            raw,
            runtime: Arc::clone(&record.runtime),
            vm,
            version: record.version,
            generation: record.generation,
            _not_send: PhantomData,
        }
    }

    /// Wraps the environment pointer a native method was called with.
    ///
    /// Fails with [`Error::VmShutdown`] if `vm` has no registered VM.
    ///
    /// # Safety
    ///
    /// `raw` must be the valid environment of the calling thread for the VM registered in `vm`.
    pub unsafe fn from_raw(vm: &Jvm, raw: RawEnv) -> Result<Self> {
        let raw = null_check!(raw, "Env::from_raw")?;
        let record = vm.record()?;
        Ok(Env::new(vm.clone(), &record, raw))
    }

    pub fn get_raw(&self) -> RawEnv {
        self.raw
    }

    pub fn vm(&self) -> &Jvm {
        &self.vm
    }

    /// The negotiated JNI version.
    pub fn version(&self) -> JNIVersion {
        self.version
    }

    pub(crate) fn runtime(&self) -> &dyn Runtime {
        &*self.runtime
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    pub fn exception_check(&self) -> bool {
        unsafe { jni_call_unchecked!(self.raw, v1_2, ExceptionCheck) == sys::JNI_TRUE }
    }

    /// The pending exception, without clearing it.
    pub fn exception_occurred(&self) -> Option<AutoLocal<'_>> {
        let throwable = unsafe { jni_call_unchecked!(self.raw, v1_1, ExceptionOccurred) };
        (!throwable.is_null()).then(|| unsafe { AutoLocal::new(self, throwable) })
    }

    pub fn exception_clear(&self) {
        unsafe { jni_call_unchecked!(self.raw, v1_1, ExceptionClear) }
    }

    /// Prints the pending exception and its backtrace to stderr, clearing it.
    pub fn exception_describe(&self) {
        unsafe { jni_call_unchecked!(self.raw, v1_1, ExceptionDescribe) }
    }

    /// Turns a pending Java exception into an error. See [`exceptions::catch_and_throw`].
    pub fn catch_and_throw(&self) -> Result<()> {
        exceptions::catch_and_throw(self)
    }

    /// Makes `throwable` the pending exception, to be raised once control returns to Java.
    pub fn throw(&self, throwable: &dyn Reference) -> Result<()> {
        let throwable = null_check!(throwable.as_raw(), "throw throwable")?;
        let res = unsafe { jni_call_unchecked!(self.raw, v1_1, Throw, throwable) };
        jni_error_code_to_result(res)?;
        Ok(())
    }

    /// Raises a new exception of class `internal_name` (e.g. `java/lang/IllegalStateException`).
    pub fn throw_new(&self, internal_name: &str, msg: &str) -> Result<()> {
        let class = self.find_class(internal_name)?;
        let msg = CString::new(cesu8::to_java_cesu8(msg).into_owned())?;
        let res = unsafe {
            jni_call_unchecked!(self.raw, v1_1, ThrowNew, class.as_raw(), msg.as_ptr())
        };
        jni_error_code_to_result(res)?;
        Ok(())
    }

    pub fn new_local_ref(&self, obj: &dyn Reference) -> Result<AutoLocal<'_>> {
        refs::new_local(self, obj)
    }

    pub fn new_global_ref(&self, obj: &dyn Reference) -> Result<GlobalRef> {
        refs::new_global(self, obj)
    }

    /// Takes ownership of a raw local reference, e.g. one returned by a raw JNI call.
    ///
    /// # Safety
    ///
    /// See [`AutoLocal::new`].
    pub unsafe fn auto_local(&self, obj: sys::jobject) -> AutoLocal<'_> {
        unsafe { AutoLocal::new(self, obj) }
    }

    /// `FindClass`, with a binary name in internal form: `java/lang/String`.
    pub fn find_class(&self, internal_name: &str) -> Result<AutoLocal<'_>> {
        let name = CString::new(internal_name)?;
        let class = unsafe { jni_call_unchecked!(self.raw, v1_1, FindClass, name.as_ptr()) };
        self.catch_and_throw()?;
        null_check!(class, "FindClass result")?;
        Ok(unsafe { AutoLocal::new(self, class) })
    }

    pub fn get_object_class(&self, obj: &dyn Reference) -> Result<AutoLocal<'_>> {
        let obj = null_check!(obj.as_raw(), "get_object_class obj")?;
        let class = unsafe { jni_call_unchecked!(self.raw, v1_1, GetObjectClass, obj) };
        null_check!(class, "GetObjectClass result")?;
        Ok(unsafe { AutoLocal::new(self, class) })
    }

    /// The superclass of `class`, `None` for `java.lang.Object` and interfaces.
    pub fn get_superclass(&self, class: &dyn Reference) -> Result<Option<AutoLocal<'_>>> {
        let class = null_check!(class.as_raw(), "get_superclass class")?;
        let sup = unsafe { jni_call_unchecked!(self.raw, v1_1, GetSuperclass, class) };
        Ok((!sup.is_null()).then(|| unsafe { AutoLocal::new(self, sup) }))
    }

    pub fn is_instance_of(&self, obj: &dyn Reference, class: &dyn Reference) -> Result<bool> {
        let class = null_check!(class.as_raw(), "is_instance_of class")?;
        let res = unsafe { jni_call_unchecked!(self.raw, v1_1, IsInstanceOf, obj.as_raw(), class) };
        Ok(res == sys::JNI_TRUE)
    }

    pub fn is_assignable_from(&self, sub: &dyn Reference, sup: &dyn Reference) -> Result<bool> {
        let sub = null_check!(sub.as_raw(), "is_assignable_from sub")?;
        let sup = null_check!(sup.as_raw(), "is_assignable_from sup")?;
        let res = unsafe { jni_call_unchecked!(self.raw, v1_1, IsAssignableFrom, sub, sup) };
        Ok(res == sys::JNI_TRUE)
    }

    pub fn get_method_id(&self, class: &dyn Reference, name: &str, sig: &str) -> Result<JMethodID> {
        self.method_id(class, name, sig, false)
    }

    pub fn get_static_method_id(
        &self,
        class: &dyn Reference,
        name: &str,
        sig: &str,
    ) -> Result<JMethodID> {
        self.method_id(class, name, sig, true)
    }

    fn method_id(
        &self,
        class: &dyn Reference,
        name: &str,
        sig: &str,
        is_static: bool,
    ) -> Result<JMethodID> {
        let class = null_check!(class.as_raw(), "method_id class")?;
        let c_name = CString::new(name)?;
        let c_sig = CString::new(sig)?;
        let id = unsafe {
            if is_static {
                jni_call_unchecked!(self.raw, v1_1, GetStaticMethodID, class, c_name.as_ptr(), c_sig.as_ptr())
            } else {
                jni_call_unchecked!(self.raw, v1_1, GetMethodID, class, c_name.as_ptr(), c_sig.as_ptr())
            }
        };
        if id.is_null() {
            let msg = format!("Unable to find the method, {name} {sig}");
            return Err(exceptions::with_cause(self, msg));
        }
        Ok(JMethodID(id))
    }

    /// Binds native implementations to methods of `class`.
    pub fn register_native_methods(
        &self,
        class: &dyn Reference,
        methods: &[NativeMethod],
    ) -> Result<()> {
        let class = null_check!(class.as_raw(), "register_native_methods class")?;
        let raw: Vec<sys::JNINativeMethod> = methods
            .iter()
            .map(|m| sys::JNINativeMethod {
                name: m.name.as_ptr() as *mut _,
                signature: m.sig.as_ptr() as *mut _,
                fnPtr: m.fn_ptr,
            })
            .collect();
        let res = unsafe {
            jni_call_unchecked!(
                self.raw,
                v1_1,
                RegisterNatives,
                class,
                raw.as_ptr() as *mut sys::JNINativeMethod,
                raw.len() as sys::jint
            )
        };
        self.catch_and_throw()?;
        jni_error_code_to_result(res)?;
        Ok(())
    }

    /// Calls an instance method returning an object.
    ///
    /// # Safety
    ///
    /// `method` must belong to the class of `obj` and `args` must match its signature.
    pub unsafe fn call_object_method(
        &self,
        obj: &dyn Reference,
        method: JMethodID,
        args: &[sys::jvalue],
    ) -> Result<Option<AutoLocal<'_>>> {
        let obj = null_check!(obj.as_raw(), "call_object_method obj")?;
        let ret = unsafe {
            jni_call_unchecked!(self.raw, v1_1, CallObjectMethodA, obj, method.0, args.as_ptr())
        };
        self.catch_and_throw()?;
        Ok((!ret.is_null()).then(|| unsafe { AutoLocal::new(self, ret) }))
    }

    /// # Safety
    ///
    /// See [`call_object_method`](Self::call_object_method).
    pub unsafe fn call_void_method(
        &self,
        obj: &dyn Reference,
        method: JMethodID,
        args: &[sys::jvalue],
    ) -> Result<()> {
        let obj = null_check!(obj.as_raw(), "call_void_method obj")?;
        unsafe {
            jni_call_unchecked!(self.raw, v1_1, CallVoidMethodA, obj, method.0, args.as_ptr())
        };
        self.catch_and_throw()
    }

    /// Calls an instance method returning the primitive `kind`.
    ///
    /// # Safety
    ///
    /// See [`call_object_method`](Self::call_object_method); the method must return `kind`.
    pub unsafe fn call_primitive_method(
        &self,
        obj: &dyn Reference,
        method: JMethodID,
        kind: Primitive,
        args: &[sys::jvalue],
    ) -> Result<JValue> {
        let obj = null_check!(obj.as_raw(), "call_primitive_method obj")?;
        let (env, mid, args) = (self.raw, method.0, args.as_ptr());
        let value = unsafe {
            match kind {
                Primitive::Boolean => JValue::Bool(
                    jni_call_unchecked!(env, v1_1, CallBooleanMethodA, obj, mid, args)
                        == sys::JNI_TRUE,
                ),
                Primitive::Byte => {
                    JValue::Byte(jni_call_unchecked!(env, v1_1, CallByteMethodA, obj, mid, args))
                }
                Primitive::Char => {
                    JValue::Char(jni_call_unchecked!(env, v1_1, CallCharMethodA, obj, mid, args))
                }
                Primitive::Short => {
                    JValue::Short(jni_call_unchecked!(env, v1_1, CallShortMethodA, obj, mid, args))
                }
                Primitive::Int => {
                    JValue::Int(jni_call_unchecked!(env, v1_1, CallIntMethodA, obj, mid, args))
                }
                Primitive::Long => {
                    JValue::Long(jni_call_unchecked!(env, v1_1, CallLongMethodA, obj, mid, args))
                }
                Primitive::Float => {
                    JValue::Float(jni_call_unchecked!(env, v1_1, CallFloatMethodA, obj, mid, args))
                }
                Primitive::Double => JValue::Double(jni_call_unchecked!(
                    env,
                    v1_1,
                    CallDoubleMethodA,
                    obj,
                    mid,
                    args
                )),
            }
        };
        self.catch_and_throw()?;
        Ok(value)
    }

    /// # Safety
    ///
    /// `method` must be a static method of `class` and `args` must match its signature.
    pub unsafe fn call_static_object_method(
        &self,
        class: &dyn Reference,
        method: JMethodID,
        args: &[sys::jvalue],
    ) -> Result<Option<AutoLocal<'_>>> {
        let class = null_check!(class.as_raw(), "call_static_object_method class")?;
        let ret = unsafe {
            jni_call_unchecked!(self.raw, v1_1, CallStaticObjectMethodA, class, method.0, args.as_ptr())
        };
        self.catch_and_throw()?;
        Ok((!ret.is_null()).then(|| unsafe { AutoLocal::new(self, ret) }))
    }

    /// # Safety
    ///
    /// See [`call_static_object_method`](Self::call_static_object_method).
    pub unsafe fn call_static_void_method(
        &self,
        class: &dyn Reference,
        method: JMethodID,
        args: &[sys::jvalue],
    ) -> Result<()> {
        let class = null_check!(class.as_raw(), "call_static_void_method class")?;
        unsafe {
            jni_call_unchecked!(self.raw, v1_1, CallStaticVoidMethodA, class, method.0, args.as_ptr())
        };
        self.catch_and_throw()
    }

    /// # Safety
    ///
    /// `ctor` must be a constructor of `class` and `args` must match its signature.
    pub unsafe fn new_object(
        &self,
        class: &dyn Reference,
        ctor: JMethodID,
        args: &[sys::jvalue],
    ) -> Result<AutoLocal<'_>> {
        let class = null_check!(class.as_raw(), "new_object class")?;
        let obj = unsafe {
            jni_call_unchecked!(self.raw, v1_1, NewObjectA, class, ctor.0, args.as_ptr())
        };
        self.catch_and_throw()?;
        null_check!(obj, "NewObjectA result")?;
        Ok(unsafe { AutoLocal::new(self, obj) })
    }

    /// A new `java.lang.String`.
    pub fn new_string(&self, value: &str) -> Result<AutoLocal<'_>> {
        let utf = CString::new(cesu8::to_java_cesu8(value).into_owned())?;
        let string = unsafe { jni_call_unchecked!(self.raw, v1_1, NewStringUTF, utf.as_ptr()) };
        self.catch_and_throw()?;
        null_check!(string, "NewStringUTF result")?;
        Ok(unsafe { AutoLocal::new(self, string) })
    }

    /// The contents of a `java.lang.String`.
    pub fn get_string(&self, string: &dyn Reference) -> Result<String> {
        let string = null_check!(string.as_raw(), "get_string string")?;
        match unsafe { self.read_string(string) } {
            Some(value) => value,
            None => {
                self.catch_and_throw()?;
                Err(Error::NullPtr("GetStringUTFChars result"))
            }
        }
    }

    /// Reads a string without looking at exceptions; `None` if the VM couldn't provide the
    /// characters.
    ///
    /// # Safety
    ///
    /// `string` must be a valid, non-null `jstring`.
    pub(crate) unsafe fn read_string(&self, string: sys::jstring) -> Option<Result<String>> {
        let chars = unsafe {
            jni_call_unchecked!(self.raw, v1_1, GetStringUTFChars, string, ptr::null_mut())
        };
        if chars.is_null() {
            return None;
        }
        let bytes = unsafe { CStr::from_ptr(chars) }.to_bytes();
        let value = cesu8::from_java_cesu8(bytes)
            .map(|s| s.into_owned())
            .map_err(|_| Error::bridge("The VM returned a string that isn't modified UTF-8"));
        unsafe { jni_call_unchecked!(self.raw, v1_1, ReleaseStringUTFChars, string, chars) };
        Some(value)
    }

    pub fn get_array_length(&self, array: &dyn Reference) -> Result<usize> {
        let array = null_check!(array.as_raw(), "get_array_length array")?;
        let len = unsafe { jni_call_unchecked!(self.raw, v1_1, GetArrayLength, array) };
        Ok(len.max(0) as usize)
    }

    pub fn get_object_array_element(
        &self,
        array: &dyn Reference,
        index: usize,
    ) -> Result<Option<AutoLocal<'_>>> {
        let array = null_check!(array.as_raw(), "get_object_array_element array")?;
        let elem = unsafe {
            jni_call_unchecked!(self.raw, v1_1, GetObjectArrayElement, array, index as sys::jsize)
        };
        self.catch_and_throw()?;
        Ok((!elem.is_null()).then(|| unsafe { AutoLocal::new(self, elem) }))
    }

    /// `obj.toString()`, or `"null"`.
    pub fn object_to_string(&self, obj: &dyn Reference) -> Result<String> {
        if obj.is_null() {
            return Ok("null".to_owned());
        }
        let class = self.find_class("java/lang/Object")?;
        let to_string = self.get_method_id(&class, "toString", "()Ljava/lang/String;")?;
        match unsafe { self.call_object_method(obj, to_string, &[])? } {
            Some(string) => self.get_string(&string),
            None => Ok("null".to_owned()),
        }
    }

    /// The binary name of a class, as `Class.getName()` reports it: `java.lang.String`.
    pub fn class_name(&self, class: &dyn Reference) -> Result<String> {
        let class_class = self.find_class("java/lang/Class")?;
        let get_name = self.get_method_id(&class_class, "getName", "()Ljava/lang/String;")?;
        match unsafe { self.call_object_method(class, get_name, &[])? } {
            Some(name) => self.get_string(&name),
            None => Err(Error::NullPtr("Class.getName() result")),
        }
    }
}
