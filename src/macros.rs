//! Macros for making low-level JNI calls through the raw function tables.
//!
//! Note: all macros must avoid un-hygienic / hidden control flow like `return`
//! or `?`

/// Directly calls a function from the `JNIEnv` function table, nothing else
///
/// # Safety
///
/// `$jnienv` must evaluate to a valid `*mut jni_sys::JNIEnv` for the current thread and the
/// arguments must be valid for the particular JNI function. Most functions must not be called
/// while an exception is pending; the callers in this crate check before calling.
///
/// When calling any function added after JNI 1.1 you must know that it's valid for the current
/// JNI version.
macro_rules! jni_call_unchecked {
    ( $jnienv:expr, $version:tt, $name:ident $(, $args:expr )*) => {{
        let env: *mut jni_sys::JNIEnv = $jnienv;
        let interface: *const jni_sys::JNINativeInterface_ = *env;

        ((*interface).$version.$name)(env $(, $args)*)
    }};
}

/// Directly calls a function from the `JavaVM` invocation interface, nothing else
///
/// # Safety
///
/// `$jvm` must evaluate to a valid `*mut jni_sys::JavaVM`.
macro_rules! java_vm_call_unchecked {
    ( $jvm:expr, $version:tt, $name:ident $(, $args:expr )*) => {{
        let jvm: *mut jni_sys::JavaVM = $jvm;
        ((*(*jvm)).$version.$name)(jvm $(, $args)*)
    }};
}

/// Maps a null pointer to `Err(Error::NullPtr(ctx))`
macro_rules! null_check {
    ( $obj:expr, $ctx:expr ) => {
        if $obj.is_null() {
            Err($crate::errors::Error::NullPtr($ctx))
        } else {
            Ok($obj)
        }
    };
}

/// Declares a proxy type for a Java class and gives it the capabilities the bridge works with.
///
/// ```
/// jni_bridge::java_class! {
///     /// `java.lang.Runnable`
///     pub struct Runnable => "java/lang/Runnable";
/// }
/// ```
///
/// The generated type owns a [`GlobalRef`](crate::refs::GlobalRef) and implements
/// [`JavaClass`](crate::proxy::JavaClass), [`JavaObject`](crate::proxy::JavaObject) and
/// [`FromGlobal`](crate::proxy::FromGlobal). Exception proxies are enlisted in a
/// [`FactoryRegistry`](crate::exceptions::FactoryRegistry) with
/// [`Enlister`](crate::exceptions::Enlister).
#[macro_export]
macro_rules! java_class {
    ( $( $(#[$meta:meta])* $vis:vis struct $name:ident => $internal:literal; )+ ) => {
        $(
            $(#[$meta])*
            #[derive(Debug)]
            $vis struct $name($crate::refs::GlobalRef);

            impl $crate::proxy::JavaClass for $name {
                fn class() -> &'static $crate::descriptor::ClassDescriptor {
                    static CLASS: $crate::descriptor::ClassDescriptor =
                        $crate::descriptor::ClassDescriptor::new($internal, concat!("L", $internal, ";"));
                    &CLASS
                }
            }

            impl $crate::proxy::JavaObject for $name {
                fn global(&self) -> &$crate::refs::GlobalRef {
                    &self.0
                }
            }

            impl $crate::proxy::FromGlobal for $name {
                fn from_global(obj: $crate::refs::GlobalRef) -> Self {
                    $name(obj)
                }
            }
        )+
    };
}
