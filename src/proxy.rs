//! Capabilities of native proxies for Java objects.
//!
//! A proxy type is anything that holds a reference to a Java object ([`JavaObject`]) and knows
//! the Java class it stands for ([`JavaClass`]). The [`java_class!`](crate::java_class) macro
//! implements both for a new type.

use crate::{
    descriptor::ClassDescriptor,
    env::Env,
    errors::*,
    refs::{GlobalRef, Reference},
    sys,
};

/// Has a class descriptor.
pub trait JavaClass {
    fn class() -> &'static ClassDescriptor;
}

/// Has a JVM object handle.
pub trait JavaObject {
    fn global(&self) -> &GlobalRef;
}

/// Can be built around a global reference to an instance of its class.
pub trait FromGlobal: Sized {
    fn from_global(obj: GlobalRef) -> Self;
}

impl<T: JavaObject> Reference for T {
    fn as_raw(&self) -> sys::jobject {
        self.global().as_raw()
    }
}

/// Java's `instanceof`: whether `obj` is an instance of `T`'s class. `null` is an instance of
/// nothing.
pub fn instance_of<T: JavaClass>(env: &Env, obj: &dyn Reference) -> Result<bool> {
    if obj.is_null() {
        return Ok(false);
    }
    let class = T::class().class(env)?;
    env.is_instance_of(obj, &class)
}

/// A checked cast of `obj` to the proxy type `T`.
pub fn cast<T: JavaClass + FromGlobal>(env: &Env, obj: &dyn Reference) -> Result<T> {
    if !instance_of::<T>(env, obj)? {
        return Err(Error::bridge(format!(
            "Can not cast to {}",
            T::class().dotted_name()
        )));
    }
    Ok(T::from_global(env.new_global_ref(obj)?))
}

/// Whether a value of proxy type `S` may be used where a `T` is expected, by the Java class
/// hierarchy.
pub fn is_assignable<S: JavaClass, T: JavaClass>(env: &Env) -> Result<bool> {
    let sub = S::class().class(env)?;
    let sup = T::class().class(env)?;
    env.is_assignable_from(&sub, &sup)
}
