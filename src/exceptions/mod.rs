//! Turning pending Java exceptions into errors.
//!
//! After a JNI call raises, [`catch_and_throw`] clears the exception and walks its class
//! hierarchy, most specific class first, until it finds a class with a factory in the
//! [`FactoryRegistry`]. That factory builds the [`Error::JavaException`] returned to the caller.
//! If the walk reaches `java.lang.Object` without a match the result is
//! [`Error::UnlinkedException`].

use std::{any::Any, ffi::CStr, fmt, ptr, sync::Arc};

use log::warn;

use crate::{
    descriptor::ClassDescriptor,
    env::Env,
    errors::*,
    proxy::{self, JavaClass, JavaObject},
    refs::{AutoLocal, GlobalRef},
    sys,
};

mod registry;

pub use registry::{Enlister, Factory, FactoryRegistry};

/// Walks stop here: every class descends from it, so a factory for it would match everything.
const ROOT_CLASS: &str = "java.lang.Object";

/// Class hierarchies deeper than this are taken to be cyclic.
const MAX_ANCESTORS: usize = 4096;

/// The proxy a bridged exception carries.
pub trait ThrownProxy: Any + fmt::Debug + Send + Sync {
    fn throwable(&self) -> &GlobalRef;

    fn descriptor(&self) -> &'static ClassDescriptor;

    fn as_any(&self) -> &dyn Any;
}

impl<T> ThrownProxy for T
where
    T: JavaClass + JavaObject + fmt::Debug + Send + Sync + 'static,
{
    fn throwable(&self) -> &GlobalRef {
        self.global()
    }

    fn descriptor(&self) -> &'static ClassDescriptor {
        T::class()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A Java exception caught by the bridge.
///
/// Holds a global reference to the thrown object, wrapped in the proxy type of the most
/// specific class that had a factory.
pub struct JavaException {
    class_name: String,
    message: Option<String>,
    proxy: Box<dyn ThrownProxy>,
}

impl JavaException {
    pub fn new(class_name: String, message: Option<String>, proxy: Box<dyn ThrownProxy>) -> Self {
        JavaException {
            class_name,
            message,
            proxy,
        }
    }

    /// The runtime class of the thrown object: `java.lang.IllegalArgumentException`.
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// The class whose factory built this error; the runtime class or one of its ancestors.
    pub fn matched_class(&self) -> &'static ClassDescriptor {
        self.proxy.descriptor()
    }

    /// `getMessage()`, as it was when the exception was caught.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn throwable(&self) -> &GlobalRef {
        self.proxy.throwable()
    }

    /// Whether the proxy is a `T`.
    pub fn is<T: Any>(&self) -> bool {
        self.proxy.as_any().is::<T>()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.proxy.as_any().downcast_ref()
    }

    /// Java's `instanceof` against the class of the proxy type `T`.
    pub fn is_instance_of<T: JavaClass>(&self, env: &Env) -> Result<bool> {
        proxy::instance_of::<T>(env, self.throwable())
    }

    /// Makes the exception pending again, e.g. before returning from a native method.
    pub fn rethrow(&self, env: &Env) -> Result<()> {
        env.throw(self.throwable())
    }
}

impl fmt::Debug for JavaException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JavaException")
            .field("class_name", &self.class_name)
            .field("message", &self.message)
            .field("matched_class", &self.matched_class().internal_name())
            .finish()
    }
}

impl fmt::Display for JavaException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{}: {}", self.class_name, message),
            None => f.write_str(&self.class_name),
        }
    }
}

/// The class names of a thrown object, from its runtime class up to the root.
pub trait AncestorNames {
    /// The next dotted class name, or `None` past the last class.
    fn next_name(&mut self) -> Result<Option<String>>;
}

/// The outcome of a hierarchy walk.
pub enum Resolution {
    Matched {
        factory: Arc<dyn Factory>,
        /// The runtime class, not necessarily the class of `factory`.
        class_name: String,
    },
    Unmatched {
        class_name: String,
    },
}

impl fmt::Debug for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::Matched {
                factory,
                class_name,
            } => f
                .debug_struct("Matched")
                .field("factory", &factory.class().internal_name())
                .field("class_name", class_name)
                .finish(),
            Resolution::Unmatched { class_name } => f
                .debug_struct("Unmatched")
                .field("class_name", class_name)
                .finish(),
        }
    }
}

/// Finds the factory of the most specific class in `ancestors`.
pub fn resolve(registry: &FactoryRegistry, ancestors: &mut dyn AncestorNames) -> Result<Resolution> {
    let Some(class_name) = ancestors.next_name()? else {
        return Err(Error::bridge("catch_and_throw: The exception has no class"));
    };

    let mut name = class_name.clone();
    let mut walked = 0;
    loop {
        if name == ROOT_CLASS {
            return Ok(Resolution::Unmatched { class_name });
        }
        if let Some(factory) = registry.lookup(&name) {
            return Ok(Resolution::Matched {
                factory,
                class_name,
            });
        }
        walked += 1;
        if walked >= MAX_ANCESTORS {
            return Err(Error::bridge(format!(
                "catch_and_throw: Gave up walking the ancestors of {class_name} after {walked} classes"
            )));
        }
        match ancestors.next_name()? {
            Some(next) => name = next,
            None => return Ok(Resolution::Unmatched { class_name }),
        }
    }
}

/// Turns the pending Java exception, if any, into an error, matching it against the
/// [global registry](FactoryRegistry::global).
///
/// Returns `Ok(())` when no exception is pending. Otherwise the exception is cleared and the
/// result is always an error: [`Error::JavaException`] for a matched class,
/// [`Error::UnlinkedException`] otherwise, or [`Error::Bridge`] if the exception couldn't be
/// inspected.
pub fn catch_and_throw(env: &Env) -> Result<()> {
    catch_and_throw_with(env, FactoryRegistry::global())
}

/// [`catch_and_throw`] against a given registry.
pub fn catch_and_throw_with(env: &Env, registry: &FactoryRegistry) -> Result<()> {
    let raw = env.get_raw();
    let throwable = unsafe { jni_call_unchecked!(raw, v1_1, ExceptionOccurred) };
    if throwable.is_null() {
        return Ok(());
    }
    unsafe { jni_call_unchecked!(raw, v1_1, ExceptionClear) };
    let throwable = unsafe { AutoLocal::new(env, throwable) };

    let resolution = {
        let mut chain = ClassChain::new(env, &throwable)?;
        resolve(registry, &mut chain)?
    };

    let message = call_string_method(
        env,
        throwable.as_raw(),
        c"java/lang/Throwable",
        c"getMessage",
    )
    .unwrap_or_else(|err| {
        warn!("Couldn't read the message of a thrown exception: {err}");
        None
    });

    Err(match resolution {
        Resolution::Matched {
            factory,
            class_name,
        } => {
            let global = env.new_global_ref(&throwable)?;
            factory.throw_instance(global, class_name, message)
        }
        Resolution::Unmatched { class_name } => Error::UnlinkedException { class: class_name },
    })
}

/// An error for a failed lookup, with the pending Java exception (if any) cleared and appended
/// as its cause.
pub fn with_cause(env: &Env, msg: String) -> Error {
    let raw = env.get_raw();
    let throwable = unsafe { jni_call_unchecked!(raw, v1_1, ExceptionOccurred) };
    if throwable.is_null() {
        return Error::Bridge(msg);
    }
    unsafe { jni_call_unchecked!(raw, v1_1, ExceptionClear) };
    let throwable = unsafe { AutoLocal::new(env, throwable) };

    match call_string_method(env, throwable.as_raw(), c"java/lang/Object", c"toString") {
        Ok(Some(cause)) => Error::Bridge(format!("{msg}\ncaused by:\n{cause}")),
        Ok(None) => Error::Bridge(msg),
        Err(err) => {
            warn!("Couldn't describe the cause of `{msg}`: {err}");
            Error::Bridge(msg)
        }
    }
}

/// The classes of a thrown object, read through JNI.
struct ClassChain<'env> {
    env: &'env Env,
    next: Option<AutoLocal<'env>>,
}

impl<'env> ClassChain<'env> {
    fn new(env: &'env Env, throwable: &AutoLocal<'env>) -> Result<Self> {
        let class =
            unsafe { jni_call_unchecked!(env.get_raw(), v1_1, GetObjectClass, throwable.as_raw()) };
        if class.is_null() {
            return Err(nested_failure(env, "GetObjectClass"));
        }
        Ok(ClassChain {
            env,
            next: Some(unsafe { AutoLocal::new(env, class) }),
        })
    }
}

impl AncestorNames for ClassChain<'_> {
    fn next_name(&mut self) -> Result<Option<String>> {
        let Some(class) = self.next.take() else {
            return Ok(None);
        };
        let name = call_string_method(self.env, class.as_raw(), c"java/lang/Class", c"getName")?
            .ok_or_else(|| nested_failure(self.env, "getName"))?;
        let sup = unsafe { jni_call_unchecked!(self.env.get_raw(), v1_1, GetSuperclass, class.as_raw()) };
        self.next = (!sup.is_null()).then(|| unsafe { AutoLocal::new(self.env, sup) });
        Ok(Some(name))
    }
}

/// An error raised while inspecting an exception. Any exception raised by the inspection itself
/// is printed and cleared.
fn nested_failure(env: &Env, what: &str) -> Error {
    if env.exception_check() {
        env.exception_describe();
        env.exception_clear();
    }
    Error::bridge(format!(
        "catch_and_throw: An error occurred while trying to call {what}() on the thrown exception"
    ))
}

/// Calls a no-argument method returning a `String` on `obj`, with raw JNI calls only so that a
/// failure can't reenter the bridge.
fn call_string_method(
    env: &Env,
    obj: sys::jobject,
    class: &CStr,
    name: &CStr,
) -> Result<Option<String>> {
    let raw = env.get_raw();
    let what = name.to_string_lossy();

    let class = unsafe { jni_call_unchecked!(raw, v1_1, FindClass, class.as_ptr()) };
    if class.is_null() {
        return Err(nested_failure(env, &what));
    }
    let class = unsafe { AutoLocal::new(env, class) };
    let method = unsafe {
        jni_call_unchecked!(
            raw,
            v1_1,
            GetMethodID,
            class.as_raw(),
            name.as_ptr(),
            c"()Ljava/lang/String;".as_ptr()
        )
    };
    if method.is_null() {
        return Err(nested_failure(env, &what));
    }
    let string = unsafe { jni_call_unchecked!(raw, v1_1, CallObjectMethodA, obj, method, ptr::null()) };
    if env.exception_check() {
        return Err(nested_failure(env, &what));
    }
    if string.is_null() {
        return Ok(None);
    }
    let string = unsafe { AutoLocal::new(env, string) };
    match unsafe { env.read_string(string.as_raw()) } {
        Some(value) => value.map(Some),
        None => Err(nested_failure(env, &what)),
    }
}

#[cfg(test)]
mod test {
    use assert_matches::assert_matches;

    use super::*;

    crate::java_class! {
        struct Base => "com/example/Base";
        struct Derived => "com/example/Derived";
    }

    /// A synthetic hierarchy; counts how far the walk went.
    struct Names {
        names: Vec<String>,
        taken: usize,
    }

    impl Names {
        fn new(names: impl IntoIterator<Item = String>) -> Self {
            Names {
                names: names.into_iter().collect(),
                taken: 0,
            }
        }

        /// `depth` classes, most specific first, below `java.lang.Object`.
        fn chain(depth: usize) -> Self {
            Names::new(
                (0..depth)
                    .rev()
                    .map(|i| format!("com.example.Level{i}"))
                    .chain([ROOT_CLASS.to_owned()]),
            )
        }
    }

    impl AncestorNames for Names {
        fn next_name(&mut self) -> Result<Option<String>> {
            let name = self.names.get(self.taken).cloned();
            if name.is_some() {
                self.taken += 1;
            }
            Ok(name)
        }
    }

    /// A hierarchy with no end.
    struct Cycle(usize);

    impl AncestorNames for Cycle {
        fn next_name(&mut self) -> Result<Option<String>> {
            self.0 += 1;
            Ok(Some(format!("com.example.Loop{}", self.0 % 2)))
        }
    }

    #[test]
    fn unmatched_walk_stops_at_the_root() {
        let registry = FactoryRegistry::new();
        for depth in [1, 2, 7, 100] {
            let mut names = Names::chain(depth);
            let resolution = resolve(&registry, &mut names).unwrap();
            assert_matches!(
                resolution,
                Resolution::Unmatched { class_name } if class_name == format!("com.example.Level{}", depth - 1)
            );
            // `depth` lookups, then the root.
            assert_eq!(names.taken, depth + 1);
        }
    }

    #[test]
    fn most_specific_factory_wins() {
        let registry = FactoryRegistry::new();
        registry.enlist_type::<Base>();
        registry.enlist_type::<Derived>();

        let mut names = Names::new(
            ["com.example.Derived", "com.example.Base", ROOT_CLASS].map(String::from),
        );
        let resolution = resolve(&registry, &mut names).unwrap();
        assert_matches!(
            resolution,
            Resolution::Matched { factory, class_name } => {
                assert_eq!(factory.class().internal_name(), "com/example/Derived");
                assert_eq!(class_name, "com.example.Derived");
            }
        );
        assert_eq!(names.taken, 1);
    }

    #[test]
    fn ancestor_factory_matches_subclass() {
        let registry = FactoryRegistry::new();
        registry.enlist_type::<crate::lang::RuntimeException>();
        let mut names = Names::new(
            [
                "java.lang.IllegalArgumentException",
                "java.lang.RuntimeException",
                "java.lang.Exception",
                "java.lang.Throwable",
                ROOT_CLASS,
            ]
            .map(String::from),
        );
        assert_matches!(
            resolve(&registry, &mut names).unwrap(),
            Resolution::Matched { factory, class_name } => {
                assert_eq!(factory.class().dotted_name(), "java.lang.RuntimeException");
                assert_eq!(class_name, "java.lang.IllegalArgumentException");
            }
        );
        assert_eq!(names.taken, 2);
    }

    #[test]
    fn builtins_match_their_own_class() {
        let registry = FactoryRegistry::with_builtins();
        let mut names = Names::new(["java.lang.IllegalArgumentException".to_owned()]);
        assert_matches!(
            resolve(&registry, &mut names).unwrap(),
            Resolution::Matched { factory, .. }
                if factory.class().dotted_name() == "java.lang.IllegalArgumentException"
        );
    }

    #[test]
    fn root_factory_is_never_consulted() {
        let registry = FactoryRegistry::new();
        registry.enlist_type::<crate::lang::Object>();
        let mut names = Names::chain(3);
        assert_matches!(
            resolve(&registry, &mut names).unwrap(),
            Resolution::Unmatched { .. }
        );
    }

    #[test]
    fn hierarchy_without_root_ends_unmatched() {
        let registry = FactoryRegistry::new();
        let mut names = Names::new(["com.example.Orphan".to_owned()]);
        assert_matches!(
            resolve(&registry, &mut names).unwrap(),
            Resolution::Unmatched { class_name } if class_name == "com.example.Orphan"
        );
    }

    #[test]
    fn cyclic_hierarchy_is_cut_off() {
        let registry = FactoryRegistry::new();
        let mut cycle = Cycle(0);
        let err = resolve(&registry, &mut cycle).unwrap_err();
        assert_matches!(err, Error::Bridge(msg) if msg.contains("Gave up walking"));
        assert_eq!(cycle.0, MAX_ANCESTORS);
    }

    #[test]
    fn empty_hierarchy_is_a_bridge_error() {
        let registry = FactoryRegistry::new();
        let mut names = Names::new(Vec::new());
        assert_matches!(resolve(&registry, &mut names), Err(Error::Bridge(_)));
    }
}
