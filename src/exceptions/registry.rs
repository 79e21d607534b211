use std::{any::Any, collections::HashMap, fmt, marker::PhantomData, sync::Arc};

use log::debug;
use once_cell::sync::Lazy;
use parking_lot::RwLock;

use crate::{
    descriptor::ClassDescriptor,
    errors::*,
    exceptions::JavaException,
    lang,
    proxy::{FromGlobal, JavaClass, JavaObject},
    refs::GlobalRef,
    value::JValue,
};

/// Knows how to build the native proxy of one Java class.
pub trait Factory: Send + Sync + 'static {
    /// The class this factory builds proxies for.
    fn class(&self) -> &'static ClassDescriptor;

    /// Wraps a value of the class in its proxy type.
    fn create(&self, value: JValue) -> Result<Box<dyn Any + Send + Sync>>;

    /// The error standing for a thrown instance of the class.
    ///
    /// `class_name` is the runtime class of the thrown object, which may be a subclass of
    /// [`class`](Factory::class).
    fn throw_instance(
        &self,
        throwable: GlobalRef,
        class_name: String,
        message: Option<String>,
    ) -> Error;
}

/// The [`Factory`] of a proxy type declared with [`java_class!`](crate::java_class).
pub struct Enlister<T>(PhantomData<fn() -> T>);

impl<T> Enlister<T> {
    pub const fn new() -> Self {
        Enlister(PhantomData)
    }
}

impl<T> fmt::Debug for Enlister<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Enlister<{}>", std::any::type_name::<T>())
    }
}

impl<T> Default for Enlister<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Factory for Enlister<T>
where
    T: JavaClass + JavaObject + FromGlobal + fmt::Debug + Send + Sync + 'static,
{
    fn class(&self) -> &'static ClassDescriptor {
        T::class()
    }

    fn create(&self, value: JValue) -> Result<Box<dyn Any + Send + Sync>> {
        match value {
            JValue::Object(Some(obj)) => Ok(Box::new(T::from_global(obj))),
            other => Err(Error::bridge(format!(
                "Can't create a {} from {:?}",
                T::class().dotted_name(),
                other
            ))),
        }
    }

    fn throw_instance(
        &self,
        throwable: GlobalRef,
        class_name: String,
        message: Option<String>,
    ) -> Error {
        Error::JavaException(JavaException::new(
            class_name,
            message,
            Box::new(T::from_global(throwable)),
        ))
    }
}

static GLOBAL: Lazy<FactoryRegistry> = Lazy::new(FactoryRegistry::with_builtins);

/// Factories keyed by the dotted name of their class (`java.lang.RuntimeException`).
///
/// Registries only grow. Enlisting a name that is already present keeps the first factory.
pub struct FactoryRegistry {
    factories: RwLock<HashMap<String, Arc<dyn Factory>>>,
}

impl FactoryRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        FactoryRegistry {
            factories: RwLock::new(HashMap::new()),
        }
    }

    /// A registry holding the [`java.lang` proxies](crate::lang).
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        lang::enlist_builtins(&registry);
        registry
    }

    /// The process-wide registry, used by [`catch_and_throw`](super::catch_and_throw).
    pub fn global() -> &'static FactoryRegistry {
        &GLOBAL
    }

    /// Adds `factory` under its class's dotted name. Returns `false`, leaving the registry
    /// untouched, if the name was already taken.
    pub fn enlist(&self, factory: Arc<dyn Factory>) -> bool {
        let name = factory.class().dotted_name();
        let mut factories = self.factories.write();
        if factories.contains_key(&name) {
            debug!("Factory for {name} already enlisted; keeping the first one");
            return false;
        }
        debug!("Enlisted factory for {name}");
        factories.insert(name, factory);
        true
    }

    /// Enlists the proxy type `T`.
    pub fn enlist_type<T>(&self) -> bool
    where
        T: JavaClass + JavaObject + FromGlobal + fmt::Debug + Send + Sync + 'static,
    {
        self.enlist(Arc::new(Enlister::<T>::new()))
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<dyn Factory>> {
        self.factories.read().get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.factories.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for FactoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for FactoryRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let factories = self.factories.read();
        let mut names: Vec<_> = factories.keys().collect();
        names.sort();
        f.debug_struct("FactoryRegistry")
            .field("factories", &names)
            .finish()
    }
}
