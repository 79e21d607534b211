use std::fmt;

use log::debug;
use parking_lot::{const_rwlock, RwLock};

use crate::{
    class_loader,
    env::Env,
    errors::*,
    refs::{AutoLocal, GlobalRef},
    sys,
};

/// The native side's handle on one Java class: its internal name, its type signature, and a
/// lazily resolved global reference to the class object.
///
/// Descriptors are meant to live in statics, one per proxy type (see
/// [`java_class!`](crate::java_class)). The class is looked up on first use, through the calling
/// thread's [class loader](crate::class_loader) if one is set, and is looked up again after the
/// VM it was resolved in has been torn down.
pub struct ClassDescriptor {
    internal_name: &'static str,
    signature: &'static str,
    class: RwLock<Option<GlobalRef>>,
}

impl ClassDescriptor {
    /// `internal_name` is in internal form (`java/lang/String`), `signature` the matching type
    /// signature (`Ljava/lang/String;`).
    pub const fn new(internal_name: &'static str, signature: &'static str) -> Self {
        ClassDescriptor {
            internal_name,
            signature,
            class: const_rwlock(None),
        }
    }

    pub fn internal_name(&self) -> &'static str {
        self.internal_name
    }

    pub fn signature(&self) -> &'static str {
        self.signature
    }

    /// The binary name: `java.lang.String`.
    pub fn dotted_name(&self) -> String {
        self.internal_name.replace('/', ".")
    }

    /// A local reference to the class, resolving it on first use.
    pub fn class<'env>(&self, env: &'env Env) -> Result<AutoLocal<'env>> {
        {
            let cached = self.class.read();
            if let Some(class) = cached.as_ref().filter(|class| class.is_live()) {
                return env.new_local_ref(class);
            }
        }

        let mut cached = self.class.write();
        if let Some(class) = cached.as_ref().filter(|class| class.is_live()) {
            return env.new_local_ref(class);
        }
        let local = self.resolve(env)?;
        let global = env.new_global_ref(&local)?;
        debug!("Resolved class {}", self.internal_name);
        *cached = Some(global);
        Ok(local)
    }

    fn resolve<'env>(&self, env: &'env Env) -> Result<AutoLocal<'env>> {
        match class_loader::class_loader() {
            Some(loader) => self.load_through(env, &loader),
            None => env.find_class(self.internal_name),
        }
    }

    fn load_through<'env>(&self, env: &'env Env, loader: &GlobalRef) -> Result<AutoLocal<'env>> {
        let loader_class = env.find_class("java/lang/ClassLoader")?;
        let load_class = env.get_method_id(
            &loader_class,
            "loadClass",
            "(Ljava/lang/String;)Ljava/lang/Class;",
        )?;
        let name = env.new_string(&self.dotted_name())?;
        let class =
            unsafe { env.call_object_method(loader, load_class, &[sys::jvalue { l: name.as_raw() }])? };
        class.ok_or_else(|| Error::bridge(format!("Unable to find the class, {}", self.internal_name)))
    }
}

impl fmt::Debug for ClassDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassDescriptor")
            .field("internal_name", &self.internal_name)
            .field("signature", &self.signature)
            .finish()
    }
}
