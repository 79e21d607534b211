use std::sync::Once;

use jni_bridge::{
    vm::{
        loader::DefaultVmLoader,
        options::{OptionList, SystemProperty},
    },
    Env, JNIVersion, Jvm, HELPER_CLASSES,
};

/// The process-wide VM, started on first use with the helper classes on its class path.
pub fn jvm() -> &'static Jvm {
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let mut options = OptionList::new()
            .custom("-Xcheck:jni")
            .unwrap_or_else(|e| panic!("{:#?}", e));
        if let Some(classes) = HELPER_CLASSES {
            options.push(SystemProperty::class_path(classes));
        }

        let loader = DefaultVmLoader::new(JNIVersion::V1_8).unwrap_or_else(|e| panic!("{:#?}", e));
        Jvm::global()
            .create(&loader, &options)
            .unwrap_or_else(|e| panic!("{:#?}", e));
    });

    Jvm::global()
}

/// The calling thread's environment.
pub fn env() -> Env {
    jvm().attach().unwrap_or_else(|e| panic!("{:#?}", e))
}
