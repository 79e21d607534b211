mod util;

use std::{sync::Arc, thread};

use assert_matches::assert_matches;
use jni_bridge::{
    errors::Error,
    refs::{self, Borrowed, Reference},
    vm::options::OptionList,
    JNIVersion, Jvm,
};
use util::{new_global, some_object, FakeLoader, FakeRuntime};

fn running() -> (Jvm, Arc<FakeRuntime>) {
    let runtime = FakeRuntime::new(JNIVersion::V1_8);
    let jvm = Jvm::new();
    jvm.create(&FakeLoader::new(&runtime), &OptionList::new())
        .unwrap_or_else(|e| panic!("{:#?}", e));
    (jvm, runtime)
}

#[test]
fn global_ref_is_deleted_on_drop() {
    let (jvm, runtime) = running();
    let env = jvm.attach().unwrap();
    let global = new_global(&env);
    assert!(!global.is_null());
    assert!(global.is_live());
    assert_eq!(runtime.live_globals(), 1);

    drop(global);
    assert_eq!(runtime.globals_deleted(), 1);
    assert_eq!(runtime.live_globals(), 0);
    assert_eq!(runtime.bad_global_deletes(), 0);
}

#[test]
fn release_is_idempotent() {
    let (jvm, runtime) = running();
    let env = jvm.attach().unwrap();
    let mut global = new_global(&env);
    global.release();
    assert!(global.is_released());
    assert!(!global.is_live());
    global.release();
    drop(global);

    assert_eq!(runtime.globals_created(), 1);
    assert_eq!(runtime.globals_deleted(), 1);
    assert_eq!(runtime.bad_global_deletes(), 0);
}

#[test]
fn release_after_teardown_does_nothing() {
    let (jvm, runtime) = running();
    let mut released = {
        let env = jvm.attach().unwrap();
        new_global(&env)
    };
    let dropped = {
        let env = jvm.attach().unwrap();
        new_global(&env)
    };
    jvm.teardown().unwrap();
    assert!(!released.is_live());

    released.release();
    drop(dropped);
    assert_eq!(runtime.globals_deleted(), 0);
    assert_eq!(runtime.bad_global_deletes(), 0);
}

#[test]
fn references_do_not_outlive_their_vm() {
    let (jvm, first) = running();
    let stale = {
        let env = jvm.attach().unwrap();
        new_global(&env)
    };
    jvm.teardown().unwrap();

    let second = FakeRuntime::new(JNIVersion::V1_8);
    jvm.create(&FakeLoader::new(&second), &OptionList::new())
        .unwrap();
    assert!(!stale.is_live());
    drop(stale);

    assert_eq!(first.bad_global_deletes(), 0);
    assert_eq!(second.bad_global_deletes(), 0);
    assert_eq!(second.globals_deleted(), 0);
}

#[test]
fn drop_on_an_unattached_thread() {
    let (jvm, runtime) = running();
    let global = {
        let env = jvm.attach().unwrap();
        new_global(&env)
    };

    let worker = jvm.clone();
    thread::spawn(move || {
        assert!(!worker.is_thread_attached());
        drop(global);
        // Attached just long enough to delete it.
        assert!(!worker.is_thread_attached());
    })
    .join()
    .unwrap();

    assert_eq!(runtime.attaches(), 1);
    assert_eq!(runtime.detaches(), 1);
    assert_eq!(runtime.globals_deleted(), 1);
    assert_eq!(runtime.bad_global_deletes(), 0);
    assert_eq!(jvm.threads_attached(), 1);
}

#[test]
fn drop_on_an_attached_thread() {
    let (jvm, runtime) = running();
    let global = {
        let env = jvm.attach().unwrap();
        new_global(&env)
    };

    let worker = jvm.clone();
    thread::spawn(move || {
        worker.attach().unwrap();
        drop(global);
        assert!(worker.is_thread_attached());
    })
    .join()
    .unwrap();

    assert_eq!(runtime.attaches(), 1);
    assert_eq!(runtime.globals_deleted(), 1);
    assert_eq!(runtime.bad_global_deletes(), 0);
}

#[test]
fn try_clone_makes_a_new_reference() {
    let (jvm, runtime) = running();
    let env = jvm.attach().unwrap();
    let global = new_global(&env);
    let copy = global.try_clone(&env).unwrap();
    assert_ne!(global.as_raw(), copy.as_raw());
    assert_eq!(runtime.live_globals(), 2);

    drop(global);
    assert!(copy.is_live());
    drop(copy);
    assert_eq!(runtime.live_globals(), 0);
}

#[test]
fn into_raw_gives_up_ownership() {
    let (jvm, runtime) = running();
    let env = jvm.attach().unwrap();
    let raw = new_global(&env).into_raw();
    assert!(!raw.is_null());
    assert_eq!(runtime.globals_deleted(), 0);
    assert_eq!(runtime.live_globals(), 1);

    let local = env.new_local_ref(&some_object()).unwrap();
    let raw = local.into_raw();
    assert!(!raw.is_null());
    assert_eq!(runtime.locals_deleted(), 0);
}

#[test]
fn auto_local_is_deleted_on_drop() {
    let (jvm, runtime) = running();
    let env = jvm.attach().unwrap();
    {
        let local = env.new_local_ref(&some_object()).unwrap();
        assert!(!local.is_null());
        let _again = env.new_local_ref(&local).unwrap();
    }
    assert_eq!(runtime.locals_created(), 2);
    assert_eq!(runtime.locals_deleted(), 2);
}

#[test]
fn exhausted_references() {
    let (jvm, runtime) = running();
    let env = jvm.attach().unwrap();
    runtime.exhaust(true);
    assert_matches!(
        env.new_global_ref(&some_object()),
        Err(Error::GlobalRefExhausted)
    );
    assert_matches!(
        env.new_local_ref(&some_object()),
        Err(Error::LocalRefExhausted)
    );

    runtime.exhaust(false);
    assert!(env.new_global_ref(&some_object()).is_ok());
}

#[test]
fn null_references_are_rejected() {
    let (jvm, runtime) = running();
    let env = jvm.attach().unwrap();
    let null = unsafe { Borrowed::from_raw(std::ptr::null_mut()) };
    assert!(null.is_null());
    assert_matches!(env.new_global_ref(&null), Err(Error::NullPtr(_)));
    assert_matches!(env.new_local_ref(&null), Err(Error::NullPtr(_)));
    assert_eq!(runtime.globals_created(), 0);
    assert_eq!(runtime.locals_created(), 0);
}

#[test]
fn global_refs_are_shared_between_threads() {
    let (jvm, runtime) = running();
    let global = Arc::new({
        let env = jvm.attach().unwrap();
        new_global(&env)
    });

    let threads: Vec<_> = (0..3)
        .map(|_| {
            let jvm = jvm.clone();
            let global = Arc::clone(&global);
            thread::spawn(move || {
                let env = jvm.attach().unwrap();
                let local = env.new_local_ref(&*global).unwrap();
                assert!(!local.is_null());
            })
        })
        .collect();
    for thread in threads {
        thread.join().unwrap();
    }

    assert_eq!(runtime.locals_created(), 3);
    assert_eq!(runtime.locals_deleted(), 3);
    drop(global);
    assert_eq!(runtime.globals_deleted(), 1);
    assert_eq!(runtime.bad_global_deletes(), 0);
}

#[test]
fn local_deletes_do_not_reach_a_new_vm() {
    let (jvm, first) = running();
    let env = jvm.attach().unwrap();
    let local = env.new_local_ref(&some_object()).unwrap();
    let raw = env.new_local_ref(&some_object()).unwrap().into_raw();
    jvm.teardown().unwrap();

    let second = FakeRuntime::new(JNIVersion::V1_8);
    jvm.create(&FakeLoader::new(&second), &OptionList::new())
        .unwrap();
    drop(local);
    unsafe { refs::delete_local(&env, raw) };

    assert_eq!(first.locals_deleted(), 0);
    assert_eq!(second.locals_deleted(), 0);

    // A fresh environment deletes through the new VM.
    let env = jvm.attach().unwrap();
    drop(env.new_local_ref(&some_object()).unwrap());
    assert_eq!(second.locals_deleted(), 1);
}
