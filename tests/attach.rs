mod util;

use std::{
    sync::{Arc, Barrier},
    thread,
};

use assert_matches::assert_matches;
use jni_bridge::{
    errors::{Error, JniError},
    vm::{options::OptionList, AttachConfig, Daemon},
    JNIVersion, Jvm,
};
use util::{FakeLoader, FakeRuntime};

fn running() -> (Jvm, Arc<FakeRuntime>) {
    let runtime = FakeRuntime::new(JNIVersion::V1_8);
    let jvm = Jvm::new();
    jvm.create(&FakeLoader::new(&runtime), &OptionList::new())
        .unwrap_or_else(|e| panic!("{:#?}", e));
    (jvm, runtime)
}

#[test]
fn attach_twice_returns_the_same_env() {
    let (jvm, runtime) = running();
    let worker = jvm.clone();
    let observer = runtime.clone();
    thread::spawn(move || {
        let first = worker.attach().unwrap();
        let second = worker.attach().unwrap();
        assert_eq!(first.get_raw(), second.get_raw());
        assert_eq!(observer.attaches(), 1);
        assert_eq!(worker.threads_attached(), 2);
    })
    .join()
    .unwrap();

    // One hook, one detach.
    assert_eq!(runtime.detaches(), 1);
    assert_eq!(jvm.threads_attached(), 1);
}

#[test]
fn exiting_threads_are_detached() {
    let (jvm, runtime) = running();
    let threads: Vec<_> = (0..4)
        .map(|_| {
            let jvm = jvm.clone();
            thread::spawn(move || {
                let env = jvm.attach().unwrap();
                assert_eq!(env.version(), JNIVersion::V1_8);
                assert!(jvm.is_thread_attached());
            })
        })
        .collect();
    for thread in threads {
        thread.join().unwrap();
    }

    assert_eq!(runtime.attaches(), 4);
    assert_eq!(runtime.detaches(), 4);
    assert_eq!(jvm.threads_attached(), 1);
    jvm.teardown().unwrap();
    assert_eq!(runtime.destroys(), 1);
}

#[test]
fn attach_without_a_vm() {
    let jvm = Jvm::new();
    assert_matches!(jvm.attach(), Err(Error::VmShutdown));
    assert!(!jvm.is_thread_attached());

    let (jvm, _runtime) = running();
    jvm.teardown().unwrap();
    let worker = jvm.clone();
    thread::spawn(move || assert_matches!(worker.attach(), Err(Error::VmShutdown)))
        .join()
        .unwrap();
}

#[test]
fn refused_attach() {
    let (jvm, runtime) = running();
    runtime.fail_attach(Some(JniError::NoMemory));
    let worker = jvm.clone();
    thread::spawn(move || {
        assert_matches!(
            worker.attach(),
            Err(Error::AttachFailed(JniError::NoMemory))
        );
    })
    .join()
    .unwrap();
    assert_eq!(jvm.threads_attached(), 1);
    assert_eq!(runtime.detaches(), 0);
}

#[test]
fn daemon_policy() {
    let (jvm, runtime) = running();
    let worker = jvm.clone();
    thread::spawn(move || {
        worker.attach().unwrap();
    })
    .join()
    .unwrap();

    let worker = jvm.clone();
    thread::spawn(move || {
        worker
            .attach_with(&AttachConfig::new().daemon(Daemon::NonDaemon))
            .unwrap();
    })
    .join()
    .unwrap();

    let history = runtime.history();
    assert_eq!(history.len(), 2);
    assert!(history[0].daemon);
    assert!(!history[1].daemon);

    // The thread that adopted the VM attaches as a normal thread, unless told otherwise.
    let adopted = FakeRuntime::new(JNIVersion::V1_8);
    let jvm = Jvm::new();
    jvm.adopt_runtime(adopted.clone(), JNIVersion::V1_8).unwrap();
    jvm.detach();
    jvm.attach_with(&AttachConfig::new().daemon(Daemon::Daemon))
        .unwrap();
    let history = adopted.history();
    assert!(!history[0].daemon);
    assert!(history[1].daemon);
}

#[test]
fn thread_names() {
    let (jvm, runtime) = running();
    let worker = jvm.clone();
    thread::Builder::new()
        .name("loader-7".into())
        .spawn(move || {
            worker.attach().unwrap();
        })
        .unwrap()
        .join()
        .unwrap();

    let worker = jvm.clone();
    thread::spawn(move || {
        worker
            .attach_with(&AttachConfig::new().name("Indexer"))
            .unwrap();
    })
    .join()
    .unwrap();

    let worker = jvm.clone();
    thread::spawn(move || {
        worker.attach().unwrap();
    })
    .join()
    .unwrap();

    let names: Vec<_> = runtime.history().into_iter().map(|a| a.name).collect();
    assert_eq!(names[0], "loader-7");
    assert_eq!(names[1], "Indexer");
    assert!(names[2].starts_with("NativeThread-"));
}

#[test]
fn explicit_detach_cancels_the_hook() {
    let (jvm, runtime) = running();
    let worker = jvm.clone();
    thread::spawn(move || {
        worker.attach().unwrap();
        assert!(worker.is_thread_attached());
        worker.detach();
        assert!(!worker.is_thread_attached());
        // Nothing left to detach.
        worker.detach();
    })
    .join()
    .unwrap();

    assert_eq!(runtime.attaches(), 1);
    assert_eq!(runtime.detaches(), 1);
    assert_eq!(jvm.threads_attached(), 1);
}

#[test]
fn scoped_attachment() {
    let (jvm, runtime) = running();
    let worker = jvm.clone();
    let observer = runtime.clone();
    thread::spawn(move || {
        let scoped = AttachConfig::new().scoped(true);
        let version = worker
            .with_env(&scoped, |env| {
                assert_eq!(worker.threads_attached(), 2);
                // Nested scopes reuse the attachment.
                worker.with_env(&scoped, |inner| {
                    assert_eq!(inner.get_raw(), env.get_raw());
                    Ok(())
                })?;
                assert!(worker.is_thread_attached());
                Ok(env.version())
            })
            .unwrap();
        assert_eq!(version, JNIVersion::V1_8);
        assert!(!worker.is_thread_attached());
        assert_eq!(worker.threads_attached(), 1);
        assert_eq!(observer.detaches(), 1);
    })
    .join()
    .unwrap();

    // No hook was left behind.
    assert_eq!(runtime.detaches(), 1);
}

#[test]
fn scoped_attachment_keeps_an_existing_attachment() {
    let (jvm, runtime) = running();
    let worker = jvm.clone();
    thread::spawn(move || {
        worker.attach().unwrap();
        worker
            .with_env(&AttachConfig::new().scoped(true), |_| Ok(()))
            .unwrap();
        assert!(worker.is_thread_attached());
    })
    .join()
    .unwrap();
    assert_eq!(runtime.attaches(), 1);
    assert_eq!(runtime.detaches(), 1);
}

#[test]
fn threads_outliving_the_vm_are_not_detached() {
    let (jvm, runtime) = running();
    let attached = Arc::new(Barrier::new(2));
    let torn_down = Arc::new(Barrier::new(2));

    let worker = {
        let jvm = jvm.clone();
        let attached = attached.clone();
        let torn_down = torn_down.clone();
        thread::spawn(move || {
            jvm.attach().unwrap();
            attached.wait();
            torn_down.wait();
        })
    };

    attached.wait();
    jvm.teardown().unwrap();
    torn_down.wait();
    worker.join().unwrap();

    assert_eq!(runtime.attaches(), 1);
    assert_eq!(runtime.detaches(), 0);
    assert_eq!(jvm.threads_attached(), 0);
}

#[test]
fn hooks_do_not_reach_a_new_vm() {
    let (jvm, first) = running();
    let attached = Arc::new(Barrier::new(2));
    let replaced = Arc::new(Barrier::new(2));

    let worker = {
        let jvm = jvm.clone();
        let attached = attached.clone();
        let replaced = replaced.clone();
        thread::spawn(move || {
            jvm.attach().unwrap();
            attached.wait();
            replaced.wait();
        })
    };

    attached.wait();
    jvm.teardown().unwrap();
    let second = FakeRuntime::new(JNIVersion::V1_8);
    jvm.create(&FakeLoader::new(&second), &OptionList::new())
        .unwrap();
    replaced.wait();
    worker.join().unwrap();

    assert_eq!(first.detaches(), 0);
    assert_eq!(second.detaches(), 0);
    assert_eq!(jvm.threads_attached(), 1);
}
