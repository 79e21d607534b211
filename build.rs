//! Compiles the Java half of the bridge (`java/src/main/java`) when the `invocation` feature is
//! enabled, and exports the class directory as `JNI_BRIDGE_CLASSES`.
//!
//! Without `invocation` the helper classes are expected on the class path of the VM the crate
//! is loaded into.

use std::{
    env,
    path::{Path, PathBuf},
    process::Command,
};

const JAVA_SOURCES: &str = "java/src/main/java";

fn main() {
    println!("cargo:rerun-if-changed={JAVA_SOURCES}");
    println!("cargo:rerun-if-env-changed=JAVA_HOME");

    if env::var_os("CARGO_FEATURE_INVOCATION").is_none() {
        return;
    }

    let out_dir = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR is set by cargo"));
    let classes = out_dir.join("classes");
    std::fs::create_dir_all(&classes).expect("Failed to create the class output directory");

    let sources = java_sources(Path::new(JAVA_SOURCES));
    if sources.is_empty() {
        println!("cargo:warning=No Java sources found under {JAVA_SOURCES}");
        return;
    }

    let status = Command::new(javac())
        .arg("-d")
        .arg(&classes)
        .args(["-encoding", "UTF-8", "--release", "8", "-nowarn"])
        .args(&sources)
        .status();
    match status {
        Ok(status) if status.success() => {
            println!("cargo:rustc-env=JNI_BRIDGE_CLASSES={}", classes.display());
        }
        Ok(status) => println!("cargo:warning=javac failed ({status}); helper classes not built"),
        Err(err) => println!("cargo:warning=Failed to run javac ({err}); try setting JAVA_HOME"),
    }
}

fn java_sources(root: &Path) -> Vec<PathBuf> {
    walkdir::WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "java"))
        .map(|entry| entry.into_path())
        .collect()
}

#[cfg(feature = "invocation")]
fn javac() -> PathBuf {
    let exe = if cfg!(windows) { "javac.exe" } else { "javac" };
    java_locator::locate_java_home()
        .map(|home| PathBuf::from(home).join("bin").join(exe))
        .ok()
        .filter(|path| path.is_file())
        .unwrap_or_else(|| PathBuf::from(exe))
}

#[cfg(not(feature = "invocation"))]
fn javac() -> PathBuf {
    PathBuf::from("javac")
}
