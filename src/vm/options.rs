//! Startup options for a VM created with [`Jvm::create`](crate::Jvm::create).

use std::{
    ffi::{c_char, c_void},
    fmt, ptr,
};

use crate::{errors::*, sys, vm::init_args::InitArgs, JNIVersion};

/// Redirects the VM's internal `vfprintf`. The last argument is the platform `va_list`.
pub type VfprintfHook =
    unsafe extern "C" fn(stream: *mut c_void, format: *const c_char, args: *mut c_void) -> sys::jint;

/// Called by the VM instead of `exit()`.
pub type ExitHook = extern "C" fn(code: sys::jint);

/// Called by the VM instead of `abort()`.
pub type AbortHook = extern "C" fn();

/// A `-D<name>=<value>` system property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemProperty {
    name: String,
    value: String,
}

impl SystemProperty {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        SystemProperty {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

macro_rules! system_properties {
    ( $( $name:ident => $key:literal ),* $(,)? ) => {
        /// Names of the well-known system properties.
        pub mod keys {
            paste::paste! {
                $( pub const [<$name:upper>]: &str = $key; )*
            }
        }

        impl SystemProperty {
            $(
                #[doc = concat!("`-D", $key, "=<value>`")]
                pub fn $name(value: impl Into<String>) -> Self {
                    SystemProperty::new($key, value)
                }
            )*
        }
    };
}

system_properties! {
    java_version => "java.version",
    java_vendor => "java.vendor",
    java_vendor_url => "java.vendor.url",
    java_home => "java.home",
    vm_specification_version => "java.vm.specification.version",
    vm_specification_vendor => "java.vm.specification.vendor",
    vm_specification_name => "java.vm.specification.name",
    vm_version => "java.vm.version",
    vm_vendor => "java.vm.vendor",
    vm_name => "java.vm.name",
    specification_version => "java.specification.version",
    specification_vendor => "java.specification.vendor",
    specification_name => "java.specification.name",
    class_version => "java.class.version",
    class_path => "java.class.path",
    library_path => "java.library.path",
    tmp_dir => "java.io.tmpdir",
    compiler => "java.compiler",
    ext_dirs => "java.ext.dirs",
    os_name => "os.name",
    os_arch => "os.arch",
    os_version => "os.version",
    file_separator => "file.separator",
    path_separator => "path.separator",
    line_separator => "line.separator",
    user_name => "user.name",
    user_home => "user.home",
    user_dir => "user.dir",
}

/// Categories for `-verbose:<category>`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbose {
    Gc,
    Jni,
    Class,
}

/// `-javaagent:<path>[=<options>]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JavaAgent {
    path: String,
    options: Option<String>,
}

impl JavaAgent {
    pub fn new(path: impl Into<String>) -> Self {
        JavaAgent {
            path: path.into(),
            options: None,
        }
    }

    pub fn with_options(path: impl Into<String>, options: impl Into<String>) -> Self {
        let options = options.into();
        let options = options.trim();
        JavaAgent {
            path: path.into(),
            options: (!options.is_empty()).then(|| options.to_owned()),
        }
    }
}

/// A VM-specific option passed through verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomOption(String);

impl CustomOption {
    /// Fails unless `value` starts with `-X` or `_`, the prefixes the VM reserves for
    /// non-standard options.
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        if value.starts_with("-X") || value.starts_with('_') {
            Ok(CustomOption(value))
        } else {
            Err(Error::InvalidOption {
                option: value,
                reason: "custom options must begin with `-X` or `_`",
            })
        }
    }
}

/// A native function the VM should call instead of its own.
#[derive(Clone, Copy)]
pub enum Hook {
    Vfprintf(VfprintfHook),
    Exit(ExitHook),
    Abort(AbortHook),
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Hook::Vfprintf(hook) => write!(f, "Hook::Vfprintf({:p})", *hook as *const c_void),
            Hook::Exit(hook) => write!(f, "Hook::Exit({:p})", *hook as *const c_void),
            Hook::Abort(hook) => write!(f, "Hook::Abort({:p})", *hook as *const c_void),
        }
    }
}

/// One VM startup option.
#[derive(Debug, Clone)]
pub enum VmOption {
    SystemProperty(SystemProperty),
    Verbose(Verbose),
    JavaAgent(JavaAgent),
    Custom(CustomOption),
    Hook(Hook),
}

impl VmOption {
    /// The `optionString` handed to `JNI_CreateJavaVM`.
    pub fn option_string(&self) -> String {
        match self {
            VmOption::SystemProperty(prop) => format!("-D{}={}", prop.name, prop.value),
            VmOption::Verbose(Verbose::Gc) => "-verbose:gc".to_owned(),
            VmOption::Verbose(Verbose::Jni) => "-verbose:jni".to_owned(),
            VmOption::Verbose(Verbose::Class) => "-verbose:class".to_owned(),
            VmOption::JavaAgent(JavaAgent {
                path,
                options: Some(options),
            }) => format!("-javaagent:{path}={options}"),
            VmOption::JavaAgent(JavaAgent {
                path,
                options: None,
            }) => format!("-javaagent:{path}"),
            VmOption::Custom(CustomOption(value)) => value.clone(),
            VmOption::Hook(Hook::Vfprintf(_)) => "vfprintf".to_owned(),
            VmOption::Hook(Hook::Exit(_)) => "exit".to_owned(),
            VmOption::Hook(Hook::Abort(_)) => "abort".to_owned(),
        }
    }

    /// The `extraInfo` handed to `JNI_CreateJavaVM`; only hooks carry one.
    pub fn extra_info(&self) -> *mut c_void {
        match self {
            VmOption::Hook(Hook::Vfprintf(hook)) => *hook as *mut c_void,
            VmOption::Hook(Hook::Exit(hook)) => *hook as *mut c_void,
            VmOption::Hook(Hook::Abort(hook)) => *hook as *mut c_void,
            _ => ptr::null_mut(),
        }
    }
}

impl From<SystemProperty> for VmOption {
    fn from(prop: SystemProperty) -> Self {
        VmOption::SystemProperty(prop)
    }
}

impl From<Verbose> for VmOption {
    fn from(verbose: Verbose) -> Self {
        VmOption::Verbose(verbose)
    }
}

impl From<JavaAgent> for VmOption {
    fn from(agent: JavaAgent) -> Self {
        VmOption::JavaAgent(agent)
    }
}

impl From<CustomOption> for VmOption {
    fn from(option: CustomOption) -> Self {
        VmOption::Custom(option)
    }
}

impl From<Hook> for VmOption {
    fn from(hook: Hook) -> Self {
        VmOption::Hook(hook)
    }
}

/// An ordered list of startup options.
///
/// ```
/// use jni_bridge::vm::options::{OptionList, SystemProperty, Verbose};
///
/// let options = OptionList::new()
///     .with(SystemProperty::class_path("."))
///     .with(Verbose::Gc)
///     .custom("-Xcheck:jni")?;
/// assert_eq!(options.len(), 3);
/// # Ok::<(), jni_bridge::errors::Error>(())
/// ```
///
/// Options the VM doesn't recognize are ignored unless the list is made [`strict`](Self::strict).
#[derive(Debug, Clone, Default)]
pub struct OptionList {
    options: Vec<VmOption>,
    strict: bool,
}

impl OptionList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, option: impl Into<VmOption>) -> &mut Self {
        self.options.push(option.into());
        self
    }

    pub fn with(mut self, option: impl Into<VmOption>) -> Self {
        self.push(option);
        self
    }

    /// Adds a [`CustomOption`], failing on a value the VM wouldn't treat as one.
    pub fn custom(self, value: impl Into<String>) -> Result<Self> {
        Ok(self.with(CustomOption::new(value)?))
    }

    /// Makes the VM refuse to start when it meets an option it doesn't recognize.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn len(&self) -> usize {
        self.options.len()
    }

    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, VmOption> {
        self.options.iter()
    }

    /// Translates the list into the argument block for `JNI_CreateJavaVM`.
    pub fn to_init_args(&self, version: JNIVersion) -> Result<InitArgs> {
        InitArgs::new(version, !self.strict, &self.options)
    }
}

impl<'a> IntoIterator for &'a OptionList {
    type Item = &'a VmOption;
    type IntoIter = std::slice::Iter<'a, VmOption>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<O: Into<VmOption>> FromIterator<O> for OptionList {
    fn from_iter<I: IntoIterator<Item = O>>(iter: I) -> Self {
        OptionList {
            options: iter.into_iter().map(Into::into).collect(),
            strict: false,
        }
    }
}
