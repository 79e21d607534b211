//! Values crossing the boundary: objects and the eight primitive kinds.
//!
//! Every primitive kind is described by one row of a table (descriptor, wrapper class, boxing
//! and unboxing methods), which is all boxing and unboxing needs.

use std::fmt;

use crate::{
    env::Env,
    errors::*,
    refs::{AutoLocal, GlobalRef, Reference},
    sys,
};

/// The Java primitive types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
}

struct Row {
    kind: Primitive,
    name: &'static str,
    descriptor: char,
    wrapper: &'static str,
    value_of_sig: &'static str,
    unbox_method: &'static str,
    unbox_sig: &'static str,
}

macro_rules! primitive_table {
    ( $( $kind:ident => $name:literal, $desc:literal, $wrapper:literal ),* $(,)? ) => {
        static TABLE: &[Row] = &[
            $(
                Row {
                    kind: Primitive::$kind,
                    name: $name,
                    descriptor: $desc,
                    wrapper: concat!("java/lang/", $wrapper),
                    value_of_sig: concat!("(", $desc, ")Ljava/lang/", $wrapper, ";"),
                    unbox_method: concat!($name, "Value"),
                    unbox_sig: concat!("()", $desc),
                },
            )*
        ];
    };
}

primitive_table! {
    Boolean => "boolean", 'Z', "Boolean",
    Byte => "byte", 'B', "Byte",
    Char => "char", 'C', "Character",
    Short => "short", 'S', "Short",
    Int => "int", 'I', "Integer",
    Long => "long", 'J', "Long",
    Float => "float", 'F', "Float",
    Double => "double", 'D', "Double",
}

impl Primitive {
    pub const ALL: [Primitive; 8] = [
        Primitive::Boolean,
        Primitive::Byte,
        Primitive::Char,
        Primitive::Short,
        Primitive::Int,
        Primitive::Long,
        Primitive::Float,
        Primitive::Double,
    ];

    fn row(self) -> &'static Row {
        &TABLE[self as usize]
    }

    /// The Java keyword: `int`.
    pub fn name(self) -> &'static str {
        self.row().name
    }

    /// The type descriptor: `I`.
    pub fn descriptor(self) -> char {
        self.row().descriptor
    }

    /// The wrapper class in internal form: `java/lang/Integer`.
    pub fn wrapper_class(self) -> &'static str {
        self.row().wrapper
    }

    /// Signature of the wrapper's static `valueOf`.
    pub fn value_of_sig(self) -> &'static str {
        self.row().value_of_sig
    }

    /// Name and signature of the wrapper's unboxing method: `intValue`, `()I`.
    pub fn unbox_method(self) -> (&'static str, &'static str) {
        (self.row().unbox_method, self.row().unbox_sig)
    }

    pub fn from_descriptor(descriptor: char) -> Option<Self> {
        TABLE.iter().find(|row| row.descriptor == descriptor).map(|row| row.kind)
    }

    /// The primitive a wrapper class (internal or dotted form) boxes.
    pub fn from_wrapper_class(class: &str) -> Option<Self> {
        TABLE
            .iter()
            .find(|row| row.wrapper == class || row.wrapper.replace('/', ".") == class)
            .map(|row| row.kind)
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A Java value: an object reference, a primitive, or nothing (`void`).
#[derive(Debug)]
pub enum JValue {
    Object(Option<GlobalRef>),
    Bool(bool),
    Byte(i8),
    Char(u16),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Void,
}

impl JValue {
    /// The primitive kind, `None` for objects and `void`.
    pub fn primitive(&self) -> Option<Primitive> {
        Some(match self {
            JValue::Bool(_) => Primitive::Boolean,
            JValue::Byte(_) => Primitive::Byte,
            JValue::Char(_) => Primitive::Char,
            JValue::Short(_) => Primitive::Short,
            JValue::Int(_) => Primitive::Int,
            JValue::Long(_) => Primitive::Long,
            JValue::Float(_) => Primitive::Float,
            JValue::Double(_) => Primitive::Double,
            JValue::Object(_) | JValue::Void => return None,
        })
    }

    /// The value as a raw JNI argument. Objects are passed as their raw reference.
    pub fn as_jni(&self) -> sys::jvalue {
        match self {
            JValue::Object(obj) => sys::jvalue {
                l: obj.as_ref().map(GlobalRef::as_raw).unwrap_or(std::ptr::null_mut()),
            },
            JValue::Bool(v) => sys::jvalue { z: *v as _ },
            JValue::Byte(v) => sys::jvalue { b: *v },
            JValue::Char(v) => sys::jvalue { c: *v },
            JValue::Short(v) => sys::jvalue { s: *v },
            JValue::Int(v) => sys::jvalue { i: *v },
            JValue::Long(v) => sys::jvalue { j: *v },
            JValue::Float(v) => sys::jvalue { f: *v },
            JValue::Double(v) => sys::jvalue { d: *v },
            JValue::Void => sys::jvalue {
                l: std::ptr::null_mut(),
            },
        }
    }

    /// The value as a Java object: primitives are boxed through their wrapper's `valueOf`,
    /// objects get a new local reference, `void` and `null` become `None`.
    pub fn to_object<'env>(&self, env: &'env Env) -> Result<Option<AutoLocal<'env>>> {
        match self {
            JValue::Void | JValue::Object(None) => Ok(None),
            JValue::Object(Some(obj)) => env.new_local_ref(obj).map(Some),
            _ => {
                let Some(kind) = self.primitive() else {
                    return Ok(None);
                };
                let class = env.find_class(kind.wrapper_class())?;
                let value_of = env.get_static_method_id(&class, "valueOf", kind.value_of_sig())?;
                unsafe { env.call_static_object_method(&class, value_of, &[self.as_jni()]) }
            }
        }
    }

    /// Unboxes a wrapper object of the given kind.
    pub fn unbox(env: &Env, obj: &dyn Reference, kind: Primitive) -> Result<JValue> {
        let wrapper = env.find_class(kind.wrapper_class())?;
        if !env.is_instance_of(obj, &wrapper)? {
            return Err(Error::bridge(format!(
                "Can not unbox a {}: the value isn't a {}",
                kind,
                kind.wrapper_class().replace('/', ".")
            )));
        }
        let (name, sig) = kind.unbox_method();
        let method = env.get_method_id(&wrapper, name, sig)?;
        unsafe { env.call_primitive_method(obj, method, kind, &[]) }
    }
}

macro_rules! from_primitive {
    ( $( $ty:ty => $variant:ident ),* ) => {
        $(
            impl From<$ty> for JValue {
                fn from(value: $ty) -> Self {
                    JValue::$variant(value)
                }
            }
        )*
    };
}

from_primitive! {
    bool => Bool,
    i8 => Byte,
    u16 => Char,
    i16 => Short,
    i32 => Int,
    i64 => Long,
    f32 => Float,
    f64 => Double
}

impl From<()> for JValue {
    fn from(_: ()) -> Self {
        JValue::Void
    }
}

impl From<GlobalRef> for JValue {
    fn from(obj: GlobalRef) -> Self {
        JValue::Object(Some(obj))
    }
}

impl From<Option<GlobalRef>> for JValue {
    fn from(obj: Option<GlobalRef>) -> Self {
        JValue::Object(obj)
    }
}
