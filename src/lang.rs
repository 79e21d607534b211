//! Proxies for the `java.lang` classes the bridge itself relies on.

use crate::exceptions::FactoryRegistry;

crate::java_class! {
    /// `java.lang.Object`
    pub struct Object => "java/lang/Object";
    /// `java.lang.Throwable`
    pub struct Throwable => "java/lang/Throwable";
    /// `java.lang.Exception`
    pub struct Exception => "java/lang/Exception";
    /// `java.lang.RuntimeException`
    pub struct RuntimeException => "java/lang/RuntimeException";
    /// `java.lang.IllegalArgumentException`
    pub struct IllegalArgumentException => "java/lang/IllegalArgumentException";
    /// `java.lang.IllegalStateException`
    pub struct IllegalStateException => "java/lang/IllegalStateException";
    /// `java.lang.NullPointerException`
    pub struct NullPointerException => "java/lang/NullPointerException";
    /// `java.lang.UnsupportedOperationException`
    pub struct UnsupportedOperationException => "java/lang/UnsupportedOperationException";
    /// `java.lang.ClassNotFoundException`
    pub struct ClassNotFoundException => "java/lang/ClassNotFoundException";
}

/// Enlists the exception proxies above.
pub(crate) fn enlist_builtins(registry: &FactoryRegistry) {
    registry.enlist_type::<Throwable>();
    registry.enlist_type::<Exception>();
    registry.enlist_type::<RuntimeException>();
    registry.enlist_type::<IllegalArgumentException>();
    registry.enlist_type::<IllegalStateException>();
    registry.enlist_type::<NullPointerException>();
    registry.enlist_type::<UnsupportedOperationException>();
    registry.enlist_type::<ClassNotFoundException>();
}
