//! Class-file metadata and classpath indexing for the call-site compiler.
//!
//! This crate scans JDK modules, classpath entries and advice roots and
//! exposes the result through the [`TypeIndex`] trait. Class files are read
//! with a streaming parser that keeps only what the compiler consults:
//! the type hierarchy, method signatures with access flags, and runtime
//! annotations (visible and invisible).

mod classfile;
mod descriptor;
mod fallback;
mod index;
mod scanner;

#[cfg(any(test, feature = "fixtures"))]
pub mod fixture;

pub use classfile::{
    parse_class, AccessFlags, Annotation, ClassParseError, ElementValue, ParsedClass,
    ParsedMethod, CONSTRUCTOR, STATIC_INITIALIZER,
};
pub use descriptor::{
    parse_field_descriptor, parse_method_descriptor, DescriptorError, MethodDescriptor, Primitive,
    TypeName,
};
pub use fallback::ensure_fallback_types;
pub use index::{ClassIndex, MethodEntry, TypeEntry, TypeIndex};
pub use scanner::{
    detect_java_home, expand_classpath, scan_path, scan_roots, ClasspathScanner, IndexError,
    ScanContext, ScanMode, ScannedClass,
};
