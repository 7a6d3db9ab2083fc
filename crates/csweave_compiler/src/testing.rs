//! Shared fixtures for unit tests.

use crate::diagnostics::SourceLocation;
use crate::extract::{AdviceMethod, CallSiteSpecification};
use crate::resolver::TypeResolver;
use crate::types::{InjectionKind, ParameterRole};
use csweave_classpath::{
    ensure_fallback_types, parse_method_descriptor, AccessFlags, ClassIndex, MethodDescriptor,
    MethodEntry, TypeEntry,
};
use std::sync::Arc;

const STRING: &str = "java.lang.String";
const CHAR_SEQUENCE: &str = "java.lang.CharSequence";
const STRING_BUILDER: &str = "java.lang.StringBuilder";

fn method(name: &str, descriptor: &str, access: u16) -> MethodEntry {
    let descriptor: MethodDescriptor =
        parse_method_descriptor(descriptor).expect("fixture descriptor");
    MethodEntry::new(name, descriptor, access)
}

/// A small slice of `java.lang` with the members the tests weave.
pub fn jdk_index() -> ClassIndex {
    let public = AccessFlags::PUBLIC;
    let mut index = ClassIndex::new();
    index.add_type(
        TypeEntry::new(STRING)
            .with_interface("java.io.Serializable")
            .with_interface("java.lang.Comparable")
            .with_interface(CHAR_SEQUENCE)
            .with_method(method("trim", "()Ljava/lang/String;", public))
            .with_method(method(
                "concat",
                "(Ljava/lang/String;)Ljava/lang/String;",
                public,
            ))
            .with_method(method(
                "replace",
                "(Ljava/lang/CharSequence;Ljava/lang/CharSequence;)Ljava/lang/String;",
                public,
            ))
            .with_method(method("indexOf", "(Ljava/lang/String;)I", public))
            .with_method(method(
                "regionMatches",
                "(ILjava/lang/String;II)Z",
                public,
            ))
            .with_method(method(
                "valueOf",
                "(I)Ljava/lang/String;",
                public | AccessFlags::STATIC,
            ))
            .with_method(method(
                "valueOf",
                "(J)Ljava/lang/String;",
                public | AccessFlags::STATIC,
            )),
    );
    index.add_type(
        TypeEntry::new(STRING_BUILDER)
            .with_interface(CHAR_SEQUENCE)
            .with_method(method("<init>", "()V", public))
            .with_method(method("<init>", "(Ljava/lang/String;)V", public))
            .with_method(method("setLength", "(I)V", public))
            .with_method(method(
                "append",
                "(Ljava/lang/String;)Ljava/lang/StringBuilder;",
                public,
            ))
            .with_method(method("toString", "()Ljava/lang/String;", public)),
    );
    index.add_type(
        TypeEntry::new("java.lang.Math")
            .with_method(method("max", "(JJ)J", public | AccessFlags::STATIC)),
    );
    ensure_fallback_types(&mut index);
    index
}

pub fn jdk_resolver() -> TypeResolver {
    TypeResolver::new(Arc::new(jdk_index()))
}

/// A public static advice method on `com.acme.Advice` with the given roles.
pub fn specification(
    kind: InjectionKind,
    pointcut: &str,
    descriptor: &str,
    roles: &[ParameterRole],
) -> CallSiteSpecification {
    let parsed = parse_method_descriptor(descriptor).expect("advice descriptor");
    let name = kind.marker().to_lowercase();
    CallSiteSpecification {
        location: SourceLocation::method("com.acme.Advice", name.as_str(), descriptor),
        kind,
        pointcut: pointcut.to_string(),
        advice: AdviceMethod {
            owner: "com.acme.Advice".into(),
            name,
            descriptor: descriptor.to_string(),
            parameters: parsed.parameters,
            return_type: parsed.return_type,
            is_static: true,
            is_public: true,
        },
        parameters: roles.iter().map(|role| vec![*role]).collect(),
    }
}

pub fn before(pointcut: &str, descriptor: &str, roles: &[ParameterRole]) -> CallSiteSpecification {
    specification(InjectionKind::Before, pointcut, descriptor, roles)
}

pub fn around(pointcut: &str, descriptor: &str, roles: &[ParameterRole]) -> CallSiteSpecification {
    specification(InjectionKind::Around, pointcut, descriptor, roles)
}

pub fn after(pointcut: &str, descriptor: &str, roles: &[ParameterRole]) -> CallSiteSpecification {
    specification(InjectionKind::After, pointcut, descriptor, roles)
}
