use crate::index::{ClassIndex, TypeEntry, TypeIndex};

/// Core `java.lang` hierarchy registered when no JDK could be indexed.
#[derive(Debug, Clone, Copy)]
struct FallbackType {
    fqcn: &'static str,
    super_class: Option<&'static str>,
    interfaces: &'static [&'static str],
    interface: bool,
}

const OBJECT: &str = "java.lang.Object";

const FALLBACK_TYPES: &[FallbackType] = &[
    FallbackType {
        fqcn: OBJECT,
        super_class: None,
        interfaces: &[],
        interface: false,
    },
    FallbackType {
        fqcn: "java.io.Serializable",
        super_class: None,
        interfaces: &[],
        interface: true,
    },
    FallbackType {
        fqcn: "java.lang.Cloneable",
        super_class: None,
        interfaces: &[],
        interface: true,
    },
    FallbackType {
        fqcn: "java.lang.CharSequence",
        super_class: None,
        interfaces: &[],
        interface: true,
    },
    FallbackType {
        fqcn: "java.lang.Comparable",
        super_class: None,
        interfaces: &[],
        interface: true,
    },
    FallbackType {
        fqcn: "java.lang.String",
        super_class: Some(OBJECT),
        interfaces: &[
            "java.io.Serializable",
            "java.lang.Comparable",
            "java.lang.CharSequence",
        ],
        interface: false,
    },
    FallbackType {
        fqcn: "java.lang.Number",
        super_class: Some(OBJECT),
        interfaces: &["java.io.Serializable"],
        interface: false,
    },
    FallbackType {
        fqcn: "java.lang.Integer",
        super_class: Some("java.lang.Number"),
        interfaces: &["java.lang.Comparable"],
        interface: false,
    },
    FallbackType {
        fqcn: "java.lang.Long",
        super_class: Some("java.lang.Number"),
        interfaces: &["java.lang.Comparable"],
        interface: false,
    },
    FallbackType {
        fqcn: "java.lang.Boolean",
        super_class: Some(OBJECT),
        interfaces: &["java.io.Serializable", "java.lang.Comparable"],
        interface: false,
    },
    FallbackType {
        fqcn: "java.lang.Throwable",
        super_class: Some(OBJECT),
        interfaces: &["java.io.Serializable"],
        interface: false,
    },
];

fn to_entry(ty: &FallbackType) -> TypeEntry {
    let mut entry = TypeEntry::new(ty.fqcn).with_super_class(ty.super_class);
    for interface in ty.interfaces {
        entry = entry.with_interface(*interface);
    }
    if ty.interface {
        entry = entry.as_interface();
    }
    entry
}

/// Registers the fallback `java.lang` types missing from the index.
///
/// Returns how many types were added. Methods are never synthesised, so
/// pointcuts on JDK methods still require a real JDK on the module path.
pub fn ensure_fallback_types(index: &mut ClassIndex) -> usize {
    let mut added = 0;
    for ty in FALLBACK_TYPES {
        if index.lookup_type(ty.fqcn).is_some() {
            continue;
        }
        index.add_type(to_entry(ty));
        added += 1;
    }
    added
}
