use crate::classfile::{AccessFlags, ParsedClass, CONSTRUCTOR, STATIC_INITIALIZER};
use crate::descriptor::{MethodDescriptor, TypeName};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};

/// Read-only view over the types available to the compiler.
///
/// Implementations must be shareable across worker threads; lookups are
/// expected to be cheap (in-memory maps).
pub trait TypeIndex: Send + Sync {
    fn lookup_type(&self, fqcn: &str) -> Option<&TypeEntry>;

    /// Finds a method by owner, name and parameter types, searching the
    /// owner first and then its super classes and interfaces.
    fn lookup_method(
        &self,
        owner: &str,
        name: &str,
        parameters: &[TypeName],
    ) -> Option<(&TypeEntry, &MethodEntry)> {
        let mut queue = VecDeque::from([owner.to_string()]);
        let mut visited = HashSet::new();
        while let Some(current) = queue.pop_front() {
            if !visited.insert(current.clone()) {
                continue;
            }
            let Some(entry) = self.lookup_type(&current) else {
                continue;
            };
            if let Some(method) = entry.find_method(name, parameters) {
                return Some((entry, method));
            }
            // Constructors are never inherited.
            if name == CONSTRUCTOR {
                return None;
            }
            queue.extend(entry.super_types().map(str::to_string));
        }
        None
    }
}

/// Aggregated type metadata harvested from the JDK and the classpath.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ClassIndex {
    pub types: HashMap<String, TypeEntry>,
    pub packages: HashMap<String, HashSet<String>>,
}

impl ClassIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn add_type(&mut self, entry: TypeEntry) {
        self.packages
            .entry(entry.package.clone())
            .or_default()
            .insert(entry.fqcn.clone());
        self.types.insert(entry.fqcn.clone(), entry);
    }

    pub fn add_class(&mut self, parsed: &ParsedClass) {
        self.add_type(TypeEntry::from_parsed(parsed));
    }

    /// Types declared in a package, sorted by name.
    pub fn package_types(&self, package: &str) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .packages
            .get(package)
            .map(|types| types.iter().map(String::as_str).collect())
            .unwrap_or_default();
        names.sort_unstable();
        names
    }
}

impl TypeIndex for ClassIndex {
    fn lookup_type(&self, fqcn: &str) -> Option<&TypeEntry> {
        self.types.get(fqcn)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodEntry {
    pub name: String,
    pub descriptor: MethodDescriptor,
    pub access: AccessFlags,
}

impl MethodEntry {
    pub fn new(name: impl Into<String>, descriptor: MethodDescriptor, access: u16) -> Self {
        Self {
            name: name.into(),
            descriptor,
            access: AccessFlags(access),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeEntry {
    pub fqcn: String,
    pub package: String,
    pub access: AccessFlags,
    pub super_class: Option<String>,
    #[serde(default)]
    pub interfaces: Vec<String>,
    #[serde(default)]
    pub methods: Vec<MethodEntry>,
}

impl TypeEntry {
    pub fn new(fqcn: impl Into<String>) -> Self {
        let fqcn = fqcn.into();
        let package = fqcn
            .rsplit_once('.')
            .map(|(pkg, _)| pkg.to_string())
            .unwrap_or_default();
        Self {
            fqcn,
            package,
            access: AccessFlags(AccessFlags::PUBLIC),
            super_class: Some("java.lang.Object".to_string()),
            interfaces: Vec::new(),
            methods: Vec::new(),
        }
    }

    pub fn from_parsed(parsed: &ParsedClass) -> Self {
        Self {
            fqcn: parsed.fqcn.clone(),
            package: parsed.package.clone(),
            access: parsed.access,
            super_class: parsed.super_class.clone(),
            interfaces: parsed.interfaces.clone(),
            methods: parsed
                .methods
                .iter()
                .filter(|method| method.name != "<clinit>")
                .map(|method| MethodEntry {
                    name: method.name.clone(),
                    descriptor: method.signature.clone(),
                    access: method.access,
                })
                .collect(),
        }
    }

    pub fn with_super_class(mut self, super_class: Option<&str>) -> Self {
        self.super_class = super_class.map(str::to_string);
        self
    }

    pub fn with_interface(mut self, interface: impl Into<String>) -> Self {
        self.interfaces.push(interface.into());
        self
    }

    pub fn as_interface(mut self) -> Self {
        self.access = AccessFlags(AccessFlags::PUBLIC | AccessFlags::INTERFACE | AccessFlags::ABSTRACT);
        self
    }

    pub fn with_method(mut self, method: MethodEntry) -> Self {
        self.methods.push(method);
        self
    }

    pub fn is_interface(&self) -> bool {
        self.access.is_interface()
    }

    pub fn super_types(&self) -> impl Iterator<Item = &str> {
        self.super_class
            .iter()
            .chain(self.interfaces.iter())
            .map(String::as_str)
    }

    /// Methods declared directly by this type (no initializers).
    pub fn declared_methods(&self) -> impl Iterator<Item = &MethodEntry> {
        self.methods
            .iter()
            .filter(|method| method.name != STATIC_INITIALIZER && !method.access.is_synthetic())
    }

    pub fn find_method(&self, name: &str, parameters: &[TypeName]) -> Option<&MethodEntry> {
        self.methods
            .iter()
            .find(|method| method.name == name && method.descriptor.parameters == parameters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::Primitive;

    fn method(name: &str, parameters: Vec<TypeName>, return_type: TypeName) -> MethodEntry {
        MethodEntry::new(
            name,
            MethodDescriptor::new(parameters, return_type),
            AccessFlags::PUBLIC,
        )
    }

    fn sample_index() -> ClassIndex {
        let mut index = ClassIndex::new();
        index.add_type(
            TypeEntry::new("java.lang.Object")
                .with_super_class(None)
                .with_method(method("hashCode", vec![], TypeName::Primitive(Primitive::Int))),
        );
        index.add_type(
            TypeEntry::new("java.lang.CharSequence")
                .as_interface()
                .with_super_class(None)
                .with_method(method("length", vec![], TypeName::Primitive(Primitive::Int))),
        );
        index.add_type(
            TypeEntry::new("java.lang.String")
                .with_interface("java.lang.CharSequence")
                .with_method(method(
                    CONSTRUCTOR,
                    vec![TypeName::reference("java.lang.String")],
                    TypeName::Void,
                )),
        );
        index.add_type(TypeEntry::new("java.lang.Sub").with_super_class(Some("java.lang.String")));
        index
    }

    #[test]
    fn finds_inherited_methods_through_classes_and_interfaces() {
        let index = sample_index();
        let (declaring, found) = index
            .lookup_method("java.lang.String", "hashCode", &[])
            .expect("inherited from Object");
        assert_eq!(declaring.fqcn, "java.lang.Object");
        assert_eq!(found.name, "hashCode");

        let (declaring, _) = index
            .lookup_method("java.lang.String", "length", &[])
            .expect("inherited from CharSequence");
        assert_eq!(declaring.fqcn, "java.lang.CharSequence");
    }

    #[test]
    fn constructors_are_not_inherited() {
        let index = sample_index();
        let ctor = [TypeName::reference("java.lang.String")];
        assert!(index.lookup_method("java.lang.String", CONSTRUCTOR, &ctor).is_some());
        assert!(index.lookup_method("java.lang.Sub", CONSTRUCTOR, &ctor).is_none());
    }

    #[test]
    fn groups_types_by_package() {
        let index = sample_index();
        assert_eq!(
            index.package_types("java.lang"),
            vec![
                "java.lang.CharSequence",
                "java.lang.Object",
                "java.lang.String",
                "java.lang.Sub"
            ]
        );
        assert_eq!(index.len(), 4);
    }
}
