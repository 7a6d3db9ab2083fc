use csweave_classpath::{Primitive, TypeEntry, TypeName};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

pub const OBJECT: &str = "java.lang.Object";
pub const CLONEABLE: &str = "java.lang.Cloneable";
pub const SERIALIZABLE: &str = "java.io.Serializable";

pub use csweave_classpath::CONSTRUCTOR;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Void,
    Primitive(Primitive),
    Array,
    Reference,
}

#[derive(Debug)]
struct TypeData {
    name: TypeName,
    kind: TypeKind,
    component: Option<Type>,
    super_class: Option<String>,
    interfaces: Vec<String>,
    interface: bool,
    declared_methods: usize,
}

/// A resolved JVM type.
///
/// Instances are interned by the resolver, so cloning only bumps a
/// reference count. Equality checks identity first and falls back to the
/// type name.
#[derive(Clone)]
pub struct Type(Arc<TypeData>);

impl Type {
    pub fn void() -> Self {
        Self::leaf(TypeName::Void, TypeKind::Void)
    }

    pub fn primitive(primitive: Primitive) -> Self {
        Self::leaf(TypeName::Primitive(primitive), TypeKind::Primitive(primitive))
    }

    pub fn array(name: TypeName, component: Type) -> Self {
        Type(Arc::new(TypeData {
            name,
            kind: TypeKind::Array,
            component: Some(component),
            super_class: Some(OBJECT.to_string()),
            interfaces: vec![CLONEABLE.to_string(), SERIALIZABLE.to_string()],
            interface: false,
            declared_methods: 0,
        }))
    }

    pub fn reference(entry: &TypeEntry) -> Self {
        Type(Arc::new(TypeData {
            name: TypeName::reference(entry.fqcn.as_str()),
            kind: TypeKind::Reference,
            component: None,
            super_class: entry.super_class.clone(),
            interfaces: entry.interfaces.clone(),
            interface: entry.is_interface(),
            declared_methods: entry.declared_methods().count(),
        }))
    }

    fn leaf(name: TypeName, kind: TypeKind) -> Self {
        Type(Arc::new(TypeData {
            name,
            kind,
            component: None,
            super_class: None,
            interfaces: Vec::new(),
            interface: false,
            declared_methods: 0,
        }))
    }

    pub fn name(&self) -> &TypeName {
        &self.0.name
    }

    pub fn kind(&self) -> TypeKind {
        self.0.kind
    }

    pub fn component(&self) -> Option<&Type> {
        self.0.component.as_ref()
    }

    pub fn is_void(&self) -> bool {
        self.0.kind == TypeKind::Void
    }

    pub fn is_primitive(&self) -> bool {
        matches!(self.0.kind, TypeKind::Primitive(_))
    }

    /// Reference or array type.
    pub fn is_reference(&self) -> bool {
        matches!(self.0.kind, TypeKind::Reference | TypeKind::Array)
    }

    pub fn is_interface(&self) -> bool {
        self.0.interface
    }

    /// Number of methods the type declares itself (initializers and
    /// synthetic members excluded).
    pub fn declared_method_count(&self) -> usize {
        self.0.declared_methods
    }

    /// Direct super class followed by the directly implemented interfaces.
    pub fn super_types(&self) -> impl Iterator<Item = &str> {
        self.0
            .super_class
            .iter()
            .chain(self.0.interfaces.iter())
            .map(String::as_str)
    }

    pub fn is_named(&self, fqcn: &str) -> bool {
        matches!(&self.0.name, TypeName::Reference(name) if name == fqcn)
    }

    pub fn slot_width(&self) -> u8 {
        self.0.name.slot_width()
    }

    pub fn descriptor(&self) -> String {
        self.0.name.descriptor()
    }

    pub(crate) fn same_instance(&self, other: &Type) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        self.same_instance(other) || self.0.name == other.0.name
    }
}

impl Eq for Type {}

impl Hash for Type {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.name.hash(state);
    }
}

impl fmt::Debug for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Type({})", self.0.name)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0.name, f)
    }
}

/// A pointcut as written: `ReturnType Owner.name(Param, ...)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodSignature {
    pub return_type: TypeName,
    pub owner: TypeName,
    pub name: String,
    pub parameters: Vec<TypeName>,
    pub is_constructor: bool,
}

impl MethodSignature {
    pub fn descriptor(&self) -> String {
        let mut out = String::from("(");
        for parameter in &self.parameters {
            out.push_str(&parameter.descriptor());
        }
        out.push(')');
        out.push_str(&self.return_type.descriptor());
        out
    }

    /// Every type mentioned by the signature, owner first.
    pub fn mentioned_types(&self) -> impl Iterator<Item = &TypeName> {
        std::iter::once(&self.owner)
            .chain(std::iter::once(&self.return_type))
            .chain(self.parameters.iter())
    }
}

impl fmt::Display for MethodSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}.{}(", self.return_type, self.owner, self.name)?;
        for (index, parameter) in self.parameters.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{parameter}")?;
        }
        f.write_str(")")
    }
}

/// A method whose owner, parameter and return types have been resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMethod {
    pub owner: Type,
    pub declaring_type: Type,
    pub name: String,
    pub parameters: Vec<Type>,
    pub return_type: Type,
    pub is_static: bool,
    pub is_public: bool,
}

impl ResolvedMethod {
    pub fn is_constructor(&self) -> bool {
        self.name == CONSTRUCTOR
    }

    pub fn descriptor(&self) -> String {
        let mut out = String::from("(");
        for parameter in &self.parameters {
            out.push_str(&parameter.descriptor());
        }
        out.push(')');
        out.push_str(&self.return_type.descriptor());
        out
    }

    /// Whether the call site leaves a value on the stack.
    pub fn produces_value(&self) -> bool {
        !self.return_type.is_void()
    }
}

impl fmt::Display for ResolvedMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}{}", self.owner, self.name, self.descriptor())
    }
}

/// What an advice parameter is bound to at the call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum ParameterRole {
    This,
    Argument { index: u16 },
    Return,
    AllArguments { include_this: bool },
}

impl ParameterRole {
    pub fn marker_name(&self) -> &'static str {
        match self {
            ParameterRole::This => "This",
            ParameterRole::Argument { .. } => "Argument",
            ParameterRole::Return => "Return",
            ParameterRole::AllArguments { .. } => "AllArguments",
        }
    }
}

impl fmt::Display for ParameterRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterRole::Argument { index } => write!(f, "Argument({index})"),
            ParameterRole::AllArguments { include_this: true } => {
                f.write_str("AllArguments(includeThis)")
            }
            other => f.write_str(other.marker_name()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InjectionKind {
    Before,
    Around,
    After,
}

impl InjectionKind {
    pub const ALL: [InjectionKind; 3] = [
        InjectionKind::Before,
        InjectionKind::Around,
        InjectionKind::After,
    ];

    /// Suffix of the method annotation selecting this kind.
    pub fn marker(self) -> &'static str {
        match self {
            InjectionKind::Before => "Before",
            InjectionKind::Around => "Around",
            InjectionKind::After => "After",
        }
    }
}

impl fmt::Display for InjectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.marker())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_falls_back_to_names() {
        let left = Type::primitive(Primitive::Int);
        let right = Type::primitive(Primitive::Int);
        assert!(!left.same_instance(&right));
        assert_eq!(left, right);
        assert_ne!(left, Type::primitive(Primitive::Long));
    }

    #[test]
    fn arrays_expose_object_cloneable_and_serializable() {
        let element = Type::reference(&TypeEntry::new("java.lang.String"));
        let array = Type::array(
            TypeName::array_of(TypeName::reference("java.lang.String"), 1),
            element.clone(),
        );
        assert_eq!(array.component(), Some(&element));
        assert_eq!(
            array.super_types().collect::<Vec<_>>(),
            vec![OBJECT, CLONEABLE, SERIALIZABLE]
        );
        assert_eq!(array.to_string(), "java.lang.String[]");
    }

    #[test]
    fn signature_renders_in_canonical_form() {
        let signature = MethodSignature {
            return_type: TypeName::array_of(TypeName::reference("java.lang.String"), 1),
            owner: TypeName::reference("java.lang.String"),
            name: "split".into(),
            parameters: vec![
                TypeName::reference("java.lang.String"),
                TypeName::Primitive(Primitive::Int),
            ],
            is_constructor: false,
        };
        assert_eq!(
            signature.to_string(),
            "java.lang.String[] java.lang.String.split(java.lang.String, int)"
        );
        assert_eq!(
            signature.descriptor(),
            "(Ljava/lang/String;I)[Ljava/lang/String;"
        );
    }
}
