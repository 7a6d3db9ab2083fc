use crate::diagnostics::ErrorKind;
use crate::types::{ResolvedMethod, Type, TypeKind, CLONEABLE, OBJECT, SERIALIZABLE};
use csweave_classpath::{TypeIndex, TypeName};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("type `{name}` cannot be resolved")]
    UnresolvedType { name: String },
    #[error("method `{owner}.{name}{descriptor}` cannot be resolved")]
    UnresolvedMethod {
        owner: String,
        name: String,
        descriptor: String,
    },
}

impl From<ResolveError> for ErrorKind {
    fn from(error: ResolveError) -> Self {
        match error {
            ResolveError::UnresolvedType { name } => ErrorKind::UnresolvedType { name },
            ResolveError::UnresolvedMethod {
                owner,
                name,
                descriptor,
            } => ErrorKind::UnresolvedMethod {
                owner,
                name,
                descriptor,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct MethodKey {
    owner: TypeName,
    name: String,
    parameters: Vec<TypeName>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub types: usize,
    pub methods: usize,
    pub hits: usize,
    pub misses: usize,
}

/// Resolves type names and method references against a [`TypeIndex`].
///
/// Results are cached for the lifetime of the resolver. The caches are
/// read-mostly and tolerate concurrent inserts of the same key: the first
/// stored value wins, so every caller observes the same interned [`Type`].
pub struct TypeResolver {
    index: Arc<dyn TypeIndex>,
    types: RwLock<HashMap<TypeName, Type>>,
    methods: RwLock<HashMap<MethodKey, Result<Arc<ResolvedMethod>, ResolveError>>>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl TypeResolver {
    pub fn new(index: Arc<dyn TypeIndex>) -> Self {
        Self {
            index,
            types: RwLock::new(HashMap::new()),
            methods: RwLock::new(HashMap::new()),
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        }
    }

    pub fn resolve_type(&self, name: &TypeName) -> Result<Type, ResolveError> {
        if let Some(found) = self.types.read().get(name) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(found.clone());
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let resolved = match name {
            TypeName::Void => Type::void(),
            TypeName::Primitive(primitive) => Type::primitive(*primitive),
            TypeName::Array { .. } => {
                let component = name
                    .component()
                    .ok_or_else(|| unresolved_type(name))
                    .and_then(|component| self.resolve_type(&component))
                    .map_err(|_| unresolved_type(name))?;
                Type::array(name.clone(), component)
            }
            TypeName::Reference(fqcn) => {
                let entry = self
                    .index
                    .lookup_type(fqcn)
                    .ok_or_else(|| unresolved_type(name))?;
                Type::reference(entry)
            }
        };

        let mut types = self.types.write();
        Ok(types.entry(name.clone()).or_insert(resolved).clone())
    }

    /// Resolves `owner.name(parameters)`, searching the owner and then its
    /// super types. Constructors are only searched on the owner.
    pub fn resolve_method(
        &self,
        owner: &Type,
        name: &str,
        parameters: &[Type],
    ) -> Result<Arc<ResolvedMethod>, ResolveError> {
        let key = MethodKey {
            owner: owner.name().clone(),
            name: name.to_string(),
            parameters: parameters.iter().map(|ty| ty.name().clone()).collect(),
        };
        if let Some(found) = self.methods.read().get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return found.clone();
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let resolved = self.lookup_method(owner, &key, parameters);
        let mut methods = self.methods.write();
        methods.entry(key).or_insert(resolved).clone()
    }

    /// Resolves a method written with its return type. A method whose
    /// parameters match but whose return type differs is not the one named,
    /// and is reported as unresolved with the full descriptor.
    pub fn resolve_method_returning(
        &self,
        owner: &Type,
        name: &str,
        parameters: &[Type],
        return_type: &TypeName,
    ) -> Result<Arc<ResolvedMethod>, ResolveError> {
        match self.resolve_method(owner, name, parameters) {
            Ok(method) if method.return_type.name() == return_type => Ok(method),
            Ok(_) | Err(ResolveError::UnresolvedMethod { .. }) => {
                Err(ResolveError::UnresolvedMethod {
                    owner: owner.to_string(),
                    name: name.to_string(),
                    descriptor: method_descriptor(parameters, Some(return_type)),
                })
            }
            Err(error) => Err(error),
        }
    }

    fn lookup_method(
        &self,
        owner: &Type,
        key: &MethodKey,
        parameters: &[Type],
    ) -> Result<Arc<ResolvedMethod>, ResolveError> {
        let unresolved = || ResolveError::UnresolvedMethod {
            owner: owner.to_string(),
            name: key.name.clone(),
            descriptor: method_descriptor(parameters, None),
        };

        let TypeName::Reference(fqcn) = owner.name() else {
            return Err(unresolved());
        };
        let (declaring, method) = self
            .index
            .lookup_method(fqcn, &key.name, &key.parameters)
            .ok_or_else(unresolved)?;
        let declaring_type = self.resolve_type(&TypeName::reference(declaring.fqcn.as_str()))?;
        let return_type = self.resolve_type(&method.descriptor.return_type)?;

        Ok(Arc::new(ResolvedMethod {
            owner: owner.clone(),
            declaring_type,
            name: key.name.clone(),
            parameters: parameters.to_vec(),
            return_type,
            is_static: method.access.is_static(),
            is_public: method.access.is_public(),
        }))
    }

    /// Whether a value of type `from` can be used where `to` is expected.
    pub fn is_assignable(&self, from: &Type, to: &Type) -> bool {
        if from == to {
            return true;
        }
        match (from.kind(), to.kind()) {
            (TypeKind::Void, _) | (_, TypeKind::Void) => false,
            (TypeKind::Primitive(_), _) | (_, TypeKind::Primitive(_)) => false,
            _ if to.is_named(OBJECT) => true,
            (TypeKind::Array, TypeKind::Array) => match (from.component(), to.component()) {
                (Some(source), Some(target)) if source.is_reference() && target.is_reference() => {
                    self.is_assignable(source, target)
                }
                _ => false,
            },
            (TypeKind::Array, TypeKind::Reference) => {
                to.is_named(CLONEABLE) || to.is_named(SERIALIZABLE)
            }
            (TypeKind::Reference, TypeKind::Array) => false,
            (TypeKind::Reference, TypeKind::Reference) => self.is_subtype(from, to),
        }
    }

    fn is_subtype(&self, from: &Type, to: &Type) -> bool {
        let TypeName::Reference(target) = to.name() else {
            return false;
        };
        let mut queue: VecDeque<String> = from.super_types().map(str::to_string).collect();
        let mut visited = HashSet::new();
        while let Some(current) = queue.pop_front() {
            if &current == target {
                return true;
            }
            if !visited.insert(current.clone()) {
                continue;
            }
            // Types missing from the index end the walk on that branch.
            if let Ok(ty) = self.resolve_type(&TypeName::Reference(current)) {
                queue.extend(ty.super_types().map(str::to_string));
            }
        }
        false
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            types: self.types.read().len(),
            methods: self.methods.read().len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

/// `(params)ret`, or just `(params)` when the return type is not known.
fn method_descriptor(parameters: &[Type], return_type: Option<&TypeName>) -> String {
    let mut descriptor = String::from("(");
    for parameter in parameters {
        descriptor.push_str(&parameter.name().descriptor());
    }
    descriptor.push(')');
    if let Some(return_type) = return_type {
        descriptor.push_str(&return_type.descriptor());
    }
    descriptor
}

fn unresolved_type(name: &TypeName) -> ResolveError {
    ResolveError::UnresolvedType {
        name: name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use csweave_classpath::{
        AccessFlags, ClassIndex, MethodDescriptor, MethodEntry, Primitive, TypeEntry,
    };

    fn resolver() -> TypeResolver {
        let mut index = ClassIndex::new();
        index.add_type(TypeEntry::new(OBJECT).with_super_class(None));
        index.add_type(TypeEntry::new(CLONEABLE).as_interface().with_super_class(None));
        index.add_type(TypeEntry::new(SERIALIZABLE).as_interface().with_super_class(None));
        index.add_type(
            TypeEntry::new("java.lang.CharSequence")
                .as_interface()
                .with_super_class(None)
                .with_method(MethodEntry::new(
                    "length",
                    MethodDescriptor::new(vec![], TypeName::Primitive(Primitive::Int)),
                    AccessFlags::PUBLIC | AccessFlags::ABSTRACT,
                )),
        );
        index.add_type(
            TypeEntry::new("java.lang.String")
                .with_interface("java.lang.CharSequence")
                .with_interface(SERIALIZABLE)
                .with_method(MethodEntry::new(
                    "valueOf",
                    MethodDescriptor::new(
                        vec![TypeName::Primitive(Primitive::Int)],
                        TypeName::reference("java.lang.String"),
                    ),
                    AccessFlags::PUBLIC | AccessFlags::STATIC,
                )),
        );
        TypeResolver::new(Arc::new(index))
    }

    fn reference(resolver: &TypeResolver, name: &str) -> Type {
        resolver
            .resolve_type(&TypeName::reference(name))
            .expect("indexed type")
    }

    #[test]
    fn repeated_lookups_return_the_interned_instance() {
        let resolver = resolver();
        let first = reference(&resolver, "java.lang.String");
        let second = reference(&resolver, "java.lang.String");
        assert!(first.same_instance(&second));

        let stats = resolver.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn unresolved_array_reports_original_name() {
        let resolver = resolver();
        let missing = TypeName::array_of(TypeName::reference("com.acme.Missing"), 2);
        assert_eq!(
            resolver.resolve_type(&missing),
            Err(ResolveError::UnresolvedType {
                name: "com.acme.Missing[][]".into()
            })
        );
    }

    #[test]
    fn resolves_inherited_methods_with_metadata() {
        let resolver = resolver();
        let string = reference(&resolver, "java.lang.String");
        let length = resolver
            .resolve_method(&string, "length", &[])
            .expect("inherited from CharSequence");
        assert_eq!(length.declaring_type.to_string(), "java.lang.CharSequence");
        assert_eq!(length.owner, string);
        assert!(!length.is_static);

        let int = resolver
            .resolve_type(&TypeName::Primitive(Primitive::Int))
            .expect("primitive");
        let value_of = resolver
            .resolve_method(&string, "valueOf", &[int])
            .expect("declared");
        assert!(value_of.is_static);
        assert_eq!(value_of.descriptor(), "(I)Ljava/lang/String;");

        assert_eq!(
            resolver.resolve_method(&string, "strip", &[]),
            Err(ResolveError::UnresolvedMethod {
                owner: "java.lang.String".into(),
                name: "strip".into(),
                descriptor: "()".into(),
            })
        );
    }

    #[test]
    fn return_type_is_part_of_the_method_identity() {
        let resolver = resolver();
        let string = reference(&resolver, "java.lang.String");
        let int = TypeName::Primitive(Primitive::Int);
        let int_type = resolver.resolve_type(&int).expect("primitive");

        let value_of = resolver
            .resolve_method_returning(
                &string,
                "valueOf",
                &[int_type.clone()],
                &TypeName::reference("java.lang.String"),
            )
            .expect("declared with this return type");
        assert_eq!(value_of.descriptor(), "(I)Ljava/lang/String;");

        assert_eq!(
            resolver.resolve_method_returning(&string, "valueOf", &[int_type.clone()], &int),
            Err(ResolveError::UnresolvedMethod {
                owner: "java.lang.String".into(),
                name: "valueOf".into(),
                descriptor: "(I)I".into(),
            })
        );
        assert_eq!(
            resolver.resolve_method_returning(&string, "strip", &[], &TypeName::Void),
            Err(ResolveError::UnresolvedMethod {
                owner: "java.lang.String".into(),
                name: "strip".into(),
                descriptor: "()V".into(),
            })
        );
    }

    #[test]
    fn assignability_rules() {
        let resolver = resolver();
        let object = reference(&resolver, OBJECT);
        let string = reference(&resolver, "java.lang.String");
        let sequence = reference(&resolver, "java.lang.CharSequence");
        let cloneable = reference(&resolver, CLONEABLE);
        let int = resolver
            .resolve_type(&TypeName::Primitive(Primitive::Int))
            .expect("primitive");
        let long = resolver
            .resolve_type(&TypeName::Primitive(Primitive::Long))
            .expect("primitive");
        let strings = resolver
            .resolve_type(&TypeName::array_of(TypeName::reference("java.lang.String"), 1))
            .expect("array");
        let sequences = resolver
            .resolve_type(&TypeName::array_of(
                TypeName::reference("java.lang.CharSequence"),
                1,
            ))
            .expect("array");
        let ints = resolver
            .resolve_type(&TypeName::array_of(TypeName::Primitive(Primitive::Int), 1))
            .expect("array");

        assert!(resolver.is_assignable(&string, &string));
        assert!(resolver.is_assignable(&string, &sequence));
        assert!(!resolver.is_assignable(&sequence, &string));
        assert!(resolver.is_assignable(&string, &object));
        assert!(resolver.is_assignable(&int, &int));
        assert!(!resolver.is_assignable(&int, &long));
        assert!(!resolver.is_assignable(&int, &object));
        assert!(resolver.is_assignable(&strings, &object));
        assert!(resolver.is_assignable(&ints, &cloneable));
        assert!(resolver.is_assignable(&strings, &sequences));
        assert!(!resolver.is_assignable(&sequences, &strings));
        assert!(!resolver.is_assignable(&ints, &strings));
    }
}
