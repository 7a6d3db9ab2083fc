//! Reads advice declarations from annotated class files.

use crate::diagnostics::{ErrorKind, SourceLocation, ValidationError};
use crate::resolver::{ResolveError, TypeResolver};
use crate::types::{InjectionKind, ParameterRole};
use csweave_classpath::{Annotation, ElementValue, ParsedClass, ParsedMethod, TypeName};
use tracing::debug;

/// Fully-qualified names of the annotations recognised on advice classes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Markers {
    pub call_site: String,
    this: String,
    argument: String,
    return_value: String,
    all_arguments: String,
}

impl Markers {
    pub fn new(base: &str) -> Self {
        let nested = |name: &str| format!("{base}${name}");
        Self {
            call_site: base.to_string(),
            this: nested("This"),
            argument: nested("Argument"),
            return_value: nested("Return"),
            all_arguments: nested("AllArguments"),
        }
    }

    pub fn is_call_site(&self, class: &ParsedClass) -> bool {
        class.annotation(&self.call_site).is_some()
    }

    fn kind_marker(&self, kind: InjectionKind) -> String {
        format!("{}${}", self.call_site, kind.marker())
    }

    fn container_marker(&self, kind: InjectionKind) -> String {
        format!("{}${}Array", self.call_site, kind.marker())
    }

    /// Role of a parameter annotation, `None` for unrelated annotations.
    /// `next_argument` is the index given to an `Argument` without one.
    fn role(&self, annotation: &Annotation, next_argument: u16) -> Option<ParameterRole> {
        let name = annotation.type_name.as_str();
        if name == self.this {
            Some(ParameterRole::This)
        } else if name == self.return_value {
            Some(ParameterRole::Return)
        } else if name == self.all_arguments {
            let include_this = annotation
                .element("includeThis")
                .and_then(ElementValue::as_bool)
                .unwrap_or(false);
            Some(ParameterRole::AllArguments { include_this })
        } else if name == self.argument {
            let index = annotation
                .element("value")
                .and_then(ElementValue::as_int)
                .and_then(|value| u16::try_from(value).ok())
                .unwrap_or(next_argument);
            Some(ParameterRole::Argument { index })
        } else {
            None
        }
    }
}

/// The advice method as declared in its class file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdviceMethod {
    pub owner: String,
    pub name: String,
    pub descriptor: String,
    pub parameters: Vec<TypeName>,
    pub return_type: TypeName,
    pub is_static: bool,
    pub is_public: bool,
}

impl AdviceMethod {
    fn from_parsed(owner: &str, method: &ParsedMethod) -> Self {
        Self {
            owner: owner.to_string(),
            name: method.name.clone(),
            descriptor: method.descriptor.clone(),
            parameters: method.signature.parameters.clone(),
            return_type: method.signature.return_type.clone(),
            is_static: method.access.is_static(),
            is_public: method.access.is_public(),
        }
    }
}

/// One advice marker on one method: what to inject, where, and how each
/// advice parameter is bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSiteSpecification {
    pub location: SourceLocation,
    pub kind: InjectionKind,
    pub pointcut: String,
    pub advice: AdviceMethod,
    /// Role markers found on each advice parameter, in declaration order.
    pub parameters: Vec<Vec<ParameterRole>>,
}

impl CallSiteSpecification {
    pub fn error(&self, kind: ErrorKind) -> ValidationError {
        ValidationError::new(kind, self.location.clone()).with_pointcut(self.pointcut.as_str())
    }
}

/// Everything read from one advice class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub class: String,
    pub spi: Vec<String>,
    pub helpers: Vec<String>,
    pub specifications: Vec<CallSiteSpecification>,
    pub errors: Vec<ValidationError>,
}

pub struct SpecificationExtractor<'a> {
    markers: &'a Markers,
    resolver: &'a TypeResolver,
}

impl<'a> SpecificationExtractor<'a> {
    pub fn new(markers: &'a Markers, resolver: &'a TypeResolver) -> Self {
        Self { markers, resolver }
    }

    /// Extracts the specifications of an advice class. Classes without the
    /// call-site annotation yield an empty extraction.
    pub fn extract(&self, class: &ParsedClass) -> Extraction {
        let mut extraction = Extraction {
            class: class.fqcn.clone(),
            spi: Vec::new(),
            helpers: Vec::new(),
            specifications: Vec::new(),
            errors: Vec::new(),
        };
        let Some(call_site) = class.annotation(&self.markers.call_site) else {
            return extraction;
        };

        extraction.spi = class_names(call_site.element("spi"));
        extraction.helpers = class_names(call_site.element("helpers"));

        for method in class.methods.iter().filter(|method| !method.is_initializer()) {
            self.extract_method(class, method, &mut extraction.specifications);
        }
        debug!(
            class = %class.fqcn,
            specifications = extraction.specifications.len(),
            "extracted advice class"
        );

        let location = SourceLocation::class(class.fqcn.as_str());
        if extraction.specifications.is_empty() {
            extraction.errors.push(ValidationError::new(
                ErrorKind::CallSiteShouldHaveAdviceMethods,
                location.clone(),
            ));
        }
        for spi in &extraction.spi {
            if let Some(kind) = self.check_spi(spi) {
                extraction
                    .errors
                    .push(ValidationError::new(kind, location.clone()));
            }
        }
        extraction
    }

    fn extract_method(
        &self,
        class: &ParsedClass,
        method: &ParsedMethod,
        out: &mut Vec<CallSiteSpecification>,
    ) {
        let pointcuts = self.pointcuts(method);
        if pointcuts.is_empty() {
            return;
        }

        let parameter_count = method.signature.parameters.len();
        let mut next_argument = 0u16;
        let parameters: Vec<Vec<ParameterRole>> = (0..parameter_count)
            .map(|position| {
                let annotations = method
                    .parameter_annotations
                    .get(position)
                    .map(Vec::as_slice)
                    .unwrap_or(&[]);
                annotations
                    .iter()
                    .filter_map(|annotation| {
                        let role = self.markers.role(annotation, next_argument)?;
                        if let ParameterRole::Argument { index } = role {
                            next_argument = index.saturating_add(1);
                        }
                        Some(role)
                    })
                    .collect()
            })
            .collect();

        let advice = AdviceMethod::from_parsed(&class.fqcn, method);
        let location = SourceLocation::method(
            class.fqcn.as_str(),
            method.name.as_str(),
            method.descriptor.as_str(),
        );
        out.extend(
            pointcuts
                .into_iter()
                .map(|(kind, pointcut)| CallSiteSpecification {
                    location: location.clone(),
                    kind,
                    pointcut,
                    advice: advice.clone(),
                    parameters: parameters.clone(),
                }),
        );
    }

    /// Kind and pointcut text of every advice marker on a method, direct
    /// markers first and repeated ones in container order.
    fn pointcuts(&self, method: &ParsedMethod) -> Vec<(InjectionKind, String)> {
        let mut found = Vec::new();
        for annotation in &method.annotations {
            for kind in InjectionKind::ALL {
                if annotation.type_name == self.markers.kind_marker(kind) {
                    found.push((kind, pointcut_text(annotation)));
                } else if annotation.type_name == self.markers.container_marker(kind) {
                    let nested = annotation
                        .element("value")
                        .map(ElementValue::as_slice)
                        .unwrap_or(&[]);
                    found.extend(nested.iter().filter_map(|value| match value {
                        ElementValue::Annotation(inner) => Some((kind, pointcut_text(inner))),
                        _ => None,
                    }));
                }
            }
        }
        found
    }

    fn check_spi(&self, spi: &str) -> Option<ErrorKind> {
        let ty = match self.resolver.resolve_type(&TypeName::reference(spi)) {
            Ok(ty) => ty,
            Err(ResolveError::UnresolvedType { name }) => {
                return Some(ErrorKind::UnresolvedType { name })
            }
            Err(ResolveError::UnresolvedMethod { .. }) => return None,
        };
        if !ty.is_interface() {
            return Some(ErrorKind::CallSiteSpiShouldBeAnInterface {
                spi: spi.to_string(),
            });
        }
        match ty.declared_method_count() {
            0 => None,
            methods => Some(ErrorKind::CallSiteSpiShouldBeEmpty {
                spi: spi.to_string(),
                methods,
            }),
        }
    }
}

fn pointcut_text(annotation: &Annotation) -> String {
    annotation
        .element("value")
        .and_then(ElementValue::as_str)
        .unwrap_or_default()
        .to_string()
}

fn class_names(value: Option<&ElementValue>) -> Vec<String> {
    value
        .map(ElementValue::as_slice)
        .unwrap_or(&[])
        .iter()
        .filter_map(|value| match value {
            ElementValue::Class(TypeName::Reference(name)) => Some(name.clone()),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_ANNOTATION_BASE;
    use csweave_classpath::fixture::{ClassFileBuilder, MethodBuilder};
    use csweave_classpath::{
        parse_class, parse_method_descriptor, AccessFlags, ClassIndex, MethodEntry, TypeEntry,
    };
    use std::sync::Arc;

    fn marker(name: &str) -> String {
        format!("{DEFAULT_ANNOTATION_BASE}${name}")
    }

    fn resolver() -> TypeResolver {
        let mut index = ClassIndex::new();
        index.add_type(TypeEntry::new("com.acme.Spi").as_interface());
        index.add_type(TypeEntry::new("com.acme.NotSpi"));
        index.add_type(
            TypeEntry::new("com.acme.BusySpi")
                .as_interface()
                .with_method(MethodEntry::new(
                    "run",
                    parse_method_descriptor("()V").expect("descriptor"),
                    AccessFlags::PUBLIC | AccessFlags::ABSTRACT,
                )),
        );
        TypeResolver::new(Arc::new(index))
    }

    fn extract(bytes: Vec<u8>) -> Extraction {
        let class = parse_class(&bytes).expect("fixture parses");
        let markers = Markers::new(DEFAULT_ANNOTATION_BASE);
        let resolver = resolver();
        SpecificationExtractor::new(&markers, &resolver).extract(&class)
    }

    #[test]
    fn reads_repeated_markers_and_sequential_arguments() {
        let before = |pointcut: &str| {
            Annotation::new(marker("Before")).with("value", ElementValue::String(pointcut.into()))
        };
        let bytes = ClassFileBuilder::new("com.acme.StringAdvice")
            .annotation(Annotation::new(DEFAULT_ANNOTATION_BASE).with(
                "spi",
                ElementValue::Array(vec![ElementValue::Class(TypeName::reference(
                    "com.acme.Spi",
                ))]),
            ))
            .method(
                MethodBuilder::new("beforeConcat", "(Ljava/lang/String;Ljava/lang/String;)V")
                    .access(AccessFlags::PUBLIC | AccessFlags::STATIC)
                    .annotation(Annotation::new(marker("BeforeArray")).with(
                        "value",
                        ElementValue::Array(vec![
                            ElementValue::Annotation(before(
                                "java.lang.String java.lang.String.concat(java.lang.String)",
                            )),
                            ElementValue::Annotation(before(
                                "java.lang.String java.lang.String.replace(java.lang.String)",
                            )),
                        ]),
                    ))
                    .parameter_annotation(0, Annotation::new(marker("This")))
                    .parameter_annotation(1, Annotation::new(marker("Argument"))),
            )
            .build();

        let extraction = extract(bytes);
        assert!(extraction.errors.is_empty(), "{:?}", extraction.errors);
        assert_eq!(extraction.spi, vec!["com.acme.Spi".to_string()]);
        assert_eq!(extraction.specifications.len(), 2);
        let first = &extraction.specifications[0];
        assert_eq!(first.kind, InjectionKind::Before);
        assert!(first.pointcut.contains("concat"));
        assert_eq!(
            first.parameters,
            vec![
                vec![ParameterRole::This],
                vec![ParameterRole::Argument { index: 0 }]
            ]
        );
        assert!(first.advice.is_static && first.advice.is_public);
        assert_eq!(
            first.location.to_string(),
            "com.acme.StringAdvice#beforeConcat(Ljava/lang/String;Ljava/lang/String;)V"
        );
    }

    #[test]
    fn implicit_argument_index_follows_previous_explicit_one() {
        let bytes = ClassFileBuilder::new("com.acme.Advice")
            .annotation(Annotation::new(DEFAULT_ANNOTATION_BASE))
            .method(
                MethodBuilder::new("after", "(IILjava/lang/String;)Ljava/lang/String;")
                    .access(AccessFlags::PUBLIC | AccessFlags::STATIC)
                    .annotation(Annotation::new(marker("After")).with(
                        "value",
                        ElementValue::String("java.lang.String a.B.c(int, int, int)".into()),
                    ))
                    .parameter_annotation(
                        0,
                        Annotation::new(marker("Argument")).with("value", ElementValue::Int(1)),
                    )
                    .parameter_annotation(1, Annotation::new(marker("Argument")))
                    .parameter_annotation(2, Annotation::new(marker("Return"))),
            )
            .build();
        let extraction = extract(bytes);
        assert_eq!(
            extraction.specifications[0].parameters,
            vec![
                vec![ParameterRole::Argument { index: 1 }],
                vec![ParameterRole::Argument { index: 2 }],
                vec![ParameterRole::Return],
            ]
        );
    }

    #[test]
    fn reports_class_level_problems() {
        let bytes = ClassFileBuilder::new("com.acme.Empty")
            .invisible_annotations()
            .annotation(Annotation::new(DEFAULT_ANNOTATION_BASE).with(
                "spi",
                ElementValue::Array(vec![
                    ElementValue::Class(TypeName::reference("com.acme.NotSpi")),
                    ElementValue::Class(TypeName::reference("com.acme.Missing")),
                ]),
            ))
            .method(MethodBuilder::new("helper", "()V"))
            .build();
        let extraction = extract(bytes);
        let codes: Vec<_> = extraction.errors.iter().map(ValidationError::code).collect();
        assert_eq!(
            codes,
            vec![
                "CALL_SITE_SHOULD_HAVE_ADVICE_METHODS",
                "CALL_SITE_SPI_SHOULD_BE_AN_INTERFACE",
                "UNRESOLVED_TYPE",
            ]
        );
    }

    #[test]
    fn spi_interfaces_must_not_declare_methods() {
        let bytes = ClassFileBuilder::new("com.acme.BusyAdvice")
            .annotation(Annotation::new(DEFAULT_ANNOTATION_BASE).with(
                "spi",
                ElementValue::Array(vec![
                    ElementValue::Class(TypeName::reference("com.acme.Spi")),
                    ElementValue::Class(TypeName::reference("com.acme.BusySpi")),
                ]),
            ))
            .method(
                MethodBuilder::new("beforeTrim", "(Ljava/lang/String;)V")
                    .access(AccessFlags::PUBLIC | AccessFlags::STATIC)
                    .annotation(Annotation::new(marker("Before")).with(
                        "value",
                        ElementValue::String("java.lang.String java.lang.String.trim()".into()),
                    ))
                    .parameter_annotation(0, Annotation::new(marker("This"))),
            )
            .build();
        let extraction = extract(bytes);
        assert_eq!(extraction.specifications.len(), 1);
        assert_eq!(
            extraction
                .errors
                .iter()
                .map(|error| error.kind.clone())
                .collect::<Vec<_>>(),
            vec![ErrorKind::CallSiteSpiShouldBeEmpty {
                spi: "com.acme.BusySpi".into(),
                methods: 1,
            }]
        );
    }

    #[test]
    fn ignores_classes_without_call_site_annotation() {
        let bytes = ClassFileBuilder::new("com.acme.Plain")
            .method(MethodBuilder::new("run", "()V"))
            .build();
        let extraction = extract(bytes);
        assert!(extraction.specifications.is_empty());
        assert!(extraction.errors.is_empty());
    }
}
