use crate::config::CompilerConfig;
use crate::diagnostics::{ErrorKind, SourceLocation, ValidationError};
use crate::extract::{AdviceMethod, CallSiteSpecification};
use crate::resolver::TypeResolver;
use crate::signature::{parse_canonical, parse_signature, CANONICAL_PATTERN};
use crate::stack::{plan_stack, OperandLayout, StackStrategy};
use crate::types::{InjectionKind, MethodSignature, ParameterRole, ResolvedMethod, Type, OBJECT};
use csweave_classpath::{TypeEntry, TypeName};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// A specification that passed every check. Only [`Validator`] creates
/// these, so plan generation never sees unchecked input.
#[derive(Debug, Clone)]
pub struct ValidatedSpecification {
    location: SourceLocation,
    kind: InjectionKind,
    pointcut_text: String,
    pointcut: Arc<ResolvedMethod>,
    advice: ResolvedMethod,
    roles: Vec<ParameterRole>,
    stack: Option<StackStrategy>,
}

impl ValidatedSpecification {
    pub fn location(&self) -> &SourceLocation {
        &self.location
    }

    pub fn kind(&self) -> InjectionKind {
        self.kind
    }

    pub fn pointcut_text(&self) -> &str {
        &self.pointcut_text
    }

    pub fn pointcut(&self) -> &ResolvedMethod {
        &self.pointcut
    }

    pub fn advice(&self) -> &ResolvedMethod {
        &self.advice
    }

    /// One role per advice parameter.
    pub fn roles(&self) -> &[ParameterRole] {
        &self.roles
    }

    /// Operand strategy for Before and After advice; `None` for Around.
    pub fn stack(&self) -> Option<&StackStrategy> {
        self.stack.as_ref()
    }
}

/// Per-kind differences in the checks.
struct KindRules {
    /// Error for binding the return value, when the kind forbids it.
    forbidden_return: Option<ErrorKind>,
    /// Error for a void advice where the call site expects a value.
    void_result: Option<ErrorKind>,
    supports_constructor: bool,
    copies_operands: bool,
}

impl KindRules {
    fn of(kind: InjectionKind) -> Self {
        match kind {
            InjectionKind::Before => KindRules {
                forbidden_return: Some(ErrorKind::AdviceBeforeShouldNotContainReturn),
                void_result: None,
                supports_constructor: true,
                copies_operands: true,
            },
            InjectionKind::Around => KindRules {
                forbidden_return: Some(ErrorKind::AdviceAroundShouldNotContainReturn),
                void_result: Some(ErrorKind::AdviceAroundShouldNotReturnVoid),
                supports_constructor: false,
                copies_operands: false,
            },
            InjectionKind::After => KindRules {
                forbidden_return: None,
                void_result: Some(ErrorKind::AdviceAfterShouldNotReturnVoid),
                supports_constructor: true,
                copies_operands: true,
            },
        }
    }
}

/// Accumulates the errors of one specification, dropping exact repeats.
struct Report<'s> {
    spec: &'s CallSiteSpecification,
    errors: Vec<ValidationError>,
}

impl<'s> Report<'s> {
    fn push(&mut self, kind: ErrorKind) {
        let error = self.spec.error(kind);
        if !self.errors.contains(&error) {
            self.errors.push(error);
        }
    }

    fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

#[derive(Default)]
struct RoleState {
    seen_this: bool,
    seen_return: bool,
    seen_all_arguments: bool,
    last_argument: Option<u16>,
    arguments: HashSet<u16>,
}

pub struct Validator<'a> {
    resolver: &'a TypeResolver,
    config: &'a CompilerConfig,
}

impl<'a> Validator<'a> {
    pub fn new(resolver: &'a TypeResolver, config: &'a CompilerConfig) -> Self {
        Self { resolver, config }
    }

    /// Runs every check on `spec` and returns all the errors found, or the
    /// validated specification when there are none.
    pub fn validate(
        &self,
        spec: &CallSiteSpecification,
    ) -> Result<ValidatedSpecification, Vec<ValidationError>> {
        let mut report = Report {
            spec,
            errors: Vec::new(),
        };
        let rules = KindRules::of(spec.kind);

        if !(spec.advice.is_static && spec.advice.is_public) {
            report.push(ErrorKind::AdviceMethodNotStaticAndPublic);
        }

        let signature = match parse_signature(&spec.pointcut) {
            Ok(signature) => Some(signature),
            Err(failure) => {
                report.push(ErrorKind::PointcutSignatureParse {
                    signature: failure.signature,
                    offending: failure.offending,
                    expected: failure.expected,
                });
                None
            }
        };

        let mut pointcut = None;
        if let Some(signature) = &signature {
            if parse_canonical(&spec.pointcut).is_err() {
                report.push(ErrorKind::PointcutSignatureInvalid {
                    signature: spec.pointcut.clone(),
                    pattern: CANONICAL_PATTERN.to_string(),
                });
            }
            let catalog_clean = self.check_catalog(spec, signature, &mut report);
            if signature.is_constructor {
                if !signature.return_type.is_void() {
                    report.push(ErrorKind::AdvicePointcutConstructorNotVoid {
                        found: signature.return_type.to_string(),
                    });
                }
                if !rules.supports_constructor {
                    report.push(ErrorKind::AdviceAroundPointcutCtor);
                }
            }
            if catalog_clean {
                pointcut = self.resolve_pointcut(signature, &mut report);
            }
        }

        let advice = self.resolve_advice(&spec.advice, &mut report);

        let roles: Vec<Option<ParameterRole>> = spec
            .parameters
            .iter()
            .enumerate()
            .map(|(position, markers)| match markers.as_slice() {
                [role] => Some(*role),
                _ => {
                    report.push(ErrorKind::AdviceParameterNotAnnotated {
                        position,
                        markers: markers.len(),
                    });
                    None
                }
            })
            .collect();

        self.check_return(
            spec,
            &rules,
            pointcut.as_deref(),
            advice.as_ref(),
            &mut report,
        );
        self.check_roles(
            spec,
            &rules,
            signature.as_ref(),
            &roles,
            pointcut.as_deref(),
            advice.as_ref(),
            &mut report,
        );

        let (Some(pointcut), Some(advice)) = (pointcut, advice) else {
            if report.is_clean() {
                report.push(ErrorKind::UncaughtError {
                    message: "pointcut or advice unresolved without a diagnostic".into(),
                });
            }
            return Err(report.errors);
        };
        if !report.is_clean() {
            return Err(report.errors);
        }

        let roles: Vec<ParameterRole> = roles.into_iter().flatten().collect();
        let stack = if rules.copies_operands {
            let layout = OperandLayout::of(&pointcut);
            let strategy = plan_stack(&roles, &layout, spec.kind, self.config.max_stack_ops);
            if strategy == StackStrategy::Infeasible {
                if self.config.strict_stack {
                    report.push(ErrorKind::AdviceIllegalStackManipulation {
                        pointcut: spec.pointcut.clone(),
                        advice: format!("{}{}", spec.advice.name, spec.advice.descriptor),
                    });
                    return Err(report.errors);
                }
                warn!(
                    location = %spec.location,
                    pointcut = %spec.pointcut,
                    "operands cannot be copied on the stack; spilling into locals"
                );
            }
            Some(strategy)
        } else {
            None
        };

        debug!(location = %spec.location, kind = %spec.kind, "specification accepted");
        Ok(ValidatedSpecification {
            location: spec.location.clone(),
            kind: spec.kind,
            pointcut_text: spec.pointcut.clone(),
            pointcut,
            advice,
            roles,
            stack,
        })
    }

    /// Reports types a pointcut may not mention. Returns whether the
    /// signature is clean enough to resolve.
    fn check_catalog(
        &self,
        spec: &CallSiteSpecification,
        signature: &MethodSignature,
        report: &mut Report<'_>,
    ) -> bool {
        let mut invalid: Vec<String> = Vec::new();
        let mut flag = |ty: &TypeName| {
            let name = ty.to_string();
            if !invalid.contains(&name) {
                invalid.push(name);
            }
        };

        if !matches!(signature.owner, TypeName::Reference(_)) {
            flag(&signature.owner);
        }
        for parameter in signature.parameters.iter().filter(|ty| ty.is_void()) {
            flag(parameter);
        }
        for ty in signature.mentioned_types() {
            let element = match ty {
                TypeName::Array { element, .. } => element.as_ref(),
                other => other,
            };
            if let TypeName::Reference(name) = element {
                if !self.config.allows_package(name) {
                    flag(ty);
                }
            }
        }

        let clean = invalid.is_empty();
        for type_name in invalid {
            report.push(ErrorKind::PointcutSignatureInvalidType {
                signature: spec.pointcut.clone(),
                type_name,
            });
        }
        clean
    }

    fn resolve(&self, name: &TypeName, report: &mut Report<'_>) -> Option<Type> {
        match self.resolver.resolve_type(name) {
            Ok(ty) => Some(ty),
            Err(error) => {
                report.push(error.into());
                None
            }
        }
    }

    fn resolve_pointcut(
        &self,
        signature: &MethodSignature,
        report: &mut Report<'_>,
    ) -> Option<Arc<ResolvedMethod>> {
        let owner = self.resolve(&signature.owner, report);
        let parameters: Vec<Option<Type>> = signature
            .parameters
            .iter()
            .map(|parameter| self.resolve(parameter, report))
            .collect();
        let owner = owner?;
        let parameters: Vec<Type> = parameters.into_iter().collect::<Option<_>>()?;

        // A non-void constructor is reported on its own; look up the `void` one.
        let void = TypeName::Void;
        let return_type = if signature.is_constructor {
            &void
        } else {
            &signature.return_type
        };
        match self.resolver.resolve_method_returning(
            &owner,
            &signature.name,
            &parameters,
            return_type,
        ) {
            Ok(method) => Some(method),
            Err(error) => {
                report.push(error.into());
                None
            }
        }
    }

    /// The advice class is the one being compiled and need not be indexed,
    /// so only its parameter and return types are resolved.
    fn resolve_advice(
        &self,
        advice: &AdviceMethod,
        report: &mut Report<'_>,
    ) -> Option<ResolvedMethod> {
        let owner = Type::reference(&TypeEntry::new(advice.owner.as_str()));
        let parameters: Vec<Option<Type>> = advice
            .parameters
            .iter()
            .map(|parameter| self.resolve(parameter, report))
            .collect();
        let return_type = self.resolve(&advice.return_type, report);

        Some(ResolvedMethod {
            declaring_type: owner.clone(),
            owner,
            name: advice.name.clone(),
            parameters: parameters.into_iter().collect::<Option<_>>()?,
            return_type: return_type?,
            is_static: advice.is_static,
            is_public: advice.is_public,
        })
    }

    fn check_return(
        &self,
        spec: &CallSiteSpecification,
        rules: &KindRules,
        pointcut: Option<&ResolvedMethod>,
        advice: Option<&ResolvedMethod>,
        report: &mut Report<'_>,
    ) {
        if spec.kind == InjectionKind::Before {
            if !spec.advice.return_type.is_void() {
                report.push(ErrorKind::AdviceBeforeShouldReturnVoid {
                    found: spec.advice.return_type.to_string(),
                });
            }
            return;
        }

        let (Some(pointcut), Some(advice)) = (pointcut, advice) else {
            return;
        };
        if pointcut.is_constructor() && !rules.supports_constructor {
            return;
        }
        let expected = if pointcut.is_constructor() {
            &pointcut.owner
        } else {
            &pointcut.return_type
        };
        let found = &advice.return_type;

        if expected.is_void() {
            if !found.is_void() {
                report.push(ErrorKind::AdviceMethodReturnNotCompatible {
                    expected: expected.to_string(),
                    found: found.to_string(),
                });
            }
        } else if found.is_void() {
            if let Some(kind) = rules.void_result.clone() {
                report.push(kind);
            }
        } else if !self.resolver.is_assignable(found, expected) {
            report.push(ErrorKind::AdviceMethodReturnNotCompatible {
                expected: expected.to_string(),
                found: found.to_string(),
            });
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn check_roles(
        &self,
        spec: &CallSiteSpecification,
        rules: &KindRules,
        signature: Option<&MethodSignature>,
        roles: &[Option<ParameterRole>],
        pointcut: Option<&ResolvedMethod>,
        advice: Option<&ResolvedMethod>,
        report: &mut Report<'_>,
    ) {
        let constructor = signature.is_some_and(|signature| signature.is_constructor);
        let before_constructor = constructor && spec.kind == InjectionKind::Before;
        let last = roles.len().saturating_sub(1);
        let mut state = RoleState::default();

        for (position, role) in roles.iter().enumerate() {
            let Some(role) = role else {
                continue;
            };
            match *role {
                ParameterRole::This => {
                    if state.seen_this {
                        report.push(ErrorKind::AdviceParameterThisDuplicated { position });
                    } else if position != 0 {
                        report.push(ErrorKind::AdviceParameterThisShouldBeFirst { position });
                    }
                    state.seen_this = true;

                    if before_constructor {
                        report.push(ErrorKind::AdviceBeforeCtorShouldNotContainThis);
                    } else if let Some(pointcut) = pointcut {
                        if pointcut.is_static {
                            report.push(ErrorKind::AdviceParameterThisOnStaticMethod { position });
                        } else {
                            self.check_parameter(position, &pointcut.owner, advice, report);
                        }
                    }
                }
                ParameterRole::Argument { index } => {
                    match signature.map(|signature| signature.parameters.len()) {
                        Some(arguments) if usize::from(index) >= arguments => {
                            report.push(ErrorKind::AdviceParameterArgumentOutOfBounds {
                                position,
                                index,
                                arguments,
                            })
                        }
                        _ => {
                            let argument = pointcut
                                .and_then(|pointcut| pointcut.parameters.get(usize::from(index)));
                            if let Some(argument) = argument {
                                self.check_parameter(position, argument, advice, report);
                            }
                        }
                    }
                    if !state.arguments.insert(index) {
                        report.push(ErrorKind::AdviceParameterArgumentDuplicated { position, index });
                    } else if let Some(previous) = state.last_argument.filter(|last| index < *last) {
                        report.push(ErrorKind::AdviceParameterArgumentShouldBeInOrder {
                            position,
                            index,
                            previous,
                        });
                    }
                    state.last_argument = Some(index);
                }
                ParameterRole::Return => {
                    if state.seen_return {
                        report.push(ErrorKind::AdviceParameterReturnDuplicated { position });
                    } else if position != last {
                        report.push(ErrorKind::AdviceParameterReturnShouldBeLast { position });
                    }
                    state.seen_return = true;

                    if let Some(kind) = rules.forbidden_return.clone() {
                        report.push(kind);
                    } else if let Some(pointcut) = pointcut {
                        if pointcut.produces_value() && !pointcut.is_constructor() {
                            self.check_parameter(position, &pointcut.return_type, advice, report);
                        } else if let Some(found) =
                            advice.and_then(|advice| advice.parameters.get(position))
                        {
                            report.push(ErrorKind::AdviceMethodParameterNotCompatible {
                                position,
                                expected: "void".into(),
                                found: found.to_string(),
                            });
                        }
                    }
                }
                ParameterRole::AllArguments { include_this } => {
                    if state.seen_all_arguments {
                        report.push(ErrorKind::AdviceParameterAllArgumentsDuplicated { position });
                    }
                    state.seen_all_arguments = true;

                    if include_this {
                        if before_constructor {
                            report.push(ErrorKind::AdviceBeforeCtorShouldNotContainThis);
                        } else if pointcut.is_some_and(|pointcut| pointcut.is_static) {
                            report.push(ErrorKind::AdviceParameterThisOnStaticMethod { position });
                        }
                    }
                    let objects = TypeName::array_of(TypeName::reference(OBJECT), 1);
                    if let Ok(objects) = self.resolver.resolve_type(&objects) {
                        self.check_parameter(position, &objects, advice, report);
                    }
                }
            }
        }

        if spec.kind != InjectionKind::After {
            return;
        }
        let Some(signature) = signature else {
            return;
        };
        if constructor {
            if !matches!(roles.first(), Some(Some(ParameterRole::This))) {
                report.push(ErrorKind::AdviceAfterCtorFirstArgShouldBeThis);
            }
        } else if !signature.return_type.is_void()
            && !matches!(roles.last(), Some(Some(ParameterRole::Return)))
        {
            report.push(ErrorKind::AdviceAfterLastArgShouldBeReturn);
        }
    }

    /// Checks that advice parameter `position` accepts a value of `value`.
    fn check_parameter(
        &self,
        position: usize,
        value: &Type,
        advice: Option<&ResolvedMethod>,
        report: &mut Report<'_>,
    ) {
        let Some(parameter) = advice.and_then(|advice| advice.parameters.get(position)) else {
            return;
        };
        if !self.resolver.is_assignable(value, parameter) {
            report.push(ErrorKind::AdviceMethodParameterNotCompatible {
                position,
                expected: value.to_string(),
                found: parameter.to_string(),
            });
        }
    }
}
