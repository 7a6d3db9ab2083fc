//! Validation error taxonomy.
//!
//! Every problem found while compiling advice classes is reported as a
//! [`ValidationError`]. Errors are values: they are collected per advice
//! class and never abort the rest of the run.

use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt::{self, Write as _};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Pointcut text could not be read.
    Parse,
    /// A type or method is missing from the class index.
    Resolution,
    /// The advice does not fit the call site.
    Shape,
    /// No weaving plan can be produced.
    Generation,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Error, Serialize)]
#[serde(tag = "code", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    #[error("cannot parse pointcut `{signature}`: found {offending}, expected {expected}")]
    PointcutSignatureParse {
        signature: String,
        offending: String,
        expected: String,
    },
    #[error("pointcut `{signature}` does not follow the pattern `{pattern}`")]
    PointcutSignatureInvalid { signature: String, pattern: String },
    #[error("type `{type_name}` is not allowed in pointcut `{signature}`")]
    PointcutSignatureInvalidType { signature: String, type_name: String },

    #[error("type `{name}` cannot be resolved")]
    UnresolvedType { name: String },
    #[error("method `{owner}.{name}{descriptor}` cannot be resolved")]
    UnresolvedMethod {
        owner: String,
        name: String,
        descriptor: String,
    },

    #[error("call site class declares no advice methods")]
    CallSiteShouldHaveAdviceMethods,
    #[error("SPI `{spi}` should be an interface")]
    CallSiteSpiShouldBeAnInterface { spi: String },
    #[error("SPI `{spi}` should be empty but declares {methods} method(s)")]
    CallSiteSpiShouldBeEmpty { spi: String, methods: usize },

    #[error("advice method should be static and public")]
    AdviceMethodNotStaticAndPublic,
    #[error("advice returns `{found}` but `{expected}` is expected")]
    AdviceMethodReturnNotCompatible { expected: String, found: String },
    #[error("advice parameter {position} has type `{found}` which cannot accept `{expected}`")]
    AdviceMethodParameterNotCompatible {
        position: usize,
        expected: String,
        found: String,
    },
    #[error("advice parameter {position} should have exactly one binding annotation, found {markers}")]
    AdviceParameterNotAnnotated { position: usize, markers: usize },
    #[error("advice parameter {position} is bound to `this` but only the first parameter can be")]
    AdviceParameterThisShouldBeFirst { position: usize },
    #[error("advice parameter {position} binds `this` a second time")]
    AdviceParameterThisDuplicated { position: usize },
    #[error("advice parameter {position} binds `this` but the pointcut is static")]
    AdviceParameterThisOnStaticMethod { position: usize },
    #[error("advice parameter {position} is bound to the return value but only the last parameter can be")]
    AdviceParameterReturnShouldBeLast { position: usize },
    #[error("advice parameter {position} binds the return value a second time")]
    AdviceParameterReturnDuplicated { position: usize },
    #[error("advice parameter {position} binds argument {index} but the pointcut takes {arguments}")]
    AdviceParameterArgumentOutOfBounds {
        position: usize,
        index: u16,
        arguments: usize,
    },
    #[error("advice parameter {position} binds argument {index} a second time")]
    AdviceParameterArgumentDuplicated { position: usize, index: u16 },
    #[error("advice parameter {position} binds argument {index} after argument {previous}")]
    AdviceParameterArgumentShouldBeInOrder {
        position: usize,
        index: u16,
        previous: u16,
    },
    #[error("advice parameter {position} binds all arguments a second time")]
    AdviceParameterAllArgumentsDuplicated { position: usize },

    #[error("before advice should return void, found `{found}`")]
    AdviceBeforeShouldReturnVoid { found: String },
    #[error("before advice cannot bind the return value")]
    AdviceBeforeShouldNotContainReturn,
    #[error("before advice on a constructor cannot bind `this`")]
    AdviceBeforeCtorShouldNotContainThis,
    #[error("around advice should not return void")]
    AdviceAroundShouldNotReturnVoid,
    #[error("around advice cannot bind the return value")]
    AdviceAroundShouldNotContainReturn,
    #[error("around advice is not supported on constructors")]
    AdviceAroundPointcutCtor,
    #[error("after advice should not return void")]
    AdviceAfterShouldNotReturnVoid,
    #[error("after advice on a constructor should bind `this` as its first parameter")]
    AdviceAfterCtorFirstArgShouldBeThis,
    #[error("after advice should bind the return value as its last parameter")]
    AdviceAfterLastArgShouldBeReturn,
    #[error("constructor pointcut should return void, found `{found}`")]
    AdvicePointcutConstructorNotVoid { found: String },

    #[error("operands of `{pointcut}` cannot be arranged for advice `{advice}` with stack operations")]
    AdviceIllegalStackManipulation { pointcut: String, advice: String },

    #[error("unexpected failure: {message}")]
    UncaughtError { message: String },
}

impl ErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::PointcutSignatureParse { .. } => "POINTCUT_SIGNATURE_PARSE",
            ErrorKind::PointcutSignatureInvalid { .. } => "POINTCUT_SIGNATURE_INVALID",
            ErrorKind::PointcutSignatureInvalidType { .. } => "POINTCUT_SIGNATURE_INVALID_TYPE",
            ErrorKind::UnresolvedType { .. } => "UNRESOLVED_TYPE",
            ErrorKind::UnresolvedMethod { .. } => "UNRESOLVED_METHOD",
            ErrorKind::CallSiteShouldHaveAdviceMethods => "CALL_SITE_SHOULD_HAVE_ADVICE_METHODS",
            ErrorKind::CallSiteSpiShouldBeAnInterface { .. } => {
                "CALL_SITE_SPI_SHOULD_BE_AN_INTERFACE"
            }
            ErrorKind::CallSiteSpiShouldBeEmpty { .. } => "CALL_SITE_SPI_SHOULD_BE_EMPTY",
            ErrorKind::AdviceMethodNotStaticAndPublic => "ADVICE_METHOD_NOT_STATIC_AND_PUBLIC",
            ErrorKind::AdviceMethodReturnNotCompatible { .. } => {
                "ADVICE_METHOD_RETURN_NOT_COMPATIBLE"
            }
            ErrorKind::AdviceMethodParameterNotCompatible { .. } => {
                "ADVICE_METHOD_PARAMETER_NOT_COMPATIBLE"
            }
            ErrorKind::AdviceParameterNotAnnotated { .. } => "ADVICE_PARAMETER_NOT_ANNOTATED",
            ErrorKind::AdviceParameterThisShouldBeFirst { .. } => {
                "ADVICE_PARAMETER_THIS_SHOULD_BE_FIRST"
            }
            ErrorKind::AdviceParameterThisDuplicated { .. } => "ADVICE_PARAMETER_THIS_DUPLICATED",
            ErrorKind::AdviceParameterThisOnStaticMethod { .. } => {
                "ADVICE_PARAMETER_THIS_ON_STATIC_METHOD"
            }
            ErrorKind::AdviceParameterReturnShouldBeLast { .. } => {
                "ADVICE_PARAMETER_RETURN_SHOULD_BE_LAST"
            }
            ErrorKind::AdviceParameterReturnDuplicated { .. } => {
                "ADVICE_PARAMETER_RETURN_DUPLICATED"
            }
            ErrorKind::AdviceParameterArgumentOutOfBounds { .. } => {
                "ADVICE_PARAMETER_ARGUMENT_OUT_OF_BOUNDS"
            }
            ErrorKind::AdviceParameterArgumentDuplicated { .. } => {
                "ADVICE_PARAMETER_ARGUMENT_DUPLICATED"
            }
            ErrorKind::AdviceParameterArgumentShouldBeInOrder { .. } => {
                "ADVICE_PARAMETER_ARGUMENT_SHOULD_BE_IN_ORDER"
            }
            ErrorKind::AdviceParameterAllArgumentsDuplicated { .. } => {
                "ADVICE_PARAMETER_ALL_ARGUMENTS_DUPLICATED"
            }
            ErrorKind::AdviceBeforeShouldReturnVoid { .. } => "ADVICE_BEFORE_SHOULD_RETURN_VOID",
            ErrorKind::AdviceBeforeShouldNotContainReturn => {
                "ADVICE_BEFORE_SHOULD_NOT_CONTAIN_RETURN"
            }
            ErrorKind::AdviceBeforeCtorShouldNotContainThis => {
                "ADVICE_BEFORE_CTOR_SHOULD_NOT_CONTAIN_THIS"
            }
            ErrorKind::AdviceAroundShouldNotReturnVoid => "ADVICE_AROUND_SHOULD_NOT_RETURN_VOID",
            ErrorKind::AdviceAroundShouldNotContainReturn => {
                "ADVICE_AROUND_SHOULD_NOT_CONTAIN_RETURN"
            }
            ErrorKind::AdviceAroundPointcutCtor => "ADVICE_AROUND_POINTCUT_CTOR",
            ErrorKind::AdviceAfterShouldNotReturnVoid => "ADVICE_AFTER_SHOULD_NOT_RETURN_VOID",
            ErrorKind::AdviceAfterCtorFirstArgShouldBeThis => {
                "ADVICE_AFTER_CTOR_FIRST_ARG_SHOULD_BE_THIS"
            }
            ErrorKind::AdviceAfterLastArgShouldBeReturn => "ADVICE_AFTER_LAST_ARG_SHOULD_BE_RETURN",
            ErrorKind::AdvicePointcutConstructorNotVoid { .. } => {
                "ADVICE_POINTCUT_CONSTRUCTOR_NOT_VOID"
            }
            ErrorKind::AdviceIllegalStackManipulation { .. } => "ADVICE_ILLEGAL_STACK_MANIPULATION",
            ErrorKind::UncaughtError { .. } => "UNCAUGHT_ERROR",
        }
    }

    pub fn category(&self) -> Category {
        match self {
            ErrorKind::PointcutSignatureParse { .. }
            | ErrorKind::PointcutSignatureInvalid { .. }
            | ErrorKind::PointcutSignatureInvalidType { .. } => Category::Parse,
            ErrorKind::UnresolvedType { .. } | ErrorKind::UnresolvedMethod { .. } => {
                Category::Resolution
            }
            ErrorKind::AdviceIllegalStackManipulation { .. } => Category::Generation,
            ErrorKind::UncaughtError { .. } => Category::Internal,
            _ => Category::Shape,
        }
    }

    pub fn descriptor(&self) -> Option<&'static DiagnosticDescriptor> {
        lookup_descriptor(self.code())
    }
}

/// Static title and remediation text for a diagnostic code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiagnosticDescriptor {
    pub code: &'static str,
    pub title: &'static str,
    pub help: &'static str,
}

pub const DIAGNOSTICS: &[DiagnosticDescriptor] = &[
    DiagnosticDescriptor {
        code: "POINTCUT_SIGNATURE_PARSE",
        title: "Pointcut signature cannot be parsed",
        help: "Write the pointcut as `ReturnType pkg.Owner.method(ParamType, ...)` using fully-qualified names.",
    },
    DiagnosticDescriptor {
        code: "POINTCUT_SIGNATURE_INVALID",
        title: "Pointcut signature is not canonical",
        help: "Separate the return type and owner with a single space and parameters with `, ` without extra whitespace.",
    },
    DiagnosticDescriptor {
        code: "POINTCUT_SIGNATURE_INVALID_TYPE",
        title: "Pointcut mentions a disallowed type",
        help: "`void` is only valid as a return type; reference types must belong to an allowed package.",
    },
    DiagnosticDescriptor {
        code: "UNRESOLVED_TYPE",
        title: "Type not found on the classpath",
        help: "Add the jar or directory declaring the type to the classpath or check the spelling of the name.",
    },
    DiagnosticDescriptor {
        code: "UNRESOLVED_METHOD",
        title: "Method not found on its owner",
        help: "Check the method name and parameter types; inherited methods are found, constructors must be declared by the owner.",
    },
    DiagnosticDescriptor {
        code: "CALL_SITE_SHOULD_HAVE_ADVICE_METHODS",
        title: "Call site class has no advice methods",
        help: "Annotate at least one static method with a Before, Around or After marker or drop the class annotation.",
    },
    DiagnosticDescriptor {
        code: "CALL_SITE_SPI_SHOULD_BE_AN_INTERFACE",
        title: "SPI type is not an interface",
        help: "List only marker interfaces in the `spi` attribute.",
    },
    DiagnosticDescriptor {
        code: "CALL_SITE_SPI_SHOULD_BE_EMPTY",
        title: "SPI interface declares methods",
        help: "SPI interfaces are markers used to group call sites; remove their methods.",
    },
    DiagnosticDescriptor {
        code: "ADVICE_METHOD_NOT_STATIC_AND_PUBLIC",
        title: "Advice method is not public static",
        help: "Advice is invoked with `invokestatic` from instrumented code; declare it `public static`.",
    },
    DiagnosticDescriptor {
        code: "ADVICE_METHOD_RETURN_NOT_COMPATIBLE",
        title: "Advice return type does not fit the call site",
        help: "Return a type assignable to the value the call site produces.",
    },
    DiagnosticDescriptor {
        code: "ADVICE_METHOD_PARAMETER_NOT_COMPATIBLE",
        title: "Advice parameter type does not fit its binding",
        help: "Declare the parameter with a supertype of the bound value, for example `java.lang.Object`.",
    },
    DiagnosticDescriptor {
        code: "ADVICE_PARAMETER_NOT_ANNOTATED",
        title: "Advice parameter has no single binding",
        help: "Annotate every parameter with exactly one of This, Argument, Return or AllArguments.",
    },
    DiagnosticDescriptor {
        code: "ADVICE_PARAMETER_THIS_SHOULD_BE_FIRST",
        title: "`this` binding is not the first parameter",
        help: "Move the This parameter to the first position.",
    },
    DiagnosticDescriptor {
        code: "ADVICE_PARAMETER_THIS_DUPLICATED",
        title: "`this` bound more than once",
        help: "Keep a single This parameter.",
    },
    DiagnosticDescriptor {
        code: "ADVICE_PARAMETER_THIS_ON_STATIC_METHOD",
        title: "`this` bound for a static pointcut",
        help: "Static calls have no receiver; remove the This binding.",
    },
    DiagnosticDescriptor {
        code: "ADVICE_PARAMETER_RETURN_SHOULD_BE_LAST",
        title: "Return binding is not the last parameter",
        help: "Move the Return parameter to the last position.",
    },
    DiagnosticDescriptor {
        code: "ADVICE_PARAMETER_RETURN_DUPLICATED",
        title: "Return value bound more than once",
        help: "Keep a single Return parameter.",
    },
    DiagnosticDescriptor {
        code: "ADVICE_PARAMETER_ARGUMENT_OUT_OF_BOUNDS",
        title: "Argument index out of bounds",
        help: "Argument indices are zero based and must be lower than the pointcut's parameter count.",
    },
    DiagnosticDescriptor {
        code: "ADVICE_PARAMETER_ARGUMENT_DUPLICATED",
        title: "Argument bound more than once",
        help: "Bind every pointcut argument at most once.",
    },
    DiagnosticDescriptor {
        code: "ADVICE_PARAMETER_ARGUMENT_SHOULD_BE_IN_ORDER",
        title: "Arguments bound out of order",
        help: "Declare Argument parameters in increasing index order.",
    },
    DiagnosticDescriptor {
        code: "ADVICE_PARAMETER_ALL_ARGUMENTS_DUPLICATED",
        title: "All arguments bound more than once",
        help: "Keep a single AllArguments parameter.",
    },
    DiagnosticDescriptor {
        code: "ADVICE_BEFORE_SHOULD_RETURN_VOID",
        title: "Before advice returns a value",
        help: "Before advice runs ahead of the call and its result would be discarded; return `void`.",
    },
    DiagnosticDescriptor {
        code: "ADVICE_BEFORE_SHOULD_NOT_CONTAIN_RETURN",
        title: "Before advice binds the return value",
        help: "The return value does not exist yet; use After advice instead.",
    },
    DiagnosticDescriptor {
        code: "ADVICE_BEFORE_CTOR_SHOULD_NOT_CONTAIN_THIS",
        title: "Before advice binds an uninitialized instance",
        help: "The instance is not constructed before the constructor call; use After advice to observe it.",
    },
    DiagnosticDescriptor {
        code: "ADVICE_AROUND_SHOULD_NOT_RETURN_VOID",
        title: "Around advice returns void for a value-producing call",
        help: "Around advice replaces the call and must return the value the call would have produced.",
    },
    DiagnosticDescriptor {
        code: "ADVICE_AROUND_SHOULD_NOT_CONTAIN_RETURN",
        title: "Around advice binds the return value",
        help: "Around advice produces the return value itself; remove the Return parameter.",
    },
    DiagnosticDescriptor {
        code: "ADVICE_AROUND_POINTCUT_CTOR",
        title: "Around advice on a constructor",
        help: "Constructors cannot be replaced; use Before or After advice.",
    },
    DiagnosticDescriptor {
        code: "ADVICE_AFTER_SHOULD_NOT_RETURN_VOID",
        title: "After advice returns void for a value-producing call",
        help: "After advice replaces the call's result; return it (possibly unchanged).",
    },
    DiagnosticDescriptor {
        code: "ADVICE_AFTER_CTOR_FIRST_ARG_SHOULD_BE_THIS",
        title: "Constructor After advice does not bind `this` first",
        help: "Bind the constructed instance with This as the first parameter.",
    },
    DiagnosticDescriptor {
        code: "ADVICE_AFTER_LAST_ARG_SHOULD_BE_RETURN",
        title: "After advice does not bind the return value last",
        help: "Add a Return parameter in the last position.",
    },
    DiagnosticDescriptor {
        code: "ADVICE_POINTCUT_CONSTRUCTOR_NOT_VOID",
        title: "Constructor pointcut declares a return type",
        help: "Constructor pointcuts are written `void Owner.<init>(...)`.",
    },
    DiagnosticDescriptor {
        code: "ADVICE_ILLEGAL_STACK_MANIPULATION",
        title: "Operands cannot be copied with stack operations",
        help: "Bind fewer or different operands, use AllArguments alone, or set `strict_stack = false` to spill into locals.",
    },
    DiagnosticDescriptor {
        code: "UNCAUGHT_ERROR",
        title: "Unexpected compiler failure",
        help: "This is a compiler bug; rerun with `--log-level debug` and report the output.",
    },
];

static DESCRIPTORS_BY_CODE: Lazy<HashMap<&'static str, &'static DiagnosticDescriptor>> =
    Lazy::new(|| {
        DIAGNOSTICS
            .iter()
            .map(|descriptor| (descriptor.code, descriptor))
            .collect()
    });

/// Finds the descriptor for a code, case-insensitively.
pub fn lookup_descriptor(code: &str) -> Option<&'static DiagnosticDescriptor> {
    let needle = code.trim().to_ascii_uppercase();
    DESCRIPTORS_BY_CODE.get(needle.as_str()).copied()
}

/// Where an error was found: the advice class and, when known, the advice
/// method.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SourceLocation {
    pub class: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub descriptor: Option<String>,
}

impl SourceLocation {
    pub fn class(class: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            method: None,
            descriptor: None,
        }
    }

    pub fn method(
        class: impl Into<String>,
        method: impl Into<String>,
        descriptor: impl Into<String>,
    ) -> Self {
        Self {
            class: class.into(),
            method: Some(method.into()),
            descriptor: Some(descriptor.into()),
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.class)?;
        if let Some(method) = &self.method {
            write!(f, "#{method}")?;
        }
        if let Some(descriptor) = &self.descriptor {
            f.write_str(descriptor)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ValidationError {
    #[serde(flatten)]
    pub kind: ErrorKind,
    pub location: SourceLocation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pointcut: Option<String>,
}

impl ValidationError {
    pub fn new(kind: ErrorKind, location: SourceLocation) -> Self {
        Self {
            kind,
            location,
            pointcut: None,
        }
    }

    pub fn with_pointcut(mut self, pointcut: impl Into<String>) -> Self {
        self.pointcut = Some(pointcut.into());
        self
    }

    pub fn code(&self) -> &'static str {
        self.kind.code()
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}: {}", self.location, self.code(), self.kind)
    }
}

impl std::error::Error for ValidationError {}

/// Orders errors by location and pointcut, keeping check order otherwise.
pub fn sort_errors(errors: &mut [ValidationError]) {
    errors.sort_by(|left, right| {
        (&left.location, &left.pointcut).cmp(&(&right.location, &right.pointcut))
    });
}

/// Renders errors for terminal output.
pub fn render_text(errors: &[ValidationError]) -> String {
    let mut out = String::new();
    for error in errors {
        let _ = writeln!(out, "error[{}]: {}", error.code(), error.kind);
        let _ = writeln!(out, "  --> {}", error.location);
        if let Some(pointcut) = &error.pointcut {
            let _ = writeln!(out, "  = pointcut: {pointcut}");
        }
        if let Some(descriptor) = error.kind.descriptor() {
            let _ = writeln!(out, "  = help: {}", descriptor.help);
        }
    }
    out
}

/// Renders the `explain` text for a code.
pub fn render_explanation(code: &str) -> Option<String> {
    let descriptor = lookup_descriptor(code)?;
    let mut out = String::new();
    let _ = writeln!(out, "{}: {}", descriptor.code, descriptor.title);
    let _ = writeln!(out);
    let _ = writeln!(out, "{}", descriptor.help);
    Some(out)
}
