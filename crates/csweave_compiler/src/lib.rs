//! Call-site advice compiler.
//!
//! Advice classes declare, through annotations, code to run before, around
//! or after calls to particular methods. This crate reads those
//! declarations from parsed class files, checks them against the indexed
//! classpath and emits a [`WeavingPlan`] for every accepted advice method.
//!
//! The pipeline per advice class is extraction ([`extract`]), validation
//! ([`validate`]) and plan generation ([`plan`]). [`CallSiteCompiler`]
//! drives it over many classes, optionally in parallel.

pub mod compiler;
pub mod config;
pub mod diagnostics;
pub mod extract;
pub mod plan;
pub mod resolver;
pub mod signature;
pub mod stack;
pub mod types;
pub mod validate;

#[cfg(test)]
mod testing;

pub use compiler::{CallSiteCompiler, CallSiteGroup, CompilationReport, CompileStats};
pub use config::{
    ClasspathSettings, CompilerConfig, CompilerConfigLayer, ConfigError, Settings,
    DEFAULT_ANNOTATION_BASE, DEFAULT_MAX_STACK_OPS,
};
pub use diagnostics::{
    lookup_descriptor, render_explanation, render_text, Category, DiagnosticDescriptor, ErrorKind,
    SourceLocation, ValidationError,
};
pub use extract::{CallSiteSpecification, Markers};
pub use plan::{MethodTarget, ParameterSource, WeavingPlan, WeavingStep};
pub use resolver::{ResolveError, TypeResolver};
pub use types::{InjectionKind, ParameterRole};
pub use validate::{ValidatedSpecification, Validator};
