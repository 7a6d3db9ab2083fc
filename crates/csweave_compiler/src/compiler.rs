use crate::config::CompilerConfig;
use crate::diagnostics::{sort_errors, ErrorKind, SourceLocation, ValidationError};
use crate::extract::{Markers, SpecificationExtractor};
use crate::plan::{generate, WeavingPlan};
use crate::resolver::TypeResolver;
use crate::validate::Validator;
use csweave_classpath::ParsedClass;
use rayon::prelude::*;
use serde::Serialize;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, info, info_span};

/// The plans of one advice class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallSiteGroup {
    pub class: String,
    pub spi: Vec<String>,
    pub helpers: Vec<String>,
    pub plans: Vec<WeavingPlan>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CompileStats {
    pub classes: usize,
    pub advice_classes: usize,
    pub specifications: usize,
    pub plans: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct CompilationReport {
    pub groups: Vec<CallSiteGroup>,
    pub errors: Vec<ValidationError>,
    pub stats: CompileStats,
}

impl CompilationReport {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Outcome of a single advice class.
struct ClassOutcome {
    group: Option<CallSiteGroup>,
    errors: Vec<ValidationError>,
    specifications: usize,
}

pub struct CallSiteCompiler {
    resolver: Arc<TypeResolver>,
    config: CompilerConfig,
    markers: Markers,
}

impl CallSiteCompiler {
    pub fn new(resolver: Arc<TypeResolver>, config: CompilerConfig) -> Self {
        let markers = Markers::new(&config.annotation_base);
        Self {
            resolver,
            config,
            markers,
        }
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    pub fn resolver(&self) -> &TypeResolver {
        &self.resolver
    }

    /// Compiles every advice class among `classes`. Classes are independent:
    /// an error in one drops all of that class's plans and nothing else.
    pub fn compile(&self, classes: &[ParsedClass]) -> CompilationReport {
        let advice: Vec<&ParsedClass> = classes
            .iter()
            .filter(|class| self.markers.is_call_site(class))
            .collect();
        let _span = info_span!("compile", advice_classes = advice.len()).entered();

        let outcomes: Vec<ClassOutcome> = if self.config.parallel {
            advice
                .par_iter()
                .map(|class| self.compile_guarded(class))
                .collect()
        } else {
            advice
                .iter()
                .map(|class| self.compile_guarded(class))
                .collect()
        };

        let mut report = CompilationReport {
            stats: CompileStats {
                classes: classes.len(),
                advice_classes: advice.len(),
                ..CompileStats::default()
            },
            ..CompilationReport::default()
        };
        for outcome in outcomes {
            report.stats.specifications += outcome.specifications;
            report.errors.extend(outcome.errors);
            if let Some(group) = outcome.group {
                report.stats.plans += group.plans.len();
                report.groups.push(group);
            }
        }
        report.groups.sort_by(|left, right| left.class.cmp(&right.class));
        sort_errors(&mut report.errors);

        let cache = self.resolver.stats();
        info!(
            advice_classes = report.stats.advice_classes,
            plans = report.stats.plans,
            errors = report.errors.len(),
            cached_types = cache.types,
            cached_methods = cache.methods,
            cache_hits = cache.hits,
            "call-site compilation finished"
        );
        report
    }

    /// Runs one class, turning a panic into an `UNCAUGHT_ERROR` for that
    /// class.
    fn compile_guarded(&self, class: &ParsedClass) -> ClassOutcome {
        catch_unwind(AssertUnwindSafe(|| self.compile_class(class))).unwrap_or_else(|payload| {
            let message = payload
                .downcast_ref::<&str>()
                .map(|message| message.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            ClassOutcome {
                group: None,
                errors: vec![ValidationError::new(
                    ErrorKind::UncaughtError { message },
                    SourceLocation::class(class.fqcn.as_str()),
                )],
                specifications: 0,
            }
        })
    }

    fn compile_class(&self, class: &ParsedClass) -> ClassOutcome {
        let extraction = SpecificationExtractor::new(&self.markers, &self.resolver).extract(class);
        let mut errors = extraction.errors;
        let validator = Validator::new(&self.resolver, &self.config);

        let mut validated = Vec::with_capacity(extraction.specifications.len());
        for spec in &extraction.specifications {
            match validator.validate(spec) {
                Ok(spec) => validated.push(spec),
                Err(found) => errors.extend(found),
            }
        }

        let mut plans = Vec::with_capacity(validated.len());
        if errors.is_empty() {
            for spec in &validated {
                match generate(spec) {
                    Ok(plan) => plans.push(plan),
                    Err(error) => errors.push(ValidationError::new(
                        ErrorKind::UncaughtError {
                            message: error.to_string(),
                        },
                        spec.location().clone(),
                    )),
                }
            }
        }

        let specifications = extraction.specifications.len();
        if !errors.is_empty() {
            debug!(class = %class.fqcn, errors = errors.len(), "advice class rejected");
            return ClassOutcome {
                group: None,
                errors,
                specifications,
            };
        }
        ClassOutcome {
            group: Some(CallSiteGroup {
                class: extraction.class,
                spi: extraction.spi,
                helpers: extraction.helpers,
                plans,
            }),
            errors,
            specifications,
        }
    }
}
