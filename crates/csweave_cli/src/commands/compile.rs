use anyhow::{Context, Result};
use csweave_classpath::{
    ensure_fallback_types, scan_roots, ClassIndex, ClasspathScanner, ParsedClass, ScanContext,
};
use csweave_compiler::{
    render_text, CallSiteCompiler, CompilationReport, CompilerConfig, CompilerConfigLayer,
    Settings, TypeResolver,
};
use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::{CompileArgs, OutputFormat};

/// What a `compile` or `check` run produced.
pub struct CompileOutcome {
    pub report: CompilationReport,
    /// Text for stdout.
    pub rendered: String,
}

impl CompileOutcome {
    pub fn is_success(&self) -> bool {
        self.report.is_success()
    }
}

/// Reads the configuration named by `--config`, or `csweave.toml` in `cwd`.
pub fn load_settings(args: &CompileArgs, cwd: &Path) -> Result<Settings> {
    let settings = match &args.config {
        Some(path) => Settings::load(path)?,
        None => Settings::discover(cwd)?,
    };
    Ok(settings)
}

/// Flag overrides applied over the file configuration.
pub fn cli_layer(args: &CompileArgs) -> CompilerConfigLayer {
    CompilerConfigLayer {
        annotation_base: args.annotation_base.clone(),
        strict_stack: args.relaxed_stack.then_some(false),
        max_stack_ops: args.max_stack_ops,
        allowed_packages: (!args.allowed_packages.is_empty())
            .then(|| args.allowed_packages.clone()),
        parallel: args.sequential.then_some(false),
    }
}

pub fn build_config(settings: &Settings, args: &CompileArgs) -> Result<CompilerConfig> {
    let config = settings.compiler.clone().with_layers(&[cli_layer(args)]);
    config.validate()?;
    Ok(config)
}

/// Indexes the JDK and classpath, then reads the advice roots and adds
/// them to the index so advice classes can refer to each other.
pub fn load_classes(
    settings: &Settings,
    args: &CompileArgs,
) -> Result<(ClassIndex, Vec<ParsedClass>)> {
    let mut entries = settings.classpath.entries.clone();
    entries.extend(args.classpath.iter().cloned());

    let mut context = ScanContext::detect(&entries);
    if let Some(java_home) = args
        .java_home
        .as_ref()
        .or(settings.classpath.java_home.as_ref())
    {
        context = context.with_java_home(java_home);
    }
    if context.java_home.is_none() {
        warn!("no JDK found; pointcuts on JDK methods will not resolve");
    }

    let mut index = ClasspathScanner::new(&context)
        .build_index()
        .context("failed to index the classpath")?;
    let scanned = scan_roots(&args.roots).context("failed to read advice classes")?;
    for scanned in &scanned {
        debug!(class = %scanned.class.fqcn, origin = %scanned.origin.display(), "advice root class");
        index.add_class(&scanned.class);
    }
    let added = ensure_fallback_types(&mut index);
    if added > 0 {
        debug!(added, "registered fallback java.lang types");
    }

    info!(
        types = index.len(),
        classes = scanned.len(),
        "classpath indexed"
    );
    let classes = scanned.into_iter().map(|scanned| scanned.class).collect();
    Ok((index, classes))
}

/// Runs the compiler. `write_plans` is false for `check`.
pub fn run(args: &CompileArgs, write_plans: bool) -> Result<CompileOutcome> {
    let cwd = std::env::current_dir().context("failed to read the working directory")?;
    let settings = load_settings(args, &cwd)?;
    let config = build_config(&settings, args)?;
    let (index, classes) = load_classes(&settings, args)?;

    let resolver = Arc::new(TypeResolver::new(Arc::new(index)));
    let report = CallSiteCompiler::new(resolver, config).compile(&classes);

    match (&args.output, write_plans) {
        (Some(output), true) if report.is_success() => {
            let json = serde_json::to_string_pretty(&report.groups)?;
            fs::write(output, json)
                .with_context(|| format!("failed to write {}", output.display()))?;
            info!(path = %output.display(), "weaving plans written");
        }
        (Some(output), true) => {
            warn!(
                path = %output.display(),
                errors = report.errors.len(),
                "compilation failed; plans not written"
            );
        }
        _ => {}
    }

    let rendered = match args.format {
        OutputFormat::Text => render_summary(&report),
        OutputFormat::Json if write_plans && args.output.is_none() => {
            serde_json::to_string_pretty(&report)?
        }
        OutputFormat::Json => serde_json::to_string_pretty(&serde_json::json!({
            "errors": &report.errors,
            "stats": &report.stats,
        }))?,
    };
    Ok(CompileOutcome { report, rendered })
}

fn render_summary(report: &CompilationReport) -> String {
    let mut out = String::new();
    for group in &report.groups {
        let _ = writeln!(out, "compiled {}: {} plan(s)", group.class, group.plans.len());
    }
    out.push_str(&render_text(&report.errors));
    let _ = writeln!(
        out,
        "{} advice class(es), {} plan(s), {} error(s)",
        report.stats.advice_classes,
        report.stats.plans,
        report.errors.len()
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::tempdir;

    #[test]
    fn flags_override_the_file() {
        let dir = tempdir().expect("tempdir");
        fs::write(
            dir.path().join(Settings::FILE_NAME),
            "[compiler]\nmax_stack_ops = 4\nparallel = true\n",
        )
        .expect("write config");

        let args = CompileArgs {
            roots: vec![PathBuf::from("advice")],
            relaxed_stack: true,
            sequential: true,
            ..CompileArgs::default()
        };
        let settings = load_settings(&args, dir.path()).expect("settings");
        let config = build_config(&settings, &args).expect("config");
        assert_eq!(config.max_stack_ops, 4);
        assert!(!config.strict_stack);
        assert!(!config.parallel);
    }

    #[test]
    fn rejects_out_of_range_stack_bound() {
        let args = CompileArgs {
            max_stack_ops: Some(0),
            ..CompileArgs::default()
        };
        assert!(build_config(&Settings::default(), &args).is_err());
    }

    #[test]
    fn missing_advice_root_fails() {
        let dir = tempdir().expect("tempdir");
        let args = CompileArgs {
            roots: vec![dir.path().join("missing")],
            java_home: Some(dir.path().to_path_buf()),
            ..CompileArgs::default()
        };
        assert!(load_classes(&Settings::default(), &args).is_err());
    }
}
