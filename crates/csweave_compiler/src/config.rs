use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_ANNOTATION_BASE: &str = "datadog.trace.agent.tooling.csi.CallSite";
pub const DEFAULT_MAX_STACK_OPS: usize = 8;

/// Upper bound accepted for `max_stack_ops`; the search is exponential in it.
const MAX_STACK_OPS_LIMIT: usize = 16;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Compiler behaviour knobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Fully-qualified name of the class-level advice annotation. Method and
    /// parameter markers are its nested annotations (`<base>$Before`, ...).
    pub annotation_base: String,
    /// Reject advice whose operands cannot be copied with stack operations
    /// alone. When disabled the plan spills operands into locals instead.
    pub strict_stack: bool,
    pub max_stack_ops: usize,
    /// Package prefixes pointcut reference types must belong to. Empty means
    /// every package is allowed.
    pub allowed_packages: Vec<String>,
    pub parallel: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            annotation_base: DEFAULT_ANNOTATION_BASE.to_string(),
            strict_stack: true,
            max_stack_ops: DEFAULT_MAX_STACK_OPS,
            allowed_packages: Vec::new(),
            parallel: true,
        }
    }
}

impl CompilerConfig {
    pub fn with_layers(mut self, layers: &[CompilerConfigLayer]) -> Self {
        for layer in layers {
            self.apply_layer(layer);
        }
        self
    }

    fn apply_layer(&mut self, layer: &CompilerConfigLayer) {
        if let Some(annotation_base) = &layer.annotation_base {
            self.annotation_base = annotation_base.clone();
        }
        if let Some(strict_stack) = layer.strict_stack {
            self.strict_stack = strict_stack;
        }
        if let Some(max_stack_ops) = layer.max_stack_ops {
            self.max_stack_ops = max_stack_ops;
        }
        if let Some(allowed_packages) = &layer.allowed_packages {
            self.allowed_packages = allowed_packages.clone();
        }
        if let Some(parallel) = layer.parallel {
            self.parallel = parallel;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.annotation_base.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "compiler.annotation_base must not be empty".into(),
            ));
        }
        if self.max_stack_ops == 0 || self.max_stack_ops > MAX_STACK_OPS_LIMIT {
            return Err(ConfigError::Invalid(format!(
                "compiler.max_stack_ops must be between 1 and {MAX_STACK_OPS_LIMIT}, got {}",
                self.max_stack_ops
            )));
        }
        Ok(())
    }

    /// Whether a reference type may appear in a pointcut.
    pub fn allows_package(&self, fqcn: &str) -> bool {
        self.allowed_packages.is_empty()
            || self.allowed_packages.iter().any(|prefix| {
                let prefix = prefix.trim_end_matches('.');
                fqcn == prefix
                    || fqcn
                        .strip_prefix(prefix)
                        .is_some_and(|rest| rest.starts_with('.'))
            })
    }
}

/// Overrides applied on top of the file configuration (command-line flags).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CompilerConfigLayer {
    pub annotation_base: Option<String>,
    pub strict_stack: Option<bool>,
    pub max_stack_ops: Option<usize>,
    pub allowed_packages: Option<Vec<String>>,
    pub parallel: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClasspathSettings {
    pub entries: Vec<String>,
    pub java_home: Option<PathBuf>,
}

/// Contents of a `csweave.toml` file.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub compiler: CompilerConfig,
    pub classpath: ClasspathSettings,
}

impl Settings {
    pub const FILE_NAME: &'static str = "csweave.toml";

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let settings: Settings = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        settings.compiler.validate()?;
        Ok(settings)
    }

    /// Loads `csweave.toml` from `dir` when present, defaults otherwise.
    pub fn discover(dir: &Path) -> Result<Self, ConfigError> {
        let candidate = dir.join(Self::FILE_NAME);
        if candidate.is_file() {
            Self::load(&candidate)
        } else {
            Ok(Self::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn reads_partial_file_over_defaults() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join(Settings::FILE_NAME);
        fs::write(
            &path,
            r#"
[compiler]
strict_stack = false
allowed_packages = ["java.lang", "com.acme."]

[classpath]
entries = ["lib/a.jar", "lib/b.jar"]
"#,
        )
        .expect("write config");

        let settings = Settings::discover(dir.path()).expect("load");
        assert!(!settings.compiler.strict_stack);
        assert_eq!(settings.compiler.max_stack_ops, DEFAULT_MAX_STACK_OPS);
        assert_eq!(settings.compiler.annotation_base, DEFAULT_ANNOTATION_BASE);
        assert_eq!(settings.classpath.entries.len(), 2);
        assert!(settings.classpath.java_home.is_none());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempdir().expect("tempdir");
        assert_eq!(
            Settings::discover(dir.path()).expect("defaults"),
            Settings::default()
        );
    }

    #[test]
    fn rejects_out_of_range_stack_bound() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join(Settings::FILE_NAME);
        fs::write(&path, "[compiler]\nmax_stack_ops = 0\n").expect("write config");
        assert!(matches!(
            Settings::load(&path),
            Err(ConfigError::Invalid(_))
        ));

        fs::write(&path, "[compiler]\nmax_stack_ops = \"eight\"\n").expect("write config");
        assert!(matches!(Settings::load(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn layers_override_in_order() {
        let config = CompilerConfig::default().with_layers(&[
            CompilerConfigLayer {
                max_stack_ops: Some(4),
                parallel: Some(false),
                ..CompilerConfigLayer::default()
            },
            CompilerConfigLayer {
                max_stack_ops: Some(6),
                ..CompilerConfigLayer::default()
            },
        ]);
        assert_eq!(config.max_stack_ops, 6);
        assert!(!config.parallel);
        assert!(config.strict_stack);
    }

    #[test]
    fn package_prefixes_match_whole_segments() {
        let config = CompilerConfig {
            allowed_packages: vec!["java.lang".into(), "com.acme.".into()],
            ..CompilerConfig::default()
        };
        assert!(config.allows_package("java.lang.String"));
        assert!(config.allows_package("com.acme.web.Request"));
        assert!(!config.allows_package("java.langx.Foo"));
        assert!(!config.allows_package("org.example.Foo"));
        assert!(CompilerConfig::default().allows_package("org.example.Foo"));
    }
}
