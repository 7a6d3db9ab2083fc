// csweave_cli - command-line interface (library half for testing)
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

pub mod commands;
pub mod logging;

#[derive(Parser, Debug)]
#[command(name = "csweave", version)]
#[command(about = "Compiles call-site advice classes into weaving plans")]
pub struct Cli {
    /// Log filter, e.g. `info` or `csweave_compiler=debug`
    #[arg(long, global = true, env = "CSWEAVE_LOG")]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate advice classes and write their weaving plans
    Compile(CompileArgs),
    /// Validate advice classes without writing plans
    Check(CompileArgs),
    /// Describe a diagnostic code
    Explain {
        /// Diagnostic code, e.g. ADVICE_PARAMETER_THIS_SHOULD_BE_FIRST
        code: String,
    },
}

#[derive(Args, Debug, Clone, Default)]
pub struct CompileArgs {
    /// Directory, jar or class file holding advice classes
    #[arg(long = "root", required = true)]
    pub roots: Vec<PathBuf>,
    /// Classpath entries indexed for pointcut resolution
    #[arg(long, value_delimiter = ',')]
    pub classpath: Vec<String>,
    /// JDK whose `jmods` are indexed; detected when omitted
    #[arg(long)]
    pub java_home: Option<PathBuf>,
    /// Configuration file; `csweave.toml` in the working directory otherwise
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Write the output here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    /// Fully-qualified name of the advice annotation
    #[arg(long)]
    pub annotation_base: Option<String>,
    /// Spill operands into locals instead of rejecting advice that stack
    /// instructions cannot serve
    #[arg(long)]
    pub relaxed_stack: bool,
    #[arg(long)]
    pub max_stack_ops: Option<usize>,
    /// Package prefixes pointcut types must belong to
    #[arg(long, value_delimiter = ',')]
    pub allowed_packages: Vec<String>,
    /// Compile advice classes on a single thread
    #[arg(long)]
    pub sequential: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_compile_flags() {
        let cli = Cli::try_parse_from([
            "csweave",
            "compile",
            "--root",
            "build/advice",
            "--root",
            "advice.jar",
            "--classpath",
            "a.jar,b.jar",
            "--format",
            "json",
            "--relaxed-stack",
            "--log-level",
            "debug",
        ])
        .expect("valid arguments");

        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        let Commands::Compile(args) = cli.command else {
            panic!("expected compile");
        };
        assert_eq!(
            args.roots,
            vec![PathBuf::from("build/advice"), PathBuf::from("advice.jar")]
        );
        assert_eq!(args.classpath, vec!["a.jar", "b.jar"]);
        assert_eq!(args.format, OutputFormat::Json);
        assert!(args.relaxed_stack);
        assert!(!args.sequential);
    }

    #[test]
    fn compile_requires_a_root() {
        assert!(Cli::try_parse_from(["csweave", "check"]).is_err());
    }

    #[test]
    fn parses_explain() {
        let cli = Cli::try_parse_from(["csweave", "explain", "unresolved_type"])
            .expect("valid arguments");
        assert!(matches!(cli.command, Commands::Explain { code } if code == "unresolved_type"));
    }
}
