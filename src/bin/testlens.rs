//! testlens CLI binary entry point.

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use serde_json::{json, Value};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use testlens::config::EngineConfig;
use testlens::error::LensError;
use testlens::output::{emit_json, error_value};
use testlens::{Engine, TOOLS};

/// Static analysis of Python code and its test suites.
#[derive(Parser)]
#[command(name = "testlens")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Project root directory (default: current directory)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Configuration file (default: testlens.toml in the project root)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log line format on stderr
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Log filter, overriding the configured level
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Functions, classes and imports of a Python file.
    #[command(name = "parse-module")]
    ParseModule { file_path: String },

    /// Details of one function, or `Class.method`.
    #[command(name = "function-details")]
    FunctionDetails {
        file_path: String,
        function_name: String,
    },

    /// Details of one class.
    #[command(name = "class-details")]
    ClassDetails { file_path: String, class_name: String },

    /// Imports of a file grouped by origin.
    #[command(name = "find-imports")]
    FindImports { file_path: String },

    /// Annotations of a file.
    #[command(name = "type-hints")]
    TypeHints { file_path: String },

    /// Tests, fixtures, markers and hooks of a test suite.
    #[command(name = "analyze-tests")]
    AnalyzeTests { directory: Option<String> },

    /// Recurring patterns across a test suite.
    #[command(name = "test-patterns")]
    TestPatterns { directory: Option<String> },

    /// Public code that no test imports.
    #[command(name = "find-untested")]
    FindUntested {
        /// Source directory (default: project root)
        #[arg(long)]
        source_dir: Option<String>,

        /// Test directory (default: tests, else project root)
        #[arg(long)]
        test_dir: Option<String>,
    },

    /// Suggest test cases for a file, function or class.
    #[command(name = "suggest-tests")]
    SuggestTests {
        file_path: String,

        /// Restrict to one function, or `Class.method`
        #[arg(long)]
        function: Option<String>,

        /// Restrict to one class
        #[arg(long)]
        class: Option<String>,

        /// pytest or unittest (default: detected from the project)
        #[arg(long)]
        framework: Option<String>,
    },

    /// Read a coverage report.
    Coverage { coverage_file: Option<String> },

    /// Python files under a directory.
    #[command(name = "find-python-files")]
    FindPythonFiles { directory: Option<String> },

    /// Test modules under a directory.
    #[command(name = "find-test-files")]
    FindTestFiles { directory: Option<String> },

    /// Read a project file.
    #[command(name = "read-file")]
    ReadFile {
        file_path: String,

        /// Byte ceiling (default: configured maximum file size)
        #[arg(long)]
        max_size: Option<u64>,
    },

    /// Directory tree of the project.
    Tree {
        directory: Option<String>,

        #[arg(long)]
        max_depth: Option<usize>,
    },

    /// Run any tool by name with JSON arguments.
    Call {
        tool: String,

        /// Arguments as a JSON object
        #[arg(long, default_value = "{}")]
        args: String,
    },

    /// List available tools.
    Tools,
}

impl Commands {
    /// Tool name and JSON arguments, or `None` for commands that call no tool.
    fn into_call(self) -> Result<Option<(String, Value)>, LensError> {
        let call = match self {
            Commands::ParseModule { file_path } => {
                ("parse_module", json!({ "file_path": file_path }))
            }
            Commands::FunctionDetails {
                file_path,
                function_name,
            } => (
                "get_function_details",
                json!({ "file_path": file_path, "function_name": function_name }),
            ),
            Commands::ClassDetails {
                file_path,
                class_name,
            } => (
                "get_class_details",
                json!({ "file_path": file_path, "class_name": class_name }),
            ),
            Commands::FindImports { file_path } => {
                ("find_imports", json!({ "file_path": file_path }))
            }
            Commands::TypeHints { file_path } => {
                ("get_type_hints", json!({ "file_path": file_path }))
            }
            Commands::AnalyzeTests { directory } => {
                ("analyze_test_files", json!({ "directory": directory }))
            }
            Commands::TestPatterns { directory } => {
                ("get_test_patterns", json!({ "directory": directory }))
            }
            Commands::FindUntested {
                source_dir,
                test_dir,
            } => (
                "find_untested_code",
                json!({ "source_dir": source_dir, "test_dir": test_dir }),
            ),
            Commands::SuggestTests {
                file_path,
                function,
                class,
                framework,
            } => (
                "suggest_test_cases",
                json!({
                    "file_path": file_path,
                    "function_name": function,
                    "class_name": class,
                    "framework": framework,
                }),
            ),
            Commands::Coverage { coverage_file } => (
                "get_test_coverage_info",
                json!({ "coverage_file": coverage_file }),
            ),
            Commands::FindPythonFiles { directory } => {
                ("find_python_files", json!({ "directory": directory }))
            }
            Commands::FindTestFiles { directory } => {
                ("find_test_files", json!({ "directory": directory }))
            }
            Commands::ReadFile {
                file_path,
                max_size,
            } => (
                "read_file",
                json!({ "file_path": file_path, "max_size": max_size }),
            ),
            Commands::Tree {
                directory,
                max_depth,
            } => (
                "get_directory_structure",
                json!({ "directory": directory, "max_depth": max_depth }),
            ),
            Commands::Call { tool, args } => {
                let args: Value = serde_json::from_str(&args).map_err(|err| {
                    LensError::invalid_args(format!("--args is not valid JSON: {}", err))
                })?;
                return Ok(Some((tool, args)));
            }
            Commands::Tools => return Ok(None),
        };
        Ok(Some((call.0.to_string(), call.1)))
    }
}

/// Initialize tracing to stderr.
///
/// `RUST_LOG` wins over `level`.
fn init_tracing(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(io::stderr),
            )
            .init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(io::stderr))
            .init(),
    }
}

/// Print `value` to stdout and map it to a process exit code.
fn finish(value: &Value, code: u8) -> ExitCode {
    let mut stdout = io::stdout().lock();
    if let Err(err) = emit_json(&mut stdout, value) {
        eprintln!("testlens: failed to write output: {}", err);
        return ExitCode::from(10);
    }
    ExitCode::from(code)
}

fn fail(err: &LensError) -> ExitCode {
    finish(&error_value(err), err.error_code().code())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Determine project root
    let root = match cli.root {
        Some(root) => root,
        None => match std::env::current_dir() {
            Ok(dir) => dir,
            Err(err) => {
                return fail(&LensError::internal(format!(
                    "cannot determine current directory: {}",
                    err
                )))
            }
        },
    };

    let config = match EngineConfig::load(&root, cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => return fail(&LensError::from(err)),
    };

    let level = cli.log_level.unwrap_or_else(|| config.log_filter());
    init_tracing(&level, cli.log_format);

    let (tool, args) = match cli.command.into_call() {
        Ok(Some(call)) => call,
        Ok(None) => {
            return match serde_json::to_value(TOOLS) {
                Ok(value) => finish(&value, 0),
                Err(err) => fail(&LensError::internal(err.to_string())),
            }
        }
        Err(err) => return fail(&err),
    };

    let engine = Engine::new(config);
    info!(tool = %tool, root = %engine.root().display(), "running");
    match engine.dispatch(&tool, &args) {
        Ok(value) => finish(&value, 0),
        Err(err) => fail(&err),
    }
}
