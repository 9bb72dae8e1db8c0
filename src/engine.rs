//! The analysis engine: named operations over one project root.
//!
//! Every operation is available as a typed method and through
//! [`Engine::call`], which takes the tool name and JSON arguments and always
//! returns a JSON value (the result, or an error object).

use std::path::Path;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use testlens_core::config::{AnalysisPolicy, EngineConfig};
use testlens_core::error::{LensError, LensResult};
use testlens_core::files::{self, DirectoryNode, FileContent, FileEntry};
use testlens_core::output::error_value;
use testlens_python::imports::{collect_imports, ImportReport};
use testlens_python::{
    coverage_info, extract_module, find_untested, parse_file, resolve_framework, suggest_tests,
    test_patterns, type_hints, ClassInfo, ClassifierPolicy, CoverageReport, FunctionInfo,
    ModuleSymbols, ParsedModule, SuggestionReport, TestPatterns, TestSuiteAnalysis, TypeHints,
    UntestedReport,
};

// ============================================================================
// Tool Catalog
// ============================================================================

/// A named operation reachable through [`Engine::call`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
}

pub const TOOLS: &[ToolSpec] = &[
    ToolSpec {
        name: "parse_module",
        description: "Parse a Python file and return its functions, classes and imports",
    },
    ToolSpec {
        name: "get_function_details",
        description: "Details of one function or Class.method",
    },
    ToolSpec {
        name: "get_class_details",
        description: "Details of one class",
    },
    ToolSpec {
        name: "find_imports",
        description: "Imports of a file grouped into standard library, third party and local",
    },
    ToolSpec {
        name: "get_type_hints",
        description: "Parameter, return and variable annotations of a file",
    },
    ToolSpec {
        name: "analyze_test_files",
        description: "Test functions, classes, fixtures, markers and hooks of a test suite",
    },
    ToolSpec {
        name: "get_test_patterns",
        description: "Framework usage and recurring patterns across a test suite",
    },
    ToolSpec {
        name: "find_untested_code",
        description: "Public functions and classes that no test file imports",
    },
    ToolSpec {
        name: "suggest_test_cases",
        description: "Test case suggestions from signatures and docstrings",
    },
    ToolSpec {
        name: "get_test_coverage_info",
        description: "Read a Cobertura, coverage.py or LCOV coverage report",
    },
    ToolSpec {
        name: "find_python_files",
        description: "Python files under a directory",
    },
    ToolSpec {
        name: "find_test_files",
        description: "Test modules under a directory",
    },
    ToolSpec {
        name: "read_file",
        description: "Read a project file up to a size ceiling",
    },
    ToolSpec {
        name: "get_directory_structure",
        description: "Depth-bounded directory tree",
    },
];

/// Names of every tool, in catalog order.
pub fn tool_names() -> impl Iterator<Item = &'static str> {
    TOOLS.iter().map(|t| t.name)
}

// ============================================================================
// Tool Parameters
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileParams {
    file_path: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct FunctionParams {
    file_path: String,
    function_name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct ClassParams {
    file_path: String,
    class_name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct DirectoryParams {
    #[serde(default)]
    directory: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct UntestedParams {
    #[serde(default)]
    source_dir: Option<String>,
    #[serde(default)]
    test_dir: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct SuggestParams {
    file_path: String,
    #[serde(default)]
    function_name: Option<String>,
    #[serde(default)]
    class_name: Option<String>,
    #[serde(default)]
    framework: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct CoverageParams {
    #[serde(default)]
    coverage_file: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct ReadFileParams {
    file_path: String,
    #[serde(default)]
    max_size: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct StructureParams {
    #[serde(default)]
    directory: Option<String>,
    #[serde(default)]
    max_depth: Option<usize>,
}

/// Decode tool arguments; `null` means no arguments.
fn params<T: DeserializeOwned>(tool: &str, args: &Value) -> LensResult<T> {
    let args = if args.is_null() {
        Value::Object(Default::default())
    } else {
        args.clone()
    };
    serde_json::from_value(args).map_err(|err| {
        LensError::invalid_args_with_details(
            format!("bad arguments for {}: {}", tool, err),
            serde_json::json!({ "tool": tool }),
        )
    })
}

/// Files found by a discovery tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileListing {
    pub directory: String,
    pub count: usize,
    pub files: Vec<FileEntry>,
}

impl FileListing {
    fn new(directory: Option<&str>, files: Vec<FileEntry>) -> Self {
        FileListing {
            directory: directory.unwrap_or(".").to_string(),
            count: files.len(),
            files,
        }
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Analysis engine bound to one project root.
///
/// Holds only immutable configuration, so it can be shared across threads.
#[derive(Debug, Clone)]
pub struct Engine {
    config: Arc<EngineConfig>,
    policy: Arc<AnalysisPolicy>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        let policy = config.policy();
        Engine {
            config: Arc::new(config),
            policy: Arc::new(policy),
        }
    }

    /// Engine with default configuration.
    pub fn for_root(root: impl AsRef<Path>) -> Self {
        Engine::new(EngineConfig::for_root(root.as_ref()))
    }

    pub fn root(&self) -> &Path {
        &self.config.project_root
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn policy(&self) -> &AnalysisPolicy {
        &self.policy
    }

    pub fn classifier_policy(&self) -> ClassifierPolicy {
        ClassifierPolicy::from(self.policy.as_ref())
    }

    fn parse(&self, file_path: &str) -> LensResult<ParsedModule> {
        parse_file(self.root(), file_path, &self.policy)
    }

    // ------------------------------------------------------------------------
    // Symbols
    // ------------------------------------------------------------------------

    pub fn parse_module(&self, file_path: &str) -> LensResult<ModuleSymbols> {
        Ok(extract_module(&self.parse(file_path)?))
    }

    /// Accepts a plain name or `Class.method`.
    pub fn get_function_details(
        &self,
        file_path: &str,
        function_name: &str,
    ) -> LensResult<FunctionInfo> {
        let symbols = self.parse_module(file_path)?;
        symbols
            .find_function(function_name)
            .cloned()
            .ok_or_else(|| LensError::symbol_not_found("function", function_name, file_path))
    }

    pub fn get_class_details(&self, file_path: &str, class_name: &str) -> LensResult<ClassInfo> {
        let symbols = self.parse_module(file_path)?;
        symbols
            .find_class(class_name)
            .cloned()
            .ok_or_else(|| LensError::symbol_not_found("class", class_name, file_path))
    }

    pub fn find_imports(&self, file_path: &str) -> LensResult<ImportReport> {
        let module = self.parse(file_path)?;
        Ok(ImportReport::build(
            file_path,
            collect_imports(&module),
            self.root(),
        ))
    }

    pub fn get_type_hints(&self, file_path: &str) -> LensResult<TypeHints> {
        let module = self.parse(file_path)?;
        let symbols = extract_module(&module);
        Ok(type_hints(&module, &symbols))
    }

    // ------------------------------------------------------------------------
    // Test Semantics
    // ------------------------------------------------------------------------

    pub fn analyze_test_files(&self, directory: Option<&str>) -> LensResult<TestSuiteAnalysis> {
        testlens_python::analyze_directory(self.root(), directory, &self.policy)
    }

    pub fn get_test_patterns(&self, directory: Option<&str>) -> LensResult<TestPatterns> {
        test_patterns(self.root(), directory, &self.policy)
    }

    pub fn find_untested_code(
        &self,
        source_dir: Option<&str>,
        test_dir: Option<&str>,
    ) -> LensResult<UntestedReport> {
        find_untested(self.root(), source_dir, test_dir, &self.policy)
    }

    pub fn suggest_test_cases(
        &self,
        file_path: &str,
        function_name: Option<&str>,
        class_name: Option<&str>,
        framework: Option<&str>,
    ) -> LensResult<SuggestionReport> {
        let symbols = self.parse_module(file_path)?;
        let (framework, source) = resolve_framework(framework, self.root(), &self.policy)?;
        suggest_tests(&symbols, function_name, class_name, framework, source)
    }

    pub fn get_test_coverage_info(
        &self,
        coverage_file: Option<&str>,
    ) -> LensResult<CoverageReport> {
        coverage_info(self.root(), coverage_file, &self.policy)
    }

    // ------------------------------------------------------------------------
    // Files
    // ------------------------------------------------------------------------

    pub fn find_python_files(&self, directory: Option<&str>) -> LensResult<FileListing> {
        let found = files::find_python_files(self.root(), directory, &self.policy)?;
        Ok(FileListing::new(directory, found))
    }

    pub fn find_test_files(&self, directory: Option<&str>) -> LensResult<FileListing> {
        let found = files::find_test_files(self.root(), directory, &self.policy)?;
        Ok(FileListing::new(directory, found))
    }

    pub fn read_file(&self, file_path: &str, max_size: Option<u64>) -> LensResult<FileContent> {
        if max_size == Some(0) {
            return Err(LensError::invalid_args("max_size must be positive"));
        }
        Ok(files::read_file(self.root(), file_path, max_size, &self.policy)?)
    }

    pub fn get_directory_structure(
        &self,
        directory: Option<&str>,
        max_depth: Option<usize>,
    ) -> LensResult<DirectoryNode> {
        Ok(files::directory_structure(
            self.root(),
            directory,
            max_depth,
            &self.policy,
        )?)
    }

    // ------------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------------

    /// Run a tool by name, keeping the typed error.
    pub fn dispatch(&self, tool: &str, args: &Value) -> LensResult<Value> {
        debug!(tool, "dispatching");
        match tool {
            "parse_module" => {
                let p: FileParams = params(tool, args)?;
                to_value(self.parse_module(&p.file_path)?)
            }
            "get_function_details" => {
                let p: FunctionParams = params(tool, args)?;
                to_value(self.get_function_details(&p.file_path, &p.function_name)?)
            }
            "get_class_details" => {
                let p: ClassParams = params(tool, args)?;
                to_value(self.get_class_details(&p.file_path, &p.class_name)?)
            }
            "find_imports" => {
                let p: FileParams = params(tool, args)?;
                to_value(self.find_imports(&p.file_path)?)
            }
            "get_type_hints" => {
                let p: FileParams = params(tool, args)?;
                to_value(self.get_type_hints(&p.file_path)?)
            }
            "analyze_test_files" => {
                let p: DirectoryParams = params(tool, args)?;
                to_value(self.analyze_test_files(p.directory.as_deref())?)
            }
            "get_test_patterns" => {
                let p: DirectoryParams = params(tool, args)?;
                to_value(self.get_test_patterns(p.directory.as_deref())?)
            }
            "find_untested_code" => {
                let p: UntestedParams = params(tool, args)?;
                let report =
                    self.find_untested_code(p.source_dir.as_deref(), p.test_dir.as_deref())?;
                to_value(report)
            }
            "suggest_test_cases" => {
                let p: SuggestParams = params(tool, args)?;
                to_value(self.suggest_test_cases(
                    &p.file_path,
                    p.function_name.as_deref(),
                    p.class_name.as_deref(),
                    p.framework.as_deref(),
                )?)
            }
            "get_test_coverage_info" => {
                let p: CoverageParams = params(tool, args)?;
                to_value(self.get_test_coverage_info(p.coverage_file.as_deref())?)
            }
            "find_python_files" => {
                let p: DirectoryParams = params(tool, args)?;
                to_value(self.find_python_files(p.directory.as_deref())?)
            }
            "find_test_files" => {
                let p: DirectoryParams = params(tool, args)?;
                to_value(self.find_test_files(p.directory.as_deref())?)
            }
            "read_file" => {
                let p: ReadFileParams = params(tool, args)?;
                to_value(self.read_file(&p.file_path, p.max_size)?)
            }
            "get_directory_structure" => {
                let p: StructureParams = params(tool, args)?;
                to_value(self.get_directory_structure(p.directory.as_deref(), p.max_depth)?)
            }
            other => Err(LensError::invalid_args_with_details(
                format!("unknown tool: {}", other),
                serde_json::json!({ "tool": other, "available": tool_names().collect::<Vec<_>>() }),
            )),
        }
    }

    /// Run a tool by name and render the outcome as JSON.
    pub fn call(&self, tool: &str, args: &Value) -> Value {
        match self.dispatch(tool, args) {
            Ok(value) => value,
            Err(err) => error_value(&err),
        }
    }
}

fn to_value<T: Serialize>(value: T) -> LensResult<Value> {
    serde_json::to_value(value)
        .map_err(|err| LensError::internal(format!("failed to serialize result: {}", err)))
}
