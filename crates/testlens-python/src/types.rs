//! Symbol and test-semantics data model.
//!
//! Every type here is an immutable, request-scoped value. All of them
//! serialize to JSON and deserialize back to an equal value.

use std::fmt;

use serde::{Deserialize, Serialize};

// ============================================================================
// Parameters
// ============================================================================

/// How a parameter binds arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    /// Regular or positional-only parameter.
    Positional,
    /// `*args`.
    Vararg,
    /// `**kwargs`.
    Kwarg,
    /// Parameter after `*` or `*args`.
    KeywordOnly,
}

impl ParamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamKind::Positional => "positional",
            ParamKind::Vararg => "vararg",
            ParamKind::Kwarg => "kwarg",
            ParamKind::KeywordOnly => "keyword_only",
        }
    }
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterInfo {
    pub name: String,
    /// Annotation source text.
    #[serde(rename = "type")]
    pub annotation: Option<String>,
    pub kind: ParamKind,
    /// Default value source text.
    pub default: Option<String>,
}

// ============================================================================
// Functions and Classes
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Public,
    Private,
}

impl Visibility {
    /// Leading underscore means private.
    pub fn of(name: &str) -> Self {
        if name.starts_with('_') {
            Visibility::Private
        } else {
            Visibility::Public
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionInfo {
    pub name: String,
    /// Dotted path through enclosing classes and functions.
    pub qualified_name: String,
    pub is_async: bool,
    pub docstring: Option<String>,
    pub parameters: Vec<ParameterInfo>,
    pub return_type: Option<String>,
    pub decorators: Vec<String>,
    pub line_number: u32,
    pub visibility: Visibility,
}

impl FunctionInfo {
    pub fn is_public(&self) -> bool {
        self.visibility == Visibility::Public
    }

    /// Defined at module level, not inside another definition.
    pub fn is_module_level(&self) -> bool {
        self.qualified_name == self.name
    }
}

/// A class-body variable, annotated or assigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassVariable {
    pub name: String,
    #[serde(rename = "type")]
    pub annotation: Option<String>,
    pub line_number: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassInfo {
    pub name: String,
    pub qualified_name: String,
    pub docstring: Option<String>,
    pub base_classes: Vec<String>,
    pub methods: Vec<FunctionInfo>,
    /// Names of methods decorated as properties.
    pub properties: Vec<String>,
    pub class_variables: Vec<ClassVariable>,
    pub decorators: Vec<String>,
    pub line_number: u32,
}

impl ClassInfo {
    pub fn is_public(&self) -> bool {
        Visibility::of(&self.name) == Visibility::Public
    }

    pub fn is_module_level(&self) -> bool {
        self.qualified_name == self.name
    }

    pub fn method(&self, name: &str) -> Option<&FunctionInfo> {
        self.methods.iter().find(|m| m.name == name)
    }

    pub fn public_methods(&self) -> impl Iterator<Item = &FunctionInfo> {
        self.methods.iter().filter(|m| m.is_public())
    }
}

// ============================================================================
// Imports
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportKind {
    /// `import a.b`
    Import,
    /// `from a import b`
    FromImport,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportInfo {
    pub kind: ImportKind,
    /// Imported module; for relative imports without a module, `None`.
    pub module: Option<String>,
    /// Imported name for `from` imports (`*` for wildcards).
    pub name: Option<String>,
    pub alias: Option<String>,
    /// Number of leading dots of a relative import.
    pub level: Option<u32>,
    pub line_number: u32,
}

impl ImportInfo {
    /// Dotted reference this import makes available.
    ///
    /// `module.name` for from-imports, the bare module for direct imports.
    pub fn reference(&self) -> Option<String> {
        match (self.kind, &self.module, &self.name) {
            (ImportKind::Import, Some(module), _) => Some(module.clone()),
            (ImportKind::FromImport, Some(module), Some(name)) => {
                Some(format!("{}.{}", module, name))
            }
            (ImportKind::FromImport, Some(module), None) => Some(module.clone()),
            (ImportKind::FromImport, None, Some(name)) => Some(name.clone()),
            _ => None,
        }
    }

    /// Whether the module or imported name mentions `needle`.
    pub fn mentions(&self, needle: &str) -> bool {
        let hit = |s: &Option<String>| {
            s.as_deref()
                .is_some_and(|s| s.to_ascii_lowercase().contains(needle))
        };
        hit(&self.module) || hit(&self.name)
    }
}

// ============================================================================
// Module
// ============================================================================

/// Symbol model of one Python file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleSymbols {
    pub file_path: String,
    pub docstring: Option<String>,
    /// Every function that is not a direct class member, in source order.
    pub functions: Vec<FunctionInfo>,
    /// Every class, in source order.
    pub classes: Vec<ClassInfo>,
    pub imports: Vec<ImportInfo>,
}

impl ModuleSymbols {
    /// Find a function by name, then a method by name or `Class.method`.
    ///
    /// Module-level functions win over nested ones of the same name.
    pub fn find_function(&self, name: &str) -> Option<&FunctionInfo> {
        if let Some(f) = self
            .functions
            .iter()
            .find(|f| f.name == name && f.is_module_level())
        {
            return Some(f);
        }
        if let Some(f) = self
            .functions
            .iter()
            .find(|f| f.name == name || f.qualified_name == name)
        {
            return Some(f);
        }
        self.classes
            .iter()
            .flat_map(|c| c.methods.iter())
            .find(|m| m.qualified_name == name || m.name == name)
    }

    /// Find a class by name or qualified name; module-level classes first.
    pub fn find_class(&self, name: &str) -> Option<&ClassInfo> {
        self.classes
            .iter()
            .find(|c| c.name == name && c.is_module_level())
            .or_else(|| {
                self.classes
                    .iter()
                    .find(|c| c.name == name || c.qualified_name == name)
            })
    }

    /// Total number of function and method definitions.
    pub fn definition_count(&self) -> usize {
        self.functions.len() + self.classes.iter().map(|c| c.methods.len()).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty() && self.classes.is_empty()
    }
}

// ============================================================================
// Test Semantics
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Framework {
    Pytest,
    Unittest,
}

impl Framework {
    pub fn as_str(&self) -> &'static str {
        match self {
            Framework::Pytest => "pytest",
            Framework::Unittest => "unittest",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pytest" => Some(Framework::Pytest),
            "unittest" => Some(Framework::Unittest),
            _ => None,
        }
    }
}

impl fmt::Display for Framework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestFunctionInfo {
    #[serde(flatten)]
    pub function: FunctionInfo,
    pub file_path: String,
    /// Owning class, for test methods.
    pub class_name: Option<String>,
    pub framework: Framework,
    /// Identifier of the classifier rule that decided `framework`.
    pub framework_rule: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestClassInfo {
    pub name: String,
    pub file_path: String,
    pub line_number: u32,
    pub docstring: Option<String>,
    pub base_classes: Vec<String>,
    pub methods: usize,
    pub test_methods: usize,
    pub framework: Framework,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixtureInfo {
    pub name: String,
    pub file_path: String,
    pub scope: String,
    pub autouse: bool,
    pub line_number: u32,
    pub parameters: Vec<String>,
    pub docstring: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerInfo {
    /// Marker attribute, e.g. `slow` or `parametrize`.
    pub name: String,
    /// Namespace the marker hangs off, e.g. `pytest`.
    pub namespace: String,
    pub file_path: String,
    pub line_number: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetupScope {
    Class,
    Method,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetupTeardownInfo {
    pub name: String,
    pub class_name: Option<String>,
    pub file_path: String,
    pub framework: Framework,
    pub scope: SetupScope,
    pub line_number: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MockUsage {
    /// Callee text, e.g. `mock.patch` or `MagicMock`.
    pub method: String,
    pub file_path: String,
    pub line_number: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssertionStyle {
    Pytest,
    Unittest,
    Mock,
}

impl AssertionStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssertionStyle::Pytest => "pytest",
            AssertionStyle::Unittest => "unittest",
            AssertionStyle::Mock => "mock",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionUsage {
    /// `assert`, `assertEqual`, `assert_called_once_with`, `pytest.raises`, ...
    pub method: String,
    pub style: AssertionStyle,
    pub file_path: String,
    pub line_number: u32,
}

/// Test semantics of one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestFileAnalysis {
    pub file_path: String,
    pub test_functions: Vec<TestFunctionInfo>,
    pub test_classes: Vec<TestClassInfo>,
    pub fixtures: Vec<FixtureInfo>,
    pub markers: Vec<MarkerInfo>,
    pub setup_teardown_methods: Vec<SetupTeardownInfo>,
    pub mock_usage: Vec<MockUsage>,
    pub assertions: Vec<AssertionUsage>,
    pub imports: Vec<ImportInfo>,
}

/// A file that could not be analyzed in a batch operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFailure {
    pub file_path: String,
    /// Error taxonomy identifier.
    pub kind: String,
    pub message: String,
}

impl FileFailure {
    pub fn new(file_path: impl Into<String>, err: &testlens_core::LensError) -> Self {
        FileFailure {
            file_path: file_path.into(),
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuiteSummary {
    pub test_functions: usize,
    pub test_classes: usize,
    pub fixtures: usize,
    pub markers: usize,
    pub setup_teardown_methods: usize,
    pub mock_usage: usize,
    pub assertions: usize,
    pub pytest_tests: usize,
    pub unittest_tests: usize,
    pub files_with_errors: usize,
}

/// Test semantics aggregated over a directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestSuiteAnalysis {
    pub directory: String,
    pub total_test_files: usize,
    /// One entry per successfully analyzed file, sorted by path.
    pub files: Vec<TestFileAnalysis>,
    pub errors: Vec<FileFailure>,
    pub summary: SuiteSummary,
}

impl TestSuiteAnalysis {
    pub fn test_functions(&self) -> impl Iterator<Item = &TestFunctionInfo> {
        self.files.iter().flat_map(|f| f.test_functions.iter())
    }

    pub fn imports(&self) -> impl Iterator<Item = &ImportInfo> {
        self.files.iter().flat_map(|f| f.imports.iter())
    }

    pub fn fixtures(&self) -> impl Iterator<Item = &FixtureInfo> {
        self.files.iter().flat_map(|f| f.fixtures.iter())
    }

    pub fn markers(&self) -> impl Iterator<Item = &MarkerInfo> {
        self.files.iter().flat_map(|f| f.markers.iter())
    }

    /// Framework with the most test functions; pytest on a tie.
    pub fn dominant_framework(&self) -> Framework {
        if self.summary.unittest_tests > self.summary.pytest_tests {
            Framework::Unittest
        } else {
            Framework::Pytest
        }
    }
}

// ============================================================================
// Untested Code
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UntestedFunction {
    pub name: String,
    pub file_path: String,
    pub module: String,
    pub line_number: u32,
    pub docstring: Option<String>,
    pub parameters: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UntestedClass {
    pub name: String,
    pub file_path: String,
    pub module: String,
    pub line_number: u32,
    pub docstring: Option<String>,
    pub methods: usize,
    pub public_methods: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UntestedFile {
    pub file_path: String,
    pub module: String,
    pub functions: usize,
    pub classes: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UntestedSummary {
    pub total_source_files: usize,
    pub total_test_files: usize,
    pub tested_references: usize,
    pub untested_functions: usize,
    pub untested_classes: usize,
    pub untested_files: usize,
    pub files_with_errors: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UntestedReport {
    pub untested_functions: Vec<UntestedFunction>,
    pub untested_classes: Vec<UntestedClass>,
    pub untested_files: Vec<UntestedFile>,
    pub errors: Vec<FileFailure>,
    pub summary: UntestedSummary,
}

// ============================================================================
// Suggestions
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestType {
    Positive,
    Negative,
    EdgeCase,
    TypeCheck,
    Exception,
    Async,
    Instantiation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCaseSuggestion {
    pub test_name: String,
    pub description: String,
    pub test_type: TestType,
    pub priority: Priority,
    pub framework: Framework,
    /// Function, method (`Class.method`) or class under test.
    pub target: String,
    pub suggested_assertions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_class_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inherits_from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setup_methods: Option<Vec<String>>,
}

/// How the suggestion framework was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameworkSource {
    /// Supplied by the caller.
    Explicit,
    /// Majority of the project's existing tests.
    Detected,
    /// No tests to learn from.
    Default,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestionReport {
    pub file_path: String,
    pub framework: Framework,
    pub framework_source: FrameworkSource,
    pub test_suggestions: Vec<TestCaseSuggestion>,
}
