//! Test semantics of test files: test functions and classes, fixtures,
//! markers, setup/teardown hooks, mock usage and assertions.

use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;

use rayon::prelude::*;
use regex::Regex;
use tracing::{debug, info, warn};
use tree_sitter::Node;

use testlens_core::config::AnalysisPolicy;
use testlens_core::error::LensResult;
use testlens_core::files;

use crate::classify::{
    class_framework, classify, has_unittest_base, is_test_candidate, Candidate, ClassifierPolicy,
    FileAffinity,
};
use crate::extract::{decorator_expression, decorator_name, extract_with_index, trailing_name};
use crate::index::{DefId, DefKind, DefinitionIndex};
use crate::parser::{line_of, parse_file, ParsedModule};
use crate::types::{
    AssertionStyle, AssertionUsage, ClassInfo, FileFailure, FixtureInfo, Framework, FunctionInfo,
    MarkerInfo, MockUsage, SetupScope, SetupTeardownInfo, SuiteSummary, TestClassInfo,
    TestFileAnalysis, TestFunctionInfo, TestSuiteAnalysis,
};

/// Setup and teardown hooks recognized on classes and modules.
pub const SETUP_TEARDOWN_NAMES: &[&str] = &[
    "setUp",
    "tearDown",
    "setUpClass",
    "tearDownClass",
    "setUpModule",
    "tearDownModule",
    "setup_method",
    "teardown_method",
    "setup_class",
    "teardown_class",
];

static FIXTURE_SCOPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"scope\s*=\s*['"]([^'"]*)['"]"#).unwrap());
static FIXTURE_AUTOUSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"autouse\s*=\s*(True|False)").unwrap());

// ============================================================================
// Single File
// ============================================================================

/// Analyze the test semantics of one parsed file.
pub fn analyze_module(module: &ParsedModule, policy: ClassifierPolicy) -> TestFileAnalysis {
    let index = DefinitionIndex::build(module);
    let symbols = extract_with_index(module, &index);
    let path = module.path();

    // Pair arena ids with extracted infos. Both follow index order.
    let mut functions: HashMap<DefId, &FunctionInfo> = HashMap::new();
    let mut classes: HashMap<DefId, &ClassInfo> = HashMap::new();
    for (def, info) in index.functions().zip(&symbols.functions) {
        functions.insert(def.id, info);
    }
    for (def, class) in index.classes().zip(&symbols.classes) {
        classes.insert(def.id, class);
        let methods = index.members(def.id).filter(|m| m.kind == DefKind::Function);
        for (method, info) in methods.zip(&class.methods) {
            functions.insert(method.id, info);
        }
    }

    let affinity = FileAffinity::from_imports(&symbols.imports);
    let mut analysis = TestFileAnalysis {
        file_path: path.to_string(),
        test_functions: Vec::new(),
        test_classes: Vec::new(),
        fixtures: Vec::new(),
        markers: collect_markers(module),
        setup_teardown_methods: Vec::new(),
        mock_usage: collect_mock_usage(module),
        assertions: collect_assertions(module),
        imports: symbols.imports.clone(),
    };

    for def in index.all_functions() {
        let Some(function) = functions.get(&def.id).copied() else {
            continue;
        };
        let owner = def.owner_class.and_then(|id| classes.get(&id).copied());

        if is_test_candidate(function) {
            let verdict = classify(&Candidate::new(function, owner, affinity, policy));
            analysis.test_functions.push(TestFunctionInfo {
                function: function.clone(),
                file_path: path.to_string(),
                class_name: owner.map(|c| c.name.clone()),
                framework: verdict.framework,
                framework_rule: verdict.rule.to_string(),
            });
        }

        if let Some(fixture_decorator) = def
            .decorators
            .iter()
            .find(|d| decorator_name(module, **d) == Some("fixture"))
        {
            analysis
                .fixtures
                .push(fixture_info(module, *fixture_decorator, function));
        }

        if SETUP_TEARDOWN_NAMES.contains(&function.name.as_str())
            && (owner.is_some() || def.enclosing.is_none())
        {
            analysis
                .setup_teardown_methods
                .push(setup_teardown_info(path, function, owner));
        }
    }

    for def in index.classes() {
        let Some(class) = classes.get(&def.id).copied() else {
            continue;
        };
        let test_methods = class.methods.iter().filter(|m| is_test_candidate(m)).count();
        if class.name.starts_with("Test") || has_unittest_base(class) || test_methods > 0 {
            analysis.test_classes.push(TestClassInfo {
                name: class.name.clone(),
                file_path: path.to_string(),
                line_number: class.line_number,
                docstring: class.docstring.clone(),
                base_classes: class.base_classes.clone(),
                methods: class.methods.len(),
                test_methods,
                framework: class_framework(class),
            });
        }
    }

    debug!(
        path,
        tests = analysis.test_functions.len(),
        fixtures = analysis.fixtures.len(),
        "analyzed test file"
    );
    analysis
}

fn fixture_info(module: &ParsedModule, decorator: Node<'_>, function: &FunctionInfo) -> FixtureInfo {
    let text = module.text(decorator);
    let scope = FIXTURE_SCOPE
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| "function".to_string());
    let autouse = FIXTURE_AUTOUSE
        .captures(text)
        .and_then(|c| c.get(1))
        .is_some_and(|m| m.as_str() == "True");
    FixtureInfo {
        name: function.name.clone(),
        file_path: module.path().to_string(),
        scope,
        autouse,
        line_number: function.line_number,
        parameters: function.parameters.iter().map(|p| p.name.clone()).collect(),
        docstring: function.docstring.clone(),
    }
}

fn setup_teardown_info(
    path: &str,
    function: &FunctionInfo,
    owner: Option<&ClassInfo>,
) -> SetupTeardownInfo {
    let name = function.name.as_str();
    // camelCase hooks come from unittest, snake_case ones from pytest.
    let framework = if name.contains('_') {
        Framework::Pytest
    } else {
        Framework::Unittest
    };
    let scope = if name.contains("Class") || name.contains("class") {
        SetupScope::Class
    } else {
        SetupScope::Method
    };
    SetupTeardownInfo {
        name: function.name.clone(),
        class_name: owner.map(|c| c.name.clone()),
        file_path: path.to_string(),
        framework,
        scope,
        line_number: function.line_number,
    }
}

// ============================================================================
// Expression Scans
// ============================================================================

/// `(namespace, marker)` of an attribute shaped `<namespace>.mark.<marker>`.
fn marker_parts<'a>(module: &'a ParsedModule, expr: Node<'_>) -> Option<(&'a str, &'a str)> {
    if expr.kind() != "attribute" {
        return None;
    }
    let marker = expr.child_by_field_name("attribute")?;
    let object = expr.child_by_field_name("object")?;
    if object.kind() != "attribute" {
        return None;
    }
    let mark = object.child_by_field_name("attribute")?;
    if module.text(mark) != "mark" {
        return None;
    }
    let namespace = object.child_by_field_name("object")?;
    Some((module.text(namespace), module.text(marker)))
}

fn collect_markers(module: &ParsedModule) -> Vec<MarkerInfo> {
    let mut markers = Vec::new();
    for node in module.preorder() {
        let expr = match node.kind() {
            "call" => node.child_by_field_name("function"),
            "decorator" => decorator_expression(node).filter(|e| e.kind() == "attribute"),
            _ => None,
        };
        if let Some((namespace, name)) = expr.and_then(|e| marker_parts(module, e)) {
            markers.push(MarkerInfo {
                name: name.to_string(),
                namespace: namespace.to_string(),
                file_path: module.path().to_string(),
                line_number: line_of(node),
            });
        }
    }
    markers
}

/// Name of a callee that looks like mock machinery.
///
/// Attribute callees match on the attribute name alone, case-insensitively;
/// plain names must contain `Mock`.
fn mock_callee_name<'a>(module: &'a ParsedModule, callee: Node<'_>) -> Option<&'a str> {
    let name = trailing_name(module, callee)?;
    let matched = match callee.kind() {
        "attribute" => name.to_ascii_lowercase().contains("mock"),
        _ => name.contains("Mock"),
    };
    matched.then_some(name)
}

fn collect_mock_usage(module: &ParsedModule) -> Vec<MockUsage> {
    module
        .preorder()
        .filter(|n| n.kind() == "call")
        .filter_map(|call| {
            let callee = call.child_by_field_name("function")?;
            let name = mock_callee_name(module, callee)?;
            Some(MockUsage {
                method: name.to_string(),
                file_path: module.path().to_string(),
                line_number: line_of(call),
            })
        })
        .collect()
}

fn assertion_style(module: &ParsedModule, callee: Node<'_>) -> Option<(String, AssertionStyle)> {
    if callee.kind() != "attribute" {
        return None;
    }
    let object = callee.child_by_field_name("object")?;
    let method = trailing_name(module, callee)?;
    let object_text = module.text(object);

    if object_text == "pytest" && matches!(method, "raises" | "approx" | "warns" | "fail") {
        return Some((format!("pytest.{}", method), AssertionStyle::Pytest));
    }
    if method.starts_with("assert_") {
        return Some((method.to_string(), AssertionStyle::Mock));
    }
    let camel = method
        .strip_prefix("assert")
        .is_some_and(|rest| rest.starts_with(|c: char| c.is_ascii_uppercase()));
    if camel && object_text == "self" {
        return Some((method.to_string(), AssertionStyle::Unittest));
    }
    None
}

fn collect_assertions(module: &ParsedModule) -> Vec<AssertionUsage> {
    let mut found = Vec::new();
    for node in module.preorder() {
        let usage = match node.kind() {
            "assert_statement" => Some(("assert".to_string(), AssertionStyle::Pytest)),
            "call" => node
                .child_by_field_name("function")
                .and_then(|callee| assertion_style(module, callee)),
            _ => None,
        };
        if let Some((method, style)) = usage {
            found.push(AssertionUsage {
                method,
                style,
                file_path: module.path().to_string(),
                line_number: line_of(node),
            });
        }
    }
    found
}

// ============================================================================
// Directory
// ============================================================================

/// Analyze every test file under `directory` (default: project root).
///
/// Files that fail to read or parse are reported in `errors`; the rest are
/// unaffected.
pub fn analyze_directory(
    root: &Path,
    directory: Option<&str>,
    policy: &AnalysisPolicy,
) -> LensResult<TestSuiteAnalysis> {
    let paths = files::test_file_paths(root, directory, policy)?;
    let classifier = ClassifierPolicy::from(policy);

    let results: Vec<(String, LensResult<TestFileAnalysis>)> = paths
        .par_iter()
        .map(|path| {
            let result = parse_file(root, path, policy).map(|m| analyze_module(&m, classifier));
            (path.clone(), result)
        })
        .collect();

    let mut analysis = TestSuiteAnalysis {
        directory: directory.unwrap_or(".").to_string(),
        total_test_files: paths.len(),
        files: Vec::new(),
        errors: Vec::new(),
        summary: SuiteSummary::default(),
    };
    for (path, result) in results {
        match result {
            Ok(file) => analysis.files.push(file),
            Err(err) => {
                warn!(path = %path, error = %err, "skipping test file");
                analysis.errors.push(FileFailure::new(path, &err));
            }
        }
    }
    analysis.summary = summarize(&analysis);

    info!(
        directory = %analysis.directory,
        files = analysis.total_test_files,
        tests = analysis.summary.test_functions,
        errors = analysis.errors.len(),
        "test analysis complete"
    );
    Ok(analysis)
}

fn summarize(analysis: &TestSuiteAnalysis) -> SuiteSummary {
    let mut summary = SuiteSummary {
        files_with_errors: analysis.errors.len(),
        ..SuiteSummary::default()
    };
    for file in &analysis.files {
        summary.test_functions += file.test_functions.len();
        summary.test_classes += file.test_classes.len();
        summary.fixtures += file.fixtures.len();
        summary.markers += file.markers.len();
        summary.setup_teardown_methods += file.setup_teardown_methods.len();
        summary.mock_usage += file.mock_usage.len();
        summary.assertions += file.assertions.len();
        for test in &file.test_functions {
            match test.framework {
                Framework::Pytest => summary.pytest_tests += 1,
                Framework::Unittest => summary.unittest_tests += 1,
            }
        }
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_source;

    fn analyze(source: &str) -> TestFileAnalysis {
        let module = parse_source("tests/test_sample.py", source).unwrap();
        analyze_module(&module, ClassifierPolicy::default())
    }

    #[test]
    fn session_fixture_scope() {
        let analysis = analyze(
            "import pytest\n\n@pytest.fixture(scope=\"session\")\ndef db():\n    return 1\n",
        );
        assert_eq!(analysis.fixtures.len(), 1);
        let fixture = &analysis.fixtures[0];
        assert_eq!(fixture.name, "db");
        assert_eq!(fixture.scope, "session");
        assert!(!fixture.autouse);
    }

    #[test]
    fn fixture_defaults_and_autouse() {
        let analysis = analyze(
            "from pytest import fixture\n\n@fixture\ndef a():\n    pass\n\n@fixture(autouse=True)\ndef b(a):\n    pass\n\n@prefixture\ndef c():\n    pass\n",
        );
        let names: Vec<&str> = analysis.fixtures.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(analysis.fixtures[0].scope, "function");
        assert!(analysis.fixtures[1].autouse);
        assert_eq!(analysis.fixtures[1].parameters, vec!["a"]);
    }

    #[test]
    fn markers_from_calls_and_bare_decorators() {
        let source = r#"
import pytest

@pytest.mark.slow
@pytest.mark.parametrize("x", [1, 2])
def test_x(x):
    assert x
"#;
        let analysis = analyze(source);
        let markers: Vec<(&str, &str)> = analysis
            .markers
            .iter()
            .map(|m| (m.namespace.as_str(), m.name.as_str()))
            .collect();
        assert_eq!(markers, vec![("pytest", "slow"), ("pytest", "parametrize")]);
        assert_eq!(analysis.markers[0].line_number, 4);
    }

    #[test]
    fn unittest_class_with_hooks() {
        let source = r#"
import unittest
from unittest import mock

class TestStore(unittest.TestCase):
    @classmethod
    def setUpClass(cls):
        cls.shared = 1

    def setUp(self):
        self.client = mock.MagicMock()

    def test_get(self):
        self.assertEqual(self.client.get(), None)
        self.client.get.assert_called_once_with()

    def helper(self):
        pass
"#;
        let analysis = analyze(source);
        assert_eq!(analysis.test_classes.len(), 1);
        let class = &analysis.test_classes[0];
        assert_eq!(class.framework, Framework::Unittest);
        assert_eq!(class.methods, 4);
        assert_eq!(class.test_methods, 1);

        assert_eq!(analysis.test_functions.len(), 1);
        assert_eq!(analysis.test_functions[0].class_name.as_deref(), Some("TestStore"));

        let hooks: Vec<(&str, SetupScope, Framework)> = analysis
            .setup_teardown_methods
            .iter()
            .map(|h| (h.name.as_str(), h.scope, h.framework))
            .collect();
        assert_eq!(
            hooks,
            vec![
                ("setUpClass", SetupScope::Class, Framework::Unittest),
                ("setUp", SetupScope::Method, Framework::Unittest),
            ]
        );

        let mocks: Vec<&str> = analysis.mock_usage.iter().map(|m| m.method.as_str()).collect();
        assert_eq!(mocks, vec!["MagicMock"]);

        let asserts: Vec<(&str, AssertionStyle)> = analysis
            .assertions
            .iter()
            .map(|a| (a.method.as_str(), a.style))
            .collect();
        assert_eq!(
            asserts,
            vec![
                ("assertEqual", AssertionStyle::Unittest),
                ("assert_called_once_with", AssertionStyle::Mock),
            ]
        );
    }

    #[test]
    fn mock_usage_matches_callee_name_only() {
        let source = r#"
import unittest.mock

def test_query(mocker):
    self.mock_db.query()
    mocker.spy(obj, "m")
    patch("pkg.thing")
    double = unittest.mock.MagicMock()
    stub = Mock()
    mocker.mock_open()
"#;
        let analysis = analyze(source);
        let mocks: Vec<(&str, u32)> = analysis
            .mock_usage
            .iter()
            .map(|m| (m.method.as_str(), m.line_number))
            .collect();
        assert_eq!(mocks, vec![("MagicMock", 8), ("Mock", 9), ("mock_open", 10)]);
    }

    #[test]
    fn pytest_assertions() {
        let source = "import pytest\n\ndef test_div():\n    assert 1 / 1 == 1\n    with pytest.raises(ZeroDivisionError):\n        1 / 0\n";
        let analysis = analyze(source);
        let methods: Vec<&str> = analysis.assertions.iter().map(|a| a.method.as_str()).collect();
        assert_eq!(methods, vec!["assert", "pytest.raises"]);
    }

    #[test]
    fn module_level_setup_hooks() {
        let analysis = analyze("def setup_module():\n    pass\n\ndef setUpModule():\n    pass\n");
        // setup_module is not in the hook list; setUpModule is.
        assert_eq!(analysis.setup_teardown_methods.len(), 1);
        assert_eq!(analysis.setup_teardown_methods[0].class_name, None);
    }
}
