//! Test case suggestions derived from signatures and docstrings.

use std::path::Path;

use tracing::debug;

use testlens_core::config::AnalysisPolicy;
use testlens_core::error::{LensError, LensResult};

use crate::test_analysis::analyze_directory;
use crate::types::{
    ClassInfo, FunctionInfo, Framework, FrameworkSource, ModuleSymbols, ParamKind, Priority,
    SuggestionReport, TestCaseSuggestion, TestType,
};

// ============================================================================
// Framework Resolution
// ============================================================================

/// Pick the framework for suggestions.
///
/// An explicit name wins. Otherwise the project's existing tests decide by
/// majority, and pytest is used when there are none.
pub fn resolve_framework(
    explicit: Option<&str>,
    root: &Path,
    policy: &AnalysisPolicy,
) -> LensResult<(Framework, FrameworkSource)> {
    if let Some(name) = explicit {
        let framework = Framework::parse(name).ok_or_else(|| {
            LensError::invalid_args_with_details(
                format!("unknown framework '{}'", name),
                serde_json::json!({ "framework": name, "expected": ["pytest", "unittest"] }),
            )
        })?;
        return Ok((framework, FrameworkSource::Explicit));
    }

    let suite = analyze_directory(root, None, policy)?;
    if suite.summary.pytest_tests + suite.summary.unittest_tests == 0 {
        return Ok((Framework::Pytest, FrameworkSource::Default));
    }
    Ok((suite.dominant_framework(), FrameworkSource::Detected))
}

// ============================================================================
// Type Categories
// ============================================================================

/// Value shape of an annotation, used to pick edge cases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TypeCategory {
    String,
    Integer,
    List,
    Dict,
}

/// Strip `Optional[...]` and `| None` wrappers.
fn unwrap_optional(annotation: &str) -> &str {
    let mut text = annotation.trim();
    loop {
        let inner = text
            .strip_prefix("typing.")
            .unwrap_or(text)
            .strip_prefix("Optional[")
            .and_then(|rest| rest.strip_suffix(']'));
        if let Some(inner) = inner {
            text = inner.trim();
            continue;
        }
        let parts: Vec<&str> = text.split('|').map(str::trim).collect();
        if parts.len() == 2 {
            if parts[1] == "None" {
                text = parts[0];
                continue;
            }
            if parts[0] == "None" {
                text = parts[1];
                continue;
            }
        }
        return text;
    }
}

fn type_category(annotation: &str) -> Option<TypeCategory> {
    let text = unwrap_optional(annotation);
    let constructor = text.split('[').next().unwrap_or(text).trim();
    let constructor = constructor.strip_prefix("typing.").unwrap_or(constructor);
    match constructor {
        "str" => Some(TypeCategory::String),
        "int" => Some(TypeCategory::Integer),
        "list" | "List" => Some(TypeCategory::List),
        "dict" | "Dict" => Some(TypeCategory::Dict),
        _ => None,
    }
}

// ============================================================================
// Suggestion Builders
// ============================================================================

fn equality_assertions(framework: Framework) -> Vec<String> {
    let names: &[&str] = match framework {
        Framework::Pytest => &["assert", "assert ==", "assert !=", "assert is", "assert is not"],
        Framework::Unittest => &[
            "assertEqual",
            "assertNotEqual",
            "assertTrue",
            "assertFalse",
            "assertIs",
            "assertIsNot",
        ],
    };
    names.iter().map(|s| s.to_string()).collect()
}

fn single(framework: Framework, pytest: &str, unittest: &str) -> Vec<String> {
    match framework {
        Framework::Pytest => vec![pytest.to_string()],
        Framework::Unittest => vec![unittest.to_string()],
    }
}

struct Builder<'a> {
    framework: Framework,
    target: &'a str,
    out: Vec<TestCaseSuggestion>,
}

impl Builder<'_> {
    fn push(
        &mut self,
        test_name: String,
        description: String,
        test_type: TestType,
        priority: Priority,
        suggested_assertions: Vec<String>,
    ) {
        self.out.push(TestCaseSuggestion {
            test_name,
            description,
            test_type,
            priority,
            framework: self.framework,
            target: self.target.to_string(),
            suggested_assertions,
            test_class_name: None,
            inherits_from: None,
            setup_methods: None,
        });
    }
}

/// Suggestions for one function or method.
pub fn function_suggestions(function: &FunctionInfo, framework: Framework) -> Vec<TestCaseSuggestion> {
    let name = function.name.as_str();
    let mut builder = Builder {
        framework,
        target: &function.qualified_name,
        out: Vec::new(),
    };

    builder.push(
        format!("test_{}_basic", name),
        format!("Test basic functionality of {}", name),
        TestType::Positive,
        Priority::High,
        equality_assertions(framework),
    );

    let skip_receiver = !function.is_module_level();
    for (i, param) in function.parameters.iter().enumerate() {
        if param.kind != ParamKind::Positional {
            continue;
        }
        if skip_receiver && i == 0 && (param.name == "self" || param.name == "cls") {
            continue;
        }
        let p = param.name.as_str();
        builder.push(
            format!("test_{}_with_none_{}", name, p),
            format!("Test {} with None value for {}", name, p),
            TestType::Negative,
            Priority::Medium,
            single(framework, "raises exception", "assertRaises"),
        );

        let edge_cases: &[(&str, &str)] = match param.annotation.as_deref().and_then(type_category) {
            Some(TypeCategory::String) => &[("empty_string", "empty string")],
            Some(TypeCategory::Integer) => &[("zero", "zero value"), ("negative", "negative value")],
            Some(TypeCategory::List) => &[("empty_list", "empty list")],
            Some(TypeCategory::Dict) => &[("empty_dict", "empty dict")],
            None => &[],
        };
        for (suffix, label) in edge_cases {
            builder.push(
                format!("test_{}_with_{}_{}", name, suffix, p),
                format!("Test {} with {} for {}", name, label, p),
                TestType::EdgeCase,
                Priority::Medium,
                equality_assertions(framework),
            );
        }
    }

    if let Some(return_type) = &function.return_type {
        builder.push(
            format!("test_{}_return_type", name),
            format!("Test that {} returns correct type: {}", name, return_type),
            TestType::TypeCheck,
            Priority::Low,
            single(framework, "assert isinstance", "assertIsInstance"),
        );
    }

    let docstring = function
        .docstring
        .as_deref()
        .map(str::to_lowercase)
        .unwrap_or_default();
    if docstring.contains("raise") || docstring.contains("exception") {
        builder.push(
            format!("test_{}_raises_exception", name),
            format!("Test that {} raises appropriate exceptions", name),
            TestType::Exception,
            Priority::High,
            single(framework, "pytest.raises", "assertRaises"),
        );
    }
    if docstring.contains("async") || function.is_async {
        builder.push(
            format!("test_{}_async", name),
            format!("Test async behavior of {}", name),
            TestType::Async,
            Priority::High,
            single(framework, "await", "asyncio.run"),
        );
    }

    builder.out
}

/// Suggestions for a class: instantiation, then its public methods and `__init__`.
pub fn class_suggestions(class: &ClassInfo, framework: Framework) -> Vec<TestCaseSuggestion> {
    let mut instantiation = TestCaseSuggestion {
        test_name: format!("test_{}_instantiation", class.name),
        description: format!("Test that {} can be instantiated", class.name),
        test_type: TestType::Instantiation,
        priority: Priority::High,
        framework,
        target: class.qualified_name.clone(),
        suggested_assertions: equality_assertions(framework),
        test_class_name: None,
        inherits_from: None,
        setup_methods: None,
    };
    if framework == Framework::Unittest {
        instantiation.test_class_name = Some(format!("Test{}", class.name));
        instantiation.inherits_from = Some("unittest.TestCase".to_string());
        instantiation.setup_methods = Some(vec!["setUp".to_string(), "tearDown".to_string()]);
    }

    let mut out = vec![instantiation];
    for method in &class.methods {
        if method.is_public() || method.name == "__init__" {
            out.extend(function_suggestions(method, framework));
        }
    }
    out
}

/// Suggest test cases for a module, optionally narrowed to one function or class.
///
/// When both filters are given the function filter wins.
pub fn suggest_tests(
    symbols: &ModuleSymbols,
    function_name: Option<&str>,
    class_name: Option<&str>,
    framework: Framework,
    framework_source: FrameworkSource,
) -> LensResult<SuggestionReport> {
    let path = symbols.file_path.as_str();
    let test_suggestions = match (function_name, class_name) {
        (Some(name), _) => {
            let function = symbols
                .find_function(name)
                .ok_or_else(|| LensError::symbol_not_found("function", name, path))?;
            function_suggestions(function, framework)
        }
        (None, Some(name)) => {
            let class = symbols
                .find_class(name)
                .ok_or_else(|| LensError::symbol_not_found("class", name, path))?;
            class_suggestions(class, framework)
        }
        (None, None) => {
            let mut out = Vec::new();
            for function in symbols
                .functions
                .iter()
                .filter(|f| f.is_module_level() && f.is_public())
            {
                out.extend(function_suggestions(function, framework));
            }
            for class in symbols
                .classes
                .iter()
                .filter(|c| c.is_module_level() && c.is_public())
            {
                out.extend(class_suggestions(class, framework));
            }
            out
        }
    };

    debug!(
        path,
        framework = %framework,
        suggestions = test_suggestions.len(),
        "generated test suggestions"
    );
    Ok(SuggestionReport {
        file_path: path.to_string(),
        framework,
        framework_source,
        test_suggestions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::extract_module;
    use crate::parser::parse_source;

    const SOURCE: &str = r#"
def parse(text: str, limit: Optional[int] = None, *rest) -> dict:
    """Parse text.

    Raises ValueError on bad input and wraps any exception.
    """

async def fetch(url):
    pass

def _private():
    pass

class Client:
    def __init__(self, items: list[str]):
        self.items = items

    def get(self, key: dict):
        pass

    def _internal(self):
        pass
"#;

    fn symbols() -> ModuleSymbols {
        extract_module(&parse_source("client.py", SOURCE).unwrap())
    }

    fn names(report: &SuggestionReport) -> Vec<&str> {
        report.test_suggestions.iter().map(|s| s.test_name.as_str()).collect()
    }

    #[test]
    fn function_suggestions_by_parameter_type() {
        let report = suggest_tests(
            &symbols(),
            Some("parse"),
            None,
            Framework::Pytest,
            FrameworkSource::Explicit,
        )
        .unwrap();
        assert_eq!(
            names(&report),
            vec![
                "test_parse_basic",
                "test_parse_with_none_text",
                "test_parse_with_empty_string_text",
                "test_parse_with_none_limit",
                "test_parse_with_zero_limit",
                "test_parse_with_negative_limit",
                "test_parse_return_type",
                "test_parse_raises_exception",
            ]
        );
        let exceptions = report
            .test_suggestions
            .iter()
            .filter(|s| s.test_type == TestType::Exception)
            .count();
        assert_eq!(exceptions, 1);
        assert_eq!(report.test_suggestions[0].priority, Priority::High);
        assert_eq!(report.test_suggestions[6].suggested_assertions, vec!["assert isinstance"]);
    }

    #[test]
    fn async_function_gets_async_suggestion() {
        let report = suggest_tests(
            &symbols(),
            Some("fetch"),
            None,
            Framework::Unittest,
            FrameworkSource::Explicit,
        )
        .unwrap();
        let last = report.test_suggestions.last().unwrap();
        assert_eq!(last.test_type, TestType::Async);
        assert_eq!(last.suggested_assertions, vec!["asyncio.run"]);
    }

    #[test]
    fn class_suggestions_with_unittest_scaffolding() {
        let report = suggest_tests(
            &symbols(),
            None,
            Some("Client"),
            Framework::Unittest,
            FrameworkSource::Explicit,
        )
        .unwrap();
        let first = &report.test_suggestions[0];
        assert_eq!(first.test_type, TestType::Instantiation);
        assert_eq!(first.test_class_name.as_deref(), Some("TestClient"));
        assert_eq!(first.inherits_from.as_deref(), Some("unittest.TestCase"));
        assert_eq!(
            names(&report),
            vec![
                "test_Client_instantiation",
                "test___init___basic",
                "test___init___with_none_items",
                "test___init___with_empty_list_items",
                "test_get_basic",
                "test_get_with_none_key",
                "test_get_with_empty_dict_key",
            ]
        );
        assert_eq!(report.test_suggestions[4].target, "Client.get");
    }

    #[test]
    fn whole_module_skips_private_symbols() {
        let report =
            suggest_tests(&symbols(), None, None, Framework::Pytest, FrameworkSource::Default)
                .unwrap();
        assert!(report.test_suggestions.iter().all(|s| !s.test_name.contains("private")));
        assert!(names(&report).contains(&"test_Client_instantiation"));
        assert!(report.test_suggestions[0].test_class_name.is_none());
    }

    #[test]
    fn function_filter_wins_and_missing_symbols() {
        let symbols = symbols();
        let report = suggest_tests(
            &symbols,
            Some("fetch"),
            Some("Client"),
            Framework::Pytest,
            FrameworkSource::Explicit,
        )
        .unwrap();
        assert_eq!(report.test_suggestions[0].target, "fetch");

        let err = suggest_tests(&symbols, Some("nope"), None, Framework::Pytest, FrameworkSource::Explicit)
            .unwrap_err();
        assert_eq!(err.kind(), "symbol_not_found");
        let err = suggest_tests(&symbols, None, Some("Nope"), Framework::Pytest, FrameworkSource::Explicit)
            .unwrap_err();
        assert_eq!(err.to_string(), "class 'Nope' not found in client.py");
    }

    #[test]
    fn empty_module_yields_no_suggestions() {
        let symbols = extract_module(&parse_source("empty.py", "x = 1\n").unwrap());
        let report =
            suggest_tests(&symbols, None, None, Framework::Pytest, FrameworkSource::Default).unwrap();
        assert!(report.test_suggestions.is_empty());
    }

    #[test]
    fn optional_unwrapping() {
        assert_eq!(type_category("Optional[str]"), Some(TypeCategory::String));
        assert_eq!(type_category("int | None"), Some(TypeCategory::Integer));
        assert_eq!(type_category("typing.List[int]"), Some(TypeCategory::List));
        assert_eq!(type_category("Dict[str, int]"), Some(TypeCategory::Dict));
        assert_eq!(type_category("bytes"), None);
    }

    #[test]
    fn framework_resolution() {
        let dir = tempfile::TempDir::new().unwrap();
        let policy = AnalysisPolicy::default();
        assert_eq!(
            resolve_framework(None, dir.path(), &policy).unwrap(),
            (Framework::Pytest, FrameworkSource::Default)
        );
        std::fs::write(
            dir.path().join("test_a.py"),
            "import unittest\n\nclass TestA(unittest.TestCase):\n    def test_a(self):\n        pass\n",
        )
        .unwrap();
        assert_eq!(
            resolve_framework(None, dir.path(), &policy).unwrap(),
            (Framework::Unittest, FrameworkSource::Detected)
        );
        assert_eq!(
            resolve_framework(Some("pytest"), dir.path(), &policy).unwrap(),
            (Framework::Pytest, FrameworkSource::Explicit)
        );
        assert_eq!(
            resolve_framework(Some("nose"), dir.path(), &policy).unwrap_err().kind(),
            "invalid_arguments"
        );
    }
}
