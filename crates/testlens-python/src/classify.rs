//! Framework classification of test functions.
//!
//! A candidate is run through [`FRAMEWORK_RULES`] in order and the first rule
//! that returns a label wins. The list ends with an unconditional default, so
//! every candidate gets a label and the id of the deciding rule.
//!
//! | rule | label |
//! |------|-------|
//! | `unittest_base_class` | unittest |
//! | `pytest_test_class` | pytest |
//! | `pytest_decorator` | pytest |
//! | `pytest_fixture_parameter` | pytest |
//! | `self_parameter` | unittest |
//! | `unittest_lifecycle_name` | unittest |
//! | `fixture_injection_heuristic` | pytest (policy switch) |
//! | `import_affinity` | larger affinity |
//! | `default` | pytest |
//!
//! Decorators mentioning `unittest.` or `mock.patch` do not decide anything on
//! their own; they add to the candidate's unittest affinity.

use tracing::debug;

use testlens_core::config::AnalysisPolicy;

use crate::types::{ClassInfo, Framework, FunctionInfo, ImportInfo};

/// Well-known fixtures injected by pytest.
pub const PYTEST_BUILTIN_FIXTURES: &[&str] = &[
    "request",
    "tmp_path",
    "tmp_path_factory",
    "tmpdir",
    "tmpdir_factory",
    "capsys",
    "capfd",
    "caplog",
    "monkeypatch",
    "pytestconfig",
    "recwarn",
];

pub const UNITTEST_LIFECYCLE: &[&str] = &["setUp", "tearDown", "setUpClass", "tearDownClass"];

/// Classifier switches taken from the analysis policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassifierPolicy {
    /// `test_*` functions with more than one parameter are assumed to take
    /// pytest fixtures. A unittest method `test_x(self, extra)` is misread
    /// under this assumption.
    pub fixture_injection_heuristic: bool,
}

impl Default for ClassifierPolicy {
    fn default() -> Self {
        ClassifierPolicy {
            fixture_injection_heuristic: true,
        }
    }
}

impl From<&AnalysisPolicy> for ClassifierPolicy {
    fn from(policy: &AnalysisPolicy) -> Self {
        ClassifierPolicy {
            fixture_injection_heuristic: policy.fixture_injection_heuristic(),
        }
    }
}

// ============================================================================
// File Context
// ============================================================================

/// Per-file import affinity shared by all candidates of the file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileAffinity {
    pub pytest: usize,
    pub unittest: usize,
    /// Some import mentions pytest.
    pub imports_pytest: bool,
}

impl FileAffinity {
    pub fn from_imports(imports: &[ImportInfo]) -> Self {
        let mut affinity = FileAffinity::default();
        for import in imports {
            if import.mentions("pytest") {
                affinity.pytest += 1;
                affinity.imports_pytest = true;
            } else if import.mentions("unittest") {
                affinity.unittest += 1;
            }
        }
        affinity
    }
}

// ============================================================================
// Candidates
// ============================================================================

/// A function considered for classification.
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub function: &'a FunctionInfo,
    /// Class whose body directly defines the function.
    pub owner: Option<&'a ClassInfo>,
    pub affinity: FileAffinity,
    pub policy: ClassifierPolicy,
}

impl<'a> Candidate<'a> {
    pub fn new(
        function: &'a FunctionInfo,
        owner: Option<&'a ClassInfo>,
        affinity: FileAffinity,
        policy: ClassifierPolicy,
    ) -> Self {
        Candidate {
            function,
            owner,
            affinity,
            policy,
        }
    }

    /// Unittest affinity including this candidate's decorators.
    fn unittest_affinity(&self) -> usize {
        let decorator_hits = self
            .function
            .decorators
            .iter()
            .filter(|d| {
                let d = d.to_ascii_lowercase();
                d.contains("unittest.") || d.contains("mock.patch")
            })
            .count();
        self.affinity.unittest + decorator_hits
    }
}

/// Whether a function is a test candidate: a `test_` name, or a decorator
/// mentioning `test`.
pub fn is_test_candidate(function: &FunctionInfo) -> bool {
    function.name.starts_with("test_")
        || function
            .decorators
            .iter()
            .any(|d| d.to_ascii_lowercase().contains("test"))
}

/// Whether base-class expressions mark a unittest class.
pub fn has_unittest_base(class: &ClassInfo) -> bool {
    class
        .base_classes
        .iter()
        .any(|b| b.contains("TestCase") || b.contains("unittest"))
}

/// Framework of a test class.
pub fn class_framework(class: &ClassInfo) -> Framework {
    if has_unittest_base(class) {
        Framework::Unittest
    } else {
        Framework::Pytest
    }
}

// ============================================================================
// Rules
// ============================================================================

/// One entry of the ordered rule list.
pub struct FrameworkRule {
    pub id: &'static str,
    pub decide: fn(&Candidate<'_>) -> Option<Framework>,
}

fn when(condition: bool, label: Framework) -> Option<Framework> {
    condition.then_some(label)
}

fn unittest_base_class(c: &Candidate<'_>) -> Option<Framework> {
    when(c.owner.is_some_and(has_unittest_base), Framework::Unittest)
}

fn pytest_test_class(c: &Candidate<'_>) -> Option<Framework> {
    when(
        c.owner.is_some_and(|o| o.name.starts_with("Test")) && c.affinity.imports_pytest,
        Framework::Pytest,
    )
}

fn pytest_decorator(c: &Candidate<'_>) -> Option<Framework> {
    let hit = c.function.decorators.iter().any(|d| {
        let d = d.to_ascii_lowercase();
        d.contains("pytest.") || d.contains("parametrize") || d.contains("fixture") || d.contains("mark.")
    });
    when(hit, Framework::Pytest)
}

fn pytest_fixture_parameter(c: &Candidate<'_>) -> Option<Framework> {
    let hit = c
        .function
        .parameters
        .iter()
        .any(|p| PYTEST_BUILTIN_FIXTURES.contains(&p.name.as_str()));
    when(hit, Framework::Pytest)
}

fn self_parameter(c: &Candidate<'_>) -> Option<Framework> {
    when(
        c.function.parameters.first().is_some_and(|p| p.name == "self"),
        Framework::Unittest,
    )
}

fn unittest_lifecycle_name(c: &Candidate<'_>) -> Option<Framework> {
    when(
        UNITTEST_LIFECYCLE.contains(&c.function.name.as_str()),
        Framework::Unittest,
    )
}

fn fixture_injection_heuristic(c: &Candidate<'_>) -> Option<Framework> {
    when(
        c.policy.fixture_injection_heuristic
            && c.function.name.starts_with("test_")
            && c.function.parameters.len() > 1,
        Framework::Pytest,
    )
}

fn import_affinity(c: &Candidate<'_>) -> Option<Framework> {
    let pytest = c.affinity.pytest;
    let unittest = c.unittest_affinity();
    match pytest.cmp(&unittest) {
        std::cmp::Ordering::Greater => Some(Framework::Pytest),
        std::cmp::Ordering::Less => Some(Framework::Unittest),
        std::cmp::Ordering::Equal => None,
    }
}

fn default_rule(_: &Candidate<'_>) -> Option<Framework> {
    Some(Framework::Pytest)
}

/// Ordered classification rules. The last rule always decides.
pub const FRAMEWORK_RULES: &[FrameworkRule] = &[
    FrameworkRule {
        id: "unittest_base_class",
        decide: unittest_base_class,
    },
    FrameworkRule {
        id: "pytest_test_class",
        decide: pytest_test_class,
    },
    FrameworkRule {
        id: "pytest_decorator",
        decide: pytest_decorator,
    },
    FrameworkRule {
        id: "pytest_fixture_parameter",
        decide: pytest_fixture_parameter,
    },
    FrameworkRule {
        id: "self_parameter",
        decide: self_parameter,
    },
    FrameworkRule {
        id: "unittest_lifecycle_name",
        decide: unittest_lifecycle_name,
    },
    FrameworkRule {
        id: "fixture_injection_heuristic",
        decide: fixture_injection_heuristic,
    },
    FrameworkRule {
        id: "import_affinity",
        decide: import_affinity,
    },
    FrameworkRule {
        id: "default",
        decide: default_rule,
    },
];

/// Framework label and the rule that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub framework: Framework,
    pub rule: &'static str,
}

/// Classify a candidate with [`FRAMEWORK_RULES`].
pub fn classify(candidate: &Candidate<'_>) -> Classification {
    for rule in FRAMEWORK_RULES {
        if let Some(framework) = (rule.decide)(candidate) {
            debug!(
                function = %candidate.function.qualified_name,
                rule = rule.id,
                %framework,
                "classified test"
            );
            return Classification {
                framework,
                rule: rule.id,
            };
        }
    }
    Classification {
        framework: Framework::Pytest,
        rule: "default",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::extract_module;
    use crate::parser::parse_source;
    use crate::types::ModuleSymbols;

    fn symbols(source: &str) -> ModuleSymbols {
        extract_module(&parse_source("tests/test_sample.py", source).unwrap())
    }

    /// Classify the named function or `Class.method` in `source`.
    fn classify_in(source: &str, target: &str, policy: ClassifierPolicy) -> Classification {
        let syms = symbols(source);
        let affinity = FileAffinity::from_imports(&syms.imports);
        if let Some((class_name, method)) = target.split_once('.') {
            let class = syms.find_class(class_name).unwrap();
            let function = class.method(method).unwrap();
            classify(&Candidate::new(function, Some(class), affinity, policy))
        } else {
            let function = syms.find_function(target).unwrap();
            classify(&Candidate::new(function, None, affinity, policy))
        }
    }

    fn rule_for(source: &str, target: &str) -> (Framework, &'static str) {
        let c = classify_in(source, target, ClassifierPolicy::default());
        (c.framework, c.rule)
    }

    #[test]
    fn unittest_method_and_bare_function() {
        let source = r#"
class TestThing(unittest.TestCase):
    def test_x(self):
        self.assertTrue(True)

def test_y():
    assert True
"#;
        assert_eq!(
            rule_for(source, "TestThing.test_x"),
            (Framework::Unittest, "unittest_base_class")
        );
        assert_eq!(rule_for(source, "test_y"), (Framework::Pytest, "default"));
    }

    #[test]
    fn unittest_import_tips_bare_functions() {
        let source = "import unittest

def test_y():
    assert True
";
        assert_eq!(rule_for(source, "test_y"), (Framework::Unittest, "import_affinity"));
    }

    #[test]
    fn bare_function_without_imports_is_pytest() {
        assert_eq!(
            rule_for("def test_y():\n    assert True\n", "test_y"),
            (Framework::Pytest, "default")
        );
    }

    #[test]
    fn pytest_class_requires_pytest_import() {
        let with_import = "import pytest\n\nclass TestApi:\n    def test_get(self):\n        pass\n";
        assert_eq!(
            rule_for(with_import, "TestApi.test_get"),
            (Framework::Pytest, "pytest_test_class")
        );
        let without = "class TestApi:\n    def test_get(self):\n        pass\n";
        assert_eq!(
            rule_for(without, "TestApi.test_get"),
            (Framework::Unittest, "self_parameter")
        );
    }

    #[test]
    fn pytest_decorators_win() {
        let source = "@pytest.mark.parametrize('v', [1, 2])\ndef test_v(v):\n    pass\n";
        assert_eq!(rule_for(source, "test_v"), (Framework::Pytest, "pytest_decorator"));
    }

    #[test]
    fn builtin_fixture_parameter() {
        let source = "def test_out(capsys):\n    pass\n";
        assert_eq!(
            rule_for(source, "test_out"),
            (Framework::Pytest, "pytest_fixture_parameter")
        );
    }

    #[test]
    fn lifecycle_names_are_unittest() {
        let source = "def setUp():\n    pass\n";
        assert_eq!(
            rule_for(source, "setUp"),
            (Framework::Unittest, "unittest_lifecycle_name")
        );
    }

    #[test]
    fn fixture_injection_assumption() {
        let source = "def test_db(db, user):\n    pass\n";
        assert_eq!(
            rule_for(source, "test_db"),
            (Framework::Pytest, "fixture_injection_heuristic")
        );
        let off = ClassifierPolicy {
            fixture_injection_heuristic: false,
        };
        let c = classify_in(source, "test_db", off);
        assert_eq!((c.framework, c.rule), (Framework::Pytest, "default"));
    }

    #[test]
    fn mock_patch_decorator_adds_unittest_affinity() {
        let source = "import pytest\n\n@mock.patch('os.getcwd')\n@mock.patch('os.listdir')\ndef test_z():\n    pass\n";
        // pytest affinity 1 vs unittest 2 from decorators.
        assert_eq!(rule_for(source, "test_z"), (Framework::Unittest, "import_affinity"));
    }

    #[test]
    fn candidates() {
        let syms = symbols(
            "def test_a():\n    pass\n\n@pytest.fixture\ndef client():\n    pass\n\ndef helper():\n    pass\n",
        );
        let names: Vec<&str> = syms
            .functions
            .iter()
            .filter(|f| is_test_candidate(f))
            .map(|f| f.name.as_str())
            .collect();
        assert_eq!(names, vec!["test_a", "client"]);
    }
}
