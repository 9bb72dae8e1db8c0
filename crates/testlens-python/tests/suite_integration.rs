// Copyright (c) Ken Kocienda and other contributors.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

//! End-to-end tests over small on-disk projects.
//!
//! Each test writes a throwaway project into a temp directory and drives the
//! public entry points the engine uses: batch test analysis, the untested
//! code differ, and suggestion generation.

use std::path::Path;

use tempfile::TempDir;
use testlens_core::config::AnalysisPolicy;
use testlens_python::{
    analyze_directory, extract_module, find_untested, parse_file, suggest_tests, Framework,
    FrameworkSource, TestType,
};

/// Write `files` into a fresh temp directory.
fn setup_project(files: &[(&str, &str)]) -> TempDir {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    for (path, content) in files {
        let full_path = temp_dir.path().join(path);
        if let Some(parent) = full_path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create directories");
        }
        std::fs::write(&full_path, content).expect("Failed to write file");
    }
    temp_dir
}

fn policy() -> AnalysisPolicy {
    AnalysisPolicy::default()
}

// ============================================================================
// Batch Analysis
// ============================================================================

mod batch {
    use super::*;

    #[test]
    fn syntax_error_does_not_poison_siblings() {
        let project = setup_project(&[
            ("tests/test_a.py", "def test_a():\n    assert True\n"),
            ("tests/test_b.py", "def test_b():\n    assert 1 == 1\n"),
            ("tests/test_broken.py", "def f(:\n"),
            ("tests/test_c.py", "def test_c():\n    pass\n"),
        ]);

        let suite = analyze_directory(project.path(), Some("tests"), &policy()).unwrap();

        assert_eq!(suite.total_test_files, 4);
        let analyzed: Vec<&str> = suite.files.iter().map(|f| f.file_path.as_str()).collect();
        assert_eq!(
            analyzed,
            vec!["tests/test_a.py", "tests/test_b.py", "tests/test_c.py"]
        );
        assert_eq!(suite.errors.len(), 1);
        assert_eq!(suite.errors[0].file_path, "tests/test_broken.py");
        assert_eq!(suite.errors[0].kind, "syntax_error");
        assert_eq!(suite.summary.test_functions, 3);
        assert_eq!(suite.summary.files_with_errors, 1);
    }

    #[test]
    fn frameworks_are_tallied_per_test() {
        let project = setup_project(&[
            (
                "tests/test_unit.py",
                r#"import unittest

class TestMath(unittest.TestCase):
    def test_add(self):
        self.assertEqual(1 + 1, 2)

    def test_sub(self):
        self.assertEqual(1 - 1, 0)
"#,
            ),
            (
                "tests/test_py.py",
                r#"import pytest

@pytest.fixture(scope="session")
def database():
    return {}

def test_lookup(database):
    assert database == {}
"#,
            ),
        ]);

        let suite = analyze_directory(project.path(), Some("tests"), &policy()).unwrap();

        assert_eq!(suite.summary.unittest_tests, 2);
        // The session fixture is itself a candidate, so the tally ties.
        assert_eq!(suite.summary.pytest_tests, 2);
        assert_eq!(suite.dominant_framework(), Framework::Pytest);
        let fixture = suite.fixtures().find(|f| f.name == "database").unwrap();
        assert_eq!(fixture.scope, "session");
        assert!(!fixture.autouse);
        assert_eq!(fixture.file_path, "tests/test_py.py");
    }

    #[test]
    fn missing_directory_is_not_found() {
        let project = setup_project(&[("m.py", "x = 1\n")]);
        let err = analyze_directory(project.path(), Some("missing"), &policy()).unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[test]
    fn results_are_sorted_by_path() {
        let project = setup_project(&[
            ("tests/z/test_z.py", "def test_z():\n    pass\n"),
            ("tests/a/test_a.py", "def test_a():\n    pass\n"),
            ("tests/test_m.py", "def test_m():\n    pass\n"),
        ]);
        let suite = analyze_directory(project.path(), None, &policy()).unwrap();
        let names: Vec<&str> = suite.test_functions().map(|t| t.function.name.as_str()).collect();
        assert_eq!(names, vec!["test_a", "test_m", "test_z"]);
    }
}

// ============================================================================
// Untested Code
// ============================================================================

mod untested {
    use super::*;

    const SOURCE: &str = "def foo():\n    return 1\n\ndef bar():\n    return 2\n";

    #[test]
    fn imported_function_is_tested() {
        let project = setup_project(&[
            ("pkg/__init__.py", ""),
            ("pkg/mod.py", SOURCE),
            ("tests/test_mod.py", "from pkg.mod import foo\n\ndef test_foo():\n    assert foo() == 1\n"),
        ]);
        let report = find_untested(project.path(), None, None, &policy()).unwrap();
        let names: Vec<&str> = report.untested_functions.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["bar"]);
    }

    #[test]
    fn no_import_leaves_function_untested() {
        let project = setup_project(&[
            ("pkg/__init__.py", ""),
            ("pkg/mod.py", SOURCE),
            ("tests/test_mod.py", "def test_nothing():\n    pass\n"),
        ]);
        let report = find_untested(project.path(), None, None, &policy()).unwrap();
        let names: Vec<&str> = report.untested_functions.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["foo", "bar"]);
        assert_eq!(report.untested_files.len(), 1);
        assert_eq!(report.summary.untested_functions, 2);
    }

    #[test]
    fn module_import_marks_file_but_not_functions() {
        let project = setup_project(&[
            ("pkg/__init__.py", ""),
            ("pkg/mod.py", SOURCE),
            ("tests/test_mod.py", "import pkg.mod\n"),
        ]);
        let report = find_untested(project.path(), None, None, &policy()).unwrap();
        assert!(report.untested_files.is_empty());
        assert_eq!(report.untested_functions.len(), 2);
    }
}

// ============================================================================
// Suggestions
// ============================================================================

mod suggestions {
    use super::*;

    fn symbols_of(root: &Path, rel: &str) -> testlens_python::ModuleSymbols {
        extract_module(&parse_file(root, rel, &policy()).unwrap())
    }

    #[test]
    fn raising_docstring_yields_one_exception_case() {
        let project = setup_project(&[(
            "lib.py",
            r#"def load(path: str) -> bytes:
    """Read a file.

    raises ValueError when the path is empty.
    """
    if not path:
        raise ValueError("empty")
    return b""
"#,
        )]);
        let symbols = symbols_of(project.path(), "lib.py");
        let report = suggest_tests(
            &symbols,
            Some("load"),
            None,
            Framework::Pytest,
            FrameworkSource::Explicit,
        )
        .unwrap();

        let exceptions: Vec<_> = report
            .test_suggestions
            .iter()
            .filter(|s| s.test_type == TestType::Exception)
            .collect();
        assert_eq!(exceptions.len(), 1);
        assert_eq!(exceptions[0].test_name, "test_load_raises_exception");
        assert_eq!(exceptions[0].suggested_assertions, vec!["pytest.raises"]);
    }

    #[test]
    fn method_lookup_by_qualified_name() {
        let project = setup_project(&[(
            "svc.py",
            "class Service:\n    def start(self, port: int):\n        pass\n",
        )]);
        let symbols = symbols_of(project.path(), "svc.py");
        let report = suggest_tests(
            &symbols,
            Some("Service.start"),
            None,
            Framework::Unittest,
            FrameworkSource::Explicit,
        )
        .unwrap();
        let names: Vec<&str> = report.test_suggestions.iter().map(|s| s.test_name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "test_start_basic",
                "test_start_with_none_port",
                "test_start_with_zero_port",
                "test_start_with_negative_port",
            ]
        );
        assert_eq!(report.test_suggestions[1].suggested_assertions, vec!["assertRaises"]);
    }
}
