//! Engine tests through the JSON tool interface.
//!
//! Each test writes a small Python project into a temp directory and drives
//! it with [`Engine::call`], checking the rendered JSON the CLI would print.

use serde_json::{json, Value};
use tempfile::TempDir;
use testlens::output::is_error_value;
use testlens::Engine;

const CALC: &str = r#""""Arithmetic helpers."""

import os
from typing import Optional


def add(a: int, b: int) -> int:
    """Add two numbers."""
    return a + b


def divide(a: float, b: float) -> float:
    """Divide a by b.

    Raises ZeroDivisionError when b is zero.
    """
    return a / b


def _private():
    pass


class Calculator:
    """Stateful calculator."""

    def __init__(self, start: Optional[int] = None):
        self.value = start or 0

    def push(self, amount: int) -> None:
        self.value += amount
"#;

const TEST_CALC: &str = r#"import pytest
from calc import add


@pytest.fixture
def numbers():
    return (1, 2)


@pytest.mark.parametrize("a,b", [(1, 2), (3, 4)])
def test_add(a, b):
    assert add(a, b) == a + b


def test_add_fixture(numbers):
    assert add(*numbers) == 3
"#;

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

fn project() -> (TempDir, Engine) {
    let dir = setup_project(&[("calc.py", CALC), ("tests/test_calc.py", TEST_CALC)]);
    let engine = Engine::for_root(dir.path());
    (dir, engine)
}

fn names(value: &Value, field: &str) -> Vec<String> {
    value[field]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item["name"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

// ============================================================================
// Symbols
// ============================================================================

#[test]
fn parse_module_lists_definitions() {
    let (_dir, engine) = project();
    let value = engine.call("parse_module", &json!({ "file_path": "calc.py" }));
    assert!(!is_error_value(&value), "{}", value);
    assert_eq!(names(&value, "functions"), vec!["add", "divide", "_private"]);
    assert_eq!(names(&value, "classes"), vec!["Calculator"]);
}

#[test]
fn class_details_include_methods() {
    let (_dir, engine) = project();
    let value = engine.call(
        "get_class_details",
        &json!({ "file_path": "calc.py", "class_name": "Calculator" }),
    );
    assert_eq!(value["name"], "Calculator");
    assert_eq!(names(&value, "methods"), vec!["__init__", "push"]);
}

#[test]
fn imports_are_categorized() {
    let (_dir, engine) = project();
    let value = engine.call("find_imports", &json!({ "file_path": "tests/test_calc.py" }));
    assert_eq!(value["count"], 2);
    assert_eq!(value["third_party"], json!(["pytest"]));
    assert_eq!(value["local"], json!(["calc"]));

    let value = engine.call("find_imports", &json!({ "file_path": "calc.py" }));
    assert_eq!(value["standard_library"], json!(["os", "typing"]));
}

#[test]
fn missing_file_is_not_found() {
    let (_dir, engine) = project();
    let value = engine.call("parse_module", &json!({ "file_path": "nope.py" }));
    assert_eq!(value["kind"], "not_found");
    assert_eq!(value["code"], 3);
}

// ============================================================================
// Test Semantics
// ============================================================================

#[test]
fn untested_code_skips_imported_symbols() {
    let (_dir, engine) = project();
    let value = engine.call("find_untested_code", &Value::Null);
    assert!(!is_error_value(&value), "{}", value);
    let untested: Vec<&str> = value["untested_functions"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|f| f["name"].as_str())
        .collect();
    assert_eq!(untested, vec!["divide"]);
    let classes: Vec<&str> = value["untested_classes"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|c| c["name"].as_str())
        .collect();
    assert_eq!(classes, vec!["Calculator"]);
}

#[test]
fn suggestions_detect_project_framework() {
    let (_dir, engine) = project();
    let value = engine.call(
        "suggest_test_cases",
        &json!({ "file_path": "calc.py", "function_name": "divide" }),
    );
    assert_eq!(value["framework"], "pytest");
    assert_eq!(value["framework_source"], "detected");
    let types: Vec<&str> = value["test_suggestions"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|s| s["test_type"].as_str())
        .collect();
    assert!(types.contains(&"exception"));
    assert!(types.contains(&"type_check"));
}

#[test]
fn invalid_framework_is_rejected() {
    let (_dir, engine) = project();
    let value = engine.call(
        "suggest_test_cases",
        &json!({ "file_path": "calc.py", "framework": "nose" }),
    );
    assert_eq!(value["kind"], "invalid_arguments");
    assert_eq!(value["code"], 2);
}

// ============================================================================
// Files and Coverage
// ============================================================================

#[test]
fn coverage_report_is_probed() {
    let dir = setup_project(&[
        ("calc.py", CALC),
        (
            "lcov.info",
            "SF:calc.py\nDA:1,1\nDA:2,1\nDA:3,0\nDA:4,1\nend_of_record\n",
        ),
    ]);
    let engine = Engine::for_root(dir.path());
    let value = engine.call("get_test_coverage_info", &json!({}));
    assert!(!is_error_value(&value), "{}", value);
    assert_eq!(value["format"], "lcov");
    assert_eq!(value["summary"]["total_lines"], 4);
    assert_eq!(value["summary"]["covered_lines"], 3);
    assert_eq!(value["coverage_gaps"][0]["uncovered_lines"], json!([3]));
}

#[test]
fn missing_coverage_is_not_found() {
    let (_dir, engine) = project();
    let value = engine.call("get_test_coverage_info", &json!({}));
    assert_eq!(value["kind"], "not_found");
}

#[test]
fn unknown_argument_is_invalid() {
    let (_dir, engine) = project();
    let value = engine.call(
        "read_file",
        &json!({ "file_path": "calc.py", "max_bytes": 10 }),
    );
    assert_eq!(value["kind"], "invalid_arguments");
    assert_eq!(value["details"]["tool"], "read_file");
}
