//! Project-wide testing pattern summary.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use testlens_core::config::AnalysisPolicy;
use testlens_core::error::LensResult;

use crate::test_analysis::analyze_directory;
use crate::types::{FileFailure, Framework, SetupScope, TestSuiteAnalysis};

/// Modules whose import marks a testing framework.
const FRAMEWORK_MODULES: &[&str] = &["pytest", "unittest", "nose", "nose2"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameworkUsage {
    pub pytest: usize,
    pub unittest: usize,
    /// Both frameworks are imported or both label tests.
    pub mixed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetupPattern {
    pub method: String,
    pub class_name: Option<String>,
    pub file_path: String,
    pub framework: Framework,
    pub scope: SetupScope,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParametrizedTest {
    pub function: String,
    pub file_path: String,
    pub decorator: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnittestPatterns {
    pub test_case_classes: usize,
    pub setup_teardown_methods: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PytestPatterns {
    pub fixtures: usize,
    pub markers: usize,
    pub parametrized_tests: usize,
}

/// Response of the `get_test_patterns` operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestPatterns {
    pub directory: String,
    /// Framework modules imported anywhere in the test suite, sorted.
    pub testing_frameworks: Vec<String>,
    pub framework_usage: FrameworkUsage,
    /// Fixture name to number of definitions.
    pub common_fixtures: BTreeMap<String, usize>,
    pub fixture_scopes: BTreeMap<String, usize>,
    pub common_markers: BTreeMap<String, usize>,
    /// `style:method` to occurrences.
    pub assertion_patterns: BTreeMap<String, usize>,
    pub mock_usage_summary: BTreeMap<String, usize>,
    /// Imported modules that mention `mock`.
    pub mocking_imports: Vec<String>,
    pub setup_patterns: Vec<SetupPattern>,
    pub parametrization_patterns: Vec<ParametrizedTest>,
    pub unittest_patterns: UnittestPatterns,
    pub pytest_patterns: PytestPatterns,
    pub errors: Vec<FileFailure>,
}

fn bump(map: &mut BTreeMap<String, usize>, key: impl Into<String>) {
    *map.entry(key.into()).or_insert(0) += 1;
}

/// Summarize a test suite analysis.
pub fn summarize_patterns(analysis: &TestSuiteAnalysis) -> TestPatterns {
    let mut patterns = TestPatterns {
        directory: analysis.directory.clone(),
        errors: analysis.errors.clone(),
        ..TestPatterns::default()
    };

    let mut frameworks = BTreeSet::new();
    let mut mocking = BTreeSet::new();
    for import in analysis.imports() {
        let Some(module) = import.module.as_deref() else {
            continue;
        };
        let top = module.split('.').next().unwrap_or(module);
        if FRAMEWORK_MODULES.contains(&top) {
            frameworks.insert(top.to_string());
        } else if module.to_ascii_lowercase().contains("mock") {
            mocking.insert(module.to_string());
        }
    }

    for test in analysis.test_functions() {
        match test.framework {
            Framework::Pytest => patterns.framework_usage.pytest += 1,
            Framework::Unittest => patterns.framework_usage.unittest += 1,
        }
        for decorator in &test.function.decorators {
            if decorator.contains("parametrize") {
                patterns.parametrization_patterns.push(ParametrizedTest {
                    function: test.function.name.clone(),
                    file_path: test.file_path.clone(),
                    decorator: decorator.clone(),
                });
            }
        }
    }
    let usage = &mut patterns.framework_usage;
    usage.mixed = frameworks.len() > 1 || (usage.pytest > 0 && usage.unittest > 0);

    for fixture in analysis.fixtures() {
        bump(&mut patterns.common_fixtures, fixture.name.as_str());
        bump(&mut patterns.fixture_scopes, fixture.scope.as_str());
    }
    for marker in analysis.markers() {
        bump(&mut patterns.common_markers, marker.name.as_str());
    }

    for file in &analysis.files {
        for assertion in &file.assertions {
            bump(
                &mut patterns.assertion_patterns,
                format!("{}:{}", assertion.style.as_str(), assertion.method),
            );
        }
        for usage in &file.mock_usage {
            bump(&mut patterns.mock_usage_summary, usage.method.as_str());
        }
        for hook in &file.setup_teardown_methods {
            if hook.framework == Framework::Unittest {
                patterns.unittest_patterns.setup_teardown_methods += 1;
            }
            patterns.setup_patterns.push(SetupPattern {
                method: hook.name.clone(),
                class_name: hook.class_name.clone(),
                file_path: hook.file_path.clone(),
                framework: hook.framework,
                scope: hook.scope,
            });
        }
        patterns.unittest_patterns.test_case_classes += file
            .test_classes
            .iter()
            .filter(|c| c.framework == Framework::Unittest)
            .count();
    }

    patterns.testing_frameworks = frameworks.into_iter().collect();
    patterns.mocking_imports = mocking.into_iter().collect();
    patterns.pytest_patterns = PytestPatterns {
        fixtures: analysis.summary.fixtures,
        markers: analysis.summary.markers,
        parametrized_tests: patterns.parametrization_patterns.len(),
    };
    patterns
}

/// Analyze the test suite under `directory` and summarize its patterns.
pub fn test_patterns(
    root: &Path,
    directory: Option<&str>,
    policy: &AnalysisPolicy,
) -> LensResult<TestPatterns> {
    let analysis = analyze_directory(root, directory, policy)?;
    Ok(summarize_patterns(&analysis))
}
