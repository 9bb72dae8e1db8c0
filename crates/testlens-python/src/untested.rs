//! Differ between source modules and the imports made by test files.
//!
//! A symbol counts as tested when some test file imports it by its
//! qualified name. A file counts as tested when any import reference
//! mentions its module path as a contiguous run of dotted segments.

use std::collections::BTreeSet;
use std::path::Path;

use rayon::prelude::*;
use tracing::{info, warn};

use testlens_core::config::AnalysisPolicy;
use testlens_core::error::LensResult;
use testlens_core::files::{self, resolve_path};

use crate::extract::extract_module;
use crate::parser::parse_file;
use crate::test_analysis::analyze_directory;
use crate::types::{
    FileFailure, ModuleSymbols, TestSuiteAnalysis, UntestedClass, UntestedFile, UntestedFunction,
    UntestedReport, UntestedSummary,
};

/// Test directory used when none is given.
pub const DEFAULT_TEST_DIR: &str = "tests";

// ============================================================================
// Module Paths
// ============================================================================

/// Dotted module path of a relative file path: `pkg/__init__.py` gives `pkg`.
pub fn module_path(rel: &str) -> String {
    let trimmed = rel.trim_start_matches("./");
    let stem = match trimmed.rfind('.') {
        Some(dot) if !trimmed[dot..].contains('/') => &trimmed[..dot],
        _ => trimmed,
    };
    let mut segments: Vec<&str> = stem.split('/').filter(|s| !s.is_empty()).collect();
    if segments.len() > 1 && segments.last() == Some(&"__init__") {
        segments.pop();
    }
    segments.join(".")
}

/// Every module path a source file may be imported as.
fn candidate_modules(rel: &str, source_dir: Option<&str>) -> Vec<String> {
    let mut candidates = vec![module_path(rel)];
    let source_dir = source_dir
        .map(|d| d.trim_matches('/'))
        .filter(|d| !d.is_empty() && *d != ".");
    if let Some(dir) = source_dir {
        if let Some(inner) = rel.strip_prefix(dir).and_then(|r| r.strip_prefix('/')) {
            candidates.push(module_path(inner));
        }
    }
    let stripped: Vec<String> = candidates
        .iter()
        .filter_map(|m| m.strip_prefix("src.").map(str::to_string))
        .collect();
    for module in stripped {
        candidates.push(module);
    }

    let mut seen = BTreeSet::new();
    candidates.retain(|m| !m.is_empty() && seen.insert(m.clone()));
    candidates
}

/// Whether `module` appears in `reference` as whole consecutive segments.
pub fn mentions_module(reference: &str, module: &str) -> bool {
    let haystack: Vec<&str> = reference.split('.').collect();
    let needle: Vec<&str> = module.split('.').collect();
    needle.len() <= haystack.len() && haystack.windows(needle.len()).any(|w| w == needle.as_slice())
}

/// Import references made by every analyzed test file.
pub fn tested_references(analysis: &TestSuiteAnalysis) -> BTreeSet<String> {
    analysis.imports().filter_map(|i| i.reference()).collect()
}

// ============================================================================
// Differ
// ============================================================================

/// Compare one source module against the reference set.
fn diff_module(
    rel: &str,
    symbols: &ModuleSymbols,
    modules: &[String],
    references: &BTreeSet<String>,
    report: &mut UntestedReport,
) {
    let display = modules
        .iter()
        .min_by_key(|m| m.split('.').count())
        .cloned()
        .unwrap_or_default();
    let is_referenced = |name: &str| {
        modules
            .iter()
            .any(|m| references.contains(&format!("{}.{}", m, name)))
    };

    let functions: Vec<_> = symbols
        .functions
        .iter()
        .filter(|f| f.is_module_level() && f.is_public())
        .collect();
    let classes: Vec<_> = symbols
        .classes
        .iter()
        .filter(|c| c.is_module_level() && c.is_public())
        .collect();

    let file_tested = references
        .iter()
        .any(|r| modules.iter().any(|m| mentions_module(r, m)));
    let has_public = !functions.is_empty() || !classes.is_empty();
    if !file_tested && has_public {
        report.untested_files.push(UntestedFile {
            file_path: rel.to_string(),
            module: display.clone(),
            functions: functions.len(),
            classes: classes.len(),
        });
    }

    for function in functions {
        if !is_referenced(&function.name) {
            report.untested_functions.push(UntestedFunction {
                name: function.name.clone(),
                file_path: rel.to_string(),
                module: display.clone(),
                line_number: function.line_number,
                docstring: function.docstring.clone(),
                parameters: function.parameters.len(),
            });
        }
    }
    for class in classes {
        if !is_referenced(&class.name) {
            report.untested_classes.push(UntestedClass {
                name: class.name.clone(),
                file_path: rel.to_string(),
                module: display.clone(),
                line_number: class.line_number,
                docstring: class.docstring.clone(),
                methods: class.methods.len(),
                public_methods: class.public_methods().count(),
            });
        }
    }
}

fn is_source_file(rel: &str, policy: &AnalysisPolicy) -> bool {
    let path = Path::new(rel);
    let is_conftest = path.file_name().is_some_and(|n| n == "conftest.py");
    !is_conftest && !policy.is_test_file(path)
}

/// Find public module-level functions and classes no test file imports.
///
/// `source_dir` defaults to the project root. `test_dir` defaults to
/// `tests`, or the project root when that directory does not exist.
pub fn find_untested(
    root: &Path,
    source_dir: Option<&str>,
    test_dir: Option<&str>,
    policy: &AnalysisPolicy,
) -> LensResult<UntestedReport> {
    let sources: Vec<String> = files::python_source_paths(root, source_dir, policy)?
        .into_iter()
        .filter(|rel| is_source_file(rel, policy))
        .collect();

    let test_dir = match test_dir {
        Some(dir) => Some(dir),
        None if resolve_path(root, DEFAULT_TEST_DIR).is_dir() => Some(DEFAULT_TEST_DIR),
        None => None,
    };
    let tests = analyze_directory(root, test_dir, policy)?;
    let references = tested_references(&tests);

    let parsed: Vec<(String, LensResult<ModuleSymbols>)> = sources
        .par_iter()
        .map(|rel| {
            let symbols = parse_file(root, rel, policy).map(|m| extract_module(&m));
            (rel.clone(), symbols)
        })
        .collect();

    let mut report = UntestedReport {
        untested_functions: Vec::new(),
        untested_classes: Vec::new(),
        untested_files: Vec::new(),
        errors: Vec::new(),
        summary: UntestedSummary::default(),
    };
    for (rel, result) in parsed {
        match result {
            Ok(symbols) => {
                let modules = candidate_modules(&rel, source_dir);
                diff_module(&rel, &symbols, &modules, &references, &mut report);
            }
            Err(err) => {
                warn!(path = %rel, error = %err, "skipping source file");
                report.errors.push(FileFailure::new(rel, &err));
            }
        }
    }

    report.summary = UntestedSummary {
        total_source_files: sources.len(),
        total_test_files: tests.total_test_files,
        tested_references: references.len(),
        untested_functions: report.untested_functions.len(),
        untested_classes: report.untested_classes.len(),
        untested_files: report.untested_files.len(),
        files_with_errors: report.errors.len(),
    };
    info!(
        sources = report.summary.total_source_files,
        untested_functions = report.summary.untested_functions,
        untested_classes = report.summary.untested_classes,
        "untested code scan complete"
    );
    Ok(report)
}
