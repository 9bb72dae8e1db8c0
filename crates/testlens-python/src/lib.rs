//! Python static analysis for testlens.
//!
//! Parsing goes through tree-sitter; every other stage works on the
//! resulting [`ParsedModule`]:
//!
//! - [`index`] builds the single-pass definition arena with parent links
//! - [`extract`] turns definitions into the serializable symbol model
//! - [`classify`] and [`test_analysis`] recover test semantics
//! - [`untested`] and [`suggest`] compare and generate against the model
//! - [`coverage`] reads reports produced by coverage tools

pub mod classify;
pub mod coverage;
pub mod extract;
pub mod imports;
pub mod index;
pub mod parser;
pub mod patterns;
pub mod suggest;
pub mod test_analysis;
pub mod type_hints;
pub mod types;
pub mod untested;

pub use classify::{ClassifierPolicy, FRAMEWORK_RULES};
pub use coverage::{coverage_info, CoverageReport};
pub use extract::extract_module;
pub use imports::ImportReport;
pub use parser::{parse_file, parse_source, ParsedModule};
pub use patterns::{test_patterns, TestPatterns};
pub use suggest::{resolve_framework, suggest_tests};
pub use test_analysis::{analyze_directory, analyze_module};
pub use type_hints::{type_hints, TypeHints};
pub use types::*;
pub use untested::find_untested;
