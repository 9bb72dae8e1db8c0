//! testlens: static analysis of Python code and its test suites.
//!
//! Parses Python sources without executing them and answers questions a
//! test author asks: what a module defines, which tests and fixtures exist,
//! which public code no test imports, and which test cases are worth
//! writing next.

// Core infrastructure - re-exported from testlens-core
pub use testlens_core::config;
pub use testlens_core::error;
pub use testlens_core::files;
pub use testlens_core::output;

// Language adapter
pub use testlens_python as python;

// Named operations and JSON dispatch
pub mod engine;

pub use engine::{tool_names, Engine, FileListing, ToolSpec, TOOLS};
