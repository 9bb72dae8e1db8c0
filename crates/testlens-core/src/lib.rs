//! Core infrastructure for testlens.
//!
//! This crate provides language-agnostic infrastructure:
//! - Error types and output error codes
//! - Engine configuration and the immutable traversal policy
//! - Project file discovery and bounded file reads
//! - JSON rendering of results and errors

pub mod config;
pub mod error;
pub mod files;
pub mod output;

pub use config::{AnalysisPolicy, EngineConfig};
pub use error::{LensError, LensResult, OutputErrorCode};
