//! Engine configuration and the immutable traversal policy.
//!
//! Configuration is layered:
//!
//! 1. Built-in defaults (`EngineConfig::default`)
//! 2. An optional `testlens.toml` in the project root, or an explicit file
//! 3. Environment overrides (`TESTLENS_DEBUG`, `TESTLENS_LOG_LEVEL`,
//!    `TESTLENS_MAX_FILE_SIZE`)
//!
//! Traversals never read `EngineConfig` directly. They receive an
//! [`AnalysisPolicy`] built once from it with [`EngineConfig::policy`].

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// File name probed in the project root when no explicit config is given.
pub const CONFIG_FILE_NAME: &str = "testlens.toml";

/// Default byte ceiling for reading a single file (1 MiB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 1024 * 1024;

/// Default depth ceiling for directory-structure listings.
pub const DEFAULT_MAX_DIRECTORY_DEPTH: usize = 3;

/// Default depth ceiling for recursive file discovery.
pub const DEFAULT_MAX_WALK_DEPTH: usize = 64;

/// Directories skipped by every traversal.
pub const DEFAULT_IGNORE_DIRS: &[&str] = &[
    ".git",
    ".venv",
    "venv",
    "env",
    "__pycache__",
    ".pytest_cache",
    "node_modules",
    ".tox",
    "build",
    "dist",
    ".eggs",
    ".coverage",
    ".mypy_cache",
    ".ruff_cache",
];

/// File names skipped by every traversal.
pub const DEFAULT_IGNORE_FILES: &[&str] = &[
    ".DS_Store",
    ".gitignore",
    ".gitmodules",
    "Thumbs.db",
    ".coverage",
    ".coveragerc",
    ".python-version",
];

pub const DEFAULT_PYTHON_EXTENSIONS: &[&str] = &[".py", ".pyi"];

pub const DEFAULT_TEXT_EXTENSIONS: &[&str] = &[
    ".py", ".pyi", ".txt", ".md", ".rst", ".yaml", ".yml", ".json", ".toml", ".cfg", ".ini",
];

// ============================================================================
// Error Types
// ============================================================================

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read.
    #[error("cannot read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    /// Config file is not valid TOML for `EngineConfig`.
    #[error("invalid config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

// ============================================================================
// EngineConfig
// ============================================================================

/// Engine configuration.
///
/// Every field has a default, so a config file only needs the keys it
/// overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Project root all request paths are relative to. Never read from file.
    #[serde(skip)]
    pub project_root: PathBuf,
    pub max_file_size: u64,
    pub max_directory_depth: usize,
    pub max_walk_depth: usize,
    pub python_extensions: Vec<String>,
    pub text_extensions: Vec<String>,
    pub ignore_dirs: Vec<String>,
    pub ignore_files: Vec<String>,
    /// Treat `test_*` functions with more than one parameter as pytest.
    pub fixture_injection_heuristic: bool,
    pub log_level: String,
    pub debug: bool,
}

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            project_root: PathBuf::from("."),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            max_directory_depth: DEFAULT_MAX_DIRECTORY_DEPTH,
            max_walk_depth: DEFAULT_MAX_WALK_DEPTH,
            python_extensions: owned(DEFAULT_PYTHON_EXTENSIONS),
            text_extensions: owned(DEFAULT_TEXT_EXTENSIONS),
            ignore_dirs: owned(DEFAULT_IGNORE_DIRS),
            ignore_files: owned(DEFAULT_IGNORE_FILES),
            fixture_injection_heuristic: true,
            log_level: "info".to_string(),
            debug: false,
        }
    }
}

impl EngineConfig {
    /// Defaults bound to a project root.
    pub fn for_root(root: impl Into<PathBuf>) -> Self {
        EngineConfig {
            project_root: root.into(),
            ..EngineConfig::default()
        }
    }

    /// Parse a config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Load the layered configuration for `root`.
    ///
    /// `explicit` replaces the probe for `testlens.toml`. Environment
    /// overrides are applied last.
    pub fn load(root: &Path, explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match explicit {
            Some(path) => EngineConfig::from_file(path)?,
            None => {
                let probe = root.join(CONFIG_FILE_NAME);
                if probe.is_file() {
                    debug!(path = %probe.display(), "loading config file");
                    EngineConfig::from_file(&probe)?
                } else {
                    EngineConfig::default()
                }
            }
        };
        config.project_root = root.to_path_buf();
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply environment overrides through `lookup`.
    ///
    /// Unparseable values leave the current setting untouched.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("TESTLENS_DEBUG") {
            if let Some(flag) = parse_bool(&value) {
                self.debug = flag;
            }
        }
        if let Some(level) = lookup("TESTLENS_LOG_LEVEL") {
            let level = level.trim();
            if !level.is_empty() {
                self.log_level = level.to_ascii_lowercase();
            }
        }
        if let Some(size) = lookup("TESTLENS_MAX_FILE_SIZE") {
            if let Ok(size) = size.trim().parse::<u64>() {
                self.max_file_size = size;
            }
        }
    }

    /// Effective log filter directive: `debug` forces debug level.
    pub fn log_filter(&self) -> String {
        if self.debug {
            "debug".to_string()
        } else {
            self.log_level.clone()
        }
    }

    /// Build the immutable traversal policy.
    pub fn policy(&self) -> AnalysisPolicy {
        AnalysisPolicy {
            python_extensions: normalize_extensions(&self.python_extensions),
            text_extensions: normalize_extensions(&self.text_extensions),
            ignore_dirs: self.ignore_dirs.iter().cloned().collect(),
            ignore_files: self.ignore_files.iter().cloned().collect(),
            max_file_size: self.max_file_size,
            max_walk_depth: self.max_walk_depth,
            max_directory_depth: self.max_directory_depth,
            fixture_injection_heuristic: self.fixture_injection_heuristic,
        }
    }
}

fn normalize_extensions(exts: &[String]) -> BTreeSet<String> {
    exts.iter()
        .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
        .collect()
}

/// Tolerant boolean parsing for environment values.
///
/// Returns `None` for anything that is neither truthy nor falsy.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" | "enabled" => Some(true),
        "false" | "0" | "no" | "off" | "disabled" | "" => Some(false),
        _ => None,
    }
}

// ============================================================================
// AnalysisPolicy
// ============================================================================

/// Immutable ignore/extension/ceiling policy shared by all traversals.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisPolicy {
    python_extensions: BTreeSet<String>,
    text_extensions: BTreeSet<String>,
    ignore_dirs: BTreeSet<String>,
    ignore_files: BTreeSet<String>,
    max_file_size: u64,
    max_walk_depth: usize,
    max_directory_depth: usize,
    fixture_injection_heuristic: bool,
}

impl Default for AnalysisPolicy {
    fn default() -> Self {
        EngineConfig::default().policy()
    }
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
}

impl AnalysisPolicy {
    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    pub fn max_walk_depth(&self) -> usize {
        self.max_walk_depth
    }

    pub fn max_directory_depth(&self) -> usize {
        self.max_directory_depth
    }

    pub fn fixture_injection_heuristic(&self) -> bool {
        self.fixture_injection_heuristic
    }

    pub fn is_python_file(&self, path: &Path) -> bool {
        extension_of(path).is_some_and(|ext| self.python_extensions.contains(&ext))
    }

    pub fn is_text_file(&self, path: &Path) -> bool {
        extension_of(path).is_some_and(|ext| self.text_extensions.contains(&ext))
    }

    /// Whether a single directory name is excluded from traversal.
    pub fn is_ignored_dir_name(&self, name: &str) -> bool {
        self.ignore_dirs.contains(name) || is_hidden(name)
    }

    /// Whether a project-relative path is excluded.
    ///
    /// Hidden components (other than `.` and `..`) and ignored directory
    /// names exclude everything beneath them; ignored file names exclude the
    /// file itself.
    pub fn is_ignored_path(&self, rel_path: &Path) -> bool {
        for component in rel_path.components() {
            if let Component::Normal(name) = component {
                let name = name.to_string_lossy();
                if self.ignore_dirs.contains(name.as_ref()) || is_hidden(&name) {
                    return true;
                }
            }
        }
        rel_path
            .file_name()
            .is_some_and(|name| self.ignore_files.contains(name.to_string_lossy().as_ref()))
    }

    /// Whether a project-relative path follows a test-file convention.
    ///
    /// A directory component starting with `test`, or a file named
    /// `test_*.py`, `*_test.py`, `test.py` or `tests.py`.
    pub fn is_test_file(&self, rel_path: &Path) -> bool {
        let mut components: Vec<String> = rel_path
            .components()
            .filter_map(|c| match c {
                Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();
        let Some(file_name) = components.pop() else {
            return false;
        };
        if components.iter().any(|dir| dir.starts_with("test")) {
            return true;
        }
        is_test_file_name(&file_name)
    }
}

fn is_hidden(name: &str) -> bool {
    name.starts_with('.') && name != "." && name != ".."
}

/// File-name half of the test-file convention.
pub fn is_test_file_name(name: &str) -> bool {
    (name.starts_with("test_") && name.ends_with(".py"))
        || name.ends_with("_test.py")
        || name == "test.py"
        || name == "tests.py"
}

// ============================================================================
// Tests
// ============================================================================
