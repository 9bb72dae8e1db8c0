//! Project file discovery and bounded file reads.
//!
//! Every traversal takes an [`AnalysisPolicy`] and returns project-relative
//! paths with `/` separators, sorted so that downstream batch analysis is
//! independent of file-system enumeration order.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

use crate::config::AnalysisPolicy;

/// File-name patterns that identify test modules during discovery.
pub const TEST_FILE_PATTERNS: &[&str] = &["test_*.py", "*_test.py", "tests.py", "conftest.py"];

// ============================================================================
// Error Types
// ============================================================================

/// Error type for file operations.
#[derive(Debug, Error)]
pub enum FileError {
    /// File or directory not found.
    #[error("file not found: {path}")]
    NotFound { path: String },

    /// Expected a file, found something else.
    #[error("not a file: {path}")]
    NotAFile { path: String },

    /// Expected a directory, found something else.
    #[error("not a directory: {path}")]
    NotADirectory { path: String },

    /// Extension is not one of the policy's Python extensions.
    #[error("not a Python source file: {path}")]
    NotSourceFile { path: String },

    #[error("permission denied: {path}")]
    PermissionDenied { path: String },

    /// Bytes did not survive a lossy UTF-8 decode as text.
    #[error("cannot decode {path} as text")]
    Undecodable { path: String },

    /// IO error.
    #[error("IO error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

/// Result type for file operations.
pub type FileResult<T> = Result<T, FileError>;

impl FileError {
    fn from_io(path: &str, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => FileError::NotFound {
                path: path.to_string(),
            },
            io::ErrorKind::PermissionDenied => FileError::PermissionDenied {
                path: path.to_string(),
            },
            _ => FileError::Io {
                path: path.to_string(),
                source: err,
            },
        }
    }
}

// ============================================================================
// Path Helpers
// ============================================================================

/// Join a project-relative path onto the root. Empty and `.` mean the root.
pub fn resolve_path(root: &Path, rel: &str) -> PathBuf {
    let trimmed = rel.trim();
    if trimmed.is_empty() || trimmed == "." {
        root.to_path_buf()
    } else {
        root.join(trimmed)
    }
}

/// Render a path relative to `root` with `/` separators.
pub fn relative_display(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    let text = rel.to_string_lossy().replace('\\', "/");
    if text.is_empty() {
        ".".to_string()
    } else {
        text
    }
}

/// Resolve an optional project-relative directory, checking it exists.
pub fn resolve_directory(root: &Path, directory: Option<&str>) -> FileResult<PathBuf> {
    let rel = directory.unwrap_or(".");
    let path = resolve_path(root, rel);
    if !path.exists() {
        return Err(FileError::NotFound {
            path: rel.to_string(),
        });
    }
    if !path.is_dir() {
        return Err(FileError::NotADirectory {
            path: rel.to_string(),
        });
    }
    Ok(path)
}

/// Simple glob matching supporting a single `*` wildcard.
///
/// Examples: `test_*.py`, `*_test.py`
pub fn matches_simple_glob(text: &str, pattern: &str) -> bool {
    if let Some(star_pos) = pattern.find('*') {
        let prefix = &pattern[..star_pos];
        let suffix = &pattern[star_pos + 1..];
        text.len() >= prefix.len() + suffix.len()
            && text.starts_with(prefix)
            && text.ends_with(suffix)
    } else {
        text == pattern
    }
}

/// Whether a file name matches one of [`TEST_FILE_PATTERNS`].
pub fn is_test_module_name(name: &str) -> bool {
    TEST_FILE_PATTERNS
        .iter()
        .any(|pattern| matches_simple_glob(name, pattern))
}

// ============================================================================
// Discovery
// ============================================================================

/// One discovered file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Project-relative path.
    pub path: String,
    pub name: String,
    pub size: u64,
    /// Last modification time, RFC 3339.
    pub modified: Option<String>,
}

impl FileEntry {
    fn from_path(root: &Path, path: &Path) -> Self {
        let metadata = fs::metadata(path).ok();
        FileEntry {
            path: relative_display(root, path),
            name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            size: metadata.as_ref().map(|m| m.len()).unwrap_or(0),
            modified: metadata
                .and_then(|m| m.modified().ok())
                .map(|t| DateTime::<Utc>::from(t).to_rfc3339()),
        }
    }
}

/// Walk `base` and collect files accepted by `accept`, sorted by path.
///
/// Ignore rules are evaluated relative to `base`, so explicitly requesting a
/// directory the policy would otherwise skip still works.
fn walk_files<F>(root: &Path, base: &Path, policy: &AnalysisPolicy, accept: F) -> Vec<PathBuf>
where
    F: Fn(&Path) -> bool,
{
    let mut files = Vec::new();

    let walker = WalkDir::new(base)
        .follow_links(false)
        .max_depth(policy.max_walk_depth())
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0
                || !entry.file_type().is_dir()
                || !policy.is_ignored_dir_name(&entry.file_name().to_string_lossy())
        });

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                debug!(error = %err, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let rel_to_base = path.strip_prefix(base).unwrap_or(path);
        if policy.is_ignored_path(rel_to_base) || !accept(path) {
            continue;
        }
        files.push(path.to_path_buf());
    }

    // Sort by project-relative path so batch results are deterministic.
    files.sort_by_key(|p| relative_display(root, p));
    files
}

/// Project-relative paths of all Python source files under `directory`.
pub fn python_source_paths(
    root: &Path,
    directory: Option<&str>,
    policy: &AnalysisPolicy,
) -> FileResult<Vec<String>> {
    let base = resolve_directory(root, directory)?;
    Ok(walk_files(root, &base, policy, |p| policy.is_python_file(p))
        .iter()
        .map(|p| relative_display(root, p))
        .collect())
}

/// Project-relative paths of test modules under `directory`.
pub fn test_file_paths(
    root: &Path,
    directory: Option<&str>,
    policy: &AnalysisPolicy,
) -> FileResult<Vec<String>> {
    let base = resolve_directory(root, directory)?;
    let files = walk_files(root, &base, policy, |p| {
        p.file_name()
            .is_some_and(|n| is_test_module_name(&n.to_string_lossy()))
    });
    Ok(files.iter().map(|p| relative_display(root, p)).collect())
}

/// Python files with metadata, sorted by path.
pub fn find_python_files(
    root: &Path,
    directory: Option<&str>,
    policy: &AnalysisPolicy,
) -> FileResult<Vec<FileEntry>> {
    let base = resolve_directory(root, directory)?;
    Ok(walk_files(root, &base, policy, |p| policy.is_python_file(p))
        .iter()
        .map(|p| FileEntry::from_path(root, p))
        .collect())
}

/// Test modules with metadata, sorted by path.
pub fn find_test_files(
    root: &Path,
    directory: Option<&str>,
    policy: &AnalysisPolicy,
) -> FileResult<Vec<FileEntry>> {
    let base = resolve_directory(root, directory)?;
    let files = walk_files(root, &base, policy, |p| {
        p.file_name()
            .is_some_and(|n| is_test_module_name(&n.to_string_lossy()))
    });
    Ok(files.iter().map(|p| FileEntry::from_path(root, p)).collect())
}

// ============================================================================
// Bounded Reads
// ============================================================================

/// Decoded file content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceText {
    /// Project-relative path as requested.
    pub path: String,
    pub content: String,
    /// Size of the file on disk, in bytes.
    pub size: u64,
    /// Whether `content` was cut at the byte ceiling.
    pub truncated: bool,
}

/// Cut point for a buffer that hit the ceiling.
///
/// Backs up to the last newline when it lies in the final tenth of the
/// ceiling, so a truncated file does not end mid-line.
fn truncation_point(buf: &[u8], max_size: u64) -> usize {
    let threshold = max_size.saturating_mul(9) / 10;
    match buf.iter().rposition(|&b| b == b'\n') {
        Some(pos) if pos as u64 > threshold => pos + 1,
        _ => buf.len(),
    }
}

fn decode(path: &str, mut bytes: Vec<u8>) -> FileResult<String> {
    if bytes.starts_with(&[0xEF, 0xBB, 0xBF]) {
        bytes.drain(..3);
    }
    let text = match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(err) => String::from_utf8_lossy(err.as_bytes()).into_owned(),
    };
    if text.contains('\0') {
        return Err(FileError::Undecodable {
            path: path.to_string(),
        });
    }
    Ok(text)
}

/// Read a project-relative file, at most `max_size` bytes.
pub fn read_text(root: &Path, rel: &str, max_size: u64) -> FileResult<SourceText> {
    let full = resolve_path(root, rel);
    let metadata = fs::metadata(&full).map_err(|e| FileError::from_io(rel, e))?;
    if !metadata.is_file() {
        return Err(FileError::NotAFile {
            path: rel.to_string(),
        });
    }
    let size = metadata.len();

    let file = File::open(&full).map_err(|e| FileError::from_io(rel, e))?;
    let mut buf = Vec::with_capacity(size.min(max_size) as usize);
    file.take(max_size)
        .read_to_end(&mut buf)
        .map_err(|e| FileError::from_io(rel, e))?;

    let truncated = size > max_size;
    if truncated {
        let cut = truncation_point(&buf, max_size);
        buf.truncate(cut);
        debug!(path = rel, size, max_size, "file truncated at byte ceiling");
    }

    Ok(SourceText {
        path: rel.to_string(),
        content: decode(rel, buf)?,
        size,
        truncated,
    })
}

/// Read a Python source file under the policy's byte ceiling.
///
/// Missing files report `NotFound` before the extension is checked.
pub fn read_source(root: &Path, rel: &str, policy: &AnalysisPolicy) -> FileResult<SourceText> {
    let full = resolve_path(root, rel);
    if !full.exists() {
        return Err(FileError::NotFound {
            path: rel.to_string(),
        });
    }
    if !policy.is_python_file(&full) {
        return Err(FileError::NotSourceFile {
            path: rel.to_string(),
        });
    }
    read_text(root, rel, policy.max_file_size())
}

/// Response of the `read_file` operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileContent {
    pub path: String,
    pub content: String,
    pub size: u64,
    pub lines: usize,
    pub is_python: bool,
    pub is_text: bool,
    pub truncated: bool,
}

/// Read any text file, honoring an optional ceiling override.
pub fn read_file(
    root: &Path,
    rel: &str,
    max_size: Option<u64>,
    policy: &AnalysisPolicy,
) -> FileResult<FileContent> {
    let limit = max_size.unwrap_or_else(|| policy.max_file_size());
    let source = read_text(root, rel, limit)?;
    let path = Path::new(rel);
    Ok(FileContent {
        lines: source.content.lines().count(),
        is_python: policy.is_python_file(path),
        is_text: policy.is_text_file(path),
        path: source.path,
        content: source.content,
        size: source.size,
        truncated: source.truncated,
    })
}

// ============================================================================
// Directory Structure
// ============================================================================

/// Node of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryNode {
    pub name: String,
    pub path: String,
    /// `directory` or `file`.
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_python: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<DirectoryNode>>,
    /// Set when the directory could not be listed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_denied: Option<bool>,
    /// Set when the depth ceiling stopped the listing here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub truncated: Option<bool>,
}

/// List `directory` as a tree, at most `max_depth` levels deep.
///
/// `max_depth` is clamped to the policy's directory depth ceiling.
pub fn directory_structure(
    root: &Path,
    directory: Option<&str>,
    max_depth: Option<usize>,
    policy: &AnalysisPolicy,
) -> FileResult<DirectoryNode> {
    let base = resolve_directory(root, directory)?;
    let depth = max_depth
        .unwrap_or(policy.max_directory_depth())
        .min(policy.max_directory_depth());
    Ok(list_directory(root, &base, depth, policy))
}

fn list_directory(root: &Path, dir: &Path, remaining: usize, policy: &AnalysisPolicy) -> DirectoryNode {
    let mut node = DirectoryNode {
        name: dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| ".".to_string()),
        path: relative_display(root, dir),
        kind: "directory".to_string(),
        size: None,
        is_python: None,
        children: None,
        access_denied: None,
        truncated: None,
    };

    if remaining == 0 {
        node.truncated = Some(true);
        return node;
    }

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            debug!(path = %dir.display(), error = %err, "cannot list directory");
            node.access_denied = Some(true);
            return node;
        }
    };

    let mut paths: Vec<PathBuf> = entries.filter_map(|e| e.ok()).map(|e| e.path()).collect();
    paths.sort();

    let mut children = Vec::new();
    for path in paths {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if path.is_dir() {
            if policy.is_ignored_dir_name(&name) {
                continue;
            }
            children.push(list_directory(root, &path, remaining - 1, policy));
        } else {
            if policy.is_ignored_path(Path::new(&name)) {
                continue;
            }
            children.push(DirectoryNode {
                size: fs::metadata(&path).ok().map(|m| m.len()),
                is_python: Some(policy.is_python_file(&path)),
                path: relative_display(root, &path),
                name,
                kind: "file".to_string(),
                children: None,
                access_denied: None,
                truncated: None,
            });
        }
    }
    node.children = Some(children);
    node
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::TempDir;

    fn write(dir: &Path, rel: &str, content: &[u8]) {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        File::create(path).unwrap().write_all(content).unwrap();
    }

    fn create_test_project() -> TempDir {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "src/pkg/main.py", b"def main():\n    pass\n");
        write(dir.path(), "src/pkg/utils.py", b"def helper():\n    return 42\n");
        write(dir.path(), "src/pkg/stub.pyi", b"def helper() -> int: ...\n");
        write(dir.path(), "tests/test_main.py", b"def test_main():\n    pass\n");
        write(dir.path(), "tests/conftest.py", b"import pytest\n");
        write(dir.path(), "tests/helpers.py", b"X = 1\n");
        write(dir.path(), "__pycache__/main.cpython-311.py", b"compiled");
        write(dir.path(), ".hidden/secret.py", b"# hidden");
        write(dir.path(), "venv/lib/site.py", b"# venv");
        write(dir.path(), "README.md", b"# readme\n");
        dir
    }

    #[test]
    fn python_paths_are_sorted_and_filtered() {
        let project = create_test_project();
        let policy = AnalysisPolicy::default();
        let paths = python_source_paths(project.path(), None, &policy).unwrap();
        assert_eq!(
            paths,
            vec![
                "src/pkg/main.py",
                "src/pkg/stub.pyi",
                "src/pkg/utils.py",
                "tests/conftest.py",
                "tests/helpers.py",
                "tests/test_main.py",
            ]
        );
    }

    #[test]
    fn test_paths_match_patterns() {
        let project = create_test_project();
        let policy = AnalysisPolicy::default();
        let paths = test_file_paths(project.path(), Some("tests"), &policy).unwrap();
        assert_eq!(paths, vec!["tests/conftest.py", "tests/test_main.py"]);
    }

    #[test]
    fn missing_directory_is_not_found() {
        let project = create_test_project();
        let policy = AnalysisPolicy::default();
        let err = python_source_paths(project.path(), Some("nope"), &policy).unwrap_err();
        assert!(matches!(err, FileError::NotFound { .. }));
    }

    #[test]
    fn file_as_directory_is_rejected() {
        let project = create_test_project();
        let policy = AnalysisPolicy::default();
        let err = find_python_files(project.path(), Some("README.md"), &policy).unwrap_err();
        assert!(matches!(err, FileError::NotADirectory { .. }));
    }

    #[test]
    fn find_python_files_reports_metadata() {
        let project = create_test_project();
        let policy = AnalysisPolicy::default();
        let files = find_python_files(project.path(), Some("src"), &policy).unwrap();
        assert_eq!(files.len(), 3);
        assert_eq!(files[0].name, "main.py");
        assert_eq!(files[0].size, 21);
        assert!(files[0].modified.is_some());
    }

    #[test]
    fn read_source_rejects_non_python() {
        let project = create_test_project();
        let policy = AnalysisPolicy::default();
        let err = read_source(project.path(), "README.md", &policy).unwrap_err();
        assert!(matches!(err, FileError::NotSourceFile { .. }));
        let err = read_source(project.path(), "missing.md", &policy).unwrap_err();
        assert!(matches!(err, FileError::NotFound { .. }));
    }

    #[test]
    fn read_text_backs_up_to_newline() {
        let dir = TempDir::new().unwrap();
        // 95 bytes of lines, then a long tail with no newline.
        let mut content = Vec::new();
        for _ in 0..19 {
            content.extend_from_slice(b"abcd\n");
        }
        content.extend_from_slice(&[b'x'; 50]);
        write(dir.path(), "big.py", &content);

        let source = read_text(dir.path(), "big.py", 100).unwrap();
        assert!(source.truncated);
        assert_eq!(source.content.len(), 95);
        assert!(source.content.ends_with('\n'));
        assert_eq!(source.size, 145);
    }

    #[test]
    fn read_text_keeps_raw_cut_when_newline_is_early() {
        let dir = TempDir::new().unwrap();
        let mut content = b"short\n".to_vec();
        content.extend_from_slice(&[b'y'; 200]);
        write(dir.path(), "wide.py", &content);

        let source = read_text(dir.path(), "wide.py", 100).unwrap();
        assert!(source.truncated);
        assert_eq!(source.content.len(), 100);
    }

    #[test]
    fn read_text_strips_bom_and_decodes_lossily() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "bom.py", b"\xEF\xBB\xBFx = 1\n");
        write(dir.path(), "latin.py", b"s = '\xE9'\n");
        write(dir.path(), "binary.py", b"\x00\x01\x02");

        assert_eq!(read_text(dir.path(), "bom.py", 1024).unwrap().content, "x = 1\n");
        assert!(read_text(dir.path(), "latin.py", 1024)
            .unwrap()
            .content
            .contains('\u{FFFD}'));
        let err = read_text(dir.path(), "binary.py", 1024).unwrap_err();
        assert!(matches!(err, FileError::Undecodable { .. }));
    }

    #[test]
    fn read_file_reports_kind_flags() {
        let project = create_test_project();
        let policy = AnalysisPolicy::default();
        let content = read_file(project.path(), "README.md", None, &policy).unwrap();
        assert!(!content.is_python);
        assert!(content.is_text);
        assert_eq!(content.lines, 1);
    }

    #[test]
    fn directory_structure_respects_depth() {
        let project = create_test_project();
        let policy = AnalysisPolicy::default();
        let tree = directory_structure(project.path(), None, Some(1), &policy).unwrap();
        let children = tree.children.unwrap();
        let names: Vec<&str> = children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["README.md", "src", "tests"]);
        let src = children.iter().find(|c| c.name == "src").unwrap();
        assert_eq!(src.truncated, Some(true));
        assert!(src.children.is_none());
    }

    #[test]
    fn glob_matching() {
        assert!(matches_simple_glob("test_foo.py", "test_*.py"));
        assert!(matches_simple_glob("foo_test.py", "*_test.py"));
        assert!(!matches_simple_glob("test.py", "test_*.py"));
        assert!(is_test_module_name("conftest.py"));
        assert!(!is_test_module_name("helpers.py"));
    }
}
