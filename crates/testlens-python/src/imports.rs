//! Import extraction and categorization.

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tree_sitter::Node;

use crate::parser::{line_of, ParsedModule};
use crate::types::{ImportInfo, ImportKind};

/// Top-level standard library modules.
const STDLIB_MODULES: &[&str] = &[
    "__future__", "abc", "argparse", "array", "ast", "asyncio", "atexit", "base64", "bdb",
    "binascii", "bisect", "builtins", "bz2", "calendar", "cmath", "cmd", "code", "codecs",
    "collections", "colorsys", "concurrent", "configparser", "contextlib", "contextvars", "copy",
    "copyreg", "cProfile", "csv", "ctypes", "curses", "dataclasses", "datetime", "dbm", "decimal",
    "difflib", "dis", "doctest", "email", "encodings", "enum", "errno", "faulthandler", "fcntl",
    "filecmp", "fileinput", "fnmatch", "fractions", "ftplib", "functools", "gc", "getopt",
    "getpass", "gettext", "glob", "graphlib", "grp", "gzip", "hashlib", "heapq", "hmac", "html",
    "http", "imaplib", "importlib", "inspect", "io", "ipaddress", "itertools", "json", "keyword",
    "linecache", "locale", "logging", "lzma", "mailbox", "marshal", "math", "mimetypes", "mmap",
    "multiprocessing", "netrc", "numbers", "operator", "optparse", "os", "pathlib", "pdb",
    "pickle", "pkgutil", "platform", "plistlib", "poplib", "posix", "pprint", "profile", "pstats",
    "pty", "pwd", "py_compile", "queue", "quopri", "random", "re", "readline", "reprlib",
    "resource", "rlcompleter", "runpy", "sched", "secrets", "select", "selectors", "shelve",
    "shlex", "shutil", "signal", "site", "smtplib", "socket", "socketserver", "sqlite3", "ssl",
    "stat", "statistics", "string", "stringprep", "struct", "subprocess", "symtable", "sys",
    "sysconfig", "syslog", "tarfile", "tempfile", "termios", "textwrap", "threading", "time",
    "timeit", "tkinter", "token", "tokenize", "tomllib", "trace", "traceback", "tracemalloc",
    "tty", "turtle", "types", "typing", "unicodedata", "unittest", "urllib", "uuid", "venv",
    "warnings", "wave", "weakref", "webbrowser", "winreg", "wsgiref", "xml", "xmlrpc", "zipapp",
    "zipfile", "zipimport", "zlib", "zoneinfo",
];

/// Every import statement in the module, in source order.
///
/// Imports nested in functions or conditionals are included.
pub fn collect_imports(module: &ParsedModule) -> Vec<ImportInfo> {
    let mut imports = Vec::new();
    for node in module.preorder() {
        match node.kind() {
            "import_statement" => direct_imports(module, node, &mut imports),
            "import_from_statement" => from_imports(module, node, &mut imports),
            "future_import_statement" => {
                let line = line_of(node);
                let mut cursor = node.walk();
                for name in node.children_by_field_name("name", &mut cursor) {
                    let (name, alias) = split_alias(module, name);
                    imports.push(ImportInfo {
                        kind: ImportKind::FromImport,
                        module: Some("__future__".to_string()),
                        name: Some(name),
                        alias,
                        level: None,
                        line_number: line,
                    });
                }
            }
            _ => {}
        }
    }
    imports
}

/// `(name, alias)` of a `dotted_name` or `aliased_import`.
fn split_alias(module: &ParsedModule, node: Node<'_>) -> (String, Option<String>) {
    if node.kind() == "aliased_import" {
        let name = node
            .child_by_field_name("name")
            .map(|n| module.text(n).to_string())
            .unwrap_or_default();
        let alias = node
            .child_by_field_name("alias")
            .map(|a| module.text(a).to_string());
        (name, alias)
    } else {
        (module.text(node).to_string(), None)
    }
}

fn direct_imports(module: &ParsedModule, node: Node<'_>, out: &mut Vec<ImportInfo>) {
    let line = line_of(node);
    let mut cursor = node.walk();
    for name in node.children_by_field_name("name", &mut cursor) {
        let (module_name, alias) = split_alias(module, name);
        out.push(ImportInfo {
            kind: ImportKind::Import,
            module: Some(module_name),
            name: None,
            alias,
            level: None,
            line_number: line,
        });
    }
}

fn from_imports(module: &ParsedModule, node: Node<'_>, out: &mut Vec<ImportInfo>) {
    let line = line_of(node);
    let (module_name, level) = match node.child_by_field_name("module_name") {
        Some(m) if m.kind() == "relative_import" => relative_target(module, m),
        Some(m) => (Some(module.text(m).to_string()), None),
        None => (None, None),
    };

    let mut names: Vec<(String, Option<String>)> = Vec::new();
    let mut cursor = node.walk();
    for name in node.children_by_field_name("name", &mut cursor) {
        names.push(split_alias(module, name));
    }
    let mut cursor = node.walk();
    if node
        .named_children(&mut cursor)
        .any(|c| c.kind() == "wildcard_import")
    {
        names.push(("*".to_string(), None));
    }

    for (name, alias) in names {
        out.push(ImportInfo {
            kind: ImportKind::FromImport,
            module: module_name.clone(),
            name: Some(name),
            alias,
            level,
            line_number: line,
        });
    }
}

/// Module and dot count of a `relative_import` node.
fn relative_target(module: &ParsedModule, node: Node<'_>) -> (Option<String>, Option<u32>) {
    let mut level = 0u32;
    let mut target = None;
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        match child.kind() {
            "import_prefix" => {
                level = module.text(child).chars().filter(|&c| c == '.').count() as u32;
            }
            "dotted_name" => target = Some(module.text(child).to_string()),
            _ => {}
        }
    }
    (target, Some(level))
}

// ============================================================================
// Categorization
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportCategory {
    StandardLibrary,
    ThirdParty,
    Local,
}

/// Categorize an import.
///
/// Relative imports and modules whose top-level package exists under the
/// project root are local; known standard-library names are standard;
/// everything else is third party.
pub fn categorize(import: &ImportInfo, project_root: &Path) -> ImportCategory {
    if import.level.is_some_and(|l| l > 0) {
        return ImportCategory::Local;
    }
    let Some(module) = import.module.as_deref() else {
        return ImportCategory::Local;
    };
    let top = module.split('.').next().unwrap_or(module);
    if STDLIB_MODULES.contains(&top) {
        ImportCategory::StandardLibrary
    } else if is_project_module(project_root, top) {
        ImportCategory::Local
    } else {
        ImportCategory::ThirdParty
    }
}

fn is_project_module(root: &Path, top: &str) -> bool {
    [root.to_path_buf(), root.join("src")].iter().any(|base| {
        base.join(top).is_dir()
            || base.join(format!("{}.py", top)).is_file()
            || base.join(format!("{}.pyi", top)).is_file()
    })
}

/// Response of the `find_imports` operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportReport {
    pub file_path: String,
    pub count: usize,
    pub imports: Vec<ImportInfo>,
    /// Distinct module names per category, sorted.
    pub standard_library: Vec<String>,
    pub third_party: Vec<String>,
    pub local: Vec<String>,
}

impl ImportReport {
    pub fn build(file_path: &str, imports: Vec<ImportInfo>, project_root: &Path) -> Self {
        let mut standard = BTreeSet::new();
        let mut third_party = BTreeSet::new();
        let mut local = BTreeSet::new();
        for import in &imports {
            let label = match (&import.module, import.level) {
                (Some(m), Some(level)) if level > 0 => format!("{}{}", ".".repeat(level as usize), m),
                (Some(m), _) => m.clone(),
                (None, level) => ".".repeat(level.unwrap_or(1) as usize),
            };
            match categorize(import, project_root) {
                ImportCategory::StandardLibrary => standard.insert(label),
                ImportCategory::ThirdParty => third_party.insert(label),
                ImportCategory::Local => local.insert(label),
            };
        }
        ImportReport {
            file_path: file_path.to_string(),
            count: imports.len(),
            imports,
            standard_library: standard.into_iter().collect(),
            third_party: third_party.into_iter().collect(),
            local: local.into_iter().collect(),
        }
    }
}
