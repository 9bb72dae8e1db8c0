//! Parser adapter: Python source text to a tree-sitter syntax tree.
//!
//! A [`ParsedModule`] owns its source and tree, so every node handed out by
//! it can be rendered back to exact source text through [`ParsedModule::text`].
//! Parsing never panics; a tree that contains error or missing nodes is
//! reported as [`LensError::SyntaxError`] at the first such node.

use std::path::Path;

use tracing::debug;
use tree_sitter::{Language, Node, Parser, Tree, TreeCursor};

use testlens_core::config::AnalysisPolicy;
use testlens_core::error::{LensError, LensResult};
use testlens_core::files;

/// A successfully parsed Python module.
pub struct ParsedModule {
    path: String,
    source: String,
    tree: Tree,
    truncated: bool,
}

impl std::fmt::Debug for ParsedModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParsedModule")
            .field("path", &self.path)
            .field("bytes", &self.source.len())
            .field("truncated", &self.truncated)
            .finish()
    }
}

impl ParsedModule {
    /// Project-relative path the module was read from.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// The `module` node.
    pub fn root(&self) -> Node<'_> {
        self.tree.root_node()
    }

    /// Whether the source was cut at the byte ceiling before parsing.
    pub fn truncated(&self) -> bool {
        self.truncated
    }

    /// Exact source text of a node.
    pub fn text(&self, node: Node<'_>) -> &str {
        self.source.get(node.byte_range()).unwrap_or("")
    }

    /// Pre-order traversal of the whole tree.
    pub fn preorder(&self) -> Preorder<'_> {
        Preorder::new(self.root())
    }
}

/// 1-based line of a node's first byte.
pub fn line_of(node: Node<'_>) -> u32 {
    node.start_position().row as u32 + 1
}

// ============================================================================
// Parsing
// ============================================================================

fn python_language() -> Language {
    tree_sitter_python::LANGUAGE.into()
}

/// Parse source text that has already been read.
pub fn parse_source(path: &str, source: impl Into<String>) -> LensResult<ParsedModule> {
    parse_source_with(path, source.into(), false)
}

fn parse_source_with(path: &str, source: String, truncated: bool) -> LensResult<ParsedModule> {
    let mut parser = Parser::new();
    parser
        .set_language(&python_language())
        .map_err(|e| LensError::internal(format!("cannot load Python grammar: {}", e)))?;

    let tree = parser
        .parse(&source, None)
        .ok_or_else(|| LensError::internal(format!("parser returned no tree for {}", path)))?;

    if tree.root_node().has_error() {
        let (message, line, col) = first_error(tree.root_node(), &source);
        debug!(path, line, col, "syntax error");
        return Err(LensError::SyntaxError {
            path: path.to_string(),
            message,
            line,
            col,
        });
    }

    Ok(ParsedModule {
        path: path.to_string(),
        source,
        tree,
        truncated,
    })
}

/// Read and parse a project-relative Python file.
pub fn parse_file(root: &Path, rel: &str, policy: &AnalysisPolicy) -> LensResult<ParsedModule> {
    let source = files::read_source(root, rel, policy)?;
    debug!(path = rel, bytes = source.content.len(), "parsing module");
    parse_source_with(rel, source.content, source.truncated)
}

/// Locate the first error or missing node in document order.
fn first_error(root: Node<'_>, source: &str) -> (String, u32, u32) {
    let mut node = root;
    'descend: loop {
        let mut cursor = node.walk();
        let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
        for child in children {
            if child.is_missing() {
                return (
                    format!("expected '{}'", child.kind()),
                    line_of(child),
                    child.start_position().column as u32 + 1,
                );
            }
            if child.is_error() {
                let snippet: String = source
                    .get(child.byte_range())
                    .unwrap_or("")
                    .chars()
                    .take(20)
                    .collect();
                let message = match snippet.trim() {
                    "" => "invalid syntax".to_string(),
                    text => format!("invalid syntax near '{}'", text),
                };
                return (
                    message,
                    line_of(child),
                    child.start_position().column as u32 + 1,
                );
            }
            if child.has_error() {
                node = child;
                continue 'descend;
            }
        }
        // has_error() was true but no child carries it: the node itself.
        return (
            "invalid syntax".to_string(),
            line_of(node),
            node.start_position().column as u32 + 1,
        );
    }
}

// ============================================================================
// Traversal
// ============================================================================

/// Pre-order iterator over a node and all of its descendants.
pub struct Preorder<'tree> {
    cursor: TreeCursor<'tree>,
    done: bool,
}

impl<'tree> Preorder<'tree> {
    pub fn new(node: Node<'tree>) -> Self {
        Preorder {
            cursor: node.walk(),
            done: false,
        }
    }
}

impl<'tree> Iterator for Preorder<'tree> {
    type Item = Node<'tree>;

    fn next(&mut self) -> Option<Node<'tree>> {
        if self.done {
            return None;
        }
        let node = self.cursor.node();
        if self.cursor.goto_first_child() || self.cursor.goto_next_sibling() {
            return Some(node);
        }
        loop {
            if !self.cursor.goto_parent() {
                self.done = true;
                return Some(node);
            }
            if self.cursor.goto_next_sibling() {
                return Some(node);
            }
        }
    }
}
