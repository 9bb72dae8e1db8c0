//! Symbol extraction: syntax tree to [`ModuleSymbols`].
//!
//! Extraction is driven by the [`DefinitionIndex`]. Functions that are direct
//! class members become methods of that class and nothing else; every other
//! function, nested ones included, is reported at module level with a dotted
//! `qualified_name`.

use tree_sitter::Node;

use crate::imports::collect_imports;
use crate::index::{DefKind, Definition, DefinitionIndex};
use crate::parser::{line_of, ParsedModule};
use crate::types::{
    ClassInfo, ClassVariable, FunctionInfo, ModuleSymbols, ParamKind, ParameterInfo, Visibility,
};

pub const COMPLEX_ANNOTATION: &str = "<complex annotation>";
pub const COMPLEX_DEFAULT: &str = "<complex default>";
pub const COMPLEX_DECORATOR: &str = "<complex decorator>";
pub const COMPLEX_BASE: &str = "<complex base>";

// ============================================================================
// Module
// ============================================================================

/// Extract the full symbol model of a parsed module.
pub fn extract_module(module: &ParsedModule) -> ModuleSymbols {
    let index = DefinitionIndex::build(module);
    extract_with_index(module, &index)
}

/// Extract using an index the caller already built.
pub fn extract_with_index(module: &ParsedModule, index: &DefinitionIndex<'_>) -> ModuleSymbols {
    ModuleSymbols {
        file_path: module.path().to_string(),
        docstring: docstring_of_block(module, module.root()),
        functions: index
            .functions()
            .map(|def| function_info(module, def))
            .collect(),
        classes: index
            .classes()
            .map(|def| class_info(module, index, def))
            .collect(),
        imports: collect_imports(module),
    }
}

// ============================================================================
// Functions
// ============================================================================

/// Build the FunctionInfo of a function definition.
pub fn function_info(module: &ParsedModule, def: &Definition<'_>) -> FunctionInfo {
    let node = def.node;
    let is_async = node.child(0).is_some_and(|c| c.kind() == "async");
    FunctionInfo {
        name: def.name.clone(),
        qualified_name: def.qualified_name.clone(),
        is_async,
        docstring: node
            .child_by_field_name("body")
            .and_then(|body| docstring_of_block(module, body)),
        parameters: node
            .child_by_field_name("parameters")
            .map(|params| extract_parameters(module, params))
            .unwrap_or_default(),
        return_type: node
            .child_by_field_name("return_type")
            .map(|t| render(module, t, COMPLEX_ANNOTATION)),
        decorators: decorator_texts(module, &def.decorators),
        line_number: line_of(node),
        visibility: Visibility::of(&def.name),
    }
}

/// Exact source text of a node, or `placeholder` when it cannot be rendered.
fn render(module: &ParsedModule, node: Node<'_>, placeholder: &str) -> String {
    let text = module.text(node).trim();
    if node.has_error() || text.is_empty() {
        placeholder.to_string()
    } else {
        text.to_string()
    }
}

/// Extract a parameter list.
///
/// Output order is positional parameters, `*args`, `**kwargs`, then
/// keyword-only parameters. Positional defaults are aligned against the tail
/// of the positional list.
pub fn extract_parameters(module: &ParsedModule, params: Node<'_>) -> Vec<ParameterInfo> {
    let mut positional: Vec<ParameterInfo> = Vec::new();
    let mut positional_defaults: Vec<String> = Vec::new();
    let mut vararg: Option<ParameterInfo> = None;
    let mut kwarg: Option<ParameterInfo> = None;
    let mut keyword_only: Vec<ParameterInfo> = Vec::new();
    let mut after_star = false;

    let param = |name: String, annotation: Option<String>, kind: ParamKind| ParameterInfo {
        name,
        annotation,
        kind,
        default: None,
    };

    let mut cursor = params.walk();
    for child in params.named_children(&mut cursor) {
        let annotation = child
            .child_by_field_name("type")
            .map(|t| render(module, t, COMPLEX_ANNOTATION));
        let default = child
            .child_by_field_name("value")
            .map(|v| render(module, v, COMPLEX_DEFAULT));

        match child.kind() {
            "keyword_separator" => after_star = true,
            "positional_separator" | "comment" => {}
            "list_splat_pattern" | "dictionary_splat_pattern" => {
                let name = splat_name(module, child);
                if child.kind() == "list_splat_pattern" {
                    vararg = Some(param(name, None, ParamKind::Vararg));
                    after_star = true;
                } else {
                    kwarg = Some(param(name, None, ParamKind::Kwarg));
                }
            }
            "typed_parameter" => {
                // The bound pattern is the first named child, not a field.
                let Some(target) = child.named_child(0) else {
                    continue;
                };
                match target.kind() {
                    "list_splat_pattern" => {
                        vararg = Some(param(
                            splat_name(module, target),
                            annotation,
                            ParamKind::Vararg,
                        ));
                        after_star = true;
                    }
                    "dictionary_splat_pattern" => {
                        kwarg = Some(param(
                            splat_name(module, target),
                            annotation,
                            ParamKind::Kwarg,
                        ));
                    }
                    _ => {
                        let name = module.text(target).to_string();
                        if after_star {
                            keyword_only.push(param(name, annotation, ParamKind::KeywordOnly));
                        } else {
                            positional.push(param(name, annotation, ParamKind::Positional));
                        }
                    }
                }
            }
            "default_parameter" | "typed_default_parameter" => {
                let name = child
                    .child_by_field_name("name")
                    .map(|n| module.text(n).to_string())
                    .unwrap_or_default();
                if after_star {
                    let mut info = param(name, annotation, ParamKind::KeywordOnly);
                    info.default = default;
                    keyword_only.push(info);
                } else {
                    positional.push(param(name, annotation, ParamKind::Positional));
                    positional_defaults.push(default.unwrap_or_else(|| COMPLEX_DEFAULT.to_string()));
                }
            }
            _ => {
                // identifier, or a legacy tuple pattern
                let name = module.text(child).to_string();
                if after_star {
                    keyword_only.push(param(name, None, ParamKind::KeywordOnly));
                } else {
                    positional.push(param(name, None, ParamKind::Positional));
                }
            }
        }
    }

    let offset = positional.len().saturating_sub(positional_defaults.len());
    for (slot, default) in positional[offset..].iter_mut().zip(positional_defaults) {
        slot.default = Some(default);
    }

    let mut parameters = positional;
    parameters.extend(vararg);
    parameters.extend(kwarg);
    parameters.extend(keyword_only);
    parameters
}

fn splat_name(module: &ParsedModule, splat: Node<'_>) -> String {
    splat
        .named_child(0)
        .map(|n| module.text(n).to_string())
        .unwrap_or_default()
}

// ============================================================================
// Decorators
// ============================================================================

/// The decorated expression of a `decorator` node.
pub fn decorator_expression(decorator: Node<'_>) -> Option<Node<'_>> {
    decorator.named_child(0)
}

fn decorator_texts(module: &ParsedModule, decorators: &[Node<'_>]) -> Vec<String> {
    decorators
        .iter()
        .map(|d| match decorator_expression(*d) {
            Some(expr) => render(module, expr, COMPLEX_DECORATOR),
            None => COMPLEX_DECORATOR.to_string(),
        })
        .collect()
}

/// Trailing name of a decorator: `pytest.fixture(scope="x")` gives `fixture`.
pub fn decorator_name<'a>(module: &'a ParsedModule, decorator: Node<'_>) -> Option<&'a str> {
    let mut expr = decorator_expression(decorator)?;
    if expr.kind() == "call" {
        expr = expr.child_by_field_name("function")?;
    }
    trailing_name(module, expr)
}

/// Last identifier of a name or attribute chain.
pub fn trailing_name<'a>(module: &'a ParsedModule, expr: Node<'_>) -> Option<&'a str> {
    match expr.kind() {
        "identifier" => Some(module.text(expr)),
        "attribute" => expr
            .child_by_field_name("attribute")
            .map(|a| module.text(a)),
        _ => None,
    }
}

// ============================================================================
// Classes
// ============================================================================

/// Build the ClassInfo of a class definition.
pub fn class_info(
    module: &ParsedModule,
    index: &DefinitionIndex<'_>,
    def: &Definition<'_>,
) -> ClassInfo {
    let node = def.node;
    let body = node.child_by_field_name("body");

    let methods: Vec<FunctionInfo> = index
        .members(def.id)
        .filter(|m| m.kind == DefKind::Function)
        .map(|m| function_info(module, m))
        .collect();

    let properties = index
        .members(def.id)
        .filter(|m| m.kind == DefKind::Function)
        .filter(|m| {
            m.decorators
                .iter()
                .any(|d| decorator_name(module, *d) == Some("property"))
        })
        .map(|m| m.name.clone())
        .collect();

    ClassInfo {
        name: def.name.clone(),
        qualified_name: def.qualified_name.clone(),
        docstring: body.and_then(|b| docstring_of_block(module, b)),
        base_classes: base_classes(module, node),
        methods,
        properties,
        class_variables: body
            .map(|b| block_variables(module, b, false))
            .unwrap_or_default(),
        decorators: decorator_texts(module, &def.decorators),
        line_number: line_of(node),
    }
}

fn base_classes(module: &ParsedModule, class: Node<'_>) -> Vec<String> {
    let Some(args) = class.child_by_field_name("superclasses") else {
        return Vec::new();
    };
    let mut bases = Vec::new();
    let mut cursor = args.walk();
    for arg in args.named_children(&mut cursor) {
        if arg.kind() != "keyword_argument" && arg.kind() != "comment" {
            bases.push(render(module, arg, COMPLEX_BASE));
        }
    }
    bases
}

/// Variables assigned directly in a block.
///
/// With `annotated_only`, plain assignments are skipped.
pub fn block_variables(
    module: &ParsedModule,
    block: Node<'_>,
    annotated_only: bool,
) -> Vec<ClassVariable> {
    let mut vars = Vec::new();
    let mut cursor = block.walk();
    for stmt in block.named_children(&mut cursor) {
        if stmt.kind() != "expression_statement" {
            continue;
        }
        let Some(mut assignment) = stmt.named_child(0) else {
            continue;
        };
        // Chained assignment nests in `right`.
        while assignment.kind() == "assignment" {
            let annotation = assignment
                .child_by_field_name("type")
                .map(|t| render(module, t, COMPLEX_ANNOTATION));
            if let Some(left) = assignment.child_by_field_name("left") {
                if left.kind() == "identifier" && (!annotated_only || annotation.is_some()) {
                    vars.push(ClassVariable {
                        name: module.text(left).to_string(),
                        annotation,
                        line_number: line_of(left),
                    });
                }
            }
            match assignment.child_by_field_name("right") {
                Some(right) => assignment = right,
                None => break,
            }
        }
    }
    vars
}

// ============================================================================
// Docstrings
// ============================================================================

/// Docstring of a block or module: a leading plain string statement.
pub fn docstring_of_block(module: &ParsedModule, block: Node<'_>) -> Option<String> {
    let mut cursor = block.walk();
    let first = block
        .named_children(&mut cursor)
        .find(|c| c.kind() != "comment")?;
    if first.kind() != "expression_statement" || first.named_child_count() != 1 {
        return None;
    }
    let literal = first.named_child(0)?;
    let raw = string_value(module, literal)?;
    Some(clean_docstring(&raw))
}

/// Value of a plain string literal or implicit concatenation.
///
/// Returns `None` for f-strings, byte strings and non-string nodes.
pub fn string_value(module: &ParsedModule, node: Node<'_>) -> Option<String> {
    match node.kind() {
        "string" => literal_value(module.text(node)),
        "concatenated_string" => {
            let mut cursor = node.walk();
            let parts: Option<Vec<String>> = node
                .named_children(&mut cursor)
                .filter(|c| c.kind() != "comment")
                .map(|c| string_value(module, c))
                .collect();
            parts.map(|p| p.concat())
        }
        _ => None,
    }
}

fn literal_value(text: &str) -> Option<String> {
    let quote_start = text.find(['\'', '"'])?;
    let prefix = text[..quote_start].to_ascii_lowercase();
    if prefix.contains('f') || prefix.contains('b') {
        return None;
    }
    let body = &text[quote_start..];
    let quote = if body.starts_with("\"\"\"") || body.starts_with("'''") {
        &body[..3]
    } else {
        &body[..1]
    };
    let inner = body
        .strip_prefix(quote)
        .and_then(|rest| rest.strip_suffix(quote))
        .unwrap_or("");
    if prefix.contains('r') {
        Some(inner.to_string())
    } else {
        Some(unescape(inner))
    }
}

/// Decode Python string escapes. Unknown escapes keep their backslash.
fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let Some(next) = chars.next() else {
            out.push('\\');
            break;
        };
        match next {
            '\n' => {}
            '\\' => out.push('\\'),
            '\'' => out.push('\''),
            '"' => out.push('"'),
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            'a' => out.push('\x07'),
            'b' => out.push('\x08'),
            'f' => out.push('\x0c'),
            'v' => out.push('\x0b'),
            '0'..='7' => {
                let mut digits = next.to_string();
                while digits.len() < 3 {
                    match chars.peek() {
                        Some(d @ '0'..='7') => {
                            digits.push(*d);
                            chars.next();
                        }
                        _ => break,
                    }
                }
                match u32::from_str_radix(&digits, 8).ok().and_then(char::from_u32) {
                    Some(ch) => out.push(ch),
                    None => {
                        out.push('\\');
                        out.push_str(&digits);
                    }
                }
            }
            'x' | 'u' | 'U' => {
                let width = match next {
                    'x' => 2,
                    'u' => 4,
                    _ => 8,
                };
                let hex: String = chars.clone().take(width).collect();
                match (hex.len() == width)
                    .then(|| u32::from_str_radix(&hex, 16).ok())
                    .flatten()
                    .and_then(char::from_u32)
                {
                    Some(ch) => {
                        out.push(ch);
                        for _ in 0..width {
                            chars.next();
                        }
                    }
                    None => {
                        out.push('\\');
                        out.push(next);
                    }
                }
            }
            other => {
                out.push('\\');
                out.push(other);
            }
        }
    }
    out
}

/// Normalize docstring indentation.
///
/// The first line is stripped; the common leading whitespace of the remaining
/// non-blank lines is removed; leading and trailing blank lines are dropped.
pub fn clean_docstring(raw: &str) -> String {
    let lines: Vec<&str> = raw.lines().collect();
    let margin = lines
        .iter()
        .skip(1)
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start().len())
        .min()
        .unwrap_or(0);

    let mut cleaned: Vec<String> = Vec::with_capacity(lines.len());
    for (i, line) in lines.iter().enumerate() {
        if i == 0 {
            cleaned.push(line.trim().to_string());
        } else if line.len() >= margin {
            cleaned.push(line[margin..].trim_end().to_string());
        } else {
            cleaned.push(line.trim().to_string());
        }
    }
    while cleaned.first().is_some_and(|l| l.is_empty()) {
        cleaned.remove(0);
    }
    while cleaned.last().is_some_and(|l| l.is_empty()) {
        cleaned.pop();
    }
    cleaned.join("\n")
}

// ============================================================================
// Module Variables
// ============================================================================

/// Annotated variables assigned at module level.
pub fn module_annotated_variables(module: &ParsedModule) -> Vec<ClassVariable> {
    block_variables(module, module.root(), true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_source;

    fn symbols(source: &str) -> ModuleSymbols {
        let module = parse_source("sample.py", source).unwrap();
        extract_module(&module)
    }

    #[test]
    fn parameter_kinds_and_right_aligned_defaults() {
        let syms = symbols("def f(a, b=1, *args, **kwargs):\n    pass\n");
        let params = &syms.functions[0].parameters;
        let kinds: Vec<ParamKind> = params.iter().map(|p| p.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ParamKind::Positional,
                ParamKind::Positional,
                ParamKind::Vararg,
                ParamKind::Kwarg
            ]
        );
        assert_eq!(params[0].default, None);
        assert_eq!(params[1].default.as_deref(), Some("1"));
        assert_eq!(params[2].name, "args");
        assert_eq!(params[3].name, "kwargs");
    }

    #[test]
    fn keyword_only_parameters_follow_kwarg() {
        let syms = symbols("def g(a, /, b: int = 2, *, c, d: str = 'x', **kw) -> bool:\n    pass\n");
        let f = &syms.functions[0];
        let names: Vec<&str> = f.parameters.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "kw", "c", "d"]);
        assert_eq!(f.parameters[1].annotation.as_deref(), Some("int"));
        assert_eq!(f.parameters[1].default.as_deref(), Some("2"));
        assert_eq!(f.parameters[3].kind, ParamKind::KeywordOnly);
        assert_eq!(f.parameters[3].default, None);
        assert_eq!(f.parameters[4].default.as_deref(), Some("'x'"));
        assert_eq!(f.return_type.as_deref(), Some("bool"));
    }

    #[test]
    fn typed_varargs_keep_annotations() {
        let syms = symbols("def h(*items: int, **opts: str):\n    pass\n");
        let params = &syms.functions[0].parameters;
        assert_eq!(params[0].kind, ParamKind::Vararg);
        assert_eq!(params[0].annotation.as_deref(), Some("int"));
        assert_eq!(params[1].kind, ParamKind::Kwarg);
        assert_eq!(params[1].annotation.as_deref(), Some("str"));
    }

    #[test]
    fn methods_are_never_functions() {
        let source = r#"
def a():
    def nested():
        pass

class C:
    def m1(self):
        pass

    @property
    def value(self):
        return 1

    async def m2(self):
        pass

def b():
    pass
"#;
        let syms = symbols(source);
        let function_names: Vec<&str> = syms.functions.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(function_names, vec!["a", "nested", "b"]);
        assert_eq!(syms.classes[0].methods.len(), 3);
        assert_eq!(syms.definition_count(), 6);
        assert_eq!(syms.classes[0].properties, vec!["value"]);
        assert!(syms.classes[0].methods[2].is_async);
        assert_eq!(syms.functions[1].qualified_name, "a.nested");
    }

    #[test]
    fn property_detection_uses_name_equality() {
        let source = r#"
import functools

class C:
    @functools.cached_property
    def cached(self):
        return 1

    @abc.property
    def attr_prop(self):
        return 2

    @propertylike
    def other(self):
        return 3
"#;
        let syms = symbols(source);
        assert_eq!(syms.classes[0].properties, vec!["attr_prop"]);
    }

    #[test]
    fn class_details() {
        let source = r#"
@dataclass(frozen=True)
class Point(Base, mixins.Hashable, metaclass=Meta):
    """A point.

    Has coordinates.
    """
    x: int = 0
    y: int
    label = "p"

    def _norm(self):
        pass
"#;
        let syms = symbols(source);
        let class = &syms.classes[0];
        assert_eq!(class.base_classes, vec!["Base", "mixins.Hashable"]);
        assert_eq!(class.decorators, vec!["dataclass(frozen=True)"]);
        assert_eq!(
            class.docstring.as_deref(),
            Some("A point.\n\nHas coordinates.")
        );
        let vars: Vec<(&str, Option<&str>)> = class
            .class_variables
            .iter()
            .map(|v| (v.name.as_str(), v.annotation.as_deref()))
            .collect();
        assert_eq!(
            vars,
            vec![("x", Some("int")), ("y", Some("int")), ("label", None)]
        );
        assert_eq!(class.methods[0].visibility, Visibility::Private);
        assert_eq!(class.line_number, 3);
    }

    #[test]
    fn docstrings_exclude_fstrings_and_bytes() {
        let syms = symbols(
            "def a():\n    f\"doc {x}\"\n\ndef b():\n    b'doc'\n\ndef c():\n    r'raw\\n'\n\ndef d():\n    'esc\\tape'\n",
        );
        assert_eq!(syms.functions[0].docstring, None);
        assert_eq!(syms.functions[1].docstring, None);
        assert_eq!(syms.functions[2].docstring.as_deref(), Some("raw\\n"));
        assert_eq!(syms.functions[3].docstring.as_deref(), Some("esc\tape"));
    }

    #[test]
    fn module_docstring_and_decorated_line_numbers() {
        let source = "\"\"\"Module doc.\"\"\"\n\n@decorator\ndef f():\n    pass\n";
        let syms = symbols(source);
        assert_eq!(syms.docstring.as_deref(), Some("Module doc."));
        assert_eq!(syms.functions[0].line_number, 4);
        assert_eq!(syms.functions[0].decorators, vec!["decorator"]);
    }

    #[test]
    fn symbols_round_trip_through_json() {
        let source = r#"
import os
from .pkg import thing as t

class K(object):
    """Doc."""
    n: int = 3

    @staticmethod
    def make(a, *args, key=None, **kw) -> "K":
        return K()
"#;
        let syms = symbols(source);
        let json = serde_json::to_string(&syms).unwrap();
        let back: ModuleSymbols = serde_json::from_str(&json).unwrap();
        assert_eq!(back, syms);
    }

    #[test]
    fn clean_docstring_strips_margin() {
        assert_eq!(
            clean_docstring("Summary.\n\n        Indented body.\n          More.\n    "),
            "Summary.\n\nIndented body.\n  More."
        );
    }
}
