//! Definition index: every `def` and `class` in a module, built in one pass.
//!
//! Definitions live in an arena addressed by [`DefId`]. Each entry records its
//! nearest enclosing definition and, when it is a direct statement of a class
//! body (a decorated definition counts), the owning class. Consumers ask the
//! index for ownership instead of re-walking the tree.

use tree_sitter::Node;

use crate::parser::ParsedModule;

/// Arena index of a definition.
pub type DefId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefKind {
    Function,
    Class,
}

#[derive(Debug, Clone)]
pub struct Definition<'tree> {
    pub id: DefId,
    pub kind: DefKind,
    pub name: String,
    /// Dotted path through enclosing definitions.
    pub qualified_name: String,
    /// The `function_definition` or `class_definition` node.
    pub node: Node<'tree>,
    /// `decorator` nodes of the wrapping `decorated_definition`, in order.
    pub decorators: Vec<Node<'tree>>,
    /// Nearest enclosing function or class.
    pub enclosing: Option<DefId>,
    /// Class whose body directly contains this definition.
    pub owner_class: Option<DefId>,
}

impl Definition<'_> {
    pub fn is_class(&self) -> bool {
        self.kind == DefKind::Class
    }

    pub fn is_method(&self) -> bool {
        self.kind == DefKind::Function && self.owner_class.is_some()
    }
}

#[derive(Debug)]
pub struct DefinitionIndex<'tree> {
    defs: Vec<Definition<'tree>>,
    /// Direct class members per definition, in source order.
    members: Vec<Vec<DefId>>,
}

/// Traversal state carried to a node from its parent.
struct Frame<'tree> {
    node: Node<'tree>,
    enclosing: Option<DefId>,
    /// Set for statements directly inside a class body.
    member_of: Option<DefId>,
    /// Set for the body block of a class.
    body_of: Option<DefId>,
    decorators: Vec<Node<'tree>>,
}

impl<'tree> Frame<'tree> {
    fn child(node: Node<'tree>, enclosing: Option<DefId>) -> Self {
        Frame {
            node,
            enclosing,
            member_of: None,
            body_of: None,
            decorators: Vec::new(),
        }
    }
}

impl<'tree> DefinitionIndex<'tree> {
    /// Index every definition of `module` in pre-order.
    pub fn build(module: &'tree ParsedModule) -> Self {
        let mut defs: Vec<Definition<'tree>> = Vec::new();
        let mut members: Vec<Vec<DefId>> = Vec::new();
        let mut stack = vec![Frame::child(module.root(), None)];

        while let Some(frame) = stack.pop() {
            let node = frame.node;
            let mut enclosing = frame.enclosing;
            let mut children: Vec<Frame<'tree>> = Vec::new();
            let mut cursor = node.walk();

            match node.kind() {
                "function_definition" | "class_definition" => {
                    let kind = if node.kind() == "class_definition" {
                        DefKind::Class
                    } else {
                        DefKind::Function
                    };
                    let name = node
                        .child_by_field_name("name")
                        .map(|n| module.text(n).to_string())
                        .unwrap_or_default();
                    let qualified_name = match enclosing {
                        Some(parent) => format!("{}.{}", defs[parent].qualified_name, name),
                        None => name.clone(),
                    };
                    let id = defs.len();
                    if let Some(owner) = frame.member_of {
                        members[owner].push(id);
                    }
                    defs.push(Definition {
                        id,
                        kind,
                        name,
                        qualified_name,
                        node,
                        decorators: frame.decorators,
                        enclosing,
                        owner_class: frame.member_of,
                    });
                    members.push(Vec::new());
                    enclosing = Some(id);

                    let body = node.child_by_field_name("body").map(|b| b.id());
                    for child in node.children(&mut cursor) {
                        let mut next = Frame::child(child, enclosing);
                        if kind == DefKind::Class && Some(child.id()) == body {
                            next.body_of = Some(id);
                        }
                        children.push(next);
                    }
                }
                "decorated_definition" => {
                    let decorators: Vec<Node<'tree>> = node
                        .children(&mut cursor)
                        .filter(|c| c.kind() == "decorator")
                        .collect();
                    let definition = node.child_by_field_name("definition").map(|d| d.id());
                    for child in node.children(&mut cursor) {
                        let mut next = Frame::child(child, enclosing);
                        if Some(child.id()) == definition {
                            next.member_of = frame.member_of;
                            next.decorators = decorators.clone();
                        }
                        children.push(next);
                    }
                }
                _ => {
                    for child in node.children(&mut cursor) {
                        let mut next = Frame::child(child, enclosing);
                        next.member_of = frame.body_of;
                        children.push(next);
                    }
                }
            }

            // Reverse so the first child is visited next.
            stack.extend(children.into_iter().rev());
        }

        DefinitionIndex { defs, members }
    }

    pub fn definitions(&self) -> &[Definition<'tree>] {
        &self.defs
    }

    pub fn get(&self, id: DefId) -> &Definition<'tree> {
        &self.defs[id]
    }

    /// Direct methods (and nested classes) of a class, in source order.
    pub fn members(&self, id: DefId) -> impl Iterator<Item = &Definition<'tree>> {
        self.members[id].iter().map(move |&m| &self.defs[m])
    }

    /// Functions that are not direct class members.
    pub fn functions(&self) -> impl Iterator<Item = &Definition<'tree>> {
        self.defs
            .iter()
            .filter(|d| d.kind == DefKind::Function && d.owner_class.is_none())
    }

    pub fn classes(&self) -> impl Iterator<Item = &Definition<'tree>> {
        self.defs.iter().filter(|d| d.kind == DefKind::Class)
    }

    /// Every function definition, methods included.
    pub fn all_functions(&self) -> impl Iterator<Item = &Definition<'tree>> {
        self.defs.iter().filter(|d| d.kind == DefKind::Function)
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.defs.len()
    }
}
