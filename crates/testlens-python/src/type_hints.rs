//! Annotation view of a module.

use serde::{Deserialize, Serialize};

use crate::extract::module_annotated_variables;
use crate::parser::ParsedModule;
use crate::types::{ClassVariable, FunctionInfo, ModuleSymbols};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterHint {
    pub name: String,
    #[serde(rename = "type")]
    pub annotation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionHints {
    pub name: String,
    pub line_number: u32,
    pub parameters: Vec<ParameterHint>,
    pub return_type: Option<String>,
    /// Every parameter and the return value are annotated.
    pub fully_annotated: bool,
}

impl FunctionHints {
    fn from_function(function: &FunctionInfo, skip_receiver: bool) -> Self {
        let parameters: Vec<ParameterHint> = function
            .parameters
            .iter()
            .map(|p| ParameterHint {
                name: p.name.clone(),
                annotation: p.annotation.clone(),
            })
            .collect();
        let fully_annotated = function.return_type.is_some()
            && parameters.iter().enumerate().all(|(i, p)| {
                p.annotation.is_some() || (skip_receiver && i == 0 && is_receiver(&p.name))
            });
        FunctionHints {
            name: function.name.clone(),
            line_number: function.line_number,
            parameters,
            return_type: function.return_type.clone(),
            fully_annotated,
        }
    }
}

fn is_receiver(name: &str) -> bool {
    name == "self" || name == "cls"
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassHints {
    pub name: String,
    pub line_number: u32,
    pub methods: Vec<FunctionHints>,
    pub class_variables: Vec<ClassVariable>,
}

/// Response of the `get_type_hints` operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeHints {
    pub file_path: String,
    pub functions: Vec<FunctionHints>,
    pub classes: Vec<ClassHints>,
    /// Annotated module-level variables.
    pub variables: Vec<ClassVariable>,
}

/// Collect annotations from an extracted module.
pub fn type_hints(module: &ParsedModule, symbols: &ModuleSymbols) -> TypeHints {
    TypeHints {
        file_path: symbols.file_path.clone(),
        functions: symbols
            .functions
            .iter()
            .map(|f| FunctionHints::from_function(f, false))
            .collect(),
        classes: symbols
            .classes
            .iter()
            .map(|c| ClassHints {
                name: c.name.clone(),
                line_number: c.line_number,
                methods: c
                    .methods
                    .iter()
                    .map(|m| FunctionHints::from_function(m, true))
                    .collect(),
                class_variables: c.class_variables.clone(),
            })
            .collect(),
        variables: module_annotated_variables(module),
    }
}
