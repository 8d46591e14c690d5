//! The core type representation and the per-expression type table.

use ahash::AHashMap;

use crate::ast::ExprId;

/// A Curlee type. Comparison is structural; named types compare by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
    Int,
    Bool,
    String,
    Unit,
    Struct(String),
    Enum(String),
    Capability(String),
}

impl Type {
    /// Display name, matching source spelling for core types.
    #[must_use]
    pub fn display_name(&self) -> String {
        match self {
            Self::Int => "Int".to_string(),
            Self::Bool => "Bool".to_string(),
            Self::String => "String".to_string(),
            Self::Unit => "Unit".to_string(),
            Self::Struct(name) | Self::Enum(name) => name.clone(),
            Self::Capability(name) => format!("cap {name}"),
        }
    }

    #[must_use]
    pub fn is_scalar(&self) -> bool {
        matches!(self, Self::Int | Self::Bool)
    }
}

impl std::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.display_name())
    }
}

/// Resolves a core (builtin) type name. User-defined struct/enum names are
/// the caller's to look up.
#[must_use]
pub fn core_type_from_name(name: &str) -> Option<Type> {
    match name {
        "Int" => Some(Type::Int),
        "Bool" => Some(Type::Bool),
        "String" => Some(Type::String),
        "Unit" => Some(Type::Unit),
        _ => None,
    }
}

/// A function's checked signature.
#[derive(Debug, Clone)]
pub struct FunctionType {
    pub params: Vec<Type>,
    pub result: Type,
}

/// The type of every successfully checked expression, keyed by [`ExprId`].
///
/// Expressions that failed to type have no entry; the checker only hands a
/// `TypeInfo` out when there were no diagnostics at all.
#[derive(Debug, Clone, Default)]
pub struct TypeInfo {
    pub expr_types: AHashMap<ExprId, Type>,
}
