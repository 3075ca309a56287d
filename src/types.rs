use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};

/// Byte range into the chunk's source text.
pub type Span = std::ops::Range<usize>;

/// Name of the universal class type.
pub const OBJECT: &str = "object";

/// Static type of a value.
///
/// Classes compare by name. `Class("object")` accepts every value but never
/// narrows back to a concrete class.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    Number,
    Bool,
    #[default]
    None,
    Class(String),
}

impl Type {
    pub fn object() -> Self {
        Type::Class(OBJECT.to_string())
    }

    pub fn class(name: impl Into<String>) -> Self {
        Type::Class(name.into())
    }

    pub fn is_object(&self) -> bool {
        matches!(self, Type::Class(name) if name == OBJECT)
    }

    pub fn is_class(&self) -> bool {
        matches!(self, Type::Class(_))
    }

    /// Concrete class name, if this is a class other than `object`.
    pub fn class_name(&self) -> Option<&str> {
        match self {
            Type::Class(name) if name != OBJECT => Some(name),
            _ => None,
        }
    }

    /// Tag used inside signature strings.
    pub fn tag(&self) -> &str {
        match self {
            Type::Number => "number",
            Type::Bool => "bool",
            Type::None => "none",
            Type::Class(name) => name,
        }
    }

    /// Maps a source annotation (`int`, `bool`, `None`, `object`, class name).
    pub fn from_annotation(name: &str) -> Self {
        match name {
            "int" => Type::Number,
            "bool" => Type::Bool,
            "None" => Type::None,
            other => Type::Class(other.to_string()),
        }
    }
}

impl Display for Type {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Type::Number => write!(f, "int"),
            Type::Bool => write!(f, "bool"),
            Type::None => write!(f, "None"),
            Type::Class(name) => write!(f, "{}", name),
        }
    }
}

/// Signature key of a call: `name(tag,tag,)`.
pub fn call_signature(name: &str, params: &[Type]) -> String {
    let mut sig = String::with_capacity(name.len() + 2 + params.len() * 8);
    sig.push_str(name);
    sig.push('(');
    for p in params {
        sig.push_str(p.tag());
        sig.push(',');
    }
    sig.push(')');
    sig
}
