use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};

use crate::parser::ast::Literal;
use crate::types::Type;

/// A stored runtime value: contents of a global slot or an instance
/// attribute. On the VM stack every value is flattened to one `i32` word.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Value {
    None,
    Bool(bool),
    Num(i32),
    Object { class: String, address: usize },
}

impl Value {
    /// Word representation: booleans are 0/1, `None` is 0, objects are their
    /// heap address.
    pub fn to_word(&self) -> i32 {
        match self {
            Value::None => 0,
            Value::Bool(b) => *b as i32,
            Value::Num(n) => *n,
            Value::Object { address, .. } => *address as i32,
        }
    }

    /// Zero value of a declared type.
    pub fn default_for(ty: &Type) -> Self {
        match ty {
            Type::Number => Value::Num(0),
            Type::Bool => Value::Bool(false),
            Type::None | Type::Class(_) => Value::None,
        }
    }

    pub fn from_literal(lit: Literal) -> Self {
        match lit {
            Literal::None => Value::None,
            Literal::Bool(b) => Value::Bool(b),
            Literal::Number(n) => Value::Num(n),
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Value::None => write!(f, "None"),
            Value::Bool(true) => write!(f, "True"),
            Value::Bool(false) => write!(f, "False"),
            Value::Num(n) => write!(f, "{}", n),
            Value::Object { class, address } => write!(f, "<{} object at {}>", class, address),
        }
    }
}
