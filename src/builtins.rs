use crate::parser::ast::FuncIdentity;
use crate::types::{Type, call_signature};
use crate::vm::bytecode::HostFn;

/// Host-implemented function visible to programs.
#[derive(Debug, Clone, Copy)]
pub struct Builtin {
    pub name: &'static str,
    /// Signature tags: `number`, `bool` or `object`.
    pub params: &'static [&'static str],
    pub ret: &'static str,
    pub host: HostFn,
}

fn tag_type(tag: &str) -> Type {
    match tag {
        "number" => Type::Number,
        "bool" => Type::Bool,
        "none" => Type::None,
        other => Type::class(other),
    }
}

impl Builtin {
    pub const fn arity(&self) -> usize {
        self.params.len()
    }

    pub fn identity(&self) -> FuncIdentity {
        FuncIdentity {
            name: self.name.to_string(),
            params: self.params.iter().map(|t| tag_type(t)).collect(),
            ret: tag_type(self.ret),
        }
    }

    pub fn signature(&self) -> String {
        call_signature(self.name, &self.identity().params)
    }
}

const PRINT_OBJECT: Builtin = Builtin {
    name: "print",
    params: &["object"],
    ret: "object",
    host: HostFn::Print,
};
const PRINT_NUMBER: Builtin = Builtin {
    name: "print",
    params: &["number"],
    ret: "number",
    host: HostFn::PrintNum,
};
const PRINT_BOOL: Builtin = Builtin {
    name: "print",
    params: &["bool"],
    ret: "bool",
    host: HostFn::PrintBool,
};
const ABS: Builtin = Builtin {
    name: "abs",
    params: &["number"],
    ret: "number",
    host: HostFn::Abs,
};
const MIN: Builtin = Builtin {
    name: "min",
    params: &["number", "number"],
    ret: "number",
    host: HostFn::Min,
};
const MAX: Builtin = Builtin {
    name: "max",
    params: &["number", "number"],
    ret: "number",
    host: HostFn::Max,
};
const POW: Builtin = Builtin {
    name: "pow",
    params: &["number", "number"],
    ret: "number",
    host: HostFn::Pow,
};

static REGISTRY: &[Builtin] = &[
    PRINT_OBJECT,
    PRINT_NUMBER,
    PRINT_BOOL,
    ABS,
    MIN,
    MAX,
    POW,
];

pub fn all() -> &'static [Builtin] {
    REGISTRY
}

/// Host function implementing the builtin with this signature.
pub fn host_fn(signature: &str) -> Option<HostFn> {
    REGISTRY
        .iter()
        .find(|b| b.signature() == signature)
        .map(|b| b.host)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signatures() {
        let sigs: Vec<String> = all().iter().map(|b| b.signature()).collect();
        assert_eq!(
            sigs,
            vec![
                "print(object,)",
                "print(number,)",
                "print(bool,)",
                "abs(number,)",
                "min(number,number,)",
                "max(number,number,)",
                "pow(number,number,)",
            ]
        );
    }

    #[test]
    fn host_lookup() {
        assert_eq!(host_fn("print(bool,)"), Some(HostFn::PrintBool));
        assert_eq!(host_fn("pow(number,number,)"), Some(HostFn::Pow));
        assert_eq!(host_fn("print(C,)"), None);
        assert_eq!(MIN.arity(), 2);
    }
}
