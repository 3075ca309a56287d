use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use strum::{Display, EnumString};

/// Operation on the 32-bit word stack machine. `Display` yields the textual
/// opcode; operands are rendered by the disassembler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum Instruction {
    #[strum(serialize = "i32.const")]
    Const(i32),

    #[strum(serialize = "local.get")]
    LocalGet(u16),
    #[strum(serialize = "local.set")]
    LocalSet(u16),

    // arithmetic, wrapping
    #[strum(serialize = "i32.add")]
    Add,
    #[strum(serialize = "i32.sub")]
    Sub,
    #[strum(serialize = "i32.mul")]
    Mul,
    /// Truncating division; traps on a zero divisor.
    #[strum(serialize = "i32.div_s")]
    DivS,
    #[strum(serialize = "i32.rem_s")]
    RemS,

    // comparisons push 1 or 0
    #[strum(serialize = "i32.eq")]
    Eq,
    #[strum(serialize = "i32.ne")]
    Ne,
    #[strum(serialize = "i32.lt_s")]
    LtS,
    #[strum(serialize = "i32.le_s")]
    LeS,
    #[strum(serialize = "i32.gt_s")]
    GtS,
    #[strum(serialize = "i32.ge_s")]
    GeS,

    /// Stack: a, b, c → (c != 0 ? a : b)
    #[strum(serialize = "select")]
    Select,
    #[strum(serialize = "drop")]
    Drop,

    // control flow, offsets relative to the next instruction
    #[strum(serialize = "br")]
    Br(i32),
    #[strum(serialize = "br_unless")]
    BrUnless(i32),

    /// Stack: arg1, ..., argN → result
    #[strum(serialize = "call")]
    Call(String /* label */, u8 /* argc */),
    #[strum(serialize = "call_host")]
    CallHost(HostFn),
    #[strum(serialize = "return")]
    Return,
}

/// Operations the runtime provides to generated code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum HostFn {
    Instantiate,
    AttributeGet,
    AttributeSet,
    GlobalGet,
    GlobalSet,
    Abs,
    Min,
    Max,
    Pow,
    PrintNum,
    PrintBool,
    Print,
}

impl HostFn {
    /// Number of words popped from the stack.
    pub fn arity(self) -> usize {
        match self {
            HostFn::Instantiate
            | HostFn::GlobalGet
            | HostFn::Abs
            | HostFn::PrintNum
            | HostFn::PrintBool
            | HostFn::Print => 1,
            HostFn::AttributeGet | HostFn::GlobalSet | HostFn::Min | HostFn::Max | HostFn::Pow => 2,
            HostFn::AttributeSet => 3,
        }
    }

    /// Whether a result word is pushed.
    pub fn returns_value(self) -> bool {
        !matches!(self, HostFn::AttributeSet | HostFn::GlobalSet)
    }
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    pub struct ProcFlags: u8 {
        /// Chunk entry point.
        const ENTRY    = 1 << 0;
        /// Compiled from a class method; the receiver is local 0.
        const METHOD   = 1 << 1;
        const EXPORTED = 1 << 2;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Procedure {
    pub label: String,
    pub params: u16,
    /// Total local slots, parameters included.
    pub locals: u16,
    pub flags: ProcFlags,
    pub code: Vec<Instruction>,
}

/// All procedures generated for a session, addressable by label.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompiledImage {
    pub procedures: Vec<Procedure>,
    labels: HashMap<String, usize>,
    pub entry: Option<String>,
}

impl CompiledImage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `proc`, replacing any procedure with the same label in place.
    pub fn upsert(&mut self, proc: Procedure) -> usize {
        match self.labels.get(&proc.label) {
            Some(&ix) => {
                self.procedures[ix] = proc;
                ix
            }
            None => {
                let ix = self.procedures.len();
                self.labels.insert(proc.label.clone(), ix);
                self.procedures.push(proc);
                ix
            }
        }
    }

    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.labels.get(label).copied()
    }

    pub fn procedure(&self, label: &str) -> Option<&Procedure> {
        self.index_of(label).map(|ix| &self.procedures[ix])
    }

    pub fn entry_procedure(&self) -> Option<&Procedure> {
        self.entry.as_deref().and_then(|label| self.procedure(label))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn proc(label: &str, code: Vec<Instruction>) -> Procedure {
        Procedure {
            label: label.to_string(),
            params: 0,
            locals: 0,
            flags: ProcFlags::EXPORTED,
            code,
        }
    }

    #[test]
    fn opcode_names() {
        assert_eq!(Instruction::Const(3).to_string(), "i32.const");
        assert_eq!(Instruction::DivS.to_string(), "i32.div_s");
        assert_eq!(Instruction::BrUnless(2).to_string(), "br_unless");
        assert_eq!(Instruction::CallHost(HostFn::AttributeGet).to_string(), "call_host");
        assert_eq!(HostFn::AttributeGet.to_string(), "attribute_get");
        assert_eq!(HostFn::from_str("print_bool"), Ok(HostFn::PrintBool));
    }

    #[test]
    fn host_arity() {
        assert_eq!(HostFn::AttributeSet.arity(), 3);
        assert!(!HostFn::AttributeSet.returns_value());
        assert_eq!(HostFn::Instantiate.arity(), 1);
        assert!(HostFn::Instantiate.returns_value());
    }

    #[test]
    fn upsert_replaces_by_label() {
        let mut image = CompiledImage::new();
        assert_eq!(image.upsert(proc("f", vec![Instruction::Const(1)])), 0);
        assert_eq!(image.upsert(proc("$main", vec![])), 1);
        assert_eq!(image.upsert(proc("f", vec![Instruction::Const(2)])), 0);
        assert_eq!(image.procedures.len(), 2);
        assert_eq!(image.procedure("f").unwrap().code, vec![Instruction::Const(2)]);
        assert_eq!(image.index_of("missing"), None);
    }
}
