pub mod bytecode;
pub mod compiler;
pub mod disasm;
pub mod machine;
pub mod store;
pub mod value;

pub use bytecode::{CompiledImage, HostFn, Instruction, ProcFlags, Procedure};
pub use compiler::{Compiler, ENTRY_LABEL};
pub use machine::{Vm, VmLimits};
pub use store::{ClassLayout, GlobalVar, HostOps, MemoryStore};
pub use value::Value;
