use super::bytecode::{CompiledImage, Instruction as I, Procedure};
use std::fmt::{self, Write};

pub fn disassemble_image_to_string(image: &CompiledImage) -> String {
    let mut output = String::new();
    let _ = disassemble_image(image, &mut output);
    output
}

pub fn disassemble_image(image: &CompiledImage, w: &mut impl Write) -> fmt::Result {
    writeln!(w, "=== Image Disassembly ===")?;
    if let Some(entry) = &image.entry {
        writeln!(w, "entry: {}", entry)?;
    }
    writeln!(w)?;

    for proc in &image.procedures {
        disassemble_procedure(proc, w)?;
        writeln!(w)?;
    }
    Ok(())
}

pub fn disassemble_procedure_to_string(proc: &Procedure) -> String {
    let mut output = String::new();
    let _ = disassemble_procedure(proc, &mut output);
    output
}

pub fn disassemble_procedure(proc: &Procedure, w: &mut impl Write) -> fmt::Result {
    let flags: Vec<String> = proc
        .flags
        .iter_names()
        .map(|(name, _)| name.to_lowercase())
        .collect();
    writeln!(
        w,
        "proc {} (params={}, locals={}) [{}]",
        proc.label,
        proc.params,
        proc.locals,
        flags.join(" ")
    )?;
    for (i, ins) in proc.code.iter().enumerate() {
        writeln!(w, "  {:4}: {}", i, instruction_text(ins))?;
    }
    Ok(())
}

/// Textual token of one instruction, e.g. `i32.const 5` or `call f 2`.
pub fn instruction_text(ins: &I) -> String {
    let name = ins.to_string();
    match ins {
        I::Const(n) => format!("{} {}", name, n),
        I::LocalGet(ix) | I::LocalSet(ix) => format!("{} {}", name, ix),
        I::Br(off) | I::BrUnless(off) => format!("{} {}", name, off),
        I::Call(label, argc) => format!("{} {} {}", name, label, argc),
        I::CallHost(host) => format!("{} {}", name, host),
        // No operands
        _ => name,
    }
}

/// The flat instruction token list of a procedure.
pub fn instruction_tokens(proc: &Procedure) -> Vec<String> {
    proc.code.iter().map(instruction_text).collect()
}
