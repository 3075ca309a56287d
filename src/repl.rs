//! Incremental sessions and the interactive REPL.
//!
//! A `Session` accumulates globals, classes, functions and compiled
//! procedures across chunks. Each chunk is staged against clones of that
//! state and only committed once every stage, execution included, succeeded.

use crate::builtins;
use crate::error::{Error, ErrorKind, Result};
use crate::runtime_io::{RuntimeIo, StdIo};
use crate::semantic::{self, GlobalTable};
use crate::types::Type;
use crate::vm::disasm::disassemble_image_to_string;
use crate::vm::{CompiledImage, Compiler, MemoryStore, Value, Vm, VmLimits};
use crate::{SavedProgram, parse_chunk};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::path::PathBuf;

/// State produced by a chunk that compiled but is not committed yet.
#[derive(Debug, Clone)]
pub struct StagedChunk {
    pub globals: GlobalTable,
    pub store: MemoryStore,
    pub image: CompiledImage,
    pub result_type: Type,
    /// Chunks committed to the session before this one.
    pub prior_chunks: usize,
}

impl StagedChunk {
    /// Image, layouts and global slots of a chunk staged on a fresh session.
    /// Later chunks depend on heap objects and global values that the image
    /// does not reproduce, so they cannot be saved.
    pub fn saved_program(&self) -> Result<SavedProgram> {
        if self.prior_chunks > 0 {
            return Err(Error::new(
                ErrorKind::IoError,
                format!(
                    "only a session's first chunk can be saved ({} chunk(s) came before this one)",
                    self.prior_chunks
                ),
            ));
        }
        Ok(SavedProgram {
            image: self.image.clone(),
            layouts: self.store.layouts().to_vec(),
            globals: self
                .store
                .globals()
                .iter()
                .map(|g| (g.name.clone(), g.ty.clone()))
                .collect(),
            result_type: self.result_type.clone(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    globals: GlobalTable,
    store: MemoryStore,
    image: CompiledImage,
    limits: VmLimits,
    chunks: usize,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self::with_limits(VmLimits::default())
    }

    pub fn with_limits(limits: VmLimits) -> Self {
        Self {
            globals: GlobalTable::with_builtins(),
            store: MemoryStore::new(),
            image: CompiledImage::new(),
            limits,
            chunks: 0,
        }
    }

    /// Parses, organizes, checks and compiles `src` without touching the
    /// session.
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn stage(&self, src: &str) -> Result<StagedChunk> {
        let stmts = parse_chunk(src)?;
        let mut globals = self.globals.clone();
        let program = semantic::organize(stmts, &mut globals)?;

        let mut store = self.store.clone();
        let mut image = self.image.clone();
        Compiler::new(&globals, &mut store, &mut image).compile(&program)?;

        Ok(StagedChunk {
            globals,
            store,
            image,
            result_type: program.result_type,
            prior_chunks: self.chunks,
        })
    }

    /// Runs one chunk, printing to stdout.
    pub fn run(&mut self, src: &str) -> Result<Value> {
        self.run_with_io(src, &mut StdIo)
    }

    pub fn run_with_io<IO: RuntimeIo>(&mut self, src: &str, io: &mut IO) -> Result<Value> {
        let result = self.execute_chunk(src, io);
        match &result {
            Ok(value) => tracing::debug!(%value, "chunk committed"),
            Err(e) => tracing::debug!(kind = %e.kind, "chunk rolled back"),
        }
        result
    }

    fn execute_chunk<IO: RuntimeIo>(&mut self, src: &str, io: &mut IO) -> Result<Value> {
        let mut staged = self.stage(src)?;
        let word = Vm::with_limits(self.limits).run(&staged.image, &mut staged.store, io)?;
        let value = staged.store.value_of(word, &staged.result_type)?;
        self.commit(staged);
        Ok(value)
    }

    pub fn commit(&mut self, staged: StagedChunk) {
        self.globals = staged.globals;
        self.store = staged.store;
        self.image = staged.image;
        self.chunks += 1;
    }

    /// Static type of the chunk's last statement, without executing it or
    /// changing the session.
    pub fn typecheck_only(&self, src: &str) -> Result<Type> {
        let stmts = parse_chunk(src)?;
        let mut globals = self.globals.clone();
        let program = semantic::organize(stmts, &mut globals)?;
        Ok(program.result_type)
    }

    pub fn globals(&self) -> &GlobalTable {
        &self.globals
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    pub fn image(&self) -> &CompiledImage {
        &self.image
    }

    pub fn limits(&self) -> VmLimits {
        self.limits
    }

    pub fn global_value(&self, name: &str) -> Option<&Value> {
        self.store.global(name).map(|g| &g.value)
    }

    /// `name: type = value` per global, in declaration order.
    pub fn describe_globals(&self) -> Vec<String> {
        self.store
            .globals()
            .iter()
            .map(|g| format!("{}: {} = {}", g.name, g.ty, g.value))
            .collect()
    }

    /// Signatures of user functions and methods.
    pub fn describe_functions(&self) -> Vec<String> {
        let mut lines: Vec<String> = self
            .globals
            .functions()
            .filter(|f| builtins::host_fn(&f.signature()).is_none())
            .map(|f| format!("{} -> {}", f.signature(), f.ret))
            .collect();
        for class in self.globals.classes() {
            lines.extend(
                class
                    .methods
                    .iter()
                    .map(|m| format!("{}.{} -> {}", class.name, m.signature(), m.identity.ret)),
            );
        }
        lines
    }

    pub fn describe_classes(&self) -> Vec<String> {
        self.globals
            .classes()
            .iter()
            .map(|c| {
                let attrs: Vec<String> = c
                    .class_vars
                    .iter()
                    .map(|v| format!("{}: {}", v.name, v.decl.ty))
                    .collect();
                format!("{} (type code {}) {{{}}}", c.name, c.type_code, attrs.join(", "))
            })
            .collect()
    }
}

fn print_lines(lines: Vec<String>, empty: &str) {
    if lines.is_empty() {
        println!("{}", empty);
    }
    for line in lines {
        println!("  {}", line);
    }
}

/// Handles a `:command`. Returns true when the REPL should exit.
pub fn handle_command(cmd: &str, session: &mut Session) -> std::result::Result<bool, String> {
    let parts: Vec<&str> = cmd.split_whitespace().collect();
    if parts.is_empty() {
        return Ok(false);
    }

    match parts[0] {
        ":quit" | ":q" => Ok(true),
        ":help" | ":h" => {
            print_help();
            Ok(false)
        }
        ":clear" | ":c" => {
            *session = Session::with_limits(session.limits());
            println!("Session cleared.");
            Ok(false)
        }
        ":globals" | ":g" => {
            print_lines(session.describe_globals(), "No globals declared.");
            Ok(false)
        }
        ":functions" | ":f" => {
            print_lines(session.describe_functions(), "No functions defined.");
            Ok(false)
        }
        ":classes" => {
            print_lines(session.describe_classes(), "No classes defined.");
            Ok(false)
        }
        ":type" | ":t" => {
            if parts.len() < 2 {
                return Err("Usage: :type <expression>".to_string());
            }
            let expr = parts[1..].join(" ");
            let ty = session
                .typecheck_only(&expr)
                .map_err(|e| e.render("<repl>", &expr))?;
            println!("{}", ty);
            Ok(false)
        }
        ":disasm" | ":d" => {
            print!("{}", disassemble_image_to_string(session.image()));
            Ok(false)
        }
        _ => Err(format!("Unknown command: {}", parts[0])),
    }
}

fn print_help() {
    println!(
        r#"Typhon REPL Commands:
  :quit, :q          Exit the REPL
  :help, :h          Show this help
  :clear, :c         Clear all definitions
  :globals, :g       List global variables and their values
  :functions, :f     List defined functions and methods
  :classes           List classes with type codes and attributes
  :type <expr>, :t   Show the static type of an expression
  :disasm, :d        Disassemble the compiled image

Tips:
  - Lines ending with ':' continue on the next line
  - An empty line closes an indented block
  - Use Ctrl+C to discard the current input
"#
    );
}

/// True if `line` opens a block.
pub fn needs_more_lines(line: &str) -> bool {
    line.trim_end().ends_with(':')
}

/// True if the last non-empty line of `buffer` is indented.
pub fn is_in_block(buffer: &str) -> bool {
    buffer
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .map(|line| line.starts_with(' ') || line.starts_with('\t'))
        .unwrap_or(false)
}

/// Indentation to pre-fill on the next continuation line.
pub fn calculate_indent(buffer: &str) -> String {
    let Some(last_line) = buffer.lines().last() else {
        return String::new();
    };
    let current = last_line.len() - last_line.trim_start().len();
    if needs_more_lines(last_line) {
        " ".repeat(current + 2)
    } else {
        " ".repeat(current)
    }
}

fn history_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".typhon_history"))
}

fn readline_error(e: ReadlineError) -> Error {
    Error::new(ErrorKind::IoError, format!("line editor failed: {}", e))
}

fn eval_and_print(session: &mut Session, src: &str) {
    match session.run(src) {
        Ok(Value::None) => {}
        Ok(value) => println!("{}", value),
        Err(e) => eprintln!("{}", e.render("<repl>", src)),
    }
}

/// Interactive loop on stdin/stdout until `:quit` or EOF.
pub fn run_repl(limits: VmLimits) -> Result<()> {
    let mut rl = DefaultEditor::new().map_err(readline_error)?;
    let history = history_path();
    if let Some(path) = &history {
        // missing history on first start is fine
        let _ = rl.load_history(path);
    }

    let mut session = Session::with_limits(limits);
    let mut buffer = String::new();
    println!("Typhon REPL. Type :help for commands.");

    loop {
        let prompt = if buffer.is_empty() { ">>> " } else { "... " };
        let indent = calculate_indent(&buffer);
        match rl.readline_with_initial(prompt, (indent.as_str(), "")) {
            Ok(line) => {
                if buffer.is_empty() && line.trim_start().starts_with(':') {
                    let _ = rl.add_history_entry(line.as_str());
                    match handle_command(&line, &mut session) {
                        Ok(true) => break,
                        Ok(false) => {}
                        Err(message) => eprintln!("{}", message),
                    }
                    continue;
                }
                if buffer.is_empty() && line.trim().is_empty() {
                    continue;
                }

                buffer.push_str(&line);
                buffer.push('\n');
                if needs_more_lines(&line) || (is_in_block(&buffer) && !line.trim().is_empty()) {
                    continue;
                }

                let _ = rl.add_history_entry(buffer.trim_end());
                eval_and_print(&mut session, &buffer);
                buffer.clear();
            }
            Err(ReadlineError::Interrupted) => {
                buffer.clear();
                println!("^C");
            }
            Err(ReadlineError::Eof) => break,
            Err(e) => return Err(readline_error(e)),
        }
    }

    if let Some(path) = &history
        && let Err(e) = rl.save_history(path)
    {
        tracing::warn!(error = %e, "could not save REPL history");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime_io::BufferIo;

    fn run(session: &mut Session, src: &str) -> Result<Value> {
        session.run_with_io(src, &mut BufferIo::new())
    }

    #[test]
    fn test_session_creation() {
        let session = Session::new();
        assert!(session.store().globals().is_empty());
        assert!(session.image().procedures.is_empty());
        assert!(session.describe_functions().is_empty());
    }

    #[test]
    fn test_globals_persist_across_chunks() {
        let mut session = Session::new();
        assert_eq!(run(&mut session, "x: int = 10\n").unwrap(), Value::None);
        assert_eq!(run(&mut session, "x = x + 5\nx\n").unwrap(), Value::Num(15));
        assert_eq!(session.global_value("x"), Some(&Value::Num(15)));
    }

    #[test]
    fn test_function_definition_and_call() {
        let mut session = Session::new();
        run(&mut session, "def add(a: int, b: int) -> int:\n  return a + b\n").unwrap();
        assert_eq!(run(&mut session, "add(10, 20)\n").unwrap(), Value::Num(30));
        assert_eq!(
            session.describe_functions(),
            vec!["add(number,number,) -> int"]
        );
    }

    #[test]
    fn test_only_first_chunk_can_be_saved() {
        let mut session = Session::new();
        let first = session.stage("x: int = 1\n").unwrap();
        assert_eq!(first.prior_chunks, 0);
        assert!(first.saved_program().is_ok());
        session.commit(first);

        let second = session.stage("x = x + 1\nx\n").unwrap();
        assert_eq!(second.prior_chunks, 1);
        assert_eq!(second.saved_program().unwrap_err().kind, ErrorKind::IoError);

        // a failed chunk is not counted
        assert!(run(&mut session, "1 // 0\n").is_err());
        assert_eq!(session.stage("x\n").unwrap().prior_chunks, 1);
    }

    #[test]
    fn test_error_leaves_state_unchanged() {
        let mut session = Session::new();
        run(&mut session, "x: int = 1\n").unwrap();
        let before = session.describe_globals();

        assert_eq!(run(&mut session, "x = = 10\n").unwrap_err().kind, ErrorKind::ParseError);
        assert_eq!(
            run(&mut session, "y: int = 2\nx = True\n").unwrap_err().kind,
            ErrorKind::TypeError
        );
        assert_eq!(
            run(&mut session, "z: int = 3\n1 // 0\n").unwrap_err().kind,
            ErrorKind::RuntimeError
        );
        assert_eq!(session.describe_globals(), before);
        assert!(session.globals().global("y").is_none());
        assert!(session.globals().global("z").is_none());

        assert_eq!(run(&mut session, "y: int = 2\nx + y\n").unwrap(), Value::Num(3));
    }

    #[test]
    fn test_failed_execution_keeps_heap() {
        let mut session = Session::new();
        run(&mut session, "class C:\n  n: int = 0\nc: C = C()\n").unwrap();
        let heap = session.store().heap_index();
        assert!(run(&mut session, "d: C = C()\nd.n // 0\n").is_err());
        assert_eq!(session.store().heap_index(), heap);
        assert!(session.globals().class("C").is_some());
    }

    #[test]
    fn test_typecheck_only_does_not_commit() {
        let session = Session::new();
        assert_eq!(session.typecheck_only("1 < 2\n").unwrap(), Type::Bool);
        assert_eq!(session.typecheck_only("g: int = 1\n").unwrap(), Type::None);
        assert!(session.globals().global("g").is_none());
        assert_eq!(
            session.typecheck_only("nope\n").unwrap_err().kind,
            ErrorKind::NameError
        );
    }

    #[test]
    fn test_describe_classes_and_globals() {
        let mut session = Session::new();
        run(
            &mut session,
            "class P:\n  x: int = 1\n  ok: bool = True\np: P = P()\n",
        )
        .unwrap();
        assert_eq!(
            session.describe_classes(),
            vec!["P (type code 0) {x: int, ok: bool}"]
        );
        assert_eq!(session.describe_globals(), vec!["p: P = <P object at 1>"]);
    }

    #[test]
    fn test_commands() {
        let mut session = Session::new();
        run(&mut session, "x: int = 1\n").unwrap();
        assert_eq!(handle_command(":q", &mut session), Ok(true));
        assert_eq!(handle_command(":globals", &mut session), Ok(false));
        assert!(handle_command(":type", &mut session).is_err());
        assert!(handle_command(":type x +", &mut session).is_err());
        assert_eq!(handle_command(":type x + 1", &mut session), Ok(false));
        assert!(handle_command(":bogus", &mut session).is_err());

        assert_eq!(handle_command(":clear", &mut session), Ok(false));
        assert!(session.globals().global("x").is_none());
    }

    #[test]
    fn test_multiline_detection() {
        assert!(needs_more_lines("def foo() -> int:"));
        assert!(needs_more_lines("if x > 0:  "));
        assert!(needs_more_lines("while True:"));
        assert!(!needs_more_lines("x = 10"));
        assert!(!needs_more_lines("print(1)"));
    }

    #[test]
    fn test_block_detection() {
        assert!(!is_in_block(""));
        assert!(!is_in_block("x = 1\n"));
        assert!(is_in_block("if True:\n  x = 1\n"));
        assert!(is_in_block("if True:\n  x = 1\n\n"));
    }

    #[test]
    fn test_calculate_indent() {
        assert_eq!(calculate_indent(""), "");
        assert_eq!(calculate_indent("if True:\n"), "  ");
        assert_eq!(calculate_indent("if True:\n  while b:\n"), "    ");
        assert_eq!(calculate_indent("if True:\n  x = 1\n"), "  ");
    }
}
