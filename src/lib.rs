pub mod builtins;
pub mod config;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod repl;
pub mod runtime_io;
pub mod semantic;
pub mod types;
pub mod vm;

use ariadne::{Color, Label, Report, ReportKind, Source};
use chumsky::Parser;
use chumsky::input::{Input, Stream};
use chumsky::span::SimpleSpan;
use serde::{Deserialize, Serialize};

pub use error::{Error, ErrorKind, Result};
pub use repl::Session;
pub use types::Type;
pub use vm::{CompiledImage, Value, Vm, VmLimits};

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub message: String,
    pub span: std::ops::Range<usize>,
}

impl Diagnostic {
    pub fn format(&self, path: &str, src: &str, kind: &str, code: usize) -> String {
        let mut buffer = Vec::new();
        Report::build(ReportKind::Error, (path, self.span.clone()))
            .with_config(ariadne::Config::new().with_index_type(ariadne::IndexType::Byte))
            .with_code(code)
            .with_message(kind)
            .with_label(
                Label::new((path, self.span.clone()))
                    .with_message(&self.message)
                    .with_color(Color::Red),
            )
            .finish()
            .write((path, Source::from(src)), &mut buffer)
            .ok();
        String::from_utf8_lossy(&buffer).to_string()
    }
}

/// Lexes and parses one chunk. Lexer errors and parser errors are both
/// reported as diagnostics, sorted by position.
pub fn parse_source(src: &str) -> std::result::Result<Vec<parser::ast::StmtS>, Vec<Diagnostic>> {
    let owned;
    let src = if src.ends_with('\n') {
        src
    } else {
        owned = format!("{}\n", src);
        owned.as_str()
    };

    let mut lexer = lexer::Lexer::new(src);
    let mut tokens = Vec::new();
    let mut lex_errors = Vec::new();
    loop {
        let (t, span) = lexer.next_token_with_span();
        match t {
            lexer::token::Token::Eof => break,
            lexer::token::Token::Error(message, span) => lex_errors.push(Diagnostic { message, span }),
            t => tokens.push((t, SimpleSpan::new(span.start, span.end))),
        }
    }
    if !lex_errors.is_empty() {
        return Err(lex_errors);
    }

    let eoi_span = parser::SimpleSpan::new(src.len(), src.len());
    let token_stream = Stream::from_iter(tokens).map(eoi_span, |(t, s)| (t, s));
    match parser::program_parser().parse(token_stream).into_result() {
        Ok(program) => Ok(program),
        Err(errors) => {
            let mut errors = errors;
            errors.sort_by(|x1, x2| {
                let x1 = (x1.span().start, x1.span().end);
                let x2 = (x2.span().start, x2.span().end);
                x1.cmp(&x2)
            });
            let diagnostics = errors
                .into_iter()
                .map(|e| Diagnostic {
                    message: e.reason().to_string(),
                    span: e.span().into_range(),
                })
                .collect();
            Err(diagnostics)
        }
    }
}

/// [`parse_source`] folded into the crate error type: the first diagnostic
/// becomes a `ParseError`.
#[tracing::instrument(level = "debug", skip_all, fields(bytes = src.len()))]
pub fn parse_chunk(src: &str) -> Result<Vec<parser::ast::StmtS>> {
    parse_source(src).map_err(|diagnostics| {
        let extra = diagnostics.len().saturating_sub(1);
        match diagnostics.into_iter().next() {
            Some(d) if extra > 0 => Error::at(
                ErrorKind::ParseError,
                format!("{} (and {} more)", d.message, extra),
                d.span,
            ),
            Some(d) => Error::at(ErrorKind::ParseError, d.message, d.span),
            None => Error::new(ErrorKind::ParseError, "malformed input"),
        }
    })
}

/// A compiled program that can run in a fresh store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedProgram {
    pub image: vm::CompiledImage,
    pub layouts: Vec<vm::ClassLayout>,
    pub globals: Vec<(String, Type)>,
    pub result_type: Type,
}

pub fn save_program(program: &SavedProgram, path: &str) -> Result<()> {
    let cfg = bincode::config::standard();
    let bytes = bincode::serde::encode_to_vec(program, cfg)
        .map_err(|e| Error::new(ErrorKind::IoError, format!("cannot encode image: {}", e)))?;
    std::fs::write(path, bytes)?;
    Ok(())
}

pub fn load_program(path: &str) -> Result<SavedProgram> {
    let bytes = std::fs::read(path)?;
    let cfg = bincode::config::standard();
    let (program, _consumed): (SavedProgram, usize) = bincode::serde::decode_from_slice(&bytes, cfg)
        .map_err(|e| Error::new(ErrorKind::IoError, format!("cannot decode {}: {}", path, e)))?;
    Ok(program)
}

/// Executes a saved program against a new memory store.
pub fn exec_program<IO: runtime_io::RuntimeIo>(
    program: &SavedProgram,
    limits: VmLimits,
    io: &mut IO,
) -> Result<Value> {
    let mut store = vm::MemoryStore::new();
    for layout in &program.layouts {
        store.declare_class(layout.clone());
    }
    for (name, ty) in &program.globals {
        store.declare_global(name, ty);
    }
    let word = Vm::with_limits(limits).run(&program.image, &mut store, io)?;
    store.value_of(word, &program.result_type)
}
