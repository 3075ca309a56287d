use crate::Diagnostic;
use crate::types::Span;
use strum::Display;
use thiserror::Error;

/// Failure categories reported to the user. Every pipeline stage fails with
/// exactly one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ErrorKind {
    ParseError,
    NameError,
    TypeError,
    CallError,
    DuplicateDefinitionError,
    NullReferenceError,
    InternalError,
    RuntimeError,
    IoError,
}

impl ErrorKind {
    /// Report code shown by the diagnostic renderer.
    pub fn code(self) -> usize {
        match self {
            ErrorKind::ParseError => 1,
            ErrorKind::NameError => 2,
            ErrorKind::TypeError => 3,
            ErrorKind::CallError => 4,
            ErrorKind::DuplicateDefinitionError => 5,
            ErrorKind::NullReferenceError => 6,
            ErrorKind::RuntimeError => 7,
            ErrorKind::IoError => 8,
            ErrorKind::InternalError => 99,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind}: {message}")]
pub struct Error {
    pub kind: ErrorKind,
    pub message: String,
    pub span: Option<Span>,
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            span: None,
        }
    }

    pub fn at(kind: ErrorKind, message: impl Into<String>, span: Span) -> Self {
        Self {
            kind,
            message: message.into(),
            span: Some(span),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InternalError, message)
    }

    /// Attaches `span` unless a more precise one is already present.
    pub fn or_span(mut self, span: &Span) -> Self {
        if self.span.is_none() {
            self.span = Some(span.clone());
        }
        self
    }

    pub fn diagnostic(&self) -> Option<Diagnostic> {
        self.span.as_ref().map(|span| Diagnostic {
            message: self.message.clone(),
            span: span.clone(),
        })
    }

    /// Human readable report; uses the source excerpt when a span is known.
    pub fn render(&self, path: &str, src: &str) -> String {
        match self.diagnostic() {
            Some(diag) => diag.format(path, src, &self.kind.to_string(), self.kind.code()),
            None => self.to_string(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::new(ErrorKind::IoError, e.to_string())
    }
}
