use std::fmt::{Display, Formatter, Result as FmtResult};
use std::ops::Range;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Keywords
    If,
    Elif,
    Else,
    While,
    Def,
    Class,
    Return,
    Pass,
    Not,
    Is,
    // Identifiers and literals
    None,
    Bool(bool),
    Int(u32),
    Identifier(String),
    // Operators and punctuation
    Plus,
    Minus,
    Star,
    SlashSlash,
    Percent,
    EqualEqual,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Equal,
    Arrow,
    LParen,
    RParen,
    Colon,
    Comma,
    Dot,
    // Layout
    Indent,
    Dedent,
    Newline,
    Eof,

    Error(String, Range<usize>),
}

impl Display for Token {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Token::If => write!(f, "if"),
            Token::Elif => write!(f, "elif"),
            Token::Else => write!(f, "else"),
            Token::While => write!(f, "while"),
            Token::Def => write!(f, "def"),
            Token::Class => write!(f, "class"),
            Token::Return => write!(f, "return"),
            Token::Pass => write!(f, "pass"),
            Token::Not => write!(f, "not"),
            Token::Is => write!(f, "is"),

            Token::None => write!(f, "None"),
            Token::Bool(true) => write!(f, "True"),
            Token::Bool(false) => write!(f, "False"),
            Token::Int(i) => write!(f, "{}", i),
            Token::Identifier(name) => write!(f, "{}", name),

            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Star => write!(f, "*"),
            Token::SlashSlash => write!(f, "//"),
            Token::Percent => write!(f, "%"),
            Token::EqualEqual => write!(f, "=="),
            Token::NotEqual => write!(f, "!="),
            Token::Less => write!(f, "<"),
            Token::LessEqual => write!(f, "<="),
            Token::Greater => write!(f, ">"),
            Token::GreaterEqual => write!(f, ">="),
            Token::Equal => write!(f, "="),
            Token::Arrow => write!(f, "->"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::Colon => write!(f, ":"),
            Token::Comma => write!(f, ","),
            Token::Dot => write!(f, "."),

            Token::Indent => write!(f, "<INDENT>"),
            Token::Dedent => write!(f, "<DEDENT>"),
            Token::Newline => write!(f, "\\n"),
            Token::Eof => write!(f, "<EOF>"),

            Token::Error(msg, _) => write!(f, "<ERROR: {}>", msg),
        }
    }
}
