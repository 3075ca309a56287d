use logos::Logos;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct LexExtras {
    pub error_message: Option<String>,
}

#[derive(Logos, Debug, PartialEq, Clone)]
#[logos(extras = LexExtras)]
#[logos(skip r"[ \t\r]+")]
#[logos(skip r"#[^\n]*")]
pub enum RawToken {
    // Keywords
    #[token("if")]
    If,
    #[token("elif")]
    Elif,
    #[token("else")]
    Else,
    #[token("while")]
    While,
    #[token("def")]
    Def,
    #[token("class")]
    Class,
    #[token("return")]
    Return,
    #[token("pass")]
    Pass,
    #[token("not")]
    Not,
    #[token("is")]
    Is,
    #[token("None")]
    None,

    // Identifiers and literals
    #[token("True", |_| true)]
    #[token("False", |_| false)]
    Bool(bool),
    #[regex(r"[0-9]+", lex_integer)]
    Int(u32),
    #[regex(r"\p{XID_Start}\p{XID_Continue}*|_\p{XID_Continue}*", lex_identifier)]
    Identifier(String),

    // Operators and punctuation
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("//")]
    SlashSlash,
    #[token("%")]
    Percent,
    #[token("==")]
    EqualEqual,
    #[token("!=")]
    NotEqual,
    #[token("<")]
    Less,
    #[token("<=")]
    LessEqual,
    #[token(">")]
    Greater,
    #[token(">=")]
    GreaterEqual,
    #[token("=")]
    Equal,
    #[token("->")]
    Arrow,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token(":")]
    Colon,
    #[token(",")]
    Comma,
    #[token(".")]
    Dot,

    #[token("\n")]
    Newline,
}

/// Magnitude of the smallest word. The parser only accepts it right after a
/// minus sign.
pub const MIN_WORD_MAGNITUDE: u32 = 1 << 31;

fn lex_integer(lexer: &mut logos::Lexer<RawToken>) -> Option<u32> {
    let slice = lexer.slice();
    match slice.parse::<u32>() {
        Ok(n) if n <= MIN_WORD_MAGNITUDE => Some(n),
        _ => {
            lexer.extras.error_message = Some(format!(
                "Integer literal '{}' is out of range for a 32-bit word",
                slice
            ));
            None
        }
    }
}

fn lex_identifier(lexer: &mut logos::Lexer<RawToken>) -> Option<String> {
    Some(lexer.slice().to_string())
}
