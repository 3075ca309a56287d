mod raw_token;
pub mod token;

use logos::{Lexer as LogosLexer, Logos};
use raw_token::RawToken;
use std::collections::VecDeque;
use std::ops::Range;
pub use raw_token::MIN_WORD_MAGNITUDE;
pub use token::Token;

/// Indentation-aware tokenizer. Emits `Indent`/`Dedent` around blocks and a
/// trailing run of `Dedent`s at end of input.
pub struct Lexer<'source> {
    inner: LogosLexer<'source, RawToken>,
    token_queue: VecDeque<(Token, Range<usize>)>,
    indent_stack: Vec<usize>,
    at_start_of_line: bool,
}

impl<'source> Lexer<'source> {
    pub fn new(source: &'source str) -> Self {
        Lexer {
            inner: RawToken::lexer(source),
            token_queue: VecDeque::new(),
            indent_stack: vec![0],
            at_start_of_line: true,
        }
    }

    pub fn next_token(&mut self) -> Token {
        let (tok, _) = self.next_token_with_span();
        tok
    }

    pub fn next_token_with_span(&mut self) -> (Token, Range<usize>) {
        if let Some((token, span)) = self.token_queue.pop_front() {
            return (token, span);
        }

        if self.at_start_of_line {
            self.handle_indentation();
            if let Some((token, span)) = self.token_queue.pop_front() {
                return (token, span);
            }
        }

        match self.inner.next() {
            Some(Ok(raw_token)) => {
                let span = self.inner.span();
                let token = Self::convert_token(raw_token);
                if token == Token::Newline {
                    self.at_start_of_line = true;
                }
                (token, span)
            }
            Some(Err(_)) => {
                let span = self.inner.span();
                let error_msg = self
                    .inner
                    .extras
                    .error_message
                    .take()
                    .unwrap_or_else(|| format!("Invalid token '{}'", self.inner.slice()));
                (Token::Error(error_msg, span.clone()), span)
            }
            None => {
                let pos = self.inner.span().end;
                while self.indent_stack.len() > 1 {
                    self.indent_stack.pop();
                    self.token_queue.push_back((Token::Dedent, pos..pos));
                }
                self.token_queue
                    .pop_front()
                    .unwrap_or((Token::Eof, pos..pos))
            }
        }
    }

    fn handle_indentation(&mut self) {
        let line_start = self.inner.span().end;
        let remainder = self.inner.remainder();

        let mut current_indent = 0;
        for ch in remainder.chars() {
            match ch {
                ' ' => current_indent += 1,
                '\t' => {
                    let tab_span = (line_start + current_indent)..(line_start + current_indent + 1);
                    self.token_queue.push_back((
                        Token::Error(
                            "Tabs are not allowed for indentation.".to_string(),
                            tab_span.clone(),
                        ),
                        tab_span,
                    ));
                    self.inner.bump(current_indent + 1);
                    self.at_start_of_line = false;
                    return;
                }
                _ => break,
            }
        }

        self.inner.bump(current_indent);
        let indent_span = line_start..(line_start + current_indent);

        // blank and comment-only lines do not affect the block structure
        if let Some(ch) = remainder.chars().nth(current_indent)
            && ['\n', '\r', '#'].contains(&ch)
        {
            return;
        }

        self.at_start_of_line = false;

        let last_indent = *self.indent_stack.last().unwrap_or(&0);
        if current_indent > last_indent {
            self.indent_stack.push(current_indent);
            self.token_queue.push_back((Token::Indent, indent_span));
        } else if current_indent < last_indent {
            while current_indent < *self.indent_stack.last().unwrap_or(&0) {
                self.indent_stack.pop();
                self.token_queue.push_back((Token::Dedent, indent_span.clone()));
            }
            if current_indent != *self.indent_stack.last().unwrap_or(&0) {
                self.token_queue.push_back((
                    Token::Error(
                        format!(
                            "Invalid dedentation: {} spaces does not match any enclosing block.",
                            current_indent
                        ),
                        indent_span.clone(),
                    ),
                    indent_span,
                ));
            }
        }
    }

    fn convert_token(raw: RawToken) -> Token {
        match raw {
            RawToken::If => Token::If,
            RawToken::Elif => Token::Elif,
            RawToken::Else => Token::Else,
            RawToken::While => Token::While,
            RawToken::Def => Token::Def,
            RawToken::Class => Token::Class,
            RawToken::Return => Token::Return,
            RawToken::Pass => Token::Pass,
            RawToken::Not => Token::Not,
            RawToken::Is => Token::Is,
            RawToken::None => Token::None,

            RawToken::Bool(b) => Token::Bool(b),
            RawToken::Int(i) => Token::Int(i),
            RawToken::Identifier(name) => Token::Identifier(name),

            RawToken::Plus => Token::Plus,
            RawToken::Minus => Token::Minus,
            RawToken::Star => Token::Star,
            RawToken::SlashSlash => Token::SlashSlash,
            RawToken::Percent => Token::Percent,
            RawToken::EqualEqual => Token::EqualEqual,
            RawToken::NotEqual => Token::NotEqual,
            RawToken::Less => Token::Less,
            RawToken::LessEqual => Token::LessEqual,
            RawToken::Greater => Token::Greater,
            RawToken::GreaterEqual => Token::GreaterEqual,
            RawToken::Equal => Token::Equal,
            RawToken::Arrow => Token::Arrow,
            RawToken::LParen => Token::LParen,
            RawToken::RParen => Token::RParen,
            RawToken::Colon => Token::Colon,
            RawToken::Comma => Token::Comma,
            RawToken::Dot => Token::Dot,

            RawToken::Newline => Token::Newline,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ident(s: &str) -> Token {
        Token::Identifier(s.to_string())
    }

    fn collect(source: &str) -> Vec<Token> {
        let mut lexer = Lexer::new(source);
        let mut out = Vec::new();
        loop {
            let t = lexer.next_token();
            if t == Token::Eof {
                break;
            }
            out.push(t);
        }
        out
    }

    #[test]
    fn typed_function() {
        let source = "\
def fact(n: int) -> int:
  if n == 0:
    return 1
  else:
    return n * fact(n - 1)
";
        let expected = vec![
            Token::Def,
            ident("fact"),
            Token::LParen,
            ident("n"),
            Token::Colon,
            ident("int"),
            Token::RParen,
            Token::Arrow,
            ident("int"),
            Token::Colon,
            Token::Newline,
            Token::Indent,
            Token::If,
            ident("n"),
            Token::EqualEqual,
            Token::Int(0),
            Token::Colon,
            Token::Newline,
            Token::Indent,
            Token::Return,
            Token::Int(1),
            Token::Newline,
            Token::Dedent,
            Token::Else,
            Token::Colon,
            Token::Newline,
            Token::Indent,
            Token::Return,
            ident("n"),
            Token::Star,
            ident("fact"),
            Token::LParen,
            ident("n"),
            Token::Minus,
            Token::Int(1),
            Token::RParen,
            Token::Newline,
            Token::Dedent,
            Token::Dedent,
        ];
        assert_eq!(collect(source), expected);
    }

    #[test]
    fn class_with_attribute_and_method() {
        let source = "class C(object):\n    x: int = 0\n    def get(self: C) -> int:\n        return self.x\nC().get()\n";
        let tokens = collect(source);
        assert_eq!(tokens[0], Token::Class);
        assert!(tokens.contains(&Token::Dot));
        assert_eq!(tokens.iter().filter(|t| **t == Token::Indent).count(), 2);
        assert_eq!(tokens.iter().filter(|t| **t == Token::Dedent).count(), 2);
        assert_eq!(tokens.last(), Some(&Token::Newline));
    }

    #[test]
    fn keywords_and_literals() {
        assert_eq!(
            collect("x is None and_ not True"),
            vec![
                ident("x"),
                Token::Is,
                Token::None,
                ident("and_"),
                Token::Not,
                Token::Bool(true)
            ]
        );
    }

    #[test]
    fn blank_and_comment_lines_keep_block() {
        let source = "if True:\n  x = 1\n\n  # note\n  x = 2\n";
        let tokens = collect(source);
        assert_eq!(tokens.iter().filter(|t| **t == Token::Indent).count(), 1);
        assert_eq!(tokens.iter().filter(|t| **t == Token::Dedent).count(), 1);
    }

    #[test]
    fn bad_dedent_is_error() {
        let source = "if True:\n    x = 1\n  x = 2\n";
        let tokens = collect(source);
        assert!(
            tokens
                .iter()
                .any(|t| matches!(t, Token::Error(msg, _) if msg.contains("dedentation")))
        );
    }

    #[test]
    fn integer_overflow() {
        let mut lexer = Lexer::new("99999999999");
        match lexer.next_token() {
            Token::Error(msg, _) => {
                assert!(msg.contains("out of range"), "got: {}", msg);
                assert!(msg.contains("99999999999"));
            }
            other => panic!("expected error token, got {:?}", other),
        }
    }

    #[test]
    fn integer_at_word_max() {
        let mut lexer = Lexer::new("2147483647");
        assert_eq!(lexer.next_token(), Token::Int(i32::MAX as u32));
    }

    #[test]
    fn integer_at_min_word_magnitude() {
        let mut lexer = Lexer::new("2147483648 2147483649");
        assert_eq!(lexer.next_token(), Token::Int(MIN_WORD_MAGNITUDE));
        assert!(matches!(lexer.next_token(), Token::Error(msg, _) if msg.contains("out of range")));
    }

    #[test]
    fn tab_indentation_rejected() {
        let tokens = collect("if True:\n\tx = 1\n");
        assert!(
            tokens
                .iter()
                .any(|t| matches!(t, Token::Error(msg, _) if msg.contains("Tabs")))
        );
    }
}
