//! Streaming tokenizer for the `.isa` file family. Bit specifications
//! (`@(...)` groups) are captured as single raw tokens and decoded later by
//! the machine layer, which knows the container width.

use super::diagnostic::{
    DiagnosticLevel, DiagnosticPhase, IsaDiagnostic, SourcePos, SourceSpan,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Colon,
    DoubleColon,
    Identifier,
    Number,
    String,
    /// Raw `@(...)` or `@s(...)` group, lexeme includes the marker.
    BitSpec,
    LBrace,
    RBrace,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Pipe,
    Equals,
    Comma,
    Dash,
    Eof,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub span: SourceSpan,
}

impl Token {
    pub fn is(&self, kind: TokenKind) -> bool {
        self.kind == kind
    }
}

pub struct Lexer<'src> {
    src: &'src [u8],
    index: usize,
    line: usize,
    column: usize,
}

impl<'src> Lexer<'src> {
    pub fn new(src: &'src str) -> Self {
        Self {
            src: src.as_bytes(),
            index: 0,
            line: 1,
            column: 1,
        }
    }

    /// Tokenizes the whole source, collecting every defect instead of
    /// stopping at the first.
    pub fn tokenize(mut self) -> (Vec<Token>, Vec<IsaDiagnostic>) {
        let mut tokens = Vec::new();
        let mut diagnostics = Vec::new();
        loop {
            match self.next_token() {
                Ok(token) => {
                    let done = token.kind == TokenKind::Eof;
                    tokens.push(token);
                    if done {
                        break;
                    }
                }
                Err(diagnostic) => diagnostics.push(diagnostic),
            }
        }
        (tokens, diagnostics)
    }

    fn next_token(&mut self) -> Result<Token, IsaDiagnostic> {
        self.skip_trivia();
        let start = self.pos();
        let Some(byte) = self.peek() else {
            return Ok(self.token(TokenKind::Eof, String::new(), start));
        };
        match byte {
            b':' => {
                self.bump();
                if self.peek() == Some(b':') {
                    self.bump();
                    Ok(self.token(TokenKind::DoubleColon, "::".into(), start))
                } else {
                    Ok(self.token(TokenKind::Colon, ":".into(), start))
                }
            }
            b'{' => self.single(TokenKind::LBrace, start),
            b'}' => self.single(TokenKind::RBrace, start),
            b'(' => self.single(TokenKind::LParen, start),
            b')' => self.single(TokenKind::RParen, start),
            b'[' => self.single(TokenKind::LBracket, start),
            b']' => self.single(TokenKind::RBracket, start),
            b'|' => self.single(TokenKind::Pipe, start),
            b'=' => self.single(TokenKind::Equals, start),
            b',' => self.single(TokenKind::Comma, start),
            b'-' => self.single(TokenKind::Dash, start),
            b'@' => self.bit_spec(start),
            b'"' => self.string(start),
            b'0'..=b'9' => self.number(start),
            byte if is_ident_start(byte) => self.identifier(start),
            other => {
                self.bump();
                Err(IsaDiagnostic::new(
                    DiagnosticPhase::Lexer,
                    DiagnosticLevel::Error,
                    "lexer.unexpected-character",
                    format!("unexpected character '{}'", other as char),
                    Some(self.span_from(start)),
                ))
            }
        }
    }

    fn single(&mut self, kind: TokenKind, start: SourcePos) -> Result<Token, IsaDiagnostic> {
        let byte = self.bump().expect("peeked byte");
        Ok(self.token(kind, (byte as char).to_string(), start))
    }

    fn identifier(&mut self, start: SourcePos) -> Result<Token, IsaDiagnostic> {
        let mut text = String::new();
        while let Some(byte) = self.peek() {
            if is_ident_continue(byte) {
                text.push(self.bump().unwrap() as char);
            } else {
                break;
            }
        }
        Ok(self.token(TokenKind::Identifier, text, start))
    }

    /// Numbers: `0x`/`0b`/`0o` prefixes or decimal, underscores permitted in
    /// any radix. Raw text is kept; directives decide signedness.
    fn number(&mut self, start: SourcePos) -> Result<Token, IsaDiagnostic> {
        let mut text = String::new();
        while let Some(byte) = self.peek() {
            if byte.is_ascii_alphanumeric() || byte == b'_' {
                text.push(self.bump().unwrap() as char);
            } else {
                break;
            }
        }
        if parse_number(&text).is_none() {
            return Err(IsaDiagnostic::new(
                DiagnosticPhase::Lexer,
                DiagnosticLevel::Error,
                "lexer.bad-number",
                format!("malformed numeric literal '{text}'"),
                Some(self.span_from(start)),
            ));
        }
        Ok(self.token(TokenKind::Number, text, start))
    }

    fn string(&mut self, start: SourcePos) -> Result<Token, IsaDiagnostic> {
        self.bump(); // opening quote
        let mut text = String::new();
        loop {
            match self.bump() {
                Some(b'"') => break,
                Some(b'\n') | None => {
                    return Err(IsaDiagnostic::new(
                        DiagnosticPhase::Lexer,
                        DiagnosticLevel::Error,
                        "lexer.unterminated-string",
                        "string literal is not terminated",
                        Some(self.span_from(start)),
                    ));
                }
                Some(byte) => text.push(byte as char),
            }
        }
        Ok(self.token(TokenKind::String, text, start))
    }

    fn bit_spec(&mut self, start: SourcePos) -> Result<Token, IsaDiagnostic> {
        let mut text = String::from("@");
        self.bump();
        if self.peek() == Some(b's') {
            text.push('s');
            self.bump();
        }
        if self.peek() != Some(b'(') {
            return Err(IsaDiagnostic::new(
                DiagnosticPhase::Lexer,
                DiagnosticLevel::Error,
                "lexer.bad-bit-spec",
                "'@' must introduce a parenthesized bit specification",
                Some(self.span_from(start)),
            ));
        }
        loop {
            match self.bump() {
                Some(b')') => {
                    text.push(')');
                    break;
                }
                Some(b'\n') | None => {
                    return Err(IsaDiagnostic::new(
                        DiagnosticPhase::Lexer,
                        DiagnosticLevel::Error,
                        "lexer.bad-bit-spec",
                        "bit specification is not terminated",
                        Some(self.span_from(start)),
                    ));
                }
                Some(byte) => text.push(byte as char),
            }
        }
        Ok(self.token(TokenKind::BitSpec, text, start))
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(b' ') | Some(b'\t') | Some(b'\r') | Some(b'\n') => {
                    self.bump();
                }
                Some(b'#') => {
                    while let Some(byte) = self.peek() {
                        if byte == b'\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                _ => break,
            }
        }
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.index).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let byte = self.peek()?;
        self.index += 1;
        if byte == b'\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(byte)
    }

    fn pos(&self) -> SourcePos {
        SourcePos {
            line: self.line,
            column: self.column,
        }
    }

    fn span_from(&self, start: SourcePos) -> SourceSpan {
        SourceSpan {
            start,
            end: self.pos(),
        }
    }

    fn token(&self, kind: TokenKind, lexeme: String, start: SourcePos) -> Token {
        Token {
            kind,
            lexeme,
            span: self.span_from(start),
        }
    }
}

fn is_ident_start(byte: u8) -> bool {
    byte.is_ascii_alphabetic() || byte == b'_' || byte == b'$' || byte == b'.'
}

fn is_ident_continue(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'$' || byte == b'.'
}

/// Numbers: prefixes `0x` (hex), `0b` (binary), `0o` (octal), decimal
/// default, underscores permitted.
pub fn parse_number(text: &str) -> Option<u64> {
    let cleaned = text.replace('_', "");
    let (radix, digits) = if let Some(stripped) = cleaned.strip_prefix("0x") {
        (16, stripped)
    } else if let Some(stripped) = cleaned.strip_prefix("0b") {
        (2, stripped)
    } else if let Some(stripped) = cleaned.strip_prefix("0o") {
        (8, stripped)
    } else {
        (10, cleaned.as_str())
    };
    if digits.is_empty() {
        return None;
    }
    u64::from_str_radix(digits, radix).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        let (tokens, diagnostics) = Lexer::new(src).tokenize();
        assert!(diagnostics.is_empty(), "unexpected diagnostics: {diagnostics:?}");
        tokens.into_iter().map(|token| token.kind).collect()
    }

    #[test]
    fn directive_line_tokenizes() {
        let kinds = kinds(":space regs addr=32 type=register");
        assert_eq!(
            kinds,
            vec![
                TokenKind::Colon,
                TokenKind::Identifier,
                TokenKind::Identifier,
                TokenKind::Identifier,
                TokenKind::Equals,
                TokenKind::Number,
                TokenKind::Identifier,
                TokenKind::Equals,
                TokenKind::Identifier,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn bit_specs_capture_raw_groups() {
        let (tokens, diagnostics) = Lexer::new("OPCD @(0-5) SI @s(16-31|0b00)").tokenize();
        assert!(diagnostics.is_empty());
        let specs: Vec<&str> = tokens
            .iter()
            .filter(|token| token.kind == TokenKind::BitSpec)
            .map(|token| token.lexeme.as_str())
            .collect();
        assert_eq!(specs, vec!["@(0-5)", "@s(16-31|0b00)"]);
    }

    #[test]
    fn numbers_accept_all_radixes_and_underscores() {
        assert_eq!(parse_number("0x1F"), Some(31));
        assert_eq!(parse_number("0b1010"), Some(10));
        assert_eq!(parse_number("0o17"), Some(15));
        assert_eq!(parse_number("1_000"), Some(1000));
        assert_eq!(parse_number("0x"), None);
    }

    #[test]
    fn comments_run_to_end_of_line() {
        let kinds = kinds("alpha # trailing words :{}=\nbeta");
        assert_eq!(
            kinds,
            vec![TokenKind::Identifier, TokenKind::Identifier, TokenKind::Eof]
        );
    }

    #[test]
    fn defects_collect_instead_of_aborting() {
        let (tokens, diagnostics) = Lexer::new("good ~ \"open").tokenize();
        assert_eq!(diagnostics.len(), 2);
        assert!(diagnostics.iter().all(|d| d.phase == DiagnosticPhase::Lexer));
        assert!(tokens.iter().any(|t| t.lexeme == "good"));
    }

    #[test]
    fn double_colon_is_one_token() {
        let kinds = kinds(":vle::BD8 se_b");
        assert_eq!(
            kinds,
            vec![
                TokenKind::Colon,
                TokenKind::Identifier,
                TokenKind::DoubleColon,
                TokenKind::Identifier,
                TokenKind::Identifier,
                TokenKind::Eof,
            ]
        );
    }
}
