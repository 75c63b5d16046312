//! # Predicate Lexer - Zero-Copy Tokenizer
//!
//! Byte-wise scanner for the predicate language. All string tokens are
//! borrowed slices into the input; keywords are matched case-insensitively
//! through a compile-time perfect hash map.
//!
//! ## Token Categories
//!
//! - **Keywords**: `AND OR NOT TRUEPREDICATE ... SORT DISTINCT LIMIT`
//! - **Identifiers**: `[A-Za-z_][A-Za-z0-9_]*`
//! - **Constants**: integers (decimal, `0x` hex), floats, `±inf`, `NaN`,
//!   quoted strings with backslash escapes, `B64"..."`, timestamps,
//!   `uuid(...)`, `oid(...)`, `NULL`, `TRUE`, `FALSE`, `$N` arguments
//! - **Operators**: `== != < <= > >= && || !` plus keyword string operators
//! - **Modifiers**: `[c]` after a comparison operator
//! - **Post-ops**: `@links @count @size @max @min @sum @avg`
//! - **Comments**: `// line` and `/* block */` are skipped like whitespace
//!
//! ## Timestamp Lexing
//!
//! Two literal forms exist: `T<seconds>:<nanos>` (either part may be
//! negative) and the readable `YYYY-MM-DD[T@]HH:MM:SS[:NANOS]`. Both start
//! like other tokens (`T` like an identifier, a year like a number), so the
//! scanner speculatively matches the timestamp shape and backtracks when it
//! does not complete.
//!
//! ## Error Handling
//!
//! Invalid input produces `Token::Error` with a static message; the parser
//! turns it into an `InvalidPredicate` error carrying line and column.

use phf::phf_map;

use super::token::{Keyword, Span, Token};

static KEYWORDS: phf::Map<&'static str, Keyword> = phf_map! {
    "AND" => Keyword::And,
    "OR" => Keyword::Or,
    "NOT" => Keyword::Not,
    "TRUEPREDICATE" => Keyword::TruePredicate,
    "FALSEPREDICATE" => Keyword::FalsePredicate,
    "BEGINSWITH" => Keyword::BeginsWith,
    "ENDSWITH" => Keyword::EndsWith,
    "CONTAINS" => Keyword::Contains,
    "LIKE" => Keyword::Like,
    "SORT" => Keyword::Sort,
    "DISTINCT" => Keyword::Distinct,
    "LIMIT" => Keyword::Limit,
    "ASC" => Keyword::Asc,
    "ASCENDING" => Keyword::Ascending,
    "DESC" => Keyword::Desc,
    "DESCENDING" => Keyword::Descending,
    "ANY" => Keyword::Any,
    "SOME" => Keyword::Some,
    "ALL" => Keyword::All,
    "NONE" => Keyword::None,
    "TRUE" => Keyword::True,
    "FALSE" => Keyword::False,
    "NULL" => Keyword::Null,
};

pub struct Lexer<'a> {
    input: &'a str,
    bytes: &'a [u8],
    pos: usize,
    line: u32,
    column: u32,
    token_start: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            bytes: input.as_bytes(),
            pos: 0,
            line: 1,
            column: 1,
            token_start: 0,
        }
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    pub fn column(&self) -> u32 {
        self.column
    }

    pub fn span(&self) -> Span {
        Span::new(self.token_start, self.pos - self.token_start)
    }

    /// The full lexeme of the most recently scanned token.
    pub fn lexeme(&self) -> &'a str {
        &self.input[self.token_start..self.pos]
    }

    pub fn next_token(&mut self) -> Token<'a> {
        self.skip_whitespace_and_comments();
        self.token_start = self.pos;

        if self.is_eof() {
            return Token::Eof;
        }

        let ch = self.current();

        if ch == b'T' {
            if let Some(token) = self.try_scan_raw_timestamp() {
                return token;
            }
        }

        if ch.is_ascii_alphabetic() || ch == b'_' {
            return self.scan_identifier_or_keyword();
        }

        if ch.is_ascii_digit() {
            return self.scan_number_or_timestamp();
        }

        match ch {
            b'\'' | b'"' => self.scan_string(ch),
            b'$' => self.scan_argument(),
            b'-' => self.scan_minus(),
            b'=' => self.scan_equals(),
            b'!' => self.scan_exclamation(),
            b'<' => {
                self.advance();
                if self.current_is(b'=') {
                    self.advance();
                    Token::LessEqual
                } else {
                    Token::Less
                }
            }
            b'>' => {
                self.advance();
                if self.current_is(b'=') {
                    self.advance();
                    Token::GreaterEqual
                } else {
                    Token::Greater
                }
            }
            b'&' => {
                self.advance();
                if self.current_is(b'&') {
                    self.advance();
                    Token::AndAnd
                } else {
                    Token::Error("expected '&&'")
                }
            }
            b'|' => {
                self.advance();
                if self.current_is(b'|') {
                    self.advance();
                    Token::OrOr
                } else {
                    Token::Error("expected '||'")
                }
            }
            b'[' => self.scan_case_modifier(),
            b'@' => self.scan_at_word(),
            b'(' => {
                self.advance();
                Token::LParen
            }
            b')' => {
                self.advance();
                Token::RParen
            }
            b'.' => {
                self.advance();
                Token::Dot
            }
            b',' => {
                self.advance();
                Token::Comma
            }
            _ => {
                self.advance();
                Token::Error("unexpected character")
            }
        }
    }

    pub fn peek(&mut self) -> Token<'a> {
        let saved_pos = self.pos;
        let saved_line = self.line;
        let saved_column = self.column;
        let saved_token_start = self.token_start;

        let token = self.next_token();

        self.pos = saved_pos;
        self.line = saved_line;
        self.column = saved_column;
        self.token_start = saved_token_start;

        token
    }

    fn is_eof(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn current(&self) -> u8 {
        self.bytes[self.pos]
    }

    fn current_is(&self, ch: u8) -> bool {
        !self.is_eof() && self.current() == ch
    }

    fn peek_char(&self) -> Option<u8> {
        self.bytes.get(self.pos + 1).copied()
    }

    fn advance(&mut self) {
        if !self.is_eof() {
            if self.current() == b'\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
            self.pos += 1;
        }
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            while !self.is_eof() {
                match self.current() {
                    b' ' | b'\t' | b'\r' | b'\n' => self.advance(),
                    _ => break,
                }
            }
            if self.current_is(b'/') && self.peek_char() == Some(b'/') {
                while !self.is_eof() && self.current() != b'\n' {
                    self.advance();
                }
                continue;
            }
            if self.current_is(b'/') && self.peek_char() == Some(b'*') {
                self.advance();
                self.advance();
                while !self.is_eof() {
                    if self.current() == b'*' && self.peek_char() == Some(b'/') {
                        self.advance();
                        self.advance();
                        break;
                    }
                    self.advance();
                }
                continue;
            }
            break;
        }
    }

    fn scan_identifier_or_keyword(&mut self) -> Token<'a> {
        let start = self.pos;
        while !self.is_eof() && (self.current().is_ascii_alphanumeric() || self.current() == b'_') {
            self.advance();
        }
        let ident = &self.input[start..self.pos];

        // uuid(...) and oid(...) literal wrappers, lowercase as in the
        // language definition
        if (ident == "uuid" || ident == "oid") && self.current_is(b'(') {
            while !self.is_eof() && self.current() != b')' {
                self.advance();
            }
            if self.is_eof() {
                return Token::Error("unterminated literal, expected ')'");
            }
            self.advance();
            let full = &self.input[start..self.pos];
            return if ident == "uuid" {
                Token::UuidLiteral(full)
            } else {
                Token::OidLiteral(full)
            };
        }

        // B64"..." binary literal
        if ident == "B64" && self.current_is(b'"') {
            self.advance();
            while !self.is_eof() && self.current() != b'"' {
                self.advance();
            }
            if self.is_eof() {
                return Token::Error("unterminated base64 literal");
            }
            self.advance();
            return Token::Base64(&self.input[start..self.pos]);
        }

        let upper = ident.to_ascii_uppercase();
        match upper.as_str() {
            "INF" | "INFINITY" => return Token::Infinity(ident),
            "NAN" => return Token::NaN,
            _ => {}
        }
        if let Some(&keyword) = KEYWORDS.get(&upper) {
            Token::Keyword(keyword)
        } else {
            Token::Ident(ident)
        }
    }

    /// `T<seconds>:<nanos>`; backtracks to identifier scanning when the
    /// shape does not complete.
    fn try_scan_raw_timestamp(&mut self) -> Option<Token<'a>> {
        let saved = (self.pos, self.line, self.column);
        let start = self.pos;
        self.advance(); // 'T'
        if !self.scan_signed_digits() {
            (self.pos, self.line, self.column) = saved;
            return None;
        }
        if !self.current_is(b':') {
            (self.pos, self.line, self.column) = saved;
            return None;
        }
        self.advance();
        if !self.scan_signed_digits() {
            (self.pos, self.line, self.column) = saved;
            return None;
        }
        Some(Token::Timestamp(&self.input[start..self.pos]))
    }

    fn scan_signed_digits(&mut self) -> bool {
        if self.current_is(b'-') {
            self.advance();
        }
        let mut any = false;
        while !self.is_eof() && self.current().is_ascii_digit() {
            self.advance();
            any = true;
        }
        any
    }

    fn scan_digits(&mut self) -> bool {
        let mut any = false;
        while !self.is_eof() && self.current().is_ascii_digit() {
            self.advance();
            any = true;
        }
        any
    }

    fn scan_number_or_timestamp(&mut self) -> Token<'a> {
        let start = self.pos;

        if self.current() == b'0' && matches!(self.peek_char(), Some(b'x') | Some(b'X')) {
            self.advance();
            self.advance();
            let digits = self.pos;
            while !self.is_eof() && self.current().is_ascii_hexdigit() {
                self.advance();
            }
            if self.pos == digits {
                return Token::Error("invalid hex number");
            }
            return Token::Number(&self.input[start..self.pos]);
        }

        self.scan_digits();

        // A '-' after an integer can only start the readable timestamp form.
        if self.current_is(b'-') {
            return self.scan_readable_timestamp(start);
        }

        let mut is_float = false;
        if self.current_is(b'.') && self.peek_char().map_or(false, |c| c.is_ascii_digit()) {
            is_float = true;
            self.advance();
            self.scan_digits();
        }
        if !self.is_eof() && (self.current() == b'e' || self.current() == b'E') {
            is_float = true;
            self.advance();
            if self.current_is(b'+') || self.current_is(b'-') {
                self.advance();
            }
            if !self.scan_digits() {
                return Token::Error("invalid exponent");
            }
        }

        let text = &self.input[start..self.pos];
        if is_float {
            Token::Float(text)
        } else {
            Token::Number(text)
        }
    }

    /// Continues scanning `YYYY-MM-DD[T@]HH:MM:SS[:NANOS]` after the year.
    fn scan_readable_timestamp(&mut self, start: usize) -> Token<'a> {
        let bad = Token::Error("invalid timestamp literal");
        self.advance(); // '-'
        if !self.scan_digits() {
            return bad;
        }
        if !self.current_is(b'-') {
            return bad;
        }
        self.advance();
        if !self.scan_digits() {
            return bad;
        }
        if !(self.current_is(b'T') || self.current_is(b'@')) {
            return bad;
        }
        self.advance();
        if !self.scan_digits() {
            return bad;
        }
        for _ in 0..2 {
            if !self.current_is(b':') {
                return bad;
            }
            self.advance();
            if !self.scan_digits() {
                return bad;
            }
        }
        if self.current_is(b':') {
            self.advance();
            if !self.scan_digits() {
                return bad;
            }
        }
        Token::Timestamp(&self.input[start..self.pos])
    }

    fn scan_string(&mut self, quote: u8) -> Token<'a> {
        let start = self.pos;
        self.advance();
        while !self.is_eof() {
            match self.current() {
                b'\\' => {
                    self.advance();
                    if !self.is_eof() {
                        self.advance();
                    }
                }
                c if c == quote => {
                    self.advance();
                    return Token::String(&self.input[start..self.pos]);
                }
                _ => self.advance(),
            }
        }
        Token::Error("unterminated string literal")
    }

    fn scan_argument(&mut self) -> Token<'a> {
        let start = self.pos;
        self.advance(); // '$'
        if !self.scan_digits() {
            return Token::Error("expected argument number after '$'");
        }
        Token::Arg(&self.input[start..self.pos])
    }

    fn scan_minus(&mut self) -> Token<'a> {
        let start = self.pos;
        self.advance();
        if !self.is_eof() && self.current().is_ascii_digit() {
            let token = self.scan_number_or_timestamp();
            return match token {
                Token::Number(_) => Token::Number(&self.input[start..self.pos]),
                Token::Float(_) => Token::Float(&self.input[start..self.pos]),
                other => other,
            };
        }
        if !self.is_eof() && self.current().is_ascii_alphabetic() {
            if let Token::Infinity(_) = self.scan_identifier_or_keyword() {
                return Token::Infinity(&self.input[start..self.pos]);
            }
            return Token::Error("unexpected '-'");
        }
        Token::Error("unexpected '-'")
    }

    fn scan_equals(&mut self) -> Token<'a> {
        self.advance();
        if self.current_is(b'=') {
            self.advance();
        }
        Token::Equal
    }

    fn scan_exclamation(&mut self) -> Token<'a> {
        self.advance();
        if self.current_is(b'=') {
            self.advance();
            Token::NotEqual
        } else {
            Token::Bang
        }
    }

    fn scan_case_modifier(&mut self) -> Token<'a> {
        self.advance(); // '['
        if (self.current_is(b'c') || self.current_is(b'C'))
            && self.bytes.get(self.pos + 1) == Some(&b']')
        {
            self.advance();
            self.advance();
            Token::CaseInsensitive
        } else {
            Token::Error("expected '[c]'")
        }
    }

    fn scan_at_word(&mut self) -> Token<'a> {
        self.advance(); // '@'
        let start = self.pos;
        while !self.is_eof() && self.current().is_ascii_alphabetic() {
            self.advance();
        }
        match &self.input[start..self.pos] {
            "links" => Token::AtLinks,
            "count" => Token::AtCount,
            "size" => Token::AtSize,
            "max" => Token::AtMax,
            "min" => Token::AtMin,
            "sum" => Token::AtSum,
            "avg" => Token::AtAvg,
            _ => Token::Error("unknown @-operator"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_tokens(input: &str) -> Vec<Token<'_>> {
        let mut lexer = Lexer::new(input);
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
    fn keywords_are_case_insensitive() {
        assert_eq!(
            all_tokens("and AND aNd"),
            vec![
                Token::Keyword(Keyword::And),
                Token::Keyword(Keyword::And),
                Token::Keyword(Keyword::And)
            ]
        );
    }

    #[test]
    fn identifiers_and_operators() {
        assert_eq!(
            all_tokens("age >= 42"),
            vec![Token::Ident("age"), Token::GreaterEqual, Token::Number("42")]
        );
        assert_eq!(
            all_tokens("a == b && c != d"),
            vec![
                Token::Ident("a"),
                Token::Equal,
                Token::Ident("b"),
                Token::AndAnd,
                Token::Ident("c"),
                Token::NotEqual,
                Token::Ident("d"),
            ]
        );
    }

    #[test]
    fn single_equals_is_accepted() {
        assert_eq!(
            all_tokens("a = 1"),
            vec![Token::Ident("a"), Token::Equal, Token::Number("1")]
        );
    }

    #[test]
    fn numbers_and_floats() {
        assert_eq!(
            all_tokens("1 -2 3.5 -4.5e-3 0x1F"),
            vec![
                Token::Number("1"),
                Token::Number("-2"),
                Token::Float("3.5"),
                Token::Float("-4.5e-3"),
                Token::Number("0x1F"),
            ]
        );
    }

    #[test]
    fn infinity_and_nan() {
        assert_eq!(
            all_tokens("inf -inf NaN infinity"),
            vec![
                Token::Infinity("inf"),
                Token::Infinity("-inf"),
                Token::NaN,
                Token::Infinity("infinity"),
            ]
        );
    }

    #[test]
    fn strings_keep_quotes_in_lexeme() {
        assert_eq!(all_tokens("'foo'"), vec![Token::String("'foo'")]);
        assert_eq!(all_tokens("\"bar\""), vec![Token::String("\"bar\"")]);
        assert_eq!(
            all_tokens(r#"'it\'s'"#),
            vec![Token::String(r#"'it\'s'"#)]
        );
    }

    #[test]
    fn unterminated_string_is_an_error() {
        assert!(matches!(all_tokens("'abc")[0], Token::Error(_)));
    }

    #[test]
    fn base64_literal() {
        assert_eq!(
            all_tokens("B64\"Zm9v\""),
            vec![Token::Base64("B64\"Zm9v\"")]
        );
    }

    #[test]
    fn raw_timestamp_forms() {
        assert_eq!(
            all_tokens("T1234:5678"),
            vec![Token::Timestamp("T1234:5678")]
        );
        assert_eq!(
            all_tokens("T-1:-2"),
            vec![Token::Timestamp("T-1:-2")]
        );
    }

    #[test]
    fn t_prefixed_identifier_is_not_a_timestamp() {
        assert_eq!(all_tokens("Total"), vec![Token::Ident("Total")]);
        assert_eq!(all_tokens("T123abc")[0], Token::Ident("T123abc"));
    }

    #[test]
    fn readable_timestamp_forms() {
        assert_eq!(
            all_tokens("2024-01-15T13:45:30"),
            vec![Token::Timestamp("2024-01-15T13:45:30")]
        );
        assert_eq!(
            all_tokens("2024-01-15@13:45:30:500"),
            vec![Token::Timestamp("2024-01-15@13:45:30:500")]
        );
    }

    #[test]
    fn uuid_and_oid_literals() {
        assert_eq!(
            all_tokens("uuid(550e8400-e29b-41d4-a716-446655440000)"),
            vec![Token::UuidLiteral(
                "uuid(550e8400-e29b-41d4-a716-446655440000)"
            )]
        );
        assert_eq!(
            all_tokens("oid(6181253f0b5e9e2a42d06fdb)"),
            vec![Token::OidLiteral("oid(6181253f0b5e9e2a42d06fdb)")]
        );
    }

    #[test]
    fn argument_tokens() {
        assert_eq!(all_tokens("$0 $12"), vec![Token::Arg("$0"), Token::Arg("$12")]);
        assert!(matches!(all_tokens("$x")[0], Token::Error(_)));
    }

    #[test]
    fn case_modifier_and_at_words() {
        assert_eq!(
            all_tokens("CONTAINS[c] x.@count @links"),
            vec![
                Token::Keyword(Keyword::Contains),
                Token::CaseInsensitive,
                Token::Ident("x"),
                Token::Dot,
                Token::AtCount,
                Token::AtLinks,
            ]
        );
    }

    #[test]
    fn comments_are_skipped() {
        assert_eq!(
            all_tokens("a // comment\n== /* block */ 1"),
            vec![Token::Ident("a"), Token::Equal, Token::Number("1")]
        );
    }

    #[test]
    fn line_and_column_tracking() {
        let mut lexer = Lexer::new("a\n  b");
        lexer.next_token();
        lexer.next_token();
        assert_eq!(lexer.line(), 2);
        assert_eq!(lexer.column(), 4);
    }
}
