/// Lexer for expression text.
///
/// The [`Lexer`] walks a `&str` and implements [`Iterator`] over shared
/// [`Token`]s. It never fails once constructed: text it cannot classify
/// becomes a one-character identifier, and an unterminated string ends at
/// the line break that cut it off.
///
/// # Literal syntax
///
/// | Form              | Example                  | Value                    |
/// |-------------------|--------------------------|--------------------------|
/// | Decimal           | `1_000`, `2.5e3`         | narrowest int, or double |
/// | Hex / binary      | `0xFF`, `0b1010`         | narrowest int            |
/// | Suffixed          | `1.5f`, `2d`, `3m`, `4UL`| float, double, decimal, … |
/// | String            | `'a\n'`, `"\u0042"`      | escapes decoded          |
/// | Verbatim string   | `@"c:\dir"`, `@'it''s'`  | no escapes, `''` embeds  |
use std::sync::Arc;

use crate::error::CompileError;
use crate::ops::parse_decimal;
use crate::pool::Pool;
use crate::token::{Token, TokenKind};
use crate::value::Value;

/// Longest accepted expression, in characters.
pub const MAX_EXPRESSION_LENGTH: usize = 1024;

/// Scratch buffers for decoded identifiers and numeric value text.
static SCRATCH: Pool<String> = Pool::new(8);

// ═══════════════════════════════════════════════════════════════════
// Character classes
// ═══════════════════════════════════════════════════════════════════

fn is_whitespace(c: char) -> bool {
    matches!(
        c,
        ' ' | '\t'
            | '\u{000B}'
            | '\u{000C}'
            | '\u{00A0}'
            | '\u{FEFF}'
            | '\u{001A}'
            | '\u{1680}'
            | '\u{2000}'..='\u{200A}'
            | '\u{202F}'
            | '\u{205F}'
            | '\u{3000}'
    )
}

fn is_newline(c: char) -> bool {
    matches!(c, '\r' | '\n' | '\u{0085}' | '\u{2028}' | '\u{2029}')
}

/// Characters that end an identifier.
fn is_identifier_terminator(c: char) -> bool {
    matches!(
        c,
        '\0' | ' '
            | '\r'
            | '\n'
            | '\t'
            | '!'
            | '%'
            | '('
            | ')'
            | '*'
            | '+'
            | ','
            | '-'
            | '.'
            | '/'
            | ':'
            | ';'
            | '<'
            | '='
            | '>'
            | '?'
            | '['
            | ']'
            | '^'
            | '{'
            | '|'
            | '}'
            | '~'
            | '"'
            | '\''
            | '&'
    )
}

fn is_ascii_identifier_start(c: char) -> bool {
    c == '_' || c.is_ascii_alphabetic()
}

fn is_ascii_identifier_part(c: char) -> bool {
    c == '_' || c.is_ascii_alphanumeric()
}

fn is_identifier_start(c: char) -> bool {
    !c.is_ascii() || is_ascii_identifier_start(c)
}

fn is_identifier_part(c: char) -> bool {
    !c.is_ascii() || is_ascii_identifier_part(c)
}

/// Unicode format characters (general category Cf). Skipped inside
/// identifiers.
fn is_format_char(c: char) -> bool {
    matches!(
        c,
        '\u{00AD}'
            | '\u{0600}'..='\u{0605}'
            | '\u{061C}'
            | '\u{06DD}'
            | '\u{070F}'
            | '\u{0890}'..='\u{0891}'
            | '\u{08E2}'
            | '\u{180E}'
            | '\u{200B}'..='\u{200F}'
            | '\u{202A}'..='\u{202E}'
            | '\u{2060}'..='\u{2064}'
            | '\u{2066}'..='\u{206F}'
            | '\u{FEFF}'
            | '\u{FFF9}'..='\u{FFFB}'
            | '\u{110BD}'
            | '\u{110CD}'
            | '\u{13430}'..='\u{1343F}'
            | '\u{1BCA0}'..='\u{1BCA3}'
            | '\u{1D173}'..='\u{1D17A}'
            | '\u{E0001}'
            | '\u{E0020}'..='\u{E007F}'
    )
}

fn decode_simple_escape(c: char) -> char {
    match c {
        '0' => '\0',
        'a' => '\u{0007}',
        'b' => '\u{0008}',
        'f' => '\u{000C}',
        'n' => '\n',
        'r' => '\r',
        't' => '\t',
        'v' => '\u{000B}',
        other => other,
    }
}

// ═══════════════════════════════════════════════════════════════════
// Lexer
// ═══════════════════════════════════════════════════════════════════

pub struct Lexer<'a> {
    src: &'a str,
    /// Byte offset of the next unread character.
    pos: usize,
}

impl<'a> Lexer<'a> {
    /// Fails when `src` is longer than [`MAX_EXPRESSION_LENGTH`].
    pub fn new(src: &'a str) -> Result<Self, CompileError> {
        let len = src.chars().count();
        if len > MAX_EXPRESSION_LENGTH {
            return Err(CompileError::TooLong {
                len,
                max: MAX_EXPRESSION_LENGTH,
            });
        }
        Ok(Self { src, pos: 0 })
    }

    /// Lexes all of `src` eagerly.
    pub fn tokenize(src: &'a str) -> Result<Vec<Arc<Token>>, CompileError> {
        Ok(Self::new(src)?.collect())
    }

    /// Rewinds to the start of the input.
    pub fn reset(&mut self) {
        self.pos = 0;
    }

    // ───────────────────────────────────────────────────────────
    //  Cursor
    // ───────────────────────────────────────────────────────────

    fn is_at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    /// Current character, `'\0'` at end of input.
    fn peek(&self) -> char {
        self.rest().chars().next().unwrap_or('\0')
    }

    /// The character `n` positions past the current one.
    fn peek_ahead(&self, n: usize) -> char {
        self.rest().chars().nth(n).unwrap_or('\0')
    }

    fn advance(&mut self) {
        if let Some(c) = self.rest().chars().next() {
            self.pos += c.len_utf8();
        }
    }

    fn try_advance(&mut self, c: char) -> bool {
        if self.is_at_end() || self.peek() != c {
            return false;
        }
        self.advance();
        true
    }

    // ───────────────────────────────────────────────────────────
    //  Whitespace
    // ───────────────────────────────────────────────────────────

    fn skip_whitespace(&mut self) {
        while !self.is_at_end() {
            let c = self.peek();
            if c == '\0' {
                return;
            }
            if is_whitespace(c) {
                self.advance();
            } else if is_newline(c) {
                // `\r\n` is one break.
                self.advance();
                if c == '\r' {
                    self.try_advance('\n');
                }
            } else {
                return;
            }
        }
    }

    // ───────────────────────────────────────────────────────────
    //  Unicode escapes:  \uXXXX   \UXXXXXXXX
    // ───────────────────────────────────────────────────────────

    /// Consumes a Unicode escape at the cursor. Leaves the cursor untouched
    /// and returns `None` when the text is not a valid escape.
    fn try_unicode_escape(&mut self) -> Option<char> {
        if self.peek() != '\\' {
            return None;
        }
        let digits = match self.peek_ahead(1) {
            'u' => 4,
            'U' => 8,
            _ => return None,
        };

        let body = self.rest().get(2..2 + digits)?;
        if !body.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        // `char::from_u32` rejects lone surrogates and values above U+10FFFF.
        let decoded = u32::from_str_radix(body, 16).ok().and_then(char::from_u32)?;
        self.pos += 2 + digits;
        Some(decoded)
    }

    // ───────────────────────────────────────────────────────────
    //  Strings
    // ───────────────────────────────────────────────────────────

    /// Lex a quoted string. The cursor sits on the opening quote or on the
    /// `@` of a verbatim string.
    fn lex_string(&mut self) -> Arc<Token> {
        let start = self.pos;
        let verbatim = self.try_advance('@');
        let delimiter = self.peek();
        self.advance();

        let mut value = String::new();
        loop {
            let c = self.peek();
            // Strings are single-line.
            if self.is_at_end() || c == '\0' || is_newline(c) {
                break;
            }

            if c == delimiter {
                self.advance();
                if verbatim && self.peek() == delimiter && !self.is_at_end() {
                    value.push(delimiter);
                    self.advance();
                    continue;
                }
                break;
            }

            if c == '\\' && !verbatim {
                if let Some(decoded) = self.try_unicode_escape() {
                    value.push(decoded);
                    continue;
                }
                self.advance();
                let escaped = self.peek();
                if self.is_at_end() || escaped == '\0' || is_newline(escaped) {
                    break;
                }
                value.push(decode_simple_escape(escaped));
                self.advance();
                continue;
            }

            value.push(c);
            self.advance();
        }

        let text = &self.src[start..self.pos];
        Token::literal(TokenKind::StringLiteral, text, Value::from(value))
    }

    // ───────────────────────────────────────────────────────────
    //  Numbers
    // ───────────────────────────────────────────────────────────

    /// Appends digits of the given radix to `out`, skipping `_` separators.
    fn scan_digits(&mut self, radix: u32, out: &mut String) {
        loop {
            let c = self.peek();
            if c == '_' {
                self.advance();
                continue;
            }
            if self.is_at_end() || !c.is_digit(radix) {
                break;
            }
            out.push(c);
            self.advance();
        }
    }

    /// Reads an `L`, `U`, `LU` or `UL` suffix as `(unsigned, long)`.
    fn scan_integer_suffix(&mut self) -> (bool, bool) {
        match self.peek() {
            'l' | 'L' => {
                self.advance();
                let unsigned = self.try_advance('u') || self.try_advance('U');
                (unsigned, true)
            }
            'u' | 'U' => {
                self.advance();
                let long = self.try_advance('l') || self.try_advance('L');
                (true, long)
            }
            _ => (false, false),
        }
    }

    /// Reads an `f`, `d` or `m` suffix and parses `digits` as that type.
    fn scan_real_suffix(&mut self, digits: &str) -> Option<Value> {
        let value = match self.peek() {
            'f' | 'F' => Value::Float32(digits.parse().unwrap_or(0.0)),
            'd' | 'D' => Value::Float64(digits.parse().unwrap_or(0.0)),
            'm' | 'M' => Value::Decimal(parse_decimal(digits).unwrap_or_default()),
            _ => return None,
        };
        self.advance();
        Some(value)
    }

    fn lex_number(&mut self) -> Arc<Token> {
        let start = self.pos;
        let mut digits = SCRATCH.rent();

        let radix = match (self.peek(), self.peek_ahead(1)) {
            ('0', 'x' | 'X') => 16,
            ('0', 'b' | 'B') => 2,
            _ => 10,
        };

        let value = if radix != 10 {
            self.advance();
            self.advance();
            self.scan_digits(radix, &mut digits);
            let (unsigned, long) = self.scan_integer_suffix();
            let magnitude = u64::from_str_radix(&digits, radix).unwrap_or(0);
            integer_literal(magnitude, unsigned, long)
        } else {
            self.scan_digits(10, &mut digits);

            let mut real = false;
            if self.peek() == '.' && self.peek_ahead(1).is_ascii_digit() {
                real = true;
                digits.push('.');
                self.advance();
                self.scan_digits(10, &mut digits);
            }

            if matches!(self.peek(), 'e' | 'E') {
                real = true;
                digits.push('e');
                self.advance();
                if matches!(self.peek(), '+' | '-') {
                    digits.push(self.peek());
                    self.advance();
                }
                if self.peek() == '_' || self.peek().is_ascii_digit() {
                    self.scan_digits(10, &mut digits);
                } else {
                    digits.push('0');
                }
            }

            match self.scan_real_suffix(&digits) {
                Some(value) => value,
                None if real => Value::Float64(digits.parse().unwrap_or(0.0)),
                None => {
                    let (unsigned, long) = self.scan_integer_suffix();
                    let magnitude = digits.parse().unwrap_or(0);
                    integer_literal(magnitude, unsigned, long)
                }
            }
        };

        Token::literal(TokenKind::NumericLiteral, &self.src[start..self.pos], value)
    }

    // ───────────────────────────────────────────────────────────
    //  Identifiers and keywords
    // ───────────────────────────────────────────────────────────

    /// Whether the cursor sits where a keyword may end.
    fn at_keyword_boundary(&self) -> bool {
        let c = self.peek();
        self.is_at_end() || is_identifier_terminator(c) || is_whitespace(c) || is_newline(c)
    }

    /// ASCII `[_a-zA-Z][_a-zA-Z0-9]*`. Gives up, consuming nothing, on
    /// anything that needs the slow path.
    fn lex_identifier_fast(&mut self) -> Option<Arc<Token>> {
        let rest = self.rest().as_bytes();
        if !rest.first().is_some_and(|&b| is_ascii_identifier_start(b as char)) {
            return None;
        }
        let len = rest
            .iter()
            .position(|&b| !is_ascii_identifier_part(b as char))
            .unwrap_or(rest.len());
        if rest.get(len).is_some_and(|&b| b == b'\\' || !b.is_ascii()) {
            return None;
        }

        let text = &self.src[self.pos..self.pos + len];
        self.pos += len;

        if let Some(keyword) = TokenKind::keyword(text) {
            if self.at_keyword_boundary() {
                return Some(Token::well_known(keyword));
            }
        }
        Some(Token::identifier(text))
    }

    /// Handles a leading `@`, non-ASCII letters, format characters and
    /// Unicode escapes.
    fn lex_identifier_slow(&mut self) -> Arc<Token> {
        let start = self.pos;
        let mut name = SCRATCH.rent();

        while self.peek() == '@' && !self.is_at_end() {
            self.advance();
        }

        loop {
            let c = self.peek();
            if self.is_at_end()
                || c == '\0'
                || is_whitespace(c)
                || is_newline(c)
                || is_identifier_terminator(c)
            {
                break;
            }

            let mark = self.pos;
            let (ch, escaped) = match self.try_unicode_escape() {
                Some(decoded) => (decoded, true),
                None => (c, false),
            };

            let valid = if name.is_empty() {
                is_identifier_start(ch)
            } else {
                is_identifier_part(ch)
            };
            if !valid {
                self.pos = mark;
                break;
            }

            if !escaped {
                self.advance();
                if !ch.is_ascii() && is_format_char(ch) {
                    continue;
                }
            }
            name.push(ch);
        }

        if name.is_empty() {
            // Always make progress: take exactly one character.
            self.pos = start;
            self.advance();
            return Token::identifier(&self.src[start..self.pos]);
        }
        Token::identifier(&name)
    }

    fn lex_identifier(&mut self) -> Arc<Token> {
        match self.lex_identifier_fast() {
            Some(token) => token,
            None => self.lex_identifier_slow(),
        }
    }

    // ───────────────────────────────────────────────────────────
    //  Main dispatch
    // ───────────────────────────────────────────────────────────

    /// Consumes one character, then the first `(next, kind)` continuation
    /// that matches. Falls back to `single`.
    fn operator(&mut self, single: TokenKind, longer: &[(char, TokenKind)]) -> Arc<Token> {
        self.advance();
        for &(next, kind) in longer {
            if self.try_advance(next) {
                return Token::well_known(kind);
            }
        }
        Token::well_known(single)
    }

    /// Produce the next token, or `None` at end of input.
    pub fn next_token(&mut self) -> Option<Arc<Token>> {
        use TokenKind as K;

        self.skip_whitespace();
        if self.is_at_end() {
            return None;
        }

        let token = match self.peek() {
            '+' => self.operator(K::Plus, &[('+', K::PlusPlus), ('=', K::PlusEquals)]),
            '-' => self.operator(K::Minus, &[('-', K::MinusMinus), ('=', K::MinusEquals)]),
            '*' => self.operator(K::Asterisk, &[('=', K::AsteriskEquals)]),
            '/' => self.operator(K::Slash, &[('=', K::SlashEquals)]),
            '&' => self.operator(
                K::Ampersand,
                &[('&', K::AmpersandAmpersand), ('=', K::AmpersandEquals)],
            ),
            '|' => self.operator(K::Bar, &[('|', K::BarBar), ('=', K::BarEquals)]),
            '^' => self.operator(K::Caret, &[('=', K::CaretEquals)]),
            '=' => self.operator(K::Equals, &[('=', K::EqualEqual)]),
            '!' => self.operator(K::Bang, &[('=', K::BangEquals)]),
            '<' => {
                self.advance();
                if self.try_advance('<') {
                    if self.try_advance('=') {
                        Token::well_known(K::LessLessEquals)
                    } else {
                        Token::well_known(K::LessLess)
                    }
                } else if self.try_advance('=') {
                    Token::well_known(K::LessEquals)
                } else {
                    Token::well_known(K::Less)
                }
            }
            '>' => {
                self.advance();
                if self.try_advance('>') {
                    if self.try_advance('=') {
                        Token::well_known(K::GreaterGreaterEquals)
                    } else {
                        Token::well_known(K::GreaterGreater)
                    }
                } else if self.try_advance('=') {
                    Token::well_known(K::GreaterEquals)
                } else {
                    Token::well_known(K::Greater)
                }
            }
            '?' => {
                self.advance();
                if self.try_advance('?') {
                    if self.try_advance('=') {
                        Token::well_known(K::QuestionQuestionEquals)
                    } else {
                        Token::well_known(K::QuestionQuestion)
                    }
                } else {
                    Token::well_known(K::Question)
                }
            }
            ':' => self.operator(K::Colon, &[]),
            ',' => self.operator(K::Comma, &[]),
            '.' => self.operator(K::Dot, &[]),
            '(' => self.operator(K::OpenParen, &[]),
            ')' => self.operator(K::CloseParen, &[]),
            ';' => self.operator(K::Semicolon, &[]),
            '$' => self.operator(K::Dollar, &[]),
            '[' => self.operator(K::OpenBracket, &[]),
            ']' => self.operator(K::CloseBracket, &[]),
            '{' => self.operator(K::OpenBrace, &[]),
            '}' => self.operator(K::CloseBrace, &[]),
            '~' => self.operator(K::Tilde, &[]),

            // ── `@`: verbatim string, lone `@`, or identifier prefix ──
            '@' => match self.peek_ahead(1) {
                '"' | '\'' => self.lex_string(),
                next if is_identifier_terminator(next) => self.operator(K::At, &[]),
                _ => self.lex_identifier(),
            },

            '"' | '\'' => self.lex_string(),
            '0'..='9' => self.lex_number(),
            _ => self.lex_identifier(),
        };
        Some(token)
    }
}

/// Picks the integer kind for a literal: the narrowest of
/// int32, uint32, int64, uint64 the suffix allows.
fn integer_literal(value: u64, unsigned: bool, long: bool) -> Value {
    match (unsigned, long) {
        (false, false) => {
            if let Ok(v) = i32::try_from(value) {
                Value::Int32(v)
            } else if let Ok(v) = u32::try_from(value) {
                Value::UInt32(v)
            } else if let Ok(v) = i64::try_from(value) {
                Value::Int64(v)
            } else {
                Value::UInt64(value)
            }
        }
        (true, false) => u32::try_from(value).map_or(Value::UInt64(value), Value::UInt32),
        (false, true) => i64::try_from(value).map_or(Value::UInt64(value), Value::Int64),
        (true, true) => Value::UInt64(value),
    }
}

impl Iterator for Lexer<'_> {
    type Item = Arc<Token>;

    fn next(&mut self) -> Option<Arc<Token>> {
        self.next_token()
    }
}

// ═══════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn tokens(src: &str) -> Vec<Arc<Token>> {
        Lexer::tokenize(src).unwrap()
    }

    fn kinds(src: &str) -> Vec<TokenKind> {
        tokens(src).into_iter().map(|t| t.kind).collect()
    }

    fn texts(src: &str) -> Vec<String> {
        tokens(src).iter().map(|t| t.text.to_string()).collect()
    }

    fn single_value(src: &str) -> Value {
        let toks = tokens(src);
        assert_eq!(toks.len(), 1, "{src:?} lexed to {toks:?}");
        toks[0].value()
    }

    // ── Limits ────────────────────────────────────────────────

    #[test]
    fn oversized_input_is_rejected() {
        let src = "a".repeat(MAX_EXPRESSION_LENGTH + 1);
        assert!(matches!(
            Lexer::new(&src),
            Err(CompileError::TooLong { len: 1025, max: 1024 })
        ));
        assert!(Lexer::new(&"a".repeat(MAX_EXPRESSION_LENGTH)).is_ok());
    }

    #[test]
    fn empty_and_blank_input() {
        assert!(kinds("").is_empty());
        assert!(kinds(" \t\r\n\u{2028}\u{00A0}").is_empty());
    }

    #[test]
    fn lexer_can_restart() {
        let mut lexer = Lexer::new("$a").unwrap();
        assert_eq!(lexer.by_ref().count(), 2);
        lexer.reset();
        assert_eq!(lexer.count(), 2);
    }

    // ── Operators ─────────────────────────────────────────────

    #[test]
    fn operators_and_punctuators() {
        use TokenKind as K;
        assert_eq!(
            kinds("++ += + -- -= - *= * /= / ( ) [ ] { } = == $ ! ; , ."),
            vec![
                K::PlusPlus,
                K::PlusEquals,
                K::Plus,
                K::MinusMinus,
                K::MinusEquals,
                K::Minus,
                K::AsteriskEquals,
                K::Asterisk,
                K::SlashEquals,
                K::Slash,
                K::OpenParen,
                K::CloseParen,
                K::OpenBracket,
                K::CloseBracket,
                K::OpenBrace,
                K::CloseBrace,
                K::Equals,
                K::EqualEqual,
                K::Dollar,
                K::Bang,
                K::Semicolon,
                K::Comma,
                K::Dot,
            ]
        );
        assert!(tokens("++ += ? :").iter().all(|t| t.is_cached()));
    }

    #[test]
    fn longest_match_operators() {
        use TokenKind as K;
        assert_eq!(
            kinds("<<= << <= < >>= >> >= > ??= ?? ? && &= & || |= | != ^= ^ ~"),
            vec![
                K::LessLessEquals,
                K::LessLess,
                K::LessEquals,
                K::Less,
                K::GreaterGreaterEquals,
                K::GreaterGreater,
                K::GreaterEquals,
                K::Greater,
                K::QuestionQuestionEquals,
                K::QuestionQuestion,
                K::Question,
                K::AmpersandAmpersand,
                K::AmpersandEquals,
                K::Ampersand,
                K::BarBar,
                K::BarEquals,
                K::Bar,
                K::BangEquals,
                K::CaretEquals,
                K::Caret,
                K::Tilde,
            ]
        );
    }

    #[test]
    fn operators_need_no_spaces() {
        use TokenKind as K;
        assert_eq!(
            kinds("$A+=10;$A==10;"),
            vec![
                K::Dollar,
                K::Identifier,
                K::PlusEquals,
                K::NumericLiteral,
                K::Semicolon,
                K::Dollar,
                K::Identifier,
                K::EqualEqual,
                K::NumericLiteral,
                K::Semicolon,
            ]
        );
    }

    // ── Keywords ──────────────────────────────────────────────

    #[test]
    fn keywords_are_whole_words() {
        use TokenKind as K;
        assert_eq!(
            kinds("parameter self null true false"),
            vec![K::Parameter, K::SelfKw, K::Null, K::True, K::False]
        );
        assert_eq!(kinds("parameterX ;"), vec![K::Identifier, K::Semicolon]);
        assert_eq!(texts("parameterX"), vec!["parameterX"]);
        assert_eq!(kinds("$parameter;"), vec![K::Dollar, K::Parameter, K::Semicolon]);
    }

    #[test]
    fn at_prefixed_keyword_is_an_identifier() {
        let toks = tokens("@null");
        assert_eq!(toks[0].kind, TokenKind::Identifier);
        assert_eq!(&*toks[0].text, "null");
    }

    // ── Identifiers ───────────────────────────────────────────

    #[test]
    fn ascii_identifiers() {
        assert_eq!(texts("a _a a1 _a1 ;"), vec!["a", "_a", "a1", "_a1", ";"]);
    }

    #[test]
    fn at_prefix_is_stripped() {
        assert_eq!(texts("@hello ;"), vec!["hello", ";"]);
    }

    #[test]
    fn lone_at_is_its_own_token() {
        assert_eq!(kinds("@ ;"), vec![TokenKind::At, TokenKind::Semicolon]);
    }

    #[test]
    fn unicode_identifiers() {
        assert_eq!(texts("счётчик ;"), vec!["счётчик", ";"]);
        assert_eq!(texts("ab\u{200B}cd"), vec!["abcd"]);
    }

    #[test]
    fn escaped_identifiers() {
        assert_eq!(texts("\\u0061BC ;"), vec!["aBC", ";"]);
        assert_eq!(texts("\\U0001F600face ;"), vec!["😀face", ";"]);
    }

    #[test]
    fn unclassifiable_char_becomes_identifier() {
        assert_eq!(texts("#"), vec!["#"]);
        assert_eq!(texts("%"), vec!["%"]);
        assert_eq!(texts("\0"), vec!["\0"]);
    }

    #[test]
    fn repeated_identifiers_share_a_token() {
        let toks = tokens("$Hello + $Hello - 50 * 50");
        assert_eq!(toks.len(), 9);
        assert!(Arc::ptr_eq(&toks[1], &toks[4]));
        assert!(Arc::ptr_eq(&toks[6], &toks[8]));
    }

    // ── Numbers ───────────────────────────────────────────────

    #[test]
    fn integers_pick_the_narrowest_kind() {
        assert!(matches!(single_value("123"), Value::Int32(123)));
        assert!(matches!(single_value("1_000_000"), Value::Int32(1_000_000)));
        assert!(matches!(single_value("3000000000"), Value::UInt32(3_000_000_000)));
        assert!(matches!(single_value("5000000000"), Value::Int64(5_000_000_000)));
        assert!(matches!(
            single_value("18446744073709551615"),
            Value::UInt64(u64::MAX)
        ));
    }

    #[test]
    fn hex_and_binary() {
        assert!(matches!(single_value("0xFF"), Value::Int32(255)));
        assert!(matches!(single_value("0b1010"), Value::Int32(10)));
        assert!(matches!(single_value("0xFFu"), Value::UInt32(255)));
        assert_eq!(texts("0x_FF"), vec!["0x_FF"]);
    }

    #[test]
    fn integer_suffixes() {
        assert!(matches!(single_value("10U"), Value::UInt32(10)));
        assert!(matches!(single_value("10L"), Value::Int64(10)));
        assert!(matches!(single_value("10UL"), Value::UInt64(10)));
        assert!(matches!(single_value("10lu"), Value::UInt64(10)));
    }

    #[test]
    fn real_literals() {
        assert!(matches!(single_value("1.5f"), Value::Float32(v) if v == 1.5));
        assert!(matches!(single_value("2.25"), Value::Float64(v) if v == 2.25));
        assert!(matches!(single_value("2d"), Value::Float64(v) if v == 2.0));
        assert!(matches!(single_value("1e3"), Value::Float64(v) if v == 1000.0));
        assert!(matches!(single_value("4e"), Value::Float64(v) if v == 4.0));
        assert_eq!(
            single_value("1.25m"),
            Value::Decimal(Decimal::from_str("1.25").unwrap())
        );
    }

    #[test]
    fn dot_without_digit_is_not_a_fraction() {
        use TokenKind as K;
        assert_eq!(kinds("1.x"), vec![K::NumericLiteral, K::Dot, K::Identifier]);
    }

    #[test]
    fn numeric_token_text_is_raw() {
        assert_eq!(texts("1_000UL 0b1_0"), vec!["1_000UL", "0b1_0"]);
    }

    // ── Strings ───────────────────────────────────────────────

    #[test]
    fn quoted_strings() {
        assert_eq!(single_value("\"hello\""), Value::string("hello"));
        assert_eq!(single_value("'hello'"), Value::string("hello"));
    }

    #[test]
    fn simple_escapes_decode_and_text_stays_raw() {
        let toks = tokens("'a\\\\b\\n\\t\\'\\\"'");
        assert_eq!(toks.len(), 1);
        assert_eq!(&*toks[0].text, "'a\\\\b\\n\\t\\'\\\"'");
        assert_eq!(toks[0].value(), Value::string("a\\b\n\t'\""));
    }

    #[test]
    fn unknown_escape_keeps_the_char() {
        assert_eq!(single_value("'\\q'"), Value::string("q"));
        assert_eq!(single_value("'\\0\\a\\v'"), Value::string("\0\u{7}\u{b}"));
    }

    #[test]
    fn unicode_escapes() {
        assert_eq!(single_value("\"A\\u0042C\""), Value::string("ABC"));
        assert_eq!(single_value("'\\U00000041'"), Value::string("A"));
        assert_eq!(single_value("\"\\U0001F600\""), Value::string("😀"));
        assert_eq!(single_value("\"\\uD800\""), Value::string("uD800"));
    }

    #[test]
    fn verbatim_strings() {
        assert_eq!(single_value("@\"a\"\"b\""), Value::string("a\"b"));
        assert_eq!(single_value("@'a''b'"), Value::string("a'b"));
        assert_eq!(single_value("@'c:\\dir'"), Value::string("c:\\dir"));
    }

    #[test]
    fn newline_cuts_a_string_short() {
        let toks = tokens("\"abc\nxyz\"");
        assert_eq!(&*toks[0].text, "\"abc");
        assert_eq!(toks[0].value(), Value::string("abc"));
        assert_eq!(toks[1].kind, TokenKind::Identifier);
        assert_eq!(&*toks[1].text, "xyz");
        assert_eq!(toks[2].kind, TokenKind::StringLiteral);
        assert_eq!(toks[2].value(), Value::string(""));
    }

    #[test]
    fn repeated_strings_share_a_token() {
        let toks = tokens("\"hello\" + \"hello\"");
        assert!(Arc::ptr_eq(&toks[0], &toks[2]));
        assert!(toks[0].is_cached());
    }
}
