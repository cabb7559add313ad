/// Token types produced by the expression lexer.
use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::hash::{Fnv1a, fnv1a};
use crate::slots::SlotCache;
use crate::value::Value;

/// The kind of a lexical token.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// A name, e.g. `Counter` in `$Counter`.
    Identifier,
    /// A quoted string, e.g. `'a'`, `"b"`, `@"c:\dir"`.
    StringLiteral,
    /// A number, e.g. `42`, `0xFF`, `1.5e3m`, `10UL`.
    NumericLiteral,

    /// `+`
    Plus,
    /// `++`
    PlusPlus,
    /// `+=`
    PlusEquals,
    /// `-`
    Minus,
    /// `--`
    MinusMinus,
    /// `-=`
    MinusEquals,
    /// `*`
    Asterisk,
    /// `*=`
    AsteriskEquals,
    /// `/`
    Slash,
    /// `/=`
    SlashEquals,
    /// `&`
    Ampersand,
    /// `&&`
    AmpersandAmpersand,
    /// `&=`
    AmpersandEquals,
    /// `|`
    Bar,
    /// `||`
    BarBar,
    /// `|=`
    BarEquals,
    /// `^`
    Caret,
    /// `^=`
    CaretEquals,
    /// `<`
    Less,
    /// `<=`
    LessEquals,
    /// `<<`
    LessLess,
    /// `<<=`
    LessLessEquals,
    /// `>`
    Greater,
    /// `>=`
    GreaterEquals,
    /// `>>`
    GreaterGreater,
    /// `>>=`
    GreaterGreaterEquals,
    /// `?`
    Question,
    /// `??`
    QuestionQuestion,
    /// `??=`
    QuestionQuestionEquals,
    /// `=`
    Equals,
    /// `==`
    EqualEqual,
    /// `!`
    Bang,
    /// `!=`
    BangEquals,
    /// `:`
    Colon,
    /// `,`
    Comma,
    /// `.`
    Dot,
    /// `(`
    OpenParen,
    /// `)`
    CloseParen,
    /// `;`, the statement separator.
    Semicolon,
    /// `$`, the resource reference prefix.
    Dollar,
    /// `[`
    OpenBracket,
    /// `]`
    CloseBracket,
    /// `{`
    OpenBrace,
    /// `}`
    CloseBrace,
    /// `~`
    Tilde,
    /// A lone `@`.
    At,

    /// The contextual keyword `parameter`.
    Parameter,
    /// The keyword `self`.
    SelfKw,
    /// The keyword `null`.
    Null,
    /// The keyword `true`.
    True,
    /// The keyword `false`.
    False,
}

impl TokenKind {
    /// Every kind with fixed text, in declaration order.
    pub const WELL_KNOWN: [TokenKind; 51] = [
        Self::Plus,
        Self::PlusPlus,
        Self::PlusEquals,
        Self::Minus,
        Self::MinusMinus,
        Self::MinusEquals,
        Self::Asterisk,
        Self::AsteriskEquals,
        Self::Slash,
        Self::SlashEquals,
        Self::Ampersand,
        Self::AmpersandAmpersand,
        Self::AmpersandEquals,
        Self::Bar,
        Self::BarBar,
        Self::BarEquals,
        Self::Caret,
        Self::CaretEquals,
        Self::Less,
        Self::LessEquals,
        Self::LessLess,
        Self::LessLessEquals,
        Self::Greater,
        Self::GreaterEquals,
        Self::GreaterGreater,
        Self::GreaterGreaterEquals,
        Self::Question,
        Self::QuestionQuestion,
        Self::QuestionQuestionEquals,
        Self::Equals,
        Self::EqualEqual,
        Self::Bang,
        Self::BangEquals,
        Self::Colon,
        Self::Comma,
        Self::Dot,
        Self::OpenParen,
        Self::CloseParen,
        Self::Semicolon,
        Self::Dollar,
        Self::OpenBracket,
        Self::CloseBracket,
        Self::OpenBrace,
        Self::CloseBrace,
        Self::Tilde,
        Self::At,
        Self::Parameter,
        Self::SelfKw,
        Self::Null,
        Self::True,
        Self::False,
    ];

    /// Human-readable name for error messages.
    pub fn name(self) -> &'static str {
        match self {
            Self::Identifier => "identifier",
            Self::StringLiteral => "string literal",
            Self::NumericLiteral => "numeric literal",
            Self::Parameter => "`parameter`",
            Self::SelfKw => "`self`",
            Self::Null => "`null`",
            Self::True => "`true`",
            Self::False => "`false`",
            other => other.text().unwrap_or("token"),
        }
    }

    /// The fixed source text of this kind, if it has one.
    pub fn text(self) -> Option<&'static str> {
        Some(match self {
            Self::Identifier | Self::StringLiteral | Self::NumericLiteral => return None,
            Self::Plus => "+",
            Self::PlusPlus => "++",
            Self::PlusEquals => "+=",
            Self::Minus => "-",
            Self::MinusMinus => "--",
            Self::MinusEquals => "-=",
            Self::Asterisk => "*",
            Self::AsteriskEquals => "*=",
            Self::Slash => "/",
            Self::SlashEquals => "/=",
            Self::Ampersand => "&",
            Self::AmpersandAmpersand => "&&",
            Self::AmpersandEquals => "&=",
            Self::Bar => "|",
            Self::BarBar => "||",
            Self::BarEquals => "|=",
            Self::Caret => "^",
            Self::CaretEquals => "^=",
            Self::Less => "<",
            Self::LessEquals => "<=",
            Self::LessLess => "<<",
            Self::LessLessEquals => "<<=",
            Self::Greater => ">",
            Self::GreaterEquals => ">=",
            Self::GreaterGreater => ">>",
            Self::GreaterGreaterEquals => ">>=",
            Self::Question => "?",
            Self::QuestionQuestion => "??",
            Self::QuestionQuestionEquals => "??=",
            Self::Equals => "=",
            Self::EqualEqual => "==",
            Self::Bang => "!",
            Self::BangEquals => "!=",
            Self::Colon => ":",
            Self::Comma => ",",
            Self::Dot => ".",
            Self::OpenParen => "(",
            Self::CloseParen => ")",
            Self::Semicolon => ";",
            Self::Dollar => "$",
            Self::OpenBracket => "[",
            Self::CloseBracket => "]",
            Self::OpenBrace => "{",
            Self::CloseBrace => "}",
            Self::Tilde => "~",
            Self::At => "@",
            Self::Parameter => "parameter",
            Self::SelfKw => "self",
            Self::Null => "null",
            Self::True => "true",
            Self::False => "false",
        })
    }

    /// Keyword kind for a whole identifier, if it is one.
    pub fn keyword(text: &str) -> Option<TokenKind> {
        Some(match text {
            "parameter" => Self::Parameter,
            "self" => Self::SelfKw,
            "null" => Self::Null,
            "true" => Self::True,
            "false" => Self::False,
            _ => return None,
        })
    }

    fn well_known_index(self) -> Option<usize> {
        (self as usize).checked_sub(Self::Plus as usize)
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A lexical token.
///
/// Tokens are shared behind `Arc`. Fixed-text tokens are process-wide
/// singletons; identifiers and literals come from small slot caches, so
/// lexing the same text twice usually yields the same instance.
#[derive(Debug)]
pub struct Token {
    pub kind: TokenKind,
    /// Source text. For identifiers this is the name without any leading `@`.
    pub text: Arc<str>,
    /// Decoded literal value.
    pub value: Option<Value>,
}

const IDENTIFIER_SLOTS: usize = 256;
const LITERAL_SLOTS: usize = 1024;

static WELL_KNOWN: OnceLock<Vec<Arc<Token>>> = OnceLock::new();
static IDENTIFIERS: SlotCache<Arc<Token>, IDENTIFIER_SLOTS> = SlotCache::new();
static LITERALS: SlotCache<Arc<Token>, LITERAL_SLOTS> = SlotCache::new();

fn well_known_table() -> &'static [Arc<Token>] {
    WELL_KNOWN.get_or_init(|| {
        TokenKind::WELL_KNOWN
            .iter()
            .map(|&kind| {
                Arc::new(Token {
                    kind,
                    text: kind.text().unwrap_or_default().into(),
                    value: None,
                })
            })
            .collect()
    })
}

fn literal_hash(kind: TokenKind, text: &str, value: &Value) -> u32 {
    let mut hasher = Fnv1a::new();
    value.hash_into(&mut hasher);
    fnv1a(text) ^ hasher.finish32() ^ kind as u32
}

/// Literal identity for caching: same kind of value and equal contents.
fn same_literal(a: &Value, b: &Value) -> bool {
    a.kind_name() == b.kind_name() && a == b
}

impl Token {
    /// The singleton for a fixed-text kind.
    ///
    /// Variable kinds have no singleton and get a fresh token with empty text.
    pub fn well_known(kind: TokenKind) -> Arc<Token> {
        match kind.well_known_index().and_then(|i| well_known_table().get(i)) {
            Some(token) => Arc::clone(token),
            None => Arc::new(Token {
                kind,
                text: "".into(),
                value: None,
            }),
        }
    }

    pub fn identifier(text: &str) -> Arc<Token> {
        let hash = fnv1a(text);
        if let Some(token) = IDENTIFIERS.get(hash, |t| &*t.text == text) {
            return token;
        }
        let token = Arc::new(Token {
            kind: TokenKind::Identifier,
            text: text.into(),
            value: None,
        });
        IDENTIFIERS.insert(hash, Arc::clone(&token));
        token
    }

    pub fn literal(kind: TokenKind, text: &str, value: Value) -> Arc<Token> {
        let hash = literal_hash(kind, text, &value);
        let hit = LITERALS.get(hash, |t| {
            t.kind == kind
                && &*t.text == text
                && t.value.as_ref().is_some_and(|v| same_literal(v, &value))
        });
        if let Some(token) = hit {
            return token;
        }
        let token = Arc::new(Token {
            kind,
            text: text.into(),
            value: Some(value),
        });
        LITERALS.insert(hash, Arc::clone(&token));
        token
    }

    /// Whether this instance is the one currently held by its cache.
    pub fn is_cached(self: &Arc<Self>) -> bool {
        let me = |t: &Arc<Token>| Arc::ptr_eq(t, self);
        if let Some(index) = self.kind.well_known_index() {
            return well_known_table().get(index).is_some_and(me);
        }
        match (&self.kind, &self.value) {
            (TokenKind::Identifier, _) => IDENTIFIERS.holds(fnv1a(&self.text), me),
            (_, Some(value)) => LITERALS.holds(literal_hash(self.kind, &self.text, value), me),
            (_, None) => false,
        }
    }

    /// The literal value, or the text as a string for identifiers.
    pub fn value(&self) -> Value {
        self.value
            .clone()
            .unwrap_or_else(|| Value::String(Arc::clone(&self.text)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_known_table_follows_declaration_order() {
        for (i, kind) in TokenKind::WELL_KNOWN.iter().enumerate() {
            assert_eq!(kind.well_known_index(), Some(i), "{kind:?}");
        }
    }

    #[test]
    fn well_known_tokens_are_singletons() {
        let a = Token::well_known(TokenKind::QuestionQuestionEquals);
        let b = Token::well_known(TokenKind::QuestionQuestionEquals);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(&*a.text, "??=");
        assert!(a.is_cached());
    }

    #[test]
    fn identifiers_hit_the_cache() {
        let a = Token::identifier("CacheProbe");
        let b = Token::identifier("CacheProbe");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(b.is_cached());
    }

    #[test]
    fn literals_distinguish_value_kinds() {
        let int = Token::literal(TokenKind::NumericLiteral, "7", Value::Int32(7));
        let long = Token::literal(TokenKind::NumericLiteral, "7", Value::Int64(7));
        assert!(!Arc::ptr_eq(&int, &long));
        assert!(matches!(long.value, Some(Value::Int64(7))));
    }

    #[test]
    fn identifier_value_is_its_text() {
        assert_eq!(Token::identifier("hello").value(), Value::string("hello"));
    }

    #[test]
    fn keyword_lookup() {
        assert_eq!(TokenKind::keyword("self"), Some(TokenKind::SelfKw));
        assert_eq!(TokenKind::keyword("Self"), None);
        assert_eq!(TokenKind::Parameter.name(), "`parameter`");
        assert_eq!(TokenKind::LessLess.name(), "<<");
    }
}
