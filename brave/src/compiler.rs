//! Recursive-descent compiler from tokens to flat stack bytecode.
//!
//! Precedence climbs from assignment down to primaries:
//!
//! ```text
//! assignment  := $k (= | += | -= | *= | /= | ??=) assignment
//!              | $k[expr] = assignment
//!              | conditional
//! conditional := coalesce (? expression : expression)?
//! coalesce    := or (?? coalesce)?
//! or          := and (|| and)*
//! and         := bitor (&& bitor)*
//! bitor       := bitxor (| bitxor)*
//! bitxor      := bitand (^ bitand)*
//! bitand      := equality (& equality)*
//! equality    := relational ((== | !=) relational)*
//! relational  := additive ((< | <= | > | >=) additive)*
//! additive    := term ((+ | -) term)*
//! term        := unary ((* | /) unary)*
//! unary       := (! | - | + | ~) unary | (++ | --) $k | primary
//! primary     := literal | ( expression ) | $parameter | $self
//!              | $k | $k++ | $k-- | $k[expr] | identifier
//! ```

use std::sync::Arc;

use log::{debug, trace};

use crate::builder::{CodeBuilder, Label};
use crate::cache::CompilerCache;
use crate::error::CompileError;
use crate::instruction::{Bytecode, Instruction, Op, Operand, Sentinel};
use crate::lexer::Lexer;
use crate::token::{Token, TokenKind};
use crate::value::Value;

/// How `=` and the compound assignments pick the scope they write to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AssignMode {
    /// Write to the nearest scope that already defines the key, else locally.
    #[default]
    Scoped,
    /// Always write to the local scope. Used for one-time initialization.
    Direct,
}

impl AssignMode {
    fn set_op(self) -> Op {
        match self {
            Self::Scoped => Op::SetResource,
            Self::Direct => Op::DirectSetResource,
        }
    }
}

/// Seed attached to `++$k`, used when the key does not exist yet.
pub const PREFIX_INCREMENT_SEED: Value = Value::Int32(0);

/// Deepest nesting of parentheses, unary operators and right-associative
/// chains a single expression may use.
pub const MAX_NESTING: usize = 128;

/// Compiles `text`, reusing a cached result for the same text and mode.
pub fn compile(text: &str, mode: AssignMode) -> Result<Bytecode> {
    let cache = CompilerCache::global();
    if let Some(code) = cache.get(text, mode) {
        trace!("compiler cache hit for {text:?} ({mode:?})");
        return Ok(code);
    }

    let tokens = Lexer::tokenize(text)?;
    let code = Compiler::compile_tokens(&tokens, mode)?;
    debug!(
        "compiled {text:?} ({mode:?}) into {} instructions",
        code.len()
    );
    cache.insert(text, mode, code.clone());
    Ok(code)
}

pub struct Compiler<'t> {
    tokens: &'t [Arc<Token>],
    pos: usize,
    depth: usize,
    mode: AssignMode,
    code: CodeBuilder,
}

type Result<T = ()> = std::result::Result<T, CompileError>;

impl<'t> Compiler<'t> {
    /// Compiles a whole program without consulting the cache.
    pub fn compile_tokens(tokens: &'t [Arc<Token>], mode: AssignMode) -> Result<Bytecode> {
        let mut compiler = Self {
            tokens,
            pos: 0,
            depth: 0,
            mode,
            code: CodeBuilder::with_capacity(tokens.len()),
        };
        compiler.parse_program()?;
        Ok(compiler.code.finish())
    }

    // ───────────────────────────────────────────────────────────
    //  Token reader
    // ───────────────────────────────────────────────────────────

    fn is_at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek_kind(&self, offset: usize) -> Option<TokenKind> {
        self.tokens.get(self.pos + offset).map(|t| t.kind)
    }

    fn is_current(&self, kind: TokenKind) -> bool {
        self.peek_kind(0) == Some(kind)
    }

    fn try_consume(&mut self, kind: TokenKind) -> bool {
        if self.is_current(kind) {
            self.pos += 1;
            return true;
        }
        false
    }

    fn consume(&mut self, kind: TokenKind) -> Result<&'t Arc<Token>> {
        let tokens = self.tokens;
        match tokens.get(self.pos) {
            Some(token) if token.kind == kind => {
                self.pos += 1;
                Ok(token)
            }
            Some(token) => Err(CompileError::Expected {
                expected: kind.name(),
                found: token.kind.name(),
                text: token.text.to_string(),
            }),
            None => Err(CompileError::UnexpectedEnd {
                expected: kind.name(),
            }),
        }
    }

    /// Error for the token under the cursor.
    fn unexpected(&self, expected: &'static str) -> CompileError {
        match self.tokens.get(self.pos) {
            Some(token) => CompileError::UnexpectedToken {
                kind: token.kind.name(),
                text: token.text.to_string(),
            },
            None => CompileError::UnexpectedEnd { expected },
        }
    }

    // ───────────────────────────────────────────────────────────
    //  Emit helpers
    // ───────────────────────────────────────────────────────────

    fn emit(&mut self, instruction: Instruction) {
        self.code.emit(instruction);
    }

    fn emit_op(&mut self, op: Op) {
        self.code.emit_op(op);
    }

    fn jump(&mut self, op: Op) -> Label {
        self.code.jump(op)
    }

    /// Stores the value on top of the stack into `key`, then reads it back
    /// so the assignment evaluates to the stored value.
    fn emit_store(&mut self, key: &Arc<str>) {
        self.emit(Instruction::keyed_with(
            self.mode.set_op(),
            Arc::clone(key),
            Operand::Sentinel(Sentinel::Last),
        ));
        self.emit(Instruction::keyed(Op::GetResource, Arc::clone(key)));
    }

    // ───────────────────────────────────────────────────────────
    //  Program
    // ───────────────────────────────────────────────────────────

    fn parse_program(&mut self) -> Result {
        while !self.is_at_end() {
            self.parse_expression()?;
            if self.try_consume(TokenKind::Semicolon) {
                continue;
            }
            if !self.is_at_end() {
                return Err(self.unexpected("`;`"));
            }
        }
        Ok(())
    }

    fn parse_expression(&mut self) -> Result {
        self.nested(Self::parse_assignment)
    }

    /// Runs `parse` one nesting level deeper.
    fn nested(&mut self, parse: fn(&mut Self) -> Result) -> Result {
        if self.depth >= MAX_NESTING {
            return Err(CompileError::TooDeep { max: MAX_NESTING });
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    // ───────────────────────────────────────────────────────────
    //  Assignment
    // ───────────────────────────────────────────────────────────

    /// Whether `kind` may follow `$` as a resource name.
    fn is_name(kind: TokenKind) -> bool {
        matches!(
            kind,
            TokenKind::Identifier
                | TokenKind::Parameter
                | TokenKind::SelfKw
                | TokenKind::Null
                | TokenKind::True
                | TokenKind::False
        )
    }

    fn is_assignment_operator(kind: TokenKind) -> bool {
        matches!(
            kind,
            TokenKind::Equals
                | TokenKind::PlusEquals
                | TokenKind::MinusEquals
                | TokenKind::AsteriskEquals
                | TokenKind::SlashEquals
                | TokenKind::QuestionQuestionEquals
                | TokenKind::AmpersandEquals
                | TokenKind::BarEquals
                | TokenKind::CaretEquals
                | TokenKind::LessLessEquals
                | TokenKind::GreaterGreaterEquals
        )
    }

    /// Consumes `$name` and returns its resource key. Rejects the reserved
    /// names, which cannot be written.
    fn parse_resource_key(&mut self) -> Result<Arc<str>> {
        self.consume(TokenKind::Dollar)?;
        let tokens = self.tokens;
        let Some(name) = tokens.get(self.pos) else {
            return Err(CompileError::UnexpectedEnd {
                expected: "resource name",
            });
        };
        match name.kind {
            TokenKind::Parameter => return Err(CompileError::AssignToParameter),
            TokenKind::SelfKw => return Err(CompileError::AssignToSelf),
            kind if Self::is_name(kind) => {}
            _ => return Err(self.unexpected("resource name")),
        }
        self.pos += 1;
        Ok(resource_key(name))
    }

    /// Position of the `]` matching the `[` at `open`, if any.
    fn matching_bracket(&self, open: usize) -> Option<usize> {
        let mut depth = 0usize;
        for (i, token) in self.tokens.iter().enumerate().skip(open) {
            match token.kind {
                TokenKind::OpenBracket => depth += 1,
                TokenKind::CloseBracket => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(i);
                    }
                }
                _ => {}
            }
        }
        None
    }

    fn parse_assignment(&mut self) -> Result {
        let at_resource = self.is_current(TokenKind::Dollar)
            && self.peek_kind(1).is_some_and(Self::is_name);
        if !at_resource {
            return self.parse_conditional();
        }

        match self.peek_kind(2) {
            Some(op) if Self::is_assignment_operator(op) => self.parse_resource_assignment(op),
            Some(TokenKind::OpenBracket) => {
                let close = self.matching_bracket(self.pos + 2);
                let assigns = close.is_some_and(|c| {
                    self.tokens.get(c + 1).map(|t| t.kind) == Some(TokenKind::Equals)
                });
                match close {
                    Some(close) if assigns => self.parse_index_assignment(close),
                    _ => self.parse_conditional(),
                }
            }
            _ => self.parse_conditional(),
        }
    }

    fn parse_resource_assignment(&mut self, op: TokenKind) -> Result {
        let key = self.parse_resource_key()?;
        self.consume(op)?;

        let arithmetic = match op {
            TokenKind::Equals => None,
            TokenKind::PlusEquals => Some(Op::Add),
            TokenKind::MinusEquals => Some(Op::Subtract),
            TokenKind::AsteriskEquals => Some(Op::Multiply),
            TokenKind::SlashEquals => Some(Op::Divide),
            TokenKind::QuestionQuestionEquals => {
                // GetResource k; JumpIfNull A; Jump E; A: rhs; store; E:
                self.emit(Instruction::keyed(Op::GetResource, Arc::clone(&key)));
                let assign = self.jump(Op::JumpIfNull);
                let end = self.jump(Op::Jump);
                self.code.bind(assign);
                self.parse_expression()?;
                self.emit_store(&key);
                self.code.bind(end);
                return Ok(());
            }
            TokenKind::LessLessEquals | TokenKind::GreaterGreaterEquals => {
                return Err(CompileError::UnsupportedOperator { operator: "Shift" });
            }
            _ => {
                return Err(CompileError::UnsupportedOperator {
                    operator: "Compound bitwise",
                });
            }
        };

        if let Some(arithmetic) = arithmetic {
            self.emit(Instruction::keyed(Op::GetResource, Arc::clone(&key)));
            self.parse_expression()?;
            self.emit_op(arithmetic);
        } else {
            self.parse_expression()?;
        }
        self.emit_store(&key);
        Ok(())
    }

    /// `$k[index] = value` compiles to `value; index; IndexSet k`, so the
    /// value is parsed first and the index tokens are revisited afterwards.
    fn parse_index_assignment(&mut self, close: usize) -> Result {
        let key = self.parse_resource_key()?;
        let index_start = self.pos + 1;

        self.pos = close + 2;
        self.parse_expression()?;
        let resume = self.pos;

        self.pos = index_start;
        self.parse_expression()?;
        if self.pos != close {
            return Err(self.unexpected("`]`"));
        }

        self.emit(Instruction::keyed(Op::IndexSet, key));
        self.pos = resume;
        Ok(())
    }

    // ───────────────────────────────────────────────────────────
    //  Control flow
    // ───────────────────────────────────────────────────────────

    fn parse_conditional(&mut self) -> Result {
        self.parse_coalesce()?;
        if !self.try_consume(TokenKind::Question) {
            return Ok(());
        }

        let otherwise = self.jump(Op::JumpIfFalse);
        self.parse_expression()?;
        let end = self.jump(Op::Jump);
        self.consume(TokenKind::Colon)?;
        self.code.bind(otherwise);
        self.parse_expression()?;
        self.code.bind(end);
        Ok(())
    }

    fn parse_coalesce(&mut self) -> Result {
        self.parse_logical_or()?;
        if !self.try_consume(TokenKind::QuestionQuestion) {
            return Ok(());
        }

        // JumpIfNull pops the null; a non-null left stays as the result.
        let fallback = self.jump(Op::JumpIfNull);
        let end = self.jump(Op::Jump);
        self.code.bind(fallback);
        self.nested(Self::parse_coalesce)?;
        self.code.bind(end);
        Ok(())
    }

    /// Shared shape of `||` and `&&`: every operand jumps to one
    /// short-circuit tail that pushes `short_value`.
    fn parse_short_circuit(
        &mut self,
        operator: TokenKind,
        branch: Op,
        short_value: bool,
        operand: fn(&mut Self) -> Result,
    ) -> Result {
        operand(self)?;
        if !self.is_current(operator) {
            return Ok(());
        }

        let mut shorts = Vec::with_capacity(4);
        while self.try_consume(operator) {
            shorts.push(self.jump(branch));
            operand(self)?;
        }
        shorts.push(self.jump(branch));

        self.code.emit_push(Value::Bool(!short_value));
        let end = self.jump(Op::Jump);
        for label in shorts {
            self.code.bind(label);
        }
        self.code.emit_push(Value::Bool(short_value));
        self.code.bind(end);
        Ok(())
    }

    fn parse_logical_or(&mut self) -> Result {
        self.parse_short_circuit(TokenKind::BarBar, Op::JumpIfTrue, true, Self::parse_logical_and)
    }

    fn parse_logical_and(&mut self) -> Result {
        self.parse_short_circuit(
            TokenKind::AmpersandAmpersand,
            Op::JumpIfFalse,
            false,
            Self::parse_bitwise_or,
        )
    }

    // ───────────────────────────────────────────────────────────
    //  Binary operators
    // ───────────────────────────────────────────────────────────

    /// Left-associative loop: `operand (op operand)*`.
    fn parse_binary(
        &mut self,
        operators: &[(TokenKind, Op)],
        operand: fn(&mut Self) -> Result,
    ) -> Result {
        operand(self)?;
        'outer: loop {
            for &(kind, op) in operators {
                if self.try_consume(kind) {
                    operand(self)?;
                    self.emit_op(op);
                    continue 'outer;
                }
            }
            return Ok(());
        }
    }

    fn parse_bitwise_or(&mut self) -> Result {
        self.parse_binary(&[(TokenKind::Bar, Op::BitwiseOr)], Self::parse_bitwise_xor)
    }

    fn parse_bitwise_xor(&mut self) -> Result {
        self.parse_binary(&[(TokenKind::Caret, Op::BitwiseXor)], Self::parse_bitwise_and)
    }

    fn parse_bitwise_and(&mut self) -> Result {
        self.parse_binary(&[(TokenKind::Ampersand, Op::BitwiseAnd)], Self::parse_equality)
    }

    fn parse_equality(&mut self) -> Result {
        self.parse_binary(
            &[
                (TokenKind::EqualEqual, Op::Equal),
                (TokenKind::BangEquals, Op::NotEqual),
            ],
            Self::parse_relational,
        )
    }

    fn parse_relational(&mut self) -> Result {
        self.parse_binary(
            &[
                (TokenKind::Less, Op::LessThan),
                (TokenKind::LessEquals, Op::LessOrEqual),
                (TokenKind::Greater, Op::GreaterThan),
                (TokenKind::GreaterEquals, Op::GreaterOrEqual),
            ],
            Self::parse_additive,
        )?;

        let shift = matches!(
            self.peek_kind(0),
            Some(
                TokenKind::LessLess
                    | TokenKind::GreaterGreater
                    | TokenKind::LessLessEquals
                    | TokenKind::GreaterGreaterEquals
            )
        );
        if shift {
            return Err(CompileError::UnsupportedOperator { operator: "Shift" });
        }
        Ok(())
    }

    fn parse_additive(&mut self) -> Result {
        self.parse_binary(
            &[(TokenKind::Plus, Op::Add), (TokenKind::Minus, Op::Subtract)],
            Self::parse_multiplicative,
        )
    }

    fn parse_multiplicative(&mut self) -> Result {
        self.parse_binary(
            &[
                (TokenKind::Asterisk, Op::Multiply),
                (TokenKind::Slash, Op::Divide),
            ],
            Self::parse_unary,
        )
    }

    // ───────────────────────────────────────────────────────────
    //  Unary and primary
    // ───────────────────────────────────────────────────────────

    fn parse_unary(&mut self) -> Result {
        if self.try_consume(TokenKind::PlusPlus) {
            let key = self.parse_resource_key()?;
            self.emit(Instruction::keyed_with(
                Op::PreIncrementResource,
                key,
                Operand::Value(PREFIX_INCREMENT_SEED),
            ));
            return Ok(());
        }
        if self.try_consume(TokenKind::MinusMinus) {
            let key = self.parse_resource_key()?;
            self.emit(Instruction::keyed(Op::PreDecrementResource, key));
            return Ok(());
        }

        let op = match self.peek_kind(0) {
            Some(TokenKind::Bang) => Some(Op::LogicalNot),
            Some(TokenKind::Minus) => Some(Op::Negate),
            Some(TokenKind::Tilde) => Some(Op::BitwiseNot),
            // Unary plus is a no-op.
            Some(TokenKind::Plus) => None,
            _ => return self.parse_primary(),
        };
        self.pos += 1;
        self.nested(Self::parse_unary)?;
        if let Some(op) = op {
            self.emit_op(op);
        }
        Ok(())
    }

    fn parse_primary(&mut self) -> Result {
        let tokens = self.tokens;
        let Some(token) = tokens.get(self.pos) else {
            return Err(self.unexpected("expression"));
        };

        match token.kind {
            TokenKind::OpenParen => {
                self.pos += 1;
                self.parse_expression()?;
                self.consume(TokenKind::CloseParen)?;
            }
            TokenKind::StringLiteral | TokenKind::NumericLiteral => {
                self.pos += 1;
                self.code.emit_push(token.value());
            }
            TokenKind::Null => {
                self.pos += 1;
                self.code.emit_push(Value::Null);
            }
            TokenKind::True | TokenKind::False => {
                self.pos += 1;
                self.code.emit_push(Value::Bool(token.kind == TokenKind::True));
            }
            TokenKind::Dollar => {
                self.pos += 1;
                self.parse_resource_reference()?;
            }
            // Bare identifiers read as strings.
            TokenKind::Identifier => {
                self.pos += 1;
                self.code.emit_push(token.value());
            }
            _ => return Err(self.unexpected("expression")),
        }
        Ok(())
    }

    /// Everything after the `$` of a resource read.
    fn parse_resource_reference(&mut self) -> Result {
        let tokens = self.tokens;
        let name = match tokens.get(self.pos) {
            Some(name) if Self::is_name(name.kind) => name,
            _ => return Err(self.unexpected("resource name")),
        };
        self.pos += 1;

        match name.kind {
            TokenKind::Parameter => self.emit_op(Op::PushParameter),
            TokenKind::SelfKw => self.emit_op(Op::PushSelf),
            _ => {
                let key = resource_key(name);
                if self.try_consume(TokenKind::PlusPlus) {
                    self.emit(Instruction::keyed(Op::PostIncrementResource, key));
                } else if self.try_consume(TokenKind::MinusMinus) {
                    self.emit(Instruction::keyed(Op::PostDecrementResource, key));
                } else if self.try_consume(TokenKind::OpenBracket) {
                    self.parse_expression()?;
                    self.consume(TokenKind::CloseBracket)?;
                    self.emit(Instruction::keyed(Op::IndexGet, key));
                } else {
                    self.emit(Instruction::keyed(Op::GetResource, key));
                }
            }
        }
        Ok(())
    }
}

/// Resource keys carry the `$` prefix, matching how hosts name them.
fn resource_key(name: &Token) -> Arc<str> {
    format!("${}", name.text).into()
}
