use std::fmt;
use std::hash::Hasher;
use std::ops::Deref;
use std::sync::Arc;

use smallvec::{SmallVec, smallvec};

use crate::error::RuntimeError;
use crate::hash::Fnv1a;
use crate::value::Value;

/// Stack-machine opcodes.
///
/// Operands are listed as `name:kind`, where kind is one of `value`
/// (literal), `key` (resource key), `target` (instruction index) or `source`
/// (a literal or a [`Sentinel`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Op {
    /// Push a literal.
    /// Operands: `value:value`
    Push,

    /// Push the value of a resource, creating it as null when absent.
    /// Operands: `key:key`
    GetResource,

    /// Write to the nearest scope that already defines the key.
    /// Operands: `key:key`, `src:source`
    SetResource,

    /// Write to the local scope.
    /// Operands: `key:key`, `src:source`
    DirectSetResource,

    /// `++$k`. Pushes the new value.
    /// Operands: `key:key`, optional `seed:value`
    PreIncrementResource,

    /// `$k++`. Pushes the old value.
    /// Operands: `key:key`
    PostIncrementResource,

    /// `--$k`. Pushes the new value.
    /// Operands: `key:key`
    PreDecrementResource,

    /// `$k--`. Pushes the old value.
    /// Operands: `key:key`
    PostDecrementResource,

    /// Push the call parameter.
    PushParameter,

    /// Push the current owner identity.
    PushSelf,

    /// Execute the command stored in a resource.
    /// Operands: `key:key`, optional `arg:source` (default: pop)
    InvokeResource,

    /// Pop an index and push `collection[index]`.
    /// Operands: `key:key`
    IndexGet,

    /// Pop an index, then a value; assign and push the value.
    /// Operands: `key:key`
    IndexSet,

    Negate,
    LogicalNot,
    BitwiseNot,

    Add,
    Subtract,
    Multiply,
    Divide,

    /// Pop two values, push the boolean conjunction.
    LogicalAnd,
    /// Pop two values, push the boolean disjunction.
    LogicalOr,

    BitwiseAnd,
    BitwiseOr,
    BitwiseXor,

    Equal,
    NotEqual,
    GreaterThan,
    GreaterOrEqual,
    LessThan,
    LessOrEqual,

    /// Operands: `target:target`
    Jump,
    /// Pop; branch when false. Operands: `target:target`
    JumpIfFalse,
    /// Pop; branch when true. Operands: `target:target`
    JumpIfTrue,
    /// Peek; when null pop and branch. Operands: `target:target`
    JumpIfNull,
    /// Peek; branch when not null, never pops. Operands: `target:target`
    JumpIfNotNull,
}

impl Op {
    pub fn name(self) -> &'static str {
        match self {
            Self::Push => "Push",
            Self::GetResource => "GetResource",
            Self::SetResource => "SetResource",
            Self::DirectSetResource => "DirectSetResource",
            Self::PreIncrementResource => "PreIncrementResource",
            Self::PostIncrementResource => "PostIncrementResource",
            Self::PreDecrementResource => "PreDecrementResource",
            Self::PostDecrementResource => "PostDecrementResource",
            Self::PushParameter => "PushParameter",
            Self::PushSelf => "PushSelf",
            Self::InvokeResource => "InvokeResource",
            Self::IndexGet => "IndexGet",
            Self::IndexSet => "IndexSet",
            Self::Negate => "Negate",
            Self::LogicalNot => "LogicalNot",
            Self::BitwiseNot => "BitwiseNot",
            Self::Add => "Add",
            Self::Subtract => "Subtract",
            Self::Multiply => "Multiply",
            Self::Divide => "Divide",
            Self::LogicalAnd => "LogicalAnd",
            Self::LogicalOr => "LogicalOr",
            Self::BitwiseAnd => "BitwiseAnd",
            Self::BitwiseOr => "BitwiseOr",
            Self::BitwiseXor => "BitwiseXor",
            Self::Equal => "Equal",
            Self::NotEqual => "NotEqual",
            Self::GreaterThan => "GreaterThan",
            Self::GreaterOrEqual => "GreaterOrEqual",
            Self::LessThan => "LessThan",
            Self::LessOrEqual => "LessOrEqual",
            Self::Jump => "Jump",
            Self::JumpIfFalse => "JumpIfFalse",
            Self::JumpIfTrue => "JumpIfTrue",
            Self::JumpIfNull => "JumpIfNull",
            Self::JumpIfNotNull => "JumpIfNotNull",
        }
    }

    pub fn is_jump(self) -> bool {
        matches!(
            self,
            Self::Jump
                | Self::JumpIfFalse
                | Self::JumpIfTrue
                | Self::JumpIfNull
                | Self::JumpIfNotNull
        )
    }

    /// Whether this instruction reads its key's value.
    pub fn reads_resource(self) -> bool {
        matches!(self, Self::GetResource | Self::IndexGet)
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A reference to a value already on the evaluation stack, used in place of
/// a literal source operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sentinel {
    Last,
    SecondLast,
    ThirdLast,
}

impl Sentinel {
    /// Distance from the top of the stack.
    pub fn depth(self) -> usize {
        match self {
            Self::Last => 0,
            Self::SecondLast => 1,
            Self::ThirdLast => 2,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Operand {
    Value(Value),
    Key(Arc<str>),
    Target(usize),
    Sentinel(Sentinel),
}

impl Operand {
    fn hash_into(&self, hasher: &mut Fnv1a) {
        match self {
            Self::Value(v) => v.hash_into(hasher),
            Self::Key(k) => {
                hasher.write_u8(0x20);
                hasher.write(k.as_bytes());
            }
            Self::Target(t) => {
                hasher.write_u8(0x21);
                hasher.write_usize(*t);
            }
            Self::Sentinel(s) => {
                hasher.write_u8(0x22);
                hasher.write_usize(s.depth());
            }
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(Value::String(s)) => write!(f, "{:?}", &**s),
            Self::Value(v) => write!(f, "{v}"),
            Self::Key(k) => f.write_str(k),
            Self::Target(t) => write!(f, "->{t}"),
            Self::Sentinel(Sentinel::Last) => f.write_str("<last>"),
            Self::Sentinel(Sentinel::SecondLast) => f.write_str("<second-last>"),
            Self::Sentinel(Sentinel::ThirdLast) => f.write_str("<third-last>"),
        }
    }
}

/// Instruction operands. Nothing the compiler emits needs more than two.
pub type Arguments = SmallVec<[Operand; 2]>;

#[derive(Debug, Clone)]
pub struct Instruction {
    pub op: Op,
    pub args: Arguments,
}

impl Instruction {
    pub fn new(op: Op) -> Self {
        Self {
            op,
            args: SmallVec::new(),
        }
    }

    pub fn push(value: Value) -> Self {
        Self {
            op: Op::Push,
            args: smallvec![Operand::Value(value)],
        }
    }

    pub fn keyed(op: Op, key: Arc<str>) -> Self {
        Self {
            op,
            args: smallvec![Operand::Key(key)],
        }
    }

    /// An instruction with a key and a source operand.
    pub fn keyed_with(op: Op, key: Arc<str>, source: Operand) -> Self {
        Self {
            op,
            args: smallvec![Operand::Key(key), source],
        }
    }

    pub fn jump(op: Op, target: usize) -> Self {
        Self {
            op,
            args: smallvec![Operand::Target(target)],
        }
    }

    fn malformed(&self, reason: &'static str) -> RuntimeError {
        RuntimeError::MalformedInstruction {
            op: self.op.name(),
            reason,
        }
    }

    /// The literal operand of `Push`.
    pub fn literal(&self) -> Result<&Value, RuntimeError> {
        match self.args.first() {
            Some(Operand::Value(v)) => Ok(v),
            _ => Err(self.malformed("expected a literal operand")),
        }
    }

    /// The resource key, always the first operand.
    pub fn key(&self) -> Result<&Arc<str>, RuntimeError> {
        match self.args.first() {
            Some(Operand::Key(k)) => Ok(k),
            _ => Err(self.malformed("expected a resource key")),
        }
    }

    pub fn target(&self) -> Result<usize, RuntimeError> {
        match self.args.first() {
            Some(Operand::Target(t)) => Ok(*t),
            _ => Err(self.malformed("expected a jump target")),
        }
    }

    /// The second operand, if present.
    pub fn source(&self) -> Option<&Operand> {
        self.args.get(1)
    }

    /// Stable hash of the opcode and its operands.
    pub fn fingerprint(&self) -> u32 {
        let mut hasher = Fnv1a::new();
        hasher.write_u8(self.op as u8);
        for arg in &self.args {
            arg.hash_into(&mut hasher);
        }
        hasher.finish32()
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.op)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// An immutable, shareable instruction sequence.
///
/// Clones share the same allocation, so identity comparisons with
/// [`Bytecode::ptr_eq`] are meaningful.
#[derive(Debug, Clone)]
pub struct Bytecode(Arc<[Instruction]>);

impl Bytecode {
    pub fn ptr_eq(&self, other: &Bytecode) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Keys read by `GetResource` and `IndexGet`, first appearance first.
    pub fn read_keys(&self) -> Vec<Arc<str>> {
        let mut keys: Vec<Arc<str>> = Vec::new();
        let reads = self.0.iter().filter(|i| i.op.reads_resource());
        for key in reads.filter_map(|i| i.key().ok()) {
            if !keys.contains(key) {
                keys.push(Arc::clone(key));
            }
        }
        keys
    }
}

impl Deref for Bytecode {
    type Target = [Instruction];

    fn deref(&self) -> &[Instruction] {
        &self.0
    }
}

impl From<Vec<Instruction>> for Bytecode {
    fn from(code: Vec<Instruction>) -> Self {
        Self(code.into())
    }
}

impl FromIterator<Instruction> for Bytecode {
    fn from_iter<I: IntoIterator<Item = Instruction>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// One instruction per line: index, opcode, operands.
impl fmt::Display for Bytecode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, instruction) in self.0.iter().enumerate() {
            writeln!(f, "{i:4}  {instruction}")?;
        }
        Ok(())
    }
}
