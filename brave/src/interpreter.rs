use std::cmp::Ordering;

use log::trace;

use crate::compiler::{self, AssignMode};
use crate::error::{Result, RuntimeError};
use crate::host::HostContext;
use crate::instruction::{Bytecode, Instruction, Op, Operand};
use crate::ops::{self, Arith, Bitwise};
use crate::resources::Resources;
use crate::stack::RuntimeStack;
use crate::value::{Object, Value};

/// Seed for an absent key first touched by `--$k`, `$k++` or `$k--`.
pub const ABSENT_KEY_SEED: Value = Value::Int32(0);

/// What a run left behind.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The value on top of the stack at halt.
    Value(Value),
    /// The stack was empty at halt.
    Void,
}

impl Outcome {
    /// The result value, `Null` for [`Outcome::Void`].
    pub fn into_value(self) -> Value {
        match self {
            Self::Value(value) => value,
            Self::Void => Value::Null,
        }
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(value) => Some(value),
            Self::Void => None,
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Self::Void)
    }
}

/// Compiles `text` (through the compiler cache) and runs it.
pub fn execute(
    text: &str,
    mode: AssignMode,
    resources: &dyn Resources,
    parameter: Value,
) -> Result<Outcome> {
    let code = compiler::compile(text, mode)?;
    let outcome = Interpreter::new(resources)
        .with_parameter(parameter)
        .run(&code)?;
    Ok(outcome)
}

/// A single-frame stack machine over one resource store.
///
/// Holds no state between runs, so one interpreter may run any number of
/// programs and the same [`Bytecode`] may run on many interpreters at once.
pub struct Interpreter<'r> {
    resources: &'r dyn Resources,
    host: Option<&'r dyn HostContext>,
    parameter: Value,
}

impl<'r> Interpreter<'r> {
    pub fn new(resources: &'r dyn Resources) -> Self {
        Self {
            resources,
            host: None,
            parameter: Value::Null,
        }
    }

    pub fn with_host(mut self, host: &'r dyn HostContext) -> Self {
        self.host = Some(host);
        self
    }

    pub fn with_parameter(mut self, parameter: Value) -> Self {
        self.parameter = parameter;
        self
    }

    // ═══════════════════════════════════════════════════════════════
    // Dispatch loop
    // ═══════════════════════════════════════════════════════════════

    pub fn run(&self, code: &Bytecode) -> Result<Outcome, RuntimeError> {
        let mut stack = RuntimeStack::rent();
        let len = code.len();
        let mut ip = 0;

        while ip < len {
            let instruction = &code[ip];
            trace!("{ip:4}  {instruction}");
            ip += 1;

            match instruction.op {
                Op::Push => stack.push(instruction.literal()?.clone())?,

                // ── Resources ─────────────────────────────────────
                Op::GetResource => {
                    let value = self.get_or_create(instruction.key()?, Value::Null);
                    stack.push(value)?;
                }
                Op::SetResource => {
                    let value = source(instruction, &mut stack)?;
                    self.resources
                        .set_to_existing_key(instruction.key()?, value);
                }
                Op::DirectSetResource => {
                    let value = source(instruction, &mut stack)?;
                    self.resources.set(instruction.key()?, value);
                }
                Op::PreIncrementResource => {
                    let seed = match instruction.source() {
                        Some(Operand::Value(seed)) => seed.clone(),
                        _ => ABSENT_KEY_SEED,
                    };
                    let new = self.step(instruction, seed, ops::increment)?.1;
                    stack.push(new)?;
                }
                Op::PreDecrementResource => {
                    let new = self.step(instruction, ABSENT_KEY_SEED, ops::decrement)?.1;
                    stack.push(new)?;
                }
                Op::PostIncrementResource => {
                    let old = self.step(instruction, ABSENT_KEY_SEED, ops::increment)?.0;
                    stack.push(old)?;
                }
                Op::PostDecrementResource => {
                    let old = self.step(instruction, ABSENT_KEY_SEED, ops::decrement)?.0;
                    stack.push(old)?;
                }

                // ── Identity ──────────────────────────────────────
                Op::PushParameter => stack.push(self.parameter.clone())?,
                Op::PushSelf => stack.push(self.self_value())?,

                // ── Commands and collections ──────────────────────
                Op::InvokeResource => {
                    let key = instruction.key()?;
                    let argument = source(instruction, &mut stack)?;
                    match self.get_or_create(key, Value::Null) {
                        Value::Object(Object::Command(command)) => command.execute(argument)?,
                        _ => return Err(RuntimeError::NotACommand { key: key.to_string() }),
                    }
                }
                Op::IndexGet => {
                    let key = instruction.key()?;
                    let index = stack.pop()?;
                    let collection = self.get_or_create(key, Value::Null);
                    stack.push(index_get(key, &collection, &index)?)?;
                }
                Op::IndexSet => {
                    let key = instruction.key()?;
                    let index = stack.pop()?;
                    let value = stack.pop()?;
                    let collection = self.get_or_create(key, Value::Null);
                    index_set(key, &collection, &index, value.clone())?;
                    self.republish(key, collection);
                    stack.push(value)?;
                }

                // ── Unary ─────────────────────────────────────────
                Op::Negate => {
                    let value = stack.pop()?;
                    stack.push(ops::negate(&value)?)?;
                }
                Op::LogicalNot => {
                    let value = stack.pop()?;
                    stack.push(Value::Bool(!ops::to_boolean(&value)?))?;
                }
                Op::BitwiseNot => {
                    let value = stack.pop()?;
                    stack.push(ops::bitwise_not(&value)?)?;
                }

                // ── Binary ────────────────────────────────────────
                Op::Add => binary(&mut stack, ops::add)?,
                Op::Subtract => binary(&mut stack, |l, r| ops::arithmetic(Arith::Subtract, l, r))?,
                Op::Multiply => binary(&mut stack, |l, r| ops::arithmetic(Arith::Multiply, l, r))?,
                Op::Divide => binary(&mut stack, |l, r| ops::arithmetic(Arith::Divide, l, r))?,
                Op::LogicalAnd => binary(&mut stack, |l, r| {
                    let (l, r) = (ops::to_boolean(l)?, ops::to_boolean(r)?);
                    Ok(Value::Bool(l && r))
                })?,
                Op::LogicalOr => binary(&mut stack, |l, r| {
                    let (l, r) = (ops::to_boolean(l)?, ops::to_boolean(r)?);
                    Ok(Value::Bool(l || r))
                })?,
                Op::BitwiseAnd => binary(&mut stack, |l, r| ops::bitwise(Bitwise::And, l, r))?,
                Op::BitwiseOr => binary(&mut stack, |l, r| ops::bitwise(Bitwise::Or, l, r))?,
                Op::BitwiseXor => binary(&mut stack, |l, r| ops::bitwise(Bitwise::Xor, l, r))?,
                Op::Equal => binary(&mut stack, |l, r| Ok(Value::Bool(l == r)))?,
                Op::NotEqual => binary(&mut stack, |l, r| Ok(Value::Bool(l != r)))?,
                Op::GreaterThan => compare(&mut stack, Ordering::is_gt)?,
                Op::GreaterOrEqual => compare(&mut stack, Ordering::is_ge)?,
                Op::LessThan => compare(&mut stack, Ordering::is_lt)?,
                Op::LessOrEqual => compare(&mut stack, Ordering::is_le)?,

                // ── Control flow ──────────────────────────────────
                Op::Jump => ip = checked_target(instruction, len, true)?,
                Op::JumpIfFalse => {
                    let target = checked_target(instruction, len, false)?;
                    if !ops::to_boolean(&stack.pop()?)? {
                        ip = target;
                    }
                }
                Op::JumpIfTrue => {
                    let target = checked_target(instruction, len, false)?;
                    if ops::to_boolean(&stack.pop()?)? {
                        ip = target;
                    }
                }
                Op::JumpIfNull => {
                    let target = checked_target(instruction, len, false)?;
                    if stack.peek().ok_or(RuntimeError::StackEmpty)?.is_null() {
                        stack.pop()?;
                        ip = target;
                    }
                }
                Op::JumpIfNotNull => {
                    let target = checked_target(instruction, len, false)?;
                    if !stack.peek().ok_or(RuntimeError::StackEmpty)?.is_null() {
                        ip = target;
                    }
                }
            }
        }

        Ok(match stack.pop_result() {
            Some(value) => Outcome::Value(value),
            None => Outcome::Void,
        })
    }

    // ───────────────────────────────────────────────────────────────
    //  Resource access
    // ───────────────────────────────────────────────────────────────

    /// Local chain, then the host's fallback scopes, then creates `key`
    /// locally holding `default`.
    fn get_or_create(&self, key: &str, default: Value) -> Value {
        if let Some(value) = self.resources.try_get_resource(key) {
            return value;
        }
        if let Some(host) = self.host {
            for scope in host.fallback_scopes() {
                if let Some(value) = scope.try_get_resource(key) {
                    return value;
                }
            }
        }
        self.resources.set(key, default.clone());
        default
    }

    /// Stores a collection changed in place back into the scope that holds
    /// it, so subscribers of `key` see the change.
    fn republish(&self, key: &str, collection: Value) {
        if self.resources.try_get_resource(key).is_none() {
            let owner = self.host.and_then(|host| {
                host.fallback_scopes()
                    .into_iter()
                    .find(|scope| scope.try_get_resource(key).is_some())
            });
            if let Some(scope) = owner {
                scope.set_to_existing_key(key, collection);
                return;
            }
        }
        self.resources.set_to_existing_key(key, collection);
    }

    /// Reads `key`, applies `f` and writes the result back. Returns the old
    /// and the new value.
    fn step(
        &self,
        instruction: &Instruction,
        seed: Value,
        f: fn(&Value) -> Result<Value, RuntimeError>,
    ) -> Result<(Value, Value), RuntimeError> {
        let key = instruction.key()?;
        let old = self.get_or_create(key, seed);
        let new = f(&old)?;
        self.resources.set_to_existing_key(key, new.clone());
        Ok((old, new))
    }

    fn self_value(&self) -> Value {
        self.host
            .and_then(|host| host.current_object().or_else(|| host.root_object()))
            .unwrap_or_else(|| self.resources.owner())
    }
}

// ═══════════════════════════════════════════════════════════════════
// Operand helpers
// ═══════════════════════════════════════════════════════════════════

/// The value an assignment or invocation consumes: a literal, a sentinel
/// slot, or the popped top when the operand is absent.
fn source(
    instruction: &Instruction,
    stack: &mut RuntimeStack,
) -> Result<Value, RuntimeError> {
    match instruction.source() {
        Some(Operand::Sentinel(sentinel)) => stack.take(*sentinel),
        Some(Operand::Value(value)) => Ok(value.clone()),
        None => stack.pop(),
        Some(_) => Err(RuntimeError::MalformedInstruction {
            op: instruction.op.name(),
            reason: "source must be a literal or a stack sentinel",
        }),
    }
}

fn binary(
    stack: &mut RuntimeStack,
    f: impl FnOnce(&Value, &Value) -> Result<Value, RuntimeError>,
) -> Result<(), RuntimeError> {
    let right = stack.pop()?;
    let left = stack.pop()?;
    stack.push(f(&left, &right)?)
}

fn compare(
    stack: &mut RuntimeStack,
    accept: fn(Ordering) -> bool,
) -> Result<(), RuntimeError> {
    binary(stack, |l, r| Ok(Value::Bool(accept(ops::compare(l, r)?))))
}

/// `Jump` may land one past the end, which halts. Conditional jumps must land
/// on an instruction.
fn checked_target(
    instruction: &Instruction,
    len: usize,
    allow_end: bool,
) -> Result<usize, RuntimeError> {
    let target = instruction.target()?;
    let in_range = if allow_end { target <= len } else { target < len };
    if !in_range {
        return Err(RuntimeError::JumpOutOfRange { target, len });
    }
    Ok(target)
}

fn list_index(
    key: &str,
    index: &Value,
    len: usize,
) -> Result<usize, RuntimeError> {
    let position = match index {
        Value::Int32(v) => usize::try_from(*v).ok(),
        Value::Int64(v) => usize::try_from(*v).ok(),
        Value::UInt32(v) => usize::try_from(*v).ok(),
        Value::UInt64(v) => usize::try_from(*v).ok(),
        _ => None,
    };
    position
        .filter(|&i| i < len)
        .ok_or_else(|| RuntimeError::InvalidIndex {
            key: key.to_string(),
            index: index.to_string(),
        })
}

fn index_get(
    key: &str,
    collection: &Value,
    index: &Value,
) -> Result<Value, RuntimeError> {
    match collection {
        Value::Object(Object::Map(entries)) => {
            let entries = entries.read();
            Ok(entries
                .get(index.concat_text().as_str())
                .cloned()
                .unwrap_or_default())
        }
        Value::Object(Object::List(items)) => {
            let items = items.read();
            let i = list_index(key, index, items.len())?;
            Ok(items[i].clone())
        }
        _ => Err(RuntimeError::NotIndexable {
            key: key.to_string(),
        }),
    }
}

fn index_set(
    key: &str,
    collection: &Value,
    index: &Value,
    value: Value,
) -> Result<(), RuntimeError> {
    match collection {
        Value::Object(Object::Map(entries)) => {
            entries.write().insert(index.concat_text().into(), value);
            Ok(())
        }
        Value::Object(Object::List(items)) => {
            let mut items = items.write();
            let i = list_index(key, index, items.len())?;
            items[i] = value;
            Ok(())
        }
        _ => Err(RuntimeError::NotIndexable {
            key: key.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::Sentinel;
    use crate::resources::MemoryResources;

    fn run(instructions: Vec<Instruction>) -> Result<Outcome, RuntimeError> {
        let store = MemoryResources::new();
        Interpreter::new(&store).run(&Bytecode::from(instructions))
    }

    #[test]
    fn empty_program_is_void() {
        assert_eq!(run(vec![]), Ok(Outcome::Void));
    }

    #[test]
    fn result_is_top_of_stack() {
        let outcome = run(vec![
            Instruction::push(Value::Int32(1)),
            Instruction::push(Value::Int32(2)),
        ]);
        assert_eq!(outcome, Ok(Outcome::Value(Value::Int32(2))));
    }

    #[test]
    fn jump_bounds() {
        assert_eq!(
            run(vec![Instruction::jump(Op::Jump, 1)]),
            Ok(Outcome::Void)
        );
        assert_eq!(
            run(vec![Instruction::jump(Op::Jump, 2)]),
            Err(RuntimeError::JumpOutOfRange { target: 2, len: 1 })
        );
        assert_eq!(
            run(vec![
                Instruction::push(Value::Bool(false)),
                Instruction::jump(Op::JumpIfFalse, 2),
            ]),
            Err(RuntimeError::JumpOutOfRange { target: 2, len: 2 })
        );
    }

    #[test]
    fn jump_if_not_null_keeps_the_value() {
        let outcome = run(vec![
            Instruction::push(Value::Int32(7)),
            Instruction::jump(Op::JumpIfNotNull, 3),
            Instruction::push(Value::Int32(0)),
            Instruction::new(Op::Negate),
        ]);
        assert_eq!(outcome, Ok(Outcome::Value(Value::Int32(-7))));
    }

    #[test]
    fn literal_source_operand() {
        let store = MemoryResources::new();
        let code = Bytecode::from(vec![Instruction::keyed_with(
            Op::DirectSetResource,
            "$A".into(),
            Operand::Value(Value::Int32(3)),
        )]);
        assert_eq!(Interpreter::new(&store).run(&code), Ok(Outcome::Void));
        assert_eq!(store.get("$A"), Some(Value::Int32(3)));
    }

    #[test]
    fn second_last_sentinel_source() {
        let store = MemoryResources::new();
        let code = Bytecode::from(vec![
            Instruction::push(Value::Int32(1)),
            Instruction::push(Value::Int32(2)),
            Instruction::keyed_with(
                Op::SetResource,
                "$A".into(),
                Operand::Sentinel(Sentinel::SecondLast),
            ),
        ]);
        let outcome = Interpreter::new(&store).run(&code);
        assert_eq!(outcome, Ok(Outcome::Value(Value::Int32(2))));
        assert_eq!(store.get("$A"), Some(Value::Int32(1)));
    }

    #[test]
    fn malformed_operands_fail() {
        assert!(matches!(
            run(vec![Instruction::new(Op::Push)]),
            Err(RuntimeError::MalformedInstruction { op: "Push", .. })
        ));
        assert_eq!(
            run(vec![Instruction::new(Op::Add)]),
            Err(RuntimeError::StackEmpty)
        );
    }

    #[test]
    fn self_prefers_the_host() {
        use crate::host::HostInfo;

        let store = MemoryResources::new().with_owner(Value::string("owner"));
        let code = Bytecode::from(vec![Instruction::new(Op::PushSelf)]);
        assert_eq!(
            Interpreter::new(&store).run(&code),
            Ok(Outcome::Value(Value::string("owner")))
        );

        let host = HostInfo {
            root_object: Some(Value::string("root")),
            ..HostInfo::default()
        };
        assert_eq!(
            Interpreter::new(&store).with_host(&host).run(&code),
            Ok(Outcome::Value(Value::string("root")))
        );
    }

    #[test]
    fn outcome_accessors() {
        assert!(Outcome::Void.is_void());
        assert_eq!(Outcome::Void.into_value(), Value::Null);
        assert_eq!(Outcome::Value(Value::Int32(1)).as_value(), Some(&Value::Int32(1)));
    }
}
