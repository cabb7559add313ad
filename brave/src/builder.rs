use crate::instruction::{Bytecode, Instruction, Op, Operand};
use crate::value::Value;

/// A forward jump whose target has not yet been resolved.
///
/// Created by [`CodeBuilder::jump`]. Resolve it with [`CodeBuilder::bind`].
#[derive(Debug)]
#[must_use = "an unbound label leaves its jump pointing at 0"]
pub struct Label {
    /// Index of the placeholder jump instruction.
    index: usize,
}

/// Builds a flat instruction sequence.
pub struct CodeBuilder {
    code: Vec<Instruction>,
}

impl CodeBuilder {
    pub fn new() -> Self {
        Self { code: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            code: Vec::with_capacity(capacity),
        }
    }

    /// Index the next emitted instruction will get.
    pub fn current_offset(&self) -> usize {
        self.code.len()
    }

    pub fn finish(self) -> Bytecode {
        Bytecode::from(self.code)
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.code
    }

    // ── emit helpers ───────────────────────────────────────────────

    pub fn emit(&mut self, instruction: Instruction) {
        self.code.push(instruction);
    }

    pub fn emit_op(&mut self, op: Op) {
        self.emit(Instruction::new(op));
    }

    pub fn emit_push(&mut self, value: Value) {
        self.emit(Instruction::push(value));
    }

    // ── jumps ──────────────────────────────────────────────────────

    /// Emit a forward jump with a placeholder target. Returns a [`Label`].
    pub fn jump(&mut self, op: Op) -> Label {
        debug_assert!(op.is_jump(), "{op} is not a jump");
        let index = self.code.len();
        self.emit(Instruction::jump(op, 0));
        Label { index }
    }

    /// Bind a forward jump label to the current position.
    pub fn bind(&mut self, label: Label) {
        let target = self.code.len();
        self.bind_to(label, target);
    }

    /// Bind a label to an explicit instruction index.
    pub fn bind_to(&mut self, label: Label, target: usize) {
        if let Some(instruction) = self.code.get_mut(label.index) {
            instruction.args[0] = Operand::Target(target);
        }
    }
}

impl Default for CodeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
