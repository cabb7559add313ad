use crate::error::RuntimeError;
use crate::instruction::Sentinel;
use crate::pool::{Pool, Pooled, Reusable};
use crate::value::Value;

/// Slots a freshly rented stack can hold before growing.
pub const INITIAL_CAPACITY: usize = 8;
/// Hard ceiling on live values.
pub const MAX_DEPTH: usize = 64;

static STACKS: Pool<Vec<Value>> = Pool::new(16);

impl Reusable for Vec<Value> {
    fn fresh() -> Self {
        Vec::with_capacity(INITIAL_CAPACITY)
    }

    fn reset(&mut self) -> bool {
        // Drops every value so the pool retains no references.
        self.clear();
        self.capacity() == INITIAL_CAPACITY
    }
}

/// The evaluation stack of one interpreter run.
///
/// Rented from a shared pool on creation and handed back when dropped, so
/// every exit path of a run returns it. A stack that grew past its initial
/// capacity is discarded instead of returned.
pub struct RuntimeStack {
    values: Pooled<'static, Vec<Value>>,
}

impl RuntimeStack {
    #[must_use]
    pub fn rent() -> Self {
        Self {
            values: STACKS.rent(),
        }
    }

    /// Pushes a value, failing once the stack already holds [`MAX_DEPTH`].
    pub fn push(&mut self, value: Value) -> Result<(), RuntimeError> {
        if self.values.len() >= MAX_DEPTH {
            return Err(RuntimeError::StackOverflow { max: MAX_DEPTH });
        }
        self.values.push(value);
        Ok(())
    }

    pub fn pop(&mut self) -> Result<Value, RuntimeError> {
        self.values.pop().ok_or(RuntimeError::StackEmpty)
    }

    #[must_use]
    pub fn peek(&self) -> Option<&Value> {
        self.values.last()
    }

    /// Removes the value `sentinel` refers to. Values above it keep their
    /// order.
    pub fn take(&mut self, sentinel: Sentinel) -> Result<Value, RuntimeError> {
        let depth = sentinel.depth();
        let len = self.values.len();
        if depth >= len {
            return Err(RuntimeError::StackEmpty);
        }
        Ok(self.values.remove(len - 1 - depth))
    }

    /// Pops the top value, or `None` when empty.
    pub fn pop_result(&mut self) -> Option<Value> {
        self.values.pop()
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Number of spare stacks waiting in the shared pool.
    #[must_use]
    pub fn pooled() -> usize {
        STACKS.available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_pop_peek() {
        let mut stack = RuntimeStack::rent();
        assert!(stack.is_empty());
        stack.push(Value::Int32(1)).unwrap();
        stack.push(Value::Int32(2)).unwrap();
        assert_eq!(stack.peek(), Some(&Value::Int32(2)));
        assert_eq!(stack.pop(), Ok(Value::Int32(2)));
        assert_eq!(stack.depth(), 1);
    }

    #[test]
    fn empty_pop_fails() {
        let mut stack = RuntimeStack::rent();
        assert_eq!(stack.pop(), Err(RuntimeError::StackEmpty));
        assert_eq!(stack.take(Sentinel::Last), Err(RuntimeError::StackEmpty));
    }

    #[test]
    fn sixty_fifth_push_overflows() {
        let mut stack = RuntimeStack::rent();
        for i in 0..MAX_DEPTH {
            stack.push(Value::Int32(i as i32)).unwrap();
        }
        assert_eq!(
            stack.push(Value::Null),
            Err(RuntimeError::StackOverflow { max: MAX_DEPTH })
        );
    }

    #[test]
    fn sentinels_preserve_the_values_above() {
        let mut stack = RuntimeStack::rent();
        for v in 1..=4 {
            stack.push(Value::Int32(v)).unwrap();
        }
        assert_eq!(stack.take(Sentinel::ThirdLast), Ok(Value::Int32(2)));
        assert_eq!(stack.take(Sentinel::SecondLast), Ok(Value::Int32(3)));
        assert_eq!(stack.take(Sentinel::Last), Ok(Value::Int32(4)));
        assert_eq!(stack.pop(), Ok(Value::Int32(1)));
    }

    #[test]
    fn grown_stack_is_not_returned() {
        let mut buffer = Vec::<Value>::fresh();
        assert!(buffer.reset());
        buffer.extend((0..INITIAL_CAPACITY + 1).map(|_| Value::Null));
        assert!(!buffer.reset());
        assert!(buffer.is_empty());
    }
}
