use std::sync::Arc;

use log::debug;

use crate::compiler::{self, AssignMode};
use crate::error::{CompileError, RuntimeError};
use crate::host::HostContext;
use crate::instruction::Bytecode;
use crate::interpreter::{Interpreter, Outcome};
use crate::observable::ObservableExpression;
use crate::ops;
use crate::resources::Resources;
use crate::value::Value;

/// Something `InvokeResource` can run.
pub trait Executable: Send + Sync {
    fn execute(&self, parameter: Value) -> Result<(), RuntimeError>;

    fn can_execute(&self) -> bool {
        true
    }
}

impl<F> Executable for F
where
    F: Fn(Value) -> Result<(), RuntimeError> + Send + Sync,
{
    fn execute(&self, parameter: Value) -> Result<(), RuntimeError> {
        self(parameter)
    }
}

/// Where a command's enabled state comes from.
#[derive(Clone, Default)]
pub enum CanExecute {
    #[default]
    Always,
    Fixed(bool),
    /// The latest value of an expression, coerced to boolean. A value that
    /// does not coerce reads as `false`.
    Expression(ObservableExpression),
}

impl CanExecute {
    pub fn get(&self) -> bool {
        match self {
            Self::Always => true,
            Self::Fixed(enabled) => *enabled,
            Self::Expression(expression) => ops::to_boolean(&expression.value()).unwrap_or(false),
        }
    }
}

/// Imperative expression bound to a resource store.
pub struct Command {
    resources: Arc<dyn Resources>,
    host: Option<Arc<dyn HostContext>>,
    code: Bytecode,
    can_execute: CanExecute,
}

impl Command {
    pub fn new(resources: Arc<dyn Resources>, code: Bytecode) -> Self {
        Self {
            resources,
            host: None,
            code,
            can_execute: CanExecute::Always,
        }
    }

    /// Compiles `text` in scoped mode.
    pub fn compile(resources: Arc<dyn Resources>, text: &str) -> Result<Self, CompileError> {
        let code = compiler::compile(text, AssignMode::Scoped)?;
        Ok(Self::new(resources, code))
    }

    pub fn with_host(mut self, host: Arc<dyn HostContext>) -> Self {
        self.host = Some(host);
        self
    }

    pub fn with_can_execute(mut self, can_execute: CanExecute) -> Self {
        self.can_execute = can_execute;
        self
    }

    pub fn code(&self) -> &Bytecode {
        &self.code
    }

    /// Runs the bytecode and returns what it produced.
    pub fn run(&self, parameter: Value) -> Result<Outcome, RuntimeError> {
        let mut interpreter = Interpreter::new(&*self.resources).with_parameter(parameter);
        if let Some(host) = &self.host {
            interpreter = interpreter.with_host(&**host);
        }
        interpreter.run(&self.code)
    }
}

impl Executable for Command {
    fn execute(&self, parameter: Value) -> Result<(), RuntimeError> {
        let outcome = self.run(parameter)?;
        debug!("command finished with {outcome:?}");
        Ok(())
    }

    fn can_execute(&self) -> bool {
        self.can_execute.get()
    }
}
