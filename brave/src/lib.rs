mod binding;
mod builder;
mod cache;
mod command;
mod compiler;
mod error;
mod hash;
mod host;
mod instruction;
mod interpreter;
mod lexer;
mod observable;
mod ops;
mod pool;
mod resources;
mod slots;
mod stack;
mod token;
mod value;

pub use binding::{KeyBinding, ObservableKey};
pub use builder::{CodeBuilder, Label};
pub use cache::CompilerCache;
pub use command::{CanExecute, Command, Executable};
pub use compiler::{AssignMode, Compiler, MAX_NESTING, PREFIX_INCREMENT_SEED, compile};
pub use error::{CompileError, Error, Result, RuntimeError};
pub use host::{HostContext, HostInfo};
pub use instruction::{Arguments, Bytecode, Instruction, Op, Operand, Sentinel};
pub use interpreter::{ABSENT_KEY_SEED, Interpreter, Outcome, execute};
pub use lexer::{Lexer, MAX_EXPRESSION_LENGTH};
pub use observable::{Converter, ObservableExpression, Observer, watch_keys};
pub use resources::{ChangeCallback, MemoryResources, Resources, Subscription};
pub use stack::{INITIAL_CAPACITY as STACK_INITIAL_CAPACITY, MAX_DEPTH as STACK_MAX_DEPTH, RuntimeStack};
pub use token::{Token, TokenKind};
pub use value::{NumericKind, Object, Value};
