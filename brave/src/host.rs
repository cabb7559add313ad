use std::sync::Arc;

use crate::resources::Resources;
use crate::value::Value;

/// What the embedding application knows about the place an expression is
/// attached to.
pub trait HostContext: Send + Sync {
    /// The object an expression is evaluated for, if any.
    fn current_object(&self) -> Option<Value> {
        None
    }

    fn root_object(&self) -> Option<Value> {
        None
    }

    /// Outer stores searched after the whole local scope chain misses.
    fn fallback_scopes(&self) -> Vec<Arc<dyn Resources>> {
        Vec::new()
    }
}

/// A [`HostContext`] made of plain fields.
#[derive(Clone, Default)]
pub struct HostInfo {
    pub current_object: Option<Value>,
    pub root_object: Option<Value>,
    pub fallback_scopes: Vec<Arc<dyn Resources>>,
}

impl HostContext for HostInfo {
    fn current_object(&self) -> Option<Value> {
        self.current_object.clone()
    }

    fn root_object(&self) -> Option<Value> {
        self.root_object.clone()
    }

    fn fallback_scopes(&self) -> Vec<Arc<dyn Resources>> {
        self.fallback_scopes.clone()
    }
}
