use std::sync::Arc;

use crate::compiler::AssignMode;
use crate::hash::{fmix32, fnv1a};
use crate::instruction::Bytecode;
use crate::slots::SlotCache;

const SLOTS: usize = 16;

/// Golden-ratio constant folded into the hash of direct-mode entries.
const DIRECT_MODE_SALT: u32 = 0x9E37_79B9;

#[derive(Clone)]
struct Entry {
    hash: u32,
    mode: AssignMode,
    text: Arc<str>,
    code: Bytecode,
}

/// Memo from `(expression text, assignment mode)` to compiled bytecode.
///
/// Direct-mapped: a colliding insert evicts the previous entry.
pub struct CompilerCache {
    slots: SlotCache<Entry, SLOTS>,
}

static GLOBAL: CompilerCache = CompilerCache::new();

impl CompilerCache {
    pub const fn new() -> Self {
        Self {
            slots: SlotCache::new(),
        }
    }

    /// The process-wide cache used by [`compile`](crate::compile).
    pub fn global() -> &'static CompilerCache {
        &GLOBAL
    }

    fn hash(text: &str, mode: AssignMode) -> u32 {
        let salt = match mode {
            AssignMode::Scoped => 0,
            AssignMode::Direct => DIRECT_MODE_SALT,
        };
        fmix32(fnv1a(text) ^ salt)
    }

    pub fn get(&self, text: &str, mode: AssignMode) -> Option<Bytecode> {
        let hash = Self::hash(text, mode);
        self.slots
            .get(hash, |e| e.hash == hash && e.mode == mode && &*e.text == text)
            .map(|e| e.code)
    }

    pub fn insert(&self, text: &str, mode: AssignMode, code: Bytecode) {
        let hash = Self::hash(text, mode);
        self.slots.insert(
            hash,
            Entry {
                hash,
                mode,
                text: text.into(),
                code,
            },
        );
    }

    pub fn clear(&self) {
        self.slots.clear();
    }
}

impl Default for CompilerCache {
    fn default() -> Self {
        Self::new()
    }
}
