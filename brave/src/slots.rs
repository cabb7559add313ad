use parking_lot::RwLock;

/// A direct-mapped memo table of `N` slots, `N` a power of two.
///
/// Each slot holds at most one entry. Inserting into an occupied slot
/// replaces whatever was there, so a lookup may miss even for a key that was
/// inserted earlier. Callers always have a way to recompute the value.
pub struct SlotCache<V, const N: usize> {
    slots: [RwLock<Option<V>>; N],
}

impl<V: Clone, const N: usize> SlotCache<V, N> {
    const MASK: usize = {
        assert!(N.is_power_of_two(), "slot count must be a power of two");
        N - 1
    };

    pub const fn new() -> Self {
        Self {
            slots: [const { RwLock::new(None) }; N],
        }
    }

    fn slot(&self, hash: u32) -> &RwLock<Option<V>> {
        &self.slots[hash as usize & Self::MASK]
    }

    /// Returns a clone of the entry in `hash`'s slot if `matches` accepts it.
    pub fn get(&self, hash: u32, matches: impl FnOnce(&V) -> bool) -> Option<V> {
        let slot = self.slot(hash).read();
        match slot.as_ref() {
            Some(entry) if matches(entry) => Some(entry.clone()),
            _ => None,
        }
    }

    /// Overwrites `hash`'s slot.
    pub fn insert(&self, hash: u32, value: V) {
        *self.slot(hash).write() = Some(value);
    }

    /// Whether `hash`'s slot currently holds an entry accepted by `matches`.
    pub fn holds(&self, hash: u32, matches: impl FnOnce(&V) -> bool) -> bool {
        self.slot(hash).read().as_ref().is_some_and(matches)
    }

    pub fn clear(&self) {
        for slot in &self.slots {
            *slot.write() = None;
        }
    }
}

impl<V: Clone, const N: usize> Default for SlotCache<V, N> {
    fn default() -> Self {
        Self::new()
    }
}
