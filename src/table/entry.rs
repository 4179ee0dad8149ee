use crate::types::errors::TableError;
use crate::types::stats::{now_secs, Counters};
use crate::types::PrefixId;
use crate::AddressFamily;

//------------ EntryId -------------------------------------------------------

/// Stable handle of an entry in the arena of its table. The trie of a
/// family stores these, never the entries themselves.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
pub struct EntryId(usize);

impl EntryId {
    pub(crate) fn new(idx: usize) -> Self {
        Self(idx)
    }
}

//------------ Entry ---------------------------------------------------------

#[derive(Debug)]
pub(crate) struct Entry<AF: AddressFamily> {
    pub(crate) pfx: PrefixId<AF>,
    pub(crate) negate: bool,
    pub(crate) counters: Counters,
    pub(crate) tzero: u64,
}

impl<AF: AddressFamily> Entry<AF> {
    pub(crate) fn new(pfx: PrefixId<AF>, negate: bool) -> Self {
        Self {
            pfx,
            negate,
            counters: Counters::default(),
            tzero: now_secs(),
        }
    }

    pub(crate) fn reset_counters(&mut self, tzero: u64) {
        self.counters.reset();
        self.tzero = tzero;
    }
}

//------------ EntryArena ----------------------------------------------------

/// Slab of the entries of one family of a table. Freed slots are reused, so
/// an [EntryId] is only meaningful while its entry is linked.
#[derive(Debug)]
pub(crate) struct EntryArena<AF: AddressFamily> {
    slots: Vec<Option<Entry<AF>>>,
    free: Vec<usize>,
    live: usize,
}

impl<AF: AddressFamily> Default for EntryArena<AF> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
        }
    }
}

impl<AF: AddressFamily> EntryArena<AF> {
    /// Make sure `additional` entries can be inserted without allocating.
    pub(crate) fn reserve(&mut self, additional: usize) -> Result<(), TableError> {
        let from_free = additional.min(self.free.len());
        self.slots
            .try_reserve(additional - from_free)
            .map_err(|_| TableError::ResourceExhausted)
    }

    pub(crate) fn insert(&mut self, entry: Entry<AF>) -> EntryId {
        self.live += 1;
        match self.free.pop() {
            Some(idx) => {
                if let Some(slot) = self.slots.get_mut(idx) {
                    *slot = Some(entry);
                }
                EntryId::new(idx)
            }
            None => {
                self.slots.push(Some(entry));
                EntryId::new(self.slots.len() - 1)
            }
        }
    }

    pub(crate) fn remove(&mut self, id: EntryId) -> Option<Entry<AF>> {
        let entry = self.slots.get_mut(id.0)?.take()?;
        self.free.push(id.0);
        self.live -= 1;
        Some(entry)
    }

    pub(crate) fn get(&self, id: EntryId) -> Option<&Entry<AF>> {
        self.slots.get(id.0)?.as_ref()
    }

    pub(crate) fn get_mut(&mut self, id: EntryId) -> Option<&mut Entry<AF>> {
        self.slots.get_mut(id.0)?.as_mut()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (EntryId, &Entry<AF>)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(idx, s)| s.as_ref().map(|e| (EntryId::new(idx), e)))
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Entry<AF>> {
        self.slots.iter_mut().filter_map(|s| s.as_mut())
    }

    pub(crate) fn len(&self) -> usize {
        self.live
    }

    pub(crate) fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.live = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::IPv4;

    #[test]
    fn test_arena_reuses_slots() {
        let mut arena = EntryArena::<IPv4>::default();
        let a = arena.insert(Entry::new(PrefixId::new(IPv4::zero(), 0), false));
        let b = arena.insert(Entry::new(PrefixId::new(IPv4::from(1_u32 << 24), 8), true));
        assert_eq!(arena.len(), 2);

        assert!(arena.remove(a).is_some());
        assert!(arena.remove(a).is_none());
        assert_eq!(arena.len(), 1);

        let c = arena.insert(Entry::new(PrefixId::new(IPv4::zero(), 1), false));
        assert_eq!(c, a);
        assert_eq!(arena.iter().count(), 2);
        assert!(arena.get(b).map(|e| e.negate).unwrap_or(false));
    }
}
