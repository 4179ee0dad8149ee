use std::collections::HashMap;

use crate::table::bulk::{AfWork, EntryWork};
use crate::table::entry::{Entry, EntryArena, EntryId};
use crate::table::TableState;
use crate::trie::{LenTrie, PrefixTrie};
use crate::types::errors::TableError;
use crate::types::PrefixId;
use crate::{AddressFamily, IPv4, IPv6};

//------------ AfEntries -----------------------------------------------------

/// The entries of one address family of a table: the arena that owns them
/// and the trie that indexes them. An entry is linked into both or neither.
#[derive(Debug)]
pub(crate) struct AfEntries<AF: AddressFamily> {
    trie: LenTrie<AF>,
    arena: EntryArena<AF>,
}

impl<AF: AddressFamily> Default for AfEntries<AF> {
    fn default() -> Self {
        Self {
            trie: LenTrie::default(),
            arena: EntryArena::default(),
        }
    }
}

impl<AF: AddressFamily> AfEntries<AF> {
    pub(crate) fn lookup_exact(&self, pfx: &PrefixId<AF>) -> Option<&Entry<AF>> {
        self.trie
            .lookup_exact(pfx)
            .and_then(|id| self.arena.get(id))
    }

    pub(crate) fn lookup_exact_mut(
        &mut self,
        pfx: &PrefixId<AF>,
    ) -> Option<&mut Entry<AF>> {
        let id = self.trie.lookup_exact(pfx)?;
        self.arena.get_mut(id)
    }

    pub(crate) fn lookup_longest(&self, addr: AF) -> Option<&Entry<AF>> {
        self.trie
            .lookup_longest(addr)
            .and_then(|id| self.arena.get(id))
    }

    /// Reserve room for `pfxs` in both the arena and the trie, so that
    /// linking them afterwards cannot fail halfway.
    pub(crate) fn reserve(
        &mut self,
        pfxs: &[PrefixId<AF>],
    ) -> Result<(), TableError> {
        self.arena.reserve(pfxs.len())?;
        self.trie.reserve(pfxs)
    }

    pub(crate) fn link(
        &mut self,
        pfx: PrefixId<AF>,
        negate: bool,
    ) -> Result<(), TableError> {
        let id = self.arena.insert(Entry::new(pfx, negate));
        if let Err(err) = self.trie.insert(pfx, id) {
            self.arena.remove(id);
            return Err(err);
        }
        Ok(())
    }

    pub(crate) fn unlink(&mut self, pfx: &PrefixId<AF>) -> Option<Entry<AF>> {
        let id = self.trie.remove(pfx)?;
        self.arena.remove(id)
    }

    pub(crate) fn clear(&mut self) -> usize {
        let n = self.arena.len();
        self.trie.clear();
        self.arena.clear();
        n
    }

    pub(crate) fn len(&self) -> usize {
        self.trie.len()
    }

    pub(crate) fn entries(&self) -> impl Iterator<Item = &Entry<AF>> {
        self.arena.iter().map(|(_, e)| e)
    }

    pub(crate) fn entries_mut(&mut self) -> impl Iterator<Item = &mut Entry<AF>> {
        self.arena.iter_mut()
    }

    /// Entries ordered by address, then prefix length.
    pub(crate) fn sorted(&self) -> Vec<&Entry<AF>> {
        let mut v = self.entries().collect::<Vec<_>>();
        v.sort_by_key(|e| e.pfx.sort_key());
        v
    }

    /// Walks the trie and the arena against each other. Returns a
    /// description of the first disagreement found.
    pub(crate) fn audit(&self) -> Result<(), String> {
        if self.trie.len() != self.arena.len() {
            return Err(format!(
                "{:?} trie holds {} prefixes, arena {} entries",
                AF::FAMILY,
                self.trie.len(),
                self.arena.len()
            ));
        }
        let mut seen: HashMap<EntryId, PrefixId<AF>> = HashMap::new();
        for (pfx, id) in self.trie.iter() {
            match self.arena.get(id) {
                Some(e) if e.pfx == pfx => {}
                Some(e) => {
                    return Err(format!(
                        "trie key {} points at entry {}",
                        pfx, e.pfx
                    ))
                }
                None => return Err(format!("trie key {} is an orphan", pfx)),
            }
            if seen.insert(id, pfx).is_some() {
                return Err(format!("entry {:?} is indexed twice", id));
            }
        }
        match self.arena.iter().find(|(id, _)| !seen.contains_key(id)) {
            Some((_, e)) => Err(format!("entry {} is not indexed", e.pfx)),
            None => Ok(()),
        }
    }
}

//------------ TableFamily (trait) -------------------------------------------

/// Picks the half of a table that belongs to an address family, so the bulk
/// operations can be written once, generic over the family.
pub(crate) trait TableFamily: AddressFamily {
    fn entries(state: &TableState) -> &AfEntries<Self>;
    fn entries_mut(state: &mut TableState) -> &mut AfEntries<Self>;
    fn work(work: &mut EntryWork) -> &mut AfWork<Self>;
}

impl TableFamily for IPv4 {
    fn entries(state: &TableState) -> &AfEntries<Self> {
        &state.v4
    }

    fn entries_mut(state: &mut TableState) -> &mut AfEntries<Self> {
        &mut state.v4
    }

    fn work(work: &mut EntryWork) -> &mut AfWork<Self> {
        &mut work.v4
    }
}

impl TableFamily for IPv6 {
    fn entries(state: &TableState) -> &AfEntries<Self> {
        &state.v6
    }

    fn entries_mut(state: &mut TableState) -> &mut AfEntries<Self> {
        &mut state.v6
    }

    fn work(work: &mut EntryWork) -> &mut AfWork<Self> {
        &mut work.v6
    }
}

/// Run `$body` with `$af` bound to the address family type matching the
/// [Family](crate::types::Family) value `$family`.
macro_rules! with_family {
    ( $family: expr, $af: ident => $body: expr ) => {
        match $family {
            $crate::types::Family::Inet => {
                type $af = $crate::IPv4;
                $body
            }
            $crate::types::Family::Inet6 => {
                type $af = $crate::IPv6;
                $body
            }
        }
    };
}

pub(crate) use with_family;
