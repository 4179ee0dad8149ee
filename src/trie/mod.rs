//! The prefix index of one address family of a table.
//!
//! A table keeps its entries in an arena and hands the trie nothing but the
//! key of an entry and its [EntryId]. The trie answers exact lookups, used by
//! the bulk operations that know the prefix length of what they look for,
//! and longest-prefix matches, used by the packet path and by `test`.

use std::collections::HashMap;

use crate::table::EntryId;
use crate::types::errors::TableError;
use crate::types::PrefixId;
use crate::AddressFamily;

//------------ PrefixTrie (trait) --------------------------------------------

pub trait PrefixTrie<AF: AddressFamily>: Default + Send + Sync {
    /// Insert `pfx`, owned by entry `id`. Fails with [TableError::Conflict]
    /// if the exact prefix is present already, and with
    /// [TableError::ResourceExhausted] if memory for it cannot be reserved.
    fn insert(&mut self, pfx: PrefixId<AF>, id: EntryId)
        -> Result<(), TableError>;

    /// Remove the exact prefix, returning the entry that owned it.
    fn remove(&mut self, pfx: &PrefixId<AF>) -> Option<EntryId>;

    fn lookup_exact(&self, pfx: &PrefixId<AF>) -> Option<EntryId>;

    /// The entry with the longest prefix covering `addr`. Must not block or
    /// allocate, this is called on the packet path.
    fn lookup_longest(&self, addr: AF) -> Option<EntryId>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn clear(&mut self);

    /// Make room for `pfxs`, so that inserting them afterwards cannot fail
    /// for lack of memory. Commits rely on this: an insert failing after a
    /// successful reserve is an invariant violation.
    fn reserve(&mut self, pfxs: &[PrefixId<AF>]) -> Result<(), TableError>;

    fn iter(&self) -> impl Iterator<Item = (PrefixId<AF>, EntryId)> + '_;
}

//------------ LenTrie -------------------------------------------------------

/// A prefix index with one hash map per prefix length, keyed on the network
/// address. A longest-prefix match probes the populated lengths from the
/// longest down, so its cost is bounded by the number of distinct lengths in
/// the table rather than by the number of entries.
#[derive(Debug)]
pub struct LenTrie<AF: AddressFamily> {
    // Index is the prefix length, 0..=AF::BITS.
    buckets: Vec<HashMap<AF, EntryId>>,
    len: usize,
}

impl<AF: AddressFamily> Default for LenTrie<AF> {
    fn default() -> Self {
        Self {
            buckets: (0..=AF::BITS).map(|_| HashMap::new()).collect(),
            len: 0,
        }
    }
}

impl<AF: AddressFamily> LenTrie<AF> {
    /// Prefix lengths that currently hold at least one prefix, with their
    /// counts.
    pub fn prefix_lengths(&self) -> Vec<(u8, usize)> {
        self.buckets
            .iter()
            .enumerate()
            .filter(|(_, b)| !b.is_empty())
            .map(|(len, b)| (len as u8, b.len()))
            .collect()
    }
}

impl<AF: AddressFamily> PrefixTrie<AF> for LenTrie<AF> {
    fn insert(
        &mut self,
        pfx: PrefixId<AF>,
        id: EntryId,
    ) -> Result<(), TableError> {
        let bucket = self
            .buckets
            .get_mut(pfx.len() as usize)
            .ok_or(TableError::InvalidArgument("prefix length out of range"))?;
        if bucket.contains_key(&pfx.net()) {
            return Err(TableError::Conflict);
        }
        bucket
            .try_reserve(1)
            .map_err(|_| TableError::ResourceExhausted)?;
        bucket.insert(pfx.net(), id);
        self.len += 1;
        Ok(())
    }

    fn remove(&mut self, pfx: &PrefixId<AF>) -> Option<EntryId> {
        let id = self.buckets.get_mut(pfx.len() as usize)?.remove(&pfx.net());
        if id.is_some() {
            self.len -= 1;
        }
        id
    }

    fn lookup_exact(&self, pfx: &PrefixId<AF>) -> Option<EntryId> {
        self.buckets.get(pfx.len() as usize)?.get(&pfx.net()).copied()
    }

    fn lookup_longest(&self, addr: AF) -> Option<EntryId> {
        self.buckets
            .iter()
            .enumerate()
            .rev()
            .filter(|(_, b)| !b.is_empty())
            .find_map(|(len, b)| {
                b.get(&addr.truncate_to_len(len as u8)).copied()
            })
    }

    fn len(&self) -> usize {
        self.len
    }

    fn clear(&mut self) {
        self.buckets.iter_mut().for_each(|b| b.clear());
        self.len = 0;
    }

    fn reserve(&mut self, pfxs: &[PrefixId<AF>]) -> Result<(), TableError> {
        let mut per_len = vec![0_usize; self.buckets.len()];
        for pfx in pfxs {
            if let Some(n) = per_len.get_mut(pfx.len() as usize) {
                *n += 1;
            }
        }
        for (bucket, n) in self.buckets.iter_mut().zip(per_len) {
            if n > 0 {
                bucket
                    .try_reserve(n)
                    .map_err(|_| TableError::ResourceExhausted)?;
            }
        }
        Ok(())
    }

    fn iter(&self) -> impl Iterator<Item = (PrefixId<AF>, EntryId)> + '_ {
        self.buckets.iter().enumerate().flat_map(|(len, b)| {
            b.iter()
                .map(move |(net, id)| (PrefixId::new(*net, len as u8), *id))
        })
    }
}
