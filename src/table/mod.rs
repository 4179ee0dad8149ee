//! A named table of IPv4 and IPv6 prefixes.
//!
//! Every table holds its entries behind a single [parking_lot::RwLock]. The
//! packet path takes the read side for its lookup and counter update; every
//! mutation of the entry set commits under the write side, so a concurrent
//! lookup sees the table either before or after a bulk operation, never in
//! between.

mod af_entries;
mod bulk;
mod entry;
mod fast_path;

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_utils::CachePadded;
use log::{debug, trace};
use parking_lot::{RwLock, RwLockUpgradableReadGuard};

pub use bulk::BulkReport;
pub use entry::EntryId;

pub(crate) use af_entries::{with_family, AfEntries, TableFamily};

use crate::registry::NameHash;
use crate::types::errors::{InvariantViolation, TableError};
use crate::types::stats::{now_secs, Counters, TableStats};
use crate::types::match_options::OpFlags;
use crate::{IPv4, IPv6};

//------------ TableFlags ----------------------------------------------------

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct TableFlags {
    /// The addresses of the table cannot be modified.
    pub constant: bool,
}

//------------ EntryBudget ---------------------------------------------------

/// The number of entries all tables of a registry may hold together.
#[derive(Debug)]
pub(crate) struct EntryBudget {
    limit: Option<usize>,
    used: AtomicUsize,
}

impl EntryBudget {
    pub(crate) fn new(limit: Option<usize>) -> Self {
        Self {
            limit,
            used: AtomicUsize::new(0),
        }
    }

    pub(crate) fn reserve(&self, n: usize) -> Result<(), TableError> {
        let Some(limit) = self.limit else {
            self.used.fetch_add(n, Ordering::Relaxed);
            return Ok(());
        };
        self.used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                used.checked_add(n).filter(|total| *total <= limit)
            })
            .map(|_| ())
            .map_err(|_| TableError::ResourceExhausted)
    }

    pub(crate) fn release(&self, n: usize) {
        self.used.fetch_sub(n, Ordering::AcqRel);
    }

    pub(crate) fn used(&self) -> usize {
        self.used.load(Ordering::Acquire)
    }
}

//------------ TableState ----------------------------------------------------

#[derive(Debug)]
pub(crate) struct TableState {
    pub(crate) v4: AfEntries<IPv4>,
    pub(crate) v6: AfEntries<IPv6>,
    // Must always equal the sum of the prefixes in both tries.
    pub(crate) count: usize,
    pub(crate) counters: CachePadded<Counters>,
    pub(crate) matches: AtomicU64,
    pub(crate) nomatches: AtomicU64,
    pub(crate) tzero: u64,
    pub(crate) flags: TableFlags,
    pub(crate) destroyed: bool,
}

impl TableState {
    fn new() -> Self {
        Self {
            v4: AfEntries::default(),
            v6: AfEntries::default(),
            count: 0,
            counters: CachePadded::new(Counters::default()),
            matches: AtomicU64::new(0),
            nomatches: AtomicU64::new(0),
            tzero: now_secs(),
            flags: TableFlags::default(),
            destroyed: false,
        }
    }

    pub(crate) fn check_alive(&self) -> Result<(), TableError> {
        if self.destroyed {
            return Err(TableError::NotFound);
        }
        Ok(())
    }

    pub(crate) fn check_writable(&self) -> Result<(), TableError> {
        self.check_alive()?;
        if self.flags.constant {
            return Err(TableError::PermissionDenied);
        }
        Ok(())
    }

    pub(crate) fn reset_stats(&mut self, tzero: u64) {
        self.counters.reset();
        self.matches.store(0, Ordering::Relaxed);
        self.nomatches.store(0, Ordering::Relaxed);
        self.tzero = tzero;
    }

    pub(crate) fn reset_entry_stats(&mut self, tzero: u64) -> usize {
        let mut n = 0;
        for e in self.v4.entries_mut() {
            e.reset_counters(tzero);
            n += 1;
        }
        for e in self.v6.entries_mut() {
            e.reset_counters(tzero);
            n += 1;
        }
        n
    }

    pub(crate) fn snapshot(&self, name: &str) -> TableStats {
        TableStats {
            name: name.to_string(),
            count: self.count,
            counters: self.counters.snapshot(),
            matches: self.matches.load(Ordering::Relaxed),
            nomatches: self.nomatches.load(Ordering::Relaxed),
            tzero: self.tzero,
            constant: self.flags.constant,
        }
    }

    /// Check the entry count against both tries. In debug builds also walk
    /// every trie against its arena.
    #[allow(clippy::panic)]
    fn check_invariants(&self, name: &str) {
        let detail = if self.count != self.v4.len() + self.v6.len() {
            Some(format!(
                "entry count {} but tries hold {} + {}",
                self.count,
                self.v4.len(),
                self.v6.len()
            ))
        } else if cfg!(debug_assertions) {
            self.v4.audit().and_then(|_| self.v6.audit()).err()
        } else {
            None
        };
        if let Some(detail) = detail {
            panic!(
                "{}",
                InvariantViolation {
                    table: name.to_string(),
                    detail,
                }
            );
        }
    }
}

//------------ Work (trait) --------------------------------------------------

/// A set of staged changes to the entries of a table, computed under a
/// shared lock and applied in one step under the exclusive lock.
pub(crate) trait Work {
    fn is_empty(&self) -> bool;

    /// Apply the staged changes. Must either fail without touching `state`,
    /// or succeed completely. Failing halfway is a corrupt `table` and
    /// panics.
    fn commit(
        self,
        table: &str,
        state: &mut TableState,
        budget: &EntryBudget,
    ) -> Result<(), TableError>;
}

//------------ Table ---------------------------------------------------------

/// A named table of address entries.
///
/// Tables are created and destroyed through the
/// [TableRegistry](crate::registry::TableRegistry). A reference obtained from
/// the registry can be kept around by the caller to run the packet path
/// ([Table::classify], [Table::record]) without going through the registry
/// again.
#[derive(Debug)]
pub struct Table {
    name: String,
    hash: NameHash,
    budget: Arc<EntryBudget>,
    state: RwLock<TableState>,
}

impl Table {
    pub(crate) fn new(
        name: String,
        hash: NameHash,
        budget: Arc<EntryBudget>,
    ) -> Self {
        Self {
            name,
            hash,
            budget,
            state: RwLock::new(TableState::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn hash(&self) -> &NameHash {
        &self.hash
    }

    /// The number of entries in both families.
    pub fn count(&self) -> usize {
        self.state.read().count
    }

    pub fn flags(&self) -> TableFlags {
        self.state.read().flags
    }

    pub fn is_destroyed(&self) -> bool {
        self.state.read().destroyed
    }

    pub(crate) fn set_flags(
        &self,
        set: TableFlags,
        clear: TableFlags,
    ) -> Result<TableFlags, TableError> {
        let mut state = self.state.write();
        state.check_alive()?;
        if set.constant {
            state.flags.constant = true;
        }
        if clear.constant {
            state.flags.constant = false;
        }
        Ok(state.flags)
    }

    /// Walk both tries against the entry arenas and the entry count, and
    /// panic if they disagree.
    pub fn verify(&self) {
        self.state.read().check_invariants(&self.name);
    }

    /// Table statistics. With `clear` the counters are zeroed in the same
    /// critical section.
    pub fn stats(&self, clear: bool) -> Result<TableStats, TableError> {
        if clear {
            let mut state = self.state.write();
            state.check_alive()?;
            let stats = state.snapshot(&self.name);
            state.reset_stats(now_secs());
            Ok(stats)
        } else {
            let state = self.state.read();
            state.check_alive()?;
            Ok(state.snapshot(&self.name))
        }
    }

    /// Zero the table counters, and those of every entry if `addrs_too`.
    pub fn clear_table_stats(&self, flags: OpFlags) -> Result<(), TableError> {
        if flags.dry_run {
            return self.state.read().check_alive();
        }
        let mut state = self.state.write();
        state.check_alive()?;
        let tzero = now_secs();
        state.reset_stats(tzero);
        if flags.addrs_too {
            state.reset_entry_stats(tzero);
        }
        debug!("table {}: statistics cleared", self.name);
        Ok(())
    }

    /// Empty the table and mark it destroyed. Releases the entries to the
    /// budget. Later operations through a stale reference fail with
    /// [TableError::NotFound].
    pub(crate) fn destroy(&self) {
        let mut state = self.state.write();
        let n = state.v4.clear() + state.v6.clear();
        state.count = 0;
        state.destroyed = true;
        self.budget.release(n);
        state.check_invariants(&self.name);
        trace!("table {}: destroyed, {} entries released", self.name, n);
    }

    /// Stage with `stage`, then commit the staged work, choosing the lock
    /// discipline from `flags`.
    pub(crate) fn mutate<W, R>(
        &self,
        flags: OpFlags,
        stage: impl FnOnce(&TableState) -> Result<(W, R), TableError>,
    ) -> Result<R, TableError>
    where
        W: Work,
    {
        if flags.dry_run {
            let state = self.state.read();
            state.check_writable()?;
            let (_, report) = stage(&*state)?;
            return Ok(report);
        }

        if flags.atomic {
            let mut state = self.state.write();
            state.check_writable()?;
            let (work, report) = stage(&*state)?;
            if !work.is_empty() {
                work.commit(&self.name, &mut *state, &self.budget)?;
                state.check_invariants(&self.name);
            }
            return Ok(report);
        }

        let state = self.state.upgradable_read();
        state.check_writable()?;
        let (work, report) = stage(&*state)?;
        if !work.is_empty() {
            let mut state = RwLockUpgradableReadGuard::upgrade(state);
            work.commit(&self.name, &mut *state, &self.budget)?;
            state.check_invariants(&self.name);
        }
        Ok(report)
    }

    pub(crate) fn read_state(
        &self,
    ) -> parking_lot::RwLockReadGuard<'_, TableState> {
        self.state.read()
    }

    pub(crate) fn write_state(
        &self,
    ) -> parking_lot::RwLockWriteGuard<'_, TableState> {
        self.state.write()
    }
}
