//! Bulk operations on the entries of a table.
//!
//! Every mutating operation runs in two steps. The staging step looks up
//! every record in the live table and collects the additions, deletions and
//! negation flips in an [EntryWork], without touching the table. The commit
//! step applies the whole `EntryWork` under the exclusive lock, after it
//! made sure nothing in it can fail for lack of room.

use std::collections::{HashMap, HashSet};

use log::{debug, trace};

use crate::table::entry::Entry;
use crate::table::{
    with_family, AfEntries, EntryBudget, Table, TableFamily, TableState, Work,
};
use crate::types::errors::{InvariantViolation, RecordFault, TableError};
use crate::types::match_options::OpFlags;
use crate::types::stats::{now_secs, AddrStats};
use crate::types::{AddrRecord, Feedback, PrefixId};
use crate::{AddressFamily, IPv4, IPv6};

//------------ BulkReport ----------------------------------------------------

/// The outcome of a bulk operation that went through as a whole.
///
/// `feedback` echoes every input record in order with its [Feedback] set.
/// `set` appends the entries it deleted when the caller asked for them.
/// Records that could not be processed are listed in `faults` and carry
/// [Feedback::None].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BulkReport {
    pub added: usize,
    pub deleted: usize,
    pub changed: usize,
    pub matched: usize,
    pub cleared: usize,
    pub feedback: Vec<AddrRecord>,
    pub faults: Vec<RecordFault>,
}

impl BulkReport {
    fn with_capacity(n: usize) -> Result<Self, TableError> {
        let mut report = Self::default();
        report
            .feedback
            .try_reserve(n)
            .map_err(|_| TableError::ResourceExhausted)?;
        Ok(report)
    }

    /// True if every record was processed, even if some were no-ops.
    pub fn is_clean(&self) -> bool {
        self.faults.is_empty()
    }

    /// Just the feedback values, in order.
    pub fn feedback_values(&self) -> Vec<Feedback> {
        self.feedback.iter().map(|r| r.feedback).collect()
    }

    fn tally(&mut self, feedback: Feedback) {
        match feedback {
            Feedback::None => {}
            Feedback::Added => self.added += 1,
            Feedback::Deleted => self.deleted += 1,
            Feedback::Changed => self.changed += 1,
            Feedback::Match => self.matched += 1,
            Feedback::Cleared => self.cleared += 1,
        }
    }

    /// Run `f` for every record, collecting its feedback or its fault.
    fn process(
        &mut self,
        records: &[AddrRecord],
        mut f: impl FnMut(&AddrRecord) -> Result<Feedback, TableError>,
    ) {
        for (index, rec) in records.iter().enumerate() {
            let feedback = match f(rec) {
                Ok(feedback) => feedback,
                Err(error) => {
                    trace!("record {} ({}) rejected: {}", index, rec, error);
                    self.faults.push(RecordFault { index, error });
                    Feedback::None
                }
            };
            self.tally(feedback);
            self.feedback.push(rec.with_feedback(feedback));
        }
    }
}

//------------ EntryWork -----------------------------------------------------

#[derive(Debug)]
pub(crate) struct AfWork<AF: AddressFamily> {
    add: Vec<(PrefixId<AF>, bool)>,
    delete: Vec<PrefixId<AF>>,
    flip: Vec<PrefixId<AF>>,
    // Prefixes staged for addition in this call, with their negation.
    staged: HashMap<PrefixId<AF>, bool>,
    // Existing entries already claimed by a record of this call. Only valid
    // for the duration of one call.
    marked: HashSet<PrefixId<AF>>,
}

impl<AF: AddressFamily> Default for AfWork<AF> {
    fn default() -> Self {
        Self {
            add: Vec::new(),
            delete: Vec::new(),
            flip: Vec::new(),
            staged: HashMap::new(),
            marked: HashSet::new(),
        }
    }
}

impl<AF: TableFamily> AfWork<AF> {
    fn is_empty(&self) -> bool {
        self.add.is_empty() && self.delete.is_empty() && self.flip.is_empty()
    }

    fn stage_add(&mut self, pfx: PrefixId<AF>, negate: bool) -> Feedback {
        self.staged.insert(pfx, negate);
        self.add.push((pfx, negate));
        Feedback::Added
    }

    fn reserve_in(&self, entries: &mut AfEntries<AF>) -> Result<(), TableError> {
        let pfxs = self.add.iter().map(|(p, _)| *p).collect::<Vec<_>>();
        entries.reserve(&pfxs)
    }

    fn apply(self, entries: &mut AfEntries<AF>) -> Result<(), String> {
        for pfx in &self.delete {
            entries
                .unlink(pfx)
                .ok_or_else(|| format!("staged deletion {} is gone", pfx))?;
        }
        for pfx in &self.flip {
            let entry = entries
                .lookup_exact_mut(pfx)
                .ok_or_else(|| format!("staged change {} is gone", pfx))?;
            entry.negate = !entry.negate;
        }
        for (pfx, negate) in self.add {
            entries
                .link(pfx, negate)
                .map_err(|e| format!("cannot link staged {}: {}", pfx, e))?;
        }
        Ok(())
    }
}

/// Changes staged against both families of a table.
#[derive(Debug, Default)]
pub(crate) struct EntryWork {
    pub(crate) v4: AfWork<IPv4>,
    pub(crate) v6: AfWork<IPv6>,
}

impl EntryWork {
    fn adds(&self) -> usize {
        self.v4.add.len() + self.v6.add.len()
    }

    fn deletes(&self) -> usize {
        self.v4.delete.len() + self.v6.delete.len()
    }
}

impl Work for EntryWork {
    fn is_empty(&self) -> bool {
        self.v4.is_empty() && self.v6.is_empty()
    }

    #[allow(clippy::panic)]
    fn commit(
        self,
        table: &str,
        state: &mut TableState,
        budget: &EntryBudget,
    ) -> Result<(), TableError> {
        let (adds, deletes) = (self.adds(), self.deletes());
        let grow = adds.saturating_sub(deletes);

        budget.reserve(grow)?;
        if let Err(err) = self
            .v4
            .reserve_in(&mut state.v4)
            .and_then(|_| self.v6.reserve_in(&mut state.v6))
        {
            budget.release(grow);
            return Err(err);
        }

        // Nothing below may fail: a failure leaves the table half-way.
        if let Err(detail) = self
            .v4
            .apply(&mut state.v4)
            .and_then(|_| self.v6.apply(&mut state.v6))
        {
            panic!(
                "{}",
                InvariantViolation {
                    table: table.to_string(),
                    detail,
                }
            );
        }
        state.count = state.count + adds - deletes;
        budget.release(deletes.saturating_sub(adds));
        Ok(())
    }
}

//------------ Staging -------------------------------------------------------

fn stage_add<AF: TableFamily>(
    state: &TableState,
    work: &mut EntryWork,
    rec: &AddrRecord,
) -> Result<Feedback, TableError> {
    let pfx = rec.prefix_id::<AF>()?;
    if let Some(e) = AF::entries(state).lookup_exact(&pfx) {
        return match e.negate == rec.negate {
            true => Ok(Feedback::None),
            false => Err(TableError::Conflict),
        };
    }
    let work = AF::work(work);
    match work.staged.get(&pfx) {
        Some(negate) if *negate == rec.negate => Ok(Feedback::None),
        Some(_) => Err(TableError::Conflict),
        None => Ok(work.stage_add(pfx, rec.negate)),
    }
}

fn stage_delete<AF: TableFamily>(
    state: &TableState,
    work: &mut EntryWork,
    rec: &AddrRecord,
) -> Result<Feedback, TableError> {
    let pfx = rec.prefix_id::<AF>()?;
    if AF::entries(state).lookup_exact(&pfx).is_none() {
        return Ok(Feedback::None);
    }
    let work = AF::work(work);
    if !work.marked.insert(pfx) {
        return Ok(Feedback::None);
    }
    work.delete.push(pfx);
    Ok(Feedback::Deleted)
}

// Scan phase of `set`: mark the entries that are wanted, stage the ones
// that are missing.
fn stage_replace<AF: TableFamily>(
    state: &TableState,
    work: &mut EntryWork,
    rec: &AddrRecord,
) -> Result<Feedback, TableError> {
    let pfx = rec.prefix_id::<AF>()?;
    let work = AF::work(work);
    match AF::entries(state).lookup_exact(&pfx) {
        Some(e) => {
            if !work.marked.insert(pfx) {
                return Ok(Feedback::None);
            }
            if e.negate != rec.negate {
                work.flip.push(pfx);
                return Ok(Feedback::Changed);
            }
            Ok(Feedback::None)
        }
        None if work.staged.contains_key(&pfx) => Ok(Feedback::None),
        None => Ok(work.stage_add(pfx, rec.negate)),
    }
}

// Sweep phase of `set`: everything the scan did not mark goes.
fn sweep<AF: TableFamily>(
    state: &TableState,
    work: &mut EntryWork,
    deleted: &mut Vec<AddrRecord>,
) {
    let work = AF::work(work);
    for e in AF::entries(state).sorted() {
        if !work.marked.contains(&e.pfx) {
            work.delete.push(e.pfx);
            deleted.push(AddrRecord::from_prefix_id(
                e.pfx,
                e.negate,
                Feedback::Deleted,
            ));
        }
    }
}

fn stage_all_deletes<AF: TableFamily>(state: &TableState, work: &mut EntryWork) {
    let work = AF::work(work);
    work.delete
        .extend(AF::entries(state).entries().map(|e| e.pfx));
}

fn test_one<AF: TableFamily>(
    state: &TableState,
    rec: &AddrRecord,
) -> Result<Feedback, TableError> {
    let pfx = rec.prefix_id::<AF>()?;
    if !pfx.is_host() {
        return Err(TableError::InvalidArgument(
            "only host addresses can be tested",
        ));
    }
    match AF::entries(state).lookup_longest(pfx.net()) {
        Some(e) if !e.negate => Ok(Feedback::Match),
        _ => Ok(Feedback::None),
    }
}

fn probe_one<AF: TableFamily>(
    state: &TableState,
    rec: &AddrRecord,
) -> Result<Feedback, TableError> {
    let pfx = rec.prefix_id::<AF>()?;
    Ok(match AF::entries(state).lookup_exact(&pfx) {
        Some(_) => Feedback::Cleared,
        None => Feedback::None,
    })
}

fn clear_one<AF: TableFamily>(
    state: &mut TableState,
    rec: &AddrRecord,
    tzero: u64,
) -> Result<Feedback, TableError> {
    let pfx = rec.prefix_id::<AF>()?;
    Ok(match AF::entries_mut(state).lookup_exact_mut(&pfx) {
        Some(e) => {
            e.reset_counters(tzero);
            Feedback::Cleared
        }
        None => Feedback::None,
    })
}

fn dump<AF: TableFamily, T>(
    state: &TableState,
    out: &mut Vec<T>,
    f: impl Fn(&Entry<AF>) -> T,
) {
    out.extend(AF::entries(state).sorted().into_iter().map(f));
}

fn record_of<AF: AddressFamily>(e: &Entry<AF>) -> AddrRecord {
    AddrRecord::from_prefix_id(e.pfx, e.negate, Feedback::None)
}

fn stats_of<AF: AddressFamily>(e: &Entry<AF>) -> AddrStats {
    AddrStats {
        record: record_of(e),
        counters: e.counters.snapshot(),
        tzero: e.tzero,
    }
}

//------------ Table bulk operations -----------------------------------------

impl Table {
    /// Remove every entry. Returns the number of entries removed, or that
    /// would have been removed for a dry run.
    pub fn clear(&self, flags: OpFlags) -> Result<usize, TableError> {
        let n = self.mutate(flags, |state| {
            let mut work = EntryWork::default();
            stage_all_deletes::<IPv4>(state, &mut work);
            stage_all_deletes::<IPv6>(state, &mut work);
            let n = work.deletes();
            Ok((work, n))
        })?;
        debug!("table {}: cleared {} entries", self.name(), n);
        Ok(n)
    }

    /// Add the records that are not in the table yet.
    ///
    /// A record whose prefix exists with a different negation is a
    /// [TableError::Conflict] fault; the other records are still added.
    pub fn add(
        &self,
        records: &[AddrRecord],
        flags: OpFlags,
    ) -> Result<BulkReport, TableError> {
        let report = self.mutate(flags, |state| {
            let mut report = BulkReport::with_capacity(records.len())?;
            let mut work = EntryWork::default();
            report.process(records, |rec| {
                with_family!(rec.family, AF => stage_add::<AF>(state, &mut work, rec))
            });
            Ok((work, report))
        })?;
        debug!(
            "table {}: added {} of {} records",
            self.name(),
            report.added,
            records.len()
        );
        Ok(report)
    }

    /// Delete the entries that exactly match the records. The negation of
    /// a record is not looked at.
    pub fn delete(
        &self,
        records: &[AddrRecord],
        flags: OpFlags,
    ) -> Result<BulkReport, TableError> {
        let report = self.mutate(flags, |state| {
            let mut report = BulkReport::with_capacity(records.len())?;
            let mut work = EntryWork::default();
            report.process(records, |rec| {
                with_family!(rec.family, AF => stage_delete::<AF>(state, &mut work, rec))
            });
            Ok((work, report))
        })?;
        debug!(
            "table {}: deleted {} of {} records",
            self.name(),
            report.deleted,
            records.len()
        );
        Ok(report)
    }

    /// Replace the content of the table with `records`, touching only the
    /// entries that differ.
    ///
    /// If `deleted_capacity` is given, the deleted entries are appended to
    /// the feedback, and the call fails with
    /// [TableError::CapacityTooSmall] before changing anything if the
    /// input records plus the deleted entries do not fit.
    pub fn set(
        &self,
        records: &[AddrRecord],
        flags: OpFlags,
        deleted_capacity: Option<usize>,
    ) -> Result<BulkReport, TableError> {
        let report = self.mutate(flags, |state| {
            let mut report = BulkReport::with_capacity(records.len())?;
            let mut work = EntryWork::default();
            report.process(records, |rec| {
                with_family!(rec.family, AF => stage_replace::<AF>(state, &mut work, rec))
            });

            let mut deleted = vec![];
            sweep::<IPv4>(state, &mut work, &mut deleted);
            sweep::<IPv6>(state, &mut work, &mut deleted);
            report.deleted = deleted.len();

            if let Some(capacity) = deleted_capacity {
                let required = records.len() + deleted.len();
                if capacity < required {
                    return Err(TableError::CapacityTooSmall { required });
                }
                report.feedback.extend(deleted);
            }
            Ok((work, report))
        })?;
        debug!(
            "table {}: set {} records, {} added, {} deleted, {} changed",
            self.name(),
            records.len(),
            report.added,
            report.deleted,
            report.changed
        );
        Ok(report)
    }

    /// Test host addresses for membership, by longest-prefix match. An
    /// address matches if the entry covering it is not negated. Network
    /// records are faults.
    pub fn test(&self, records: &[AddrRecord]) -> Result<BulkReport, TableError> {
        let state = self.read_state();
        state.check_alive()?;
        let mut report = BulkReport::with_capacity(records.len())?;
        report.process(records, |rec| {
            with_family!(rec.family, AF => test_one::<AF>(&state, rec))
        });
        Ok(report)
    }

    /// All entries, IPv4 first, each family ordered by address. Fails with
    /// [TableError::CapacityTooSmall] if there are more than `capacity`.
    pub fn get(&self, capacity: usize) -> Result<Vec<AddrRecord>, TableError> {
        let state = self.read_state();
        state.check_alive()?;
        if state.count > capacity {
            return Err(TableError::CapacityTooSmall {
                required: state.count,
            });
        }
        let mut out = Vec::with_capacity(state.count);
        dump::<IPv4, _>(&state, &mut out, record_of);
        dump::<IPv6, _>(&state, &mut out, record_of);
        Ok(out)
    }

    /// All entries with their counters, like [Table::get]. With
    /// `flags.clear_stats` the counters are zeroed in the same critical
    /// section, so no packet is lost or counted twice between the read and
    /// the reset.
    pub fn get_with_stats(
        &self,
        capacity: usize,
        flags: OpFlags,
    ) -> Result<Vec<AddrStats>, TableError> {
        let collect = |state: &TableState| -> Result<Vec<AddrStats>, TableError> {
            state.check_alive()?;
            if state.count > capacity {
                return Err(TableError::CapacityTooSmall {
                    required: state.count,
                });
            }
            let mut out = Vec::with_capacity(state.count);
            dump::<IPv4, _>(state, &mut out, stats_of);
            dump::<IPv6, _>(state, &mut out, stats_of);
            Ok(out)
        };

        if flags.clear_stats && !flags.dry_run {
            let mut state = self.write_state();
            let out = collect(&*state)?;
            state.reset_entry_stats(now_secs());
            Ok(out)
        } else {
            collect(&*self.read_state())
        }
    }

    /// Zero the counters of the entries exactly matching `records`.
    pub fn clear_stats(
        &self,
        records: &[AddrRecord],
        flags: OpFlags,
    ) -> Result<BulkReport, TableError> {
        let mut report = BulkReport::with_capacity(records.len())?;
        if flags.dry_run {
            let state = self.read_state();
            state.check_alive()?;
            report.process(records, |rec| {
                with_family!(rec.family, AF => probe_one::<AF>(&state, rec))
            });
        } else {
            let mut state = self.write_state();
            state.check_alive()?;
            let tzero = now_secs();
            report.process(records, |rec| {
                with_family!(rec.family, AF => clear_one::<AF>(&mut state, rec, tzero))
            });
        }
        debug!(
            "table {}: cleared statistics of {} entries",
            self.name(),
            report.cleared
        );
        Ok(report)
    }

    /// Zero the counters of every entry. Returns the number of entries.
    pub fn clear_all_stats(&self, flags: OpFlags) -> Result<usize, TableError> {
        if flags.dry_run {
            let state = self.read_state();
            state.check_alive()?;
            return Ok(state.count);
        }
        let mut state = self.write_state();
        state.check_alive()?;
        Ok(state.reset_entry_stats(now_secs()))
    }
}
