//! The collection of all tables.
//!
//! A [TableRegistry] owns every table and indexes it twice: by name, for the
//! control plane, and by the hash of its name, for rules that refer to a
//! table through an opaque [TableHandle]. Both indexes live behind one lock
//! and are always updated together.
//!
//! The `*_addrs`, `*_astats` and `*_tables` methods form the command surface
//! of the engine. Each of them resolves the table by name and then calls the
//! matching operation on [Table].

pub mod config;
mod handle;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use log::{debug, info};
use parking_lot::RwLock;

pub use handle::{NameHash, TableHandle, HANDLE_MARKER};

use crate::table::{BulkReport, EntryBudget, Table, TableFlags};
use crate::types::errors::TableError;
use crate::types::match_options::OpFlags;
use crate::types::stats::{AddrStats, TableStats};
use crate::types::AddrRecord;

use config::{Config, UnlimitedConfig};

/// Longest table name, in bytes.
pub const MAX_NAME_LEN: usize = 31;

/// Check a table name: between 1 and [MAX_NAME_LEN] bytes, without NUL.
pub fn validate_name(name: &str) -> Result<(), TableError> {
    if name.is_empty() || name.len() > MAX_NAME_LEN || name.contains('\0') {
        return Err(TableError::InvalidName);
    }
    Ok(())
}

//------------ Indexes -------------------------------------------------------

#[derive(Debug, Default)]
struct Indexes {
    by_name: BTreeMap<String, Arc<Table>>,
    by_hash: HashMap<NameHash, Arc<Table>>,
}

impl Indexes {
    fn insert(&mut self, table: Arc<Table>) {
        self.by_hash.insert(*table.hash(), Arc::clone(&table));
        self.by_name.insert(table.name().to_string(), table);
    }

    fn remove(&mut self, name: &str) -> Option<Arc<Table>> {
        let table = self.by_name.remove(name)?;
        self.by_hash.remove(table.hash());
        Some(table)
    }
}

//------------ TableRegistry -------------------------------------------------

/// All the tables of one packet filter instance.
///
/// ```
/// use pf_tables::{AddrRecord, OpFlags, TableRegistry};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let registry: TableRegistry = TableRegistry::try_default()?;
/// registry.create_table("bogons")?;
/// let report = registry.add_addrs(
///     "bogons",
///     &["10.0.0.0/8".parse::<AddrRecord>()?],
///     OpFlags::default(),
/// )?;
/// assert_eq!(report.added, 1);
///
/// let table = registry.table("bogons")?;
/// assert!(table.classify("10.1.2.3".parse()?));
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct TableRegistry<C: Config = UnlimitedConfig> {
    config: C,
    budget: Arc<EntryBudget>,
    indexes: RwLock<Indexes>,
}

impl<C: Config> TableRegistry<C> {
    pub fn new_with_config(config: C) -> Result<Self, TableError> {
        if config.max_tables() == Some(0) {
            return Err(TableError::InvalidArgument(
                "max_tables must be at least 1",
            ));
        }
        Ok(Self {
            budget: Arc::new(EntryBudget::new(config.max_entries())),
            config,
            indexes: RwLock::new(Indexes::default()),
        })
    }

    pub fn try_default() -> Result<Self, TableError> {
        Self::new_with_config(C::default())
    }

    pub fn config(&self) -> &C {
        &self.config
    }

    /// The number of tables.
    pub fn len(&self) -> usize {
        self.indexes.read().by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The number of entries in all tables together.
    pub fn entries_used(&self) -> usize {
        self.budget.used()
    }

    //-------- Table lookup ---------------------------------------------------

    /// The table called `name`. The returned reference can be kept for the
    /// packet path; it stays valid, but empty, if the table is deleted.
    pub fn table(&self, name: &str) -> Result<Arc<Table>, TableError> {
        self.indexes
            .read()
            .by_name
            .get(name)
            .cloned()
            .ok_or(TableError::NotFound)
    }

    pub fn table_by_handle(
        &self,
        handle: &TableHandle,
    ) -> Result<Arc<Table>, TableError> {
        if !handle.is_well_formed() {
            return Err(TableError::InvalidArgument("not a table handle"));
        }
        self.indexes
            .read()
            .by_hash
            .get(&handle.hash())
            .cloned()
            .ok_or(TableError::NotFound)
    }

    /// An opaque handle for the table called `name`. The table does not
    /// need to exist yet: the handle only resolves once it does.
    pub fn wrap_table(&self, name: &str) -> Result<TableHandle, TableError> {
        validate_name(name)?;
        let hash = match self.indexes.read().by_name.get(name) {
            Some(table) => *table.hash(),
            None => NameHash::of(name),
        };
        Ok(TableHandle::new(&hash))
    }

    /// The name of the table `handle` refers to.
    pub fn unwrap_table(&self, handle: &TableHandle) -> Result<String, TableError> {
        self.table_by_handle(handle).map(|t| t.name().to_string())
    }

    //-------- Table management ---------------------------------------------

    pub fn create_table(&self, name: &str) -> Result<Arc<Table>, TableError> {
        validate_name(name)?;
        let mut indexes = self.indexes.write();
        if indexes.by_name.contains_key(name) {
            return Err(TableError::AlreadyExists);
        }
        if self
            .config
            .max_tables()
            .is_some_and(|max| indexes.by_name.len() >= max)
        {
            return Err(TableError::ResourceExhausted);
        }
        let table = Arc::new(Table::new(
            name.to_string(),
            NameHash::of(name),
            Arc::clone(&self.budget),
        ));
        indexes.insert(Arc::clone(&table));
        info!("table {} created, hash {}", name, table.hash());
        Ok(table)
    }

    /// Delete the table called `name` with all its entries. Returns false if
    /// there was no such table.
    pub fn delete_table(&self, name: &str) -> bool {
        let mut indexes = self.indexes.write();
        match indexes.remove(name) {
            Some(table) => {
                // Still under the registry lock, so the name only becomes
                // free once the table is gone.
                table.destroy();
                info!("table {} destroyed", name);
                true
            }
            None => false,
        }
    }

    /// Create the tables in `names` that do not exist yet. Returns how many
    /// were (or would be, for a dry run) created. Nothing is created if any
    /// name is invalid or the table limit would be exceeded.
    pub fn add_tables(
        &self,
        names: &[&str],
        flags: OpFlags,
    ) -> Result<usize, TableError> {
        for name in names {
            validate_name(name)?;
        }
        let mut indexes = self.indexes.write();
        let mut new = names
            .iter()
            .filter(|n| !indexes.by_name.contains_key(**n))
            .collect::<Vec<_>>();
        new.sort();
        new.dedup();

        if self
            .config
            .max_tables()
            .is_some_and(|max| indexes.by_name.len() + new.len() > max)
        {
            return Err(TableError::ResourceExhausted);
        }
        if !flags.dry_run {
            for name in &new {
                let table = Arc::new(Table::new(
                    name.to_string(),
                    NameHash::of(name),
                    Arc::clone(&self.budget),
                ));
                indexes.insert(table);
                info!("table {} created", name);
            }
        }
        debug!("add_tables: {} of {} created", new.len(), names.len());
        Ok(new.len())
    }

    /// Delete the tables in `names`. Names without a table are skipped.
    pub fn del_tables(
        &self,
        names: &[&str],
        flags: OpFlags,
    ) -> Result<usize, TableError> {
        for name in names {
            validate_name(name)?;
        }
        let mut indexes = self.indexes.write();
        let mut found = names
            .iter()
            .filter(|n| indexes.by_name.contains_key(**n))
            .collect::<Vec<_>>();
        found.sort();
        found.dedup();

        if !flags.dry_run {
            for name in &found {
                if let Some(table) = indexes.remove(name) {
                    table.destroy();
                    info!("table {} destroyed", name);
                }
            }
        }
        debug!("del_tables: {} of {} deleted", found.len(), names.len());
        Ok(found.len())
    }

    /// Delete every table.
    pub fn clr_tables(&self, flags: OpFlags) -> usize {
        let mut indexes = self.indexes.write();
        let n = indexes.by_name.len();
        if !flags.dry_run {
            let tables = std::mem::take(&mut indexes.by_name);
            indexes.by_hash.clear();
            for (name, table) in tables {
                table.destroy();
                info!("table {} destroyed", name);
            }
        }
        debug!("clr_tables: {} deleted", n);
        n
    }

    /// The names of all tables, sorted.
    pub fn get_tables(&self) -> Vec<String> {
        self.indexes.read().by_name.keys().cloned().collect()
    }

    /// Statistics of all tables, sorted by name. With `flags.clear_stats`
    /// the table counters are zeroed as they are read.
    ///
    /// The registry lock is held for the whole walk, so no listed table is
    /// destroyed halfway through.
    pub fn get_tstats(&self, flags: OpFlags) -> Result<Vec<TableStats>, TableError> {
        let clear = flags.clear_stats && !flags.dry_run;
        let indexes = self.indexes.read();
        indexes.by_name.values().map(|t| t.stats(clear)).collect()
    }

    /// Zero the statistics of the tables in `names`, or of all tables for
    /// `None`. With `flags.addrs_too` the entry counters are zeroed as well.
    /// Returns the number of tables cleared; names without a table are
    /// skipped.
    pub fn clr_tstats(
        &self,
        names: Option<&[&str]>,
        flags: OpFlags,
    ) -> Result<usize, TableError> {
        let indexes = self.indexes.read();
        let tables = match names {
            None => indexes.by_name.values().collect::<Vec<_>>(),
            Some(names) => {
                let mut tables = Vec::with_capacity(names.len());
                for name in names {
                    validate_name(name)?;
                    if let Some(t) = indexes.by_name.get(*name) {
                        tables.push(t);
                    }
                }
                tables
            }
        };
        for t in &tables {
            t.clear_table_stats(flags)?;
        }
        debug!("clr_tstats: {} tables", tables.len());
        Ok(tables.len())
    }

    /// Set and clear flags on the table called `name`, returning the new
    /// flags.
    pub fn set_tflags(
        &self,
        name: &str,
        set: TableFlags,
        clear: TableFlags,
    ) -> Result<TableFlags, TableError> {
        if set.constant && clear.constant {
            return Err(TableError::InvalidArgument(
                "flag both set and cleared",
            ));
        }
        let flags = self.table(name)?.set_flags(set, clear)?;
        debug!("table {}: flags now {:?}", name, flags);
        Ok(flags)
    }

    // The table to add addresses to. With `create_on_add` a missing table
    // is created, or for a dry run, stood in for by an unregistered one.
    fn table_for_add(
        &self,
        name: &str,
        flags: OpFlags,
    ) -> Result<Arc<Table>, TableError> {
        match self.table(name) {
            Err(TableError::NotFound) if self.config.create_on_add() => {
                validate_name(name)?;
                if flags.dry_run {
                    return Ok(Arc::new(Table::new(
                        name.to_string(),
                        NameHash::of(name),
                        Arc::new(EntryBudget::new(None)),
                    )));
                }
                match self.create_table(name) {
                    Err(TableError::AlreadyExists) => self.table(name),
                    res => res,
                }
            }
            res => res,
        }
    }

    //-------- Addresses ----------------------------------------------------

    /// Remove every address from the table. Returns the number removed.
    pub fn clr_addrs(&self, name: &str, flags: OpFlags) -> Result<usize, TableError> {
        self.table(name)?.clear(flags)
    }

    pub fn add_addrs(
        &self,
        name: &str,
        records: &[AddrRecord],
        flags: OpFlags,
    ) -> Result<BulkReport, TableError> {
        self.table_for_add(name, flags)?.add(records, flags)
    }

    pub fn del_addrs(
        &self,
        name: &str,
        records: &[AddrRecord],
        flags: OpFlags,
    ) -> Result<BulkReport, TableError> {
        self.table(name)?.delete(records, flags)
    }

    /// Replace the addresses of the table. See [Table::set].
    pub fn set_addrs(
        &self,
        name: &str,
        records: &[AddrRecord],
        flags: OpFlags,
        deleted_capacity: Option<usize>,
    ) -> Result<BulkReport, TableError> {
        self.table_for_add(name, flags)?
            .set(records, flags, deleted_capacity)
    }

    pub fn test_addrs(
        &self,
        name: &str,
        records: &[AddrRecord],
    ) -> Result<BulkReport, TableError> {
        self.table(name)?.test(records)
    }

    pub fn get_addrs(
        &self,
        name: &str,
        capacity: usize,
    ) -> Result<Vec<AddrRecord>, TableError> {
        self.table(name)?.get(capacity)
    }

    pub fn get_astats(
        &self,
        name: &str,
        capacity: usize,
        flags: OpFlags,
    ) -> Result<Vec<AddrStats>, TableError> {
        self.table(name)?.get_with_stats(capacity, flags)
    }

    /// Zero the counters of the entries matching `records`, or of every
    /// entry for `None`. Table counters are left alone. For `None` the
    /// report carries no feedback, only the number of entries in `cleared`.
    pub fn clr_astats(
        &self,
        name: &str,
        records: Option<&[AddrRecord]>,
        flags: OpFlags,
    ) -> Result<BulkReport, TableError> {
        let table = self.table(name)?;
        match records {
            Some(records) => table.clear_stats(records, flags),
            None => Ok(BulkReport {
                cleared: table.clear_all_stats(flags)?,
                ..Default::default()
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::config::LimitsConfig;

    #[test]
    fn test_names() {
        assert!(validate_name("spamhaus_drop").is_ok());
        assert_eq!(validate_name(""), Err(TableError::InvalidName));
        assert_eq!(validate_name("a\0b"), Err(TableError::InvalidName));
        assert!(validate_name(&"x".repeat(MAX_NAME_LEN)).is_ok());
        assert_eq!(
            validate_name(&"x".repeat(MAX_NAME_LEN + 1)),
            Err(TableError::InvalidName)
        );
    }

    #[test]
    fn test_indexes_agree() -> Result<(), TableError> {
        let reg: TableRegistry = TableRegistry::try_default()?;
        reg.add_tables(&["a", "b", "c", "b"], OpFlags::default())?;
        reg.delete_table("b");
        let indexes = reg.indexes.read();
        assert_eq!(indexes.by_name.len(), 2);
        assert_eq!(indexes.by_hash.len(), 2);
        for (name, t) in &indexes.by_name {
            let by_hash = indexes.by_hash.get(&NameHash::of(name));
            assert!(by_hash.is_some_and(|h| Arc::ptr_eq(h, t)));
        }
        Ok(())
    }

    #[test]
    fn test_max_tables() -> Result<(), TableError> {
        let reg = TableRegistry::new_with_config(LimitsConfig {
            max_tables: Some(2),
            ..Default::default()
        })?;
        assert_eq!(
            reg.add_tables(&["a", "b", "c"], OpFlags::default()),
            Err(TableError::ResourceExhausted)
        );
        assert!(reg.is_empty());
        reg.create_table("a")?;
        reg.create_table("b")?;
        assert_eq!(
            reg.create_table("c").map(|_| ()),
            Err(TableError::ResourceExhausted)
        );
        Ok(())
    }
}
