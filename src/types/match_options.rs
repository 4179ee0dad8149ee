//------------ OpFlags -------------------------------------------------------

/// Options accepted by the bulk operations of a table and the table
/// management operations of the registry. Not every operation looks at
/// every flag, an operation silently ignores the ones that do not apply.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct OpFlags {
    /// Hold the exclusive lock of the table for the whole operation. When
    /// unset, the lookups and staging run under an upgradable read lock, so
    /// the packet path keeps going, and only the commit takes the exclusive
    /// lock. The commit is a single atomic step in both cases.
    pub atomic: bool,
    /// Compute the counts and the feedback, but change nothing.
    pub dry_run: bool,
    /// `clr_tstats`: also zero the counters of every entry of the table.
    pub addrs_too: bool,
    /// `get_astats`/`get_tstats`: zero the returned counters in the same
    /// critical section as the read.
    pub clear_stats: bool,
}

impl OpFlags {
    pub fn atomic() -> Self {
        Self {
            atomic: true,
            ..Default::default()
        }
    }

    pub fn dry_run() -> Self {
        Self {
            dry_run: true,
            ..Default::default()
        }
    }

    pub fn with_addrs_too(mut self) -> Self {
        self.addrs_too = true;
        self
    }

    pub fn with_clear_stats(mut self) -> Self {
        self.clear_stats = true;
        self
    }
}
