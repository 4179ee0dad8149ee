//------------ Packet path ---------------------------------------------------
//
// Both methods take the read side of the table lock only, and touch nothing
// but atomics once they hold it. They never allocate, never log and never
// fail: an address of a family the table holds no entries for simply does
// not match.

use std::net::IpAddr;
use std::sync::atomic::Ordering;

use crate::table::entry::Entry;
use crate::table::{Table, TableFamily, TableState};
use crate::types::stats::{Direction, Verdict};
use crate::{IPv4, IPv6};

fn longest<AF: TableFamily>(state: &TableState, addr: IpAddr) -> Option<&Entry<AF>> {
    AF::try_from_ipaddr(addr)
        .and_then(|addr| AF::entries(state).lookup_longest(addr))
}

fn account<AF: TableFamily>(
    state: &TableState,
    addr: IpAddr,
    bytes: u64,
    dir: Direction,
    verdict: Verdict,
    negated_rule: bool,
) {
    match longest::<AF>(state, addr) {
        Some(e) if e.negate == negated_rule && verdict != Verdict::Exception => {
            state.counters.inc(dir, verdict, bytes);
            e.counters.inc(dir, verdict, bytes);
        }
        _ => state.counters.inc(dir, Verdict::Exception, bytes),
    }
}

impl Table {
    /// Is `addr` in the table? True if the longest prefix covering it
    /// belongs to a non-negated entry. Counts the lookup as a match or a
    /// miss in the table statistics.
    pub fn classify(&self, addr: IpAddr) -> bool {
        let state = self.read_state();
        let matched = match addr {
            IpAddr::V4(_) => longest::<IPv4>(&state, addr).map(|e| !e.negate),
            IpAddr::V6(_) => longest::<IPv6>(&state, addr).map(|e| !e.negate),
        }
        .unwrap_or(false);

        let counter = match matched {
            true => &state.matches,
            false => &state.nomatches,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        matched
    }

    /// Account a packet of `bytes` bytes to `addr` with the verdict of the
    /// rule that referenced the table.
    ///
    /// `negated_rule` is whether that rule matched on the negation of the
    /// table. If no entry covers `addr`, or the covering entry disagrees
    /// with the rule about negation, the packet lands in the table's
    /// [Verdict::Exception] bucket and no entry is charged. Otherwise both
    /// the table and the entry count it under `verdict`.
    pub fn record(
        &self,
        addr: IpAddr,
        bytes: u64,
        dir: Direction,
        verdict: Verdict,
        negated_rule: bool,
    ) {
        let state = self.read_state();
        match addr {
            IpAddr::V4(_) => {
                account::<IPv4>(&state, addr, bytes, dir, verdict, negated_rule)
            }
            IpAddr::V6(_) => {
                account::<IPv6>(&state, addr, bytes, dir, verdict, negated_rule)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;
    use std::sync::Arc;

    use super::*;
    use crate::registry::NameHash;
    use crate::table::EntryBudget;
    use crate::types::match_options::OpFlags;
    use crate::types::AddrRecord;

    fn table() -> Result<Table, Box<dyn Error>> {
        let t = Table::new(
            "fast".to_string(),
            NameHash::of("fast"),
            Arc::new(EntryBudget::new(None)),
        );
        let records = ["10.0.0.0/8", "!10.1.0.0/16", "2001:db8::/32"]
            .iter()
            .map(|s| s.parse::<AddrRecord>())
            .collect::<Result<Vec<_>, _>>()?;
        t.add(&records, OpFlags::default())?;
        Ok(t)
    }

    #[test]
    fn test_classify_counts_matches() -> Result<(), Box<dyn Error>> {
        let t = table()?;
        assert!(t.classify("10.2.3.4".parse()?));
        assert!(!t.classify("10.1.3.4".parse()?));
        assert!(!t.classify("192.0.2.1".parse()?));
        assert!(t.classify("2001:db8::1".parse()?));

        let stats = t.stats(false)?;
        assert_eq!(stats.matches, 2);
        assert_eq!(stats.nomatches, 2);
        Ok(())
    }

    #[test]
    fn test_record_negation_mismatch() -> Result<(), Box<dyn Error>> {
        let t = table()?;
        // Plain rule hits a plain entry.
        t.record("10.2.3.4".parse()?, 100, Direction::In, Verdict::Pass, false);
        // Plain rule hits a negated entry.
        t.record("10.1.3.4".parse()?, 40, Direction::In, Verdict::Pass, false);
        // Negated rule hits the negated entry.
        t.record("10.1.3.4".parse()?, 60, Direction::Out, Verdict::Block, true);
        // No entry at all.
        t.record("192.0.2.1".parse()?, 20, Direction::In, Verdict::Block, false);

        let stats = t.stats(false)?;
        let c = stats.counters;
        assert_eq!(c.inbound.pass.packets, 1);
        assert_eq!(c.inbound.pass.bytes, 100);
        assert_eq!(c.inbound.exception.packets, 2);
        assert_eq!(c.inbound.exception.bytes, 60);
        assert_eq!(c.outbound.block.bytes, 60);
        assert_eq!(c.packets(), 4);

        let entries = t.get_with_stats(16, OpFlags::default())?;
        let total: u64 = entries.iter().map(|e| e.counters.packets()).sum();
        assert_eq!(total, 2);
        Ok(())
    }
}
