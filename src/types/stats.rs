//------------ Types for Statistics -----------------------------------------

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde_derive::Serialize;

use crate::types::AddrRecord;

//------------ Direction / Verdict -------------------------------------------

/// The direction a packet was travelling in when it was accounted.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, Serialize)]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    pub const ALL: [Direction; 2] = [Direction::In, Direction::Out];
}

/// The outcome of the rule that accounted a packet against a table.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, Serialize)]
pub enum Verdict {
    Pass,
    Block,
    /// The packet matched no entry, or matched an entry whose negation
    /// disagreed with the rule. Only the table counts these.
    Exception,
}

impl Verdict {
    pub const ALL: [Verdict; 3] =
        [Verdict::Pass, Verdict::Block, Verdict::Exception];
}

pub(crate) fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

//------------ Counters -----------------------------------------------------
//
// This is the struct that's part of every entry and every table. The packet
// path increments it while holding only a read lock on the table, so all
// the counters are atomics. Resetting happens under the write lock.

#[derive(Debug, Default)]
struct Counter {
    packets: AtomicU64,
    bytes: AtomicU64,
}

impl Counter {
    fn add(&self, bytes: u64) {
        self.packets.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    fn snapshot(&self) -> PacketCount {
        PacketCount {
            packets: self.packets.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
        }
    }

    fn reset(&self) {
        self.packets.store(0, Ordering::Relaxed);
        self.bytes.store(0, Ordering::Relaxed);
    }
}

#[derive(Debug, Default)]
struct VerdictCounters {
    pass: Counter,
    block: Counter,
    exception: Counter,
}

impl VerdictCounters {
    fn get(&self, verdict: Verdict) -> &Counter {
        match verdict {
            Verdict::Pass => &self.pass,
            Verdict::Block => &self.block,
            Verdict::Exception => &self.exception,
        }
    }

    fn snapshot(&self) -> VerdictStats {
        VerdictStats {
            pass: self.pass.snapshot(),
            block: self.block.snapshot(),
            exception: self.exception.snapshot(),
        }
    }
}

/// A direction x verdict matrix of packet and byte counters.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    inbound: VerdictCounters,
    outbound: VerdictCounters,
}

impl Counters {
    fn dir(&self, dir: Direction) -> &VerdictCounters {
        match dir {
            Direction::In => &self.inbound,
            Direction::Out => &self.outbound,
        }
    }

    pub fn inc(&self, dir: Direction, verdict: Verdict, bytes: u64) {
        self.dir(dir).get(verdict).add(bytes);
    }

    pub fn snapshot(&self) -> StatsMatrix {
        StatsMatrix {
            inbound: self.inbound.snapshot(),
            outbound: self.outbound.snapshot(),
        }
    }

    pub fn reset(&self) {
        for dir in Direction::ALL {
            for verdict in Verdict::ALL {
                self.dir(dir).get(verdict).reset();
            }
        }
    }
}

//------------ StatsMatrix ---------------------------------------------------
//
// The Counters struct holds atomic values, so these structs exist to return
// a set of counters to users.

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PacketCount {
    pub packets: u64,
    pub bytes: u64,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct VerdictStats {
    pub pass: PacketCount,
    pub block: PacketCount,
    pub exception: PacketCount,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StatsMatrix {
    pub inbound: VerdictStats,
    pub outbound: VerdictStats,
}

impl StatsMatrix {
    pub fn get(&self, dir: Direction, verdict: Verdict) -> PacketCount {
        let d = match dir {
            Direction::In => &self.inbound,
            Direction::Out => &self.outbound,
        };
        match verdict {
            Verdict::Pass => d.pass,
            Verdict::Block => d.block,
            Verdict::Exception => d.exception,
        }
    }

    /// Total packets over all directions and verdicts.
    pub fn packets(&self) -> u64 {
        Direction::ALL
            .iter()
            .flat_map(|d| Verdict::ALL.iter().map(move |v| (*d, *v)))
            .map(|(d, v)| self.get(d, v).packets)
            .sum()
    }

    pub fn is_zero(&self) -> bool {
        *self == StatsMatrix::default()
    }
}

//------------ AddrStats -----------------------------------------------------

/// An entry with its counters, as returned by `get_astats`.
#[derive(Clone, Debug, Serialize)]
pub struct AddrStats {
    pub record: AddrRecord,
    pub counters: StatsMatrix,
    /// Seconds since the epoch when the counters were last zeroed.
    pub tzero: u64,
}

//------------ TableStats ----------------------------------------------------

/// A table with its aggregate counters, as returned by `get_tstats`.
#[derive(Clone, Debug, Serialize)]
pub struct TableStats {
    pub name: String,
    pub count: usize,
    pub counters: StatsMatrix,
    /// Lookups on the packet path that found a non-negated entry.
    pub matches: u64,
    pub nomatches: u64,
    pub tzero: u64,
    pub constant: bool,
}
