#![deny(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]

//! Named tables of IPv4 and IPv6 addresses and prefixes, as used by a packet
//! filter to refer to large, frequently changing sets of addresses from its
//! rules.
//!
//! A [TableRegistry] holds the tables. The control plane manipulates their
//! content in bulk: adding, deleting, testing, dumping, and replacing the
//! whole content of a table with a new list of addresses, where only the
//! entries that differ are touched, and the change becomes visible to the
//! packet path in one step. Every call reports back per record what it did
//! (the [Feedback] of each [AddrRecord]).
//!
//! The packet path holds on to an `Arc<`[Table]`>` and asks it, for every
//! packet, whether an address is in the table ([Table::classify]) and
//! accounts the packet to the entry that matched ([Table::record]). Lookups
//! are longest-prefix matches: an entry can be negated, to cut a hole into a
//! covering prefix.
//!
//! Tables can also be referred to without knowing their name, through a
//! [TableHandle] that embeds the SHA-1 hash of the name.
mod trie;
mod types;

// Public Interfaces on the root of the crate

/// Tables and the bulk and packet path operations on them
pub mod table;

/// The registry of all tables, its configuration and table handles
pub mod registry;

pub use registry::{TableHandle, TableRegistry};
pub use table::{BulkReport, Table, TableFlags};

/// Options for the bulk operations
pub use types::match_options::OpFlags;

/// Address records, as exchanged with the control plane
pub use types::{AddrRecord, Family, Feedback};

/// The fixed byte layout of address records
pub use types::addr_record::{decode_records, encode_records, WireAddr};

/// Error types returned by the tables
pub use types::errors;

/// Trait that defines the address families IPv4 and IPv6
pub use types::af::AddressFamily;

/// The underlying value (u32) and trait impl for IPv4.
pub use types::af::IPv4;
/// The underlying value (u128) and trait impl for IPv6.
pub use types::af::IPv6;

/// The (address, prefix length) key of an entry
pub use types::PrefixId;

/// The prefix index used by every table
pub use trie::{LenTrie, PrefixTrie};

/// Statistics types returned by tables
pub use types::stats;

pub use inetnum::addr;
