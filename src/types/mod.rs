pub(crate) mod addr_record;
pub(crate) mod af;
pub(crate) mod match_options;
pub(crate) mod prefix_id;

pub use addr_record::{AddrRecord, Feedback};
pub use af::{AddressFamily, Family};
pub use prefix_id::PrefixId;

pub mod errors;
pub mod stats;

#[cfg(test)]
mod tests;
