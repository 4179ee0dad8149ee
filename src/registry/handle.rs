use std::fmt;
use std::str::FromStr;

use sha1::{Digest, Sha1};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::types::errors::TableError;

//------------ NameHash ------------------------------------------------------

/// The SHA-1 digest of a table name. Computed once when the table is
/// created, it is the key of the hash index of the registry.
#[derive(Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct NameHash([u8; 20]);

impl NameHash {
    pub fn of(name: &str) -> Self {
        Self(Sha1::digest(name.as_bytes()).into())
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Display for NameHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for NameHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NameHash({})", self)
    }
}

//------------ TableHandle ---------------------------------------------------

/// Marks a 24 byte value as a table handle. The first byte can never start
/// a valid address record family, so code that treats buffers of addresses
/// generically will not take a handle for one.
pub const HANDLE_MARKER: [u8; 4] = [0xff, b'T', b'B', b'L'];

/// An opaque reference to a table that does not reveal its name.
///
/// Created by [wrap_table](super::TableRegistry::wrap_table), resolved by
/// [unwrap_table](super::TableRegistry::unwrap_table). The byte layout is
/// fixed: the marker followed by the name hash.
#[derive(
    Copy,
    Clone,
    Hash,
    PartialEq,
    Eq,
    FromBytes,
    IntoBytes,
    KnownLayout,
    Immutable,
    Unaligned,
)]
#[repr(C)]
pub struct TableHandle {
    marker: [u8; 4],
    hash: [u8; 20],
}

impl TableHandle {
    pub const LEN: usize = 24;

    pub(crate) fn new(hash: &NameHash) -> Self {
        Self {
            marker: HANDLE_MARKER,
            hash: hash.0,
        }
    }

    pub fn hash(&self) -> NameHash {
        NameHash(self.hash)
    }

    pub fn is_well_formed(&self) -> bool {
        self.marker == HANDLE_MARKER
    }

    /// Read a handle from its byte form. Fails if the length is wrong or
    /// the marker is missing.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, TableError> {
        let handle = Self::read_from_bytes(bytes)
            .map_err(|_| TableError::InvalidArgument("handle must be 24 bytes"))?;
        if !handle.is_well_formed() {
            return Err(TableError::InvalidArgument("not a table handle"));
        }
        Ok(handle)
    }
}

impl fmt::Display for TableHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.as_bytes()))
    }
}

impl fmt::Debug for TableHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TableHandle({})", hex::encode(self.hash))
    }
}

impl FromStr for TableHandle {
    type Err = TableError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s.trim())
            .map_err(|_| TableError::InvalidArgument("handle is not hex"))?;
        Self::from_slice(&bytes)
    }
}
