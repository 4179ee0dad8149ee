use std::fmt;

/// Possible errors returned by the table engine. All of these errors are
/// recoverable; a whole-call error means nothing in the registry changed.
/// Internal bookkeeping corruption is not an error value, it is an
/// [InvariantViolation] that aborts the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableError {
    /// The referenced table does not exist, or it was destroyed while the
    /// caller still held a reference to it.
    NotFound,
    /// A table with the requested name already exists.
    AlreadyExists,
    /// The table name is empty, too long, or contains a NUL byte.
    InvalidName,
    /// A malformed address record: family or prefix length out of range,
    /// host bits set beyond the prefix length, or a network prefix where
    /// only a host address is allowed.
    InvalidArgument(&'static str),
    /// An entry with the same address and prefix length exists, but its
    /// negation differs from the requested one.
    Conflict,
    /// The configured table or entry limit was reached while staging. The
    /// table was left untouched, retrying after freeing entries is safe.
    ResourceExhausted,
    /// The output capacity supplied by the caller cannot hold the result.
    /// Nothing was copied or changed, `required` is the capacity needed.
    CapacityTooSmall { required: usize },
    /// The table is flagged constant and cannot have its addresses
    /// modified.
    PermissionDenied,
}

impl std::error::Error for TableError {}

impl fmt::Display for TableError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            TableError::NotFound => write!(f, "Error: Table not found."),
            TableError::AlreadyExists => {
                write!(f, "Error: Table already exists.")
            }
            TableError::InvalidName => {
                write!(f, "Error: The table name is invalid.")
            }
            TableError::InvalidArgument(reason) => {
                write!(f, "Error: Invalid address record: {}.", reason)
            }
            TableError::Conflict => write!(
                f,
                "Error: The entry exists with a different negation."
            ),
            TableError::ResourceExhausted => write!(
                f,
                "Error: Table or entry limit reached, nothing was changed."
            ),
            TableError::CapacityTooSmall { required } => write!(
                f,
                "Error: Output capacity too small, {} records required.",
                required
            ),
            TableError::PermissionDenied => {
                write!(f, "Error: The table is constant.")
            }
        }
    }
}

//------------ RecordFault ---------------------------------------------------

/// A per-record error inside a bulk call. The record was skipped, the other
/// records of the call were processed normally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordFault {
    /// Position of the offending record in the request.
    pub index: usize,
    pub error: TableError,
}

impl fmt::Display for RecordFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "record {}: {}", self.index, self.error)
    }
}

//------------ InvariantViolation --------------------------------------------

/// Internal corruption of a table: the bookkeeping of entries, tries and
/// counts disagrees. This is never handed to a caller, it is formatted into
/// a panic. The table must be considered corrupt and the process should
/// not continue.
#[derive(Debug, Clone)]
pub struct InvariantViolation {
    pub table: String,
    pub detail: String,
}

impl fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "FATAL: table '{}' is corrupt: {}. The application should \
            terminate.",
            self.table, self.detail
        )
    }
}

impl std::error::Error for InvariantViolation {}
