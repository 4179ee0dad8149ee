//------------ Config --------------------------------------------------------

//! Configuration options for a [TableRegistry](super::TableRegistry).
//!
//! A Configuration is created by picking one of the `*Config` structs in
//! this module, instantiate it, set some fields on it, and pass it in as an
//! argument to [new_with_config](super::TableRegistry::new_with_config).
//!
//! ```
//! use pf_tables::registry::TableRegistry;
//! use pf_tables::registry::config::LimitsConfig;
//!
//! let config = LimitsConfig {
//!     max_tables: Some(16),
//!     max_entries: Some(65_536),
//!     create_on_add: true,
//! };
//! let registry = TableRegistry::new_with_config(config);
//! assert!(registry.is_ok());
//! ```

use serde_derive::Deserialize;

use crate::types::errors::TableError;

pub trait Config: Clone + Default + std::fmt::Debug {
    /// The maximum number of tables the registry holds at the same time.
    fn max_tables(&self) -> Option<usize>;
    /// The maximum number of entries all tables together may hold.
    fn max_entries(&self) -> Option<usize>;
    /// Whether adding addresses to a table that does not exist creates it,
    /// instead of failing with [TableError::NotFound].
    fn create_on_add(&self) -> bool;
}

//------------ UnlimitedConfig -----------------------------------------------

/// A configuration without any limits, apart from available memory. Tables
/// must be created explicitly.
#[derive(Copy, Clone, Debug, Default)]
pub struct UnlimitedConfig;

impl Config for UnlimitedConfig {
    fn max_tables(&self) -> Option<usize> {
        None
    }

    fn max_entries(&self) -> Option<usize> {
        None
    }

    fn create_on_add(&self) -> bool {
        false
    }
}

//------------ LimitsConfig --------------------------------------------------

/// A configuration with optional limits on the number of tables and
/// entries. Can be read from JSON:
///
/// ```json
/// { "max_tables": 1000, "max_entries": 200000, "create_on_add": true }
/// ```
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LimitsConfig {
    pub max_tables: Option<usize>,
    pub max_entries: Option<usize>,
    pub create_on_add: bool,
}

impl LimitsConfig {
    pub fn from_json(json: &str) -> Result<Self, TableError> {
        serde_json::from_str(json)
            .map_err(|_| TableError::InvalidArgument("malformed configuration"))
    }
}

impl Config for LimitsConfig {
    fn max_tables(&self) -> Option<usize> {
        self.max_tables
    }

    fn max_entries(&self) -> Option<usize> {
        self.max_entries
    }

    fn create_on_add(&self) -> bool {
        self.create_on_add
    }
}
