//! Device config file
//!
//! A DeviceConfig is read from a TOML file and supplies the run-time settings of a node: its ID,
//! transport timing and PDO layout.
//!
//! # An example TOML file
//!
//! ```toml
//! node_id = 7
//! pending_timeout_ms = 50
//! heartbeat_period_ms = 1000
//!
//! # TPDO1 on the default COB-ID 0x180 + node, sent every 100ms
//! [[tpdo]]
//! number = 1
//! event_time_ms = 100
//! mappings = [
//!     { index = 0x2000, sub = 1, bits = 16 },
//!     { index = 0x2001, sub = 0, bits = 8 },
//! ]
//!
//! # RPDO2 on an explicit COB-ID
//! [[rpdo]]
//! number = 2
//! cob_id = 0x321
//! mappings = [{ index = 0x2100, sub = 0, bits = 32 }]
//! ```
//!
//! PDO numbers are 1 based, as in the pre-defined connection set. When `cob_id` is omitted, the
//! default identifier for the PDO number and node ID is used.

use crate::config::{NodeConfig, DEFAULT_PENDING_TIMEOUT_MS};
use crate::node_id::{InvalidNodeIdError, NodeId};
use crate::pdo::{
    PdoCommParam, PdoConfig, PdoConfigError, PdoMappingEntry, COB_ID_DISABLED,
    TRANSMISSION_ASYNC_MANUFACTURER,
};
use defmt_or_log::info;
use serde::Deserialize;

use snafu::ResultExt as _;
use snafu::Snafu;

/// Error returned when loading a device config fails
#[derive(Debug, Snafu)]
pub enum LoadError {
    /// An IO error occured while reading the file
    #[snafu(display("IO error: {source}"))]
    Io {
        /// The underlying IO error
        source: std::io::Error,
    },
    /// An error occured in the TOML parser
    #[snafu(display("Toml parse error: {source}"))]
    TomlParsing {
        /// The toml error which led to this error
        source: toml::de::Error,
    },
    /// The node ID is out of range
    #[snafu(display("{source}"))]
    InvalidNodeId {
        /// The node ID error
        source: InvalidNodeIdError,
    },
    /// A PDO table could not be turned into a PDO configuration
    #[snafu(display("Bad PDO {number}: {source}"))]
    Pdo {
        /// The 1 based PDO number of the offending table
        number: usize,
        /// What was wrong with it
        source: PdoConfigError,
    },
    /// The same PDO number appears in two tables
    #[snafu(display("Multiple definitions for PDO {number}"))]
    DuplicatePdo {
        /// The PDO number which was defined multiple times
        number: usize,
    },
}

fn default_pending_timeout() -> u32 {
    DEFAULT_PENDING_TIMEOUT_MS
}

fn default_true() -> bool {
    true
}

fn default_transmission_type() -> u8 {
    TRANSMISSION_ASYNC_MANUFACTURER
}

/// A single mapped object in a PDO table
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct MappingDefinition {
    /// Index of the mapped object
    pub index: u16,
    /// Sub index of the mapped object
    #[serde(default)]
    pub sub: u8,
    /// Number of bits mapped
    pub bits: u8,
}

/// A `[[tpdo]]` or `[[rpdo]]` table
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PdoDefinition {
    /// PDO number, 1 based
    pub number: usize,
    /// Explicit COB-ID; the pre-defined connection set value is used when absent
    #[serde(default)]
    pub cob_id: Option<u32>,
    /// When false the disable bit is set in the COB-ID
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Transmission type
    #[serde(default = "default_transmission_type")]
    pub transmission_type: u8,
    /// Event timer for TPDOs in ms
    #[serde(default)]
    pub event_time_ms: u16,
    /// Mapped objects, in payload order
    #[serde(default)]
    pub mappings: Vec<MappingDefinition>,
}

/// The top-level device configuration
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct DeviceConfig {
    /// The node ID
    pub node_id: u8,
    /// Pending slot timeout in ms
    #[serde(default = "default_pending_timeout")]
    pub pending_timeout_ms: u32,
    /// Fallback heartbeat period in ms
    #[serde(default)]
    pub heartbeat_period_ms: u16,
    /// Transmit PDOs
    #[serde(default)]
    pub tpdo: Vec<PdoDefinition>,
    /// Receive PDOs
    #[serde(default)]
    pub rpdo: Vec<PdoDefinition>,
}

impl DeviceConfig {
    /// Try to read a device config from a file
    pub fn load(config_path: impl AsRef<std::path::Path>) -> Result<Self, LoadError> {
        let config_str = std::fs::read_to_string(&config_path).context(IoSnafu)?;
        Self::load_from_str(&config_str)
    }

    /// Try to read a config from a &str
    pub fn load_from_str(config_str: &str) -> Result<Self, LoadError> {
        let config: DeviceConfig = toml::from_str(config_str).context(TomlParsingSnafu)?;
        // Building the node config checks the ID and every PDO table
        config.node_config()?;
        info!(
            "Loaded device config for node {}: {} TPDOs, {} RPDOs",
            config.node_id,
            config.tpdo.len(),
            config.rpdo.len()
        );
        Ok(config)
    }

    /// The configured node ID
    pub fn node_id(&self) -> Result<NodeId, LoadError> {
        NodeId::new(self.node_id).context(InvalidNodeIdSnafu)
    }

    /// Build the [`NodeConfig`] described by this file
    pub fn node_config(&self) -> Result<NodeConfig, LoadError> {
        let node_id = self.node_id()?;
        let mut config = NodeConfig::new()
            .with_pending_timeout(self.pending_timeout_ms)
            .with_heartbeat_period(self.heartbeat_period_ms);

        for def in &self.tpdo {
            let n = pdo_slot(def.number)?;
            if config.tpdos.get(n).is_some_and(|p| p.is_some()) {
                return DuplicatePdoSnafu { number: def.number }.fail();
            }
            let pdo = def.to_pdo(PdoCommParam::default_tpdo(n, node_id.raw()))?;
            config.set_tpdo(n, pdo).context(PdoSnafu { number: def.number })?;
        }
        for def in &self.rpdo {
            let n = pdo_slot(def.number)?;
            if config.rpdos.get(n).is_some_and(|p| p.is_some()) {
                return DuplicatePdoSnafu { number: def.number }.fail();
            }
            let pdo = def.to_pdo(PdoCommParam::default_rpdo(n, node_id.raw()))?;
            config.set_rpdo(n, pdo).context(PdoSnafu { number: def.number })?;
        }
        Ok(config)
    }
}

fn pdo_slot(number: usize) -> Result<usize, LoadError> {
    number.checked_sub(1).ok_or(LoadError::Pdo {
        number,
        source: PdoConfigError::InvalidNumber { number },
    })
}

impl PdoDefinition {
    fn to_pdo(&self, default_comm: Option<PdoCommParam>) -> Result<PdoConfig, LoadError> {
        let number = self.number;
        let default_comm = default_comm.ok_or(LoadError::Pdo {
            number,
            source: PdoConfigError::InvalidNumber { number },
        })?;
        let mut cob_id = self.cob_id.unwrap_or(default_comm.cob_id);
        if !self.enabled {
            cob_id |= COB_ID_DISABLED;
        }
        let mut pdo = PdoConfig::new(PdoCommParam {
            cob_id,
            transmission_type: self.transmission_type,
            event_time_ms: self.event_time_ms,
        });
        for m in &self.mappings {
            pdo.push_mapping(PdoMappingEntry::new(m.index, m.sub, m.bits))
                .context(PdoSnafu { number })?;
        }
        Ok(pdo)
    }
}
