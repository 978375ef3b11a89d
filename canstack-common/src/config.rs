//! Run-time configuration of a node
use crate::pdo::{PdoConfig, PdoConfigError, MAX_PDOS};

/// Default time after which a pending transmit slot is considered lost
pub const DEFAULT_PENDING_TIMEOUT_MS: u32 = 50;

/// Settings passed to a node at init
///
/// PDO configuration is fixed for the life of the node. It is checked against the object
/// dictionary when the node is created.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeConfig {
    /// Time after which a pending slot is cleared without a completion
    pub pending_timeout_ms: u32,
    /// Heartbeat period, used when the dictionary has no 0x1017 object. 0 disables heartbeats.
    pub heartbeat_period_ms: u16,
    /// TPDO1..4
    pub tpdos: [Option<PdoConfig>; MAX_PDOS],
    /// RPDO1..4
    pub rpdos: [Option<PdoConfig>; MAX_PDOS],
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeConfig {
    /// Create a config with default timing and no PDOs
    pub const fn new() -> Self {
        Self {
            pending_timeout_ms: DEFAULT_PENDING_TIMEOUT_MS,
            heartbeat_period_ms: 0,
            tpdos: [const { None }; MAX_PDOS],
            rpdos: [const { None }; MAX_PDOS],
        }
    }

    /// Set the pending slot timeout
    pub fn with_pending_timeout(mut self, ms: u32) -> Self {
        self.pending_timeout_ms = ms;
        self
    }

    /// Set the fallback heartbeat period
    pub fn with_heartbeat_period(mut self, ms: u16) -> Self {
        self.heartbeat_period_ms = ms;
        self
    }

    /// Configure TPDO `n` (0 based)
    pub fn set_tpdo(&mut self, n: usize, pdo: PdoConfig) -> Result<(), PdoConfigError> {
        let slot = self
            .tpdos
            .get_mut(n)
            .ok_or(PdoConfigError::InvalidNumber { number: n })?;
        *slot = Some(pdo);
        Ok(())
    }

    /// Configure RPDO `n` (0 based)
    pub fn set_rpdo(&mut self, n: usize, pdo: PdoConfig) -> Result<(), PdoConfigError> {
        let slot = self
            .rpdos
            .get_mut(n)
            .ok_or(PdoConfigError::InvalidNumber { number: n })?;
        *slot = Some(pdo);
        Ok(())
    }

    /// Builder-style variant of [`NodeConfig::set_tpdo`]
    pub fn with_tpdo(mut self, n: usize, pdo: PdoConfig) -> Result<Self, PdoConfigError> {
        self.set_tpdo(n, pdo)?;
        Ok(self)
    }

    /// Builder-style variant of [`NodeConfig::set_rpdo`]
    pub fn with_rpdo(mut self, n: usize, pdo: PdoConfig) -> Result<Self, PdoConfigError> {
        self.set_rpdo(n, pdo)?;
        Ok(self)
    }
}
