//! Request defaults - values used when a caller leaves a parameter out.

use serde::{Deserialize, Serialize};

/// Defaults applied to incoming requests.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DefaultsConfig {
    /// Device identifier used when none is given.
    /// Default: hw:0
    #[serde(default = "DefaultsConfig::default_device")]
    pub device: String,

    /// Detail tier (0 = richest, 3 = minimal).
    /// Default: 0
    #[serde(default)]
    pub tier: u8,

    /// Number of card slots probed when listing devices.
    /// Default: 32
    #[serde(default = "DefaultsConfig::default_max_cards")]
    pub max_cards: u32,
}

impl DefaultsConfig {
    pub(crate) fn default_device() -> String {
        "hw:0".to_string()
    }

    pub(crate) fn default_max_cards() -> u32 {
        32
    }
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            device: Self::default_device(),
            tier: 0,
            max_cards: Self::default_max_cards(),
        }
    }
}
