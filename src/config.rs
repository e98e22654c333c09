//! Slave configuration: the record the CLI and JSON file materialize.
//!
//! The server consumes a fully populated `SlaveConfig`; file loading,
//! flag overrides and the register-list grammar all happen before the
//! supervisor starts, and validation failures abort startup.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::autoinc::AutoIncrementConfig;
use crate::error::{ModsimError, ModsimResult};
use crate::store::WordBank;
use crate::DEFAULT_TCP_PORT;

/// Sizes of the four register banks
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct BankSizes {
    pub coils: u16,
    pub discrete: u16,
    pub holding: u16,
    pub input: u16,
}

impl Default for BankSizes {
    fn default() -> Self {
        Self {
            coils: 1000,
            discrete: 1000,
            holding: 1000,
            input: 1000,
        }
    }
}

/// Complete simulator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SlaveConfig {
    /// Modbus unit id this slave answers for (1-247)
    pub unit_id: u8,
    /// TCP listen port
    pub port: u16,
    pub bank_sizes: BankSizes,
    pub holding_auto: AutoIncrementConfig,
    pub input_auto: AutoIncrementConfig,
}

impl Default for SlaveConfig {
    fn default() -> Self {
        Self {
            unit_id: 1,
            port: DEFAULT_TCP_PORT,
            bank_sizes: BankSizes::default(),
            holding_auto: AutoIncrementConfig::default(),
            input_auto: AutoIncrementConfig::default(),
        }
    }
}

impl SlaveConfig {
    /// Load a configuration from a JSON file
    ///
    /// Missing fields take their defaults, so a partial file is valid.
    pub fn from_file<P: AsRef<Path>>(path: P) -> ModsimResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            ModsimError::configuration(format!("cannot read {}: {}", path.display(), e))
        })?;

        let config: SlaveConfig = serde_json::from_str(&text)?;
        Ok(config)
    }

    /// Validate the record before the supervisor starts
    pub fn validate(&self) -> ModsimResult<()> {
        if self.unit_id == 0 || self.unit_id > 247 {
            return Err(ModsimError::configuration(format!(
                "unit id {} out of range 1-247",
                self.unit_id
            )));
        }

        if self.port == 0 {
            return Err(ModsimError::configuration("port must be 1-65535"));
        }

        self.holding_auto.validate(WordBank::Holding)?;
        self.input_auto.validate(WordBank::Input)?;
        Ok(())
    }

    /// Pretty-printed JSON of the default configuration, for
    /// `--generate-config`
    pub fn sample_json() -> String {
        serde_json::to_string_pretty(&SlaveConfig::default()).unwrap()
    }
}

/// Expand a register-list expression like `0,5,10-20`
///
/// Items are single addresses or inclusive ranges; expansion preserves
/// order and duplicates.
pub fn parse_register_list(expr: &str) -> ModsimResult<Vec<u16>> {
    let mut addresses = Vec::new();

    for item in expr.split(',') {
        let item = item.trim();
        if item.is_empty() {
            return Err(ModsimError::configuration(format!(
                "empty item in register list '{}'",
                expr
            )));
        }

        match item.split_once('-') {
            Some((lo, hi)) => {
                let lo = parse_address(lo)?;
                let hi = parse_address(hi)?;
                if lo > hi {
                    return Err(ModsimError::configuration(format!(
                        "descending range '{}' in register list",
                        item
                    )));
                }
                addresses.extend(lo..=hi);
            }
            None => addresses.push(parse_address(item)?),
        }
    }

    Ok(addresses)
}

fn parse_address(text: &str) -> ModsimResult<u16> {
    text.trim()
        .parse::<u16>()
        .map_err(|_| ModsimError::configuration(format!("invalid register address '{}'", text)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(SlaveConfig::default().validate().is_ok());
    }

    #[test]
    fn test_unit_id_bounds() {
        let mut config = SlaveConfig::default();

        config.unit_id = 0;
        assert!(config.validate().is_err());

        config.unit_id = 248;
        assert!(config.validate().is_err());

        config.unit_id = 247;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_auto_increment_validation_propagates() {
        let mut config = SlaveConfig::default();
        config.input_auto.enabled = true;
        config.input_auto.increment = 100;
        config.input_auto.max = 50;

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_takes_defaults() {
        let config: SlaveConfig =
            serde_json::from_str(r#"{ "port": 1502, "bank_sizes": { "holding": 64 } }"#).unwrap();

        assert_eq!(config.port, 1502);
        assert_eq!(config.unit_id, 1);
        assert_eq!(config.bank_sizes.holding, 64);
        assert_eq!(config.bank_sizes.coils, 1000);
        assert!(!config.holding_auto.enabled);
    }

    #[test]
    fn test_sample_json_roundtrips() {
        let config: SlaveConfig = serde_json::from_str(&SlaveConfig::sample_json()).unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_register_list_singles_and_ranges() {
        assert_eq!(parse_register_list("5").unwrap(), vec![5]);
        assert_eq!(parse_register_list("1,5,7").unwrap(), vec![1, 5, 7]);
        assert_eq!(parse_register_list("10-13").unwrap(), vec![10, 11, 12, 13]);
        assert_eq!(
            parse_register_list("0, 2-4, 2").unwrap(),
            vec![0, 2, 3, 4, 2]
        );
    }

    #[test]
    fn test_register_list_errors() {
        assert!(parse_register_list("").is_err());
        assert!(parse_register_list("1,,2").is_err());
        assert!(parse_register_list("abc").is_err());
        assert!(parse_register_list("9-5").is_err());
        assert!(parse_register_list("70000").is_err());
    }
}
