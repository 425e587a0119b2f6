use crate::network::{
    Network,
    NetworkTable,
};
use alloy_primitives::Address;
use chrono::{
    DateTime,
    Utc,
};
use color_eyre::eyre::{
    Result,
    WrapErr,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    fs,
    io::ErrorKind,
    path::Path,
};
use tracing::{
    info,
    warn,
};

pub const DEFAULT_DEPLOYMENTS_PATH: &str = ".deployments/divebar.json";

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub network: Network,
    pub contract_address: Address,
    #[serde(default)]
    pub deployed_at: Option<DateTime<Utc>>,
}

/// Contract addresses per network, read once at startup and never written.
#[derive(Clone, Debug, Default)]
pub struct DeploymentBook {
    records: Vec<DeploymentRecord>,
}

impl DeploymentBook {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = match fs::read(path) {
            Ok(data) => data,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                warn!(path = %path.display(), "no deployment records found");
                return Ok(Self::default());
            }
            Err(err) => {
                return Err(err).wrap_err_with(|| {
                    format!("Failed to read deployment records at {}", path.display())
                });
            }
        };
        let book = Self::from_json(&data)
            .wrap_err_with(|| format!("Invalid deployment records in {}", path.display()))?;
        info!(path = %path.display(), records = book.records.len(), "loaded deployments");
        Ok(book)
    }

    pub fn from_json(data: &[u8]) -> Result<Self> {
        if data.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        let records = serde_json::from_slice::<Vec<DeploymentRecord>>(data)
            .wrap_err("Failed to parse deployment records JSON")?;
        Ok(Self { records })
    }

    pub fn records(&self) -> &[DeploymentRecord] {
        &self.records
    }

    /// Most recent deployment for `network`. Records without a timestamp
    /// rank by file order.
    pub fn latest(&self, network: Network) -> Option<&DeploymentRecord> {
        self.records
            .iter()
            .filter(|record| record.network == network)
            .enumerate()
            .max_by_key(|(idx, record)| (record.deployed_at, *idx))
            .map(|(_, record)| record)
    }

    pub fn network_table(&self) -> NetworkTable {
        NetworkTable::new(Network::ALL.into_iter().filter_map(|network| {
            self.latest(network)
                .map(|record| (network, record.contract_address))
        }))
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]

    use super::*;
    use crate::network::ChainResolution;
    use alloy_primitives::address;

    #[test]
    fn from_json__empty_input_has_no_records() {
        let book = DeploymentBook::from_json(b"  \n").unwrap();
        assert!(book.records().is_empty());
    }

    #[test]
    fn network_table__uses_latest_deployment_per_network() {
        let json = br#"[
            { "network": "kovan", "contract_address": "0x00000000000000000000000000000000000000a1",
              "deployed_at": "2022-01-02T00:00:00Z" },
            { "network": "kovan", "contract_address": "0x00000000000000000000000000000000000000a0",
              "deployed_at": "2022-01-01T00:00:00Z" },
            { "network": "fantom-testnet", "contract_address": "0x00000000000000000000000000000000000000f0" }
        ]"#;
        let table = DeploymentBook::from_json(json).unwrap().network_table();

        let kovan = table.resolve(42);
        assert_eq!(
            kovan.config().map(|c| c.contract_address),
            Some(address!("00000000000000000000000000000000000000a1"))
        );
        assert!(table.resolve(4_002).config().is_some());
        assert_eq!(
            table.resolve(1_666_700_000),
            ChainResolution::NotDeployed(Network::HarmonyTestnet)
        );
    }

    #[test]
    fn from_json__rejects_unknown_network() {
        let json = br#"[{ "network": "mainnet", "contract_address": "0x00000000000000000000000000000000000000a1" }]"#;
        assert!(DeploymentBook::from_json(json).is_err());
    }

    #[test]
    fn load__missing_file_is_empty() {
        let book = DeploymentBook::load("/nonexistent/divebar/deployments.json").unwrap();
        assert!(book.records().is_empty());
    }
}
