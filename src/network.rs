use alloy_primitives::Address;
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    collections::HashMap,
    fmt,
};

const ADDRESS_PLACEHOLDER: &str = "{address}";

/// Chains the game is deployed on. Chain ids outside this set are never
/// mapped to a network.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Network {
    Kovan,
    HarmonyTestnet,
    FantomTestnet,
}

impl Network {
    pub const ALL: [Network; 3] = [
        Network::Kovan,
        Network::HarmonyTestnet,
        Network::FantomTestnet,
    ];

    pub fn from_chain_id(chain_id: u64) -> Option<Self> {
        match chain_id {
            42 => Some(Network::Kovan),
            1_666_700_000 => Some(Network::HarmonyTestnet),
            4_002 => Some(Network::FantomTestnet),
            _ => None,
        }
    }

    pub fn chain_id(self) -> u64 {
        match self {
            Network::Kovan => 42,
            Network::HarmonyTestnet => 1_666_700_000,
            Network::FantomTestnet => 4_002,
        }
    }

    pub fn native_token_symbol(self) -> &'static str {
        match self {
            Network::Kovan => "ETH",
            Network::HarmonyTestnet => "ONE",
            Network::FantomTestnet => "FTM",
        }
    }

    pub fn explorer_url_template(self) -> &'static str {
        match self {
            Network::Kovan => "https://kovan.etherscan.io/address/{address}",
            Network::HarmonyTestnet => "https://explorer.pops.one/address/{address}",
            Network::FantomTestnet => "https://testnet.ftmscan.com/address/{address}",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Network::Kovan => "Kovan",
            Network::HarmonyTestnet => "Harmony Testnet",
            Network::FantomTestnet => "Fantom Testnet",
        };
        write!(f, "{name}")
    }
}

/// Everything needed to talk to the game on one network.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct NetworkConfig {
    pub network: Network,
    pub contract_address: Address,
}

impl NetworkConfig {
    pub fn native_token_symbol(&self) -> &'static str {
        self.network.native_token_symbol()
    }

    pub fn explorer_url(&self) -> String {
        self.network
            .explorer_url_template()
            .replace(ADDRESS_PLACEHOLDER, &self.contract_address.to_string())
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ChainResolution {
    Supported(NetworkConfig),
    /// Known network without a contract in the deployment book.
    NotDeployed(Network),
    Unsupported(u64),
}

impl ChainResolution {
    pub fn config(&self) -> Option<&NetworkConfig> {
        match self {
            ChainResolution::Supported(config) => Some(config),
            ChainResolution::NotDeployed(_) | ChainResolution::Unsupported(_) => None,
        }
    }

    /// Label shown next to the connected account.
    pub fn label(&self) -> String {
        match self {
            ChainResolution::Supported(config) => config.network.to_string(),
            ChainResolution::NotDeployed(_) | ChainResolution::Unsupported(_) => {
                String::from("Wrong network")
            }
        }
    }
}

/// Immutable chain id -> contract lookup, built once at startup.
#[derive(Clone, Debug, Default)]
pub struct NetworkTable {
    contracts: HashMap<Network, Address>,
}

impl NetworkTable {
    pub fn new(entries: impl IntoIterator<Item = (Network, Address)>) -> Self {
        Self {
            contracts: entries.into_iter().collect(),
        }
    }

    pub fn resolve(&self, chain_id: u64) -> ChainResolution {
        let Some(network) = Network::from_chain_id(chain_id) else {
            return ChainResolution::Unsupported(chain_id);
        };
        match self.contracts.get(&network) {
            Some(address) => ChainResolution::Supported(NetworkConfig {
                network,
                contract_address: *address,
            }),
            None => ChainResolution::NotDeployed(network),
        }
    }

    pub fn deployed_networks(&self) -> impl Iterator<Item = Network> + '_ {
        Network::ALL
            .into_iter()
            .filter(|network| self.contracts.contains_key(network))
    }
}
