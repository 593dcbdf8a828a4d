//! Compile-time resolution of secret, chain and contract bindings.

use std::collections::BTreeMap;

use crate::parse::types::Node;
use crate::schema::{BindingSpec, is_address};
use crate::secrets::SecretResolver;

use super::value_expr::ts_string;

/// A chain the generated code can obtain a client for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainInfo {
    pub selector_name: String,
    pub testnet: bool,
}

/// Chain names known to the target runtime.
#[derive(Debug, Clone)]
pub struct ChainRegistry {
    chains: BTreeMap<String, ChainInfo>,
}

impl ChainRegistry {
    pub fn empty() -> Self {
        Self {
            chains: BTreeMap::new(),
        }
    }

    pub fn with_chain(mut self, selector_name: impl Into<String>, testnet: bool) -> Self {
        let selector_name = selector_name.into();
        self.chains.insert(
            selector_name.clone(),
            ChainInfo {
                selector_name,
                testnet,
            },
        );
        self
    }

    pub fn get(&self, name: &str) -> Option<&ChainInfo> {
        self.chains.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.chains.keys().map(String::as_str)
    }
}

impl Default for ChainRegistry {
    fn default() -> Self {
        Self::empty()
            .with_chain("ethereum-testnet-sepolia", true)
            .with_chain("ethereum-mainnet", false)
            .with_chain("ethereum-testnet-sepolia-base-1", true)
            .with_chain("ethereum-mainnet-base-1", false)
            .with_chain("polygon-testnet-amoy", true)
            .with_chain("polygon-mainnet", false)
            .with_chain("ethereum-testnet-sepolia-arbitrum-1", true)
            .with_chain("ethereum-mainnet-arbitrum-1", false)
    }
}

/// What the generator may consult when resolving bindings.
pub struct BindingContext<'a> {
    pub secrets: &'a dyn SecretResolver,
    pub chains: &'a ChainRegistry,
}

impl<'a> BindingContext<'a> {
    pub fn new(secrets: &'a dyn SecretResolver, chains: &'a ChainRegistry) -> Self {
        Self { secrets, chains }
    }
}

/// Outcome of resolving one binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolved(String),
    Unresolved(String),
    /// Optional binding whose field is unset.
    Skipped,
}

/// Resolve `spec` for `node`. `port_expr` is the expression feeding the
/// binding's port, when that port is connected.
pub fn resolve(
    spec: &BindingSpec,
    node: &Node,
    port_expr: Option<&str>,
    ctx: &BindingContext<'_>,
) -> Resolution {
    match *spec {
        BindingSpec::Secret { field, .. } => {
            let Some(name) = node.str_field(field) else {
                return Resolution::Skipped;
            };
            if ctx.secrets.contains(name) {
                Resolution::Resolved(secret_expr(name))
            } else {
                Resolution::Unresolved(format!("secret '{}' is not available", name))
            }
        }
        BindingSpec::Chain { field, .. } => {
            if let Some(expr) = port_expr {
                return Resolution::Resolved(expr.to_string());
            }
            match node.str_field(field) {
                Some(name) => match ctx.chains.get(name) {
                    Some(chain) => Resolution::Resolved(format!(
                        "__evmClient({}, {})",
                        ts_string(&chain.selector_name),
                        chain.testnet
                    )),
                    None => Resolution::Unresolved(format!("unknown chain '{}'", name)),
                },
                None => Resolution::Unresolved("no chain selected".into()),
            }
        }
        BindingSpec::Contract { field, .. } => {
            if let Some(expr) = port_expr {
                return Resolution::Resolved(expr.to_string());
            }
            match node.str_field(field) {
                Some(addr) if is_address(addr) => Resolution::Resolved(ts_string(addr)),
                Some(addr) => {
                    Resolution::Unresolved(format!("'{}' is not a contract address", addr))
                }
                None => Resolution::Unresolved("no contract address".into()),
            }
        }
    }
}

pub fn secret_expr(name: &str) -> String {
    format!("runtime.getSecret({{ id: {} }}).result().value", ts_string(name))
}

/// Expression that throws when evaluated.
pub fn placeholder_expr(detail: &str) -> String {
    format!("__unresolved({})", ts_string(detail))
}

/// Environment variable under which a secret is handed to a simulation.
pub fn secret_env_var(name: &str) -> String {
    let normalized: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("CRE_SECRET_{}", normalized)
}

/// Names of every secret `node` references through its bindings.
pub fn referenced_secrets<'n>(node: &'n Node, bindings: &[BindingSpec]) -> Vec<&'n str> {
    bindings
        .iter()
        .filter_map(|b| match b {
            BindingSpec::Secret { field, .. } => node.str_field(field),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::types::NodeCategory;
    use crate::secrets::StaticSecretResolver;

    const CHAIN: BindingSpec = BindingSpec::Chain {
        name: "chain",
        field: "chainName",
        port: Some("chain"),
    };

    #[test]
    fn chain_from_port_wins_over_field() {
        let secrets = StaticSecretResolver::new();
        let chains = ChainRegistry::default();
        let ctx = BindingContext::new(&secrets, &chains);
        let node = Node::new("w", NodeCategory::Capability, "evm-write")
            .with_field("chainName", "nowhere");
        assert_eq!(
            resolve(&CHAIN, &node, Some("step_sel"), &ctx),
            Resolution::Resolved("step_sel".into())
        );
        assert_eq!(
            resolve(&CHAIN, &node, None, &ctx),
            Resolution::Unresolved("unknown chain 'nowhere'".into())
        );
    }

    #[test]
    fn known_chain_renders_client() {
        let secrets = StaticSecretResolver::new();
        let chains = ChainRegistry::default();
        let ctx = BindingContext::new(&secrets, &chains);
        let node = Node::new("w", NodeCategory::Capability, "evm-write")
            .with_field("chainName", "ethereum-mainnet");
        assert_eq!(
            resolve(&CHAIN, &node, None, &ctx),
            Resolution::Resolved("__evmClient(\"ethereum-mainnet\", false)".into())
        );
    }

    #[test]
    fn unset_secret_field_is_skipped() {
        let secrets = StaticSecretResolver::new();
        let chains = ChainRegistry::default();
        let ctx = BindingContext::new(&secrets, &chains);
        let spec = BindingSpec::Secret {
            name: "auth",
            field: "authSecret",
        };
        let node = Node::new("f", NodeCategory::Capability, "http-fetch");
        assert_eq!(resolve(&spec, &node, None, &ctx), Resolution::Skipped);
    }

    #[test]
    fn env_var_names_are_normalized() {
        assert_eq!(secret_env_var("api-key"), "CRE_SECRET_API_KEY");
    }
}
