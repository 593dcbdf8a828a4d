//! Built-in node kinds.
//! SYNC NOTE: every kind here needs an emitter in `crate::codegen::emitters`.

use serde_json::Value;

use super::{BindingSpec, FieldSpec, FieldType, KindSchema, PortSpec, PortType};
use crate::parse::types::NodeCategory;

/// CRE per-transaction ceiling.
pub const MAX_GAS_LIMIT: u64 = 5_000_000;
/// CRE per-trigger ceiling on watched addresses.
pub const MAX_LOG_TRIGGER_ADDRESSES: usize = 5;

const HTTP_METHODS: &[&str] = &["GET", "POST", "PUT", "DELETE", "PATCH", "HEAD"];
const CONFIDENCE_LEVELS: &[&str] = &["SAFEST", "LATEST", "FINALIZED"];
const CONDITION_OPERATORS: &[&str] = &[
    "equals",
    "notEquals",
    "gt",
    "gte",
    "lt",
    "lte",
    "contains",
    "exists",
];
const LOG_LEVELS: &[&str] = &["info", "warn", "error"];

fn gas_limit_within_ceiling(value: &Value) -> Option<String> {
    let gas = match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }?;
    (gas > MAX_GAS_LIMIT).then(|| format!("gas limit {} exceeds maximum {}", gas, MAX_GAS_LIMIT))
}

fn address_count_within_ceiling(value: &Value) -> Option<String> {
    let count = value.as_array()?.len();
    if count == 0 {
        Some("at least one contract address is required".into())
    } else if count > MAX_LOG_TRIGGER_ADDRESSES {
        Some(format!(
            "{} contract addresses given, at most {} allowed",
            count, MAX_LOG_TRIGGER_ADDRESSES
        ))
    } else {
        None
    }
}

pub(super) fn schemas() -> Vec<KindSchema> {
    use FieldType as F;
    use PortType as P;

    vec![
        // =====================================================================
        // TRIGGERS
        // =====================================================================
        KindSchema {
            kind: "cron-trigger",
            category: NodeCategory::Trigger,
            fields: vec![
                FieldSpec::required("schedule", F::Cron),
                FieldSpec::optional("timezone", F::String),
            ],
            inputs: vec![],
            outputs: vec![PortSpec::new("event", P::Json)],
            bindings: vec![],
            effect: false,
            description: "Fires on a cron schedule.",
        },
        KindSchema {
            kind: "http-trigger",
            category: NodeCategory::Trigger,
            fields: vec![
                FieldSpec::required("method", F::Enum(HTTP_METHODS)),
                FieldSpec::optional("path", F::String),
                FieldSpec::optional("authorizedKeys", F::StringList),
            ],
            inputs: vec![],
            outputs: vec![PortSpec::new("payload", P::Json)],
            bindings: vec![],
            effect: false,
            description: "Fires on an inbound HTTP request.",
        },
        KindSchema {
            kind: "evm-log-trigger",
            category: NodeCategory::Trigger,
            fields: vec![
                FieldSpec::required("chainName", F::ChainName),
                FieldSpec::required("contractAddresses", F::AddressList)
                    .with_constraint(address_count_within_ceiling),
                FieldSpec::required("eventSignature", F::String),
                FieldSpec::optional("confidence", F::Enum(CONFIDENCE_LEVELS)),
            ],
            inputs: vec![],
            outputs: vec![PortSpec::new("log", P::Json)],
            bindings: vec![BindingSpec::Chain {
                name: "chain",
                field: "chainName",
                port: None,
            }],
            effect: false,
            description: "Fires when a watched contract emits a matching event.",
        },
        // =====================================================================
        // CAPABILITIES
        // =====================================================================
        KindSchema {
            kind: "http-fetch",
            category: NodeCategory::Capability,
            fields: vec![
                FieldSpec::required("url", F::Url),
                FieldSpec::required("method", F::Enum(HTTP_METHODS)),
                FieldSpec::optional("headers", F::Json),
                FieldSpec::optional("body", F::Json),
                FieldSpec::optional("authSecret", F::SecretName),
                FieldSpec::optional("timeoutMs", F::Integer),
            ],
            inputs: vec![
                PortSpec::new("in", P::Any),
                PortSpec::new("url", P::String),
                PortSpec::new("body", P::Json),
            ],
            outputs: vec![
                PortSpec::new("body", P::Json),
                PortSpec::new("status", P::Number),
            ],
            bindings: vec![BindingSpec::Secret {
                name: "auth",
                field: "authSecret",
            }],
            effect: false,
            description: "Fetches JSON over HTTP with consensus on the response.",
        },
        KindSchema {
            kind: "evm-read",
            category: NodeCategory::Capability,
            fields: vec![
                FieldSpec::optional("chainName", F::ChainName),
                FieldSpec::optional("contractAddress", F::Address),
                FieldSpec::required("functionName", F::String),
                FieldSpec::optional("abi", F::Json),
                FieldSpec::optional("args", F::Json),
            ],
            inputs: vec![
                PortSpec::new("in", P::Any),
                PortSpec::new("chain", P::Chain),
                PortSpec::new("contract", P::Contract),
                PortSpec::new("args", P::Json),
            ],
            outputs: vec![PortSpec::new("result", P::Json)],
            bindings: vec![
                BindingSpec::Chain {
                    name: "chain",
                    field: "chainName",
                    port: Some("chain"),
                },
                BindingSpec::Contract {
                    name: "contract",
                    field: "contractAddress",
                    port: Some("contract"),
                },
            ],
            effect: false,
            description: "Calls a view function on a contract.",
        },
        KindSchema {
            kind: "evm-write",
            category: NodeCategory::Capability,
            fields: vec![
                FieldSpec::optional("chainName", F::ChainName),
                FieldSpec::optional("contractAddress", F::Address),
                FieldSpec::required("gasLimit", F::Integer)
                    .with_constraint(gas_limit_within_ceiling),
            ],
            inputs: vec![
                PortSpec::new("in", P::Any),
                PortSpec::new("chain", P::Chain),
                PortSpec::new("contract", P::Contract),
                PortSpec::new("data", P::Json),
            ],
            outputs: vec![PortSpec::new("txHash", P::String)],
            bindings: vec![
                BindingSpec::Chain {
                    name: "chain",
                    field: "chainName",
                    port: Some("chain"),
                },
                BindingSpec::Contract {
                    name: "contract",
                    field: "contractAddress",
                    port: Some("contract"),
                },
            ],
            effect: true,
            description: "Submits a signed report to a receiver contract.",
        },
        KindSchema {
            kind: "get-secret",
            category: NodeCategory::Capability,
            fields: vec![FieldSpec::required("secretName", F::SecretName)],
            inputs: vec![PortSpec::new("in", P::Any)],
            outputs: vec![PortSpec::new("value", P::String)],
            bindings: vec![BindingSpec::Secret {
                name: "secret",
                field: "secretName",
            }],
            effect: false,
            description: "Reads a named secret.",
        },
        // =====================================================================
        // LOGIC
        // =====================================================================
        KindSchema {
            kind: "data-transform",
            category: NodeCategory::Logic,
            fields: vec![FieldSpec::required("expression", F::String)],
            inputs: vec![PortSpec::new("in", P::Any)],
            outputs: vec![PortSpec::new("value", P::Json)],
            bindings: vec![],
            effect: false,
            description: "Evaluates an expression over `input`.",
        },
        KindSchema {
            kind: "json-parse",
            category: NodeCategory::Logic,
            fields: vec![FieldSpec::optional("path", F::String)],
            inputs: vec![PortSpec::new("in", P::Any)],
            outputs: vec![PortSpec::new("value", P::Json)],
            bindings: vec![],
            effect: false,
            description: "Parses JSON text and optionally selects a dotted path.",
        },
        KindSchema {
            kind: "condition",
            category: NodeCategory::Logic,
            fields: vec![
                FieldSpec::optional("field", F::String),
                FieldSpec::required("operator", F::Enum(CONDITION_OPERATORS)),
                FieldSpec::optional("value", F::Any),
            ],
            inputs: vec![PortSpec::new("in", P::Any)],
            outputs: vec![
                PortSpec::new("result", P::Bool),
                PortSpec::new("true", P::Control),
                PortSpec::new("false", P::Control),
            ],
            bindings: vec![],
            effect: false,
            description: "Routes its input to the `true` or `false` branch.",
        },
        KindSchema {
            kind: "log",
            category: NodeCategory::Logic,
            fields: vec![
                FieldSpec::required("message", F::String),
                FieldSpec::optional("level", F::Enum(LOG_LEVELS)),
            ],
            inputs: vec![PortSpec::new("in", P::Any)],
            outputs: vec![],
            bindings: vec![],
            effect: true,
            description: "Writes a line to the workflow log.",
        },
        // =====================================================================
        // CONTRACTS
        // =====================================================================
        KindSchema {
            kind: "price-feed-consumer",
            category: NodeCategory::Contract,
            fields: vec![
                FieldSpec::optional("chainName", F::ChainName),
                FieldSpec::required("feedAddress", F::Address),
            ],
            inputs: vec![
                PortSpec::new("in", P::Any),
                PortSpec::new("chain", P::Chain),
            ],
            outputs: vec![
                PortSpec::new("price", P::Number),
                PortSpec::new("updatedAt", P::Number),
            ],
            bindings: vec![BindingSpec::Chain {
                name: "chain",
                field: "chainName",
                port: Some("chain"),
            }],
            effect: false,
            description: "Reads the latest round of a price feed aggregator.",
        },
        KindSchema {
            kind: "erc20-token",
            category: NodeCategory::Contract,
            fields: vec![
                FieldSpec::required("address", F::Address),
                FieldSpec::optional("symbol", F::String),
                FieldSpec::optional("decimals", F::Integer),
            ],
            inputs: vec![],
            outputs: vec![
                PortSpec::new("contract", P::Contract),
                PortSpec::new("address", P::Address),
            ],
            bindings: vec![],
            effect: false,
            description: "Declares an ERC-20 token contract.",
        },
        // =====================================================================
        // CHAIN CONFIG
        // =====================================================================
        KindSchema {
            kind: "chain-selector",
            category: NodeCategory::ChainConfig,
            fields: vec![FieldSpec::required("chainName", F::ChainName)],
            inputs: vec![],
            outputs: vec![PortSpec::new("chain", P::Chain)],
            bindings: vec![BindingSpec::Chain {
                name: "chain",
                field: "chainName",
                port: None,
            }],
            effect: false,
            description: "Selects the chain for downstream on-chain nodes.",
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn gas_limit_ceiling() {
        assert!(gas_limit_within_ceiling(&json!(5_000_000)).is_none());
        assert!(gas_limit_within_ceiling(&json!("5000001")).is_some());
    }

    #[test]
    fn address_count_bounds() {
        let addr = "0x0000000000000000000000000000000000000001";
        assert!(address_count_within_ceiling(&json!([])).is_some());
        assert!(address_count_within_ceiling(&json!(vec![addr; 5])).is_none());
        assert!(address_count_within_ceiling(&json!(vec![addr; 6])).is_some());
    }

    #[test]
    fn kinds_are_unique() {
        let all = schemas();
        let mut names: Vec<_> = all.iter().map(|s| s.kind).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), all.len());
    }
}
