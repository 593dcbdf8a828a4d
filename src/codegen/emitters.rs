//! Built-in emitters, one per kind in `crate::schema::builtin`.
//!
//! Emitters only format strings. Input expressions and bindings arrive
//! already resolved in [`EmitInputs`]; helpers such as `__httpJson` and
//! `__evmWrite` live in the generated prelude.

use serde_json::Value;

use super::registry::{EmitInputs, EmitterRegistry, Fragment, GuardTerm, TriggerHook};
use super::value_expr::{comparison, field_access, literal, ts_string};
use crate::error::CompileError;
use crate::parse::types::Node;

type EmitResult = Result<Fragment, CompileError>;

pub fn register_builtin(registry: &mut EmitterRegistry) {
    registry.register("cron-trigger", cron_trigger);
    registry.register("http-trigger", http_trigger);
    registry.register("evm-log-trigger", evm_log_trigger);
    registry.register("http-fetch", http_fetch);
    registry.register("evm-read", evm_read);
    registry.register("evm-write", evm_write);
    registry.register("get-secret", get_secret);
    registry.register("data-transform", data_transform);
    registry.register("json-parse", json_parse);
    registry.register("condition", condition);
    registry.register("log", log);
    registry.register("price-feed-consumer", price_feed_consumer);
    registry.register("erc20-token", erc20_token);
    registry.register("chain-selector", chain_selector);
}

fn str_or<'a>(node: &'a Node, field: &str, default: &'a str) -> &'a str {
    node.str_field(field).unwrap_or(default)
}

/// Numbers and numeric strings as plain text.
fn scalar_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.trim().to_string()),
        _ => None,
    }
}

fn binding_or_undefined<'a>(inputs: &'a EmitInputs, name: &str) -> &'a str {
    inputs.binding(name).unwrap_or("undefined")
}

// =============================================================================
// TRIGGERS
// =============================================================================

fn cron_trigger(node: &Node, inputs: &EmitInputs) -> EmitResult {
    let schedule = match node.str_field("timezone") {
        Some(tz) => format!("TZ={} {}", tz, str_or(node, "schedule", "")),
        None => str_or(node, "schedule", "").to_string(),
    };
    Ok(Fragment::new()
        .with_value("payload")
        .output("event", inputs.var.clone())
        .trigger(TriggerHook {
            capability: format!(
                "new cre.capabilities.CronCapability().trigger({{ schedule: {} }})",
                ts_string(&schedule)
            ),
            payload_type: "CronPayload".into(),
        }))
}

fn http_trigger(node: &Node, inputs: &EmitInputs) -> EmitResult {
    let keys: Vec<String> = node
        .field("authorizedKeys")
        .and_then(Value::as_array)
        .map(|keys| {
            keys.iter()
                .filter_map(Value::as_str)
                .map(|k| {
                    format!(
                        "{{ type: \"KEY_TYPE_ECDSA_EVM\", publicKey: {} }}",
                        ts_string(k)
                    )
                })
                .collect()
        })
        .unwrap_or_default();

    let mut fragment = Fragment::new();
    if let Some(path) = node.str_field("path") {
        fragment = fragment.setup(format!(
            "// {} {}",
            str_or(node, "method", "POST"),
            path.replace(['\n', '\r'], " ")
        ));
    }
    Ok(fragment
        .with_value(
            "payload.input.length > 0 ? JSON.parse(new TextDecoder().decode(payload.input)) : {}",
        )
        .output("payload", inputs.var.clone())
        .trigger(TriggerHook {
            capability: format!(
                "new cre.capabilities.HTTPCapability().trigger({{ authorizedKeys: [{}] }})",
                keys.join(", ")
            ),
            payload_type: "HTTPPayload".into(),
        }))
}

fn evm_log_trigger(node: &Node, inputs: &EmitInputs) -> EmitResult {
    let addresses: Vec<String> = node
        .field("contractAddresses")
        .and_then(Value::as_array)
        .map(|list| {
            list.iter()
                .filter_map(Value::as_str)
                .map(|a| format!("hexToBase64({})", ts_string(a)))
                .collect()
        })
        .unwrap_or_default();
    let signature = str_or(node, "eventSignature", "");
    let confidence = str_or(node, "confidence", "FINALIZED");

    Ok(Fragment::new()
        .with_value("payload")
        .output("log", inputs.var.clone())
        .trigger(TriggerHook {
            capability: format!(
                "{}.logTrigger({{ addresses: [{}], topics: [{{ values: [hexToBase64(keccak256(toHex({})))] }}], confidence: \"CONFIDENCE_LEVEL_{}\" }})",
                binding_or_undefined(inputs, "chain"),
                addresses.join(", "),
                ts_string(signature),
                confidence
            ),
            payload_type: "EVMLog".into(),
        }))
}

// =============================================================================
// CAPABILITIES
// =============================================================================

fn http_fetch(node: &Node, inputs: &EmitInputs) -> EmitResult {
    let url = match inputs.port("url") {
        Some(expr) => expr.to_string(),
        None => ts_string(str_or(node, "url", "")),
    };

    let mut request = vec![
        format!("url: {}", url),
        format!("method: {}", ts_string(str_or(node, "method", "GET"))),
    ];

    let headers = node.field("headers").map(literal);
    match (headers, inputs.binding("auth")) {
        (Some(h), Some(secret)) => request.push(format!(
            "headers: {{ ...{}, Authorization: `Bearer ${{{}}}` }}",
            h, secret
        )),
        (None, Some(secret)) => {
            request.push(format!("headers: {{ Authorization: `Bearer ${{{}}}` }}", secret))
        }
        (Some(h), None) => request.push(format!("headers: {}", h)),
        (None, None) => {}
    }

    match (inputs.port("body"), node.field("body")) {
        (Some(expr), _) => request.push(format!("body: {}", expr)),
        (None, Some(body)) => request.push(format!("body: {}", literal(body))),
        (None, None) => {}
    }

    if let Some(ms) = scalar_text(node.field("timeoutMs")) {
        request.push(format!("timeoutMs: {}", ms));
    }

    Ok(Fragment::new()
        .with_value(format!("__httpJson(runtime, {{ {} }})", request.join(", ")))
        .output("body", format!("{}.body", inputs.var))
        .output("status", format!("{}.status", inputs.var)))
}

/// Human-readable ABI from either the `abi` field or a full signature in
/// `functionName` (e.g. `balanceOf(address) view returns (uint256)`).
fn abi_and_name(node: &Node) -> (String, String) {
    let signature = str_or(node, "functionName", "");
    let name = signature
        .split('(')
        .next()
        .unwrap_or(signature)
        .trim()
        .to_string();
    let abi = match node.field("abi") {
        Some(abi) => literal(abi),
        None => format!("parseAbi([{}])", ts_string(&format!("function {}", signature))),
    };
    (abi, name)
}

fn evm_read(node: &Node, inputs: &EmitInputs) -> EmitResult {
    let (abi, name) = abi_and_name(node);
    let args = match (inputs.port("args"), node.field("args")) {
        (Some(expr), _) => expr.to_string(),
        (None, Some(args)) => literal(args),
        (None, None) => "[]".to_string(),
    };
    Ok(Fragment::new()
        .with_value(format!(
            "__evmRead(runtime, {}, {}, {}, {}, {})",
            binding_or_undefined(inputs, "chain"),
            binding_or_undefined(inputs, "contract"),
            ts_string(&name),
            abi,
            args
        ))
        .output("result", inputs.var.clone()))
}

fn evm_write(node: &Node, inputs: &EmitInputs) -> EmitResult {
    let gas = scalar_text(node.field("gasLimit")).unwrap_or_else(|| "0".to_string());
    let data = inputs
        .port("data")
        .or_else(|| inputs.port("in"))
        .unwrap_or("undefined");
    Ok(Fragment::new()
        .with_value(format!(
            "__evmWrite(runtime, {}, {}, BigInt({}), {})",
            binding_or_undefined(inputs, "chain"),
            binding_or_undefined(inputs, "contract"),
            ts_string(&gas),
            data
        ))
        .output("txHash", inputs.var.clone()))
}

fn get_secret(_node: &Node, inputs: &EmitInputs) -> EmitResult {
    Ok(Fragment::new()
        .with_value(binding_or_undefined(inputs, "secret"))
        .output("value", inputs.var.clone()))
}

// =============================================================================
// LOGIC
// =============================================================================

fn data_transform(node: &Node, inputs: &EmitInputs) -> EmitResult {
    Ok(Fragment::new()
        .with_value(format!(
            "((input: any) => ({}))({})",
            str_or(node, "expression", "input"),
            inputs.port_or_undefined("in")
        ))
        .output("value", inputs.var.clone()))
}

fn json_parse(node: &Node, inputs: &EmitInputs) -> EmitResult {
    let parsed = format!("__parse({})", inputs.port_or_undefined("in"));
    Ok(Fragment::new()
        .with_value(field_access(&parsed, str_or(node, "path", "")))
        .output("value", inputs.var.clone()))
}

fn condition(node: &Node, inputs: &EmitInputs) -> EmitResult {
    let input = inputs.port_or_undefined("in");
    let lhs = field_access(input, str_or(node, "field", ""));
    let rhs = node
        .field("value")
        .map(literal)
        .unwrap_or_else(|| "undefined".to_string());
    let test = comparison(str_or(node, "operator", "exists"), &lhs, &rhs);
    Ok(Fragment::new()
        .with_value(format!("Boolean({})", test))
        .output("result", inputs.var.clone())
        .output("true", input)
        .output("false", input)
        .control("true", GuardTerm::when(inputs.var.clone()))
        .control("false", GuardTerm::unless(inputs.var.clone())))
}

fn log(node: &Node, inputs: &EmitInputs) -> EmitResult {
    let message = match node.str_field("level") {
        Some(level) if level != "info" => format!("[{}] {}", level, str_or(node, "message", "")),
        _ => str_or(node, "message", "").to_string(),
    };
    let line = match inputs.port("in") {
        Some(expr) => format!(
            "runtime.log({} + \": \" + __stringify({}));",
            ts_string(&message),
            expr
        ),
        None => format!("runtime.log({});", ts_string(&message)),
    };
    Ok(Fragment::new().effect(line))
}

// =============================================================================
// CONTRACTS + CHAIN CONFIG
// =============================================================================

const AGGREGATOR_ABI: &str =
    "function latestRoundData() view returns (uint80, int256, uint256, uint256, uint80)";

fn price_feed_consumer(node: &Node, inputs: &EmitInputs) -> EmitResult {
    Ok(Fragment::new()
        .with_value(format!(
            "__evmRead(runtime, {}, {}, \"latestRoundData\", parseAbi([{}]), [])",
            binding_or_undefined(inputs, "chain"),
            ts_string(str_or(node, "feedAddress", "")),
            ts_string(AGGREGATOR_ABI)
        ))
        .output("price", format!("{}[1]", inputs.var))
        .output("updatedAt", format!("{}[3]", inputs.var)))
}

fn erc20_token(node: &Node, inputs: &EmitInputs) -> EmitResult {
    Ok(Fragment::new()
        .with_value(format!("{} as Address", ts_string(str_or(node, "address", ""))))
        .output("contract", inputs.var.clone())
        .output("address", inputs.var.clone()))
}

fn chain_selector(_node: &Node, inputs: &EmitInputs) -> EmitResult {
    Ok(Fragment::new()
        .with_value(binding_or_undefined(inputs, "chain"))
        .output("chain", inputs.var.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::types::NodeCategory;

    fn inputs(var: &str, ports: &[(&str, &str)], bindings: &[(&str, &str)]) -> EmitInputs {
        EmitInputs {
            var: var.into(),
            ports: ports
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            bindings: bindings
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[test]
    fn cron_hook_carries_schedule() {
        let node = Node::new("t", NodeCategory::Trigger, "cron-trigger")
            .with_field("schedule", "*/5 * * * *");
        let f = cron_trigger(&node, &inputs("step_t", &[], &[])).unwrap();
        let hook = f.trigger.unwrap();
        assert_eq!(
            hook.capability,
            "new cre.capabilities.CronCapability().trigger({ schedule: \"*/5 * * * *\" })"
        );
        assert_eq!(hook.payload_type, "CronPayload");
    }

    #[test]
    fn fetch_uses_auth_binding() {
        let node = Node::new("f", NodeCategory::Capability, "http-fetch")
            .with_field("url", "https://api.example.com")
            .with_field("method", "GET");
        let f = http_fetch(
            &node,
            &inputs("step_f", &[], &[("auth", "SECRET")]),
        )
        .unwrap();
        assert_eq!(
            f.value.as_deref(),
            Some(
                "__httpJson(runtime, { url: \"https://api.example.com\", method: \"GET\", headers: { Authorization: `Bearer ${SECRET}` } })"
            )
        );
        assert_eq!(f.outputs["status"], "step_f.status");
    }

    #[test]
    fn condition_exposes_branches() {
        let node = Node::new("c", NodeCategory::Logic, "condition")
            .with_field("field", "price")
            .with_field("operator", "gt")
            .with_field("value", 100);
        let f = condition(&node, &inputs("step_c", &[("in", "step_x")], &[])).unwrap();
        assert_eq!(
            f.value.as_deref(),
            Some("Boolean(Number(step_x?.[\"price\"]) > Number(100))")
        );
        assert_eq!(f.outputs["true"], "step_x");
        assert_eq!(f.control["false"], GuardTerm::unless("step_c"));
    }

    #[test]
    fn write_prefers_data_port() {
        let node =
            Node::new("w", NodeCategory::Capability, "evm-write").with_field("gasLimit", 500000);
        let f = evm_write(
            &node,
            &inputs(
                "step_w",
                &[("in", "step_a"), ("data", "step_b")],
                &[("chain", "C"), ("contract", "K")],
            ),
        )
        .unwrap();
        assert_eq!(
            f.value.as_deref(),
            Some("__evmWrite(runtime, C, K, BigInt(\"500000\"), step_b)")
        );
    }

    #[test]
    fn log_is_effect_only() {
        let node = Node::new("l", NodeCategory::Logic, "log").with_field("message", "done");
        let f = log(&node, &inputs("step_l", &[], &[])).unwrap();
        assert!(f.value.is_none());
        assert_eq!(f.effects, vec!["runtime.log(\"done\");"]);
    }
}
