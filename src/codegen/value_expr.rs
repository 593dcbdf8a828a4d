//! Config values and node ids → TypeScript expression strings.

use serde_json::Value;

/// Quote `s` as a TypeScript string literal.
pub fn ts_string(s: &str) -> String {
    format!("\"{}\"", escape_string(s))
}

/// Render a config value as a TypeScript literal.
pub fn literal(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => ts_string(s),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().map(literal).collect();
            format!("[{}]", parts.join(", "))
        }
        Value::Object(map) => {
            if map.is_empty() {
                return "{}".to_string();
            }
            let parts: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("{}: {}", ts_string(k), literal(v)))
                .collect();
            format!("{{ {} }}", parts.join(", "))
        }
    }
}

/// Optional-chained access along a dotted path: `a.b` → `?.["a"]?.["b"]`.
pub fn field_access(base: &str, path: &str) -> String {
    let mut out = base.to_string();
    for segment in path.split('.').map(str::trim).filter(|s| !s.is_empty()) {
        match segment.parse::<usize>() {
            Ok(index) => out.push_str(&format!("?.[{}]", index)),
            Err(_) => out.push_str(&format!("?.[{}]", ts_string(segment))),
        }
    }
    out
}

/// Convert a node id to its TypeScript variable name.
/// Convention: `step_{sanitized_id}`, non-identifier characters become `_`.
pub fn binding_var_name(node_id: &str) -> String {
    let sanitized: String = node_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("step_{}", sanitized)
}

/// Comparison for a `condition` operator.
pub fn comparison(operator: &str, lhs: &str, rhs: &str) -> String {
    match operator {
        "equals" => format!("{} === {}", lhs, rhs),
        "notEquals" => format!("{} !== {}", lhs, rhs),
        "gt" => format!("Number({}) > Number({})", lhs, rhs),
        "gte" => format!("Number({}) >= Number({})", lhs, rhs),
        "lt" => format!("Number({}) < Number({})", lhs, rhs),
        "lte" => format!("Number({}) <= Number({})", lhs, rhs),
        "contains" => format!("String({}).includes(String({}))", lhs, rhs),
        _ => format!("{} != null", lhs),
    }
}

/// Text safe to place after `//`.
pub fn comment_text(s: &str) -> String {
    s.replace(['\n', '\r'], " ")
}

fn escape_string(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
        .replace('\t', "\\t")
}
