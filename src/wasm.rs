//! WASM entry points for browser use.
//!
//! Compilation in the browser has no secret material: the editor passes the
//! names of the secrets the user has declared, and generated code reads them
//! at run time.

use serde::{Deserialize, Serialize};
use wasm_bindgen::prelude::*;

use crate::codegen::{BindingContext, ChainRegistry, CodeGenerator};
use crate::error::{CompileError, ParseError};
use crate::parse::types::Node;
use crate::secrets::DeclaredSecrets;
use crate::validate::{Diagnostic, Validator, is_compilable, merge_warnings};

/// Validate a pipeline JSON document.
/// Returns `{status: "checked", diagnostics}` or `{status: "errors", errors}`.
#[wasm_bindgen]
pub fn validate_pipeline(json: &str) -> JsValue {
    to_js(&validate_pipeline_inner(json))
}

fn validate_pipeline_inner(json: &str) -> ValidateResult {
    let pipeline = match crate::parse::parse(json) {
        Ok(p) => p,
        Err(e) => return ValidateResult::Errors { errors: vec![ErrorDto::from(e)] },
    };
    let generator = CodeGenerator::default();
    ValidateResult::Checked {
        diagnostics: Validator::new(generator.schemas()).validate(&pipeline),
    }
}

/// Schema checks for a single node, as the user edits its form.
#[wasm_bindgen]
pub fn validate_node(node_json: &str) -> JsValue {
    to_js(&validate_node_inner(node_json))
}

fn validate_node_inner(node_json: &str) -> ValidateResult {
    let node: Node = match serde_json::from_str(node_json) {
        Ok(n) => n,
        Err(e) => {
            return ValidateResult::Errors {
                errors: vec![ErrorDto::from(ParseError::from(e))],
            };
        }
    };
    let generator = CodeGenerator::default();
    ValidateResult::Checked {
        diagnostics: Validator::new(generator.schemas()).validate_node(&node),
    }
}

/// Parse, validate and generate code.
///
/// `secrets_json` is a JSON array of declared secret names; an empty string
/// declares none.
#[wasm_bindgen]
pub fn compile_pipeline(json: &str, secrets_json: &str) -> JsValue {
    to_js(&compile_pipeline_inner(json, secrets_json))
}

fn compile_pipeline_inner(json: &str, secrets_json: &str) -> CompileResult {
    let pipeline = match crate::parse::parse(json) {
        Ok(p) => p,
        Err(e) => return CompileResult::Errors { errors: vec![ErrorDto::from(e)] },
    };

    let names: Vec<String> = if secrets_json.trim().is_empty() {
        Vec::new()
    } else {
        match serde_json::from_str(secrets_json) {
            Ok(names) => names,
            Err(e) => {
                return CompileResult::Errors {
                    errors: vec![ErrorDto::from(ParseError::from(e))],
                };
            }
        }
    };

    let generator = CodeGenerator::default();
    let diagnostics = Validator::new(generator.schemas()).validate(&pipeline);
    if !is_compilable(&diagnostics) {
        return CompileResult::Invalid { diagnostics };
    }

    let secrets = DeclaredSecrets::new(names);
    let chains = ChainRegistry::default();
    match generator.compile(&pipeline, &BindingContext::new(&secrets, &chains)) {
        Ok(generated) => CompileResult::Success {
            code: generated.code,
            warnings: merge_warnings(diagnostics, generated.warnings),
        },
        Err(e) => CompileResult::Errors {
            errors: vec![ErrorDto::from(e)],
        },
    }
}

fn to_js<T: Serialize>(value: &T) -> JsValue {
    serde_wasm_bindgen::to_value(value).unwrap_or(JsValue::NULL)
}

// ---------------------------------------------------------------------------
// DTOs for serialization to JS
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorDto {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    node_id: Option<String>,
}

impl From<ParseError> for ErrorDto {
    fn from(e: ParseError) -> Self {
        ErrorDto {
            code: e.code().into(),
            message: e.to_string(),
            node_id: None,
        }
    }
}

impl From<CompileError> for ErrorDto {
    fn from(e: CompileError) -> Self {
        ErrorDto {
            code: e.code().into(),
            node_id: e.node_id().map(str::to_string),
            message: e.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
enum ValidateResult {
    Checked { diagnostics: Vec<Diagnostic> },
    Errors { errors: Vec<ErrorDto> },
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
enum CompileResult {
    Success { code: String, warnings: Vec<Diagnostic> },
    Invalid { diagnostics: Vec<Diagnostic> },
    Errors { errors: Vec<ErrorDto> },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn shape<T: Serialize>(value: &T) -> Value {
        serde_json::to_value(value).unwrap()
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let v = shape(&validate_pipeline_inner("{nope"));
        assert_eq!(v["status"], "errors");
        assert_eq!(v["errors"][0]["code"], "P001");
    }

    #[test]
    fn node_form_reports_missing_field() {
        let node = json!({"id": "c", "category": "trigger", "kind": "cron-trigger", "config": {}});
        let v = shape(&validate_node_inner(&node.to_string()));
        assert_eq!(v["status"], "checked");
        assert_eq!(v["diagnostics"][0]["code"], "missing-required-field");
        assert_eq!(v["diagnostics"][0]["field"], "schedule");
    }

    #[test]
    fn compiles_with_declared_secret() {
        let pipeline = json!({
            "id": "p",
            "nodes": [
                {"id": "t", "category": "trigger", "kind": "cron-trigger", "config": {"schedule": "*/5 * * * *"}},
                {"id": "s", "category": "capability", "kind": "get-secret", "config": {"secretName": "API_KEY"}},
                {"id": "l", "category": "logic", "kind": "log", "config": {"message": "key"}}
            ],
            "edges": [
                {"source": "t", "sourcePort": "event", "target": "s", "targetPort": "in"},
                {"source": "s", "sourcePort": "value", "target": "l", "targetPort": "in"}
            ]
        });
        let v = shape(&compile_pipeline_inner(&pipeline.to_string(), r#"["API_KEY"]"#));
        assert_eq!(v["status"], "success", "{}", v);
        assert!(v["code"].as_str().unwrap().contains("runtime.getSecret({ id: \"API_KEY\" })"));

        let v = shape(&compile_pipeline_inner(&pipeline.to_string(), ""));
        assert_eq!(v["status"], "errors");
        assert_eq!(v["errors"][0]["code"], "unresolved-binding");
        assert_eq!(v["errors"][0]["nodeId"], "s");
    }
}
