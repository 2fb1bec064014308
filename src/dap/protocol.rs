use serde::{Deserialize, Serialize};
use serde_json::Value;

/// DAP request envelope.
#[derive(Debug, Serialize)]
pub struct Request {
    pub seq: i64,
    #[serde(rename = "type")]
    pub r#type: &'static str,
    pub command: String,
    pub arguments: Value,
}

/// DAP response envelope.
///
/// Note: the DAP specification allows responses with no `body` field at all.
/// Using a `serde_json::Value` keeps the envelope stable and avoids type
/// inference issues around `None` bodies.
#[derive(Debug, Deserialize)]
pub struct Response {
    pub request_seq: i64,
    pub success: bool,
    pub command: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub body: Value,
}

/// DAP event envelope.
#[derive(Debug, Deserialize)]
pub struct Event {
    pub event: String,
    #[serde(default)]
    pub body: Value,
}

/// Arguments of an `evaluate` request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateArguments {
    pub expression: String,
    pub context: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_id: Option<i64>,
}

/// Body of an `evaluate` response.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EvaluateResponse {
    pub result: String,
    pub memory_reference: Option<String>,
    pub variables_reference: i64,
    pub r#type: Option<String>,
}

/// Arguments of a `disassemble` request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisassembleArguments {
    pub memory_reference: String,
    pub instruction_offset: i64,
    pub instruction_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolve_symbols: Option<bool>,
}

/// Body of a `disassemble` response.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DisassembleResponse {
    pub instructions: Vec<Instruction>,
}

/// One disassembled instruction as produced by the adapter.
///
/// The view core treats the address as an opaque string-encoded integer of
/// arbitrary width and only ever touches the source-location fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Instruction {
    pub address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instruction_bytes: Option<String>,
    pub instruction: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Source>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_line: Option<u32>,
}

/// Source descriptor attached to instructions and goto-target queries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Source {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// Arguments of a `gotoTargets` request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GotoTargetsArguments {
    pub source: Source,
    pub line: u32,
}

/// Body of a `gotoTargets` response.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GotoTargetsResponse {
    pub targets: Vec<GotoTarget>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GotoTarget {
    pub id: i64,
    pub label: String,
    pub line: u32,
    pub instruction_pointer_reference: Option<String>,
}

/// Arguments of a `variables` request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VariablesArguments {
    pub variables_reference: i64,
}

/// Body of a `variables` response.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VariablesResponse {
    pub variables: Vec<VariableValue>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VariableValue {
    pub name: String,
    pub value: String,
}

/// Parse a string-encoded memory reference.
///
/// Addresses are opaque to the view core beyond numeric comparison, so only
/// the textual forms adapters actually emit are accepted: `0x`-prefixed hex
/// and plain decimal.
pub fn parse_memory_reference(raw: &str) -> Option<u64> {
    let s = raw.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).ok()
    } else {
        s.parse::<u64>().ok()
    }
}

/// Numeric address equality with a fallback to literal comparison for
/// references the adapter encodes in a form [`parse_memory_reference`]
/// does not understand.
pub fn same_memory_reference(a: &str, b: &str) -> bool {
    match (parse_memory_reference(a), parse_memory_reference(b)) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}
