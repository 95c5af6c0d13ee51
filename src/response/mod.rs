//! Response processing: decode, check and trim a raw tool response.

mod infer;
mod trim;

pub use infer::infer_schema;
pub use trim::trim_response;

use crate::contract::Operation;
use crate::error::{EngineError, EngineResult};
use crate::types::InvalidRespStrategy;
use serde_json::{Map, Value};

/// Decode a raw body as a JSON object, keeping numbers as written.
pub fn decode_object(raw: &str) -> EngineResult<Map<String, Value>> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| EngineError::invalid_response(format!("response is not valid json: {e}")))?;
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(EngineError::invalid_response("response is not object")),
    }
}

/// Trim `raw` to the operation's declared 200 JSON response.
///
/// Returns an empty string when the operation declares no responses, or a
/// response schema without properties.
pub fn process_response(
    raw: &str,
    operation: &Operation,
    strategy: InvalidRespStrategy,
) -> EngineResult<String> {
    let Some(schema) = operation.response_schema()? else {
        return Ok(String::new());
    };

    let body = decode_object(raw)?;
    if schema.properties.is_empty() {
        return Ok(String::new());
    }

    let trimmed = trim_response(body, schema, strategy)?;
    serde_json::to_string(&trimmed).map_err(|e| EngineError::Internal(e.into()))
}
