//! Committing a completed exchange to the response.

use aqueduct_core::{Operation, PipeError, PipeResponse};
use aqueduct_middleware::ExchangeParts;
use bytes::Bytes;
use http::header::ACCEPT;
use serde_json::Value;
use tracing::debug;

/// Writes the outcome of a completed pipe to its response.
///
/// The context status and headers are applied first. Without an output
/// value the response ends with no body. Otherwise the content type is the
/// one already set on the response, else the request's `accept` header
/// (`*/*` stands for the operation's first producible type), and the output
/// is serialized for it with [`translate`].
///
/// A response a handler already ended is returned untouched.
///
/// # Errors
///
/// Returns an internal error when the output cannot be serialized or the
/// negotiated content type is not a valid header value.
pub fn finalize(
    parts: ExchangeParts,
    operation: Option<&Operation>,
) -> Result<PipeResponse, PipeError> {
    let ExchangeParts {
        request,
        mut response,
        status_code,
        headers,
        output,
    } = parts;

    if response.is_ended() {
        debug!("response already committed by the handler");
        return Ok(response);
    }

    if let Some(status) = status_code {
        response.set_status(status);
    }
    if !headers.is_empty() {
        response.headers_mut().extend(headers);
    }

    let Some(output) = output else {
        response.end(None);
        return Ok(response);
    };

    let content_type = match response.content_type() {
        Some(content_type) => Some(content_type.to_string()),
        None => {
            let negotiated = request.header(ACCEPT.as_str()).and_then(|accept| {
                if accept == "*/*" {
                    operation.and_then(|op| op.produces().first().cloned())
                } else {
                    Some(accept.to_string())
                }
            });
            if let Some(content_type) = &negotiated {
                response.set_content_type(content_type)?;
            }
            negotiated
        }
    };

    let body = translate(&output, content_type.as_deref())?;
    debug!(content_type = ?content_type, bytes = body.len(), "sending response body");
    response.end(Some(body));
    Ok(response)
}

/// Serializes an output value for a content type.
///
/// Strings are sent as they are, numbers and booleans as their literal
/// text. Objects, arrays and null become JSON when the content type names
/// JSON and a debug rendering otherwise.
///
/// ```
/// use aqueduct::finalize::translate;
/// use serde_json::json;
///
/// assert_eq!(translate(&json!({"a": 1}), Some("application/json")).unwrap(), r#"{"a":1}"#);
/// assert_eq!(translate(&json!("plain"), None).unwrap(), "plain");
/// ```
///
/// # Errors
///
/// Returns an internal error if JSON serialization fails.
pub fn translate(output: &Value, content_type: Option<&str>) -> Result<Bytes, PipeError> {
    match output {
        Value::String(text) => Ok(Bytes::from(text.clone())),
        Value::Bool(_) | Value::Number(_) => Ok(Bytes::from(output.to_string())),
        Value::Null | Value::Array(_) | Value::Object(_) => {
            if content_type.is_some_and(|ct| ct.to_ascii_lowercase().contains("json")) {
                serde_json::to_vec(output).map(Bytes::from).map_err(|e| {
                    PipeError::internal_with_source("failed to serialize response body", e)
                })
            } else {
                Ok(Bytes::from(format!("{output:#?}")))
            }
        }
    }
}
