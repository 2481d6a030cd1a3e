// crates/scaler-client/src/http.rs
// ============================================================================
// Module: Scaler HTTP Helpers
// Description: Bounded response readers and header helpers.
// Purpose: Share body limits and error previews across protocol phases.
// Dependencies: reqwest, serde_json
// ============================================================================

//! ## Overview
//! Helpers used by the token broker and the orchestrator to read JSON control
//! responses and server error text with hard byte limits.
//! Invariants:
//! - Control responses larger than [`MAX_CONTROL_RESPONSE_BYTES`] are rejected.
//! - Error previews are truncated at [`MAX_ERROR_PREVIEW_BYTES`], never rejected.

// ============================================================================
// SECTION: Imports
// ============================================================================

use reqwest::Response;
use reqwest::header::HeaderValue;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::error::PhaseFailure;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum size of a JSON control response (issuance, sign, transform).
pub const MAX_CONTROL_RESPONSE_BYTES: usize = 1024 * 1024;
/// Maximum number of bytes of server error text kept for diagnostics.
pub const MAX_ERROR_PREVIEW_BYTES: usize = 4 * 1024;

// ============================================================================
// SECTION: Body Errors
// ============================================================================

/// Failures while reading a response body.
#[derive(Debug, Error)]
pub(crate) enum BodyError {
    /// Body stream failed.
    #[error("{0}")]
    Transport(String),
    /// Body exceeded the byte limit.
    #[error("response exceeds size limit ({actual} > {limit})")]
    TooLarge {
        /// Bytes seen so far.
        actual: usize,
        /// Maximum allowed bytes.
        limit: usize,
    },
    /// Body was not the expected JSON shape.
    #[error("invalid json response: {0}")]
    Json(String),
}

impl From<BodyError> for PhaseFailure {
    fn from(err: BodyError) -> Self {
        match err {
            BodyError::Transport(message) => Self::Transport(message),
            BodyError::TooLarge {
                ..
            }
            | BodyError::Json(_) => Self::Protocol(err.to_string()),
        }
    }
}

// ============================================================================
// SECTION: Readers
// ============================================================================

/// Reads a response body while enforcing a hard byte limit.
pub(crate) async fn read_body_with_limit(
    mut response: Response,
    limit: usize,
) -> Result<Vec<u8>, BodyError> {
    let mut body = Vec::new();
    while let Some(chunk) =
        response.chunk().await.map_err(|err| BodyError::Transport(err.to_string()))?
    {
        let next_total = body.len().saturating_add(chunk.len());
        if next_total > limit {
            return Err(BodyError::TooLarge {
                actual: next_total,
                limit,
            });
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

/// Reads and decodes a bounded JSON control response.
pub(crate) async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, BodyError> {
    let body = read_body_with_limit(response, MAX_CONTROL_RESPONSE_BYTES).await?;
    serde_json::from_slice(&body).map_err(|err| BodyError::Json(err.to_string()))
}

/// Reads a truncated, trimmed preview of a failed response body.
pub(crate) async fn error_preview(mut response: Response) -> String {
    let mut body = Vec::new();
    loop {
        match response.chunk().await {
            Ok(Some(chunk)) => {
                let remaining = MAX_ERROR_PREVIEW_BYTES.saturating_sub(body.len());
                let take = remaining.min(chunk.len());
                body.extend_from_slice(&chunk[.. take]);
                if body.len() >= MAX_ERROR_PREVIEW_BYTES {
                    break;
                }
            }
            Ok(None) => break,
            Err(err) => {
                if body.is_empty() {
                    return format!("<unreadable body: {err}>");
                }
                break;
            }
        }
    }
    String::from_utf8_lossy(&body).trim().to_string()
}

/// Rejects a non-200 response with its status and body preview.
pub(crate) async fn require_ok(response: Response) -> Result<Response, PhaseFailure> {
    let status = response.status();
    if status == reqwest::StatusCode::OK {
        return Ok(response);
    }
    let body = error_preview(response).await;
    Err(PhaseFailure::Status {
        status: status.as_u16(),
        body,
    })
}

// ============================================================================
// SECTION: Headers
// ============================================================================

/// Builds a `Bearer` authorization header value, marked sensitive.
pub(crate) fn bearer_header(secret: &str) -> Result<HeaderValue, String> {
    let mut value = HeaderValue::from_str(&format!("Bearer {secret}"))
        .map_err(|_| "credential contains characters not allowed in a header".to_string())?;
    value.set_sensitive(true);
    Ok(value)
}
