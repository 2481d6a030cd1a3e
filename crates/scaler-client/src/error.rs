// crates/scaler-client/src/error.rs
// ============================================================================
// Module: Scaler Client Errors
// Description: Typed error taxonomy for token refresh and transform phases.
// Purpose: Identify the failing phase and carry server diagnostics.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! [`ScalerError`] is the single error type surfaced by
//! [`crate::TransformOrchestrator::transform`]. Each variant names the phase
//! that failed; HTTP failures carry the server status and a bounded body
//! preview through [`PhaseFailure`].
//! Invariants:
//! - Variants are stable for programmatic handling.
//! - Cleanup failures never surface here; they are reported to the observer.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::token::AuthError;

// ============================================================================
// SECTION: Phase Failures
// ============================================================================

/// Failure detail for a single remote call within a transform phase.
///
/// # Invariants
/// - `Status` is only produced for non-200 responses.
/// - `body` is a trimmed, size-capped preview of the server response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PhaseFailure {
    /// Server answered with a non-success status.
    #[error("status: {status}, text: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Server-provided diagnostic text.
        body: String,
    },
    /// Request could not be sent or the response could not be read.
    #[error("transport error: {0}")]
    Transport(String),
    /// Response was received but did not match the expected shape.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// Local file I/O failed.
    #[error("io error: {0}")]
    Io(String),
}

impl PhaseFailure {
    /// Returns the HTTP status when the failure was a status rejection.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Status {
                status, ..
            } => Some(*status),
            Self::Transport(_) | Self::Protocol(_) | Self::Io(_) => None,
        }
    }
}

// ============================================================================
// SECTION: Scaler Errors
// ============================================================================

/// Errors returned by a transform call.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
/// - Every variant identifies the phase that failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScalerError {
    /// Access token issuance failed.
    #[error("failed to refresh the access token: {0}")]
    AuthRefresh(#[from] AuthError),
    /// Signing call failed.
    #[error("failed to get transform url: {0}")]
    Signing(PhaseFailure),
    /// Upload/transform call failed.
    #[error("failed to transform image: {0}")]
    Transform(PhaseFailure),
    /// One or more output retrievals failed.
    #[error("failed to download image: {0}")]
    Download(PhaseFailure),
    /// Caller supplied an invalid transform request.
    #[error("invalid transform request: {0}")]
    Validation(String),
    /// Input image could not be read from disk.
    #[error("failed to read input image: {0}")]
    Input(String),
    /// Transform exceeded the configured deadline.
    #[error("transform exceeded deadline of {deadline_ms} ms")]
    Timeout {
        /// Configured deadline in milliseconds.
        deadline_ms: u128,
    },
    /// HTTP client could not be constructed or configured.
    #[error("client setup error: {0}")]
    Client(String),
}

impl ScalerError {
    /// Returns the phase failure detail for signing, transform, and download errors.
    #[must_use]
    pub const fn phase_failure(&self) -> Option<&PhaseFailure> {
        match self {
            Self::Signing(failure) | Self::Transform(failure) | Self::Download(failure) => {
                Some(failure)
            }
            Self::AuthRefresh(_)
            | Self::Validation(_)
            | Self::Input(_)
            | Self::Timeout {
                ..
            }
            | Self::Client(_) => None,
        }
    }

    /// Returns a stable label for the failing phase.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::AuthRefresh(_) => "auth_refresh",
            Self::Signing(_) => "signing",
            Self::Transform(_) => "transform",
            Self::Download(_) => "download",
            Self::Validation(_) => "validation",
            Self::Input(_) => "input",
            Self::Timeout {
                ..
            } => "timeout",
            Self::Client(_) => "client",
        }
    }
}
