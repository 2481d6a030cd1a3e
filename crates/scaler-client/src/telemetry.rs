// crates/scaler-client/src/telemetry.rs
// ============================================================================
// Module: Scaler Telemetry
// Description: Structured events for token refresh and transform phases.
// Purpose: Emit phase outcomes and latencies without hard logging deps.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Every phase of the protocol reports a [`ScalerEvent`] to the configured
//! [`ScalerObserver`]. Events serialize as single JSON lines so deployments can
//! route them to their preferred logging pipeline.
//! Invariants:
//! - Events never contain the API key or bearer tokens.
//! - Best-effort cleanup failures are reported here instead of being raised.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Serialize;

// ============================================================================
// SECTION: Labels
// ============================================================================

/// Protocol phase classification.
///
/// # Invariants
/// - Variants are stable for telemetry labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Access token issuance.
    TokenRefresh,
    /// Signing call.
    Sign,
    /// Body upload and server-side transform.
    Upload,
    /// Parallel artifact retrieval.
    Retrieve,
    /// Best-effort server-side cleanup.
    Cleanup,
    /// Whole transform call.
    Transform,
}

impl Phase {
    /// Returns a stable label for the phase.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TokenRefresh => "token_refresh",
            Self::Sign => "sign",
            Self::Upload => "upload",
            Self::Retrieve => "retrieve",
            Self::Cleanup => "cleanup",
            Self::Transform => "transform",
        }
    }
}

/// Phase outcome classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Phase succeeded.
    Ok,
    /// Phase failed.
    Error,
}

// ============================================================================
// SECTION: Events
// ============================================================================

/// Phase event payload.
///
/// # Invariants
/// - Optional fields are `None` when the metadata is unavailable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScalerEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Phase that produced the event.
    pub phase: Phase,
    /// Phase outcome.
    pub outcome: Outcome,
    /// Phase latency in milliseconds.
    pub latency_ms: Option<u128>,
    /// HTTP status when a response was received.
    pub status: Option<u16>,
    /// Failure description.
    pub message: Option<String>,
}

impl ScalerEvent {
    /// Creates a new event with a consistent timestamp.
    #[must_use]
    pub fn new(phase: Phase, outcome: Outcome) -> Self {
        let timestamp_ms =
            SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis();
        Self {
            event: "scaler_phase",
            timestamp_ms,
            phase,
            outcome,
            latency_ms: None,
            status: None,
            message: None,
        }
    }

    /// Attaches a latency observation.
    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency_ms = Some(latency.as_millis());
        self
    }

    /// Attaches an HTTP status.
    #[must_use]
    pub const fn with_status(mut self, status: Option<u16>) -> Self {
        self.status = status;
        self
    }

    /// Attaches a failure description.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

// ============================================================================
// SECTION: Observers
// ============================================================================

/// Observer for scaler phase events.
pub trait ScalerObserver: Send + Sync {
    /// Records a phase event.
    fn record(&self, event: &ScalerEvent);
}

/// Observer that logs JSON lines to stderr.
pub struct StderrObserver;

impl ScalerObserver for StderrObserver {
    fn record(&self, event: &ScalerEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(std::io::stderr(), "{payload}");
        }
    }
}

/// Observer that logs JSON lines to a file.
pub struct FileObserver {
    /// File handle used for append-only logging.
    file: Mutex<std::fs::File>,
}

impl FileObserver {
    /// Opens the event log file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl ScalerObserver for FileObserver {
    fn record(&self, event: &ScalerEvent) {
        if let Ok(payload) = serde_json::to_string(event)
            && let Ok(mut file) = self.file.lock()
        {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }
}

/// No-op observer.
///
/// # Invariants
/// - Events are intentionally discarded.
pub struct NoopObserver;

impl ScalerObserver for NoopObserver {
    fn record(&self, _event: &ScalerEvent) {}
}
