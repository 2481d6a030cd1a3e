// crates/scaler-client/src/result.rs
// ============================================================================
// Module: Scaler Transform Results
// Description: Output artifacts and timing breakdown of one transform.
// Purpose: Hand back fully assembled, immutable transform outcomes.
// Dependencies: bytes, serde_json
// ============================================================================

//! ## Overview
//! A [`TransformResult`] carries the server's input metadata, one
//! [`OutputImage`] per requested output in request order, and a
//! [`TransformTimings`] breakdown.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;
use std::time::Duration;

use bytes::Bytes;
use serde_json::Value;

use crate::request::Outputs;

// ============================================================================
// SECTION: Artifacts
// ============================================================================

/// A retrieved output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Artifact {
    /// Downloaded bytes held in memory.
    Bytes(Bytes),
    /// Downloaded bytes written to this local path.
    Saved(PathBuf),
    /// Delivered out of band by a service-side upload.
    Uploaded,
}

impl Artifact {
    /// Returns the bytes for buffered artifacts.
    #[must_use]
    pub const fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Self::Bytes(bytes) => Some(bytes),
            Self::Saved(_) | Self::Uploaded => None,
        }
    }
}

/// One output with its server-reported geometry.
///
/// `fit` and `pixel_size` are passed through as the service sent them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputImage {
    /// Fit the service applied.
    pub fit: Value,
    /// Pixel size of the produced image.
    pub pixel_size: Value,
    /// Retrieved artifact.
    pub image: Artifact,
}

// ============================================================================
// SECTION: Timings
// ============================================================================

/// Latency breakdown of one transform call.
///
/// # Invariants
/// - `total >= sign + send_image + get_images`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransformTimings {
    /// Signing round trip.
    pub sign: Duration,
    /// Client-to-server transfer time of the upload phase.
    pub send_image: Duration,
    /// Server-reported transform compute time.
    pub transform: Duration,
    /// Wall clock of the parallel retrieval phase.
    pub get_images: Duration,
    /// Wall clock of the whole call.
    pub total: Duration,
}

// ============================================================================
// SECTION: Transform Result
// ============================================================================

/// Outcome of a successful transform.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformResult {
    /// Server-reported metadata of the input image.
    pub input_image: Value,
    /// Output images, shaped like the request's outputs.
    pub outputs: Outputs<OutputImage>,
    /// Latency breakdown.
    pub timings: TransformTimings,
}

/// Converts a server-reported millisecond value into a duration.
///
/// Negative, NaN, and infinite values map to zero.
pub(crate) fn millis_to_duration(ms: f64) -> Duration {
    if ms.is_finite() && ms > 0.0 {
        Duration::try_from_secs_f64(ms / 1_000.0).unwrap_or(Duration::MAX)
    } else {
        Duration::ZERO
    }
}
