// crates/scaler-client/src/wire.rs
// ============================================================================
// Module: Scaler Wire Types
// Description: JSON request and response shapes of the remote service.
// Purpose: Keep protocol field names in one place, separate from the public API.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Serde mirrors of the issuance, sign, transform, and delete payloads.
//! Public request types are translated into these shapes right before a call.
//! Invariants:
//! - Field names match the remote API (`camelCase`).
//! - Optional output fields are omitted rather than sent as `null`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

use crate::request::Crop;
use crate::request::Delivery;
use crate::request::ImageInput;
use crate::request::OutputSpec;

// ============================================================================
// SECTION: Token Issuance
// ============================================================================

/// Issuance endpoint response.
#[derive(Debug, Deserialize)]
pub(crate) struct IssuanceResponse {
    /// Newly issued access token.
    #[serde(rename = "accessToken")]
    pub access_token: String,
}

// ============================================================================
// SECTION: Signing
// ============================================================================

/// Literal input name used when the image travels in the upload body.
pub(crate) const BODY_INPUT: &str = "body";

/// Signing request body.
#[derive(Debug, Serialize)]
pub(crate) struct SignRequest<'a> {
    /// `"body"` or the remote image URL.
    pub input: &'a str,
    /// Requested outputs in caller order.
    pub output: Vec<WireOutput<'a>>,
}

impl<'a> SignRequest<'a> {
    /// Translates the caller's input and outputs into the wire shape.
    pub fn new(input: &'a ImageInput, outputs: &'a [OutputSpec]) -> Self {
        let input = match input {
            ImageInput::RemoteUrl(url) => url.as_str(),
            ImageInput::LocalPath(_) | ImageInput::Buffer(_) => BODY_INPUT,
        };
        Self {
            input,
            output: outputs.iter().map(WireOutput::from).collect(),
        }
    }
}

/// One output entry of the signing request.
#[derive(Debug, Serialize)]
pub(crate) struct WireOutput<'a> {
    /// Target fit.
    pub fit: WireFit,
    /// Target encoding label.
    #[serde(rename = "type")]
    pub format: &'static str,
    /// Optional encoder quality.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<u8>,
    /// Optional further-upload target, forwarded verbatim.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload: Option<&'a Map<String, Value>>,
    /// Optional crop, forwarded verbatim.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crop: Option<&'a Map<String, Value>>,
}

impl<'a> From<&'a OutputSpec> for WireOutput<'a> {
    fn from(spec: &'a OutputSpec) -> Self {
        let upload = match &spec.delivery {
            Delivery::Upload(target) => Some(target.as_map()),
            Delivery::Buffer | Delivery::SaveToPath(_) => None,
        };
        Self {
            fit: WireFit {
                width: spec.fit.width,
                height: spec.fit.height,
                upscale: spec.fit.upscale,
            },
            format: spec.format.as_str(),
            quality: spec.quality,
            upload,
            crop: spec.crop.as_ref().map(Crop::as_map),
        }
    }
}

/// Fit entry of the signing request.
#[derive(Debug, Serialize)]
pub(crate) struct WireFit {
    /// Target width in pixels.
    pub width: u32,
    /// Target height in pixels.
    pub height: u32,
    /// Whether upscaling is allowed.
    pub upscale: bool,
}

/// Signing endpoint response.
#[derive(Debug, Deserialize)]
pub(crate) struct SignResponse {
    /// Single-use upload URL.
    pub url: String,
}

// ============================================================================
// SECTION: Transform
// ============================================================================

/// Upload endpoint response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TransformResponse {
    /// Server-reported metadata of the input image.
    pub input_image: Value,
    /// One descriptor per requested output, in request order.
    pub output_images: Vec<OutputDescriptor>,
    /// Cleanup endpoint for temporary server files.
    pub delete_url: String,
    /// Server-side timing breakdown.
    pub time_stats: ServerTimeStats,
}

/// Server descriptor of one produced output.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct OutputDescriptor {
    /// Download URL; absent or empty when delivered out of band.
    #[serde(default)]
    pub download_url: Option<String>,
    /// Temporary file identifier for cleanup.
    #[serde(default)]
    pub file_id: Option<String>,
    /// Fit the server applied, kept opaque.
    #[serde(default)]
    pub fit: Value,
    /// Pixel size of the produced image, kept opaque.
    #[serde(default)]
    pub pixel_size: Value,
}

impl OutputDescriptor {
    /// Returns the download URL when one is present and non-empty.
    pub fn download_url(&self) -> Option<&str> {
        self.download_url.as_deref().filter(|url| !url.is_empty())
    }
}

/// Server-side timing breakdown in milliseconds.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ServerTimeStats {
    /// Time the server spent transforming.
    pub transform_ms: f64,
    /// Time the server spent uploading outputs elsewhere.
    #[serde(default)]
    pub upload_images_ms: Option<f64>,
}

// ============================================================================
// SECTION: Cleanup
// ============================================================================

/// Cleanup request body.
#[derive(Debug, Serialize)]
pub(crate) struct DeleteRequest<'a> {
    /// File identifiers to delete.
    pub images: Vec<&'a str>,
}

impl<'a> DeleteRequest<'a> {
    /// Collects every file identifier present among the descriptors.
    pub fn from_descriptors(descriptors: &'a [OutputDescriptor]) -> Self {
        Self {
            images: descriptors
                .iter()
                .filter_map(|descriptor| descriptor.file_id.as_deref())
                .filter(|id| !id.is_empty())
                .collect(),
        }
    }
}
