// crates/scaler-client/src/request.rs
// ============================================================================
// Module: Scaler Transform Requests
// Description: Caller-facing description of one transform job.
// Purpose: Model the input source, output specs, and delivery modes.
// Dependencies: bytes, serde_json, url
// ============================================================================

//! ## Overview
//! A [`TransformRequest`] pairs exactly one [`ImageInput`] with [`Outputs`]:
//! either a single [`OutputSpec`] or an ordered sequence of them. The result
//! of a transform mirrors that shape.
//! Invariants:
//! - The delivery mode of every output is fixed at construction time.
//! - A request is immutable once handed to the orchestrator.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;

use bytes::Bytes;
use serde_json::Map;
use serde_json::Value;
use url::Url;

use crate::error::ScalerError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Highest encoder quality accepted by the service.
pub const MAX_QUALITY: u8 = 100;

// ============================================================================
// SECTION: Input
// ============================================================================

/// Source of the image to transform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageInput {
    /// Image the service fetches itself.
    RemoteUrl(Url),
    /// Image read from the local filesystem and uploaded.
    LocalPath(PathBuf),
    /// Image bytes already in memory, uploaded as-is.
    Buffer(Bytes),
}

impl ImageInput {
    /// Creates an input from in-memory bytes.
    #[must_use]
    pub fn buffer(bytes: impl Into<Bytes>) -> Self {
        Self::Buffer(bytes.into())
    }

    /// Creates an input from a local file path.
    #[must_use]
    pub fn local_path(path: impl Into<PathBuf>) -> Self {
        Self::LocalPath(path.into())
    }

    /// Creates an input from a remote URL.
    ///
    /// # Errors
    ///
    /// Returns [`ScalerError::Validation`] when the URL does not parse.
    pub fn remote_url(url: &str) -> Result<Self, ScalerError> {
        Url::parse(url)
            .map(Self::RemoteUrl)
            .map_err(|err| ScalerError::Validation(format!("invalid remote url: {err}")))
    }
}

// ============================================================================
// SECTION: Output Parts
// ============================================================================

/// Target pixel box and upscale permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fit {
    /// Target width in pixels.
    pub width: u32,
    /// Target height in pixels.
    pub height: u32,
    /// Whether the image may be enlarged past its original resolution.
    pub upscale: bool,
}

impl Fit {
    /// Creates a fit that never upscales.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            upscale: false,
        }
    }

    /// Allows upscaling past the original resolution.
    #[must_use]
    pub const fn with_upscale(mut self) -> Self {
        self.upscale = true;
        self
    }
}

/// Crop applied before fitting.
///
/// The object is service-defined and forwarded verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Crop(Map<String, Value>);

impl Crop {
    /// Wraps a JSON object describing the crop.
    #[must_use]
    pub const fn new(crop: Map<String, Value>) -> Self {
        Self(crop)
    }

    /// Returns the raw crop object.
    #[must_use]
    pub const fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

/// Output encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    /// JPEG.
    Jpeg,
    /// PNG.
    Png,
    /// WebP.
    Webp,
    /// AVIF.
    Avif,
    /// HEIC.
    Heic,
}

impl ImageFormat {
    /// Returns the wire label for the format.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Jpeg => "jpeg",
            Self::Png => "png",
            Self::Webp => "webp",
            Self::Avif => "avif",
            Self::Heic => "heic",
        }
    }
}

/// Further-upload target the service delivers to on the caller's behalf.
///
/// The object is service-defined and forwarded verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTarget(Map<String, Value>);

impl UploadTarget {
    /// Wraps a JSON object describing the upload destination.
    #[must_use]
    pub const fn new(target: Map<String, Value>) -> Self {
        Self(target)
    }

    /// Returns the raw target object.
    #[must_use]
    pub const fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

/// How an output artifact reaches the caller.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Delivery {
    /// Download and hand back the bytes.
    #[default]
    Buffer,
    /// Download and stream into a local file.
    SaveToPath(PathBuf),
    /// Let the service upload the artifact elsewhere.
    Upload(UploadTarget),
}

// ============================================================================
// SECTION: Output Spec
// ============================================================================

/// Description of one desired output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputSpec {
    /// Target fit.
    pub fit: Fit,
    /// Optional crop applied before fitting.
    pub crop: Option<Crop>,
    /// Target encoding.
    pub format: ImageFormat,
    /// Optional encoder quality (0..=100).
    pub quality: Option<u8>,
    /// Delivery mode.
    pub delivery: Delivery,
}

impl OutputSpec {
    /// Creates a buffered output with the given fit and format.
    #[must_use]
    pub const fn new(fit: Fit, format: ImageFormat) -> Self {
        Self {
            fit,
            crop: None,
            format,
            quality: None,
            delivery: Delivery::Buffer,
        }
    }

    /// Sets the encoder quality.
    #[must_use]
    pub const fn quality(mut self, quality: u8) -> Self {
        self.quality = Some(quality);
        self
    }

    /// Sets the crop.
    #[must_use]
    pub fn crop(mut self, crop: Crop) -> Self {
        self.crop = Some(crop);
        self
    }

    /// Streams the artifact to a local path.
    #[must_use]
    pub fn save_to(mut self, path: impl Into<PathBuf>) -> Self {
        self.delivery = Delivery::SaveToPath(path.into());
        self
    }

    /// Has the service upload the artifact to the given target.
    #[must_use]
    pub fn upload_to(mut self, target: UploadTarget) -> Self {
        self.delivery = Delivery::Upload(target);
        self
    }

    /// Checks the output against service constraints.
    fn validate(&self, index: usize) -> Result<(), ScalerError> {
        if self.fit.width == 0 || self.fit.height == 0 {
            return Err(ScalerError::Validation(format!(
                "output {index}: fit width and height must be greater than zero"
            )));
        }
        if let Some(quality) = self.quality
            && quality > MAX_QUALITY
        {
            return Err(ScalerError::Validation(format!(
                "output {index}: quality {quality} exceeds {MAX_QUALITY}"
            )));
        }
        if let Delivery::SaveToPath(path) = &self.delivery
            && path.as_os_str().is_empty()
        {
            return Err(ScalerError::Validation(format!(
                "output {index}: save path must not be empty"
            )));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Outputs
// ============================================================================

/// One item or an ordered sequence of items; results mirror request shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outputs<T> {
    /// A single, non-sequence item.
    Single(T),
    /// An ordered sequence of items.
    Many(Vec<T>),
}

impl<T> Outputs<T> {
    /// Returns the items as a slice in order.
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        match self {
            Self::Single(item) => std::slice::from_ref(item),
            Self::Many(items) => items,
        }
    }

    /// Returns the items as a mutable slice in order.
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        match self {
            Self::Single(item) => std::slice::from_mut(item),
            Self::Many(items) => items,
        }
    }

    /// Returns the number of items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    /// Returns true when there are no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.as_slice().is_empty()
    }

    /// Returns the single item, if this is the single shape.
    #[must_use]
    pub const fn single(&self) -> Option<&T> {
        match self {
            Self::Single(item) => Some(item),
            Self::Many(_) => None,
        }
    }

    /// Rebuilds the same shape around a new ordered item list.
    ///
    /// Returns `None` when `items` does not match this shape's length.
    pub(crate) fn mirror<U>(&self, items: Vec<U>) -> Option<Outputs<U>> {
        if items.len() != self.len() {
            return None;
        }
        match self {
            Self::Single(_) => items.into_iter().next().map(Outputs::Single),
            Self::Many(_) => Some(Outputs::Many(items)),
        }
    }
}

impl From<OutputSpec> for Outputs<OutputSpec> {
    fn from(spec: OutputSpec) -> Self {
        Self::Single(spec)
    }
}

impl From<Vec<OutputSpec>> for Outputs<OutputSpec> {
    fn from(specs: Vec<OutputSpec>) -> Self {
        Self::Many(specs)
    }
}

// ============================================================================
// SECTION: Transform Request
// ============================================================================

/// One transform job: an input and its desired outputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformRequest {
    /// Image source.
    pub input: ImageInput,
    /// Desired outputs.
    pub outputs: Outputs<OutputSpec>,
}

impl TransformRequest {
    /// Creates a request from an input and one or many outputs.
    #[must_use]
    pub fn new(input: ImageInput, outputs: impl Into<Outputs<OutputSpec>>) -> Self {
        Self {
            input,
            outputs: outputs.into(),
        }
    }

    /// Validates the request before any network call is made.
    ///
    /// # Errors
    ///
    /// Returns [`ScalerError::Validation`] when no outputs are supplied or an
    /// output violates service constraints.
    pub fn validate(&self) -> Result<(), ScalerError> {
        if self.outputs.is_empty() {
            return Err(ScalerError::Validation("no output provided".to_string()));
        }
        for (index, spec) in self.outputs.as_slice().iter().enumerate() {
            spec.validate(index)?;
        }
        Ok(())
    }
}
