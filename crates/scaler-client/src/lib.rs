// crates/scaler-client/src/lib.rs
// ============================================================================
// Module: Scaler Client Library
// Description: Client-side orchestration for the remote image transform service.
// Purpose: Manage access tokens and drive sign, upload, retrieval, and cleanup.
// Dependencies: reqwest, tokio, serde, thiserror
// ============================================================================

//! ## Overview
//! Scaler Client exposes two cooperating pieces:
//! - [`TokenBroker`] keeps one short-lived access token valid for all callers
//!   and performs at most one refresh at a time.
//! - [`TransformOrchestrator`] runs one transform job through its protocol
//!   phases and returns outputs in request order with a timing breakdown.
//!
//! Invariants:
//! - No artifact is returned unless every requested output was retrieved.
//! - Server-side cleanup is attempted whenever the upload phase succeeded.
//! - Events are reported through a [`ScalerObserver`] and never raised.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;
pub mod error;
pub mod http;
pub mod orchestrator;
pub mod request;
pub mod result;
pub mod telemetry;
pub mod token;
mod wire;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::ApiKey;
pub use config::ConfigError;
pub use config::ScalerConfig;
pub use error::PhaseFailure;
pub use error::ScalerError;
pub use orchestrator::TransformOrchestrator;
pub use orchestrator::TransformOrchestratorBuilder;
pub use request::Crop;
pub use request::Delivery;
pub use request::Fit;
pub use request::ImageFormat;
pub use request::ImageInput;
pub use request::OutputSpec;
pub use request::Outputs;
pub use request::TransformRequest;
pub use request::UploadTarget;
pub use result::Artifact;
pub use result::OutputImage;
pub use result::TransformResult;
pub use result::TransformTimings;
pub use telemetry::FileObserver;
pub use telemetry::NoopObserver;
pub use telemetry::Outcome;
pub use telemetry::Phase;
pub use telemetry::ScalerEvent;
pub use telemetry::ScalerObserver;
pub use telemetry::StderrObserver;
pub use token::AuthError;
pub use token::Credential;
pub use token::TokenBroker;
