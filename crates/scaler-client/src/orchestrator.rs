// crates/scaler-client/src/orchestrator.rs
// ============================================================================
// Module: Scaler Transform Orchestrator
// Description: Sign, upload, parallel retrieval, and cleanup of one transform.
// Purpose: Drive the remote protocol and assemble an ordered, timed result.
// Dependencies: bytes, reqwest, tokio, url
// ============================================================================

//! ## Overview
//! [`TransformOrchestrator::transform`] runs one image job end to end:
//! token acquisition, signing, body upload, one retrieval task per output,
//! best-effort cleanup, and result assembly.
//! Invariants:
//! - Sign and upload are strictly sequential; failures there issue no cleanup.
//! - Every retrieval task settles before success or failure is decided.
//! - Cleanup runs after retrieval settles; its outcome is reported, never raised.
//! - Result order and shape match the request's outputs.
//! - Retrieval tasks live in a [`JoinSet`] and never outlive the call.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use bytes::Bytes;
use reqwest::Client;
use reqwest::Response;
use reqwest::header::AUTHORIZATION;
use reqwest::header::CONTENT_LENGTH;
use reqwest::header::CONTENT_TYPE;
use tokio::io::AsyncWriteExt;
use tokio::task::JoinSet;
use url::Url;

use crate::config::ScalerConfig;
use crate::error::PhaseFailure;
use crate::error::ScalerError;
use crate::http::bearer_header;
use crate::http::read_body_with_limit;
use crate::http::read_json;
use crate::http::require_ok;
use crate::request::Delivery;
use crate::request::ImageInput;
use crate::request::OutputSpec;
use crate::request::TransformRequest;
use crate::result::Artifact;
use crate::result::OutputImage;
use crate::result::TransformResult;
use crate::result::TransformTimings;
use crate::result::millis_to_duration;
use crate::telemetry::NoopObserver;
use crate::telemetry::Outcome;
use crate::telemetry::Phase;
use crate::telemetry::ScalerEvent;
use crate::telemetry::ScalerObserver;
use crate::token::Credential;
use crate::token::TokenBroker;
use crate::wire::DeleteRequest;
use crate::wire::OutputDescriptor;
use crate::wire::SignRequest;
use crate::wire::SignResponse;
use crate::wire::TransformResponse;

// ============================================================================
// SECTION: Builder
// ============================================================================

/// Builder for a transform orchestrator.
///
/// # Invariants
/// - `build` succeeds only for a valid configuration.
/// - Without an explicit broker, a fresh one sharing the HTTP client is created.
pub struct TransformOrchestratorBuilder {
    /// Client configuration.
    config: ScalerConfig,
    /// Optional preconfigured HTTP client.
    client: Option<Client>,
    /// Optional shared token broker.
    broker: Option<Arc<TokenBroker>>,
    /// Event sink.
    observer: Arc<dyn ScalerObserver>,
}

impl TransformOrchestratorBuilder {
    /// Uses a preconfigured HTTP client.
    #[must_use]
    pub fn http_client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Shares an existing token broker.
    #[must_use]
    pub fn broker(mut self, broker: Arc<TokenBroker>) -> Self {
        self.broker = Some(broker);
        self
    }

    /// Registers the event observer.
    #[must_use]
    pub fn observer(mut self, observer: impl ScalerObserver + 'static) -> Self {
        self.observer = Arc::new(observer);
        self
    }

    /// Builds the orchestrator.
    ///
    /// # Errors
    ///
    /// Returns [`ScalerError::Client`] when the configuration is invalid or the
    /// HTTP client cannot be constructed.
    pub fn build(self) -> Result<TransformOrchestrator, ScalerError> {
        self.config.validate().map_err(|err| ScalerError::Client(err.to_string()))?;
        let client = match self.client {
            Some(client) => client,
            None => Client::builder()
                .timeout(self.config.request_timeout)
                .build()
                .map_err(|err| ScalerError::Client(err.to_string()))?,
        };
        let broker = self.broker.unwrap_or_else(|| {
            Arc::new(TokenBroker::new(client.clone(), &self.config, Arc::clone(&self.observer)))
        });
        Ok(TransformOrchestrator {
            client,
            broker,
            config: self.config,
            observer: self.observer,
        })
    }
}

// ============================================================================
// SECTION: Orchestrator
// ============================================================================

/// Runs transform jobs against the remote service.
///
/// # Invariants
/// - All calls share one token broker and one HTTP client.
pub struct TransformOrchestrator {
    /// HTTP client shared by every phase.
    client: Client,
    /// Shared access-token owner.
    broker: Arc<TokenBroker>,
    /// Client configuration.
    config: ScalerConfig,
    /// Event sink.
    observer: Arc<dyn ScalerObserver>,
}

impl TransformOrchestrator {
    /// Returns a builder for the orchestrator.
    #[must_use]
    pub fn builder(config: ScalerConfig) -> TransformOrchestratorBuilder {
        TransformOrchestratorBuilder {
            config,
            client: None,
            broker: None,
            observer: Arc::new(NoopObserver),
        }
    }

    /// Returns the shared token broker.
    #[must_use]
    pub const fn broker(&self) -> &Arc<TokenBroker> {
        &self.broker
    }

    /// Runs one transform job.
    ///
    /// # Errors
    ///
    /// Returns [`ScalerError`] naming the phase that failed, or
    /// [`ScalerError::Timeout`] when the configured deadline elapses.
    pub async fn transform(
        &self,
        request: &TransformRequest,
    ) -> Result<TransformResult, ScalerError> {
        let started = Instant::now();
        let outcome = match self.config.deadline {
            Some(deadline) => tokio::time::timeout(deadline, self.run(request, started))
                .await
                .unwrap_or_else(|_| {
                    Err(ScalerError::Timeout {
                        deadline_ms: deadline.as_millis(),
                    })
                }),
            None => self.run(request, started).await,
        };
        let event = match &outcome {
            Ok(_) => ScalerEvent::new(Phase::Transform, Outcome::Ok),
            Err(err) => ScalerEvent::new(Phase::Transform, Outcome::Error)
                .with_status(err.phase_failure().and_then(PhaseFailure::status))
                .with_message(err.to_string()),
        };
        self.observer.record(&event.with_latency(started.elapsed()));
        outcome
    }

    /// Executes the protocol phases in order.
    async fn run(
        &self,
        request: &TransformRequest,
        started: Instant,
    ) -> Result<TransformResult, ScalerError> {
        request.validate()?;
        let credential = self.broker.ensure_valid().await?;
        let specs = request.outputs.as_slice();

        let sign_started = Instant::now();
        let signed = self.sign(&credential, request).await;
        let sign = sign_started.elapsed();
        self.record_phase(Phase::Sign, sign, signed.as_ref().err());
        let upload_url = signed.map_err(ScalerError::Signing)?;

        let body = read_input(&request.input).await?;
        let upload_started = Instant::now();
        let uploaded = self.upload(upload_url, body, &request.input).await.and_then(|response| {
            let images: Vec<OutputImage> = response
                .output_images
                .iter()
                .map(|descriptor| OutputImage {
                    fit: descriptor.fit.clone(),
                    pixel_size: descriptor.pixel_size.clone(),
                    image: Artifact::Uploaded,
                })
                .collect();
            match request.outputs.mirror(images) {
                Some(outputs) => Ok((response, outputs)),
                None => Err(PhaseFailure::Protocol(format!(
                    "server returned {} outputs for {} requested",
                    response.output_images.len(),
                    specs.len()
                ))),
            }
        });
        let upload_elapsed = upload_started.elapsed();
        self.record_phase(Phase::Upload, upload_elapsed, uploaded.as_ref().err());
        let (response, mut outputs) = uploaded.map_err(ScalerError::Transform)?;

        let transform = millis_to_duration(response.time_stats.transform_ms);
        let server_upload =
            response.time_stats.upload_images_ms.map_or(Duration::ZERO, millis_to_duration);
        let send_image = upload_elapsed.saturating_sub(transform).saturating_sub(server_upload);

        let retrieve_started = Instant::now();
        let retrieved = self.retrieve(&response.output_images, specs, outputs.as_mut_slice()).await;
        let get_images = retrieve_started.elapsed();
        self.record_phase(Phase::Retrieve, get_images, retrieved.as_ref().err());

        self.cleanup(&response).await;
        retrieved.map_err(ScalerError::Download)?;

        Ok(TransformResult {
            input_image: response.input_image,
            outputs,
            timings: TransformTimings {
                sign,
                send_image,
                transform,
                get_images,
                total: started.elapsed(),
            },
        })
    }

    /// Registers the transform and returns the single-use upload URL.
    async fn sign(
        &self,
        credential: &Credential,
        request: &TransformRequest,
    ) -> Result<Url, PhaseFailure> {
        let header = bearer_header(credential.token()).map_err(PhaseFailure::Protocol)?;
        let body = SignRequest::new(&request.input, request.outputs.as_slice());
        let response = self
            .client
            .post(self.config.sign_url.clone())
            .header(AUTHORIZATION, header)
            .json(&body)
            .send()
            .await
            .map_err(|err| PhaseFailure::Transport(err.to_string()))?;
        let response = require_ok(response).await?;
        let signed: SignResponse = read_json(response).await?;
        Url::parse(&signed.url)
            .map_err(|err| PhaseFailure::Protocol(format!("invalid upload url: {err}")))
    }

    /// Posts the input body and returns the server's transform report.
    async fn upload(
        &self,
        url: Url,
        body: Bytes,
        input: &ImageInput,
    ) -> Result<TransformResponse, PhaseFailure> {
        let mut builder = self.client.post(url).header(CONTENT_LENGTH, body.len());
        if !matches!(input, ImageInput::RemoteUrl(_)) {
            builder = builder.header(CONTENT_TYPE, "application/octet-stream");
        }
        let response = builder
            .body(body)
            .send()
            .await
            .map_err(|err| PhaseFailure::Transport(err.to_string()))?;
        let response = require_ok(response).await?;
        Ok(read_json(response).await?)
    }

    /// Retrieves every downloadable output concurrently into `images`.
    ///
    /// `images` is index-aligned with `descriptors`; out-of-band outputs keep
    /// their [`Artifact::Uploaded`] placeholder.
    async fn retrieve(
        &self,
        descriptors: &[OutputDescriptor],
        specs: &[OutputSpec],
        images: &mut [OutputImage],
    ) -> Result<(), PhaseFailure> {
        let mut tasks = JoinSet::new();
        for (index, (descriptor, spec)) in descriptors.iter().zip(specs).enumerate() {
            let Some(url) = descriptor.download_url() else {
                continue;
            };
            let target = match &spec.delivery {
                Delivery::SaveToPath(path) => Some(path.clone()),
                Delivery::Buffer | Delivery::Upload(_) => None,
            };
            let client = self.client.clone();
            let url = url.to_string();
            let limit = self.config.max_artifact_bytes;
            tasks.spawn(async move { (index, download(client, url, target, limit).await) });
        }

        let mut first_error = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, Ok(artifact))) => {
                    if let Some(output) = images.get_mut(index) {
                        output.image = artifact;
                    }
                }
                Ok((_, Err(err))) => {
                    if first_error.is_none() {
                        first_error = Some(err);
                    }
                }
                Err(err) => {
                    if first_error.is_none() {
                        first_error =
                            Some(PhaseFailure::Transport(format!("retrieval task failed: {err}")));
                    }
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Best-effort deletion of server-side temporary files.
    async fn cleanup(&self, response: &TransformResponse) {
        let started = Instant::now();
        let body = DeleteRequest::from_descriptors(&response.output_images);
        let result = self.client.delete(&response.delete_url).json(&body).send().await;
        let event = match result {
            Ok(reply) if reply.status().is_success() => {
                ScalerEvent::new(Phase::Cleanup, Outcome::Ok)
                    .with_status(Some(reply.status().as_u16()))
            }
            Ok(reply) => ScalerEvent::new(Phase::Cleanup, Outcome::Error)
                .with_status(Some(reply.status().as_u16()))
                .with_message("cleanup rejected by server"),
            Err(err) => {
                ScalerEvent::new(Phase::Cleanup, Outcome::Error).with_message(err.to_string())
            }
        };
        self.observer.record(&event.with_latency(started.elapsed()));
    }

    /// Reports a phase latency and its failure, if any.
    fn record_phase(&self, phase: Phase, latency: Duration, failure: Option<&PhaseFailure>) {
        let event = match failure {
            None => ScalerEvent::new(phase, Outcome::Ok),
            Some(failure) => ScalerEvent::new(phase, Outcome::Error)
                .with_status(failure.status())
                .with_message(failure.to_string()),
        };
        self.observer.record(&event.with_latency(latency));
    }
}

impl std::fmt::Debug for TransformOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformOrchestrator")
            .field("config", &self.config)
            .field("broker", &self.broker)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// SECTION: Phase Helpers
// ============================================================================

/// Loads the bytes to upload; remote inputs upload an empty body.
async fn read_input(input: &ImageInput) -> Result<Bytes, ScalerError> {
    match input {
        ImageInput::Buffer(bytes) => Ok(bytes.clone()),
        ImageInput::LocalPath(path) => tokio::fs::read(path)
            .await
            .map(Bytes::from)
            .map_err(|err| ScalerError::Input(format!("{}: {err}", path.display()))),
        ImageInput::RemoteUrl(_) => Ok(Bytes::new()),
    }
}

/// Downloads one artifact to memory or to a local path.
async fn download(
    client: Client,
    url: String,
    target: Option<PathBuf>,
    limit: usize,
) -> Result<Artifact, PhaseFailure> {
    let response =
        client.get(&url).send().await.map_err(|err| PhaseFailure::Transport(err.to_string()))?;
    let response = require_ok(response).await?;
    match target {
        Some(path) => {
            save_to_path(response, &path).await?;
            Ok(Artifact::Saved(path))
        }
        None => {
            let bytes = read_body_with_limit(response, limit).await?;
            Ok(Artifact::Bytes(Bytes::from(bytes)))
        }
    }
}

/// Streams a response body into a file, chunk by chunk.
async fn save_to_path(mut response: Response, path: &Path) -> Result<(), PhaseFailure> {
    let io_error = |err: std::io::Error| PhaseFailure::Io(format!("{}: {err}", path.display()));
    let mut file = tokio::fs::File::create(path).await.map_err(io_error)?;
    while let Some(chunk) =
        response.chunk().await.map_err(|err| PhaseFailure::Transport(err.to_string()))?
    {
        file.write_all(&chunk).await.map_err(io_error)?;
    }
    file.flush().await.map_err(io_error)?;
    Ok(())
}
