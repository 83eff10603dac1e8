//! # Error Handling
//!
//! Error types for every layer of the relay and how the HTTP-facing ones
//! are turned into responses.
//!
//! ## Error Categories:
//! - **MediaError**: the audio asset is missing or undecodable. Degraded but
//!   never fatal: the session is answered without an outbound track.
//! - **TransportError**: the WebRTC stack rejected an operation.
//! - **NegotiationError**: one offer/answer exchange failed. Fatal to that
//!   request only (HTTP 500), the partial session is torn down.
//! - **DeliveryError**: a single duplex connection could not take a message.
//!   That connection is dropped, everyone else keeps receiving.
//! - **LoopError**: one broadcast tick failed. The loop backs off and resumes.
//! - **AppError**: what HTTP handlers return; renders `{"error": "..."}`.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;
use std::path::PathBuf;

/// Failure to produce a decodable stream from the configured audio asset.
#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("no audio asset found (tried {})", display_paths(.tried))]
    NotFound { tried: Vec<PathBuf> },

    #[error("failed to decode {path}: {message}")]
    Decode { path: PathBuf, message: String },

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Errors surfaced by a [`crate::transport::PeerTransport`].
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error(transparent)]
    WebRtc(#[from] webrtc::Error),

    #[error("{0}")]
    Rejected(String),

    #[error("transport is closed")]
    Closed,
}

/// The step of the offer/answer exchange that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationStage {
    ValidateOffer,
    CreateTransport,
    ApplyRemoteDescription,
    AttachTrack,
    CreateAnswer,
    ApplyLocalDescription,
}

impl fmt::Display for NegotiationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stage = match self {
            NegotiationStage::ValidateOffer => "validate offer",
            NegotiationStage::CreateTransport => "create peer connection",
            NegotiationStage::ApplyRemoteDescription => "apply remote description",
            NegotiationStage::AttachTrack => "attach audio track",
            NegotiationStage::CreateAnswer => "create answer",
            NegotiationStage::ApplyLocalDescription => "apply local description",
        };
        f.write_str(stage)
    }
}

/// One failed negotiation, carrying the step and its underlying cause.
#[derive(Debug, thiserror::Error)]
#[error("failed to {stage}: {source}")]
pub struct NegotiationError {
    pub stage: NegotiationStage,
    #[source]
    pub source: TransportError,
}

impl NegotiationError {
    pub fn new(stage: NegotiationStage, source: TransportError) -> Self {
        Self { stage, source }
    }

    /// Adapter for `map_err` at each negotiation step.
    pub fn at(stage: NegotiationStage) -> impl FnOnce(TransportError) -> Self {
        move |source| Self::new(stage, source)
    }
}

/// A message could not be handed to one duplex connection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    #[error("connection is closed")]
    Closed,

    #[error("connection mailbox is full")]
    Backpressure,
}

/// A broadcast tick failed as a whole.
#[derive(Debug, thiserror::Error)]
pub enum LoopError {
    #[error("failed to encode timestamp payload: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Errors returned by HTTP handlers.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Negotiation(#[from] NegotiationError),

    #[error("Invalid offer: {0}")]
    InvalidOffer(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Status mapping:
/// - Negotiation/InvalidOffer/Internal → 500
/// - BadRequest → 400
/// - NotFound → 404
///
/// Every error body has the same shape:
/// ```json
/// { "error": "failed to apply remote description: ..." }
/// ```
impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Negotiation(_) | AppError::InvalidOffer(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({ "error": self.to_string() }))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(format!("JSON parsing error: {}", err))
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negotiation_error_message_names_stage_and_cause() {
        let err = NegotiationError::new(
            NegotiationStage::ApplyRemoteDescription,
            TransportError::Rejected("malformed sdp".to_string()),
        );
        assert_eq!(err.to_string(), "failed to apply remote description: malformed sdp");
    }

    #[test]
    fn test_app_error_status_codes() {
        let negotiation = AppError::from(NegotiationError::new(
            NegotiationStage::CreateAnswer,
            TransportError::Closed,
        ));
        assert_eq!(negotiation.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            AppError::InvalidOffer("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(AppError::BadRequest("x".into()).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::NotFound("x".into()).status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_media_not_found_lists_every_candidate() {
        let err = MediaError::NotFound {
            tried: vec![PathBuf::from("a/audio.wav"), PathBuf::from("a/audio.mp3")],
        };
        assert_eq!(
            err.to_string(),
            "no audio asset found (tried a/audio.wav, a/audio.mp3)"
        );
    }
}
