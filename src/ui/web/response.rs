use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

use crate::{
    control::{ControlError, StepOutcome},
    service::{PeerInfo, ServiceError},
    wgconf::{Peer, WgConfig},
};

#[derive(Serialize)]
pub struct Message {
    pub message: &'static str,
}

#[derive(Serialize)]
pub struct Peers {
    pub peers: Vec<PeerInfo>,
}

#[derive(Serialize)]
pub struct Removed {
    pub removed: bool,
}

#[derive(Serialize)]
pub struct Managed<T> {
    pub status: &'static str,
    pub interface: String,
    pub output: T,
}

#[derive(Serialize)]
pub struct InterfaceInfo {
    pub name: String,
    pub address: String,
    pub listen_port: u16,
}

/// A config as the API shows it. The private key stays on disk.
#[derive(Serialize)]
pub struct ConfigInfo {
    pub interface: InterfaceInfo,
    pub peers: Vec<Peer>,
}

impl From<WgConfig> for ConfigInfo {
    fn from(c: WgConfig) -> Self {
        Self {
            interface: InterfaceInfo {
                name: c.interface.name,
                address: c.interface.address,
                listen_port: c.interface.listen_port,
            },
            peers: c.peers,
        }
    }
}

#[derive(Serialize)]
struct RestartFailure<'a> {
    stop: &'a StepOutcome,
    start: &'a StepOutcome,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: String,
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<RestartFailure<'a>>,
}

pub struct ApiError(pub ServiceError);

impl From<ServiceError> for ApiError {
    fn from(e: ServiceError) -> Self {
        Self(e)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self.0 {
            ServiceError::InvalidToken(_) | ServiceError::AccessDenied => StatusCode::UNAUTHORIZED,
            ServiceError::InvalidConfig(_) => StatusCode::BAD_REQUEST,
            ServiceError::PeerNotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::DuplicatePeer(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(kind = self.0.kind(), "request failed: {}", self.0);
        }

        let (error, output) = match &self.0 {
            ServiceError::CommandFailed(e @ ControlError::Restart { stop, start, .. }) => {
                (e.to_string(), Some(RestartFailure { stop, start }))
            }
            ServiceError::CommandFailed(e) => (format!("Command failed: {}", e.diagnostic()), None),
            e => (e.to_string(), None),
        };
        let body = ErrorBody {
            error,
            kind: self.0.kind(),
            output,
        };
        (status, Json(body)).into_response()
    }
}
