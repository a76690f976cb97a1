use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use ibex_consensus::ConsensusError;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Consensus error: {0}")]
    Consensus(#[from] ConsensusError),
}

impl IntoResponse for RpcError {
    fn into_response(self) -> Response {
        let status = match &self {
            RpcError::NotFound(_) => StatusCode::NOT_FOUND,
            RpcError::Consensus(ConsensusError::EngineStopped) => StatusCode::SERVICE_UNAVAILABLE,
            RpcError::Consensus(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = json!({
            "error": self.to_string()
        });

        (status, axum::Json(body)).into_response()
    }
}
