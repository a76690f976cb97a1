use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use ibex_consensus::{ConsensusError, CoreStatus, EngineHandle};
use serde::Serialize;

use crate::error::RpcError;
use crate::ws::EventBroadcaster;

/// Application state shared with handlers
pub struct AppState {
    /// Engines whose status is served; `/status` reports the first one
    pub engines: Vec<EngineHandle>,
    pub broadcaster: Arc<EventBroadcaster>,
}

impl AppState {
    fn engine(&self, index: usize) -> Result<&EngineHandle, RpcError> {
        let handle = self
            .engines
            .get(index)
            .ok_or_else(|| RpcError::NotFound(format!("validator {}", index)))?;
        if handle.sender().is_closed() {
            return Err(ConsensusError::EngineStopped.into());
        }
        Ok(handle)
    }
}

// Response types

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub validators: usize,
    pub running: usize,
}

#[derive(Debug, Serialize)]
pub struct CheckpointResponse {
    pub validator: String,
    pub sequence: u64,
    pub round: u64,
}

// Handlers

/// GET /health - Liveness of the served engines
pub async fn get_health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let running = state
        .engines
        .iter()
        .filter(|h| !h.sender().is_closed())
        .count();

    Json(HealthResponse {
        status: if running == state.engines.len() { "ok" } else { "degraded" },
        validators: state.engines.len(),
        running,
    })
}

/// GET /status - Consensus status of the first validator
pub async fn get_status(State(state): State<Arc<AppState>>) -> Result<Json<CoreStatus>, RpcError> {
    Ok(Json(state.engine(0)?.status()))
}

/// GET /status/{index} - Consensus status of one validator
pub async fn get_validator_status(
    State(state): State<Arc<AppState>>,
    Path(index): Path<usize>,
) -> Result<Json<CoreStatus>, RpcError> {
    Ok(Json(state.engine(index)?.status()))
}

/// GET /checkpoint - Latest stable checkpoint of the first validator
pub async fn get_checkpoint(
    State(state): State<Arc<AppState>>,
) -> Result<Json<CheckpointResponse>, RpcError> {
    let status = state.engine(0)?.status();
    let view = status
        .stable_checkpoint
        .ok_or_else(|| RpcError::NotFound("stable checkpoint".to_string()))?;

    Ok(Json(CheckpointResponse {
        validator: status.address,
        sequence: view.sequence,
        round: view.round,
    }))
}
