//! Delivery agent linking handlers

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use shared::DeliveryAgent;
use uuid::Uuid;

use crate::error::AppResult;
use crate::services::AgentLinker;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct LinkAgentRequest {
    pub user_id: Uuid,
    pub bin_id: Uuid,
}

pub async fn link_agent(
    State(state): State<AppState>,
    Path(agent_id): Path<Uuid>,
    Json(body): Json<LinkAgentRequest>,
) -> AppResult<Json<DeliveryAgent>> {
    let agent = state
        .linker()
        .link(agent_id, body.user_id, body.bin_id)
        .await?;
    Ok(Json(agent))
}

pub async fn activate_agent(
    State(state): State<AppState>,
    Path(agent_id): Path<Uuid>,
) -> AppResult<Json<DeliveryAgent>> {
    let agent = state.linker().activate(agent_id).await?;
    Ok(Json(agent))
}

pub async fn deactivate_agent(
    State(state): State<AppState>,
    Path(agent_id): Path<Uuid>,
) -> AppResult<Json<DeliveryAgent>> {
    let agent = state.linker().deactivate(agent_id).await?;
    Ok(Json(agent))
}
