//! Campaign API Routes

use axum::{extract::State, http::StatusCode, Json};

use super::error::ApiError;
use crate::models::{CampaignRecord, CampaignRequest, DispatchRequest, DispatchResult};
use crate::AppState;

/// Handler for POST /api/campaigns
///
/// 201 with the new campaign, or 409 with the campaign that is still active.
pub async fn request_campaign(
    State(state): State<AppState>,
    Json(request): Json<CampaignRequest>,
) -> Result<(StatusCode, Json<CampaignRecord>), ApiError> {
    let campaign = state.admission.request_campaign(&request).await?;
    Ok((StatusCode::CREATED, Json(campaign)))
}

/// Handler for POST /api/campaigns/bulk-send
pub async fn bulk_send(
    State(state): State<AppState>,
    Json(request): Json<DispatchRequest>,
) -> Result<Json<DispatchResult>, ApiError> {
    let result = state.dispatch.dispatch(&request).await?;
    Ok(Json(result))
}
