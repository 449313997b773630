use crate::api::schemas::SuccessResponse;
use crate::api::schemas::push_tokens::{NewTokenResponse, TokenRequest};
use crate::api::{AppState, parse_owner, parse_token_id};
use crate::domain::owner::OwnerId;
use crate::error::{AppError, Result};
use axum::{
    Json,
    extract::{Path, State},
};

/// Registers a push token for an owner.
///
/// # Errors
/// Returns `AppError::BadRequest` for an invalid owner id or token.
/// Returns `AppError::Conflict` if the token is already registered for this system.
pub async fn register_token<Id: OwnerId>(
    State(state): State<AppState<Id>>,
    Path(owner): Path<String>,
    Json(payload): Json<TokenRequest>,
) -> Result<Json<NewTokenResponse>> {
    let owner: Id = parse_owner(&owner)?;
    payload.validate().map_err(AppError::BadRequest)?;
    let id = state.push_token_service.register_token(&owner, payload.system, &payload.token).await?;
    Ok(Json(NewTokenResponse { id }))
}

/// Replaces a previously registered token.
///
/// # Errors
/// Returns `AppError::BadRequest` for invalid ids or token.
/// Returns `AppError::Conflict` if the token is already registered for this system.
pub async fn update_token<Id: OwnerId>(
    State(state): State<AppState<Id>>,
    Path((owner, token_id)): Path<(String, String)>,
    Json(payload): Json<TokenRequest>,
) -> Result<Json<SuccessResponse>> {
    let owner: Id = parse_owner(&owner)?;
    let token_id = parse_token_id(&token_id)?;
    payload.validate().map_err(AppError::BadRequest)?;
    let success = state.push_token_service.update_token(&owner, token_id, payload.system, &payload.token).await?;
    Ok(Json(SuccessResponse { success }))
}

/// Removes a registered token.
///
/// # Errors
/// Returns `AppError::BadRequest` for invalid ids.
pub async fn delete_token<Id: OwnerId>(
    State(state): State<AppState<Id>>,
    Path((owner, token_id)): Path<(String, String)>,
) -> Result<Json<SuccessResponse>> {
    let owner: Id = parse_owner(&owner)?;
    let token_id = parse_token_id(&token_id)?;
    let success = state.push_token_service.delete_token(&owner, token_id).await?;
    Ok(Json(SuccessResponse { success }))
}
