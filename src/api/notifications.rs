use crate::api::schemas::SuccessResponse;
use crate::api::{AppState, parse_owner};
use crate::domain::notification::NotificationDescriptor;
use crate::domain::owner::OwnerId;
use crate::error::{AppError, Result};
use axum::{
    Json,
    extract::{Path, State},
};

/// Sends a notification to every token of an owner.
///
/// `success` is true only if every provider accepted the notification.
///
/// # Errors
/// Returns `AppError::BadRequest` for an invalid owner id or notification.
/// Returns `AppError::Store` if the owner's tokens cannot be loaded.
pub async fn send_notification<Id: OwnerId>(
    State(state): State<AppState<Id>>,
    Path(owner): Path<String>,
    Json(notification): Json<NotificationDescriptor>,
) -> Result<Json<SuccessResponse>> {
    let owner: Id = parse_owner(&owner)?;
    notification.validate().map_err(AppError::BadRequest)?;
    let success = state.dispatcher.send_notification(&owner, &notification).await?;
    Ok(Json(SuccessResponse { success }))
}
