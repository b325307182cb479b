//! Payment handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use tracing::{info, instrument};

use core_kernel::{MinorUnits, OperationMetadata, UnitRef};
use domain_billing::UnifiedPreview;

use crate::auth::{permissions, require_role, Claims};
use crate::dto::payments::{CommitRequest, CommitResponse, PreviewRequest};
use crate::error::ApiError;
use crate::middleware::RequestContext;
use crate::AppState;

fn unit_from_path(client_id: &str, unit_id: &str) -> Result<UnitRef, ApiError> {
    UnitRef::parse(client_id, unit_id).map_err(|e| ApiError::Validation(e.to_string()))
}

/// Previews how a payment would be distributed, or a statement without an amount
#[instrument(skip(state, claims, request))]
pub async fn preview_payment(
    State(state): State<AppState>,
    Path((client_id, unit_id)): Path<(String, String)>,
    Extension(claims): Extension<Claims>,
    Json(request): Json<PreviewRequest>,
) -> Result<Json<UnifiedPreview>, ApiError> {
    require_role(&claims, permissions::PAYMENT_PREVIEW)?;
    let unit = unit_from_path(&client_id, &unit_id)?;

    let amount = request
        .amount
        .map(|major| MinorUnits::from_major(major, state.config.currency))
        .transpose()
        .map_err(|e| ApiError::Validation(e.to_string()))?;
    let as_of = request
        .as_of_date
        .unwrap_or_else(|| state.config.timezone.today());

    let preview = state.engine.preview(&unit, amount, as_of).await?;
    Ok(Json(preview))
}

/// Re-verifies an accepted preview and records the payment
#[instrument(skip(state, claims, context, request))]
pub async fn commit_payment(
    State(state): State<AppState>,
    Path((client_id, unit_id)): Path<(String, String)>,
    Extension(claims): Extension<Claims>,
    Extension(context): Extension<RequestContext>,
    Json(request): Json<CommitRequest>,
) -> Result<(StatusCode, Json<CommitResponse>), ApiError> {
    require_role(&claims, permissions::PAYMENT_COMMIT)?;
    let unit = unit_from_path(&client_id, &unit_id)?;
    if request.preview.unit != unit {
        return Err(ApiError::Validation(format!(
            "preview is for unit {}, not {}",
            request.preview.unit, unit
        )));
    }

    let metadata = OperationMetadata::with_correlation_id(context.correlation_id)
        .initiated_by(claims.sub.as_str())
        .with_context("channel", request.payment.method.as_str());

    let result = state
        .guard
        .verify_and_commit(&request.preview, request.payment, Some(metadata))
        .await?;

    info!(transaction_id = %result.transaction_id, "Payment recorded");
    Ok((
        StatusCode::CREATED,
        Json(CommitResponse::new(result, state.config.currency)),
    ))
}
