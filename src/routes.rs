//! HTTP surface of the claim lifecycle, mounted under `/api/qr`.
//!
//! Handlers stay thin: decode the request, call the service, wrap the result
//! in the `{"success": …}` envelope. Required body fields arrive as options
//! and are rejected by the service before any store interaction.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{FromRequest, Path, Request, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::{
    claims::{LooseLocation, MintEntry},
    error::AppError,
    state::AppState,
};

/// JSON body extractor that reports unparseable payloads as a plain 400
/// instead of axum's default rejection.
pub struct BodyJson<T>(pub T);

impl<S, T> FromRequest<S> for BodyJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(_) => Err(AppError::MalformedPayload),
        }
    }
}

pub fn qr_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/save", post(save_handler))
        .route("/unclaimed", get(unclaimed_handler))
        .route("/claim", post(claim_handler))
        .route("/details/{value}", get(details_handler))
        .route("/user/{user_id}", get(user_handler))
        .route("/all", get(all_handler))
        .route("/validate", post(validate_handler))
        .route("/assign/{user_id}/{value}", post(assign_handler))
        .route("/{key}", post(assign_by_value_handler).delete(delete_handler))
        .route("/{key}/path", post(path_handler))
}

#[derive(Deserialize)]
pub struct MintRequest {
    #[serde(rename = "qrCodes")]
    qr_codes: Option<Vec<MintEntry>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimRequest {
    qr_id: Option<String>,
    purpose: Option<String>,
    user_id: Option<String>,
    location: Option<LooseLocation>,
}

#[derive(Deserialize)]
pub struct ValidateRequest {
    #[serde(rename = "qrValue", alias = "value")]
    qr_value: Option<String>,
    #[serde(rename = "userId")]
    user_id: Option<String>,
}

#[derive(Deserialize)]
pub struct PointBody {
    lat: Option<f64>,
    lng: Option<f64>,
}

async fn save_handler(
    State(state): State<Arc<AppState>>,
    BodyJson(payload): BodyJson<MintRequest>,
) -> Result<impl IntoResponse, AppError> {
    let created = state
        .claims
        .mint_batch(payload.qr_codes.unwrap_or_default())
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "qrCodes": created })),
    ))
}

async fn unclaimed_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let codes = state.claims.unclaimed().await?;
    Ok(Json(json!({ "success": true, "qrCodes": codes })))
}

async fn claim_handler(
    State(state): State<Arc<AppState>>,
    BodyJson(payload): BodyJson<ClaimRequest>,
) -> Result<impl IntoResponse, AppError> {
    let claimed = state
        .claims
        .claim(
            payload.qr_id.as_deref().unwrap_or_default(),
            payload.purpose.as_deref().unwrap_or_default(),
            payload.user_id.as_deref().unwrap_or_default(),
            payload.location,
        )
        .await?;
    Ok(Json(json!({ "success": true, "qrCode": claimed })))
}

async fn details_handler(
    State(state): State<Arc<AppState>>,
    Path(value): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let code = state.claims.details(&value).await?;
    Ok(Json(json!({ "success": true, "qrCode": code })))
}

async fn user_handler(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let codes = state.claims.for_user(&user_id).await?;
    Ok(Json(json!({ "success": true, "qrCodes": codes })))
}

async fn all_handler(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, AppError> {
    let codes = state.claims.all().await?;
    Ok(Json(json!({ "success": true, "qrCodes": codes })))
}

async fn delete_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    state.claims.delete(&id).await?;
    Ok(Json(json!({ "success": true, "message": "QR code deleted" })))
}

async fn validate_handler(
    State(state): State<Arc<AppState>>,
    BodyJson(payload): BodyJson<ValidateRequest>,
) -> Result<impl IntoResponse, AppError> {
    state
        .claims
        .validate_ownership(
            payload.qr_value.as_deref().unwrap_or_default(),
            payload.user_id.as_deref().unwrap_or_default(),
        )
        .await?;
    Ok(Json(
        json!({ "success": true, "message": "QR code is valid for this user." }),
    ))
}

async fn assign_handler(
    State(state): State<Arc<AppState>>,
    Path((user_id, value)): Path<(String, String)>,
    BodyJson(payload): BodyJson<PointBody>,
) -> Result<impl IntoResponse, AppError> {
    let assigned = state
        .claims
        .assign_to_user(&user_id, &value, payload.lat, payload.lng)
        .await?;
    Ok(Json(json!({ "success": true, "qrCode": assigned })))
}

async fn assign_by_value_handler(
    State(state): State<Arc<AppState>>,
    Path(value): Path<String>,
    BodyJson(payload): BodyJson<PointBody>,
) -> Result<impl IntoResponse, AppError> {
    let assigned = state
        .claims
        .assign_by_value(&value, payload.lat, payload.lng)
        .await?;
    Ok(Json(json!({ "success": true, "qrCode": assigned })))
}

async fn path_handler(
    State(state): State<Arc<AppState>>,
    Path(value): Path<String>,
    BodyJson(payload): BodyJson<PointBody>,
) -> Result<impl IntoResponse, AppError> {
    let updated = state
        .claims
        .append_path(&value, payload.lat, payload.lng)
        .await?;
    Ok(Json(json!({ "success": true, "qrCode": updated })))
}
