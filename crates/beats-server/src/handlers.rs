//! HTTP Handlers

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use beats_catalog::{
    Beat, BeatId, BeatWithLicenses, CatalogError, LibraryEntry, NewBeat, NewLicense,
};
use beats_media::{resolve_content_type, upload_key, MediaError, SignedUrl};
use beats_payments::{CheckoutRedirect, CheckoutStatus, PaymentError, WebhookOutcome, SIGNATURE_HEADER};

use crate::auth::CurrentBuyer;
use crate::state::{AppState, Payments};

type ApiResult<T> = Result<T, (StatusCode, Json<ErrorResponse>)>;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub stripe_configured: bool,
    pub storage_configured: bool,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
    #[serde(flatten)]
    pub outcome: WebhookOutcome,
}

#[derive(Debug, Deserialize)]
pub struct SuccessQuery {
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    #[serde(flatten)]
    pub status: CheckoutStatus,
    pub message: &'static str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresignRequest {
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub content_type: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresignResponse {
    pub signed_url: String,
    pub key: String,
    pub url: String,
    pub content_type: String,
    pub expires_at: chrono::DateTime<Utc>,
}

// ============================================================================
// Error mapping
// ============================================================================

fn error(status: StatusCode, code: &str, message: impl Into<String>) -> (StatusCode, Json<ErrorResponse>) {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
            code: code.into(),
        }),
    )
}

fn unauthorized() -> (StatusCode, Json<ErrorResponse>) {
    error(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", "Please sign in to continue.")
}

fn payment_failure(e: &PaymentError) -> (StatusCode, Json<ErrorResponse>) {
    let (status, code) = match e {
        PaymentError::Unauthorized => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
        PaymentError::BeatNotFound(_) => (StatusCode::NOT_FOUND, "BEAT_NOT_FOUND"),
        PaymentError::NoLicense(_) => (StatusCode::BAD_REQUEST, "NO_LICENSE"),
        PaymentError::InvalidPrice(_) => (StatusCode::BAD_REQUEST, "INVALID_PRICE"),
        PaymentError::Stripe(_) | PaymentError::Timeout(_) => {
            (StatusCode::BAD_GATEWAY, "PAYMENT_GATEWAY_ERROR")
        }
        PaymentError::WebhookSignature(_) => (StatusCode::BAD_REQUEST, "INVALID_SIGNATURE"),
        PaymentError::WebhookParse(_) => (StatusCode::BAD_REQUEST, "INVALID_PAYLOAD"),
        PaymentError::InvalidMetadata(_) => (StatusCode::BAD_REQUEST, "INVALID_METADATA"),
        PaymentError::Config(_) | PaymentError::Catalog(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
        }
    };
    error(status, code, e.user_message())
}

fn catalog_failure(e: &CatalogError) -> (StatusCode, Json<ErrorResponse>) {
    match e {
        CatalogError::Validation(_) => error(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", e.user_message()),
        _ => {
            tracing::error!(error = %e, "Catalog error");
            error(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", e.user_message())
        }
    }
}

fn media_failure(e: &MediaError) -> (StatusCode, Json<ErrorResponse>) {
    match e {
        MediaError::InvalidUpload(_) => error(StatusCode::BAD_REQUEST, "INVALID_UPLOAD", e.user_message()),
        MediaError::UnsupportedType(_) => {
            error(StatusCode::BAD_REQUEST, "UNSUPPORTED_TYPE", e.user_message())
        }
        MediaError::Config(_) | MediaError::Signing(_) => {
            tracing::error!(error = %e, "Storage error");
            error(StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR", e.user_message())
        }
    }
}

fn parse_beat_id(raw: &str) -> ApiResult<BeatId> {
    raw.parse()
        .map_err(|_| error(StatusCode::BAD_REQUEST, "INVALID_BEAT_ID", "Invalid beat ID."))
}

fn payments(state: &AppState) -> ApiResult<&Payments> {
    state.payments.as_ref().ok_or_else(|| {
        error(
            StatusCode::SERVICE_UNAVAILABLE,
            "PAYMENTS_DISABLED",
            "Payments not configured",
        )
    })
}

fn blobs(state: &AppState) -> ApiResult<&dyn beats_media::BlobStore> {
    state.blobs.as_deref().ok_or_else(|| {
        error(
            StatusCode::SERVICE_UNAVAILABLE,
            "STORAGE_DISABLED",
            "File storage not configured",
        )
    })
}

async fn published_beat(state: &AppState, beat_id: BeatId) -> ApiResult<BeatWithLicenses> {
    state
        .catalog
        .get_beat_with_licenses(beat_id)
        .await
        .map_err(|e| catalog_failure(&e))?
        .filter(|b| b.beat.is_published)
        .ok_or_else(|| error(StatusCode::NOT_FOUND, "BEAT_NOT_FOUND", "Beat not found."))
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        stripe_configured: state.payments.is_some(),
        storage_configured: state.blobs.is_some(),
    })
}

/// Published beats, newest first
pub async fn list_beats(State(state): State<AppState>) -> ApiResult<Json<Vec<Beat>>> {
    let beats = state
        .catalog
        .list_published_beats()
        .await
        .map_err(|e| catalog_failure(&e))?;
    Ok(Json(beats))
}

/// Publish a beat with a default standard license
pub async fn create_beat(
    State(state): State<AppState>,
    CurrentBuyer(seller): CurrentBuyer,
    Json(draft): Json<NewBeat>,
) -> ApiResult<(StatusCode, Json<BeatWithLicenses>)> {
    let seller = seller.ok_or_else(unauthorized)?;
    let license = NewLicense::standard(draft.price);

    let beat = state
        .catalog
        .create_beat(seller, draft, vec![license])
        .await
        .map_err(|e| catalog_failure(&e))?;

    tracing::info!(beat_id = %beat.beat.id, seller = %seller, "Beat published");
    Ok((StatusCode::CREATED, Json(beat)))
}

/// Start a hosted checkout for a beat
pub async fn purchase_beat(
    State(state): State<AppState>,
    CurrentBuyer(buyer): CurrentBuyer,
    Path(beat_id): Path<String>,
) -> ApiResult<Json<CheckoutRedirect>> {
    let beat_id = parse_beat_id(&beat_id)?;
    let payments = payments(&state)?;

    let redirect = payments.checkout.initiate(buyer, beat_id).await.map_err(|e| {
        match &e {
            PaymentError::Unauthorized | PaymentError::BeatNotFound(_) => {
                tracing::debug!(beat_id = %beat_id, error = %e, "Checkout refused");
            }
            _ => tracing::error!(beat_id = %beat_id, error = %e, "Checkout error"),
        }
        payment_failure(&e)
    })?;

    Ok(Json(redirect))
}

/// Stripe webhook handler
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<WebhookAck>> {
    let payments = payments(&state)?;
    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());

    let outcome = payments.webhooks.handle(&body, signature).await.map_err(|e| {
        match &e {
            PaymentError::WebhookSignature(_) => tracing::warn!(error = %e, "Webhook signature failed"),
            _ => tracing::error!(error = %e, "Webhook processing error"),
        }
        payment_failure(&e)
    })?;

    Ok(Json(WebhookAck {
        received: true,
        outcome,
    }))
}

/// Success page data. Always 200; the state says what happened.
pub async fn checkout_success(
    State(state): State<AppState>,
    CurrentBuyer(buyer): CurrentBuyer,
    Path(beat_id): Path<String>,
    Query(query): Query<SuccessQuery>,
) -> Json<StatusResponse> {
    let status = match (&state.payments, beat_id.parse::<BeatId>()) {
        (Some(payments), Ok(beat)) => {
            payments
                .status
                .resolve(query.session_id.as_deref(), beat, buyer)
                .await
        }
        (Some(_), Err(_)) => CheckoutStatus::Invalid,
        (None, _) => {
            tracing::warn!(beat_id = %beat_id, "Success page hit with payments disabled");
            CheckoutStatus::Unverifiable
        }
    };

    Json(StatusResponse {
        message: status.message(),
        status,
    })
}

/// The signed-in buyer's purchased beats
pub async fn library(
    State(state): State<AppState>,
    CurrentBuyer(buyer): CurrentBuyer,
) -> ApiResult<Json<Vec<LibraryEntry>>> {
    let buyer = buyer.ok_or_else(unauthorized)?;
    let entries = state
        .catalog
        .library_for_buyer(buyer)
        .await
        .map_err(|e| catalog_failure(&e))?;
    Ok(Json(entries))
}

/// Presigned URL for a direct-to-storage upload
pub async fn presign_upload(
    State(state): State<AppState>,
    CurrentBuyer(user): CurrentBuyer,
    Json(request): Json<PresignRequest>,
) -> ApiResult<Json<PresignResponse>> {
    let user = user.ok_or_else(unauthorized)?;
    let blobs = blobs(&state)?;

    let (Some(filename), Some(content_type)) = (
        request.filename.filter(|f| !f.trim().is_empty()),
        request.content_type.filter(|c| !c.trim().is_empty()),
    ) else {
        return Err(media_failure(&MediaError::InvalidUpload(
            "Filename and content type are required".into(),
        )));
    };

    let content_type = resolve_content_type(&filename, &content_type).map_err(|e| media_failure(&e))?;
    let key = upload_key(user, &filename, Utc::now());
    let signed = blobs
        .presign_upload(&key, &content_type)
        .map_err(|e| media_failure(&e))?;

    tracing::info!(user = %user, key = %key, content_type = %content_type, "Presigned upload");

    Ok(Json(PresignResponse {
        signed_url: signed.url,
        url: blobs.object_url(&key),
        key,
        content_type,
        expires_at: signed.expires_at,
    }))
}

/// Signed audio URL for previews
pub async fn preview_beat(
    State(state): State<AppState>,
    Path(beat_id): Path<String>,
) -> ApiResult<Json<SignedUrl>> {
    let beat_id = parse_beat_id(&beat_id)?;
    let blobs = blobs(&state)?;
    let beat = published_beat(&state, beat_id).await?;

    let signed = blobs
        .presign_download(&beat.beat.audio_key)
        .map_err(|e| media_failure(&e))?;
    Ok(Json(signed))
}

/// Signed audio URL for a buyer who owns the beat
pub async fn download_beat(
    State(state): State<AppState>,
    CurrentBuyer(buyer): CurrentBuyer,
    Path(beat_id): Path<String>,
) -> ApiResult<Json<SignedUrl>> {
    let beat_id = parse_beat_id(&beat_id)?;
    let buyer = buyer.ok_or_else(unauthorized)?;
    let blobs = blobs(&state)?;

    let beat = state
        .catalog
        .get_beat_with_licenses(beat_id)
        .await
        .map_err(|e| catalog_failure(&e))?
        .ok_or_else(|| error(StatusCode::NOT_FOUND, "BEAT_NOT_FOUND", "Beat not found."))?;

    let owned = state
        .catalog
        .has_completed_purchase(buyer, beat_id)
        .await
        .map_err(|e| catalog_failure(&e))?;
    if !owned {
        return Err(error(
            StatusCode::FORBIDDEN,
            "NOT_PURCHASED",
            "Purchase this beat to download it.",
        ));
    }

    let signed = blobs
        .presign_download(&beat.beat.audio_key)
        .map_err(|e| media_failure(&e))?;

    tracing::info!(beat_id = %beat_id, buyer = %buyer, "Download link issued");
    Ok(Json(signed))
}
