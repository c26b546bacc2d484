//! HTTP request handlers
//!
//! Covers account registration and login, QR pairing session endpoints,
//! and device management.

use axum::{
    extract::{Path as AxumPath, Query, State},
    http::{header, HeaderMap, StatusCode},
    routing::{delete, get, post},
    Json, Router,
};
use qrlink_auth::{Account, AccountInfo, CredentialError};
use qrlink_pairing::{DeviceLinkInfo, PairingCompleteResponse, PairingError, PairingStartResponse};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::error;

use crate::state::AppState;

/// Create the main application router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // API index
        .route("/", get(index_handler))
        // Account API
        .route("/auth/register", post(register_handler))
        .route("/auth/login", post(login_handler))
        .route("/auth/me", get(me_handler))
        // Pairing API
        .route("/qr/generate", post(qr_generate_handler))
        .route("/qr/status", get(qr_status_handler))
        .route("/qr/scan", post(qr_scan_handler))
        // Device management API
        .route("/devices", get(list_devices_handler))
        .route("/devices/:id", delete(revoke_device_handler))
        // Pairing notification stream
        .route("/pair/:session_id", get(crate::websocket::pair_ws_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Extract a bearer token from the Authorization header
fn extract_bearer(headers: &HeaderMap) -> Option<String> {
    let auth = headers.get(header::AUTHORIZATION)?;
    let auth_str = auth.to_str().ok()?;
    auth_str.strip_prefix("Bearer ").map(|t| t.to_string())
}

/// Resolve the caller's account from the Authorization header
async fn require_account(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<Account, (StatusCode, String)> {
    let token = extract_bearer(headers).ok_or((
        StatusCode::UNAUTHORIZED,
        "Authentication required".to_string(),
    ))?;

    state
        .authenticate_bearer(&token)
        .await
        .map_err(|e| (StatusCode::UNAUTHORIZED, e.to_string()))
}

// ============================================================================
// Account Handlers
// ============================================================================

/// Request to register a new account
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// Register a new account
async fn register_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RegisterRequest>,
) -> Result<Json<AccountInfo>, (StatusCode, String)> {
    state
        .credentials
        .register(&request.username, &request.email, &request.password)
        .await
        .map(Json)
        .map_err(|e| match e {
            CredentialError::DuplicateIdentity => (StatusCode::BAD_REQUEST, e.to_string()),
            other => {
                error!("Registration failed: {}", other);
                (StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
            }
        })
}

/// Request to log in
#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Response after a successful login
#[derive(Debug, Clone, Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
    pub user: AccountInfo,
}

/// Authenticate and issue a login token
async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, (StatusCode, String)> {
    let account = state
        .credentials
        .authenticate(&request.username, &request.password)
        .await
        .map_err(|e| match e {
            CredentialError::InvalidCredentials => (StatusCode::UNAUTHORIZED, e.to_string()),
            other => {
                error!("Login failed: {}", other);
                (StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
            }
        })?;

    let access_token = state
        .credentials
        .issue_token(&account, Some(state.config.token_ttl()))
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(Json(LoginResponse {
        access_token,
        token_type: "bearer".to_string(),
        user: AccountInfo::from(&account),
    }))
}

/// Return the calling account's public profile
async fn me_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<AccountInfo>, (StatusCode, String)> {
    let account = require_account(&state, &headers).await?;
    Ok(Json(AccountInfo::from(&account)))
}

// ============================================================================
// Pairing Handlers
// ============================================================================

/// Request to start a pairing session
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QrGenerateRequest {
    /// Label for the device requesting the pairing
    #[serde(default)]
    pub device_info: Option<String>,
}

/// Start a pairing session and return its QR code
async fn qr_generate_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<QrGenerateRequest>,
) -> Result<Json<PairingStartResponse>, (StatusCode, String)> {
    state
        .orchestrator
        .start_pairing(request.device_info)
        .await
        .map(Json)
        .map_err(|e| {
            error!("QR generation failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })
}

#[derive(Debug, Deserialize)]
pub struct SessionQuery {
    session_id: String,
}

/// Response for pairing session status checks
#[derive(Debug, Serialize)]
pub struct QrStatusResponse {
    /// Whether the session exists and is still redeemable
    pub valid: bool,
    /// Seconds remaining until expiration
    pub expires_in: i64,
}

/// Check pairing session status, for countdown rendering
async fn qr_status_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SessionQuery>,
) -> Json<QrStatusResponse> {
    match state.sessions.get(&query.session_id).await {
        Ok(session) => Json(QrStatusResponse {
            valid: !session.redeemed && !session.is_expired(),
            expires_in: session.remaining_secs(),
        }),
        Err(_) => Json(QrStatusResponse {
            valid: false,
            expires_in: 0,
        }),
    }
}

/// Request to redeem a scanned pairing session
#[derive(Debug, Clone, Deserialize)]
pub struct ScanRequest {
    pub session_id: String,
}

/// Redeem a pairing session for the calling account
async fn qr_scan_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<ScanRequest>,
) -> Result<Json<PairingCompleteResponse>, (StatusCode, String)> {
    let account = require_account(&state, &headers).await?;

    state
        .orchestrator
        .complete_pairing(&request.session_id, &account)
        .await
        .map(Json)
        .map_err(|e| match e {
            PairingError::NotFound => (StatusCode::NOT_FOUND, e.to_string()),
            PairingError::Expired | PairingError::AlreadyUsed => {
                (StatusCode::BAD_REQUEST, e.to_string())
            }
            other => {
                error!("Pairing completion failed: {}", other);
                (StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
            }
        })
}

// ============================================================================
// Device Management Handlers
// ============================================================================

/// List the calling account's active devices
async fn list_devices_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<DeviceLinkInfo>>, (StatusCode, String)> {
    let account = require_account(&state, &headers).await?;

    let devices = state.devices.list_active(&account.id).await;
    let infos: Vec<DeviceLinkInfo> = devices.iter().map(DeviceLinkInfo::from).collect();
    Ok(Json(infos))
}

/// Revoke (unlink) one of the calling account's devices
async fn revoke_device_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<String>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let account = require_account(&state, &headers).await?;

    state
        .devices
        .revoke(&account.id, &id)
        .await
        .map(|_| Json(serde_json::json!({ "message": "Device revoked successfully" })))
        .map_err(|e| match e {
            qrlink_pairing::DeviceError::NotFound(_) => (StatusCode::NOT_FOUND, e.to_string()),
            other => {
                error!("Device revocation failed: {}", other);
                (StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
            }
        })
}

// ============================================================================
// API Index
// ============================================================================

/// Describe the API surface
async fn index_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "message": "qrlink pairing API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "register": "/auth/register",
            "login": "/auth/login",
            "me": "/auth/me",
            "generate_qr": "/qr/generate",
            "qr_status": "/qr/status",
            "scan_qr": "/qr/scan",
            "devices": "/devices",
            "notifications": "/pair/{session_id}"
        }
    }))
}
