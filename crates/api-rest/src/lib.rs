//! # API REST
//!
//! HTTP surface for the asset store.
//!
//! Handles:
//! - `GET /assets/*file_id`: the public asset handler, answered by
//!   [`AssetStore::get_response_for`]
//! - `/admin/*`: session grants and visibility changes, guarded by an `x-api-key` header
//! - OpenAPI/Swagger documentation
//!
//! The router is built by [`app`] so the workspace binaries and tests share one definition.

use assets_core::{
    assets_config_from_env, AssetError, AssetResponse, AssetStore, InMemoryRecordStore,
    RecordStore, ResponseBody, SessionId,
};
use axum::{
    body::{Body, Bytes},
    extract::{Path as AxumPath, State},
    http::{header::HeaderName, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::cors::CorsLayer;
use utoipa::{OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;

/// Header carrying the caller's session ID.
pub const SESSION_HEADER: &str = "x-asset-session";

/// Cookie consulted when [`SESSION_HEADER`] is absent.
pub const SESSION_COOKIE: &str = "asset_session";

pub const API_KEY_HEADER: &str = "x-api-key";

const STREAM_CHUNK_BYTES: usize = 64 * 1024;
const STREAM_BUFFERED_CHUNKS: usize = 4;

/// Application state shared by every handler.
#[derive(Clone)]
pub struct AppState {
    store: Arc<AssetStore>,
    /// Key the admin routes expect. `None` disables the admin API.
    api_key: Option<String>,
}

impl AppState {
    pub fn new(store: Arc<AssetStore>, api_key: Option<String>) -> Self {
        Self { store, api_key }
    }

    /// Build the state from the process environment.
    ///
    /// Reads the `ASSETS_*` store settings, `ASSETS_RECORDS_FILE` (optional JSON record store
    /// used for soft resolution) and `API_KEY`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the storage roots cannot be created,
    /// or the records file exists but cannot be read.
    pub fn from_env() -> anyhow::Result<Self> {
        let config = assets_config_from_env()?;

        let records = match std::env::var("ASSETS_RECORDS_FILE").ok().map(PathBuf::from) {
            Some(path) if path.exists() => {
                tracing::info!("Loading file records from {}", path.display());
                let records: Arc<dyn RecordStore> = Arc::new(InMemoryRecordStore::load_json(&path)?);
                Some(records)
            }
            Some(path) => {
                tracing::warn!("Records file {} not found; soft resolution disabled", path.display());
                None
            }
            None => None,
        };

        let store = AssetStore::from_config(config, records)?;
        let api_key = std::env::var("API_KEY").ok().filter(|key| !key.is_empty());
        if api_key.is_none() {
            tracing::warn!("API_KEY not set; admin routes are disabled");
        }
        Ok(Self::new(Arc::new(store), api_key))
    }

    pub fn store(&self) -> &Arc<AssetStore> {
        &self.store
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthRes {
    pub ok: bool,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct GrantReq {
    pub session: String,
    pub filename: String,
    pub hash: String,
    /// Remove the grant instead of adding it.
    #[serde(default)]
    pub revoke: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct GrantRes {
    pub granted: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct VisibilityReq {
    pub filename: String,
    pub hash: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct VisibilityRes {
    /// Number of stored files (original plus variants) that changed filesystem.
    pub moved: usize,
}

#[derive(OpenApi)]
#[openapi(
    paths(health, serve_asset, grant, publish, protect),
    components(schemas(HealthRes, GrantReq, GrantRes, VisibilityReq, VisibilityRes))
)]
struct ApiDoc;

/// Build the REST router with Swagger UI and permissive CORS.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/assets/*file_id", get(serve_asset))
        .route("/admin/grants", post(grant))
        .route("/admin/publish", post(publish))
        .route("/admin/protect", post(protect))
        .merge(SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Health check endpoint for monitoring and load balancers.
#[axum::debug_handler]
async fn health(State(_state): State<AppState>) -> Json<HealthRes> {
    Json(HealthRes {
        ok: true,
        message: "Assets REST API is alive".into(),
    })
}

#[utoipa::path(
    get,
    path = "/assets/{file_id}",
    params(
        ("file_id" = String, Path, description = "File ID relative to the asset root")
    ),
    responses(
        (status = 200, description = "File content"),
        (status = 301, description = "Redirect to the current URL of a stale file ID"),
        (status = 403, description = "Protected file the session may not view (debug mode)"),
        (status = 404, description = "Not found, or protected and not granted")
    )
)]
/// Serve a file ID the way the asset handler would.
///
/// The session is taken from the `x-asset-session` header, else the `asset_session` cookie.
/// Store access runs on the blocking pool because the filesystems are synchronous.
#[axum::debug_handler]
async fn serve_asset(
    State(state): State<AppState>,
    AxumPath(file_id): AxumPath<String>,
    headers: HeaderMap,
) -> Result<Response, (StatusCode, &'static str)> {
    let session = session_from_headers(&headers);
    let store = Arc::clone(&state.store);

    let result =
        tokio::task::spawn_blocking(move || store.get_response_for(session.as_ref(), &file_id))
            .await;

    match result {
        Ok(Ok(response)) => into_http_response(response),
        Ok(Err(e)) => {
            tracing::error!("Serve asset error: {:?}", e);
            Err((StatusCode::INTERNAL_SERVER_ERROR, "Internal error"))
        }
        Err(e) => {
            tracing::error!("Serve asset task failed: {:?}", e);
            Err((StatusCode::INTERNAL_SERVER_ERROR, "Internal error"))
        }
    }
}

#[utoipa::path(
    post,
    path = "/admin/grants",
    request_body = GrantReq,
    responses(
        (status = 200, description = "Grant state after the change", body = GrantRes),
        (status = 400, description = "Bad request"),
        (status = 401, description = "Invalid API key")
    )
)]
/// Grant (or revoke) a session's access to a protected file.
#[axum::debug_handler]
async fn grant(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<GrantReq>,
) -> Result<Json<GrantRes>, (StatusCode, &'static str)> {
    require_api_key(&state, &headers)?;

    let session = match SessionId::new(&req.session) {
        Ok(session) => session,
        Err(e) => {
            tracing::error!("Invalid session: {:?}", e);
            return Err((StatusCode::BAD_REQUEST, "Invalid session"));
        }
    };

    if req.revoke {
        state.store.revoke(&session, &req.filename, &req.hash);
    } else {
        state
            .store
            .grant(&session, &req.filename, &req.hash)
            .map_err(|e| error_status("Grant", e))?;
    }
    Ok(Json(GrantRes {
        granted: state.store.is_granted(&session, &req.filename, &req.hash),
    }))
}

#[utoipa::path(
    post,
    path = "/admin/publish",
    request_body = VisibilityReq,
    responses(
        (status = 200, description = "Files moved to the public store", body = VisibilityRes),
        (status = 401, description = "Invalid API key")
    )
)]
/// Move a file and its variants to the public store.
#[axum::debug_handler]
async fn publish(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<VisibilityReq>,
) -> Result<Json<VisibilityRes>, (StatusCode, &'static str)> {
    require_api_key(&state, &headers)?;
    let store = Arc::clone(&state.store);
    let moved = tokio::task::spawn_blocking(move || store.publish(&req.filename, &req.hash))
        .await
        .map_err(|e| {
            tracing::error!("Publish task failed: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
        })?
        .map_err(|e| error_status("Publish", e))?;
    Ok(Json(VisibilityRes { moved }))
}

#[utoipa::path(
    post,
    path = "/admin/protect",
    request_body = VisibilityReq,
    responses(
        (status = 200, description = "Files moved to the protected store", body = VisibilityRes),
        (status = 401, description = "Invalid API key")
    )
)]
/// Move a file and its variants to the protected store.
#[axum::debug_handler]
async fn protect(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<VisibilityReq>,
) -> Result<Json<VisibilityRes>, (StatusCode, &'static str)> {
    require_api_key(&state, &headers)?;
    let store = Arc::clone(&state.store);
    let moved = tokio::task::spawn_blocking(move || store.protect(&req.filename, &req.hash))
        .await
        .map_err(|e| {
            tracing::error!("Protect task failed: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
        })?
        .map_err(|e| error_status("Protect", e))?;
    Ok(Json(VisibilityRes { moved }))
}

/// Compare the `x-api-key` header with the key configured at startup.
fn require_api_key(state: &AppState, headers: &HeaderMap) -> Result<(), (StatusCode, &'static str)> {
    let Some(expected) = state.api_key.as_deref() else {
        tracing::error!("Admin request rejected: API_KEY not configured");
        return Err((StatusCode::SERVICE_UNAVAILABLE, "Admin API disabled"));
    };
    let provided = headers
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok());
    if provided == Some(expected) {
        Ok(())
    } else {
        Err((StatusCode::UNAUTHORIZED, "Invalid API key"))
    }
}

fn error_status(action: &str, e: AssetError) -> (StatusCode, &'static str) {
    tracing::error!("{} error: {:?}", action, e);
    match e {
        AssetError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "Bad request"),
        e if e.is_not_found() => (StatusCode::NOT_FOUND, "Asset not found"),
        AssetError::FileAlreadyExists(_) => (StatusCode::CONFLICT, "File already exists"),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "Internal error"),
    }
}

/// Session from the `x-asset-session` header, else from the `asset_session` cookie.
pub fn session_from_headers(headers: &HeaderMap) -> Option<SessionId> {
    if let Some(value) = headers.get(SESSION_HEADER).and_then(|v| v.to_str().ok()) {
        return SessionId::new(value).ok();
    }
    headers
        .get_all(axum::http::header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .and_then(|(_, value)| SessionId::new(value).ok())
}

/// Pump a blocking reader into a bounded channel from the blocking pool.
///
/// The receiver ends the stream after EOF or the first read error; a dropped receiver stops
/// the reader.
fn stream_reader(mut reader: Box<dyn Read + Send>) -> ReceiverStream<std::io::Result<Bytes>> {
    let (tx, rx) = mpsc::channel(STREAM_BUFFERED_CHUNKS);
    tokio::task::spawn_blocking(move || {
        let mut buf = vec![0u8; STREAM_CHUNK_BYTES];
        loop {
            match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    if tx.blocking_send(Ok(Bytes::copy_from_slice(&buf[..n]))).is_err() {
                        break;
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::error!("Asset stream read error: {:?}", e);
                    let _ = tx.blocking_send(Err(e));
                    break;
                }
            }
        }
    });
    ReceiverStream::new(rx)
}

fn into_http_response(response: AssetResponse) -> Result<Response, (StatusCode, &'static str)> {
    let status = StatusCode::from_u16(response.status).map_err(|e| {
        tracing::error!("Invalid response status: {:?}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
    })?;

    let body = match response.body {
        ResponseBody::Empty => Body::empty(),
        ResponseBody::Stream(reader) => Body::from_stream(stream_reader(reader)),
    };
    let mut http = (status, body).into_response();
    for (name, value) in response.headers {
        let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(&value),
        ) else {
            tracing::warn!("Dropping unrepresentable header {}", name);
            continue;
        };
        http.headers_mut().insert(name, value);
    }
    Ok(http)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assets_core::{AssetsConfig, FileRecord, Stage, WriteConfig};
    use axum::http::Request;
    use tempfile::TempDir;
    use tower::ServiceExt;

    const KEY: &str = "secret";

    fn create_state(temp: &TempDir) -> AppState {
        let config = AssetsConfig::new(temp.path().join("public"), temp.path().join("protected"));
        let store = AssetStore::from_config(config, None).unwrap();
        AppState::new(Arc::new(store), Some(KEY.into()))
    }

    async fn body_bytes(response: Response) -> Vec<u8> {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }

    fn publish_request(key: Option<&str>, filename: &str, hash: &str) -> Request<Body> {
        let mut builder = Request::post("/admin/publish").header("content-type", "application/json");
        if let Some(key) = key {
            builder = builder.header(API_KEY_HEADER, key);
        }
        let body = serde_json::to_vec(&VisibilityReq {
            filename: filename.into(),
            hash: hash.into(),
        })
        .unwrap();
        builder.body(Body::from(body)).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let temp = TempDir::new().unwrap();
        let response = app(create_state(&temp))
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let health: HealthRes = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert!(health.ok);
    }

    #[tokio::test]
    async fn test_serves_public_file() {
        let temp = TempDir::new().unwrap();
        let state = create_state(&temp);
        let tuple = state
            .store()
            .set_from_string("A", "folder/sam.txt", None, None, WriteConfig::new())
            .unwrap();
        let file_id = format!("folder/{}/sam.txt", &tuple.hash[..10]);

        let response = app(state)
            .oneshot(
                Request::get(format!("/assets/{file_id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["content-type"], "text/plain");
        assert_eq!(body_bytes(response).await, b"A");
    }

    #[tokio::test]
    async fn test_stale_path_redirects() {
        let temp = TempDir::new().unwrap();
        let records = Arc::new(InMemoryRecordStore::new());
        let mut record = FileRecord::new("sam.txt", "6dcd4ce23d88e2ee9568ba546c007c63d9131c1b");
        record.was_published = true;
        records.save(Stage::Live, record).unwrap();
        let records: Arc<dyn RecordStore> = records;
        let config = AssetsConfig::new(temp.path().join("public"), temp.path().join("protected"));
        let store = AssetStore::from_config(config, Some(records)).unwrap();
        store
            .set_from_string("A", "sam.txt", None, None, WriteConfig::new())
            .unwrap();

        let response = app(AppState::new(Arc::new(store), None))
            .oneshot(Request::get("/assets/sam.txt").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(response.headers()["location"], "/assets/6dcd4ce23d/sam.txt");
    }

    #[tokio::test]
    async fn test_missing_file_is_404() {
        let temp = TempDir::new().unwrap();
        let response = app(create_state(&temp))
            .oneshot(
                Request::get("/assets/nothing/here.jpg")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_protected_file_needs_session_grant() {
        let temp = TempDir::new().unwrap();
        let state = create_state(&temp);
        let tuple = state
            .store()
            .set_from_string("A", "sam.txt", None, None, WriteConfig::new())
            .unwrap();
        state.store().protect("sam.txt", &tuple.hash).unwrap();
        let path = format!("/assets/{}/sam.txt", &tuple.hash[..10]);
        let router = app(state.clone());

        let denied = router
            .clone()
            .oneshot(Request::get(&path).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(denied.status(), StatusCode::NOT_FOUND);

        let session = SessionId::new("abc").unwrap();
        state.store().grant(&session, "sam.txt", &tuple.hash).unwrap();
        let allowed = router
            .oneshot(
                Request::get(&path)
                    .header("cookie", "theme=dark; asset_session=abc")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(allowed.status(), StatusCode::OK);
        assert_eq!(allowed.headers()["cache-control"], "private, no-store");
    }

    #[tokio::test]
    async fn test_admin_requires_api_key() {
        let temp = TempDir::new().unwrap();
        let router = app(create_state(&temp));

        let missing = router
            .clone()
            .oneshot(publish_request(None, "sam.txt", "abc"))
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

        let wrong = router
            .oneshot(publish_request(Some("nope"), "sam.txt", "abc"))
            .await
            .unwrap();
        assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_admin_disabled_without_key() {
        let temp = TempDir::new().unwrap();
        let state = AppState::new(Arc::clone(create_state(&temp).store()), None);
        let response = app(state)
            .oneshot(publish_request(Some(KEY), "sam.txt", "abc"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_admin_protect_and_publish() {
        let temp = TempDir::new().unwrap();
        let state = create_state(&temp);
        let tuple = state
            .store()
            .set_from_string("A", "sam.txt", None, None, WriteConfig::new())
            .unwrap();
        let router = app(state.clone());

        let body = serde_json::to_vec(&VisibilityReq {
            filename: "sam.txt".into(),
            hash: tuple.hash.clone(),
        })
        .unwrap();
        let response = router
            .clone()
            .oneshot(
                Request::post("/admin/protect")
                    .header("content-type", "application/json")
                    .header(API_KEY_HEADER, KEY)
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let res: VisibilityRes = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(res.moved, 1);

        let response = router
            .oneshot(publish_request(Some(KEY), "sam.txt", &tuple.hash))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            state.store().get_visibility("sam.txt", &tuple.hash).unwrap(),
            Some(assets_core::Visibility::Public)
        );
    }

    #[tokio::test]
    async fn test_admin_publish_unknown_file_moves_nothing() {
        let temp = TempDir::new().unwrap();
        let response = app(create_state(&temp))
            .oneshot(publish_request(Some(KEY), "sam.txt", "0000000000"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let res: VisibilityRes = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(res.moved, 0);
    }

    #[tokio::test]
    async fn test_admin_grant_and_revoke() {
        let temp = TempDir::new().unwrap();
        let state = create_state(&temp);
        let tuple = state
            .store()
            .set_from_string("A", "sam.txt", None, None, WriteConfig::new())
            .unwrap();
        let router = app(state);

        let request = |revoke: bool| {
            let body = serde_json::to_vec(&GrantReq {
                session: "abc".into(),
                filename: "sam.txt".into(),
                hash: tuple.hash.clone(),
                revoke,
            })
            .unwrap();
            Request::post("/admin/grants")
                .header("content-type", "application/json")
                .header(API_KEY_HEADER, KEY)
                .body(Body::from(body))
                .unwrap()
        };

        let response = router.clone().oneshot(request(false)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let res: GrantRes = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert!(res.granted);

        let response = router.oneshot(request(true)).await.unwrap();
        let res: GrantRes = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert!(!res.granted);
    }

    #[test]
    fn test_session_header_wins_over_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert("cookie", HeaderValue::from_static("asset_session=from-cookie"));
        assert_eq!(
            session_from_headers(&headers).unwrap().as_str(),
            "from-cookie"
        );
        headers.insert(SESSION_HEADER, HeaderValue::from_static("from-header"));
        assert_eq!(
            session_from_headers(&headers).unwrap().as_str(),
            "from-header"
        );
        assert!(session_from_headers(&HeaderMap::new()).is_none());
    }
}
