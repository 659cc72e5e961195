//! HTTP query surface.
//!
//! `POST /search` and `POST /entry` answer lookups against the current
//! catalog snapshot; `POST /rebuild` rebuilds from the registered sources and
//! swaps the new catalog in once the store has committed.

use std::{
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use axum::{
    Json,
    Router,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::{
    catalog::{Catalog, SharedCatalog},
    entry::DocVersion,
    error::{Error, Result},
    ingestion,
    profile::Profiles,
    search::{self, DEFAULT_DEPTH, DEFAULT_K, EntryView},
    store::{Store, VersionMeta},
};

pub const DEFAULT_ADDR: &str = "127.0.0.1:8731";
pub const DEFAULT_TIMEOUT_MS: u64 = 2000;

pub struct AppState {
    store: Arc<Store>,
    catalog: SharedCatalog,
    profiles: Arc<Profiles>,
    timeout: Duration,
    rebuilding: AtomicBool,
    cancel: Arc<AtomicBool>,
}

impl AppState {
    pub fn new(
        store: Arc<Store>,
        profiles: Arc<Profiles>,
        timeout: Duration,
        cancel: Arc<AtomicBool>,
    ) -> Result<Self> {
        let catalog = SharedCatalog::new(Catalog::load(&store)?);
        Ok(Self {
            store,
            catalog,
            profiles,
            timeout,
            rebuilding: AtomicBool::new(false),
            cancel,
        })
    }
}

/// Releases the rebuild slot when the rebuild ends, however it ends.
struct RebuildSlot(Arc<AppState>);

impl Drop for RebuildSlot {
    fn drop(&mut self) {
        self.0.rebuilding.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    Unprocessable(String),
    Unavailable,
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::Conflict(msg) => (StatusCode::CONFLICT, msg),
            Self::Unprocessable(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            Self::Unavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                "retrieval failed".to_string(),
            ),
            Self::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        match error {
            Error::NotFound { .. } => Self::NotFound(error.to_string()),
            Error::EmptyBuild { .. } | Error::Config(_) => {
                Self::Unprocessable(error.to_string())
            }
            Error::Timeout | Error::Cancelled => Self::Unavailable,
            other => Self::Internal(other.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub q: String,
    pub v: DocVersion,
    #[serde(default)]
    pub k: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct EntryRequest {
    pub q: String,
    pub v: DocVersion,
    #[serde(default)]
    pub depth: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RebuildRequest {
    #[serde(default)]
    pub v: Option<DocVersion>,
}

#[derive(Debug, Serialize)]
struct RebuildResponse {
    generation: u64,
    versions: Vec<VersionMeta>,
}

async fn search_handler(
    State(state): State<Arc<AppState>>,
    body: std::result::Result<Json<SearchRequest>, JsonRejection>,
) -> std::result::Result<Json<Vec<String>>, ApiError> {
    let Json(req) = body?;
    let catalog = state.catalog.load();
    let k = req.k.unwrap_or(DEFAULT_K);
    let ranked = search::search(&catalog, &req.q, req.v, k)?;
    Ok(Json(ranked.into_iter().map(|r| r.name).collect()))
}

async fn entry_handler(
    State(state): State<Arc<AppState>>,
    body: std::result::Result<Json<EntryRequest>, JsonRejection>,
) -> std::result::Result<Json<EntryView>, ApiError> {
    let Json(req) = body?;
    let depth = req.depth.unwrap_or(DEFAULT_DEPTH);
    let catalog = state.catalog.load();
    if !catalog.contains(req.v) {
        return Err(ApiError::NotFound(format!("version not found: {}", req.v)));
    }

    let store = Arc::clone(&state.store);
    let task = tokio::task::spawn_blocking(move || {
        search::resolve(&catalog, &*store, &req.q, req.v, depth)
    });
    let resolved = match tokio::time::timeout(state.timeout, task).await {
        Ok(Ok(resolved)) => resolved,
        Ok(Err(e)) => return Err(ApiError::Internal(e.to_string())),
        Err(_) => {
            warn!(timeout = ?state.timeout, "entry lookup timed out");
            return Err(ApiError::Unavailable);
        }
    };

    match resolved {
        Ok(Some(view)) => Ok(Json(view)),
        Ok(None) => Err(ApiError::NotFound("no matching entry".to_string())),
        Err(e @ Error::NotFound { .. }) => Err(e.into()),
        Err(e) => {
            warn!("entry lookup failed: {e}");
            Err(ApiError::Unavailable)
        }
    }
}

async fn rebuild_handler(
    State(state): State<Arc<AppState>>,
    body: std::result::Result<Json<RebuildRequest>, JsonRejection>,
) -> std::result::Result<Json<RebuildResponse>, ApiError> {
    let req = match body {
        Ok(Json(req)) => req,
        Err(JsonRejection::MissingJsonContentType(_)) => {
            RebuildRequest::default()
        }
        Err(e) => return Err(e.into()),
    };

    if state.rebuilding.swap(true, Ordering::SeqCst) {
        return Err(ApiError::Conflict(
            "a rebuild is already running".to_string(),
        ));
    }
    let slot = RebuildSlot(Arc::clone(&state));

    let task = tokio::task::spawn_blocking(move || {
        let state = &slot.0;
        let versions = ingestion::build(
            &state.store,
            &state.profiles,
            req.v,
            &state.cancel,
        )?;
        let catalog = state.catalog.reload(&state.store)?;
        Ok::<_, Error>(RebuildResponse {
            generation: catalog.generation(),
            versions,
        })
    });

    let response = task
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .map_err(|e| {
            warn!("rebuild failed: {e}");
            ApiError::from(e)
        })?;
    info!(generation = response.generation, "rebuild finished");
    Ok(Json(response))
}

async fn health() -> &'static str {
    "ok"
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/search", post(search_handler))
        .route("/entry", post(entry_handler))
        .route("/rebuild", post(rebuild_handler))
        .route("/health", get(health))
        .with_state(state)
}

/// Serve until Ctrl-C. Shutdown also cancels a running rebuild.
pub async fn serve(addr: SocketAddr, state: Arc<AppState>) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "serving");

    let cancel = Arc::clone(&state.cancel);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutting down");
            }
            cancel.store(true, Ordering::SeqCst);
        })
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;
    use crate::{
        aggregator::Aggregator,
        entry::{EntryDraft, EntryKey},
    };

    struct Fixture {
        _tmp: tempfile::TempDir,
        docs: tempfile::TempDir,
        state: Arc<AppState>,
    }

    fn fixture() -> Fixture {
        let tmp = tempfile::tempdir().unwrap();
        let store = Store::open(&tmp.path().join("store.redb")).unwrap();

        let mut agg = Aggregator::new(1);
        for (i, name) in ["MsgBox", "MsgBoxResult", "Msg"].iter().enumerate() {
            agg.add(EntryDraft::new(
                EntryKey::page(format!("p{i}.htm")),
                vec![name.to_string()],
            ));
        }
        let mut child = EntryDraft::new(
            EntryKey::fragment("p0.htm", "Text"),
            vec!["MsgBox Text".into()],
        );
        child.parents = vec![EntryKey::page("p0.htm")];
        agg.add(child);
        store.replace_version(&agg.finalize(1).unwrap()).unwrap();

        let docs = tempfile::tempdir().unwrap();
        std::fs::write(docs.path().join("Send.htm"), "<h1>Send</h1>").unwrap();
        store.set_source(1, docs.path().to_str().unwrap()).unwrap();

        let state = AppState::new(
            Arc::new(store),
            Arc::new(Profiles::builtin()),
            Duration::from_millis(DEFAULT_TIMEOUT_MS),
            Arc::new(AtomicBool::new(false)),
        )
        .unwrap();
        Fixture {
            _tmp: tmp,
            docs,
            state: Arc::new(state),
        }
    }

    async fn post_json(
        state: &Arc<AppState>,
        uri: &str,
        body: &str,
    ) -> (StatusCode, serde_json::Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response =
            router(Arc::clone(state)).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value =
            serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn search_ranks_exact_match_first() {
        let f = fixture();
        let (status, body) =
            post_json(&f.state, "/search", r#"{"q":"msgbox","v":1}"#).await;
        assert_eq!(status, StatusCode::OK);
        let names = body.as_array().unwrap();
        assert_eq!(names[0], "MsgBox");
        assert!(names.len() <= DEFAULT_K);

        let one = r#"{"q":"msgbox","v":1,"k":1}"#;
        let (_, body) = post_json(&f.state, "/search", one).await;
        assert_eq!(body, json!(["MsgBox"]));
    }

    #[tokio::test]
    async fn malformed_requests_are_rejected() {
        let f = fixture();
        let bodies = [
            r#"{"q":"msgbox"}"#,
            r#"{"q":"msgbox","v":"one"}"#,
            r#"{"v":1}"#,
            "not json",
        ];
        for body in bodies {
            let (status, json) = post_json(&f.state, "/search", body).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "body {body}");
            assert!(json["error"].is_string());
            let (status, _) = post_json(&f.state, "/entry", body).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "body {body}");
        }
    }

    #[tokio::test]
    async fn unknown_version_is_404() {
        let f = fixture();
        let (status, _) =
            post_json(&f.state, "/search", r#"{"q":"x","v":9}"#).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) =
            post_json(&f.state, "/entry", r#"{"q":"x","v":9}"#).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn entry_includes_parents() {
        let f = fixture();
        let (status, body) =
            post_json(&f.state, "/entry", r#"{"q":"msgbox text","v":1}"#).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "MsgBox Text");
        assert_eq!(body["page"], "p0.htm");
        assert_eq!(body["fragment"], "Text");
        assert_eq!(body["parents"][0]["name"], "MsgBox");
        assert_eq!(body["parents"][0]["parents"], json!([]));
    }

    #[tokio::test]
    async fn unreadable_entry_is_503() {
        let f = fixture();
        f.state.store.corrupt_entry(1, 1).unwrap();

        let (status, body) =
            post_json(&f.state, "/entry", r#"{"q":"msgbox","v":1}"#).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body, json!({ "error": "retrieval failed" }));

        // A broken parent only degrades the parent.
        let (status, body) =
            post_json(&f.state, "/entry", r#"{"q":"msgbox text","v":1}"#).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["parents"], json!([1]));
    }

    #[tokio::test]
    async fn rebuild_swaps_catalog() {
        let f = fixture();
        let (status, body) =
            post_json(&f.state, "/rebuild", r#"{"v":1}"#).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["generation"], 2);
        assert_eq!(body["versions"][0]["entries"], 1);

        let (_, body) =
            post_json(&f.state, "/search", r#"{"q":"send","v":1}"#).await;
        assert_eq!(body, json!(["Send"]));
        assert!(!f.state.rebuilding.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn concurrent_rebuild_conflicts() {
        let f = fixture();
        f.state.rebuilding.store(true, Ordering::SeqCst);
        let (status, _) = post_json(&f.state, "/rebuild", "{}").await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn failed_rebuild_keeps_serving_old_catalog() {
        let f = fixture();
        std::fs::remove_file(f.docs.path().join("Send.htm")).unwrap();
        let (status, _) = post_json(&f.state, "/rebuild", "{}").await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, body) =
            post_json(&f.state, "/search", r#"{"q":"msgbox","v":1}"#).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0], "MsgBox");
    }

    #[tokio::test]
    async fn health_check() {
        let f = fixture();
        let request =
            Request::builder().uri("/health").body(Body::empty()).unwrap();
        let response = router(f.state).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"ok");
    }
}
