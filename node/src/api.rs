//! # REST + WebSocket API
//!
//! Builds the axum router that exposes the registry node's HTTP interface.
//! All endpoints share application state through axum's `State` extractor.
//!
//! ## Endpoints
//!
//! | Method | Path                     | Description                        |
//! |--------|--------------------------|------------------------------------|
//! | GET    | `/health`                | Liveness probe                     |
//! | GET    | `/status`                | Registry status summary            |
//! | POST   | `/students`              | Register a student                 |
//! | POST   | `/approvers`             | Authorize an approver (owner only) |
//! | POST   | `/students/:id/request`  | Request a recommendation           |
//! | POST   | `/students/:id/approve`  | Approve a recommendation           |
//! | GET    | `/students/:id`          | Fetch a student record             |
//! | GET    | `/ws`                    | WebSocket for live registry events |
//!
//! Every mutating call carries the caller identity in its JSON body — the
//! node performs no wallet or signature handling; the identity string is
//! taken at face value and authorization happens in the Workflow Engine.
//!
//! Mutating endpoints return the updated record view directly, so clients
//! never need the re-fetch-after-write the old UI relied on.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use endorse_registry::{StudentId, StudentView, WorkflowEngine, WorkflowError};

use crate::metrics::SharedMetrics;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state available to all request handlers.
///
/// Cheap to clone — everything behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// The node's reported version string.
    pub version: String,
    /// The workflow engine — the only write path into the registry.
    pub engine: Arc<WorkflowEngine>,
    /// Prometheus metrics for in-handler recording.
    pub metrics: SharedMetrics,
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the full axum [`Router`] with all API routes, CORS, and tracing.
///
/// The returned router is ready to be served on the configured RPC port.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/students", post(add_student_handler))
        .route("/approvers", post(authorize_approver_handler))
        .route("/students/:id/request", post(request_handler))
        .route("/students/:id/approve", post(approve_handler))
        .route("/students/:id", get(get_student_handler))
        .route("/ws", get(ws_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request Types
// ---------------------------------------------------------------------------

/// Request body for `POST /students`.
#[derive(Debug, Deserialize)]
pub struct AddStudentRequest {
    /// Identity submitting the registration.
    pub caller: String,
    /// Student's full name.
    pub name: String,
    /// Contact email.
    pub email: String,
    /// Course of study.
    pub course: String,
}

/// Request body for `POST /approvers`.
#[derive(Debug, Deserialize)]
pub struct AuthorizeApproverRequest {
    /// Identity submitting the authorization. Must be the registry owner.
    pub caller: String,
    /// Identity to add to the approver set.
    pub target: String,
}

/// Request body for the per-record transition endpoints.
#[derive(Debug, Deserialize)]
pub struct CallerRequest {
    /// Identity on whose behalf the transition is invoked.
    pub caller: String,
}

// ---------------------------------------------------------------------------
// Response Types
// ---------------------------------------------------------------------------

/// Response payload for `POST /students`.
#[derive(Debug, Serialize, Deserialize)]
pub struct AddStudentResponse {
    /// The id allocated for the new record.
    pub id: StudentId,
}

/// Response payload for `POST /approvers`.
#[derive(Debug, Serialize, Deserialize)]
pub struct AuthorizeApproverResponse {
    /// The identity that is now (or already was) an approver.
    pub target: String,
}

/// Response payload for `GET /status`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Node software version.
    pub version: String,
    /// The registry owner identity.
    pub owner: String,
    /// Number of student records.
    pub students: u64,
    /// Number of authorized approvers.
    pub approvers: u64,
    /// ISO-8601 timestamp of the response.
    pub timestamp: String,
}

/// Error body returned by all endpoints on failure.
///
/// `kind` is a stable machine-readable discriminator so clients can branch
/// without parsing the human-readable message.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human-readable error description.
    pub error: String,
    /// One of: `validation`, `not_found`, `unauthorized`, `invalid_state`,
    /// `store`.
    pub kind: String,
}

// ---------------------------------------------------------------------------
// Error Mapping
// ---------------------------------------------------------------------------

/// Maps a workflow error to its HTTP status and machine-readable kind.
fn error_parts(err: &WorkflowError) -> (StatusCode, &'static str) {
    match err {
        WorkflowError::Validation { .. } => (StatusCode::BAD_REQUEST, "validation"),
        WorkflowError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        WorkflowError::Unauthorized { .. } => (StatusCode::FORBIDDEN, "unauthorized"),
        WorkflowError::InvalidState { .. } => (StatusCode::CONFLICT, "invalid_state"),
        WorkflowError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "store"),
    }
}

/// Records the rejection and renders the error body.
fn reject(state: &AppState, err: WorkflowError) -> Response {
    state.metrics.operations_rejected_total.inc();
    let (status, kind) = error_parts(&err);
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!("store failure: {err}");
    }
    let body = ErrorResponse {
        error: err.to_string(),
        kind: kind.to_string(),
    };
    (status, Json(body)).into_response()
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health` — returns 200 if the node is alive.
///
/// This is the liveness probe for orchestrators (k8s, systemd, etc.).
/// It intentionally does not touch the store — that belongs in `/status`.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// `GET /status` — returns a registry status summary.
async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let store = state.engine.store();
    let resp = StatusResponse {
        version: state.version.clone(),
        owner: store.owner().to_string(),
        students: store.student_count() as u64,
        approvers: store.approver_count() as u64,
        timestamp: chrono::Utc::now().to_rfc3339(),
    };
    Json(resp)
}

/// `POST /students` — registers a student, returning the allocated id.
async fn add_student_handler(
    State(state): State<AppState>,
    Json(req): Json<AddStudentRequest>,
) -> Response {
    let timer = state.metrics.operation_latency_seconds.start_timer();
    let result = state
        .engine
        .add_student(&req.caller, &req.name, &req.email, &req.course);
    timer.observe_duration();

    match result {
        Ok(id) => {
            state.metrics.students_registered_total.inc();
            state
                .metrics
                .students
                .set(state.engine.store().student_count() as i64);
            (StatusCode::CREATED, Json(AddStudentResponse { id })).into_response()
        }
        Err(err) => reject(&state, err),
    }
}

/// `POST /approvers` — authorizes an approver. Owner only, idempotent.
async fn authorize_approver_handler(
    State(state): State<AppState>,
    Json(req): Json<AuthorizeApproverRequest>,
) -> Response {
    let timer = state.metrics.operation_latency_seconds.start_timer();
    let result = state.engine.authorize_approver(&req.caller, &req.target);
    timer.observe_duration();

    match result {
        Ok(()) => {
            state.metrics.approvers_authorized_total.inc();
            (
                StatusCode::OK,
                Json(AuthorizeApproverResponse { target: req.target }),
            )
                .into_response()
        }
        Err(err) => reject(&state, err),
    }
}

/// `POST /students/:id/request` — requests a recommendation.
///
/// Returns the updated record view.
async fn request_handler(
    Path(id): Path<StudentId>,
    State(state): State<AppState>,
    Json(req): Json<CallerRequest>,
) -> Response {
    let timer = state.metrics.operation_latency_seconds.start_timer();
    let result = state.engine.request_recommendation(&req.caller, id);
    timer.observe_duration();

    match result {
        Ok(view) => {
            state.metrics.recommendations_requested_total.inc();
            (StatusCode::OK, Json(view)).into_response()
        }
        Err(err) => reject(&state, err),
    }
}

/// `POST /students/:id/approve` — approves a recommendation.
///
/// Returns the updated record view.
async fn approve_handler(
    Path(id): Path<StudentId>,
    State(state): State<AppState>,
    Json(req): Json<CallerRequest>,
) -> Response {
    let timer = state.metrics.operation_latency_seconds.start_timer();
    let result = state.engine.approve_recommendation(&req.caller, id);
    timer.observe_duration();

    match result {
        Ok(view) => {
            state.metrics.recommendations_approved_total.inc();
            (StatusCode::OK, Json(view)).into_response()
        }
        Err(err) => reject(&state, err),
    }
}

/// `GET /students/:id` — fetches a record. Open read, no authorization.
async fn get_student_handler(
    Path(id): Path<StudentId>,
    State(state): State<AppState>,
) -> Response {
    match state.engine.get_student(id) {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(err) => reject(&state, err),
    }
}

/// `GET /ws` — WebSocket upgrade for live event streaming.
///
/// Clients receive JSON-encoded [`endorse_registry::RegistryEvent`]
/// messages for each successful mutation. The connection is read-only
/// from the server's perspective; client messages are ignored.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
}

/// Drives a single WebSocket connection, forwarding registry events until
/// the client disconnects or the channel is closed.
async fn handle_ws_connection(mut socket: WebSocket, state: AppState) {
    let mut rx = state.engine.subscribe();

    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Ok(ev) => {
                        let payload = match serde_json::to_string(&ev) {
                            Ok(s) => s,
                            Err(e) => {
                                tracing::warn!("failed to serialize ws event: {}", e);
                                continue;
                            }
                        };
                        if socket.send(Message::Text(payload.into())).await.is_err() {
                            // Client disconnected.
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("ws subscriber lagged by {} events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        break;
                    }
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(_)) => {
                        // Client messages are ignored — this is a push-only channel.
                    }
                    _ => break, // Disconnected or error.
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use endorse_registry::RegistryStore;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    const OWNER: &str = "dean_pk";

    /// Creates a test AppState backed by a temporary in-memory registry.
    fn test_app_state() -> AppState {
        let store = Arc::new(RegistryStore::open_temporary(OWNER).expect("temp registry"));
        let engine = Arc::new(WorkflowEngine::new(store));
        let metrics = Arc::new(crate::metrics::NodeMetrics::new());

        AppState {
            version: "0.1.0-test".into(),
            engine,
            metrics,
        }
    }

    /// Sends a GET request and returns the (status, body_bytes).
    async fn get(router: &Router, path: &str) -> (StatusCode, Vec<u8>) {
        let req = Request::builder().uri(path).body(Body::empty()).unwrap();
        let resp = router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let body = resp
            .into_body()
            .collect()
            .await
            .unwrap()
            .to_bytes()
            .to_vec();
        (status, body)
    }

    /// Sends a POST request with JSON body and returns (status, body_bytes).
    async fn post_json(
        router: &Router,
        path: &str,
        body: serde_json::Value,
    ) -> (StatusCode, Vec<u8>) {
        let req = Request::builder()
            .method("POST")
            .uri(path)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap();
        let resp = router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let body = resp
            .into_body()
            .collect()
            .await
            .unwrap()
            .to_bytes()
            .to_vec();
        (status, body)
    }

    /// Registers a student over HTTP and returns the allocated id.
    async fn register(router: &Router, name: &str) -> StudentId {
        let (status, body) = post_json(
            router,
            "/students",
            serde_json::json!({
                "caller": "registrar_pk",
                "name": name,
                "email": format!("{}@x.com", name.to_lowercase()),
                "course": "CS",
            }),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let resp: AddStudentResponse = serde_json::from_slice(&body).unwrap();
        resp.id
    }

    // -- Liveness & status ----------------------------------------------------

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let router = create_router(test_app_state());
        let (status, body) = get(&router, "/health").await;

        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn status_endpoint_reports_registry_counts() {
        let state = test_app_state();
        let router = create_router(state.clone());

        register(&router, "Alice").await;
        state.engine.authorize_approver(OWNER, "prof_x").unwrap();

        let (status, body) = get(&router, "/status").await;
        assert_eq!(status, StatusCode::OK);

        let resp: StatusResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(resp.owner, OWNER);
        assert_eq!(resp.students, 1);
        assert_eq!(resp.approvers, 1);
        assert_eq!(resp.version, "0.1.0-test");
    }

    // -- Registration ---------------------------------------------------------

    #[tokio::test]
    async fn add_student_returns_allocated_id() {
        let router = create_router(test_app_state());
        assert_eq!(register(&router, "Alice").await, 0);
        assert_eq!(register(&router, "Bob").await, 1);
    }

    #[tokio::test]
    async fn add_student_with_empty_field_is_bad_request() {
        let router = create_router(test_app_state());
        let (status, body) = post_json(
            &router,
            "/students",
            serde_json::json!({
                "caller": "registrar_pk",
                "name": "Alice",
                "email": "a@x.com",
                "course": "",
            }),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        let err: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(err.kind, "validation");
        assert!(err.error.contains("course"));
    }

    // -- Lookup ---------------------------------------------------------------

    #[tokio::test]
    async fn get_student_returns_record_view() {
        let router = create_router(test_app_state());
        let id = register(&router, "Alice").await;

        let (status, body) = get(&router, &format!("/students/{id}")).await;
        assert_eq!(status, StatusCode::OK);

        let view: StudentView = serde_json::from_slice(&body).unwrap();
        assert_eq!(view.name, "Alice");
        assert_eq!(view.course, "CS");
        assert!(!view.requested);
        assert!(!view.approved);
    }

    #[tokio::test]
    async fn get_unknown_student_is_not_found() {
        let router = create_router(test_app_state());
        let (status, body) = get(&router, "/students/999").await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        let err: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(err.kind, "not_found");
    }

    // -- Request --------------------------------------------------------------

    #[tokio::test]
    async fn request_endpoint_returns_updated_view() {
        let router = create_router(test_app_state());
        let id = register(&router, "Alice").await;

        let (status, body) = post_json(
            &router,
            &format!("/students/{id}/request"),
            serde_json::json!({ "caller": "any_wallet" }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let view: StudentView = serde_json::from_slice(&body).unwrap();
        assert!(view.requested);
        assert!(!view.approved);
    }

    #[tokio::test]
    async fn duplicate_request_is_conflict() {
        let router = create_router(test_app_state());
        let id = register(&router, "Alice").await;

        let path = format!("/students/{id}/request");
        let body = serde_json::json!({ "caller": "any_wallet" });
        post_json(&router, &path, body.clone()).await;
        let (status, bytes) = post_json(&router, &path, body).await;

        assert_eq!(status, StatusCode::CONFLICT);
        let err: ErrorResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(err.kind, "invalid_state");
    }

    // -- Approval -------------------------------------------------------------

    #[tokio::test]
    async fn approve_without_request_is_conflict() {
        let state = test_app_state();
        let router = create_router(state.clone());
        let id = register(&router, "Alice").await;
        state.engine.authorize_approver(OWNER, "prof_x").unwrap();

        let (status, _) = post_json(
            &router,
            &format!("/students/{id}/approve"),
            serde_json::json!({ "caller": "prof_x" }),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn approve_by_unvetted_caller_is_forbidden() {
        let router = create_router(test_app_state());
        let id = register(&router, "Alice").await;
        post_json(
            &router,
            &format!("/students/{id}/request"),
            serde_json::json!({ "caller": "any_wallet" }),
        )
        .await;

        let (status, body) = post_json(
            &router,
            &format!("/students/{id}/approve"),
            serde_json::json!({ "caller": "unvetted_pk" }),
        )
        .await;

        assert_eq!(status, StatusCode::FORBIDDEN);
        let err: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(err.kind, "unauthorized");
        // The body must not enumerate who IS authorized.
        assert!(!err.error.contains("prof_"));
    }

    // -- Authorization --------------------------------------------------------

    #[tokio::test]
    async fn authorize_by_non_owner_is_forbidden() {
        let router = create_router(test_app_state());
        let (status, body) = post_json(
            &router,
            "/approvers",
            serde_json::json!({ "caller": "impostor_pk", "target": "prof_x" }),
        )
        .await;

        assert_eq!(status, StatusCode::FORBIDDEN);
        let err: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(err.kind, "unauthorized");
    }

    #[tokio::test]
    async fn authorize_by_owner_is_idempotent() {
        let state = test_app_state();
        let router = create_router(state.clone());

        let body = serde_json::json!({ "caller": OWNER, "target": "prof_x" });
        let (first, _) = post_json(&router, "/approvers", body.clone()).await;
        let (second, _) = post_json(&router, "/approvers", body).await;

        assert_eq!(first, StatusCode::OK);
        assert_eq!(second, StatusCode::OK);
        assert_eq!(state.engine.store().approver_count(), 1);
    }

    // -- Full workflow --------------------------------------------------------

    #[tokio::test]
    async fn full_workflow_over_http() {
        let router = create_router(test_app_state());
        let id = register(&router, "Alice").await;

        let (status, _) = post_json(
            &router,
            "/approvers",
            serde_json::json!({ "caller": OWNER, "target": "prof_x" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = post_json(
            &router,
            &format!("/students/{id}/request"),
            serde_json::json!({ "caller": "alice_wallet" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = post_json(
            &router,
            &format!("/students/{id}/approve"),
            serde_json::json!({ "caller": "prof_x" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let view: StudentView = serde_json::from_slice(&body).unwrap();
        assert!(view.requested);
        assert!(view.approved);

        // And the read endpoint agrees.
        let (_, body) = get(&router, &format!("/students/{id}")).await;
        let fetched: StudentView = serde_json::from_slice(&body).unwrap();
        assert_eq!(fetched, view);
    }
}
