//! REST surface — applicant session endpoints and the staff API.
//!
//! Session endpoints drive a server-side [`WizardController`] per applicant;
//! every field change feeds the autosave agent, and advancing past the last
//! step hands off to the submission pipeline. The staff API is a thin layer
//! over [`ReviewService`].

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::auth::IdentityProvider;
use crate::autosave::AutosaveAgent;
use crate::config::IntakeConfig;
use crate::error::{Error, StoreError};
use crate::model::{ApplicationStatus, ChecklistItem, DocumentKind, MessageSender};
use crate::review::{ReviewFilter, ReviewService};
use crate::store::ApplicationStore;
use crate::submit::SubmissionAgent;
use crate::wizard::{
    AdvanceOutcome, StagedDocument, StandardPasswordPolicy, WizardController,
};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    store: Arc<dyn ApplicationStore>,
    identity: Arc<dyn IdentityProvider>,
    review: Arc<ReviewService>,
    submit: Arc<SubmissionAgent>,
    autosave: Arc<AutosaveAgent>,
    sessions: Arc<Mutex<HashMap<String, WizardController>>>,
    config: Arc<IntakeConfig>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn ApplicationStore>,
        identity: Arc<dyn IdentityProvider>,
        review: Arc<ReviewService>,
        submit: Arc<SubmissionAgent>,
        autosave: Arc<AutosaveAgent>,
        config: IntakeConfig,
    ) -> Self {
        Self {
            store,
            identity,
            review,
            submit,
            autosave,
            sessions: Arc::new(Mutex::new(HashMap::new())),
            config: Arc::new(config),
        }
    }

    fn new_controller(&self) -> WizardController {
        WizardController::new(
            Arc::new(StandardPasswordPolicy),
            self.config.password_min_score,
        )
    }
}

/// Build the full route tree.
pub fn router(state: AppState) -> Router {
    Router::new()
        // Applicant session
        .route("/api/session", post(create_session))
        .route("/api/session/{uid}", get(session_state))
        .route("/api/session/{uid}/resume", post(resume_session))
        .route("/api/session/{uid}/convert", post(convert_session))
        .route("/api/session/{uid}/field", put(set_field))
        .route(
            "/api/session/{uid}/document/{kind}/{filename}",
            post(stage_document),
        )
        .route("/api/session/{uid}/next", post(advance))
        .route("/api/session/{uid}/back", post(go_back))
        .route("/api/push-tokens", post(register_push_token))
        // Staff
        .route("/api/applications", get(list_applications))
        .route("/api/applications/stats", get(application_stats))
        .route("/api/applications/{id}", get(application_detail))
        .route("/api/applications/{id}/status", put(set_status))
        .route("/api/applications/{id}/checklist", put(set_checklist))
        .route(
            "/api/applications/{id}/documents/{kind}/{filename}",
            post(replace_document),
        )
        .route(
            "/api/applications/{id}/messages",
            get(list_messages).post(send_message),
        )
        .route("/api/applications/{id}/read", post(mark_read))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn error_response(e: Error) -> Response {
    let status = match &e {
        Error::Store(StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
        Error::Store(StoreError::Constraint(_)) => StatusCode::CONFLICT,
        Error::Upload(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({ "error": e.to_string() }))).into_response()
}

fn not_found(what: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": format!("{what} not found") })),
    )
        .into_response()
}

fn session_json(uid: &str, controller: &WizardController) -> serde_json::Value {
    let (step, total) = controller.progress();
    json!({
        "uid": uid,
        "step": step,
        "total_steps": total,
        "errors": controller.errors(),
    })
}

// ── Applicant session ───────────────────────────────────────────────

async fn create_session(State(state): State<AppState>) -> Response {
    let identity = match state.identity.sign_in_anonymously().await {
        Ok(identity) => identity,
        Err(e) => return error_response(Error::Auth(e)),
    };
    let controller = state.new_controller();
    let body = session_json(&identity.uid, &controller);
    state.sessions.lock().await.insert(identity.uid, controller);
    Json(body).into_response()
}

async fn session_state(State(state): State<AppState>, Path(uid): Path<String>) -> Response {
    match state.sessions.lock().await.get(&uid) {
        Some(controller) => Json(session_json(&uid, controller)).into_response(),
        None => not_found("session"),
    }
}

/// Re-enter the wizard with a stored partial record.
async fn resume_session(State(state): State<AppState>, Path(uid): Path<String>) -> Response {
    let app = match state.store.get(&uid).await {
        Ok(Some(app)) => app,
        Ok(None) => return not_found("application"),
        Err(e) => return error_response(Error::Store(e)),
    };
    if !app.is_partial {
        return (
            StatusCode::CONFLICT,
            Json(json!({ "error": "application already submitted" })),
        )
            .into_response();
    }
    let controller = WizardController::resume(
        Arc::new(StandardPasswordPolicy),
        state.config.password_min_score,
        &app,
    );
    let body = session_json(&uid, &controller);
    state.sessions.lock().await.insert(uid, controller);
    Json(body).into_response()
}

/// Unlicensed applicant whose badge arrived: re-enter on the licensed branch.
async fn convert_session(State(state): State<AppState>, Path(uid): Path<String>) -> Response {
    let app = match state.store.get(&uid).await {
        Ok(Some(app)) => app,
        Ok(None) => return not_found("application"),
        Err(e) => return error_response(Error::Store(e)),
    };
    if app.details.is_licensed() {
        return (
            StatusCode::CONFLICT,
            Json(json!({ "error": "application is already on the licensed path" })),
        )
            .into_response();
    }
    let controller = WizardController::convert_to_licensed(
        Arc::new(StandardPasswordPolicy),
        state.config.password_min_score,
        &app,
    );
    info!(application_id = %uid, "Converting applicant to the licensed flow");
    let body = session_json(&uid, &controller);
    state.sessions.lock().await.insert(uid, controller);
    Json(body).into_response()
}

#[derive(Debug, Deserialize)]
struct SetFieldBody {
    field: String,
    value: serde_json::Value,
}

async fn set_field(
    State(state): State<AppState>,
    Path(uid): Path<String>,
    Json(body): Json<SetFieldBody>,
) -> Response {
    let mut sessions = state.sessions.lock().await;
    let Some(controller) = sessions.get_mut(&uid) else {
        return not_found("session");
    };

    let known = match &body.value {
        serde_json::Value::String(s) => controller.set_text(&body.field, s),
        serde_json::Value::Bool(b) => controller.set_flag(&body.field, *b),
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "value must be a string or a boolean" })),
            )
                .into_response();
        }
    };
    if !known {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": format!("unknown field {}", body.field) })),
        )
            .into_response();
    }

    state
        .autosave
        .record_change(&uid, controller.form(), controller.step());
    Json(session_json(&uid, controller)).into_response()
}

async fn stage_document(
    State(state): State<AppState>,
    Path((uid, kind, filename)): Path<(String, String, String)>,
    body: Bytes,
) -> Response {
    let Some(kind) = DocumentKind::from_key(&kind) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": format!("unknown document kind {kind}") })),
        )
            .into_response();
    };
    let mut sessions = state.sessions.lock().await;
    let Some(controller) = sessions.get_mut(&uid) else {
        return not_found("session");
    };
    controller.stage_document(kind, StagedDocument::new(filename, body.to_vec()));
    Json(json!({ "staged": kind.key() })).into_response()
}

async fn advance(State(state): State<AppState>, Path(uid): Path<String>) -> Response {
    let mut sessions = state.sessions.lock().await;
    let Some(controller) = sessions.get_mut(&uid) else {
        return not_found("session");
    };

    match controller.next() {
        AdvanceOutcome::Blocked(errors) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "errors": errors })),
        )
            .into_response(),
        AdvanceOutcome::Moved(step) => {
            state
                .autosave
                .record_change(&uid, controller.form(), controller.step());
            let (_, total) = controller.progress();
            Json(json!({ "step": step.number(), "total_steps": total })).into_response()
        }
        AdvanceOutcome::FinalizeUnlicensed => {
            let form = controller.form().clone();
            drop(sessions);
            state.autosave.flush().await;
            let result = state.submit.finalize_unlicensed(&uid, &form).await;
            if result.is_ok() {
                state.sessions.lock().await.remove(&uid);
            }
            submission_response(&state, result)
        }
        AdvanceOutcome::Submit => {
            let form = controller.form().clone();
            let staged = controller.staged_documents().clone();
            drop(sessions);
            state.autosave.flush().await;
            let result = state.submit.submit(&uid, &form, &staged).await;
            if result.is_ok() {
                state.sessions.lock().await.remove(&uid);
            }
            submission_response(&state, result)
        }
    }
}

/// A successful submission carries the delay before the client should
/// auto-navigate to the confirmation's next view.
fn submission_response(
    state: &AppState,
    result: Result<crate::model::Application, crate::submit::SubmissionFailure>,
) -> Response {
    match result {
        Ok(app) => Json(json!({
            "application": app,
            "redirect_delay_ms": state.config.redirect_delay.as_millis() as u64,
        }))
        .into_response(),
        Err(failure) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "field": failure.field_label, "message": failure.message })),
        )
            .into_response(),
    }
}

async fn go_back(State(state): State<AppState>, Path(uid): Path<String>) -> Response {
    let mut sessions = state.sessions.lock().await;
    let Some(controller) = sessions.get_mut(&uid) else {
        return not_found("session");
    };
    let step = controller.back();
    Json(json!({ "step": step.number() })).into_response()
}

#[derive(Debug, Deserialize)]
struct PushTokenBody {
    account_id: String,
    token: String,
}

async fn register_push_token(
    State(state): State<AppState>,
    Json(body): Json<PushTokenBody>,
) -> Response {
    match state.store.set_push_token(&body.account_id, &body.token).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(Error::Store(e)),
    }
}

// ── Staff API ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ListQuery {
    search: Option<String>,
    status: Option<String>,
    #[serde(default)]
    include_partial: bool,
}

async fn list_applications(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Response {
    let filter = ReviewFilter {
        search: query.search,
        status: query.status.as_deref().map(ApplicationStatus::from_str_lossy),
        include_partial: query.include_partial,
    };
    match state.review.list(&filter).await {
        Ok(apps) => Json(apps).into_response(),
        Err(e) => error_response(e),
    }
}

async fn application_stats(State(state): State<AppState>) -> Response {
    match state.review.stats().await {
        Ok(stats) => {
            let by_status: serde_json::Map<String, serde_json::Value> = stats
                .by_status
                .iter()
                .map(|(status, count)| (status.as_str().to_string(), json!(count)))
                .collect();
            Json(json!({ "total": stats.total, "by_status": by_status })).into_response()
        }
        Err(e) => error_response(e),
    }
}

async fn application_detail(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.review.detail(&id).await {
        Ok((app, activity)) => {
            Json(json!({ "application": app, "activity": activity })).into_response()
        }
        Err(e) => error_response(e),
    }
}

#[derive(Debug, Deserialize)]
struct SetStatusBody {
    status: ApplicationStatus,
}

async fn set_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<SetStatusBody>,
) -> Response {
    match state.review.set_status(&id, body.status).await {
        Ok(app) => Json(app).into_response(),
        Err(e) => error_response(e),
    }
}

#[derive(Debug, Deserialize)]
struct ChecklistBody {
    item: ChecklistItem,
    value: bool,
}

async fn set_checklist(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<ChecklistBody>,
) -> Response {
    match state.review.set_checklist_item(&id, body.item, body.value).await {
        Ok(app) => Json(app).into_response(),
        Err(e) => error_response(e),
    }
}

async fn replace_document(
    State(state): State<AppState>,
    Path((id, kind, filename)): Path<(String, String, String)>,
    body: Bytes,
) -> Response {
    let Some(kind) = DocumentKind::from_key(&kind) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": format!("unknown document kind {kind}") })),
        )
            .into_response();
    };
    match state.review.replace_document(&id, kind, &filename, &body).await {
        Ok(app) => Json(app).into_response(),
        Err(e) => error_response(e),
    }
}

#[derive(Debug, Deserialize)]
struct ReaderQuery {
    reader: Option<String>,
}

async fn list_messages(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<ReaderQuery>,
) -> Response {
    let reader = MessageSender::from_str_lossy(query.reader.as_deref().unwrap_or("staff"));
    match state.review.conversation(&id, reader).await {
        Ok((messages, unread)) => {
            Json(json!({ "messages": messages, "unread": unread })).into_response()
        }
        Err(e) => error_response(e),
    }
}

#[derive(Debug, Deserialize)]
struct SendMessageBody {
    sender: MessageSender,
    sender_name: String,
    content: String,
}

async fn send_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<SendMessageBody>,
) -> Response {
    match state
        .review
        .send_message(&id, body.sender, &body.sender_name, &body.content)
        .await
    {
        Ok(message) => Json(message).into_response(),
        Err(e) => error_response(e),
    }
}

#[derive(Debug, Deserialize)]
struct MarkReadBody {
    reader: MessageSender,
}

async fn mark_read(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<MarkReadBody>,
) -> Response {
    match state.store.mark_conversation_read(&id, body.reader).await {
        Ok(flipped) => Json(json!({ "marked_read": flipped })).into_response(),
        Err(e) => error_response(Error::Store(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use crate::auth::MemoryIdentityProvider;
    use crate::docs::FsDocumentStore;
    use crate::store::LibSqlBackend;

    async fn test_router() -> (Router, Arc<LibSqlBackend>, tempfile::TempDir) {
        let store = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let identity = Arc::new(MemoryIdentityProvider::new());
        let dir = tempfile::tempdir().unwrap();
        let docs = Arc::new(FsDocumentStore::new(dir.path(), "https://files.example"));
        let review = Arc::new(ReviewService::new(store.clone(), docs.clone()));
        let submit = Arc::new(SubmissionAgent::new(
            store.clone(),
            identity.clone(),
            docs,
        ));
        let autosave = Arc::new(AutosaveAgent::spawn(
            store.clone(),
            Duration::from_millis(5),
        ));
        let state = AppState::new(
            store.clone(),
            identity,
            review,
            submit,
            autosave,
            IntakeConfig::default(),
        );
        (router(state), store, dir)
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post(uri: &str) -> Request<Body> {
        Request::post(uri).body(Body::empty()).unwrap()
    }

    fn put_json(uri: &str, value: serde_json::Value) -> Request<Body> {
        Request::put(uri)
            .header("content-type", "application/json")
            .body(Body::from(value.to_string()))
            .unwrap()
    }

    async fn set(router: &Router, uid: &str, field: &str, value: serde_json::Value) {
        let req = put_json(
            &format!("/api/session/{uid}/field"),
            json!({ "field": field, "value": value }),
        );
        let resp = router.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn session_lifecycle_to_unlicensed_finalization() {
        let (router, store, _dir) = test_router().await;

        let resp = router.clone().oneshot(post("/api/session")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let session = json_body(resp).await;
        let uid = session["uid"].as_str().unwrap().to_string();
        assert_eq!(session["step"], 1);

        // Advancing an empty form is blocked with field errors
        let resp = router
            .clone()
            .oneshot(post(&format!("/api/session/{uid}/next")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(json_body(resp).await["errors"]["first_name"].is_string());

        for (field, value) in [
            ("first_name", json!("Amara")),
            ("last_name", json!("Okafor")),
            ("email", json!("amara@example.com")),
            ("phone", json!("07911 123456")),
            ("area", json!("Leeds")),
            ("password", json!("S3cure!pw")),
            ("confirm_password", json!("S3cure!pw")),
            ("is_licensed_driver", json!(false)),
        ] {
            set(&router, &uid, field, value).await;
        }

        // Unlicensed branch finalizes straight from step 1
        let resp = router
            .clone()
            .oneshot(post(&format!("/api/session/{uid}/next")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_body(resp).await;
        assert_eq!(body["application"]["is_partial"], false);

        let app = store.get(&uid).await.unwrap().unwrap();
        assert!(!app.is_partial);
        assert!(!app.is_licensed_driver());

        // The wizard session is gone once the application is finalized
        let resp = router
            .clone()
            .oneshot(post(&format!("/api/session/{uid}/next")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn licensed_branch_walks_to_the_badge_step() {
        let (router, _store, _dir) = test_router().await;

        let session = json_body(router.clone().oneshot(post("/api/session")).await.unwrap()).await;
        let uid = session["uid"].as_str().unwrap().to_string();

        for (field, value) in [
            ("first_name", json!("Amara")),
            ("last_name", json!("Okafor")),
            ("email", json!("amara@example.com")),
            ("phone", json!("07911123456")),
            ("area", json!("Leeds")),
            ("password", json!("S3cure!pw")),
            ("confirm_password", json!("S3cure!pw")),
            ("is_licensed_driver", json!(true)),
        ] {
            set(&router, &uid, field, value).await;
        }

        let resp = router
            .clone()
            .oneshot(post(&format!("/api/session/{uid}/next")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_body(resp).await;
        assert_eq!(body["step"], 2);
        assert_eq!(body["total_steps"], 6);
    }

    #[tokio::test]
    async fn unknown_fields_and_kinds_are_rejected() {
        let (router, _store, _dir) = test_router().await;
        let session = json_body(router.clone().oneshot(post("/api/session")).await.unwrap()).await;
        let uid = session["uid"].as_str().unwrap();

        let resp = router
            .clone()
            .oneshot(put_json(
                &format!("/api/session/{uid}/field"),
                json!({ "field": "favourite_colour", "value": "teal" }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let req = Request::post(format!("/api/session/{uid}/document/passport/scan.pdf"))
            .body(Body::from("bytes"))
            .unwrap();
        let resp = router.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn staff_endpoints_list_and_update() {
        use crate::model::{ApplicationDetails, LicensedDetails};
        use crate::store::ApplicationPatch;

        let (router, store, _dir) = test_router().await;
        store
            .merge(
                "uid-1",
                ApplicationPatch {
                    first_name: Some("Amara".to_string()),
                    last_name: Some("Okafor".to_string()),
                    email: Some("amara@example.com".to_string()),
                    details: Some(ApplicationDetails::Licensed(LicensedDetails::default())),
                    status: Some(ApplicationStatus::Submitted),
                    is_partial: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let resp = router
            .clone()
            .oneshot(Request::get("/api/applications").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let listed = json_body(resp).await;
        assert_eq!(listed.as_array().unwrap().len(), 1);

        let resp = router
            .clone()
            .oneshot(put_json(
                "/api/applications/uid-1/status",
                json!({ "status": "Under Review" }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(json_body(resp).await["status"], "Under Review");

        let resp = router
            .clone()
            .oneshot(put_json(
                "/api/applications/missing/status",
                json!({ "status": "Approved" }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = router
            .clone()
            .oneshot(
                Request::get("/api/applications/stats")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let stats = json_body(resp).await;
        assert_eq!(stats["total"], 1);
        assert_eq!(stats["by_status"]["Under Review"], 1);
    }

    #[tokio::test]
    async fn push_token_registration() {
        let (router, store, _dir) = test_router().await;
        let req = Request::post("/api/push-tokens")
            .header("content-type", "application/json")
            .body(Body::from(
                json!({ "account_id": "uid-1", "token": "tok-9" }).to_string(),
            ))
            .unwrap();
        let resp = router.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
        assert_eq!(
            store.get_push_token("uid-1").await.unwrap().as_deref(),
            Some("tok-9")
        );
    }
}
