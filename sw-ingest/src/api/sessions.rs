//! Observation session API handlers
//!
//! Every mutating route runs one session action and answers with the
//! freshly rendered [`SessionView`].

use axum::{
    extract::{DefaultBodyLimit, Path, State},
    http::StatusCode,
    routing::{get, patch, post, put},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    models::{ObservationRecord, UploadedImage},
    session::{registry::SharedSession, FieldUpdate},
    view::{render, SessionView},
    AppState,
};

/// Base64 image payloads are large
const MAX_FILES_BODY: usize = 64 * 1024 * 1024;

/// PUT /sessions/:session_id/author request
#[derive(Debug, Deserialize)]
pub struct AuthorRequest {
    pub author_email: String,
}

#[derive(Debug, Deserialize)]
pub struct FilePayload {
    pub filename: String,
    /// Base64 file content
    pub data: String,
}

/// PUT /sessions/:session_id/files request
#[derive(Debug, Deserialize)]
pub struct FilesRequest {
    pub files: Vec<FilePayload>,
}

/// PUT /sessions/:session_id/observations/:image_hash/class request
#[derive(Debug, Deserialize)]
pub struct SelectClassRequest {
    pub selected_class: String,
}

async fn load(state: &AppState, session_id: Uuid) -> ApiResult<SharedSession> {
    state
        .sessions
        .get(session_id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("Session {}", session_id)))
}

/// POST /sessions
pub async fn create_session(
    State(state): State<AppState>,
) -> ApiResult<(StatusCode, Json<SessionView>)> {
    let (_, session) = state.sessions.create().await?;
    let view = render(&*session.lock().await);
    Ok((StatusCode::CREATED, Json(view)))
}

/// GET /sessions/:session_id
pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<SessionView>> {
    let session = load(&state, session_id).await?;
    let view = render(&*session.lock().await);
    Ok(Json(view))
}

/// DELETE /sessions/:session_id
pub async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    if state.sessions.remove(session_id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("Session {}", session_id)))
    }
}

/// POST /sessions/:session_id/reset
pub async fn reset_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<SessionView>> {
    let session = load(&state, session_id).await?;
    let mut session = session.lock().await;
    session.reset();
    Ok(Json(render(&session)))
}

/// PUT /sessions/:session_id/author
pub async fn set_author(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(request): Json<AuthorRequest>,
) -> ApiResult<Json<SessionView>> {
    let session = load(&state, session_id).await?;
    let mut session = session.lock().await;
    session.set_author_email(&request.author_email)?;
    Ok(Json(render(&session)))
}

/// PUT /sessions/:session_id/files
///
/// Replaces the whole file set.
pub async fn replace_files(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(request): Json<FilesRequest>,
) -> ApiResult<Json<SessionView>> {
    let uploads = request
        .files
        .into_iter()
        .map(|f| UploadedImage::from_base64(f.filename, &f.data))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let session = load(&state, session_id).await?;
    let mut session = session.lock().await;
    let now = chrono::Local::now().naive_local();
    session.replace_files(uploads, state.metadata_reader.as_ref(), now)?;
    Ok(Json(render(&session)))
}

/// PATCH /sessions/:session_id/observations/:image_hash
pub async fn update_observation(
    State(state): State<AppState>,
    Path((session_id, image_hash)): Path<(Uuid, String)>,
    Json(update): Json<FieldUpdate>,
) -> ApiResult<Json<SessionView>> {
    let session = load(&state, session_id).await?;
    let mut session = session.lock().await;
    session.set_observation_fields(&image_hash, update)?;
    Ok(Json(render(&session)))
}

/// GET /sessions/:session_id/observations/:image_hash/record
///
/// The record exactly as it would be uploaded.
pub async fn get_record(
    State(state): State<AppState>,
    Path((session_id, image_hash)): Path<(Uuid, String)>,
) -> ApiResult<Json<ObservationRecord>> {
    let session = load(&state, session_id).await?;
    let session = session.lock().await;
    session
        .observations()
        .get(&image_hash)
        .map(|o| Json(o.to_record()))
        .ok_or_else(|| ApiError::NotFound(format!("Observation {}", image_hash)))
}

/// POST /sessions/:session_id/validate
pub async fn validate(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<SessionView>> {
    let session = load(&state, session_id).await?;
    let mut session = session.lock().await;
    session.validate()?;
    Ok(Json(render(&session)))
}

/// POST /sessions/:session_id/classify
///
/// 502 if any observation fails; the session stays ready to classify.
pub async fn classify(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<SessionView>> {
    let session = load(&state, session_id).await?;
    let mut session = session.lock().await;
    session
        .classify(state.classifier.as_ref(), state.settings.classifier_timeout)
        .await?;
    Ok(Json(render(&session)))
}

/// PUT /sessions/:session_id/observations/:image_hash/class
pub async fn select_class(
    State(state): State<AppState>,
    Path((session_id, image_hash)): Path<(Uuid, String)>,
    Json(request): Json<SelectClassRequest>,
) -> ApiResult<Json<SessionView>> {
    let session = load(&state, session_id).await?;
    let mut session = session.lock().await;
    session.select_class(&image_hash, &request.selected_class)?;
    Ok(Json(render(&session)))
}

/// POST /sessions/:session_id/confirm
pub async fn confirm(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<SessionView>> {
    let session = load(&state, session_id).await?;
    let mut session = session.lock().await;
    session.confirm_review()?;
    Ok(Json(render(&session)))
}

/// POST /sessions/:session_id/upload
///
/// Always advances; per-observation results are in `upload_report`.
pub async fn upload(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<SessionView>> {
    let session = load(&state, session_id).await?;
    let mut session = session.lock().await;
    if !state.settings.enable_push {
        tracing::warn!(
            session_id = %session_id,
            store = state.dataset_store.kind(),
            "Dataset push disabled; writing to in-process store"
        );
    }
    session
        .upload_all(
            state.dataset_store.as_ref(),
            &state.settings.dataset_id,
            state.settings.dataset_timeout,
        )
        .await?;
    Ok(Json(render(&session)))
}

/// Build session routes
pub fn session_routes() -> Router<AppState> {
    Router::new()
        .route("/sessions", post(create_session))
        .route("/sessions/:session_id", get(get_session).delete(delete_session))
        .route("/sessions/:session_id/reset", post(reset_session))
        .route("/sessions/:session_id/author", put(set_author))
        .route(
            "/sessions/:session_id/files",
            put(replace_files).layer(DefaultBodyLimit::max(MAX_FILES_BODY)),
        )
        .route(
            "/sessions/:session_id/observations/:image_hash",
            patch(update_observation),
        )
        .route(
            "/sessions/:session_id/observations/:image_hash/record",
            get(get_record),
        )
        .route(
            "/sessions/:session_id/observations/:image_hash/class",
            put(select_class),
        )
        .route("/sessions/:session_id/validate", post(validate))
        .route("/sessions/:session_id/classify", post(classify))
        .route("/sessions/:session_id/confirm", post(confirm))
        .route("/sessions/:session_id/upload", post(upload))
}
