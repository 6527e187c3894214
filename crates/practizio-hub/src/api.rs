use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use practizio_core::{parse_id, NewPractice, PracticeId, PracticePatch};
use practizio_storage::{PracticeStore, RecordKind, StoreError, StoreErrorKind};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, warn};

pub type SharedStore = Arc<PracticeStore>;

const STORAGE_FAILURE_MESSAGE: &str = "The practice store could not complete the request";

pub fn router(store: SharedStore) -> Router {
    let practices = Router::new()
        .route("/", get(list_practices).post(create_practice))
        .route("/meta/categories", get(list_categories))
        .route("/search", get(search_practices))
        .route("/category/:category", get(list_by_category))
        .route(
            "/:id",
            get(get_practice)
                .put(update_practice)
                .delete(delete_practice),
        )
        .route(
            "/:id/system-prompt",
            get(get_system_prompt)
                .put(put_system_prompt)
                .delete(delete_system_prompt),
        );

    Router::new()
        .route("/api/health", get(health))
        .nest("/api/practices", practices)
        .with_state(store)
}

#[derive(Debug, Serialize)]
struct Envelope<T> {
    success: bool,
    data: T,
}

fn ok<T: Serialize>(data: T) -> Json<Envelope<T>> {
    Json(Envelope {
        success: true,
        data,
    })
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    error: String,
    message: Option<String>,
}

impl ApiError {
    fn bad_request(error: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error: error.into(),
            message: None,
        }
    }

    fn not_found(kind: RecordKind) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            error: not_found_label(kind).to_string(),
            message: None,
        }
    }

    fn internal(context: &'static str) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            error: context.to_string(),
            message: Some(STORAGE_FAILURE_MESSAGE.to_string()),
        }
    }

    /// Maps a store failure to a response. Storage details (paths, OS
    /// errors) go to the log only.
    fn store(context: &'static str, err: StoreError) -> Self {
        match (&err, err.kind()) {
            (_, StoreErrorKind::Storage) => {
                error!(event = "request_failed", kind = "storage", context, error = %err);
                Self::internal(context)
            }
            (StoreError::NotFound { kind, .. }, _) => Self {
                message: Some(err.to_string()),
                ..Self::not_found(*kind)
            },
            (_, StoreErrorKind::Conflict) => {
                warn!(event = "request_failed", kind = "conflict", context, error = %err);
                Self {
                    status: StatusCode::CONFLICT,
                    error: context.to_string(),
                    message: Some(err.to_string()),
                }
            }
            _ => Self {
                status: StatusCode::BAD_REQUEST,
                error: context.to_string(),
                message: Some(err.to_string()),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut body = json!({
            "success": false,
            "error": self.error,
        });
        if let Some(message) = self.message {
            body["message"] = Value::String(message);
        }
        (self.status, Json(body)).into_response()
    }
}

fn not_found_label(kind: RecordKind) -> &'static str {
    match kind {
        RecordKind::Practice => "Practice not found",
        RecordKind::SystemPrompt => "System prompt not found",
    }
}

/// Ids that do not parse can never match a record.
fn practice_id(raw: &str) -> Result<PracticeId, ApiError> {
    parse_id(raw).ok_or_else(|| ApiError::not_found(RecordKind::Practice))
}

/// Runs a store call off the async runtime; store operations block on file
/// I/O and the store lock.
async fn with_store<T, F>(store: &SharedStore, context: &'static str, op: F) -> Result<T, ApiError>
where
    F: FnOnce(&PracticeStore) -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    let store = Arc::clone(store);
    match tokio::task::spawn_blocking(move || op(&store)).await {
        Ok(result) => result.map_err(|err| ApiError::store(context, err)),
        Err(err) => {
            error!(event = "request_failed", kind = "join", context, error = %err);
            Err(ApiError::internal(context))
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PracticeBody {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub system_prompt: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PromptBody {
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: Option<String>,
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "message": "Practizio API is running" }))
}

async fn list_practices(State(store): State<SharedStore>) -> Result<impl IntoResponse, ApiError> {
    let practices = with_store(&store, "Failed to get practices", |store| {
        store.list_practices()
    })
    .await?;
    Ok(ok(practices))
}

async fn get_practice(
    State(store): State<SharedStore>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = practice_id(&id)?;
    let practice = with_store(&store, "Failed to get practice", move |store| {
        store.practice_with_prompt(id)
    })
    .await?;
    Ok(ok(practice))
}

async fn list_by_category(
    State(store): State<SharedStore>,
    Path(category): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let practices = with_store(&store, "Failed to get practices by category", move |store| {
        store.list_by_category(&category)
    })
    .await?;
    Ok(ok(practices))
}

async fn search_practices(
    State(store): State<SharedStore>,
    Query(params): Query<SearchParams>,
) -> Result<impl IntoResponse, ApiError> {
    let query =
        non_blank(params.q).ok_or_else(|| ApiError::bad_request("Search query is required"))?;
    let practices = with_store(&store, "Failed to search practices", move |store| {
        store.search_practices(&query)
    })
    .await?;
    Ok(ok(practices))
}

async fn list_categories(State(store): State<SharedStore>) -> Result<impl IntoResponse, ApiError> {
    let categories = with_store(&store, "Failed to get categories", |store| {
        store.list_categories()
    })
    .await?;
    Ok(ok(categories))
}

async fn create_practice(
    State(store): State<SharedStore>,
    body: Result<Json<PracticeBody>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(body) = body.map_err(|err| ApiError::bad_request(err.body_text()))?;
    let (Some(title), Some(description), Some(category)) = (
        non_blank(body.title),
        non_blank(body.description),
        non_blank(body.category),
    ) else {
        return Err(ApiError::bad_request(
            "Title, description, and category are required",
        ));
    };
    let new = NewPractice {
        title,
        description,
        tags: body.tags.unwrap_or_default(),
        category,
    };
    let system_prompt = non_blank(body.system_prompt);

    // The practice and its prompt are two store writes; a failed prompt write
    // removes the practice again so the request leaves nothing behind.
    let practice = with_store(&store, "Failed to create practice", move |store| {
        let practice = store.create_practice(new)?;
        if let Some(content) = system_prompt {
            if let Err(err) = store.create_system_prompt(practice.id, content) {
                if let Err(rollback) = store.delete_practice(practice.id) {
                    warn!(
                        event = "create_rollback_failed",
                        practice_id = practice.id,
                        error = %rollback
                    );
                }
                return Err(err);
            }
        }
        store.practice_with_prompt(practice.id)
    })
    .await?;
    Ok((StatusCode::CREATED, ok(practice)))
}

async fn update_practice(
    State(store): State<SharedStore>,
    Path(id): Path<String>,
    body: Result<Json<PracticeBody>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let id = practice_id(&id)?;
    let Json(body) = body.map_err(|err| ApiError::bad_request(err.body_text()))?;
    // Blank fields keep the stored value.
    let patch = PracticePatch {
        title: non_blank(body.title),
        description: non_blank(body.description),
        tags: body.tags,
        category: non_blank(body.category),
    };
    let system_prompt = non_blank(body.system_prompt);

    let practice = with_store(&store, "Failed to update practice", move |store| {
        store.update_practice(id, patch)?;
        if let Some(content) = system_prompt {
            store.upsert_system_prompt(id, content)?;
        }
        store.practice_with_prompt(id)
    })
    .await?;
    Ok(ok(practice))
}

async fn delete_practice(
    State(store): State<SharedStore>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = practice_id(&id)?;
    with_store(&store, "Failed to delete practice", move |store| {
        store.delete_practice(id)
    })
    .await?;
    Ok(Json(json!({
        "success": true,
        "message": "Practice deleted successfully"
    })))
}

async fn get_system_prompt(
    State(store): State<SharedStore>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = practice_id(&id)?;
    let prompt = with_store(&store, "Failed to get system prompt", move |store| {
        store.get_practice(id)?;
        store.system_prompt_for_practice(id)
    })
    .await?;
    Ok(ok(prompt))
}

async fn put_system_prompt(
    State(store): State<SharedStore>,
    Path(id): Path<String>,
    body: Result<Json<PromptBody>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let id = practice_id(&id)?;
    let Json(body) = body.map_err(|err| ApiError::bad_request(err.body_text()))?;
    let content =
        non_blank(body.content).ok_or_else(|| ApiError::bad_request("Content is required"))?;
    let prompt = with_store(&store, "Failed to save system prompt", move |store| {
        store.upsert_system_prompt(id, content)
    })
    .await?;
    Ok(ok(prompt))
}

async fn delete_system_prompt(
    State(store): State<SharedStore>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = practice_id(&id)?;
    let deleted = with_store(&store, "Failed to delete system prompt", move |store| {
        store.get_practice(id)?;
        store.delete_system_prompt_for_practice(id)
    })
    .await?;
    Ok(ok(json!({ "deleted": deleted })))
}
