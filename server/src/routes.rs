use crate::ApiError;
use crate::AppState;
use crate::auth::API_KEY_HEADER;
use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::HeaderMap;
use backlink_core::LinkRequest;
use backlink_core::ingest;
use backlink_state::QueueCounts;
use serde::Deserialize;
use serde::Serialize;
use tracing::error;
use tracing::info;

/// One element of the `POST /add/` body. Extra fields such as `status` and
/// `id` are accepted and ignored; every item is queued as pending.
#[derive(Debug, Deserialize)]
pub struct PostedLink {
    pub edition_id: String,
    #[serde(alias = "ocaid")]
    pub archive_id: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AddResponse {
    pub status: String,
    pub inserted: usize,
}

async fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let presented = headers
        .get(API_KEY_HEADER)
        .map(|value| value.to_str().map_err(|_| ApiError::InvalidApiKey))
        .transpose()?;
    state.api_keys.verify(presented).await
}

pub(crate) async fn add_links(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<Vec<PostedLink>>, JsonRejection>,
) -> Result<Json<AddResponse>, ApiError> {
    authorize(&state, &headers).await?;
    let Json(posted) = body.map_err(|rejection| ApiError::Unprocessable(rejection.body_text()))?;

    let requests = posted
        .iter()
        .enumerate()
        .map(|(index, link)| {
            LinkRequest::parse(&link.edition_id, &link.archive_id)
                .map_err(|err| ApiError::Unprocessable(format!("item {index}: {err}")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let inserted = ingest(&state.store, &requests).await.map_err(|err| {
        error!("failed to queue posted links: {err:#}");
        ApiError::Internal("failed to queue link requests".to_string())
    })?;
    info!(count = inserted.len(), "accepted link requests over HTTP");
    Ok(Json(AddResponse {
        status: "success".to_string(),
        inserted: inserted.len(),
    }))
}

pub(crate) async fn queue_status(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<QueueCounts>, ApiError> {
    authorize(&state, &headers).await?;
    let counts = state.store.counts().await.map_err(|err| {
        error!("failed to count work items: {err:#}");
        ApiError::Internal("failed to read queue status".to_string())
    })?;
    Ok(Json(counts))
}
