use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;

use crate::extractors::{JsonBody, QueryParams};
use crate::practice::engine::{NewLearner, RecommendationRequest, ReviewSubmission};
use crate::practice::scheduler::SchedulerParameters;
use crate::response::{created, ok, AppError};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(register_learner))
        .route("/:learner_id", get(get_learner))
        .route(
            "/:learner_id/parameters",
            get(get_parameters).put(set_parameters),
        )
        .route("/:learner_id/queue", get(get_queue))
        .route("/:learner_id/stats", get(get_stats))
        .route("/:learner_id/cards/:problem_id", get(get_card))
        .route("/:learner_id/cards/:problem_id/preview", post(preview_card))
        .route("/:learner_id/reviews", get(list_reviews).post(submit_review))
        .route("/:learner_id/profile", get(get_profile))
        .route("/:learner_id/recommendations", post(recommend))
}

async fn register_learner(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<NewLearner>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let learner = state.engine().register_learner(req).await?;
    Ok(created(learner))
}

async fn get_learner(
    State(state): State<AppState>,
    Path(learner_id): Path<String>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    Ok(ok(state.engine().get_learner(&learner_id)?))
}

async fn get_parameters(
    State(state): State<AppState>,
    Path(learner_id): Path<String>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    Ok(ok(state.engine().learner_parameters(&learner_id).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetParametersRequest {
    /// `null` resets to the configured defaults.
    parameters: Option<SchedulerParameters>,
}

async fn set_parameters(
    State(state): State<AppState>,
    Path(learner_id): Path<String>,
    JsonBody(req): JsonBody<SetParametersRequest>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let effective = state
        .engine()
        .set_learner_parameters(&learner_id, req.parameters)
        .await?;
    Ok(ok(effective))
}

#[derive(Debug, Deserialize)]
struct LimitQuery {
    limit: Option<usize>,
}

async fn get_queue(
    State(state): State<AppState>,
    Path(learner_id): Path<String>,
    QueryParams(query): QueryParams<LimitQuery>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    state.engine().ensure_learner(&learner_id)?;
    let queue = state
        .engine()
        .generate_queue(&learner_id, query.limit)
        .await?;
    Ok(ok(queue))
}

async fn get_stats(
    State(state): State<AppState>,
    Path(learner_id): Path<String>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    state.engine().ensure_learner(&learner_id)?;
    Ok(ok(state.engine().learning_stats(&learner_id).await?))
}

async fn get_card(
    State(state): State<AppState>,
    Path((learner_id, problem_id)): Path<(String, String)>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let card = state
        .engine()
        .get_or_create_card(&learner_id, &problem_id)
        .await?;
    Ok(ok(card))
}

async fn preview_card(
    State(state): State<AppState>,
    Path((learner_id, problem_id)): Path<(String, String)>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let preview = state
        .engine()
        .preview_intervals(&learner_id, &problem_id)
        .await?;
    Ok(ok(preview))
}

async fn submit_review(
    State(state): State<AppState>,
    Path(learner_id): Path<String>,
    JsonBody(req): JsonBody<ReviewSubmission>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let result = state.engine().submit_review(&learner_id, req).await?;
    Ok(created(result))
}

async fn list_reviews(
    State(state): State<AppState>,
    Path(learner_id): Path<String>,
    QueryParams(query): QueryParams<LimitQuery>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    state.engine().ensure_learner(&learner_id)?;
    Ok(ok(state.engine().list_reviews(&learner_id, query.limit)?))
}

#[derive(Debug, Deserialize)]
struct ProfileQuery {
    #[serde(default)]
    refresh: bool,
}

async fn get_profile(
    State(state): State<AppState>,
    Path(learner_id): Path<String>,
    QueryParams(query): QueryParams<ProfileQuery>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    state.engine().ensure_learner(&learner_id)?;
    let profile = state
        .engine()
        .build_profile(&learner_id, query.refresh)
        .await?;
    Ok(ok(profile))
}

async fn recommend(
    State(state): State<AppState>,
    Path(learner_id): Path<String>,
    JsonBody(req): JsonBody<RecommendationRequest>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    state.engine().ensure_learner(&learner_id)?;
    Ok(ok(state.engine().recommend(&learner_id, req).await?))
}
