use axum::extract::{Path, State};
use axum::routing::get;
use axum::Router;

use crate::extractors::JsonBody;
use crate::practice::engine::ProblemUpsert;
use crate::response::{ok, AppError};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/:problem_id", get(get_problem).put(upsert_problem))
}

async fn get_problem(
    State(state): State<AppState>,
    Path(problem_id): Path<String>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let problem = state
        .store()
        .get_problem(&problem_id)?
        .ok_or_else(|| AppError::not_found("problem not found"))?;
    Ok(ok(problem))
}

async fn upsert_problem(
    State(state): State<AppState>,
    Path(problem_id): Path<String>,
    JsonBody(req): JsonBody<ProblemUpsert>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    Ok(ok(state.engine().upsert_problem(&problem_id, req)?))
}
