use axum::extract::State;
use axum::routing::get;
use axum::Router;
use serde::Serialize;

use crate::extractors::JsonBody;
use crate::practice::config::PracticeConfig;
use crate::response::{ok, AppError};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(get_config).put(update_config))
}

async fn get_config(
    State(state): State<AppState>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    Ok(ok(state.engine().get_config().await))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ConfigUpdated {
    version: u32,
    config: PracticeConfig,
}

async fn update_config(
    State(state): State<AppState>,
    JsonBody(config): JsonBody<PracticeConfig>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let version = state.engine().reload_config(config).await?;
    Ok(ok(ConfigUpdated {
        version,
        config: state.engine().get_config().await,
    }))
}
