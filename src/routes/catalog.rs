// Read-only reference data: genres and MPA ratings.
use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};

use crate::domain::{Genre, MpaRating};
use crate::error::AppResult;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/genres", get(list_genres))
        .route("/genres/{id}", get(get_genre))
        .route("/mpa", get(list_mpa))
        .route("/mpa/{id}", get(get_mpa))
}

async fn list_genres(State(state): State<AppState>) -> AppResult<Json<Vec<Genre>>> {
    Ok(Json(state.films.genres().await?))
}

async fn get_genre(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<Genre>> {
    Ok(Json(state.films.genre(id).await?))
}

async fn list_mpa(State(state): State<AppState>) -> AppResult<Json<Vec<MpaRating>>> {
    Ok(Json(state.films.mpa_ratings().await?))
}

async fn get_mpa(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<MpaRating>> {
    Ok(Json(state.films.mpa(id).await?))
}
