use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;

use crate::domain::Film;
use crate::error::AppResult;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/films", post(create_film).put(update_film).get(list_films))
        .route("/films/popular", get(popular_films))
        .route("/films/{id}", get(get_film).delete(delete_film))
        .route(
            "/films/{id}/like/{user_id}",
            put(add_like).delete(remove_like),
        )
}

async fn create_film(
    State(state): State<AppState>,
    Json(film): Json<Film>,
) -> AppResult<Json<Film>> {
    let created = state.films.create(film).await?;
    tracing::info!("created film {}", created.id);
    Ok(Json(created))
}

async fn update_film(
    State(state): State<AppState>,
    Json(film): Json<Film>,
) -> AppResult<Json<Film>> {
    Ok(Json(state.films.update(film).await?))
}

async fn list_films(State(state): State<AppState>) -> AppResult<Json<Vec<Film>>> {
    Ok(Json(state.films.list().await?))
}

async fn get_film(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<Film>> {
    Ok(Json(state.films.get(id).await?))
}

async fn delete_film(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<impl IntoResponse> {
    state.films.delete(id).await?;
    tracing::info!("deleted film {}", id);
    Ok(StatusCode::NO_CONTENT)
}

async fn add_like(
    State(state): State<AppState>,
    Path((id, user_id)): Path<(i64, i64)>,
) -> AppResult<impl IntoResponse> {
    state.films.add_like(id, user_id).await?;
    Ok(StatusCode::OK)
}

async fn remove_like(
    State(state): State<AppState>,
    Path((id, user_id)): Path<(i64, i64)>,
) -> AppResult<impl IntoResponse> {
    state.films.remove_like(id, user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
struct PopularQuery {
    count: Option<i64>,
}

async fn popular_films(
    State(state): State<AppState>,
    Query(query): Query<PopularQuery>,
) -> AppResult<Json<Vec<Film>>> {
    Ok(Json(state.films.most_popular(query.count).await?))
}
