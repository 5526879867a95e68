use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Json, Router};

use crate::domain::User;
use crate::error::AppResult;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users", post(create_user).put(update_user).get(list_users))
        .route("/users/{id}", get(get_user).delete(delete_user))
        .route("/users/{id}/friends", get(get_friends))
        .route(
            "/users/{id}/friends/common/{other_id}",
            get(common_friends),
        )
        .route(
            "/users/{id}/friends/{friend_id}",
            put(add_friend).delete(remove_friend),
        )
}

async fn create_user(
    State(state): State<AppState>,
    Json(user): Json<User>,
) -> AppResult<Json<User>> {
    let created = state.users.create(user).await?;
    tracing::info!("created user {}", created.id);
    Ok(Json(created))
}

async fn update_user(
    State(state): State<AppState>,
    Json(user): Json<User>,
) -> AppResult<Json<User>> {
    Ok(Json(state.users.update(user).await?))
}

async fn list_users(State(state): State<AppState>) -> AppResult<Json<Vec<User>>> {
    Ok(Json(state.users.list().await?))
}

async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<User>> {
    Ok(Json(state.users.get(id).await?))
}

async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<impl IntoResponse> {
    state.users.delete(id).await?;
    tracing::info!("deleted user {}", id);
    Ok(StatusCode::NO_CONTENT)
}

async fn add_friend(
    State(state): State<AppState>,
    Path((id, friend_id)): Path<(i64, i64)>,
) -> AppResult<Json<serde_json::Value>> {
    let outcome = state.users.add_friend(id, friend_id).await?;
    tracing::info!("user {} added friend {}", id, friend_id);
    Ok(Json(serde_json::json!({ "message": outcome.message })))
}

async fn remove_friend(
    State(state): State<AppState>,
    Path((id, friend_id)): Path<(i64, i64)>,
) -> AppResult<Json<serde_json::Value>> {
    let outcome = state.users.remove_friend(id, friend_id).await?;
    tracing::info!("user {} removed friend {}", id, friend_id);
    Ok(Json(serde_json::json!({ "message": outcome.message })))
}

async fn get_friends(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<Vec<User>>> {
    Ok(Json(state.users.get_friends(id).await?))
}

async fn common_friends(
    State(state): State<AppState>,
    Path((id, other_id)): Path<(i64, i64)>,
) -> AppResult<Json<Vec<User>>> {
    Ok(Json(state.users.get_common_friends(id, other_id).await?))
}
