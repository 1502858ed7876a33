use axum::extract::State;
use axum::Json;

use abi::errors::Error;
use abi::model::User;

use crate::api_utils::custom_extract::{AuthExtractor, PathWithAuthExtractor};
use crate::handlers::users::gen_token;
use crate::AppState;

pub async fn get_user_by_id(
    State(app_state): State<AppState>,
    PathWithAuthExtractor(_, id): PathWithAuthExtractor<String>,
) -> Result<Json<User>, Error> {
    let user = app_state.service.get_user(&id).await?;
    Ok(Json(user))
}

/// exact match on the email, the caller never finds itself
pub async fn search_user(
    State(app_state): State<AppState>,
    PathWithAuthExtractor(user_id, email): PathWithAuthExtractor<String>,
) -> Result<Json<Vec<User>>, Error> {
    let users = app_state.service.search_users(&user_id, &email).await?;
    Ok(Json(users))
}

/// a fresh token for a still valid one
pub async fn refresh_token(
    State(app_state): State<AppState>,
    AuthExtractor(user_id): AuthExtractor,
) -> Result<String, Error> {
    gen_token(&app_state.jwt_secret, &user_id, app_state.jwt_expires_secs)
}
