use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::debug;

use abi::errors::Error;
use abi::model::{
    AcceptOutcome, FriendWithUser, FriendshipState, IncomingRequest, RemoveOutcome, SendOutcome,
};

use crate::api_utils::custom_extract::{AuthExtractor, JsonWithAuthExtractor, PathWithAuthExtractor};
use crate::AppState;

#[derive(Debug, Deserialize, Serialize)]
pub struct NewFriendRequest {
    pub friend_id: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct StateReply {
    pub user_id: String,
    pub other_id: String,
    pub state: FriendshipState,
}

pub async fn send_request(
    State(app_state): State<AppState>,
    JsonWithAuthExtractor(user_id, new_request): JsonWithAuthExtractor<NewFriendRequest>,
) -> Result<Json<SendOutcome>, Error> {
    debug!("{} asks {}", user_id, new_request.friend_id);
    let outcome = app_state
        .service
        .send_request(&user_id, &new_request.friend_id)
        .await?;
    Ok(Json(outcome))
}

pub async fn get_incoming_requests(
    State(app_state): State<AppState>,
    AuthExtractor(user_id): AuthExtractor,
) -> Result<Json<Vec<IncomingRequest>>, Error> {
    let list = app_state.service.list_incoming_requests(&user_id).await?;
    Ok(Json(list))
}

pub async fn accept_request(
    State(app_state): State<AppState>,
    PathWithAuthExtractor(user_id, sender_id): PathWithAuthExtractor<String>,
) -> Result<Json<AcceptOutcome>, Error> {
    let outcome = app_state.service.accept_request(&user_id, &sender_id).await?;
    Ok(Json(outcome))
}

pub async fn decline_request(
    State(app_state): State<AppState>,
    PathWithAuthExtractor(user_id, sender_id): PathWithAuthExtractor<String>,
) -> Result<(), Error> {
    app_state.service.decline_request(&user_id, &sender_id).await
}

pub async fn cancel_request(
    State(app_state): State<AppState>,
    PathWithAuthExtractor(user_id, recipient_id): PathWithAuthExtractor<String>,
) -> Result<(), Error> {
    app_state
        .service
        .cancel_request(&user_id, &recipient_id)
        .await
}

pub async fn get_friends_list(
    State(app_state): State<AppState>,
    AuthExtractor(user_id): AuthExtractor,
) -> Result<Json<Vec<FriendWithUser>>, Error> {
    let friends = app_state.service.list_friends(&user_id).await?;
    Ok(Json(friends))
}

pub async fn delete_friend(
    State(app_state): State<AppState>,
    PathWithAuthExtractor(user_id, friend_id): PathWithAuthExtractor<String>,
) -> Result<Json<RemoveOutcome>, Error> {
    let outcome = app_state.service.remove_friend(&user_id, &friend_id).await?;
    Ok(Json(outcome))
}

pub async fn get_friendship_state(
    State(app_state): State<AppState>,
    PathWithAuthExtractor(user_id, other_id): PathWithAuthExtractor<String>,
) -> Result<Json<StateReply>, Error> {
    let state = app_state
        .service
        .friendship_state(&user_id, &other_id)
        .await?;
    Ok(Json(StateReply {
        user_id,
        other_id,
        state,
    }))
}
