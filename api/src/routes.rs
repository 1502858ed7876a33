use axum::routing::{delete, get, post, put};
use axum::Router;

use crate::handlers::friends::event_handlers::friend_events;
use crate::handlers::friends::friend_handlers::{
    accept_request, cancel_request, decline_request, delete_friend, get_friends_list,
    get_friendship_state, get_incoming_requests, send_request,
};
use crate::handlers::users::{get_user_by_id, refresh_token, search_user};
use crate::AppState;

pub(crate) fn app_routes(state: AppState) -> Router {
    Router::new()
        .nest("/user", user_routes(state.clone()))
        .nest("/friend", friend_routes(state))
}

fn friend_routes(state: AppState) -> Router {
    Router::new()
        .route("/", get(get_friends_list))
        .route("/:friend_id", delete(delete_friend))
        .route("/request", post(send_request).get(get_incoming_requests))
        .route(
            "/request/:sender_id",
            put(accept_request).delete(decline_request),
        )
        .route("/request/outgoing/:recipient_id", delete(cancel_request))
        .route("/state/:other_id", get(get_friendship_state))
        .route("/events", get(friend_events))
        .with_state(state)
}

fn user_routes(state: AppState) -> Router {
    Router::new()
        .route("/:id", get(get_user_by_id))
        .route("/search/:email", get(search_user))
        .route("/refresh_token", get(refresh_token))
        .with_state(state)
}
