use axum::{
    async_trait,
    extract::{rejection::PathRejection, FromRef, FromRequestParts},
    http::request::Parts,
};
use serde::de::DeserializeOwned;

use abi::errors::Error;

use crate::api_utils::custom_extract::auth::authorize;
use crate::AppState;

/// Authenticated user plus the path parameters.
pub struct PathWithAuthExtractor<T>(pub String, pub T);

#[async_trait]
impl<S, T> FromRequestParts<S> for PathWithAuthExtractor<T>
where
    // these trait bounds are copied from `FromRequestParts for axum::extract::path::Path`
    T: DeserializeOwned + Send,
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = AppState::from_ref(state);
        let user_id = authorize(parts, &app_state.jwt_secret).await?;

        match axum::extract::Path::<T>::from_request_parts(parts, state).await {
            Ok(value) => Ok(Self(user_id, value.0)),
            Err(rejection) => Err(match rejection {
                PathRejection::FailedToDeserializePathParams(inner) => {
                    Error::path_parsing(inner.body_text())
                }
                PathRejection::MissingPathParams(error) => {
                    Error::internal_with_details(error.to_string())
                }
                _ => Error::internal_with_details(format!(
                    "Unhandled path rejection: {rejection}"
                )),
            }),
        }
    }
}
