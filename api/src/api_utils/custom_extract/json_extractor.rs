use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRef, FromRequest, Request},
};

use abi::errors::Error;

use crate::api_utils::custom_extract::auth::authorize;
use crate::AppState;

/// Authenticated user plus the json body.
pub struct JsonWithAuthExtractor<T>(pub String, pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonWithAuthExtractor<T>
where
    axum::Json<T>: FromRequest<S, Rejection = JsonRejection>,
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        // the token is checked before the body is consumed
        let (mut parts, body) = req.into_parts();
        let app_state = AppState::from_ref(state);
        let user_id = authorize(&mut parts, &app_state.jwt_secret).await?;

        let req = Request::from_parts(parts, body);
        match axum::Json::<T>::from_request(req, state).await {
            Ok(value) => Ok(Self(user_id, value.0)),
            Err(rejection) => Err(Error::body_parsing(rejection.body_text())),
        }
    }
}
