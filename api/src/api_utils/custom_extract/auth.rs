use axum::extract::{FromRef, FromRequestParts};
use axum::http::request::Parts;
use axum::{async_trait, extract::MatchedPath, RequestPartsExt};
use jsonwebtoken::{decode, DecodingKey, Validation};

use abi::errors::Error;

use crate::handlers::users::Claims;
use crate::AppState;

const AUTHORIZATION_HEADER: &str = "Authorization";
const BEARER: &str = "Bearer";

/// The acting user, taken from the `sub` of the bearer token.
pub struct AuthExtractor(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for AuthExtractor
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = AppState::from_ref(state);
        authorize(parts, &app_state.jwt_secret).await.map(Self)
    }
}

/// Verify the bearer token of the request and return its subject.
pub(crate) async fn authorize(parts: &mut Parts, secret: &str) -> Result<String, Error> {
    let path = parts
        .extract::<MatchedPath>()
        .await
        .map(|path| path.as_str().to_owned())
        .unwrap_or_default();

    let header = parts
        .headers
        .get(AUTHORIZATION_HEADER)
        .and_then(|header| header.to_str().ok())
        .ok_or_else(|| Error::unauthorized_with_details(format!("no token for {}", path)))?;

    let mut pieces = header.split_whitespace();
    let token = match (pieces.next(), pieces.next()) {
        (Some(BEARER), Some(token)) => token,
        _ => {
            return Err(Error::unauthorized_with_details(format!(
                "malformed authorization for {}",
                path
            )))
        }
    };

    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(data.claims.sub)
}
