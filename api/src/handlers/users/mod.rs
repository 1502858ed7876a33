use jsonwebtoken::{encode, EncodingKey, Header};
use serde::{Deserialize, Serialize};

use abi::errors::Error;

mod user_handlers;

pub use user_handlers::*;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    pub fn new(sub: String, expires_secs: i64) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            sub,
            exp: now + expires_secs,
            iat: now,
        }
    }
}

/// sign a token whose subject is `user_id`
pub fn gen_token(secret: &str, user_id: &str, expires_secs: i64) -> Result<String, Error> {
    let claims = Claims::new(user_id.to_string(), expires_secs);
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(Error::internal)?;
    Ok(token)
}
