use std::sync::Arc;

use tracing::info;

use abi::config::Config;
use abi::errors::Result;
use db::DocumentStore;
use friend::FriendService;

mod api_utils;
pub(crate) mod handlers;
pub(crate) mod routes;

pub use handlers::users::{gen_token, Claims};

#[derive(Clone, Debug)]
pub struct AppState {
    pub service: FriendService,
    pub jwt_secret: String,
    pub jwt_expires_secs: i64,
}

impl AppState {
    pub fn new(config: &Config, store: Arc<dyn DocumentStore>) -> Self {
        Self {
            service: FriendService::new(store),
            jwt_secret: config.jwt.secret.clone(),
            jwt_expires_secs: config.jwt.expires_secs,
        }
    }
}

/// serve the http api until the listener fails
pub async fn start(config: &Config, store: Arc<dyn DocumentStore>) -> Result<()> {
    let state = AppState::new(config, store);
    let app = routes::app_routes(state);
    let listener = tokio::net::TcpListener::bind(&config.server.server_url()).await?;
    info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
