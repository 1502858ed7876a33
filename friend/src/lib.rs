use std::sync::Arc;

use abi::errors::{Error, Result};
use db::DocumentStore;

mod profile;
mod reconciler;
mod request;

/// Request/accept/remove operations on the friendship graph.
///
/// A friendship is two independent edges, `users/{a}/friends/{b}` and
/// `users/{b}/friends/{a}`, written one after the other. Nothing here is
/// transactional across documents; a one-sided pair is completed later by
/// the healer.
#[derive(Debug, Clone)]
pub struct FriendService {
    store: Arc<dyn DocumentStore>,
}

impl FriendService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }
}

fn ensure_distinct(user_id: &str, other_id: &str) -> Result<()> {
    if user_id == other_id {
        return Err(Error::bad_request(
            "a user cannot be their own friend".to_string(),
        ));
    }
    Ok(())
}
