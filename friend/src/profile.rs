use tracing::debug;

use abi::errors::{Error, Result};
use abi::model::{CollectionPath, DocPath, FieldValue, User, EMAIL};

use crate::FriendService;

impl FriendService {
    pub async fn get_user(&self, user_id: &str) -> Result<User> {
        self.lookup_profile(user_id)
            .await?
            .ok_or_else(|| Error::not_found_with_details(format!("user {}", user_id)))
    }

    /// exact email match, never returns the requester
    pub async fn search_users(&self, requester: &str, email: &str) -> Result<Vec<User>> {
        let email = email.trim();
        if email.is_empty() {
            return Ok(Vec::new());
        }
        let docs = self
            .store
            .find_by_field(&CollectionPath::users(), EMAIL, &FieldValue::from(email))
            .await?;
        Ok(docs
            .iter()
            .map(User::from)
            .filter(|user| user.id != requester)
            .collect())
    }

    pub(crate) async fn lookup_profile(&self, user_id: &str) -> Result<Option<User>> {
        let doc = self.store.get(&DocPath::user(user_id)?).await?;
        if doc.is_none() {
            debug!("no profile for user {}", user_id);
        }
        Ok(doc.as_ref().map(User::from))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use abi::errors::ErrorKind;
    use db::{DocumentStore, MemoryStore};

    use super::*;

    async fn seeded() -> FriendService {
        let store = Arc::new(MemoryStore::new());
        for user in [
            User::new("alice", "Alice", "alice@example.com"),
            User::new("bob", "Bob", "bob@example.com"),
        ] {
            store.set(&user.path().unwrap(), user.fields()).await.unwrap();
        }
        FriendService::new(store)
    }

    #[tokio::test]
    async fn get_user_should_work() {
        let service = seeded().await;
        let bob = service.get_user("bob").await.unwrap();
        assert_eq!(bob, User::new("bob", "Bob", "bob@example.com"));

        let err = service.get_user("carol").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn search_should_exclude_requester() {
        let service = seeded().await;
        let found = service
            .search_users("alice", " bob@example.com ")
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "bob");

        assert!(service
            .search_users("alice", "alice@example.com")
            .await
            .unwrap()
            .is_empty());
        assert!(service.search_users("alice", "   ").await.unwrap().is_empty());
    }
}
