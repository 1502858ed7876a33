use futures::stream::{BoxStream, StreamExt};
use tracing::{debug, info, warn};

use abi::errors::{Error, Result};
use abi::model::{
    CollectionPath, DocPath, Document, FriendRequest, IncomingRequest, SendOutcome,
};

use crate::{ensure_distinct, FriendService};

impl FriendService {
    /// Ask `recipient` to become friends with `sender`.
    ///
    /// Sending twice only refreshes the timestamp of the same request. If the
    /// recipient already asked the sender, that request is accepted instead.
    pub async fn send_request(&self, sender: &str, recipient: &str) -> Result<SendOutcome> {
        ensure_distinct(sender, recipient)?;
        let request_path = DocPath::friend_request(recipient, sender)?;

        if self
            .store
            .exists(&DocPath::friend_edge(sender, recipient)?)
            .await?
        {
            return Err(Error::conflict(format!(
                "{} and {} are already friends",
                sender, recipient
            )));
        }

        if self
            .store
            .exists(&DocPath::friend_request(sender, recipient)?)
            .await?
        {
            info!(
                "{} already asked {}, accepting instead of sending",
                recipient, sender
            );
            let outcome = self.accept_request(sender, recipient).await?;
            return Ok(SendOutcome::Accepted { outcome });
        }

        let doc = self
            .store
            .set(&request_path, FriendRequest::fields(sender))
            .await?;
        debug!("friend request {} -> {} stored", sender, recipient);
        Ok(SendOutcome::Requested {
            request: FriendRequest::try_from(&doc)?,
        })
    }

    pub async fn list_incoming_requests(&self, user_id: &str) -> Result<Vec<IncomingRequest>> {
        let docs = self
            .store
            .list(&CollectionPath::friend_requests(user_id)?)
            .await?;
        self.enrich_requests(docs).await
    }

    /// Pending requests of `user_id`, re-emitted after every change.
    pub fn watch_incoming_requests(
        &self,
        user_id: &str,
    ) -> Result<BoxStream<'static, Result<Vec<IncomingRequest>>>> {
        let collection = CollectionPath::friend_requests(user_id)?;
        let service = self.clone();
        Ok(db::watch_collection(self.store.clone(), collection)
            .then(move |snapshot| {
                let service = service.clone();
                async move { service.enrich_requests(snapshot?).await }
            })
            .boxed())
    }

    /// The recipient turns down the request of `sender`.
    pub async fn decline_request(&self, recipient: &str, sender: &str) -> Result<()> {
        let path = DocPath::friend_request(recipient, sender)?;
        self.delete_request(&path).await?;
        info!("{} declined the request of {}", recipient, sender);
        Ok(())
    }

    /// The sender withdraws a request it has not had answered yet.
    pub async fn cancel_request(&self, sender: &str, recipient: &str) -> Result<()> {
        let path = DocPath::friend_request(recipient, sender)?;
        self.delete_request(&path).await?;
        info!("{} cancelled the request to {}", sender, recipient);
        Ok(())
    }

    async fn delete_request(&self, path: &DocPath) -> Result<()> {
        if !self.store.exists(path).await? {
            return Err(Error::not_found_with_details(format!(
                "no friend request at {}",
                path
            )));
        }
        self.store.delete(path).await
    }

    // one profile read per request
    async fn enrich_requests(&self, docs: Vec<Document>) -> Result<Vec<IncomingRequest>> {
        let mut requests = Vec::with_capacity(docs.len());
        for doc in &docs {
            let request = match FriendRequest::try_from(doc) {
                Ok(request) => request,
                Err(e) => {
                    warn!("skip malformed request {}: {}", doc.path, e);
                    continue;
                }
            };
            if let Some(user) = self.lookup_profile(&request.from_user_id).await? {
                requests.push(IncomingRequest {
                    user,
                    created_at: request.created_at,
                });
            }
        }
        requests.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.user.id.cmp(&b.user.id))
        });
        Ok(requests)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use abi::errors::ErrorKind;
    use abi::model::{FriendshipState, User};
    use db::{DocumentStore, MemoryStore};

    use super::*;

    async fn setup() -> (Arc<MemoryStore>, FriendService) {
        let store = Arc::new(MemoryStore::new());
        for user in [
            User::new("alice", "Alice", "alice@example.com"),
            User::new("bob", "Bob", "bob@example.com"),
            User::new("carol", "Carol", "carol@example.com"),
        ] {
            store.set(&user.path().unwrap(), user.fields()).await.unwrap();
        }
        let service = FriendService::new(store.clone());
        (store, service)
    }

    async fn next(
        watch: &mut BoxStream<'static, Result<Vec<IncomingRequest>>>,
    ) -> Vec<IncomingRequest> {
        tokio::time::timeout(Duration::from_secs(1), watch.next())
            .await
            .expect("watch stalled")
            .expect("watch ended")
            .unwrap()
    }

    #[tokio::test]
    async fn send_request_should_work() {
        let (store, service) = setup().await;
        let outcome = service.send_request("alice", "bob").await.unwrap();
        let SendOutcome::Requested { request } = outcome else {
            panic!("expected a plain request");
        };
        assert_eq!(request.from_user_id, "alice");
        assert_eq!(request.to_user_id, "bob");
        assert!(store
            .exists(&DocPath::friend_request("bob", "alice").unwrap())
            .await
            .unwrap());
        assert_eq!(
            service.friendship_state("alice", "bob").await.unwrap(),
            FriendshipState::Requested
        );
    }

    #[tokio::test]
    async fn resend_should_keep_a_single_request() {
        let (store, service) = setup().await;
        service.send_request("alice", "bob").await.unwrap();
        let before = store.len();
        service.send_request("alice", "bob").await.unwrap();
        assert_eq!(store.len(), before);
        assert_eq!(service.list_incoming_requests("bob").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn self_request_should_be_rejected() {
        let (_, service) = setup().await;
        let err = service.send_request("alice", "alice").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);
    }

    #[tokio::test]
    async fn request_to_friend_should_conflict() {
        let (_, service) = setup().await;
        service.send_request("alice", "bob").await.unwrap();
        service.accept_request("bob", "alice").await.unwrap();
        let err = service.send_request("alice", "bob").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn crossing_request_should_accept() {
        let (store, service) = setup().await;
        service.send_request("alice", "bob").await.unwrap();
        let outcome = service.send_request("bob", "alice").await.unwrap();
        assert!(matches!(
            outcome,
            SendOutcome::Accepted { ref outcome } if outcome.reverse_written
        ));
        assert_eq!(
            service.friendship_state("alice", "bob").await.unwrap(),
            FriendshipState::AcceptedSymmetric
        );
        assert!(!store
            .exists(&DocPath::friend_request("bob", "alice").unwrap())
            .await
            .unwrap());
        assert!(!store
            .exists(&DocPath::friend_request("alice", "bob").unwrap())
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn incoming_requests_should_be_enriched_and_ordered() {
        let (store, service) = setup().await;
        service.send_request("carol", "alice").await.unwrap();
        service.send_request("bob", "alice").await.unwrap();
        // sender without a profile is skipped
        store
            .set(
                &DocPath::friend_request("alice", "ghost").unwrap(),
                FriendRequest::fields("ghost"),
            )
            .await
            .unwrap();

        let requests = service.list_incoming_requests("alice").await.unwrap();
        let ids: Vec<_> = requests.iter().map(|r| r.user.id.as_str()).collect();
        assert_eq!(ids, vec!["carol", "bob"]);
        assert_eq!(requests[1].user.display_name, "Bob");
    }

    #[tokio::test]
    async fn decline_and_cancel_should_delete_the_request() {
        let (store, service) = setup().await;
        service.send_request("alice", "bob").await.unwrap();
        service.decline_request("bob", "alice").await.unwrap();
        assert!(store
            .list(&CollectionPath::friend_requests("bob").unwrap())
            .await
            .unwrap()
            .is_empty());
        let err = service.decline_request("bob", "alice").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        service.send_request("alice", "carol").await.unwrap();
        service.cancel_request("alice", "carol").await.unwrap();
        assert_eq!(
            service.friendship_state("alice", "carol").await.unwrap(),
            FriendshipState::None
        );
        let err = service.cancel_request("alice", "carol").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn watch_should_follow_requests() {
        let (_, service) = setup().await;
        let mut watch = service.watch_incoming_requests("bob").unwrap();

        assert!(next(&mut watch).await.is_empty());
        service.send_request("alice", "bob").await.unwrap();
        let snapshot = next(&mut watch).await;
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].user.id, "alice");

        service.decline_request("bob", "alice").await.unwrap();
        assert!(next(&mut watch).await.is_empty());
    }
}
